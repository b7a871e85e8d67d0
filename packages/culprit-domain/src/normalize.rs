//! Turns raw tracker records into incidents and candidates.
//!
//! Everything here is deterministic text interpretation: live intervals from comments, the
//! incident timeline from the description, services, hosts, technologies, people and brands.

use std::collections::BTreeSet;

use regex::Regex;
use time::{Duration, OffsetDateTime, PrimitiveDateTime, macros::format_description};

use culprit_config::Extraction;

use crate::{
	mapping::{MappingSnapshot, contains_term},
	model::{Candidate, Incident, LiveInterval, OrgInfo, RawComment, RawRecord, TimelineEntry},
};

const IGNORED_TAGS: &[&str] = &[
	"ai", "dev", "smb", "urgent", "qa", "prod", "pre", "test", "wip", "todo", "done", "blocked",
	"review", "minor", "major", "critical", "blocker", "bug", "feature", "task", "story", "epic",
];
const GENERIC_UNIT_SUFFIXES: &[&str] = &[
	"business support systems",
	"customer interaction systems",
	"employee support systems",
	"operations support systems",
	"product service systems",
	"external supplier systems",
	"outsourced service systems",
	"corporate management systems",
	"-bss",
	"-cis",
	"-ess",
	"-oss",
	"-pss",
	"-extss",
	"-outss",
	"-cms",
];
/// Business-unit prefixes and the brand each one denotes.
const UNIT_PREFIXES: &[(&str, &str)] = &[
	("ar_", "arsys"),
	("fh_", "fasthosts"),
	("ic-", "ionos-cloud"),
	("ionos-", "ionos"),
	("strato-", "strato"),
	("home.pl-", "home.pl"),
	("cronon-", "cronon"),
	("cronon ", "cronon"),
	("fasthosts-", "fasthosts"),
	("fasthosts ", "fasthosts"),
	("world4you-", "world4you"),
	("world4you ", "world4you"),
	("internetx-", "internetx"),
	("internetx ", "internetx"),
	("we22-", "we22"),
	("we22 ", "we22"),
	("udag-", "udag"),
	("udag ", "udag"),
];
const KNOWN_BRANDS: &[&str] = &[
	"arsys",
	"cronon",
	"fasthosts",
	"home.pl",
	"internetx",
	"ionos",
	"ionos-cloud",
	"strato",
	"udag",
	"we22",
	"world4you",
];

struct Patterns {
	interval: Regex,
	timeline: Regex,
	bracket_tag: Regex,
	acronym_unit: Regex,
	uuid_fragment: Regex,
	hex_hash: Regex,
	version: Regex,
	node_fragment: Regex,
	cloud_region: Regex,
	ticket_id: Regex,
	attachment: Regex,
	tag_date: Regex,
}
impl Patterns {
	fn new() -> Result<Self, regex::Error> {
		Ok(Self {
			interval: Regex::new(
				r"\[(\d{2}/\d{2}/\d{4})\s+(\d{2}:\d{2}),\s*(?:(\d{2}/\d{2}/\d{4})\s+)?(\d{2}:\d{2})\]",
			)?,
			timeline: Regex::new(r"(?m)^(\d{8})\s+(\d{2}:\d{2})\s*-\s*(\w+):\s*(.+?)\s*$")?,
			bracket_tag: Regex::new(r"\[([^\]]+)\]")?,
			acronym_unit: Regex::new(r"^(.+?)\s*\(([A-Za-z]{2,10}(?:-[A-Za-z]{2,10})?)\)$")?,
			uuid_fragment: Regex::new(r"^[a-f0-9]{4,8}$")?,
			hex_hash: Regex::new(r"^[a-f0-9]{32,}$")?,
			version: Regex::new(r"^v?\d+(\.\d+)*$")?,
			node_fragment: Regex::new(r"^node-\d+$")?,
			cloud_region: Regex::new(r"^(eu|us|ap|sa|af|me)-(north|south|east|west|central)-\d+$")?,
			ticket_id: Regex::new(r"^[a-z]{2,6}-\d{1,5}$")?,
			attachment: Regex::new(r"^(image|screenshot|img|pic|photo)-")?,
			tag_date: Regex::new(r"\d{2}/\d{2}/\d{4}")?,
		})
	}
}

/// Record normalizer bound to one mapping snapshot and one host policy.
pub struct Normalizer {
	mapping: MappingSnapshot,
	host_patterns: Vec<Regex>,
	host_blacklist: BTreeSet<String>,
	technologies: Vec<String>,
	patterns: Patterns,
}
impl Normalizer {
	pub fn new(extraction: &Extraction, mapping: MappingSnapshot) -> Result<Self, regex::Error> {
		let host_patterns = extraction
			.hosts
			.patterns
			.iter()
			.map(|pattern| Regex::new(pattern))
			.collect::<Result<Vec<_>, _>>()?;

		Ok(Self {
			mapping,
			host_patterns,
			host_blacklist: extraction.hosts.blacklist.iter().map(|h| h.to_lowercase()).collect(),
			technologies: extraction.technologies.iter().map(|t| t.to_lowercase()).collect(),
			patterns: Patterns::new()?,
		})
	}

	pub fn mapping(&self) -> &MappingSnapshot {
		&self.mapping
	}

	/// Returns `None` when the record carries neither a creation time nor a timeline.
	pub fn incident(&self, raw: &RawRecord) -> Option<Incident> {
		let timeline = self.timeline(&raw.description);
		let first_impact = timeline.first().map(|entry| entry.at);
		let anchor = first_impact.or(raw.created)?;
		let text = full_text(raw);

		Some(Incident {
			key: raw.key.to_uppercase(),
			summary: raw.summary.clone(),
			anchor,
			created_at: raw.created,
			first_impact,
			services: self.services(&text, &raw.business_units),
			hosts: self.hosts(&text),
			technologies: self.technologies(&text),
			org: OrgInfo {
				team: clean(raw.team.as_deref()),
				assignee: clean(raw.assignee.as_deref()),
				people: people(raw, &timeline),
				brands: brands(&raw.labels, &raw.business_units),
			},
			timeline_entries: timeline.len(),
		})
	}

	pub fn candidate(&self, raw: &RawRecord) -> Candidate {
		let text = full_text(raw);
		let timeline = self.timeline(&raw.description);
		let live_intervals = self.live_intervals(&raw.comments);
		let mut warnings = Vec::new();

		if live_intervals.is_empty() {
			warnings.push("No live intervals found in comments; using planned start/end.".to_string());
		}
		if let (Some(start), Some(end)) = (raw.planned_start, raw.planned_end)
			&& end < start
		{
			warnings.push("Planned end precedes planned start.".to_string());
		}

		Candidate {
			key: raw.key.to_uppercase(),
			summary: raw.summary.clone(),
			live_intervals,
			planned_start: raw.planned_start,
			planned_end: raw.planned_end,
			services: self.services(&text, &raw.business_units),
			hosts: self.hosts(&text),
			technologies: self.technologies(&text),
			org: OrgInfo {
				team: clean(raw.team.as_deref()),
				assignee: clean(raw.assignee.as_deref()),
				people: people(raw, &timeline),
				brands: brands(&raw.labels, &raw.business_units),
			},
			resolution: clean(raw.resolution.as_deref()),
			change_category: clean(raw.change_category.as_deref()),
			warnings,
		}
	}

	/// Live intervals written as `[dd/mm/yyyy HH:MM, [dd/mm/yyyy ]HH:MM]` in comment bodies.
	pub fn live_intervals(&self, comments: &[RawComment]) -> Vec<LiveInterval> {
		let mut intervals = Vec::new();

		for comment in comments {
			for caps in self.patterns.interval.captures_iter(&comment.body) {
				let start_date = &caps[1];
				let end_date = caps.get(3).map(|m| m.as_str());
				let Some(start) = parse_day_time(start_date, &caps[2]) else {
					continue;
				};
				let Some(mut end) = parse_day_time(end_date.unwrap_or(start_date), &caps[4]) else {
					continue;
				};

				// A bare end time earlier than the start rolls over midnight.
				if end_date.is_none() && end < start {
					end += Duration::days(1);
				}
				if end < start {
					continue;
				}

				intervals.push(LiveInterval { start, end });
			}
		}

		intervals
	}

	/// Timeline lines of the form `yyyymmdd HH:MM - user: action`.
	pub fn timeline(&self, description: &str) -> Vec<TimelineEntry> {
		let format = format_description!("[year][month][day] [hour]:[minute]");

		self.patterns
			.timeline
			.captures_iter(description)
			.filter_map(|caps| {
				let at = PrimitiveDateTime::parse(&format!("{} {}", &caps[1], &caps[2]), format)
					.ok()?
					.assume_utc();

				Some(TimelineEntry {
					at,
					user: caps[3].to_lowercase(),
					action: caps[4].trim().to_string(),
				})
			})
			.collect()
	}

	pub fn hosts(&self, text: &str) -> Vec<String> {
		let text = text.to_lowercase();
		let mut hosts = BTreeSet::new();

		for pattern in &self.host_patterns {
			for caps in pattern.captures_iter(&text) {
				let Some(found) = caps.get(1).or_else(|| caps.get(0)) else {
					continue;
				};

				if self.is_valid_host(found.as_str()) {
					hosts.insert(found.as_str().to_string());
				}
			}
		}

		hosts.into_iter().collect()
	}

	pub fn is_valid_host(&self, candidate: &str) -> bool {
		let host = candidate.trim().to_lowercase();
		let p = &self.patterns;

		if host.is_empty() || self.host_blacklist.contains(&host) {
			return false;
		}
		if p.uuid_fragment.is_match(&host) || p.hex_hash.is_match(&host) {
			return false;
		}
		if host.chars().filter(|ch| *ch != '-').all(|ch| ch.is_ascii_digit()) {
			return false;
		}
		if p.version.is_match(&host) || !host.chars().any(char::is_alphabetic) {
			return false;
		}
		if p.node_fragment.is_match(&host) || p.cloud_region.is_match(&host) {
			return false;
		}
		if p.ticket_id.is_match(&host) && !host.starts_with("s3-node") {
			return false;
		}

		!p.attachment.is_match(&host)
	}

	pub fn technologies(&self, text: &str) -> Vec<String> {
		let text = text.to_lowercase();
		let found: BTreeSet<String> =
			self.technologies.iter().filter(|tech| contains_term(&text, tech)).cloned().collect();

		found.into_iter().collect()
	}

	/// Canonical services from free text, bracket tags and business units.
	pub fn services(&self, text: &str, business_units: &[String]) -> Vec<String> {
		let mut services = self.mapping.services_in_text(text);

		for caps in self.patterns.bracket_tag.captures_iter(text) {
			let tag = caps[1].trim();

			if !self.is_service_tag(tag) || IGNORED_TAGS.contains(&tag.to_lowercase().as_str()) {
				continue;
			}
			if let Some(service) = self.mapping.services_in_text(tag).into_iter().next() {
				services.insert(service);
			}
		}

		for unit in business_units {
			if let Some(service) = self.business_unit_service(unit) {
				services.insert(self.mapping.canonicalize(&service));
			}
		}

		services.into_iter().collect()
	}

	fn is_service_tag(&self, tag: &str) -> bool {
		let compact: String =
			tag.chars().filter(|ch| !matches!(ch, ' ' | ':' | ',')).collect();

		!(tag.starts_with('~')
			|| self.patterns.tag_date.is_match(tag)
			|| tag.starts_with("http")
			|| tag.contains(".com")
			|| tag.contains(".org")
			|| tag.starts_with('!')
			|| tag.ends_with('!')
			|| tag.chars().count() < 2
			|| (!compact.is_empty() && compact.chars().all(|ch| ch.is_ascii_digit())))
	}

	/// Service named by a business unit such as `IC-S3 Object Storage` or
	/// `IONOS Cloud/IONOS Cloud PSS/IC-Compute`.
	pub fn business_unit_service(&self, unit: &str) -> Option<String> {
		let unit = unit.trim();
		let lower = unit.to_lowercase();

		if lower.is_empty() {
			return None;
		}

		for (prefix, _) in UNIT_PREFIXES {
			if let Some(rest) = lower.strip_prefix(prefix) {
				let service = rest.replace('_', " ").trim().to_string();

				if !service.is_empty() {
					return Some(service);
				}
			}
		}

		if let Some(caps) = self.patterns.acronym_unit.captures(&lower) {
			return Some(caps[2].replace('_', " ").trim().to_string());
		}

		if let Some((_, last)) = unit.rsplit_once('/') {
			let last = last.trim();

			return self.business_unit_service(last).or_else(|| Some(last.to_lowercase()));
		}

		let mut result = lower.clone();

		for suffix in GENERIC_UNIT_SUFFIXES {
			if let Some(stripped) = result.strip_suffix(suffix) {
				let stripped = stripped.trim();
				let stripped = match stripped.rfind('(') {
					Some(open) if stripped.ends_with(')') => stripped[..open].trim(),
					_ => stripped,
				};

				result = stripped.to_string();

				break;
			}
		}

		if result.chars().count() >= 2 {
			return Some(result);
		}
		if (2..=50).contains(&unit.chars().count()) {
			return Some(lower);
		}

		None
	}
}

fn parse_day_time(date: &str, clock: &str) -> Option<OffsetDateTime> {
	let format = format_description!("[day]/[month]/[year] [hour]:[minute]");

	PrimitiveDateTime::parse(&format!("{date} {clock}"), format).ok().map(|dt| dt.assume_utc())
}

fn full_text(raw: &RawRecord) -> String {
	let mut text = format!("{} {}", raw.summary, raw.description);

	for comment in &raw.comments {
		text.push(' ');
		text.push_str(&comment.body);
	}

	text
}

fn clean(value: Option<&str>) -> Option<String> {
	value.map(str::trim).filter(|value| !value.is_empty()).map(str::to_string)
}

fn people(raw: &RawRecord, timeline: &[TimelineEntry]) -> Vec<String> {
	let mut people = BTreeSet::new();

	for name in [raw.assignee.as_deref(), raw.reporter.as_deref()].into_iter().flatten() {
		let name = name.trim().to_lowercase();

		if !name.is_empty() {
			people.insert(name);
		}
	}
	for comment in &raw.comments {
		if let Some(author) = comment.author.as_deref() {
			let author: String =
				author.to_lowercase().chars().filter(|ch| !ch.is_whitespace()).collect();

			if !author.is_empty() {
				people.insert(author);
			}
		}
	}
	for entry in timeline {
		people.insert(entry.user.clone());
	}

	people.into_iter().collect()
}

/// Brand tags from labels naming a known brand and from business-unit prefixes.
pub fn brands(labels: &[String], business_units: &[String]) -> Vec<String> {
	let mut brands = BTreeSet::new();

	for label in labels {
		let label = label.trim().to_lowercase();

		if KNOWN_BRANDS.contains(&label.as_str()) {
			brands.insert(label);
		}
	}
	for unit in business_units {
		let lower = unit.trim().to_lowercase();
		let segments = [Some(lower.as_str()), lower.rsplit_once('/').map(|(_, last)| last.trim())];

		for segment in segments.into_iter().flatten() {
			if let Some((_, brand)) =
				UNIT_PREFIXES.iter().find(|(prefix, _)| segment.starts_with(prefix))
			{
				brands.insert(brand.to_string());
			}
		}

		if let Some((root, _)) = lower.split_once('/') {
			let root = root.trim().replace(' ', "-");

			if KNOWN_BRANDS.contains(&root.as_str()) {
				brands.insert(root);
			}
		}
	}

	brands.into_iter().collect()
}
