use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use culprit_config::{Error as ConfigError, SearchDefaults};

/// A documented execution window of a change, taken from a comment such as
/// `[14/03/2025 10:00, 14/03/2025 11:30]`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct LiveInterval {
	#[serde(with = "crate::time_serde")]
	pub start: OffsetDateTime,
	#[serde(with = "crate::time_serde")]
	pub end: OffsetDateTime,
}
impl LiveInterval {
	pub fn contains(&self, at: OffsetDateTime) -> bool {
		self.start <= at && at <= self.end
	}
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct OrgInfo {
	pub team: Option<String>,
	pub assignee: Option<String>,
	pub people: Vec<String>,
	pub brands: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TimelineEntry {
	#[serde(with = "crate::time_serde")]
	pub at: OffsetDateTime,
	pub user: String,
	pub action: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Incident {
	pub key: String,
	pub summary: String,
	/// First-impact time, or creation time when the description carries no timeline.
	#[serde(with = "crate::time_serde")]
	pub anchor: OffsetDateTime,
	#[serde(with = "crate::time_serde::option")]
	pub created_at: Option<OffsetDateTime>,
	#[serde(with = "crate::time_serde::option")]
	pub first_impact: Option<OffsetDateTime>,
	pub services: Vec<String>,
	pub hosts: Vec<String>,
	pub technologies: Vec<String>,
	pub org: OrgInfo,
	pub timeline_entries: usize,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Candidate {
	pub key: String,
	pub summary: String,
	pub live_intervals: Vec<LiveInterval>,
	#[serde(with = "crate::time_serde::option")]
	pub planned_start: Option<OffsetDateTime>,
	#[serde(with = "crate::time_serde::option")]
	pub planned_end: Option<OffsetDateTime>,
	pub services: Vec<String>,
	pub hosts: Vec<String>,
	pub technologies: Vec<String>,
	pub org: OrgInfo,
	pub resolution: Option<String>,
	pub change_category: Option<String>,
	pub warnings: Vec<String>,
}
impl Candidate {
	/// Planned start, or the earliest documented execution when no plan exists.
	pub fn effective_start(&self) -> Option<OffsetDateTime> {
		self.planned_start.or_else(|| self.live_intervals.iter().map(|i| i.start).min())
	}

	/// Planned window length when both ends are known, otherwise the span of the live intervals.
	pub fn duration(&self) -> Option<Duration> {
		if let (Some(start), Some(end)) = (self.planned_start, self.planned_end) {
			return Some(end - start);
		}

		let start = self.live_intervals.iter().map(|i| i.start).min()?;
		let end = self.live_intervals.iter().map(|i| i.end).max()?;

		Some(end - start)
	}
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct RawComment {
	pub author: Option<String>,
	pub body: String,
}

/// A tracker record after field extraction but before any text interpretation.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct RawRecord {
	pub key: String,
	pub issue_type: Option<String>,
	pub summary: String,
	pub description: String,
	#[serde(with = "crate::time_serde::option")]
	pub created: Option<OffsetDateTime>,
	#[serde(with = "crate::time_serde::option")]
	pub planned_start: Option<OffsetDateTime>,
	#[serde(with = "crate::time_serde::option")]
	pub planned_end: Option<OffsetDateTime>,
	pub team: Option<String>,
	pub business_units: Vec<String>,
	pub change_category: Option<String>,
	pub labels: Vec<String>,
	pub assignee: Option<String>,
	pub reporter: Option<String>,
	pub resolution: Option<String>,
	pub comments: Vec<RawComment>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SearchOptions {
	pub window_before: Duration,
	pub window_after: Duration,
	pub include_active: bool,
	pub include_open_ended: bool,
	pub include_low_signal: bool,
	pub max_results: u32,
	/// Appended verbatim to every query. Callers supply the leading `AND`.
	pub extra_filter: String,
	pub project: String,
}
impl SearchOptions {
	pub fn from_defaults(defaults: &SearchDefaults) -> culprit_config::Result<Self> {
		Ok(Self {
			window_before: parse_window(&defaults.window_before)?,
			window_after: parse_window(&defaults.window_after)?,
			include_active: defaults.include_active,
			include_open_ended: defaults.include_open_ended,
			include_low_signal: defaults.include_low_signal,
			max_results: defaults.max_results,
			extra_filter: defaults.extra_filter.trim().to_string(),
			project: defaults.project.trim().to_uppercase(),
		})
	}

	pub fn validate(&self) -> culprit_config::Result<()> {
		if self.window_before.is_negative() || self.window_after.is_negative() {
			return Err(ConfigError::Validation {
				message: "Search windows must be zero or greater.".to_string(),
			});
		}
		if self.max_results == 0 {
			return Err(ConfigError::Validation {
				message: "max_results must be greater than zero.".to_string(),
			});
		}
		if self.project.trim().is_empty()
			|| !self.project.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
		{
			return Err(ConfigError::Validation {
				message: "project must be a non-empty tracker project key.".to_string(),
			});
		}

		Ok(())
	}
}

/// Parses `48h`, `2d` or `120m` into a signed duration.
pub fn parse_window(raw: &str) -> culprit_config::Result<Duration> {
	let std = culprit_config::parse_window(raw)?;

	Duration::try_from(std).map_err(|_| ConfigError::Validation {
		message: format!("Window {raw:?} is out of range."),
	})
}
