mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Bonuses, Config, Extraction, HostPolicy, Mapping, Penalties, Retry, Scoring, Search,
	SearchDefaults, Service, Thresholds, Tracker, TrackerFields, Weights, default_groups,
	default_synonyms, default_technologies,
};

use std::{fs, path::Path, time::Duration};

use regex::Regex;

pub const MIN_TOP_RESULTS: u32 = 5;
pub const MAX_TOP_RESULTS: u32 = 200;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	from_toml_str(&raw).map_err(|err| match err {
		Error::ParseConfig { source, .. } =>
			Error::ParseConfig { path: path.to_path_buf(), source },
		other => other,
	})
}

/// Parses, normalizes and validates a configuration held in memory.
pub fn from_toml_str(raw: &str) -> Result<Config> {
	let mut cfg: Config = toml::from_str(raw)
		.map_err(|err| Error::ParseConfig { path: Default::default(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.tracker.api_base.trim().is_empty() {
		return Err(Error::Validation {
			message: "tracker.api_base must be non-empty.".to_string(),
		});
	}
	if !cfg.tracker.api_base.starts_with("http://") && !cfg.tracker.api_base.starts_with("https://")
	{
		return Err(Error::Validation {
			message: "tracker.api_base must start with http:// or https://.".to_string(),
		});
	}
	if cfg.tracker.api_token.trim().is_empty() {
		return Err(Error::Validation {
			message: "tracker.api_token must be non-empty.".to_string(),
		});
	}
	if cfg.tracker.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "tracker.timeout_ms must be greater than zero.".to_string(),
		});
	}

	for (label, value) in [
		("tracker.fields.planned_start", &cfg.tracker.fields.planned_start),
		("tracker.fields.planned_end", &cfg.tracker.fields.planned_end),
		("tracker.fields.team", &cfg.tracker.fields.team),
		("tracker.fields.business_units", &cfg.tracker.fields.business_units),
		("tracker.fields.change_category", &cfg.tracker.fields.change_category),
		("search.start_field", &cfg.search.start_field),
		("search.end_field", &cfg.search.end_field),
		("search.defaults.project", &cfg.search.defaults.project),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if cfg.extraction.concurrency == 0 {
		return Err(Error::Validation {
			message: "extraction.concurrency must be greater than zero.".to_string(),
		});
	}
	if cfg.extraction.page_size == 0 {
		return Err(Error::Validation {
			message: "extraction.page_size must be greater than zero.".to_string(),
		});
	}

	validate_retry(&cfg.extraction.retry)?;

	for pattern in &cfg.extraction.hosts.patterns {
		if let Err(err) = Regex::new(pattern) {
			return Err(Error::Validation {
				message: format!("extraction.hosts.patterns contains an invalid pattern: {err}."),
			});
		}
	}

	if cfg.search.defaults.max_results == 0 {
		return Err(Error::Validation {
			message: "search.defaults.max_results must be greater than zero.".to_string(),
		});
	}

	parse_window(&cfg.search.defaults.window_before).map_err(|_| Error::Validation {
		message: "search.defaults.window_before must look like 48h, 2d or 120m.".to_string(),
	})?;
	parse_window(&cfg.search.defaults.window_after).map_err(|_| Error::Validation {
		message: "search.defaults.window_after must look like 48h, 2d or 120m.".to_string(),
	})?;

	validate_scoring(&cfg.scoring)?;
	validate_mapping(&cfg.mapping)?;

	Ok(())
}

pub fn validate_retry(retry: &Retry) -> Result<()> {
	if retry.max_attempts == 0 {
		return Err(Error::Validation {
			message: "extraction.retry.max_attempts must be greater than zero.".to_string(),
		});
	}
	if retry.max_delay_ms < retry.base_delay_ms {
		return Err(Error::Validation {
			message: "extraction.retry.max_delay_ms must be at least extraction.retry.base_delay_ms."
				.to_string(),
		});
	}
	if !retry.jitter.is_finite() || !(0.0..=1.0).contains(&retry.jitter) {
		return Err(Error::Validation {
			message: "extraction.retry.jitter must be in the range 0.0-1.0.".to_string(),
		});
	}

	Ok(())
}

pub fn validate_scoring(scoring: &Scoring) -> Result<()> {
	validate_weights(&scoring.weights)?;
	validate_penalties(&scoring.penalties)?;
	validate_bonuses(&scoring.bonuses)?;
	validate_thresholds(&scoring.thresholds)?;
	validate_top_results(scoring.top_results)?;

	Ok(())
}

pub fn validate_weights(weights: &Weights) -> Result<()> {
	for (label, value) in [
		("time", weights.time),
		("service", weights.service),
		("infra", weights.infra),
		("org", weights.org),
	] {
		if !value.is_finite() {
			return Err(Error::Validation {
				message: format!("scoring.weights.{label} must be a finite number."),
			});
		}
		if value < 0.0 {
			return Err(Error::Validation {
				message: format!("scoring.weights.{label} must be zero or greater."),
			});
		}
	}

	Ok(())
}

pub fn validate_penalties(penalties: &Penalties) -> Result<()> {
	for (label, value) in penalties.entries() {
		if !value.is_finite() || value <= 0.0 || value > 1.0 {
			return Err(Error::Validation {
				message: format!("scoring.penalties.{label} must be greater than 0.0 and at most 1.0."),
			});
		}
	}

	Ok(())
}

pub fn validate_bonuses(bonuses: &Bonuses) -> Result<()> {
	for (label, value) in bonuses.entries() {
		if !value.is_finite() || value < 1.0 {
			return Err(Error::Validation {
				message: format!("scoring.bonuses.{label} must be 1.0 or greater."),
			});
		}
	}

	Ok(())
}

pub fn validate_thresholds(thresholds: &Thresholds) -> Result<()> {
	if !thresholds.time_decay_hours.is_finite() || thresholds.time_decay_hours <= 0.0 {
		return Err(Error::Validation {
			message: "scoring.thresholds.time_decay_hours must be greater than zero.".to_string(),
		});
	}
	if !thresholds.min_score_to_show.is_finite()
		|| !(0.0..=100.0).contains(&thresholds.min_score_to_show)
	{
		return Err(Error::Validation {
			message: "scoring.thresholds.min_score_to_show must be in the range 0-100.".to_string(),
		});
	}

	Ok(())
}

pub fn validate_top_results(top_results: u32) -> Result<()> {
	if !(MIN_TOP_RESULTS..=MAX_TOP_RESULTS).contains(&top_results) {
		return Err(Error::Validation {
			message: format!(
				"scoring.top_results must be in the range {MIN_TOP_RESULTS}-{MAX_TOP_RESULTS}."
			),
		});
	}

	Ok(())
}

pub fn validate_mapping(mapping: &Mapping) -> Result<()> {
	for (table, rows) in [("synonyms", &mapping.synonyms), ("groups", &mapping.groups)] {
		for (name, members) in rows {
			if name.trim().is_empty() {
				return Err(Error::Validation {
					message: format!("mapping.{table} keys must be non-empty."),
				});
			}
			if members.iter().any(|member| member.trim().is_empty()) {
				return Err(Error::Validation {
					message: format!("mapping.{table}.{name} must not contain empty entries."),
				});
			}
		}
	}

	Ok(())
}

/// Parses a window length such as `48h`, `2d` or `120m`.
pub fn parse_window(raw: &str) -> Result<Duration> {
	let raw = raw.trim();
	let invalid = || Error::Validation {
		message: format!("Invalid window {raw:?}. Expected a number followed by h, d or m."),
	};
	let unit = raw.chars().last().ok_or_else(invalid)?;
	let digits = &raw[..raw.len() - unit.len_utf8()];

	if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_digit()) {
		return Err(invalid());
	}

	let amount: u64 = digits.parse().map_err(|_| invalid())?;
	let seconds = match unit {
		'm' => amount.checked_mul(60),
		'h' => amount.checked_mul(3_600),
		'd' => amount.checked_mul(86_400),
		_ => None,
	}
	.ok_or_else(invalid)?;

	Ok(Duration::from_secs(seconds))
}

/// Lowercases and trims a mapping table, dropping empty aliases.
pub fn normalize_mapping(mapping: &mut Mapping) {
	let canonicalize = |rows: &std::collections::BTreeMap<String, Vec<String>>| {
		rows.iter()
			.map(|(name, members)| {
				let mut members: Vec<String> = members
					.iter()
					.map(|member| member.trim().to_lowercase())
					.filter(|member| !member.is_empty())
					.collect();

				members.dedup();

				(name.trim().to_lowercase(), members)
			})
			.collect()
	};

	mapping.synonyms = canonicalize(&mapping.synonyms);
	mapping.groups = canonicalize(&mapping.groups);
}

fn normalize(cfg: &mut Config) {
	while cfg.tracker.api_base.ends_with('/') {
		cfg.tracker.api_base.pop();
	}

	if cfg.tracker.username.as_deref().map(|name| name.trim().is_empty()).unwrap_or(false) {
		cfg.tracker.username = None;
	}

	cfg.search.defaults.project = cfg.search.defaults.project.trim().to_uppercase();
	cfg.extraction.technologies = cfg
		.extraction
		.technologies
		.iter()
		.map(|tech| tech.trim().to_lowercase())
		.filter(|tech| !tech.is_empty())
		.collect();
	cfg.extraction.hosts.blacklist =
		cfg.extraction.hosts.blacklist.iter().map(|host| host.trim().to_lowercase()).collect();

	normalize_mapping(&mut cfg.mapping);
}
