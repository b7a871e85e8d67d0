//! Multiplicative penalties and bonuses applied on top of the weighted base score.

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use culprit_config::{Bonuses, Penalties};

use crate::model::Candidate;

/// More affected services than this marks a change as generic.
pub const GENERIC_CHANGE_THRESHOLD: usize = 10;
/// Service plus infra above this waives the long-duration penalty.
pub const STRONG_MATCH_THRESHOLD: f64 = 80.0;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct AppliedAdjustment {
	pub name: String,
	pub factor: f64,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Adjustment {
	pub multiplier: f64,
	pub penalties: Vec<AppliedAdjustment>,
	pub bonuses: Vec<AppliedAdjustment>,
}
impl Adjustment {
	pub fn names(&self) -> Vec<&str> {
		self.penalties.iter().chain(&self.bonuses).map(|applied| applied.name.as_str()).collect()
	}
}

pub fn adjust(
	anchor: OffsetDateTime,
	candidate: &Candidate,
	service_score: f64,
	infra_score: f64,
	penalties: &Penalties,
	bonuses: &Bonuses,
) -> Adjustment {
	let mut applied_penalties = Vec::new();
	let mut push = |name: &str, factor: f64| {
		applied_penalties.push(AppliedAdjustment { name: name.to_string(), factor });
	};

	if candidate.live_intervals.is_empty() {
		push("no_live_intervals", penalties.no_live_intervals);
	}
	if candidate.hosts.is_empty() {
		push("no_hosts", penalties.no_hosts);
	}
	if candidate.services.is_empty() {
		push("no_services", penalties.no_services);
	}
	if candidate.services.len() > GENERIC_CHANGE_THRESHOLD {
		push("generic_change", penalties.generic_change);
	}
	if service_score + infra_score <= STRONG_MATCH_THRESHOLD
		&& let Some(duration) = candidate.duration()
	{
		if duration > Duration::days(90) {
			push("long_duration_quarter", penalties.long_duration_quarter);
		} else if duration > Duration::days(30) {
			push("long_duration_month", penalties.long_duration_month);
		} else if duration > Duration::days(7) {
			push("long_duration_week", penalties.long_duration_week);
		}
	}

	let bonus = candidate
		.effective_start()
		.filter(|start| *start <= anchor)
		.and_then(|start| proximity_bonus(anchor - start, bonuses));
	let applied_bonuses: Vec<AppliedAdjustment> = bonus.into_iter().collect();
	let multiplier = applied_penalties
		.iter()
		.chain(&applied_bonuses)
		.fold(1.0, |acc, applied| acc * applied.factor);

	Adjustment { multiplier, penalties: applied_penalties, bonuses: applied_bonuses }
}

fn proximity_bonus(lead: Duration, bonuses: &Bonuses) -> Option<AppliedAdjustment> {
	let (name, factor) = if lead < Duration::minutes(30) {
		("proximity_exact", bonuses.proximity_exact)
	} else if lead < Duration::hours(1) {
		("proximity_1h", bonuses.proximity_1h)
	} else if lead < Duration::hours(2) {
		("proximity_2h", bonuses.proximity_2h)
	} else if lead < Duration::hours(4) {
		("proximity_4h", bonuses.proximity_4h)
	} else {
		return None;
	};

	Some(AppliedAdjustment { name: name.to_string(), factor })
}
