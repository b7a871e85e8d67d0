use time::OffsetDateTime;

use crate::{model::Candidate, planner::render_time, scoring::SubScore};

/// Scores how close the incident anchor falls to the candidate's execution.
///
/// Inside a live interval scores 100 and inside the planned window 90. Otherwise the score
/// decays linearly with the distance to the nearest known boundary, reaching zero at
/// `decay_hours`. A plan is a window only when both ends are set; a lone planned start is a
/// boundary like any other.
pub fn score(anchor: OffsetDateTime, candidate: &Candidate, decay_hours: f64) -> SubScore {
	if let Some(interval) = candidate.live_intervals.iter().find(|interval| interval.contains(anchor))
	{
		return SubScore::new(
			100.0,
			"within live interval",
			vec![format!("{} - {}", render_time(interval.start), render_time(interval.end))],
		);
	}

	let within_plan = match (candidate.planned_start, candidate.planned_end) {
		(Some(start), Some(end)) => start <= anchor && anchor <= end,
		_ => false,
	};

	if within_plan {
		return SubScore::new(90.0, "within planned window", Vec::new());
	}

	let boundaries = candidate
		.live_intervals
		.iter()
		.flat_map(|interval| [interval.start, interval.end])
		.chain(candidate.planned_start)
		.chain(candidate.planned_end);
	let Some(hours) = boundaries
		.map(|boundary| (anchor - boundary).abs().as_seconds_f64() / 3_600.0)
		.min_by(f64::total_cmp)
	else {
		return SubScore::zero("no temporal data");
	};
	let score = if decay_hours > 0.0 { 100.0 * (1.0 - hours / decay_hours) } else { 0.0 };

	SubScore::new(score.max(0.0), format!("{}h outside window", hours.round()), Vec::new())
}
