use serde::{Deserialize, Serialize};

use culprit_config::{Scoring, Weights};

use crate::{
	adjust::{self, AppliedAdjustment},
	mapping::MappingSnapshot,
	model::{Candidate, Incident},
	scoring::{self, SubScore, round1},
};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SubScores {
	pub time: SubScore,
	pub service: SubScore,
	pub infra: SubScore,
	pub org: SubScore,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RankingItem {
	pub rank: usize,
	pub key: String,
	pub summary: String,
	pub final_score: f64,
	pub base_score: f64,
	pub multiplier: f64,
	pub sub_scores: SubScores,
	pub penalties: Vec<AppliedAdjustment>,
	pub bonuses: Vec<AppliedAdjustment>,
}

/// Scales weights to sum to one. An all-zero set becomes equal quarters.
pub fn normalize_weights(weights: &Weights) -> Weights {
	let parts = [weights.time, weights.service, weights.infra, weights.org]
		.map(|weight| if weight.is_finite() && weight > 0.0 { weight } else { 0.0 });
	let total: f64 = parts.iter().sum();

	if total <= 0.0 {
		return Weights { time: 0.25, service: 0.25, infra: 0.25, org: 0.25 };
	}

	Weights {
		time: parts[0] / total,
		service: parts[1] / total,
		infra: parts[2] / total,
		org: parts[3] / total,
	}
}

/// Scores a single candidate. `weights` must already be normalized. The returned item has rank 0.
pub fn score_candidate(
	incident: &Incident,
	candidate: &Candidate,
	mapping: &MappingSnapshot,
	scoring: &Scoring,
	weights: &Weights,
) -> RankingItem {
	let time = scoring::temporal::score(
		incident.anchor,
		candidate,
		scoring.thresholds.time_decay_hours,
	);
	let service = scoring::service::score(&incident.services, &candidate.services, mapping);
	let infra = scoring::infra::score(
		&incident.hosts,
		&incident.technologies,
		&candidate.hosts,
		&candidate.technologies,
	);
	let org = scoring::org::score(&incident.org, &candidate.org);
	let base = time.score * weights.time
		+ service.score * weights.service
		+ infra.score * weights.infra
		+ org.score * weights.org;
	let adjustment = adjust::adjust(
		incident.anchor,
		candidate,
		service.score,
		infra.score,
		&scoring.penalties,
		&scoring.bonuses,
	);
	let final_score = round1((base * adjustment.multiplier).clamp(0.0, 100.0));

	RankingItem {
		rank: 0,
		key: candidate.key.clone(),
		summary: candidate.summary.clone(),
		final_score,
		base_score: round1(base),
		multiplier: adjustment.multiplier,
		sub_scores: SubScores { time, service, infra, org },
		penalties: adjustment.penalties,
		bonuses: adjustment.bonuses,
	}
}

/// Scores, filters, sorts and ranks every candidate.
///
/// Items below `min_score_to_show` are dropped. Ties keep input order. `top` limits the
/// returned prefix.
pub fn rank_candidates(
	incident: &Incident,
	candidates: &[Candidate],
	mapping: &MappingSnapshot,
	scoring: &Scoring,
	top: Option<usize>,
) -> Vec<RankingItem> {
	let weights = normalize_weights(&scoring.weights);
	let mut items: Vec<RankingItem> = candidates
		.iter()
		.map(|candidate| score_candidate(incident, candidate, mapping, scoring, &weights))
		.filter(|item| item.final_score >= scoring.thresholds.min_score_to_show)
		.collect();

	items.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));

	for (idx, item) in items.iter_mut().enumerate() {
		item.rank = idx + 1;
	}

	if let Some(top) = top {
		items.truncate(top);
	}

	items
}
