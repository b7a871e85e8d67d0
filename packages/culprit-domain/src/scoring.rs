//! Independent 0-100 sub-scores for one incident and one candidate.

pub mod infra;
pub mod org;
pub mod service;
pub mod temporal;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SubScore {
	pub score: f64,
	pub reason: String,
	pub matches: Vec<String>,
}
impl SubScore {
	pub fn new(score: f64, reason: impl Into<String>, matches: Vec<String>) -> Self {
		Self { score: round1(score.clamp(0.0, 100.0)), reason: reason.into(), matches }
	}

	pub fn zero(reason: impl Into<String>) -> Self {
		Self::new(0.0, reason, Vec::new())
	}
}

pub fn jaccard(left: &BTreeSet<String>, right: &BTreeSet<String>) -> f64 {
	if left.is_empty() || right.is_empty() {
		return 0.0;
	}

	let shared = left.intersection(right).count();
	let union = left.union(right).count();

	shared as f64 / union as f64
}

pub fn round1(value: f64) -> f64 {
	(value * 10.0).round() / 10.0
}

pub(crate) fn lowercase_set<'a, I>(values: I) -> BTreeSet<String>
where
	I: IntoIterator<Item = &'a String>,
{
	values
		.into_iter()
		.map(|value| value.trim().to_lowercase())
		.filter(|value| !value.is_empty())
		.collect()
}
