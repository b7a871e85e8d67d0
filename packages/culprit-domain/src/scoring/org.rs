use crate::{
	model::OrgInfo,
	scoring::{SubScore, lowercase_set},
};

const SAME_TEAM: f64 = 50.0;
const RELATED_TEAM: f64 = 25.0;
const PER_PERSON: f64 = 15.0;
const PEOPLE_CAP: f64 = 50.0;
const SHARED_BRAND: f64 = 50.0;

pub fn score(incident: &OrgInfo, candidate: &OrgInfo) -> SubScore {
	let mut total = 0.0;
	let mut matches = Vec::new();
	let mut reasons = Vec::new();

	if let (Some(left), Some(right)) = (incident.team.as_deref(), candidate.team.as_deref()) {
		let left = left.trim().to_lowercase();
		let right = right.trim().to_lowercase();

		if !left.is_empty() && !right.is_empty() {
			if left == right {
				total += SAME_TEAM;

				reasons.push("same team".to_string());
				matches.push(left);
			} else if left.contains(&right) || right.contains(&left) {
				total += RELATED_TEAM;

				reasons.push("related team".to_string());
				matches.push(right);
			}
		}
	}

	let incident_people = lowercase_set(&incident.people);
	let candidate_people = lowercase_set(&candidate.people);
	let shared_people: Vec<String> =
		incident_people.intersection(&candidate_people).cloned().collect();

	if !shared_people.is_empty() {
		total += (PER_PERSON * shared_people.len() as f64).min(PEOPLE_CAP);

		reasons.push(format!("{} shared people", shared_people.len()));
		matches.extend(shared_people);
	}

	let incident_brands = lowercase_set(&incident.brands);
	let candidate_brands = lowercase_set(&candidate.brands);
	let shared_brands: Vec<String> =
		incident_brands.intersection(&candidate_brands).cloned().collect();

	if !shared_brands.is_empty() {
		total += SHARED_BRAND;

		reasons.push(format!("brand: {}", shared_brands.join(", ")));
		matches.extend(shared_brands);
	}

	let reason =
		if reasons.is_empty() { "no organizational overlap".to_string() } else { reasons.join(" | ") };

	SubScore::new(total.min(100.0), reason, matches)
}
