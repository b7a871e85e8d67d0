use crate::scoring::{SubScore, jaccard, lowercase_set};

const HOST_WEIGHT: f64 = 0.6;
const TECH_WEIGHT: f64 = 0.4;

pub fn score(
	incident_hosts: &[String],
	incident_technologies: &[String],
	candidate_hosts: &[String],
	candidate_technologies: &[String],
) -> SubScore {
	let incident_hosts = lowercase_set(incident_hosts);
	let candidate_hosts = lowercase_set(candidate_hosts);
	let incident_tech = lowercase_set(incident_technologies);
	let candidate_tech = lowercase_set(candidate_technologies);
	let host_matches: Vec<String> = incident_hosts.intersection(&candidate_hosts).cloned().collect();
	let tech_matches: Vec<String> = incident_tech.intersection(&candidate_tech).cloned().collect();
	let host_sub = if host_matches.is_empty() { 0.0 } else { 100.0 };
	let tech_sub = if tech_matches.is_empty() {
		0.0
	} else {
		50.0 + 50.0 * jaccard(&incident_tech, &candidate_tech)
	};
	let mut reasons = Vec::new();

	if !host_matches.is_empty() {
		reasons.push(format!("hosts: {}", host_matches.join(", ")));
	}
	if !tech_matches.is_empty() {
		reasons.push(format!("tech: {}", tech_matches.join(", ")));
	}

	let reason =
		if reasons.is_empty() { "no shared infrastructure".to_string() } else { reasons.join(" | ") };

	SubScore::new(
		HOST_WEIGHT * host_sub + TECH_WEIGHT * tech_sub,
		reason,
		host_matches.into_iter().chain(tech_matches).collect(),
	)
}
