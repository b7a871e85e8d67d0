use crate::{
	mapping::MappingSnapshot,
	scoring::{SubScore, jaccard},
};

pub fn score(
	incident_services: &[String],
	candidate_services: &[String],
	mapping: &MappingSnapshot,
) -> SubScore {
	let incident = mapping.canonical_set(incident_services);
	let candidate = mapping.canonical_set(candidate_services);

	if incident.is_empty() || candidate.is_empty() {
		return SubScore::zero("no services to compare");
	}

	let shared: Vec<String> = incident.intersection(&candidate).cloned().collect();

	if !shared.is_empty() {
		let similarity = jaccard(&incident, &candidate);

		return SubScore::new(
			50.0 + 50.0 * similarity,
			format!("{} shared service(s), jaccard {similarity:.2}", shared.len()),
			shared,
		);
	}

	match mapping.shared_group(&incident, &candidate) {
		Some(group) => SubScore::new(
			25.0,
			format!("same ecosystem: {} ({} / {})", group.name, group.left.join(", "), group.right.join(", ")),
			vec![group.name],
		),
		None => SubScore::zero("no shared services"),
	}
}
