use std::collections::{BTreeMap, BTreeSet};

use culprit_config::Mapping;

/// An immutable view of the synonym and ecosystem tables.
///
/// Extraction takes one snapshot at start and uses it for every record so a concurrent
/// configuration change cannot split a run across two vocabularies. `version` is a content
/// hash, stable across processes for identical tables.
#[derive(Clone, Debug)]
pub struct MappingSnapshot {
	version: String,
	canonical: BTreeSet<String>,
	aliases: BTreeMap<String, String>,
	groups: BTreeMap<String, BTreeSet<String>>,
}
impl MappingSnapshot {
	pub fn new(mapping: &Mapping) -> Self {
		let mut canonical = BTreeSet::new();
		let mut aliases = BTreeMap::new();

		for (name, members) in &mapping.synonyms {
			let name = normalize_name(name);

			if name.is_empty() {
				continue;
			}

			for alias in members {
				let alias = normalize_name(alias);

				if !alias.is_empty() && alias != name {
					aliases.entry(alias).or_insert_with(|| name.clone());
				}
			}

			canonical.insert(name);
		}

		let mut snapshot =
			Self { version: String::new(), canonical, aliases, groups: BTreeMap::new() };
		let groups = mapping
			.groups
			.iter()
			.map(|(name, members)| {
				let members =
					members.iter().map(|member| snapshot.canonicalize(member)).collect();

				(normalize_name(name), members)
			})
			.collect();

		snapshot.groups = groups;
		snapshot.version = content_hash(&snapshot);

		snapshot
	}

	pub fn version(&self) -> &str {
		&self.version
	}

	/// Maps a service name to its canonical form. Unknown names are returned lowercased.
	pub fn canonicalize(&self, name: &str) -> String {
		let name = normalize_name(name);

		match self.aliases.get(&name) {
			Some(canonical) => canonical.clone(),
			None => name,
		}
	}

	pub fn canonical_set<'a, I>(&self, names: I) -> BTreeSet<String>
	where
		I: IntoIterator<Item = &'a String>,
	{
		names
			.into_iter()
			.map(|name| self.canonicalize(name))
			.filter(|name| !name.is_empty())
			.collect()
	}

	/// Canonical services mentioned anywhere in `text`, by canonical name or by alias.
	pub fn services_in_text(&self, text: &str) -> BTreeSet<String> {
		let text = text.to_lowercase();
		let mut found = BTreeSet::new();

		for name in &self.canonical {
			if contains_term(&text, name) {
				found.insert(name.clone());
			}
		}
		for (alias, name) in &self.aliases {
			if contains_term(&text, alias) {
				found.insert(name.clone());
			}
		}

		found
	}

	/// The ecosystem both sides belong to, preferring the group with the most members involved.
	pub fn shared_group(
		&self,
		left: &BTreeSet<String>,
		right: &BTreeSet<String>,
	) -> Option<SharedGroup> {
		let mut best: Option<SharedGroup> = None;

		for (name, members) in &self.groups {
			let left_hits: Vec<String> = left.intersection(members).cloned().collect();
			let right_hits: Vec<String> = right.intersection(members).cloned().collect();

			if left_hits.is_empty() || right_hits.is_empty() {
				continue;
			}

			let weight = left_hits.len() + right_hits.len();

			if best.as_ref().map(|group| weight > group.weight()).unwrap_or(true) {
				best = Some(SharedGroup { name: name.clone(), left: left_hits, right: right_hits });
			}
		}

		best
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SharedGroup {
	pub name: String,
	pub left: Vec<String>,
	pub right: Vec<String>,
}
impl SharedGroup {
	fn weight(&self) -> usize {
		self.left.len() + self.right.len()
	}
}

/// True when `needle` occurs in `haystack` bounded by non-alphanumeric characters.
pub fn contains_term(haystack: &str, needle: &str) -> bool {
	if needle.is_empty() {
		return false;
	}

	let mut from = 0;

	while let Some(offset) = haystack[from..].find(needle) {
		let start = from + offset;
		let end = start + needle.len();
		let before_ok =
			haystack[..start].chars().next_back().map(|ch| !ch.is_alphanumeric()).unwrap_or(true);
		let after_ok =
			haystack[end..].chars().next().map(|ch| !ch.is_alphanumeric()).unwrap_or(true);

		if before_ok && after_ok {
			return true;
		}

		from = start + haystack[start..].chars().next().map(char::len_utf8).unwrap_or(1);
	}

	false
}

fn normalize_name(name: &str) -> String {
	name.trim().to_lowercase()
}

fn content_hash(snapshot: &MappingSnapshot) -> String {
	let mut hasher = blake3::Hasher::new();

	for name in &snapshot.canonical {
		hasher.update(b"c\0");
		hasher.update(name.as_bytes());
		hasher.update(b"\0");
	}
	for (alias, name) in &snapshot.aliases {
		hasher.update(b"a\0");
		hasher.update(alias.as_bytes());
		hasher.update(b"\0");
		hasher.update(name.as_bytes());
		hasher.update(b"\0");
	}
	for (group, members) in &snapshot.groups {
		hasher.update(b"g\0");
		hasher.update(group.as_bytes());

		for member in members {
			hasher.update(b"\0");
			hasher.update(member.as_bytes());
		}

		hasher.update(b"\0");
	}

	hasher.finalize().to_hex().to_string()
}
