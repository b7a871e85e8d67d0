//! Runtime-editable scoring parameters and mapping tables.
//!
//! Every value starts from the loaded configuration and can be read, replaced, or reset to
//! that starting value. Replacements are validated with the same rules as the config file.

use std::{collections::BTreeMap, sync::Arc};

use tokio::sync::{Mutex, RwLock};

use culprit_config::{Bonuses, Mapping, Penalties, Scoring, Thresholds, Weights};

use crate::{BoxFuture, Result};

pub trait SettingsStore
where
	Self: Send + Sync,
{
	fn scoring<'a>(&'a self) -> BoxFuture<'a, Result<Scoring>>;

	fn set_scoring<'a>(&'a self, scoring: Scoring) -> BoxFuture<'a, Result<()>>;

	fn mapping<'a>(&'a self) -> BoxFuture<'a, Result<Mapping>>;

	fn set_mapping<'a>(&'a self, mapping: Mapping) -> BoxFuture<'a, Result<()>>;
}

pub struct MemorySettingsStore {
	scoring: RwLock<Scoring>,
	mapping: RwLock<Mapping>,
}
impl MemorySettingsStore {
	pub fn new(scoring: Scoring, mapping: Mapping) -> Self {
		Self { scoring: RwLock::new(scoring), mapping: RwLock::new(mapping) }
	}
}
impl SettingsStore for MemorySettingsStore {
	fn scoring<'a>(&'a self) -> BoxFuture<'a, Result<Scoring>> {
		Box::pin(async move { Ok(self.scoring.read().await.clone()) })
	}

	fn set_scoring<'a>(&'a self, scoring: Scoring) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			*self.scoring.write().await = scoring;

			Ok(())
		})
	}

	fn mapping<'a>(&'a self) -> BoxFuture<'a, Result<Mapping>> {
		Box::pin(async move { Ok(self.mapping.read().await.clone()) })
	}

	fn set_mapping<'a>(&'a self, mapping: Mapping) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			*self.mapping.write().await = mapping;

			Ok(())
		})
	}
}

/// Validated get/set/reset access over a [`SettingsStore`].
#[derive(Clone)]
pub struct Settings {
	store: Arc<dyn SettingsStore>,
	initial_scoring: Scoring,
	initial_mapping: Mapping,
	writes: Arc<Mutex<()>>,
}
impl Settings {
	pub fn new(store: Arc<dyn SettingsStore>, initial_scoring: Scoring, initial_mapping: Mapping) -> Self {
		Self { store, initial_scoring, initial_mapping, writes: Arc::new(Mutex::new(())) }
	}

	pub async fn scoring(&self) -> Result<Scoring> {
		self.store.scoring().await
	}

	pub async fn mapping(&self) -> Result<Mapping> {
		self.store.mapping().await
	}

	pub async fn weights(&self) -> Result<Weights> {
		Ok(self.scoring().await?.weights)
	}

	pub async fn set_weights(&self, weights: Weights) -> Result<Weights> {
		culprit_config::validate_weights(&weights)?;
		self.update_scoring(|scoring| scoring.weights = weights).await?;

		Ok(weights)
	}

	pub async fn reset_weights(&self) -> Result<Weights> {
		self.set_weights(self.initial_scoring.weights).await
	}

	pub async fn penalties(&self) -> Result<Penalties> {
		Ok(self.scoring().await?.penalties)
	}

	pub async fn set_penalties(&self, penalties: Penalties) -> Result<Penalties> {
		culprit_config::validate_penalties(&penalties)?;
		self.update_scoring(|scoring| scoring.penalties = penalties).await?;

		Ok(penalties)
	}

	pub async fn reset_penalties(&self) -> Result<Penalties> {
		self.set_penalties(self.initial_scoring.penalties).await
	}

	pub async fn bonuses(&self) -> Result<Bonuses> {
		Ok(self.scoring().await?.bonuses)
	}

	pub async fn set_bonuses(&self, bonuses: Bonuses) -> Result<Bonuses> {
		culprit_config::validate_bonuses(&bonuses)?;
		self.update_scoring(|scoring| scoring.bonuses = bonuses).await?;

		Ok(bonuses)
	}

	pub async fn reset_bonuses(&self) -> Result<Bonuses> {
		self.set_bonuses(self.initial_scoring.bonuses).await
	}

	pub async fn thresholds(&self) -> Result<Thresholds> {
		Ok(self.scoring().await?.thresholds)
	}

	pub async fn set_thresholds(&self, thresholds: Thresholds) -> Result<Thresholds> {
		culprit_config::validate_thresholds(&thresholds)?;
		self.update_scoring(|scoring| scoring.thresholds = thresholds).await?;

		Ok(thresholds)
	}

	pub async fn reset_thresholds(&self) -> Result<Thresholds> {
		self.set_thresholds(self.initial_scoring.thresholds).await
	}

	pub async fn top_results(&self) -> Result<u32> {
		Ok(self.scoring().await?.top_results)
	}

	pub async fn set_top_results(&self, top_results: u32) -> Result<u32> {
		culprit_config::validate_top_results(top_results)?;
		self.update_scoring(|scoring| scoring.top_results = top_results).await?;

		Ok(top_results)
	}

	pub async fn reset_top_results(&self) -> Result<u32> {
		self.set_top_results(self.initial_scoring.top_results).await
	}

	pub async fn synonyms(&self) -> Result<BTreeMap<String, Vec<String>>> {
		Ok(self.mapping().await?.synonyms)
	}

	pub async fn set_synonyms(
		&self,
		synonyms: BTreeMap<String, Vec<String>>,
	) -> Result<BTreeMap<String, Vec<String>>> {
		let mapping = self.update_mapping(|mapping| mapping.synonyms = synonyms).await?;

		Ok(mapping.synonyms)
	}

	pub async fn reset_synonyms(&self) -> Result<BTreeMap<String, Vec<String>>> {
		self.set_synonyms(self.initial_mapping.synonyms.clone()).await
	}

	pub async fn groups(&self) -> Result<BTreeMap<String, Vec<String>>> {
		Ok(self.mapping().await?.groups)
	}

	pub async fn set_groups(
		&self,
		groups: BTreeMap<String, Vec<String>>,
	) -> Result<BTreeMap<String, Vec<String>>> {
		let mapping = self.update_mapping(|mapping| mapping.groups = groups).await?;

		Ok(mapping.groups)
	}

	pub async fn reset_groups(&self) -> Result<BTreeMap<String, Vec<String>>> {
		self.set_groups(self.initial_mapping.groups.clone()).await
	}

	async fn update_scoring<F>(&self, apply: F) -> Result<()>
	where
		F: FnOnce(&mut Scoring),
	{
		let _guard = self.writes.lock().await;
		let mut scoring = self.store.scoring().await?;

		apply(&mut scoring);

		self.store.set_scoring(scoring).await
	}

	async fn update_mapping<F>(&self, apply: F) -> Result<Mapping>
	where
		F: FnOnce(&mut Mapping),
	{
		let _guard = self.writes.lock().await;
		let mut mapping = self.store.mapping().await?;

		apply(&mut mapping);
		culprit_config::validate_mapping(&mapping)?;
		culprit_config::normalize_mapping(&mut mapping);
		self.store.set_mapping(mapping.clone()).await?;

		Ok(mapping)
	}
}

#[cfg(test)]
mod tests {
	use std::{collections::BTreeMap, sync::Arc};

	use culprit_config::{Mapping, Scoring, Weights};

	use crate::{
		Error,
		settings::{MemorySettingsStore, Settings},
	};

	fn settings() -> Settings {
		let store = Arc::new(MemorySettingsStore::new(Scoring::default(), Mapping::default()));

		Settings::new(store, Scoring::default(), Mapping::default())
	}

	#[tokio::test]
	async fn weights_round_trip_through_reset() {
		let settings = settings();
		let custom = Weights { time: 1.0, service: 0.0, infra: 0.0, org: 0.0 };

		settings.set_weights(custom).await.expect("Set failed.");

		assert_eq!(settings.weights().await.expect("Get failed."), custom);
		assert_eq!(settings.reset_weights().await.expect("Reset failed."), Weights::default());
		assert_eq!(settings.weights().await.expect("Get failed."), Weights::default());
	}

	#[tokio::test]
	async fn invalid_values_are_rejected_without_writing() {
		let settings = settings();
		let err = settings
			.set_weights(Weights { time: -1.0, ..Weights::default() })
			.await
			.expect_err("Expected validation error.");

		assert!(matches!(err, Error::InvalidRequest { .. }));
		assert_eq!(settings.weights().await.expect("Get failed."), Weights::default());
		assert!(settings.set_top_results(2).await.is_err());
	}

	#[tokio::test]
	async fn synonyms_are_normalized_on_write() {
		let settings = settings();
		let stored = settings
			.set_synonyms(BTreeMap::from([(
				" Billing ".to_string(),
				vec!["Billing-API".to_string(), "invoicing".to_string()],
			)]))
			.await
			.expect("Set failed.");

		assert_eq!(
			stored.get("billing"),
			Some(&vec!["billing-api".to_string(), "invoicing".to_string()])
		);
	}
}
