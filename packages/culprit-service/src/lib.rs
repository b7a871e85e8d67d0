pub mod correlator;
pub mod extractor;
pub mod jobs;
pub mod retry;
pub mod settings;

mod error;

pub use correlator::{CandidateDetail, Correlator, ManualIncident, RankingResponse};
pub use error::{Error, Result};
pub use extractor::{
	ExtractionOutcome, ExtractionResult, Extractor, IncidentSource, QueryReport, QueryStatus,
};
pub use jobs::{JobProgress, JobRecord, JobSource, JobStatus, JobStore, MemoryJobStore};
pub use retry::{RetryError, RetryPolicy, Retryable, with_retry};
pub use settings::{MemorySettingsStore, Settings, SettingsStore};

use std::{future::Future, pin::Pin};

use reqwest::Client;

use culprit_config::Tracker;
use culprit_domain::RawRecord;
use culprit_providers::tracker::{self, SearchPage};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Paged search and single-record fetch against the change tracker.
pub trait TrackerProvider
where
	Self: Send + Sync,
{
	fn search_page<'a>(
		&'a self,
		jql: &'a str,
		start_at: u32,
		max_results: u32,
	) -> BoxFuture<'a, culprit_providers::Result<SearchPage>>;

	fn fetch_record<'a>(&'a self, key: &'a str)
	-> BoxFuture<'a, culprit_providers::Result<RawRecord>>;
}

pub struct HttpTrackerProvider {
	client: Client,
	cfg: Tracker,
}
impl HttpTrackerProvider {
	pub fn new(cfg: &Tracker) -> culprit_providers::Result<Self> {
		Ok(Self { client: culprit_providers::client(cfg)?, cfg: cfg.clone() })
	}
}
impl TrackerProvider for HttpTrackerProvider {
	fn search_page<'a>(
		&'a self,
		jql: &'a str,
		start_at: u32,
		max_results: u32,
	) -> BoxFuture<'a, culprit_providers::Result<SearchPage>> {
		Box::pin(tracker::search_page(&self.client, &self.cfg, jql, start_at, max_results))
	}

	fn fetch_record<'a>(
		&'a self,
		key: &'a str,
	) -> BoxFuture<'a, culprit_providers::Result<RawRecord>> {
		Box::pin(tracker::fetch_record(&self.client, &self.cfg, key))
	}
}
