//! Job lifecycle and ranking queries over completed extractions.

use std::{
	collections::HashMap,
	sync::{Arc, Mutex, MutexGuard},
};

use regex::Regex;
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use culprit_config::{Config, Weights};
use culprit_domain::{
	Candidate, Incident, MappingSnapshot, Normalizer, OrgInfo, RankingItem, SearchOptions,
	normalize_weights, rank_candidates, score_candidate,
};

use crate::{
	Error, Result, TrackerProvider,
	extractor::{ExtractionOutcome, ExtractionResult, Extractor, IncidentSource, ProgressEvent},
	jobs::{JobOutcome, JobProgress, JobRecord, JobSource, JobStatus, JobStore, MemoryJobStore},
	settings::{MemorySettingsStore, Settings, SettingsStore},
};

pub const MANUAL_INCIDENT_KEY: &str = "MANUAL";

const TRACKER_KEY_PATTERN: &str = r"^[A-Z][A-Z0-9_]*-[0-9]+$";

/// An incident described by hand instead of fetched from the tracker.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ManualIncident {
	#[serde(with = "culprit_domain::time_serde")]
	pub anchor: OffsetDateTime,
	#[serde(default)]
	pub summary: Option<String>,
	#[serde(default)]
	pub services: Vec<String>,
	#[serde(default)]
	pub hosts: Vec<String>,
	#[serde(default)]
	pub technologies: Vec<String>,
	#[serde(default)]
	pub team: Option<String>,
}
impl ManualIncident {
	fn into_incident(self) -> Incident {
		let anchor = self.anchor.to_offset(UtcOffset::UTC);

		Incident {
			key: MANUAL_INCIDENT_KEY.to_string(),
			summary: self.summary.unwrap_or_default(),
			anchor,
			created_at: None,
			first_impact: Some(anchor),
			services: clean_list(self.services, false),
			hosts: clean_list(self.hosts, true),
			technologies: clean_list(self.technologies, true),
			org: OrgInfo {
				team: self.team.map(|team| team.trim().to_string()).filter(|team| !team.is_empty()),
				..OrgInfo::default()
			},
			timeline_entries: 0,
		}
	}
}

#[derive(Clone, Debug, Serialize)]
pub struct RankingResponse {
	pub job_id: Uuid,
	pub incident: Incident,
	pub candidate_count: usize,
	pub partial: bool,
	pub mapping_version: String,
	pub items: Vec<RankingItem>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CandidateDetail {
	pub job_id: Uuid,
	/// Position in the full ranking. `None` when the candidate falls below the visibility floor.
	pub rank: Option<usize>,
	pub weights: Weights,
	pub item: RankingItem,
	pub candidate: Candidate,
	pub incident: Incident,
}

/// Starts extraction jobs in the background and answers ranking queries once they complete.
#[derive(Clone)]
pub struct Correlator {
	inner: Arc<Inner>,
}

struct Inner {
	cfg: Config,
	extractor: Extractor,
	jobs: Arc<dyn JobStore>,
	settings: Settings,
	running: Mutex<HashMap<Uuid, CancellationToken>>,
}

impl Correlator {
	/// In-memory job and settings stores seeded from `cfg`.
	pub fn new(cfg: Config, provider: Arc<dyn TrackerProvider>) -> Self {
		let settings =
			Arc::new(MemorySettingsStore::new(cfg.scoring.clone(), cfg.mapping.clone()));

		Self::with_stores(cfg, provider, Arc::new(MemoryJobStore::new()), settings)
	}

	pub fn with_stores(
		cfg: Config,
		provider: Arc<dyn TrackerProvider>,
		jobs: Arc<dyn JobStore>,
		settings: Arc<dyn SettingsStore>,
	) -> Self {
		let extractor = Extractor::new(provider, &cfg.extraction);
		let settings = Settings::new(settings, cfg.scoring.clone(), cfg.mapping.clone());

		Self {
			inner: Arc::new(Inner {
				cfg,
				extractor,
				jobs,
				settings,
				running: Mutex::new(HashMap::new()),
			}),
		}
	}

	pub fn settings(&self) -> &Settings {
		&self.inner.settings
	}

	/// Search options from the configured defaults.
	pub fn default_options(&self) -> Result<SearchOptions> {
		Ok(SearchOptions::from_defaults(&self.inner.cfg.search.defaults)?)
	}

	pub async fn start_extraction(
		&self,
		incident_ref: &str,
		options: Option<SearchOptions>,
	) -> Result<Uuid> {
		let key = incident_ref.trim().to_uppercase();

		if !is_tracker_key(&key) {
			return Err(Error::InvalidRequest {
				message: format!("Incident reference {incident_ref:?} must look like PROJECT-123."),
			});
		}

		let options = self.resolve_options(options)?;

		self.launch(
			JobSource::Tracker { incident_ref: key.clone() },
			IncidentSource::Tracker { key },
			options,
		)
		.await
	}

	pub async fn start_manual_extraction(
		&self,
		incident: ManualIncident,
		options: Option<SearchOptions>,
	) -> Result<Uuid> {
		let options = self.resolve_options(options)?;

		self.launch(JobSource::Manual, IncidentSource::Manual(incident.into_incident()), options)
			.await
	}

	pub async fn job(&self, job_id: Uuid) -> Result<JobRecord> {
		self.inner.jobs.get(job_id).await?.ok_or(Error::JobNotFound { job_id })
	}

	pub async fn list_jobs(&self) -> Result<Vec<JobRecord>> {
		self.inner.jobs.list().await
	}

	/// Requests cancellation. Finished jobs are returned unchanged.
	pub async fn cancel(&self, job_id: Uuid) -> Result<JobRecord> {
		let job = self.job(job_id).await?;

		if job.status.is_terminal() {
			return Ok(job);
		}

		let token = self.running().get(&job_id).cloned();

		if let Some(token) = token {
			token.cancel();
		}
		if job.status == JobStatus::Pending {
			self.inner.jobs.transition(job_id, JobStatus::Cancelled, None).await?;
		}

		tracing::info!(job_id = %job_id, "Cancellation requested.");

		self.job(job_id).await
	}

	/// Cancels the job if it is still active, then forgets it.
	pub async fn delete(&self, job_id: Uuid) -> Result<()> {
		let token = self.running().remove(&job_id);

		if let Some(token) = token {
			token.cancel();
		}
		if !self.inner.jobs.delete(job_id).await? {
			return Err(Error::JobNotFound { job_id });
		}

		tracing::info!(job_id = %job_id, "Job deleted.");

		Ok(())
	}

	/// Ranks the job's candidates with the current scoring settings.
	///
	/// `top` defaults to the configured top-N and must be positive when given.
	pub async fn ranking(&self, job_id: Uuid, top: Option<usize>) -> Result<RankingResponse> {
		if top == Some(0) {
			return Err(Error::InvalidRequest { message: "top must be greater than zero.".to_string() });
		}

		let result = self.completed(job_id).await?;
		let scoring = self.inner.settings.scoring().await?;
		let top = top.unwrap_or(scoring.top_results as usize);
		let items = rank_candidates(
			&result.incident,
			&result.candidates,
			&result.mapping,
			&scoring,
			Some(top),
		);

		Ok(RankingResponse {
			job_id,
			incident: result.incident.clone(),
			candidate_count: result.candidates.len(),
			partial: result.partial,
			mapping_version: result.mapping.version().to_string(),
			items,
		})
	}

	/// Full ranking under `weights` without storing them.
	pub async fn rescore(&self, job_id: Uuid, weights: Weights) -> Result<Vec<RankingItem>> {
		culprit_config::validate_weights(&weights)?;

		let result = self.completed(job_id).await?;
		let mut scoring = self.inner.settings.scoring().await?;

		scoring.weights = weights;

		Ok(rank_candidates(&result.incident, &result.candidates, &result.mapping, &scoring, None))
	}

	/// Per-dimension breakdown for one candidate. The key is matched case-insensitively.
	pub async fn candidate_detail(&self, job_id: Uuid, key: &str) -> Result<CandidateDetail> {
		let result = self.completed(job_id).await?;
		let wanted = key.trim();
		let Some(candidate) =
			result.candidates.iter().find(|candidate| candidate.key.eq_ignore_ascii_case(wanted))
		else {
			return Err(Error::CandidateNotFound { job_id, key: wanted.to_string() });
		};
		let scoring = self.inner.settings.scoring().await?;
		let weights = normalize_weights(&scoring.weights);
		let rank = rank_candidates(
			&result.incident,
			&result.candidates,
			&result.mapping,
			&scoring,
			None,
		)
		.into_iter()
		.find(|item| item.key == candidate.key)
		.map(|item| item.rank);
		let mut item =
			score_candidate(&result.incident, candidate, &result.mapping, &scoring, &weights);

		item.rank = rank.unwrap_or(0);

		Ok(CandidateDetail {
			job_id,
			rank,
			weights,
			item,
			candidate: candidate.clone(),
			incident: result.incident.clone(),
		})
	}

	fn resolve_options(&self, options: Option<SearchOptions>) -> Result<SearchOptions> {
		let mut options = match options {
			Some(options) => options,
			None => self.default_options()?,
		};

		options.project = options.project.trim().to_uppercase();
		options.extra_filter = options.extra_filter.trim().to_string();
		options.validate()?;

		Ok(options)
	}

	async fn completed(&self, job_id: Uuid) -> Result<Arc<ExtractionResult>> {
		let job = self.job(job_id).await?;

		match (job.status, job.result) {
			(JobStatus::Completed, Some(result)) => Ok(result),
			(status, _) => Err(Error::NotReady { job_id, status }),
		}
	}

	async fn launch(
		&self,
		source: JobSource,
		incident: IncidentSource,
		options: SearchOptions,
	) -> Result<Uuid> {
		let job = JobRecord::new(source, options.clone());
		let job_id = job.job_id;
		let cancel = CancellationToken::new();

		self.inner.jobs.create(job).await?;
		self.running().insert(job_id, cancel.clone());

		let this = self.clone();
		let span = tracing::info_span!("extraction", job_id = %job_id);

		tokio::spawn(
			async move {
				if let Err(err) = this.execute(job_id, incident, &options, &cancel).await {
					tracing::error!(error = %err, "Extraction job failed.");

					let outcome = JobOutcome { error: Some(err.to_string()), ..JobOutcome::default() };

					if let Err(err) =
						this.inner.jobs.transition(job_id, JobStatus::Failed, Some(outcome)).await
					{
						tracing::error!(error = %err, "Failed to record job failure.");
					}
				}

				this.running().remove(&job_id);
			}
			.instrument(span),
		);

		tracing::info!(job_id = %job_id, "Extraction job queued.");

		Ok(job_id)
	}

	async fn execute(
		&self,
		job_id: Uuid,
		source: IncidentSource,
		options: &SearchOptions,
		cancel: &CancellationToken,
	) -> Result<()> {
		let jobs = &self.inner.jobs;

		if cancel.is_cancelled() || !jobs.transition(job_id, JobStatus::Running, None).await? {
			return Ok(());
		}

		let mapping = MappingSnapshot::new(&self.inner.settings.mapping().await?);
		let normalizer = Normalizer::new(&self.inner.cfg.extraction, mapping).map_err(|err| {
			Error::InvalidRequest { message: format!("Invalid host pattern: {err}") }
		})?;
		let (tx, mut rx) = mpsc::unbounded_channel();
		let mut progress = JobProgress::default();
		let extraction = self.inner.extractor.extract(
			source,
			options,
			&self.inner.cfg.search,
			&normalizer,
			cancel,
			&tx,
		);

		tokio::pin!(extraction);

		let outcome = loop {
			tokio::select! {
				outcome = &mut extraction => break outcome,
				Some(event) = rx.recv() => {
					apply_progress(&mut progress, event);
					jobs.update_progress(job_id, progress).await?;
				},
			}
		};

		while let Ok(event) = rx.try_recv() {
			apply_progress(&mut progress, event);
		}

		match outcome {
			ExtractionOutcome::Completed { result, reports } => {
				progress.candidates = result.candidates.len();
				jobs.update_progress(job_id, progress).await?;

				if result.partial {
					tracing::warn!(
						candidates = result.candidates.len(),
						"Extraction completed with failed queries."
					);
				} else {
					tracing::info!(candidates = result.candidates.len(), "Extraction completed.");
				}

				let outcome = JobOutcome {
					error: None,
					partial: result.partial,
					queries: reports,
					result: Some(Arc::new(result)),
				};

				jobs.transition(job_id, JobStatus::Completed, Some(outcome)).await?;
			},
			ExtractionOutcome::Failed { error, reports } => {
				jobs.update_progress(job_id, progress).await?;
				tracing::error!(error = %error, "Extraction failed.");

				let outcome = JobOutcome { error: Some(error), queries: reports, ..JobOutcome::default() };

				jobs.transition(job_id, JobStatus::Failed, Some(outcome)).await?;
			},
			ExtractionOutcome::Cancelled { reports } => {
				jobs.update_progress(job_id, progress).await?;
				tracing::info!("Extraction cancelled.");

				let outcome = JobOutcome { queries: reports, ..JobOutcome::default() };

				jobs.transition(job_id, JobStatus::Cancelled, Some(outcome)).await?;
			},
		}

		Ok(())
	}

	fn running(&self) -> MutexGuard<'_, HashMap<Uuid, CancellationToken>> {
		self.inner.running.lock().unwrap_or_else(|err| err.into_inner())
	}
}

fn apply_progress(progress: &mut JobProgress, event: ProgressEvent) {
	match event {
		ProgressEvent::Planned { queries } => progress.queries_total = queries,
		ProgressEvent::Page { records } => {
			progress.pages_fetched += 1;
			progress.records_fetched += records;
		},
		ProgressEvent::QueryDone => progress.queries_done += 1,
	}
}

/// `PROJECT-123`: a letter, then letters, digits or underscores, a dash, and digits.
fn is_tracker_key(key: &str) -> bool {
	Regex::new(TRACKER_KEY_PATTERN).map(|re| re.is_match(key)).unwrap_or(false)
}

fn clean_list(values: Vec<String>, lowercase: bool) -> Vec<String> {
	let mut out: Vec<String> = Vec::with_capacity(values.len());

	for value in values {
		let value = value.trim();
		let value = if lowercase { value.to_lowercase() } else { value.to_string() };

		if !value.is_empty() && !out.contains(&value) {
			out.push(value);
		}
	}

	out
}
