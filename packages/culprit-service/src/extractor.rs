//! Concurrent, paginated, retried execution of a query plan.

use std::{collections::HashSet, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::{
	sync::{Semaphore, mpsc::UnboundedSender},
	task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use culprit_config::{Extraction, Search};
use culprit_domain::{
	Candidate, Incident, MappingSnapshot, Normalizer, PlannedQuery, QueryKind, RawRecord,
	SearchOptions, plan_queries,
};

use crate::{
	TrackerProvider,
	retry::{RetryError, RetryPolicy, with_retry},
};

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
	Succeeded,
	/// Failed after at least one page; the fetched records are kept.
	Partial,
	Failed,
	Cancelled,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct QueryReport {
	pub kind: QueryKind,
	pub jql: String,
	pub status: QueryStatus,
	pub pages: usize,
	pub records: usize,
	pub error: Option<String>,
}

#[derive(Debug)]
pub struct QueryOutcome {
	pub report: QueryReport,
	pub records: Vec<RawRecord>,
}
impl QueryOutcome {
	fn aborted(query: &PlannedQuery) -> Self {
		Self {
			report: QueryReport {
				kind: query.kind,
				jql: query.jql.clone(),
				status: QueryStatus::Failed,
				pages: 0,
				records: 0,
				error: Some("Query task aborted.".to_string()),
			},
			records: Vec::new(),
		}
	}
}

/// The incident, its deduplicated candidates and the mapping snapshot they were built with.
#[derive(Clone, Debug)]
pub struct ExtractionResult {
	pub incident: Incident,
	pub candidates: Vec<Candidate>,
	pub mapping: MappingSnapshot,
	pub partial: bool,
}

#[derive(Debug)]
pub enum ExtractionOutcome {
	Completed { result: ExtractionResult, reports: Vec<QueryReport> },
	Failed { error: String, reports: Vec<QueryReport> },
	Cancelled { reports: Vec<QueryReport> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
	Planned { queries: usize },
	Page { records: usize },
	QueryDone,
}

#[derive(Clone, Debug)]
pub enum IncidentSource {
	Tracker { key: String },
	Manual(Incident),
}

#[derive(Clone)]
pub struct Extractor {
	provider: Arc<dyn TrackerProvider>,
	policy: RetryPolicy,
	concurrency: usize,
	page_size: u32,
}
impl Extractor {
	pub fn new(provider: Arc<dyn TrackerProvider>, cfg: &Extraction) -> Self {
		Self {
			provider,
			policy: RetryPolicy::from_config(&cfg.retry),
			concurrency: cfg.concurrency.max(1),
			page_size: cfg.page_size.max(1),
		}
	}

	pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
		self.policy = policy;

		self
	}

	/// Resolves the incident, plans and runs its queries, and merges the results.
	pub async fn extract(
		&self,
		source: IncidentSource,
		options: &SearchOptions,
		search: &Search,
		normalizer: &Normalizer,
		cancel: &CancellationToken,
		progress: &UnboundedSender<ProgressEvent>,
	) -> ExtractionOutcome {
		let incident = match source {
			IncidentSource::Manual(incident) => incident,
			IncidentSource::Tracker { key } => {
				let fetched = with_retry(&self.policy, cancel, "incident", |_| {
					self.provider.fetch_record(&key)
				})
				.await;

				match fetched {
					Ok(raw) => match normalizer.incident(&raw) {
						Some(incident) => incident,
						None => {
							return ExtractionOutcome::Failed {
								error: format!("Incident {key} has no creation or impact time."),
								reports: Vec::new(),
							};
						},
					},
					Err(RetryError::Cancelled) => {
						return ExtractionOutcome::Cancelled { reports: Vec::new() };
					},
					Err(RetryError::Failed { error, .. }) => {
						return ExtractionOutcome::Failed {
							error: format!("Failed to fetch incident {key}: {error}"),
							reports: Vec::new(),
						};
					},
				}
			},
		};
		let plan = plan_queries(incident.anchor, options, search);

		let _ = progress.send(ProgressEvent::Planned { queries: plan.len() });

		tracing::info!(
			incident = %incident.key,
			queries = plan.len(),
			mapping_version = normalizer.mapping().version(),
			"Extraction planned."
		);

		let outcomes = self.run(&plan, cancel, progress).await;

		if cancel.is_cancelled()
			|| outcomes.iter().any(|outcome| outcome.report.status == QueryStatus::Cancelled)
		{
			return ExtractionOutcome::Cancelled {
				reports: outcomes.into_iter().map(|outcome| outcome.report).collect(),
			};
		}

		let failed: Vec<&QueryReport> = outcomes
			.iter()
			.map(|outcome| &outcome.report)
			.filter(|report| report.status == QueryStatus::Failed)
			.collect();

		if !plan.is_empty() && failed.len() == plan.len() {
			let error = failed
				.last()
				.and_then(|report| report.error.clone())
				.unwrap_or_else(|| "All queries failed.".to_string());

			return ExtractionOutcome::Failed {
				error,
				reports: outcomes.into_iter().map(|outcome| outcome.report).collect(),
			};
		}

		let partial = outcomes.iter().any(|outcome| {
			matches!(outcome.report.status, QueryStatus::Failed | QueryStatus::Partial)
		});
		let (candidates, reports) = merge(outcomes, Some(&incident.key), normalizer);

		ExtractionOutcome::Completed {
			result: ExtractionResult {
				incident,
				candidates,
				mapping: normalizer.mapping().clone(),
				partial,
			},
			reports,
		}
	}

	/// One task per query on a bounded pool. Outcomes come back in plan order.
	pub async fn run(
		&self,
		plan: &[PlannedQuery],
		cancel: &CancellationToken,
		progress: &UnboundedSender<ProgressEvent>,
	) -> Vec<QueryOutcome> {
		let semaphore = Arc::new(Semaphore::new(self.concurrency));
		let mut tasks = JoinSet::new();

		for (idx, query) in plan.iter().cloned().enumerate() {
			let provider = self.provider.clone();
			let semaphore = semaphore.clone();
			let cancel = cancel.clone();
			let progress = progress.clone();
			let policy = self.policy;
			let page_size = self.page_size;
			let span = tracing::info_span!("query", kind = query.kind.as_str());

			tasks.spawn(
				async move {
					let Ok(_permit) = semaphore.acquire_owned().await else {
						return (idx, QueryOutcome::aborted(&query));
					};
					let outcome = fetch_query(
						provider.as_ref(),
						&policy,
						page_size,
						query,
						&cancel,
						&progress,
					)
					.await;

					let _ = progress.send(ProgressEvent::QueryDone);

					(idx, outcome)
				}
				.instrument(span),
			);
		}

		let mut slots: Vec<Option<QueryOutcome>> = plan.iter().map(|_| None).collect();

		while let Some(joined) = tasks.join_next().await {
			match joined {
				Ok((idx, outcome)) => slots[idx] = Some(outcome),
				Err(err) => tracing::error!(error = %err, "Query task did not finish."),
			}
		}

		slots
			.into_iter()
			.zip(plan)
			.map(|(slot, query)| slot.unwrap_or_else(|| QueryOutcome::aborted(query)))
			.collect()
	}
}

enum Stop {
	Exhausted,
	Cancelled,
	Failed(String),
}

async fn fetch_query(
	provider: &dyn TrackerProvider,
	policy: &RetryPolicy,
	page_size: u32,
	query: PlannedQuery,
	cancel: &CancellationToken,
	progress: &UnboundedSender<ProgressEvent>,
) -> QueryOutcome {
	let label = query.kind.as_str();
	let limit = query.max_results as usize;
	let mut records: Vec<RawRecord> = Vec::new();
	let mut pages = 0;
	let mut start_at: u32 = 0;
	let stop = loop {
		let remaining = limit.saturating_sub(records.len());

		if remaining == 0 {
			break Stop::Exhausted;
		}

		let size = page_size.min(u32::try_from(remaining).unwrap_or(u32::MAX));
		let fetched =
			with_retry(policy, cancel, label, |_| provider.search_page(&query.jql, start_at, size))
				.await;
		let page = match fetched {
			Ok(page) => page,
			Err(RetryError::Cancelled) => break Stop::Cancelled,
			Err(RetryError::Failed { error, attempts }) => {
				tracing::warn!(query = label, attempts, error = %error, "Query failed.");

				break Stop::Failed(error.to_string());
			},
		};
		let len = page.records.len();

		pages += 1;
		records.extend(page.records.into_iter().take(remaining));

		let _ = progress.send(ProgressEvent::Page { records: len.min(remaining) });

		if len == 0 {
			break Stop::Exhausted;
		}

		start_at = start_at.saturating_add(u32::try_from(len).unwrap_or(u32::MAX));

		if page.total.is_some_and(|total| start_at >= total) {
			break Stop::Exhausted;
		}
	};
	let (status, error) = match stop {
		Stop::Exhausted => (QueryStatus::Succeeded, None),
		Stop::Cancelled => (QueryStatus::Cancelled, None),
		Stop::Failed(error) if pages == 0 => (QueryStatus::Failed, Some(error)),
		Stop::Failed(error) => (QueryStatus::Partial, Some(error)),
	};

	tracing::debug!(query = label, pages, records = records.len(), status = ?status, "Query finished.");

	QueryOutcome {
		report: QueryReport {
			kind: query.kind,
			jql: query.jql,
			status,
			pages,
			records: records.len(),
			error,
		},
		records,
	}
}

/// Normalizes records in plan order, keeping the first occurrence of each key and dropping
/// `exclude` (the incident itself).
pub fn merge(
	outcomes: Vec<QueryOutcome>,
	exclude: Option<&str>,
	normalizer: &Normalizer,
) -> (Vec<Candidate>, Vec<QueryReport>) {
	let mut seen = HashSet::new();
	let mut candidates = Vec::new();
	let mut reports = Vec::with_capacity(outcomes.len());

	for outcome in outcomes {
		for record in &outcome.records {
			let key = record.key.trim().to_uppercase();

			if key.is_empty() || exclude.is_some_and(|excluded| excluded.eq_ignore_ascii_case(&key))
			{
				continue;
			}
			if !seen.insert(key) {
				continue;
			}

			candidates.push(normalizer.candidate(record));
		}

		reports.push(outcome.report);
	}

	(candidates, reports)
}
