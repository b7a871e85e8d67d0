use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use time::{OffsetDateTime, macros::datetime};
use uuid::Uuid;

use culprit_config::{Config, Weights};
use culprit_domain::{QueryKind, RawRecord};
use culprit_providers::tracker::SearchPage;
use culprit_service::{
	BoxFuture, Correlator, Error, JobRecord, JobStatus, ManualIncident, QueryStatus,
	TrackerProvider,
};

#[derive(Clone)]
enum Behavior {
	Records(Vec<RawRecord>),
	Fail(u16),
	/// Serves the first page, then answers every later page with 503.
	FailAfterFirstPage(Vec<RawRecord>),
	/// Answers 503 `failures` times, then serves the records.
	Flaky { failures: usize, records: Vec<RawRecord> },
	/// Holds every page for a moment and records how many requests overlap.
	Slow(Vec<RawRecord>),
	Hang,
}

struct FakeTracker {
	incident: Option<RawRecord>,
	window: Behavior,
	active: Behavior,
	open_ended: Behavior,
	search_calls: Arc<AtomicUsize>,
	flaky_calls: AtomicUsize,
	in_flight: AtomicUsize,
	peak_in_flight: Arc<AtomicUsize>,
}
impl FakeTracker {
	fn new(window: Behavior, active: Behavior, open_ended: Behavior) -> Self {
		Self {
			incident: Some(incident_record()),
			window,
			active,
			open_ended,
			search_calls: Arc::new(AtomicUsize::new(0)),
			flaky_calls: AtomicUsize::new(0),
			in_flight: AtomicUsize::new(0),
			peak_in_flight: Arc::new(AtomicUsize::new(0)),
		}
	}

	fn behavior(&self, jql: &str) -> Behavior {
		match kind_of(jql) {
			QueryKind::Window => self.window.clone(),
			QueryKind::ActiveAtAnchor => self.active.clone(),
			QueryKind::OpenEnded => self.open_ended.clone(),
		}
	}
}
impl TrackerProvider for FakeTracker {
	fn search_page<'a>(
		&'a self,
		jql: &'a str,
		start_at: u32,
		max_results: u32,
	) -> BoxFuture<'a, culprit_providers::Result<SearchPage>> {
		self.search_calls.fetch_add(1, Ordering::SeqCst);

		let behavior = self.behavior(jql);

		Box::pin(async move {
			match behavior {
				Behavior::Records(records) => Ok(page(&records, start_at, max_results)),
				Behavior::Fail(status) => Err(status_error(status)),
				Behavior::FailAfterFirstPage(records) if start_at == 0 =>
					Ok(page(&records, start_at, max_results)),
				Behavior::FailAfterFirstPage(_) => Err(status_error(503)),
				Behavior::Flaky { failures, records } => {
					if self.flaky_calls.fetch_add(1, Ordering::SeqCst) < failures {
						Err(status_error(503))
					} else {
						Ok(page(&records, start_at, max_results))
					}
				},
				Behavior::Slow(records) => {
					let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;

					self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
					tokio::time::sleep(Duration::from_millis(20)).await;
					self.in_flight.fetch_sub(1, Ordering::SeqCst);

					Ok(page(&records, start_at, max_results))
				},
				Behavior::Hang => std::future::pending().await,
			}
		})
	}

	fn fetch_record<'a>(
		&'a self,
		key: &'a str,
	) -> BoxFuture<'a, culprit_providers::Result<RawRecord>> {
		let found = self.incident.clone().filter(|record| record.key == key);

		Box::pin(async move { found.ok_or_else(|| status_error(404)) })
	}
}

fn kind_of(jql: &str) -> QueryKind {
	if jql.contains("IS EMPTY") {
		QueryKind::OpenEnded
	} else if jql.contains("\"End Date/Time\" >=") {
		QueryKind::ActiveAtAnchor
	} else {
		QueryKind::Window
	}
}

fn page(records: &[RawRecord], start_at: u32, max_results: u32) -> SearchPage {
	let start = (start_at as usize).min(records.len());
	let end = (start + max_results as usize).min(records.len());

	SearchPage {
		records: records[start..end].to_vec(),
		start_at,
		total: Some(records.len() as u32),
	}
}

fn status_error(status: u16) -> culprit_providers::Error {
	culprit_providers::Error::Status { status, message: "fake".to_string(), retry_after: None }
}

fn incident_record() -> RawRecord {
	RawRecord {
		key: "INC-1".to_string(),
		summary: "Billing errors on web042".to_string(),
		created: Some(datetime!(2025-03-14 10:00 UTC)),
		team: Some("Payments".to_string()),
		..RawRecord::default()
	}
}

fn change(key: &str, summary: &str, start: OffsetDateTime, end: OffsetDateTime) -> RawRecord {
	RawRecord {
		key: key.to_string(),
		summary: summary.to_string(),
		planned_start: Some(start),
		planned_end: Some(end),
		..RawRecord::default()
	}
}

fn matching_change() -> RawRecord {
	let mut record = change(
		"CHG-1",
		"Deploy billing-api to web042",
		datetime!(2025-03-14 09:00 UTC),
		datetime!(2025-03-14 11:00 UTC),
	);

	record.team = Some("Payments".to_string());

	record
}

fn unrelated_change() -> RawRecord {
	change(
		"CHG-2",
		"Rotate certificates",
		datetime!(2025-03-12 12:00 UTC),
		datetime!(2025-03-12 13:00 UTC),
	)
}

fn config(page_size: u32) -> Config {
	config_with(page_size, 2)
}

fn config_with(page_size: u32, concurrency: usize) -> Config {
	culprit_config::from_toml_str(&format!(
		r#"
[service]
log_level = "info"

[tracker]
api_base   = "https://tracker.example.com"
api_token  = "token"
timeout_ms = 1000

[extraction]
concurrency = {concurrency}
page_size   = {page_size}

[extraction.retry]
base_delay_ms = 1
jitter        = 0.0
max_attempts  = 3
max_delay_ms  = 5

[mapping.synonyms]
billing = ["billing-api", "invoicing"]
"#
	))
	.expect("Test config must load.")
}

fn correlator(tracker: FakeTracker) -> Correlator {
	Correlator::new(config(100), Arc::new(tracker))
}

async fn wait_until<F>(correlator: &Correlator, job_id: Uuid, done: F) -> JobRecord
where
	F: Fn(&JobRecord) -> bool,
{
	for _ in 0..500 {
		let job = correlator.job(job_id).await.expect("Job lookup failed.");

		if done(&job) {
			return job;
		}

		tokio::time::sleep(Duration::from_millis(10)).await;
	}

	panic!("Job {job_id} did not reach the expected state.");
}

async fn finished(correlator: &Correlator, job_id: Uuid) -> JobRecord {
	wait_until(correlator, job_id, |job| job.status.is_terminal()).await
}

#[tokio::test]
async fn duplicates_are_merged_and_the_incident_is_excluded() {
	let correlator = correlator(FakeTracker::new(
		Behavior::Records(vec![matching_change(), unrelated_change(), incident_record()]),
		Behavior::Records(vec![matching_change()]),
		Behavior::Records(Vec::new()),
	));
	let job_id = correlator.start_extraction("inc-1", None).await.expect("Start failed.");
	let job = finished(&correlator, job_id).await;

	assert_eq!(job.status, JobStatus::Completed);
	assert!(!job.partial);
	assert_eq!(job.progress.queries_total, 3);
	assert_eq!(job.progress.queries_done, 3);
	assert_eq!(job.progress.candidates, 2);
	assert!(job.queries.iter().all(|query| query.status == QueryStatus::Succeeded));

	let ranking = correlator.ranking(job_id, None).await.expect("Ranking failed.");

	assert_eq!(ranking.incident.key, "INC-1");
	assert_eq!(ranking.candidate_count, 2);
	assert_eq!(
		ranking.items.iter().map(|item| item.key.as_str()).collect::<Vec<_>>(),
		vec!["CHG-1", "CHG-2"]
	);
	assert_eq!(ranking.items[0].rank, 1);
	assert_eq!(ranking.items[0].sub_scores.service.score, 100.0);
}

#[tokio::test]
async fn all_queries_failing_fails_the_job() {
	let correlator = correlator(FakeTracker::new(
		Behavior::Fail(400),
		Behavior::Fail(400),
		Behavior::Fail(400),
	));
	let job_id = correlator.start_extraction("INC-1", None).await.expect("Start failed.");
	let job = finished(&correlator, job_id).await;

	assert_eq!(job.status, JobStatus::Failed);
	assert!(job.error.as_deref().is_some_and(|error| error.contains("400")));
	assert!(job.queries.iter().all(|query| query.status == QueryStatus::Failed));

	let err = correlator.ranking(job_id, None).await.expect_err("Expected not ready.");

	assert!(matches!(err, Error::NotReady { status: JobStatus::Failed, .. }));
}

#[tokio::test]
async fn some_queries_failing_completes_with_partial_flag() {
	let correlator = correlator(FakeTracker::new(
		Behavior::Records(vec![matching_change()]),
		Behavior::Fail(403),
		Behavior::Records(vec![unrelated_change()]),
	));
	let job_id = correlator.start_extraction("INC-1", None).await.expect("Start failed.");
	let job = finished(&correlator, job_id).await;

	assert_eq!(job.status, JobStatus::Completed);
	assert!(job.partial);
	assert_eq!(job.queries[1].kind, QueryKind::ActiveAtAnchor);
	assert_eq!(job.queries[1].status, QueryStatus::Failed);
	assert!(job.queries[1].error.is_some());

	let ranking = correlator.ranking(job_id, None).await.expect("Ranking failed.");

	assert!(ranking.partial);
	assert_eq!(ranking.candidate_count, 2);
}

#[tokio::test]
async fn query_failing_after_its_first_page_keeps_its_records() {
	let records = vec![
		matching_change(),
		unrelated_change(),
		change(
			"CHG-3",
			"Patch kernel",
			datetime!(2025-03-13 08:00 UTC),
			datetime!(2025-03-13 09:00 UTC),
		),
	];
	let correlator = Correlator::new(
		config(2),
		Arc::new(FakeTracker::new(
			Behavior::FailAfterFirstPage(records),
			Behavior::Records(Vec::new()),
			Behavior::Records(Vec::new()),
		)),
	);
	let job_id = correlator.start_extraction("INC-1", None).await.expect("Start failed.");
	let job = finished(&correlator, job_id).await;

	assert_eq!(job.status, JobStatus::Completed);
	assert!(job.partial);
	assert_eq!(job.queries[0].status, QueryStatus::Partial);
	assert_eq!(job.queries[0].records, 2);
	assert_eq!(job.progress.candidates, 2);
}

fn numbered_changes(count: usize) -> Vec<RawRecord> {
	(1..=count)
		.map(|n| {
			change(
				&format!("CHG-{}", 100 + n),
				"Rotate logs",
				datetime!(2025-03-14 08:00 UTC),
				datetime!(2025-03-14 09:00 UTC),
			)
		})
		.collect()
}

#[tokio::test]
async fn pagination_stops_at_max_results() {
	let tracker = FakeTracker::new(
		Behavior::Records(numbered_changes(5)),
		Behavior::Records(Vec::new()),
		Behavior::Records(Vec::new()),
	);
	let correlator = Correlator::new(config(2), Arc::new(tracker));
	let mut options = correlator.default_options().expect("Defaults must parse.");

	options.max_results = 3;

	let job_id = correlator.start_extraction("INC-1", Some(options)).await.expect("Start failed.");
	let job = finished(&correlator, job_id).await;

	assert_eq!(job.status, JobStatus::Completed);
	assert!(!job.partial);
	assert_eq!(job.queries[0].kind, QueryKind::Window);
	assert_eq!(job.queries[0].status, QueryStatus::Succeeded);
	assert_eq!(job.queries[0].records, 3);
	assert_eq!(job.queries[0].pages, 2);
	assert_eq!(job.progress.candidates, 3);
}

async fn peak_in_flight(concurrency: usize) -> usize {
	let tracker = FakeTracker::new(
		Behavior::Slow(vec![matching_change()]),
		Behavior::Slow(vec![unrelated_change()]),
		Behavior::Slow(Vec::new()),
	);
	let peak = tracker.peak_in_flight.clone();
	let correlator = Correlator::new(config_with(100, concurrency), Arc::new(tracker));
	let job_id = correlator.start_extraction("INC-1", None).await.expect("Start failed.");
	let job = finished(&correlator, job_id).await;

	assert_eq!(job.status, JobStatus::Completed);
	assert_eq!(job.progress.candidates, 2);

	peak.load(Ordering::SeqCst)
}

#[tokio::test]
async fn query_pool_is_bounded_by_concurrency() {
	assert_eq!(peak_in_flight(1).await, 1);
	assert_eq!(peak_in_flight(2).await, 2);
}

#[tokio::test]
async fn single_worker_holds_later_queries_behind_a_hung_one() {
	let tracker = FakeTracker::new(Behavior::Hang, Behavior::Hang, Behavior::Hang);
	let calls = tracker.search_calls.clone();
	let correlator = Correlator::new(config_with(100, 1), Arc::new(tracker));
	let job_id = correlator.start_extraction("INC-1", None).await.expect("Start failed.");

	wait_until(&correlator, job_id, |job| job.progress.queries_total == 3).await;
	tokio::time::sleep(Duration::from_millis(50)).await;

	assert_eq!(calls.load(Ordering::SeqCst), 1);

	correlator.cancel(job_id).await.expect("Cancel failed.");

	assert_eq!(finished(&correlator, job_id).await.status, JobStatus::Cancelled);
}

#[tokio::test]
async fn transient_errors_are_retried() {
	let tracker = FakeTracker::new(
		Behavior::Flaky { failures: 2, records: vec![matching_change()] },
		Behavior::Records(Vec::new()),
		Behavior::Records(Vec::new()),
	);
	let calls = tracker.search_calls.clone();
	let correlator = correlator(tracker);
	let job_id = correlator.start_extraction("INC-1", None).await.expect("Start failed.");
	let job = finished(&correlator, job_id).await;

	assert_eq!(job.status, JobStatus::Completed);
	assert!(!job.partial);
	assert_eq!(job.progress.candidates, 1);
	assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn fatal_errors_are_not_retried() {
	let tracker = FakeTracker::new(
		Behavior::Fail(404),
		Behavior::Records(vec![matching_change()]),
		Behavior::Records(Vec::new()),
	);
	let calls = tracker.search_calls.clone();
	let correlator = correlator(tracker);
	let job_id = correlator.start_extraction("INC-1", None).await.expect("Start failed.");
	let job = finished(&correlator, job_id).await;

	assert_eq!(job.status, JobStatus::Completed);
	assert!(job.partial);
	assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn missing_incident_fails_before_searching() {
	let mut tracker = FakeTracker::new(
		Behavior::Records(vec![matching_change()]),
		Behavior::Records(Vec::new()),
		Behavior::Records(Vec::new()),
	);

	tracker.incident = None;

	let calls = tracker.search_calls.clone();
	let correlator = correlator(tracker);
	let job_id = correlator.start_extraction("INC-1", None).await.expect("Start failed.");
	let job = finished(&correlator, job_id).await;

	assert_eq!(job.status, JobStatus::Failed);
	assert!(job.error.as_deref().is_some_and(|error| error.contains("INC-1")));
	assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancelling_a_running_job() {
	let correlator = correlator(FakeTracker::new(
		Behavior::Hang,
		Behavior::Records(Vec::new()),
		Behavior::Records(Vec::new()),
	));
	let job_id = correlator.start_extraction("INC-1", None).await.expect("Start failed.");

	wait_until(&correlator, job_id, |job| job.progress.queries_total == 3).await;
	correlator.cancel(job_id).await.expect("Cancel failed.");

	let job = finished(&correlator, job_id).await;

	assert_eq!(job.status, JobStatus::Cancelled);
	assert_eq!(job.error, None);
	assert!(matches!(
		correlator.ranking(job_id, None).await,
		Err(Error::NotReady { status: JobStatus::Cancelled, .. })
	));

	let again = correlator.cancel(job_id).await.expect("Cancel failed.");

	assert_eq!(again.status, JobStatus::Cancelled);
}

#[tokio::test]
async fn rescoring_is_deterministic() {
	let correlator = correlator(FakeTracker::new(
		Behavior::Records(vec![matching_change(), unrelated_change()]),
		Behavior::Records(Vec::new()),
		Behavior::Records(Vec::new()),
	));
	let job_id = correlator.start_extraction("INC-1", None).await.expect("Start failed.");

	finished(&correlator, job_id).await;

	let weights = Weights { time: 0.0, service: 1.0, infra: 0.0, org: 0.0 };
	let first = correlator.rescore(job_id, weights).await.expect("Rescore failed.");
	let second = correlator.rescore(job_id, weights).await.expect("Rescore failed.");

	assert_eq!(first, second);
	assert_eq!(first[0].key, "CHG-1");
	assert!(matches!(
		correlator.rescore(job_id, Weights { time: -1.0, ..weights }).await,
		Err(Error::InvalidRequest { .. })
	));
	assert_eq!(
		correlator.settings().weights().await.expect("Weights lookup failed."),
		Weights::default()
	);
}

#[tokio::test]
async fn candidate_lookup_ignores_case() {
	let correlator = correlator(FakeTracker::new(
		Behavior::Records(vec![matching_change(), unrelated_change()]),
		Behavior::Records(Vec::new()),
		Behavior::Records(Vec::new()),
	));
	let job_id = correlator.start_extraction("INC-1", None).await.expect("Start failed.");

	finished(&correlator, job_id).await;

	let detail = correlator.candidate_detail(job_id, "chg-1").await.expect("Detail failed.");

	assert_eq!(detail.candidate.key, "CHG-1");
	assert_eq!(detail.rank, Some(1));
	assert_eq!(detail.item.rank, 1);
	assert!(
		(detail.weights.time + detail.weights.service + detail.weights.infra + detail.weights.org
			- 1.0)
			.abs() < 1e-9
	);
	assert!(matches!(
		correlator.candidate_detail(job_id, "CHG-404").await,
		Err(Error::CandidateNotFound { .. })
	));
}

#[tokio::test]
async fn manual_extraction_uses_the_given_anchor() {
	let correlator = correlator(FakeTracker::new(
		Behavior::Records(vec![matching_change(), unrelated_change()]),
		Behavior::Records(Vec::new()),
		Behavior::Records(Vec::new()),
	));
	let incident = ManualIncident {
		anchor: datetime!(2025-03-14 10:00 UTC),
		summary: Some("Checkout failures".to_string()),
		services: vec!["Invoicing".to_string()],
		hosts: vec!["web042".to_string()],
		technologies: Vec::new(),
		team: Some("Payments".to_string()),
	};
	let job_id =
		correlator.start_manual_extraction(incident, None).await.expect("Start failed.");
	let job = finished(&correlator, job_id).await;

	assert_eq!(job.status, JobStatus::Completed);

	let ranking = correlator.ranking(job_id, Some(1)).await.expect("Ranking failed.");

	assert_eq!(ranking.incident.key, "MANUAL");
	assert_eq!(ranking.candidate_count, 2);
	assert_eq!(ranking.items.len(), 1);
	assert_eq!(ranking.items[0].key, "CHG-1");
	assert_eq!(ranking.items[0].sub_scores.service.score, 100.0);
}

#[tokio::test]
async fn malformed_requests_are_rejected() {
	let correlator = correlator(FakeTracker::new(
		Behavior::Records(Vec::new()),
		Behavior::Records(Vec::new()),
		Behavior::Records(Vec::new()),
	));

	assert!(matches!(
		correlator.start_extraction("not a key", None).await,
		Err(Error::InvalidRequest { .. })
	));

	let mut options = correlator.default_options().expect("Defaults must parse.");

	options.max_results = 0;

	assert!(matches!(
		correlator.start_extraction("INC-1", Some(options)).await,
		Err(Error::InvalidRequest { .. })
	));
	assert!(matches!(
		correlator.job(Uuid::new_v4()).await,
		Err(Error::JobNotFound { .. })
	));
	assert!(correlator.list_jobs().await.expect("List failed.").is_empty());
}

#[tokio::test]
async fn deleted_jobs_are_gone() {
	let correlator = correlator(FakeTracker::new(
		Behavior::Records(vec![matching_change()]),
		Behavior::Records(Vec::new()),
		Behavior::Records(Vec::new()),
	));
	let job_id = correlator.start_extraction("INC-1", None).await.expect("Start failed.");

	finished(&correlator, job_id).await;

	assert_eq!(correlator.list_jobs().await.expect("List failed.").len(), 1);

	correlator.delete(job_id).await.expect("Delete failed.");

	assert!(matches!(correlator.job(job_id).await, Err(Error::JobNotFound { .. })));
	assert!(matches!(correlator.delete(job_id).await, Err(Error::JobNotFound { .. })));
}
