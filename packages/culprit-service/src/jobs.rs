//! Extraction job records and the store that holds them.

use std::{collections::HashMap, fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use culprit_domain::SearchOptions;

use crate::{BoxFuture, Result, extractor::{ExtractionResult, QueryReport}};

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
	Pending,
	Running,
	Completed,
	Failed,
	Cancelled,
}
impl JobStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Pending => "pending",
			Self::Running => "running",
			Self::Completed => "completed",
			Self::Failed => "failed",
			Self::Cancelled => "cancelled",
		}
	}

	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
	}

	/// `pending -> running -> {completed, failed, cancelled}`, plus `pending -> cancelled`.
	pub fn can_transition_to(self, next: Self) -> bool {
		matches!(
			(self, next),
			(Self::Pending, Self::Running)
				| (Self::Pending, Self::Cancelled)
				| (Self::Running, Self::Completed)
				| (Self::Running, Self::Failed)
				| (Self::Running, Self::Cancelled)
		)
	}
}
impl fmt::Display for JobStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobSource {
	Tracker { incident_ref: String },
	Manual,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct JobProgress {
	pub queries_total: usize,
	pub queries_done: usize,
	pub pages_fetched: usize,
	pub records_fetched: usize,
	pub candidates: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct JobRecord {
	pub job_id: Uuid,
	pub source: JobSource,
	pub status: JobStatus,
	pub options: SearchOptions,
	pub progress: JobProgress,
	pub error: Option<String>,
	pub partial: bool,
	pub queries: Vec<QueryReport>,
	#[serde(with = "culprit_domain::time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(with = "culprit_domain::time_serde")]
	pub updated_at: OffsetDateTime,
	#[serde(skip)]
	pub result: Option<Arc<ExtractionResult>>,
}
impl JobRecord {
	pub fn new(source: JobSource, options: SearchOptions) -> Self {
		let now = OffsetDateTime::now_utc();

		Self {
			job_id: Uuid::new_v4(),
			source,
			status: JobStatus::Pending,
			options,
			progress: JobProgress::default(),
			error: None,
			partial: false,
			queries: Vec::new(),
			created_at: now,
			updated_at: now,
			result: None,
		}
	}
}

/// Terminal data written once when a job finishes.
#[derive(Clone, Debug, Default)]
pub struct JobOutcome {
	pub error: Option<String>,
	pub partial: bool,
	pub queries: Vec<QueryReport>,
	pub result: Option<Arc<ExtractionResult>>,
}

pub trait JobStore
where
	Self: Send + Sync,
{
	fn create<'a>(&'a self, job: JobRecord) -> BoxFuture<'a, Result<()>>;

	fn get<'a>(&'a self, job_id: Uuid) -> BoxFuture<'a, Result<Option<JobRecord>>>;

	/// Newest first.
	fn list<'a>(&'a self) -> BoxFuture<'a, Result<Vec<JobRecord>>>;

	/// Applies a status change when the state machine allows it. Returns `false` otherwise.
	fn transition<'a>(
		&'a self,
		job_id: Uuid,
		status: JobStatus,
		outcome: Option<JobOutcome>,
	) -> BoxFuture<'a, Result<bool>>;

	fn update_progress<'a>(
		&'a self,
		job_id: Uuid,
		progress: JobProgress,
	) -> BoxFuture<'a, Result<()>>;

	fn delete<'a>(&'a self, job_id: Uuid) -> BoxFuture<'a, Result<bool>>;
}

#[derive(Default)]
pub struct MemoryJobStore {
	jobs: RwLock<HashMap<Uuid, JobRecord>>,
}
impl MemoryJobStore {
	pub fn new() -> Self {
		Self::default()
	}
}
impl JobStore for MemoryJobStore {
	fn create<'a>(&'a self, job: JobRecord) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.jobs.write().await.insert(job.job_id, job);

			Ok(())
		})
	}

	fn get<'a>(&'a self, job_id: Uuid) -> BoxFuture<'a, Result<Option<JobRecord>>> {
		Box::pin(async move { Ok(self.jobs.read().await.get(&job_id).cloned()) })
	}

	fn list<'a>(&'a self) -> BoxFuture<'a, Result<Vec<JobRecord>>> {
		Box::pin(async move {
			let mut jobs: Vec<JobRecord> = self.jobs.read().await.values().cloned().collect();

			jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.job_id.cmp(&b.job_id)));

			Ok(jobs)
		})
	}

	fn transition<'a>(
		&'a self,
		job_id: Uuid,
		status: JobStatus,
		outcome: Option<JobOutcome>,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let mut jobs = self.jobs.write().await;
			let Some(job) = jobs.get_mut(&job_id) else {
				return Ok(false);
			};

			if !job.status.can_transition_to(status) {
				return Ok(false);
			}

			job.status = status;
			job.updated_at = OffsetDateTime::now_utc();

			if let Some(outcome) = outcome {
				job.error = outcome.error;
				job.partial = outcome.partial;
				job.queries = outcome.queries;
				job.result = outcome.result;
			}

			Ok(true)
		})
	}

	fn update_progress<'a>(
		&'a self,
		job_id: Uuid,
		progress: JobProgress,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			if let Some(job) = self.jobs.write().await.get_mut(&job_id) {
				job.progress = progress;
				job.updated_at = OffsetDateTime::now_utc();
			}

			Ok(())
		})
	}

	fn delete<'a>(&'a self, job_id: Uuid) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move { Ok(self.jobs.write().await.remove(&job_id).is_some()) })
	}
}

#[cfg(test)]
mod tests {
	use culprit_config::SearchDefaults;
	use culprit_domain::SearchOptions;

	use crate::jobs::{JobOutcome, JobRecord, JobSource, JobStatus, JobStore, MemoryJobStore};

	fn record() -> JobRecord {
		let options =
			SearchOptions::from_defaults(&SearchDefaults::default()).expect("Defaults must parse.");

		JobRecord::new(JobSource::Tracker { incident_ref: "INC-1".to_string() }, options)
	}

	#[test]
	fn state_machine_edges() {
		assert!(JobStatus::Pending.can_transition_to(JobStatus::Running));
		assert!(JobStatus::Pending.can_transition_to(JobStatus::Cancelled));
		assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
		assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
		assert!(!JobStatus::Cancelled.can_transition_to(JobStatus::Running));
		assert!(!JobStatus::Completed.can_transition_to(JobStatus::Cancelled));
	}

	#[tokio::test]
	async fn rejected_transitions_leave_the_record_alone() {
		let store = MemoryJobStore::new();
		let job = record();
		let job_id = job.job_id;

		store.create(job).await.expect("Create failed.");

		assert!(store.transition(job_id, JobStatus::Cancelled, None).await.expect("Transition failed."));
		assert!(
			!store
				.transition(
					job_id,
					JobStatus::Running,
					Some(JobOutcome { error: Some("late".to_string()), ..JobOutcome::default() })
				)
				.await
				.expect("Transition failed.")
		);

		let stored = store.get(job_id).await.expect("Get failed.").expect("Missing job.");

		assert_eq!(stored.status, JobStatus::Cancelled);
		assert_eq!(stored.error, None);
	}

	#[tokio::test]
	async fn delete_removes_the_record() {
		let store = MemoryJobStore::new();
		let job = record();
		let job_id = job.job_id;

		store.create(job).await.expect("Create failed.");

		assert!(store.delete(job_id).await.expect("Delete failed."));
		assert!(!store.delete(job_id).await.expect("Delete failed."));
		assert!(store.list().await.expect("List failed.").is_empty());
	}
}
