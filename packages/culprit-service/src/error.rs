use uuid::Uuid;

use crate::jobs::JobStatus;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Job {job_id} not found.")]
	JobNotFound { job_id: Uuid },
	#[error("Job {job_id} is not ready; status is {status}.")]
	NotReady { job_id: Uuid, status: JobStatus },
	#[error("Candidate {key} not found in job {job_id}.")]
	CandidateNotFound { job_id: Uuid, key: String },
	#[error("Extraction failed: {message}")]
	ExtractionFailed { message: String },
	#[error("Tracker error: {0}")]
	Tracker(#[from] culprit_providers::Error),
	/// Reported by `JobStore` and `SettingsStore` backends.
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl From<culprit_config::Error> for Error {
	fn from(err: culprit_config::Error) -> Self {
		match err {
			culprit_config::Error::Validation { message } => Self::InvalidRequest { message },
			other => Self::InvalidRequest { message: other.to_string() },
		}
	}
}
