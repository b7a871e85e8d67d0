use std::time::Duration;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Tracker returned HTTP {status}: {message}")]
	Status { status: u16, message: String, retry_after: Option<Duration> },
	#[error("Tracker request timed out: {message}")]
	Timeout { message: String },
	#[error("Failed to connect to tracker: {message}")]
	Connect { message: String },
	#[error(transparent)]
	Reqwest(reqwest::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error(transparent)]
	InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),
	#[error(transparent)]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error("{message}")]
	InvalidConfig { message: String },
	#[error("{message}")]
	InvalidResponse { message: String },
}
impl Error {
	/// Rate limiting, gateway and server errors, timeouts and connection failures.
	pub fn is_transient(&self) -> bool {
		match self {
			Self::Status { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
			Self::Timeout { .. } | Self::Connect { .. } => true,
			Self::Reqwest(err) => err.is_request() || err.is_body(),
			_ => false,
		}
	}

	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::Status { retry_after, .. } => *retry_after,
			_ => None,
		}
	}
}
impl From<reqwest::Error> for Error {
	fn from(err: reqwest::Error) -> Self {
		if err.is_timeout() {
			Self::Timeout { message: err.to_string() }
		} else if err.is_connect() {
			Self::Connect { message: err.to_string() }
		} else if let Some(status) = err.status() {
			Self::Status { status: status.as_u16(), message: err.to_string(), retry_after: None }
		} else {
			Self::Reqwest(err)
		}
	}
}
