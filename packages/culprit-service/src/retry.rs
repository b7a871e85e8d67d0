use std::{fmt::Display, future::Future, time::Duration};

use tokio_util::sync::CancellationToken;

use culprit_config::Retry;

const MAX_BACKOFF_EXPONENT: u32 = 6;

/// Errors that can tell a retry loop whether another attempt may succeed.
pub trait Retryable {
	fn is_transient(&self) -> bool;

	fn retry_after(&self) -> Option<Duration> {
		None
	}
}
impl Retryable for culprit_providers::Error {
	fn is_transient(&self) -> bool {
		culprit_providers::Error::is_transient(self)
	}

	fn retry_after(&self) -> Option<Duration> {
		culprit_providers::Error::retry_after(self)
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
	pub max_attempts: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
	pub jitter: f64,
}
impl RetryPolicy {
	pub fn from_config(cfg: &Retry) -> Self {
		Self {
			max_attempts: cfg.max_attempts.max(1),
			base_delay: Duration::from_millis(cfg.base_delay_ms),
			max_delay: Duration::from_millis(cfg.max_delay_ms),
			jitter: cfg.jitter.clamp(0.0, 1.0),
		}
	}

	/// Delay before the attempt following `attempt` (1-based), without jitter.
	///
	/// A server-provided `Retry-After` replaces the exponential step but is still capped.
	pub fn backoff(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
		if let Some(hint) = retry_after {
			return hint.min(self.max_delay);
		}

		let exp = attempt.max(1).saturating_sub(1).min(MAX_BACKOFF_EXPONENT);

		self.base_delay.saturating_mul(1 << exp).min(self.max_delay)
	}

	fn with_jitter(&self, delay: Duration) -> Duration {
		if self.jitter <= 0.0 || delay.is_zero() {
			return delay;
		}

		let extra = delay.as_secs_f64() * self.jitter * rand::random::<f64>();

		(delay + Duration::from_secs_f64(extra)).min(self.max_delay.max(delay))
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self::from_config(&Retry::default())
	}
}

#[derive(Debug)]
pub enum RetryError<E> {
	/// The token fired before an attempt succeeded.
	Cancelled,
	Failed { error: E, attempts: u32 },
}

/// Runs `op` until it succeeds, fails fatally, runs out of attempts, or `cancel` fires.
///
/// Cancellation is observed before each attempt, while an attempt is in flight and during the
/// backoff sleep.
pub async fn with_retry<T, E, F, Fut>(
	policy: &RetryPolicy,
	cancel: &CancellationToken,
	label: &str,
	mut op: F,
) -> Result<T, RetryError<E>>
where
	E: Retryable + Display,
	F: FnMut(u32) -> Fut,
	Fut: Future<Output = Result<T, E>>,
{
	let mut attempt = 0;

	loop {
		if cancel.is_cancelled() {
			return Err(RetryError::Cancelled);
		}

		attempt += 1;

		let result = tokio::select! {
			_ = cancel.cancelled() => return Err(RetryError::Cancelled),
			result = op(attempt) => result,
		};
		let err = match result {
			Ok(value) => return Ok(value),
			Err(err) => err,
		};

		if !err.is_transient() || attempt >= policy.max_attempts {
			return Err(RetryError::Failed { error: err, attempts: attempt });
		}

		let delay = policy.with_jitter(policy.backoff(attempt, err.retry_after()));

		tracing::warn!(
			query = label,
			attempt,
			delay_ms = delay.as_millis() as u64,
			error = %err,
			"Transient tracker error. Retrying."
		);

		tokio::select! {
			_ = cancel.cancelled() => return Err(RetryError::Cancelled),
			_ = tokio::time::sleep(delay) => {},
		}
	}
}

#[cfg(test)]
mod tests {
	use std::{
		sync::atomic::{AtomicU32, Ordering},
		time::Duration,
	};

	use tokio_util::sync::CancellationToken;

	use crate::retry::{RetryError, RetryPolicy, Retryable, with_retry};

	#[derive(Debug)]
	struct FakeError {
		transient: bool,
	}
	impl std::fmt::Display for FakeError {
		fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
			write!(f, "fake error (transient: {})", self.transient)
		}
	}
	impl Retryable for FakeError {
		fn is_transient(&self) -> bool {
			self.transient
		}
	}

	fn fast_policy() -> RetryPolicy {
		RetryPolicy {
			max_attempts: 3,
			base_delay: Duration::from_millis(1),
			max_delay: Duration::from_millis(5),
			jitter: 0.0,
		}
	}

	#[test]
	fn backoff_doubles_and_caps() {
		let policy = RetryPolicy {
			max_attempts: 10,
			base_delay: Duration::from_millis(2_000),
			max_delay: Duration::from_millis(30_000),
			jitter: 0.0,
		};

		assert_eq!(policy.backoff(1, None), Duration::from_millis(2_000));
		assert_eq!(policy.backoff(2, None), Duration::from_millis(4_000));
		assert_eq!(policy.backoff(4, None), Duration::from_millis(16_000));
		assert_eq!(policy.backoff(5, None), Duration::from_millis(30_000));
		assert_eq!(policy.backoff(1, Some(Duration::from_secs(7))), Duration::from_secs(7));
		assert_eq!(policy.backoff(1, Some(Duration::from_secs(90))), Duration::from_secs(30));
	}

	#[test]
	fn jitter_stays_within_bounds() {
		let policy = RetryPolicy { jitter: 0.2, ..RetryPolicy::default() };

		for _ in 0..100 {
			let delay = policy.with_jitter(Duration::from_millis(1_000));

			assert!(delay >= Duration::from_millis(1_000));
			assert!(delay <= Duration::from_millis(1_200));
		}
	}

	#[tokio::test]
	async fn transient_errors_are_retried_until_success() {
		let calls = AtomicU32::new(0);
		let result = with_retry(&fast_policy(), &CancellationToken::new(), "test", |attempt| {
			calls.fetch_add(1, Ordering::SeqCst);

			async move { if attempt < 3 { Err(FakeError { transient: true }) } else { Ok(attempt) } }
		})
		.await;

		assert_eq!(result.ok(), Some(3));
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn fatal_errors_are_not_retried() {
		let calls = AtomicU32::new(0);
		let result: Result<(), _> =
			with_retry(&fast_policy(), &CancellationToken::new(), "test", |_| {
				calls.fetch_add(1, Ordering::SeqCst);

				async { Err(FakeError { transient: false }) }
			})
			.await;

		assert!(matches!(result, Err(RetryError::Failed { attempts: 1, .. })));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn attempts_are_capped() {
		let result: Result<(), _> =
			with_retry(&fast_policy(), &CancellationToken::new(), "test", |_| async {
				Err(FakeError { transient: true })
			})
			.await;

		assert!(matches!(result, Err(RetryError::Failed { attempts: 3, .. })));
	}

	#[tokio::test]
	async fn cancelled_token_stops_before_first_attempt() {
		let cancel = CancellationToken::new();
		let calls = AtomicU32::new(0);

		cancel.cancel();

		let result: Result<(), RetryError<FakeError>> = with_retry(&fast_policy(), &cancel, "test", |_| {
			calls.fetch_add(1, Ordering::SeqCst);

			async { Ok(()) }
		})
		.await;

		assert!(matches!(result, Err(RetryError::Cancelled)));
		assert_eq!(calls.load(Ordering::SeqCst), 0);
	}
}
