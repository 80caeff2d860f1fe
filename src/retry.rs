//! Retry policy: failure classification and jittered exponential backoff.

// std
use std::time::Duration as StdDuration;
// crates.io
use rand::Rng;
// self
use crate::{_prelude::*, error::ConfigError};

/// Statuses retried by default (any other 5xx is retried as well).
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 5] = [408, 429, 502, 503, 504];

/// Retry behavior for transient failures.
///
/// `max_retries` counts attempts made after the first one, so a policy with `max_retries = 3`
/// sends a request at most four times.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
	/// Retries allowed after the first attempt.
	pub max_retries: u32,
	/// Delay before the first retry.
	pub base_delay: StdDuration,
	/// Upper bound applied to every delay, jitter and `Retry-After` included.
	pub max_delay: StdDuration,
	/// Growth factor applied per retry.
	pub multiplier: f64,
	/// Relative jitter in `[0, 1]`; `0.2` spreads each delay by ±20%.
	pub jitter: f64,
	/// HTTP statuses treated as transient in addition to every 5xx.
	pub retryable_statuses: Vec<u16>,
	/// Raise the computed delay to the server's `Retry-After` hint.
	pub respect_retry_after: bool,
}
impl RetryPolicy {
	/// Policy that never retries.
	pub fn disabled() -> Self {
		Self { max_retries: 0, ..Default::default() }
	}

	/// Overrides the retry ceiling.
	pub fn with_max_retries(mut self, max_retries: u32) -> Self {
		self.max_retries = max_retries;

		self
	}

	/// Overrides the base and max delays.
	pub fn with_delays(mut self, base_delay: StdDuration, max_delay: StdDuration) -> Self {
		self.base_delay = base_delay;
		self.max_delay = max_delay;

		self
	}

	/// Overrides the jitter ratio.
	pub fn with_jitter(mut self, jitter: f64) -> Self {
		self.jitter = jitter;

		self
	}

	/// Checks the policy for inconsistent values.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.base_delay > self.max_delay {
			return Err(ConfigError::InvalidRetryPolicy {
				reason: "base delay exceeds the max delay",
			});
		}
		if !self.multiplier.is_finite() || self.multiplier < 1. {
			return Err(ConfigError::InvalidRetryPolicy {
				reason: "multiplier must be a finite value of at least 1",
			});
		}
		if !(0. ..=1.).contains(&self.jitter) {
			return Err(ConfigError::InvalidRetryPolicy { reason: "jitter must lie within [0, 1]" });
		}

		Ok(())
	}

	/// Returns true when a response with `status` should be retried.
	pub fn is_retryable_status(&self, status: u16) -> bool {
		(500..600).contains(&status) || self.retryable_statuses.contains(&status)
	}

	/// Returns true when `error` is transient under this policy.
	///
	/// Network failures and retryable HTTP statuses qualify. Authentication, rate-limit,
	/// storage and configuration failures never do.
	pub fn is_retryable(&self, error: &Error) -> bool {
		match error {
			Error::Network(e) => !e.invalid_request,
			Error::Http(err) => self.is_retryable_status(err.status()),
			_ => false,
		}
	}

	/// Delay before retry number `retry` (1-based) with random jitter applied.
	pub fn delay_for(&self, retry: u32, retry_after: Option<StdDuration>) -> StdDuration {
		let unit = if self.jitter > 0. { rand::rng().random_range(-1. ..=1.) } else { 0. };

		self.delay_with(retry, retry_after, unit)
	}

	/// Deterministic form of [`Self::delay_for`]; `unit` in `[-1, 1]` scales the jitter.
	pub fn delay_with(&self, retry: u32, retry_after: Option<StdDuration>, unit: f64) -> StdDuration {
		let max = self.max_delay.as_secs_f64();
		let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
		let backoff = (self.base_delay.as_secs_f64() * self.multiplier.powi(exponent)).min(max);
		let jittered = (backoff * (1. + self.jitter * unit.clamp(-1., 1.))).clamp(0., max);
		let delay = StdDuration::try_from_secs_f64(jittered).unwrap_or(self.max_delay);

		match retry_after {
			Some(hint) if self.respect_retry_after => delay.max(hint.min(self.max_delay)),
			_ => delay,
		}
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: 3,
			base_delay: StdDuration::from_secs(1),
			max_delay: StdDuration::from_secs(30),
			multiplier: 2.,
			jitter: 0.2,
			retryable_statuses: DEFAULT_RETRYABLE_STATUSES.to_vec(),
			respect_retry_after: true,
		}
	}
}
