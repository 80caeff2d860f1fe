//! Consecutive-failure health tracking and the background liveness probe.
//!
//! Status is a pure function of the failure counter:
//!
//! | counter                    | status      |
//! |----------------------------|-------------|
//! | no event recorded yet      | `Unknown`   |
//! | `0`                        | `Healthy`   |
//! | `1 ..< threshold`          | `Degraded`  |
//! | `>= threshold`             | `Unhealthy` |
//!
//! Each success decrements the counter by one (never below zero) and each failure increments
//! it by one, so recovery from `Unhealthy` passes through `Degraded`.

// std
use std::time::Duration as StdDuration;
// crates.io
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
// self
use crate::{_prelude::*, error::ConfigError, obs};

/// Derived health signal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
	/// No call or probe has completed yet.
	#[default]
	Unknown,
	/// No outstanding failures.
	Healthy,
	/// Some failures, still under the threshold.
	Degraded,
	/// Failures reached the threshold.
	Unhealthy,
}
impl HealthStatus {
	/// Status implied by `failures` against `threshold`.
	pub const fn from_failures(failures: u32, threshold: u32) -> Self {
		if failures == 0 {
			Self::Healthy
		} else if failures < threshold {
			Self::Degraded
		} else {
			Self::Unhealthy
		}
	}

	/// Returns a stable label.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Unknown => "UNKNOWN",
			Self::Healthy => "HEALTHY",
			Self::Degraded => "DEGRADED",
			Self::Unhealthy => "UNHEALTHY",
		}
	}
}
impl Display for HealthStatus {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Health probe and threshold configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
	/// Run the background probe after `initialize`.
	pub enabled: bool,
	/// Path probed relative to the base URL.
	pub probe_path: String,
	/// Delay between probes.
	pub probe_interval: StdDuration,
	/// Timeout of a single probe.
	pub probe_timeout: StdDuration,
	/// Failures at which the status turns `Unhealthy`.
	pub max_consecutive_failures: u32,
}
impl HealthSettings {
	/// Checks the settings for zero durations or thresholds.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.max_consecutive_failures == 0 {
			return Err(ConfigError::InvalidHealthSettings {
				reason: "failure threshold must be positive",
			});
		}
		if self.probe_interval.is_zero() || self.probe_timeout.is_zero() {
			return Err(ConfigError::InvalidHealthSettings {
				reason: "probe interval and timeout must be positive",
			});
		}

		Ok(())
	}
}
impl Default for HealthSettings {
	fn default() -> Self {
		Self {
			enabled: true,
			probe_path: "/health".into(),
			probe_interval: StdDuration::from_secs(60),
			probe_timeout: StdDuration::from_secs(5),
			max_consecutive_failures: 5,
		}
	}
}

/// Mutable health state owned by [`HealthMonitor`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HealthState {
	/// Current status.
	pub status: HealthStatus,
	/// Instant of the last recorded call or probe.
	pub last_checked_at: Option<OffsetDateTime>,
	/// Outstanding failures.
	pub consecutive_failures: u32,
}

/// Read-only projection returned by `ApiClient::health_status`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
	/// Current status.
	pub status: HealthStatus,
	/// Instant of the last recorded call or probe.
	#[serde(with = "time::serde::rfc3339::option")]
	pub last_checked_at: Option<OffsetDateTime>,
	/// Outstanding failures.
	pub consecutive_failures: u32,
	/// Whether a credential is currently held.
	pub is_authenticated: bool,
	/// Seconds until the held credential expires (zero when none is held).
	pub token_expires_in_seconds: i64,
}

/// Process-local failure counter and status.
#[derive(Debug)]
pub struct HealthMonitor {
	state: Mutex<HealthState>,
	threshold: u32,
}
impl HealthMonitor {
	/// Creates a monitor in the `Unknown` state.
	pub fn new(threshold: u32) -> Self {
		Self { state: Mutex::new(HealthState::default()), threshold: threshold.max(1) }
	}

	/// Failure threshold.
	pub fn threshold(&self) -> u32 {
		self.threshold
	}

	/// Snapshot of the current state.
	pub fn state(&self) -> HealthState {
		*self.state.lock()
	}

	/// Current status.
	pub fn status(&self) -> HealthStatus {
		self.state.lock().status
	}

	/// Records a successful call or probe.
	pub fn record_success(&self) -> HealthStatus {
		self.record(|failures| failures.saturating_sub(1))
	}

	/// Records a failed call or probe.
	pub fn record_failure(&self) -> HealthStatus {
		self.record(|failures| failures.saturating_add(1))
	}

	fn record(&self, step: impl FnOnce(u32) -> u32) -> HealthStatus {
		let mut state = self.state.lock();
		let previous = state.status;

		state.consecutive_failures = step(state.consecutive_failures);
		state.status = HealthStatus::from_failures(state.consecutive_failures, self.threshold);
		state.last_checked_at = Some(OffsetDateTime::now_utc());

		let (status, failures) = (state.status, state.consecutive_failures);

		drop(state);
		obs::record_consecutive_failures(failures);

		if status != previous {
			obs::log_event!(info, from = %previous, to = %status, failures, "Health status changed.");
		}

		status
	}
}

/// Handle owning the background probe task; dropping it stops the task.
#[derive(Debug)]
pub struct HealthProbe {
	cancel: CancellationToken,
	handle: JoinHandle<()>,
}
impl HealthProbe {
	/// Spawns a loop calling `tick` every `interval` until `tick` returns `None` or the handle
	/// is dropped.
	///
	/// Must be called from within a Tokio runtime.
	pub fn spawn<F, Fut>(interval: StdDuration, mut tick: F) -> Self
	where
		F: 'static + Send + FnMut() -> Option<Fut>,
		Fut: 'static + Send + Future<Output = ()>,
	{
		let cancel = CancellationToken::new();
		let token = cancel.clone();
		let handle = tokio::spawn(async move {
			loop {
				tokio::select! {
					_ = token.cancelled() => break,
					_ = tokio::time::sleep(interval) => {
						let Some(probe) = tick() else {
							break;
						};

						probe.await;
					},
				}
			}

			obs::log_event!(debug, "Health probe loop stopped.");
		});

		Self { cancel, handle }
	}

	/// Returns true once the probe task has exited.
	pub fn is_finished(&self) -> bool {
		self.handle.is_finished()
	}

	/// Stops the probe.
	pub fn stop(self) {
		drop(self);
	}
}
impl Drop for HealthProbe {
	fn drop(&mut self) {
		self.cancel.cancel();
		self.handle.abort();
	}
}
