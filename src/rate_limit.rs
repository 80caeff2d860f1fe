//! Dual-window admission control backed by a shared [`CounterStore`].
//!
//! Every call consumes one point from a short window (per minute by default) and one from a
//! long window (per hour by default). Counters live in the store, not in the limiter, so all
//! processes pointed at the same store share one budget.
//!
//! Both windows are always consumed, even when the first one rejects. A rejection by one
//! window therefore still spends a point of the other; each window stays authoritative for
//! its own budget and no compensation is attempted.

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, RateLimitExceeded},
	obs,
	store::{CounterStore, WindowSnapshot},
};

/// Quota of one fixed window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowQuota {
	/// Points available per window.
	pub limit: u64,
	/// Window duration.
	pub window: StdDuration,
}
impl WindowQuota {
	/// Creates a quota of `limit` points per `window`.
	pub const fn new(limit: u64, window: StdDuration) -> Self {
		Self { limit, window }
	}
}

/// Rate-limit configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
	/// Short window (60 points per 60 s by default).
	pub short: WindowQuota,
	/// Long window (1000 points per hour by default).
	pub long: WindowQuota,
	/// Namespace prepended to every counter key.
	pub key_prefix: String,
}
impl RateLimitSettings {
	/// Checks that both quotas have a positive limit and duration.
	pub fn validate(&self) -> Result<(), ConfigError> {
		for (window, quota) in [(Window::Short, self.short), (Window::Long, self.long)] {
			if quota.limit == 0 || quota.window.is_zero() {
				return Err(ConfigError::InvalidQuota { window: window.as_str() });
			}
		}

		Ok(())
	}
}
impl Default for RateLimitSettings {
	fn default() -> Self {
		Self {
			short: WindowQuota::new(60, StdDuration::from_secs(60)),
			long: WindowQuota::new(1_000, StdDuration::from_secs(3_600)),
			key_prefix: "oauth2_gateway".into(),
		}
	}
}

/// Rate-limit window labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Window {
	/// Per-minute style window.
	Short,
	/// Per-hour style window.
	Long,
}
impl Window {
	/// Stable label used in keys, errors, and logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			Window::Short => "short",
			Window::Long => "long",
		}
	}
}
impl Display for Window {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Budget left after a successful consumption, taken from the tighter window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitGrant {
	/// Points left in the tighter window.
	pub remaining_points: u64,
	/// Instant the tighter window resets.
	pub reset_at: OffsetDateTime,
}

/// Dual-window rate limiter.
#[derive(Clone)]
pub struct RateLimiter {
	counters: Arc<dyn CounterStore>,
	settings: RateLimitSettings,
}
impl RateLimiter {
	/// Creates a limiter over `counters`.
	pub fn new(counters: Arc<dyn CounterStore>, settings: RateLimitSettings) -> Self {
		Self { counters, settings }
	}

	/// Active settings.
	pub fn settings(&self) -> &RateLimitSettings {
		&self.settings
	}

	/// Counter key of `window` for the client `identity`.
	pub fn key(&self, identity: &str, window: Window) -> String {
		format!("{}:ratelimit:{identity}:{}", self.settings.key_prefix, window.as_str())
	}

	/// Consumes one point from both windows for `identity`.
	pub async fn consume(&self, identity: &str) -> Result<RateLimitGrant> {
		self.consume_at(identity, OffsetDateTime::now_utc()).await
	}

	/// Same as [`Self::consume`] at an explicit instant.
	///
	/// Fails with [`Error::RateLimited`] when either window is exhausted (the later reset wins
	/// when both are) and with [`Error::Storage`] when the counter store is unreachable.
	pub async fn consume_at(&self, identity: &str, now: OffsetDateTime) -> Result<RateLimitGrant> {
		let short_key = self.key(identity, Window::Short);
		let long_key = self.key(identity, Window::Long);
		let short = self.counters.increment(&short_key, self.settings.short.window, now).await;
		let long = self.counters.increment(&long_key, self.settings.long.window, now).await;
		let short = Self::check(Window::Short, self.settings.short, short?);
		let long = Self::check(Window::Long, self.settings.long, long?);

		match (short, long) {
			(Ok(short), Ok(long)) => Ok(if short.remaining_points <= long.remaining_points {
				short
			} else {
				long
			}),
			(Err(short), Err(long)) => {
				let rejected = if long.reset_at >= short.reset_at { long } else { short };

				Err(self.reject(identity, rejected))
			},
			(Err(rejected), Ok(_)) | (Ok(_), Err(rejected)) => Err(self.reject(identity, rejected)),
		}
	}

	fn check(
		window: Window,
		quota: WindowQuota,
		snapshot: WindowSnapshot,
	) -> Result<RateLimitGrant, RateLimitExceeded> {
		if snapshot.count > quota.limit {
			Err(RateLimitExceeded {
				window: window.as_str(),
				reset_at: snapshot.reset_at,
				remaining_points: 0,
			})
		} else {
			Ok(RateLimitGrant {
				remaining_points: quota.limit - snapshot.count,
				reset_at: snapshot.reset_at,
			})
		}
	}

	fn reject(&self, identity: &str, rejected: RateLimitExceeded) -> Error {
		obs::log_event!(
			warn,
			identity,
			window = rejected.window,
			reset_at = %rejected.reset_at,
			"Rate limit exhausted."
		);

		rejected.into()
	}
}
impl Debug for RateLimiter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RateLimiter").field("settings", &self.settings).finish()
	}
}
