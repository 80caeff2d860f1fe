//! Storage contracts for the credential cache and the shared rate-limit counters.
//!
//! Both contracts are object-safe so a single backend (memory, file, Redis) can be shared by
//! several [`ApiClient`](crate::client::ApiClient) instances through an `Arc`.

pub mod file;
pub mod memory;
#[cfg(feature = "redis")] pub mod redis;

pub use file::FileStore;
pub use memory::MemoryStore;
#[cfg(feature = "redis")] pub use self::redis::RedisStore;

// std
use std::time::Duration as StdDuration;
// self
use crate::{_prelude::*, auth::Credential};

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// External cache for the credential of one client identity.
///
/// Entries outlive the process so a restarted client can reuse a still-valid credential
/// instead of exchanging a new one.
pub trait CredentialCache
where
	Self: Send + Sync,
{
	/// Fetches the cached credential, if present and not expired by the backend.
	fn load<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, Option<Credential>>;

	/// Stores or replaces the credential; the entry should disappear after `ttl`.
	fn save<'a>(
		&'a self,
		key: &'a CacheKey,
		credential: Credential,
		ttl: StdDuration,
	) -> StoreFuture<'a, ()>;

	/// Removes the cached credential.
	fn remove<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, ()>;
}

/// Atomic fixed-window counter shared by every process consuming one budget.
pub trait CounterStore
where
	Self: Send + Sync,
{
	/// Atomically adds one point to the window identified by `key` and returns its state.
	///
	/// A window opens on the first increment and lasts `window`; the next increment after it
	/// elapses starts a fresh window with a count of one.
	fn increment<'a>(
		&'a self,
		key: &'a str,
		window: StdDuration,
		now: OffsetDateTime,
	) -> StoreFuture<'a, WindowSnapshot>;
}

/// State of a counter window right after an increment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSnapshot {
	/// Points consumed in the window, including the one just added.
	pub count: u64,
	/// Instant the window opened.
	pub window_start: OffsetDateTime,
	/// Instant the window closes and the count starts over.
	pub reset_at: OffsetDateTime,
}

/// Error type produced by [`CredentialCache`] and [`CounterStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Cache key identifying the credential of one client identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);
impl CacheKey {
	/// Builds the key `<prefix>:credential:<identity>`.
	pub fn credential(prefix: &str, identity: &str) -> Self {
		Self(format!("{prefix}:credential:{identity}"))
	}

	/// Returns the key as a string slice.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Display for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn cache_keys_are_namespaced() {
		let key = CacheKey::credential("oauth2_gateway", "abc");

		assert_eq!(key.as_str(), "oauth2_gateway:credential:abc");
		assert_eq!(key.to_string(), key.as_str());
	}

	#[test]
	fn store_errors_render_their_message() {
		let err = StoreError::Serialization { message: "bad json".into() };

		assert_eq!(err.to_string(), "Serialization error: bad json.");
	}
}
