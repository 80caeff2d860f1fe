//! Thread-safe in-memory store for local development, tests, and single-process deployments.
//!
//! Cloning a [`MemoryStore`] shares the underlying maps, so several clients built from the
//! same store share one credential and one rate-limit budget.

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	auth::Credential,
	store::{CacheKey, CounterStore, CredentialCache, StoreFuture, WindowSnapshot},
};

type CredentialMap = Arc<RwLock<HashMap<CacheKey, CachedCredential>>>;
type CounterMap = Arc<Mutex<HashMap<String, WindowSnapshot>>>;

#[derive(Clone, Debug)]
struct CachedCredential {
	credential: Credential,
	evict_at: OffsetDateTime,
}

/// Process-local [`CredentialCache`] and [`CounterStore`].
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
	credentials: CredentialMap,
	counters: CounterMap,
}
impl MemoryStore {
	/// Number of live counter windows; expired windows are kept until their next increment.
	pub fn counter_len(&self) -> usize {
		self.counters.lock().len()
	}

	fn load_now(map: &CredentialMap, key: &CacheKey, now: OffsetDateTime) -> Option<Credential> {
		let guard = map.read();
		let entry = guard.get(key)?;

		(entry.evict_at > now).then(|| entry.credential.clone())
	}

	fn save_now(map: &CredentialMap, key: &CacheKey, credential: Credential, ttl: StdDuration) {
		let evict_at = OffsetDateTime::now_utc() + ttl;

		map.write().insert(key.to_owned(), CachedCredential { credential, evict_at });
	}

	fn increment_now(
		map: &CounterMap,
		key: &str,
		window: StdDuration,
		now: OffsetDateTime,
	) -> WindowSnapshot {
		let mut guard = map.lock();
		let entry = guard.entry(key.to_owned()).or_insert(WindowSnapshot {
			count: 0,
			window_start: now,
			reset_at: now + window,
		});

		if now >= entry.reset_at {
			*entry = WindowSnapshot { count: 0, window_start: now, reset_at: now + window };
		}

		entry.count += 1;

		*entry
	}
}
impl CredentialCache for MemoryStore {
	fn load<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, Option<Credential>> {
		Box::pin(async move { Ok(Self::load_now(&self.credentials, key, OffsetDateTime::now_utc())) })
	}

	fn save<'a>(
		&'a self,
		key: &'a CacheKey,
		credential: Credential,
		ttl: StdDuration,
	) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			Self::save_now(&self.credentials, key, credential, ttl);

			Ok(())
		})
	}

	fn remove<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.credentials.write().remove(key);

			Ok(())
		})
	}
}
impl CounterStore for MemoryStore {
	fn increment<'a>(
		&'a self,
		key: &'a str,
		window: StdDuration,
		now: OffsetDateTime,
	) -> StoreFuture<'a, WindowSnapshot> {
		Box::pin(async move { Ok(Self::increment_now(&self.counters, key, window, now)) })
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn credential() -> Credential {
		Credential::builder()
			.access_token("cached-access")
			.expires_in(Duration::hours(1))
			.build()
			.expect("Cached credential fixture should build.")
	}

	#[tokio::test]
	async fn credentials_round_trip_and_evict() {
		let store = MemoryStore::default();
		let key = CacheKey::credential("test", "identity");

		store
			.save(&key, credential(), StdDuration::from_secs(3_600))
			.await
			.expect("Saving into the memory store should succeed.");

		let loaded = store
			.load(&key)
			.await
			.expect("Loading from the memory store should succeed.")
			.expect("Saved credential should be returned.");

		assert_eq!(loaded.access_token.expose(), "cached-access");

		store.save(&key, credential(), StdDuration::ZERO).await.expect("Overwrite should succeed.");

		assert!(store.load(&key).await.expect("Load should succeed.").is_none());

		store.remove(&key).await.expect("Remove should succeed.");
	}

	#[tokio::test]
	async fn counters_roll_over_after_the_window() {
		let store = MemoryStore::default();
		let window = StdDuration::from_secs(60);
		let start = macros::datetime!(2025-01-01 00:00 UTC);

		for expected in 1..=3 {
			let snapshot =
				store.increment("k", window, start).await.expect("Increment should succeed.");

			assert_eq!(snapshot.count, expected);
			assert_eq!(snapshot.reset_at, macros::datetime!(2025-01-01 00:01 UTC));
		}

		let rolled = store
			.increment("k", window, macros::datetime!(2025-01-01 00:01 UTC))
			.await
			.expect("Increment after rollover should succeed.");

		assert_eq!(rolled.count, 1);
		assert_eq!(rolled.window_start, macros::datetime!(2025-01-01 00:01 UTC));
		assert_eq!(store.counter_len(), 1);
	}

	#[tokio::test]
	async fn clones_share_state() {
		let store = MemoryStore::default();
		let shared = store.clone();
		let now = OffsetDateTime::now_utc();

		store.increment("k", StdDuration::from_secs(60), now).await.expect("First increment.");

		let snapshot = shared
			.increment("k", StdDuration::from_secs(60), now)
			.await
			.expect("Second increment.");

		assert_eq!(snapshot.count, 2);
	}
}
