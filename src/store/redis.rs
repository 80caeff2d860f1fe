//! Redis-backed store shared by every process that talks to the same upstream.
//!
//! Credentials are stored as JSON under `SET .. PX <ttl>`. Counters use a Lua script so the
//! increment and the window expiry happen atomically on the server; that script is the only
//! synchronization primitive between processes.

// std
use std::time::Duration as StdDuration;
// crates.io
use redis::{AsyncCommands, Client, RedisError, Script, aio::ConnectionManager};
// self
use crate::{
	_prelude::*,
	auth::Credential,
	store::{CacheKey, CounterStore, CredentialCache, StoreError, StoreFuture, WindowSnapshot},
};

const INCREMENT_SCRIPT: &str = r#"
	local count = redis.call("INCR", KEYS[1])
	if count == 1 then
		redis.call("PEXPIRE", KEYS[1], ARGV[1])
	end
	local ttl = redis.call("PTTL", KEYS[1])
	if ttl < 0 then
		redis.call("PEXPIRE", KEYS[1], ARGV[1])
		ttl = tonumber(ARGV[1])
	end
	return { count, ttl }
"#;

/// [`CredentialCache`] and [`CounterStore`] backed by a Redis connection manager.
#[derive(Clone)]
pub struct RedisStore {
	conn: ConnectionManager,
}
impl RedisStore {
	/// Connects to `redis_url` (for example `redis://127.0.0.1/`).
	pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
		let client = Client::open(redis_url).map_err(backend)?;
		let conn = ConnectionManager::new(client).await.map_err(backend)?;

		Ok(Self { conn })
	}

	/// Wraps an existing connection manager.
	pub fn with_connection(conn: ConnectionManager) -> Self {
		Self { conn }
	}
}
impl Debug for RedisStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("RedisStore(..)")
	}
}
impl CredentialCache for RedisStore {
	fn load<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, Option<Credential>> {
		Box::pin(async move {
			let mut conn = self.conn.clone();
			let raw: Option<String> = conn.get(key.as_str()).await.map_err(backend)?;

			raw.map(|json| {
				serde_json::from_str(&json).map_err(|e| StoreError::Serialization {
					message: format!("Failed to parse cached credential {key}: {e}"),
				})
			})
			.transpose()
		})
	}

	fn save<'a>(
		&'a self,
		key: &'a CacheKey,
		credential: Credential,
		ttl: StdDuration,
	) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let json = serde_json::to_string(&credential).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize credential {key}: {e}"),
			})?;
			let mut conn = self.conn.clone();

			redis::cmd("SET")
				.arg(key.as_str())
				.arg(json)
				.arg("PX")
				.arg(ttl_millis(ttl))
				.query_async::<()>(&mut conn)
				.await
				.map_err(backend)
		})
	}

	fn remove<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut conn = self.conn.clone();

			conn.del::<_, ()>(key.as_str()).await.map_err(backend)
		})
	}
}
impl CounterStore for RedisStore {
	fn increment<'a>(
		&'a self,
		key: &'a str,
		window: StdDuration,
		now: OffsetDateTime,
	) -> StoreFuture<'a, WindowSnapshot> {
		Box::pin(async move {
			let mut conn = self.conn.clone();
			let (count, ttl): (u64, i64) = Script::new(INCREMENT_SCRIPT)
				.key(key)
				.arg(ttl_millis(window))
				.invoke_async(&mut conn)
				.await
				.map_err(backend)?;
			let reset_at = now + Duration::milliseconds(ttl.max(0));

			Ok(WindowSnapshot { count, window_start: reset_at - window, reset_at })
		})
	}
}

fn ttl_millis(ttl: StdDuration) -> u64 {
	u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn backend(e: RedisError) -> StoreError {
	StoreError::Backend { message: e.to_string() }
}
