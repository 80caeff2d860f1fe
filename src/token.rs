//! OAuth credential lifecycle: cache-first acquisition, refresh, revocation.
//!
//! [`TokenManager`] is the only owner of the in-memory credential. Network exchanges go
//! through a single-flight registry so concurrent callers that discover a missing or expired
//! credential at the same time trigger one token endpoint call and share its outcome.

pub mod flight;
pub mod metrics;

mod exchange;

pub use flight::{FlightKind, FlightResult};
pub use metrics::TokenMetrics;

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	auth::Credential,
	config::ClientConfig,
	error::AuthenticationError,
	http::HttpTransport,
	obs::{self, Op, OpOutcome, OpSpan},
	store::{CacheKey, CredentialCache},
	token::{
		exchange::Grant,
		flight::{FlightRegistry, Flight},
	},
};

/// Owns the credential of one client identity.
///
/// Cloning is cheap and every clone shares the same credential, registry, and metrics.
pub struct TokenManager<C>
where
	C: ?Sized + HttpTransport,
{
	inner: Arc<TokenState<C>>,
}
impl<C> TokenManager<C>
where
	C: ?Sized + HttpTransport,
{
	/// Creates a manager without a credential; nothing is fetched until first use.
	pub fn new(
		config: Arc<ClientConfig>,
		transport: Arc<C>,
		cache: Arc<dyn CredentialCache>,
	) -> Self {
		let cache_key = config.cache_key();

		Self {
			inner: Arc::new(TokenState {
				config,
				transport,
				cache,
				cache_key,
				current: RwLock::new(None),
				flights: Arc::new(FlightRegistry::default()),
				metrics: Arc::new(TokenMetrics::default()),
			}),
		}
	}

	/// Configuration the manager exchanges credentials for.
	pub fn config(&self) -> &ClientConfig {
		&self.inner.config
	}

	/// Lifecycle counters.
	pub fn metrics(&self) -> &TokenMetrics {
		&self.inner.metrics
	}

	/// Currently held credential, valid or not.
	pub fn current(&self) -> Option<Credential> {
		self.inner.current.read().clone()
	}

	/// Returns true while a non-expired credential is held.
	pub fn is_authenticated(&self) -> bool {
		let now = OffsetDateTime::now_utc();

		self.inner.current.read().as_ref().is_some_and(|credential| !credential.is_expired_at(now))
	}

	/// Whole seconds until the held credential expires; zero when none is held.
	pub fn expires_in_seconds(&self) -> i64 {
		let now = OffsetDateTime::now_utc();

		self.inner
			.current
			.read()
			.as_ref()
			.map(|credential| credential.expires_in_at(now).whole_seconds().max(0))
			.unwrap_or(0)
	}

	/// Returns true when the held credential carries a refresh token.
	pub fn has_refresh_token(&self) -> bool {
		self.inner.current.read().as_ref().is_some_and(|credential| credential.refresh_token.is_some())
	}

	/// Returns a credential valid for at least the configured safety margin.
	///
	/// Order of preference: the in-memory credential, the external cache, then a
	/// client-credentials exchange shared with every concurrent caller.
	pub async fn ensure_authenticated(&self) -> Result<Credential, AuthenticationError> {
		if let Some(credential) = self.usable() {
			return Ok(credential);
		}

		let this = self.clone();

		self.run(FlightKind::Authenticate, || self.usable(), move || async move {
			this.load_or_exchange().await
		})
		.await
	}

	/// Performs a client-credentials exchange and stores the result.
	///
	/// Joins an acquisition already in flight instead of starting a second one.
	pub async fn authenticate(&self) -> Result<Credential, AuthenticationError> {
		let this = self.clone();

		self.run(FlightKind::Authenticate, || None, move || async move {
			this.exchange(Grant::ClientCredentials).await
		})
		.await
	}

	/// Performs a refresh-token exchange.
	///
	/// Falls back to [`Self::authenticate`] when no refresh token is held or the endpoint
	/// rejects the refresh token (HTTP 400/401). Network failures are returned as-is.
	pub async fn refresh(&self) -> Result<Credential, AuthenticationError> {
		self.refresh_guarded(|| None).await
	}

	/// Refreshes after the upstream rejected `rejected`, unless a concurrent refresh already
	/// replaced it with a usable credential.
	pub(crate) async fn refresh_rejected(
		&self,
		rejected: &Credential,
	) -> Result<Credential, AuthenticationError> {
		let stale = rejected.access_token.clone();

		self.refresh_guarded(|| self.usable().filter(|current| current.access_token != stale))
			.await
	}

	/// Clears the credential locally and in the cache, then notifies the revocation
	/// endpoint. Failures are logged and never returned.
	pub async fn revoke(&self) {
		let span = OpSpan::new(Op::Revoke, "revoke");

		span.instrument(async {
			let credential = self.inner.current.write().take();

			self.forget_cached().await;

			let Some(credential) = credential else {
				return;
			};
			let Some(request) =
				exchange::revocation_request(&self.inner.config, &credential.access_token)
			else {
				return;
			};

			obs::record_op_outcome(Op::Revoke, OpOutcome::Attempt);

			match self.inner.transport.send(request).await {
				Ok(response) if response.is_success() => {
					span.record_outcome(OpOutcome::Success);
					obs::log_event!(debug, "Credential revoked.");
				},
				Ok(response) => {
					span.record_outcome(OpOutcome::Failure);
					obs::log_event!(
						warn,
						status = response.status,
						"Revocation endpoint rejected the request."
					);
				},
				Err(e) => {
					span.record_outcome(OpOutcome::Failure);
					obs::log_event!(warn, error = %e, "Revocation endpoint unreachable.");
				},
			}
		})
		.await
	}

	/// Drops the credential locally and in the cache without contacting the upstream.
	pub async fn invalidate(&self) {
		self.inner.current.write().take();
		self.forget_cached().await;
	}

	fn usable(&self) -> Option<Credential> {
		let now = OffsetDateTime::now_utc();
		let margin = self.inner.config.token_safety_margin;

		self.inner.current.read().as_ref().filter(|credential| credential.is_valid_for(margin, now)).cloned()
	}

	async fn refresh_guarded<R>(&self, recheck: R) -> Result<Credential, AuthenticationError>
	where
		R: FnOnce() -> Option<Credential>,
	{
		let this = self.clone();

		self.run(FlightKind::Refresh, recheck, move || async move { this.refresh_or_fallback().await })
			.await
	}

	async fn run<R, S, Fut>(&self, kind: FlightKind, recheck: R, start: S) -> FlightResult
	where
		R: FnOnce() -> Option<Credential>,
		S: FnOnce() -> Fut,
		Fut: 'static + Send + Future<Output = FlightResult>,
	{
		let flight: Flight = self.inner.flights.join_or_start(kind, recheck, start);

		if flight.is_joined() {
			self.inner.metrics.record_join();
			obs::log_event!(debug, flight = kind.as_str(), "Joined credential exchange in flight.");
		}

		flight.wait().await
	}

	async fn load_or_exchange(&self) -> FlightResult {
		if let Some(credential) = self.load_cached().await {
			return Ok(credential);
		}

		self.exchange(Grant::ClientCredentials).await
	}

	async fn refresh_or_fallback(&self) -> FlightResult {
		let Some(refresh_token) = self.current().and_then(|credential| credential.refresh_token)
		else {
			obs::log_event!(debug, "No refresh token held; authenticating instead.");

			return self.authenticate().await;
		};

		match self.exchange(Grant::RefreshToken(&refresh_token)).await {
			Err(e) if matches!(e.status, Some(400 | 401)) => {
				obs::log_event!(info, reason = %e.reason, "Refresh token rejected; authenticating.");

				self.authenticate().await
			},
			outcome => outcome,
		}
	}

	async fn exchange(&self, grant: Grant<'_>) -> FlightResult {
		let op = match grant {
			Grant::ClientCredentials => Op::Authenticate,
			Grant::RefreshToken(_) => Op::Refresh,
		};
		let span = OpSpan::new(op, "token_exchange");
		let config = &self.inner.config;

		obs::record_op_outcome(op, OpOutcome::Attempt);

		let result = span
			.instrument(async {
				let previous = match grant {
					Grant::RefreshToken(token) => Some(token),
					Grant::ClientCredentials => None,
				};
				let request = exchange::token_request(config, grant);

				self.inner.metrics.record_exchange();

				let response = self.inner.transport.send(request).await.map_err(|e| {
					AuthenticationError::new(format!("Token endpoint unreachable: {}", e.message))
				})?;

				exchange::parse_token_response(
					&response,
					&config.scope,
					previous,
					OffsetDateTime::now_utc(),
				)
			})
			.await;

		match &result {
			Ok(credential) => {
				span.record_outcome(OpOutcome::Success);

				match op {
					Op::Refresh => self.inner.metrics.record_refresh(),
					_ => self.inner.metrics.record_authentication(),
				}

				self.store(credential.clone()).await;
			},
			Err(e) => {
				span.record_outcome(OpOutcome::Failure);
				self.inner.metrics.record_failure();
				obs::log_event!(warn, op = op.as_str(), error = %e, "Credential exchange failed.");
			},
		}

		result
	}

	async fn load_cached(&self) -> Option<Credential> {
		let margin = self.inner.config.token_safety_margin;

		match self.inner.cache.load(&self.inner.cache_key).await {
			Ok(Some(credential)) if credential.is_valid_for(margin, OffsetDateTime::now_utc()) => {
				self.inner.metrics.record_cache_hit();
				*self.inner.current.write() = Some(credential.clone());

				Some(credential)
			},
			Ok(_) => None,
			Err(e) => {
				obs::log_event!(warn, error = %e, "Credential cache read failed; treating as a miss.");

				None
			},
		}
	}

	async fn store(&self, credential: Credential) {
		let ttl = StdDuration::try_from(credential.expires_in_at(OffsetDateTime::now_utc()))
			.unwrap_or(StdDuration::ZERO);

		*self.inner.current.write() = Some(credential.clone());

		if ttl.is_zero() {
			return;
		}
		if let Err(e) = self.inner.cache.save(&self.inner.cache_key, credential, ttl).await {
			obs::log_event!(warn, error = %e, "Credential cache write failed.");
		}
	}

	async fn forget_cached(&self) {
		if let Err(e) = self.inner.cache.remove(&self.inner.cache_key).await {
			obs::log_event!(warn, error = %e, "Credential cache removal failed.");
		}
	}
}
impl<C> Clone for TokenManager<C>
where
	C: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self { inner: self.inner.clone() }
	}
}
impl<C> Debug for TokenManager<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("cache_key", &self.inner.cache_key)
			.field("current", &*self.inner.current.read())
			.field("metrics", &self.inner.metrics)
			.finish()
	}
}

struct TokenState<C>
where
	C: ?Sized,
{
	config: Arc<ClientConfig>,
	transport: Arc<C>,
	cache: Arc<dyn CredentialCache>,
	cache_key: CacheKey,
	current: RwLock<Option<Credential>>,
	flights: Arc<FlightRegistry>,
	metrics: Arc<TokenMetrics>,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::{ScriptedTransport, test_config, token_response},
		http::HttpResponse,
		store::MemoryStore,
	};

	const TOKEN_PATH: &str = "/oauth/token";

	fn manager(transport: Arc<ScriptedTransport>) -> TokenManager<ScriptedTransport> {
		TokenManager::new(Arc::new(test_config()), transport, Arc::new(MemoryStore::default()))
	}

	#[tokio::test]
	async fn refresh_keeps_the_previous_refresh_token() {
		let transport = Arc::new(ScriptedTransport::default());

		transport.push(TOKEN_PATH, token_response("a1", Some("r1"), 3_600));
		transport.push(TOKEN_PATH, token_response("a2", None, 3_600));

		let manager = manager(transport.clone());

		manager.authenticate().await.expect("Authentication should succeed.");

		let refreshed = manager.refresh().await.expect("Refresh should succeed.");

		assert_eq!(refreshed.access_token.expose(), "a2");
		assert_eq!(refreshed.refresh_token.as_ref().map(|t| t.expose()), Some("r1"));

		let grants = transport.form_values(TOKEN_PATH, "grant_type");

		assert_eq!(grants, ["client_credentials", "refresh_token"]);
		assert_eq!(manager.metrics().refreshes(), 1);
	}

	#[tokio::test]
	async fn rejected_refresh_tokens_fall_back_to_authentication() {
		let transport = Arc::new(ScriptedTransport::default());

		transport.push(TOKEN_PATH, token_response("a1", Some("r1"), 3_600));
		transport.push(
			TOKEN_PATH,
			HttpResponse::new(400).with_json(&serde_json::json!({ "error": "invalid_grant" })),
		);
		transport.push(TOKEN_PATH, token_response("a3", Some("r3"), 3_600));

		let manager = manager(transport.clone());

		manager.authenticate().await.expect("Authentication should succeed.");

		let credential = manager.refresh().await.expect("Fallback authentication should succeed.");

		assert_eq!(credential.access_token.expose(), "a3");
		assert_eq!(
			transport.form_values(TOKEN_PATH, "grant_type"),
			["client_credentials", "refresh_token", "client_credentials"]
		);
	}

	#[tokio::test]
	async fn refresh_without_a_refresh_token_authenticates() {
		let transport = Arc::new(ScriptedTransport::default());

		transport.push(TOKEN_PATH, token_response("a1", None, 3_600));

		let manager = manager(transport.clone());
		let credential = manager.refresh().await.expect("Refresh should authenticate.");

		assert_eq!(credential.access_token.expose(), "a1");
		assert_eq!(transport.form_values(TOKEN_PATH, "grant_type"), ["client_credentials"]);
	}

	#[tokio::test]
	async fn network_failures_on_refresh_are_surfaced() {
		let transport = Arc::new(ScriptedTransport::default());

		transport.push(TOKEN_PATH, token_response("a1", Some("r1"), 3_600));
		transport.push_failure(TOKEN_PATH, "connection reset");

		let manager = manager(transport.clone());

		manager.authenticate().await.expect("Authentication should succeed.");

		let err = manager.refresh().await.expect_err("Network failures must surface.");

		assert!(err.reason.contains("connection reset"));
		assert_eq!(err.status, None);
		assert_eq!(transport.calls(TOKEN_PATH), 2);
		assert_eq!(manager.metrics().failures(), 1);
	}

	#[tokio::test]
	async fn accessors_reflect_the_held_credential() {
		let transport = Arc::new(ScriptedTransport::default());

		transport.push(TOKEN_PATH, token_response("a1", Some("r1"), 3_600));

		let manager = manager(transport);

		assert!(!manager.is_authenticated());
		assert_eq!(manager.expires_in_seconds(), 0);

		manager.ensure_authenticated().await.expect("Authentication should succeed.");

		assert!(manager.is_authenticated());
		assert!(manager.has_refresh_token());
		assert!((3_590..=3_600).contains(&manager.expires_in_seconds()));

		manager.invalidate().await;

		assert!(manager.current().is_none());
	}
}
