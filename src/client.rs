//! Resilient API client: rate limiting, authentication, retries, health, and normalization
//! behind one uniform [`ResponseEnvelope`].
//!
//! Each call walks the same pipeline:
//!
//! 1. consume one point from both rate-limit windows (rejection short-circuits, no I/O);
//! 2. obtain a credential from the [`TokenManager`];
//! 3. send the request with security headers and the bearer token;
//! 4. classify the outcome: a 401 refreshes once and retries once, transient failures are
//!    retried with jittered exponential backoff, everything else is surfaced;
//! 5. normalize the final outcome into an envelope.
//!
//! Every attempt feeds the [`HealthMonitor`].

pub mod pagination;
pub mod request;

pub use pagination::*;
pub use request::*;

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::{Credential, RequestId},
	config::{self, ClientConfig},
	envelope::{self, ResponseEnvelope},
	error::{ConfigError, HttpError},
	health::{HealthMonitor, HealthProbe, HealthReport},
	http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport},
	obs::{self, Op, OpOutcome, OpSpan},
	rate_limit::RateLimiter,
	store::{CounterStore, CredentialCache, MemoryStore},
	token::TokenManager,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

/// Client type alias backed by the default reqwest transport.
#[cfg(feature = "reqwest")]
pub type ReqwestApiClient = ApiClient<ReqwestHttpClient>;

/// External state backends of a client.
///
/// Clients built from clones of the same `Stores` share one credential cache entry and one
/// rate-limit budget.
#[derive(Clone)]
pub struct Stores {
	/// Credential cache.
	pub credentials: Arc<dyn CredentialCache>,
	/// Rate-limit counters.
	pub counters: Arc<dyn CounterStore>,
}
impl Stores {
	/// Uses one backend for both concerns.
	pub fn shared<S>(store: Arc<S>) -> Self
	where
		S: 'static + CredentialCache + CounterStore,
	{
		Self { credentials: store.clone(), counters: store }
	}
}
impl Default for Stores {
	fn default() -> Self {
		Self::shared(Arc::new(MemoryStore::default()))
	}
}
impl Debug for Stores {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Stores").finish_non_exhaustive()
	}
}

/// Outbound API client for one configured backend.
///
/// Construction performs no I/O. Call [`ApiClient::initialize`] to authenticate and start the
/// background health probe, and [`ApiClient::shutdown`] to stop it and revoke the credential.
/// Dropping the client stops the probe as well.
pub struct ApiClient<C>
where
	C: ?Sized + HttpTransport,
{
	inner: Arc<ClientInner<C>>,
	probe: Mutex<Option<HealthProbe>>,
}
impl<C> ApiClient<C>
where
	C: ?Sized + HttpTransport,
{
	/// Builds an idle client over `transport` and `stores`.
	pub fn with_transport(config: ClientConfig, transport: Arc<C>, stores: Stores) -> Self {
		let config = Arc::new(config);
		let tokens = TokenManager::new(config.clone(), transport.clone(), stores.credentials);
		let limiter = RateLimiter::new(stores.counters, config.rate_limit.clone());
		let health = HealthMonitor::new(config.health.max_consecutive_failures);
		let identity = config.identity();

		Self {
			inner: Arc::new(ClientInner { config, transport, tokens, limiter, health, identity }),
			probe: Mutex::new(None),
		}
	}

	/// Active configuration.
	pub fn config(&self) -> &ClientConfig {
		&self.inner.config
	}

	/// Token manager owning the credential.
	pub fn tokens(&self) -> &TokenManager<C> {
		&self.inner.tokens
	}

	/// Rate limiter guarding the outbound budget.
	pub fn rate_limiter(&self) -> &RateLimiter {
		&self.inner.limiter
	}

	/// Health monitor fed by calls and probes.
	pub fn health(&self) -> &HealthMonitor {
		&self.inner.health
	}

	/// Authenticates (cache-first) and starts the health probe when enabled.
	pub async fn initialize(&self) -> Result<()> {
		self.inner.tokens.ensure_authenticated().await?;

		if self.inner.config.health.enabled {
			self.start_probe();
		}

		obs::log_event!(info, base_url = %self.inner.config.base_url, "Client initialized.");

		Ok(())
	}

	/// Stops the health probe and revokes the credential. Never fails.
	pub async fn shutdown(&self) {
		let probe = self.probe.lock().take();

		if let Some(probe) = probe {
			probe.stop();
		}

		self.inner.tokens.revoke().await;

		obs::log_event!(info, "Client shut down.");
	}

	/// Runs one health probe now and returns the resulting report.
	pub async fn check_health(&self) -> HealthReport {
		self.inner.probe().await;

		self.health_status()
	}

	/// Read-only health projection.
	pub fn health_status(&self) -> HealthReport {
		let state = self.inner.health.state();

		HealthReport {
			status: state.status,
			last_checked_at: state.last_checked_at,
			consecutive_failures: state.consecutive_failures,
			is_authenticated: self.inner.tokens.is_authenticated(),
			token_expires_in_seconds: self.inner.tokens.expires_in_seconds(),
		}
	}

	/// Returns true while the background probe task is running.
	pub fn is_probing(&self) -> bool {
		self.probe.lock().as_ref().is_some_and(|probe| !probe.is_finished())
	}

	/// Runs `request` through the pipeline.
	pub async fn execute(&self, request: ApiRequest) -> ResponseEnvelope {
		self.inner.dispatch(&request).await.into_envelope()
	}

	/// `GET path?query`.
	pub async fn get(
		&self,
		path: &str,
		query: &[(&str, &str)],
		options: RequestOptions,
	) -> ResponseEnvelope {
		self.send(HttpMethod::Get, path, None, query, options).await
	}

	/// `POST path?query` with an optional JSON body.
	pub async fn post(
		&self,
		path: &str,
		body: Option<Value>,
		query: &[(&str, &str)],
		options: RequestOptions,
	) -> ResponseEnvelope {
		self.send(HttpMethod::Post, path, body, query, options).await
	}

	/// `PUT path?query` with an optional JSON body.
	pub async fn put(
		&self,
		path: &str,
		body: Option<Value>,
		query: &[(&str, &str)],
		options: RequestOptions,
	) -> ResponseEnvelope {
		self.send(HttpMethod::Put, path, body, query, options).await
	}

	/// `PATCH path?query` with an optional JSON body.
	pub async fn patch(
		&self,
		path: &str,
		body: Option<Value>,
		query: &[(&str, &str)],
		options: RequestOptions,
	) -> ResponseEnvelope {
		self.send(HttpMethod::Patch, path, body, query, options).await
	}

	/// `DELETE path?query`.
	pub async fn delete(
		&self,
		path: &str,
		query: &[(&str, &str)],
		options: RequestOptions,
	) -> ResponseEnvelope {
		self.send(HttpMethod::Delete, path, None, query, options).await
	}

	/// Multipart `POST path` with the file in the `file` field plus `fields`.
	pub async fn upload_file(
		&self,
		path: &str,
		bytes: impl Into<Vec<u8>>,
		filename: &str,
		fields: Vec<(String, String)>,
	) -> ResponseEnvelope {
		self.execute(ApiRequest::new(HttpMethod::Post, path).file(bytes, filename, fields)).await
	}

	/// `GET path?query` returning the raw body and headers.
	pub async fn download_file(
		&self,
		path: &str,
		query: &[(&str, &str)],
	) -> Result<DownloadedFile, ResponseEnvelope> {
		let request = ApiRequest::new(HttpMethod::Get, path)
			.queries(query.iter().copied())
			.options(RequestOptions::default().header("accept", "*/*"));
		let dispatched = self.inner.dispatch(&request).await;

		match dispatched.outcome {
			Ok(response) => Ok(DownloadedFile { bytes: response.body, headers: response.headers }),
			Err(e) => Err(Dispatched { outcome: Err(e), ..dispatched }.into_envelope()),
		}
	}

	async fn send(
		&self,
		method: HttpMethod,
		path: &str,
		body: Option<Value>,
		query: &[(&str, &str)],
		options: RequestOptions,
	) -> ResponseEnvelope {
		let mut request = ApiRequest::new(method, path).queries(query.iter().copied()).options(options);

		if let Some(body) = body {
			request = request.json(body);
		}

		self.execute(request).await
	}

	fn start_probe(&self) {
		let mut probe = self.probe.lock();

		if probe.as_ref().is_some_and(|probe| !probe.is_finished()) {
			return;
		}

		let client = Arc::downgrade(&self.inner);

		*probe = Some(HealthProbe::spawn(self.inner.config.health.probe_interval, move || {
			let inner = client.upgrade()?;

			Some(async move {
				inner.probe().await;
			})
		}));
	}
}
#[cfg(feature = "reqwest")]
impl ApiClient<ReqwestHttpClient> {
	/// Builds an idle client over reqwest and in-memory stores.
	pub fn new(config: ClientConfig) -> Result<Self> {
		let transport = ReqwestHttpClient::with_timeout(config.request_timeout)?;

		Ok(Self::with_transport(config, Arc::new(transport), Stores::default()))
	}
}
impl<C> Debug for ApiClient<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiClient")
			.field("config", &self.inner.config)
			.field("health", &self.inner.health.state())
			.field("probing", &self.is_probing())
			.finish()
	}
}

struct ClientInner<C>
where
	C: ?Sized + HttpTransport,
{
	config: Arc<ClientConfig>,
	transport: Arc<C>,
	tokens: TokenManager<C>,
	limiter: RateLimiter,
	health: HealthMonitor,
	identity: String,
}
impl<C> ClientInner<C>
where
	C: ?Sized + HttpTransport,
{
	async fn dispatch(&self, request: &ApiRequest) -> Dispatched {
		let request_id = request
			.options
			.request_id
			.clone()
			.filter(|id| !id.is_empty())
			.unwrap_or_else(|| RequestId::generate().to_string());
		let span = OpSpan::new(Op::Request, "dispatch").with_request_id(&request_id);
		let mut attempts = 0;
		let outcome = {
			let run = span.instrument(self.run(request, &request_id, &mut attempts));

			match &request.options.cancel {
				Some(cancel) => tokio::select! {
					biased;
					_ = cancel.cancelled() => Err(Error::Cancelled),
					outcome = run => outcome,
				},
				None => run.await,
			}
		};

		span.record_attempts(attempts);
		span.record_outcome(if outcome.is_ok() { OpOutcome::Success } else { OpOutcome::Failure });

		if matches!(outcome, Err(Error::Cancelled)) {
			obs::log_event!(debug, request_id = %request_id, "Request cancelled by the caller.");
		}

		Dispatched { outcome, request_id, attempts }
	}

	async fn run(
		&self,
		request: &ApiRequest,
		request_id: &str,
		attempts: &mut u32,
	) -> Result<HttpResponse> {
		let options = &request.options;

		if !options.skip_rate_limit {
			self.limiter.consume(&self.identity).await?;
		}

		let mut credential = if options.skip_auth {
			None
		} else {
			Some(self.tokens.ensure_authenticated().await?)
		};
		let policy = &self.config.retry;
		let max_retries = options.max_retries.unwrap_or(policy.max_retries);
		let mut retries = 0;
		let mut refreshed = false;

		loop {
			let outgoing = self.prepare(request, request_id, credential.as_ref())?;

			*attempts += 1;
			obs::record_op_outcome(Op::Request, OpOutcome::Attempt);

			let error = match self.transport.send(outgoing).await {
				Ok(response) if response.is_success() => {
					self.health.record_success();

					return Ok(response);
				},
				Ok(response) => Error::Http(HttpError::new(response)),
				// Refused before reaching the wire; says nothing about upstream health.
				Err(e) if e.invalid_request =>
					return Err(ConfigError::InvalidRequest { message: e.message }.into()),
				Err(e) => Error::Network(e),
			};

			self.health.record_failure();

			// The call after a refresh is the only one it gets.
			if refreshed {
				obs::log_event!(warn, request_id, error = %error, "Retry after refresh failed; logging out.");
				self.tokens.revoke().await;

				return Err(error);
			}

			let rejected = match (error.status(), &credential) {
				(Some(401), Some(current)) => Some(current.clone()),
				_ => None,
			};

			if let Some(rejected) = rejected {
				if !self.tokens.has_refresh_token() {
					obs::log_event!(info, request_id, "Credential rejected without a refresh token.");
					self.tokens.invalidate().await;

					return Err(error);
				}

				match self.tokens.refresh_rejected(&rejected).await {
					Ok(fresh) => {
						credential = Some(fresh);
						refreshed = true;

						continue;
					},
					Err(e) => {
						self.tokens.revoke().await;

						return Err(e.into());
					},
				}
			}
			if retries < max_retries && policy.is_retryable(&error) {
				retries += 1;

				let retry_after = match &error {
					Error::Http(e) => e.response.retry_after(),
					_ => None,
				};
				let delay = policy.delay_for(retries, retry_after);

				obs::record_op_outcome(Op::Request, OpOutcome::Retry);
				obs::log_event!(
					debug,
					request_id,
					retry = retries,
					delay_ms = delay.as_millis() as u64,
					error = %error,
					"Retrying request."
				);
				tokio::time::sleep(delay).await;

				continue;
			}

			return Err(error);
		}
	}

	fn prepare(
		&self,
		request: &ApiRequest,
		request_id: &str,
		credential: Option<&Credential>,
	) -> Result<HttpRequest> {
		let mut url = self.config.endpoint(&request.path)?;

		if !request.query.is_empty() {
			url.query_pairs_mut().extend_pairs(&request.query);
		}

		let mut outgoing = HttpRequest::new(request.method, url)
			.with_security_headers(request_id, &self.config.client_version)
			.header("accept", "application/json")
			.timeout(request.options.timeout.unwrap_or(self.config.request_timeout))
			.body(request.body.clone());

		for (name, value) in &request.options.headers {
			config::builder::validate_header(name, value)?;
		}
		for (name, value) in self.config.default_headers.iter().chain(&request.options.headers) {
			outgoing.headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
			outgoing.headers.push((name.clone(), value.clone()));
		}
		if let Some(credential) = credential {
			outgoing = outgoing.header("authorization", credential.authorization_header());
		}

		Ok(outgoing)
	}

	async fn probe(&self) -> bool {
		let span = OpSpan::new(Op::HealthProbe, "probe");

		span.instrument(async {
			let settings = &self.config.health;
			let url = match self.config.endpoint(&settings.probe_path) {
				Ok(url) => url,
				Err(e) => {
					obs::log_event!(warn, error = %e, "Health probe path is invalid.");
					self.health.record_failure();

					return false;
				},
			};
			let mut request = HttpRequest::new(HttpMethod::Get, url)
				.with_security_headers(&RequestId::generate(), &self.config.client_version)
				.timeout(settings.probe_timeout);

			if let Some(credential) = self.tokens.current() {
				request = request.header("authorization", credential.authorization_header());
			}

			obs::record_op_outcome(Op::HealthProbe, OpOutcome::Attempt);

			let healthy = match self.transport.send(request).await {
				Ok(response) if response.is_success() => true,
				Ok(response) => {
					obs::log_event!(debug, status = response.status, "Health probe failed.");

					false
				},
				Err(e) => {
					obs::log_event!(debug, error = %e, "Health probe unreachable.");

					false
				},
			};

			if healthy {
				span.record_outcome(OpOutcome::Success);
				self.health.record_success();
			} else {
				span.record_outcome(OpOutcome::Failure);
				self.health.record_failure();
			}

			healthy
		})
		.await
	}
}

struct Dispatched {
	outcome: Result<HttpResponse>,
	request_id: String,
	attempts: u32,
}
impl Dispatched {
	fn into_envelope(self) -> ResponseEnvelope {
		match self.outcome {
			Ok(response) => envelope::from_success(&response, &self.request_id)
				.with_attempts(Some(response.status), self.attempts),
			Err(e) => envelope::from_error(&e, &self.request_id).with_attempts(e.status(), self.attempts),
		}
	}
}
