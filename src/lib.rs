//! Resilient outbound API client: single-flight OAuth 2.0 credentials, shared dual-window
//! rate limits, retrying transport, and health tracking behind one uniform response envelope.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod health;
pub mod http;
pub mod obs;
pub mod rate_limit;
pub mod retry;
pub mod store;
pub mod token;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for tests; enabled via `cfg(test)` or the `test`
	//! crate feature.

	pub use crate::_prelude::*;

	// std
	use std::{collections::VecDeque, time::Duration as StdDuration};
	// self
	#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;
	use crate::{
		config::ClientConfig,
		error::NetworkError,
		http::{HttpRequest, HttpResponse, HttpTransport, RequestBody, TransportFuture},
		retry::RetryPolicy,
	};

	/// Base URL of [`test_config`]; API paths resolve below `/v1`.
	pub const TEST_BASE_URL: &str = "https://api.test.local/v1";

	enum Scripted {
		Respond(HttpResponse),
		Fail(NetworkError),
	}

	/// In-process [`HttpTransport`] replaying scripted outcomes per URL path.
	///
	/// Outcomes queued for a path are consumed in order; a path without a queued outcome
	/// answers `404`. Every request is recorded before the optional delay elapses.
	#[derive(Default)]
	pub struct ScriptedTransport {
		scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
		sent: Mutex<Vec<HttpRequest>>,
		delay: Option<StdDuration>,
	}
	impl ScriptedTransport {
		/// Delays every response by `delay`.
		pub fn with_delay(mut self, delay: StdDuration) -> Self {
			self.delay = Some(delay);

			self
		}

		/// Queues `response` for `path`.
		pub fn push(&self, path: &str, response: HttpResponse) {
			self.scripts.lock().entry(path.to_owned()).or_default().push_back(Scripted::Respond(response));
		}

		/// Queues a network failure for `path`.
		pub fn push_failure(&self, path: &str, message: &str) {
			self.push_error(path, NetworkError::new(message));
		}

		/// Queues `error` for `path`.
		pub fn push_error(&self, path: &str, error: NetworkError) {
			self.scripts.lock().entry(path.to_owned()).or_default().push_back(Scripted::Fail(error));
		}

		/// Requests sent to `path`, oldest first.
		pub fn requests(&self, path: &str) -> Vec<HttpRequest> {
			self.sent.lock().iter().filter(|request| request.url.path() == path).cloned().collect()
		}

		/// Number of requests sent to `path`.
		pub fn calls(&self, path: &str) -> usize {
			self.sent.lock().iter().filter(|request| request.url.path() == path).count()
		}

		/// Values of the form field `key` across requests sent to `path`.
		pub fn form_values(&self, path: &str, key: &str) -> Vec<String> {
			self.requests(path)
				.into_iter()
				.filter_map(|request| match request.body {
					RequestBody::Form(pairs) =>
						pairs.into_iter().find(|(name, _)| name == key).map(|(_, value)| value),
					_ => None,
				})
				.collect()
		}
	}
	impl HttpTransport for ScriptedTransport {
		fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
			Box::pin(async move {
				let path = request.url.path().to_owned();

				self.sent.lock().push(request);

				if let Some(delay) = self.delay {
					tokio::time::sleep(delay).await;
				}

				let scripted = self.scripts.lock().get_mut(&path).and_then(VecDeque::pop_front);

				match scripted {
					Some(Scripted::Respond(response)) => Ok(response),
					Some(Scripted::Fail(error)) => Err(error),
					None => Ok(HttpResponse::new(404)),
				}
			})
		}
	}

	/// Configuration rooted at [`TEST_BASE_URL`] with the token endpoints at `/oauth/*` and
	/// millisecond backoff without jitter.
	pub fn test_config() -> ClientConfig {
		ClientConfig::builder(TEST_BASE_URL, "client-test", "secret-test")
			.token_url("https://api.test.local/oauth/token")
			.revocation_url("https://api.test.local/oauth/revoke")
			.retry(
				RetryPolicy::default()
					.with_delays(StdDuration::from_millis(1), StdDuration::from_millis(5))
					.with_jitter(0.),
			)
			.build()
			.expect("Test configuration should be valid.")
	}

	/// Token endpoint success body.
	pub fn token_response(access: &str, refresh: Option<&str>, expires_in: i64) -> HttpResponse {
		let mut body = serde_json::json!({
			"access_token": access,
			"token_type": "Bearer",
			"expires_in": expires_in,
		});

		if let Some(refresh) = refresh {
			body["refresh_token"] = refresh.into();
		}

		HttpResponse::new(200).with_json(&body)
	}

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	#[cfg(feature = "reqwest")]
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
