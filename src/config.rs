//! Validated client configuration.
//!
//! Every recognized option is an explicit field with a documented default. Values are checked
//! once by [`ClientConfigBuilder::build`], so a constructed [`ClientConfig`] is always usable.

/// Builder API for assembling client configurations.
pub mod builder;

pub use builder::*;

// std
use std::time::Duration as StdDuration;
// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{ClientId, ScopeSet, TokenSecret},
	error::ConfigError,
	health::HealthSettings,
	rate_limit::RateLimitSettings,
	retry::RetryPolicy,
	store::CacheKey,
};

/// Client authentication modes for token endpoint calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	/// Form POST body parameters for `client_id`/`client_secret`.
	#[default]
	ClientSecretPost,
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
}

/// Immutable, validated client configuration.
#[derive(Clone)]
pub struct ClientConfig {
	/// Base URL every request path is resolved against.
	pub base_url: Url,
	/// Token endpoint.
	pub token_url: Url,
	/// Revocation endpoint; `None` skips the network call on revoke.
	pub revocation_url: Option<Url>,
	/// OAuth client identifier.
	pub client_id: ClientId,
	/// OAuth client secret.
	pub client_secret: TokenSecret,
	/// Scopes requested by the client-credentials exchange.
	pub scope: ScopeSet,
	/// How client credentials reach the token endpoint.
	pub auth_method: ClientAuthMethod,
	/// Value of the client version header.
	pub client_version: String,
	/// Default timeout of API calls.
	pub request_timeout: StdDuration,
	/// Minimum remaining lifetime for a credential to count as valid.
	pub token_safety_margin: Duration,
	/// Retry behavior of the pipeline.
	pub retry: RetryPolicy,
	/// Dual-window quotas.
	pub rate_limit: RateLimitSettings,
	/// Health probe and threshold.
	pub health: HealthSettings,
	/// Headers added to every API call.
	pub default_headers: Vec<(String, String)>,
}
impl ClientConfig {
	/// Creates a builder from the required options.
	pub fn builder(
		base_url: impl Into<String>,
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
	) -> ClientConfigBuilder {
		ClientConfigBuilder::new(base_url, client_id, client_secret)
	}

	/// Stable fingerprint of the client identity.
	///
	/// Base64 (no padding, URL-safe) SHA-256 over the token URL, client id, and normalized
	/// scope. It keys the credential cache entry and the rate-limit counters, so every process
	/// sharing one credential also shares one budget.
	pub fn identity(&self) -> String {
		let mut hasher = Sha256::new();

		hasher.update(self.token_url.as_str().as_bytes());
		hasher.update(b"\n");
		hasher.update(self.client_id.as_bytes());
		hasher.update(b"\n");
		hasher.update(self.scope.normalized().as_bytes());

		URL_SAFE_NO_PAD.encode(hasher.finalize())
	}

	/// Credential cache key of this client.
	pub fn cache_key(&self) -> CacheKey {
		CacheKey::credential(&self.rate_limit.key_prefix, &self.identity())
	}

	/// Resolves `path` against the base URL.
	///
	/// Paths are always relative to the base, even with a leading slash, so a base of
	/// `https://api.example.com/v2` and a path of `/users` yield
	/// `https://api.example.com/v2/users`. Absolute URLs and paths that escape the base (for
	/// example through `..`) fail with [`ConfigError::OutsideBase`].
	pub fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
		join_path(&self.base_url, path, "path")
	}
}
impl Debug for ClientConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientConfig")
			.field("base_url", &self.base_url.as_str())
			.field("token_url", &self.token_url.as_str())
			.field("revocation_url", &self.revocation_url.as_ref().map(Url::as_str))
			.field("client_id", &self.client_id)
			.field("client_secret_set", &!self.client_secret.is_empty())
			.field("scope", &self.scope)
			.field("auth_method", &self.auth_method)
			.field("client_version", &self.client_version)
			.field("request_timeout", &self.request_timeout)
			.field("token_safety_margin", &self.token_safety_margin)
			.field("retry", &self.retry)
			.field("rate_limit", &self.rate_limit)
			.field("health", &self.health)
			.field("default_headers", &self.default_headers)
			.finish()
	}
}

pub(crate) fn join_path(base: &Url, path: &str, field: &'static str) -> Result<Url, ConfigError> {
	let outside = || ConfigError::OutsideBase { field, path: path.to_owned() };

	// Absolute URLs would replace the base outright.
	if Url::parse(path).is_ok() {
		return Err(outside());
	}

	let mut base = base.clone();

	if !base.path().ends_with('/') {
		let with_slash = format!("{}/", base.path());

		base.set_path(&with_slash);
	}

	let joined = base
		.join(path.trim_start_matches('/'))
		.map_err(|source| ConfigError::InvalidUrl { field, source })?;

	if joined.origin() != base.origin() || !joined.path().starts_with(base.path()) {
		return Err(outside());
	}

	Ok(joined)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn config(base: &str) -> ClientConfig {
		ClientConfig::builder(base, "client-1", "secret-1")
			.build()
			.expect("Fixture configuration should be valid.")
	}

	#[test]
	fn endpoints_resolve_relative_to_the_base() {
		let nested = config("https://api.example.com/v2");
		let slashed = config("https://api.example.com/v2/");

		assert_eq!(
			nested.endpoint("/users").expect("Path should join.").as_str(),
			"https://api.example.com/v2/users"
		);
		assert_eq!(
			slashed.endpoint("users/7").expect("Path should join.").as_str(),
			"https://api.example.com/v2/users/7"
		);
		assert_eq!(nested.token_url.as_str(), "https://api.example.com/v2/oauth/token");
	}

	#[test]
	fn endpoints_never_leave_the_base() {
		let config = config("https://api.example.com/v2");

		for path in [
			"https://attacker.example/steal",
			"http://api.example.com/v2/users",
			"\\\\attacker.example/steal",
			"../admin",
			"/users/../../admin",
		] {
			let err = config.endpoint(path).expect_err("Foreign paths must be rejected.");

			assert!(
				matches!(err, ConfigError::OutsideBase { .. }),
				"`{path}` should be rejected as outside the base."
			);
		}

		assert_eq!(
			config.endpoint("users?active=true").expect("Relative paths should join.").as_str(),
			"https://api.example.com/v2/users?active=true"
		);
		assert_eq!(
			config.endpoint("//attacker.example/steal").expect("Leading slashes are trimmed.").host_str(),
			Some("api.example.com")
		);
	}

	#[test]
	fn identity_depends_on_client_and_scope() {
		let a = config("https://api.example.com");
		let b = config("https://api.example.com");
		let scoped = ClientConfig::builder("https://api.example.com", "client-1", "secret-1")
			.scope(["read"])
			.build()
			.expect("Scoped configuration should be valid.");

		assert_eq!(a.identity(), b.identity());
		assert_ne!(a.identity(), scoped.identity());
		assert!(!a.identity().contains('='));
		assert!(a.cache_key().as_str().starts_with("oauth2_gateway:credential:"));
	}

	#[test]
	fn debug_hides_the_secret() {
		let rendered = format!("{:?}", config("https://api.example.com"));

		assert!(rendered.contains("client_secret_set: true"));
		assert!(!rendered.contains("secret-1"));
	}
}
