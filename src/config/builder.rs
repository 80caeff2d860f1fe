// std
use std::{net::IpAddr, time::Duration as StdDuration};
// self
use crate::{
	_prelude::*,
	auth::{ClientId, ScopeSet, TokenSecret},
	config::{ClientAuthMethod, ClientConfig, join_path},
	error::ConfigError,
	health::HealthSettings,
	rate_limit::RateLimitSettings,
	retry::RetryPolicy,
};

const DEFAULT_TOKEN_PATH: &str = "oauth/token";
const DEFAULT_REVOCATION_PATH: &str = "oauth/revoke";

#[derive(Debug)]
enum Revocation {
	Default,
	Custom(String),
	Disabled,
}

/// Builder for [`ClientConfig`] values.
///
/// Raw values are collected as given and validated together in [`Self::build`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
	base_url: String,
	client_id: String,
	client_secret: TokenSecret,
	token_url: Option<String>,
	revocation: Revocation,
	scope: Vec<String>,
	auth_method: ClientAuthMethod,
	client_version: String,
	request_timeout: StdDuration,
	token_safety_margin: Duration,
	retry: RetryPolicy,
	rate_limit: RateLimitSettings,
	health: HealthSettings,
	default_headers: Vec<(String, String)>,
}
impl ClientConfigBuilder {
	/// Creates a builder seeded with the required options and every default.
	pub fn new(
		base_url: impl Into<String>,
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
	) -> Self {
		Self {
			base_url: base_url.into(),
			client_id: client_id.into(),
			client_secret: TokenSecret::new(client_secret),
			token_url: None,
			revocation: Revocation::Default,
			scope: Vec::new(),
			auth_method: ClientAuthMethod::default(),
			client_version: concat!("oauth2-gateway/", env!("CARGO_PKG_VERSION")).into(),
			request_timeout: StdDuration::from_secs(30),
			token_safety_margin: Duration::seconds(60),
			retry: RetryPolicy::default(),
			rate_limit: RateLimitSettings::default(),
			health: HealthSettings::default(),
			default_headers: Vec::new(),
		}
	}

	/// Overrides the token endpoint (defaults to `<base>/oauth/token`).
	pub fn token_url(mut self, url: impl Into<String>) -> Self {
		self.token_url = Some(url.into());

		self
	}

	/// Overrides the revocation endpoint (defaults to `<base>/oauth/revoke`).
	pub fn revocation_url(mut self, url: impl Into<String>) -> Self {
		self.revocation = Revocation::Custom(url.into());

		self
	}

	/// Disables the revocation call; revoke then only clears local state.
	pub fn without_revocation(mut self) -> Self {
		self.revocation = Revocation::Disabled;

		self
	}

	/// Sets the requested scopes.
	pub fn scope<I, S>(mut self, scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.scope = scopes.into_iter().map(Into::into).collect();

		self
	}

	/// Overrides the client authentication method.
	pub fn auth_method(mut self, method: ClientAuthMethod) -> Self {
		self.auth_method = method;

		self
	}

	/// Overrides the client version header value.
	pub fn client_version(mut self, version: impl Into<String>) -> Self {
		self.client_version = version.into();

		self
	}

	/// Overrides the default API call timeout.
	pub fn request_timeout(mut self, timeout: StdDuration) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Overrides the token safety margin.
	pub fn token_safety_margin(mut self, margin: Duration) -> Self {
		self.token_safety_margin = margin;

		self
	}

	/// Overrides the retry policy.
	pub fn retry(mut self, policy: RetryPolicy) -> Self {
		self.retry = policy;

		self
	}

	/// Overrides the rate-limit settings.
	pub fn rate_limit(mut self, settings: RateLimitSettings) -> Self {
		self.rate_limit = settings;

		self
	}

	/// Overrides the health settings.
	pub fn health(mut self, settings: HealthSettings) -> Self {
		self.health = settings;

		self
	}

	/// Adds a header sent with every API call.
	pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.default_headers.push((name.into(), value.into()));

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<ClientConfig, ConfigError> {
		let base_url = parse_endpoint("base", &self.base_url)?;
		let token_url = match self.token_url.as_deref() {
			Some(raw) => parse_endpoint("token", raw)?,
			None => join_path(&base_url, DEFAULT_TOKEN_PATH, "token")?,
		};
		let revocation_url = match &self.revocation {
			Revocation::Default => Some(join_path(&base_url, DEFAULT_REVOCATION_PATH, "revocation")?),
			Revocation::Custom(raw) => Some(parse_endpoint("revocation", raw)?),
			Revocation::Disabled => None,
		};
		let client_id = ClientId::new(&self.client_id)?;

		if self.client_secret.is_empty() {
			return Err(ConfigError::EmptyClientSecret);
		}

		let scope = ScopeSet::new(self.scope)?;

		if self.client_version.trim().is_empty() {
			return Err(ConfigError::EmptyClientVersion);
		}
		if self.token_safety_margin.is_negative() {
			return Err(ConfigError::NegativeSafetyMargin);
		}

		for (name, value) in &self.default_headers {
			validate_header(name, value)?;
		}

		self.retry.validate()?;
		self.rate_limit.validate()?;
		self.health.validate()?;

		Ok(ClientConfig {
			base_url,
			token_url,
			revocation_url,
			client_id,
			client_secret: self.client_secret,
			scope,
			auth_method: self.auth_method,
			client_version: self.client_version,
			request_timeout: self.request_timeout,
			token_safety_margin: self.token_safety_margin,
			retry: self.retry,
			rate_limit: self.rate_limit,
			health: self.health,
			default_headers: self.default_headers,
		})
	}
}

fn parse_endpoint(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
	let url = Url::parse(raw).map_err(|source| ConfigError::InvalidUrl { field, source })?;

	validate_endpoint(field, &url)?;

	Ok(url)
}

fn validate_endpoint(field: &'static str, url: &Url) -> Result<(), ConfigError> {
	match url.scheme() {
		"https" => Ok(()),
		"http" if is_loopback(url) => Ok(()),
		_ => Err(ConfigError::InsecureEndpoint { field, url: url.to_string() }),
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host_str() {
		Some("localhost") => true,
		Some(host) => host
			.trim_start_matches('[')
			.trim_end_matches(']')
			.parse::<IpAddr>()
			.map(|ip| ip.is_loopback())
			.unwrap_or(false),
		None => false,
	}
}

pub(crate) fn validate_header(name: &str, value: &str) -> Result<(), ConfigError> {
	let name_ok = !name.is_empty()
		&& name.bytes().all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b));
	let value_ok = value.bytes().all(|b| b == b'\t' || (b' '..=b'~').contains(&b) || b >= 0x80);

	if name_ok && value_ok {
		Ok(())
	} else {
		Err(ConfigError::InvalidHeader { name: name.to_owned() })
	}
}
