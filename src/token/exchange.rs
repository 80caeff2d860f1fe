//! Token endpoint wire format: request construction and response parsing.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::Deserializer;
// self
use crate::{
	_prelude::*,
	auth::{Credential, RequestId, ScopeSet, TokenSecret},
	config::{ClientAuthMethod, ClientConfig},
	error::AuthenticationError,
	http::{HttpMethod, HttpRequest, HttpResponse, RequestBody},
};

/// Grant sent to the token endpoint.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Grant<'a> {
	ClientCredentials,
	RefreshToken(&'a TokenSecret),
}
impl Grant<'_> {
	pub(crate) const fn as_str(&self) -> &'static str {
		match self {
			Grant::ClientCredentials => "client_credentials",
			Grant::RefreshToken(_) => "refresh_token",
		}
	}
}

#[derive(Deserialize)]
struct TokenResponse {
	access_token: String,
	#[serde(default)]
	refresh_token: Option<String>,
	#[serde(default)]
	token_type: Option<String>,
	#[serde(default, deserialize_with = "lenient_seconds")]
	expires_in: Option<i64>,
	#[serde(default)]
	scope: Option<String>,
}

#[derive(Deserialize)]
struct OAuthErrorBody {
	error: String,
	#[serde(default)]
	error_description: Option<String>,
}

/// Builds the token endpoint request for `grant`.
pub(crate) fn token_request(config: &ClientConfig, grant: Grant<'_>) -> HttpRequest {
	let mut form = vec![("grant_type".to_owned(), grant.as_str().to_owned())];

	match grant {
		Grant::ClientCredentials =>
			if !config.scope.is_empty() {
				form.push(("scope".into(), config.scope.normalized()));
			},
		Grant::RefreshToken(token) => form.push(("refresh_token".into(), token.expose().into())),
	}

	let mut request = HttpRequest::new(HttpMethod::Post, config.token_url.clone())
		.with_security_headers(&RequestId::generate(), &config.client_version)
		.header("accept", "application/json")
		.timeout(config.request_timeout);

	match config.auth_method {
		ClientAuthMethod::ClientSecretPost => {
			form.push(("client_id".into(), config.client_id.to_string()));
			form.push(("client_secret".into(), config.client_secret.expose().into()));
		},
		ClientAuthMethod::ClientSecretBasic => {
			let raw = format!("{}:{}", config.client_id, config.client_secret.expose());

			request = request.header("authorization", format!("Basic {}", STANDARD.encode(raw)));
		},
	}

	request.body(RequestBody::Form(form))
}

/// Builds the revocation request for `token`, or `None` when revocation is disabled.
pub(crate) fn revocation_request(config: &ClientConfig, token: &TokenSecret) -> Option<HttpRequest> {
	let url = config.revocation_url.clone()?;
	let body = serde_json::json!({
		"token": token.expose(),
		"client_id": &*config.client_id,
		"client_secret": config.client_secret.expose(),
	});

	Some(
		HttpRequest::new(HttpMethod::Post, url)
			.with_security_headers(&RequestId::generate(), &config.client_version)
			.timeout(config.request_timeout)
			.body(RequestBody::Json(body)),
	)
}

/// Converts a token endpoint response into a [`Credential`].
///
/// When the response omits `scope` the `requested` scope is recorded; when it omits
/// `refresh_token` the `previous_refresh` token is retained.
pub(crate) fn parse_token_response(
	response: &HttpResponse,
	requested: &ScopeSet,
	previous_refresh: Option<&TokenSecret>,
	now: OffsetDateTime,
) -> Result<Credential, AuthenticationError> {
	if !response.is_success() {
		return Err(endpoint_error(response));
	}

	let mut deserializer = serde_json::Deserializer::from_slice(&response.body);
	let parsed: TokenResponse =
		serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
			AuthenticationError::new(format!(
				"Token response field `{}` is malformed: {}",
				e.path(),
				e.inner()
			))
			.with_status(response.status)
		})?;
	let expires_in = match parsed.expires_in {
		Some(seconds) if seconds > 0 => Duration::seconds(seconds),
		Some(_) =>
			return Err(AuthenticationError::new("Token response expires_in must be positive")
				.with_status(response.status)),
		None =>
			return Err(AuthenticationError::new("Token response is missing expires_in")
				.with_status(response.status)),
	};
	let scope = match parsed.scope.as_deref() {
		Some(raw) => ScopeSet::from_str(raw).map_err(|e| {
			AuthenticationError::new(format!("Token response scope is invalid: {e}"))
				.with_status(response.status)
		})?,
		None => requested.clone(),
	};
	let mut builder = Credential::builder()
		.access_token(parsed.access_token)
		.issued_at(now)
		.expires_in(expires_in)
		.scope(scope);

	if let Some(token_type) = parsed.token_type {
		builder = builder.token_type(token_type);
	}

	match (parsed.refresh_token, previous_refresh) {
		(Some(refresh), _) => builder = builder.refresh_token(refresh),
		(None, Some(previous)) => builder = builder.refresh_token(previous.expose()),
		(None, None) => (),
	}

	builder.build().map_err(|e| {
		AuthenticationError::new(format!("Token response is unusable: {e}")).with_status(response.status)
	})
}

/// Maps a non-2xx token endpoint response into an [`AuthenticationError`].
pub(crate) fn endpoint_error(response: &HttpResponse) -> AuthenticationError {
	let reason = serde_json::from_slice::<OAuthErrorBody>(&response.body)
		.map(|body| match body.error_description {
			Some(description) => format!("{}: {description}", body.error),
			None => body.error,
		})
		.unwrap_or_else(|_| format!("Token endpoint responded with {}", response.status_text()));

	AuthenticationError::new(reason).with_status(response.status)
}

fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Seconds {
		Number(i64),
		Float(f64),
		Text(String),
	}

	Ok(match Option::<Seconds>::deserialize(deserializer)? {
		None => None,
		Some(Seconds::Number(value)) => Some(value),
		Some(Seconds::Float(value)) => Some(value as i64),
		Some(Seconds::Text(value)) =>
			Some(value.trim().parse().map_err(serde::de::Error::custom)?),
	})
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	const NOW: OffsetDateTime = macros::datetime!(2025-01-01 00:00 UTC);

	fn config(method: ClientAuthMethod) -> ClientConfig {
		ClientConfig::builder("https://api.example.com", "client-1", "secret-1")
			.scope(["read", "write"])
			.auth_method(method)
			.build()
			.expect("Exchange fixture configuration should be valid.")
	}

	fn form_of(request: &HttpRequest) -> Vec<(String, String)> {
		match &request.body {
			RequestBody::Form(pairs) => pairs.clone(),
			other => panic!("Expected a form body, got {other:?}."),
		}
	}

	#[test]
	fn client_secret_post_puts_credentials_in_the_form() {
		let request = token_request(&config(ClientAuthMethod::ClientSecretPost), Grant::ClientCredentials);
		let form = form_of(&request);

		assert_eq!(request.url.as_str(), "https://api.example.com/oauth/token");
		assert!(form.contains(&("grant_type".into(), "client_credentials".into())));
		assert!(form.contains(&("scope".into(), "read write".into())));
		assert!(form.contains(&("client_id".into(), "client-1".into())));
		assert!(form.contains(&("client_secret".into(), "secret-1".into())));
		assert!(request.header_value("authorization").is_none());
		assert!(request.header_value("x-request-id").is_some());
	}

	#[test]
	fn client_secret_basic_uses_the_authorization_header() {
		let refresh = TokenSecret::new("refresh-1");
		let request =
			token_request(&config(ClientAuthMethod::ClientSecretBasic), Grant::RefreshToken(&refresh));
		let form = form_of(&request);

		assert_eq!(request.header_value("authorization"), Some("Basic Y2xpZW50LTE6c2VjcmV0LTE="));
		assert!(form.contains(&("refresh_token".into(), "refresh-1".into())));
		assert!(!form.iter().any(|(key, _)| key == "client_secret"));
	}

	#[test]
	fn responses_fill_defaults() {
		let requested = ScopeSet::from_str("read").expect("Scope should parse.");
		let previous = TokenSecret::new("old-refresh");
		let response = HttpResponse::new(200)
			.with_json(&serde_json::json!({ "access_token": "a1", "expires_in": "3600" }));
		let credential = parse_token_response(&response, &requested, Some(&previous), NOW)
			.expect("Minimal response should parse.");

		assert_eq!(credential.token_type, "Bearer");
		assert_eq!(credential.scope, requested);
		assert_eq!(credential.expires_at, macros::datetime!(2025-01-01 01:00 UTC));
		assert_eq!(credential.refresh_token.as_ref().map(TokenSecret::expose), Some("old-refresh"));
	}

	#[test]
	fn malformed_responses_are_authentication_errors() {
		let scope = ScopeSet::default();
		let missing_expiry =
			HttpResponse::new(200).with_json(&serde_json::json!({ "access_token": "a1" }));
		let zero_expiry = HttpResponse::new(200)
			.with_json(&serde_json::json!({ "access_token": "a1", "expires_in": 0 }));
		let wrong_type = HttpResponse::new(200)
			.with_json(&serde_json::json!({ "access_token": 7, "expires_in": 60 }));

		assert!(
			parse_token_response(&missing_expiry, &scope, None, NOW)
				.expect_err("Missing expiry must fail.")
				.reason
				.contains("expires_in")
		);
		assert!(parse_token_response(&zero_expiry, &scope, None, NOW).is_err());
		assert!(
			parse_token_response(&wrong_type, &scope, None, NOW)
				.expect_err("Wrong field type must fail.")
				.reason
				.contains("access_token")
		);
	}

	#[test]
	fn oauth_error_bodies_populate_the_reason() {
		let response = HttpResponse::new(400).with_json(&serde_json::json!({
			"error": "invalid_client",
			"error_description": "Unknown client",
		}));
		let err = parse_token_response(&response, &ScopeSet::default(), None, NOW)
			.expect_err("Error responses must fail.");

		assert_eq!(err.reason, "invalid_client: Unknown client");
		assert_eq!(err.status, Some(400));

		let opaque = endpoint_error(&HttpResponse::new(502).with_body("<html>"));

		assert_eq!(opaque.reason, "Token endpoint responded with HTTP 502");
	}

	#[test]
	fn revocation_sends_json_credentials() {
		let token = TokenSecret::new("a1");
		let request = revocation_request(&config(ClientAuthMethod::ClientSecretPost), &token)
			.expect("Revocation should be enabled by default.");

		assert_eq!(request.url.as_str(), "https://api.example.com/oauth/revoke");
		assert_eq!(
			request.body,
			RequestBody::Json(serde_json::json!({
				"token": "a1",
				"client_id": "client-1",
				"client_secret": "secret-1",
			}))
		);
	}
}
