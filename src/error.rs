//! Gateway-level error types shared by the token manager, rate limiter, and request pipeline.

// self
use crate::{_prelude::*, http::HttpResponse};

/// Gateway-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical gateway error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Credential exchange failed or no usable credential could be obtained.
	#[error(transparent)]
	Authentication(#[from] AuthenticationError),
	/// Admission was denied by one of the rate-limit windows.
	#[error(transparent)]
	RateLimited(#[from] RateLimitExceeded),
	/// No response was received from the upstream.
	#[error(transparent)]
	Network(#[from] NetworkError),
	/// The upstream answered with a non-2xx status.
	#[error(transparent)]
	Http(#[from] HttpError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Credential cache or counter store failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// The caller cancelled the request before it completed.
	#[error("Request was cancelled by the caller.")]
	Cancelled,
	/// Fallback for failures that fit no other category.
	#[error("Unexpected failure: {message}.")]
	Unknown {
		/// Human-readable description of the failure.
		message: String,
	},
}
impl Error {
	/// Stable machine-readable code used in normalized envelopes.
	pub fn code(&self) -> String {
		match self {
			Self::Authentication(_) => "AUTHENTICATION_ERROR".into(),
			Self::RateLimited(_) => "RATE_LIMIT_EXCEEDED".into(),
			Self::Network(_) => "NETWORK_ERROR".into(),
			Self::Http(err) => format!("HTTP_{}", err.status()),
			Self::Config(_) => "CONFIGURATION_ERROR".into(),
			Self::Storage(_) => "STORAGE_ERROR".into(),
			Self::Cancelled => "REQUEST_CANCELLED".into(),
			Self::Unknown { .. } => "UNKNOWN_ERROR".into(),
		}
	}

	/// HTTP status attached to the failure, if a response was received.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Http(err) => Some(err.status()),
			Self::Authentication(err) => err.status,
			_ => None,
		}
	}
}

/// Raised when the token endpoint rejects or fails a credential exchange.
///
/// The type is `Clone` so a single in-flight exchange can hand the same failure to every
/// caller waiting on it.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Authentication failed: {reason}.")]
pub struct AuthenticationError {
	/// Endpoint- or gateway-supplied reason string.
	pub reason: String,
	/// HTTP status returned by the token endpoint, when one was received.
	pub status: Option<u16>,
}
impl AuthenticationError {
	/// Creates an error without an HTTP status.
	pub fn new(reason: impl Into<String>) -> Self {
		Self { reason: reason.into(), status: None }
	}

	/// Attaches the HTTP status returned by the token endpoint.
	pub fn with_status(mut self, status: u16) -> Self {
		self.status = Some(status);

		self
	}
}

/// Raised when a rate-limit window has no points left.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Rate limit exceeded for the {window} window; resets at {reset_at}.")]
pub struct RateLimitExceeded {
	/// Label of the window that rejected the call (`short` or `long`).
	pub window: &'static str,
	/// Instant at which the rejecting window starts a fresh budget.
	pub reset_at: OffsetDateTime,
	/// Points left in the rejecting window (always zero on rejection).
	pub remaining_points: u64,
}

/// Failure where no HTTP response was received (DNS, TCP, TLS, timeout).
///
/// Transports also report requests they refused to build (malformed header, bad MIME type)
/// through this type with [`NetworkError::invalid_request`] set; nothing reached the wire in
/// that case and the pipeline surfaces it as a [`ConfigError::InvalidRequest`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Network error: {message}.")]
pub struct NetworkError {
	/// Transport-supplied description.
	pub message: String,
	/// Whether the failure was a timeout.
	pub timeout: bool,
	/// Whether the transport rejected the request before sending it.
	pub invalid_request: bool,
}
impl NetworkError {
	/// Creates a non-timeout network error.
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into(), timeout: false, invalid_request: false }
	}

	/// Creates a timeout error.
	pub fn timeout(message: impl Into<String>) -> Self {
		Self { timeout: true, ..Self::new(message) }
	}

	/// Creates an error for a request the transport could not build.
	pub fn invalid_request(message: impl Into<String>) -> Self {
		Self { invalid_request: true, ..Self::new(message) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for NetworkError {
	fn from(e: ReqwestError) -> Self {
		if e.is_builder() {
			Self::invalid_request(e.to_string())
		} else if e.is_timeout() {
			Self::timeout(e.to_string())
		} else {
			Self::new(e.to_string())
		}
	}
}

/// Non-2xx response received from the upstream.
#[derive(Clone, Debug, ThisError)]
#[error("Upstream responded with HTTP {}.", .response.status)]
pub struct HttpError {
	/// Full response, kept so the normalizer can read structured error bodies.
	pub response: HttpResponse,
}
impl HttpError {
	/// Wraps a non-2xx response.
	pub fn new(response: HttpResponse) -> Self {
		Self { response }
	}

	/// HTTP status code.
	pub fn status(&self) -> u16 {
		self.response.status
	}
}

/// Configuration and validation failures raised eagerly at construction time.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// A configured URL cannot be parsed.
	#[error("The {field} URL is invalid.")]
	InvalidUrl {
		/// Configuration field holding the URL.
		field: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A request path resolved outside the configured base URL.
	#[error("The {field} `{path}` resolves outside the base URL.")]
	OutsideBase {
		/// Configuration field or call argument holding the path.
		field: &'static str,
		/// Offending path as given.
		path: String,
	},
	/// Endpoints must use HTTPS unless they point at a loopback host.
	#[error("The {field} URL must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Configuration field holding the URL.
		field: &'static str,
		/// URL that failed validation.
		url: String,
	},
	/// Client identifier failed validation.
	#[error(transparent)]
	InvalidClientId(#[from] crate::auth::IdentifierError),
	/// Client secret was empty.
	#[error("Client secret cannot be empty.")]
	EmptyClientSecret,
	/// Requested scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// A rate-limit quota has a zero limit or window.
	#[error("The {window} rate-limit window must have a positive limit and duration.")]
	InvalidQuota {
		/// Window label.
		window: &'static str,
	},
	/// Retry policy values are inconsistent.
	#[error("Retry policy is invalid: {reason}.")]
	InvalidRetryPolicy {
		/// Description of the inconsistency.
		reason: &'static str,
	},
	/// Health settings values are inconsistent.
	#[error("Health settings are invalid: {reason}.")]
	InvalidHealthSettings {
		/// Description of the inconsistency.
		reason: &'static str,
	},
	/// Token safety margin was negative.
	#[error("Token safety margin cannot be negative.")]
	NegativeSafetyMargin,
	/// Client version header value was empty.
	#[error("Client version cannot be empty.")]
	EmptyClientVersion,
	/// A header name or value cannot be sent.
	#[error("Header `{name}` is invalid.")]
	InvalidHeader {
		/// Offending header name.
		name: String,
	},
	/// The transport refused to build the request; nothing was sent.
	#[error("Request could not be built: {message}.")]
	InvalidRequest {
		/// Transport-supplied description.
		message: String,
	},
	/// Credential builder validation failed.
	#[error("Unable to build credential.")]
	CredentialBuild(#[from] crate::auth::CredentialBuilderError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::StoreError;

	#[test]
	fn codes_follow_the_documented_taxonomy() {
		let auth: Error = AuthenticationError::new("bad secret").with_status(401).into();
		let network: Error = NetworkError::timeout("deadline elapsed").into();
		let http: Error = HttpError::new(HttpResponse::new(503)).into();
		let storage: Error = StoreError::Backend { message: "redis down".into() }.into();

		assert_eq!(auth.code(), "AUTHENTICATION_ERROR");
		assert_eq!(auth.status(), Some(401));
		assert_eq!(network.code(), "NETWORK_ERROR");
		assert_eq!(http.code(), "HTTP_503");
		assert_eq!(http.status(), Some(503));
		assert_eq!(storage.code(), "STORAGE_ERROR");
		assert_eq!(Error::Cancelled.code(), "REQUEST_CANCELLED");
		assert_eq!(Error::Unknown { message: "?".into() }.code(), "UNKNOWN_ERROR");
	}

	#[test]
	fn storage_error_keeps_its_source() {
		let store_error = StoreError::Backend { message: "database unreachable".into() };
		let err: Error = store_error.clone().into();

		assert!(err.to_string().contains("database unreachable"));

		let source = StdError::source(&err).expect("Gateway error should expose the store error.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[cfg(feature = "reqwest")]
	#[test]
	fn reqwest_builder_failures_are_invalid_requests() {
		let builder_error = ReqwestClient::new()
			.get("https://api.example.com/v1/items")
			.header("x-note", "line\nbreak")
			.build()
			.expect_err("Header values with line breaks must be refused.");
		let network = NetworkError::from(builder_error);

		assert!(network.invalid_request);
		assert!(!network.timeout);
	}
}
