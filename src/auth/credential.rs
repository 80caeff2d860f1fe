//! OAuth credential held by the token manager, its builder, and the redacting secret wrapper.

// self
use crate::{_prelude::*, auth::ScopeSet};

/// Redacted token secret wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Returns true when the secret is an empty string.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Errors produced by [`CredentialBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CredentialBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
	/// Issued when the expiry does not come strictly after the issue instant.
	#[error("Credential must expire after it was issued.")]
	ExpiryNotAfterIssue,
}

/// Access credential issued by the token endpoint.
///
/// Invariant: `expires_at > issued_at`, enforced by [`CredentialBuilder::build`].
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Refresh token secret, if the upstream issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Token type reported by the upstream (`Bearer` unless stated otherwise).
	pub token_type: String,
	/// Instant the credential was issued.
	pub issued_at: OffsetDateTime,
	/// Instant the credential stops being valid.
	pub expires_at: OffsetDateTime,
	/// Scopes granted to the credential.
	pub scope: ScopeSet,
}
impl Credential {
	/// Returns a builder for constructing credentials.
	pub fn builder() -> CredentialBuilder {
		CredentialBuilder::default()
	}

	/// Returns true when the credential stays valid for more than `margin` past `now`.
	pub fn is_valid_for(&self, margin: Duration, now: OffsetDateTime) -> bool {
		self.expires_at - now > margin
	}

	/// Returns true when the credential has expired at `now`.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		now >= self.expires_at
	}

	/// Time left until expiry at `now` (negative once expired).
	pub fn expires_in_at(&self, now: OffsetDateTime) -> Duration {
		self.expires_at - now
	}

	/// Total lifetime between issue and expiry.
	pub fn lifetime(&self) -> Duration {
		self.expires_at - self.issued_at
	}

	/// Value for the `Authorization` header.
	pub fn authorization_header(&self) -> String {
		let scheme =
			if self.token_type.eq_ignore_ascii_case("bearer") { "Bearer" } else { &self.token_type };

		format!("{scheme} {}", self.access_token.expose())
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("token_type", &self.token_type)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.field("scope", &self.scope)
			.finish()
	}
}

/// Builder for [`Credential`].
#[derive(Clone, Debug, Default)]
pub struct CredentialBuilder {
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	token_type: Option<String>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
	scope: ScopeSet,
}
impl CredentialBuilder {
	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Overrides the token type (defaults to `Bearer`).
	pub fn token_type(mut self, token_type: impl Into<String>) -> Self {
		self.token_type = Some(token_type.into());

		self
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Sets the granted scopes.
	pub fn scope(mut self, scope: ScopeSet) -> Self {
		self.scope = scope;

		self
	}

	/// Consumes the builder and produces a [`Credential`].
	pub fn build(self) -> Result<Credential, CredentialBuilderError> {
		let access_token = self
			.access_token
			.filter(|token| !token.is_empty())
			.ok_or(CredentialBuilderError::MissingAccessToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => issued_at + delta,
			(None, None) => return Err(CredentialBuilderError::MissingExpiry),
		};

		if expires_at <= issued_at {
			return Err(CredentialBuilderError::ExpiryNotAfterIssue);
		}

		Ok(Credential {
			access_token,
			refresh_token: self.refresh_token.filter(|token| !token.is_empty()),
			token_type: self.token_type.unwrap_or_else(|| "Bearer".into()),
			issued_at,
			expires_at,
			scope: self.scope,
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn credential(expires_in: Duration) -> Credential {
		Credential::builder()
			.access_token("access")
			.refresh_token("refresh")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_in(expires_in)
			.build()
			.expect("Credential fixture should build.")
	}

	#[test]
	fn safety_margin_decides_validity() {
		let credential = credential(Duration::minutes(10));
		let now = macros::datetime!(2025-01-01 00:08 UTC);

		assert!(credential.is_valid_for(Duration::seconds(60), now));
		assert!(!credential.is_valid_for(Duration::minutes(2), now));
		assert!(!credential.is_expired_at(now));
		assert!(credential.is_expired_at(macros::datetime!(2025-01-01 00:10 UTC)));
		assert_eq!(credential.expires_in_at(now), Duration::minutes(2));
		assert_eq!(credential.lifetime(), Duration::minutes(10));
	}

	#[test]
	fn builder_enforces_expiry_after_issue() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let err = Credential::builder()
			.access_token("access")
			.issued_at(issued)
			.expires_at(issued)
			.build()
			.expect_err("Zero-lifetime credentials must be rejected.");

		assert_eq!(err, CredentialBuilderError::ExpiryNotAfterIssue);
		assert_eq!(
			Credential::builder().access_token("access").build().expect_err("Expiry is required."),
			CredentialBuilderError::MissingExpiry
		);
		assert_eq!(
			Credential::builder()
				.access_token("")
				.expires_in(Duration::hours(1))
				.build()
				.expect_err("Empty access tokens must be rejected."),
			CredentialBuilderError::MissingAccessToken
		);
	}

	#[test]
	fn formatters_redact_secrets() {
		let credential = credential(Duration::hours(1));
		let debug = format!("{credential:?}");

		assert!(!debug.contains("access\""));
		assert!(debug.contains("<redacted>"));
		assert_eq!(format!("{}", credential.access_token), "<redacted>");
	}

	#[test]
	fn authorization_header_normalizes_bearer() {
		let bearer = Credential::builder()
			.access_token("abc")
			.token_type("bearer")
			.expires_in(Duration::hours(1))
			.build()
			.expect("Bearer credential should build.");
		let mac = Credential::builder()
			.access_token("abc")
			.token_type("MAC")
			.expires_in(Duration::hours(1))
			.build()
			.expect("MAC credential should build.");

		assert_eq!(bearer.authorization_header(), "Bearer abc");
		assert_eq!(mac.authorization_header(), "MAC abc");
	}
}
