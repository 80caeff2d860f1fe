//! Transport primitives for token exchanges, API calls, and health probes.
//!
//! The module exposes [`HttpTransport`] alongside crate-owned request and response types so
//! downstream crates can plug in their own HTTP stack without touching the pipeline. The
//! default implementation, [`ReqwestHttpClient`], lives behind the `reqwest` feature.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
use std::time::Duration as StdDuration;
// crates.io
#[cfg(feature = "reqwest")] use reqwest::header::CONTENT_TYPE;
use time::format_description::well_known::{Rfc2822, Rfc3339};
// self
use crate::{_prelude::*, error::NetworkError};

/// Header carrying the per-call request identifier.
pub const REQUEST_ID_HEADER: &str = "x-request-id";
/// Header carrying the client version string.
pub const CLIENT_VERSION_HEADER: &str = "x-client-version";
/// Header carrying the RFC 3339 timestamp of the attempt.
pub const TIMESTAMP_HEADER: &str = "x-timestamp";

/// Boxed future returned by [`HttpTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, NetworkError>> + 'a + Send>>;

/// Abstraction over HTTP stacks able to execute one request.
///
/// The trait is the gateway's only dependency on an HTTP client. Implementations report
/// every received response (whatever its status) as `Ok` and reserve `Err` for failures
/// where no response arrived, so the pipeline can tell HTTP errors from network errors.
/// Implementations must be `Send + Sync + 'static` so a single transport can be shared by
/// the token manager, the request pipeline, and the background health probe.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Executes `request` and returns the raw response.
	fn send(&self, request: HttpRequest) -> TransportFuture<'_>;
}

/// HTTP verbs used by the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
	/// `GET`
	Get,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `PATCH`
	Patch,
	/// `DELETE`
	Delete,
}
impl HttpMethod {
	/// Returns the wire representation of the verb.
	pub const fn as_str(self) -> &'static str {
		match self {
			HttpMethod::Get => "GET",
			HttpMethod::Post => "POST",
			HttpMethod::Put => "PUT",
			HttpMethod::Patch => "PATCH",
			HttpMethod::Delete => "DELETE",
		}
	}
}
impl Display for HttpMethod {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// File attached to a multipart upload.
#[derive(Clone, PartialEq, Eq)]
pub struct FilePart {
	/// Form field name carrying the file.
	pub field_name: String,
	/// File name reported to the server.
	pub filename: String,
	/// Raw file contents.
	pub bytes: Vec<u8>,
	/// Optional MIME type; servers infer one when absent.
	pub content_type: Option<String>,
}
impl Debug for FilePart {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FilePart")
			.field("field_name", &self.field_name)
			.field("filename", &self.filename)
			.field("len", &self.bytes.len())
			.field("content_type", &self.content_type)
			.finish()
	}
}

/// Multipart form body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MultipartForm {
	/// Plain text fields.
	pub fields: Vec<(String, String)>,
	/// Optional file part.
	pub file: Option<FilePart>,
}

/// Request payload variants understood by every transport.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum RequestBody {
	/// No body.
	#[default]
	Empty,
	/// JSON document sent as `application/json`.
	Json(serde_json::Value),
	/// Key/value pairs sent as `application/x-www-form-urlencoded`.
	Form(Vec<(String, String)>),
	/// Multipart upload.
	Multipart(MultipartForm),
}

/// Transport-agnostic outbound request.
#[derive(Clone, Debug)]
pub struct HttpRequest {
	/// HTTP verb.
	pub method: HttpMethod,
	/// Absolute target URL including the query string.
	pub url: Url,
	/// Header pairs in send order.
	pub headers: Vec<(String, String)>,
	/// Request payload.
	pub body: RequestBody,
	/// Per-request timeout; transports fall back to their own default when `None`.
	pub timeout: Option<StdDuration>,
}
impl HttpRequest {
	/// Creates a request without headers or body.
	pub fn new(method: HttpMethod, url: Url) -> Self {
		Self { method, url, headers: Vec::new(), body: RequestBody::Empty, timeout: None }
	}

	/// Appends a header.
	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Replaces the body.
	pub fn body(mut self, body: RequestBody) -> Self {
		self.body = body;

		self
	}

	/// Sets the per-request timeout.
	pub fn timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = Some(timeout);

		self
	}

	/// Stamps the security headers sent on every call.
	pub fn with_security_headers(self, request_id: &str, client_version: &str) -> Self {
		self.header(REQUEST_ID_HEADER, request_id)
			.header(CLIENT_VERSION_HEADER, client_version)
			.header(TIMESTAMP_HEADER, now_rfc3339())
	}

	/// Returns the first header value matching `name` (case-insensitive).
	pub fn header_value(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(key, _)| key.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}
}

/// Raw response as observed by the transport.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpResponse {
	/// HTTP status code.
	pub status: u16,
	/// Canonical reason phrase, when the transport knows it.
	pub reason: Option<String>,
	/// Headers keyed by lowercase name.
	pub headers: BTreeMap<String, String>,
	/// Raw body bytes.
	pub body: Vec<u8>,
}
impl HttpResponse {
	/// Creates an empty response with the given status.
	pub fn new(status: u16) -> Self {
		Self { status, ..Default::default() }
	}

	/// Sets a header (names are stored lowercase).
	pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
		self.headers.insert(name.to_ascii_lowercase(), value.into());

		self
	}

	/// Replaces the body.
	pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = body.into();

		self
	}

	/// Sets a JSON body and the matching content type.
	pub fn with_json(self, value: &serde_json::Value) -> Self {
		self.with_header("content-type", "application/json").with_body(value.to_string())
	}

	/// Returns true for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Returns the header value for `name` (case-insensitive).
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
	}

	/// Status text used when the body carries nothing structured.
	pub fn status_text(&self) -> String {
		self.reason.clone().unwrap_or_else(|| format!("HTTP {}", self.status))
	}

	/// Parses the body as JSON, returning `None` for empty or non-JSON payloads.
	pub fn json(&self) -> Option<serde_json::Value> {
		if self.body.is_empty() {
			return None;
		}

		serde_json::from_slice(&self.body).ok()
	}

	/// Parses the `Retry-After` header (delta-seconds or HTTP date).
	pub fn retry_after(&self) -> Option<StdDuration> {
		parse_retry_after(self.header("retry-after")?)
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client whose requests time out after `timeout` unless overridden per call.
	pub fn with_timeout(timeout: StdDuration) -> Result<Self, crate::error::ConfigError> {
		Ok(Self(ReqwestClient::builder().timeout(timeout).build()?))
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestHttpClient {
	fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let method = match request.method {
				HttpMethod::Get => reqwest::Method::GET,
				HttpMethod::Post => reqwest::Method::POST,
				HttpMethod::Put => reqwest::Method::PUT,
				HttpMethod::Patch => reqwest::Method::PATCH,
				HttpMethod::Delete => reqwest::Method::DELETE,
			};
			let mut builder = client.request(method, request.url);

			for (name, value) in &request.headers {
				builder = builder.header(name.as_str(), value.as_str());
			}
			if let Some(timeout) = request.timeout {
				builder = builder.timeout(timeout);
			}

			builder = match request.body {
				RequestBody::Empty => builder,
				RequestBody::Json(value) =>
					builder.header(CONTENT_TYPE, "application/json").body(value.to_string()),
				RequestBody::Form(pairs) => builder
					.header(CONTENT_TYPE, "application/x-www-form-urlencoded")
					.body(encode_form(&pairs)),
				RequestBody::Multipart(form) => builder.multipart(into_reqwest_form(form)?),
			};

			let response = builder.send().await.map_err(NetworkError::from)?;
			let status = response.status();
			let headers = response
				.headers()
				.iter()
				.filter_map(|(name, value)| {
					value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
				})
				.collect();
			let body = response.bytes().await.map_err(NetworkError::from)?.to_vec();

			Ok(HttpResponse {
				status: status.as_u16(),
				reason: status.canonical_reason().map(str::to_owned),
				headers,
				body,
			})
		})
	}
}

#[cfg(feature = "reqwest")]
fn into_reqwest_form(form: MultipartForm) -> Result<reqwest::multipart::Form, NetworkError> {
	let mut out = reqwest::multipart::Form::new();

	for (name, value) in form.fields {
		out = out.text(name, value);
	}
	if let Some(file) = form.file {
		let mut part = reqwest::multipart::Part::bytes(file.bytes).file_name(file.filename);

		if let Some(content_type) = file.content_type.as_deref() {
			part = part.mime_str(content_type).map_err(NetworkError::from)?;
		}

		out = out.part(file.field_name, part);
	}

	Ok(out)
}

/// Encodes key/value pairs as `application/x-www-form-urlencoded`.
pub fn encode_form(pairs: &[(String, String)]) -> String {
	url::form_urlencoded::Serializer::new(String::new()).extend_pairs(pairs).finish()
}

/// Current UTC instant formatted as RFC 3339.
pub fn now_rfc3339() -> String {
	format_rfc3339(OffsetDateTime::now_utc())
}

/// Formats `instant` as RFC 3339, falling back to the unix timestamp if formatting fails.
pub fn format_rfc3339(instant: OffsetDateTime) -> String {
	instant.format(&Rfc3339).unwrap_or_else(|_| instant.unix_timestamp().to_string())
}

fn parse_retry_after(raw: &str) -> Option<StdDuration> {
	let raw = raw.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(StdDuration::from_secs(secs));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return StdDuration::try_from(delta).ok();
		}
	}

	None
}
