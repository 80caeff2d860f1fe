//! Request descriptions and per-call options.

// std
use std::time::Duration as StdDuration;
// crates.io
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	http::{FilePart, HttpMethod, MultipartForm, RequestBody},
};

/// Per-call overrides.
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
	/// Headers added after the defaults; a name set here replaces the default value.
	pub headers: Vec<(String, String)>,
	/// Timeout replacing `ClientConfig::request_timeout`.
	pub timeout: Option<StdDuration>,
	/// Retry ceiling replacing `RetryPolicy::max_retries`.
	pub max_retries: Option<u32>,
	/// Request id sent as `x-request-id` instead of a fresh UUID.
	pub request_id: Option<String>,
	/// Send the call without a bearer token.
	pub skip_auth: bool,
	/// Bypass the rate limiter.
	pub skip_rate_limit: bool,
	/// Token cancelling the call; the envelope then carries `REQUEST_CANCELLED`.
	pub cancel: Option<CancellationToken>,
}
impl RequestOptions {
	/// Adds a header.
	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Overrides the timeout.
	pub fn timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = Some(timeout);

		self
	}

	/// Overrides the retry ceiling.
	pub fn max_retries(mut self, max_retries: u32) -> Self {
		self.max_retries = Some(max_retries);

		self
	}

	/// Uses `request_id` for the call.
	pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
		self.request_id = Some(request_id.into());

		self
	}

	/// Sends the call without a bearer token.
	pub fn skip_auth(mut self) -> Self {
		self.skip_auth = true;

		self
	}

	/// Bypasses the rate limiter.
	pub fn skip_rate_limit(mut self) -> Self {
		self.skip_rate_limit = true;

		self
	}

	/// Cancels the call when `token` fires.
	pub fn cancel_on(mut self, token: CancellationToken) -> Self {
		self.cancel = Some(token);

		self
	}
}

/// One API call: verb, path relative to the base URL, query, body, options.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP verb.
	pub method: HttpMethod,
	/// Path resolved against `ClientConfig::base_url`.
	pub path: String,
	/// Query pairs appended to the URL.
	pub query: Vec<(String, String)>,
	/// Payload.
	pub body: RequestBody,
	/// Per-call overrides.
	pub options: RequestOptions,
}
impl ApiRequest {
	/// Creates a request without query, body, or options.
	pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			query: Vec::new(),
			body: RequestBody::Empty,
			options: RequestOptions::default(),
		}
	}

	/// Appends a query pair.
	pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
		self.query.push((name.into(), value.to_string()));

		self
	}

	/// Appends several query pairs.
	pub fn queries<I, K, V>(mut self, pairs: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		self.query.extend(pairs.into_iter().map(|(name, value)| (name.into(), value.into())));

		self
	}

	/// Sets a JSON body.
	pub fn json(mut self, body: serde_json::Value) -> Self {
		self.body = RequestBody::Json(body);

		self
	}

	/// Sets a multipart body with `bytes` in the `file` field.
	pub fn file(
		mut self,
		bytes: impl Into<Vec<u8>>,
		filename: impl Into<String>,
		fields: Vec<(String, String)>,
	) -> Self {
		self.body = RequestBody::Multipart(MultipartForm {
			fields,
			file: Some(FilePart {
				field_name: "file".into(),
				filename: filename.into(),
				bytes: bytes.into(),
				content_type: None,
			}),
		});

		self
	}

	/// Replaces the options.
	pub fn options(mut self, options: RequestOptions) -> Self {
		self.options = options;

		self
	}
}

/// Raw payload returned by `ApiClient::download_file`.
#[derive(Clone, PartialEq, Eq)]
pub struct DownloadedFile {
	/// Body bytes.
	pub bytes: Vec<u8>,
	/// Response headers keyed by lowercase name.
	pub headers: BTreeMap<String, String>,
}
impl DownloadedFile {
	/// `Content-Type` of the payload.
	pub fn content_type(&self) -> Option<&str> {
		self.headers.get("content-type").map(String::as_str)
	}

	/// File name announced by `Content-Disposition`.
	pub fn filename(&self) -> Option<String> {
		let disposition = self.headers.get("content-disposition")?;

		disposition.split(';').map(str::trim).find_map(|param| {
			let (name, value) = param.split_once('=')?;

			name.trim().eq_ignore_ascii_case("filename").then(|| value.trim().trim_matches('"').to_owned())
		})
	}
}
impl Debug for DownloadedFile {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DownloadedFile")
			.field("len", &self.bytes.len())
			.field("headers", &self.headers)
			.finish()
	}
}
