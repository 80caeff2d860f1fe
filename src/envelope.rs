//! Uniform response envelope and the normalizer that produces it.
//!
//! Every outcome of the pipeline becomes a [`ResponseEnvelope`]. Error bodies are classified
//! in this order:
//!
//! 1. a body already shaped like an envelope passes through (request id and timestamp are
//!    filled in when missing);
//! 2. a structured JSON error body (`errors`, `error`, `code`, `message`) is mapped into
//!    [`ApiError`] values;
//! 3. anything else becomes `HTTP_<status>` with the status text;
//! 4. a call without a response becomes `NETWORK_ERROR`;
//! 5. failures outside those categories use their own stable code, `UNKNOWN_ERROR` last.

// crates.io
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
// self
use crate::{
	_prelude::*,
	http::{self, HttpResponse, REQUEST_ID_HEADER},
};

/// One normalized error entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
	/// Stable machine-readable code.
	pub code: String,
	/// Human-readable message.
	pub message: String,
	/// Extra structured context.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub details: Option<Value>,
}
impl ApiError {
	/// Creates an error without details.
	pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
		Self { code: code.into(), message: message.into(), details: None }
	}

	/// Attaches details.
	pub fn with_details(mut self, details: Value) -> Self {
		self.details = Some(details);

		self
	}
}

/// Pagination metadata understood by `ApiClient::get_paginated`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Pagination {
	/// Current page (1-based).
	pub page: u64,
	/// Items per page.
	pub page_size: u64,
	/// Total items across pages, when known.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub total_items: Option<u64>,
	/// Total pages, when known.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub total_pages: Option<u64>,
	/// Whether another page follows.
	pub has_next_page: bool,
}

/// Envelope metadata.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResponseMeta {
	/// HTTP status of the final attempt, when a response arrived.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub status: Option<u16>,
	/// Attempts made, retries included.
	pub attempts: u32,
	/// Pagination metadata.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub pagination: Option<Pagination>,
	/// Additional upstream metadata kept verbatim.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

/// Uniform success/error wrapper returned by every client operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
	/// Whether the call succeeded.
	pub success: bool,
	/// Payload of a successful call.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
	/// Errors of a failed call.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub errors: Vec<ApiError>,
	/// Identifier tracing the call.
	#[serde(default)]
	pub request_id: String,
	/// RFC 3339 instant the envelope was produced.
	#[serde(default)]
	pub timestamp: String,
	/// Status, attempts, pagination.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub meta: Option<ResponseMeta>,
}
impl ResponseEnvelope {
	/// Successful envelope carrying `data`.
	pub fn success(data: Option<Value>, request_id: impl Into<String>) -> Self {
		Self {
			success: true,
			data,
			errors: Vec::new(),
			request_id: request_id.into(),
			timestamp: http::now_rfc3339(),
			meta: None,
		}
	}

	/// Failed envelope carrying `errors`.
	pub fn failure(errors: Vec<ApiError>, request_id: impl Into<String>) -> Self {
		Self {
			success: false,
			data: None,
			errors,
			request_id: request_id.into(),
			timestamp: http::now_rfc3339(),
			meta: None,
		}
	}

	/// Failed envelope for a failure that fits no other category.
	pub fn unknown(message: impl Into<String>, request_id: impl Into<String>) -> Self {
		Self::failure(vec![ApiError::new("UNKNOWN_ERROR", message)], request_id)
	}

	/// Replaces the metadata.
	pub fn with_meta(mut self, meta: ResponseMeta) -> Self {
		self.meta = Some(meta);

		self
	}

	/// Records the status and attempt count, keeping any upstream metadata.
	pub fn with_attempts(mut self, status: Option<u16>, attempts: u32) -> Self {
		let meta = self.meta.get_or_insert_with(ResponseMeta::default);

		if meta.status.is_none() {
			meta.status = status;
		}

		meta.attempts = attempts;

		self
	}

	/// Returns true when the call succeeded.
	pub fn is_success(&self) -> bool {
		self.success
	}

	/// First error, if any.
	pub fn first_error(&self) -> Option<&ApiError> {
		self.errors.first()
	}

	/// Deserializes the payload into `T` (`null` when absent).
	pub fn data_as<T>(&self) -> Result<T, serde_json::Error>
	where
		T: DeserializeOwned,
	{
		T::deserialize(self.data.as_ref().unwrap_or(&Value::Null))
	}

	/// Pagination metadata from `meta.pagination` or `data.pagination`.
	pub fn pagination(&self) -> Option<Pagination> {
		if let Some(pagination) = self.meta.as_ref().and_then(|meta| meta.pagination.clone()) {
			return Some(pagination);
		}

		self.data
			.as_ref()
			.and_then(|data| data.get("pagination"))
			.and_then(|value| Pagination::deserialize(value).ok())
	}
}

/// Request id for an envelope: the response's `x-request-id`, else the outgoing id, else a
/// fresh UUID.
pub fn resolve_request_id(response: Option<&HttpResponse>, outgoing: Option<&str>) -> String {
	response
		.and_then(|response| response.header(REQUEST_ID_HEADER))
		.or(outgoing)
		.filter(|id| !id.is_empty())
		.map(str::to_owned)
		.unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Normalizes a 2xx response.
pub fn from_success(response: &HttpResponse, outgoing_request_id: &str) -> ResponseEnvelope {
	let request_id = resolve_request_id(Some(response), Some(outgoing_request_id));
	let body = body_value(response);

	if let Some(envelope) = body.as_ref().and_then(|body| passthrough(body, &request_id)) {
		return envelope;
	}

	ResponseEnvelope::success(body, request_id)
}

/// Normalizes a non-2xx response.
pub fn from_http_error(response: &HttpResponse, outgoing_request_id: &str) -> ResponseEnvelope {
	let request_id = resolve_request_id(Some(response), Some(outgoing_request_id));
	let body = response.json();

	if let Some(mut envelope) = body.as_ref().and_then(|body| passthrough(body, &request_id)) {
		envelope.success = false;

		if envelope.errors.is_empty() {
			envelope.errors.push(status_error(response));
		}

		return envelope;
	}

	let errors = body
		.as_ref()
		.map(|body| structured_errors(body, response))
		.filter(|errors| !errors.is_empty())
		.unwrap_or_else(|| vec![status_error(response)]);

	ResponseEnvelope::failure(errors, request_id)
}

/// Normalizes any pipeline failure.
pub fn from_error(error: &Error, outgoing_request_id: &str) -> ResponseEnvelope {
	match error {
		Error::Http(err) => from_http_error(&err.response, outgoing_request_id),
		Error::Network(err) => ResponseEnvelope::failure(
			vec![
				ApiError::new(error.code(), &err.message)
					.with_details(serde_json::json!({ "timeout": err.timeout })),
			],
			outgoing_request_id,
		),
		Error::Authentication(err) => {
			let details = err.status.map(|status| serde_json::json!({ "status": status }));

			ResponseEnvelope::failure(
				vec![ApiError { code: error.code(), message: err.reason.clone(), details }],
				outgoing_request_id,
			)
		},
		Error::RateLimited(err) => ResponseEnvelope::failure(
			vec![ApiError::new(error.code(), error.to_string()).with_details(serde_json::json!({
				"resetAt": http::format_rfc3339(err.reset_at),
				"remainingPoints": err.remaining_points,
				"window": err.window,
			}))],
			outgoing_request_id,
		),
		Error::Unknown { message } => ResponseEnvelope::unknown(message, outgoing_request_id),
		Error::Config(_) | Error::Storage(_) | Error::Cancelled => ResponseEnvelope::failure(
			vec![ApiError::new(error.code(), error.to_string())],
			outgoing_request_id,
		),
	}
}

fn body_value(response: &HttpResponse) -> Option<Value> {
	if response.body.is_empty() {
		return None;
	}

	Some(
		response
			.json()
			.unwrap_or_else(|| Value::String(String::from_utf8_lossy(&response.body).into_owned())),
	)
}

fn looks_like_envelope(body: &Map<String, Value>) -> bool {
	body.get("success").is_some_and(Value::is_boolean)
		&& (body.contains_key("data") || body.contains_key("errors"))
}

fn passthrough(body: &Value, request_id: &str) -> Option<ResponseEnvelope> {
	if !body.as_object().is_some_and(looks_like_envelope) {
		return None;
	}

	let mut object = body.as_object()?.clone();

	if let Some(errors) = object.get("errors").filter(|errors| !errors.is_array()) {
		let normalized = errors_from_value(errors, "UNKNOWN_ERROR", "");

		object.insert("errors".into(), serde_json::to_value(normalized).ok()?);
	}

	let mut envelope: ResponseEnvelope = serde_json::from_value(Value::Object(object)).ok()?;

	if envelope.request_id.is_empty() {
		envelope.request_id = request_id.to_owned();
	}
	if envelope.timestamp.is_empty() {
		envelope.timestamp = http::now_rfc3339();
	}

	Some(envelope)
}

fn status_error(response: &HttpResponse) -> ApiError {
	ApiError::new(format!("HTTP_{}", response.status), response.status_text())
}

fn structured_errors(body: &Value, response: &HttpResponse) -> Vec<ApiError> {
	let Some(object) = body.as_object() else {
		return Vec::new();
	};
	let default_code = format!("HTTP_{}", response.status);
	let default_message = response.status_text();

	if let Some(errors) = object.get("errors") {
		let errors = errors_from_value(errors, &default_code, &default_message);

		if !errors.is_empty() {
			return errors;
		}
	}

	let nested = object.get("error");
	let code = string_field(object, "code")
		.or_else(|| nested.and_then(Value::as_object).and_then(|error| string_field(error, "code")))
		.or_else(|| nested.and_then(Value::as_str).map(str::to_owned));
	let message = string_field(object, "message")
		.or_else(|| string_field(object, "error_description"))
		.or_else(|| {
			nested.and_then(Value::as_object).and_then(|error| string_field(error, "message"))
		});
	let details = object
		.get("details")
		.cloned()
		.or_else(|| nested.and_then(Value::as_object).and_then(|error| error.get("details").cloned()));

	if code.is_none() && message.is_none() {
		return Vec::new();
	}

	vec![ApiError {
		code: code.unwrap_or(default_code),
		message: message.unwrap_or(default_message),
		details,
	}]
}

fn errors_from_value(value: &Value, default_code: &str, default_message: &str) -> Vec<ApiError> {
	match value {
		Value::Array(items) => items
			.iter()
			.map(|item| error_entry(None, item, default_code, default_message))
			.collect(),
		Value::Object(map) => map
			.iter()
			.map(|(code, item)| error_entry(Some(code.as_str()), item, default_code, default_message))
			.collect(),
		Value::String(message) => vec![ApiError::new(default_code, message.as_str())],
		_ => Vec::new(),
	}
}

fn error_entry(
	key: Option<&str>,
	item: &Value,
	default_code: &str,
	default_message: &str,
) -> ApiError {
	match item {
		Value::Object(fields) => ApiError {
			code: string_field(fields, "code")
				.or_else(|| key.map(str::to_owned))
				.unwrap_or_else(|| default_code.to_owned()),
			message: string_field(fields, "message").unwrap_or_else(|| default_message.to_owned()),
			details: fields.get("details").cloned(),
		},
		Value::String(message) => ApiError::new(key.unwrap_or(default_code), message.as_str()),
		other => ApiError::new(key.unwrap_or(default_code), default_message)
			.with_details(other.clone()),
	}
}

fn string_field(object: &Map<String, Value>, field: &str) -> Option<String> {
	match object.get(field)? {
		Value::String(value) if !value.is_empty() => Some(value.clone()),
		Value::Number(value) => Some(value.to_string()),
		_ => None,
	}
}
