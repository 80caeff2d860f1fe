//! Page-number pagination over `GET` endpoints.
//!
//! Page items are read from `data` when it is an array, otherwise from `data.items`.
//! Pagination metadata is read from `meta.pagination` or `data.pagination`; a response without
//! metadata is treated as the only page.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	client::{ApiClient, ApiRequest},
	envelope::{Pagination, ResponseEnvelope, ResponseMeta},
	http::{HttpMethod, HttpTransport},
	obs,
};

/// Options of [`ApiClient::get_paginated`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationOptions {
	/// Follow `hasNextPage` and concatenate every page.
	pub auto_fetch: bool,
	/// Page size sent as `page_size_param`; omitted when `None`.
	pub page_size: Option<u64>,
	/// First page requested.
	pub start_page: u64,
	/// Upper bound on pages fetched in auto-fetch mode.
	pub max_pages: u64,
	/// Query parameter carrying the page number.
	pub page_param: String,
	/// Query parameter carrying the page size.
	pub page_size_param: String,
}
impl PaginationOptions {
	/// Enables auto-fetch.
	pub fn auto_fetch(mut self) -> Self {
		self.auto_fetch = true;

		self
	}

	/// Sets the page size.
	pub fn page_size(mut self, page_size: u64) -> Self {
		self.page_size = Some(page_size);

		self
	}
}
impl Default for PaginationOptions {
	fn default() -> Self {
		Self {
			auto_fetch: false,
			page_size: None,
			start_page: 1,
			max_pages: 100,
			page_param: "page".into(),
			page_size_param: "pageSize".into(),
		}
	}
}

impl<C> ApiClient<C>
where
	C: ?Sized + HttpTransport,
{
	/// Fetches a paginated collection.
	///
	/// Without auto-fetch the first requested page is returned with its pagination metadata in
	/// `meta.pagination`. With auto-fetch pages are requested until `hasNextPage` is false or
	/// `max_pages` is reached; `data` then holds every item in order and `meta.pagination`
	/// describes the whole walk. The first failing page is returned as-is.
	pub async fn get_paginated(
		&self,
		path: &str,
		query: &[(&str, &str)],
		options: PaginationOptions,
	) -> ResponseEnvelope {
		let mut page = options.start_page;
		let mut fetched = 0;
		let mut attempts = 0;
		let mut items = Vec::new();

		loop {
			let envelope = self.execute(page_request(path, query, &options, page)).await;

			if !envelope.success {
				return envelope;
			}

			fetched += 1;
			attempts += envelope.meta.as_ref().map_or(0, |meta| meta.attempts);

			let page_items = items_of(&envelope);
			let pagination = envelope
				.pagination()
				.unwrap_or_else(|| single_page(page, &options, page_items.len()));

			if !options.auto_fetch {
				let mut envelope = envelope;

				envelope.meta.get_or_insert_with(ResponseMeta::default).pagination = Some(pagination);

				return envelope;
			}

			items.extend(page_items);

			let exhausted = !pagination.has_next_page;

			if exhausted || fetched >= options.max_pages {
				if !exhausted {
					obs::log_event!(warn, path, pages = fetched, "Pagination stopped at the page limit.");
				}

				let summary = Pagination {
					page: options.start_page,
					page_size: options.page_size.unwrap_or(items.len() as u64),
					total_items: Some(pagination.total_items.unwrap_or(items.len() as u64)),
					total_pages: Some(pagination.total_pages.unwrap_or(fetched)),
					has_next_page: !exhausted,
				};

				return ResponseEnvelope::success(Some(Value::Array(items)), envelope.request_id)
					.with_meta(ResponseMeta {
						status: envelope.meta.and_then(|meta| meta.status),
						attempts,
						pagination: Some(summary),
						..Default::default()
					});
			}

			page += 1;
		}
	}
}

fn page_request(
	path: &str,
	query: &[(&str, &str)],
	options: &PaginationOptions,
	page: u64,
) -> ApiRequest {
	let mut request = ApiRequest::new(HttpMethod::Get, path)
		.queries(query.iter().copied())
		.query(options.page_param.as_str(), page);

	if let Some(page_size) = options.page_size {
		request = request.query(options.page_size_param.as_str(), page_size);
	}

	request
}

fn items_of(envelope: &ResponseEnvelope) -> Vec<Value> {
	match &envelope.data {
		Some(Value::Array(items)) => items.clone(),
		Some(data) => match data.get("items") {
			Some(Value::Array(items)) => items.clone(),
			_ => vec![data.clone()],
		},
		None => Vec::new(),
	}
}

fn single_page(page: u64, options: &PaginationOptions, len: usize) -> Pagination {
	Pagination {
		page,
		page_size: options.page_size.unwrap_or(len as u64),
		total_items: Some(len as u64),
		total_pages: Some(1),
		has_next_page: false,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::{ScriptedTransport, test_config, token_response},
		client::Stores,
		http::HttpResponse,
	};

	fn page(items: &[u32], page: u64, has_next_page: bool) -> HttpResponse {
		HttpResponse::new(200).with_json(&serde_json::json!({
			"items": items,
			"pagination": {
				"page": page,
				"pageSize": 2,
				"totalItems": 5,
				"totalPages": 3,
				"hasNextPage": has_next_page,
			},
		}))
	}

	fn client(transport: &Arc<ScriptedTransport>) -> ApiClient<ScriptedTransport> {
		transport.push("/oauth/token", token_response("a1", None, 3600));

		ApiClient::with_transport(test_config(), transport.clone(), Stores::default())
	}

	#[tokio::test]
	async fn single_page_mode_exposes_the_metadata() {
		let transport = Arc::new(ScriptedTransport::default());
		let client = client(&transport);

		transport.push("/v1/items", page(&[1, 2], 1, true));

		let envelope = client
			.get_paginated("/items", &[("sort", "id")], PaginationOptions::default().page_size(2))
			.await;
		let pagination = envelope.pagination().expect("Metadata should be lifted into meta.");
		let request = &transport.requests("/v1/items")[0];

		assert!(pagination.has_next_page);
		assert_eq!(pagination.total_pages, Some(3));
		assert_eq!(request.url.query(), Some("sort=id&page=1&pageSize=2"));
	}

	#[tokio::test]
	async fn auto_fetch_concatenates_every_page() {
		let transport = Arc::new(ScriptedTransport::default());
		let client = client(&transport);

		transport.push("/v1/items", page(&[1, 2], 1, true));
		transport.push("/v1/items", page(&[3, 4], 2, true));
		transport.push("/v1/items", page(&[5], 3, false));

		let envelope = client
			.get_paginated("/items", &[], PaginationOptions::default().auto_fetch())
			.await;

		assert_eq!(envelope.data_as::<Vec<u32>>().expect("Items should concatenate."), [1, 2, 3, 4, 5]);
		assert_eq!(transport.calls("/v1/items"), 3);
		assert_eq!(envelope.meta.as_ref().map(|meta| meta.attempts), Some(3));
		assert_eq!(envelope.pagination().map(|p| p.has_next_page), Some(false));
	}

	#[tokio::test]
	async fn auto_fetch_respects_the_page_limit() {
		let transport = Arc::new(ScriptedTransport::default());
		let client = client(&transport);

		transport.push("/v1/items", page(&[1, 2], 1, true));
		transport.push("/v1/items", page(&[3, 4], 2, true));

		let options = PaginationOptions { max_pages: 2, ..PaginationOptions::default().auto_fetch() };
		let envelope = client.get_paginated("/items", &[], options).await;

		assert_eq!(envelope.data_as::<Vec<u32>>().expect("Items should concatenate."), [1, 2, 3, 4]);
		assert_eq!(envelope.pagination().map(|p| p.has_next_page), Some(true));
	}

	#[tokio::test]
	async fn arrays_without_metadata_are_one_page() {
		let transport = Arc::new(ScriptedTransport::default());
		let client = client(&transport);

		transport.push("/v1/tags", HttpResponse::new(200).with_json(&serde_json::json!(["a", "b"])));

		let envelope = client
			.get_paginated("/tags", &[], PaginationOptions::default().auto_fetch())
			.await;

		assert_eq!(envelope.data_as::<Vec<String>>().expect("Tags should parse."), ["a", "b"]);
		assert_eq!(transport.calls("/v1/tags"), 1);
	}
}
