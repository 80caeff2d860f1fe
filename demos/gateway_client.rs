//! Drives the gateway against a local mock upstream: authenticate once, call a few verbs,
//! walk a paginated collection, then shut down and revoke the credential.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use oauth2_gateway::{
	client::{ApiClient, PaginationOptions, RequestOptions, Stores},
	config::ClientConfig,
	http::ReqwestHttpClient,
	reqwest::Client,
	store::MemoryStore,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"refresh_token\":\"demo-refresh\",\"token_type\":\"bearer\",\"expires_in\":900}",
			);
		})
		.await;
	let revoke_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/revoke");
			then.status(200);
		})
		.await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/health");
			then.status(200);
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/participants");
			then.status(200).header("content-type", "application/json").body(
				"{\"items\":[{\"name\":\"ada\"},{\"name\":\"grace\"}],\"pagination\":{\"page\":1,\"pageSize\":2,\"hasNextPage\":false}}",
			);
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(POST).path("/attendance");
			then.status(422).header("content-type", "application/json").body(
				"{\"code\":\"SESSION_CLOSED\",\"message\":\"Session 7 no longer accepts attendance\"}",
			);
		})
		.await;

	let config = ClientConfig::builder(server.base_url(), "demo-client", "super-secret")
		.scope(["participants.read", "attendance.write"])
		.build()?;
	let transport = ReqwestHttpClient::with_client(Client::builder().build()?);
	let store = Arc::new(MemoryStore::default());
	let client = ApiClient::with_transport(config, Arc::new(transport), Stores::shared(store));

	client.initialize().await?;

	let participants = client
		.get_paginated("/participants", &[], PaginationOptions::default().auto_fetch())
		.await;

	println!("Participants: {}", serde_json::to_string_pretty(&participants)?);

	let rejected = client
		.post(
			"/attendance",
			Some(serde_json::json!({ "sessionId": 7, "participant": "ada" })),
			&[],
			RequestOptions::default().header("x-tenant", "demo"),
		)
		.await;

	println!("Attendance: {}", serde_json::to_string_pretty(&rejected)?);
	println!("Health: {}", serde_json::to_string_pretty(&client.check_health().await)?);

	client.shutdown().await;

	token_mock.assert_async().await;
	revoke_mock.assert_async().await;

	Ok(())
}
