// std
use std::time::Duration as StdDuration;
// self
use oauth2_gateway::{
	_preludet::*,
	client::{ApiClient, Stores},
	health::{HealthSettings, HealthStatus},
	http::HttpResponse,
};

const HEALTH_PATH: &str = "/v1/health";

fn probing_client(transport: &Arc<ScriptedTransport>) -> ApiClient<ScriptedTransport> {
	let mut config = test_config();

	config.health = HealthSettings {
		probe_interval: StdDuration::from_millis(10),
		probe_timeout: StdDuration::from_millis(50),
		..Default::default()
	};
	transport.push("/oauth/token", token_response("a1", None, 3_600));

	ApiClient::with_transport(config, transport.clone(), Stores::default())
}

#[tokio::test]
async fn idle_probe_failures_drive_the_status_to_unhealthy() {
	let transport = Arc::new(ScriptedTransport::default());
	let client = probing_client(&transport);

	client.initialize().await.expect("Initialization should succeed.");
	// The probe path is unscripted and answers 404.
	tokio::time::sleep(StdDuration::from_millis(200)).await;

	let report = client.health_status();

	assert_eq!(report.status, HealthStatus::Unhealthy);
	assert!(report.consecutive_failures >= 5);
	assert!(report.last_checked_at.is_some());
	assert!(report.is_authenticated);

	let probes = transport.requests(HEALTH_PATH);

	assert!(probes.len() >= 5);
	assert_eq!(probes[0].header_value("authorization"), Some("Bearer a1"));
	assert_eq!(probes[0].timeout, Some(StdDuration::from_millis(50)));
}

#[tokio::test]
async fn successful_probes_recover_one_step_at_a_time() {
	let transport = Arc::new(ScriptedTransport::default());
	let client = probing_client(&transport);

	for _ in 0..5 {
		client.health().record_failure();
	}

	assert_eq!(client.health().status(), HealthStatus::Unhealthy);

	transport.push(HEALTH_PATH, HttpResponse::new(200));

	assert_eq!(client.check_health().await.status, HealthStatus::Degraded);

	for _ in 0..4 {
		transport.push(HEALTH_PATH, HttpResponse::new(200));
		client.check_health().await;
	}

	assert_eq!(client.health_status().status, HealthStatus::Healthy);
	assert_eq!(client.health_status().consecutive_failures, 0);
}

#[tokio::test]
async fn probes_skip_the_rate_limiter() {
	let transport = Arc::new(ScriptedTransport::default());
	let mut config = test_config();

	config.rate_limit.short.limit = 1;

	let client = ApiClient::with_transport(config, transport.clone(), Stores::default());

	for _ in 0..3 {
		transport.push(HEALTH_PATH, HttpResponse::new(200));
		client.check_health().await;
	}

	assert_eq!(transport.calls(HEALTH_PATH), 3);
	assert_eq!(client.health().status(), HealthStatus::Healthy);
	assert!(!client.health_status().is_authenticated);
}

#[tokio::test]
async fn dropping_the_client_stops_the_probe() {
	let transport = Arc::new(ScriptedTransport::default());
	let client = probing_client(&transport);

	client.initialize().await.expect("Initialization should succeed.");
	tokio::time::sleep(StdDuration::from_millis(50)).await;
	drop(client);

	let observed = transport.calls(HEALTH_PATH);

	tokio::time::sleep(StdDuration::from_millis(100)).await;

	assert!(transport.calls(HEALTH_PATH) <= observed + 1);
}

#[tokio::test]
async fn disabled_probes_never_start() {
	let transport = Arc::new(ScriptedTransport::default());
	let mut config = test_config();

	config.health.enabled = false;
	transport.push("/oauth/token", token_response("a1", None, 3_600));

	let client = ApiClient::with_transport(config, transport.clone(), Stores::default());

	client.initialize().await.expect("Initialization should succeed.");

	assert!(!client.is_probing());
	assert_eq!(client.health_status().status, HealthStatus::Unknown);
}
