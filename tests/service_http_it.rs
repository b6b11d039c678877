// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
// crates.io
use futures::TryStreamExt;
use httpmock::prelude::*;
use serde::Deserialize;
use serde_json::{Value, json};
// self
use json_http_service::{
	client::{
		HttpService, JsonResponse, PaginateOptions, RequestOptions, ReqwestHttpService,
		ServiceConfig, ServiceConfigBuilder,
	},
	error::Error,
	http::ReqwestTransport,
	resilience::{Backoff, RetryPolicy},
};

#[derive(Debug, PartialEq, Deserialize)]
struct Profile {
	id: u32,
	name: String,
}

fn with_counting_tokens(
	builder: ServiceConfigBuilder,
	prefix: &'static str,
) -> (ServiceConfigBuilder, Arc<AtomicUsize>) {
	let issued = Arc::new(AtomicUsize::new(0));
	let counter = issued.clone();
	let builder = builder.token_source(move || {
		let n = counter.fetch_add(1, Ordering::SeqCst) + 1;

		async move { Ok::<_, std::io::Error>(format!("{prefix}-{n}")) }
	});

	(builder, issued)
}

fn build(builder: ServiceConfigBuilder) -> ReqwestHttpService {
	HttpService::with_transport(
		builder.build().expect("Test configuration should build."),
		ReqwestTransport::default(),
	)
}

#[tokio::test]
async fn unauthorized_response_renews_token_once() {
	let server = MockServer::start_async().await;
	let rejected = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/me").header("authorization", "Bearer tok-1");
			then.status(401);
		})
		.await;
	let accepted = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/me").header("authorization", "Bearer tok-2");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"id\":7,\"name\":\"Ada\"}");
		})
		.await;
	let (builder, issued) = with_counting_tokens(ServiceConfig::builder(server.url("/api/")), "tok");
	let service = build(builder);
	let response = service
		.get::<Profile>("me", RequestOptions::default())
		.await
		.expect("Renewed token should be accepted.");

	assert_eq!(
		response,
		JsonResponse { data: Profile { id: 7, name: "Ada".into() }, status_code: 200 }
	);
	assert_eq!(issued.load(Ordering::SeqCst), 2);

	rejected.assert_async().await;
	accepted.assert_async().await;
}

#[tokio::test]
async fn retry_policy_recovers_from_server_errors() {
	let server = MockServer::start_async().await;
	let mut busy = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/status");
			then.status(503).header("retry-after", "1");
		})
		.await;
	let policy = RetryPolicy::new(3)
		.with_backoff(Backoff::Immediate)
		.with_retry_after_cap(Duration::from_millis(20));
	let service = build(
		ServiceConfig::builder(server.url("/api/")).resilience_policy(Arc::new(policy)),
	);
	let err = service
		.get::<Value>("status", RequestOptions::default())
		.await
		.expect_err("Every attempt should be rejected.");

	assert_eq!(err.status(), Some(503));
	assert_eq!(busy.hits_async().await, 3);

	busy.delete_async().await;

	let healthy = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/status");
			then.status(200).header("content-type", "application/json").body("{\"ok\":true}");
		})
		.await;
	let response = service
		.get::<Value>("status", RequestOptions::default())
		.await
		.expect("Healthy endpoint should succeed.");

	assert_eq!(response.data, json!({ "ok": true }));

	healthy.assert_async().await;
}

#[tokio::test]
async fn write_verbs_send_json_bodies_and_headers() {
	let server = MockServer::start_async().await;
	let created = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/users")
				.query_param("notify", "false")
				.header("content-type", "application/json")
				.header("x-request-id", "abc")
				.json_body(json!({ "name": "Ada" }));
			then.status(201).header("content-type", "application/json").body("{\"id\":1}");
		})
		.await;
	let deleted = server
		.mock_async(|when, then| {
			when.method(DELETE).path("/api/users/1");
			then.status(204);
		})
		.await;
	let service = build(ServiceConfig::builder(server.url("/api/")));
	let response = service
		.post::<Value, _>(
			"users",
			&json!({ "name": "Ada" }),
			RequestOptions::default().query("notify", "false").header("X-Request-Id", "abc"),
		)
		.await
		.expect("Create should succeed.");

	assert_eq!(response.status_code, 201);
	assert_eq!(response.data, json!({ "id": 1 }));

	let removed = service
		.delete::<Value>("users/1", RequestOptions::default())
		.await
		.expect("Delete should succeed.");

	assert_eq!(removed, JsonResponse { data: Value::Null, status_code: 204 });

	created.assert_async().await;
	deleted.assert_async().await;
}

#[tokio::test]
async fn error_status_keeps_decoded_body() {
	let server = MockServer::start_async().await;
	let _mock = server
		.mock_async(|when, then| {
			when.method(PUT).path("/api/users/9");
			then.status(422)
				.header("content-type", "application/json")
				.body("{\"message\":\"name is required\"}");
		})
		.await;
	let service = build(ServiceConfig::builder(server.url("/api/")));
	let err = service
		.put::<Value, _>("users/9", &json!({}), RequestOptions::default())
		.await
		.expect_err("Validation failure should surface.");

	match err {
		Error::Status { status, body, .. } => {
			assert_eq!(status, 422);
			assert_eq!(body["message"], "name is required");
		},
		other => panic!("Unexpected error: {other:?}."),
	}
}

#[tokio::test]
async fn paginate_streams_across_link_headers() {
	let server = MockServer::start_async().await;
	let first = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/items");
			then.status(200)
				.header("content-type", "application/json")
				.header("link", "</api/items/page-2>; rel=\"next\"")
				.body("[1,2]");
		})
		.await;
	let second = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/items/page-2");
			then.status(200).header("content-type", "application/json").body("[3]");
		})
		.await;
	let service = build(ServiceConfig::builder(server.url("/api/")));
	let items = service
		.paginate::<u32>("items", PaginateOptions::default())
		.try_collect::<Vec<_>>()
		.await
		.expect("Every page should load.");

	assert_eq!(items, vec![1, 2, 3]);

	first.assert_async().await;
	second.assert_async().await;
}
