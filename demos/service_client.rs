//! Demonstrates a bearer-authenticated client against a mock API: the first token is
//! rejected, renewed once, and the call succeeds; a listing is then streamed across pages
//! while every request is logged through `tracing` with sensitive fields redacted.

// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
// crates.io
use color_eyre::Result;
use futures::TryStreamExt;
use httpmock::prelude::*;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;
// self
use json_http_service::{
	client::{LoggingConfig, PaginateOptions, RequestOptions, ReqwestHttpService, ServiceConfig},
	obs::TracingLogger,
	redact::MaskRules,
	resilience::{Backoff, RetryPolicy},
};

#[derive(Debug, Deserialize)]
struct Profile {
	id: u32,
	name: String,
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
		)
		.init();

	let server = MockServer::start_async().await;
	let rejected = server
		.mock_async(|when, then| {
			when.method(GET).path("/v1/me").header("authorization", "Bearer demo-1");
			then.status(401);
		})
		.await;
	let accepted = server
		.mock_async(|when, then| {
			when.method(GET).path("/v1/me").header("authorization", "Bearer demo-2");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"id\":7,\"name\":\"Ada\",\"password\":\"hunter2\"}");
		})
		.await;
	let first_page = server
		.mock_async(|when, then| {
			when.method(GET).path("/v1/items");
			then.status(200)
				.header("content-type", "application/json")
				.header("link", "</v1/items/page-2>; rel=\"next\"")
				.body("[1,2,3]");
		})
		.await;
	let second_page = server
		.mock_async(|when, then| {
			when.method(GET).path("/v1/items/page-2");
			then.status(200).header("content-type", "application/json").body("[4,5]");
		})
		.await;
	let issued = Arc::new(AtomicUsize::new(0));
	let counter = issued.clone();
	let config = ServiceConfig::builder(server.url("/v1/"))
		.token_source(move || {
			let n = counter.fetch_add(1, Ordering::SeqCst) + 1;

			async move { Ok::<_, std::io::Error>(format!("demo-{n}")) }
		})
		.resilience_policy(Arc::new(
			RetryPolicy::new(3).with_backoff(Backoff::Constant(Duration::from_millis(50))),
		))
		.logging(
			LoggingConfig::new(Arc::new(TracingLogger))
				.with_rules(MaskRules::default().hide(["password"]).mask(["name"])),
		)
		.timeout(Duration::from_secs(5))
		.build()?;
	let service = ReqwestHttpService::new(config);
	let profile = service.get::<Profile>("me", RequestOptions::default()).await?;

	println!(
		"Fetched profile {} ({}) with HTTP {} after {} token acquisitions.",
		profile.data.id,
		profile.data.name,
		profile.status_code,
		issued.load(Ordering::SeqCst)
	);

	let items = service
		.paginate::<u32>("items", PaginateOptions::default().count_limit(4))
		.try_collect::<Vec<_>>()
		.await?;

	println!("Streamed items: {items:?}.");

	rejected.assert_async().await;
	accepted.assert_async().await;
	first_page.assert_async().await;
	second_page.assert_async().await;

	Ok(())
}
