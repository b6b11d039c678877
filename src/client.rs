//! Request dispatcher: the public client surface.

pub mod config;
pub mod options;
pub mod paginate;

pub use config::*;
pub use options::*;
pub use paginate::*;

// std
use std::collections::{HashSet, VecDeque};
// crates.io
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{Map, Value, json};
// self
use crate::{
	_prelude::*,
	auth::CredentialCache,
	error::ConfigError,
	http::{JsonTransport, Method, TransportRequest, TransportResponse},
	intercept::{BearerAuth, Disposition, Pipeline},
	obs::{self, RequestOutcome, RequestSpan},
	redact::redact,
	resilience::{ResilienceExecutor, operation},
	shape::plain_to_shape,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

#[cfg(feature = "reqwest")]
/// Service specialized for the crate's default reqwest transport.
pub type ReqwestHttpService = HttpService<ReqwestTransport>;

/// JSON client bound to a single base URL.
///
/// Every verb resolves its path against the base URL, logs a redacted snapshot of the call,
/// and drives the transport through the resolved resilience policy. When a token source is
/// configured, each attempt carries `Authorization: Bearer <token>` and an unauthorized
/// response triggers exactly one token renewal and resend inside that attempt. Non-2xx
/// responses surface as [`Error::Status`] once the policy gives up.
pub struct HttpService<C>
where
	C: ?Sized + JsonTransport,
{
	transport: Arc<C>,
	config: Arc<ServiceConfig>,
	credentials: Option<Arc<CredentialCache>>,
	pipeline: Pipeline,
	executor: Arc<ResilienceExecutor>,
}
impl<C> HttpService<C>
where
	C: ?Sized + JsonTransport,
{
	/// Creates a service that sends through the caller-provided transport.
	pub fn with_transport(config: ServiceConfig, transport: impl Into<Arc<C>>) -> Self {
		let credentials = config.token_source.clone().map(|source| {
			Arc::new(CredentialCache::new(source).with_coalescing(config.coalesce_token_fetches))
		});
		let mut pipeline = Pipeline::default();

		if let Some(cache) = &credentials {
			pipeline.push(Arc::new(BearerAuth::new(cache.clone())));
		}
		for interceptor in &config.interceptors {
			pipeline.push(interceptor.clone());
		}

		let policy_logger = config
			.logging
			.as_ref()
			.filter(|logging| logging.policy_events)
			.map(|logging| logging.logger.clone());
		let executor =
			Arc::new(ResilienceExecutor::new(config.resilience_policy.clone(), policy_logger));

		Self {
			transport: transport.into(),
			config: Arc::new(config),
			credentials,
			pipeline,
			executor,
		}
	}

	/// Configuration the service was built with.
	pub fn config(&self) -> &ServiceConfig {
		&self.config
	}

	/// Token cache, present only when a token source is configured.
	pub fn credentials(&self) -> Option<&Arc<CredentialCache>> {
		self.credentials.as_ref()
	}

	/// Underlying transport.
	pub fn transport(&self) -> &Arc<C> {
		&self.transport
	}

	/// Resolves `path` against the base URL with standard URL-join semantics.
	pub fn url_from_path(&self, path: &str) -> Result<Url> {
		self.config
			.base_url
			.join(path)
			.map_err(|source| ConfigError::InvalidPath { path: path.to_owned(), source }.into())
	}

	/// Issues a `GET` and coerces the body into `T`.
	pub async fn get<T>(&self, path: &str, options: RequestOptions) -> Result<JsonResponse<T>>
	where
		T: DeserializeOwned,
	{
		self.call(Method::Get, "get", path, None, options).await
	}

	/// Issues a `POST` with a JSON body and coerces the response into `T`.
	///
	/// A body serializing to `null` is omitted.
	pub async fn post<T, B>(
		&self,
		path: &str,
		body: &B,
		options: RequestOptions,
	) -> Result<JsonResponse<T>>
	where
		T: DeserializeOwned,
		B: ?Sized + Serialize,
	{
		self.call(Method::Post, "post", path, encode_body(body)?, options).await
	}

	/// Issues a `PUT` with a JSON body and coerces the response into `T`.
	///
	/// A body serializing to `null` is omitted.
	pub async fn put<T, B>(
		&self,
		path: &str,
		body: &B,
		options: RequestOptions,
	) -> Result<JsonResponse<T>>
	where
		T: DeserializeOwned,
		B: ?Sized + Serialize,
	{
		self.call(Method::Put, "put", path, encode_body(body)?, options).await
	}

	/// Issues a `DELETE` and coerces the body into `T`.
	pub async fn delete<T>(&self, path: &str, options: RequestOptions) -> Result<JsonResponse<T>>
	where
		T: DeserializeOwned,
	{
		self.call(Method::Delete, "delete", path, None, options).await
	}

	/// Streams items across pages, starting at `path`.
	///
	/// The stream is lazy: a page is fetched only once the previous one has been consumed,
	/// and dropping the stream drops any in-flight request. Every page goes through the same
	/// logging, policy, and authentication path as the verbs. The stream ends after the first
	/// error, and when a `next` link points back to a page that was already fetched.
	pub fn paginate<'a, T>(
		&'a self,
		path: &str,
		options: PaginateOptions,
	) -> BoxStream<'a, Result<T>>
	where
		T: 'a + Send + DeserializeOwned,
	{
		let first = match self.url_from_path(path) {
			Ok(url) => url,
			Err(e) => return stream::once(async move { Err(e) }).boxed(),
		};
		let cursor = PageCursor {
			next: Some(first),
			visited: HashSet::new(),
			buffer: VecDeque::new(),
			remaining: options.count_limit,
		};

		stream::try_unfold(cursor, move |cursor| {
			self.next_item(cursor, options.request.clone(), options.strategy.clone())
		})
		.boxed()
	}

	async fn next_item<T>(
		&self,
		mut cursor: PageCursor,
		request: RequestOptions,
		strategy: Arc<dyn PageStrategy>,
	) -> Result<Option<(T, PageCursor)>>
	where
		T: DeserializeOwned,
	{
		loop {
			if cursor.remaining == Some(0) {
				return Ok(None);
			}
			if let Some(item) = cursor.buffer.pop_front() {
				let item = plain_to_shape::<T>(item)?;

				if let Some(remaining) = cursor.remaining.as_mut() {
					*remaining -= 1;
				}

				return Ok(Some((item, cursor)));
			}

			let Some(url) = cursor.next.take() else { return Ok(None) };

			if !cursor.visited.insert(url.clone()) {
				self.log_warn("Pagination link cycle detected.", json!({ "target": url.as_str() }));

				return Ok(None);
			}

			let page_url = url.clone();
			let page = self
				.dispatch(Method::Get, "paginate", url, None, request.clone(), |response| {
					strategy.parse(&page_url, response)
				})
				.await?;

			cursor.buffer.extend(page.items);
			cursor.next = page.next;
		}
	}

	async fn call<T>(
		&self,
		method: Method,
		stage: &'static str,
		path: &str,
		body: Option<Value>,
		options: RequestOptions,
	) -> Result<JsonResponse<T>>
	where
		T: DeserializeOwned,
	{
		let url = self.url_from_path(path)?;

		self.dispatch(method, stage, url, body, options, |response| {
			let status_code = response.status;
			let data = plain_to_shape(response.body)?;

			Ok(JsonResponse { data, status_code })
		})
		.await
	}

	async fn dispatch<R, F>(
		&self,
		method: Method,
		stage: &'static str,
		url: Url,
		body: Option<Value>,
		options: RequestOptions,
		finish: F,
	) -> Result<R>
	where
		F: FnOnce(TransportResponse) -> Result<R>,
	{
		let span = RequestSpan::new(method, stage);

		span.instrument(async move {
			obs::record_request_outcome(method, RequestOutcome::Attempt);

			let (policy, transport_options) = options.into_parts();
			let snapshot = if self.logging_enabled() {
				match request_snapshot(method, &url, body.as_ref(), &transport_options) {
					Ok(snapshot) => Some(snapshot),
					Err(e) => {
						self.log_warn(
							"Request snapshot could not be serialized.",
							json!({ "target": url.as_str(), "error": e.to_string() }),
						);

						None
					},
				}
			} else {
				None
			};

			if let Some(snapshot) = &snapshot {
				self.log_debug("Dispatching request.", snapshot);
			}

			let outcome = async move {
				let request = self.build_request(method, url, body, transport_options)?;
				let response = self
					.executor
					.execute(policy.as_ref(), operation(move || self.attempt(request.clone())))
					.await?;

				finish(response)
			}
			.await;

			match &outcome {
				Ok(_) => obs::record_request_outcome(method, RequestOutcome::Success),
				Err(e) => {
					obs::record_request_outcome(method, RequestOutcome::Failure);

					if let Some(snapshot) = snapshot {
						self.log_error("Request failed.", failure_snapshot(snapshot, e));
					}
				},
			}

			outcome
		})
		.await
	}

	async fn attempt(&self, request: TransportRequest) -> Result<TransportResponse> {
		let mut outbound = request.clone();

		self.pipeline.prepare(&mut outbound).await?;

		let mut response = self.transport.send(outbound).await?;

		if self.pipeline.handle(&response).await? == Disposition::Retry {
			let mut retried = request;

			self.pipeline.prepare(&mut retried).await?;

			response = self.transport.send(retried).await?;
		}

		response.error_for_status()
	}

	fn build_request(
		&self,
		method: Method,
		mut url: Url,
		body: Option<Value>,
		options: TransportOptions,
	) -> Result<TransportRequest> {
		config::validate_request_headers(&options.headers)?;
		config::validate_request_timeout(options.timeout)?;

		if !options.query.is_empty() {
			url.query_pairs_mut().extend_pairs(&options.query);
		}

		let mut request = TransportRequest::new(method, url);

		for (name, value) in self.config.headers.iter().chain(&options.headers) {
			request.set_header(name, value.as_str());
		}

		request.body = if method.has_body() { body } else { None };
		request.timeout = options.timeout.or(self.config.timeout);

		Ok(request)
	}

	fn logging_enabled(&self) -> bool {
		self.config.logging.is_some()
	}

	fn log_debug(&self, message: &str, data: &Value) {
		if let Some(logging) = &self.config.logging {
			logging.logger.debug(message, Some(&redact(data, &logging.rules)));
		}
	}

	fn log_warn(&self, message: &str, data: Value) {
		if let Some(logging) = &self.config.logging {
			logging.logger.warn(message, Some(&redact(&data, &logging.rules)));
		}
	}

	fn log_error(&self, message: &str, data: Value) {
		if let Some(logging) = &self.config.logging {
			logging.logger.error(message, Some(&redact(&data, &logging.rules)));
		}
	}
}
#[cfg(feature = "reqwest")]
impl HttpService<ReqwestTransport> {
	/// Creates a service backed by a default reqwest client.
	pub fn new(config: ServiceConfig) -> Self {
		Self::with_transport(config, ReqwestTransport::default())
	}
}
impl<C> Clone for HttpService<C>
where
	C: ?Sized + JsonTransport,
{
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			config: self.config.clone(),
			credentials: self.credentials.clone(),
			pipeline: self.pipeline.clone(),
			executor: self.executor.clone(),
		}
	}
}
impl<C> Debug for HttpService<C>
where
	C: ?Sized + JsonTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HttpService")
			.field("config", &self.config)
			.field("credentials", &self.credentials)
			.field("pipeline", &self.pipeline)
			.field("executor", &self.executor)
			.finish()
	}
}

struct PageCursor {
	next: Option<Url>,
	visited: HashSet<Url>,
	buffer: VecDeque<Value>,
	remaining: Option<usize>,
}

fn encode_body<B>(body: &B) -> Result<Option<Value>>
where
	B: ?Sized + Serialize,
{
	let value = serde_json::to_value(body).map_err(ConfigError::RequestBody)?;

	Ok(if value.is_null() { None } else { Some(value) })
}

fn request_snapshot(
	method: Method,
	url: &Url,
	body: Option<&Value>,
	options: &TransportOptions,
) -> Result<Value, serde_json::Error> {
	let mut snapshot = Map::new();

	snapshot.insert("method".into(), Value::String(method.as_str().to_owned()));
	snapshot.insert("target".into(), Value::String(url.as_str().to_owned()));

	if method.has_body() {
		snapshot.insert("body".into(), body.cloned().unwrap_or(Value::Null));
	}

	snapshot.insert("options".into(), serde_json::to_value(options)?);

	Ok(Value::Object(snapshot))
}

fn failure_snapshot(mut snapshot: Value, error: &Error) -> Value {
	if let Value::Object(map) = &mut snapshot {
		map.insert("error".into(), Value::String(error.to_string()));

		if let Some(status) = error.status() {
			map.insert("status".into(), Value::from(status));
		}
	}

	snapshot
}
