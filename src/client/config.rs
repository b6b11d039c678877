//! Client configuration: validated builder plus a serde-loadable settings document.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::TokenSource,
	error::ConfigError,
	intercept::Interceptor,
	obs::Logger,
	redact::MaskRules,
	resilience::ResiliencePolicy,
};

/// Header names the client always sends unless the caller overrides them.
pub const DEFAULT_HEADERS: [(&str, &str); 2] =
	[("content-type", "application/json"), ("accept", "application/json")];

/// Diagnostic logging settings.
#[derive(Clone)]
pub struct LoggingConfig {
	/// Sink receiving request snapshots, failures, and policy events.
	pub logger: Arc<dyn Logger>,
	/// Redaction rules applied to every logged payload.
	pub rules: MaskRules,
	/// Whether resilience policy successes and failures are logged.
	pub policy_events: bool,
}
impl LoggingConfig {
	/// Logs through `logger` with no redaction rules and policy events enabled.
	pub fn new(logger: Arc<dyn Logger>) -> Self {
		Self { logger, rules: MaskRules::default(), policy_events: true }
	}

	/// Replaces the redaction rules.
	pub fn with_rules(mut self, rules: MaskRules) -> Self {
		self.rules = rules;

		self
	}

	/// Toggles policy-event logging.
	pub fn with_policy_events(mut self, enabled: bool) -> Self {
		self.policy_events = enabled;

		self
	}
}
impl Debug for LoggingConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoggingConfig")
			.field("rules", &self.rules)
			.field("policy_events", &self.policy_events)
			.finish()
	}
}

/// Immutable configuration owned by an [`HttpService`](crate::client::HttpService).
#[derive(Clone)]
pub struct ServiceConfig {
	/// Base URL every path is resolved against.
	pub base_url: Url,
	/// Default headers keyed by lowercase names.
	pub headers: BTreeMap<String, String>,
	/// Default per-request timeout forwarded to the transport.
	pub timeout: Option<StdDuration>,
	/// Bearer token source; authentication is skipped entirely when absent.
	pub token_source: Option<Arc<dyn TokenSource>>,
	/// Whether concurrent first token fetches share a single acquisition.
	pub coalesce_token_fetches: bool,
	/// Client-wide resilience policy.
	pub resilience_policy: Option<Arc<dyn ResiliencePolicy>>,
	/// Diagnostic logging; nothing is logged when absent.
	pub logging: Option<LoggingConfig>,
	/// Extra interceptors appended after bearer authentication.
	pub interceptors: Vec<Arc<dyn Interceptor>>,
}
impl ServiceConfig {
	/// Starts a builder for `base_url`.
	pub fn builder(base_url: impl Into<String>) -> ServiceConfigBuilder {
		ServiceConfigBuilder::new(base_url)
	}
}
impl Debug for ServiceConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceConfig")
			.field("base_url", &self.base_url.as_str())
			.field("headers", &self.headers)
			.field("timeout", &self.timeout)
			.field("authenticated", &self.token_source.is_some())
			.field("coalesce_token_fetches", &self.coalesce_token_fetches)
			.field("resilience_policy", &self.resilience_policy.is_some())
			.field("logging", &self.logging)
			.field("interceptors", &self.interceptors.len())
			.finish()
	}
}

/// Builder for [`ServiceConfig`] values.
#[derive(Clone)]
pub struct ServiceConfigBuilder {
	base_url: String,
	headers: Vec<(String, String)>,
	timeout: Option<StdDuration>,
	token_source: Option<Arc<dyn TokenSource>>,
	coalesce_token_fetches: bool,
	resilience_policy: Option<Arc<dyn ResiliencePolicy>>,
	logging: Option<LoggingConfig>,
	interceptors: Vec<Arc<dyn Interceptor>>,
}
impl ServiceConfigBuilder {
	/// Creates a builder seeded with the base URL.
	pub fn new(base_url: impl Into<String>) -> Self {
		Self {
			base_url: base_url.into(),
			headers: Vec::new(),
			timeout: None,
			token_source: None,
			coalesce_token_fetches: false,
			resilience_policy: None,
			logging: None,
			interceptors: Vec::new(),
		}
	}

	/// Adds or overrides a default header.
	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Adds or overrides several default headers.
	pub fn headers<I, K, V>(mut self, headers: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		self.headers.extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));

		self
	}

	/// Sets the default per-request timeout.
	pub fn timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = Some(timeout);

		self
	}

	/// Enables bearer authentication backed by `source`.
	pub fn token_source(mut self, source: impl 'static + TokenSource) -> Self {
		self.token_source = Some(Arc::new(source));

		self
	}

	/// Enables bearer authentication backed by a shared source.
	pub fn shared_token_source(mut self, source: Arc<dyn TokenSource>) -> Self {
		self.token_source = Some(source);

		self
	}

	/// Makes concurrent first token fetches share a single acquisition.
	pub fn coalesce_token_fetches(mut self, enabled: bool) -> Self {
		self.coalesce_token_fetches = enabled;

		self
	}

	/// Sets the client-wide resilience policy.
	pub fn resilience_policy(mut self, policy: Arc<dyn ResiliencePolicy>) -> Self {
		self.resilience_policy = Some(policy);

		self
	}

	/// Enables diagnostic logging.
	pub fn logging(mut self, logging: LoggingConfig) -> Self {
		self.logging = Some(logging);

		self
	}

	/// Appends an interceptor that runs after bearer authentication.
	pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
		self.interceptors.push(interceptor);

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<ServiceConfig, ConfigError> {
		let base_url = parse_base_url(&self.base_url)?;
		let mut headers = DEFAULT_HEADERS
			.iter()
			.map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
			.collect::<BTreeMap<_, _>>();

		for (name, value) in self.headers {
			validate_header_name(&name)?;

			headers.insert(name.to_ascii_lowercase(), value);
		}
		if let Some(timeout) = self.timeout {
			validate_timeout(timeout)?;
		}

		Ok(ServiceConfig {
			base_url,
			headers,
			timeout: self.timeout,
			token_source: self.token_source,
			coalesce_token_fetches: self.coalesce_token_fetches,
			resilience_policy: self.resilience_policy,
			logging: self.logging,
			interceptors: self.interceptors,
		})
	}
}
impl Debug for ServiceConfigBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceConfigBuilder")
			.field("base_url", &self.base_url)
			.field("headers", &self.headers)
			.field("timeout", &self.timeout)
			.finish_non_exhaustive()
	}
}

/// Serde-loadable subset of [`ServiceConfig`].
///
/// Collaborators that cannot be expressed as data (token source, policy, logger) are added
/// to the builder returned by [`ServiceSettings::into_builder`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceSettings {
	/// Base URL every path is resolved against.
	pub base_url: String,
	/// Default headers.
	#[serde(default)]
	pub headers: BTreeMap<String, String>,
	/// Default per-request timeout in milliseconds.
	#[serde(default)]
	pub timeout_ms: Option<u64>,
	/// Field names removed from logged payloads.
	#[serde(default)]
	pub hide_properties: Vec<String>,
	/// Field names masked in logged payloads.
	#[serde(default)]
	pub mask_properties: Vec<String>,
}
impl ServiceSettings {
	/// Parses a JSON settings document, reporting the failing field path on error.
	pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
		let de = &mut serde_json::Deserializer::from_str(raw);

		serde_path_to_error::deserialize(de).map_err(|source| ConfigError::InvalidSettings { source })
	}

	/// Parses settings from an already decoded JSON value.
	pub fn from_value(value: Value) -> Result<Self, ConfigError> {
		serde_path_to_error::deserialize(value)
			.map_err(|source| ConfigError::InvalidSettings { source })
	}

	/// Redaction rules described by the settings.
	pub fn mask_rules(&self) -> MaskRules {
		MaskRules::default()
			.hide(self.hide_properties.iter().cloned())
			.mask(self.mask_properties.iter().cloned())
	}

	/// Seeds a builder with the settings; logging rules apply once a logger is attached via
	/// [`ServiceSettings::logging`].
	pub fn into_builder(self) -> ServiceConfigBuilder {
		let mut builder = ServiceConfigBuilder::new(self.base_url).headers(self.headers);

		if let Some(ms) = self.timeout_ms {
			builder = builder.timeout(StdDuration::from_millis(ms));
		}

		builder
	}

	/// Builds a [`LoggingConfig`] for `logger` using the settings' redaction rules.
	pub fn logging(&self, logger: Arc<dyn Logger>) -> LoggingConfig {
		LoggingConfig::new(logger).with_rules(self.mask_rules())
	}
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
	let url = Url::parse(raw).map_err(|source| ConfigError::InvalidBaseUrl { source })?;

	match url.scheme() {
		"http" | "https" => Ok(url),
		_ => Err(ConfigError::UnsupportedScheme { url: url.to_string() }),
	}
}

fn validate_header_name(name: &str) -> Result<(), ConfigError> {
	let is_token = !name.is_empty()
		&& name.bytes().all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b));

	if is_token { Ok(()) } else { Err(ConfigError::InvalidHeader { name: name.to_owned() }) }
}

fn validate_timeout(timeout: StdDuration) -> Result<(), ConfigError> {
	if timeout.is_zero() { Err(ConfigError::ZeroTimeout) } else { Ok(()) }
}

pub(crate) fn validate_request_headers(
	headers: &BTreeMap<String, String>,
) -> Result<(), ConfigError> {
	headers.keys().try_for_each(|name| validate_header_name(name))
}

pub(crate) fn validate_request_timeout(timeout: Option<StdDuration>) -> Result<(), ConfigError> {
	timeout.map_or(Ok(()), validate_timeout)
}
