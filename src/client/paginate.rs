//! Page parsing for [`HttpService::paginate`](crate::client::HttpService::paginate).

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	client::RequestOptions,
	error::ShapeError,
	http::TransportResponse,
	shape::json_type,
};

/// One decoded page.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Page {
	/// Raw items, coerced into the caller's type as they are yielded.
	pub items: Vec<Value>,
	/// Absolute URL of the next page, if any.
	pub next: Option<Url>,
}

/// Extracts items and the next-page location from a response.
pub trait PageStrategy
where
	Self: Send + Sync,
{
	/// Parses the response fetched from `url`.
	fn parse(&self, url: &Url, response: TransportResponse) -> Result<Page>;
}

/// Array bodies chained through `Link: <...>; rel="next"` headers.
#[derive(Clone, Copy, Debug, Default)]
pub struct LinkHeaderPages;
impl PageStrategy for LinkHeaderPages {
	fn parse(&self, url: &Url, response: TransportResponse) -> Result<Page> {
		let next = response.header("link").and_then(|link| next_link(url, link));
		let items = match response.body {
			Value::Array(items) => items,
			Value::Null => Vec::new(),
			other => return Err(ShapeError::ExpectedSequence { found: json_type(&other) }.into()),
		};

		Ok(Page { items, next })
	}
}

/// Options for a paginated listing.
#[derive(Clone)]
pub struct PaginateOptions {
	/// Options applied to every page request.
	pub request: RequestOptions,
	/// Page parser.
	pub strategy: Arc<dyn PageStrategy>,
	/// Maximum number of items yielded across all pages.
	pub count_limit: Option<usize>,
}
impl PaginateOptions {
	/// Replaces the per-page request options.
	pub fn request(mut self, request: RequestOptions) -> Self {
		self.request = request;

		self
	}

	/// Replaces the page parser.
	pub fn strategy(mut self, strategy: Arc<dyn PageStrategy>) -> Self {
		self.strategy = strategy;

		self
	}

	/// Stops after `limit` items.
	pub fn count_limit(mut self, limit: usize) -> Self {
		self.count_limit = Some(limit);

		self
	}
}
impl Default for PaginateOptions {
	fn default() -> Self {
		Self {
			request: RequestOptions::default(),
			strategy: Arc::new(LinkHeaderPages),
			count_limit: None,
		}
	}
}
impl Debug for PaginateOptions {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PaginateOptions")
			.field("request", &self.request)
			.field("count_limit", &self.count_limit)
			.finish_non_exhaustive()
	}
}

fn next_link(base: &Url, header: &str) -> Option<Url> {
	header.split(',').find_map(|entry| {
		let mut parts = entry.split(';');
		let target = parts.next()?.trim().strip_prefix('<')?.strip_suffix('>')?;
		let is_next = parts.any(|param| {
			let Some((name, value)) = param.split_once('=') else { return false };

			name.trim().eq_ignore_ascii_case("rel")
				&& value.trim().trim_matches('"').split_ascii_whitespace().any(|rel| rel == "next")
		});

		if is_next { base.join(target).ok() } else { None }
	})
}
