//! External graph data source: initial load, child expansion and remote search.

use std::future::Future;

use log::debug;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Request, RequestInit, RequestMode, Response};

use super::error::GraphError;
use super::types::GraphData;

/// Where graph data comes from. Responses use the `{nodes, links}` shape,
/// optionally wrapped in `{data: ...}`.
pub trait GraphSource {
	/// Initial graph for a free-text query.
	fn fetch_initial(&self, query: &str) -> impl Future<Output = Result<GraphData, GraphError>>;

	/// The new children of `id` and the links connecting them.
	fn fetch_children(&self, id: &str) -> impl Future<Output = Result<GraphData, GraphError>>;

	/// Remote search; results come back already filtered and ranked.
	fn search(&self, query: &str) -> impl Future<Output = Result<GraphData, GraphError>>;
}

/// [`GraphSource`] backed by `window.fetch` against a `/search` endpoint.
#[derive(Clone, Debug)]
pub struct HttpGraphSource {
	base_url: String,
	depth: u32,
	limit: u32,
}

impl HttpGraphSource {
	pub fn new(base_url: impl Into<String>, depth: u32, limit: u32) -> Self {
		let base_url: String = base_url.into();
		Self {
			base_url: base_url.trim_end_matches('/').to_string(),
			depth,
			limit,
		}
	}

	fn url(&self, params: &[(&str, String)]) -> String {
		let query = params
			.iter()
			.map(|(key, value)| format!("{key}={}", js_sys::encode_uri_component(value)))
			.collect::<Vec<_>>()
			.join("&");
		format!("{}/search?{query}", self.base_url)
	}

	async fn get(&self, url: String) -> Result<GraphData, GraphError> {
		debug!("kb-graph: GET {url}");
		let opts = RequestInit::new();
		opts.set_method("GET");
		opts.set_mode(RequestMode::Cors);

		let request = Request::new_with_str_and_init(&url, &opts)
			.map_err(|e| GraphError::Network(format!("{e:?}")))?;
		let window = web_sys::window().ok_or(GraphError::NoWindow)?;
		let response: Response = JsFuture::from(window.fetch_with_request(&request))
			.await
			.map_err(|e| GraphError::Network(format!("{e:?}")))?
			.dyn_into()
			.map_err(|_| GraphError::Network("fetch did not return a Response".into()))?;

		if !response.ok() {
			return Err(GraphError::Http {
				status: response.status(),
			});
		}

		let text = JsFuture::from(
			response
				.text()
				.map_err(|e| GraphError::Network(format!("{e:?}")))?,
		)
		.await
		.map_err(|e| GraphError::Network(format!("{e:?}")))?;
		let text = text.as_string().unwrap_or_default();
		Ok(GraphData::from_json(&text)?)
	}
}

impl GraphSource for HttpGraphSource {
	async fn fetch_initial(&self, query: &str) -> Result<GraphData, GraphError> {
		let url = self.url(&[
			("q", query.to_string()),
			("depth", self.depth.to_string()),
			("limit", self.limit.to_string()),
		]);
		self.get(url).await
	}

	async fn fetch_children(&self, id: &str) -> Result<GraphData, GraphError> {
		let url = self.url(&[("id", id.to_string()), ("depth", self.depth.to_string())]);
		self.get(url).await
	}

	async fn search(&self, query: &str) -> Result<GraphData, GraphError> {
		self.get(self.url(&[("q", query.to_string())])).await
	}
}
