//! Graph data structures consumed by the graph view.
//!
//! Upstream payloads are inconsistent: metadata may be nested under `metadata`
//! or spread over the node itself, link endpoints may be bare IDs or node
//! objects, and the whole payload may be wrapped in `{ "data": ... }`. Every
//! shape is normalized here, at deserialization time, so the rest of the crate
//! only ever sees the canonical form.

use log::debug;
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::normalize;

/// Citation and taxonomy metadata attached to a node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeMetadata {
	pub tags: Vec<String>,
	pub hypernyms: Vec<String>,
	pub hyponyms: Vec<String>,
	pub is_cited: bool,
	pub citation_index: Option<u32>,
	pub cited_frame_ids: Vec<String>,
}

/// A node in the knowledge graph.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(from = "RawNode")]
pub struct GraphNode {
	/// Stable identifier, unique within a graph.
	pub id: String,
	/// Display label.
	pub title: String,
	/// Raw type tag (`document`, `heading_section`, `tag`, ...).
	pub kind: String,
	pub summary: Option<String>,
	pub metadata: NodeMetadata,
	/// `Some(true)` when the data source reports expandable children.
	pub has_children: Option<bool>,
	/// Passed through from the remote search endpoint.
	pub similarity_score: Option<f64>,
	/// Passed through from the remote search endpoint.
	pub reranked_score: Option<f64>,
}

impl GraphNode {
	pub fn new(id: impl Into<String>, title: impl Into<String>, kind: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			title: title.into(),
			kind: kind.into(),
			summary: None,
			metadata: NodeMetadata::default(),
			has_children: None,
			similarity_score: None,
			reranked_score: None,
		}
	}

	pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
		self.summary = Some(summary.into());
		self
	}

	pub fn with_tags<I, S>(mut self, tags: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.metadata.tags = tags.into_iter().map(Into::into).collect();
		self
	}

	/// Whether this node represents a tag, hyponym or hypernym rather than content.
	pub fn is_metadata(&self) -> bool {
		let kind = self.kind.to_lowercase();
		matches!(kind.as_str(), "tag" | "hyponym" | "hypernym") || is_metadata_id(&self.id)
	}
}

/// ID-based metadata detection, for endpoints whose node is not at hand.
pub fn is_metadata_id(id: &str) -> bool {
	let lower = id.to_lowercase();
	["tag:", "hyponym:", "hypernym:", "tag_", "hyponym_", "hypernym_"]
		.iter()
		.any(|prefix| lower.starts_with(prefix))
		|| lower.contains(":metadata")
}

/// A directed edge between two nodes, by ID.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "RawLink")]
pub struct GraphLink {
	pub source: String,
	pub target: String,
}

impl GraphLink {
	pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
		Self {
			source: source.into(),
			target: target.into(),
		}
	}

	pub fn touches(&self, id: &str) -> bool {
		self.source == id || self.target == id
	}
}

/// Complete graph data: nodes and links.
///
/// Decoding flattens nested `children` into links and turns metadata lists
/// into shared tag, hypernym and hyponym nodes (see [`super::normalize`]).
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(from = "RawGraphData")]
pub struct GraphData {
	pub nodes: Vec<GraphNode>,
	pub links: Vec<GraphLink>,
}

impl GraphData {
	pub fn new(nodes: Vec<GraphNode>, links: Vec<GraphLink>) -> Self {
		Self { nodes, links }
	}

	/// Decode a response body, accepting both `{nodes, links}` and `{data: {nodes, links}}`.
	pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
		serde_json::from_str::<GraphPayload>(text).map(GraphPayload::into_data)
	}

	pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
		serde_json::from_value::<GraphPayload>(value).map(GraphPayload::into_data)
	}
}

/// Response envelope of the graph endpoints.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum GraphPayload {
	Wrapped { data: GraphData },
	Bare(GraphData),
}

impl GraphPayload {
	pub fn into_data(self) -> GraphData {
		match self {
			GraphPayload::Wrapped { data } => data,
			GraphPayload::Bare(data) => data,
		}
	}
}

/// Title given to nodes that arrive without one.
pub(super) const UNTITLED: &str = "Untitled";

/// Decode a field, treating anything of the wrong shape as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
	D: Deserializer<'de>,
	T: DeserializeOwned,
{
	let value = Value::deserialize(deserializer)?;
	Ok(T::deserialize(value).ok())
}

/// Decode a list, keeping the elements that decode and dropping the rest.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
	D: Deserializer<'de>,
	T: DeserializeOwned,
{
	let Value::Array(values) = Value::deserialize(deserializer)? else {
		return Ok(Vec::new());
	};
	let total = values.len();
	let kept: Vec<T> = values
		.into_iter()
		.filter_map(|v| T::deserialize(v).ok())
		.collect();
	if kept.len() < total {
		debug!("kb-graph: skipped {} malformed payload entries", total - kept.len());
	}
	Ok(kept)
}

/// IDs are strings upstream, but numeric IDs are accepted too.
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
	D: Deserializer<'de>,
{
	match Value::deserialize(deserializer)? {
		Value::String(id) => Ok(id),
		Value::Number(id) => Ok(id.to_string()),
		other => Err(de::Error::custom(format!("node id must be a string, got {other}"))),
	}
}

#[derive(Debug, Default, Deserialize)]
struct RawGraphData {
	#[serde(default, deserialize_with = "lenient_list")]
	nodes: Vec<RawNode>,
	#[serde(default, alias = "edges", deserialize_with = "lenient_list")]
	links: Vec<GraphLink>,
}

impl From<RawGraphData> for GraphData {
	fn from(raw: RawGraphData) -> Self {
		normalize::flatten(raw.nodes, raw.links)
	}
}

/// Wire shape of metadata. Every field is optional and lenient because
/// upstream mixes in nulls, scalars and non-strings.
#[derive(Debug, Default, Deserialize)]
struct RawMetadata {
	#[serde(default, deserialize_with = "lenient")]
	tags: Option<Vec<Value>>,
	#[serde(default, deserialize_with = "lenient")]
	hypernyms: Option<Vec<Value>>,
	#[serde(default, deserialize_with = "lenient")]
	hyponyms: Option<Vec<Value>>,
	#[serde(default, deserialize_with = "lenient")]
	is_cited: Option<bool>,
	#[serde(default, deserialize_with = "lenient")]
	citation_index: Option<u32>,
	#[serde(default, deserialize_with = "lenient")]
	cited_frame_ids: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawNode {
	#[serde(deserialize_with = "id_string")]
	id: String,
	#[serde(default, deserialize_with = "lenient")]
	title: Option<String>,
	#[serde(rename = "type", default, deserialize_with = "lenient")]
	kind: Option<String>,
	#[serde(default, deserialize_with = "lenient")]
	summary: Option<String>,
	#[serde(default, deserialize_with = "lenient")]
	metadata: Option<RawMetadata>,
	#[serde(
		rename = "hasChildren",
		alias = "has_children",
		default,
		deserialize_with = "lenient"
	)]
	has_children: Option<bool>,
	#[serde(default, deserialize_with = "lenient")]
	similarity_score: Option<f64>,
	#[serde(default, deserialize_with = "lenient")]
	reranked_score: Option<f64>,
	/// Nested subtree, flattened into links during normalization.
	#[serde(default, deserialize_with = "lenient_list")]
	pub(super) children: Vec<RawNode>,
	// Legacy top-level metadata.
	#[serde(default, deserialize_with = "lenient")]
	tags: Option<Vec<Value>>,
	#[serde(default, deserialize_with = "lenient")]
	hypernyms: Option<Vec<Value>>,
	#[serde(default, deserialize_with = "lenient")]
	hyponyms: Option<Vec<Value>>,
	#[serde(default, deserialize_with = "lenient")]
	is_cited: Option<bool>,
	#[serde(default, deserialize_with = "lenient")]
	citation_index: Option<u32>,
	#[serde(default, deserialize_with = "lenient")]
	cited_frame_ids: Option<Vec<Value>>,
}

fn strings(values: Option<Vec<Value>>) -> Vec<String> {
	values
		.unwrap_or_default()
		.into_iter()
		.filter_map(|v| match v {
			Value::String(s) => Some(s),
			_ => None,
		})
		.collect()
}

/// Nested list when it has entries, otherwise the top-level one.
// TODO: drop the top-level fallback once the search API always nests metadata.
fn prefer_nested(nested: Option<Vec<Value>>, top_level: Option<Vec<Value>>) -> Vec<String> {
	let nested = strings(nested);
	if nested.is_empty() {
		strings(top_level)
	} else {
		nested
	}
}

impl From<RawNode> for GraphNode {
	fn from(raw: RawNode) -> Self {
		let nested = raw.metadata.unwrap_or_default();
		let metadata = NodeMetadata {
			tags: prefer_nested(nested.tags, raw.tags),
			hypernyms: prefer_nested(nested.hypernyms, raw.hypernyms),
			hyponyms: prefer_nested(nested.hyponyms, raw.hyponyms),
			is_cited: nested.is_cited.or(raw.is_cited).unwrap_or(false),
			citation_index: nested.citation_index.or(raw.citation_index),
			cited_frame_ids: prefer_nested(nested.cited_frame_ids, raw.cited_frame_ids),
		};

		GraphNode {
			title: raw.title.unwrap_or_else(|| UNTITLED.to_string()),
			kind: raw.kind.unwrap_or_default(),
			summary: raw.summary,
			metadata,
			has_children: raw.has_children,
			similarity_score: raw.similarity_score,
			reranked_score: raw.reranked_score,
			id: raw.id,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEndpoint {
	Id(String),
	Node { id: String },
}

impl RawEndpoint {
	fn into_id(self) -> String {
		match self {
			RawEndpoint::Id(id) | RawEndpoint::Node { id } => id,
		}
	}
}

#[derive(Debug, Deserialize)]
struct RawLink {
	source: RawEndpoint,
	target: RawEndpoint,
}

impl From<RawLink> for GraphLink {
	fn from(raw: RawLink) -> Self {
		GraphLink {
			source: raw.source.into_id(),
			target: raw.target.into_id(),
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn nested_metadata_wins_over_top_level() {
		let node: GraphNode = serde_json::from_value(json!({
			"id": "n1",
			"title": "Intro",
			"type": "document",
			"metadata": { "tags": ["Nested"], "is_cited": true, "citation_index": 2 },
			"tags": ["legacy"],
			"hypernyms": ["animal"]
		}))
		.unwrap();

		assert_eq!(node.metadata.tags, vec!["Nested"]);
		assert_eq!(node.metadata.hypernyms, vec!["animal"]);
		assert!(node.metadata.is_cited);
		assert_eq!(node.metadata.citation_index, Some(2));
	}

	#[test]
	fn empty_nested_falls_back_to_top_level() {
		let node: GraphNode = serde_json::from_value(json!({
			"id": "n1",
			"type": "document",
			"metadata": { "tags": [] },
			"tags": ["legacy", 7, null]
		}))
		.unwrap();

		assert_eq!(node.metadata.tags, vec!["legacy"]);
		assert_eq!(node.title, "Untitled");
		assert_eq!(node.summary, None);
	}

	#[test]
	fn wrapped_payload_with_object_endpoints() {
		let data = GraphData::from_value(json!({
			"data": {
				"nodes": [{ "id": "a", "title": "A", "type": "doc", "hasChildren": true }],
				"links": [{ "source": { "id": "a" }, "target": "b" }]
			}
		}))
		.unwrap();

		assert_eq!(data.nodes.len(), 1);
		assert_eq!(data.nodes[0].has_children, Some(true));
		assert_eq!(data.links, vec![GraphLink::new("a", "b")]);
	}

	#[test]
	fn malformed_fields_degrade_to_defaults() {
		let shapes = [
			json!({ "id": "b", "title": "B", "metadata": "n/a" }),
			json!({ "id": "b", "title": "B", "metadata": { "citation_index": 1.5 } }),
			json!({ "id": "b", "title": "B", "metadata": { "citation_index": -3, "is_cited": "yes" } }),
			json!({ "id": "b", "title": "B", "tags": "urgent" }),
			json!({ "id": "b", "title": 42, "summary": ["x"], "hasChildren": "maybe" }),
		];
		for shape in shapes {
			let data = GraphData::from_value(json!({
				"nodes": [{ "id": "a", "title": "A", "type": "document" }, shape.clone()],
				"links": [{ "source": "a", "target": "b" }]
			}))
			.unwrap_or_else(|err| panic!("{shape} rejected: {err}"));

			assert_eq!(data.nodes.len(), 2, "{shape}");
			let b = &data.nodes[1];
			assert_eq!(b.id, "b");
			assert_eq!(b.metadata, NodeMetadata::default(), "{shape}");
			assert_eq!(b.has_children, None);
			assert_eq!(data.links, vec![GraphLink::new("a", "b")]);
		}
	}

	#[test]
	fn unusable_nodes_are_skipped() {
		let data = GraphData::from_value(json!({
			"nodes": [{ "title": "no id" }, { "id": 7, "title": "Seven" }, "junk", null],
			"links": [{ "source": "7" }, { "source": "7", "target": "7" }]
		}))
		.unwrap();

		let ids: Vec<_> = data.nodes.iter().map(|n| n.id.as_str()).collect();
		assert_eq!(ids, vec!["7"]);
		assert_eq!(data.links, vec![GraphLink::new("7", "7")]);
	}

	#[test]
	fn edges_are_accepted_for_links() {
		let data = GraphData::from_value(json!({
			"data": {
				"nodes": [{ "id": "a", "title": "A" }, { "id": "b", "title": "B" }],
				"edges": [{ "source": "a", "target": "b" }]
			}
		}))
		.unwrap();
		assert_eq!(data.links, vec![GraphLink::new("a", "b")]);
	}

	#[test]
	fn null_collections_decode_as_empty() {
		let data = GraphData::from_json(r#"{"nodes": null, "links": null}"#).unwrap();
		assert!(data.nodes.is_empty());
		assert!(data.links.is_empty());
	}

	#[test]
	fn metadata_detection() {
		assert!(GraphNode::new("x", "urgent", "Tag").is_metadata());
		assert!(is_metadata_id("hypernym:mammal"));
		assert!(is_metadata_id("doc1:metadata"));
		assert!(!GraphNode::new("doc1", "Intro", "document").is_metadata());
	}
}
