//! Payload normalization.
//!
//! Search responses arrive as trees: each node may carry nested `children`
//! and its own `tags`/`hypernyms`/`hyponyms` lists. The graph view wants a
//! flat node list with links, and one shared node per distinct tag, hypernym
//! or hyponym, so that every document tagged `urgent` links to the same
//! `tag:urgent` node.

use std::collections::{HashMap, HashSet};

use log::debug;

use super::types::{GraphData, GraphLink, GraphNode, RawNode, UNTITLED};

/// The three kinds of metadata node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetaKind {
	Tag,
	Hypernym,
	Hyponym,
}

impl MetaKind {
	/// Type name and ID prefix of this kind.
	pub fn as_str(self) -> &'static str {
		match self {
			MetaKind::Tag => "tag",
			MetaKind::Hypernym => "hypernym",
			MetaKind::Hyponym => "hyponym",
		}
	}

	/// Classify a node by its type, then by its ID prefix.
	pub fn of(kind: &str, id: &str) -> Option<Self> {
		let kind = kind.to_lowercase();
		let id = id.to_lowercase();
		let flagged = matches!(kind.as_str(), "tag" | "hypernym" | "hyponym" | "metadata")
			|| ["tag:", "tag_", "hypernym:", "hypernym_", "hyponym:", "hyponym_"]
				.iter()
				.any(|prefix| id.starts_with(prefix));
		if !flagged {
			return None;
		}
		if kind == "tag" || id.starts_with("tag") {
			Some(MetaKind::Tag)
		} else if kind == "hypernym" || id.starts_with("hypernym") {
			Some(MetaKind::Hypernym)
		} else if kind == "hyponym" || id.starts_with("hyponym") {
			Some(MetaKind::Hyponym)
		} else {
			None
		}
	}
}

/// Lower-case `value` and join its words with `_`.
pub fn slugify(value: &str) -> String {
	value
		.split_whitespace()
		.map(str::to_lowercase)
		.collect::<Vec<_>>()
		.join("_")
}

/// Canonical ID of the metadata node for `value`, e.g. `tag:deep_learning`.
pub fn metadata_node_id(kind: MetaKind, value: &str) -> String {
	format!("{}:{}", kind.as_str(), slugify(value))
}

/// Label a metadata node is keyed by: its title, or the part of its ID after
/// the kind prefix.
fn metadata_label(node: &GraphNode) -> String {
	let title = node.title.trim();
	if !title.is_empty() && title != UNTITLED {
		return title.to_string();
	}
	let id = node.id.to_lowercase();
	let rest = id
		.split([':', '_'])
		.nth(1)
		.filter(|rest| !rest.is_empty())
		.map(str::to_string);
	rest.unwrap_or(id)
}

/// Maps `kind:slug` keys to the first node ID seen for them.
///
/// Metadata nodes that name the same thing under different IDs collapse onto
/// the first one registered, and links are rewritten to match.
#[derive(Clone, Debug, Default)]
pub struct MetadataRegistry {
	ids: HashMap<String, String>,
}

impl MetadataRegistry {
	/// Rewrite metadata node IDs in `data` to their registered ones and drop
	/// the duplicate nodes and links that leaves behind.
	pub fn canonicalize(&mut self, data: GraphData) -> GraphData {
		let mut aliases: HashMap<String, String> = HashMap::new();
		let mut seen: HashSet<String> = HashSet::new();
		let mut nodes = Vec::with_capacity(data.nodes.len());

		for mut node in data.nodes {
			if let Some(kind) = MetaKind::of(&node.kind, &node.id) {
				let key = metadata_node_id(kind, &metadata_label(&node));
				let id = self.ids.entry(key).or_insert_with(|| node.id.clone()).clone();
				if id != node.id {
					let old = std::mem::replace(&mut node.id, id.clone());
					aliases.insert(old, id);
				}
			}
			if seen.insert(node.id.clone()) {
				nodes.push(node);
			}
		}
		if !aliases.is_empty() {
			debug!("kb-graph: merged {} duplicate metadata nodes", aliases.len());
		}

		let resolve = |id: String| aliases.get(&id).cloned().unwrap_or(id);
		let mut unique: HashSet<GraphLink> = HashSet::new();
		let links = data
			.links
			.into_iter()
			.map(|l| GraphLink {
				source: resolve(l.source),
				target: resolve(l.target),
			})
			.filter(|l| unique.insert(l.clone()))
			.collect();

		GraphData { nodes, links }
	}
}

/// Flatten decoded payload trees into nodes and links.
///
/// Nested children become `parent -> child` links, metadata lists become
/// links to shared metadata nodes, and `links` are appended as given.
pub(super) fn flatten(roots: Vec<RawNode>, links: Vec<GraphLink>) -> GraphData {
	let mut flat = Flattener::default();
	for root in roots {
		flat.walk(root, None);
	}
	flat.links.extend(links);
	MetadataRegistry::default().canonicalize(GraphData::new(flat.nodes, flat.links))
}

#[derive(Default)]
struct Flattener {
	nodes: Vec<GraphNode>,
	links: Vec<GraphLink>,
	seen: HashSet<String>,
}

impl Flattener {
	fn walk(&mut self, mut raw: RawNode, parent: Option<&str>) {
		let children = std::mem::take(&mut raw.children);
		let node = GraphNode::from(raw);
		let id = node.id.clone();
		let lists = [
			(MetaKind::Tag, node.metadata.tags.clone()),
			(MetaKind::Hypernym, node.metadata.hypernyms.clone()),
			(MetaKind::Hyponym, node.metadata.hyponyms.clone()),
		];

		self.push(node);
		if let Some(parent) = parent {
			self.links.push(GraphLink::new(parent, id.as_str()));
		}
		for (kind, values) in lists {
			for value in &values {
				self.link_metadata(&id, kind, value);
			}
		}
		for child in children {
			self.walk(child, Some(&id));
		}
	}

	fn push(&mut self, node: GraphNode) {
		if self.seen.insert(node.id.clone()) {
			self.nodes.push(node);
		}
	}

	fn link_metadata(&mut self, owner: &str, kind: MetaKind, value: &str) {
		let value = value.trim();
		if value.is_empty() {
			return;
		}
		let id = metadata_node_id(kind, value);
		let mut node = GraphNode::new(id.as_str(), value, kind.as_str());
		node.has_children = Some(false);
		self.push(node);
		self.links.push(GraphLink::new(owner, id));
	}
}
