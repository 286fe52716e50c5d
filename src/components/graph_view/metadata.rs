//! Reverse index from node IDs to their searchable metadata text.
//!
//! Rebuilt from scratch whenever the node or link set changes. That is linear
//! in nodes + links, which is fine for the few hundred nodes a view holds.

use std::collections::HashMap;

use super::types::{GraphLink, GraphNode};

/// Lower-cased metadata text for one node, bucketed by field.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetadataText {
	pub tag: Vec<String>,
	pub hyponym: Vec<String>,
	pub hypernym: Vec<String>,
	/// Union of all buckets, `"{title} {type}"` for each linked metadata node,
	/// and the node's own title, summary and type.
	pub any: Vec<String>,
}

impl MetadataText {
	/// Tag, hyponym and hypernym entries, without the node's own attributes.
	pub fn metadata_entries(&self) -> impl Iterator<Item = &str> {
		self.tag
			.iter()
			.chain(&self.hyponym)
			.chain(&self.hypernym)
			.map(String::as_str)
	}
}

pub type MetadataIndex = HashMap<String, MetadataText>;

/// Build the index for every node in `nodes`.
///
/// Each entry collects the node's own metadata lists and the titles of
/// metadata nodes (tags, hyponyms, hypernyms) it links to.
pub fn build_metadata_text_index(nodes: &[GraphNode], links: &[GraphLink]) -> MetadataIndex {
	let by_id: HashMap<&str, &GraphNode> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();

	let mut targets_by_source: HashMap<&str, Vec<&str>> = HashMap::new();
	for link in links {
		targets_by_source
			.entry(link.source.as_str())
			.or_default()
			.push(link.target.as_str());
	}

	nodes
		.iter()
		.map(|node| {
			let mut text = MetadataText::default();
			let lower = |values: &[String]| {
				values.iter().map(|v| v.to_lowercase()).collect::<Vec<_>>()
			};
			text.tag = lower(&node.metadata.tags);
			text.hyponym = lower(&node.metadata.hyponyms);
			text.hypernym = lower(&node.metadata.hypernyms);

			let linked = targets_by_source
				.get(node.id.as_str())
				.into_iter()
				.flatten()
				.filter_map(|target| by_id.get(target))
				.filter(|child| child.is_metadata());
			let mut linked_any = Vec::new();
			for child in linked {
				let title = if child.title.is_empty() {
					&child.id
				} else {
					&child.title
				};
				let title = title.to_lowercase();
				let kind = child.kind.to_lowercase();
				linked_any.push(format!("{title} {kind}"));

				// Only typed metadata nodes feed the fielded buckets.
				let bucket = if kind.starts_with("tag") {
					&mut text.tag
				} else if kind.starts_with("hyponym") {
					&mut text.hyponym
				} else if kind.starts_with("hypernym") {
					&mut text.hypernym
				} else {
					continue;
				};
				if !bucket.contains(&title) {
					bucket.push(title);
				}
			}

			let mut any: Vec<String> = text.metadata_entries().map(str::to_string).collect();
			any.extend(linked_any);
			any.push(node.title.to_lowercase());
			if let Some(summary) = &node.summary {
				any.push(summary.to_lowercase());
			}
			any.push(node.kind.to_lowercase());
			text.any = any;

			(node.id.clone(), text)
		})
		.collect()
}
