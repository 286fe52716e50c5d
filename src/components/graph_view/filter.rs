//! Evaluation of parsed search queries against nodes.

use std::collections::HashSet;

use super::metadata::{MetadataIndex, MetadataText};
use super::query::{ParsedQuery, Predicate, QueryField};
use super::types::GraphNode;

fn contains(haystack: &str, needle: &str) -> bool {
	haystack.to_lowercase().contains(needle)
}

fn any_contains<'a>(mut haystack: impl Iterator<Item = &'a str>, needle: &str) -> bool {
	haystack.any(|text| text.contains(needle))
}

fn predicate_matches(node: &GraphNode, predicate: &Predicate, meta: &MetadataText) -> bool {
	let needle = predicate.value.as_str();
	match predicate.field {
		Some(QueryField::Title) => contains(&node.title, needle),
		Some(QueryField::Summary) => node.summary.as_deref().is_some_and(|s| contains(s, needle)),
		Some(QueryField::Type) => contains(&node.kind, needle),
		Some(QueryField::Tag) => any_contains(meta.tag.iter().map(String::as_str), needle),
		Some(QueryField::Hyponym) => any_contains(meta.hyponym.iter().map(String::as_str), needle),
		Some(QueryField::Hypernym) => any_contains(meta.hypernym.iter().map(String::as_str), needle),
		Some(QueryField::Metadata) => any_contains(meta.metadata_entries(), needle),
		None => {
			contains(&node.title, needle)
				|| node.summary.as_deref().is_some_and(|s| contains(s, needle))
				|| contains(&node.kind, needle)
				|| any_contains(meta.any.iter().map(String::as_str), needle)
		}
	}
}

/// Whether `node` satisfies every predicate of `query`.
///
/// `meta` is the node's entry from the metadata index; pass a default entry
/// for nodes the index doesn't know.
pub fn node_matches_parsed_query(node: &GraphNode, query: &ParsedQuery, meta: &MetadataText) -> bool {
	query
		.predicates
		.iter()
		.all(|predicate| predicate_matches(node, predicate, meta))
}

/// IDs of the nodes matching `query`, in node order.
pub fn matching_node_ids(nodes: &[GraphNode], query: &ParsedQuery, index: &MetadataIndex) -> Vec<String> {
	let empty = MetadataText::default();
	nodes
		.iter()
		.filter(|node| {
			let meta = index.get(&node.id).unwrap_or(&empty);
			node_matches_parsed_query(node, query, meta)
		})
		.map(|node| node.id.clone())
		.collect()
}

/// Same as [`matching_node_ids`], as a set for membership checks.
pub fn matching_node_set(nodes: &[GraphNode], query: &ParsedQuery, index: &MetadataIndex) -> HashSet<String> {
	matching_node_ids(nodes, query, index).into_iter().collect()
}
