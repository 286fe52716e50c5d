//! Canonical graph state and the manager that owns it.
//!
//! [`GraphStateManager`] is the single writer of [`GraphState`]: ingest,
//! expand, collapse, filter, hover and select all go through it. It also owns
//! the active [`LayoutEngine`], the shared [`PositionMap`] that engine writes,
//! and the [`Camera`].
//!
//! Expansion is split in two phases so no borrow of the manager is held across
//! a fetch: [`GraphStateManager::begin_expand`] decides whether a fetch is
//! needed, and [`GraphStateManager::finish_expand`] merges (or discards) the
//! response.

use std::collections::{HashMap, HashSet, VecDeque};

use log::{debug, info, warn};

use super::camera::Camera;
use super::config::{GraphConfig, SearchMode};
use super::error::GraphError;
use super::filter::matching_node_set;
use super::hierarchy::HierarchicalLayout;
use super::layout::{LayoutEngine, LayoutMode};
use super::metadata::{MetadataIndex, build_metadata_text_index};
use super::normalize::MetadataRegistry;
use super::query::parse_search_query;
use super::simulation::ForceSimulation;
use super::source::GraphSource;
use super::types::{GraphData, GraphLink, GraphNode};
use super::viewport::{
	Point, PositionMap, Transform, ViewportRect, compute_center_transform, fit_ids,
};

/// Expand/collapse animation in flight, if any.
///
/// At most one node animates at a time. While the target waits on a fetch the
/// animation has no end time yet.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnimationState {
	target: Option<String>,
	ends_at: Option<f64>,
}

impl AnimationState {
	pub fn is_animating(&self) -> bool {
		self.target.is_some()
	}

	pub fn current_target(&self) -> Option<&str> {
		self.target.as_deref()
	}

	fn start(&mut self, id: &str, ends_at: Option<f64>) {
		self.target = Some(id.to_string());
		self.ends_at = ends_at;
	}

	fn clear(&mut self) {
		self.target = None;
		self.ends_at = None;
	}
}

/// The visible graph plus expansion and interaction bookkeeping.
#[derive(Clone, Debug, Default)]
pub struct GraphState {
	pub nodes: Vec<GraphNode>,
	/// Only ever references IDs present in `nodes`.
	pub links: Vec<GraphLink>,
	/// Parent ID to the child IDs shown for it.
	pub expanded_children: HashMap<String, HashSet<String>>,
	/// Nodes whose children were already retrieved.
	pub fetched_nodes: HashSet<String>,
	pub collapsing_nodes: HashSet<String>,
	pub hovered_node_id: Option<String>,
	pub selected_node_id: Option<String>,
	pub animation: AnimationState,
}

impl GraphState {
	pub fn node(&self, id: &str) -> Option<&GraphNode> {
		self.nodes.iter().find(|n| n.id == id)
	}

	pub fn contains(&self, id: &str) -> bool {
		self.node(id).is_some()
	}

	pub fn is_expanded(&self, id: &str) -> bool {
		self.expanded_children.contains_key(id)
	}

	/// Metadata nodes and nodes reported childless never expand.
	pub fn is_expandable(node: &GraphNode) -> bool {
		!node.is_metadata() && node.has_children != Some(false)
	}

	/// First visible node that should show its children but doesn't.
	pub fn find_node_to_expand(&self, desired: &HashSet<String>) -> Option<&str> {
		self.nodes
			.iter()
			.find(|n| desired.contains(&n.id) && !self.is_expanded(&n.id) && Self::is_expandable(n))
			.map(|n| n.id.as_str())
	}

	/// First expanded node that should no longer be.
	pub fn find_node_to_collapse(&self, desired: &HashSet<String>) -> Option<&str> {
		self.nodes
			.iter()
			.find(|n| self.is_expanded(&n.id) && !desired.contains(&n.id))
			.map(|n| n.id.as_str())
	}

	/// The shallowest unexpanded, expandable nodes, walking down from the
	/// roots through expanded nodes only.
	pub fn nodes_to_expand_next_level(&self) -> Vec<String> {
		let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
		let mut has_parent: HashSet<&str> = HashSet::new();
		for link in &self.links {
			children
				.entry(link.source.as_str())
				.or_default()
				.push(link.target.as_str());
			if link.source != link.target {
				has_parent.insert(link.target.as_str());
			}
		}

		let mut queue: VecDeque<(&str, usize)> = self
			.nodes
			.iter()
			.filter(|n| !has_parent.contains(n.id.as_str()))
			.map(|n| (n.id.as_str(), 0))
			.collect();
		if queue.is_empty() {
			queue.extend(self.nodes.first().map(|n| (n.id.as_str(), 0)));
		}
		let mut visited: HashSet<&str> = queue.iter().map(|(id, _)| *id).collect();

		let mut frontier: Vec<String> = Vec::new();
		let mut frontier_depth = None;
		while let Some((id, depth)) = queue.pop_front() {
			if frontier_depth.is_some_and(|d| depth > d) {
				break;
			}
			if !self.is_expanded(id) {
				if self.node(id).is_some_and(Self::is_expandable) {
					frontier_depth = Some(depth);
					frontier.push(id.to_string());
				}
				continue;
			}
			for &child in children.get(id).into_iter().flatten() {
				if visited.insert(child) {
					queue.push_back((child, depth + 1));
				}
			}
		}
		frontier
	}
}

/// Result of an expand request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExpandOutcome {
	/// Children must be fetched, then handed to `finish_expand`.
	NeedsFetch,
	Expanded { added: usize },
	AlreadyExpanded,
	NotExpandable,
	/// Another node is animating.
	Dropped,
	/// This node is already animating.
	Coalesced,
	/// The response arrived after its target stopped mattering.
	Stale,
}

/// Result of a collapse request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CollapseOutcome {
	Collapsed { removed: usize },
	NotExpanded,
	Dropped,
	Coalesced,
}

/// One step of [`GraphStateManager::reconcile`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileStep {
	Expand(String, ExpandOutcome),
	Collapse(String, CollapseOutcome),
}

/// What a settled filter asks of the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterOutcome {
	Cleared,
	/// Matching node IDs, already applied.
	Local(HashSet<String>),
	/// Forward this query to the remote search endpoint.
	Remote(String),
}

#[derive(Clone, Debug)]
struct PendingFilter {
	raw: String,
	due_at: f64,
}

/// A graph with one subtree cut away.
#[derive(Clone, Debug)]
pub struct Subtree {
	pub nodes: Vec<GraphNode>,
	pub links: Vec<GraphLink>,
	pub removed: HashSet<String>,
}

/// Every node reachable from `root` along `source -> target` links, excluding
/// `root` itself.
pub fn descendants(links: &[GraphLink], root: &str) -> HashSet<String> {
	let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
	for link in links {
		children
			.entry(link.source.as_str())
			.or_default()
			.push(link.target.as_str());
	}

	let mut found: HashSet<String> = HashSet::new();
	let mut stack = vec![root];
	while let Some(id) = stack.pop() {
		for &child in children.get(id).into_iter().flatten() {
			if child != root && found.insert(child.to_string()) {
				stack.push(child);
			}
		}
	}
	found
}

/// Remove the descendants of `root` and every link touching them.
pub fn collapse_subtree(nodes: &[GraphNode], links: &[GraphLink], root: &str) -> Subtree {
	let removed = descendants(links, root);
	Subtree {
		nodes: nodes
			.iter()
			.filter(|n| !removed.contains(&n.id))
			.cloned()
			.collect(),
		links: links
			.iter()
			.filter(|l| !removed.contains(&l.source) && !removed.contains(&l.target))
			.cloned()
			.collect(),
		removed,
	}
}

/// Keep links whose endpoints are both in `ids`, without duplicates.
fn resolved_links(ids: &HashSet<String>, links: Vec<GraphLink>) -> Vec<GraphLink> {
	let total = links.len();
	let mut seen = HashSet::new();
	let mut dangling = 0;
	let kept: Vec<GraphLink> = links
		.into_iter()
		.filter(|l| {
			let resolved = ids.contains(&l.source) && ids.contains(&l.target);
			if !resolved {
				dangling += 1;
			}
			resolved
		})
		.filter(|l| seen.insert(l.clone()))
		.collect();
	if dangling > 0 {
		debug!("kb-graph: dropped {dangling} of {total} links with unknown endpoints");
	}
	kept
}

fn make_layout(mode: LayoutMode, config: &GraphConfig) -> Box<dyn LayoutEngine> {
	match mode {
		LayoutMode::Force => Box::new(ForceSimulation::new(config)),
		LayoutMode::Hierarchical => Box::new(HierarchicalLayout::new(config)),
	}
}

enum Busy {
	Same,
	Other,
}

/// What a collapsed or fetched parent brings back on re-expand.
#[derive(Clone, Debug, Default)]
struct CachedChildren {
	data: GraphData,
	/// Expansion of nodes inside the subtree at the time it was hidden.
	expanded: HashMap<String, HashSet<String>>,
}

impl CachedChildren {
	fn merge(&mut self, nodes: Vec<GraphNode>, links: Vec<GraphLink>) {
		for node in nodes {
			if !self.data.nodes.iter().any(|n| n.id == node.id) {
				self.data.nodes.push(node);
			}
		}
		for link in links {
			if !self.data.links.contains(&link) {
				self.data.links.push(link);
			}
		}
	}
}

/// The graph as it was before remote search results replaced it.
#[derive(Clone, Debug)]
struct SavedGraph {
	state: GraphState,
	child_cache: HashMap<String, CachedChildren>,
}

/// Single owner and writer of the graph view state.
pub struct GraphStateManager {
	config: GraphConfig,
	state: GraphState,
	/// Fetched or collapsed children per parent, replayed on re-expand.
	child_cache: HashMap<String, CachedChildren>,
	registry: MetadataRegistry,
	/// Set while remote search results are shown.
	before_search: Option<SavedGraph>,
	index: MetadataIndex,
	filter_query: String,
	filter_matches: Option<HashSet<String>>,
	pending_filter: Option<PendingFilter>,
	layout: Box<dyn LayoutEngine>,
	positions: PositionMap,
	camera: Camera,
	render_requested: bool,
}

impl GraphStateManager {
	pub fn new(config: GraphConfig, viewport: ViewportRect) -> Self {
		let layout = make_layout(LayoutMode::default(), &config);
		let camera = Camera::new(viewport, config.scale_extent);
		Self {
			config,
			state: GraphState::default(),
			child_cache: HashMap::new(),
			registry: MetadataRegistry::default(),
			before_search: None,
			index: MetadataIndex::new(),
			filter_query: String::new(),
			filter_matches: None,
			pending_filter: None,
			layout,
			positions: PositionMap::new(),
			camera,
			render_requested: true,
		}
	}

	pub fn config(&self) -> &GraphConfig {
		&self.config
	}

	pub fn state(&self) -> &GraphState {
		&self.state
	}

	pub fn positions(&self) -> &PositionMap {
		&self.positions
	}

	pub fn camera(&self) -> &Camera {
		&self.camera
	}

	pub fn camera_mut(&mut self) -> &mut Camera {
		self.render_requested = true;
		&mut self.camera
	}

	pub fn metadata_index(&self) -> &MetadataIndex {
		&self.index
	}

	pub fn layout_mode(&self) -> LayoutMode {
		self.layout.mode()
	}

	/// Replace the whole graph. Expansion state, the child cache and any
	/// in-flight animation are reset; positions of surviving nodes are kept.
	pub fn ingest(&mut self, data: GraphData) {
		let GraphData { nodes, links } = self.registry.canonicalize(data);
		let mut ids: HashSet<String> = HashSet::new();
		let nodes: Vec<GraphNode> = nodes
			.into_iter()
			.filter(|n| ids.insert(n.id.clone()))
			.collect();
		let links = resolved_links(&ids, links);
		info!("kb-graph: ingested {} nodes, {} links", nodes.len(), links.len());

		self.state = GraphState {
			nodes,
			links,
			..GraphState::default()
		};
		self.child_cache.clear();
		self.before_search = None;
		self.graph_changed();
	}

	/// Show remote search results for `query` in place of the graph.
	///
	/// The graph shown before the first result set is kept and comes back
	/// when the filter is cleared. Results for anything but the current query
	/// are ignored; returns `false` for those.
	pub fn apply_remote_results(&mut self, query: &str, data: GraphData) -> bool {
		if self.filter_query != query {
			debug!("kb-graph: ignoring remote results for outdated query `{query}`");
			return false;
		}
		debug!("kb-graph: remote search returned {} nodes", data.nodes.len());
		let saved = self.before_search.take().unwrap_or_else(|| SavedGraph {
			state: self.state.clone(),
			child_cache: self.child_cache.clone(),
		});
		self.ingest(data);
		self.before_search = Some(saved);
		true
	}

	fn restore_before_search(&mut self) {
		let Some(saved) = self.before_search.take() else {
			return;
		};
		info!("kb-graph: search cleared, restoring {} nodes", saved.state.nodes.len());
		self.state = GraphState {
			animation: AnimationState::default(),
			collapsing_nodes: HashSet::new(),
			..saved.state
		};
		self.child_cache = saved.child_cache;
		self.graph_changed();
	}

	fn graph_changed(&mut self) {
		self.index = build_metadata_text_index(&self.state.nodes, &self.state.links);
		self.refresh_filter();
		self.layout
			.update_data(&self.state.nodes, &self.state.links, &self.positions);
		self.layout.write_positions(&mut self.positions);
		self.render_requested = true;
	}

	fn busy(&self, id: &str, action: &str) -> Option<Busy> {
		let target = self.state.animation.current_target()?;
		if target == id {
			debug!("kb-graph: {action} of `{id}` coalesced with the running animation");
			Some(Busy::Same)
		} else {
			debug!("kb-graph: {action} of `{id}` dropped while `{target}` animates");
			Some(Busy::Other)
		}
	}

	/// First phase of an expand.
	pub fn begin_expand(&mut self, id: &str, now_ms: f64) -> Result<ExpandOutcome, GraphError> {
		let node = self
			.state
			.node(id)
			.ok_or_else(|| GraphError::UnknownNode(id.to_string()))?;
		let expandable = GraphState::is_expandable(node);

		match self.busy(id, "expand") {
			Some(Busy::Same) => return Ok(ExpandOutcome::Coalesced),
			Some(Busy::Other) => return Ok(ExpandOutcome::Dropped),
			None => {}
		}
		if !expandable {
			return Ok(ExpandOutcome::NotExpandable);
		}
		if self.state.is_expanded(id) {
			return Ok(ExpandOutcome::AlreadyExpanded);
		}

		if self.state.fetched_nodes.contains(id) {
			if let Some(cached) = self.child_cache.get(id).cloned() {
				let added = self.apply_children(id, cached.data);
				for (parent, children) in cached.expanded {
					if self.state.contains(&parent) {
						self.state.expanded_children.insert(parent, children);
					}
				}
				self.state
					.animation
					.start(id, Some(now_ms + self.config.animation_duration_ms));
				return Ok(ExpandOutcome::Expanded { added });
			}
		}

		self.state.animation.start(id, None);
		self.render_requested = true;
		Ok(ExpandOutcome::NeedsFetch)
	}

	/// Second phase of an expand: merge the fetched children of `id`.
	///
	/// A failed fetch always returns the animation to idle.
	pub fn finish_expand(
		&mut self,
		id: &str,
		result: Result<GraphData, GraphError>,
		now_ms: f64,
	) -> Result<ExpandOutcome, GraphError> {
		let awaited = self.state.animation.current_target() == Some(id);
		if !awaited || !self.state.contains(id) {
			if awaited {
				self.state.animation.clear();
			}
			debug!("kb-graph: ignoring stale children response for `{id}`");
			return Ok(ExpandOutcome::Stale);
		}

		let data = match result {
			Ok(data) => data,
			Err(err) => {
				warn!("kb-graph: failed to fetch children of `{id}`: {err}");
				self.state.animation.clear();
				self.render_requested = true;
				return Err(err);
			}
		};

		self.state.fetched_nodes.insert(id.to_string());
		self.child_cache
			.entry(id.to_string())
			.or_default()
			.merge(data.nodes.clone(), data.links.clone());
		let added = self.apply_children(id, data);
		self.state
			.animation
			.start(id, Some(now_ms + self.config.animation_duration_ms));
		Ok(ExpandOutcome::Expanded { added })
	}

	/// Expand `id`, fetching from `source` when needed.
	pub async fn expand_node<S: GraphSource>(
		&mut self,
		id: &str,
		source: &S,
		now_ms: f64,
	) -> Result<ExpandOutcome, GraphError> {
		match self.begin_expand(id, now_ms)? {
			ExpandOutcome::NeedsFetch => {
				let result = source.fetch_children(id).await;
				self.finish_expand(id, result, now_ms)
			}
			outcome => Ok(outcome),
		}
	}

	fn apply_children(&mut self, id: &str, data: GraphData) -> usize {
		let data = self.registry.canonicalize(data);
		let mut ids: HashSet<String> = self.state.nodes.iter().map(|n| n.id.clone()).collect();
		let before = self.state.nodes.len();
		for node in data.nodes {
			if ids.insert(node.id.clone()) {
				self.state.nodes.push(node);
			}
		}
		let added = self.state.nodes.len() - before;

		let children: HashSet<String> = data
			.links
			.iter()
			.filter(|l| l.source == id && l.target != id && ids.contains(&l.target))
			.map(|l| l.target.clone())
			.collect();
		let mut links = std::mem::take(&mut self.state.links);
		links.extend(data.links);
		self.state.links = resolved_links(&ids, links);
		self.state.expanded_children.insert(id.to_string(), children);

		self.graph_changed();
		added
	}

	/// Hide everything below `id`.
	pub fn collapse_node(&mut self, id: &str, now_ms: f64) -> Result<CollapseOutcome, GraphError> {
		if !self.state.contains(id) {
			return Err(GraphError::UnknownNode(id.to_string()));
		}
		match self.busy(id, "collapse") {
			Some(Busy::Same) => return Ok(CollapseOutcome::Coalesced),
			Some(Busy::Other) => return Ok(CollapseOutcome::Dropped),
			None => {}
		}
		if self.state.collapsing_nodes.contains(id) {
			return Ok(CollapseOutcome::Coalesced);
		}
		if !self.state.is_expanded(id) {
			return Ok(CollapseOutcome::NotExpanded);
		}

		let Subtree {
			nodes,
			links,
			removed,
		} = collapse_subtree(&self.state.nodes, &self.state.links, id);

		// Keep what is hidden so a re-expand brings back exactly this subtree.
		let hidden_nodes: Vec<GraphNode> = self
			.state
			.nodes
			.iter()
			.filter(|n| removed.contains(&n.id))
			.cloned()
			.collect();
		let hidden_links: Vec<GraphLink> = self
			.state
			.links
			.iter()
			.filter(|l| removed.contains(&l.source) || removed.contains(&l.target))
			.cloned()
			.collect();
		let cached = self.child_cache.entry(id.to_string()).or_default();
		cached.merge(hidden_nodes, hidden_links);
		cached.expanded = self
			.state
			.expanded_children
			.iter()
			.filter(|(parent, _)| removed.contains(*parent))
			.map(|(parent, children)| (parent.clone(), children.clone()))
			.collect();

		let state = &mut self.state;
		state.fetched_nodes.insert(id.to_string());
		state.nodes = nodes;
		state.links = links;
		state.expanded_children.remove(id);
		state
			.expanded_children
			.retain(|parent, _| !removed.contains(parent));
		for children in state.expanded_children.values_mut() {
			children.retain(|child| !removed.contains(child));
		}
		state.collapsing_nodes.retain(|n| !removed.contains(n));
		state.collapsing_nodes.insert(id.to_string());
		if state.hovered_node_id.as_ref().is_some_and(|h| removed.contains(h)) {
			state.hovered_node_id = None;
		}
		if state.selected_node_id.as_ref().is_some_and(|s| removed.contains(s)) {
			state.selected_node_id = None;
		}
		state
			.animation
			.start(id, Some(now_ms + self.config.animation_duration_ms));

		self.graph_changed();
		Ok(CollapseOutcome::Collapsed {
			removed: removed.len(),
		})
	}

	/// Move one step toward `desired` being exactly the expanded set.
	/// Collapses go first. Nothing happens while an animation is in flight.
	pub fn reconcile(
		&mut self,
		desired: &HashSet<String>,
		now_ms: f64,
	) -> Result<Option<ReconcileStep>, GraphError> {
		if self.state.animation.is_animating() {
			return Ok(None);
		}
		if let Some(id) = self.state.find_node_to_collapse(desired).map(str::to_string) {
			let outcome = self.collapse_node(&id, now_ms)?;
			return Ok(Some(ReconcileStep::Collapse(id, outcome)));
		}
		if let Some(id) = self.state.find_node_to_expand(desired).map(str::to_string) {
			let outcome = self.begin_expand(&id, now_ms)?;
			return Ok(Some(ReconcileStep::Expand(id, outcome)));
		}
		Ok(None)
	}

	/// Finish the running animation once its time is up. Returns `true` if one ended.
	pub fn tick_animation(&mut self, now_ms: f64) -> bool {
		let done = match self.state.animation.ends_at {
			Some(ends_at) => now_ms >= ends_at,
			None => false,
		};
		if !done {
			return false;
		}
		if let Some(target) = self.state.animation.target.take() {
			self.state.collapsing_nodes.remove(&target);
		}
		self.state.animation.clear();
		self.render_requested = true;
		true
	}

	/// Advance layout, camera and animation by one frame. Returns `true` while
	/// anything is still moving.
	pub fn tick(&mut self, dt: f64, now_ms: f64) -> bool {
		let mut active = self.tick_animation(now_ms);
		active |= self.camera.tick(dt);
		self.layout.set_zoom(self.camera.transform().k);
		if self.layout.tick(dt) {
			self.layout.write_positions(&mut self.positions);
			active = true;
		}
		if active {
			self.render_requested = true;
		}
		active
	}

	pub fn set_layout_mode(&mut self, mode: LayoutMode) {
		if mode == self.layout.mode() {
			return;
		}
		info!("kb-graph: switching to {mode:?} layout");
		self.layout = make_layout(mode, &self.config);
		self.layout.set_zoom(self.camera.transform().k);
		self.layout
			.update_data(&self.state.nodes, &self.state.links, &self.positions);
		self.layout.write_positions(&mut self.positions);
		self.render_requested = true;
	}

	/// Hold `id` at `point` while dragging; `None` releases the hold.
	pub fn pin_node(&mut self, id: &str, point: Option<Point>) {
		self.layout.pin(id, point);
		self.layout.write_positions(&mut self.positions);
		self.render_requested = true;
	}

	/// Returns `true` when the hovered node changed.
	pub fn hover(&mut self, id: Option<&str>) -> bool {
		let next = id.filter(|id| self.state.contains(id)).map(str::to_string);
		if next == self.state.hovered_node_id {
			return false;
		}
		self.state.hovered_node_id = next;
		self.render_requested = true;
		true
	}

	pub fn select(&mut self, id: Option<&str>) {
		self.state.selected_node_id = id.filter(|id| self.state.contains(id)).map(str::to_string);
		self.render_requested = true;
	}

	/// Start (or clear) a filter. Clearing applies at once; anything else
	/// settles through [`Self::poll_filter`] after the debounce delay.
	pub fn set_filter(&mut self, raw: &str, now_ms: f64) -> Option<FilterOutcome> {
		if raw.trim().is_empty() {
			self.pending_filter = None;
			self.filter_query.clear();
			self.filter_matches = None;
			self.restore_before_search();
			self.render_requested = true;
			return Some(FilterOutcome::Cleared);
		}
		self.pending_filter = Some(PendingFilter {
			raw: raw.to_string(),
			due_at: now_ms + self.config.filter_debounce_ms,
		});
		None
	}

	pub fn poll_filter(&mut self, now_ms: f64) -> Option<FilterOutcome> {
		if !self.pending_filter.as_ref().is_some_and(|p| now_ms >= p.due_at) {
			return None;
		}
		let pending = self.pending_filter.take()?;
		self.filter_query = pending.raw;
		match self.config.search_mode {
			SearchMode::Local => {
				self.refresh_filter();
				Some(FilterOutcome::Local(self.filter_matches.clone().unwrap_or_default()))
			}
			SearchMode::Remote => Some(FilterOutcome::Remote(self.filter_query.clone())),
		}
	}

	fn refresh_filter(&mut self) {
		if self.config.search_mode != SearchMode::Local {
			self.filter_matches = None;
			return;
		}
		let query = parse_search_query(&self.filter_query);
		self.filter_matches = if query.is_empty() {
			None
		} else {
			Some(matching_node_set(&self.state.nodes, &query, &self.index))
		};
		self.render_requested = true;
	}

	pub fn filter_matches(&self) -> Option<&HashSet<String>> {
		self.filter_matches.as_ref()
	}

	pub fn is_filtered_out(&self, id: &str) -> bool {
		self.filter_matches.as_ref().is_some_and(|m| !m.contains(id))
	}

	/// Frame every positioned node. Returns `false` when there is nothing to fit.
	pub fn fit_all(&mut self) -> bool {
		let ids = self.state.nodes.iter().map(|n| n.id.as_str());
		let fit = fit_ids(
			self.camera.viewport(),
			&self.positions,
			ids,
			self.config.fit_all_padding,
			self.config.scale_extent,
		);
		self.fly_to(fit)
	}

	/// Frame `id` together with its expanded children.
	pub fn fit_expanded(&mut self, id: &str) -> bool {
		let children = self.state.expanded_children.get(id).into_iter().flatten();
		let ids = std::iter::once(id).chain(children.map(String::as_str));
		let fit = fit_ids(
			self.camera.viewport(),
			&self.positions,
			ids,
			self.config.fit_padding,
			self.config.scale_extent,
		);
		self.fly_to(fit)
	}

	/// Fly the camera so `id` sits in the middle of the viewport.
	pub fn center_on(&mut self, id: &str) -> bool {
		let Some(point) = self.positions.get(id) else {
			return false;
		};
		let k = self.camera.transform().k;
		let transform = compute_center_transform(self.camera.viewport(), point, k);
		self.fly_to(Some(transform))
	}

	fn fly_to(&mut self, transform: Option<Transform>) -> bool {
		match transform {
			Some(t) => {
				self.camera.fly_to(t);
				self.render_requested = true;
				true
			}
			None => false,
		}
	}

	pub fn zoom_step(&mut self, factor: f64) {
		self.camera.zoom_step(factor);
		self.render_requested = true;
	}

	pub fn request_render(&mut self) {
		self.render_requested = true;
	}

	/// Consume the pending render request; many requests collapse into one frame.
	pub fn take_render_request(&mut self) -> bool {
		std::mem::take(&mut self.render_requested)
	}
}

#[cfg(test)]
mod tests {
	use std::cell::Cell;

	use futures::executor::block_on;
	use serde_json::json;

	use super::*;

	struct MockSource {
		children: HashMap<String, GraphData>,
		calls: Cell<usize>,
	}

	impl MockSource {
		fn new(children: impl IntoIterator<Item = (&'static str, GraphData)>) -> Self {
			Self {
				children: children
					.into_iter()
					.map(|(id, data)| (id.to_string(), data))
					.collect(),
				calls: Cell::new(0),
			}
		}
	}

	impl GraphSource for MockSource {
		async fn fetch_initial(&self, _query: &str) -> Result<GraphData, GraphError> {
			Ok(GraphData::default())
		}

		async fn fetch_children(&self, id: &str) -> Result<GraphData, GraphError> {
			self.calls.set(self.calls.get() + 1);
			self.children
				.get(id)
				.cloned()
				.ok_or(GraphError::Http { status: 500 })
		}

		async fn search(&self, _query: &str) -> Result<GraphData, GraphError> {
			Ok(GraphData::default())
		}
	}

	fn manager() -> GraphStateManager {
		GraphStateManager::new(GraphConfig::default(), ViewportRect::new(800.0, 600.0))
	}

	fn scenario() -> (GraphStateManager, MockSource) {
		let mut m = manager();
		m.ingest(
			GraphData::from_value(json!({
				"nodes": [
					{ "id": "doc1", "title": "Intro", "type": "document" },
					{ "id": "sec1", "title": "Overview", "type": "heading_section" }
				],
				"links": [{ "source": "doc1", "target": "sec1" }]
			}))
			.unwrap(),
		);
		let children = GraphData::from_value(json!({
			"nodes": [{ "id": "frame1", "title": "Detail", "type": "tag" }],
			"links": [{ "source": "doc1", "target": "frame1" }]
		}))
		.unwrap();
		(m, MockSource::new([("doc1", children)]))
	}

	fn ids(m: &GraphStateManager) -> Vec<&str> {
		m.state().nodes.iter().map(|n| n.id.as_str()).collect()
	}

	#[test]
	fn ingest_drops_dangling_links() {
		let mut m = manager();
		m.ingest(GraphData::new(
			vec![GraphNode::new("A", "A", "document")],
			vec![GraphLink::new("A", "B")],
		));
		assert_eq!(m.state().nodes.len(), 1);
		assert!(m.state().links.is_empty());
		assert!(m.state().expanded_children.is_empty());
		assert!(m.positions().get("A").is_some());
	}

	#[test]
	fn collapse_subtree_removes_every_descendant() {
		let nodes: Vec<_> = ["A", "B", "C"]
			.iter()
			.map(|id| GraphNode::new(*id, *id, "document"))
			.collect();
		let links = vec![GraphLink::new("A", "B"), GraphLink::new("B", "C")];
		let cut = collapse_subtree(&nodes, &links, "A");

		assert_eq!(cut.nodes.len(), 1);
		assert_eq!(cut.nodes[0].id, "A");
		assert!(cut.links.is_empty());
		assert_eq!(cut.removed, HashSet::from(["B".to_string(), "C".to_string()]));
	}

	#[test]
	fn descendants_terminate_on_cycles() {
		let links = vec![
			GraphLink::new("A", "B"),
			GraphLink::new("B", "C"),
			GraphLink::new("C", "A"),
		];
		assert_eq!(descendants(&links, "A").len(), 2);
	}

	#[test]
	fn expand_merges_fetched_children() {
		let (mut m, source) = scenario();
		let outcome = block_on(m.expand_node("doc1", &source, 0.0)).unwrap();

		assert_eq!(outcome, ExpandOutcome::Expanded { added: 1 });
		assert_eq!(m.state().nodes.len(), 3);
		assert_eq!(
			m.state().expanded_children.get("doc1"),
			Some(&HashSet::from(["frame1".to_string()]))
		);
		assert!(m.state().fetched_nodes.contains("doc1"));
		assert_eq!(m.state().links.len(), 2);
		assert!(m.positions().get("frame1").is_some());
	}

	#[test]
	fn failed_fetch_resets_animation() {
		let (mut m, source) = scenario();
		let err = block_on(m.expand_node("sec1", &source, 0.0)).unwrap_err();
		assert!(matches!(err, GraphError::Http { status: 500 }));
		assert!(!m.state().animation.is_animating());
		assert!(!m.state().fetched_nodes.contains("sec1"));

		let outcome = block_on(m.expand_node("doc1", &source, 10.0)).unwrap();
		assert_eq!(outcome, ExpandOutcome::Expanded { added: 1 });
	}

	#[test]
	fn conflicting_requests_are_dropped_or_coalesced() {
		let (mut m, _) = scenario();
		assert_eq!(m.begin_expand("doc1", 0.0).unwrap(), ExpandOutcome::NeedsFetch);
		assert_eq!(m.begin_expand("sec1", 1.0).unwrap(), ExpandOutcome::Dropped);
		assert_eq!(m.begin_expand("doc1", 1.0).unwrap(), ExpandOutcome::Coalesced);
		assert_eq!(m.collapse_node("sec1", 1.0).unwrap(), CollapseOutcome::Dropped);
		assert_eq!(m.state().animation.current_target(), Some("doc1"));
		assert_eq!(m.state().nodes.len(), 2);
	}

	#[test]
	fn unknown_node_is_an_error() {
		let (mut m, _) = scenario();
		assert!(matches!(
			m.begin_expand("nope", 0.0),
			Err(GraphError::UnknownNode(id)) if id == "nope"
		));
		assert!(m.collapse_node("nope", 0.0).is_err());
	}

	#[test]
	fn response_after_reingest_is_stale() {
		let (mut m, _) = scenario();
		assert_eq!(m.begin_expand("doc1", 0.0).unwrap(), ExpandOutcome::NeedsFetch);
		m.ingest(GraphData::new(vec![GraphNode::new("doc1", "Intro", "document")], vec![]));

		let late = GraphData::new(vec![GraphNode::new("frame1", "Detail", "tag")], vec![]);
		assert_eq!(m.finish_expand("doc1", Ok(late), 5.0).unwrap(), ExpandOutcome::Stale);
		assert_eq!(m.state().nodes.len(), 1);
		assert!(!m.state().animation.is_animating());
	}

	#[test]
	fn animation_ends_after_duration() {
		let (mut m, source) = scenario();
		block_on(m.expand_node("doc1", &source, 0.0)).unwrap();
		assert!(!m.tick_animation(599.0));
		assert!(m.state().animation.is_animating());
		assert!(m.tick_animation(600.0));
		assert!(!m.state().animation.is_animating());
	}

	#[test]
	fn collapse_then_reexpand_uses_cache() {
		let (mut m, source) = scenario();
		block_on(m.expand_node("doc1", &source, 0.0)).unwrap();
		m.tick_animation(1_000.0);

		let outcome = m.collapse_node("doc1", 1_000.0).unwrap();
		assert_eq!(outcome, CollapseOutcome::Collapsed { removed: 2 });
		assert_eq!(ids(&m), vec!["doc1"]);
		assert!(m.state().links.is_empty());
		assert!(!m.state().is_expanded("doc1"));
		assert!(m.state().collapsing_nodes.contains("doc1"));
		assert_eq!(m.collapse_node("doc1", 1_100.0).unwrap(), CollapseOutcome::Coalesced);

		m.tick_animation(2_000.0);
		assert!(m.state().collapsing_nodes.is_empty());

		let outcome = block_on(m.expand_node("doc1", &source, 2_000.0)).unwrap();
		assert_eq!(outcome, ExpandOutcome::Expanded { added: 2 });
		assert_eq!(source.calls.get(), 1);
		assert_eq!(ids(&m), vec!["doc1", "frame1", "sec1"]);
		assert_eq!(
			m.state().expanded_children["doc1"],
			HashSet::from(["frame1".to_string(), "sec1".to_string()])
		);
		assert!(m.state().links.contains(&GraphLink::new("doc1", "sec1")));
	}

	#[test]
	fn collapsed_grandchildren_come_back_expanded() {
		let (mut m, _) = scenario();
		let sec_children = GraphData::new(
			vec![GraphNode::new("p1", "Body", "paragraph")],
			vec![GraphLink::new("sec1", "p1")],
		);
		let source = MockSource::new([("sec1", sec_children), ("doc1", GraphData::default())]);
		block_on(m.expand_node("doc1", &source, 0.0)).unwrap();
		m.tick_animation(1_000.0);
		block_on(m.expand_node("sec1", &source, 1_000.0)).unwrap();
		m.tick_animation(2_000.0);
		assert_eq!(ids(&m), vec!["doc1", "sec1", "p1"]);

		m.collapse_node("doc1", 2_000.0).unwrap();
		m.tick_animation(3_000.0);
		assert_eq!(ids(&m), vec!["doc1"]);

		let outcome = block_on(m.expand_node("doc1", &source, 3_000.0)).unwrap();
		assert_eq!(outcome, ExpandOutcome::Expanded { added: 2 });
		assert_eq!(source.calls.get(), 2);
		assert_eq!(ids(&m), vec!["doc1", "sec1", "p1"]);
		assert!(m.state().is_expanded("sec1"));
		m.tick_animation(4_000.0);
		assert_eq!(
			m.collapse_node("sec1", 4_000.0).unwrap(),
			CollapseOutcome::Collapsed { removed: 1 }
		);
	}

	#[test]
	fn nested_children_payloads_are_flattened_on_expand() {
		let (mut m, _) = scenario();
		let children = GraphData::from_value(json!({
			"nodes": [{
				"id": "doc1", "title": "Intro", "type": "document",
				"children": [
					{ "id": "sec2", "title": "Details", "type": "heading_section", "tags": ["ML"] }
				]
			}]
		}))
		.unwrap();
		let source = MockSource::new([("doc1", children)]);
		block_on(m.expand_node("doc1", &source, 0.0)).unwrap();

		assert!(m.state().expanded_children["doc1"].contains("sec2"));
		assert!(m.state().contains("tag:ml"));
		assert!(m.state().links.contains(&GraphLink::new("sec2", "tag:ml")));
		m.tick_animation(1_000.0);
		assert_eq!(m.begin_expand("tag:ml", 1_000.0).unwrap(), ExpandOutcome::NotExpandable);
	}

	#[test]
	fn metadata_nodes_merge_across_expansions() {
		let mut m = manager();
		m.ingest(
			GraphData::from_value(json!({
				"nodes": [
					{ "id": "doc1", "title": "A", "type": "document" },
					{ "id": "tag_9", "title": "Urgent", "type": "tag" }
				],
				"links": [{ "source": "doc1", "target": "tag_9" }]
			}))
			.unwrap(),
		);
		let children = GraphData::from_value(json!({
			"nodes": [{ "id": "sec1", "title": "B", "type": "heading_section", "tags": ["urgent"] }],
			"links": [{ "source": "doc1", "target": "sec1" }]
		}))
		.unwrap();
		let source = MockSource::new([("doc1", children)]);
		block_on(m.expand_node("doc1", &source, 0.0)).unwrap();

		assert_eq!(ids(&m), vec!["doc1", "tag_9", "sec1"]);
		assert!(m.state().links.contains(&GraphLink::new("sec1", "tag_9")));
	}

	#[test]
	fn metadata_nodes_do_not_expand() {
		let mut m = manager();
		m.ingest(GraphData::new(vec![GraphNode::new("tag:ml", "ML", "tag")], vec![]));
		assert_eq!(m.begin_expand("tag:ml", 0.0).unwrap(), ExpandOutcome::NotExpandable);
		assert!(!m.state().animation.is_animating());
	}

	#[test]
	fn filter_is_debounced_but_clears_at_once() {
		let (mut m, _) = scenario();
		assert_eq!(m.set_filter("intro", 0.0), None);
		assert_eq!(m.poll_filter(100.0), None);
		assert_eq!(m.set_filter("overview", 150.0), None);
		assert_eq!(m.poll_filter(300.0), None);

		let Some(FilterOutcome::Local(matches)) = m.poll_filter(350.0) else {
			panic!("filter did not settle");
		};
		assert_eq!(matches, HashSet::from(["sec1".to_string()]));
		assert!(m.is_filtered_out("doc1"));
		assert_eq!(m.poll_filter(400.0), None);

		assert_eq!(m.set_filter("  ", 401.0), Some(FilterOutcome::Cleared));
		assert!(!m.is_filtered_out("doc1"));
	}

	#[test]
	fn remote_mode_forwards_the_raw_query() {
		let config = GraphConfig {
			search_mode: SearchMode::Remote,
			..GraphConfig::default()
		};
		let mut m = GraphStateManager::new(config, ViewportRect::new(800.0, 600.0));
		m.set_filter("tag:urgent foo", 0.0);
		assert_eq!(
			m.poll_filter(200.0),
			Some(FilterOutcome::Remote("tag:urgent foo".into()))
		);
		assert!(m.filter_matches().is_none());
	}

	#[test]
	fn clearing_a_remote_search_restores_the_graph() {
		let config = GraphConfig {
			search_mode: SearchMode::Remote,
			..GraphConfig::default()
		};
		let mut m = GraphStateManager::new(config, ViewportRect::new(800.0, 600.0));
		m.ingest(GraphData::new(
			vec![
				GraphNode::new("a", "A", "document"),
				GraphNode::new("b", "B", "document"),
			],
			vec![GraphLink::new("a", "b")],
		));
		let results = || GraphData::new(vec![GraphNode::new("r", "Result", "document")], vec![]);

		m.set_filter("q", 0.0);
		assert_eq!(m.poll_filter(200.0), Some(FilterOutcome::Remote("q".into())));
		assert!(!m.apply_remote_results("other", results()));
		assert!(m.apply_remote_results("q", results()));
		assert_eq!(ids(&m), vec!["r"]);

		m.set_filter("q2", 300.0);
		m.poll_filter(500.0);
		assert!(m.apply_remote_results("q2", results()));

		assert_eq!(m.set_filter("", 600.0), Some(FilterOutcome::Cleared));
		assert_eq!(ids(&m), vec!["a", "b"]);
		assert_eq!(m.state().links, vec![GraphLink::new("a", "b")]);
		assert!(!m.apply_remote_results("q2", results()));
		assert_eq!(ids(&m), vec!["a", "b"]);
	}

	#[test]
	fn reconciliation_walks_one_node_at_a_time() {
		let (mut m, source) = scenario();
		let desired = HashSet::from(["doc1".to_string()]);
		assert_eq!(m.state().find_node_to_expand(&desired), Some("doc1"));
		assert_eq!(m.state().find_node_to_collapse(&desired), None);

		let step = m.reconcile(&desired, 0.0).unwrap();
		assert_eq!(
			step,
			Some(ReconcileStep::Expand("doc1".into(), ExpandOutcome::NeedsFetch))
		);
		assert_eq!(m.reconcile(&desired, 1.0).unwrap(), None);

		let children = source.children["doc1"].clone();
		m.finish_expand("doc1", Ok(children), 1.0).unwrap();
		m.tick_animation(1_000.0);
		assert_eq!(m.state().find_node_to_expand(&desired), None);

		let step = m.reconcile(&HashSet::new(), 1_000.0).unwrap();
		assert_eq!(
			step,
			Some(ReconcileStep::Collapse(
				"doc1".into(),
				CollapseOutcome::Collapsed { removed: 2 }
			))
		);
	}

	#[test]
	fn next_level_is_the_shallowest_frontier() {
		let (mut m, source) = scenario();
		assert_eq!(m.state().nodes_to_expand_next_level(), vec!["doc1"]);

		block_on(m.expand_node("doc1", &source, 0.0)).unwrap();
		// frame1 is a tag, so only sec1 remains expandable below doc1.
		assert_eq!(m.state().nodes_to_expand_next_level(), vec!["sec1"]);
	}

	#[test]
	fn hover_and_select_keep_the_last_write() {
		let (mut m, _) = scenario();
		assert!(m.hover(Some("doc1")));
		assert!(m.hover(Some("sec1")));
		assert!(!m.hover(Some("sec1")));
		assert_eq!(m.state().hovered_node_id.as_deref(), Some("sec1"));
		assert!(m.hover(Some("missing")));
		assert_eq!(m.state().hovered_node_id, None);

		m.select(Some("doc1"));
		m.select(Some("sec1"));
		assert_eq!(m.state().selected_node_id.as_deref(), Some("sec1"));
	}

	#[test]
	fn switching_layouts_keeps_every_node_positioned() {
		let (mut m, _) = scenario();
		m.set_layout_mode(LayoutMode::Hierarchical);
		assert_eq!(m.layout_mode(), LayoutMode::Hierarchical);
		for _ in 0..300 {
			m.tick(1.0 / 60.0, 0.0);
		}
		let doc = m.positions().get("doc1").unwrap();
		let sec = m.positions().get("sec1").unwrap();
		assert!(doc.y < sec.y);
		assert_eq!(m.positions().len(), 2);
	}

	#[test]
	fn render_requests_coalesce() {
		let (mut m, _) = scenario();
		m.request_render();
		m.request_render();
		assert!(m.take_render_request());
		assert!(!m.take_render_request());
	}

	#[test]
	fn fit_all_needs_positions() {
		let mut m = manager();
		assert!(!m.fit_all());
		let (mut m, _) = scenario();
		assert!(m.fit_all());
		assert!(m.camera().is_animating());
		assert!(m.center_on("doc1"));
		assert!(!m.center_on("missing"));
	}
}
