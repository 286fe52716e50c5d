//! Deterministic top-down tree layout.
//!
//! Each node is given its first parent in link order, turning the visible
//! graph into a forest. Leaves take consecutive horizontal slots in depth-first
//! order; a parent sits centered above its first and last child. The layout is
//! recomputed from scratch on every [`LayoutEngine::update_data`] call, and
//! nodes then glide from where they were to their new slot.

use std::collections::{HashMap, HashSet};

use super::config::{GraphConfig, HierarchyParams};
use super::layout::{LayoutEngine, LayoutMode, NodePosition};
use super::types::{GraphLink, GraphNode};
use super::viewport::{Point, PositionMap};

/// Below this distance a moving node snaps onto its target.
const SETTLE_EPSILON: f64 = 0.05;

#[derive(Clone, Debug)]
pub struct HierarchicalLayout {
	params: HierarchyParams,
	order: Vec<String>,
	targets: HashMap<String, Point>,
	current: HashMap<String, Point>,
}

struct Placement<'a> {
	children: &'a HashMap<&'a str, Vec<&'a str>>,
	visited: HashSet<&'a str>,
	slots: HashMap<&'a str, (f64, usize)>,
	next_leaf: usize,
}

impl<'a> Placement<'a> {
	/// Returns the horizontal slot of `id`.
	fn place(&mut self, id: &'a str, depth: usize) -> f64 {
		self.visited.insert(id);
		let kids: Vec<&'a str> = self
			.children
			.get(id)
			.map(|kids| kids.iter().copied().filter(|k| !self.visited.contains(k)).collect())
			.unwrap_or_default();

		let mut first = None;
		let mut last = None;
		for kid in kids {
			// A sibling subtree may already have claimed this node.
			if self.visited.contains(kid) {
				continue;
			}
			let slot = self.place(kid, depth + 1);
			first.get_or_insert(slot);
			last = Some(slot);
		}

		let slot = match (first, last) {
			(Some(a), Some(b)) => (a + b) / 2.0,
			_ => {
				let slot = self.next_leaf as f64;
				self.next_leaf += 1;
				slot
			}
		};
		self.slots.insert(id, (slot, depth));
		slot
	}
}

impl HierarchicalLayout {
	pub fn new(config: &GraphConfig) -> Self {
		Self {
			params: config.hierarchy.clone(),
			order: Vec::new(),
			targets: HashMap::new(),
			current: HashMap::new(),
		}
	}

	pub fn target(&self, id: &str) -> Option<Point> {
		self.targets.get(id).copied()
	}

	fn compute_targets(&self, nodes: &[GraphNode], links: &[GraphLink]) -> HashMap<String, Point> {
		let visible: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();

		let mut parent_of: HashMap<&str, &str> = HashMap::new();
		let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
		for link in links {
			let (s, t) = (link.source.as_str(), link.target.as_str());
			if s == t || !visible.contains(s) || !visible.contains(t) || parent_of.contains_key(t) {
				continue;
			}
			parent_of.insert(t, s);
			children.entry(s).or_default().push(t);
		}

		let mut placement = Placement {
			children: &children,
			visited: HashSet::new(),
			slots: HashMap::new(),
			next_leaf: 0,
		};
		let roots = nodes
			.iter()
			.map(|n| n.id.as_str())
			.filter(|id| !parent_of.contains_key(id));
		for root in roots {
			if !placement.visited.contains(root) {
				placement.place(root, 0);
			}
		}
		// Nodes caught in a parent cycle have no root; start from the first one.
		for node in nodes {
			if !placement.visited.contains(node.id.as_str()) {
				placement.place(node.id.as_str(), 0);
			}
		}

		let (min, max) = placement
			.slots
			.values()
			.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(slot, _)| {
				(lo.min(slot), hi.max(slot))
			});
		let mid = if min.is_finite() { (min + max) / 2.0 } else { 0.0 };

		placement
			.slots
			.into_iter()
			.map(|(id, (slot, depth))| {
				let point = Point::new(
					(slot - mid) * self.params.sibling_spacing,
					depth as f64 * self.params.level_spacing,
				);
				(id.to_string(), point)
			})
			.collect()
	}
}

impl LayoutEngine for HierarchicalLayout {
	fn mode(&self) -> LayoutMode {
		LayoutMode::Hierarchical
	}

	fn update_data(&mut self, nodes: &[GraphNode], links: &[GraphLink], seed: &PositionMap) {
		let targets = self.compute_targets(nodes, links);

		let mut parent_target: HashMap<&str, Point> = HashMap::new();
		for link in links {
			if let Some(p) = targets.get(&link.source) {
				parent_target.entry(link.target.as_str()).or_insert(*p);
			}
		}

		self.current = targets
			.iter()
			.map(|(id, target)| {
				let start = seed
					.get(id)
					.or_else(|| self.current.get(id).copied())
					.or_else(|| parent_target.get(id.as_str()).copied())
					.unwrap_or(*target);
				(id.clone(), start)
			})
			.collect();
		self.order = nodes.iter().map(|n| n.id.clone()).collect();
		self.targets = targets;
	}

	fn tick(&mut self, dt: f64) -> bool {
		let factor = 1.0 - (-self.params.settle_speed * dt).exp();
		let mut moving = false;
		for (id, point) in self.current.iter_mut() {
			let Some(target) = self.targets.get(id) else {
				continue;
			};
			if point.distance(*target) < SETTLE_EPSILON {
				*point = *target;
				continue;
			}
			point.x += (target.x - point.x) * factor;
			point.y += (target.y - point.y) * factor;
			moving = true;
		}
		moving
	}

	fn write_positions(&self, positions: &mut PositionMap) {
		positions.retain(|id| self.current.contains_key(id));
		for (id, point) in &self.current {
			positions.set(id.clone(), *point);
		}
	}

	fn node_positions(&self) -> Vec<NodePosition> {
		self.order
			.iter()
			.filter_map(|id| {
				let p = self.targets.get(id)?;
				Some(NodePosition {
					id: id.clone(),
					x: p.x,
					y: p.y,
				})
			})
			.collect()
	}
}
