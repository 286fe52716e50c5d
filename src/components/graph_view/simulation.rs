//! Force-directed layout.
//!
//! A damped-velocity simulation with four forces:
//! - many-body repulsion between every pair of nodes,
//! - springs along links whose rest length follows the zoom level,
//! - collision avoidance (minimum separation),
//! - centering of the whole layout on the origin.
//!
//! Forces are scaled by `alpha`, the simulation "temperature", which decays
//! towards `alpha_target` every tick. Structural changes reheat the simulation
//! briefly so nodes glide into place instead of snapping. Sized for hundreds of
//! nodes: pairwise forces are O(n²) per tick.

use std::collections::HashMap;
use std::f64::consts::PI;

use log::debug;

use super::config::{ForceParams, GraphConfig};
use super::layout::{LayoutEngine, LayoutMode, NodePosition};
use super::types::{GraphLink, GraphNode};
use super::viewport::{Point, PositionMap, clamp_scale};

/// Spring rest length for zoom level `k`.
///
/// Zooming out lengthens links so clusters don't visually collapse; zooming
/// in shortens them slightly. The falloff `u` is a Gaussian bump centered at
/// `k = 1` (width 0.85), so the rest length is exactly `base` at `k = 1`.
pub fn dynamic_link_distance(k: f64, base: f64, scale_extent: (f64, f64), bounds: (f64, f64)) -> f64 {
	let k = clamp_scale(k, scale_extent.0, scale_extent.1);
	let m = (k - 1.0).abs();
	let u = 1.0 - (-(m / 0.85).powi(2)).exp();
	let delta = if k < 1.0 {
		0.45 * u * ((1.0 / k).powf(1.1) - 1.0)
	} else if k > 1.0 {
		-0.06 * u
	} else {
		0.0
	};
	(base * (1.0 + delta)).clamp(bounds.0, bounds.1)
}

#[derive(Clone, Debug)]
struct SimNode {
	id: String,
	x: f64,
	y: f64,
	vx: f64,
	vy: f64,
	fixed: Option<Point>,
}

#[derive(Clone, Debug)]
struct SimLink {
	source: usize,
	target: usize,
	strength: f64,
	bias: f64,
}

/// Deterministic tiny offset used when two nodes coincide exactly.
fn jiggle(seed: usize) -> f64 {
	((seed as f64 * 0.618_033_988_75).fract() - 0.5) * 1e-6
}

/// Phyllotaxis placement for nodes with no better seed.
fn initial_point(i: usize) -> Point {
	let radius = 10.0 * (0.5 + i as f64).sqrt();
	let angle = i as f64 * PI * (3.0 - 5f64.sqrt());
	Point::new(radius * angle.cos(), radius * angle.sin())
}

/// Physics layout state. Created empty; fed through [`LayoutEngine::update_data`].
#[derive(Clone, Debug)]
pub struct ForceSimulation {
	nodes: Vec<SimNode>,
	index: HashMap<String, usize>,
	links: Vec<SimLink>,
	params: ForceParams,
	base_distance: f64,
	distance_bounds: (f64, f64),
	scale_extent: (f64, f64),
	link_distance: f64,
	alpha: f64,
	alpha_target: f64,
	/// Seconds left before a reheat releases `alpha_target`.
	reheat_remaining: Option<f64>,
	pub center: Point,
}

impl ForceSimulation {
	pub fn new(config: &GraphConfig) -> Self {
		Self {
			nodes: Vec::new(),
			index: HashMap::new(),
			links: Vec::new(),
			params: config.force.clone(),
			base_distance: config.base_link_distance,
			distance_bounds: config.link_distance_bounds,
			scale_extent: config.scale_extent,
			link_distance: config.base_link_distance,
			alpha: 1.0,
			alpha_target: 0.0,
			reheat_remaining: None,
			center: Point::default(),
		}
	}

	pub fn alpha(&self) -> f64 {
		self.alpha
	}

	pub fn alpha_target(&self) -> f64 {
		self.alpha_target
	}

	pub fn link_distance(&self) -> f64 {
		self.link_distance
	}

	pub fn is_settled(&self) -> bool {
		self.alpha < self.params.alpha_min && self.alpha_target < self.params.alpha_min
	}

	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	fn apply_links(&mut self) {
		for (i, link) in self.links.iter().enumerate() {
			let (s, t) = (&self.nodes[link.source], &self.nodes[link.target]);
			let mut dx = t.x + t.vx - s.x - s.vx;
			let mut dy = t.y + t.vy - s.y - s.vy;
			if dx == 0.0 {
				dx = jiggle(i);
			}
			if dy == 0.0 {
				dy = jiggle(i + 1);
			}
			let l = (dx * dx + dy * dy).sqrt();
			let f = (l - self.link_distance) / l * self.alpha * link.strength;
			let (fx, fy) = (dx * f, dy * f);

			let target = &mut self.nodes[link.target];
			target.vx -= fx * link.bias;
			target.vy -= fy * link.bias;
			let source = &mut self.nodes[link.source];
			source.vx += fx * (1.0 - link.bias);
			source.vy += fy * (1.0 - link.bias);
		}
	}

	fn apply_charge(&mut self) {
		let strength = self.params.charge_strength * self.alpha;
		let n = self.nodes.len();
		for i in 0..n {
			for j in (i + 1)..n {
				let mut dx = self.nodes[j].x - self.nodes[i].x;
				let mut dy = self.nodes[j].y - self.nodes[i].y;
				if dx == 0.0 && dy == 0.0 {
					dx = jiggle(i * n + j);
					dy = jiggle(j * n + i);
				}
				let l2 = (dx * dx + dy * dy).max(1.0);
				let w = strength / l2;
				self.nodes[i].vx += dx * w;
				self.nodes[i].vy += dy * w;
				self.nodes[j].vx -= dx * w;
				self.nodes[j].vy -= dy * w;
			}
		}
	}

	fn apply_collide(&mut self) {
		let min_sep = self.params.collide_radius * 2.0;
		let strength = self.params.collide_strength;
		let n = self.nodes.len();
		for i in 0..n {
			for j in (i + 1)..n {
				let (a, b) = (&self.nodes[i], &self.nodes[j]);
				let mut dx = a.x + a.vx - b.x - b.vx;
				let mut dy = a.y + a.vy - b.y - b.vy;
				let mut l2 = dx * dx + dy * dy;
				if l2 >= min_sep * min_sep {
					continue;
				}
				if l2 == 0.0 {
					dx = jiggle(i * n + j);
					dy = jiggle(j * n + i);
					l2 = dx * dx + dy * dy;
				}
				let l = l2.sqrt();
				let f = (min_sep - l) / l * strength * 0.5;
				self.nodes[i].vx += dx * f;
				self.nodes[i].vy += dy * f;
				self.nodes[j].vx -= dx * f;
				self.nodes[j].vy -= dy * f;
			}
		}
	}

	fn apply_center(&mut self) {
		if self.nodes.is_empty() {
			return;
		}
		let n = self.nodes.len() as f64;
		let (sx, sy) = self
			.nodes
			.iter()
			.fold((0.0, 0.0), |(sx, sy), node| (sx + node.x, sy + node.y));
		let shift_x = (sx / n - self.center.x) * self.params.center_strength;
		let shift_y = (sy / n - self.center.y) * self.params.center_strength;
		for node in &mut self.nodes {
			node.x -= shift_x;
			node.y -= shift_y;
		}
	}

	fn integrate(&mut self) {
		let decay = 1.0 - self.params.velocity_decay;
		for node in &mut self.nodes {
			if let Some(p) = node.fixed {
				node.x = p.x;
				node.y = p.y;
				node.vx = 0.0;
				node.vy = 0.0;
			} else {
				node.vx *= decay;
				node.vy *= decay;
				node.x += node.vx;
				node.y += node.vy;
			}
		}
	}

	/// Seed position for a node absent from `seed`: next to an already placed
	/// neighbor when there is one, otherwise on the phyllotaxis spiral.
	fn seed_point(
		i: usize,
		id: &str,
		seed: &PositionMap,
		neighbors: &HashMap<&str, Vec<&str>>,
	) -> Point {
		if let Some(p) = seed.get(id) {
			return p;
		}
		let anchor = neighbors
			.get(id)
			.into_iter()
			.flatten()
			.find_map(|other| seed.get(other));
		match anchor {
			Some(p) => {
				let offset = initial_point(i);
				Point::new(p.x + offset.x * 0.5, p.y + offset.y * 0.5)
			}
			None => initial_point(i),
		}
	}
}

impl LayoutEngine for ForceSimulation {
	fn mode(&self) -> LayoutMode {
		LayoutMode::Force
	}

	fn update_data(&mut self, nodes: &[GraphNode], links: &[GraphLink], seed: &PositionMap) {
		let mut neighbors: HashMap<&str, Vec<&str>> = HashMap::new();
		for link in links {
			neighbors
				.entry(link.target.as_str())
				.or_default()
				.push(link.source.as_str());
			neighbors
				.entry(link.source.as_str())
				.or_default()
				.push(link.target.as_str());
		}

		self.nodes = nodes
			.iter()
			.enumerate()
			.map(|(i, node)| {
				let p = Self::seed_point(i, &node.id, seed, &neighbors);
				SimNode {
					id: node.id.clone(),
					x: p.x,
					y: p.y,
					vx: 0.0,
					vy: 0.0,
					fixed: None,
				}
			})
			.collect();
		self.index = self
			.nodes
			.iter()
			.enumerate()
			.map(|(i, n)| (n.id.clone(), i))
			.collect();

		let resolved: Vec<(usize, usize)> = links
			.iter()
			.filter_map(|link| {
				let pair = (*self.index.get(&link.source)?, *self.index.get(&link.target)?);
				Some(pair)
			})
			.filter(|(s, t)| s != t)
			.collect();
		if resolved.len() < links.len() {
			debug!(
				"kb-graph: force layout skipped {} unresolved links",
				links.len() - resolved.len()
			);
		}

		let mut degree = vec![0usize; self.nodes.len()];
		for &(s, t) in &resolved {
			degree[s] += 1;
			degree[t] += 1;
		}
		self.links = resolved
			.into_iter()
			.map(|(source, target)| {
				let (ds, dt) = (degree[source] as f64, degree[target] as f64);
				SimLink {
					source,
					target,
					strength: 1.0 / ds.min(dt),
					bias: ds / (ds + dt),
				}
			})
			.collect();

		if seed.is_empty() {
			self.alpha = 1.0;
		} else {
			self.reheat();
		}
	}

	fn tick(&mut self, dt: f64) -> bool {
		if let Some(remaining) = self.reheat_remaining.as_mut() {
			*remaining -= dt;
			if *remaining <= 0.0 {
				self.alpha_target = 0.0;
				self.reheat_remaining = None;
			}
		}
		if self.nodes.is_empty() || self.is_settled() {
			return false;
		}

		self.alpha += (self.alpha_target - self.alpha) * self.params.alpha_decay;

		self.apply_links();
		self.apply_charge();
		self.apply_collide();
		self.apply_center();
		self.integrate();
		true
	}

	fn write_positions(&self, positions: &mut PositionMap) {
		positions.retain(|id| self.index.contains_key(id));
		for node in &self.nodes {
			positions.set(node.id.clone(), Point::new(node.x, node.y));
		}
	}

	fn node_positions(&self) -> Vec<NodePosition> {
		self.nodes
			.iter()
			.map(|n| NodePosition {
				id: n.id.clone(),
				x: n.x,
				y: n.y,
			})
			.collect()
	}

	fn set_zoom(&mut self, k: f64) {
		let distance =
			dynamic_link_distance(k, self.base_distance, self.scale_extent, self.distance_bounds);
		if (distance - self.link_distance).abs() > 0.5 {
			self.link_distance = distance;
			self.reheat();
		}
	}

	fn pin(&mut self, id: &str, point: Option<Point>) {
		let Some(&i) = self.index.get(id) else {
			return;
		};
		let node = &mut self.nodes[i];
		node.fixed = point;
		if let Some(p) = point {
			node.x = p.x;
			node.y = p.y;
			self.alpha = self.alpha.max(self.params.reheat_target);
		}
	}

	fn reheat(&mut self) {
		self.alpha = self.alpha.max(self.params.reheat_alpha);
		self.alpha_target = self.params.reheat_target;
		self.reheat_remaining = Some(self.params.reheat_hold_secs);
	}
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;

	use super::*;

	const EXTENT: (f64, f64) = (0.1, 3.0);
	const BOUNDS: (f64, f64) = (30.0, 900.0);
	const DT: f64 = 1.0 / 60.0;

	fn distance(k: f64) -> f64 {
		dynamic_link_distance(k, 90.0, EXTENT, BOUNDS)
	}

	fn run(sim: &mut ForceSimulation, ticks: usize) {
		for _ in 0..ticks {
			sim.tick(DT);
		}
	}

	fn pos(sim: &ForceSimulation, id: &str) -> Point {
		let p = sim.node_positions().into_iter().find(|p| p.id == id).unwrap();
		Point::new(p.x, p.y)
	}

	#[test]
	fn unit_zoom_is_base_distance() {
		assert_eq!(distance(1.0), 90.0);
	}

	#[test]
	fn zoom_out_lengthens_and_zoom_in_shortens() {
		assert!(distance(0.5) > 90.0);
		assert!(distance(2.0) < 90.0);
		assert_eq!(distance(0.01), distance(0.1));
		assert_eq!(distance(10.0), distance(3.0));
	}

	#[test]
	fn isolated_nodes_spread_out() {
		let mut sim = ForceSimulation::new(&GraphConfig::default());
		let nodes = vec![
			GraphNode::new("a", "A", "document"),
			GraphNode::new("b", "B", "document"),
			GraphNode::new("c", "C", "document"),
		];
		sim.update_data(&nodes, &[], &PositionMap::new());
		run(&mut sim, 300);

		let (a, b, c) = (pos(&sim, "a"), pos(&sim, "b"), pos(&sim, "c"));
		for p in [a, b, c] {
			assert!(p.x.is_finite() && p.y.is_finite());
		}
		assert!(a.distance(b) > 40.0);
		assert!(b.distance(c) > 40.0);
		let mean_x = (a.x + b.x + c.x) / 3.0;
		assert!(mean_x.abs() < 1e-6);
	}

	#[test]
	fn linked_pair_settles_near_rest_length() {
		let mut sim = ForceSimulation::new(&GraphConfig::default());
		let nodes = vec![GraphNode::new("a", "A", "document"), GraphNode::new("b", "B", "tag")];
		sim.update_data(&nodes, &[GraphLink::new("a", "b")], &PositionMap::new());
		run(&mut sim, 400);

		let d = pos(&sim, "a").distance(pos(&sim, "b"));
		assert!(d > 60.0 && d < 140.0, "distance {d}");
	}

	#[test]
	fn collision_separates_overlapping_nodes() {
		let mut config = GraphConfig::default();
		config.force.charge_strength = 0.0;
		let mut sim = ForceSimulation::new(&config);
		let mut seed = PositionMap::new();
		seed.set("a", Point::new(0.0, 0.0));
		seed.set("b", Point::new(1.0, 0.0));
		let nodes = vec![GraphNode::new("a", "A", ""), GraphNode::new("b", "B", "")];
		sim.update_data(&nodes, &[], &seed);
		run(&mut sim, 300);

		assert!(pos(&sim, "a").distance(pos(&sim, "b")) > 50.0);
	}

	#[test]
	fn dangling_links_are_ignored_and_seeds_respected() {
		let mut sim = ForceSimulation::new(&GraphConfig::default());
		let mut seed = PositionMap::new();
		seed.set("a", Point::new(12.0, -7.0));
		let nodes = vec![GraphNode::new("a", "A", ""), GraphNode::new("c", "C", "")];
		sim.update_data(&nodes, &[GraphLink::new("a", "ghost"), GraphLink::new("a", "c")], &seed);

		assert_eq!(sim.links.len(), 1);
		assert_eq!(pos(&sim, "a"), Point::new(12.0, -7.0));
		let c = pos(&sim, "c");
		assert!(c.distance(Point::new(12.0, -7.0)) < 20.0);
	}

	#[test]
	fn reheat_releases_target_and_settles() {
		let mut sim = ForceSimulation::new(&GraphConfig::default());
		let nodes = vec![GraphNode::new("a", "A", ""), GraphNode::new("b", "B", "")];
		let mut seed = PositionMap::new();
		seed.set("a", Point::new(-50.0, 0.0));
		sim.update_data(&nodes, &[GraphLink::new("a", "b")], &seed);

		assert!(sim.alpha() >= 0.4);
		assert_eq!(sim.alpha_target(), 0.12);
		run(&mut sim, 20);
		assert_eq!(sim.alpha_target(), 0.0);
		run(&mut sim, 1000);
		assert!(sim.is_settled());
		assert!(!sim.tick(DT));
	}

	#[test]
	fn zoom_change_updates_link_distance() {
		let mut sim = ForceSimulation::new(&GraphConfig::default());
		sim.set_zoom(0.3);
		assert_eq!(sim.link_distance(), distance(0.3));
		assert!(sim.link_distance() > 90.0);
	}

	#[test]
	fn pinned_node_stays_put() {
		let mut sim = ForceSimulation::new(&GraphConfig::default());
		let nodes = vec![GraphNode::new("a", "A", ""), GraphNode::new("b", "B", "")];
		sim.update_data(&nodes, &[GraphLink::new("a", "b")], &PositionMap::new());
		sim.pin("a", Some(Point::new(200.0, 200.0)));
		run(&mut sim, 50);
		assert_eq!(pos(&sim, "a"), Point::new(200.0, 200.0));
	}

	proptest! {
		#[test]
		fn distance_stays_in_bounds(k in 0.1f64..=3.0) {
			let d = distance(k);
			prop_assert!((30.0..=900.0).contains(&d));
		}

		#[test]
		fn distance_monotonic_below_one(a in 0.1f64..1.0, b in 0.1f64..1.0) {
			let (lo, hi) = if a < b { (a, b) } else { (b, a) };
			prop_assert!(distance(lo) + 1e-9 >= distance(hi));
		}

		#[test]
		fn distance_monotonic_above_one(a in 1.0f64..=3.0, b in 1.0f64..=3.0) {
			let (lo, hi) = if a < b { (a, b) } else { (b, a) };
			prop_assert!(distance(lo) + 1e-9 >= distance(hi));
		}
	}
}
