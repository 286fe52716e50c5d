//! Smoothed hover highlighting of a node and its direct neighbors.
//!
//! Every node carries an intensity in `[0, 1]` that eases toward 1 while it
//! belongs to the hovered neighborhood and back to 0 afterwards. A short hold
//! keeps a highlight from flickering when the pointer only grazes a node.

use std::collections::{HashMap, HashSet};

use super::types::GraphLink;

/// Seconds a highlight stays at full strength before it may fade.
const HOLD_SECS: f64 = 0.12;
const FADE_IN_SPEED: f64 = 6.0;
const FADE_OUT_SPEED: f64 = 4.0;
/// Intensities below this are dropped.
const VISIBLE_FLOOR: f64 = 0.005;

#[derive(Clone, Debug, Default)]
pub struct HighlightState {
	hovered: Option<String>,
	neighborhood: HashSet<String>,
	intensity: HashMap<String, f64>,
	ring: HashMap<String, f64>,
	hold: HashMap<String, f64>,
	max: f64,
}

impl HighlightState {
	pub fn hovered(&self) -> Option<&str> {
		self.hovered.as_deref()
	}

	/// Point the highlight at `id` (or nothing) and recompute its neighborhood.
	pub fn set_hover(&mut self, id: Option<&str>, links: &[GraphLink]) {
		if self.hovered.as_deref() == id {
			return;
		}
		self.hovered = id.map(str::to_string);
		self.neighborhood.clear();

		let Some(id) = id else {
			return;
		};
		self.neighborhood.insert(id.to_string());
		for link in links.iter().filter(|l| l.touches(id)) {
			self.neighborhood.insert(link.source.clone());
			self.neighborhood.insert(link.target.clone());
		}
		for member in &self.neighborhood {
			self.hold.insert(member.clone(), HOLD_SECS);
		}
	}

	/// Forget nodes that are no longer in the graph.
	pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
		self.intensity.retain(|id, _| keep(id));
		self.ring.retain(|id, _| keep(id));
		self.hold.retain(|id, _| keep(id));
		self.neighborhood.retain(|id| keep(id));
		if self.hovered.as_deref().is_some_and(|h| !keep(h)) {
			self.hovered = None;
		}
	}

	/// Ease intensities by `dt` seconds. Returns `true` while anything is
	/// still changing.
	pub fn tick(&mut self, dt: f64) -> bool {
		let rise = 1.0 - (-FADE_IN_SPEED * dt).exp();
		let decay = (-FADE_OUT_SPEED * dt).exp();
		let mut changing = false;

		for id in &self.neighborhood {
			let value = self.intensity.entry(id.clone()).or_insert(0.0);
			if *value < 1.0 - VISIBLE_FLOOR {
				changing = true;
			}
			*value += (1.0 - *value) * rise;
		}
		if let Some(id) = &self.hovered {
			let value = self.ring.entry(id.clone()).or_insert(0.0);
			*value += (1.0 - *value) * rise;
		}

		let neighborhood = &self.neighborhood;
		self.hold.retain(|id, left| {
			if neighborhood.contains(id) {
				return true;
			}
			*left -= dt;
			*left > 0.0
		});

		let hold = &self.hold;
		let fade = |id: &String, value: &mut f64| {
			if hold.get(id).copied().unwrap_or(0.0) <= 0.0 {
				*value *= decay;
			}
			*value > VISIBLE_FLOOR
		};

		let mut max: f64 = 0.0;
		self.intensity.retain(|id, value| {
			let keep = neighborhood.contains(id) || {
				changing = true;
				fade(id, value)
			};
			max = max.max(*value);
			keep
		});
		let hovered = self.hovered.as_deref();
		self.ring
			.retain(|id, value| hovered == Some(id.as_str()) || fade(id, value));

		self.max = max;
		changing
	}

	pub fn node_intensity(&self, id: &str) -> f64 {
		self.intensity.get(id).copied().unwrap_or(0.0)
	}

	pub fn ring_intensity(&self, id: &str) -> f64 {
		self.ring.get(id).copied().unwrap_or(0.0)
	}

	/// Geometric mean of the endpoint intensities.
	pub fn edge_intensity(&self, source: &str, target: &str) -> f64 {
		(self.node_intensity(source) * self.node_intensity(target)).sqrt()
	}

	/// Strongest current intensity, used to dim everything else.
	pub fn max_intensity(&self) -> f64 {
		self.max
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn links() -> Vec<GraphLink> {
		vec![GraphLink::new("a", "b"), GraphLink::new("c", "a"), GraphLink::new("x", "y")]
	}

	fn run(state: &mut HighlightState, secs: f64) {
		let steps = (secs * 60.0) as usize;
		for _ in 0..steps {
			state.tick(1.0 / 60.0);
		}
	}

	#[test]
	fn hover_lights_up_neighbors_only() {
		let mut state = HighlightState::default();
		state.set_hover(Some("a"), &links());
		run(&mut state, 1.0);

		for id in ["a", "b", "c"] {
			assert!(state.node_intensity(id) > 0.95, "{id} not lit");
		}
		assert_eq!(state.node_intensity("x"), 0.0);
		assert!(state.ring_intensity("a") > 0.95);
		assert_eq!(state.ring_intensity("b"), 0.0);
		assert!(state.edge_intensity("a", "b") > 0.95);
		assert!(state.max_intensity() > 0.95);
	}

	#[test]
	fn highlight_fades_after_hold() {
		let mut state = HighlightState::default();
		state.set_hover(Some("a"), &links());
		run(&mut state, 1.0);
		state.set_hover(None, &links());

		state.tick(0.05);
		assert!(state.node_intensity("a") > 0.95, "faded during hold");

		run(&mut state, 3.0);
		assert_eq!(state.node_intensity("a"), 0.0);
		assert_eq!(state.ring_intensity("a"), 0.0);
		assert!(!state.tick(1.0 / 60.0));
	}

	#[test]
	fn retain_forgets_removed_nodes() {
		let mut state = HighlightState::default();
		state.set_hover(Some("a"), &links());
		run(&mut state, 0.5);
		state.retain(|id| id != "a");
		assert_eq!(state.hovered(), None);
		assert_eq!(state.node_intensity("a"), 0.0);
		assert!(state.node_intensity("b") > 0.0);
	}
}
