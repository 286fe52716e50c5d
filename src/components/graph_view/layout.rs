//! Layout engine abstraction shared by the force and tree layouts.

use serde::Deserialize;

use super::types::{GraphLink, GraphNode};
use super::viewport::{Point, PositionMap};

/// Which layout engine drives node positions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
	#[default]
	Force,
	Hierarchical,
}

impl LayoutMode {
	pub fn toggled(self) -> Self {
		match self {
			LayoutMode::Force => LayoutMode::Hierarchical,
			LayoutMode::Hierarchical => LayoutMode::Force,
		}
	}
}

/// A positioned node as reported by a layout engine.
#[derive(Clone, Debug, PartialEq)]
pub struct NodePosition {
	pub id: String,
	pub x: f64,
	pub y: f64,
}

/// A layout strategy. Each engine owns its internal state exclusively and is
/// the sole writer of the shared [`PositionMap`] while it is active.
pub trait LayoutEngine {
	fn mode(&self) -> LayoutMode;

	/// Replace the visible node/link set. `seed` carries the current
	/// positions so known nodes keep their place.
	fn update_data(&mut self, nodes: &[GraphNode], links: &[GraphLink], seed: &PositionMap);

	/// Advance by `dt` seconds. Returns `true` while positions are still moving.
	fn tick(&mut self, dt: f64) -> bool;

	/// Write the engine's current positions into `positions`, dropping IDs the
	/// engine does not know.
	fn write_positions(&self, positions: &mut PositionMap);

	fn node_positions(&self) -> Vec<NodePosition>;

	/// Zoom level changed; engines with zoom-aware forces react here.
	fn set_zoom(&mut self, _k: f64) {}

	/// Hold a node at `point` (drag). `None` releases it.
	fn pin(&mut self, _id: &str, _point: Option<Point>) {}

	/// Nudge the engine after a structural change so it settles smoothly.
	fn reheat(&mut self) {}
}
