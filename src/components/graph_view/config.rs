//! Injectable configuration for the graph view.
//!
//! Every field has a default, so an embedded `<script id="graph-config">` only
//! needs to carry the values it wants to change.

use serde::Deserialize;

/// How search input is resolved into a filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
	/// Parse and match in-process against the loaded graph.
	#[default]
	Local,
	/// Forward the raw query to the search endpoint.
	Remote,
}

/// Tuning for the force simulation.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ForceParams {
	/// Many-body strength; negative values repel.
	pub charge_strength: f64,
	/// Minimum separation radius per node.
	pub collide_radius: f64,
	pub collide_strength: f64,
	/// Fraction of velocity lost per tick.
	pub velocity_decay: f64,
	pub alpha_min: f64,
	pub alpha_decay: f64,
	/// Energy injected on reheat.
	pub reheat_alpha: f64,
	/// Energy floor held while the reheat lasts.
	pub reheat_target: f64,
	/// Seconds before the reheat floor is released back to zero.
	pub reheat_hold_secs: f64,
	pub center_strength: f64,
}

impl Default for ForceParams {
	fn default() -> Self {
		let alpha_min: f64 = 0.001;
		Self {
			charge_strength: -260.0,
			collide_radius: 28.0,
			collide_strength: 0.7,
			velocity_decay: 0.4,
			alpha_min,
			alpha_decay: 1.0 - alpha_min.powf(1.0 / 300.0),
			reheat_alpha: 0.4,
			reheat_target: 0.12,
			reheat_hold_secs: 0.25,
			center_strength: 1.0,
		}
	}
}

/// Spacing for the tree layout.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct HierarchyParams {
	/// Horizontal distance between adjacent leaves.
	pub sibling_spacing: f64,
	/// Vertical distance between depth rows.
	pub level_spacing: f64,
	/// Exponential smoothing speed of node moves, per second.
	pub settle_speed: f64,
}

impl Default for HierarchyParams {
	fn default() -> Self {
		Self {
			sibling_spacing: 140.0,
			level_spacing: 120.0,
			settle_speed: 8.0,
		}
	}
}

/// Top-level graph view configuration.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
	/// Zoom extent `[min, max]`.
	pub scale_extent: (f64, f64),
	pub base_link_distance: f64,
	/// Clamp applied to the zoom-adjusted link distance.
	pub link_distance_bounds: (f64, f64),
	pub fit_padding: f64,
	pub fit_all_padding: f64,
	pub animation_duration_ms: f64,
	pub filter_debounce_ms: f64,
	pub search_mode: SearchMode,
	pub api_base_url: Option<String>,
	/// Depth requested when fetching the children of a node.
	pub expand_depth: u32,
	/// Page size for the initial search.
	pub expand_limit: u32,
	pub force: ForceParams,
	pub hierarchy: HierarchyParams,
}

impl Default for GraphConfig {
	fn default() -> Self {
		Self {
			scale_extent: (0.1, 3.0),
			base_link_distance: 90.0,
			link_distance_bounds: (30.0, 900.0),
			fit_padding: 120.0,
			fit_all_padding: 160.0,
			animation_duration_ms: 600.0,
			filter_debounce_ms: 200.0,
			search_mode: SearchMode::Local,
			api_base_url: None,
			expand_depth: 1,
			expand_limit: 50,
			force: ForceParams::default(),
			hierarchy: HierarchyParams::default(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn partial_config_keeps_defaults() {
		let config: GraphConfig = serde_json::from_str(
			r#"{ "search_mode": "remote", "force": { "charge_strength": -100.0 } }"#,
		)
		.unwrap();

		assert_eq!(config.search_mode, SearchMode::Remote);
		assert_eq!(config.force.charge_strength, -100.0);
		assert_eq!(config.force.velocity_decay, 0.4);
		assert_eq!(config.base_link_distance, 90.0);
		assert_eq!(config.scale_extent, (0.1, 3.0));
	}

	#[test]
	fn default_alpha_decay_reaches_alpha_min_in_300_ticks() {
		let params = ForceParams::default();
		let alpha = (1.0 - params.alpha_decay).powi(300);
		assert!((alpha - params.alpha_min).abs() < 1e-9);
	}
}
