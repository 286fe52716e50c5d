//! Canvas rendering and hit testing.
//!
//! Drawing happens in passes for correct z-ordering:
//! 1. Background (screen space)
//! 2. Edges, curved in force mode and elbowed in tree mode (world space)
//! 3. Dimmed and plain nodes, then highlighted nodes on top
//! 4. Labels, when zoomed in far enough

use std::f64::consts::PI;

use wasm_bindgen::JsValue;
use web_sys::CanvasRenderingContext2d;

use super::highlight::HighlightState;
use super::layout::LayoutMode;
use super::state::{GraphState, GraphStateManager};
use super::types::GraphNode;
use super::viewport::{Point, PositionMap};
use super::visual::{Color, Theme, visual_for};

/// Longest label drawn before truncation, in characters.
const LABEL_MAX_CHARS: usize = 28;
/// Bend of force-mode edges, as a fraction of their length.
const CURVE_TENSION: f64 = 0.12;

fn smooth_step(t: f64) -> f64 {
	t * t * (3.0 - 2.0 * t)
}

/// Zoom-compensated sizes: screen-constant strokes and fonts expressed in
/// world units for the current zoom `k`.
struct Scaled {
	k: f64,
	edge_width: f64,
	ring_width: f64,
	ring_gap: f64,
	label_font: String,
	glyph_font_px: f64,
}

impl Scaled {
	fn new(k: f64) -> Self {
		let label_px = (12.0 / k).clamp(6.0, 40.0);
		Self {
			k,
			edge_width: 1.2 / k,
			ring_width: 2.0 / k,
			ring_gap: 3.0 / k,
			label_font: format!("{label_px:.1}px system-ui, sans-serif"),
			glyph_font_px: 14.0,
		}
	}
}

/// Radius of `node` in world units.
pub fn node_radius(node: &GraphNode) -> f64 {
	visual_for(&node.kind).radius
}

/// Topmost node under the graph-space point `at`. Later nodes draw on top,
/// so they win ties.
pub fn node_at_position(state: &GraphState, positions: &PositionMap, at: Point) -> Option<String> {
	state
		.nodes
		.iter()
		.rev()
		.find(|node| {
			positions
				.get(&node.id)
				.is_some_and(|p| p.distance(at) <= node_radius(node))
		})
		.map(|node| node.id.clone())
}

/// Renders the complete graph to the canvas.
pub fn render(
	ctx: &CanvasRenderingContext2d,
	manager: &GraphStateManager,
	highlight: &HighlightState,
	theme: &Theme,
) {
	let camera = manager.camera();
	let viewport = camera.viewport();
	let transform = camera.transform();
	let scale = Scaled::new(transform.k);

	draw_background(ctx, viewport.width, viewport.height, theme);

	ctx.save();
	let _ = ctx.translate(transform.tx, transform.ty);
	let _ = ctx.scale(transform.k, transform.k);

	draw_edges(ctx, manager, highlight, theme, &scale);
	draw_nodes(ctx, manager, highlight, theme, &scale);
	if transform.k >= theme.label_min_zoom {
		draw_labels(ctx, manager, highlight, theme, &scale);
	}

	ctx.restore();
}

fn draw_background(ctx: &CanvasRenderingContext2d, width: f64, height: f64, theme: &Theme) {
	let (cx, cy) = (width / 2.0, height / 2.0);
	match ctx.create_radial_gradient(cx, cy, 0.0, cx, cy, width.max(height) * 0.8) {
		Ok(gradient) => {
			let _ = gradient.add_color_stop(0.0, &theme.background_secondary.to_css());
			let _ = gradient.add_color_stop(1.0, &theme.background.to_css());
			#[allow(deprecated)]
			ctx.set_fill_style(&gradient);
		}
		Err(_) => ctx.set_fill_style_str(&theme.background.to_css()),
	}
	ctx.fill_rect(0.0, 0.0, width, height);
}

fn draw_edges(
	ctx: &CanvasRenderingContext2d,
	manager: &GraphStateManager,
	highlight: &HighlightState,
	theme: &Theme,
	scale: &Scaled,
) {
	let state = manager.state();
	let positions = manager.positions();
	let mode = manager.layout_mode();
	let max_t = smooth_step(highlight.max_intensity());
	let _ = ctx.set_line_dash(&js_sys::Array::new());

	for link in &state.links {
		let (Some(a), Some(b)) = (positions.get(&link.source), positions.get(&link.target)) else {
			continue;
		};
		if a.distance(b) < 0.001 {
			continue;
		}
		let (Some(source), Some(target)) = (state.node(&link.source), state.node(&link.target)) else {
			continue;
		};

		let edge_t = smooth_step(highlight.edge_intensity(&link.source, &link.target));
		let dimmed = manager.is_filtered_out(&link.source) || manager.is_filtered_out(&link.target);
		let mut alpha = if edge_t > 0.01 {
			0.7 + 0.3 * edge_t
		} else {
			0.7 - 0.5 * max_t
		};
		if dimmed {
			alpha *= theme.dimmed_alpha;
		}
		let color = theme.edge.lerp(theme.edge_highlight, edge_t);
		ctx.set_stroke_style_str(&color.with_alpha(alpha * color.a).to_css());
		ctx.set_line_width(scale.edge_width * (1.0 + 0.5 * edge_t));

		let (ra, rb) = (node_radius(source), node_radius(target));
		match mode {
			LayoutMode::Force => draw_curved_edge(ctx, a, b, ra, rb),
			LayoutMode::Hierarchical => draw_elbow_edge(ctx, a, b, ra, rb),
		}
	}
}

fn draw_curved_edge(ctx: &CanvasRenderingContext2d, a: Point, b: Point, ra: f64, rb: f64) {
	let (dx, dy) = (b.x - a.x, b.y - a.y);
	let dist = (dx * dx + dy * dy).sqrt();
	let (ux, uy) = (dx / dist, dy / dist);
	let bend = dist * CURVE_TENSION;
	let (mid_x, mid_y) = ((a.x + b.x) / 2.0 - uy * bend, (a.y + b.y) / 2.0 + ux * bend);

	ctx.begin_path();
	ctx.move_to(a.x + ux * ra, a.y + uy * ra);
	ctx.quadratic_curve_to(mid_x, mid_y, b.x - ux * rb, b.y - uy * rb);
	ctx.stroke();
}

/// Parent bottom, down to the middle row, across, then down into the child.
fn draw_elbow_edge(ctx: &CanvasRenderingContext2d, a: Point, b: Point, ra: f64, rb: f64) {
	let (start_y, end_y) = if b.y >= a.y {
		(a.y + ra, b.y - rb)
	} else {
		(a.y - ra, b.y + rb)
	};
	let mid_y = (start_y + end_y) / 2.0;

	ctx.begin_path();
	ctx.move_to(a.x, start_y);
	ctx.line_to(a.x, mid_y);
	ctx.line_to(b.x, mid_y);
	ctx.line_to(b.x, end_y);
	ctx.stroke();
}

fn draw_nodes(
	ctx: &CanvasRenderingContext2d,
	manager: &GraphStateManager,
	highlight: &HighlightState,
	theme: &Theme,
	scale: &Scaled,
) {
	let state = manager.state();
	let positions = manager.positions();
	let max_t = smooth_step(highlight.max_intensity());

	// Plain nodes first, highlighted ones on top.
	for on_top in [false, true] {
		for node in &state.nodes {
			let node_t = smooth_step(highlight.node_intensity(&node.id));
			if (node_t > 0.001) != on_top {
				continue;
			}
			let Some(p) = positions.get(&node.id) else {
				continue;
			};

			let dim = 1.0 - 0.6 * max_t;
			let mut alpha = dim + (1.0 - dim) * node_t;
			if manager.is_filtered_out(&node.id) {
				alpha *= theme.dimmed_alpha;
			}
			let grow = 1.0 + 0.25 * node_t;
			draw_node(ctx, state, node, p, theme, scale, alpha, grow);

			let ring_t = smooth_step(highlight.ring_intensity(&node.id));
			let radius = node_radius(node) * grow;
			if ring_t > 0.01 {
				let color = theme.hover_ring.with_alpha(0.8 * ring_t);
				stroke_ring(ctx, p, radius + scale.ring_gap, color, scale.ring_width);
			}
			if state.selected_node_id.as_deref() == Some(node.id.as_str()) {
				let (gap, width) = (scale.ring_gap * 2.0, scale.ring_width * 1.5);
				stroke_ring(ctx, p, radius + gap, theme.selection_ring, width);
			}
			if state.animation.current_target() == Some(node.id.as_str()) {
				let _ = ctx.set_line_dash(&js_sys::Array::of2(
					&JsValue::from_f64(4.0 / scale.k),
					&JsValue::from_f64(4.0 / scale.k),
				));
				let color = theme.hover_ring.with_alpha(0.5);
				stroke_ring(ctx, p, radius + scale.ring_gap * 3.5, color, scale.ring_width);
				let _ = ctx.set_line_dash(&js_sys::Array::new());
			}
		}
	}
}

#[allow(clippy::too_many_arguments)]
fn draw_node(
	ctx: &CanvasRenderingContext2d,
	state: &GraphState,
	node: &GraphNode,
	p: Point,
	theme: &Theme,
	scale: &Scaled,
	alpha: f64,
	grow: f64,
) {
	let visual = visual_for(&node.kind);
	let radius = visual.radius * grow;
	ctx.set_global_alpha(alpha);

	ctx.begin_path();
	let _ = ctx.arc(p.x, p.y, radius, 0.0, 2.0 * PI);
	match ctx.create_radial_gradient(p.x - radius * 0.3, p.y - radius * 0.3, 0.0, p.x, p.y, radius) {
		Ok(gradient) => {
			let _ = gradient.add_color_stop(0.0, &visual.color.lighten(0.35).to_css());
			let _ = gradient.add_color_stop(1.0, &visual.color.to_css());
			#[allow(deprecated)]
			ctx.set_fill_style(&gradient);
		}
		Err(_) => ctx.set_fill_style_str(&visual.color.to_css()),
	}
	ctx.fill();

	ctx.set_fill_style_str("#ffffff");
	ctx.set_font(&format!("{:.1}px system-ui, sans-serif", scale.glyph_font_px * grow));
	ctx.set_text_align("center");
	ctx.set_text_baseline("middle");
	let _ = ctx.fill_text(visual.glyph, p.x, p.y);

	// Expandable nodes get a +/- badge at the lower right.
	let expanded = state.is_expanded(&node.id);
	if expanded || GraphState::is_expandable(node) {
		let (bx, by) = (p.x + radius * 0.75, p.y + radius * 0.75);
		let badge = radius * 0.35;
		ctx.begin_path();
		let _ = ctx.arc(bx, by, badge, 0.0, 2.0 * PI);
		ctx.set_fill_style_str(&theme.background.to_css());
		ctx.fill();
		ctx.set_stroke_style_str(&theme.expanded_marker.to_css());
		ctx.set_line_width(badge * 0.25);
		ctx.begin_path();
		ctx.move_to(bx - badge * 0.55, by);
		ctx.line_to(bx + badge * 0.55, by);
		if !expanded {
			ctx.move_to(bx, by - badge * 0.55);
			ctx.line_to(bx, by + badge * 0.55);
		}
		ctx.stroke();
	}

	ctx.set_global_alpha(1.0);
}

fn stroke_ring(ctx: &CanvasRenderingContext2d, p: Point, radius: f64, color: Color, width: f64) {
	ctx.begin_path();
	let _ = ctx.arc(p.x, p.y, radius, 0.0, 2.0 * PI);
	ctx.set_stroke_style_str(&color.to_css());
	ctx.set_line_width(width);
	ctx.stroke();
}

fn truncate_label(title: &str) -> String {
	if title.chars().count() <= LABEL_MAX_CHARS {
		return title.to_string();
	}
	let mut short: String = title.chars().take(LABEL_MAX_CHARS - 1).collect();
	short.push('\u{2026}');
	short
}

fn draw_labels(
	ctx: &CanvasRenderingContext2d,
	manager: &GraphStateManager,
	highlight: &HighlightState,
	theme: &Theme,
	scale: &Scaled,
) {
	let state = manager.state();
	let positions = manager.positions();
	let max_t = smooth_step(highlight.max_intensity());
	ctx.set_font(&scale.label_font);
	ctx.set_text_align("center");
	ctx.set_text_baseline("top");

	for node in &state.nodes {
		let Some(p) = positions.get(&node.id) else {
			continue;
		};
		let node_t = smooth_step(highlight.node_intensity(&node.id));
		let mut alpha = (1.0 - 0.7 * max_t) + 0.7 * max_t * node_t;
		if manager.is_filtered_out(&node.id) {
			alpha *= theme.dimmed_alpha;
		}
		let y = p.y + node_radius(node) + 4.0 / scale.k;

		ctx.set_global_alpha(alpha);
		ctx.set_fill_style_str(&theme.label.to_css());
		let _ = ctx.fill_text(&truncate_label(&node.title), p.x, y);

		let score = node.reranked_score.or(node.similarity_score);
		if let Some(score) = score {
			ctx.set_fill_style_str(&theme.label.with_alpha(0.6).to_css());
			let _ = ctx.fill_text(&format!("{score:.2}"), p.x, y + 14.0 / scale.k);
		}
	}
	ctx.set_global_alpha(1.0);
}
