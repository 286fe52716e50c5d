//! Viewport math: bounding boxes, zoom clamping and fit/center transforms.
//!
//! All functions are pure. Graph (world) coordinates map to screen pixels via
//! `screen = world * k + t`.

use std::collections::HashMap;

/// A point in graph coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
	pub x: f64,
	pub y: f64,
}

impl Point {
	pub const fn new(x: f64, y: f64) -> Self {
		Self { x, y }
	}

	pub fn distance(self, other: Point) -> f64 {
		((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
	}
}

/// Node positions keyed by node ID.
///
/// Written only by the active layout engine; everything else reads.
#[derive(Clone, Debug, Default)]
pub struct PositionMap {
	by_id: HashMap<String, Point>,
}

impl PositionMap {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, id: &str) -> Option<Point> {
		self.by_id.get(id).copied()
	}

	pub fn set(&mut self, id: impl Into<String>, point: Point) {
		self.by_id.insert(id.into(), point);
	}

	pub fn remove(&mut self, id: &str) {
		self.by_id.remove(id);
	}

	/// Drop positions for IDs not accepted by `keep`.
	pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
		self.by_id.retain(|id, _| keep(id));
	}

	pub fn ids(&self) -> impl Iterator<Item = &str> {
		self.by_id.keys().map(String::as_str)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, Point)> {
		self.by_id.iter().map(|(id, p)| (id.as_str(), *p))
	}

	pub fn len(&self) -> usize {
		self.by_id.len()
	}

	pub fn is_empty(&self) -> bool {
		self.by_id.is_empty()
	}
}

/// Axis-aligned bounding box in graph coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
	pub min_x: f64,
	pub min_y: f64,
	pub max_x: f64,
	pub max_y: f64,
}

impl Bounds {
	pub fn width(&self) -> f64 {
		self.max_x - self.min_x
	}

	pub fn height(&self) -> f64 {
		self.max_y - self.min_y
	}
}

/// Visible area of the canvas in screen pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportRect {
	pub width: f64,
	pub height: f64,
}

impl ViewportRect {
	pub const fn new(width: f64, height: f64) -> Self {
		Self { width, height }
	}

	pub fn center(&self) -> Point {
		Point::new(self.width / 2.0, self.height / 2.0)
	}
}

/// Pan and zoom transform applied to the whole graph.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
	/// Zoom factor.
	pub k: f64,
	pub tx: f64,
	pub ty: f64,
}

impl Default for Transform {
	fn default() -> Self {
		Self {
			k: 1.0,
			tx: 0.0,
			ty: 0.0,
		}
	}
}

impl Transform {
	pub fn screen_to_graph(&self, sx: f64, sy: f64) -> Point {
		Point::new((sx - self.tx) / self.k, (sy - self.ty) / self.k)
	}

	/// Zoom by `factor` keeping the screen point `(sx, sy)` fixed.
	pub fn zoom_around(&self, sx: f64, sy: f64, factor: f64, limits: (f64, f64)) -> Self {
		let k = clamp_scale(self.k * factor, limits.0, limits.1);
		let ratio = k / self.k;
		Self {
			k,
			tx: sx - (sx - self.tx) * ratio,
			ty: sy - (sy - self.ty) * ratio,
		}
	}
}

/// Minimum span used for degenerate bounds, in graph units.
const MIN_FIT_SPAN: f64 = 100.0;

/// Bounding box of the positions of `ids`, or `None` when none resolves.
pub fn compute_bounds<'a>(
	positions: &PositionMap,
	ids: impl IntoIterator<Item = &'a str>,
) -> Option<Bounds> {
	ids.into_iter()
		.filter_map(|id| positions.get(id))
		.fold(None, |acc: Option<Bounds>, p| {
			Some(match acc {
				None => Bounds {
					min_x: p.x,
					min_y: p.y,
					max_x: p.x,
					max_y: p.y,
				},
				Some(b) => Bounds {
					min_x: b.min_x.min(p.x),
					min_y: b.min_y.min(p.y),
					max_x: b.max_x.max(p.x),
					max_y: b.max_y.max(p.y),
				},
			})
		})
}

pub fn clamp_scale(k: f64, min: f64, max: f64) -> f64 {
	k.clamp(min, max)
}

/// Scale and translation that frame `bounds` (plus `padding` per side) in the viewport.
pub fn compute_fit_transform(
	viewport: ViewportRect,
	bounds: Bounds,
	padding: f64,
	scale_limits: (f64, f64),
) -> Transform {
	let width = bounds.width().max(MIN_FIT_SPAN);
	let height = bounds.height().max(MIN_FIT_SPAN);
	let scale_x = viewport.width / (width + padding * 2.0);
	let scale_y = viewport.height / (height + padding * 2.0);
	let k = clamp_scale(scale_x.min(scale_y), scale_limits.0, scale_limits.1);

	Transform {
		k,
		tx: viewport.width / 2.0 - (bounds.min_x + width / 2.0) * k,
		ty: viewport.height / 2.0 - (bounds.min_y + height / 2.0) * k,
	}
}

/// Translation that puts `point` in the middle of the viewport at scale `k`.
pub fn compute_center_transform(viewport: ViewportRect, point: Point, k: f64) -> Transform {
	let center = viewport.center();
	Transform {
		k,
		tx: center.x - point.x * k,
		ty: center.y - point.y * k,
	}
}

/// Fit the given node IDs, or `None` when there is nothing positioned to fit.
pub fn fit_ids<'a>(
	viewport: ViewportRect,
	positions: &PositionMap,
	ids: impl IntoIterator<Item = &'a str>,
	padding: f64,
	scale_limits: (f64, f64),
) -> Option<Transform> {
	let bounds = compute_bounds(positions, ids)?;
	Some(compute_fit_transform(viewport, bounds, padding, scale_limits))
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;

	use super::*;

	const LIMITS: (f64, f64) = (0.1, 3.0);

	fn positions(points: &[(&str, f64, f64)]) -> PositionMap {
		let mut map = PositionMap::new();
		for &(id, x, y) in points {
			map.set(id, Point::new(x, y));
		}
		map
	}

	#[test]
	fn bounds_of_nothing_is_none() {
		let map = positions(&[("a", 1.0, 2.0)]);
		assert_eq!(compute_bounds(&map, []), None);
		assert_eq!(compute_bounds(&map, ["missing"]), None);
	}

	#[test]
	fn bounds_skip_unresolved_ids() {
		let map = positions(&[("a", -10.0, 5.0), ("b", 30.0, -20.0)]);
		let b = compute_bounds(&map, ["a", "ghost", "b"]).unwrap();
		assert_eq!(
			b,
			Bounds {
				min_x: -10.0,
				min_y: -20.0,
				max_x: 30.0,
				max_y: 5.0
			}
		);
	}

	#[test]
	fn fit_single_point_uses_minimum_span() {
		let viewport = ViewportRect::new(800.0, 600.0);
		let bounds = Bounds {
			min_x: 0.0,
			min_y: 0.0,
			max_x: 0.0,
			max_y: 0.0,
		};
		let t = compute_fit_transform(viewport, bounds, 50.0, LIMITS);
		// 600 / (100 + 100) = 3.0 on y, 800 / 200 = 4.0 on x.
		assert_eq!(t.k, 3.0);
		assert_eq!(t.tx, 400.0 - 50.0 * 3.0);
		assert_eq!(t.ty, 300.0 - 50.0 * 3.0);
	}

	#[test]
	fn fit_clamps_to_minimum_scale() {
		let viewport = ViewportRect::new(100.0, 100.0);
		let bounds = Bounds {
			min_x: 0.0,
			min_y: 0.0,
			max_x: 100_000.0,
			max_y: 100.0,
		};
		assert_eq!(compute_fit_transform(viewport, bounds, 0.0, LIMITS).k, 0.1);
	}

	#[test]
	fn center_transform_puts_point_mid_screen() {
		let viewport = ViewportRect::new(800.0, 600.0);
		let t = compute_center_transform(viewport, Point::new(10.0, -20.0), 2.0);
		assert_eq!(t.tx + 10.0 * t.k, 400.0);
		assert_eq!(t.ty - 20.0 * t.k, 300.0);
	}

	#[test]
	fn fit_ids_short_circuits_on_empty_selection() {
		let map = positions(&[("a", 0.0, 0.0)]);
		assert!(fit_ids(ViewportRect::new(800.0, 600.0), &map, [], 120.0, LIMITS).is_none());
	}

	#[test]
	fn zoom_around_keeps_anchor_fixed() {
		let t = Transform {
			k: 1.0,
			tx: 40.0,
			ty: -15.0,
		};
		let before = t.screen_to_graph(200.0, 100.0);
		let zoomed = t.zoom_around(200.0, 100.0, 1.2, LIMITS);
		let after = zoomed.screen_to_graph(200.0, 100.0);
		assert!((before.x - after.x).abs() < 1e-9);
		assert!((before.y - after.y).abs() < 1e-9);
	}

	proptest! {
		#[test]
		fn fit_transform_is_deterministic(
			w in 50.0f64..2000.0,
			h in 50.0f64..2000.0,
			x0 in -5000.0f64..5000.0,
			y0 in -5000.0f64..5000.0,
			dx in 0.0f64..3000.0,
			dy in 0.0f64..3000.0,
			padding in 0.0f64..200.0,
		) {
			let viewport = ViewportRect::new(w, h);
			let bounds = Bounds { min_x: x0, min_y: y0, max_x: x0 + dx, max_y: y0 + dy };
			let first = compute_fit_transform(viewport, bounds, padding, LIMITS);
			let second = compute_fit_transform(viewport, bounds, padding, LIMITS);
			prop_assert_eq!(first, second);
			prop_assert!(first.k >= LIMITS.0 && first.k <= LIMITS.1);
		}
	}
}
