//! Leptos component wrapping the knowledge graph canvas.
//!
//! The component owns a canvas plus a small toolbar (search box, layout
//! toggle, fit and zoom buttons, level expansion). An animation loop runs via
//! `requestAnimationFrame`, advancing layout, camera, highlight and debounced
//! filters each frame and redrawing only when something asked for it. Fetches
//! run on `spawn_local` and re-enter the state manager when they resolve.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use leptos::prelude::*;
use log::{debug, info, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, MouseEvent, WheelEvent, Window};

use super::config::GraphConfig;
use super::error::GraphError;
use super::highlight::HighlightState;
use super::layout::LayoutMode;
use super::render::{self, node_at_position};
use super::source::{GraphSource, HttpGraphSource};
use super::state::{CollapseOutcome, ExpandOutcome, FilterOutcome, GraphStateManager, ReconcileStep};
use super::types::GraphData;
use super::viewport::ViewportRect;
use super::visual::Theme;

/// Zoom factor of the toolbar buttons.
const ZOOM_STEP: f64 = 1.2;
/// Pointer travel (px) that turns a press into a drag.
const DRAG_THRESHOLD: f64 = 3.0;
/// Frame time cap, so a backgrounded tab doesn't explode the simulation.
const MAX_DT: f64 = 0.05;

#[derive(Clone, Debug)]
struct DragState {
	id: String,
	start_x: f64,
	start_y: f64,
	moved: bool,
}

#[derive(Clone, Copy, Debug)]
struct PanState {
	last_x: f64,
	last_y: f64,
	moved: bool,
}

/// Everything the event handlers and the animation loop share.
struct ViewContext {
	manager: GraphStateManager,
	highlight: HighlightState,
	theme: Theme,
	ctx: CanvasRenderingContext2d,
	drag: Option<DragState>,
	pan: Option<PanState>,
	last_frame_ms: Option<f64>,
	/// Target expanded set while stepping through a level expand or collapse-all.
	desired: Option<HashSet<String>>,
}

impl ViewContext {
	/// Drop highlight entries for nodes that left the graph.
	fn sync_highlight(&mut self) {
		let state = self.manager.state();
		self.highlight.retain(|id| state.contains(id));
	}
}

type SharedContext = Rc<RefCell<Option<ViewContext>>>;
type SharedSource = Option<Rc<HttpGraphSource>>;

fn now_ms() -> f64 {
	js_sys::Date::now()
}

fn canvas_point(canvas: &HtmlCanvasElement, ev: &MouseEvent) -> (f64, f64) {
	let rect = canvas.get_bounding_client_rect();
	(ev.client_x() as f64 - rect.left(), ev.client_y() as f64 - rect.top())
}

fn window_size(window: &Window) -> Option<(f64, f64)> {
	let w = window.inner_width().ok()?.as_f64()?;
	let h = window.inner_height().ok()?.as_f64()?;
	Some((w, h))
}

fn spawn_children_fetch(context: SharedContext, source: SharedSource, id: String) {
	spawn_local(async move {
		let result = match source.as_deref() {
			Some(source) => source.fetch_children(&id).await,
			None => Err(GraphError::Network("no graph endpoint configured".into())),
		};
		let mut guard = context.borrow_mut();
		let Some(c) = guard.as_mut() else {
			return;
		};
		match c.manager.finish_expand(&id, result, now_ms()) {
			Ok(ExpandOutcome::Expanded { added }) => {
				debug!("kb-graph: expanded `{id}` with {added} new nodes");
				c.manager.fit_expanded(&id);
			}
			Ok(_) => {}
			// Stop stepping toward a target that can't be reached.
			Err(_) => c.desired = None,
		}
	});
}

fn spawn_remote_search(context: SharedContext, source: SharedSource, query: String) {
	let Some(source) = source else {
		warn!("kb-graph: remote search needs `api_base_url`");
		return;
	};
	spawn_local(async move {
		match source.search(&query).await {
			Ok(data) => {
				if let Some(c) = context.borrow_mut().as_mut() {
					if !c.manager.apply_remote_results(&query, data) {
						return;
					}
					c.sync_highlight();
					c.manager.fit_all();
				}
			}
			Err(err) => warn!("kb-graph: remote search for `{query}` failed: {err}"),
		}
	});
}

fn spawn_initial_fetch(context: SharedContext, source: Rc<HttpGraphSource>, query: String) {
	spawn_local(async move {
		match source.fetch_initial(&query).await {
			Ok(data) => {
				if let Some(c) = context.borrow_mut().as_mut() {
					c.manager.ingest(data);
					c.sync_highlight();
					c.manager.fit_all();
				}
			}
			Err(err) => warn!("kb-graph: initial graph fetch failed: {err}"),
		}
	});
}

/// Select `id`, fly to it and toggle its expansion. Returns the node to fetch
/// children for, if any.
fn activate_node(c: &mut ViewContext, id: &str, now: f64) -> Option<String> {
	c.manager.select(Some(id));
	c.manager.center_on(id);

	if c.manager.state().is_expanded(id) {
		match c.manager.collapse_node(id, now) {
			Ok(CollapseOutcome::Collapsed { removed }) => {
				debug!("kb-graph: collapsed `{id}`, {removed} nodes hidden");
				c.sync_highlight();
			}
			Ok(_) => {}
			Err(err) => warn!("kb-graph: collapse failed: {err}"),
		}
		return None;
	}

	match c.manager.begin_expand(id, now) {
		Ok(ExpandOutcome::NeedsFetch) => Some(id.to_string()),
		Ok(ExpandOutcome::Expanded { .. }) => {
			c.manager.fit_expanded(id);
			None
		}
		Ok(_) => None,
		Err(err) => {
			warn!("kb-graph: expand failed: {err}");
			None
		}
	}
}

/// One animation frame. Returns work that must start outside the borrow.
fn frame(c: &mut ViewContext) -> (Vec<String>, Option<String>) {
	let now = now_ms();
	let dt = c
		.last_frame_ms
		.map(|last| ((now - last) / 1000.0).clamp(0.0, MAX_DT))
		.unwrap_or(1.0 / 60.0);
	c.last_frame_ms = Some(now);

	let had_animation = c.manager.state().animation.is_animating();
	c.manager.tick(dt, now);
	if had_animation && !c.manager.state().animation.is_animating() {
		c.sync_highlight();
	}
	if c.highlight.tick(dt) {
		c.manager.request_render();
	}

	let remote = match c.manager.poll_filter(now) {
		Some(FilterOutcome::Remote(query)) => Some(query),
		Some(FilterOutcome::Local(matches)) => {
			debug!("kb-graph: filter matched {} nodes", matches.len());
			None
		}
		Some(FilterOutcome::Cleared) | None => None,
	};

	let mut fetches = Vec::new();
	if let Some(desired) = c.desired.take() {
		match c.manager.reconcile(&desired, now) {
			Ok(Some(step)) => {
				if let ReconcileStep::Expand(id, ExpandOutcome::NeedsFetch) = step {
					fetches.push(id);
				}
				c.sync_highlight();
				c.desired = Some(desired);
			}
			Ok(None) if c.manager.state().animation.is_animating() => c.desired = Some(desired),
			Ok(None) => info!("kb-graph: expansion target reached"),
			Err(err) => warn!("kb-graph: reconcile failed: {err}"),
		}
	}

	if c.manager.take_render_request() {
		render::render(&c.ctx, &c.manager, &c.highlight, &c.theme);
	}
	(fetches, remote)
}

/// Renders an interactive knowledge graph on a canvas element.
///
/// `data` seeds the graph and re-seeds it whenever the signal changes. When
/// `config.api_base_url` is set, expansion fetches children from that
/// endpoint, and `initial_query` (if given) loads the first graph from it.
#[component]
pub fn KnowledgeGraph(
	#[prop(into)] data: Signal<GraphData>,
	#[prop(optional)] config: Option<GraphConfig>,
	#[prop(optional, into)] initial_query: Option<String>,
	#[prop(default = false)] fullscreen: bool,
	#[prop(default = None)] width: Option<f64>,
	#[prop(default = None)] height: Option<f64>,
) -> impl IntoView {
	let config = config.unwrap_or_default();
	let source: SharedSource = config
		.api_base_url
		.clone()
		.map(|base| Rc::new(HttpGraphSource::new(base, config.expand_depth, config.expand_limit)));

	let canvas_ref = NodeRef::<leptos::html::Canvas>::new();
	let context: SharedContext = Rc::new(RefCell::new(None));
	let animate: Rc<RefCell<Option<Closure<dyn FnMut()>>>> = Rc::new(RefCell::new(None));
	let resize_cb: Rc<RefCell<Option<Closure<dyn FnMut()>>>> = Rc::new(RefCell::new(None));
	let (layout_mode, set_layout_mode) = signal(LayoutMode::default());

	let (context_init, animate_init, resize_init, source_init) =
		(context.clone(), animate.clone(), resize_cb.clone(), source.clone());
	Effect::new(move |_| {
		let Some(canvas) = canvas_ref.get() else {
			return;
		};
		if context_init.borrow().is_some() {
			return;
		}
		let canvas: HtmlCanvasElement = canvas.into();
		let Some(window) = web_sys::window() else {
			warn!("kb-graph: no window, graph view disabled");
			return;
		};

		let parent_size = |get: fn(&web_sys::Element) -> i32, fallback: f64| {
			canvas
				.parent_element()
				.map(|p| get(&p) as f64)
				.filter(|v| *v > 0.0)
				.unwrap_or(fallback)
		};
		let (w, h) = match (fullscreen, window_size(&window)) {
			(true, Some(size)) => size,
			_ => (
				width.unwrap_or_else(|| parent_size(web_sys::Element::client_width, 800.0)),
				height.unwrap_or_else(|| parent_size(web_sys::Element::client_height, 600.0)),
			),
		};
		canvas.set_width(w as u32);
		canvas.set_height(h as u32);

		let ctx: CanvasRenderingContext2d = match canvas.get_context("2d") {
			Ok(Some(ctx)) => match ctx.dyn_into() {
				Ok(ctx) => ctx,
				Err(_) => return,
			},
			_ => {
				warn!("kb-graph: canvas 2d context unavailable");
				return;
			}
		};

		let mut manager = GraphStateManager::new(config.clone(), ViewportRect::new(w, h));
		manager.ingest(data.get_untracked());
		manager.fit_all();
		*context_init.borrow_mut() = Some(ViewContext {
			manager,
			highlight: HighlightState::default(),
			theme: Theme::default(),
			ctx,
			drag: None,
			pan: None,
			last_frame_ms: None,
			desired: None,
		});

		if let (Some(source), Some(query)) = (
			source_init.clone(),
			initial_query.clone().filter(|q| !q.trim().is_empty()),
		) {
			spawn_initial_fetch(context_init.clone(), source, query);
		}

		if fullscreen {
			let (context_resize, canvas_resize) = (context_init.clone(), canvas.clone());
			*resize_init.borrow_mut() = Some(Closure::new(move || {
				let Some((nw, nh)) = web_sys::window().as_ref().and_then(window_size) else {
					return;
				};
				canvas_resize.set_width(nw as u32);
				canvas_resize.set_height(nh as u32);
				if let Some(c) = context_resize.borrow_mut().as_mut() {
					c.manager.camera_mut().resize(nw, nh);
				}
			}));
			if let Some(cb) = resize_init.borrow().as_ref() {
				let _ = window.add_event_listener_with_callback("resize", cb.as_ref().unchecked_ref());
			}
		}

		let (context_anim, animate_inner, source_anim) =
			(context_init.clone(), animate_init.clone(), source_init.clone());
		*animate_init.borrow_mut() = Some(Closure::new(move || {
			let work = context_anim.borrow_mut().as_mut().map(frame);
			if let Some((fetches, remote)) = work {
				for id in fetches {
					spawn_children_fetch(context_anim.clone(), source_anim.clone(), id);
				}
				if let Some(query) = remote {
					spawn_remote_search(context_anim.clone(), source_anim.clone(), query);
				}
			}
			if let (Some(window), Some(cb)) = (web_sys::window(), animate_inner.borrow().as_ref()) {
				let _ = window.request_animation_frame(cb.as_ref().unchecked_ref());
			}
		}));
		if let Some(cb) = animate_init.borrow().as_ref() {
			let _ = window.request_animation_frame(cb.as_ref().unchecked_ref());
		}
	});

	let context_data = context.clone();
	Effect::new(move |first: Option<()>| {
		let graph = data.get();
		if first.is_none() {
			return;
		}
		if let Some(c) = context_data.borrow_mut().as_mut() {
			c.manager.ingest(graph);
			c.sync_highlight();
			c.manager.fit_all();
		}
	});

	let context_md = context.clone();
	let on_mousedown = move |ev: MouseEvent| {
		let Some(canvas) = canvas_ref.get() else {
			return;
		};
		let (x, y) = canvas_point(&canvas, &ev);
		if let Some(c) = context_md.borrow_mut().as_mut() {
			let at = c.manager.camera().screen_to_graph(x, y);
			match node_at_position(c.manager.state(), c.manager.positions(), at) {
				Some(id) => {
					c.drag = Some(DragState {
						id,
						start_x: x,
						start_y: y,
						moved: false,
					})
				}
				None => {
					c.pan = Some(PanState {
						last_x: x,
						last_y: y,
						moved: false,
					})
				}
			}
		}
	};

	let context_mm = context.clone();
	let on_mousemove = move |ev: MouseEvent| {
		let Some(canvas) = canvas_ref.get() else {
			return;
		};
		let (x, y) = canvas_point(&canvas, &ev);
		let mut guard = context_mm.borrow_mut();
		let Some(c) = guard.as_mut() else {
			return;
		};

		if let Some(drag) = c.drag.as_mut() {
			if !drag.moved && (x - drag.start_x).hypot(y - drag.start_y) > DRAG_THRESHOLD {
				drag.moved = true;
			}
			if drag.moved {
				let at = c.manager.camera().screen_to_graph(x, y);
				c.manager.pin_node(&drag.id, Some(at));
			}
		} else if let Some(pan) = c.pan.as_mut() {
			let (dx, dy) = (x - pan.last_x, y - pan.last_y);
			pan.last_x = x;
			pan.last_y = y;
			pan.moved |= dx.abs() + dy.abs() > 0.0;
			c.manager.camera_mut().pan_by(dx, dy);
		} else {
			let at = c.manager.camera().screen_to_graph(x, y);
			let hovered = node_at_position(c.manager.state(), c.manager.positions(), at);
			if c.manager.hover(hovered.as_deref()) {
				c.highlight
					.set_hover(hovered.as_deref(), &c.manager.state().links);
			}
		}
	};

	let (context_mu, source_mu) = (context.clone(), source.clone());
	let on_mouseup = move |_: MouseEvent| {
		let fetch = {
			let mut guard = context_mu.borrow_mut();
			let Some(c) = guard.as_mut() else {
				return;
			};
			let (drag, pan) = (c.drag.take(), c.pan.take());
			match (drag, pan) {
				(Some(drag), _) if !drag.moved => activate_node(c, &drag.id, now_ms()),
				(None, Some(pan)) if !pan.moved => {
					c.manager.select(None);
					None
				}
				_ => None,
			}
		};
		if let Some(id) = fetch {
			spawn_children_fetch(context_mu.clone(), source_mu.clone(), id);
		}
	};

	let context_ml = context.clone();
	let on_mouseleave = move |_: MouseEvent| {
		if let Some(c) = context_ml.borrow_mut().as_mut() {
			c.drag = None;
			c.pan = None;
			c.manager.hover(None);
			c.highlight.set_hover(None, &[]);
		}
	};

	let context_wh = context.clone();
	let on_wheel = move |ev: WheelEvent| {
		ev.prevent_default();
		let Some(canvas) = canvas_ref.get() else {
			return;
		};
		let (x, y) = canvas_point(&canvas, &ev);
		if let Some(c) = context_wh.borrow_mut().as_mut() {
			let factor = if ev.delta_y() > 0.0 { 0.9 } else { 1.1 };
			c.manager.camera_mut().zoom_at(x, y, factor);
		}
	};

	let context_search = context.clone();
	let on_search = move |ev: leptos::ev::Event| {
		let query = event_target_value(&ev);
		if let Some(c) = context_search.borrow_mut().as_mut() {
			if let Some(FilterOutcome::Cleared) = c.manager.set_filter(&query, now_ms()) {
				debug!("kb-graph: filter cleared");
			}
		}
	};

	let with_manager = {
		let context = context.clone();
		move |f: &dyn Fn(&mut ViewContext)| {
			if let Some(c) = context.borrow_mut().as_mut() {
				f(c);
			}
		}
	};
	let toggle_layout = {
		let with_manager = with_manager.clone();
		move |_: MouseEvent| {
			let next = layout_mode.get_untracked().toggled();
			with_manager(&|c| {
				c.manager.set_layout_mode(next);
				c.manager.fit_all();
			});
			set_layout_mode.set(next);
		}
	};
	let fit_all = {
		let with_manager = with_manager.clone();
		move |_: MouseEvent| with_manager(&|c| {
			c.manager.fit_all();
		})
	};
	let zoom_in = {
		let with_manager = with_manager.clone();
		move |_: MouseEvent| with_manager(&|c| c.manager.zoom_step(ZOOM_STEP))
	};
	let zoom_out = {
		let with_manager = with_manager.clone();
		move |_: MouseEvent| with_manager(&|c| c.manager.zoom_step(1.0 / ZOOM_STEP))
	};
	let expand_level = {
		let with_manager = with_manager.clone();
		move |_: MouseEvent| {
			with_manager(&|c| {
				let state = c.manager.state();
				let mut desired: HashSet<String> =
					state.expanded_children.keys().cloned().collect();
				desired.extend(state.nodes_to_expand_next_level());
				c.desired = Some(desired);
			})
		}
	};
	let collapse_all = move |_: MouseEvent| with_manager(&|c| c.desired = Some(HashSet::new()));

	view! {
		<div class="kb-graph" style="position: relative; width: 100%; height: 100%;">
			<canvas
				node_ref=canvas_ref
				class="kb-graph-canvas"
				on:mousedown=on_mousedown
				on:mousemove=on_mousemove
				on:mouseup=on_mouseup
				on:mouseleave=on_mouseleave
				on:wheel=on_wheel
				style="display: block; cursor: grab;"
			/>
			<div class="kb-graph-toolbar">
				<input
					type="search"
					class="kb-graph-search"
					placeholder="Search: tag:urgent title:\"intro\" ..."
					on:input=on_search
				/>
				<button on:click=toggle_layout>
					{move || match layout_mode.get() {
						LayoutMode::Force => "Tree layout",
						LayoutMode::Hierarchical => "Force layout",
					}}
				</button>
				<button on:click=fit_all>"Fit"</button>
				<button on:click=zoom_in>"+"</button>
				<button on:click=zoom_out>"\u{2212}"</button>
				<button on:click=expand_level>"Expand level"</button>
				<button on:click=collapse_all>"Collapse all"</button>
			</div>
		</div>
	}
}
