//! kb-graph: Interactive knowledge graph visualization.
//!
//! This crate provides a WASM-based canvas component that renders documents,
//! their sections and their metadata as a graph, with on-demand expansion
//! from a backend, force-directed and hierarchical layouts, fielded search,
//! and animated pan/zoom.

use leptos::prelude::*;
use leptos_meta::*;
use log::{Level, info, warn};
use wasm_bindgen::JsCast;
use web_sys::HtmlScriptElement;

pub mod components;

pub use components::graph_view::{
	GraphConfig, GraphData, GraphError, GraphLink, GraphNode, GraphSource, HttpGraphSource, KnowledgeGraph,
	LayoutMode, SearchMode,
};

/// Initialize logging and panic hooks for the WASM target.
pub fn init_logging() {
	let _ = console_log::init_with_level(Level::Debug);
	console_error_panic_hook::set_once();
	info!("kb-graph: logging initialized");
}

fn script_by_id(id: &str) -> Option<HtmlScriptElement> {
	let document = web_sys::window()?.document()?;
	document.get_element_by_id(id)?.dyn_into().ok()
}

/// Load graph data from a script element with id="graph-data".
/// Accepts `{ nodes, links }` or the `{ data: { nodes, edges } }` envelope;
/// `links` and `edges` name the same list in either shape.
fn load_graph_data() -> Option<GraphData> {
	let json_text = script_by_id("graph-data")?.text().ok()?;

	match GraphData::from_json(&json_text) {
		Ok(data) => {
			info!(
				"kb-graph: loaded {} nodes, {} links",
				data.nodes.len(),
				data.links.len()
			);
			Some(data)
		}
		Err(e) => {
			warn!("kb-graph: failed to parse graph data: {}", e);
			None
		}
	}
}

/// Load view configuration from a script element with id="graph-config".
///
/// The element's `data-initial-query` attribute, when present, names the
/// search used to fetch the first graph from the backend.
fn load_graph_config() -> (GraphConfig, Option<String>) {
	let Some(script) = script_by_id("graph-config") else {
		return (GraphConfig::default(), None);
	};
	let query = script.get_attribute("data-initial-query");
	let config = match script.text().map(|text| serde_json::from_str::<GraphConfig>(&text)) {
		Ok(Ok(config)) => config,
		Ok(Err(e)) => {
			warn!("kb-graph: failed to parse graph config: {}", e);
			GraphConfig::default()
		}
		Err(_) => GraphConfig::default(),
	};
	(config, query)
}

/// Main application component.
/// Loads graph data and configuration from the DOM and renders the graph view.
#[component]
pub fn App() -> impl IntoView {
	provide_meta_context();

	let graph_data = load_graph_data().unwrap_or_default();
	let graph_signal = Signal::derive(move || graph_data.clone());
	let (config, initial_query) = load_graph_config();

	view! {
		<Html attr:lang="en" attr:dir="ltr" attr:data-theme="dark" />
		<Title text="Knowledge Graph" />
		<Meta charset="UTF-8" />
		<Meta name="viewport" content="width=device-width, initial-scale=1.0" />

		<div class="fullscreen-graph">
			<KnowledgeGraph
				data=graph_signal
				config=config
				initial_query=initial_query.unwrap_or_default()
				fullscreen=true
			/>
			<div class="graph-overlay">
				<h1>"Knowledge Graph"</h1>
				<p class="subtitle">
					"Click a node to expand or collapse it. Drag nodes to reposition. Scroll to zoom."
				</p>
			</div>
		</div>
	}
}
