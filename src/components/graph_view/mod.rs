//! Knowledge graph visualization component.
//!
//! Renders documents, their sections and their metadata as an interactive
//! graph on an HTML canvas with:
//! - Force-directed and hierarchical layouts that can be switched live
//! - Click-to-expand children fetched on demand, collapse with subtree removal
//! - A fielded search box that dims non-matching nodes or queries the backend
//! - Animated camera moves that frame whatever was just expanded
//!
//! # Example
//!
//! ```ignore
//! use kb_graph::{GraphConfig, GraphData, GraphNode, GraphLink, KnowledgeGraph};
//!
//! let data = GraphData::new(
//!     vec![GraphNode::new("doc-1", "Handbook", "document")],
//!     vec![],
//! );
//! let config = GraphConfig {
//!     api_base_url: Some("/api/graph".into()),
//!     ..GraphConfig::default()
//! };
//!
//! view! { <KnowledgeGraph data=data config=config fullscreen=true /> }
//! ```

mod camera;
mod component;
pub mod config;
mod error;
pub mod filter;
mod hierarchy;
mod highlight;
pub mod layout;
pub mod metadata;
pub mod normalize;
pub mod query;
mod render;
mod simulation;
pub mod source;
pub mod state;
mod types;
pub mod viewport;
pub mod visual;

pub use camera::Camera;
pub use component::KnowledgeGraph;
pub use config::{GraphConfig, SearchMode};
pub use error::GraphError;
pub use layout::{LayoutEngine, LayoutMode};
pub use source::{GraphSource, HttpGraphSource};
pub use state::{GraphState, GraphStateManager};
pub use types::{GraphData, GraphLink, GraphNode};
pub use visual::Theme;
