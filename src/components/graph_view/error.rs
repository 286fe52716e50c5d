//! Error type for the fallible edges of the graph view (fetching and decoding).

use thiserror::Error;

/// Errors raised while talking to the external graph data source.
///
/// The layout, search and geometry code never produce these; they degrade to
/// defaults instead.
#[derive(Debug, Error)]
pub enum GraphError {
	#[error("graph endpoint returned HTTP {status}")]
	Http { status: u16 },
	#[error("network error: {0}")]
	Network(String),
	#[error("failed to decode graph payload: {0}")]
	Decode(#[from] serde_json::Error),
	#[error("no browser window available")]
	NoWindow,
	#[error("unknown node `{0}`")]
	UnknownNode(String),
}
