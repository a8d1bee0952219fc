//! REST backend collaborator.

mod http;

use async_trait::async_trait;

pub use http::HttpBackend;

use crate::error::FetchError;
use crate::graph::{Edge, NodeKind};

/// Seed search hit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedCandidate {
	/// Backend node id.
	pub id: String,
	/// Display label.
	pub label: String,
	/// Short definition, if the backend has one.
	pub definition: Option<String>,
}

/// A node as returned by a neighbor query, before merging.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedNode {
	/// Backend node id.
	pub id: String,
	/// Subject or book.
	pub kind: NodeKind,
	/// Display label.
	pub label: String,
	/// Short definition, if any.
	pub definition: Option<String>,
}

/// Nodes and edges around one node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NeighborSet {
	/// Returned nodes, possibly including the queried node itself.
	pub nodes: Vec<FetchedNode>,
	/// Relations between the returned nodes.
	pub edges: Vec<Edge>,
}

/// Something related to a subject, currently books.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelatedEntity {
	/// Stable id, the ISBN for books.
	pub id: String,
	/// Display label.
	pub label: String,
	/// Blurb shown next to the label.
	pub definition: Option<String>,
}

/// Operations the explorer needs from the backend.
#[async_trait(?Send)]
pub trait GraphBackend {
	/// Subjects matching a free-text query.
	async fn search_seed(&self, query: &str) -> Result<Vec<SeedCandidate>, FetchError>;

	/// At most `limit` neighbors of `node_id` with the edges between them.
	async fn neighbors(&self, node_id: &str, limit: usize) -> Result<NeighborSet, FetchError>;

	/// Books related to the subject `node_id`.
	async fn related_entities(
		&self,
		node_id: &str,
		limit: usize,
	) -> Result<Vec<RelatedEntity>, FetchError>;
}
