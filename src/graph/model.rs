use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// What a node stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
	/// A subject heading from the thesaurus.
	Subject,
	/// A book attached to a subject.
	Book,
}

/// Where a node sits in the exploration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
	/// Root of the current exploration.
	Seed,
	/// Neighbors already fetched.
	Expanded,
	/// Fetched but not yet expanded.
	Neighbor,
}

/// Transient layout reported by the renderer. Never persisted.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NodeLayout {
	/// Graph-space x.
	pub x: f64,
	/// Graph-space y.
	pub y: f64,
	/// Set once the user dragged the node there.
	pub pinned: bool,
}

/// A vertex of the relation graph.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
	/// Backend node id, unique within a graph.
	pub id: String,
	/// Subject or book.
	pub kind: NodeKind,
	/// Display label.
	pub label: String,
	/// Short definition; empty strings are stored as `None`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub definition: Option<String>,
	/// Current role in the exploration.
	pub role: NodeRole,
	/// Last position the renderer reported.
	#[serde(skip)]
	pub layout: Option<NodeLayout>,
}

impl Node {
	/// A subject node with the given role.
	pub fn subject(
		id: impl Into<String>,
		label: impl Into<String>,
		definition: Option<String>,
		role: NodeRole,
	) -> Self {
		Self {
			id: id.into(),
			kind: NodeKind::Subject,
			label: label.into(),
			definition: definition.filter(|d| !d.is_empty()),
			role,
			layout: None,
		}
	}

	/// A book node hanging off a subject.
	pub fn book(id: impl Into<String>, label: impl Into<String>, definition: Option<String>) -> Self {
		Self {
			kind: NodeKind::Book,
			..Self::subject(id, label, definition, NodeRole::Neighbor)
		}
	}
}

// Layout is view state and does not take part in equality.
impl PartialEq for Node {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
			&& self.kind == other.kind
			&& self.label == other.label
			&& self.definition == other.definition
			&& self.role == other.role
	}
}

impl Eq for Node {}

/// Unordered endpoint pair; `(a, b)` and `(b, a)` produce the same key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey(String, String);

impl EdgeKey {
	/// Key for the pair, in either order.
	pub fn new(a: &str, b: &str) -> Self {
		if a <= b {
			Self(a.to_string(), b.to_string())
		} else {
			Self(b.to_string(), a.to_string())
		}
	}

	/// Whether `id` is one of the endpoints.
	pub fn touches(&self, id: &str) -> bool {
		self.0 == id || self.1 == id
	}
}

/// A relation between two nodes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
	/// Endpoint the backend listed first.
	pub source_id: String,
	/// Other endpoint.
	pub target_id: String,
	/// `broader`, `narrower`, `related`, `subject_book`, ...
	pub relation_type: String,
	/// Backend extras, passed through untouched.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub metadata: Option<serde_json::Value>,
}

impl Edge {
	/// Edge without metadata.
	pub fn new(
		source_id: impl Into<String>,
		target_id: impl Into<String>,
		relation_type: impl Into<String>,
	) -> Self {
		Self {
			source_id: source_id.into(),
			target_id: target_id.into(),
			relation_type: relation_type.into(),
			metadata: None,
		}
	}

	/// Direction-free key of this edge.
	pub fn key(&self) -> EdgeKey {
		EdgeKey::new(&self.source_id, &self.target_id)
	}
}

/// Net-new nodes and edges produced by one merge.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GraphDelta {
	/// Nodes that were not in the graph before.
	pub nodes: Vec<Node>,
	/// Edges that were not in the graph before.
	pub edges: Vec<Edge>,
}

impl GraphDelta {
	/// True when the merge added nothing.
	/// True when there are no nodes.
	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty() && self.edges.is_empty()
	}
}

/// Cumulative node/edge set of one exploration session.
///
/// Only the manager mutates it; everyone else works on snapshots. Every edge
/// endpoint is a present node and every expanded id is a present node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GraphState {
	nodes: IndexMap<String, Node>,
	edges: IndexMap<EdgeKey, Edge>,
	expanded_ids: IndexSet<String>,
}

impl GraphState {
	/// Nodes in insertion order.
	pub fn nodes(&self) -> impl Iterator<Item = &Node> {
		self.nodes.values()
	}

	/// Edges in insertion order.
	pub fn edges(&self) -> impl Iterator<Item = &Edge> {
		self.edges.values()
	}

	/// Ids whose neighbors have been merged.
	pub fn expanded_ids(&self) -> impl Iterator<Item = &str> {
		self.expanded_ids.iter().map(String::as_str)
	}

	/// Node by id.
	pub fn node(&self, id: &str) -> Option<&Node> {
		self.nodes.get(id)
	}

	/// Whether `id` is in the graph.
	pub fn contains_node(&self, id: &str) -> bool {
		self.nodes.contains_key(id)
	}

	/// Whether any edge joins `a` and `b`, in either direction.
	pub fn contains_edge(&self, a: &str, b: &str) -> bool {
		self.edges.contains_key(&EdgeKey::new(a, b))
	}

	/// Whether `id` has been expanded.
	pub fn is_expanded(&self, id: &str) -> bool {
		self.expanded_ids.contains(id)
	}

	/// Number of nodes.
	pub fn node_count(&self) -> usize {
		self.nodes.len()
	}

	/// Number of edges.
	pub fn edge_count(&self) -> usize {
		self.edges.len()
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	/// Inserts the node unless its id is taken. Existing entries win.
	pub(crate) fn insert_node(&mut self, node: Node) -> bool {
		if self.nodes.contains_key(&node.id) {
			return false;
		}
		self.nodes.insert(node.id.clone(), node);
		true
	}

	/// Inserts the edge if both endpoints exist and the pair is new.
	pub(crate) fn insert_edge(&mut self, edge: Edge) -> bool {
		if !self.nodes.contains_key(&edge.source_id) || !self.nodes.contains_key(&edge.target_id) {
			return false;
		}
		let key = edge.key();
		if self.edges.contains_key(&key) {
			return false;
		}
		self.edges.insert(key, edge);
		true
	}

	/// Records `id` as expanded and promotes its role. Seed stays seed.
	pub(crate) fn mark_expanded(&mut self, id: &str) -> bool {
		let Some(node) = self.nodes.get_mut(id) else {
			return false;
		};
		let promoted = node.role == NodeRole::Neighbor;
		if promoted {
			node.role = NodeRole::Expanded;
		}
		self.expanded_ids.insert(id.to_string()) || promoted
	}

	/// Drops the node, its incident edges and its expanded mark.
	pub(crate) fn remove_node(&mut self, id: &str) -> bool {
		if self.nodes.shift_remove(id).is_none() {
			return false;
		}
		self.edges.retain(|key, _| !key.touches(id));
		self.expanded_ids.shift_remove(id);
		true
	}

	pub(crate) fn set_layout(&mut self, id: &str, layout: NodeLayout) -> bool {
		match self.nodes.get_mut(id) {
			Some(node) => {
				node.layout = Some(layout);
				true
			}
			None => false,
		}
	}

	/// Rebuilds a state from untrusted parts, dropping anything that would
	/// break the endpoint or expanded-subset invariants.
	pub(crate) fn from_parts(
		nodes: Vec<Node>,
		edges: Vec<Edge>,
		expanded_ids: Vec<String>,
	) -> Self {
		let mut state = Self::default();
		for node in nodes {
			state.insert_node(node);
		}
		for edge in edges {
			state.insert_edge(edge);
		}
		for id in expanded_ids {
			if state.nodes.contains_key(&id) {
				state.expanded_ids.insert(id);
			}
		}
		state
	}
}
