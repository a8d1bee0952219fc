use crate::graph::{GraphState, NodeKind, NodeRole};

const SEED_COLOR: &str = "#ff7f0e";
const EXPANDED_COLOR: &str = "#1f77b4";
const NEIGHBOR_COLOR: &str = "#7f7f7f";
const BOOK_COLOR: &str = "#2ca02c";

#[derive(Clone, Debug, PartialEq)]
pub struct GraphNode {
	pub id: String,
	pub label: String,
	pub color: String,
	pub kind: NodeKind,
	pub role: NodeRole,
	/// Last position the user dragged the node to.
	pub pinned_at: Option<(f64, f64)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GraphLink {
	pub source: String,
	pub target: String,
	pub relation: String,
}

/// Draw list for the canvas, derived from a graph snapshot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GraphData {
	pub nodes: Vec<GraphNode>,
	pub links: Vec<GraphLink>,
}

fn color_for(kind: NodeKind, role: NodeRole) -> &'static str {
	match (kind, role) {
		(NodeKind::Book, _) => BOOK_COLOR,
		(_, NodeRole::Seed) => SEED_COLOR,
		(_, NodeRole::Expanded) => EXPANDED_COLOR,
		(_, NodeRole::Neighbor) => NEIGHBOR_COLOR,
	}
}

impl From<&GraphState> for GraphData {
	fn from(state: &GraphState) -> Self {
		let nodes = state
			.nodes()
			.map(|node| GraphNode {
				id: node.id.clone(),
				label: node.label.clone(),
				color: color_for(node.kind, node.role).into(),
				kind: node.kind,
				role: node.role,
				pinned_at: node.layout.filter(|l| l.pinned).map(|l| (l.x, l.y)),
			})
			.collect();
		let links = state
			.edges()
			.map(|edge| GraphLink {
				source: edge.source_id.clone(),
				target: edge.target_id.clone(),
				relation: edge.relation_type.clone(),
			})
			.collect();
		Self { nodes, links }
	}
}
