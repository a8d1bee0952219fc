use std::collections::{HashMap, HashSet};
use std::f64::consts::PI;

use force_graph::{DefaultNodeIdx, EdgeData, ForceGraph, NodeData, SimulationParameters};

use super::types::GraphData;
use crate::graph::{NodeKind, NodeRole, SUBJECT_BOOK_RELATION};

pub const NODE_RADIUS: f64 = 5.0;
pub const HIT_RADIUS: f64 = 12.0;
/// Pointer travel, in screen pixels, below which a press counts as a click.
pub const CLICK_SLOP: f64 = 3.0;
const SPAWN_DISTANCE: f64 = 40.0;

#[derive(Clone, Debug)]
pub struct NodeInfo {
	pub id: String,
	pub label: String,
	pub color: String,
	pub kind: NodeKind,
	pub role: NodeRole,
}

impl Default for NodeInfo {
	fn default() -> Self {
		Self {
			id: String::new(),
			label: String::new(),
			color: String::new(),
			kind: NodeKind::Subject,
			role: NodeRole::Neighbor,
		}
	}
}

impl NodeInfo {
	pub fn radius(&self) -> f64 {
		match (self.kind, self.role) {
			(NodeKind::Book, _) => NODE_RADIUS * 0.8,
			(_, NodeRole::Seed) => NODE_RADIUS * 1.6,
			(_, NodeRole::Expanded) => NODE_RADIUS * 1.2,
			(_, NodeRole::Neighbor) => NODE_RADIUS,
		}
	}
}

/// How a link is stroked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkStyle {
	/// broader / narrower: drawn with an arrow head.
	Hierarchy,
	/// related, cosine_related and anything unknown.
	Association,
	Book,
}

impl LinkStyle {
	fn for_relation(relation: &str) -> Self {
		match relation {
			"broader" | "narrower" => Self::Hierarchy,
			SUBJECT_BOOK_RELATION => Self::Book,
			_ => Self::Association,
		}
	}
}

#[derive(Clone, Debug, Default)]
pub struct ViewTransform {
	pub x: f64,
	pub y: f64,
	pub k: f64,
}

#[derive(Clone, Debug, Default)]
pub struct DragState {
	pub active: bool,
	pub moved: bool,
	pub node_idx: Option<DefaultNodeIdx>,
	pub start_x: f64,
	pub start_y: f64,
	pub node_start_x: f32,
	pub node_start_y: f32,
}

#[derive(Clone, Debug, Default)]
pub struct PanState {
	pub active: bool,
	pub moved: bool,
	pub start_x: f64,
	pub start_y: f64,
	pub transform_start_x: f64,
	pub transform_start_y: f64,
}

#[derive(Clone, Debug, Default)]
pub struct HoverState {
	pub node: Option<DefaultNodeIdx>,
	pub neighbors: HashSet<DefaultNodeIdx>,
	pub highlight_t: f64,
	pub prev_node: Option<DefaultNodeIdx>,
	pub prev_neighbors: HashSet<DefaultNodeIdx>,
	delay_t: f64,
}

pub struct ForceGraphState {
	pub graph: ForceGraph<NodeInfo, ()>,
	pub transform: ViewTransform,
	pub drag: DragState,
	pub pan: PanState,
	pub hover: HoverState,
	pub selected: Option<DefaultNodeIdx>,
	pub width: f64,
	pub height: f64,
	pub animation_running: bool,
	pub flow_time: f64,
	edges: Vec<(DefaultNodeIdx, DefaultNodeIdx)>,
	link_styles: HashMap<(DefaultNodeIdx, DefaultNodeIdx), LinkStyle>,
}

fn simulation() -> ForceGraph<NodeInfo, ()> {
	ForceGraph::new(SimulationParameters {
		force_charge: 150.0,
		force_spring: 0.05,
		force_max: 100.0,
		node_speed: 3000.0,
		damping_factor: 0.9,
	})
}

impl ForceGraphState {
	pub fn new(data: &GraphData, width: f64, height: f64) -> Self {
		let mut state = Self {
			graph: simulation(),
			edges: Vec::new(),
			link_styles: HashMap::new(),
			transform: ViewTransform {
				x: width / 2.0,
				y: height / 2.0,
				k: 1.0,
			},
			drag: DragState::default(),
			pan: PanState::default(),
			hover: HoverState::default(),
			selected: None,
			width,
			height,
			animation_running: true,
			flow_time: 0.0,
		};
		state.rebuild(data, &HashMap::new(), None);
		state
	}

	/// Replaces the drawn graph with `data`, keeping positions of nodes that
	/// survive and spawning new ones next to a placed neighbor.
	pub fn sync(&mut self, data: &GraphData) {
		let mut previous = HashMap::new();
		self.graph.visit_nodes(|node| {
			previous.insert(
				node.data.user_data.id.clone(),
				(node.x(), node.y(), node.data.is_anchor),
			);
		});
		let selected = self.selected.and_then(|idx| self.node_id(idx));
		self.rebuild(data, &previous, selected.as_deref());
	}

	fn rebuild(
		&mut self,
		data: &GraphData,
		previous: &HashMap<String, (f32, f32, bool)>,
		selected: Option<&str>,
	) {
		let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
		for link in &data.links {
			adjacency.entry(&link.source).or_default().push(&link.target);
			adjacency.entry(&link.target).or_default().push(&link.source);
		}

		let mut graph = simulation();
		let mut id_to_idx = HashMap::new();
		let mut placed: HashMap<&str, (f32, f32)> = HashMap::new();
		let count = data.nodes.len().max(1);

		for (i, node) in data.nodes.iter().enumerate() {
			let angle = (i as f64) * 2.0 * PI / count as f64;
			let (x, y, is_anchor) = if let Some(&(x, y, anchor)) = previous.get(&node.id) {
				(x, y, anchor)
			} else if let Some((x, y)) = node.pinned_at {
				(x as f32, y as f32, true)
			} else if let Some(&(px, py)) = adjacency
				.get(node.id.as_str())
				.and_then(|partners| partners.iter().find_map(|p| placed.get(p)))
			{
				(
					px + (SPAWN_DISTANCE * angle.cos()) as f32,
					py + (SPAWN_DISTANCE * angle.sin()) as f32,
					false,
				)
			} else {
				(
					(100.0 * angle.cos()) as f32,
					(100.0 * angle.sin()) as f32,
					false,
				)
			};
			placed.insert(&node.id, (x, y));

			let idx = graph.add_node(NodeData {
				x,
				y,
				mass: 10.0,
				is_anchor,
				user_data: NodeInfo {
					id: node.id.clone(),
					label: node.label.clone(),
					color: node.color.clone(),
					kind: node.kind,
					role: node.role,
				},
			});
			id_to_idx.insert(node.id.as_str(), idx);
		}

		let mut edges = Vec::new();
		let mut link_styles = HashMap::new();
		for link in &data.links {
			if let (Some(&src), Some(&tgt)) = (
				id_to_idx.get(link.source.as_str()),
				id_to_idx.get(link.target.as_str()),
			) {
				graph.add_edge(src, tgt, EdgeData::default());
				edges.push((src, tgt));
				link_styles.insert((src, tgt), LinkStyle::for_relation(&link.relation));
			}
		}

		self.graph = graph;
		self.edges = edges;
		self.link_styles = link_styles;
		self.selected = selected.and_then(|id| id_to_idx.get(id).copied());
		self.drag = DragState::default();
		self.hover = HoverState::default();
	}

	pub fn link_style(&self, src: DefaultNodeIdx, tgt: DefaultNodeIdx) -> LinkStyle {
		self.link_styles
			.get(&(src, tgt))
			.copied()
			.unwrap_or(LinkStyle::Association)
	}

	pub fn node_id(&self, idx: DefaultNodeIdx) -> Option<String> {
		let mut found = None;
		self.graph.visit_nodes(|node| {
			if node.index() == idx {
				found = Some(node.data.user_data.id.clone());
			}
		});
		found
	}

	/// Graph-space position of a node.
	pub fn node_position(&self, idx: DefaultNodeIdx) -> Option<(f64, f64)> {
		let mut found = None;
		self.graph.visit_nodes(|node| {
			if node.index() == idx {
				found = Some((node.x() as f64, node.y() as f64));
			}
		});
		found
	}

	pub fn screen_to_graph(&self, sx: f64, sy: f64) -> (f64, f64) {
		(
			(sx - self.transform.x) / self.transform.k,
			(sy - self.transform.y) / self.transform.k,
		)
	}

	pub fn node_at_position(&self, sx: f64, sy: f64) -> Option<DefaultNodeIdx> {
		let (gx, gy) = self.screen_to_graph(sx, sy);
		let mut found = None;
		self.graph.visit_nodes(|node| {
			let (dx, dy) = (node.x() as f64 - gx, node.y() as f64 - gy);
			// HIT_RADIUS is in world-space, scales with zoom like nodes
			if (dx * dx + dy * dy).sqrt() < HIT_RADIUS.max(node.data.user_data.radius()) {
				found = Some(node.index());
			}
		});
		found
	}

	pub fn set_hover(&mut self, node: Option<DefaultNodeIdx>) {
		if self.hover.node == node {
			return;
		}
		let was_hovering = self.hover.node.is_some();

		// Save previous state for fade-out
		if was_hovering && node.is_none() {
			self.hover.prev_node = self.hover.node.take();
			self.hover.prev_neighbors = std::mem::take(&mut self.hover.neighbors);
		} else {
			self.hover.prev_node = None;
			self.hover.prev_neighbors.clear();
		}

		self.hover.node = node;
		self.hover.neighbors.clear();

		if let Some(idx) = node {
			if !was_hovering {
				self.hover.delay_t = 0.0;
			}
			for &(src, tgt) in &self.edges {
				if src == idx {
					self.hover.neighbors.insert(tgt);
				} else if tgt == idx {
					self.hover.neighbors.insert(src);
				}
			}
		}
	}

	pub fn is_highlighted(&self, idx: DefaultNodeIdx) -> bool {
		self.hover.node == Some(idx)
			|| self.hover.neighbors.contains(&idx)
			|| self.hover.prev_node == Some(idx)
			|| self.hover.prev_neighbors.contains(&idx)
	}

	pub fn is_hovered(&self, idx: DefaultNodeIdx) -> bool {
		self.hover.node == Some(idx) || self.hover.prev_node == Some(idx)
	}

	pub fn has_active_highlight(&self) -> bool {
		self.hover.node.is_some() || self.hover.prev_node.is_some()
	}

	pub fn tick(&mut self, dt: f32) {
		self.graph.update(dt);
		self.flow_time += dt as f64;

		let (target, delay, speed) = if self.hover.node.is_some() {
			(1.0, 0.08, 1.8)
		} else {
			(0.0, 0.0, 1.26)
		};

		if self.hover.node.is_some() {
			self.hover.delay_t = (self.hover.delay_t + dt as f64).min(delay);
			if self.hover.delay_t >= delay {
				self.hover.highlight_t += (target - self.hover.highlight_t) * speed * dt as f64;
			}
		} else {
			self.hover.highlight_t += (target - self.hover.highlight_t) * speed * dt as f64;
			if self.hover.highlight_t < 0.01 {
				self.hover.highlight_t = 0.0;
				self.hover.prev_node = None;
				self.hover.prev_neighbors.clear();
			}
		}
	}

	pub fn resize(&mut self, width: f64, height: f64) {
		self.width = width;
		self.height = height;
	}
}
