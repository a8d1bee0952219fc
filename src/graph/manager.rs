use std::cell::RefCell;
use std::collections::HashMap;

use log::{debug, info, warn};

use super::SUBJECT_BOOK_RELATION;
use super::model::{Edge, GraphDelta, GraphState, Node, NodeLayout, NodeRole};
use super::persist::{self, Clock, StateStore};
use super::render::GraphRenderer;
use crate::api::{GraphBackend, NeighborSet, RelatedEntity, SeedCandidate};
use crate::config::{ExplorerConfig, MAX_QUERY_LENGTH};
use crate::error::{GraphError, ValidationError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Fetch {
	Neighbors,
	Books,
}

#[derive(Default)]
struct Inner {
	state: GraphState,
	/// Bumped on every reset; fetches started under an older value are dropped.
	generation: u64,
	in_flight: HashMap<(Fetch, String), u64>,
}

/// Clears an in-flight marker when the fetch finishes or is dropped.
struct InFlightGuard<'a> {
	inner: &'a RefCell<Inner>,
	key: (Fetch, String),
	generation: u64,
	/// Whether the node was in the graph when the fetch started.
	present: bool,
}

impl Drop for InFlightGuard<'_> {
	fn drop(&mut self) {
		let mut inner = self.inner.borrow_mut();
		// a reset may have handed the slot to a newer fetch
		if inner.in_flight.get(&self.key) == Some(&self.generation) {
			inner.in_flight.remove(&self.key);
		}
	}
}

/// Owns the graph of one exploration session.
///
/// All collaborators are injected: the backend answers neighbor and book
/// queries, the store keeps the graph across reloads, the renderer redraws
/// after each mutation, and the clock stamps persisted entries.
pub struct GraphStateManager {
	backend: Box<dyn GraphBackend>,
	store: Box<dyn StateStore>,
	renderer: Box<dyn GraphRenderer>,
	clock: Box<dyn Clock>,
	config: ExplorerConfig,
	inner: RefCell<Inner>,
}

impl GraphStateManager {
	/// Restores the persisted graph if one is fresh, then draws it once.
	pub fn new(
		backend: Box<dyn GraphBackend>,
		store: Box<dyn StateStore>,
		renderer: Box<dyn GraphRenderer>,
		clock: Box<dyn Clock>,
		config: ExplorerConfig,
	) -> Self {
		let state = persist::restore(
			store.as_ref(),
			&config.session_key,
			clock.now_ms(),
			config.state_ttl_ms,
		);
		let manager = Self {
			backend,
			store,
			renderer,
			clock,
			config,
			inner: RefCell::new(Inner {
				state,
				..Inner::default()
			}),
		};
		manager.renderer.render(&manager.inner.borrow().state);
		manager
	}

	/// Limits and keys this manager was built with.
	pub fn config(&self) -> &ExplorerConfig {
		&self.config
	}

	/// Owned copy of the current graph.
	pub fn snapshot(&self) -> GraphState {
		self.inner.borrow().state.clone()
	}

	/// Whether neighbors of `node_id` have been merged already.
	pub fn is_expanded(&self, node_id: &str) -> bool {
		self.inner.borrow().state.is_expanded(node_id)
	}

	/// Looks up seed candidates. Empty or oversized queries never reach the backend.
	pub async fn search_seed(&self, query: &str) -> Result<Vec<SeedCandidate>, GraphError> {
		let query = query.trim();
		if query.is_empty() {
			return Err(ValidationError::EmptyQuery.into());
		}
		if query.chars().count() > MAX_QUERY_LENGTH {
			return Err(ValidationError::QueryTooLong {
				max: MAX_QUERY_LENGTH,
			}
			.into());
		}
		Ok(self.backend.search_seed(query).await?)
	}

	/// Starts a new exploration rooted at `node_id` and expands it.
	pub async fn select_seed(
		&self,
		node_id: &str,
		label: &str,
		definition: Option<String>,
	) -> Result<GraphDelta, GraphError> {
		let node_id = node_id.trim();
		if node_id.is_empty() {
			return Err(ValidationError::EmptyNodeId.into());
		}
		info!("new exploration seeded at {node_id}");
		{
			let mut inner = self.inner.borrow_mut();
			Self::clear(&mut inner);
			let label = if label.is_empty() { node_id } else { label };
			inner
				.state
				.insert_node(Node::subject(node_id, label, definition, NodeRole::Seed));
		}
		self.commit();
		self.expand(node_id, self.config.max_neighbors).await
	}

	/// Fetches up to `max_neighbors` neighbors of `node_id` and merges them.
	///
	/// Returns only what was actually added. On a fetch error the graph is
	/// untouched. If the session is reset, or the node removed, while the
	/// fetch is outstanding the result is dropped and an empty delta is returned.
	pub async fn expand(
		&self,
		node_id: &str,
		max_neighbors: usize,
	) -> Result<GraphDelta, GraphError> {
		let node_id = node_id.trim();
		if node_id.is_empty() {
			return Err(ValidationError::EmptyNodeId.into());
		}
		if max_neighbors == 0 {
			return Err(ValidationError::ZeroLimit.into());
		}
		let limit = ExplorerConfig::clamp_neighbors(max_neighbors);

		let guard = self.begin_fetch(Fetch::Neighbors, node_id)?;
		let fetched = self.backend.neighbors(node_id, limit).await.map_err(|err| {
			warn!("expanding {node_id} failed: {err}");
			err
		})?;
		if self.inner.borrow().generation != guard.generation {
			debug!("dropping neighbors of {node_id} fetched before a reset");
			return Ok(GraphDelta::default());
		}
		if guard.present && !self.inner.borrow().state.contains_node(node_id) {
			debug!("dropping neighbors of {node_id}, it was removed meanwhile");
			return Ok(GraphDelta::default());
		}

		let (delta, changed) = {
			let mut inner = self.inner.borrow_mut();
			merge_neighbors(&mut inner.state, node_id, fetched, limit)
		};
		debug!(
			"expanded {node_id}: +{} nodes, +{} edges",
			delta.nodes.len(),
			delta.edges.len()
		);
		if changed {
			self.commit();
		}
		Ok(delta)
	}

	/// Expands `node_id` unless it has been expanded already.
	pub async fn expand_from_menu(&self, node_id: &str) -> Result<Option<GraphDelta>, GraphError> {
		let node_id = node_id.trim();
		if self.is_expanded(node_id) {
			return Ok(None);
		}
		self.expand(node_id, self.config.max_neighbors).await.map(Some)
	}

	/// Adds already-fetched books around `subject_id`.
	pub fn attach_related_books(
		&self,
		subject_id: &str,
		books: &[RelatedEntity],
		max_neighbors: usize,
	) -> Result<GraphDelta, GraphError> {
		self.check_subject(subject_id, max_neighbors)?;
		let delta = {
			let mut inner = self.inner.borrow_mut();
			merge_books(&mut inner.state, subject_id, books, max_neighbors)
		};
		debug!("attached {} books to {subject_id}", delta.nodes.len());
		if !delta.is_empty() {
			self.commit();
		}
		Ok(delta)
	}

	/// Fetches books related to `subject_id` and attaches them.
	pub async fn fetch_related_books(
		&self,
		subject_id: &str,
		max_neighbors: usize,
	) -> Result<GraphDelta, GraphError> {
		self.check_subject(subject_id, max_neighbors)?;
		let guard = self.begin_fetch(Fetch::Books, subject_id)?;
		let books = self
			.backend
			.related_entities(subject_id, max_neighbors)
			.await
			.map_err(|err| {
				warn!("fetching books for {subject_id} failed: {err}");
				err
			})?;
		if self.inner.borrow().generation != guard.generation {
			debug!("dropping books of {subject_id} fetched before a reset");
			return Ok(GraphDelta::default());
		}
		drop(guard);
		// the subject may have been removed while the fetch was outstanding
		if !self.inner.borrow().state.contains_node(subject_id) {
			return Ok(GraphDelta::default());
		}
		self.attach_related_books(subject_id, &books, max_neighbors)
	}

	/// Removes one node with its incident edges. Neighbors are left in place.
	pub fn remove_node(&self, node_id: &str) -> bool {
		let removed = self.inner.borrow_mut().state.remove_node(node_id);
		if removed {
			debug!("removed {node_id}");
			self.commit();
		}
		removed
	}

	/// Empties the graph and forgets the persisted session.
	pub fn reset(&self) {
		Self::clear(&mut self.inner.borrow_mut());
		persist::discard(self.store.as_ref(), &self.config.session_key);
		info!("graph reset");
		self.renderer.render(&self.inner.borrow().state);
	}

	/// Records where the renderer placed a dragged node. View state only.
	pub fn on_node_position_change(&self, node_id: &str, x: f64, y: f64) {
		let layout = NodeLayout { x, y, pinned: true };
		self.inner.borrow_mut().state.set_layout(node_id, layout);
	}

	fn clear(inner: &mut Inner) {
		inner.state = GraphState::default();
		inner.generation += 1;
		inner.in_flight.clear();
	}

	fn check_subject(&self, subject_id: &str, max_neighbors: usize) -> Result<(), GraphError> {
		if subject_id.is_empty() {
			return Err(ValidationError::EmptyNodeId.into());
		}
		if max_neighbors == 0 {
			return Err(ValidationError::ZeroLimit.into());
		}
		if !self.inner.borrow().state.contains_node(subject_id) {
			return Err(ValidationError::UnknownNode(subject_id.to_string()).into());
		}
		Ok(())
	}

	fn begin_fetch(&self, kind: Fetch, node_id: &str) -> Result<InFlightGuard<'_>, GraphError> {
		let mut inner = self.inner.borrow_mut();
		let key = (kind, node_id.to_string());
		if inner.in_flight.contains_key(&key) {
			return Err(GraphError::InFlight {
				node_id: node_id.to_string(),
			});
		}
		let generation = inner.generation;
		let present = inner.state.contains_node(node_id);
		inner.in_flight.insert(key.clone(), generation);
		Ok(InFlightGuard {
			inner: &self.inner,
			key,
			generation,
			present,
		})
	}

	fn commit(&self) {
		let inner = self.inner.borrow();
		persist::persist(
			self.store.as_ref(),
			&self.config.session_key,
			&inner.state,
			self.clock.now_ms(),
		);
		self.renderer.render(&inner.state);
	}
}

/// Merges a neighbor fetch into `state`. Returns the delta and whether
/// anything changed, including role promotion of `center`.
fn merge_neighbors(
	state: &mut GraphState,
	center: &str,
	fetched: NeighborSet,
	limit: usize,
) -> (GraphDelta, bool) {
	let mut delta = GraphDelta::default();

	if !state.contains_node(center) {
		let role = if state.is_empty() {
			NodeRole::Seed
		} else {
			NodeRole::Expanded
		};
		let node = match fetched.nodes.iter().find(|n| n.id == center) {
			Some(n) => Node {
				kind: n.kind,
				..Node::subject(&n.id, &n.label, n.definition.clone(), role)
			},
			None => Node::subject(center, center, None, role),
		};
		state.insert_node(node.clone());
		delta.nodes.push(node);
	}

	for fetched_node in fetched.nodes.into_iter().filter(|n| n.id != center).take(limit) {
		let node = Node {
			kind: fetched_node.kind,
			..Node::subject(
				fetched_node.id,
				fetched_node.label,
				fetched_node.definition,
				NodeRole::Neighbor,
			)
		};
		if state.insert_node(node.clone()) {
			delta.nodes.push(node);
		}
	}

	for edge in fetched.edges {
		if state.insert_edge(edge.clone()) {
			delta.edges.push(edge);
		}
	}

	let marked = state.mark_expanded(center);
	let changed = marked || !delta.is_empty();
	(delta, changed)
}

fn merge_books(
	state: &mut GraphState,
	subject_id: &str,
	books: &[RelatedEntity],
	limit: usize,
) -> GraphDelta {
	let mut delta = GraphDelta::default();
	for book in books.iter().take(limit) {
		if state.contains_node(&book.id) {
			continue;
		}
		let node = Node::book(&book.id, &book.label, book.definition.clone());
		state.insert_node(node.clone());
		delta.nodes.push(node);

		let edge = Edge::new(subject_id, &book.id, SUBJECT_BOOK_RELATION);
		if state.insert_edge(edge.clone()) {
			delta.edges.push(edge);
		}
	}
	delta
}

#[cfg(test)]
mod tests {
	use std::cell::{Cell, RefCell};
	use std::collections::VecDeque;
	use std::rc::Rc;

	use async_trait::async_trait;
	use futures::channel::oneshot;
	use futures::executor::block_on;
	use futures::future::join;

	use super::*;
	use crate::api::FetchedNode;
	use crate::error::FetchError;
	use crate::graph::{ManualClock, MemoryStore, NodeKind};

	type Pending = oneshot::Receiver<Result<NeighborSet, FetchError>>;
	type PendingBooks = oneshot::Receiver<Result<Vec<RelatedEntity>, FetchError>>;

	/// Backend whose calls wait until the test releases them.
	#[derive(Default)]
	struct GatedBackend {
		pending: RefCell<VecDeque<Pending>>,
		pending_books: RefCell<VecDeque<PendingBooks>>,
		calls: Cell<usize>,
	}

	impl GatedBackend {
		fn gate(&self) -> oneshot::Sender<Result<NeighborSet, FetchError>> {
			let (tx, rx) = oneshot::channel();
			self.pending.borrow_mut().push_back(rx);
			tx
		}

		fn book_gate(&self) -> oneshot::Sender<Result<Vec<RelatedEntity>, FetchError>> {
			let (tx, rx) = oneshot::channel();
			self.pending_books.borrow_mut().push_back(rx);
			tx
		}
	}

	#[async_trait(?Send)]
	impl GraphBackend for Rc<GatedBackend> {
		async fn search_seed(&self, _: &str) -> Result<Vec<SeedCandidate>, FetchError> {
			Ok(Vec::new())
		}

		async fn neighbors(&self, _: &str, _: usize) -> Result<NeighborSet, FetchError> {
			self.calls.set(self.calls.get() + 1);
			let rx = self.pending.borrow_mut().pop_front();
			match rx {
				Some(rx) => rx
					.await
					.unwrap_or_else(|_| Err(FetchError::Transport("gate dropped".into()))),
				None => Ok(NeighborSet::default()),
			}
		}

		async fn related_entities(
			&self,
			_: &str,
			_: usize,
		) -> Result<Vec<RelatedEntity>, FetchError> {
			self.calls.set(self.calls.get() + 1);
			let rx = self.pending_books.borrow_mut().pop_front();
			match rx {
				Some(rx) => rx
					.await
					.unwrap_or_else(|_| Err(FetchError::Transport("gate dropped".into()))),
				None => Ok(Vec::new()),
			}
		}
	}

	fn subject(id: &str) -> FetchedNode {
		FetchedNode {
			id: id.into(),
			kind: NodeKind::Subject,
			label: id.into(),
			definition: None,
		}
	}

	fn around_a() -> NeighborSet {
		NeighborSet {
			nodes: vec![subject("A"), subject("B")],
			edges: vec![Edge::new("A", "B", "related")],
		}
	}

	fn manager(backend: Rc<GatedBackend>, store: MemoryStore) -> GraphStateManager {
		GraphStateManager::new(
			Box::new(backend),
			Box::new(store),
			Box::new(|_: &GraphState| {}),
			Box::new(ManualClock::at(1_000)),
			ExplorerConfig::default(),
		)
	}

	#[test]
	fn reset_discards_late_fetch() {
		let backend = Rc::new(GatedBackend::default());
		let store = MemoryStore::default();
		let gate = backend.gate();
		let manager = manager(backend.clone(), store.clone());

		let (result, ()) = block_on(join(manager.expand("A", 10), async {
			manager.reset();
			gate.send(Ok(around_a())).unwrap();
		}));

		assert_eq!(result, Ok(GraphDelta::default()));
		assert!(manager.snapshot().is_empty());
		assert_eq!(store.get(&manager.config().session_key), None);
	}

	#[test]
	fn removal_during_expand_is_not_undone() {
		let backend = Rc::new(GatedBackend::default());
		let store = MemoryStore::default();
		let manager = manager(backend.clone(), store.clone());
		let seeded = backend.gate();
		seeded
			.send(Ok(NeighborSet {
				nodes: vec![subject("S"), subject("N")],
				edges: vec![Edge::new("S", "N", "related")],
			}))
			.unwrap();
		block_on(manager.select_seed("S", "S", None)).unwrap();

		let gate = backend.gate();
		let (result, ()) = block_on(join(manager.expand("N", 10), async {
			assert!(manager.remove_node("N"));
			gate.send(Ok(NeighborSet {
				nodes: vec![subject("N"), subject("M")],
				edges: vec![Edge::new("N", "M", "related")],
			}))
			.unwrap();
		}));

		assert_eq!(result, Ok(GraphDelta::default()));
		let state = manager.snapshot();
		assert_eq!(state.nodes().map(|n| n.id.as_str()).collect::<Vec<_>>(), ["S"]);
		assert_eq!(state.edge_count(), 0);
		assert!(!state.is_expanded("N"));
	}

	#[test]
	fn expand_from_menu_trims_the_id() {
		let backend = Rc::new(GatedBackend::default());
		let manager = manager(backend.clone(), MemoryStore::default());
		backend.gate().send(Ok(around_a())).unwrap();
		block_on(manager.expand("A", 10)).unwrap();

		assert_eq!(block_on(manager.expand_from_menu(" A ")), Ok(None));
		assert_eq!(backend.calls.get(), 1);
	}

	#[test]
	fn second_book_fetch_of_same_subject_is_rejected_while_pending() {
		let backend = Rc::new(GatedBackend::default());
		let manager = manager(backend.clone(), MemoryStore::default());
		backend.gate().send(Ok(around_a())).unwrap();
		block_on(manager.expand("A", 10)).unwrap();
		let gate = backend.book_gate();

		let (first, second) = block_on(join(manager.fetch_related_books("A", 5), async {
			let second = manager.fetch_related_books("A", 5).await;
			gate.send(Ok(vec![RelatedEntity {
				id: "9788900000001".into(),
				label: "Book".into(),
				definition: None,
			}]))
			.unwrap();
			second
		}));

		assert_eq!(
			second,
			Err(GraphError::InFlight {
				node_id: "A".into()
			})
		);
		assert_eq!(first.unwrap().nodes.len(), 1);
		assert_eq!(backend.calls.get(), 2);
		// the marker is released once the fetch settles
		assert!(block_on(manager.fetch_related_books("A", 5)).is_ok());
	}

	#[test]
	fn second_expand_of_same_node_is_rejected_while_pending() {
		let backend = Rc::new(GatedBackend::default());
		let gate = backend.gate();
		let manager = manager(backend.clone(), MemoryStore::default());

		let (first, second) = block_on(join(manager.expand("A", 10), async {
			let second = manager.expand("A", 10).await;
			gate.send(Ok(around_a())).unwrap();
			second
		}));

		assert_eq!(
			second,
			Err(GraphError::InFlight {
				node_id: "A".into()
			})
		);
		assert_eq!(first.unwrap().nodes.len(), 2);
		assert_eq!(backend.calls.get(), 1);
		// the marker is released once the fetch settles
		assert!(block_on(manager.expand("A", 10)).is_ok());
	}

	#[test]
	fn expand_after_reset_is_not_blocked_by_stale_marker() {
		let backend = Rc::new(GatedBackend::default());
		let stale = backend.gate();
		let fresh = backend.gate();
		let manager = manager(backend.clone(), MemoryStore::default());

		let (old, new) = block_on(join(manager.expand("A", 10), async {
			manager.reset();
			let new = join(manager.expand("A", 10), async {
				fresh.send(Ok(around_a())).unwrap();
			});
			let (new, ()) = new.await;
			stale.send(Ok(around_a())).unwrap();
			new
		}));

		assert_eq!(old, Ok(GraphDelta::default()));
		assert_eq!(new.unwrap().edges.len(), 1);
		assert_eq!(manager.snapshot().node_count(), 2);
	}

	#[test]
	fn fetch_failure_leaves_state_untouched() {
		let backend = Rc::new(GatedBackend::default());
		let gate = backend.gate();
		let manager = manager(backend.clone(), MemoryStore::default());
		gate.send(Err(FetchError::Status { status: 500 })).unwrap();

		let result = block_on(manager.expand("A", 10));
		assert_eq!(result, Err(GraphError::Fetch(FetchError::Status { status: 500 })));
		assert!(manager.snapshot().is_empty());
	}

	#[test]
	fn invalid_input_never_reaches_backend() {
		let backend = Rc::new(GatedBackend::default());
		let manager = manager(backend.clone(), MemoryStore::default());

		assert_eq!(
			block_on(manager.expand("  ", 10)),
			Err(GraphError::Validation(ValidationError::EmptyNodeId))
		);
		assert_eq!(
			block_on(manager.expand("A", 0)),
			Err(GraphError::Validation(ValidationError::ZeroLimit))
		);
		assert_eq!(
			block_on(manager.search_seed("   ")),
			Err(GraphError::Validation(ValidationError::EmptyQuery))
		);
		let long = "x".repeat(MAX_QUERY_LENGTH + 1);
		assert!(matches!(
			block_on(manager.search_seed(&long)),
			Err(GraphError::Validation(ValidationError::QueryTooLong { .. }))
		));
		assert_eq!(backend.calls.get(), 0);
	}

	#[test]
	fn neighbors_beyond_limit_are_ignored() {
		let mut state = GraphState::default();
		let fetched = NeighborSet {
			nodes: vec![subject("A"), subject("B"), subject("C"), subject("D")],
			edges: vec![
				Edge::new("A", "B", "related"),
				Edge::new("A", "C", "related"),
				Edge::new("A", "D", "related"),
			],
		};
		let (delta, changed) = merge_neighbors(&mut state, "A", fetched, 2);
		assert!(changed);
		assert_eq!(delta.nodes.len(), 3);
		assert_eq!(state.edge_count(), 2);
		assert!(!state.contains_node("D"));
		assert_eq!(state.node("A").unwrap().role, NodeRole::Seed);
	}

	#[test]
	fn expanding_a_missing_node_into_a_populated_graph_marks_it_expanded() {
		let mut state = GraphState::default();
		state.insert_node(Node::subject("S", "S", None, NodeRole::Seed));
		let (delta, _) = merge_neighbors(&mut state, "X", NeighborSet::default(), 5);
		assert_eq!(delta.nodes[0].role, NodeRole::Expanded);
		assert!(state.is_expanded("X"));
	}
}
