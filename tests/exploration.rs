use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use async_trait::async_trait;
use futures::executor::block_on;
use pretty_assertions::assert_eq;
use subject_graph_explorer::api::{
	FetchedNode, GraphBackend, NeighborSet, RelatedEntity, SeedCandidate,
};
use subject_graph_explorer::config::ExplorerConfig;
use subject_graph_explorer::error::{FetchError, GraphError, ValidationError};
use subject_graph_explorer::graph::persist::PersistedGraph;
use subject_graph_explorer::graph::{
	Edge, GraphState, GraphStateManager, ManualClock, MemoryStore, NodeKind, NodeRole, StateStore,
};

const HOUR: u64 = 3_600_000;
const T0: u64 = 1_700_000_000_000;

#[derive(Default)]
struct ScriptedBackend {
	neighbors: RefCell<HashMap<String, NeighborSet>>,
	books: RefCell<HashMap<String, Vec<RelatedEntity>>>,
	failing: Cell<bool>,
	calls: Cell<usize>,
}

impl ScriptedBackend {
	fn respond(&self, id: &str, nodes: &[&str], edges: &[(&str, &str, &str)]) {
		let set = NeighborSet {
			nodes: nodes.iter().map(|n| subject(n)).collect(),
			edges: edges
				.iter()
				.map(|(a, b, rel)| Edge::new(*a, *b, *rel))
				.collect(),
		};
		self.neighbors.borrow_mut().insert(id.to_string(), set);
	}
}

fn subject(id: &str) -> FetchedNode {
	FetchedNode {
		id: id.to_string(),
		kind: NodeKind::Subject,
		label: format!("label {id}"),
		definition: None,
	}
}

fn book(isbn: &str) -> RelatedEntity {
	RelatedEntity {
		id: isbn.to_string(),
		label: format!("book {isbn}"),
		definition: None,
	}
}

/// Local handle so the test crate can implement the library trait (orphan rule).
struct SharedBackend(Rc<ScriptedBackend>);

impl std::ops::Deref for SharedBackend {
	type Target = ScriptedBackend;

	fn deref(&self) -> &ScriptedBackend {
		&self.0
	}
}

#[async_trait(?Send)]
impl GraphBackend for SharedBackend {
	async fn search_seed(&self, query: &str) -> Result<Vec<SeedCandidate>, FetchError> {
		self.calls.set(self.calls.get() + 1);
		Ok(vec![SeedCandidate {
			id: "S1".into(),
			label: query.to_string(),
			definition: None,
		}])
	}

	async fn neighbors(&self, node_id: &str, _: usize) -> Result<NeighborSet, FetchError> {
		self.calls.set(self.calls.get() + 1);
		if self.failing.get() {
			return Err(FetchError::Transport("connection refused".into()));
		}
		Ok(self
			.neighbors
			.borrow()
			.get(node_id)
			.cloned()
			.unwrap_or_default())
	}

	async fn related_entities(
		&self,
		node_id: &str,
		_: usize,
	) -> Result<Vec<RelatedEntity>, FetchError> {
		self.calls.set(self.calls.get() + 1);
		if self.failing.get() {
			return Err(FetchError::Status { status: 502 });
		}
		Ok(self.books.borrow().get(node_id).cloned().unwrap_or_default())
	}
}

struct Harness {
	backend: Rc<ScriptedBackend>,
	store: MemoryStore,
	clock: ManualClock,
	renders: Rc<Cell<usize>>,
	manager: GraphStateManager,
}

impl Harness {
	fn new() -> Self {
		Self::with(Rc::new(ScriptedBackend::default()), MemoryStore::default(), ManualClock::at(T0))
	}

	fn with(backend: Rc<ScriptedBackend>, store: MemoryStore, clock: ManualClock) -> Self {
		let renders = Rc::new(Cell::new(0));
		let counter = renders.clone();
		let manager = GraphStateManager::new(
			Box::new(SharedBackend(backend.clone())),
			Box::new(store.clone()),
			Box::new(move |_: &GraphState| counter.set(counter.get() + 1)),
			Box::new(clock.clone()),
			ExplorerConfig::default(),
		);
		Self {
			backend,
			store,
			clock,
			renders,
			manager,
		}
	}

	/// A second manager over the same storage, as after a page reload.
	fn reload(&self) -> Self {
		Self::with(self.backend.clone(), self.store.clone(), self.clock.clone())
	}

	fn persisted(&self) -> Option<PersistedGraph> {
		let raw = self.store.get(&self.manager.config().session_key)?;
		serde_json::from_str(&raw).ok()
	}
}

fn ids(state: &GraphState) -> Vec<&str> {
	state.nodes().map(|n| n.id.as_str()).collect()
}

fn seeded() -> Harness {
	let h = Harness::new();
	h.backend.respond(
		"S1",
		&["S1", "N1", "N2"],
		&[("S1", "N1", "narrower"), ("S1", "N2", "related")],
	);
	block_on(h.manager.select_seed("S1", "Seed", None)).unwrap();
	h
}

#[test]
fn seed_then_remove_neighbor() {
	let h = seeded();
	let state = h.manager.snapshot();
	assert_eq!(ids(&state), vec!["S1", "N1", "N2"]);
	assert_eq!(state.edge_count(), 2);
	assert_eq!(state.expanded_ids().collect::<Vec<_>>(), vec!["S1"]);
	assert_eq!(state.node("S1").unwrap().role, NodeRole::Seed);
	assert_eq!(state.node("N1").unwrap().role, NodeRole::Neighbor);

	assert!(h.manager.remove_node("N1"));
	let state = h.manager.snapshot();
	assert_eq!(ids(&state), vec!["S1", "N2"]);
	assert_eq!(state.edge_count(), 1);
	assert!(state.contains_edge("N2", "S1"));
	assert_eq!(state.expanded_ids().collect::<Vec<_>>(), vec!["S1"]);
}

#[test]
fn expanding_twice_yields_empty_delta() {
	let h = seeded();
	let before = h.manager.snapshot();
	let renders = h.renders.get();

	let delta = block_on(h.manager.expand("S1", 10)).unwrap();
	assert!(delta.is_empty());
	assert_eq!(h.manager.snapshot(), before);
	assert_eq!(h.renders.get(), renders);
}

#[test]
fn refetched_node_keeps_its_role() {
	let h = seeded();
	// N1's neighborhood lists the seed again
	h.backend
		.respond("N1", &["N1", "S1", "N3"], &[("N1", "S1", "broader"), ("N1", "N3", "related")]);
	let delta = block_on(h.manager.expand("N1", 10)).unwrap();

	let state = h.manager.snapshot();
	assert_eq!(state.node("S1").unwrap().role, NodeRole::Seed);
	assert_eq!(state.node("N1").unwrap().role, NodeRole::Expanded);
	assert_eq!(delta.nodes.len(), 1);
	assert_eq!(delta.edges.len(), 1);
	// first writer wins for the S1-N1 pair
	let edge = state
		.edges()
		.find(|e| e.key() == Edge::new("N1", "S1", "").key())
		.unwrap();
	assert_eq!(edge.relation_type, "narrower");
}

#[test]
fn reversed_edge_is_stored_once() {
	let h = Harness::new();
	h.backend
		.respond("A", &["A", "B"], &[("A", "B", "related"), ("B", "A", "related")]);
	let delta = block_on(h.manager.expand("A", 10)).unwrap();
	assert_eq!(delta.edges.len(), 1);
	assert_eq!(h.manager.snapshot().edge_count(), 1);
}

#[test]
fn removal_leaves_orphans_in_place() {
	let h = Harness::new();
	h.backend.respond("A", &["A", "X"], &[("A", "X", "related")]);
	h.backend.respond("X", &["X", "Y", "Z"], &[("X", "Y", "related"), ("X", "Z", "related")]);
	block_on(h.manager.expand("A", 10)).unwrap();
	block_on(h.manager.expand("X", 10)).unwrap();

	h.manager.remove_node("X");
	let state = h.manager.snapshot();
	assert_eq!(ids(&state), vec!["A", "Y", "Z"]);
	assert_eq!(state.edge_count(), 0);
	assert!(!state.is_expanded("X"));
	assert!(state.is_expanded("A"));
	assert!(!h.manager.remove_node("X"));
}

#[test]
fn expand_from_menu_skips_expanded_nodes() {
	let h = seeded();
	let calls = h.backend.calls.get();
	assert_eq!(block_on(h.manager.expand_from_menu("S1")), Ok(None));
	assert_eq!(h.backend.calls.get(), calls);

	h.backend.respond("N2", &["N2", "N4"], &[("N2", "N4", "related")]);
	let delta = block_on(h.manager.expand_from_menu("N2")).unwrap().unwrap();
	assert_eq!(delta.nodes.len(), 1);
	assert!(h.manager.is_expanded("N2"));
}

#[test]
fn state_survives_a_reload() {
	let h = seeded();
	let before = h.manager.snapshot();
	h.clock.advance(HOUR);

	let reloaded = h.reload();
	assert_eq!(reloaded.manager.snapshot(), before);
	assert_eq!(reloaded.renders.get(), 1);
}

#[test]
fn stale_session_is_discarded() {
	let h = seeded();
	h.clock.advance(2 * HOUR);

	let reloaded = h.reload();
	assert!(reloaded.manager.snapshot().is_empty());
	assert_eq!(reloaded.persisted(), None);
}

#[test]
fn every_mutation_is_persisted() {
	let h = seeded();
	let persisted = h.persisted().unwrap();
	assert_eq!(persisted.saved_at, T0);
	assert_eq!(persisted.nodes.len(), 3);
	assert_eq!(persisted.expanded_ids, vec!["S1".to_string()]);

	h.clock.advance(5_000);
	h.manager.remove_node("N2");
	let persisted = h.persisted().unwrap();
	assert_eq!(persisted.saved_at, T0 + 5_000);
	assert_eq!(persisted.nodes.len(), 2);
}

#[test]
fn drag_positions_are_not_persisted() {
	let h = seeded();
	let raw = h.store.get(&h.manager.config().session_key);
	let renders = h.renders.get();

	h.manager.on_node_position_change("N1", 120.0, -40.0);
	let layout = h.manager.snapshot().node("N1").unwrap().layout.unwrap();
	assert!(layout.pinned);
	assert_eq!((layout.x, layout.y), (120.0, -40.0));
	assert_eq!(h.store.get(&h.manager.config().session_key), raw);
	assert_eq!(h.renders.get(), renders);
}

#[test]
fn reset_clears_state_and_storage() {
	let h = seeded();
	h.manager.reset();
	assert!(h.manager.snapshot().is_empty());
	assert_eq!(h.persisted(), None);
	assert!(h.reload().manager.snapshot().is_empty());
}

#[test]
fn failed_fetch_changes_nothing() {
	let h = seeded();
	let before = h.manager.snapshot();
	let raw = h.store.get(&h.manager.config().session_key);
	h.backend.failing.set(true);

	let err = block_on(h.manager.expand("N1", 10)).unwrap_err();
	assert_eq!(
		err,
		GraphError::Fetch(FetchError::Transport("connection refused".into()))
	);
	let err = block_on(h.manager.fetch_related_books("S1", 5)).unwrap_err();
	assert_eq!(err, GraphError::Fetch(FetchError::Status { status: 502 }));
	assert_eq!(h.manager.snapshot(), before);
	assert_eq!(h.store.get(&h.manager.config().session_key), raw);
}

#[test]
fn seed_without_neighbors_stays_unexpanded_on_failure() {
	let h = Harness::new();
	h.backend.failing.set(true);
	assert!(block_on(h.manager.select_seed("S1", "Seed", None)).is_err());
	let state = h.manager.snapshot();
	assert_eq!(ids(&state), vec!["S1"]);
	assert!(!state.is_expanded("S1"));
}

#[test]
fn selecting_a_new_seed_starts_over() {
	let h = seeded();
	h.backend.respond("T1", &["T1", "M1"], &[("T1", "M1", "related")]);
	block_on(h.manager.select_seed("T1", "Other", Some("another root".into()))).unwrap();

	let state = h.manager.snapshot();
	assert_eq!(ids(&state), vec!["T1", "M1"]);
	let seed = state.node("T1").unwrap();
	assert_eq!(seed.role, NodeRole::Seed);
	assert_eq!(seed.label, "Other");
	assert_eq!(seed.definition.as_deref(), Some("another root"));
}

#[test]
fn related_books_attach_to_subject() {
	let h = seeded();
	h.backend
		.books
		.borrow_mut()
		.insert("N1".into(), vec![book("111"), book("222"), book("333")]);

	let delta = block_on(h.manager.fetch_related_books("N1", 2)).unwrap();
	assert_eq!(delta.nodes.len(), 2);
	let state = h.manager.snapshot();
	let attached = state.node("111").unwrap();
	assert_eq!(attached.kind, NodeKind::Book);
	assert_eq!(attached.role, NodeRole::Neighbor);
	assert!(state.contains_edge("N1", "222"));
	assert!(!state.contains_node("333"));
	assert!(state.edges().any(|e| e.relation_type == "subject_book"));

	// the same books again add nothing
	let again = h
		.manager
		.attach_related_books("N1", &[book("111"), book("222")], 10)
		.unwrap();
	assert!(again.is_empty());
}

#[test]
fn books_need_a_known_subject() {
	let h = seeded();
	let calls = h.backend.calls.get();
	assert_eq!(
		h.manager.attach_related_books("nope", &[book("1")], 5),
		Err(GraphError::Validation(ValidationError::UnknownNode(
			"nope".into()
		)))
	);
	assert!(block_on(h.manager.fetch_related_books("nope", 5)).is_err());
	assert_eq!(h.backend.calls.get(), calls);
}

#[test]
fn seed_search_validates_before_calling_backend() {
	let h = Harness::new();
	assert_eq!(
		block_on(h.manager.search_seed("")),
		Err(GraphError::Validation(ValidationError::EmptyQuery))
	);
	assert_eq!(h.backend.calls.get(), 0);

	let found = block_on(h.manager.search_seed("  physics ")).unwrap();
	assert_eq!(found[0].label, "physics");
}

#[test]
fn corrupt_entry_is_ignored_on_startup() {
	let store = MemoryStore::default();
	let key = ExplorerConfig::default().session_key;
	store.save(&key, "[1, 2, 3]").unwrap();

	let h = Harness::with(Rc::new(ScriptedBackend::default()), store, ManualClock::at(T0));
	assert!(h.manager.snapshot().is_empty());
	assert_eq!(h.store.get(&key), None);
}
