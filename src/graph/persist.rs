//! Session persistence of the graph: wire layout, storage backends and clocks.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::model::{Edge, GraphState, Node};
use crate::error::StorageError;

/// Layout written to session storage after every mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedGraph {
	/// Nodes in insertion order.
	pub nodes: Vec<Node>,
	/// Edges in insertion order.
	pub edges: Vec<Edge>,
	/// Ids already expanded.
	pub expanded_ids: Vec<String>,
	/// Epoch milliseconds.
	pub saved_at: u64,
}

impl PersistedGraph {
	/// Snapshot of `state` stamped with `saved_at`.
	pub fn capture(state: &GraphState, saved_at: u64) -> Self {
		Self {
			nodes: state.nodes().cloned().collect(),
			edges: state.edges().cloned().collect(),
			expanded_ids: state.expanded_ids().map(str::to_string).collect(),
			saved_at,
		}
	}

	/// Rebuilds the graph, dropping entries that break its invariants.
	pub fn into_state(self) -> GraphState {
		GraphState::from_parts(self.nodes, self.edges, self.expanded_ids)
	}

	/// Whether the entry is still within `ttl_ms` of `now_ms`.
	/// Timestamps from the future count as fresh.
	pub fn is_fresh(&self, now_ms: u64, ttl_ms: u64) -> bool {
		now_ms.saturating_sub(self.saved_at) <= ttl_ms
	}
}

/// Key-value storage for the persisted graph.
pub trait StateStore {
	/// Stored value under `key`, if any.
	fn load(&self, key: &str) -> Result<Option<String>, StorageError>;
	/// Replaces the value under `key`.
	fn save(&self, key: &str, value: &str) -> Result<(), StorageError>;
	/// Deletes `key`; missing keys are not an error.
	fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Browser `sessionStorage`.
pub struct SessionStore {
	storage: web_sys::Storage,
}

impl SessionStore {
	/// The current window's session storage.
	pub fn open() -> Result<Self, StorageError> {
		let window = web_sys::window().ok_or(StorageError::Unavailable)?;
		let storage = window
			.session_storage()
			.map_err(|e| StorageError::Read(format!("{e:?}")))?
			.ok_or(StorageError::Unavailable)?;
		Ok(Self { storage })
	}
}

impl StateStore for SessionStore {
	fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
		self.storage
			.get_item(key)
			.map_err(|e| StorageError::Read(format!("{e:?}")))
	}

	fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
		self.storage
			.set_item(key, value)
			.map_err(|e| StorageError::Write(format!("{e:?}")))
	}

	fn remove(&self, key: &str) -> Result<(), StorageError> {
		self.storage
			.remove_item(key)
			.map_err(|e| StorageError::Write(format!("{e:?}")))
	}
}

/// In-memory store. Clones share the same entries.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
	entries: Rc<RefCell<HashMap<String, String>>>,
}

impl MemoryStore {
	/// Raw value under `key`.
	pub fn get(&self, key: &str) -> Option<String> {
		self.entries.borrow().get(key).cloned()
	}

	/// Stores `value` under `key`.
	pub fn insert(&self, key: &str, value: impl Into<String>) {
		self.entries.borrow_mut().insert(key.to_string(), value.into());
	}
}

impl StateStore for MemoryStore {
	fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
		Ok(self.get(key))
	}

	fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
		self.insert(key, value);
		Ok(())
	}

	fn remove(&self, key: &str) -> Result<(), StorageError> {
		self.entries.borrow_mut().remove(key);
		Ok(())
	}
}

/// Wall clock in epoch milliseconds.
pub trait Clock {
	/// Current time.
	fn now_ms(&self) -> u64;
}

/// `Date.now()` of the hosting page.
#[derive(Clone, Copy, Debug, Default)]
pub struct BrowserClock;

impl Clock for BrowserClock {
	fn now_ms(&self) -> u64 {
		js_sys::Date::now() as u64
	}
}

/// Settable clock. Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
	now: Rc<Cell<u64>>,
}

impl ManualClock {
	/// Clock stopped at `now_ms`.
	pub fn at(now_ms: u64) -> Self {
		Self {
			now: Rc::new(Cell::new(now_ms)),
		}
	}

	/// Moves the clock to `now_ms`.
	pub fn set(&self, now_ms: u64) {
		self.now.set(now_ms);
	}

	/// Moves the clock forward by `ms`.
	pub fn advance(&self, ms: u64) {
		self.now.set(self.now.get() + ms);
	}
}

impl Clock for ManualClock {
	fn now_ms(&self) -> u64 {
		self.now.get()
	}
}

/// Reads the persisted graph under `key`.
///
/// Anything other than a fresh, parseable entry yields an empty state, and the
/// stored entry is deleted on a best-effort basis.
pub fn restore(store: &dyn StateStore, key: &str, now_ms: u64, ttl_ms: u64) -> GraphState {
	let raw = match store.load(key) {
		Ok(Some(raw)) => raw,
		Ok(None) => return GraphState::default(),
		Err(err) => {
			warn!("could not read persisted graph: {err}");
			discard(store, key);
			return GraphState::default();
		}
	};

	let persisted: PersistedGraph = match serde_json::from_str(&raw) {
		Ok(persisted) => persisted,
		Err(err) => {
			warn!("discarding malformed persisted graph: {err}");
			discard(store, key);
			return GraphState::default();
		}
	};

	if !persisted.is_fresh(now_ms, ttl_ms) {
		info!(
			"persisted graph expired ({} ms old), starting empty",
			now_ms - persisted.saved_at
		);
		discard(store, key);
		return GraphState::default();
	}

	let state = persisted.into_state();
	info!(
		"restored graph with {} nodes and {} edges",
		state.node_count(),
		state.edge_count()
	);
	state
}

/// Writes `state` under `key`. Failures are logged, not returned.
pub fn persist(store: &dyn StateStore, key: &str, state: &GraphState, now_ms: u64) {
	let payload = PersistedGraph::capture(state, now_ms);
	let result = serde_json::to_string(&payload)
		.map_err(StorageError::from)
		.and_then(|json| store.save(key, &json));
	match result {
		Ok(()) => debug!("persisted graph ({} nodes)", state.node_count()),
		Err(err) => warn!("could not persist graph: {err}"),
	}
}

/// Deletes the entry under `key`, logging failures.
pub fn discard(store: &dyn StateStore, key: &str) {
	if let Err(err) = store.remove(key) {
		warn!("could not delete persisted graph: {err}");
	}
}
