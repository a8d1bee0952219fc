//! Incremental relation-graph state: model, merge rules, persistence.

mod manager;
mod model;
pub mod persist;
mod render;

pub use manager::GraphStateManager;
pub use model::{Edge, EdgeKey, GraphDelta, GraphState, Node, NodeKind, NodeLayout, NodeRole};
pub use persist::{BrowserClock, Clock, ManualClock, MemoryStore, SessionStore, StateStore};
pub use render::{GraphRenderer, SignalRenderer};

/// Relation tag used for subject-book links.
pub const SUBJECT_BOOK_RELATION: &str = "subject_book";
