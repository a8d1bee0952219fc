//! Explorer settings. Values are baked in at build time.

/// Upper bound the backend accepts for a neighbor query.
pub const MAX_NETWORK_NEIGHBORS: usize = 50;
/// Longest seed query the backend accepts.
pub const MAX_QUERY_LENGTH: usize = 200;
/// Persisted sessions older than this are discarded.
pub const STATE_TTL_MS: u64 = 60 * 60 * 1000;

const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

/// Settings for one explorer session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExplorerConfig {
	/// Base URL of the REST backend, without a trailing slash.
	pub api_base_url: String,
	/// Neighbors requested per expansion.
	pub max_neighbors: usize,
	/// Books requested when decorating a subject.
	pub related_books_limit: usize,
	/// Session storage key holding the persisted graph.
	pub session_key: String,
	/// Maximum age of a persisted graph, in milliseconds.
	pub state_ttl_ms: u64,
}

impl Default for ExplorerConfig {
	fn default() -> Self {
		Self {
			api_base_url: DEFAULT_API_URL.into(),
			max_neighbors: 10,
			related_books_limit: 10,
			session_key: "subject-graph-state".into(),
			state_ttl_ms: STATE_TTL_MS,
		}
	}
}

impl ExplorerConfig {
	/// Defaults, with the API URL overridden by `SUBJECT_GRAPH_API_URL` at compile time.
	pub fn from_build_env() -> Self {
		let mut config = Self::default();
		if let Some(url) = option_env!("SUBJECT_GRAPH_API_URL") {
			config.api_base_url = url.trim_end_matches('/').to_string();
		}
		config
	}

	/// Clamp a requested neighbor count into the range the backend serves.
	pub fn clamp_neighbors(limit: usize) -> usize {
		limit.min(MAX_NETWORK_NEIGHBORS)
	}
}
