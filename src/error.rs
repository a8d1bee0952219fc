//! Error taxonomy shared by the graph manager and its collaborators.

use thiserror::Error;

/// A backend call failed. State is never touched when this is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
	/// The request never produced a response.
	#[error("network request failed: {0}")]
	Transport(String),
	/// The backend answered with a non-success status.
	#[error("backend returned status {status}")]
	Status {
		/// HTTP status code.
		status: u16,
	},
	/// The response body did not match the expected shape.
	#[error("could not decode backend response: {0}")]
	Decode(String),
}

impl From<reqwest::Error> for FetchError {
	fn from(err: reqwest::Error) -> Self {
		if let Some(status) = err.status() {
			Self::Status {
				status: status.as_u16(),
			}
		} else if err.is_decode() {
			Self::Decode(err.to_string())
		} else {
			Self::Transport(err.to_string())
		}
	}
}

/// Persistence failed. Logged and absorbed, never surfaced to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
	/// No storage backend could be obtained.
	#[error("storage unavailable")]
	Unavailable,
	/// Reading the persisted entry failed.
	#[error("storage read failed: {0}")]
	Read(String),
	/// Writing or deleting the persisted entry failed.
	#[error("storage write failed: {0}")]
	Write(String),
	/// The persisted entry could not be parsed or serialized.
	#[error("persisted graph is malformed: {0}")]
	Parse(String),
}

impl From<serde_json::Error> for StorageError {
	fn from(err: serde_json::Error) -> Self {
		Self::Parse(err.to_string())
	}
}

/// Caller input rejected before any mutation or network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
	/// The query was blank.
	#[error("a search query is required")]
	EmptyQuery,
	/// The query exceeds the backend's limit.
	#[error("search query is longer than {max} characters")]
	QueryTooLong {
		/// Longest accepted query, in characters.
		max: usize,
	},
	/// The node id was blank.
	#[error("a node id is required")]
	EmptyNodeId,
	/// A limit of zero was requested.
	#[error("neighbor limit must be at least 1")]
	ZeroLimit,
	/// The node is not in the current graph.
	#[error("node {0} is not part of the graph")]
	UnknownNode(String),
}

/// Error returned by the graph manager's fallible operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
	/// Backend failure, state left unchanged.
	#[error(transparent)]
	Fetch(#[from] FetchError),
	/// Input rejected up front.
	#[error(transparent)]
	Validation(#[from] ValidationError),
	/// Another fetch for the same node has not resolved yet.
	#[error("node {node_id} is already being expanded")]
	InFlight {
		/// Node whose fetch is outstanding.
		node_id: String,
	},
}
