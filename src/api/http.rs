use async_trait::async_trait;
use log::debug;
use reqwest::Url;
use serde::{Deserialize, de::DeserializeOwned};

use super::{FetchedNode, GraphBackend, NeighborSet, RelatedEntity, SeedCandidate};
use crate::error::FetchError;
use crate::graph::{Edge, NodeKind};

#[derive(Deserialize)]
struct SeedResponse {
	candidates: Vec<WireSeed>,
}

#[derive(Deserialize)]
struct WireSeed {
	node_id: String,
	label: String,
	#[serde(default)]
	definition: Option<String>,
}

#[derive(Deserialize)]
struct NeighborsResponse {
	nodes: Vec<WireNode>,
	edges: Vec<WireEdge>,
}

#[derive(Deserialize)]
struct WireNode {
	node_id: String,
	label: String,
	#[serde(default)]
	definition: Option<String>,
}

#[derive(Deserialize)]
struct WireEdge {
	source: String,
	target: String,
	relation_type: String,
	#[serde(default)]
	metadata: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct BooksResponse {
	books: Vec<WireBook>,
}

#[derive(Deserialize)]
struct WireBook {
	isbn: String,
	#[serde(default)]
	title: Option<String>,
	#[serde(default)]
	intro: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
	value.filter(|v| !v.trim().is_empty())
}

/// [`GraphBackend`] over the explorer's REST API.
#[derive(Clone, Debug)]
pub struct HttpBackend {
	client: reqwest::Client,
	base_url: String,
}

impl HttpBackend {
	/// Client for the API rooted at `base_url`.
	pub fn new(base_url: impl Into<String>) -> Self {
		Self {
			client: reqwest::Client::new(),
			base_url: base_url.into().trim_end_matches('/').to_string(),
		}
	}

	/// Joins path segments onto the base URL, escaping each one.
	fn url(&self, segments: &[&str]) -> Result<Url, FetchError> {
		let mut url = Url::parse(&self.base_url).map_err(|e| FetchError::Transport(e.to_string()))?;
		url.path_segments_mut()
			.map_err(|()| FetchError::Transport(format!("{} cannot be a base", self.base_url)))?
			.pop_if_empty()
			.extend(segments);
		Ok(url)
	}

	async fn get<T: DeserializeOwned>(
		&self,
		segments: &[&str],
		query: &[(&str, String)],
	) -> Result<T, FetchError> {
		let url = self.url(segments)?;
		debug!("GET {url} {query:?}");
		let response = self
			.client
			.get(url)
			.query(query)
			.send()
			.await?
			.error_for_status()?;
		// body decode failures surface as FetchError::Decode
		Ok(response.json::<T>().await?)
	}
}

#[async_trait(?Send)]
impl GraphBackend for HttpBackend {
	async fn search_seed(&self, query: &str) -> Result<Vec<SeedCandidate>, FetchError> {
		let response: SeedResponse = self
			.get(&["network", "search-seed"], &[("query", query.to_string())])
			.await?;
		Ok(response
			.candidates
			.into_iter()
			.map(|c| SeedCandidate {
				id: c.node_id,
				label: c.label,
				definition: non_empty(c.definition),
			})
			.collect())
	}

	async fn neighbors(&self, node_id: &str, limit: usize) -> Result<NeighborSet, FetchError> {
		let response: NeighborsResponse = self
			.get(
				&["network", "node", node_id, "neighbors"],
				&[("limit", limit.to_string())],
			)
			.await?;
		Ok(NeighborSet {
			nodes: response
				.nodes
				.into_iter()
				.map(|n| FetchedNode {
					id: n.node_id,
					kind: NodeKind::Subject,
					label: n.label,
					definition: non_empty(n.definition),
				})
				.collect(),
			edges: response
				.edges
				.into_iter()
				.map(|e| Edge {
					metadata: e.metadata.filter(|m| !m.is_null()),
					..Edge::new(e.source, e.target, e.relation_type)
				})
				.collect(),
		})
	}

	async fn related_entities(
		&self,
		node_id: &str,
		limit: usize,
	) -> Result<Vec<RelatedEntity>, FetchError> {
		let response: BooksResponse = self
			.get(
				&["books", "subject-related-books"],
				&[("node_id", node_id.to_string()), ("limit", limit.to_string())],
			)
			.await?;
		Ok(response
			.books
			.into_iter()
			.map(|b| RelatedEntity {
				label: non_empty(b.title).unwrap_or_else(|| b.isbn.clone()),
				id: b.isbn,
				definition: non_empty(b.intro),
			})
			.collect())
	}
}
