use std::rc::Rc;

use leptos::ev::SubmitEvent;
use leptos::prelude::*;
use leptos::task::spawn_local;
use log::warn;

use crate::api::{HttpBackend, SeedCandidate};
use crate::components::force_graph::{ForceGraphCanvas, GraphData};
use crate::config::ExplorerConfig;
use crate::error::GraphError;
use crate::graph::{
	BrowserClock, GraphDelta, GraphState, GraphStateManager, MemoryStore, NodeKind,
	SessionStore, SignalRenderer, StateStore,
};

fn describe(delta: &GraphDelta) -> String {
	match (delta.nodes.len(), delta.edges.len()) {
		(0, 0) => "Nothing new to add".into(),
		(nodes, edges) => format!("Added {nodes} nodes and {edges} links"),
	}
}

fn open_store() -> Box<dyn StateStore> {
	match SessionStore::open() {
		Ok(store) => Box::new(store),
		Err(err) => {
			warn!("session storage unavailable ({err}), graph will not survive reloads");
			Box::new(MemoryStore::default())
		}
	}
}

/// Seed search, node actions and the relation graph canvas.
#[component]
pub fn Explorer() -> impl IntoView {
	let config = ExplorerConfig::from_build_env();
	let graph = RwSignal::new(GraphState::default());
	let manager = GraphStateManager::new(
		Box::new(HttpBackend::new(config.api_base_url.clone())),
		open_store(),
		Box::new(SignalRenderer(graph)),
		Box::new(BrowserClock),
		config,
	);
	let manager = StoredValue::new_local(Rc::new(manager));

	let (query, set_query) = signal(String::new());
	let (candidates, set_candidates) = signal(Vec::<SeedCandidate>::new());
	let (selected, set_selected) = signal(None::<String>);
	let (status, set_status) = signal(None::<String>);

	let report = move |result: Result<GraphDelta, GraphError>| match result {
		Ok(delta) => set_status.set(Some(describe(&delta))),
		Err(err) => set_status.set(Some(err.to_string())),
	};

	let on_search = move |ev: SubmitEvent| {
		ev.prevent_default();
		let manager = manager.get_value();
		let query = query.get_untracked();
		spawn_local(async move {
			match manager.search_seed(&query).await {
				Ok(found) => {
					set_status.set(found.is_empty().then(|| "No matching subjects".to_string()));
					set_candidates.set(found);
				}
				Err(err) => set_status.set(Some(err.to_string())),
			}
		});
	};

	let choose_seed = move |candidate: SeedCandidate| {
		let manager = manager.get_value();
		set_candidates.set(Vec::new());
		set_selected.set(Some(candidate.id.clone()));
		set_status.set(Some(format!("Loading neighbors of {}", candidate.label)));
		spawn_local(async move {
			let result = manager
				.select_seed(&candidate.id, &candidate.label, candidate.definition)
				.await;
			report(result);
		});
	};

	let expand = move |id: String| {
		let manager = manager.get_value();
		spawn_local(async move {
			match manager.expand_from_menu(&id).await {
				Ok(Some(delta)) => report(Ok(delta)),
				Ok(None) => set_status.set(Some("Already expanded".into())),
				Err(err) => report(Err(err)),
			}
		});
	};

	let related_books = move |id: String| {
		let manager = manager.get_value();
		let limit = manager.config().related_books_limit;
		spawn_local(async move {
			report(manager.fetch_related_books(&id, limit).await);
		});
	};

	let remove = move |id: String| {
		if manager.with_value(|m| m.remove_node(&id)) {
			set_selected.set(None);
		}
	};

	let reset = move |_| {
		manager.with_value(|m| m.reset());
		set_selected.set(None);
		set_candidates.set(Vec::new());
		set_status.set(None);
	};

	let graph_data = Signal::derive(move || graph.with(|g| GraphData::from(g)));
	let on_select = Callback::new(move |id: Option<String>| set_selected.set(id));
	let on_node_moved = Callback::new(move |(id, x, y): (String, f64, f64)| {
		manager.with_value(|m| m.on_node_position_change(&id, x, y));
	});

	let candidate_list = move || {
		candidates
			.get()
			.into_iter()
			.map(|candidate| {
				let label = candidate.label.clone();
				let definition = candidate.definition.clone().unwrap_or_default();
				view! {
					<li>
						<button on:click=move |_| choose_seed(candidate.clone())>{label}</button>
						<span class="definition">{definition}</span>
					</li>
				}
			})
			.collect_view()
	};

	let node_panel = move || {
		let id = selected.get()?;
		let node = graph.with(|g| g.node(&id).cloned())?;
		let expanded = graph.with(|g| g.is_expanded(&id));
		let is_subject = node.kind == NodeKind::Subject;
		let (expand_id, books_id, remove_id) = (id.clone(), id.clone(), id);
		Some(view! {
			<div class="node-panel">
				<h2>{node.label}</h2>
				<p>{node.definition.unwrap_or_default()}</p>
				<button disabled=expanded on:click=move |_| expand(expand_id.clone())>
					"Expand"
				</button>
				{is_subject
					.then(|| {
						view! {
							<button on:click=move |_| related_books(books_id.clone())>
								"Related books"
							</button>
						}
					})}
				<button on:click=move |_| remove(remove_id.clone())>"Remove"</button>
			</div>
		})
	};

	view! {
		<div class="fullscreen-graph">
			<ForceGraphCanvas
				data=graph_data
				fullscreen=true
				on_select=on_select
				on_node_moved=on_node_moved
			/>
			<div class="graph-overlay">
				<h1>"Subject Graph Explorer"</h1>
				<form on:submit=on_search>
					<input
						type="search"
						placeholder="Search a subject"
						prop:value=query
						on:input=move |ev| set_query.set(event_target_value(&ev))
					/>
					<button type="submit">"Search"</button>
					<button type="button" on:click=reset>"Reset"</button>
				</form>
				<ul class="candidates">{candidate_list}</ul>
				{move || status.get().map(|msg| view! { <p class="status">{msg}</p> })}
				{node_panel}
				<p class="subtitle">
					"Click a node for actions. Drag nodes to pin them. Scroll to zoom."
				</p>
			</div>
		</div>
	}
}
