use leptos::prelude::*;

use super::model::GraphState;

/// Receives the full graph after every mutation and redraws it.
pub trait GraphRenderer {
	/// Draws `state` in full.
	fn render(&self, state: &GraphState);
}

impl<F> GraphRenderer for F
where
	F: Fn(&GraphState),
{
	fn render(&self, state: &GraphState) {
		self(state)
	}
}

/// Publishes snapshots into a signal the canvas component watches.
#[derive(Clone, Copy)]
pub struct SignalRenderer(pub RwSignal<GraphState>);

impl GraphRenderer for SignalRenderer {
	fn render(&self, state: &GraphState) {
		self.0.set(state.clone());
	}
}
