//! Test helper functions for workflow module

#![cfg(test)]

use crate::workflow::{
    Place, PlaceMetadata, PlaceName, Transition, TransitionMetadata, TransitionName,
    WorkflowDefinition, WorkflowKind,
};

/// Test helper to create a place with an automatic `next` chain
pub fn place_with_next(name: &str, next: &[&str]) -> Place {
    Place::new(name).with_metadata(PlaceMetadata {
        next: next.iter().map(|n| TransitionName::new(*n)).collect(),
        ..Default::default()
    })
}

/// Test helper to create a queue-backed transition
pub fn async_transition(name: &str, from: &str, to: &str) -> Transition {
    Transition::new(name, [from], [to]).with_metadata(TransitionMetadata {
        is_async: true,
        ..Default::default()
    })
}

/// `AssetFlow`: `new` (next: load) -> `loaded` through the async `load`
pub fn asset_flow() -> WorkflowDefinition {
    let mut def = WorkflowDefinition::new("AssetFlow", WorkflowKind::StateMachine);
    def.add_place(place_with_next("new", &["load"]));
    def.add_place(Place::new("loaded"));
    def.add_transition(async_transition("load", "new", "loaded"));
    def.initial_marking = vec![PlaceName::new("new")];
    def.supports = vec!["Asset".to_string()];
    def
}
