//! Workflow definition model
//!
//! Places, transitions, markings, guards and the registry of compiled
//! definitions shared at runtime.

mod definition;
mod graph;
mod guard;
mod marking;
mod metadata;
mod place;
mod registry;
#[cfg(test)]
pub(crate) mod test_helpers;
mod transition;

pub use definition::{
    DefinitionError, DefinitionResult, WorkflowDefinition, WorkflowKind, WorkflowName,
};
pub use graph::WorkflowGraphAnalyzer;
pub use guard::{
    CacheStats, GuardError, GuardEvaluator, GuardProgramCache, DEFAULT_GUARD_CACHE_SIZE,
};
pub use marking::Marking;
pub use metadata::{PlaceMetadata, TransitionMetadata};
pub(crate) use metadata::next_from_value;
pub use place::{Place, PlaceError, PlaceName, PlaceResult};
pub use registry::WorkflowRegistry;
pub use transition::{Transition, TransitionError, TransitionName};
