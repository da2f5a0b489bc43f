//! Capabilities of entities driven through workflows

use crate::dispatcher::PrimaryKey;
use crate::message::ContextStampProvider;
use crate::workflow::{Marking, WorkflowName};
use serde_json::Value;

/// An entity with workflow state
///
/// One marking is kept per workflow the entity takes part in.
pub trait WorkflowSubject: Send + Sync {
    /// Entity type identifier, matched against a workflow's `supports`
    fn entity_type(&self) -> &str;

    /// Current marking in `workflow`; empty when the entity never entered it
    fn marking(&self, workflow: &WorkflowName) -> Marking;

    /// Store the marking reached in `workflow`
    fn set_marking(&mut self, workflow: &WorkflowName, marking: Marking);

    /// Attributes exposed to guard expressions and identity fallbacks
    fn attributes(&self) -> Value {
        Value::Null
    }

    /// Primary key as declared by the persistence layer
    fn primary_key(&self) -> Option<PrimaryKey> {
        None
    }

    /// Partition capability, when the entity carries a context value
    fn context_provider(&self) -> Option<&dyn ContextStampProvider> {
        None
    }
}
