//! Transition dispatch
//!
//! [`TransitionDispatcher`] follows the automatic `next` chains of a workflow:
//! synchronous candidates are applied inline, asynchronous ones are persisted
//! and sent on the message bus. [`TransitionMessageHandler`] is the matching
//! consumer.

mod driver;
mod handler;
mod identity;
mod store;
mod subject;

pub use driver::{DispatchReport, TransitionDispatcher, WorkflowEvent, DEFAULT_MAX_CHAIN_DEPTH};
pub use handler::TransitionMessageHandler;
pub use identity::{
    AttributeStrategy, IdentityResolver, IdentityStrategy, PrimaryKey, PrimaryKeyStrategy,
};
pub use store::{EntityLoader, EntityStore, StoreError, StoreResult};
pub use subject::WorkflowSubject;

use crate::bus::BusError;
use thiserror::Error;

/// Errors raised while driving transitions
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DispatchError {
    #[error("Workflow '{0}' is not registered")]
    UnknownWorkflow(String),

    #[error("Workflow '{workflow}' does not support entity type '{entity_type}'")]
    UnsupportedEntity {
        workflow: String,
        entity_type: String,
    },

    #[error("Workflow '{workflow}' has no place '{place}'")]
    UnknownPlace { workflow: String, place: String },

    #[error("Workflow '{workflow}' has no transition '{transition}'")]
    UnknownTransition {
        workflow: String,
        transition: String,
    },

    /// The marking or the guard does not allow the transition
    #[error("Transition '{workflow}.{transition}' is not enabled at {marking}")]
    NotEnabled {
        workflow: String,
        transition: String,
        marking: String,
    },

    /// Synchronous chaining went deeper than the configured bound
    #[error("Chain in '{workflow}' exceeded {depth} synchronous hop(s) at '{transition}'")]
    ChainDepthExceeded {
        workflow: String,
        transition: String,
        depth: usize,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Result type for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;
