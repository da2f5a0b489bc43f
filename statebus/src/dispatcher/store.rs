//! Persistence seams used by the dispatcher and the message handler

use crate::dispatcher::WorkflowSubject;
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by an entity store
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The store could not write the entity
    #[error("Failed to persist {entity_type} '{entity_id}': {message}")]
    Persist {
        entity_type: String,
        entity_id: String,
        message: String,
    },

    /// The store could not read the entity
    #[error("Failed to load {entity_type} '{entity_id}': {message}")]
    Load {
        entity_type: String,
        entity_id: String,
        message: String,
    },

    /// No loader is registered for the entity type
    #[error("No loader for entity type '{0}'")]
    UnsupportedEntityType(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Writes an entity's current state, including its markings
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn persist(&self, subject: &dyn WorkflowSubject) -> StoreResult<()>;
}

/// Re-fetches entities named by a transition message
#[async_trait]
pub trait EntityLoader: Send + Sync {
    /// `Ok(None)` when the entity no longer exists
    async fn find(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> StoreResult<Option<Box<dyn WorkflowSubject>>>;
}
