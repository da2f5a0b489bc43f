//! Unified error handling for statebus
//!
//! Each module carries its own typed error; [`StateBusError`] wraps them for
//! callers that drive the whole pipeline.

use crate::bus::BusError;
use crate::compiler::CompileError;
use crate::config::ConfigError;
use crate::dispatcher::{DispatchError, StoreError};
use crate::router::RouterError;
use crate::workflow::{DefinitionError, GuardError};
use std::io;
use thiserror::Error;

/// The main error type for the statebus library
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StateBusError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for statebus operations
pub type Result<T> = std::result::Result<T, StateBusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_errors_convert() {
        let err: StateBusError = RouterError::EmptySlug {
            workflow: "Flow".to_string(),
            transition: "!!".to_string(),
        }
        .into();

        assert!(matches!(err, StateBusError::Router(_)));
        assert!(err.to_string().contains("empty queue slug"));
    }
}
