//! Definition compiler
//!
//! Turns declarative workflow sources (files, in-memory units and registered
//! declarations) into normalized [`WorkflowDefinition`](crate::workflow::WorkflowDefinition)s
//! plus the per-workflow set of asynchronous transition names.

mod builder;
mod source;

pub use builder::{
    compile_declaration, CompiledWorkflows, DefinitionCompiler, RuntimeConfig,
    RuntimePlaceConfig, RuntimeTransitionConfig, RuntimeWorkflowConfig, SkippedSource,
};
pub use source::{
    OneOrMany, PlaceDeclaration, PlaceSpec, SourceFormat, SourceUnit, TransitionDeclaration,
    WorkflowDeclaration, WorkflowHeader, SOURCE_EXTENSIONS,
};

use crate::workflow::DefinitionError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while compiling one source unit
///
/// None of these abort a compile run; the unit is skipped and the error logged.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompileError {
    /// The file could not be read
    #[error("Failed to read workflow source {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file extension is not a recognized declarative format
    #[error("Unsupported workflow source format: {path}")]
    UnsupportedFormat { path: PathBuf },

    /// The document is not valid YAML or JSON
    #[error("Malformed workflow source {origin}: {message}")]
    Malformed { origin: String, message: String },

    /// The document has no top-level `workflow:` mapping
    #[error("Workflow source {origin} has no 'workflow' declaration")]
    MissingDeclaration { origin: String },

    /// Neither the declaration nor its origin provides a name
    #[error("Workflow source {origin} has no name")]
    MissingName { origin: String },

    /// Unknown `type` value
    #[error("Unknown workflow type '{kind}' in {origin}, expected 'workflow' or 'state_machine'")]
    UnknownKind { origin: String, kind: String },

    /// The normalized definition failed validation
    #[error("Invalid workflow in {origin}: {source}")]
    Definition {
        origin: String,
        #[source]
        source: DefinitionError,
    },
}

/// Result type for compiler operations
pub type CompileResult<T> = Result<T, CompileError>;
