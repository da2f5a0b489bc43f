//! Transition-related types for workflows

use crate::workflow::{PlaceName, TransitionMetadata};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when creating transition-related types
#[derive(Debug, Error)]
pub enum TransitionError {
    /// Transition name cannot be empty or whitespace only
    #[error("Transition name cannot be empty or whitespace only")]
    EmptyTransitionName,
}

/// Unique identifier for a transition within one workflow
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransitionName(String);

impl TransitionName {
    /// Create a new transition name
    ///
    /// # Panics
    /// Panics if the name is empty or whitespace only. For non-panicking creation,
    /// use `try_new` instead.
    pub fn new(name: impl Into<String>) -> Self {
        Self::try_new(name).expect("Transition name cannot be empty or whitespace only")
    }

    /// Create a new transition name, returning an error for invalid input
    pub fn try_new(name: impl Into<String>) -> Result<Self, TransitionError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TransitionError::EmptyTransitionName);
        }
        Ok(Self(name))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Names starting with `_` are reserved for system transitions that are
    /// never offered to users.
    pub fn is_system(&self) -> bool {
        self.0.starts_with('_')
    }
}

impl From<&str> for TransitionName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TransitionName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for TransitionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named, optionally guarded move from one set of places to another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub name: TransitionName,
    /// Source places, declared order, no duplicates
    pub from: Vec<PlaceName>,
    /// Target places, declared order, no duplicates
    pub to: Vec<PlaceName>,
    /// Boolean expression evaluated against the subject and its marking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<String>,
    #[serde(default, skip_serializing_if = "TransitionMetadata::is_empty")]
    pub metadata: TransitionMetadata,
}

impl Transition {
    /// Create an unguarded transition without metadata
    pub fn new<F, T>(name: impl Into<TransitionName>, from: F, to: T) -> Self
    where
        F: IntoIterator,
        F::Item: Into<PlaceName>,
        T: IntoIterator,
        T::Item: Into<PlaceName>,
    {
        Self {
            name: name.into(),
            from: dedup(from.into_iter().map(Into::into)),
            to: dedup(to.into_iter().map(Into::into)),
            guard: None,
            metadata: TransitionMetadata::default(),
        }
    }

    /// Attach a guard expression
    pub fn with_guard(mut self, guard: impl Into<String>) -> Self {
        self.guard = Some(guard.into());
        self
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: TransitionMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Whether the transition asks for queue-backed execution.
    ///
    /// An explicit transport always implies asynchronous execution.
    pub fn is_async(&self) -> bool {
        self.metadata.is_async || self.metadata.transport.is_some()
    }
}

pub(crate) fn dedup<T: PartialEq>(items: impl Iterator<Item = T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
