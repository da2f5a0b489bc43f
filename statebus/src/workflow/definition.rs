//! Main workflow definition type and validation

use crate::workflow::{
    Marking, Place, PlaceError, PlaceName, Transition, TransitionError, TransitionName,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Errors raised while building or validating a workflow definition
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DefinitionError {
    /// Workflow name cannot be empty or whitespace only
    #[error("Workflow name cannot be empty or whitespace only")]
    EmptyWorkflowName,

    #[error(transparent)]
    Place(#[from] PlaceError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// A well-known metadata key carried a value of the wrong shape
    #[error("Invalid metadata key '{key}': {reason}")]
    InvalidMetadata { key: String, reason: String },

    /// Structural validation failed
    #[error("Invalid workflow '{name}': {}", .errors.join("; "))]
    Invalid { name: String, errors: Vec<String> },
}

/// Result type for definition operations
pub type DefinitionResult<T> = Result<T, DefinitionError>;

/// Unique identifier for workflows
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkflowName(String);

impl WorkflowName {
    /// Create a new workflow name
    ///
    /// # Panics
    /// Panics if the name is empty or whitespace only. For non-panicking creation,
    /// use `try_new` instead.
    pub fn new(name: impl Into<String>) -> Self {
        Self::try_new(name).expect("Workflow name cannot be empty or whitespace only")
    }

    /// Create a new workflow name, returning an error for invalid input
    pub fn try_new(name: impl Into<String>) -> DefinitionResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DefinitionError::EmptyWorkflowName);
        }
        Ok(Self(name))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for WorkflowName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for WorkflowName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for WorkflowName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How many places an entity may occupy at once
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    /// Any number of simultaneously marked places
    Workflow,
    /// Exactly one current place
    #[default]
    StateMachine,
}

impl WorkflowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Workflow => "workflow",
            Self::StateMachine => "state_machine",
        }
    }
}

/// A normalized, validated workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: WorkflowName,
    #[serde(rename = "type", default)]
    pub kind: WorkflowKind,
    /// Places in declared order
    pub places: Vec<Place>,
    /// Transitions in declared order
    pub transitions: Vec<Transition>,
    pub initial_marking: Vec<PlaceName>,
    /// Entity type identifiers this workflow applies to
    pub supports: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl WorkflowDefinition {
    /// Create an empty definition
    pub fn new(name: impl Into<WorkflowName>, kind: WorkflowKind) -> Self {
        Self {
            name: name.into(),
            kind,
            places: Vec::new(),
            transitions: Vec::new(),
            initial_marking: Vec::new(),
            supports: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Add a place to the workflow
    pub fn add_place(&mut self, place: Place) {
        self.places.push(place);
    }

    /// Add a transition to the workflow
    pub fn add_transition(&mut self, transition: Transition) {
        self.transitions.push(transition);
    }

    pub fn place(&self, name: &PlaceName) -> Option<&Place> {
        self.places.iter().find(|p| &p.name == name)
    }

    pub fn has_place(&self, name: &PlaceName) -> bool {
        self.place(name).is_some()
    }

    pub fn transition(&self, name: &TransitionName) -> Option<&Transition> {
        self.transitions.iter().find(|t| &t.name == name)
    }

    /// Whether this workflow applies to the given entity type
    pub fn supports_entity(&self, entity_type: &str) -> bool {
        self.supports.iter().any(|s| s == entity_type)
    }

    /// The marking a fresh entity starts with
    pub fn initial(&self) -> Marking {
        Marking::from_places(self.initial_marking.iter().cloned())
    }

    /// Names of every transition flagged for queue-backed execution
    pub fn async_transitions(&self) -> impl Iterator<Item = &TransitionName> {
        self.transitions
            .iter()
            .filter(|t| t.is_async())
            .map(|t| &t.name)
    }

    /// Validate the workflow structure
    pub fn validate_structure(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.name.as_str().trim().is_empty() {
            errors.push("Workflow name cannot be empty".to_string());
        }

        let mut seen = HashSet::new();
        for place in &self.places {
            if !seen.insert(&place.name) {
                errors.push(format!("Duplicate place name: '{}'", place.name));
            }
        }

        let mut seen = HashSet::new();
        for transition in &self.transitions {
            if !seen.insert(&transition.name) {
                errors.push(format!("Duplicate transition name: '{}'", transition.name));
            }
            if transition.from.is_empty() {
                errors.push(format!(
                    "Transition '{}' has no source place",
                    transition.name
                ));
            }
            if transition.to.is_empty() {
                errors.push(format!(
                    "Transition '{}' has no target place",
                    transition.name
                ));
            }
            for place in &transition.from {
                if !self.has_place(place) {
                    errors.push(format!(
                        "Transition '{}' references non-existent source place: '{}'",
                        transition.name, place
                    ));
                }
            }
            for place in &transition.to {
                if !self.has_place(place) {
                    errors.push(format!(
                        "Transition '{}' references non-existent target place: '{}'",
                        transition.name, place
                    ));
                }
            }
            if self.kind == WorkflowKind::StateMachine && transition.to.len() > 1 {
                errors.push(format!(
                    "Transition '{}' of state machine targets {} places, expected exactly one",
                    transition.name,
                    transition.to.len()
                ));
            }
        }

        for place in &self.initial_marking {
            if !self.has_place(place) {
                errors.push(format!(
                    "Initial place '{}' not found in workflow places. Available places: {:?}",
                    place,
                    self.places.iter().map(|p| p.name.as_str()).collect::<Vec<_>>()
                ));
            }
        }

        if self.kind == WorkflowKind::StateMachine {
            match self.initial_marking.len() {
                0 => errors.push("State machine must declare an initial place".to_string()),
                1 => {}
                n => errors.push(format!(
                    "State machine may start in one place only, found {n}"
                )),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Same as `validate_structure`, folded into a typed error
    pub fn validate(&self) -> DefinitionResult<()> {
        self.validate_structure()
            .map_err(|errors| DefinitionError::Invalid {
                name: self.name.to_string(),
                errors,
            })
    }
}
