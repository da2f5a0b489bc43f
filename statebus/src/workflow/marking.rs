//! The set of places an entity currently occupies in one workflow

use crate::workflow::{transition::dedup, PlaceName, Transition, WorkflowKind};
use serde::{Deserialize, Serialize};

/// Ordered set of marked places
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Marking {
    places: Vec<PlaceName>,
}

impl Marking {
    /// An empty marking
    pub fn empty() -> Self {
        Self::default()
    }

    /// A marking holding exactly one place
    pub fn single(place: impl Into<PlaceName>) -> Self {
        Self {
            places: vec![place.into()],
        }
    }

    /// Build a marking from any set of places
    pub fn from_places<I>(places: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<PlaceName>,
    {
        Self {
            places: dedup(places.into_iter().map(Into::into)),
        }
    }

    pub fn places(&self) -> &[PlaceName] {
        &self.places
    }

    pub fn contains(&self, place: &PlaceName) -> bool {
        self.places.contains(place)
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    /// Whether the marking lets `transition` fire.
    ///
    /// A state machine only needs its current place among the sources; a
    /// workflow needs every source place marked.
    pub fn permits(&self, kind: WorkflowKind, transition: &Transition) -> bool {
        if transition.from.is_empty() {
            return false;
        }
        match kind {
            WorkflowKind::StateMachine => transition.from.iter().any(|p| self.contains(p)),
            WorkflowKind::Workflow => transition.from.iter().all(|p| self.contains(p)),
        }
    }

    /// The marking after `transition` fires
    pub fn advance(&self, kind: WorkflowKind, transition: &Transition) -> Self {
        match kind {
            WorkflowKind::StateMachine => Self::from_places(transition.to.iter().cloned()),
            WorkflowKind::Workflow => {
                let kept = self
                    .places
                    .iter()
                    .filter(|p| !transition.from.contains(p))
                    .cloned();
                Self::from_places(kept.chain(transition.to.iter().cloned()))
            }
        }
    }

    /// Place names as plain strings, for logging and guard contexts
    pub fn names(&self) -> Vec<String> {
        self.places.iter().map(|p| p.as_str().to_string()).collect()
    }
}

impl std::fmt::Display for Marking {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.names().join(", "))
    }
}
