//! Place-related types for workflows

use crate::workflow::PlaceMetadata;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when creating place-related types
#[derive(Debug, Error)]
pub enum PlaceError {
    /// Place name cannot be empty or whitespace only
    #[error("Place name cannot be empty or whitespace only")]
    EmptyPlaceName,
}

/// Result type for place operations
pub type PlaceResult<T> = Result<T, PlaceError>;

/// Unique identifier for a place within one workflow
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlaceName(String);

impl PlaceName {
    /// Create a new place name
    ///
    /// # Panics
    /// Panics if the name is empty or whitespace only. For non-panicking creation,
    /// use `try_new` instead.
    pub fn new(name: impl Into<String>) -> Self {
        Self::try_new(name).expect("Place name cannot be empty or whitespace only")
    }

    /// Create a new place name, returning an error for invalid input
    pub fn try_new(name: impl Into<String>) -> PlaceResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PlaceError::EmptyPlaceName);
        }
        Ok(Self(name))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PlaceName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PlaceName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for PlaceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named state in a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    /// Name of the place, unique within its workflow
    pub name: PlaceName,
    /// Display and chaining metadata attached to this place
    #[serde(default, skip_serializing_if = "PlaceMetadata::is_empty")]
    pub metadata: PlaceMetadata,
}

impl Place {
    /// Create a place without metadata
    pub fn new(name: impl Into<PlaceName>) -> Self {
        Self {
            name: name.into(),
            metadata: PlaceMetadata::default(),
        }
    }

    /// Attach metadata to the place
    pub fn with_metadata(mut self, metadata: PlaceMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::TransitionName;

    #[test]
    fn test_place_name_creation() {
        let a = PlaceName::new("new");
        let b = PlaceName::from("new");
        let c: PlaceName = "new".into();

        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a.as_str(), "new");
    }

    #[test]
    fn test_place_name_try_new_empty_error() {
        assert!(PlaceName::try_new("").is_err());
        assert!(PlaceName::try_new("  \t").is_err());
    }

    #[test]
    #[should_panic(expected = "Place name cannot be empty or whitespace only")]
    fn test_place_name_new_panics_on_empty() {
        PlaceName::new("");
    }

    #[test]
    fn test_place_without_metadata_serializes_bare() {
        let place = Place::new("loaded");
        let json = serde_json::to_value(&place).unwrap();
        assert_eq!(json, serde_json::json!({ "name": "loaded" }));
    }

    #[test]
    fn test_place_with_next_keeps_order() {
        let place = Place::new("new").with_metadata(PlaceMetadata {
            next: vec![TransitionName::new("load"), TransitionName::new("skip")],
            ..Default::default()
        });
        let names: Vec<_> = place.metadata.next.iter().map(|t| t.as_str()).collect();
        assert_eq!(names, vec!["load", "skip"]);
    }
}
