//! Typed metadata attached to places and transitions
//!
//! Well-known keys get their own fields. Anything else is preserved untouched in
//! `extensions` so newer declarative sources keep round-tripping through older
//! builds.

use crate::workflow::{DefinitionError, TransitionName};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Metadata recognized on a place
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaceMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        rename = "backgroundColor",
        skip_serializing_if = "Option::is_none"
    )]
    pub background_color: Option<String>,
    /// Transitions attempted, in order, right after the place is entered
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub next: Vec<TransitionName>,
    #[serde(flatten)]
    pub extensions: BTreeMap<String, Value>,
}

impl PlaceMetadata {
    /// Build typed place metadata out of a loose declarative map
    pub fn from_map(mut map: Map<String, Value>) -> Result<Self, DefinitionError> {
        let info = take_string(&mut map, "info")?;
        let description = take_string(&mut map, "description")?;
        let background_color = take_string(&mut map, "backgroundColor")?;
        let next = take_next(&mut map)?;

        Ok(Self {
            info,
            description,
            background_color,
            next,
            extensions: map.into_iter().collect(),
        })
    }

    /// True when no key at all is set
    pub fn is_empty(&self) -> bool {
        self.info.is_none()
            && self.description.is_none()
            && self.background_color.is_none()
            && self.next.is_empty()
            && self.extensions.is_empty()
    }
}

/// Metadata recognized on a transition
///
/// The guard expression never lives here; it is a field of the transition itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Run this transition on a queue-backed worker instead of inline
    #[serde(default, rename = "async", skip_serializing_if = "is_false")]
    pub is_async: bool,
    /// Queue address used verbatim instead of the computed one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    /// Transitions attempted, in order, once this one completes
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub next: Vec<TransitionName>,
    #[serde(flatten)]
    pub extensions: BTreeMap<String, Value>,
}

impl TransitionMetadata {
    /// Build typed transition metadata out of a loose declarative map.
    ///
    /// A `guard` key must already have been removed by the caller.
    pub fn from_map(mut map: Map<String, Value>) -> Result<Self, DefinitionError> {
        let info = take_string(&mut map, "info")?;
        let description = take_string(&mut map, "description")?;
        let is_async = match map.remove("async") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => flag,
            Some(other) => {
                return Err(DefinitionError::InvalidMetadata {
                    key: "async".to_string(),
                    reason: format!("expected a boolean, got {other}"),
                })
            }
        };
        let transport = take_string(&mut map, "transport")?.filter(|t| !t.trim().is_empty());
        let next = take_next(&mut map)?;

        Ok(Self {
            info,
            description,
            is_async,
            transport,
            next,
            extensions: map.into_iter().collect(),
        })
    }

    /// True when no key at all is set
    pub fn is_empty(&self) -> bool {
        self.info.is_none()
            && self.description.is_none()
            && !self.is_async
            && self.transport.is_none()
            && self.next.is_empty()
            && self.extensions.is_empty()
    }
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Result<Option<String>, DefinitionError> {
    match map.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(DefinitionError::InvalidMetadata {
            key: key.to_string(),
            reason: format!("expected a string, got {other}"),
        }),
    }
}

fn take_next(map: &mut Map<String, Value>) -> Result<Vec<TransitionName>, DefinitionError> {
    let value = map.remove("next").unwrap_or(Value::Null);
    next_from_value(value).map_err(|reason| DefinitionError::InvalidMetadata {
        key: "next".to_string(),
        reason,
    })
}

/// Normalize a `next` value: absent, a scalar name, or a list of names
pub(crate) fn next_from_value(value: Value) -> Result<Vec<TransitionName>, String> {
    let names = match value {
        Value::Null => Vec::new(),
        Value::String(name) => vec![name],
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(name) => Ok(name),
                other => Err(format!("expected a transition name, got {other}")),
            })
            .collect::<Result<Vec<_>, _>>()?,
        other => return Err(format!("expected a name or a list of names, got {other}")),
    };

    names
        .into_iter()
        .map(|name| TransitionName::try_new(name).map_err(|e| e.to_string()))
        .collect()
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<TransitionName>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    next_from_value(value).map_err(serde::de::Error::custom)
}
