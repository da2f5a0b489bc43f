//! Transition messages, stamps and envelopes
//!
//! A [`TransitionMessage`] names the entity and transition only; consumers
//! re-fetch the entity by id. Routing and partitioning directives travel next
//! to it as [`Stamp`]s inside an [`Envelope`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Default key of a context stamp
pub const DEFAULT_CONTEXT_KEY: &str = "context";

/// Unit of work enqueued for an asynchronous transition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionMessage {
    pub entity_id: String,
    pub entity_type: String,
    pub transition_name: String,
    pub workflow_name: String,
}

impl TransitionMessage {
    pub fn new(
        entity_id: impl Into<String>,
        entity_type: impl Into<String>,
        transition_name: impl Into<String>,
        workflow_name: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            entity_type: entity_type.into(),
            transition_name: transition_name.into(),
            workflow_name: workflow_name.into(),
        }
    }

    /// Message class reported in failure logs
    pub fn class(&self) -> &'static str {
        "TransitionMessage"
    }
}

/// Partition value: a string or an integer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Int(i64),
    Text(String),
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for ContextValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for ContextValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for ContextValue {
    fn from(i: i32) -> Self {
        Self::Int(i.into())
    }
}

/// Partition tag for consumer-side filtering
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextStamp {
    pub key: String,
    pub value: ContextValue,
}

impl ContextStamp {
    /// A stamp under the default `context` key
    pub fn new(value: impl Into<ContextValue>) -> Self {
        Self::keyed(DEFAULT_CONTEXT_KEY, value)
    }

    pub fn keyed(key: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// What an entity exposes for partitioning
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextPayload {
    /// One value under the default key
    Value(ContextValue),
    /// Several values, each under the default key
    Values(Vec<ContextValue>),
    /// Explicit key/value pairs
    Keyed(Vec<(String, ContextValue)>),
}

impl ContextPayload {
    /// One stamp per value, duplicates removed, order kept
    pub fn into_stamps(self) -> Vec<ContextStamp> {
        let stamps: Vec<ContextStamp> = match self {
            Self::Value(value) => vec![ContextStamp::new(value)],
            Self::Values(values) => values.into_iter().map(ContextStamp::new).collect(),
            Self::Keyed(pairs) => pairs
                .into_iter()
                .map(|(key, value)| ContextStamp::keyed(key, value))
                .collect(),
        };

        let mut unique: Vec<ContextStamp> = Vec::with_capacity(stamps.len());
        for stamp in stamps {
            if !unique.contains(&stamp) {
                unique.push(stamp);
            }
        }
        unique
    }
}

/// Capability of entities that carry a partition value
pub trait ContextStampProvider: Send + Sync {
    /// Partition value(s) for the next dispatched message, if any
    fn context_stamp(&self) -> Option<ContextPayload>;
}

/// Directive or lifecycle marker attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Stamp {
    /// Deliver to this queue address
    Route { address: String },
    /// Partition tag
    Context { key: String, value: ContextValue },
    /// Pulled from a transport by a worker
    Received {
        transport: String,
        at: DateTime<Utc>,
    },
    /// Processed by a handler
    Handled {
        handler: String,
        at: DateTime<Utc>,
    },
}

impl Stamp {
    pub fn route(address: impl Into<String>) -> Self {
        Self::Route {
            address: address.into(),
        }
    }

    pub fn received(transport: impl Into<String>) -> Self {
        Self::Received {
            transport: transport.into(),
            at: Utc::now(),
        }
    }

    pub fn handled(handler: impl Into<String>) -> Self {
        Self::Handled {
            handler: handler.into(),
            at: Utc::now(),
        }
    }

    /// Received/handled markers mean the message already went through a bus once
    pub fn is_lifecycle_marker(&self) -> bool {
        matches!(self, Self::Received { .. } | Self::Handled { .. })
    }
}

impl From<ContextStamp> for Stamp {
    fn from(stamp: ContextStamp) -> Self {
        Self::Context {
            key: stamp.key,
            value: stamp.value,
        }
    }
}

/// Identifier of one envelope, for log correlation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvelopeId(Ulid);

impl EnvelopeId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for EnvelopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EnvelopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message together with its stamps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: EnvelopeId,
    pub message: TransitionMessage,
    #[serde(default)]
    stamps: Vec<Stamp>,
}

impl Envelope {
    pub fn new(message: TransitionMessage) -> Self {
        Self {
            id: EnvelopeId::new(),
            message,
            stamps: Vec::new(),
        }
    }

    /// Add a stamp; adding an identical context stamp twice is a no-op
    pub fn with(mut self, stamp: impl Into<Stamp>) -> Self {
        self.push(stamp.into());
        self
    }

    /// Add several stamps in order
    pub fn with_all(mut self, stamps: impl IntoIterator<Item = Stamp>) -> Self {
        for stamp in stamps {
            self.push(stamp);
        }
        self
    }

    fn push(&mut self, stamp: Stamp) {
        if matches!(stamp, Stamp::Context { .. }) && self.stamps.contains(&stamp) {
            return;
        }
        self.stamps.push(stamp);
    }

    pub fn stamps(&self) -> &[Stamp] {
        &self.stamps
    }

    /// Address of the last route stamp
    pub fn route(&self) -> Option<&str> {
        self.stamps.iter().rev().find_map(|stamp| match stamp {
            Stamp::Route { address } => Some(address.as_str()),
            _ => None,
        })
    }

    pub fn has_route(&self) -> bool {
        self.route().is_some()
    }

    /// Whether a received or handled marker is present
    pub fn has_lifecycle_marker(&self) -> bool {
        self.stamps.iter().any(Stamp::is_lifecycle_marker)
    }

    /// Context stamps in attachment order
    pub fn context_stamps(&self) -> impl Iterator<Item = ContextStamp> + '_ {
        self.stamps.iter().filter_map(|stamp| match stamp {
            Stamp::Context { key, value } => Some(ContextStamp::keyed(key.clone(), value.clone())),
            _ => None,
        })
    }

    /// The most recently attached context stamp
    pub fn last_context(&self) -> Option<ContextStamp> {
        self.context_stamps().last()
    }
}
