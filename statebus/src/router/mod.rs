//! Async transition router
//!
//! Decides which `(workflow, transition)` pairs execute on a queue-backed
//! worker and computes the queue address for each.

mod planner;
pub mod slug;

pub use planner::{
    AsyncRouteMap, AsyncTransitionRouter, RoutePlan, RouterConfig, TransportDescriptor,
    DEFAULT_TRANSPORT_DSN,
};
pub use slug::{normalize_prefix, normalize_slug, queue_address};

use thiserror::Error;

/// Errors raised while planning routes
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RouterError {
    /// Two different transitions computed the same queue address
    #[error("Queue address '{address}' computed for both {first} and {second}")]
    AddressCollision {
        address: String,
        first: String,
        second: String,
    },

    /// A name normalized to nothing
    #[error("Workflow '{workflow}' transition '{transition}' normalizes to an empty queue slug")]
    EmptySlug {
        workflow: String,
        transition: String,
    },
}

/// Result type for router operations
pub type RouterResult<T> = Result<T, RouterError>;
