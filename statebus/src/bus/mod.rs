//! Message bus: middleware, transports and consumer workers
//!
//! Outbound envelopes run through a middleware stack before a transport
//! receives them. Workers pull envelopes back out of a transport and hand
//! them to a [`MessageHandler`].

mod context;
mod middleware;
mod routing;
mod transport;
mod worker;

pub use context::{ContextFilter, ContextFilterConfig, DEFAULT_FILTER_ENV, FILTER_ENV_OVERRIDE};
pub use middleware::{Middleware, Next, Sender};
pub use routing::AsyncQueueRoutingMiddleware;
pub use transport::{InMemoryTransport, SenderBus, SenderBusBuilder, Transport};
pub use worker::{MessageHandler, Worker, WorkerOutcome, WorkerStats};

use crate::message::Envelope;
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised on the bus
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BusError {
    /// The envelope is routed to a transport nobody registered
    #[error("No transport named '{0}'")]
    UnknownTransport(String),

    /// The envelope carries no route and no default transport exists
    #[error("No route for {workflow}.{transition} and no default transport")]
    NoRoute {
        workflow: String,
        transition: String,
    },

    /// A transport failed to accept or deliver an envelope
    #[error("Transport '{transport}' failed: {message}")]
    Transport { transport: String, message: String },

    /// A handler failed; the envelope was rejected
    #[error("Handler '{handler}' failed for {class} on '{address}': {source}")]
    Handler {
        handler: String,
        class: String,
        address: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Result type for bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Entry point for dispatching envelopes
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Dispatch an envelope, returning it as it left the bus
    async fn dispatch(&self, envelope: Envelope) -> BusResult<Envelope>;
}
