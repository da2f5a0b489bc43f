//! # statebus
//!
//! Declarative workflow state machines whose transitions chain automatically,
//! with asynchronous transitions routed to per-transition queues.
//!
//! ## Features
//!
//! - **Definition compiler**: YAML/JSON sources and code-registered declarations
//!   become validated [`WorkflowDefinition`]s
//! - **Async routing**: every transition flagged `async` gets a deterministic
//!   queue address such as `assetflow.load`
//! - **Dispatcher**: follows `next` chains, applying synchronous transitions
//!   inline and persisting before enqueueing asynchronous ones
//! - **Context partitioning**: consumers sharing a queue pick messages by
//!   context stamp
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use statebus::compiler::{PlaceDeclaration, TransitionDeclaration, WorkflowDeclaration};
//! use statebus::{Config, StateBus};
//!
//! # fn main() -> statebus::Result<()> {
//! let bus = StateBus::builder(Config::new())
//!     .register(
//!         WorkflowDeclaration::new("AssetFlow")
//!             .supports(["Asset"])
//!             .place(PlaceDeclaration::new("new").initial().next(["load"]))
//!             .place("loaded")
//!             .transition(TransitionDeclaration::new("load", "new", "loaded").asynchronous()),
//!     )
//!     .build()?;
//!
//! assert_eq!(bus.locator().queue_for("AssetFlow", "load").as_deref(), Some("assetflow.load"));
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod compiler;
pub mod config;
pub mod dispatcher;
pub mod env_loader;
pub mod error;
pub mod locator;
pub mod logging;
pub mod message;
pub mod router;
pub mod runtime;
pub mod workflow;

pub use bus::{ContextFilter, ContextFilterConfig, MessageBus, MessageHandler, Worker};
pub use compiler::{CompiledWorkflows, DefinitionCompiler};
pub use config::Config;
pub use dispatcher::{
    DispatchReport, EntityLoader, EntityStore, TransitionDispatcher, TransitionMessageHandler,
    WorkflowSubject,
};
pub use error::{Result, StateBusError};
pub use locator::QueueLocator;
pub use message::{ContextStamp, ContextStampProvider, Envelope, Stamp, TransitionMessage};
pub use router::{AsyncRouteMap, AsyncTransitionRouter, RoutePlan, RouterConfig};
pub use runtime::{StateBus, StateBusBuilder};
pub use workflow::{Marking, WorkflowDefinition, WorkflowKind, WorkflowName, WorkflowRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
