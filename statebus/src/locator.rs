//! Runtime view over the planned routes
//!
//! Answers whether a transition runs on a queue and which stamps a dispatched
//! message carries. Unknown pairs are simply synchronous.

use crate::message::{ContextStampProvider, Stamp, TransitionMessage};
use crate::router::slug::slug_pair;
use crate::router::AsyncRouteMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Read-only lookups over an [`AsyncRouteMap`]
#[derive(Debug)]
pub struct QueueLocator {
    routes: Arc<AsyncRouteMap>,
    sync: AtomicBool,
    forced_transport: Option<String>,
}

impl QueueLocator {
    pub fn new(routes: impl Into<Arc<AsyncRouteMap>>) -> Self {
        Self {
            routes: routes.into(),
            sync: AtomicBool::new(false),
            forced_transport: None,
        }
    }

    /// Send every async message to `transport` instead of its computed address
    pub fn with_forced_transport(mut self, transport: impl Into<String>) -> Self {
        self.forced_transport = Some(transport.into()).filter(|t: &String| !t.trim().is_empty());
        self
    }

    /// Start with the force-synchronous override set
    pub fn with_sync(self, sync: bool) -> Self {
        self.set_sync(sync);
        self
    }

    /// Toggle the force-synchronous override
    pub fn set_sync(&self, sync: bool) {
        self.sync.store(sync, Ordering::SeqCst);
    }

    pub fn is_sync(&self) -> bool {
        self.sync.load(Ordering::SeqCst)
    }

    pub fn routes(&self) -> &AsyncRouteMap {
        &self.routes
    }

    pub fn forced_transport(&self) -> Option<&str> {
        self.forced_transport.as_deref()
    }

    /// Whether the pair executes on a queue-backed worker
    pub fn is_async(&self, workflow: &str, transition: &str) -> bool {
        !self.is_sync() && self.computed(workflow, transition).is_some()
    }

    /// Queue address of an async pair; absent means run synchronously.
    ///
    /// The sync override is honored here as well as in
    /// [`is_async`](Self::is_async), so no address is handed out while it is on.
    pub fn queue_for(&self, workflow: &str, transition: &str) -> Option<String> {
        if self.is_sync() {
            return None;
        }
        let computed = self.computed(workflow, transition)?;
        Some(
            self.forced_transport
                .clone()
                .unwrap_or_else(|| computed.to_string()),
        )
    }

    /// Stamps for a dispatched message: a route when async, then partition tags
    pub fn stamps_for(
        &self,
        message: &TransitionMessage,
        provider: Option<&dyn ContextStampProvider>,
    ) -> Vec<Stamp> {
        let mut stamps = Vec::new();

        match self.queue_for(&message.workflow_name, &message.transition_name) {
            Some(address) => {
                debug!(
                    "Routing {}.{} for {} '{}' to '{}'",
                    message.workflow_name,
                    message.transition_name,
                    message.entity_type,
                    message.entity_id,
                    address
                );
                stamps.push(Stamp::route(address));
            }
            None => debug!(
                "{}.{} runs synchronously",
                message.workflow_name, message.transition_name
            ),
        }

        if let Some(payload) = provider.and_then(|p| p.context_stamp()) {
            for stamp in payload.into_stamps() {
                let stamp = Stamp::from(stamp);
                if !stamps.contains(&stamp) {
                    stamps.push(stamp);
                }
            }
        }

        stamps
    }

    fn computed(&self, workflow: &str, transition: &str) -> Option<&str> {
        let (wf, tr) = slug_pair(workflow, transition);
        self.routes.get(&wf, &tr)
    }
}
