//! Automatic queue routing for outbound transition messages

use crate::bus::{BusResult, Middleware, Next};
use crate::locator::QueueLocator;
use crate::message::{Envelope, Stamp};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Stamps a route on envelopes whose transition is asynchronous.
///
/// Envelopes that were already received or handled, or that carry an explicit
/// route, pass through untouched.
pub struct AsyncQueueRoutingMiddleware {
    locator: Arc<QueueLocator>,
}

impl AsyncQueueRoutingMiddleware {
    pub fn new(locator: Arc<QueueLocator>) -> Self {
        Self { locator }
    }
}

#[async_trait]
impl Middleware for AsyncQueueRoutingMiddleware {
    async fn handle(&self, envelope: Envelope, next: Next<'_>) -> BusResult<Envelope> {
        if envelope.has_lifecycle_marker() || envelope.has_route() {
            return next.run(envelope).await;
        }

        let message = &envelope.message;
        let envelope = match self
            .locator
            .queue_for(&message.workflow_name, &message.transition_name)
        {
            Some(address) => {
                debug!("Envelope {} routed to '{}'", envelope.id, address);
                envelope.with(Stamp::route(address))
            }
            None => envelope,
        };

        next.run(envelope).await
    }
}
