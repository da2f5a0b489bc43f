//! Middleware chain for outbound envelopes

use crate::bus::BusResult;
use crate::message::Envelope;
use async_trait::async_trait;
use std::sync::Arc;

/// Final stage of the chain: hands the envelope to a transport
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send(&self, envelope: Envelope) -> BusResult<Envelope>;
}

/// One stage of outbound processing
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Inspect or stamp the envelope, then pass it on with `next.run`
    async fn handle(&self, envelope: Envelope, next: Next<'_>) -> BusResult<Envelope>;
}

/// The rest of the chain after the current middleware
pub struct Next<'a> {
    middlewares: &'a [Arc<dyn Middleware>],
    sender: &'a dyn Sender,
}

impl<'a> Next<'a> {
    pub fn new(middlewares: &'a [Arc<dyn Middleware>], sender: &'a dyn Sender) -> Self {
        Self {
            middlewares,
            sender,
        }
    }

    /// Continue with the remaining middlewares, then the sender
    pub async fn run(self, envelope: Envelope) -> BusResult<Envelope> {
        match self.middlewares.split_first() {
            Some((head, tail)) => head.handle(envelope, Next::new(tail, self.sender)).await,
            None => self.sender.send(envelope).await,
        }
    }
}
