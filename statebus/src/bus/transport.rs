//! Transports and the sending bus

use crate::bus::{BusError, BusResult, MessageBus, Middleware, Next, Sender};
use crate::message::{Envelope, EnvelopeId};
use crate::router::RoutePlan;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// A queue the bus can send to and workers can pull from
#[async_trait]
pub trait Transport: Send + Sync {
    /// Name the transport is addressed by
    fn name(&self) -> &str;

    /// Enqueue an envelope
    async fn send(&self, envelope: Envelope) -> BusResult<Envelope>;

    /// Take the next envelope, if any; it stays in flight until acked or rejected
    async fn receive(&self) -> BusResult<Option<Envelope>>;

    /// Confirm an envelope was processed
    async fn ack(&self, envelope: &Envelope) -> BusResult<()>;

    /// Report an envelope as failed
    async fn reject(&self, envelope: &Envelope) -> BusResult<()>;
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<Envelope>,
    in_flight: HashMap<EnvelopeId, Envelope>,
    acked: Vec<Envelope>,
    rejected: Vec<Envelope>,
}

/// FIFO transport kept in process memory
#[derive(Debug)]
pub struct InMemoryTransport {
    name: String,
    state: Mutex<QueueState>,
}

impl InMemoryTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QueueState::default()),
        }
    }

    /// One transport per queue of a route plan
    pub fn for_plan(plan: &RoutePlan) -> Vec<Arc<InMemoryTransport>> {
        plan.transports
            .iter()
            .map(|descriptor| Arc::new(Self::new(descriptor.queue_name.clone())))
            .collect()
    }

    /// Envelopes waiting to be received
    pub async fn pending(&self) -> Vec<Envelope> {
        self.state.lock().await.ready.iter().cloned().collect()
    }

    pub async fn in_flight_count(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    pub async fn acked(&self) -> Vec<Envelope> {
        self.state.lock().await.acked.clone()
    }

    pub async fn rejected(&self) -> Vec<Envelope> {
        self.state.lock().await.rejected.clone()
    }

    /// Put every in-flight envelope back on the queue, as a visibility timeout would
    pub async fn redeliver_in_flight(&self) -> usize {
        let mut state = self.state.lock().await;
        let mut returned: Vec<Envelope> = state.in_flight.drain().map(|(_, e)| e).collect();
        returned.sort_by_key(|e| e.id);
        let count = returned.len();
        for envelope in returned {
            state.ready.push_back(envelope);
        }
        count
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, envelope: Envelope) -> BusResult<Envelope> {
        trace!("Queue '{}' accepted envelope {}", self.name, envelope.id);
        self.state.lock().await.ready.push_back(envelope.clone());
        Ok(envelope)
    }

    async fn receive(&self) -> BusResult<Option<Envelope>> {
        let mut state = self.state.lock().await;
        let envelope = state.ready.pop_front();
        if let Some(envelope) = &envelope {
            state.in_flight.insert(envelope.id, envelope.clone());
        }
        Ok(envelope)
    }

    async fn ack(&self, envelope: &Envelope) -> BusResult<()> {
        let mut state = self.state.lock().await;
        let settled = state.in_flight.remove(&envelope.id).ok_or_else(|| BusError::Transport {
            transport: self.name.clone(),
            message: format!("envelope {} is not in flight", envelope.id),
        })?;
        state.acked.push(settled);
        Ok(())
    }

    async fn reject(&self, envelope: &Envelope) -> BusResult<()> {
        let mut state = self.state.lock().await;
        let settled = state.in_flight.remove(&envelope.id).ok_or_else(|| BusError::Transport {
            transport: self.name.clone(),
            message: format!("envelope {} is not in flight", envelope.id),
        })?;
        state.rejected.push(settled);
        Ok(())
    }
}

struct TransportSender {
    transports: HashMap<String, Arc<dyn Transport>>,
    default_transport: Option<Arc<dyn Transport>>,
}

#[async_trait]
impl Sender for TransportSender {
    async fn send(&self, envelope: Envelope) -> BusResult<Envelope> {
        let transport = match envelope.route() {
            Some(address) => self
                .transports
                .get(address)
                .ok_or_else(|| BusError::UnknownTransport(address.to_string()))?,
            None => self
                .default_transport
                .as_ref()
                .ok_or_else(|| BusError::NoRoute {
                    workflow: envelope.message.workflow_name.clone(),
                    transition: envelope.message.transition_name.clone(),
                })?,
        };
        debug!("Sending envelope {} to '{}'", envelope.id, transport.name());
        transport.send(envelope).await
    }
}

/// Bus that runs the middleware stack, then sends to the routed transport
pub struct SenderBus {
    middlewares: Vec<Arc<dyn Middleware>>,
    sender: TransportSender,
}

impl SenderBus {
    pub fn builder() -> SenderBusBuilder {
        SenderBusBuilder::default()
    }

    pub fn transport(&self, name: &str) -> Option<&Arc<dyn Transport>> {
        self.sender.transports.get(name)
    }
}

#[async_trait]
impl MessageBus for SenderBus {
    async fn dispatch(&self, envelope: Envelope) -> BusResult<Envelope> {
        Next::new(&self.middlewares, &self.sender).run(envelope).await
    }
}

/// Builder for [`SenderBus`]
#[derive(Default)]
pub struct SenderBusBuilder {
    middlewares: Vec<Arc<dyn Middleware>>,
    transports: HashMap<String, Arc<dyn Transport>>,
    default_transport: Option<Arc<dyn Transport>>,
}

impl SenderBusBuilder {
    /// Append a middleware; they run in insertion order
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Register a transport under its own name
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transports
            .insert(transport.name().to_string(), transport);
        self
    }

    /// Transport receiving envelopes without a route
    pub fn default_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.default_transport = Some(transport);
        self
    }

    pub fn build(self) -> SenderBus {
        SenderBus {
            middlewares: self.middlewares,
            sender: TransportSender {
                transports: self.transports,
                default_transport: self.default_transport,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Stamp, TransitionMessage};

    fn envelope() -> Envelope {
        Envelope::new(TransitionMessage::new("1", "Asset", "load", "AssetFlow"))
    }

    #[tokio::test]
    async fn test_in_memory_fifo_and_ack() {
        let queue = InMemoryTransport::new("assetflow.load");
        let first = queue.send(envelope()).await.unwrap();
        let second = queue.send(envelope()).await.unwrap();

        let received = queue.receive().await.unwrap().unwrap();
        assert_eq!(received.id, first.id);
        assert_eq!(queue.in_flight_count().await, 1);

        queue.ack(&received).await.unwrap();
        assert_eq!(queue.acked().await.len(), 1);
        assert_eq!(queue.pending().await[0].id, second.id);
    }

    #[tokio::test]
    async fn test_ack_unknown_envelope_fails() {
        let queue = InMemoryTransport::new("q");
        assert!(queue.ack(&envelope()).await.is_err());
    }

    #[tokio::test]
    async fn test_redelivery() {
        let queue = InMemoryTransport::new("q");
        queue.send(envelope()).await.unwrap();
        let received = queue.receive().await.unwrap().unwrap();

        assert_eq!(queue.redeliver_in_flight().await, 1);
        let again = queue.receive().await.unwrap().unwrap();
        assert_eq!(again.id, received.id);
    }

    #[tokio::test]
    async fn test_bus_sends_to_routed_transport() {
        let queue = Arc::new(InMemoryTransport::new("assetflow.load"));
        let sync = Arc::new(InMemoryTransport::new("sync"));
        let bus = SenderBus::builder()
            .transport(queue.clone())
            .default_transport(sync.clone())
            .build();

        bus.dispatch(envelope().with(Stamp::route("assetflow.load")))
            .await
            .unwrap();
        bus.dispatch(envelope()).await.unwrap();

        assert_eq!(queue.pending().await.len(), 1);
        assert_eq!(sync.pending().await.len(), 1);
    }

    #[tokio::test]
    async fn test_bus_errors_without_destination() {
        let bus = SenderBus::builder().build();

        let err = bus.dispatch(envelope()).await.unwrap_err();
        assert!(matches!(err, BusError::NoRoute { .. }));

        let err = bus
            .dispatch(envelope().with(Stamp::route("missing")))
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::UnknownTransport(ref name) if name == "missing"));
    }
}
