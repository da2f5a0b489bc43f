//! Consumer loop over one transport

use crate::bus::{BusError, BusResult, ContextFilter, Transport};
use crate::message::{Envelope, Stamp};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Processes one received envelope
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Name reported in handled markers and failure logs
    fn name(&self) -> &str;

    async fn handle(&self, envelope: &Envelope) -> anyhow::Result<()>;
}

/// What happened to one pulled envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// The transport had nothing to deliver
    Idle,
    /// The context filter declined the envelope; it was neither acked nor rejected
    Skipped(Envelope),
    /// The handler succeeded and the envelope was acked
    Handled(Envelope),
}

/// Counters of a worker run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub handled: usize,
    pub skipped: usize,
}

/// Pulls envelopes from one transport and handles them one at a time
pub struct Worker {
    transport: Arc<dyn Transport>,
    handler: Arc<dyn MessageHandler>,
    filter: ContextFilter,
}

impl Worker {
    pub fn new(transport: Arc<dyn Transport>, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            transport,
            handler,
            filter: ContextFilter::accept_all(),
        }
    }

    /// Only handle envelopes the filter accepts
    pub fn with_filter(mut self, filter: ContextFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Pull and process at most one envelope.
    ///
    /// A handler error is logged, the envelope rejected, and the error returned
    /// so the caller's retry policy decides what happens next.
    pub async fn run_once(&self) -> BusResult<WorkerOutcome> {
        let Some(envelope) = self.transport.receive().await? else {
            return Ok(WorkerOutcome::Idle);
        };
        let envelope = envelope.with(Stamp::received(self.transport.name()));

        if !self.filter.should_handle(&envelope) {
            debug!(
                "Envelope {} on '{}' skipped by context filter {:?}",
                envelope.id,
                self.transport.name(),
                self.filter.config().allow_list
            );
            return Ok(WorkerOutcome::Skipped(envelope));
        }

        match self.handler.handle(&envelope).await {
            Ok(()) => {
                self.transport.ack(&envelope).await?;
                let envelope = envelope.with(Stamp::handled(self.handler.name()));
                Ok(WorkerOutcome::Handled(envelope))
            }
            Err(source) => {
                let address = envelope
                    .route()
                    .unwrap_or_else(|| self.transport.name())
                    .to_string();
                let context = envelope
                    .last_context()
                    .map(|stamp| stamp.value.to_string())
                    .unwrap_or_else(|| "none".to_string());
                error!(
                    "Handler '{}' failed for {} {} on '{}' (context: {}): {:#}",
                    self.handler.name(),
                    envelope.message.class(),
                    envelope.id,
                    address,
                    context,
                    source
                );
                self.transport.reject(&envelope).await?;
                Err(BusError::Handler {
                    handler: self.handler.name().to_string(),
                    class: envelope.message.class().to_string(),
                    address,
                    source: source.into(),
                })
            }
        }
    }

    /// Process envelopes until the transport is idle.
    ///
    /// Skipped envelopes stay in flight, so the loop moves past them to the
    /// ones this worker's filter accepts.
    pub async fn run_until_idle(&self) -> BusResult<WorkerStats> {
        let mut stats = WorkerStats::default();
        loop {
            match self.run_once().await? {
                WorkerOutcome::Idle => break,
                WorkerOutcome::Skipped(_) => stats.skipped += 1,
                WorkerOutcome::Handled(_) => stats.handled += 1,
            }
        }
        info!(
            "Worker on '{}' handled {} envelope(s), skipped {}",
            self.transport.name(),
            stats.handled,
            stats.skipped
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{ContextFilterConfig, InMemoryTransport};
    use crate::message::{ContextStamp, TransitionMessage};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl MessageHandler for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        async fn handle(&self, envelope: &Envelope) -> anyhow::Result<()> {
            self.seen
                .lock()
                .unwrap()
                .push(envelope.message.entity_id.clone());
            if self.fail {
                anyhow::bail!("entity {} is locked", envelope.message.entity_id);
            }
            Ok(())
        }
    }

    fn envelope(id: &str) -> Envelope {
        Envelope::new(TransitionMessage::new(id, "Asset", "load", "AssetFlow"))
    }

    #[tokio::test]
    async fn test_handles_and_acks() {
        let queue = Arc::new(InMemoryTransport::new("assetflow.load"));
        queue.send(envelope("1")).await.unwrap();
        let handler = Arc::new(Recording::default());
        let worker = Worker::new(queue.clone(), handler.clone());

        let outcome = worker.run_once().await.unwrap();
        let WorkerOutcome::Handled(envelope) = outcome else {
            panic!("expected a handled envelope");
        };
        assert!(envelope.has_lifecycle_marker());
        assert_eq!(queue.acked().await.len(), 1);
        assert_eq!(worker.run_once().await.unwrap(), WorkerOutcome::Idle);
    }

    #[tokio::test]
    async fn test_filtered_envelope_neither_acked_nor_rejected() {
        let queue = Arc::new(InMemoryTransport::new("assetflow.load"));
        queue
            .send(envelope("1").with(ContextStamp::new("aac")))
            .await
            .unwrap();
        let handler = Arc::new(Recording::default());
        let worker = Worker::new(queue.clone(), handler.clone())
            .with_filter(ContextFilter::new(ContextFilterConfig::parse("euro,ddb")));

        let outcome = worker.run_once().await.unwrap();
        assert!(matches!(outcome, WorkerOutcome::Skipped(_)));
        assert!(handler.seen.lock().unwrap().is_empty());
        assert!(queue.acked().await.is_empty());
        assert!(queue.rejected().await.is_empty());
        assert_eq!(queue.in_flight_count().await, 1);
    }

    #[tokio::test]
    async fn test_failure_rejects_and_propagates() {
        let queue = Arc::new(InMemoryTransport::new("assetflow.load"));
        queue.send(envelope("7")).await.unwrap();
        let handler = Arc::new(Recording {
            fail: true,
            ..Default::default()
        });
        let worker = Worker::new(queue.clone(), handler);

        let err = worker.run_once().await.unwrap_err();
        match err {
            BusError::Handler { address, class, .. } => {
                assert_eq!(address, "assetflow.load");
                assert_eq!(class, "TransitionMessage");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(queue.rejected().await.len(), 1);
    }

    #[tokio::test]
    async fn test_run_until_idle_moves_past_foreign_context() {
        let queue = Arc::new(InMemoryTransport::new("assetflow.load"));
        queue
            .send(envelope("1").with(ContextStamp::new("aac")))
            .await
            .unwrap();
        queue
            .send(envelope("2").with(ContextStamp::new("euro")))
            .await
            .unwrap();
        let handler = Arc::new(Recording::default());
        let worker = Worker::new(queue.clone(), handler.clone())
            .with_filter(ContextFilter::new(ContextFilterConfig::parse("euro")));

        let stats = worker.run_until_idle().await.unwrap();

        assert_eq!(stats, WorkerStats { handled: 1, skipped: 1 });
        assert_eq!(*handler.seen.lock().unwrap(), vec!["2"]);
        assert!(queue.pending().await.is_empty());
        assert_eq!(queue.acked().await.len(), 1);
        assert_eq!(queue.in_flight_count().await, 1);
    }

    #[tokio::test]
    async fn test_run_until_idle() {
        let queue = Arc::new(InMemoryTransport::new("q"));
        for id in ["1", "2", "3"] {
            queue.send(envelope(id)).await.unwrap();
        }
        let handler = Arc::new(Recording::default());
        let stats = Worker::new(queue, handler.clone())
            .run_until_idle()
            .await
            .unwrap();

        assert_eq!(stats.handled, 3);
        assert_eq!(*handler.seen.lock().unwrap(), vec!["1", "2", "3"]);
    }
}
