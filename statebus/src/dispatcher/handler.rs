//! Consumer side of asynchronous transitions

use crate::bus::MessageHandler;
use crate::dispatcher::{EntityLoader, EntityStore, TransitionDispatcher};
use crate::message::Envelope;
use crate::workflow::{TransitionName, WorkflowName};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Re-fetches the entity named by a [`TransitionMessage`](crate::message::TransitionMessage)
/// and applies the transition through the dispatcher.
///
/// Redelivered messages whose transition is no longer enabled are a no-op, so
/// at-least-once delivery never moves an entity twice.
pub struct TransitionMessageHandler {
    dispatcher: Arc<TransitionDispatcher>,
    loader: Arc<dyn EntityLoader>,
    store: Arc<dyn EntityStore>,
}

impl TransitionMessageHandler {
    pub fn new(
        dispatcher: Arc<TransitionDispatcher>,
        loader: Arc<dyn EntityLoader>,
        store: Arc<dyn EntityStore>,
    ) -> Self {
        Self {
            dispatcher,
            loader,
            store,
        }
    }
}

#[async_trait]
impl MessageHandler for TransitionMessageHandler {
    fn name(&self) -> &str {
        "transition_message_handler"
    }

    async fn handle(&self, envelope: &Envelope) -> anyhow::Result<()> {
        let message = &envelope.message;
        let workflow = WorkflowName::try_new(message.workflow_name.as_str())?;
        let transition = TransitionName::try_new(message.transition_name.as_str())?;

        let mut subject = self
            .loader
            .find(&message.entity_type, &message.entity_id)
            .await?
            .ok_or_else(|| {
                anyhow!(
                    "{} '{}' no longer exists",
                    message.entity_type,
                    message.entity_id
                )
            })?;

        let Some(report) = self
            .dispatcher
            .apply_if_enabled(subject.as_mut(), &workflow, &transition)
            .await?
        else {
            info!(
                "{}.{} is no longer enabled for {} '{}' at {}; nothing to do",
                workflow,
                transition,
                message.entity_type,
                message.entity_id,
                subject.marking(&workflow)
            );
            return Ok(());
        };

        self.store
            .persist(subject.as_ref())
            .await
            .with_context(|| format!("persisting {} '{}'", message.entity_type, message.entity_id))?;
        debug!(
            "Applied {:?} for {} '{}', {} follow-up message(s)",
            report.applied,
            message.entity_type,
            message.entity_id,
            report.dispatched.len()
        );
        Ok(())
    }
}
