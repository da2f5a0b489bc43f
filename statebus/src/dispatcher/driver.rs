//! Explicit transition driver
//!
//! Entity-mutation code calls the dispatcher after a place was entered or a
//! transition completed. The dispatcher reads the automatic `next` candidates
//! of that source, fires the first enabled one and keeps following the chain
//! for synchronous transitions. Asynchronous candidates are persisted and
//! handed to the message bus instead.

use crate::bus::MessageBus;
use crate::dispatcher::{
    DispatchError, DispatchResult, EntityStore, IdentityResolver, WorkflowSubject,
};
use crate::locator::QueueLocator;
use crate::message::{Envelope, TransitionMessage};
use crate::workflow::{
    GuardEvaluator, PlaceName, Transition, TransitionName, WorkflowDefinition, WorkflowName,
    WorkflowRegistry,
};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Default bound on synchronous hops following one root event
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 32;

/// Lifecycle event observed while driving a workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowEvent {
    Entered {
        workflow: WorkflowName,
        place: PlaceName,
    },
    Completed {
        workflow: WorkflowName,
        transition: TransitionName,
    },
}

/// What one dispatcher call did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    /// Transitions applied inline, in order
    pub applied: Vec<TransitionName>,
    /// Envelopes handed to the bus
    pub dispatched: Vec<Envelope>,
    /// Every event processed, in processing order
    pub events: Vec<WorkflowEvent>,
    /// Async candidates dropped because the entity had no identity
    pub abandoned: Vec<TransitionName>,
}

impl DispatchReport {
    fn merge(&mut self, other: DispatchReport) {
        self.applied.extend(other.applied);
        self.dispatched.extend(other.dispatched);
        self.events.extend(other.events);
        self.abandoned.extend(other.abandoned);
    }
}

/// Drives automatic transitions for workflow subjects
pub struct TransitionDispatcher {
    registry: Arc<WorkflowRegistry>,
    locator: Arc<QueueLocator>,
    guards: Arc<GuardEvaluator>,
    identity: IdentityResolver,
    store: Arc<dyn EntityStore>,
    bus: Arc<dyn MessageBus>,
    max_chain_depth: usize,
}

impl TransitionDispatcher {
    pub fn new(
        registry: Arc<WorkflowRegistry>,
        locator: Arc<QueueLocator>,
        store: Arc<dyn EntityStore>,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        Self {
            registry,
            locator,
            guards: Arc::new(GuardEvaluator::new()),
            identity: IdentityResolver::default(),
            store,
            bus,
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
        }
    }

    /// Share a guard evaluator, and its program cache, with other components
    pub fn with_guards(mut self, guards: Arc<GuardEvaluator>) -> Self {
        self.guards = guards;
        self
    }

    pub fn with_identity(mut self, identity: IdentityResolver) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_max_chain_depth(mut self, depth: usize) -> Self {
        self.max_chain_depth = depth;
        self
    }

    pub fn registry(&self) -> &WorkflowRegistry {
        &self.registry
    }

    pub fn locator(&self) -> &QueueLocator {
        &self.locator
    }

    /// Put a fresh subject into the initial marking and run the entered chain
    pub async fn initialize(
        &self,
        subject: &mut dyn WorkflowSubject,
        workflow: &WorkflowName,
    ) -> DispatchResult<DispatchReport> {
        let definition = self.definition_for(&*subject, workflow)?;
        let initial = definition.initial();
        debug!(
            "Initializing {} in {} at {}",
            subject.entity_type(),
            workflow,
            initial
        );
        subject.set_marking(workflow, initial.clone());

        let events = initial
            .places()
            .iter()
            .map(|place| WorkflowEvent::Entered {
                workflow: workflow.clone(),
                place: place.clone(),
            })
            .collect();
        self.run_chain(subject, &definition, events).await
    }

    /// React to `place` having been entered
    pub async fn on_entered(
        &self,
        subject: &mut dyn WorkflowSubject,
        workflow: &WorkflowName,
        place: &PlaceName,
    ) -> DispatchResult<DispatchReport> {
        let definition = self.definition_for(&*subject, workflow)?;
        if !definition.has_place(place) {
            return Err(DispatchError::UnknownPlace {
                workflow: workflow.to_string(),
                place: place.to_string(),
            });
        }
        let event = WorkflowEvent::Entered {
            workflow: workflow.clone(),
            place: place.clone(),
        };
        self.run_chain(subject, &definition, vec![event]).await
    }

    /// React to `transition` having completed
    pub async fn on_completed(
        &self,
        subject: &mut dyn WorkflowSubject,
        workflow: &WorkflowName,
        transition: &TransitionName,
    ) -> DispatchResult<DispatchReport> {
        let definition = self.definition_for(&*subject, workflow)?;
        if definition.transition(transition).is_none() {
            return Err(unknown_transition(workflow, transition));
        }
        let event = WorkflowEvent::Completed {
            workflow: workflow.clone(),
            transition: transition.clone(),
        };
        self.run_chain(subject, &definition, vec![event]).await
    }

    /// Apply `transition` inline, then follow the automatic chain.
    ///
    /// The transition runs here even when it is flagged async; this is the
    /// entry point consumers use once a queued message arrives.
    pub async fn apply(
        &self,
        subject: &mut dyn WorkflowSubject,
        workflow: &WorkflowName,
        transition: &TransitionName,
    ) -> DispatchResult<DispatchReport> {
        match self.apply_if_enabled(subject, workflow, transition).await? {
            Some(report) => Ok(report),
            None => Err(DispatchError::NotEnabled {
                workflow: workflow.to_string(),
                transition: transition.to_string(),
                marking: subject.marking(workflow).to_string(),
            }),
        }
    }

    /// Like [`apply`](Self::apply), but `Ok(None)` when the transition is not enabled
    pub async fn apply_if_enabled(
        &self,
        subject: &mut dyn WorkflowSubject,
        workflow: &WorkflowName,
        transition: &TransitionName,
    ) -> DispatchResult<Option<DispatchReport>> {
        let definition = self.definition_for(&*subject, workflow)?;
        let target = definition
            .transition(transition)
            .ok_or_else(|| unknown_transition(workflow, transition))?;
        if !self.is_enabled(&*subject, &definition, target) {
            return Ok(None);
        }

        let events = fire(subject, &definition, target);
        let mut report = DispatchReport {
            applied: vec![target.name.clone()],
            ..Default::default()
        };
        report.merge(self.run_chain(subject, &definition, events).await?);
        Ok(Some(report))
    }

    /// Transitions the subject could take right now, system-only ones excluded
    pub fn enabled_transitions(
        &self,
        subject: &dyn WorkflowSubject,
        workflow: &WorkflowName,
    ) -> DispatchResult<Vec<TransitionName>> {
        let definition = self.definition_for(subject, workflow)?;
        Ok(definition
            .transitions
            .iter()
            .filter(|t| !t.name.is_system())
            .filter(|t| self.is_enabled(subject, &definition, t))
            .map(|t| t.name.clone())
            .collect())
    }

    fn definition_for(
        &self,
        subject: &dyn WorkflowSubject,
        workflow: &WorkflowName,
    ) -> DispatchResult<Arc<WorkflowDefinition>> {
        let definition = self
            .registry
            .get(workflow)
            .ok_or_else(|| DispatchError::UnknownWorkflow(workflow.to_string()))?;
        if !definition.supports_entity(subject.entity_type()) {
            return Err(DispatchError::UnsupportedEntity {
                workflow: workflow.to_string(),
                entity_type: subject.entity_type().to_string(),
            });
        }
        Ok(Arc::clone(definition))
    }

    /// Marking permits the transition and its guard passes
    fn is_enabled(
        &self,
        subject: &dyn WorkflowSubject,
        definition: &WorkflowDefinition,
        transition: &Transition,
    ) -> bool {
        let marking = subject.marking(&definition.name);
        if !marking.permits(definition.kind, transition) {
            return false;
        }
        let Some(guard) = transition.guard.as_deref() else {
            return true;
        };
        match self.guards.evaluate(guard, &subject.attributes(), &marking) {
            Ok(passed) => passed,
            Err(e) => {
                error!(
                    "Guard of {}.{} failed for {} at {}: {}",
                    definition.name,
                    transition.name,
                    subject.entity_type(),
                    marking,
                    e
                );
                false
            }
        }
    }

    fn first_enabled<'d>(
        &self,
        subject: &dyn WorkflowSubject,
        definition: &'d WorkflowDefinition,
        candidates: &[TransitionName],
    ) -> Option<&'d Transition> {
        for name in candidates {
            let Some(transition) = definition.transition(name) else {
                debug!("{} lists unknown next transition '{}'", definition.name, name);
                continue;
            };
            if self.is_enabled(subject, definition, transition) {
                return Some(transition);
            }
            info!(
                "Skipping {}.{}: not enabled at {}",
                definition.name,
                name,
                subject.marking(&definition.name)
            );
        }
        None
    }

    /// Process events depth first until the chain settles or goes async
    async fn run_chain(
        &self,
        subject: &mut dyn WorkflowSubject,
        definition: &WorkflowDefinition,
        roots: Vec<WorkflowEvent>,
    ) -> DispatchResult<DispatchReport> {
        let mut report = DispatchReport::default();
        let mut pending: Vec<(WorkflowEvent, usize)> =
            roots.into_iter().rev().map(|event| (event, 0)).collect();

        while let Some((event, depth)) = pending.pop() {
            trace!("Processing {:?} at depth {}", event, depth);
            let candidates = next_candidates(definition, &event);
            report.events.push(event);

            let Some(transition) = self.first_enabled(&*subject, definition, &candidates) else {
                continue;
            };

            // an enqueue ends the synchronous chain, so only inline hops count
            if self
                .locator
                .is_async(definition.name.as_str(), transition.name.as_str())
            {
                self.dispatch_async(subject, definition, transition, &mut report)
                    .await?;
                continue;
            }

            if depth >= self.max_chain_depth {
                error!(
                    "Chain in {} exceeded {} synchronous hop(s) at '{}'",
                    definition.name, self.max_chain_depth, transition.name
                );
                return Err(DispatchError::ChainDepthExceeded {
                    workflow: definition.name.to_string(),
                    transition: transition.name.to_string(),
                    depth: self.max_chain_depth,
                });
            }

            debug!(
                "Applying {}.{} synchronously",
                definition.name, transition.name
            );
            let follow_ups = fire(subject, definition, transition);
            report.applied.push(transition.name.clone());
            pending.extend(follow_ups.into_iter().rev().map(|e| (e, depth + 1)));
        }

        Ok(report)
    }

    async fn dispatch_async(
        &self,
        subject: &mut dyn WorkflowSubject,
        definition: &WorkflowDefinition,
        transition: &Transition,
        report: &mut DispatchReport,
    ) -> DispatchResult<()> {
        let Some(entity_id) = self.identity.resolve(&*subject) else {
            warn!(
                "Abandoning {}.{}: {} has no resolvable identity",
                definition.name,
                transition.name,
                subject.entity_type()
            );
            report.abandoned.push(transition.name.clone());
            return Ok(());
        };

        let message = TransitionMessage::new(
            entity_id,
            subject.entity_type(),
            transition.name.as_str(),
            definition.name.as_str(),
        );
        let stamps = self.locator.stamps_for(&message, subject.context_provider());
        let envelope = Envelope::new(message).with_all(stamps);

        // The consumer re-fetches the entity, so its state must be stored first
        self.store.persist(&*subject).await?;
        let envelope = self.bus.dispatch(envelope).await?;
        debug!(
            "Dispatched {}.{} for {} '{}' as {}",
            definition.name,
            transition.name,
            envelope.message.entity_type,
            envelope.message.entity_id,
            envelope.id
        );
        report.dispatched.push(envelope);
        Ok(())
    }
}

fn unknown_transition(workflow: &WorkflowName, transition: &TransitionName) -> DispatchError {
    DispatchError::UnknownTransition {
        workflow: workflow.to_string(),
        transition: transition.to_string(),
    }
}

fn next_candidates(definition: &WorkflowDefinition, event: &WorkflowEvent) -> Vec<TransitionName> {
    match event {
        WorkflowEvent::Entered { place, .. } => definition
            .place(place)
            .map(|p| p.metadata.next.clone())
            .unwrap_or_default(),
        WorkflowEvent::Completed { transition, .. } => definition
            .transition(transition)
            .map(|t| t.metadata.next.clone())
            .unwrap_or_default(),
    }
}

/// Move the marking and return the entered events, then the completed one
fn fire(
    subject: &mut dyn WorkflowSubject,
    definition: &WorkflowDefinition,
    transition: &Transition,
) -> Vec<WorkflowEvent> {
    let marking = subject
        .marking(&definition.name)
        .advance(definition.kind, transition);
    subject.set_marking(&definition.name, marking);

    transition
        .to
        .iter()
        .map(|place| WorkflowEvent::Entered {
            workflow: definition.name.clone(),
            place: place.clone(),
        })
        .chain(std::iter::once(WorkflowEvent::Completed {
            workflow: definition.name.clone(),
            transition: transition.name.clone(),
        }))
        .collect()
}
