//! Boot-time wiring
//!
//! Compiles the configured workflow sources, plans async routes and hands out
//! the shared runtime pieces: registry, locator, bus builder, dispatcher and
//! workers.

use crate::bus::{
    AsyncQueueRoutingMiddleware, ContextFilter, MessageBus, MessageHandler, SenderBusBuilder,
    SenderBus, Transport, Worker,
};
use crate::compiler::{CompiledWorkflows, DefinitionCompiler, SourceUnit, WorkflowDeclaration};
use crate::config::Config;
use crate::dispatcher::{EntityStore, TransitionDispatcher};
use crate::locator::QueueLocator;
use crate::router::{AsyncTransitionRouter, RoutePlan};
use crate::workflow::{GuardEvaluator, WorkflowDefinition, WorkflowRegistry};
use crate::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Compiled workflows and route plan, ready to serve
pub struct StateBus {
    config: Config,
    compiled: CompiledWorkflows,
    plan: RoutePlan,
    registry: Arc<WorkflowRegistry>,
    locator: Arc<QueueLocator>,
    guards: Arc<GuardEvaluator>,
}

impl StateBus {
    pub fn builder(config: Config) -> StateBusBuilder {
        StateBusBuilder {
            config,
            compiler: DefinitionCompiler::new(),
            external: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn compiled(&self) -> &CompiledWorkflows {
        &self.compiled
    }

    pub fn plan(&self) -> &RoutePlan {
        &self.plan
    }

    pub fn registry(&self) -> &Arc<WorkflowRegistry> {
        &self.registry
    }

    pub fn locator(&self) -> &Arc<QueueLocator> {
        &self.locator
    }

    /// Bus builder with the routing middleware already installed
    pub fn bus_builder(&self) -> SenderBusBuilder {
        SenderBus::builder().middleware(Arc::new(AsyncQueueRoutingMiddleware::new(
            Arc::clone(&self.locator),
        )))
    }

    /// Dispatcher sharing this runtime's registry, locator and guard cache
    pub fn dispatcher(
        &self,
        store: Arc<dyn EntityStore>,
        bus: Arc<dyn MessageBus>,
    ) -> TransitionDispatcher {
        TransitionDispatcher::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.locator),
            store,
            bus,
        )
        .with_guards(Arc::clone(&self.guards))
        .with_max_chain_depth(self.config.max_chain_depth)
    }

    /// Worker filtered by the allow-list in the configured variable
    pub fn worker(
        &self,
        transport: Arc<dyn Transport>,
        handler: Arc<dyn MessageHandler>,
    ) -> Worker {
        Worker::new(transport, handler)
            .with_filter(ContextFilter::new(self.config.filter_config()))
    }
}

/// Collects sources before booting a [`StateBus`]
pub struct StateBusBuilder {
    config: Config,
    compiler: DefinitionCompiler,
    external: Vec<WorkflowDefinition>,
}

impl StateBusBuilder {
    /// Compile a declaration registered in code
    pub fn register(mut self, declaration: WorkflowDeclaration) -> Self {
        self.compiler.register(declaration);
        self
    }

    pub fn source(mut self, unit: SourceUnit) -> Self {
        self.compiler.add_source(unit);
        self
    }

    /// Definition from another configuration layer; replaces a compiled one
    /// with the same name
    pub fn external(mut self, definition: WorkflowDefinition) -> Self {
        self.external.push(definition);
        self
    }

    pub fn build(mut self) -> Result<StateBus> {
        self.config.validate()?;

        for path in &self.config.workflow_paths {
            self.compiler.add_directory(path.clone());
        }
        let compiled = self.compiler.compile();

        let external: Vec<WorkflowDefinition> = self
            .external
            .into_iter()
            .filter(|definition| match definition.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!("Skipping external workflow '{}': {}", definition.name, e);
                    false
                }
            })
            .collect();

        let plan = if self.config.enable_dynamic_routing {
            AsyncTransitionRouter::new(self.config.router_config())
                .plan(&compiled.definitions, &external)?
        } else {
            warn!("Dynamic routing is disabled; every transition runs synchronously");
            RoutePlan::default()
        };

        let mut registry = compiled.to_registry();
        for definition in external {
            if registry.insert(definition).is_some() {
                debug!("External definition replaced a compiled workflow");
            }
        }

        let mut locator = QueueLocator::new(plan.routes.clone()).with_sync(self.config.sync);
        if let Some(transport) = &self.config.forced_transport {
            locator = locator.with_forced_transport(transport.clone());
        }

        info!(
            "statebus ready: {} workflow(s), {} async route(s), sync={}",
            registry.len(),
            plan.routes.len(),
            self.config.sync
        );

        Ok(StateBus {
            config: self.config,
            compiled,
            plan,
            registry: Arc::new(registry),
            locator: Arc::new(locator),
            guards: Arc::new(GuardEvaluator::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::test_helpers::{async_transition, asset_flow};
    use crate::workflow::{Place, PlaceName, WorkflowKind};

    fn config() -> Config {
        Config {
            workflow_paths: Vec::new(),
            ..Config::default()
        }
    }

    #[test]
    fn test_external_definition_replaces_compiled() {
        let mut replacement = asset_flow();
        replacement.add_place(Place::new("archived"));
        replacement.add_transition(async_transition("archive", "loaded", "archived"));

        let statebus = StateBus::builder(config())
            .external(asset_flow())
            .external(replacement)
            .build()
            .unwrap();

        assert_eq!(statebus.registry().len(), 1);
        assert!(statebus.locator().is_async("AssetFlow", "archive"));
    }

    #[test]
    fn test_invalid_external_definition_skipped() {
        let mut broken = WorkflowDefinition::new("Broken", WorkflowKind::StateMachine);
        broken.add_place(Place::new("a"));
        broken.add_transition(async_transition("go", "a", "nowhere"));
        broken.initial_marking = vec![PlaceName::new("a")];

        let statebus = StateBus::builder(config())
            .external(asset_flow())
            .external(broken)
            .build()
            .unwrap();

        assert!(statebus.registry().by_name("Broken").is_none());
        assert!(statebus.registry().by_name("AssetFlow").is_some());
        assert!(!statebus.locator().is_async("Broken", "go"));
        assert!(statebus.locator().is_async("AssetFlow", "load"));
    }
}
