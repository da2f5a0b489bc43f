//! Build-time computation of queue routes and transport descriptors

use crate::router::slug::{
    effective_prefix, is_shared_store_dsn, queue_address, slug_pair, table_name_for,
    SHARED_STORE_TABLE,
};
use crate::router::{RouterError, RouterResult};
use crate::workflow::WorkflowDefinition;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

/// DSN used when none is configured
pub const DEFAULT_TRANSPORT_DSN: &str = "doctrine://default";

/// Inputs of the routing pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Prefix for every computed address, ignored for shared stores
    pub queue_prefix: String,
    /// DSN of the backing queue store
    pub transport_dsn: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            queue_prefix: String::new(),
            transport_dsn: DEFAULT_TRANSPORT_DSN.to_string(),
        }
    }
}

impl RouterConfig {
    pub fn new(queue_prefix: impl Into<String>, transport_dsn: impl Into<String>) -> Self {
        Self {
            queue_prefix: queue_prefix.into(),
            transport_dsn: transport_dsn.into(),
        }
    }

    /// Prefix actually prepended to computed addresses
    pub fn prefix(&self) -> String {
        effective_prefix(&self.queue_prefix, &self.transport_dsn)
    }
}

/// `(workflow_slug, transition_slug) -> queue address`
///
/// Ordered so that iteration and serialization are stable across builds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AsyncRouteMap {
    routes: BTreeMap<String, BTreeMap<String, String>>,
}

impl AsyncRouteMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an already-slugged pair
    pub fn insert(
        &mut self,
        workflow_slug: impl Into<String>,
        transition_slug: impl Into<String>,
        address: impl Into<String>,
    ) -> Option<String> {
        self.routes
            .entry(workflow_slug.into())
            .or_default()
            .insert(transition_slug.into(), address.into())
    }

    /// Look up an already-slugged pair
    pub fn get(&self, workflow_slug: &str, transition_slug: &str) -> Option<&str> {
        self.routes
            .get(workflow_slug)
            .and_then(|transitions| transitions.get(transition_slug))
            .map(String::as_str)
    }

    /// Look up a raw pair, normalizing both names
    pub fn lookup(&self, workflow: &str, transition: &str) -> Option<&str> {
        let (wf, tr) = slug_pair(workflow, transition);
        self.get(&wf, &tr)
    }

    /// Every `(workflow_slug, transition_slug, address)` entry in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.routes.iter().flat_map(|(wf, transitions)| {
            transitions
                .iter()
                .map(move |(tr, address)| (wf.as_str(), tr.as_str(), address.as_str()))
        })
    }

    /// Distinct addresses in order
    pub fn addresses(&self) -> BTreeSet<&str> {
        self.iter().map(|(_, _, address)| address).collect()
    }

    pub fn len(&self) -> usize {
        self.routes.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One queue the external transport layer must provision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportDescriptor {
    /// Transport name, equal to the queue address
    pub name: String,
    pub dsn: String,
    pub table_name: String,
    pub queue_name: String,
    pub auto_setup: bool,
    pub use_notify: bool,
}

impl TransportDescriptor {
    fn for_address(address: &str, dsn: &str) -> Self {
        let table_name = if is_shared_store_dsn(dsn) {
            SHARED_STORE_TABLE.to_string()
        } else {
            table_name_for(address)
        };
        Self {
            name: address.to_string(),
            dsn: dsn.to_string(),
            table_name,
            queue_name: address.to_string(),
            auto_setup: true,
            use_notify: true,
        }
    }
}

/// Output of the routing pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePlan {
    pub routes: AsyncRouteMap,
    /// One descriptor per distinct address, ordered by name
    pub transports: Vec<TransportDescriptor>,
}

impl RoutePlan {
    pub fn transport(&self, name: &str) -> Option<&TransportDescriptor> {
        self.transports.iter().find(|t| t.name == name)
    }
}

/// Computes the route plan for a set of workflow definitions
#[derive(Debug, Clone, Default)]
pub struct AsyncTransitionRouter {
    config: RouterConfig,
}

impl AsyncTransitionRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Plan routes for compiled definitions merged with external ones.
    ///
    /// An external definition replaces a compiled one with the same name.
    pub fn plan<'a>(
        &self,
        compiled: impl IntoIterator<Item = &'a WorkflowDefinition>,
        external: impl IntoIterator<Item = &'a WorkflowDefinition>,
    ) -> RouterResult<RoutePlan> {
        let mut merged: Vec<&WorkflowDefinition> = compiled.into_iter().collect();
        for definition in external {
            match merged.iter().position(|d| d.name == definition.name) {
                Some(pos) => {
                    debug!(
                        "External definition replaces compiled workflow '{}'",
                        definition.name
                    );
                    merged[pos] = definition;
                }
                None => merged.push(definition),
            }
        }

        let prefix = self.config.prefix();
        let mut routes = AsyncRouteMap::new();
        // computed address -> raw (workflow, transition) that produced it
        let mut owners: HashMap<String, (String, String)> = HashMap::new();

        for definition in merged {
            for transition in definition.transitions.iter().filter(|t| t.is_async()) {
                let (wf_slug, tr_slug) = slug_pair(definition.name.as_str(), transition.name.as_str());
                if wf_slug.is_empty() || tr_slug.is_empty() {
                    return Err(RouterError::EmptySlug {
                        workflow: definition.name.to_string(),
                        transition: transition.name.to_string(),
                    });
                }

                let address = match &transition.metadata.transport {
                    Some(transport) => transport.clone(),
                    None => {
                        let address = queue_address(&prefix, &wf_slug, &tr_slug);
                        let raw = (
                            definition.name.to_string(),
                            transition.name.to_string(),
                        );
                        if let Some(existing) = owners.get(&address) {
                            if existing.1 != raw.1 {
                                return Err(RouterError::AddressCollision {
                                    address,
                                    first: format!("{}.{}", existing.0, existing.1),
                                    second: format!("{}.{}", raw.0, raw.1),
                                });
                            }
                        } else {
                            owners.insert(address.clone(), raw);
                        }
                        address
                    }
                };

                if let Some(previous) = routes.get(&wf_slug, &tr_slug) {
                    if previous != address {
                        return Err(RouterError::AddressCollision {
                            address: format!("{wf_slug}.{tr_slug}"),
                            first: previous.to_string(),
                            second: address,
                        });
                    }
                }

                debug!(
                    "Routing {}.{} to queue '{}'",
                    definition.name, transition.name, address
                );
                routes.insert(wf_slug, tr_slug, address);
            }
        }

        let transports: Vec<TransportDescriptor> = routes
            .addresses()
            .into_iter()
            .map(|address| TransportDescriptor::for_address(address, &self.config.transport_dsn))
            .collect();

        info!(
            "Planned {} async route(s) over {} queue(s)",
            routes.len(),
            transports.len()
        );

        Ok(RoutePlan { routes, transports })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::test_helpers::{async_transition, asset_flow};
    use crate::workflow::{Transition, TransitionMetadata, WorkflowKind};

    #[test]
    fn test_asset_flow_on_shared_store() {
        let plan = AsyncTransitionRouter::default()
            .plan([&asset_flow()], [])
            .unwrap();

        assert_eq!(plan.routes.lookup("AssetFlow", "load"), Some("assetflow.load"));
        assert_eq!(plan.transports.len(), 1);
        let transport = &plan.transports[0];
        assert_eq!(transport.name, "assetflow.load");
        assert_eq!(transport.table_name, "messenger_messages");
        assert!(transport.auto_setup && transport.use_notify);
    }

    #[test]
    fn test_prefix_applied_outside_shared_store() {
        let router = AsyncTransitionRouter::new(RouterConfig::new("app", "redis://localhost"));
        let plan = router.plan([&asset_flow()], []).unwrap();

        assert_eq!(plan.routes.lookup("AssetFlow", "load"), Some("app.assetflow.load"));
        assert_eq!(plan.transports[0].table_name, "messenger_app_assetflow_load");
    }

    #[test]
    fn test_prefix_ignored_for_shared_store() {
        let router = AsyncTransitionRouter::new(RouterConfig::new("app", "doctrine://default"));
        let plan = router.plan([&asset_flow()], []).unwrap();
        assert_eq!(plan.routes.lookup("AssetFlow", "load"), Some("assetflow.load"));
    }

    #[test]
    fn test_transport_override_used_verbatim() {
        let mut def = asset_flow();
        def.transitions[0].metadata.transport = Some("priority.queue".to_string());

        let router = AsyncTransitionRouter::new(RouterConfig::new("app", "redis://localhost"));
        let plan = router.plan([&def], []).unwrap();
        assert_eq!(plan.routes.lookup("AssetFlow", "load"), Some("priority.queue"));
        assert!(plan.transport("priority.queue").is_some());
    }

    #[test]
    fn test_sync_transitions_not_routed() {
        let mut def = asset_flow();
        def.add_transition(Transition::new("reset", ["loaded"], ["new"]));
        let plan = AsyncTransitionRouter::default().plan([&def], []).unwrap();

        assert_eq!(plan.routes.len(), 1);
        assert_eq!(plan.routes.lookup("AssetFlow", "reset"), None);
    }

    #[test]
    fn test_colliding_computed_addresses_rejected() {
        let mut def = asset_flow();
        def.add_transition(async_transition("Load", "new", "loaded"));

        let err = AsyncTransitionRouter::default()
            .plan([&def], [])
            .unwrap_err();
        assert!(matches!(err, RouterError::AddressCollision { ref address, .. } if address == "assetflow.load"));
    }

    #[test]
    fn test_same_transition_name_across_workflows_allowed() {
        let mut media = WorkflowDefinition::new("Media", WorkflowKind::StateMachine);
        media.places = asset_flow().places;
        media.add_transition(async_transition("load", "new", "loaded"));
        let mut media_workflow = media.clone();
        media_workflow.name = "MediaWorkflow".into();

        let plan = AsyncTransitionRouter::default()
            .plan([&media, &media_workflow], [])
            .unwrap();
        assert_eq!(plan.routes.lookup("Media", "load"), Some("media.load"));
        assert_eq!(plan.transports.len(), 1);
    }

    #[test]
    fn test_overrides_may_share_addresses() {
        let mut def = asset_flow();
        def.add_transition(Transition::new("reload", ["loaded"], ["new"]).with_metadata(
            TransitionMetadata {
                transport: Some("priority.queue".to_string()),
                ..Default::default()
            },
        ));
        def.transitions[0].metadata.transport = Some("priority.queue".to_string());

        let plan = AsyncTransitionRouter::default().plan([&def], []).unwrap();
        assert_eq!(plan.routes.len(), 2);
        assert_eq!(plan.transports.len(), 1);
    }

    #[test]
    fn test_external_definitions_take_precedence() {
        let compiled = asset_flow();
        let mut external = asset_flow();
        external.transitions[0].metadata.transport = Some("external.queue".to_string());

        let plan = AsyncTransitionRouter::default()
            .plan([&compiled], [&external])
            .unwrap();
        assert_eq!(plan.routes.lookup("AssetFlow", "load"), Some("external.queue"));
    }

    #[test]
    fn test_plan_is_deterministic() {
        let defs = [asset_flow()];
        let router = AsyncTransitionRouter::new(RouterConfig::new("app", "amqp://rabbit"));
        let a = router.plan(&defs, []).unwrap();
        let b = router.plan(&defs, []).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a.routes).unwrap(),
            serde_json::to_string(&b.routes).unwrap()
        );
    }

    #[test]
    fn test_route_map_serializes_nested() {
        let plan = AsyncTransitionRouter::default()
            .plan([&asset_flow()], [])
            .unwrap();
        let value = serde_json::to_value(&plan.routes).unwrap();
        assert_eq!(value, serde_json::json!({ "assetflow": { "load": "assetflow.load" } }));
    }
}
