//! Read-only lookup of compiled workflow definitions

use crate::workflow::{WorkflowDefinition, WorkflowName};
use std::collections::HashMap;
use std::sync::Arc;

/// Definitions shared by the router, the dispatcher and the consumer side.
///
/// Built once at boot; later registrations of a name replace earlier ones.
#[derive(Debug, Default, Clone)]
pub struct WorkflowRegistry {
    workflows: Vec<Arc<WorkflowDefinition>>,
    index: HashMap<WorkflowName, usize>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from definitions in precedence order, last one wins
    pub fn from_definitions(definitions: impl IntoIterator<Item = WorkflowDefinition>) -> Self {
        let mut registry = Self::new();
        for definition in definitions {
            registry.insert(definition);
        }
        registry
    }

    /// Add a definition, returning the one it replaced
    pub fn insert(&mut self, definition: WorkflowDefinition) -> Option<Arc<WorkflowDefinition>> {
        let definition = Arc::new(definition);
        match self.index.get(&definition.name) {
            Some(&pos) => Some(std::mem::replace(&mut self.workflows[pos], definition)),
            None => {
                self.index
                    .insert(definition.name.clone(), self.workflows.len());
                self.workflows.push(definition);
                None
            }
        }
    }

    pub fn get(&self, name: &WorkflowName) -> Option<&Arc<WorkflowDefinition>> {
        self.index.get(name).map(|&pos| &self.workflows[pos])
    }

    /// Look up a workflow by its plain string name
    pub fn by_name(&self, name: &str) -> Option<&Arc<WorkflowDefinition>> {
        self.get(&WorkflowName::from(name))
    }

    /// Workflows that declare support for an entity type, in registration order
    pub fn for_entity_type<'a>(
        &'a self,
        entity_type: &'a str,
    ) -> impl Iterator<Item = &'a Arc<WorkflowDefinition>> + 'a {
        self.workflows
            .iter()
            .filter(move |w| w.supports_entity(entity_type))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<WorkflowDefinition>> {
        self.workflows.iter()
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::test_helpers::asset_flow;
    use crate::workflow::WorkflowKind;

    #[test]
    fn test_lookup_by_name() {
        let registry = WorkflowRegistry::from_definitions([asset_flow()]);
        assert_eq!(registry.len(), 1);
        assert!(registry.by_name("AssetFlow").is_some());
        assert!(registry.by_name("assetflow").is_none());
    }

    #[test]
    fn test_later_definition_replaces_earlier() {
        let mut replacement = asset_flow();
        replacement.kind = WorkflowKind::Workflow;

        let mut registry = WorkflowRegistry::new();
        assert!(registry.insert(asset_flow()).is_none());
        let previous = registry.insert(replacement).unwrap();

        assert_eq!(previous.kind, WorkflowKind::StateMachine);
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.by_name("AssetFlow").unwrap().kind,
            WorkflowKind::Workflow
        );
    }

    #[test]
    fn test_for_entity_type() {
        let mut other = WorkflowDefinition::new("MediaWorkflow", WorkflowKind::Workflow);
        other.supports = vec!["Media".to_string()];
        let registry = WorkflowRegistry::from_definitions([asset_flow(), other]);

        let names: Vec<_> = registry
            .for_entity_type("Asset")
            .map(|w| w.name.as_str().to_string())
            .collect();
        assert_eq!(names, vec!["AssetFlow"]);
        assert_eq!(registry.for_entity_type("Unknown").count(), 0);
    }
}
