//! Shared fixtures for statebus integration tests
//!
//! An in-memory `Asset` repository that journals every persist, and a bus
//! wrapper that journals every dispatch, so tests can assert their order.

#![allow(dead_code)]

use async_trait::async_trait;
use statebus::bus::BusResult;
use statebus::dispatcher::{EntityLoader, EntityStore, PrimaryKey, StoreError, StoreResult};
use statebus::message::ContextPayload;
use statebus::{
    ContextStampProvider, Envelope, Marking, MessageBus, WorkflowName, WorkflowSubject,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const ASSET_FLOW_YAML: &str = r#"
workflow:
  name: AssetFlow
  type: state_machine
  supports: Asset
places:
  - name: new
    initial: true
    next: load
  - name: loaded
    next: [publish]
  - published
transitions:
  - name: load
    from: new
    to: loaded
    async: true
  - name: publish
    from: loaded
    to: published
    guard: "bytes > 0"
"#;

pub const MEDIA_WORKFLOW_YAML: &str = r#"
workflow:
  name: MediaWorkflow
  supports: Asset
places:
  - name: queued
    initial: true
    next: download
  - downloaded
transitions:
  - name: download
    from: queued
    to: downloaded
    transport: priority.queue
"#;

/// Write the standard workflow files into `dir`
pub fn write_workflows(dir: &Path) {
    std::fs::write(dir.join("asset_flow.yaml"), ASSET_FLOW_YAML).unwrap();
    std::fs::write(dir.join("media_workflow.yaml"), MEDIA_WORKFLOW_YAML).unwrap();
}

pub type Journal = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub id: i64,
    pub bytes: i64,
    pub region: Option<String>,
    pub markings: BTreeMap<WorkflowName, Marking>,
}

impl Asset {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            bytes: 10,
            region: None,
            markings: BTreeMap::new(),
        }
    }

    pub fn in_region(mut self, region: &str) -> Self {
        self.region = Some(region.to_string());
        self
    }
}

impl ContextStampProvider for Asset {
    fn context_stamp(&self) -> Option<ContextPayload> {
        self.region
            .clone()
            .map(|region| ContextPayload::Value(region.into()))
    }
}

impl WorkflowSubject for Asset {
    fn entity_type(&self) -> &str {
        "Asset"
    }

    fn marking(&self, workflow: &WorkflowName) -> Marking {
        self.markings.get(workflow).cloned().unwrap_or_default()
    }

    fn set_marking(&mut self, workflow: &WorkflowName, marking: Marking) {
        self.markings.insert(workflow.clone(), marking);
    }

    fn attributes(&self) -> Value {
        json!({ "id": self.id, "bytes": self.bytes })
    }

    fn primary_key(&self) -> Option<PrimaryKey> {
        Some(PrimaryKey::single("id", self.id))
    }

    fn context_provider(&self) -> Option<&dyn ContextStampProvider> {
        Some(self)
    }
}

/// Rows keyed by id. Persisting copies the markings of the tracked workflows.
pub struct AssetRepository {
    rows: Mutex<HashMap<String, Asset>>,
    workflows: Vec<WorkflowName>,
    journal: Journal,
}

impl AssetRepository {
    pub fn new(workflows: &[&str], journal: Journal) -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            workflows: workflows.iter().map(|w| WorkflowName::new(*w)).collect(),
            journal,
        }
    }

    pub fn insert(&self, asset: Asset) {
        self.rows
            .lock()
            .unwrap()
            .insert(asset.id.to_string(), asset);
    }

    pub fn get(&self, id: i64) -> Option<Asset> {
        self.rows.lock().unwrap().get(&id.to_string()).cloned()
    }

    pub fn marking(&self, id: i64, workflow: &str) -> Marking {
        self.get(id)
            .map(|asset| asset.marking(&WorkflowName::new(workflow)))
            .unwrap_or_default()
    }
}

#[async_trait]
impl EntityStore for AssetRepository {
    async fn persist(&self, subject: &dyn WorkflowSubject) -> StoreResult<()> {
        let id = subject
            .primary_key()
            .and_then(|key| key.to_identifier())
            .ok_or_else(|| StoreError::Persist {
                entity_type: subject.entity_type().to_string(),
                entity_id: "<none>".to_string(),
                message: "no primary key".to_string(),
            })?;

        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(&id).ok_or_else(|| StoreError::Persist {
            entity_type: subject.entity_type().to_string(),
            entity_id: id.clone(),
            message: "unknown row".to_string(),
        })?;
        for workflow in &self.workflows {
            row.set_marking(workflow, subject.marking(workflow));
        }
        self.journal.lock().unwrap().push(format!("persist {id}"));
        Ok(())
    }
}

#[async_trait]
impl EntityLoader for AssetRepository {
    async fn find(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> StoreResult<Option<Box<dyn WorkflowSubject>>> {
        if entity_type != "Asset" {
            return Err(StoreError::UnsupportedEntityType(entity_type.to_string()));
        }
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(entity_id)
            .cloned()
            .map(|asset| Box::new(asset) as Box<dyn WorkflowSubject>))
    }
}

/// Journals each dispatch, then forwards to the wrapped bus
pub struct JournalBus {
    inner: Arc<dyn MessageBus>,
    journal: Journal,
}

impl JournalBus {
    pub fn new(inner: Arc<dyn MessageBus>, journal: Journal) -> Self {
        Self { inner, journal }
    }
}

#[async_trait]
impl MessageBus for JournalBus {
    async fn dispatch(&self, envelope: Envelope) -> BusResult<Envelope> {
        self.journal.lock().unwrap().push(format!(
            "dispatch {}.{} {}",
            envelope.message.workflow_name,
            envelope.message.transition_name,
            envelope.message.entity_id
        ));
        self.inner.dispatch(envelope).await
    }
}
