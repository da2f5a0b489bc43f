//! Compilation of declarations into normalized workflow definitions

use crate::compiler::{
    CompileError, CompileResult, OneOrMany, SourceFormat, SourceUnit, WorkflowDeclaration,
};
use crate::workflow::{
    DefinitionError, Place, PlaceMetadata, PlaceName, Transition, TransitionMetadata,
    TransitionName, WorkflowDefinition, WorkflowGraphAnalyzer, WorkflowKind, WorkflowName,
    WorkflowRegistry,
};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// A source left out of the compiled set, with the reason
#[derive(Debug, Clone)]
pub struct SkippedSource {
    pub origin: String,
    pub reason: String,
}

/// Output of one compile run
#[derive(Debug, Clone, Default)]
pub struct CompiledWorkflows {
    /// Definitions in source order
    pub definitions: Vec<WorkflowDefinition>,
    /// Asynchronous transition names per workflow
    pub async_transitions: BTreeMap<WorkflowName, BTreeSet<TransitionName>>,
    /// Files that contributed a definition
    pub sources: Vec<PathBuf>,
    /// Units that were skipped
    pub skipped: Vec<SkippedSource>,
}

impl CompiledWorkflows {
    pub fn definition(&self, name: &str) -> Option<&WorkflowDefinition> {
        self.definitions.iter().find(|d| d.name.as_str() == name)
    }

    /// Whether the compiled set holds the named async transition
    pub fn is_async(&self, workflow: &str, transition: &str) -> bool {
        self.async_transitions
            .get(&WorkflowName::from(workflow))
            .is_some_and(|names| names.contains(&TransitionName::from(transition)))
    }

    /// Registry over the compiled definitions
    pub fn to_registry(&self) -> WorkflowRegistry {
        WorkflowRegistry::from_definitions(self.definitions.iter().cloned())
    }

    /// Configuration shape consumed by an external workflow runtime
    pub fn to_runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            workflows: self
                .definitions
                .iter()
                .map(|d| (d.name.to_string(), RuntimeWorkflowConfig::from(d)))
                .collect(),
        }
    }
}

enum Pending {
    Directory(PathBuf),
    Unit(SourceUnit),
    Declaration {
        origin: String,
        declaration: WorkflowDeclaration,
    },
}

/// Collects declarative sources and compiles them
///
/// Sources are compiled in the order they were added; directories expand to
/// their files sorted by name. A later definition with an already-seen name
/// replaces the earlier one.
#[derive(Default)]
pub struct DefinitionCompiler {
    pending: Vec<Pending>,
}

impl DefinitionCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile every YAML/JSON file under `path`, recursively
    pub fn add_directory(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.pending.push(Pending::Directory(path.into()));
        self
    }

    /// Compile a single in-memory or file-backed unit
    pub fn add_source(&mut self, unit: SourceUnit) -> &mut Self {
        self.pending.push(Pending::Unit(unit));
        self
    }

    /// Register a structured declaration directly
    pub fn register(&mut self, declaration: WorkflowDeclaration) -> &mut Self {
        let origin = format!(
            "registered:{}",
            declaration.name().unwrap_or("<unnamed>")
        );
        self.pending.push(Pending::Declaration {
            origin,
            declaration,
        });
        self
    }

    /// Run the compilation. Failing units are logged and skipped.
    pub fn compile(&self) -> CompiledWorkflows {
        let mut compiled = CompiledWorkflows::default();

        for pending in &self.pending {
            match pending {
                Pending::Directory(dir) => {
                    for unit in collect_directory(dir, &mut compiled.skipped) {
                        compile_unit(&unit, &mut compiled);
                    }
                }
                Pending::Unit(unit) => compile_unit(unit, &mut compiled),
                Pending::Declaration {
                    origin,
                    declaration,
                } => match compile_declaration(declaration.clone(), origin) {
                    Ok(definition) => accept(definition, None, &mut compiled),
                    Err(e) => skip(origin, e, &mut compiled),
                },
            }
        }

        for definition in &compiled.definitions {
            let names: BTreeSet<TransitionName> = definition.async_transitions().cloned().collect();
            if !names.is_empty() {
                compiled
                    .async_transitions
                    .insert(definition.name.clone(), names);
            }
            report_graph_issues(definition);
        }

        info!(
            "Compiled {} workflow(s) with {} async transition(s), skipped {} source(s)",
            compiled.definitions.len(),
            compiled
                .async_transitions
                .values()
                .map(BTreeSet::len)
                .sum::<usize>(),
            compiled.skipped.len()
        );

        compiled
    }
}

fn collect_directory(dir: &Path, skipped: &mut Vec<SkippedSource>) -> Vec<SourceUnit> {
    if !dir.exists() {
        debug!("Workflow directory {} does not exist", dir.display());
        return Vec::new();
    }

    let mut units = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", dir.display(), e);
                skipped.push(SkippedSource {
                    origin: dir.display().to_string(),
                    reason: e.to_string(),
                });
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() || SourceFormat::from_path(path).is_none() {
            continue;
        }
        match SourceUnit::from_path(path) {
            Ok(unit) => units.push(unit),
            Err(e) => {
                warn!("Skipping workflow source {}: {}", path.display(), e);
                skipped.push(SkippedSource {
                    origin: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }
    units
}

fn compile_unit(unit: &SourceUnit, compiled: &mut CompiledWorkflows) {
    let result = unit
        .parse()
        .and_then(|declaration| compile_declaration(declaration, &unit.origin));
    match result {
        Ok(definition) => accept(definition, unit.path.clone(), compiled),
        Err(e) => skip(&unit.origin, e, compiled),
    }
}

fn accept(definition: WorkflowDefinition, path: Option<PathBuf>, compiled: &mut CompiledWorkflows) {
    debug!(
        "Compiled workflow '{}' ({} places, {} transitions)",
        definition.name,
        definition.places.len(),
        definition.transitions.len()
    );
    if let Some(path) = path {
        compiled.sources.push(path);
    }
    match compiled
        .definitions
        .iter()
        .position(|d| d.name == definition.name)
    {
        Some(pos) => {
            warn!(
                "Workflow '{}' declared more than once, the later declaration wins",
                definition.name
            );
            compiled.definitions[pos] = definition;
        }
        None => compiled.definitions.push(definition),
    }
}

fn skip(origin: &str, error: CompileError, compiled: &mut CompiledWorkflows) {
    match &error {
        CompileError::MissingDeclaration { .. } => {
            warn!("Skipping {}: no 'workflow' declaration", origin)
        }
        _ => warn!("Skipping workflow source {}: {}", origin, error),
    }
    compiled.skipped.push(SkippedSource {
        origin: origin.to_string(),
        reason: error.to_string(),
    });
}

fn report_graph_issues(definition: &WorkflowDefinition) {
    let analyzer = WorkflowGraphAnalyzer::new(definition);
    for name in analyzer.find_dangling_next() {
        warn!(
            "Workflow '{}' chains to unknown transition '{}'",
            definition.name, name
        );
    }
    for cycle in analyzer.detect_chain_cycles() {
        let path: Vec<&str> = cycle.iter().map(|t| t.as_str()).collect();
        warn!(
            "Workflow '{}' has an inline auto-advance cycle: {}",
            definition.name,
            path.join(" -> ")
        );
    }
}

/// Normalize one declaration into a validated definition
pub fn compile_declaration(
    declaration: WorkflowDeclaration,
    origin: &str,
) -> CompileResult<WorkflowDefinition> {
    let invalid = |source: DefinitionError| CompileError::Definition {
        origin: origin.to_string(),
        source,
    };

    let WorkflowDeclaration {
        workflow: header,
        places,
        transitions,
    } = declaration;

    let name = header
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| CompileError::MissingName {
            origin: origin.to_string(),
        })?;
    let kind = parse_kind(header.kind.as_deref(), origin)?;

    let mut definition = WorkflowDefinition::new(WorkflowName::try_new(name.clone()).map_err(invalid)?, kind);
    definition.supports = header
        .supports
        .map(OneOrMany::into_vec)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| vec![name]);
    definition.metadata = header.metadata.into_iter().collect();

    let mut flagged_initial = Vec::new();
    for place in places {
        let spec = place.into_spec();
        let mut map = spec.metadata;
        merge_extra(&mut map, spec.extra);
        overlay(&mut map, "info", spec.info.map(Value::String));
        overlay(&mut map, "description", spec.description.map(Value::String));
        overlay(
            &mut map,
            "backgroundColor",
            spec.background_color.map(Value::String),
        );
        overlay(&mut map, "next", spec.next.map(one_or_many_value));

        let place_name = PlaceName::try_new(spec.name).map_err(|e| invalid(e.into()))?;
        if spec.initial {
            flagged_initial.push(place_name.clone());
        }
        let metadata = PlaceMetadata::from_map(map).map_err(invalid)?;
        definition.add_place(Place::new(place_name).with_metadata(metadata));
    }

    for declared in transitions {
        let mut map = declared.metadata;
        merge_extra(&mut map, declared.extra);
        let lifted_guard = match map.remove("guard") {
            None | Some(Value::Null) => None,
            Some(Value::String(guard)) => Some(guard),
            Some(other) => {
                return Err(invalid(DefinitionError::InvalidMetadata {
                    key: "guard".to_string(),
                    reason: format!("expected an expression string, got {other}"),
                }))
            }
        };
        overlay(&mut map, "info", declared.info.map(Value::String));
        overlay(&mut map, "description", declared.description.map(Value::String));
        overlay(&mut map, "transport", declared.transport.map(Value::String));
        overlay(&mut map, "next", declared.next.map(one_or_many_value));

        let mut metadata = TransitionMetadata::from_map(map).map_err(invalid)?;
        metadata.is_async |= declared.is_async;

        let guard = declared
            .guard
            .filter(|g| !g.trim().is_empty())
            .or(lifted_guard)
            .filter(|g| !g.trim().is_empty());

        let transition_name =
            TransitionName::try_new(declared.name).map_err(|e| invalid(e.into()))?;
        let from = place_names(declared.from).map_err(invalid)?;
        let to = place_names(declared.to).map_err(invalid)?;

        let mut transition = Transition::new(transition_name, from, to).with_metadata(metadata);
        transition.guard = guard;
        definition.add_transition(transition);
    }

    definition.initial_marking = initial_marking(&definition, header.initial, flagged_initial)
        .map_err(invalid)?;

    definition.validate().map_err(invalid)?;
    Ok(definition)
}

fn parse_kind(kind: Option<&str>, origin: &str) -> CompileResult<WorkflowKind> {
    match kind.map(|k| k.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("state_machine") | Some("state-machine") => {
            Ok(WorkflowKind::StateMachine)
        }
        Some("workflow") => Ok(WorkflowKind::Workflow),
        Some(other) => Err(CompileError::UnknownKind {
            origin: origin.to_string(),
            kind: other.to_string(),
        }),
    }
}

fn initial_marking(
    definition: &WorkflowDefinition,
    explicit: Option<OneOrMany>,
    flagged: Vec<PlaceName>,
) -> Result<Vec<PlaceName>, DefinitionError> {
    if let Some(explicit) = explicit {
        let places = place_names(explicit)?;
        if !places.is_empty() {
            return Ok(places);
        }
    }

    let single = definition.kind == WorkflowKind::StateMachine;
    if !flagged.is_empty() {
        return Ok(if single {
            flagged.into_iter().take(1).collect()
        } else {
            flagged
        });
    }

    if single {
        return Ok(definition
            .places
            .first()
            .map(|p| vec![p.name.clone()])
            .unwrap_or_default());
    }
    Ok(Vec::new())
}

fn place_names(names: OneOrMany) -> Result<Vec<PlaceName>, DefinitionError> {
    names
        .into_vec()
        .into_iter()
        .map(|n| PlaceName::try_new(n).map_err(DefinitionError::from))
        .collect()
}

/// Loose keys become extensions; an explicit `metadata:` entry wins
fn merge_extra(map: &mut Map<String, Value>, extra: Map<String, Value>) {
    for (key, value) in extra {
        map.entry(key).or_insert(value);
    }
}

fn overlay(map: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        map.insert(key.to_string(), value);
    }
}

fn one_or_many_value(items: OneOrMany) -> Value {
    match items {
        OneOrMany::One(item) => Value::String(item),
        OneOrMany::Many(items) => Value::Array(items.into_iter().map(Value::String).collect()),
    }
}

/// Runtime configuration keyed by workflow name
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct RuntimeConfig {
    pub workflows: BTreeMap<String, RuntimeWorkflowConfig>,
}

impl RuntimeConfig {
    /// Render as YAML
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Runtime configuration of a single workflow
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeWorkflowConfig {
    #[serde(rename = "type")]
    pub kind: WorkflowKind,
    pub supports: Vec<String>,
    #[serde(serialize_with = "serialize_places")]
    pub places: Vec<(String, RuntimePlaceConfig)>,
    pub transitions: Vec<RuntimeTransitionConfig>,
    /// A single name for state machines, a list otherwise
    pub initial_marking: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuntimePlaceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PlaceMetadata>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuntimeTransitionConfig {
    pub name: String,
    pub from: Vec<String>,
    pub to: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guard: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TransitionMetadata>,
}

impl From<&WorkflowDefinition> for RuntimeWorkflowConfig {
    fn from(definition: &WorkflowDefinition) -> Self {
        let places = definition
            .places
            .iter()
            .map(|p| {
                let metadata = (!p.metadata.is_empty()).then(|| p.metadata.clone());
                (p.name.to_string(), RuntimePlaceConfig { metadata })
            })
            .collect();

        let transitions = definition
            .transitions
            .iter()
            .map(|t| RuntimeTransitionConfig {
                name: t.name.to_string(),
                from: t.from.iter().map(|p| p.to_string()).collect(),
                to: t.to.iter().map(|p| p.to_string()).collect(),
                guard: t.guard.clone(),
                metadata: (!t.metadata.is_empty()).then(|| t.metadata.clone()),
            })
            .collect();

        let initial: Vec<Value> = definition
            .initial_marking
            .iter()
            .map(|p| Value::String(p.to_string()))
            .collect();
        let initial_marking = match definition.kind {
            WorkflowKind::StateMachine => initial.into_iter().next().unwrap_or(Value::Null),
            WorkflowKind::Workflow => Value::Array(initial),
        };

        Self {
            kind: definition.kind,
            supports: definition.supports.clone(),
            places,
            transitions,
            initial_marking,
        }
    }
}

fn serialize_places<S: Serializer>(
    places: &[(String, RuntimePlaceConfig)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(places.len()))?;
    for (name, config) in places {
        map.serialize_entry(name, config)?;
    }
    map.end()
}
