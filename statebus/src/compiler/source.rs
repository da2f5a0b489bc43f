//! Declarative source units and their parsed declaration form
//!
//! A source unit is one YAML or JSON document. It only counts as a workflow
//! declaration when it carries a top-level `workflow:` mapping:
//!
//! ```yaml
//! workflow:
//!   name: AssetFlow
//!   type: state_machine
//!   supports: [Asset]
//!   initial: new
//! places:
//!   - name: new
//!     next: load
//!   - loaded
//! transitions:
//!   - name: load
//!     from: new
//!     to: loaded
//!     async: true
//! ```

use crate::compiler::{CompileError, CompileResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// File extensions recognized as declarative sources
pub const SOURCE_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Markup flavour of a source unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Yaml,
    Json,
}

impl SourceFormat {
    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// One declarative document awaiting compilation
#[derive(Debug, Clone)]
pub struct SourceUnit {
    /// Human readable origin used in diagnostics
    pub origin: String,
    /// File the unit was read from, if any
    pub path: Option<PathBuf>,
    pub format: SourceFormat,
    pub content: String,
}

impl SourceUnit {
    /// An in-memory YAML unit
    pub fn yaml(origin: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            path: None,
            format: SourceFormat::Yaml,
            content: content.into(),
        }
    }

    /// An in-memory JSON unit
    pub fn json(origin: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            path: None,
            format: SourceFormat::Json,
            content: content.into(),
        }
    }

    /// Read a unit from disk
    pub fn from_path(path: &Path) -> CompileResult<Self> {
        let format = SourceFormat::from_path(path).ok_or_else(|| CompileError::UnsupportedFormat {
            path: path.to_path_buf(),
        })?;
        let content = std::fs::read_to_string(path).map_err(|source| CompileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            origin: path.display().to_string(),
            path: Some(path.to_path_buf()),
            format,
            content,
        })
    }

    /// Name used when the declaration does not name itself
    pub fn default_name(&self) -> Option<String> {
        self.path
            .as_deref()
            .and_then(|p| p.file_stem())
            .map(|stem| stem.to_string_lossy().into_owned())
            .or_else(|| {
                Path::new(&self.origin)
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
            })
            .filter(|name| !name.trim().is_empty())
    }

    /// Parse the unit into a declaration
    pub fn parse(&self) -> CompileResult<WorkflowDeclaration> {
        let document: SourceDocument = match self.format {
            SourceFormat::Yaml => {
                serde_yaml::from_str(&self.content).map_err(|e| CompileError::Malformed {
                    origin: self.origin.clone(),
                    message: e.to_string(),
                })?
            }
            SourceFormat::Json => {
                serde_json::from_str(&self.content).map_err(|e| CompileError::Malformed {
                    origin: self.origin.clone(),
                    message: e.to_string(),
                })?
            }
        };

        let mut header = document
            .workflow
            .ok_or_else(|| CompileError::MissingDeclaration {
                origin: self.origin.clone(),
            })?;
        if header.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
            header.name = self.default_name();
        }

        Ok(WorkflowDeclaration {
            workflow: header,
            places: document.places,
            transitions: document.transitions,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SourceDocument {
    workflow: Option<WorkflowHeader>,
    #[serde(default)]
    places: Vec<PlaceDeclaration>,
    #[serde(default)]
    transitions: Vec<TransitionDeclaration>,
}

/// One or several entries written as a scalar or a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(item) => vec![item],
            Self::Many(items) => items,
        }
    }
}

impl Default for OneOrMany {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl From<&str> for OneOrMany {
    fn from(item: &str) -> Self {
        Self::One(item.to_string())
    }
}

impl<const N: usize> From<[&str; N]> for OneOrMany {
    fn from(items: [&str; N]) -> Self {
        Self::Many(items.iter().map(|s| s.to_string()).collect())
    }
}

/// The `workflow:` header of a declaration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowHeader {
    #[serde(default)]
    pub name: Option<String>,
    /// `workflow` or `state_machine`
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub supports: Option<OneOrMany>,
    #[serde(default)]
    pub initial: Option<OneOrMany>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// A place as written in a declaration
///
/// The shorthand form is a bare name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlaceDeclaration {
    Name(String),
    Full(PlaceSpec),
}

impl PlaceDeclaration {
    /// Start a full place declaration
    pub fn new(name: impl Into<String>) -> PlaceSpec {
        PlaceSpec {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Full(spec) => &spec.name,
        }
    }

    pub(crate) fn into_spec(self) -> PlaceSpec {
        match self {
            Self::Name(name) => PlaceSpec {
                name,
                ..Default::default()
            },
            Self::Full(spec) => spec,
        }
    }
}

/// Full place declaration; attribute-style keys merge into `metadata`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaceSpec {
    pub name: String,
    #[serde(default)]
    pub initial: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        rename = "backgroundColor",
        skip_serializing_if = "Option::is_none"
    )]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<OneOrMany>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Unrecognized keys written next to the known ones
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PlaceSpec {
    pub fn initial(mut self) -> Self {
        self.initial = true;
        self
    }

    pub fn info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }

    pub fn next(mut self, next: impl Into<OneOrMany>) -> Self {
        self.next = Some(next.into());
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl From<PlaceSpec> for PlaceDeclaration {
    fn from(spec: PlaceSpec) -> Self {
        Self::Full(spec)
    }
}

impl From<&str> for PlaceDeclaration {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

/// A transition as written in a declaration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionDeclaration {
    pub name: String,
    #[serde(default)]
    pub from: OneOrMany,
    #[serde(default)]
    pub to: OneOrMany,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<String>,
    #[serde(default, rename = "async")]
    pub is_async: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<OneOrMany>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Unrecognized keys written next to the known ones
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TransitionDeclaration {
    pub fn new(
        name: impl Into<String>,
        from: impl Into<OneOrMany>,
        to: impl Into<OneOrMany>,
    ) -> Self {
        Self {
            name: name.into(),
            from: from.into(),
            to: to.into(),
            ..Default::default()
        }
    }

    pub fn guard(mut self, guard: impl Into<String>) -> Self {
        self.guard = Some(guard.into());
        self
    }

    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }

    pub fn transport(mut self, transport: impl Into<String>) -> Self {
        self.transport = Some(transport.into());
        self
    }

    pub fn next(mut self, next: impl Into<OneOrMany>) -> Self {
        self.next = Some(next.into());
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A structured workflow declaration, parsed from a unit or registered directly
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDeclaration {
    pub workflow: WorkflowHeader,
    #[serde(default)]
    pub places: Vec<PlaceDeclaration>,
    #[serde(default)]
    pub transitions: Vec<TransitionDeclaration>,
}

impl WorkflowDeclaration {
    /// Start a declaration with the given workflow name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            workflow: WorkflowHeader {
                name: Some(name.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Declare the workflow as `workflow` or `state_machine`
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.workflow.kind = Some(kind.into());
        self
    }

    pub fn supports(mut self, supports: impl Into<OneOrMany>) -> Self {
        self.workflow.supports = Some(supports.into());
        self
    }

    pub fn initial(mut self, initial: impl Into<OneOrMany>) -> Self {
        self.workflow.initial = Some(initial.into());
        self
    }

    pub fn place(mut self, place: impl Into<PlaceDeclaration>) -> Self {
        self.places.push(place.into());
        self
    }

    pub fn transition(mut self, transition: TransitionDeclaration) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.workflow.name.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASSET_FLOW: &str = r#"
workflow:
  name: AssetFlow
  supports: Asset
  initial: new
places:
  - name: new
    next: load
    metadata:
      x-owner: media-team
  - loaded
transitions:
  - name: load
    from: new
    to: loaded
    async: true
"#;

    #[test]
    fn test_parse_yaml_unit() {
        let decl = SourceUnit::yaml("asset.yaml", ASSET_FLOW).parse().unwrap();

        assert_eq!(decl.name(), Some("AssetFlow"));
        assert_eq!(decl.places.len(), 2);
        assert_eq!(decl.places[1], PlaceDeclaration::Name("loaded".to_string()));
        assert!(decl.transitions[0].is_async);
        assert_eq!(decl.workflow.initial, Some(OneOrMany::One("new".to_string())));
    }

    #[test]
    fn test_parse_json_unit() {
        let json = r#"{
            "workflow": { "type": "workflow" },
            "places": ["draft", "done"],
            "transitions": [{ "name": "finish", "from": ["draft"], "to": "done" }]
        }"#;
        let decl = SourceUnit::json("workflows/Review.json", json).parse().unwrap();

        assert_eq!(decl.name(), Some("Review"));
        assert_eq!(decl.workflow.kind.as_deref(), Some("workflow"));
        assert_eq!(decl.transitions[0].from, OneOrMany::Many(vec!["draft".into()]));
    }

    #[test]
    fn test_missing_marker_rejected() {
        let err = SourceUnit::yaml("notes.yaml", "places: [a, b]\n")
            .parse()
            .unwrap_err();
        assert!(matches!(err, CompileError::MissingDeclaration { .. }));
    }

    #[test]
    fn test_malformed_unit_rejected() {
        let err = SourceUnit::yaml("broken.yaml", "workflow: [unclosed\n")
            .parse()
            .unwrap_err();
        assert!(matches!(err, CompileError::Malformed { .. }));
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            SourceFormat::from_path(Path::new("a/b.YML")),
            Some(SourceFormat::Yaml)
        );
        assert_eq!(
            SourceFormat::from_path(Path::new("a.json")),
            Some(SourceFormat::Json)
        );
        assert_eq!(SourceFormat::from_path(Path::new("a.md")), None);
    }

    #[test]
    fn test_builder_style_declaration() {
        let decl = WorkflowDeclaration::new("AssetFlow")
            .supports("Asset")
            .place(PlaceDeclaration::new("new").initial().next("load"))
            .place("loaded")
            .transition(TransitionDeclaration::new("load", "new", "loaded").asynchronous());

        assert_eq!(decl.places[0].name(), "new");
        assert_eq!(decl.places[1].name(), "loaded");
        assert!(decl.transitions[0].is_async);
    }
}
