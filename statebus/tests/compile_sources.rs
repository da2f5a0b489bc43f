//! Directory compilation: mixed formats, skipped units, runtime config output

mod test_helpers;

use statebus::DefinitionCompiler;
use std::fs;
use tempfile::TempDir;
use test_helpers::ASSET_FLOW_YAML;

const REVIEW_JSON: &str = r#"{
  "workflow": { "name": "Review", "type": "workflow", "supports": ["Article"] },
  "places": [
    { "name": "draft", "initial": true },
    "checked",
    "approved"
  ],
  "transitions": [
    { "name": "check", "from": "draft", "to": "checked", "async": true },
    { "name": "approve", "from": "checked", "to": "approved" }
  ]
}"#;

fn populated_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("asset_flow.yaml"), ASSET_FLOW_YAML).unwrap();
    fs::write(dir.path().join("review.json"), REVIEW_JSON).unwrap();
    fs::write(dir.path().join("broken.yaml"), "workflow: [unterminated").unwrap();
    fs::write(
        dir.path().join("fragment.yml"),
        "places:\n  - only\n",
    )
    .unwrap();
    fs::write(dir.path().join("notes.txt"), "not a workflow").unwrap();
    dir
}

#[test]
fn test_directory_compiles_good_units_and_skips_the_rest() {
    let dir = populated_dir();
    let mut compiler = DefinitionCompiler::new();
    compiler.add_directory(dir.path());
    let compiled = compiler.compile();

    let names: Vec<&str> = compiled.definitions.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["AssetFlow", "Review"]);
    assert_eq!(compiled.sources.len(), 2);

    let skipped: Vec<&str> = compiled
        .skipped
        .iter()
        .filter_map(|s| std::path::Path::new(&s.origin).file_name()?.to_str())
        .collect();
    assert_eq!(skipped, vec!["broken.yaml", "fragment.yml"]);

    assert!(compiled.is_async("AssetFlow", "load"));
    assert!(compiled.is_async("Review", "check"));
    assert!(!compiled.is_async("Review", "approve"));
}

#[test]
fn test_runtime_config_shape() {
    let dir = populated_dir();
    let mut compiler = DefinitionCompiler::new();
    compiler.add_directory(dir.path());
    let runtime = compiler.compile().to_runtime_config();

    let value = serde_json::to_value(&runtime).unwrap();
    assert_eq!(value["AssetFlow"]["type"], "state_machine");
    assert_eq!(value["AssetFlow"]["initial_marking"], "new");
    assert_eq!(value["AssetFlow"]["supports"][0], "Asset");
    assert_eq!(value["Review"]["type"], "workflow");
    assert_eq!(value["Review"]["initial_marking"][0], "draft");

    let yaml = runtime.to_yaml().unwrap();
    assert!(yaml.contains("AssetFlow:"));
    assert!(yaml.contains("Review:"));
}

#[test]
fn test_missing_directory_compiles_nothing() {
    let dir = TempDir::new().unwrap();
    let mut compiler = DefinitionCompiler::new();
    compiler.add_directory(dir.path().join("absent"));
    let compiled = compiler.compile();

    assert!(compiled.definitions.is_empty());
    assert!(compiled.skipped.is_empty());
}
