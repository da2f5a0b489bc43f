//! Stable identity of entities about to be dispatched

use crate::dispatcher::WorkflowSubject;
use serde_json::Value;

/// Primary key columns and their values, in declaration order
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryKey(Vec<(String, Value)>);

impl PrimaryKey {
    /// Single-column key
    pub fn single(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self(vec![(column.into(), value.into())])
    }

    /// Multi-column key
    pub fn composite<I, K>(columns: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self(columns.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn columns(&self) -> &[(String, Value)] {
        &self.0
    }

    /// String form: the bare value for one column, a JSON object for several
    pub fn to_identifier(&self) -> Option<String> {
        match self.0.as_slice() {
            [] => None,
            [(_, value)] => scalar_identifier(value),
            columns => {
                if columns.iter().any(|(_, v)| v.is_null()) {
                    return None;
                }
                let object: serde_json::Map<String, Value> = columns.iter().cloned().collect();
                Some(Value::Object(object).to_string())
            }
        }
    }
}

fn scalar_identifier(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// One way of resolving an entity id
pub trait IdentityStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn resolve(&self, subject: &dyn WorkflowSubject) -> Option<String>;
}

/// Uses the persistence layer's primary key
pub struct PrimaryKeyStrategy;

impl IdentityStrategy for PrimaryKeyStrategy {
    fn name(&self) -> &str {
        "primary_key"
    }

    fn resolve(&self, subject: &dyn WorkflowSubject) -> Option<String> {
        subject.primary_key()?.to_identifier()
    }
}

/// Reads one named attribute
pub struct AttributeStrategy {
    field: String,
}

impl AttributeStrategy {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

impl IdentityStrategy for AttributeStrategy {
    fn name(&self) -> &str {
        &self.field
    }

    fn resolve(&self, subject: &dyn WorkflowSubject) -> Option<String> {
        subject
            .attributes()
            .get(&self.field)
            .and_then(scalar_identifier)
    }
}

/// Tries strategies in order until one yields an id
pub struct IdentityResolver {
    strategies: Vec<Box<dyn IdentityStrategy>>,
}

impl IdentityResolver {
    pub fn new(strategies: Vec<Box<dyn IdentityStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn resolve(&self, subject: &dyn WorkflowSubject) -> Option<String> {
        self.strategies.iter().find_map(|s| s.resolve(subject))
    }
}

impl Default for IdentityResolver {
    /// Primary key first, then the `id` attribute
    fn default() -> Self {
        Self::new(vec![
            Box::new(PrimaryKeyStrategy),
            Box::new(AttributeStrategy::new("id")),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{Marking, WorkflowName};
    use serde_json::json;

    struct Row {
        key: Option<PrimaryKey>,
        attributes: Value,
    }

    impl WorkflowSubject for Row {
        fn entity_type(&self) -> &str {
            "Row"
        }
        fn marking(&self, _: &WorkflowName) -> Marking {
            Marking::empty()
        }
        fn set_marking(&mut self, _: &WorkflowName, _: Marking) {}
        fn attributes(&self) -> Value {
            self.attributes.clone()
        }
        fn primary_key(&self) -> Option<PrimaryKey> {
            self.key.clone()
        }
    }

    #[test]
    fn test_primary_key_preferred() {
        let row = Row {
            key: Some(PrimaryKey::single("uuid", "a-1")),
            attributes: json!({ "id": 99 }),
        };
        assert_eq!(IdentityResolver::default().resolve(&row).as_deref(), Some("a-1"));
    }

    #[test]
    fn test_falls_back_to_id_attribute() {
        let row = Row {
            key: None,
            attributes: json!({ "id": 99 }),
        };
        assert_eq!(IdentityResolver::default().resolve(&row).as_deref(), Some("99"));
    }

    #[test]
    fn test_composite_key_as_json() {
        let key = PrimaryKey::composite([("tenant", json!("eu")), ("code", json!(7))]);
        let id = key.to_identifier().unwrap();
        let parsed: Value = serde_json::from_str(&id).unwrap();
        assert_eq!(parsed, json!({ "tenant": "eu", "code": 7 }));
    }

    #[test]
    fn test_unresolvable_identity() {
        let row = Row {
            key: Some(PrimaryKey::single("id", Value::Null)),
            attributes: json!({ "name": "no id here" }),
        };
        assert_eq!(IdentityResolver::default().resolve(&row), None);
    }
}
