//! Guard expression evaluation with CEL
//!
//! Guards see three kinds of variables:
//! - `subject`: the subject's attributes as a map
//! - `marking`: the list of currently marked place names
//! - every top-level attribute of the subject under its own name
//!
//! Compiled programs are cached in an LRU keyed by expression text.

use crate::workflow::Marking;
use cel_interpreter::{Context, Program, Value as CelValue};
use lru::LruCache;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Default number of compiled guard programs kept in memory
pub const DEFAULT_GUARD_CACHE_SIZE: usize = 500;

/// Errors raised while evaluating a guard
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GuardError {
    /// Expression failed to parse
    #[error("Failed to compile guard '{expression}': {message}")]
    Compile { expression: String, message: String },

    /// A variable could not be placed into the evaluation context
    #[error("Failed to bind variable '{variable}' for guard '{expression}': {message}")]
    Binding {
        expression: String,
        variable: String,
        message: String,
    },

    /// Expression raised while running
    #[error("Guard '{expression}' failed: {message}")]
    Execution { expression: String, message: String },

    /// Expression produced something other than a truth value
    #[error("Guard '{expression}' returned non-boolean result: {value}")]
    NonBoolean { expression: String, value: String },
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}

/// Thread-safe LRU cache for compiled guard programs
pub struct GuardProgramCache {
    cache: Mutex<LruCache<String, Arc<Program>>>,
    stats: Mutex<CacheStats>,
}

impl GuardProgramCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or_else(|| NonZeroUsize::new(DEFAULT_GUARD_CACHE_SIZE))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            stats: Mutex::new(CacheStats {
                capacity: capacity.get(),
                ..Default::default()
            }),
        }
    }

    /// Fetch a compiled program, compiling and caching it on a miss
    pub fn get_or_compile(&self, expression: &str) -> Result<Arc<Program>, GuardError> {
        {
            let mut cache = lock(&self.cache);
            if let Some(program) = cache.get(expression) {
                lock(&self.stats).hits += 1;
                return Ok(program.clone());
            }
        }

        let program = Program::compile(expression).map_err(|e| GuardError::Compile {
            expression: expression.to_string(),
            message: e.to_string(),
        })?;
        let program = Arc::new(program);

        let mut cache = lock(&self.cache);
        let mut stats = lock(&self.stats);
        stats.misses += 1;
        if cache.len() == cache.cap().get() && !cache.contains(expression) {
            stats.evictions += 1;
        }
        cache.put(expression.to_string(), program.clone());
        stats.size = cache.len();

        Ok(program)
    }

    pub fn stats(&self) -> CacheStats {
        lock(&self.stats).clone()
    }

    pub fn clear(&self) {
        let mut cache = lock(&self.cache);
        let mut stats = lock(&self.stats);
        cache.clear();
        stats.size = 0;
    }
}

impl Default for GuardProgramCache {
    fn default() -> Self {
        Self::new(DEFAULT_GUARD_CACHE_SIZE)
    }
}

// A poisoned lock only means another thread panicked mid-update; the cache
// content is still usable.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Evaluates transition guards against a subject and its marking
#[derive(Default)]
pub struct GuardEvaluator {
    cache: GuardProgramCache,
}

impl GuardEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_size(capacity: usize) -> Self {
        Self {
            cache: GuardProgramCache::new(capacity),
        }
    }

    /// Evaluate `expression`; an empty expression always passes
    pub fn evaluate(
        &self,
        expression: &str,
        attributes: &Value,
        marking: &Marking,
    ) -> Result<bool, GuardError> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Ok(true);
        }

        let program = self.cache.get_or_compile(expression)?;
        let mut context = Context::default();
        bind_variables(&mut context, expression, attributes, marking)?;

        let value = program
            .execute(&context)
            .map_err(|e| GuardError::Execution {
                expression: expression.to_string(),
                message: e.to_string(),
            })?;

        cel_value_to_bool(&value, expression)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

fn bind_variables(
    context: &mut Context,
    expression: &str,
    attributes: &Value,
    marking: &Marking,
) -> Result<(), GuardError> {
    let bind_error = |variable: &str, message: String| GuardError::Binding {
        expression: expression.to_string(),
        variable: variable.to_string(),
        message,
    };

    context
        .add_variable("marking", marking.names())
        .map_err(|e| bind_error("marking", e.to_string()))?;

    let subject = if attributes.is_null() {
        Value::Object(Default::default())
    } else {
        attributes.clone()
    };
    if let Value::Object(fields) = &subject {
        for (key, value) in fields {
            if key == "subject" || key == "marking" || value.is_null() {
                continue;
            }
            context
                .add_variable(key.as_str(), value.clone())
                .map_err(|e| bind_error(key, e.to_string()))?;
        }
    }
    context
        .add_variable("subject", subject)
        .map_err(|e| bind_error("subject", e.to_string()))?;

    Ok(())
}

/// Convert CEL value to boolean
fn cel_value_to_bool(value: &CelValue, expression: &str) -> Result<bool, GuardError> {
    match value {
        CelValue::Bool(b) => Ok(*b),
        CelValue::Int(i) => Ok(*i != 0),
        CelValue::UInt(u) => Ok(*u != 0),
        CelValue::Null => Ok(false),
        _ => Err(GuardError::NonBoolean {
            expression: expression.to_string(),
            value: format!("{value:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_guard_passes() {
        let guards = GuardEvaluator::new();
        assert!(guards.evaluate("", &Value::Null, &Marking::empty()).unwrap());
        assert!(guards.evaluate("  ", &Value::Null, &Marking::empty()).unwrap());
    }

    #[test]
    fn test_guard_reads_subject_attributes() {
        let guards = GuardEvaluator::new();
        let attrs = json!({ "size": 12, "mime": "image/png" });
        let marking = Marking::single("new");

        assert!(guards.evaluate("subject.size > 10", &attrs, &marking).unwrap());
        assert!(guards.evaluate("size > 10", &attrs, &marking).unwrap());
        assert!(!guards
            .evaluate("mime == 'video/mp4'", &attrs, &marking)
            .unwrap());
    }

    #[test]
    fn test_guard_reads_marking() {
        let guards = GuardEvaluator::new();
        let marking = Marking::from_places(["reviewed", "translated"]);

        assert!(guards
            .evaluate("'reviewed' in marking", &Value::Null, &marking)
            .unwrap());
        assert!(!guards
            .evaluate("'published' in marking", &Value::Null, &marking)
            .unwrap());
    }

    #[test]
    fn test_compile_error() {
        let guards = GuardEvaluator::new();
        let err = guards
            .evaluate("size >", &json!({ "size": 1 }), &Marking::empty())
            .unwrap_err();
        assert!(matches!(err, GuardError::Compile { .. }));
    }

    #[test]
    fn test_unknown_variable_is_execution_error() {
        let guards = GuardEvaluator::new();
        let err = guards
            .evaluate("missing_field > 3", &json!({}), &Marking::empty())
            .unwrap_err();
        assert!(matches!(err, GuardError::Execution { .. }));
    }

    #[test]
    fn test_non_boolean_result() {
        let guards = GuardEvaluator::new();
        let err = guards
            .evaluate("name", &json!({ "name": "x" }), &Marking::empty())
            .unwrap_err();
        assert!(matches!(err, GuardError::NonBoolean { .. }));
    }

    #[test]
    fn test_programs_are_cached() {
        let guards = GuardEvaluator::with_cache_size(4);
        let attrs = json!({ "size": 1 });
        for _ in 0..3 {
            guards.evaluate("size == 1", &attrs, &Marking::empty()).unwrap();
        }
        let stats = guards.cache_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn test_cache_eviction_counted() {
        let cache = GuardProgramCache::new(1);
        cache.get_or_compile("1 == 1").unwrap();
        cache.get_or_compile("2 == 2").unwrap();
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.stats().size, 1);
    }
}
