//! Environment variable loading utilities
//!
//! Typed lookups with fallback defaults, plus a loader that applies a common
//! variable prefix.

use std::env;
use std::str::FromStr;

/// Load an environment variable with a string default
pub fn load_env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Load an environment variable with type conversion and default
pub fn load_env_parsed<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Load an environment variable as an Option<T>
pub fn load_env_optional<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Load a comma separated list; blank items are dropped
pub fn load_env_list(key: &str) -> Option<Vec<String>> {
    let raw = env::var(key).ok()?;
    Some(
        raw.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

/// Builder for loading multiple environment variables with consistent prefix
#[derive(Debug)]
pub struct EnvLoader {
    prefix: String,
}

impl EnvLoader {
    /// Create a new environment loader with the given prefix
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}_{}", self.prefix, suffix)
    }

    /// Load a string value with default
    pub fn load_string(&self, suffix: &str, default: &str) -> String {
        load_env_string(&self.key(suffix), default)
    }

    /// Load a parsed value with default
    pub fn load_parsed<T>(&self, suffix: &str, default: T) -> T
    where
        T: FromStr,
    {
        load_env_parsed(&self.key(suffix), default)
    }

    /// Load an optional value
    pub fn load_optional<T>(&self, suffix: &str) -> Option<T>
    where
        T: FromStr,
    {
        load_env_optional(&self.key(suffix))
    }

    pub fn load_list(&self, suffix: &str) -> Option<Vec<String>> {
        load_env_list(&self.key(suffix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_load_env_string() {
        let key = "STATEBUS_TEST_STRING_VAR";
        env::remove_var(key);
        assert_eq!(load_env_string(key, "fallback"), "fallback");

        env::set_var(key, "value");
        assert_eq!(load_env_string(key, "fallback"), "value");

        env::remove_var(key);
    }

    #[test]
    #[serial]
    fn test_load_env_parsed() {
        let key = "STATEBUS_TEST_PARSED_VAR";
        env::remove_var(key);
        assert_eq!(load_env_parsed(key, 32usize), 32);

        env::set_var(key, " 8 ");
        assert_eq!(load_env_parsed(key, 32usize), 8);

        // Unparseable values fall back to the default
        env::set_var(key, "deep");
        assert_eq!(load_env_parsed(key, 32usize), 32);

        env::remove_var(key);
    }

    #[test]
    #[serial]
    fn test_load_env_list() {
        let key = "STATEBUS_TEST_LIST_VAR";
        env::remove_var(key);
        assert_eq!(load_env_list(key), None);

        env::set_var(key, "workflows, , more/workflows");
        assert_eq!(
            load_env_list(key),
            Some(vec!["workflows".to_string(), "more/workflows".to_string()])
        );

        env::remove_var(key);
    }

    #[test]
    #[serial]
    fn test_env_loader_prefix() {
        let loader = EnvLoader::new("STATEBUS_TEST");
        let key = "STATEBUS_TEST_SYNC";
        env::remove_var(key);
        assert_eq!(loader.load_optional::<bool>("SYNC"), None);
        assert!(!loader.load_parsed("SYNC", false));

        env::set_var(key, "true");
        assert_eq!(loader.load_optional::<bool>("SYNC"), Some(true));
        assert!(loader.load_parsed("SYNC", false));

        env::remove_var(key);
    }
}
