//! Consumer-side partition filtering
//!
//! Several consumers can share one queue by each accepting only some context
//! values. A message a consumer does not accept is left alone: neither acked
//! nor rejected.

use crate::env_loader::load_env_string;
use crate::message::Envelope;
use tracing::debug;

/// Variable holding the allow-list when nothing else is configured
pub const DEFAULT_FILTER_ENV: &str = "CONTEXT_STAMP";

/// Variable that renames the allow-list variable
pub const FILTER_ENV_OVERRIDE: &str = "STATE_FILTER_ENV";

/// Values this consumer accepts; empty accepts everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextFilterConfig {
    pub allow_list: Vec<String>,
}

impl ContextFilterConfig {
    pub fn new<I, S>(allow_list: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allow_list: allow_list
                .into_iter()
                .map(Into::into)
                .map(|v: String| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect(),
        }
    }

    /// Parse a comma separated list
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(','))
    }

    /// Read the allow-list from the environment, once.
    ///
    /// `name` is the variable to read unless `STATE_FILTER_ENV` names another.
    pub fn from_env(name: &str) -> Self {
        let variable = load_env_string(FILTER_ENV_OVERRIDE, name);
        let config = Self::parse(&load_env_string(&variable, ""));
        debug!(
            "Context filter from ${}: {:?}",
            variable, config.allow_list
        );
        config
    }
}

/// Decides whether this consumer handles an envelope
#[derive(Debug, Clone, Default)]
pub struct ContextFilter {
    config: ContextFilterConfig,
}

impl ContextFilter {
    pub fn new(config: ContextFilterConfig) -> Self {
        Self { config }
    }

    /// A filter that accepts every envelope
    pub fn accept_all() -> Self {
        Self::default()
    }

    pub fn config(&self) -> &ContextFilterConfig {
        &self.config
    }

    /// Whether the envelope's last context value is allowed
    pub fn should_handle(&self, envelope: &Envelope) -> bool {
        if self.config.allow_list.is_empty() {
            return true;
        }
        match envelope.last_context() {
            Some(stamp) => {
                let value = stamp.value.to_string();
                self.config.allow_list.iter().any(|allowed| *allowed == value)
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ContextStamp, TransitionMessage};
    use serial_test::serial;
    use std::env;

    fn envelope() -> Envelope {
        Envelope::new(TransitionMessage::new("1", "Asset", "load", "AssetFlow"))
    }

    #[test]
    fn test_empty_allow_list_accepts_everything() {
        let filter = ContextFilter::accept_all();
        assert!(filter.should_handle(&envelope()));
        assert!(filter.should_handle(&envelope().with(ContextStamp::new("aac"))));
    }

    #[test]
    fn test_allow_list_matching() {
        let filter = ContextFilter::new(ContextFilterConfig::parse("euro, ddb"));

        assert!(filter.should_handle(&envelope().with(ContextStamp::new("euro"))));
        assert!(filter.should_handle(&envelope().with(ContextStamp::new("ddb"))));
        assert!(!filter.should_handle(&envelope().with(ContextStamp::new("aac"))));
        assert!(!filter.should_handle(&envelope()));
    }

    #[test]
    fn test_last_context_stamp_decides() {
        let filter = ContextFilter::new(ContextFilterConfig::new(["euro"]));
        let stamped = envelope()
            .with(ContextStamp::new("euro"))
            .with(ContextStamp::new("aac"));
        assert!(!filter.should_handle(&stamped));
    }

    #[test]
    fn test_integer_values_compared_as_strings() {
        let filter = ContextFilter::new(ContextFilterConfig::parse("7"));
        assert!(filter.should_handle(&envelope().with(ContextStamp::new(7))));
    }

    #[test]
    fn test_parse_trims_and_drops_empty_entries() {
        let config = ContextFilterConfig::parse(" euro ,, ddb ,");
        assert_eq!(config.allow_list, vec!["euro", "ddb"]);
        assert!(ContextFilterConfig::parse("").allow_list.is_empty());
    }

    #[test]
    #[serial]
    fn test_from_env_default_variable() {
        env::remove_var(FILTER_ENV_OVERRIDE);
        env::set_var("STATEBUS_TEST_CONTEXT", "euro,ddb");

        let config = ContextFilterConfig::from_env("STATEBUS_TEST_CONTEXT");
        assert_eq!(config.allow_list, vec!["euro", "ddb"]);

        env::remove_var("STATEBUS_TEST_CONTEXT");
    }

    #[test]
    #[serial]
    fn test_from_env_redirected_variable() {
        env::set_var(FILTER_ENV_OVERRIDE, "STATEBUS_TEST_REGION");
        env::set_var("STATEBUS_TEST_REGION", "aac");

        let config = ContextFilterConfig::from_env(DEFAULT_FILTER_ENV);
        assert_eq!(config.allow_list, vec!["aac"]);

        env::remove_var(FILTER_ENV_OVERRIDE);
        env::remove_var("STATEBUS_TEST_REGION");
    }
}
