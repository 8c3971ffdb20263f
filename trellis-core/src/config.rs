//! Configuration
//!
//! Tunables for the reactive runtime and the renderer. Both structs use
//! `#[serde(default)]`, so a host can load a partial JSON document and keep
//! the defaults for anything it leaves out.

use serde::{Deserialize, Serialize};

/// Default ceiling for reentrant notification passes and flush rounds.
pub const DEFAULT_ITERATION_LIMIT: usize = 100;

/// Settings for a [`Runtime`](crate::reactive::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum notification passes a single write may trigger when
    /// subscribers write back to the value they observe.
    pub notify_limit: usize,

    /// Maximum drain rounds of one batch flush when effects keep
    /// scheduling each other.
    pub flush_limit: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            notify_limit: DEFAULT_ITERATION_LIMIT,
            flush_limit: DEFAULT_ITERATION_LIMIT,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Settings for a [`Renderer`](crate::render::Renderer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Element names the reconciler refuses to create (case-insensitive).
    pub denied_tags: Vec<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            denied_tags: vec!["script".to_string()],
        }
    }
}

impl RenderConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = RuntimeConfig::from_json(r#"{ "notify_limit": 8 }"#).unwrap();
        assert_eq!(config.notify_limit, 8);
        assert_eq!(config.flush_limit, DEFAULT_ITERATION_LIMIT);
    }

    #[test]
    fn render_config_denies_script_by_default() {
        let config = RenderConfig::default();
        assert_eq!(config.denied_tags, vec!["script".to_string()]);

        let custom = RenderConfig::from_json(r#"{ "denied_tags": ["iframe"] }"#).unwrap();
        assert_eq!(custom.denied_tags, vec!["iframe".to_string()]);
    }
}
