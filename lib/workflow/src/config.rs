//! Engine tuning knobs.

use serde::{Deserialize, Serialize};

fn default_max_cascade_depth() -> u32 {
    50
}

fn default_max_commit_retries() -> u32 {
    3
}

/// Limits applied by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of automatic transitions started by one request.
    #[serde(default = "default_max_cascade_depth")]
    pub max_cascade_depth: u32,
    /// Retries after a lost compare-and-swap before giving up with
    /// `Conflict`. The first attempt is not counted.
    #[serde(default = "default_max_commit_retries")]
    pub max_commit_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_cascade_depth: default_max_cascade_depth(),
            max_commit_retries: default_max_commit_retries(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"max_cascade_depth": 5}"#).expect("parse");
        assert_eq!(config.max_cascade_depth, 5);
        assert_eq!(config.max_commit_retries, 3);
        assert_eq!(
            serde_json::from_str::<EngineConfig>("{}").expect("parse"),
            EngineConfig::default()
        );
    }
}
