use serde::{Deserialize, Serialize};
use std::time::Duration;

/// History engine settings. Every field has a default, so a partial config
/// file is fine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Consecutive mergeable commands of the same type closer together than
    /// this collapse into one undo step.
    pub merge_window_ms: u64,
    /// Only merge when both commands edit the same entities.
    pub merge_requires_same_target: bool,
    /// Start with serialization switched on (floor at the first id).
    pub persistence_enabled: bool,
    /// Drop the oldest undo entries beyond this many. `None` keeps all.
    pub max_undo_entries: Option<usize>,
}

impl HistoryConfig {
    pub fn merge_window(&self) -> Duration {
        Duration::from_millis(self.merge_window_ms)
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            merge_window_ms: 500,
            merge_requires_same_target: true,
            persistence_enabled: false,
            max_undo_entries: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = HistoryConfig::default();
        assert_eq!(c.merge_window(), Duration::from_millis(500));
        assert!(c.merge_requires_same_target);
        assert!(!c.persistence_enabled);
        assert_eq!(c.max_undo_entries, None);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let c: HistoryConfig = serde_json::from_str(r#"{"merge_window_ms": 120}"#).unwrap();
        assert_eq!(c.merge_window_ms, 120);
        assert!(c.merge_requires_same_target);
    }
}
