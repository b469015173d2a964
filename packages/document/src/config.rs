use serde::{Deserialize, Serialize};

/// Tunables for one document replica
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentConfig {
    /// Undo depth, 0 means unlimited
    #[serde(default = "default_max_undo_levels")]
    pub max_undo_levels: usize,

    /// Distance under which two positions are the same vertex
    #[serde(default = "default_graph_epsilon")]
    pub graph_epsilon: f64,

    /// Run the full invariant check after every batch
    #[serde(default = "default_check_invariants")]
    pub check_invariants: bool,

    /// Upper bound on consistency derivation rounds per batch
    #[serde(default = "default_max_derivation_passes")]
    pub max_derivation_passes: usize,
}

fn default_max_undo_levels() -> usize {
    100
}

fn default_graph_epsilon() -> f64 {
    0.01
}

fn default_check_invariants() -> bool {
    true
}

fn default_max_derivation_passes() -> usize {
    16
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            max_undo_levels: default_max_undo_levels(),
            graph_epsilon: default_graph_epsilon(),
            check_invariants: default_check_invariants(),
            max_derivation_passes: default_max_derivation_passes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: DocumentConfig = serde_json::from_str(r#"{ "maxUndoLevels": 5 }"#).unwrap();
        assert_eq!(config.max_undo_levels, 5);
        assert_eq!(config.graph_epsilon, 0.01);
        assert!(config.check_invariants);
        assert_eq!(config.max_derivation_passes, 16);
    }
}
