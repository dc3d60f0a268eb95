//! CTM configuration: defaults, deep-merged with a global then an optional
//! project-local overlay.
//!
//! Grounded on `original_source/ctm/lib/config.py` (the `DEFAULTS` table and
//! `_deep_merge`), adapted into the teacher's pattern of a typed struct with
//! convenience accessors (`examples/SaintPepsi-spiral-core/src/config/mod.rs`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::error::Result;
use crate::paths;


#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriorityWeights {
    pub urgency: f64,
    pub recency: f64,
    pub value: f64,
    pub novelty: f64,
    pub user_signal: f64,
    pub error_boost: f64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        PriorityWeights {
            urgency: 0.25,
            recency: 0.20,
            value: 0.20,
            novelty: 0.15,
            user_signal: 0.15,
            error_boost: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriorityConfig {
    pub weights: PriorityWeights,
    pub recency_halflife_hours: f64,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        PriorityConfig {
            weights: PriorityWeights::default(),
            recency_halflife_hours: 24.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryTiersConfig {
    pub l1_max_agents: usize,
    pub l1_token_budget: u64,
    pub l2_max_agents: usize,
    pub l2_token_budget: u64,
    pub l3_retention_days: i64,
    pub pressure_threshold: f64,
    pub compression_model: String,
    pub auto_manage: bool,
}

impl Default for MemoryTiersConfig {
    fn default() -> Self {
        MemoryTiersConfig {
            l1_max_agents: 2,
            l1_token_budget: 4000,
            l2_max_agents: 5,
            l2_token_budget: 8000,
            l3_retention_days: 30,
            pressure_threshold: 0.7,
            compression_model: "haiku".to_string(),
            auto_manage: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelfManagementConfig {
    pub enabled: bool,
    pub pressure_threshold: f64,
}

impl Default for SelfManagementConfig {
    fn default() -> Self {
        SelfManagementConfig {
            enabled: true,
            pressure_threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkingMemoryConfig {
    pub max_hot_agents: usize,
    pub token_budget: u64,
    pub eviction_policy: String,
}

impl Default for WorkingMemoryConfig {
    fn default() -> Self {
        WorkingMemoryConfig {
            max_hot_agents: 5,
            token_budget: 8000,
            eviction_policy: "weighted_lru".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointingConfig {
    #[serde(default = "default_keep_checkpoints")]
    pub keep: usize,
}

impl Default for CheckpointingConfig {
    fn default() -> Self {
        CheckpointingConfig {
            keep: default_keep_checkpoints(),
        }
    }
}

fn default_keep_checkpoints() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UiConfig {
    #[serde(default)]
    pub briefing_on_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Project-context priority boost (spec §4.4): not user-configurable in the
/// original, kept as a named constant here too.
pub const PROJECT_CONTEXT_BOOST: f64 = 0.20;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub priority: PriorityConfig,
    #[serde(default)]
    pub memory_tiers: MemoryTiersConfig,
    #[serde(default)]
    pub self_management: SelfManagementConfig,
    #[serde(default)]
    pub working_memory: WorkingMemoryConfig,
    #[serde(default)]
    pub checkpointing: CheckpointingConfig,
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Anything else present on disk but not modeled above, preserved
    /// verbatim so `set`/`save` round-trips without data loss.
    #[serde(flatten)]
    pub raw_extra: std::collections::BTreeMap<String, Value>,
}

impl Config {
    /// Load defaults, then deep-merge the global `config.json`, then an
    /// optional project-local overlay, matching
    /// `config.py::_load_merged_config`.
    pub fn load(root: &Path, project_overlay: Option<&Path>) -> Result<Self> {
        let mut merged = serde_json::to_value(Config::default())?;

        let global_path = paths::config_file(root);
        if global_path.is_file() {
            let global_raw = std::fs::read_to_string(&global_path)?;
            let global: Value = serde_json::from_str(&global_raw)?;
            deep_merge(&mut merged, &global);
        }

        if let Some(overlay_path) = project_overlay {
            if overlay_path.is_file() {
                let overlay_raw = std::fs::read_to_string(overlay_path)?;
                let overlay: Value = serde_json::from_str(&overlay_raw)?;
                deep_merge(&mut merged, &overlay);
            }
        }

        Ok(serde_json::from_value(merged)?)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_file(root);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Recursively merge `overlay` into `base`, overlay values winning; nested
/// objects merge key-by-key rather than replacing wholesale.
fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (k, v) in overlay_map {
                deep_merge(base_map.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value.clone();
        }
    }
}
