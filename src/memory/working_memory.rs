//! C8 — working-memory hot-slot pool: a small, fast cache of the agents
//! currently in active use, separate from (and simpler than) the C7 tier
//! hierarchy.
//!
//! No dedicated Python module for this layer survived the retrieval filter;
//! built from §4.8's decay-rule description, using the same
//! `working_memory.*` config keys as `original_source/ctm/lib/config.py`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::Result;
use crate::store;
use crate::time::now_string;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotSlot {
    pub agent_id: String,
    pub loaded_at: String,
    pub last_accessed: String,
    pub access_count: u32,
    pub token_estimate: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkingMemoryState {
    #[serde(default)]
    pub hot_agents: Vec<HotSlot>,
    #[serde(default)]
    pub token_usage: u64,
}

pub struct WorkingMemoryPool {
    root: PathBuf,
    pub state: WorkingMemoryState,
    pub config: Config,
}

impl WorkingMemoryPool {
    pub fn load(root: &Path) -> Result<Self> {
        let path = crate::paths::working_memory_file(root);
        let state = if store::exists(&path) {
            store::load(&path)?
        } else {
            WorkingMemoryState::default()
        };
        let config = Config::load(root, None)?;
        Ok(WorkingMemoryPool {
            root: root.to_path_buf(),
            state,
            config,
        })
    }

    pub fn save(&self) -> Result<()> {
        let path = crate::paths::working_memory_file(&self.root);
        store::save_atomic(&path, &self.state, None, |_: &WorkingMemoryState| String::new())
    }

    /// Eviction decay score: doubles every hour of idleness, dampened by how
    /// often the slot has been touched, weighted up by its token footprint.
    /// Highest score is evicted first — stalest, least-accessed, most
    /// expensive slot wins.
    fn eviction_score(&self, slot: &HotSlot, now: chrono::DateTime<chrono::Utc>) -> f64 {
        let hours_idle = crate::time::parse_utc(&slot.last_accessed)
            .map(|ts| ((now - ts).num_seconds() as f64 / 3600.0).max(0.0))
            .unwrap_or(0.0);
        let recency = 2f64.powf(hours_idle);
        let frequency_dampening = 1.0 / (1.0 + (1.0 + slot.access_count as f64).ln());
        let token_budget = self.config.working_memory.token_budget.max(1) as f64;
        let cost = 1.0 + slot.token_estimate as f64 / token_budget;
        recency * frequency_dampening * cost
    }

    /// Load `agent_id` into the hot pool, estimating `token_estimate` tokens.
    /// Evicts the lowest-scoring slot first if the pool is at capacity.
    /// Returns the evicted agent id, if any.
    pub fn load_agent(&mut self, agent_id: &str, token_estimate: u64) -> Option<String> {
        if let Some(slot) = self.state.hot_agents.iter_mut().find(|s| s.agent_id == agent_id) {
            slot.last_accessed = now_string();
            slot.access_count += 1;
            return None;
        }

        let mut evicted = None;
        if self.state.hot_agents.len() >= self.config.working_memory.max_hot_agents {
            evicted = self.evict_one();
        }

        let now = now_string();
        self.state.hot_agents.push(HotSlot {
            agent_id: agent_id.to_string(),
            loaded_at: now.clone(),
            last_accessed: now,
            access_count: 1,
            token_estimate,
        });
        self.state.token_usage += token_estimate;
        evicted
    }

    fn evict_one(&mut self) -> Option<String> {
        let now = chrono::Utc::now();
        let victim_idx = self
            .state
            .hot_agents
            .iter()
            .map(|s| self.eviction_score(s, now))
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(idx, _)| idx)?;

        let victim = self.state.hot_agents.remove(victim_idx);
        self.state.token_usage = self.state.token_usage.saturating_sub(victim.token_estimate);
        Some(victim.agent_id)
    }

    pub fn touch(&mut self, agent_id: &str) {
        if let Some(slot) = self.state.hot_agents.iter_mut().find(|s| s.agent_id == agent_id) {
            slot.last_accessed = now_string();
            slot.access_count += 1;
        }
    }

    pub fn is_pressured(&self) -> bool {
        let slot_ratio =
            self.state.hot_agents.len() as f64 / self.config.working_memory.max_hot_agents.max(1) as f64;
        let token_ratio = self.state.token_usage as f64 / self.config.working_memory.token_budget.max(1) as f64;
        slot_ratio.max(token_ratio) >= self.config.memory_tiers.pressure_threshold
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.state.hot_agents.iter().any(|s| s.agent_id == agent_id)
    }
}
