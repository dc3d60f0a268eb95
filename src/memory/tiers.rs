//! C7 — four-tier memory hierarchy with pressure detection, weighted
//! demotion, and compression on demotion to L3/L4.
//!
//! Grounded on `original_source/ctm/lib/memory_tiers.py::TieredMemoryManager`
//! in full.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::agent::Agent;
use crate::config::Config;
use crate::error::Result;
use crate::store;
use crate::time::now_string;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    L1Active = 1,
    L2Working = 2,
    L3Episodic = 3,
    L4Semantic = 4,
}

impl MemoryTier {
    pub fn next(self) -> Option<MemoryTier> {
        match self {
            MemoryTier::L1Active => Some(MemoryTier::L2Working),
            MemoryTier::L2Working => Some(MemoryTier::L3Episodic),
            MemoryTier::L3Episodic => Some(MemoryTier::L4Semantic),
            MemoryTier::L4Semantic => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TierConfig {
    pub max_agents: usize,
    pub token_budget: u64,
    pub retention_days: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierSlot {
    pub agent_id: String,
    pub loaded_at: String,
    pub last_accessed: String,
    pub access_count: u32,
    pub token_estimate: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicKeyContext {
    pub title: String,
    pub goal: String,
    pub status: String,
    pub progress: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicEntry {
    pub agent_id: String,
    pub session_id: String,
    pub timestamp: String,
    pub summary: String,
    pub decisions: Vec<String>,
    pub learnings: Vec<String>,
    pub key_context: EpisodicKeyContext,
    pub token_estimate: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionResult {
    pub summary: String,
    pub key_facts: Vec<String>,
    pub decisions_preserved: usize,
    pub learnings_preserved: usize,
    pub original_tokens: u64,
    pub compressed_tokens: u64,
    pub compression_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TierBucket {
    #[serde(default)]
    pub slots: Vec<TierSlot>,
    #[serde(default)]
    pub token_usage: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SemanticBucket {
    #[serde(default)]
    pub indexed: Vec<String>,
    #[serde(default)]
    pub last_sync: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CompressionStats {
    #[serde(default)]
    pub total_compressions: u64,
    #[serde(default)]
    pub tokens_saved: i64,
    #[serde(default)]
    pub avg_compression_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TieredMemoryState {
    #[serde(default)]
    pub l1_active: TierBucket,
    #[serde(default)]
    pub l2_working: TierBucket,
    #[serde(default)]
    pub l3_episodic: Vec<EpisodicEntry>,
    #[serde(default)]
    pub l3_token_usage: u64,
    #[serde(default)]
    pub l4_semantic: SemanticBucket,
    #[serde(default)]
    pub pressure_events: Vec<String>,
    #[serde(default)]
    pub compression_stats: CompressionStats,
}

pub struct TieredMemoryManager {
    root: PathBuf,
    pub state: TieredMemoryState,
    pub config: Config,
}

impl TieredMemoryManager {
    pub fn load(root: &Path) -> Result<Self> {
        let path = crate::paths::tiered_memory_file(root);
        let state = if store::exists(&path) {
            store::load(&path)?
        } else {
            TieredMemoryState::default()
        };
        let config = Config::load(root, None)?;
        Ok(TieredMemoryManager {
            root: root.to_path_buf(),
            state,
            config,
        })
    }

    pub fn save(&self) -> Result<()> {
        let path = crate::paths::tiered_memory_file(&self.root);
        store::save_atomic(&path, &self.state, None, |_: &TieredMemoryState| String::new())
    }

    pub fn tier_config(&self, tier: MemoryTier) -> TierConfig {
        let mt = &self.config.memory_tiers;
        match tier {
            MemoryTier::L1Active => TierConfig {
                max_agents: mt.l1_max_agents,
                token_budget: mt.l1_token_budget,
                retention_days: None,
            },
            MemoryTier::L2Working => TierConfig {
                max_agents: mt.l2_max_agents,
                token_budget: mt.l2_token_budget,
                retention_days: None,
            },
            MemoryTier::L3Episodic => TierConfig {
                max_agents: 999,
                token_budget: 50_000,
                retention_days: Some(mt.l3_retention_days),
            },
            MemoryTier::L4Semantic => TierConfig {
                max_agents: 999,
                token_budget: 999_999,
                retention_days: None,
            },
        }
    }

    fn bucket(&self, tier: MemoryTier) -> Option<&TierBucket> {
        match tier {
            MemoryTier::L1Active => Some(&self.state.l1_active),
            MemoryTier::L2Working => Some(&self.state.l2_working),
            _ => None,
        }
    }

    fn bucket_mut(&mut self, tier: MemoryTier) -> Option<&mut TierBucket> {
        match tier {
            MemoryTier::L1Active => Some(&mut self.state.l1_active),
            MemoryTier::L2Working => Some(&mut self.state.l2_working),
            _ => None,
        }
    }

    /// `usage_ratio = max(slot_ratio, token_ratio)`; only L1/L2 can report
    /// pressure (L3/L4 are effectively unbounded).
    pub fn check_pressure(&self, tier: MemoryTier) -> bool {
        let cfg = self.tier_config(tier);
        let bucket = match self.bucket(tier) {
            Some(b) => b,
            None => return false,
        };
        let slot_ratio = bucket.slots.len() as f64 / cfg.max_agents.max(1) as f64;
        let token_ratio = bucket.token_usage as f64 / cfg.token_budget.max(1) as f64;
        let usage_ratio = slot_ratio.max(token_ratio);
        usage_ratio >= self.config.memory_tiers.pressure_threshold
    }

    /// Weighted demotion score: recency (50%), inverse frequency (30%),
    /// token footprint (20%). Picks the slot with the highest score.
    pub fn select_for_demotion(&self, tier: MemoryTier) -> Option<String> {
        let cfg = self.tier_config(tier);
        let bucket = self.bucket(tier)?;
        let now = chrono::Utc::now();

        bucket
            .slots
            .iter()
            .map(|slot| {
                let hours_since_access = crate::time::parse_utc(&slot.last_accessed)
                    .map(|ts| ((now - ts).num_seconds() as f64 / 3600.0).max(0.0))
                    .unwrap_or(0.0);
                let time_score = (1.0 + hours_since_access).ln();
                let frequency_score = 1.0 / (1.0 + (1.0 + slot.access_count as f64).ln());
                let token_score = slot.token_estimate as f64 / cfg.token_budget.max(1) as f64;
                let demotion_score = time_score * 0.5 + frequency_score * 0.3 + token_score * 0.2;
                (slot.agent_id.clone(), demotion_score)
            })
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(id, _)| id)
    }

    fn estimate_tokens(agent: &Agent) -> u64 {
        let mut tokens = 200u64;
        tokens += agent.task.title.len() as u64 / 4;
        tokens += agent.task.goal.len() as u64 / 4;
        for d in &agent.context.decisions {
            tokens += d.text.len() as u64 / 4;
        }
        for l in &agent.context.learnings {
            tokens += l.text.len() as u64 / 4;
        }
        tokens += agent.context.key_files.len() as u64 * 20;
        tokens.max(100)
    }

    pub fn add_to_tier(&mut self, tier: MemoryTier, agent: &Agent) {
        let token_estimate = Self::estimate_tokens(agent);
        let now = now_string();
        let slot = TierSlot {
            agent_id: agent.id.clone(),
            loaded_at: now.clone(),
            last_accessed: now,
            access_count: 1,
            token_estimate,
        };
        if let Some(bucket) = self.bucket_mut(tier) {
            bucket.token_usage += token_estimate;
            bucket.slots.push(slot);
        }
    }

    fn remove_from_tier(&mut self, tier: MemoryTier, agent_id: &str) -> Option<TierSlot> {
        let bucket = self.bucket_mut(tier)?;
        let pos = bucket.slots.iter().position(|s| s.agent_id == agent_id)?;
        let slot = bucket.slots.remove(pos);
        bucket.token_usage = bucket.token_usage.saturating_sub(slot.token_estimate);
        Some(slot)
    }

    pub fn find_agent_tier(&self, agent_id: &str) -> Option<MemoryTier> {
        if self.state.l1_active.slots.iter().any(|s| s.agent_id == agent_id) {
            return Some(MemoryTier::L1Active);
        }
        if self.state.l2_working.slots.iter().any(|s| s.agent_id == agent_id) {
            return Some(MemoryTier::L2Working);
        }
        if self.state.l3_episodic.iter().any(|e| e.agent_id == agent_id) {
            return Some(MemoryTier::L3Episodic);
        }
        if self.state.l4_semantic.indexed.iter().any(|id| id == agent_id) {
            return Some(MemoryTier::L4Semantic);
        }
        None
    }

    /// Build a compressed summary: up to 8 "key facts" (title, trimmed goal,
    /// status+progress, up to 3 decisions, up to 3 learnings), joined with
    /// " | ", matching `memory_tiers.py::compress`.
    pub fn compress(agent: &Agent) -> CompressionResult {
        let mut key_facts = Vec::new();
        key_facts.push(format!("Task: {}", agent.task.title));
        let goal_trimmed: String = agent.task.goal.chars().take(100).collect();
        key_facts.push(format!("Goal: {goal_trimmed}"));
        key_facts.push(format!("Status: {} ({:.0}%)", agent.state.as_str(), agent.progress));

        let mut decisions_preserved = 0;
        for d in agent.context.decisions.iter().rev().take(3) {
            let trimmed: String = d.text.chars().take(80).collect();
            key_facts.push(format!("Decision: {trimmed}"));
            decisions_preserved += 1;
        }

        let mut learnings_preserved = 0;
        for l in agent.context.learnings.iter().rev().take(3) {
            let trimmed: String = l.text.chars().take(80).collect();
            key_facts.push(format!("Learning: {trimmed}"));
            learnings_preserved += 1;
        }

        let summary = key_facts.iter().take(8).cloned().collect::<Vec<_>>().join(" | ");
        let original_text = format!(
            "{}{}{}{}",
            agent.task.title,
            agent.task.goal,
            agent.context.decisions.iter().map(|d| d.text.clone()).collect::<String>(),
            agent.context.learnings.iter().map(|l| l.text.clone()).collect::<String>(),
        );
        let original_tokens = (original_text.len() as u64 / 4).max(1);
        let compressed_tokens = summary.len() as u64 / 4;

        CompressionResult {
            summary,
            key_facts,
            decisions_preserved,
            learnings_preserved,
            original_tokens,
            compressed_tokens,
            compression_ratio: compressed_tokens as f64 / original_tokens.max(1) as f64,
        }
    }

    fn add_episodic_entry(&mut self, agent: &Agent, compression: &CompressionResult) {
        let now = now_string();
        let entry = EpisodicEntry {
            agent_id: agent.id.clone(),
            session_id: format!("{}-{}", agent.id, &now[..10.min(now.len())]),
            timestamp: now,
            summary: compression.summary.clone(),
            decisions: agent
                .context
                .decisions
                .iter()
                .rev()
                .take(5)
                .map(|d| d.text.clone())
                .collect(),
            learnings: agent
                .context
                .learnings
                .iter()
                .rev()
                .take(5)
                .map(|l| l.text.clone())
                .collect(),
            key_context: EpisodicKeyContext {
                title: agent.task.title.clone(),
                goal: agent.task.goal.chars().take(200).collect(),
                status: agent.state.as_str().to_string(),
                progress: agent.progress,
            },
            token_estimate: compression.compressed_tokens,
        };

        self.state.l3_token_usage += entry.token_estimate;
        self.state.l3_episodic.push(entry.clone());

        if let Ok(mut existing) = store::load::<Vec<EpisodicEntry>>(&crate::paths::episodic_file(&self.root, &agent.id)) {
            existing.push(entry);
            let _ = std::fs::write(
                crate::paths::episodic_file(&self.root, &agent.id),
                serde_json::to_string_pretty(&existing).unwrap_or_default(),
            );
        } else {
            let _ = std::fs::write(
                crate::paths::episodic_file(&self.root, &agent.id),
                serde_json::to_string_pretty(&vec![entry]).unwrap_or_default(),
            );
        }
    }

    fn index_to_semantic(&mut self, agent: &Agent, compression: &CompressionResult) -> Result<()> {
        let content = format!(
            "# Agent: {}\n\n## Task: {}\n\nGoal: {}\n\nStatus: {}\n\nSummary: {}\n\nDecisions:\n{}\n\nLearnings:\n{}\n",
            agent.id,
            agent.task.title,
            agent.task.goal,
            agent.state.as_str(),
            compression.summary,
            agent.context.decisions.iter().map(|d| format!("- {}", d.text)).collect::<Vec<_>>().join("\n"),
            agent.context.learnings.iter().map(|l| format!("- {}", l.text)).collect::<Vec<_>>().join("\n"),
        );
        std::fs::write(crate::paths::semantic_file(&self.root, &agent.id), content)?;

        let manifest = serde_json::json!({
            "agent_id": agent.id,
            "indexed_at": now_string(),
            "source_tier": "l3_episodic",
        });
        std::fs::write(
            crate::paths::semantic_manifest_file(&self.root, &agent.id),
            serde_json::to_string_pretty(&manifest)?,
        )?;

        if !self.state.l4_semantic.indexed.contains(&agent.id) {
            self.state.l4_semantic.indexed.push(agent.id.clone());
        }
        self.state.l4_semantic.last_sync = Some(now_string());
        Ok(())
    }

    /// Demote `agent` one tier down (compressing when the target is L3/L4),
    /// updating the running compression-ratio average.
    pub fn demote(&mut self, agent: &Agent) -> Result<()> {
        let current = self
            .find_agent_tier(&agent.id)
            .unwrap_or(MemoryTier::L1Active);
        let target = current.next().unwrap_or(MemoryTier::L4Semantic);

        self.remove_from_tier(current, &agent.id);

        match target {
            MemoryTier::L3Episodic => {
                let compression = Self::compress(agent);
                self.record_compression(&compression);
                self.add_episodic_entry(agent, &compression);
            }
            MemoryTier::L4Semantic => {
                let compression = Self::compress(agent);
                self.record_compression(&compression);
                self.index_to_semantic(agent, &compression)?;
            }
            _ => self.add_to_tier(target, agent),
        }
        Ok(())
    }

    fn record_compression(&mut self, result: &CompressionResult) {
        let stats = &mut self.state.compression_stats;
        let n = stats.total_compressions + 1;
        stats.avg_compression_ratio =
            (stats.avg_compression_ratio * stats.total_compressions as f64 + result.compression_ratio) / n as f64;
        stats.tokens_saved += result.original_tokens as i64 - result.compressed_tokens as i64;
        stats.total_compressions = n;
    }

    /// Promote `agent_id` to `to_tier`, demoting one existing occupant of
    /// the target tier first if it's under pressure (at most one demotion).
    pub fn promote(&mut self, agent: &Agent, to_tier: MemoryTier) -> Result<()> {
        if let Some(current) = self.find_agent_tier(&agent.id) {
            self.remove_from_tier(current, &agent.id);
        }
        if self.check_pressure(to_tier) {
            if let Some(victim_id) = self.select_for_demotion(to_tier) {
                if let Ok(victim) = store::load::<Agent>(&crate::paths::agent_file(&self.root, &victim_id)) {
                    self.demote(&victim)?;
                }
            }
        }
        self.add_to_tier(to_tier, agent);
        Ok(())
    }

    pub fn touch(&mut self, agent_id: &str) {
        let now = now_string();
        if let Some(slot) = self.state.l1_active.slots.iter_mut().find(|s| s.agent_id == agent_id) {
            slot.last_accessed = now;
            slot.access_count += 1;
            return;
        }
        if let Some(slot) = self.state.l2_working.slots.iter_mut().find(|s| s.agent_id == agent_id) {
            slot.last_accessed = now;
            slot.access_count += 1;
        }
    }

    /// Demote while L1/L2 remain pressured, then sweep L3 entries past
    /// their retention window into L4. Returns a human-readable log of
    /// actions taken, and caps `pressure_events` at the most recent 100.
    pub fn check_and_manage_pressure(&mut self) -> Result<Vec<String>> {
        let mut actions = Vec::new();

        for tier in [MemoryTier::L1Active, MemoryTier::L2Working] {
            while self.check_pressure(tier) {
                let Some(victim_id) = self.select_for_demotion(tier) else {
                    break;
                };
                let Ok(victim) = store::load::<Agent>(&crate::paths::agent_file(&self.root, &victim_id)) else {
                    break;
                };
                self.demote(&victim)?;
                actions.push(format!("demoted {victim_id} from {tier:?} under pressure"));
            }
        }

        let retention_days = self.tier_config(MemoryTier::L3Episodic).retention_days.unwrap_or(30);
        let now = chrono::Utc::now();
        let cutoff = now - chrono::Duration::days(retention_days);
        let (stale, fresh): (Vec<_>, Vec<_>) = self.state.l3_episodic.drain(..).partition(|e| {
            crate::time::parse_utc(&e.timestamp)
                .map(|ts| ts < cutoff)
                .unwrap_or(false)
        });
        self.state.l3_episodic = fresh;

        for entry in stale {
            if let Ok(agent) = store::load::<Agent>(&crate::paths::agent_file(&self.root, &entry.agent_id)) {
                let compression = Self::compress(&agent);
                self.index_to_semantic(&agent, &compression)?;
                actions.push(format!("consolidated {} from L3 to L4 (retention expired)", entry.agent_id));
            }
        }

        for action in &actions {
            self.state.pressure_events.push(action.clone());
        }
        if self.state.pressure_events.len() > 100 {
            let drop = self.state.pressure_events.len() - 100;
            self.state.pressure_events.drain(0..drop);
        }

        Ok(actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentPriority;
    use tempfile::TempDir;

    fn manager(root: &Path) -> TieredMemoryManager {
        crate::paths::ensure_layout(root).unwrap();
        TieredMemoryManager::load(root).unwrap()
    }

    #[test]
    fn pressure_detects_slot_ratio_over_threshold() {
        let tmp = TempDir::new().unwrap();
        let mut mgr = manager(tmp.path());
        let a1 = Agent::create("a", "g", None, AgentPriority::Normal);
        let a2 = Agent::create("b", "g", None, AgentPriority::Normal);
        assert!(!mgr.check_pressure(MemoryTier::L1Active));
        mgr.add_to_tier(MemoryTier::L1Active, &a1);
        mgr.add_to_tier(MemoryTier::L1Active, &a2);
        // default l1_max_agents = 2 -> slot_ratio = 1.0 >= 0.7 threshold
        assert!(mgr.check_pressure(MemoryTier::L1Active));
    }

    #[test]
    fn compress_produces_bounded_summary() {
        let mut agent = Agent::create("Big task", "A very important goal to accomplish", None, AgentPriority::Normal);
        agent.add_decision("Chose approach A over approach B for performance");
        agent.add_learning("Learned that caching helps a lot here");
        let result = TieredMemoryManager::compress(&agent);
        assert!(result.summary.contains("Big task"));
        assert_eq!(result.decisions_preserved, 1);
        assert_eq!(result.learnings_preserved, 1);
        assert!(result.compression_ratio <= 1.0);
    }

    #[test]
    fn compress_keeps_short_decisions_and_learnings() {
        let mut agent = Agent::create("t", "g", None, AgentPriority::Normal);
        agent.add_decision("Fixed bug");
        agent.add_learning("Use it");
        let result = TieredMemoryManager::compress(&agent);
        assert_eq!(result.decisions_preserved, 1);
        assert_eq!(result.learnings_preserved, 1);
        assert!(result.summary.contains("Fixed bug"));
        assert!(result.summary.contains("Use it"));
    }

    #[test]
    fn demote_from_l2_writes_episodic_entry() {
        let tmp = TempDir::new().unwrap();
        let mut mgr = manager(tmp.path());
        let agent = Agent::create("t", "g", None, AgentPriority::Normal);
        mgr.add_to_tier(MemoryTier::L2Working, &agent);
        mgr.demote(&agent).unwrap();
        assert_eq!(mgr.find_agent_tier(&agent.id), Some(MemoryTier::L3Episodic));
        assert_eq!(mgr.state.l3_episodic.len(), 1);
        assert_eq!(mgr.state.compression_stats.total_compressions, 1);
    }

    #[test]
    fn demote_from_l3_writes_semantic_markdown_and_manifest() {
        let tmp = TempDir::new().unwrap();
        let mut mgr = manager(tmp.path());
        let agent = Agent::create("t", "g", None, AgentPriority::Normal);
        store::save_atomic(
            &crate::paths::agent_file(tmp.path(), &agent.id),
            &agent,
            Some(&agent.id),
            |a: &Agent| a.id.clone(),
        )
        .unwrap();

        mgr.state.l3_episodic.push(EpisodicEntry {
            agent_id: agent.id.clone(),
            session_id: "s".to_string(),
            timestamp: now_string(),
            summary: "s".to_string(),
            decisions: vec![],
            learnings: vec![],
            key_context: EpisodicKeyContext {
                title: "t".to_string(),
                goal: "g".to_string(),
                status: "pending".to_string(),
                progress: 0.0,
            },
            token_estimate: 10,
        });
        mgr.demote(&agent).unwrap();

        assert!(crate::paths::semantic_file(tmp.path(), &agent.id).is_file());
        assert!(crate::paths::semantic_manifest_file(tmp.path(), &agent.id).is_file());
        assert!(mgr.state.l4_semantic.indexed.contains(&agent.id));
    }

    #[test]
    fn select_for_demotion_prefers_stale_low_frequency_slot() {
        let tmp = TempDir::new().unwrap();
        let mut mgr = manager(tmp.path());
        let stale = TierSlot {
            agent_id: "stale".to_string(),
            loaded_at: now_string(),
            last_accessed: crate::time::format_utc(chrono::Utc::now() - chrono::Duration::hours(48)),
            access_count: 1,
            token_estimate: 100,
        };
        let fresh = TierSlot {
            agent_id: "fresh".to_string(),
            loaded_at: now_string(),
            last_accessed: now_string(),
            access_count: 20,
            token_estimate: 100,
        };
        mgr.state.l1_active.slots.push(stale);
        mgr.state.l1_active.slots.push(fresh);

        let victim = mgr.select_for_demotion(MemoryTier::L1Active).unwrap();
        assert_eq!(victim, "stale");
    }
}
