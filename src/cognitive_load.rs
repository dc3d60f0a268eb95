//! Attention-residue bookkeeping: orthogonal to the scheduler's own state,
//! read-only from its perspective.
//!
//! Grounded on `original_source/ctm/lib/cognitive_load.py::CognitiveLoadTracker`
//! in full.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::store;
use crate::time::now_string;

pub const REFOCUS_TIME_MINUTES: f64 = 23.0;
pub const PRODUCTIVE_RETURN_MINUTES: f64 = 9.5;
pub const ATTENTION_DECAY_HALFLIFE_HOURS: f64 = 4.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptionEvent {
    pub from_agent: Option<String>,
    pub to_agent: String,
    pub reason: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentLoad {
    #[serde(default)]
    pub interruption_count: u32,
    #[serde(default)]
    pub last_switch: Option<String>,
    #[serde(default)]
    pub attention_residue: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionState {
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub switches: u32,
    #[serde(default)]
    pub total_residue: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionStatsSummary {
    #[serde(default)]
    pub total_switches: u64,
    #[serde(default)]
    pub avg_session_minutes: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CognitiveLoadState {
    #[serde(default)]
    pub interruptions: Vec<InterruptionEvent>,
    #[serde(default)]
    pub agent_load: HashMap<String, AgentLoad>,
    #[serde(default)]
    pub current_session: SessionState,
    #[serde(default)]
    pub stats: SessionStatsSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchImpact {
    pub residue_added: f64,
    pub estimated_refocus_minutes: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FocusAction {
    Continue,
    ClearResidue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocusRecommendation {
    pub action: FocusAction,
    pub message: String,
}

pub struct CognitiveLoadTracker {
    root: PathBuf,
    pub state: CognitiveLoadState,
}

impl CognitiveLoadTracker {
    pub fn load(root: &Path) -> Result<Self> {
        let path = crate::paths::cognitive_load_file(root);
        let state = if store::exists(&path) {
            store::load(&path)?
        } else {
            CognitiveLoadState::default()
        };
        Ok(CognitiveLoadTracker {
            root: root.to_path_buf(),
            state,
        })
    }

    pub fn save(&self) -> Result<()> {
        let path = crate::paths::cognitive_load_file(&self.root);
        store::save_atomic(&path, &self.state, None, |_: &CognitiveLoadState| String::new())
    }

    fn switch_residue(progress: f64, reason: &str) -> f64 {
        let progress_factor = 1.0 - (progress - 50.0).abs() / 50.0;
        let reason_factor = match reason {
            "blocked" => 0.3,
            "completed" => 0.1,
            "urgent" => 0.7,
            _ => 0.5,
        };
        progress_factor * reason_factor
    }

    /// Record an interruption, update the departing agent's residue, and
    /// return the estimated refocus cost.
    pub fn on_task_switch(
        &mut self,
        from_agent: Option<&str>,
        to_agent: &str,
        from_progress: f64,
        reason: &str,
    ) -> SwitchImpact {
        let now = now_string();
        self.state.interruptions.push(InterruptionEvent {
            from_agent: from_agent.map(|s| s.to_string()),
            to_agent: to_agent.to_string(),
            reason: reason.to_string(),
            timestamp: now.clone(),
        });
        if self.state.interruptions.len() > 100 {
            let drop = self.state.interruptions.len() - 100;
            self.state.interruptions.drain(0..drop);
        }

        let residue = Self::switch_residue(from_progress, reason);

        if let Some(from) = from_agent {
            let load = self.state.agent_load.entry(from.to_string()).or_default();
            load.interruption_count += 1;
            load.last_switch = Some(now.clone());
            load.attention_residue = (load.attention_residue + residue).min(1.0);
        }

        self.state.current_session.switches += 1;
        self.state.current_session.total_residue += residue;
        self.state.stats.total_switches += 1;

        SwitchImpact {
            residue_added: residue,
            estimated_refocus_minutes: residue * REFOCUS_TIME_MINUTES,
        }
    }

    /// Time-decayed residue for `agent_id`: halves every
    /// [`ATTENTION_DECAY_HALFLIFE_HOURS`] since its last switch.
    pub fn calculate_residue(&self, agent_id: &str, now: chrono::DateTime<chrono::Utc>) -> f64 {
        let load = match self.state.agent_load.get(agent_id) {
            Some(l) => l,
            None => return 0.0,
        };
        let hours_since = load
            .last_switch
            .as_deref()
            .and_then(|s| crate::time::parse_utc(s).ok())
            .map(|ts| ((now - ts).num_seconds() as f64 / 3600.0).max(0.0))
            .unwrap_or(0.0);
        load.attention_residue * 0.5f64.powf(hours_since / ATTENTION_DECAY_HALFLIFE_HOURS)
    }

    pub fn get_focus_recommendation(&self, current_agent_id: Option<&str>) -> FocusRecommendation {
        if self.state.current_session.total_residue > 0.7 {
            return FocusRecommendation {
                action: FocusAction::ClearResidue,
                message: "accumulated residue is high; consider finishing or parking the current task before switching again".to_string(),
            };
        }
        if self.state.current_session.switches > 5 {
            return FocusRecommendation {
                action: FocusAction::Continue,
                message: "many switches this session; context may be getting thin".to_string(),
            };
        }
        if let Some(agent_id) = current_agent_id {
            let residue = self.calculate_residue(agent_id, chrono::Utc::now());
            if residue > 0.3 {
                return FocusRecommendation {
                    action: FocusAction::Continue,
                    message: "current agent still carries some residue from a recent interruption".to_string(),
                };
            }
        }
        FocusRecommendation {
            action: FocusAction::Continue,
            message: "healthy".to_string(),
        }
    }

    pub fn reset_session(&mut self) {
        self.state.current_session = SessionState {
            started_at: Some(now_string()),
            switches: 0,
            total_residue: 0.0,
        };
    }

    pub fn get_agent_load(&self, agent_id: &str) -> Option<&AgentLoad> {
        self.state.agent_load.get(agent_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tracker(root: &Path) -> CognitiveLoadTracker {
        crate::paths::ensure_layout(root).unwrap();
        CognitiveLoadTracker::load(root).unwrap()
    }

    #[test]
    fn switch_residue_peaks_at_50_percent_progress() {
        assert!(CognitiveLoadTracker::switch_residue(50.0, "user_initiated") >
                 CognitiveLoadTracker::switch_residue(0.0, "user_initiated"));
        assert!(CognitiveLoadTracker::switch_residue(50.0, "user_initiated") >
                 CognitiveLoadTracker::switch_residue(100.0, "user_initiated"));
    }

    #[test]
    fn completed_reason_has_lowest_residue_factor() {
        let completed = CognitiveLoadTracker::switch_residue(50.0, "completed");
        let urgent = CognitiveLoadTracker::switch_residue(50.0, "urgent");
        assert!(completed < urgent);
    }

    #[test]
    fn on_task_switch_accumulates_residue_on_source_agent() {
        let tmp = TempDir::new().unwrap();
        let mut t = tracker(tmp.path());
        let impact = t.on_task_switch(Some("a1"), "a2", 50.0, "user_initiated");
        assert!(impact.residue_added > 0.0);
        assert!(t.get_agent_load("a1").unwrap().attention_residue > 0.0);
    }

    #[test]
    fn residue_decays_over_time() {
        let tmp = TempDir::new().unwrap();
        let mut t = tracker(tmp.path());
        t.on_task_switch(Some("a1"), "a2", 50.0, "urgent");
        let now = chrono::Utc::now();
        let immediate = t.calculate_residue("a1", now);
        let later = t.calculate_residue("a1", now + chrono::Duration::hours(4));
        assert!(later < immediate);
        assert!((later - immediate / 2.0).abs() < 0.01);
    }

    #[test]
    fn high_total_residue_recommends_clearing() {
        let tmp = TempDir::new().unwrap();
        let mut t = tracker(tmp.path());
        t.state.current_session.total_residue = 0.9;
        let rec = t.get_focus_recommendation(None);
        assert_eq!(rec.action, FocusAction::ClearResidue);
    }
}
