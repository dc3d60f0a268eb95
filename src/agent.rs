//! The `Agent` entity: a tracked unit of work/context (§3 of the spec).
//!
//! Grounded on `original_source/ctm/lib/agents.py::Agent` — field layout,
//! v0→v1 schema migration, and the lifecycle mutators below all mirror it.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use uuid::Uuid;

use crate::error::{CtmError, Result};
use crate::store::{self, MtimeCache};
use crate::time::now_string;

pub const SCHEMA_VERSION: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Paused,
    Blocked,
    Completed,
    Cancelled,
}

impl AgentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, AgentStatus::Completed | AgentStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Active => "active",
            AgentStatus::Paused => "paused",
            AgentStatus::Blocked => "blocked",
            AgentStatus::Completed => "completed",
            AgentStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentPriority {
    Background,
    Low,
    Normal,
    High,
    Critical,
}

impl Default for AgentPriority {
    fn default() -> Self {
        AgentPriority::Normal
    }
}

/// Where an agent's task came from: a human, another agent, or an automated
/// trigger. Additive field from the original schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Source {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub reference: Option<String>,
}

/// Accepts either a bare string or `{text, done}` on deserialize, matching
/// hand-edited files created before this field existed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AcceptanceCriterion {
    Structured { text: String, done: bool },
    Bare(String),
}

impl AcceptanceCriterion {
    pub fn text(&self) -> &str {
        match self {
            AcceptanceCriterion::Structured { text, .. } => text,
            AcceptanceCriterion::Bare(s) => s,
        }
    }

    pub fn done(&self) -> bool {
        match self {
            AcceptanceCriterion::Structured { done, .. } => *done,
            AcceptanceCriterion::Bare(_) => false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Task {
    pub title: String,
    pub goal: String,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub acceptance_criteria: Vec<AcceptanceCriterion>,
    /// Forward-looking links to agents this one will spawn/feed, distinct
    /// from `blockers` (prerequisites). Kept as plain data; unused by the
    /// scheduler.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Context {
    #[serde(default)]
    pub key_files: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<Note>,
    #[serde(default)]
    pub learnings: Vec<Note>,
    #[serde(default)]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub text: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timing {
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub last_activity: String,
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default)]
    pub session_start: Option<String>,
    #[serde(default)]
    pub total_active_seconds: f64,
    #[serde(default)]
    pub session_count: u32,
    /// Free-text estimate carried through from the original schema, unused
    /// by the scheduler.
    #[serde(default)]
    pub estimated_remaining: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Outputs {
    #[serde(default)]
    pub files_created: Vec<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default)]
    pub commits: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default = "default_schema_version")]
    pub version: String,
    #[serde(default)]
    pub migrated_from: Option<String>,
    #[serde(default)]
    pub migration_date: Option<String>,
}

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

fn default_half() -> f64 {
    0.5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityFields {
    #[serde(default)]
    pub level: Option<AgentPriority>,
    /// How time-sensitive the task is, absent a deadline override. Mirrors
    /// `agents.py::Agent.create`'s `priority.urgency` default.
    #[serde(default = "default_half")]
    pub urgency: f64,
    /// Assigned importance/impact, independent of `progress`.
    #[serde(default = "default_half")]
    pub value: f64,
    #[serde(default)]
    pub user_signal: f64,
    #[serde(default)]
    pub computed_score: f64,
}

impl Default for PriorityFields {
    fn default() -> Self {
        PriorityFields {
            level: None,
            urgency: default_half(),
            value: default_half(),
            user_signal: 0.0,
            computed_score: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub task: Task,
    #[serde(default)]
    pub context: Context,
    pub state: AgentStatus,
    /// Percent complete, always in `[0, 100]`.
    #[serde(default)]
    pub progress: f64,
    pub timing: Timing,
    #[serde(default)]
    pub priority: PriorityFields,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub outputs: Outputs,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub checkpoints: Vec<String>,
    #[serde(default)]
    pub blockers: Vec<String>,
    #[serde(default)]
    pub source: Source,
}

impl Agent {
    pub fn create(
        title: impl Into<String>,
        goal: impl Into<String>,
        project: Option<String>,
        priority: AgentPriority,
    ) -> Self {
        let now = now_string();
        let id = Uuid::new_v4().simple().to_string()[..8].to_string();
        Agent {
            id,
            task: Task {
                title: title.into(),
                goal: goal.into(),
                project,
                ..Default::default()
            },
            context: Context::default(),
            state: AgentStatus::Active,
            progress: 0.0,
            timing: Timing {
                created_at: now.clone(),
                updated_at: now.clone(),
                last_activity: now,
                ..Default::default()
            },
            priority: PriorityFields {
                level: Some(priority),
                ..Default::default()
            },
            triggers: Vec::new(),
            outputs: Outputs::default(),
            metadata: Metadata {
                version: SCHEMA_VERSION.to_string(),
                ..Default::default()
            },
            checkpoints: Vec::new(),
            blockers: Vec::new(),
            source: Source::default(),
        }
    }

    pub fn update_activity(&mut self) {
        let now = now_string();
        self.timing.last_activity = now.clone();
        self.timing.updated_at = now;
    }

    pub fn set_status(&mut self, status: AgentStatus) {
        self.state = status;
        if status == AgentStatus::Completed {
            self.progress = 100.0;
        }
        self.update_activity();
    }

    /// Clamp progress into `[0, 100]`, matching `agents.py::add_progress`.
    pub fn add_progress(&mut self, pct: f64) -> f64 {
        self.progress = pct.clamp(0.0, 100.0);
        self.update_activity();
        self.progress
    }

    pub fn add_decision(&mut self, text: impl Into<String>) {
        self.context.decisions.push(Note {
            text: text.into(),
            timestamp: now_string(),
        });
        self.update_activity();
    }

    pub fn add_learning(&mut self, text: impl Into<String>) {
        self.context.learnings.push(Note {
            text: text.into(),
            timestamp: now_string(),
        });
        self.update_activity();
    }

    /// Detect the v0 flat schema (pre-migration) by field-sniffing, mirroring
    /// `agents.py::_is_v0_schema`: v0 files carry `title`/`status`/`progress`
    /// at the top level instead of nested `task`/`state`/`timing`.
    pub fn is_v0_schema(raw: &serde_json::Value) -> bool {
        let obj = match raw.as_object() {
            Some(o) => o,
            None => return false,
        };
        let v0_markers = ["title", "status", "progress", "checkpoints", "blockers", "next_actions"];
        let v1_markers = ["task", "state", "timing", "outputs", "metadata"];
        let has_v0 = v0_markers.iter().any(|k| obj.contains_key(*k));
        let has_v1 = v1_markers.iter().any(|k| obj.contains_key(*k));
        has_v0 && !has_v1
    }

    /// Migrate a v0 flat document into the current nested schema, recording
    /// audit metadata (`migrated_from`, `migration_date`) as the original
    /// does.
    pub fn migrate_v0_to_v1(raw: serde_json::Value) -> Result<serde_json::Value> {
        let obj = raw.as_object().ok_or_else(|| CtmError::CorruptStore {
            path: "<in-memory>".to_string(),
            reason: "v0 agent document is not a JSON object".to_string(),
        })?;

        let id = obj
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CtmError::MissingField {
                entity: "agent".to_string(),
                field: "id".to_string(),
            })?
            .to_string();

        let title = obj
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or("untitled")
            .to_string();
        let status = obj
            .get("status")
            .and_then(|v| v.as_str())
            .unwrap_or("active")
            .to_string();
        let progress = obj.get("progress").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let now = now_string();

        let migrated = serde_json::json!({
            "id": id,
            "task": {
                "title": title,
                "goal": obj.get("goal").cloned().unwrap_or(serde_json::Value::Null),
                "project": obj.get("project").cloned().unwrap_or(serde_json::Value::Null),
                "tags": obj.get("tags").cloned().unwrap_or_else(|| serde_json::json!([])),
                "acceptance_criteria": obj.get("next_actions").cloned().unwrap_or_else(|| serde_json::json!([])),
                "dependencies": [],
            },
            "context": {
                "key_files": obj.get("key_files").cloned().unwrap_or_else(|| serde_json::json!([])),
                "decisions": [],
                "learnings": [],
                "last_error": serde_json::Value::Null,
            },
            "state": status,
            "progress": progress,
            "timing": {
                "created_at": obj.get("created_at").cloned().unwrap_or_else(|| serde_json::json!(now)),
                "updated_at": now,
                "last_activity": now,
                "deadline": serde_json::Value::Null,
                "session_start": serde_json::Value::Null,
                "total_active_seconds": 0.0,
                "session_count": 0,
            },
            "priority": {
                "level": "normal",
                "urgency": 0.5,
                "value": 0.5,
                "user_signal": 0.0,
                "computed_score": 0.0,
            },
            "triggers": [],
            "outputs": {},
            "metadata": {
                "version": SCHEMA_VERSION,
                "migrated_from": "v0",
                "migration_date": now,
            },
            "checkpoints": obj.get("checkpoints").cloned().unwrap_or_else(|| serde_json::json!([])),
            "blockers": obj.get("blockers").cloned().unwrap_or_else(|| serde_json::json!([])),
            "source": {},
        });

        Ok(migrated)
    }
}

impl Agent {
    pub fn hours_since_activity(&self, now: chrono::DateTime<Utc>) -> f64 {
        match crate::time::parse_utc(&self.timing.last_activity) {
            Ok(ts) => (now - ts).num_seconds() as f64 / 3600.0,
            Err(_) => 0.0,
        }
    }

    pub fn days_since_created(&self, now: chrono::DateTime<Utc>) -> f64 {
        match crate::time::parse_utc(&self.timing.created_at) {
            Ok(ts) => (now - ts).num_seconds() as f64 / 86400.0,
            Err(_) => 0.0,
        }
    }
}

/// Process-wide mtime-keyed cache of parsed agent files, capacity 20,
/// mirroring `agents.py`'s module-level `_agent_cache`.
static AGENT_CACHE: OnceLock<Mutex<MtimeCache<Agent>>> = OnceLock::new();

fn cache() -> &'static Mutex<MtimeCache<Agent>> {
    AGENT_CACHE.get_or_init(|| Mutex::new(MtimeCache::new(20)))
}

/// Load an agent file, reusing the cached parse when the file's mtime
/// hasn't changed since it was last read. All agent-file call sites should
/// go through this rather than `store::load::<Agent>` directly.
pub fn load_cached(path: &Path) -> Result<Agent> {
    if let Some(agent) = cache().lock().unwrap().get_fresh(path) {
        return Ok(agent);
    }
    let agent: Agent = store::load(path)?;
    cache()
        .lock()
        .unwrap()
        .insert(path.to_path_buf(), agent.clone());
    Ok(agent)
}

/// Drop `path` from the agent cache, forcing the next [`load_cached`] to
/// re-read from disk. Call after any write to an agent file.
pub fn invalidate_cached(path: &Path) {
    cache().lock().unwrap().invalidate(path);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn load_cached_reuses_parse_until_file_changes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.json");
        let mut a = Agent::create("t", "g", None, AgentPriority::Normal);
        a.id = "cached01".to_string();
        store::save_atomic(&path, &a, Some(&a.id), |x: &Agent| x.id.clone()).unwrap();
        invalidate_cached(&path);

        let first = load_cached(&path).unwrap();
        assert_eq!(first.task.title, "t");

        std::thread::sleep(std::time::Duration::from_millis(10));
        let mut updated = first.clone();
        updated.task.title = "changed".to_string();
        store::save_atomic(&path, &updated, Some(&updated.id), |x: &Agent| x.id.clone()).unwrap();

        let second = load_cached(&path).unwrap();
        assert_eq!(second.task.title, "changed");
    }

    #[test]
    fn create_sets_active_and_timestamps() {
        let a = Agent::create("Title", "Goal", None, AgentPriority::High);
        assert_eq!(a.state, AgentStatus::Active);
        assert_eq!(a.id.len(), 8);
        assert!(!a.timing.created_at.is_empty());
    }

    #[test]
    fn complete_sets_progress_to_100() {
        let mut a = Agent::create("t", "g", None, AgentPriority::Normal);
        a.add_progress(40.0);
        a.set_status(AgentStatus::Completed);
        assert_eq!(a.progress, 100.0);
    }

    #[test]
    fn progress_clamps_to_0_100() {
        let mut a = Agent::create("t", "g", None, AgentPriority::Low);
        assert_eq!(a.add_progress(150.0), 100.0);
        assert_eq!(a.add_progress(-10.0), 0.0);
        assert_eq!(a.add_progress(42.0), 42.0);
    }

    #[test]
    fn set_status_updates_activity() {
        let mut a = Agent::create("t", "g", None, AgentPriority::Low);
        let before = a.timing.last_activity.clone();
        std::thread::sleep(std::time::Duration::from_millis(5));
        a.set_status(AgentStatus::Active);
        assert_eq!(a.state, AgentStatus::Active);
        assert_ne!(before, a.timing.last_activity);
    }

    #[test]
    fn detects_v0_schema() {
        let v0 = serde_json::json!({
            "id": "abc123",
            "title": "old",
            "status": "active",
            "progress": 50,
            "checkpoints": [],
            "blockers": [],
            "next_actions": []
        });
        assert!(Agent::is_v0_schema(&v0));

        let v1 = serde_json::json!({
            "id": "abc123",
            "task": {"title": "new", "goal": "g"},
            "state": "active",
            "timing": {},
            "outputs": {},
            "metadata": {}
        });
        assert!(!Agent::is_v0_schema(&v1));
    }

    #[test]
    fn migrates_v0_to_v1() {
        let v0 = serde_json::json!({
            "id": "abc123",
            "title": "old task",
            "status": "active",
            "progress": 75,
            "checkpoints": ["c1"],
            "blockers": [],
            "next_actions": []
        });
        let migrated = Agent::migrate_v0_to_v1(v0).unwrap();
        assert_eq!(migrated["id"], "abc123");
        assert_eq!(migrated["task"]["title"], "old task");
        assert_eq!(migrated["state"], "active");
        assert_eq!(migrated["metadata"]["migrated_from"], "v0");
        let agent: Agent = serde_json::from_value(migrated).unwrap();
        assert_eq!(agent.task.title, "old task");
    }

    #[test]
    fn acceptance_criterion_accepts_bare_string() {
        let v: AcceptanceCriterion = serde_json::from_str("\"do the thing\"").unwrap();
        assert_eq!(v.text(), "do the thing");
        assert!(!v.done());
    }
}
