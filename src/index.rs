//! C3 — secondary index over agents, grouped by status and project.
//!
//! Grounded on `original_source/ctm/lib/agents.py::AgentIndex`: an
//! `agents` map of summary info plus `by_status`/`by_project` buckets,
//! persisted via the same atomic-write path as everything else, and every
//! mutation saves immediately rather than batching.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::agent::{Agent, AgentStatus};
use crate::error::Result;
use crate::store;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub title: String,
    pub status: AgentStatus,
    #[serde(default)]
    pub project: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentIndex {
    #[serde(default)]
    pub agents: BTreeMap<String, IndexEntry>,
    #[serde(default)]
    pub by_status: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub by_project: BTreeMap<String, Vec<String>>,
}

const STATUS_BUCKETS: [&str; 5] = ["active", "paused", "blocked", "completed", "cancelled"];

impl AgentIndex {
    pub fn new() -> Self {
        let mut by_status = BTreeMap::new();
        for bucket in STATUS_BUCKETS {
            by_status.insert(bucket.to_string(), Vec::new());
        }
        AgentIndex {
            agents: BTreeMap::new(),
            by_status,
            by_project: BTreeMap::new(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = crate::paths::index_file(root);
        if !store::exists(&path) {
            return Ok(Self::new());
        }
        store::load(&path)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = crate::paths::index_file(root);
        store::save_atomic(&path, self, None, |_: &AgentIndex| String::new())
    }

    fn remove_from_bucket(bucket: &mut Vec<String>, id: &str) {
        bucket.retain(|x| x != id);
    }

    pub fn add(&mut self, root: &Path, agent: &Agent) -> Result<()> {
        self.upsert(agent);
        self.save(root)
    }

    pub fn update(&mut self, root: &Path, agent: &Agent) -> Result<()> {
        self.upsert(agent);
        self.save(root)
    }

    fn upsert(&mut self, agent: &Agent) {
        if let Some(old) = self.agents.get(&agent.id).cloned() {
            Self::remove_from_bucket(
                self.by_status.entry(old.status.as_str().to_string()).or_default(),
                &agent.id,
            );
            if let Some(proj) = &old.project {
                Self::remove_from_bucket(self.by_project.entry(proj.clone()).or_default(), &agent.id);
            }
        }

        self.agents.insert(
            agent.id.clone(),
            IndexEntry {
                id: agent.id.clone(),
                title: agent.task.title.clone(),
                status: agent.state,
                project: agent.task.project.clone(),
            },
        );
        self.by_status
            .entry(agent.state.as_str().to_string())
            .or_default()
            .push(agent.id.clone());
        if let Some(proj) = &agent.task.project {
            self.by_project
                .entry(proj.clone())
                .or_default()
                .push(agent.id.clone());
        }
    }

    pub fn remove(&mut self, root: &Path, agent_id: &str) -> Result<()> {
        if let Some(entry) = self.agents.remove(agent_id) {
            Self::remove_from_bucket(
                self.by_status.entry(entry.status.as_str().to_string()).or_default(),
                agent_id,
            );
            if let Some(proj) = &entry.project {
                Self::remove_from_bucket(self.by_project.entry(proj.clone()).or_default(), agent_id);
            }
        }
        self.save(root)
    }

    pub fn get_by_status(&self, status: AgentStatus) -> &[String] {
        self.by_status
            .get(status.as_str())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn get_by_project(&self, project: &str) -> &[String] {
        self.by_project
            .get(project)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Union of active, paused, and blocked agent ids — the scheduler's
    /// working set, matching `agents.py::AgentIndex.get_all_active`.
    pub fn get_all_active(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for status in [AgentStatus::Active, AgentStatus::Paused, AgentStatus::Blocked] {
            ids.extend(self.get_by_status(status).iter().cloned());
        }
        ids
    }

    pub fn get_info(&self, agent_id: &str) -> Option<&IndexEntry> {
        self.agents.get(agent_id)
    }

    /// Rebuild the index from scratch by scanning agent files on disk,
    /// skipping (and reporting) any file that fails to parse. Used by the
    /// `repair` command.
    pub fn rebuild_from_disk(root: &Path) -> Result<(Self, Vec<(String, String)>)> {
        let mut index = Self::new();
        let mut failures = Vec::new();
        let dir = crate::paths::agents_dir(root);
        if !dir.is_dir() {
            return Ok((index, failures));
        }
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match crate::agent::load_cached(&path) {
                Ok(agent) => index.upsert(&agent),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping corrupt agent file during reindex");
                    failures.push((path.display().to_string(), e.to_string()));
                }
            }
        }
        Ok((index, failures))
    }
}
