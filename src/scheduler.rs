//! C6 — rebuilds the priority queue, tracks the single active agent, and
//! detects preemption opportunities.
//!
//! Grounded on `original_source/ctm/lib/scheduler.py::Scheduler` in full:
//! `rebuild_queue`, `set_active`/`switch_to`, `preempt_check`,
//! `detect_project_context`/`is_project_match`, and the module-level
//! `get_scheduler`/`invalidate_scheduler_cache` singleton (translated here to
//! a `std::sync::OnceLock<Mutex<...>>`, since the core has no async runtime —
//! see §5 of SPEC_FULL.md).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::SystemTime;

use crate::agent::{Agent, AgentStatus};
use crate::config::Config;
use crate::dependencies;
use crate::error::Result;
use crate::index::AgentIndex;
use crate::priority::calculate_priority;
use crate::store;
use crate::time::now_string;

/// Preemption threshold: a paused agent must beat the active one by more
/// than this much to trigger a switch suggestion.
const PREEMPT_MARGIN: f64 = 0.2;

const PROJECT_MARKERS: [&str; 5] = [".git", ".claude", "package.json", "pyproject.toml", "Cargo.toml"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionStats {
    #[serde(default)]
    pub switches: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchedulerState {
    #[serde(default)]
    pub active_agent_id: Option<String>,
    #[serde(default)]
    pub queue: Vec<QueueItem>,
    #[serde(default)]
    pub last_switch: Option<String>,
    #[serde(default)]
    pub project_context: Option<String>,
    #[serde(default)]
    pub session: SessionStats,
}

/// Walk up from `start` looking for a project marker, matching
/// `scheduler.py::detect_project_context`.
pub fn detect_project_context(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start.to_path_buf());
    while let Some(d) = dir {
        if PROJECT_MARKERS.iter().any(|m| d.join(m).exists()) {
            return Some(d);
        }
        dir = d.parent().map(|p| p.to_path_buf());
    }
    None
}

/// True when `agent_project` is the same path as, or nested inside,
/// `current_project`.
pub fn is_project_match(agent_project: &str, current_project: &Path) -> bool {
    let agent_path = Path::new(agent_project);
    agent_path == current_project || agent_path.starts_with(current_project)
}

pub struct Scheduler {
    root: PathBuf,
    pub state: SchedulerState,
    pub index: AgentIndex,
    pub config: Config,
}

impl Scheduler {
    pub fn load(root: &Path) -> Result<Self> {
        let path = crate::paths::scheduler_file(root);
        let state = if store::exists(&path) {
            store::load(&path)?
        } else {
            SchedulerState::default()
        };
        let index = AgentIndex::load(root)?;
        let config = Config::load(root, None)?;
        Ok(Scheduler {
            root: root.to_path_buf(),
            state,
            index,
            config,
        })
    }

    pub fn save(&self) -> Result<()> {
        let path = crate::paths::scheduler_file(&self.root);
        store::save_atomic(&path, &self.state, None, |_: &SchedulerState| String::new())
    }

    fn load_agent(&self, id: &str) -> Result<Agent> {
        crate::agent::load_cached(&crate::paths::agent_file(&self.root, id))
    }

    fn save_agent(&self, agent: &Agent) -> Result<()> {
        let path = crate::paths::agent_file(&self.root, &agent.id);
        store::save_atomic(&path, agent, Some(&agent.id), |a: &Agent| a.id.clone())?;
        crate::agent::invalidate_cached(&path);
        Ok(())
    }

    fn load_active_agents(&self) -> Result<HashMap<String, Agent>> {
        let mut map = HashMap::new();
        for id in self.index.get_all_active() {
            if let Ok(agent) = self.load_agent(&id) {
                map.insert(id, agent);
            }
        }
        Ok(map)
    }

    /// Recompute the priority queue: skip completed/cancelled agents
    /// (already excluded by `get_all_active`), mark newly-blocked agents
    /// Blocked (persisting the transition), unblock previously-blocked
    /// agents whose blockers have cleared, score everything else, and sort
    /// descending.
    pub fn rebuild_queue(&mut self, project_path: Option<&Path>) -> Result<()> {
        if let Some(p) = project_path {
            self.state.project_context = Some(p.display().to_string());
        }
        let project_context = self.state.project_context.clone();

        let mut agents = self.load_active_agents()?;
        let now = chrono::Utc::now();
        let mut queue = Vec::new();

        let ids: Vec<String> = agents.keys().cloned().collect();
        for id in ids {
            let still_blocked = {
                let agent = &agents[&id];
                dependencies::is_blocked(&agents, agent)
            };

            if still_blocked {
                let agent = agents.get_mut(&id).unwrap();
                if agent.state != AgentStatus::Blocked {
                    agent.set_status(AgentStatus::Blocked);
                    self.save_agent(agent)?;
                    self.index.update(&self.root, agent)?;
                }
                continue;
            }

            {
                let agent = agents.get_mut(&id).unwrap();
                if agent.state == AgentStatus::Blocked {
                    agent.set_status(AgentStatus::Paused);
                    self.save_agent(agent)?;
                    self.index.update(&self.root, agent)?;
                }
            }

            let agent = &agents[&id];
            let project_match = match (&agent.task.project, &project_context) {
                (Some(agent_proj), Some(ctx)) => is_project_match(agent_proj, Path::new(ctx)),
                _ => false,
            };
            let score = calculate_priority(
                agent,
                now,
                self.config.priority.recency_halflife_hours,
                &self.config.priority.weights,
                project_match,
            );
            queue.push(QueueItem {
                id: id.clone(),
                score,
            });

            let agent = agents.get_mut(&id).unwrap();
            agent.priority.computed_score = score;
            self.save_agent(agent)?;
        }

        queue.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        self.state.queue = queue;
        self.save()
    }

    pub fn get_queue(&self) -> &[QueueItem] {
        &self.state.queue
    }

    pub fn get_next(&self) -> Option<&str> {
        self.state.queue.first().map(|q| q.id.as_str())
    }

    pub fn get_active(&self) -> Option<&str> {
        self.state.active_agent_id.as_deref()
    }

    /// Pause whichever agent is currently active (accumulating its session
    /// time) and activate `agent_id`, matching `scheduler.py::set_active`.
    pub fn set_active(&mut self, agent_id: &str) -> Result<()> {
        if let Some(old_id) = self.state.active_agent_id.clone() {
            if old_id != agent_id {
                if let Ok(mut old) = self.load_agent(&old_id) {
                    if let Some(session_start) = old.timing.session_start.take() {
                        if let Ok(started) = crate::time::parse_utc(&session_start) {
                            let elapsed = (chrono::Utc::now() - started).num_seconds() as f64;
                            old.timing.total_active_seconds += elapsed.max(0.0);
                        }
                    }
                    old.set_status(AgentStatus::Paused);
                    self.save_agent(&old)?;
                    self.index.update(&self.root, &old)?;
                }
            }
        }

        let mut new_agent = self.load_agent(agent_id)?;
        new_agent.timing.session_start = Some(now_string());
        new_agent.timing.session_count += 1;
        new_agent.set_status(AgentStatus::Active);
        self.save_agent(&new_agent)?;
        self.index.update(&self.root, &new_agent)?;

        self.state.active_agent_id = Some(agent_id.to_string());
        self.state.last_switch = Some(now_string());
        self.state.session.switches += 1;
        self.save()
    }

    pub fn switch_to(&mut self, agent_id: &str, project_path: Option<&Path>) -> Result<()> {
        self.set_active(agent_id)?;
        self.rebuild_queue(project_path)
    }

    /// After rebuilding the queue, return the top candidate's id if it beats
    /// the currently-active agent's score by more than [`PREEMPT_MARGIN`].
    pub fn preempt_check(&mut self, current_agent_id: &str) -> Result<Option<String>> {
        self.rebuild_queue(None)?;
        let current_score = self
            .state
            .queue
            .iter()
            .find(|q| q.id == current_agent_id)
            .map(|q| q.score)
            .unwrap_or(0.0);

        Ok(self.state.queue.first().and_then(|top| {
            if top.id != current_agent_id && top.score - current_score > PREEMPT_MARGIN {
                Some(top.id.clone())
            } else {
                None
            }
        }))
    }
}

type SchedulerCache = Mutex<HashMap<PathBuf, (SystemTime, SchedulerState)>>;
static SCHEDULER_CACHE: OnceLock<SchedulerCache> = OnceLock::new();

fn cache() -> &'static SchedulerCache {
    SCHEDULER_CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Load a [`Scheduler`], reusing the cached state if `scheduler.json`'s
/// mtime hasn't changed since it was last cached. Mirrors
/// `scheduler.py::get_scheduler(force_reload=False)`.
pub fn get_scheduler(root: &Path, force_reload: bool) -> Result<Scheduler> {
    let path = crate::paths::scheduler_file(root);
    let current_mtime = std::fs::metadata(&path).and_then(|m| m.modified()).ok();

    if !force_reload {
        if let Some(mtime) = current_mtime {
            let guard = cache().lock().unwrap();
            if let Some((cached_mtime, state)) = guard.get(root) {
                if *cached_mtime == mtime {
                    let index = AgentIndex::load(root)?;
                    let config = Config::load(root, None)?;
                    return Ok(Scheduler {
                        root: root.to_path_buf(),
                        state: state.clone(),
                        index,
                        config,
                    });
                }
            }
        }
    }

    let scheduler = Scheduler::load(root)?;
    if let Some(mtime) = std::fs::metadata(&path).and_then(|m| m.modified()).ok() {
        cache()
            .lock()
            .unwrap()
            .insert(root.to_path_buf(), (mtime, scheduler.state.clone()));
    }
    Ok(scheduler)
}

pub fn invalidate_scheduler_cache(root: &Path) {
    cache().lock().unwrap().remove(root);
}
