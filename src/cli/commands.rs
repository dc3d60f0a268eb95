//! Command handlers: thin glue between parsed CLI args and the core
//! modules. Formatting concerns (dependency tree rendering, table layout)
//! live here, never in the engine.

use std::path::Path;

use crate::agent::{Agent, AgentPriority, AgentStatus, Source};
use crate::dependencies;
use crate::error::{CtmError, Result};
use crate::index::AgentIndex;
use crate::memory::tiers::TieredMemoryManager;
use crate::memory::working_memory::WorkingMemoryPool;
use crate::scheduler::{self, Scheduler};
use crate::store;

/// Resolve a full id or unambiguous prefix to a full agent id, matching
/// `ctm.py::resolve_agent_id`: exact match wins outright; otherwise a
/// unique prefix match; zero or multiple matches are errors.
pub fn resolve_agent_id(index: &AgentIndex, needle: &str) -> Result<String> {
    if index.get_info(needle).is_some() {
        return Ok(needle.to_string());
    }
    let candidates: Vec<&String> = index
        .agents
        .keys()
        .filter(|id| id.starts_with(needle))
        .collect();
    match candidates.len() {
        0 => Err(CtmError::NotFound(needle.to_string())),
        1 => Ok(candidates[0].clone()),
        n => Err(CtmError::Ambiguous {
            prefix: needle.to_string(),
            count: n,
            candidates: candidates
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

/// Parse a `spawn --priority` level name. Unrecognized input falls back to
/// `Normal`, matching the original CLI's lenient argparse `choices` default.
fn parse_priority(s: &str) -> AgentPriority {
    match s.to_lowercase().as_str() {
        "background" => AgentPriority::Background,
        "low" => AgentPriority::Low,
        "high" => AgentPriority::High,
        "critical" => AgentPriority::Critical,
        _ => AgentPriority::Normal,
    }
}

pub fn status(root: &Path) -> Result<String> {
    let scheduler = Scheduler::load(root)?;
    let active = scheduler.get_active();
    let next = scheduler.get_next();
    Ok(match (active, next) {
        (Some(a), _) => format!("active: {a}"),
        (None, Some(n)) => format!("no active agent; next in queue: {n}"),
        (None, None) => "no active agent; queue is empty".to_string(),
    })
}

pub fn list(
    root: &Path,
    all: bool,
    status_filter: Option<&str>,
    project_filter: Option<&str>,
) -> Result<String> {
    let index = AgentIndex::load(root)?;
    let ids: Vec<String> = match (all, status_filter, project_filter) {
        (false, Some(s), _) => {
            let status = parse_status(s)?;
            index.get_by_status(status).to_vec()
        }
        (false, None, Some(p)) => index.get_by_project(p).to_vec(),
        _ => index.agents.keys().cloned().collect(),
    };

    if ids.is_empty() {
        return Ok("no agents match".to_string());
    }
    let mut lines = Vec::new();
    for id in ids {
        if let Some(entry) = index.get_info(&id) {
            lines.push(format!("{} [{}] {}", entry.id, entry.status.as_str(), entry.title));
        }
    }
    Ok(lines.join("\n"))
}

fn parse_status(s: &str) -> Result<AgentStatus> {
    match s.to_lowercase().as_str() {
        "active" => Ok(AgentStatus::Active),
        "paused" => Ok(AgentStatus::Paused),
        "blocked" => Ok(AgentStatus::Blocked),
        "completed" => Ok(AgentStatus::Completed),
        "cancelled" => Ok(AgentStatus::Cancelled),
        other => Err(CtmError::NotFound(format!("unknown status '{other}'"))),
    }
}

pub fn show(root: &Path, needle: &str) -> Result<String> {
    let index = AgentIndex::load(root)?;
    let id = resolve_agent_id(&index, needle)?;
    let agent: Agent = store::load(&crate::paths::agent_file(root, &id))?;
    Ok(format!(
        "{}\ntitle: {}\ngoal: {}\nstatus: {}\nprogress: {:.0}%\nproject: {}\nblockers: {}\ndeadline: {}",
        agent.id,
        agent.task.title,
        agent.task.goal,
        agent.state.as_str(),
        agent.progress,
        agent.task.project.as_deref().unwrap_or("-"),
        if agent.blockers.is_empty() { "none".to_string() } else { agent.blockers.join(", ") },
        agent.timing.deadline.as_deref().unwrap_or("none"),
    ))
}

pub fn spawn(
    root: &Path,
    title: &str,
    goal: &str,
    project: Option<String>,
    priority: &str,
    tags: Vec<String>,
    blocked_by: Vec<String>,
    triggers: Vec<String>,
    source: Option<String>,
) -> Result<String> {
    let mut agent = Agent::create(title, goal, project, parse_priority(priority));
    agent.task.tags = tags;
    agent.blockers = blocked_by;
    agent.triggers = triggers;
    if let Some(s) = source {
        let (kind, reference) = match s.split_once(':') {
            Some((k, r)) => (k.to_string(), Some(r.to_string())),
            None => (s, None),
        };
        agent.source = Source { kind, reference };
    }

    store::save_atomic(
        &crate::paths::agent_file(root, &agent.id),
        &agent,
        Some(&agent.id),
        |a: &Agent| a.id.clone(),
    )?;
    let mut index = AgentIndex::load(root)?;
    index.add(root, &agent)?;

    Ok(agent.id)
}

fn load_agent(root: &Path, id: &str) -> Result<Agent> {
    crate::agent::load_cached(&crate::paths::agent_file(root, id))
}

fn save_agent_and_index(root: &Path, agent: &Agent) -> Result<()> {
    let path = crate::paths::agent_file(root, &agent.id);
    store::save_atomic(&path, agent, Some(&agent.id), |a: &Agent| a.id.clone())?;
    crate::agent::invalidate_cached(&path);
    let mut index = AgentIndex::load(root)?;
    index.update(root, agent)
}

pub fn switch(root: &Path, needle: &str) -> Result<String> {
    let index = AgentIndex::load(root)?;
    let id = resolve_agent_id(&index, needle)?;
    let mut scheduler = scheduler::get_scheduler(root, true)?;
    scheduler.switch_to(&id, None)?;
    scheduler::invalidate_scheduler_cache(root);
    Ok(format!("switched to {id}"))
}

/// Resolve an optional id/prefix argument to a concrete agent id, falling
/// back to the scheduler's active agent when `needle` is `None`, matching
/// `ctm.py::cmd_pause`/`cmd_complete`'s `agent_id = args.id or scheduler.get_active()`.
fn resolve_or_active(root: &Path, index: &AgentIndex, needle: Option<&str>) -> Result<String> {
    match needle {
        Some(n) => resolve_agent_id(index, n),
        None => {
            let scheduler = Scheduler::load(root)?;
            scheduler
                .get_active()
                .map(|s| s.to_string())
                .ok_or_else(|| CtmError::NotFound("no active agent".to_string()))
        }
    }
}

pub fn pause(root: &Path, needle: Option<&str>) -> Result<String> {
    let index = AgentIndex::load(root)?;
    let id = resolve_or_active(root, &index, needle)?;
    let mut agent = load_agent(root, &id)?;
    if let Some(session_start) = agent.timing.session_start.take() {
        if let Ok(started) = crate::time::parse_utc(&session_start) {
            let elapsed = (chrono::Utc::now() - started).num_seconds() as f64;
            agent.timing.total_active_seconds += elapsed.max(0.0);
        }
    }
    agent.set_status(AgentStatus::Paused);
    save_agent_and_index(root, &agent)?;

    let mut scheduler = Scheduler::load(root)?;
    if scheduler.get_active() == Some(id.as_str()) {
        scheduler.state.active_agent_id = None;
        scheduler.save()?;
    }
    scheduler::invalidate_scheduler_cache(root);
    Ok(format!("paused {id}"))
}

pub fn resume(root: &Path, needle: &str) -> Result<String> {
    switch(root, needle).map(|_| format!("resumed {needle}"))
}

fn terminate(root: &Path, id: &str, to: AgentStatus) -> Result<String> {
    let index = AgentIndex::load(root)?;
    let mut agent = load_agent(root, id)?;
    agent.set_status(to);
    save_agent_and_index(root, &agent)?;

    let mut agents = std::collections::HashMap::new();
    for other_id in index.agents.keys() {
        if let Ok(a) = load_agent(root, other_id) {
            agents.insert(other_id.clone(), a);
        }
    }
    agents.insert(agent.id.clone(), agent.clone());
    let unblocked = dependencies::cascade_unblock(&mut agents, id);
    for u in &unblocked {
        save_agent_and_index(root, &agents[u])?;
    }

    let mut scheduler = Scheduler::load(root)?;
    if scheduler.get_active() == Some(id) {
        scheduler.state.active_agent_id = None;
        scheduler.save()?;
    }
    scheduler::invalidate_scheduler_cache(root);

    Ok(format!(
        "{id} -> {} (unblocked: {})",
        to.as_str(),
        if unblocked.is_empty() { "none".to_string() } else { unblocked.join(", ") }
    ))
}

/// `force` currently has nothing to override — this crate has no
/// completion-readiness gate to bypass — but the flag is accepted so the
/// CLI surface matches the contractual form.
pub fn complete(root: &Path, needle: Option<&str>, _force: bool) -> Result<String> {
    let index = AgentIndex::load(root)?;
    let id = resolve_or_active(root, &index, needle)?;
    terminate(root, &id, AgentStatus::Completed)
}

pub fn cancel(root: &Path, needle: &str) -> Result<String> {
    let index = AgentIndex::load(root)?;
    let id = resolve_agent_id(&index, needle)?;
    terminate(root, &id, AgentStatus::Cancelled)
}

/// Nudge an agent's `user_signal` by `±0.25` (clamped to `[-1, 1]`) and
/// rebuild the queue, matching `ctm.py::cmd_priority` — this is a relative
/// adjustment of user-expressed priority, never a level-setter.
pub fn priority(root: &Path, needle: &str, direction: &str) -> Result<String> {
    let delta = match direction {
        "+" => 0.25,
        "-" => -0.25,
        other => {
            return Err(CtmError::InvalidArgument(format!(
                "priority direction must be '+' or '-', got '{other}'"
            )))
        }
    };

    let index = AgentIndex::load(root)?;
    let id = resolve_agent_id(&index, needle)?;
    let mut agent = load_agent(root, &id)?;
    agent.priority.user_signal = (agent.priority.user_signal + delta).clamp(-1.0, 1.0);
    agent.update_activity();
    save_agent_and_index(root, &agent)?;

    let mut scheduler = Scheduler::load(root)?;
    scheduler.rebuild_queue(None)?;

    Ok(format!("{id} user_signal now {:.2}", agent.priority.user_signal))
}

pub fn deadline(root: &Path, needle: &str, when: Option<&str>) -> Result<String> {
    let index = AgentIndex::load(root)?;
    let id = resolve_agent_id(&index, needle)?;
    let mut agent = load_agent(root, &id)?;

    match when {
        None => Ok(format!(
            "{id} deadline: {}",
            agent.timing.deadline.as_deref().unwrap_or("none")
        )),
        Some(s) if s.eq_ignore_ascii_case("clear") => {
            agent.timing.deadline = None;
            agent.update_activity();
            save_agent_and_index(root, &agent)?;
            Ok(format!("{id} deadline cleared"))
        }
        Some(s) => {
            let parsed = crate::time::parse_deadline(s, chrono::Utc::now())?;
            agent.timing.deadline = Some(crate::time::format_utc(parsed));
            agent.update_activity();
            save_agent_and_index(root, &agent)?;
            let mut scheduler = Scheduler::load(root)?;
            scheduler.rebuild_queue(None)?;
            Ok(format!("{id} deadline set to {}", crate::time::format_utc(parsed)))
        }
    }
}

pub fn block(root: &Path, needle: &str, blocker_needle: &str) -> Result<String> {
    let index = AgentIndex::load(root)?;
    let id = resolve_agent_id(&index, needle)?;
    let blocker_id = resolve_agent_id(&index, blocker_needle)?;

    let mut agents = std::collections::HashMap::new();
    for aid in index.agents.keys() {
        if let Ok(a) = load_agent(root, aid) {
            agents.insert(aid.clone(), a);
        }
    }
    dependencies::add_blocker(&agents, &id, &blocker_id)?;

    let agent = agents.get_mut(&id).ok_or_else(|| CtmError::NotFound(id.clone()))?;
    agent.blockers.push(blocker_id.clone());
    agent.set_status(AgentStatus::Blocked);
    save_agent_and_index(root, agent)?;
    Ok(format!("{id} now blocked by {blocker_id}"))
}

pub fn unblock(root: &Path, needle: &str, from: Option<&str>) -> Result<String> {
    let index = AgentIndex::load(root)?;
    let id = resolve_agent_id(&index, needle)?;
    let mut agent = load_agent(root, &id)?;

    match from {
        Some(f) => {
            let blocker_id = resolve_agent_id(&index, f)?;
            agent.blockers.retain(|b| b != &blocker_id);
        }
        None => agent.blockers.clear(),
    }

    let mut agents = std::collections::HashMap::new();
    for aid in index.agents.keys() {
        if let Ok(a) = load_agent(root, aid) {
            agents.insert(aid.clone(), a);
        }
    }
    agents.insert(agent.id.clone(), agent.clone());
    if !dependencies::is_blocked(&agents, &agent) && agent.state == AgentStatus::Blocked {
        agent.set_status(AgentStatus::Paused);
    }
    save_agent_and_index(root, &agent)?;
    Ok(format!("{id} blockers now: {}", if agent.blockers.is_empty() { "none".to_string() } else { agent.blockers.join(", ") }))
}

fn load_all_known_agents(root: &Path, index: &AgentIndex) -> std::collections::HashMap<String, Agent> {
    let mut agents = std::collections::HashMap::new();
    for aid in index.agents.keys() {
        if let Ok(a) = load_agent(root, aid) {
            agents.insert(aid.clone(), a);
        }
    }
    agents
}

fn deps_for_one(root: &Path, index: &AgentIndex, needle: &str) -> Result<String> {
    let id = resolve_agent_id(index, needle)?;
    let agents = load_all_known_agents(root, index);
    let agent = agents.get(&id).ok_or_else(|| CtmError::NotFound(id.clone()))?;
    let blockers: Vec<String> = agent.blockers.clone();
    let dependents: Vec<String> = dependencies::find_dependents(&agents, &id)
        .iter()
        .map(|a| a.id.clone())
        .collect();
    Ok(format!(
        "{id}\nblocked by: {}\nblocking: {}",
        if blockers.is_empty() { "none".to_string() } else { blockers.join(", ") },
        if dependents.is_empty() { "none".to_string() } else { dependents.join(", ") },
    ))
}

/// High-impact blockers (2+ dependents) and the current blocked-tasks list
/// across every known agent, matching `ctm.py::cmd_deps`'s `--all` branch.
fn deps_for_all(root: &Path, index: &AgentIndex) -> Result<String> {
    let agents = load_all_known_agents(root, index);
    let impactful = dependencies::high_impact_blockers(&agents, 2);
    let mut lines = vec!["high-impact blockers (2+ dependents):".to_string()];
    if impactful.is_empty() {
        lines.push("  none".to_string());
    } else {
        for (agent, count) in &impactful {
            lines.push(format!("  {} [{}] blocks {count} agent(s)", agent.id, agent.task.title));
        }
    }

    lines.push("blocked agents:".to_string());
    let blocked: Vec<&Agent> = agents.values().filter(|a| a.state == AgentStatus::Blocked).collect();
    if blocked.is_empty() {
        lines.push("  none".to_string());
    } else {
        for agent in blocked {
            lines.push(format!("  {} [{}] by {}", agent.id, agent.task.title, agent.blockers.join(", ")));
        }
    }

    Ok(lines.join("\n"))
}

pub fn deps(root: &Path, needle: Option<&str>, all: bool) -> Result<String> {
    let index = AgentIndex::load(root)?;
    if all {
        deps_for_all(root, &index)
    } else {
        let needle = needle.ok_or_else(|| {
            CtmError::InvalidArgument("deps requires an agent id, or --all".to_string())
        })?;
        deps_for_one(root, &index, needle)
    }
}

pub fn queue(root: &Path) -> Result<String> {
    let mut scheduler = Scheduler::load(root)?;
    let project_context = scheduler::detect_project_context(&std::env::current_dir().unwrap_or_default());
    scheduler.rebuild_queue(project_context.as_deref())?;
    if scheduler.get_queue().is_empty() {
        return Ok("queue is empty".to_string());
    }
    Ok(scheduler
        .get_queue()
        .iter()
        .map(|item| format!("{:.3}  {}", item.score, item.id))
        .collect::<Vec<_>>()
        .join("\n"))
}

pub fn checkpoint(root: &Path, id: Option<&str>, keep: usize) -> Result<String> {
    let index = AgentIndex::load(root)?;
    let agent_ids = match id {
        Some(needle) => vec![resolve_agent_id(&index, needle)?],
        None => index.get_all_active(),
    };
    let dir = crate::checkpoint::create_checkpoint(root, &agent_ids, keep)?;
    Ok(format!("checkpoint created: {}", dir.display()))
}

/// List every agent with a deadline set, soonest first, matching
/// `ctm.py::cmd_deadline`'s standalone `deadlines` list-mode.
pub fn deadlines(root: &Path) -> Result<String> {
    let index = AgentIndex::load(root)?;
    let mut with_deadline: Vec<Agent> = index
        .agents
        .keys()
        .filter_map(|id| load_agent(root, id).ok())
        .filter(|a| a.timing.deadline.is_some())
        .collect();
    with_deadline.sort_by(|a, b| a.timing.deadline.cmp(&b.timing.deadline));

    if with_deadline.is_empty() {
        return Ok("no agents have a deadline set".to_string());
    }
    Ok(with_deadline
        .iter()
        .map(|a| format!("{}  {}  {}", a.timing.deadline.as_deref().unwrap_or(""), a.id, a.task.title))
        .collect::<Vec<_>>()
        .join("\n"))
}

pub fn restore(root: &Path, name: Option<&str>) -> Result<String> {
    let dir = crate::checkpoint::restore_checkpoint(root, name)?;
    scheduler::invalidate_scheduler_cache(root);
    Ok(format!("restored from {}", dir.display()))
}

pub fn consolidate(root: &Path) -> Result<String> {
    let mut mgr = TieredMemoryManager::load(root)?;
    let actions = mgr.check_and_manage_pressure()?;
    mgr.save()?;
    if actions.is_empty() {
        Ok("no pressure relief needed".to_string())
    } else {
        Ok(actions.join("\n"))
    }
}

pub fn memory(root: &Path) -> Result<String> {
    let mgr = TieredMemoryManager::load(root)?;
    let pool = WorkingMemoryPool::load(root)?;
    Ok(format!(
        "L1 active: {} agents ({} tokens)\nL2 working: {} agents ({} tokens)\nL3 episodic: {} entries\nL4 semantic: {} indexed\nworking-memory pool: {} hot ({} tokens), pressured={}",
        mgr.state.l1_active.slots.len(),
        mgr.state.l1_active.token_usage,
        mgr.state.l2_working.slots.len(),
        mgr.state.l2_working.token_usage,
        mgr.state.l3_episodic.len(),
        mgr.state.l4_semantic.indexed.len(),
        pool.state.hot_agents.len(),
        pool.state.token_usage,
        pool.is_pressured(),
    ))
}

pub fn repair(root: &Path) -> Result<String> {
    let report = crate::checkpoint::repair(root)?;
    scheduler::invalidate_scheduler_cache(root);
    Ok(format!(
        "rebuilt index with {} agents; backed up to {}; quarantined {} file(s)",
        report.rebuilt_agent_count,
        report.backup_dir.display(),
        report.quarantined.len(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn root() -> TempDir {
        let tmp = TempDir::new().unwrap();
        crate::paths::ensure_layout(tmp.path()).unwrap();
        tmp
    }

    fn quick_spawn(root: &Path, title: &str, priority: &str, blocked_by: Vec<String>) -> String {
        spawn(root, title, "g", None, priority, vec![], blocked_by, vec![], None).unwrap()
    }

    #[test]
    fn spawn_then_show_roundtrips() {
        let tmp = root();
        let id = spawn(
            tmp.path(), "Title", "Goal", None, "high", vec![], vec![], vec![], None,
        )
        .unwrap();
        let out = show(tmp.path(), &id).unwrap();
        assert!(out.contains("Title"));
        assert!(out.contains("Goal"));
    }

    #[test]
    fn spawn_parses_source_kind_and_reference() {
        let tmp = root();
        let id = spawn(
            tmp.path(), "t", "g", None, "normal", vec![], vec![], vec![], Some("agent:abcd1234".to_string()),
        )
        .unwrap();
        let agent = load_agent(tmp.path(), &id).unwrap();
        assert_eq!(agent.source.kind, "agent");
        assert_eq!(agent.source.reference.as_deref(), Some("abcd1234"));
    }

    #[test]
    fn resolve_agent_id_prefix_match() {
        let tmp = root();
        let id = quick_spawn(tmp.path(), "t", "normal", vec![]);
        let index = AgentIndex::load(tmp.path()).unwrap();
        let resolved = resolve_agent_id(&index, &id[..4]).unwrap();
        assert_eq!(resolved, id);
    }

    #[test]
    fn resolve_agent_id_not_found() {
        let tmp = root();
        let index = AgentIndex::load(tmp.path()).unwrap();
        assert!(resolve_agent_id(&index, "zzzzzzzz").is_err());
    }

    #[test]
    fn switch_then_status_reports_active() {
        let tmp = root();
        let id = quick_spawn(tmp.path(), "t", "normal", vec![]);
        switch(tmp.path(), &id).unwrap();
        let out = status(tmp.path()).unwrap();
        assert!(out.contains(&id));
    }

    #[test]
    fn complete_cascades_unblock() {
        let tmp = root();
        let blocker = quick_spawn(tmp.path(), "blocker", "normal", vec![]);
        let blocked = quick_spawn(tmp.path(), "blocked", "normal", vec![blocker.clone()]);

        let mut agent = load_agent(tmp.path(), &blocked).unwrap();
        agent.set_status(AgentStatus::Blocked);
        save_agent_and_index(tmp.path(), &agent).unwrap();

        let out = complete(tmp.path(), Some(blocker.as_str()), false).unwrap();
        assert!(out.contains("unblocked"));
        let reloaded = load_agent(tmp.path(), &blocked).unwrap();
        assert_eq!(reloaded.state, AgentStatus::Paused);
        assert!(!reloaded.blockers.contains(&blocker));
        assert_eq!(reloaded.progress, 0.0);

        let completed_blocker = load_agent(tmp.path(), &blocker).unwrap();
        assert_eq!(completed_blocker.progress, 100.0);
    }

    #[test]
    fn complete_with_no_id_targets_active_agent() {
        let tmp = root();
        let id = quick_spawn(tmp.path(), "t", "normal", vec![]);
        switch(tmp.path(), &id).unwrap();
        let out = complete(tmp.path(), None, false).unwrap();
        assert!(out.contains(&id));
        let reloaded = load_agent(tmp.path(), &id).unwrap();
        assert_eq!(reloaded.state, AgentStatus::Completed);
    }

    #[test]
    fn pause_with_no_id_targets_active_agent() {
        let tmp = root();
        let id = quick_spawn(tmp.path(), "t", "normal", vec![]);
        switch(tmp.path(), &id).unwrap();
        let out = pause(tmp.path(), None).unwrap();
        assert!(out.contains(&id));
        let reloaded = load_agent(tmp.path(), &id).unwrap();
        assert_eq!(reloaded.state, AgentStatus::Paused);
    }

    #[test]
    fn block_rejects_cycle() {
        let tmp = root();
        let a = quick_spawn(tmp.path(), "a", "normal", vec![]);
        let b = quick_spawn(tmp.path(), "b", "normal", vec![]);
        block(tmp.path(), &a, &b).unwrap();
        assert!(block(tmp.path(), &b, &a).is_err());
    }

    #[test]
    fn deadline_set_then_show() {
        let tmp = root();
        let id = quick_spawn(tmp.path(), "t", "normal", vec![]);
        deadline(tmp.path(), &id, Some("+1d")).unwrap();
        let out = deadline(tmp.path(), &id, None).unwrap();
        assert!(out.contains(&id));
        assert!(!out.contains("none"));
    }

    #[test]
    fn deadlines_lists_only_agents_with_a_deadline_sorted() {
        let tmp = root();
        let no_deadline = quick_spawn(tmp.path(), "none", "normal", vec![]);
        let far = quick_spawn(tmp.path(), "far", "normal", vec![]);
        let soon = quick_spawn(tmp.path(), "soon", "normal", vec![]);
        deadline(tmp.path(), &far, Some("+10d")).unwrap();
        deadline(tmp.path(), &soon, Some("+1d")).unwrap();

        let out = deadlines(tmp.path()).unwrap();
        assert!(!out.contains(&no_deadline));
        let soon_pos = out.find(&soon).unwrap();
        let far_pos = out.find(&far).unwrap();
        assert!(soon_pos < far_pos);
    }

    #[test]
    fn priority_plus_nudges_user_signal_up_and_minus_down() {
        let tmp = root();
        let id = quick_spawn(tmp.path(), "t", "normal", vec![]);
        priority(tmp.path(), &id, "+").unwrap();
        let after_plus = load_agent(tmp.path(), &id).unwrap();
        assert!((after_plus.priority.user_signal - 0.25).abs() < 1e-9);

        priority(tmp.path(), &id, "-").unwrap();
        priority(tmp.path(), &id, "-").unwrap();
        let after_minus = load_agent(tmp.path(), &id).unwrap();
        assert!((after_minus.priority.user_signal - (-0.25)).abs() < 1e-9);
    }

    #[test]
    fn priority_rejects_non_direction_argument() {
        let tmp = root();
        let id = quick_spawn(tmp.path(), "t", "normal", vec![]);
        assert!(priority(tmp.path(), &id, "high").is_err());
    }

    #[test]
    fn deps_all_lists_high_impact_blockers_and_blocked_agents() {
        let tmp = root();
        let root_blocker = quick_spawn(tmp.path(), "root", "normal", vec![]);
        quick_spawn(tmp.path(), "dep0", "normal", vec![root_blocker.clone()]);
        quick_spawn(tmp.path(), "dep1", "normal", vec![root_blocker.clone()]);

        let out = deps(tmp.path(), None, true).unwrap();
        assert!(out.contains(&root_blocker));
        assert!(out.contains("high-impact blockers"));
    }

    #[test]
    fn deps_without_id_or_all_is_an_error() {
        let tmp = root();
        assert!(deps(tmp.path(), None, false).is_err());
    }

    #[test]
    fn checkpoint_with_id_checkpoints_only_that_agent() {
        let tmp = root();
        let id = quick_spawn(tmp.path(), "t", "normal", vec![]);
        let out = checkpoint(tmp.path(), Some(id.as_str()), 10).unwrap();
        assert!(out.contains("checkpoint created"));
    }
}
