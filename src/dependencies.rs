//! C5 — blocker graph: cycle prevention, cascade unblock, impact queries.
//!
//! The original's standalone `dependencies.py` was not retrievable, so this
//! module is built directly from the spec's DFS/cascade description and the
//! call sites in `original_source/ctm/lib/ctm.py` (`cmd_block`, `cmd_unblock`,
//! `cmd_deps`), rather than line-for-line translation.

use std::collections::{HashMap, HashSet};

use crate::agent::{Agent, AgentStatus};
use crate::error::{CtmError, Result};

/// Add `blocker_id` as a prerequisite of `agent_id`. Rejects the edge if it
/// would create a cycle in the blocker graph (`agent_id` is already
/// reachable from `blocker_id` via existing `blockers` edges).
pub fn add_blocker(
    agents: &HashMap<String, Agent>,
    agent_id: &str,
    blocker_id: &str,
) -> Result<()> {
    if agent_id == blocker_id {
        return Err(CtmError::WouldCycle {
            agent: agent_id.to_string(),
            blocker: blocker_id.to_string(),
        });
    }
    if would_cycle(agents, agent_id, blocker_id) {
        return Err(CtmError::WouldCycle {
            agent: agent_id.to_string(),
            blocker: blocker_id.to_string(),
        });
    }
    Ok(())
}

/// DFS from `blocker_id` following its own `blockers` edges; if we reach
/// `agent_id`, adding `agent_id -> blocker_id` would close a cycle.
fn would_cycle(agents: &HashMap<String, Agent>, agent_id: &str, blocker_id: &str) -> bool {
    let mut visited = HashSet::new();
    let mut stack = vec![blocker_id.to_string()];

    while let Some(current) = stack.pop() {
        if current == agent_id {
            return true;
        }
        if !visited.insert(current.clone()) {
            continue;
        }
        if let Some(agent) = agents.get(&current) {
            for next in &agent.blockers {
                stack.push(next.clone());
            }
        }
    }
    false
}

/// Agents still blocking `agent_id` that have not reached a terminal state.
pub fn active_blockers<'a>(agents: &'a HashMap<String, Agent>, agent: &Agent) -> Vec<&'a Agent> {
    agent
        .blockers
        .iter()
        .filter_map(|id| agents.get(id))
        .filter(|blocker| !blocker.state.is_terminal())
        .collect()
}

pub fn is_blocked(agents: &HashMap<String, Agent>, agent: &Agent) -> bool {
    !active_blockers(agents, agent).is_empty()
}

/// Agents that list `agent_id` as one of their blockers.
pub fn find_dependents<'a>(agents: &'a HashMap<String, Agent>, agent_id: &str) -> Vec<&'a Agent> {
    agents
        .values()
        .filter(|a| a.blockers.iter().any(|b| b == agent_id))
        .collect()
}

/// Agents with at least `min_dependents` direct dependents, sorted by
/// dependent count descending, matching §4.5's `high_impact_blockers(min)`.
pub fn high_impact_blockers<'a>(
    agents: &'a HashMap<String, Agent>,
    min: usize,
) -> Vec<(&'a Agent, usize)> {
    let mut counted: Vec<(&Agent, usize)> = agents
        .values()
        .map(|a| (a, find_dependents(agents, &a.id).len()))
        .filter(|(_, count)| *count >= min)
        .collect();
    counted.sort_by(|a, b| b.1.cmp(&a.1));
    counted
}

/// When `agent` transitions to a terminal state, any agent that listed it
/// as a blocker and has no other active blockers left moves from Blocked
/// back to Paused. Returns the ids that were cascade-unblocked.
pub fn cascade_unblock(agents: &mut HashMap<String, Agent>, completed_or_cancelled_id: &str) -> Vec<String> {
    let dependents: Vec<String> = agents
        .values()
        .filter(|a| a.blockers.iter().any(|b| b == completed_or_cancelled_id))
        .map(|a| a.id.clone())
        .collect();

    let mut unblocked = Vec::new();
    for dep_id in dependents {
        let still_blocked = {
            let dep = &agents[&dep_id];
            dep.blockers.iter().any(|b| {
                b != completed_or_cancelled_id
                    && agents.get(b).map(|a| !a.state.is_terminal()).unwrap_or(false)
            })
        };
        if !still_blocked {
            if let Some(dep) = agents.get_mut(&dep_id) {
                dep.blockers.retain(|b| b != completed_or_cancelled_id);
                if dep.state == AgentStatus::Blocked {
                    dep.set_status(AgentStatus::Paused);
                    unblocked.push(dep_id);
                }
            }
        }
    }
    unblocked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentPriority;

    fn agent(id: &str) -> Agent {
        let mut a = Agent::create("t", "g", None, AgentPriority::Normal);
        a.id = id.to_string();
        a
    }

    #[test]
    fn direct_self_block_rejected() {
        let agents = HashMap::new();
        assert!(add_blocker(&agents, "a", "a").is_err());
    }

    #[test]
    fn simple_cycle_rejected() {
        let mut agents = HashMap::new();
        let mut b = agent("b");
        b.blockers.push("a".to_string());
        agents.insert("b".to_string(), b);
        agents.insert("a".to_string(), agent("a"));

        // a is blocked by b, b is blocked by a -> adding a->b would cycle
        assert!(add_blocker(&agents, "a", "b").is_err());
    }

    #[test]
    fn non_cyclic_edge_accepted() {
        let mut agents = HashMap::new();
        agents.insert("a".to_string(), agent("a"));
        agents.insert("b".to_string(), agent("b"));
        assert!(add_blocker(&agents, "a", "b").is_ok());
    }

    #[test]
    fn is_blocked_true_while_blocker_active() {
        let mut agents = HashMap::new();
        let blocker = agent("b");
        agents.insert("b".to_string(), blocker);
        let mut a = agent("a");
        a.blockers.push("b".to_string());
        assert!(is_blocked(&agents, &a));

        agents.get_mut("b").unwrap().set_status(AgentStatus::Completed);
        assert!(!is_blocked(&agents, &a));
    }

    #[test]
    fn cascade_unblock_moves_blocked_to_paused_when_last_blocker_completes() {
        let mut agents = HashMap::new();
        let mut blocker = agent("b");
        blocker.set_status(AgentStatus::Completed);
        agents.insert("b".to_string(), blocker);

        let mut dependent = agent("a");
        dependent.blockers.push("b".to_string());
        dependent.set_status(AgentStatus::Blocked);
        agents.insert("a".to_string(), dependent);

        let unblocked = cascade_unblock(&mut agents, "b");
        assert_eq!(unblocked, vec!["a".to_string()]);
        assert_eq!(agents["a"].state, AgentStatus::Paused);
        assert!(!agents["a"].blockers.contains(&"b".to_string()));
    }

    #[test]
    fn cascade_unblock_keeps_agent_blocked_if_other_blocker_still_active() {
        let mut agents = HashMap::new();
        let mut b1 = agent("b1");
        b1.set_status(AgentStatus::Completed);
        agents.insert("b1".to_string(), b1);
        agents.insert("b2".to_string(), agent("b2"));

        let mut dependent = agent("a");
        dependent.blockers.push("b1".to_string());
        dependent.blockers.push("b2".to_string());
        dependent.set_status(AgentStatus::Blocked);
        agents.insert("a".to_string(), dependent);

        let unblocked = cascade_unblock(&mut agents, "b1");
        assert!(unblocked.is_empty());
        assert_eq!(agents["a"].state, AgentStatus::Blocked);
    }

    #[test]
    fn high_impact_blockers_sorted_descending() {
        let mut agents = HashMap::new();
        agents.insert("root".to_string(), agent("root"));
        for i in 0..3 {
            let mut dep = agent(&format!("dep{i}"));
            dep.blockers.push("root".to_string());
            agents.insert(dep.id.clone(), dep);
        }
        agents.insert("lonely".to_string(), agent("lonely"));

        let impactful = high_impact_blockers(&agents, 1);
        assert_eq!(impactful[0].0.id, "root");
        assert_eq!(impactful[0].1, 3);
    }
}
