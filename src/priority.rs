//! C4 — weighted multi-factor priority scoring.
//!
//! Grounded on `original_source/ctm/lib/scheduler.py::calculate_priority`:
//! exponential recency/novelty decay, deadline-tiered urgency, an error
//! boost, and a flat project-context boost, combined via configured weights
//! and clamped to `[0, 1]`.

use chrono::{DateTime, Utc};

use crate::agent::Agent;
use crate::config::{PriorityWeights, PROJECT_CONTEXT_BOOST};

/// Score a single agent. `recency_halflife_hours` and `weights` come from
/// config; `project_match` is true when the agent's project matches the
/// caller's current project context (§4.4).
pub fn calculate_priority(
    agent: &Agent,
    now: DateTime<Utc>,
    recency_halflife_hours: f64,
    weights: &PriorityWeights,
    project_match: bool,
) -> f64 {
    let hours_since_activity = agent.hours_since_activity(now).max(0.0);
    let recency = 2f64.powf(-hours_since_activity / recency_halflife_hours);

    let days_since_created = agent.days_since_created(now).max(0.0);
    let novelty = (2f64.powf(-days_since_created / 7.0)).max(0.1);

    let error_boost = if agent.context.last_error.is_some() {
        0.3
    } else {
        0.0
    };

    let urgency = deadline_urgency(agent, now);

    let user_signal_normalized = (agent.priority.user_signal + 1.0) / 2.0;

    let value = agent.priority.value;

    let mut score = weights.urgency * urgency
        + weights.recency * recency
        + weights.value * value
        + weights.novelty * novelty
        + weights.user_signal * user_signal_normalized
        + weights.error_boost * error_boost;

    if project_match {
        score += PROJECT_CONTEXT_BOOST;
    }

    score.clamp(0.0, 1.0)
}

/// Deadline-tiered urgency: overdue is maximal, then a step function of
/// days remaining, with a decaying floor beyond two weeks out. Mirrors the
/// tier boundaries in `scheduler.py::calculate_priority` exactly.
fn deadline_urgency(agent: &Agent, now: DateTime<Utc>) -> f64 {
    let deadline = match &agent.timing.deadline {
        Some(d) => d,
        None => return agent.priority.urgency,
    };
    let deadline_ts = match crate::time::parse_utc(deadline) {
        Ok(ts) => ts,
        Err(_) => return agent.priority.urgency,
    };

    let hours_until = (deadline_ts - now).num_seconds() as f64 / 3600.0;
    if hours_until <= 0.0 {
        return 1.0;
    }
    let days_until = hours_until / 24.0;

    if days_until <= 1.0 {
        0.95
    } else if days_until <= 3.0 {
        0.85
    } else if days_until <= 7.0 {
        0.70
    } else if days_until <= 14.0 {
        0.55
    } else {
        (0.5 * (30.0 / days_until.max(30.0))).max(0.3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentPriority;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn fresh_agent() -> Agent {
        let mut a = Agent::create("t", "g", None, AgentPriority::Normal);
        a.timing.created_at = crate::time::format_utc(now());
        a.timing.last_activity = crate::time::format_utc(now());
        a
    }

    #[test]
    fn score_is_always_within_0_1() {
        let agent = fresh_agent();
        let weights = PriorityWeights::default();
        let score = calculate_priority(&agent, now(), 24.0, &weights, false);
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn overdue_deadline_maximizes_urgency() {
        let mut agent = fresh_agent();
        agent.timing.deadline = Some(crate::time::format_utc(now() - chrono::Duration::hours(1)));
        assert_eq!(deadline_urgency(&agent, now()), 1.0);
    }

    #[test]
    fn no_deadline_falls_back_to_stored_urgency_field() {
        let mut agent = fresh_agent();
        assert_eq!(deadline_urgency(&agent, now()), 0.5);
        agent.priority.urgency = 0.8;
        assert_eq!(deadline_urgency(&agent, now()), 0.8);
    }

    #[test]
    fn project_match_adds_flat_boost() {
        let agent = fresh_agent();
        let weights = PriorityWeights::default();
        let unmatched = calculate_priority(&agent, now(), 24.0, &weights, false);
        let matched = calculate_priority(&agent, now(), 24.0, &weights, true);
        assert!(matched >= unmatched);
    }

    #[test]
    fn error_present_increases_score() {
        let mut agent = fresh_agent();
        let weights = PriorityWeights::default();
        let baseline = calculate_priority(&agent, now(), 24.0, &weights, false);
        agent.context.last_error = Some("boom".to_string());
        let with_error = calculate_priority(&agent, now(), 24.0, &weights, false);
        assert!(with_error >= baseline);
    }

    #[test]
    fn deadline_tiers_are_monotonic_in_time_remaining() {
        let mut agent = fresh_agent();
        agent.timing.deadline = Some(crate::time::format_utc(now() + chrono::Duration::hours(12)));
        let within_day = deadline_urgency(&agent, now());

        agent.timing.deadline = Some(crate::time::format_utc(now() + chrono::Duration::days(2)));
        let within_3_days = deadline_urgency(&agent, now());

        agent.timing.deadline = Some(crate::time::format_utc(now() + chrono::Duration::days(20)));
        let far_out = deadline_urgency(&agent, now());

        assert!(within_day > within_3_days);
        assert!(within_3_days > far_out);
    }
}
