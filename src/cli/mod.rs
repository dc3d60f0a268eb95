//! CLI surface: one subcommand per the external-interfaces section of the
//! spec, translated from `original_source/ctm/lib/ctm.py::main`'s argparse
//! subcommand list into a `clap` derive `Parser`.

pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ctm", about = "Cognitive Task Manager")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the active agent and top of the queue.
    Status,
    /// List agents, optionally filtered by status or project.
    List {
        #[arg(long)]
        all: bool,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        project: Option<String>,
    },
    /// Show full detail for one agent (accepts an id prefix).
    Show { id: String },
    /// Create a new agent.
    Spawn {
        #[arg(long)]
        goal: String,
        title: String,
        #[arg(long)]
        project: Option<String>,
        #[arg(long, default_value = "normal")]
        priority: String,
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
        #[arg(long = "blocked-by", value_delimiter = ',')]
        blocked_by: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        triggers: Vec<String>,
        /// `kind:reference`, e.g. `user:cli` or `agent:abcd1234`.
        #[arg(long)]
        source: Option<String>,
    },
    /// Make an agent active, pausing whichever one was active before.
    Switch { id: String },
    /// Pause an agent (the active one if omitted).
    Pause { id: Option<String> },
    /// Resume a paused agent (alias for switch).
    Resume { id: String },
    /// Mark an agent completed, cascading any unblocks (the active one if
    /// `id` is omitted).
    Complete {
        id: Option<String>,
        #[arg(long, short)]
        force: bool,
    },
    /// Cancel an agent, cascading any unblocks.
    Cancel { id: String },
    /// Nudge an agent's user-priority signal up or down.
    Priority { id: String, direction: String },
    /// Show, set, or clear an agent's deadline.
    Deadline {
        id: String,
        when: Option<String>,
    },
    /// List every agent with a deadline set, soonest first.
    Deadlines,
    /// Add a blocker to an agent.
    Block {
        id: String,
        #[arg(long = "by")]
        by: String,
    },
    /// Remove a blocker (or all blockers) from an agent.
    Unblock {
        id: String,
        #[arg(long = "from")]
        from: Option<String>,
    },
    /// Show dependency info for one agent, or all agents with `--all`.
    Deps {
        id: Option<String>,
        #[arg(long)]
        all: bool,
    },
    /// Rebuild and print the priority queue.
    Queue,
    /// Snapshot one agent (or all active agents if omitted) plus
    /// index/scheduler state.
    Checkpoint { id: Option<String> },
    /// Restore agent files from the most recent (or a named) checkpoint.
    Restore { name: Option<String> },
    /// Run one pass of tiered-memory pressure management.
    Consolidate,
    /// Show tiered-memory and working-memory pressure stats.
    Memory,
    /// Rebuild the index from disk, quarantining unparseable agent files.
    Repair,
}
