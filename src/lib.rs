//! # Cognitive Task Manager
//!
//! A task-context engine for a coding assistant working across many
//! in-flight agents: persistent agent state, priority scoring, a blocker
//! graph, a single-active-agent scheduler, a four-tier memory hierarchy,
//! and attention-residue bookkeeping across task switches.
//!
//! ## Architecture
//!
//! - **Persistent store** ([`store`]): atomic JSON file writes and an
//!   mtime-keyed read cache, underlying every on-disk document.
//! - **Agent model** ([`agent`]): the `Agent` entity and its schema
//!   migration path.
//! - **Index** ([`index`]): status/project lookup without scanning every
//!   agent file.
//! - **Priority** ([`priority`]) and **dependencies** ([`dependencies`]):
//!   scoring and the blocker graph.
//! - **Scheduler** ([`scheduler`]): the priority queue and the single
//!   active agent.
//! - **Tiered memory** ([`memory::tiers`]) and **working memory**
//!   ([`memory::working_memory`]): pressure-driven demotion and a hot-slot
//!   cache.
//! - **Cognitive load** ([`cognitive_load`]): attention residue, tracked
//!   independently of scheduler state.
//! - **Checkpoint/repair** ([`checkpoint`]): snapshots and recovery from a
//!   corrupt index.

/// The `Agent` entity and v0-to-v1 schema migration.
pub mod agent;
/// Checkpoint, restore, and index repair.
pub mod checkpoint;
/// Attention-residue bookkeeping across task switches.
pub mod cognitive_load;
/// CLI surface (`Cli`, `Command`, and their handlers).
pub mod cli;
/// Configuration: defaults, global file, project overlay.
pub mod config;
/// Blocker graph: cycle prevention, cascade unblock, impact queries.
pub mod dependencies;
/// Error types shared across the crate.
pub mod error;
/// Status/project index over agents.
pub mod index;
/// Tiered and working memory.
pub mod memory;
/// On-disk layout for a CTM root.
pub mod paths;
/// Multi-factor priority scoring.
pub mod priority;
/// Priority queue and single-active-agent scheduling.
pub mod scheduler;
/// Atomic JSON persistence and the mtime-keyed read cache.
pub mod store;
/// Timestamp formatting and deadline parsing.
pub mod time;

pub use error::{CtmError, Result};
