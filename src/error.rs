use thiserror::Error;

/// Convenience alias for Results with CtmError
pub type Result<T> = std::result::Result<T, CtmError>;

/// Errors produced by the CTM core.
///
/// Every fallible operation in this crate resolves to one of these kinds,
/// never a bare `io::Error` or `serde_json::Error` at the call site.
#[derive(Error, Debug)]
pub enum CtmError {
    #[error("no agent matching id or prefix '{0}'")]
    NotFound(String),

    #[error("'{prefix}' matches {count} agents: {candidates}")]
    Ambiguous {
        prefix: String,
        count: usize,
        candidates: String,
    },

    #[error("adding blocker '{blocker}' to '{agent}' would create a dependency cycle")]
    WouldCycle { agent: String, blocker: String },

    #[error("cannot transition '{agent}' to {to:?} while blocked by {blockers} agent(s)")]
    BlockedTransition {
        agent: String,
        to: String,
        blockers: usize,
    },

    #[error("store at '{path}' is corrupt: {reason}")]
    CorruptStore { path: String, reason: String },

    #[error("required field '{field}' missing on '{entity}'")]
    MissingField { entity: String, field: String },

    #[error("failed to write '{path}': {reason}")]
    WriteFailed { path: String, reason: String },

    #[error("config key '{0}' missing, using default")]
    ConfigMissing(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}
