//! Error taxonomy for the core.
//!
//! Module-level enums ([`LogError`], [`ReplayError`], [`ValidationError`],
//! [`EvidenceError`], [`ConfigError`]) carry the detail; [`Error`] is what the
//! store hands back to callers and adds the contention and setup cases.

use crate::config::ConfigError;
use crate::event::TaskState;
use crate::evidence::EvidenceError;
use crate::log::LogError;
use crate::replay::ReplayError;

/// A requested change that is rejected before anything is appended.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("no such task or epic: {0}")]
    NotFound(String),

    #[error("{0} has been pruned and can no longer be changed")]
    Tombstoned(String),

    #[error("title must not be empty")]
    EmptyTitle,

    #[error("agent name must not be empty")]
    EmptyAgent,

    #[error("{0} is not an epic")]
    NotAnEpic(String),

    #[error("{id} is an epic; epics have no {field}")]
    EpicField { id: String, field: &'static str },

    #[error("{id}: invalid transition {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: TaskState,
        to: TaskState,
    },

    #[error("{id}: state {state} requires a claim (pass an agent or claim first)")]
    ClaimRequired { id: String, state: TaskState },

    #[error("{id} is already claimed by {by}")]
    AlreadyClaimed { id: String, by: String },

    #[error("{id} is {state}; reopen it before claiming")]
    ClaimClosed { id: String, state: TaskState },

    #[error("{0} cannot depend on itself")]
    SelfDependency(String),

    #[error("{from} -> {to}: dependencies must link task to task or epic to epic")]
    MixedKinds { from: String, to: String },

    #[error("{from} -> {to} would create a dependency cycle")]
    Cycle { from: String, to: String },

    #[error("no dependency {from} -> {to}")]
    EdgeNotFound { from: String, to: String },

    #[error("bulk payload names `{0}` more than once")]
    DuplicateLocalId(String),

    #[error("`{from}` refers to unknown task `{reference}`")]
    DanglingReference { from: String, reference: String },

    #[error("bulk payload has no tasks")]
    EmptyBulk,

    #[error("could not allocate an unused id")]
    IdSpaceExhausted,
}

/// Everything a store operation can fail with.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no ergo data directory at {dir} (run `ergo init`)")]
    NotInitialized { dir: String },

    #[error("lock busy: {lock_path} (another writer is active; retry)")]
    LockBusy { lock_path: String },

    #[error("failed to acquire lock {lock_path}: {message}")]
    LockIo { lock_path: String, message: String },

    #[error("{path}: {message}")]
    Io { path: String, message: String },

    #[error("compacted log would not replay to the same graph ({events} events); log left unchanged")]
    CompactionMismatch { events: usize },

    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Evidence(#[from] EvidenceError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Contention, not failure: the caller may retry.
    pub fn is_lock_busy(&self) -> bool {
        matches!(self, Error::LockBusy { .. })
    }

    pub(crate) fn io(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        Error::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
