//! Error taxonomy for the timeline engine.
//!
//! Three families of failure surface to callers:
//!
//! - **Format**: a machine file line that cannot be parsed or replayed. Fails `open`
//!   outright; no partial tree is ever returned.
//! - **Lifecycle / structural**: an operation on a closed machine, a dead dispatcher,
//!   a log without a root checkpoint, or a tree edit that would cut the branch the
//!   machine is standing on.
//! - **Engine**: a primitive rejected by the live engine. The tree and the log are
//!   left untouched for that call.

use crate::config::ConfigError;
use crate::engine::EngineError;
use crate::history::EventId;

/// Errors returned by timeline operations.
#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    /// A machine file line is malformed or cannot be replayed.
    #[error("machine file line {line}: {reason}")]
    Format {
        /// 1-based line number within the file.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// The machine is closed, not yet usable, or its dispatcher has gone away.
    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    /// A structural violation of the history tree.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// No event with this id exists in the tree.
    #[error("unknown history event {0}")]
    UnknownEvent(EventId),

    /// The live engine rejected a primitive.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The injected file system failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The supplied configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl TimelineError {
    pub(crate) fn format(line: usize, reason: impl Into<String>) -> Self {
        TimelineError::Format {
            line,
            reason: reason.into(),
        }
    }

    pub(crate) fn closed() -> Self {
        TimelineError::Lifecycle("machine is closed".to_string())
    }

    /// True for errors caused by a malformed machine file.
    pub fn is_format(&self) -> bool {
        matches!(self, TimelineError::Format { .. })
    }

    /// True for lifecycle errors (closed machine, missing checkpoint, dead dispatcher).
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, TimelineError::Lifecycle(_))
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = TimelineError> = std::result::Result<T, E>;
