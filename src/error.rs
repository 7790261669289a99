//! Error types
//!
//! Three classes, matching how faults are actually handled:
//! - `ConfigError`: fatal, aborts engine construction
//! - `HandlerFault`: recoverable, logged at the dispatch site
//! - `PersistenceError`: recovered by substituting defaults

use thiserror::Error;

/// Invalid engine configuration. The only fatal error class: raised by
/// `GameConfig::validate` before the loop ever starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("play field must have positive dimensions (got {width}x{height})")]
    EmptyField { width: f32, height: f32 },

    #[error("grid cell size must be positive (got {0})")]
    BadCellSize(f32),

    #[error("frame interval must be positive (got {0})")]
    BadFrameInterval(f32),

    #[error("stages per round must be at least 1")]
    NoStages,
}

/// Fault raised inside a collision handler or event listener.
///
/// Never propagates out of the tick: the dispatch site logs it and
/// continues with the remaining handlers/listeners.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerFault(String);

impl HandlerFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<&str> for HandlerFault {
    fn from(message: &str) -> Self {
        Self(message.to_owned())
    }
}

impl From<String> for HandlerFault {
    fn from(message: String) -> Self {
        Self(message)
    }
}

/// Failure in the persistence collaborator. Callers recover by falling
/// back to defaults; this never reaches the game loop.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage backend unavailable")]
    Unavailable,

    #[error("malformed record for category {category:?}")]
    Corrupt {
        category: String,
        #[source]
        source: serde_json::Error,
    },
}
