//! Multiwatcher Error Hierarchy
//!
//! Exactly two terminal conditions ever reach a watcher: a clean stop and
//! an upstream backing failure. Everything else is construction-time
//! configuration validation.

use std::sync::Arc;

use crate::EntityId;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to watcher and manager owners.
///
/// `Error` is `Clone` so that a single terminal failure can be fanned out
/// to every watcher attached to the failed manager.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The watcher, or the manager it is attached to, was stopped cleanly.
    #[error("state watcher was stopped")]
    WatcherStopped,

    /// The upstream backing failed. Terminal for the manager and for every
    /// watcher attached to it; the original cause is surfaced verbatim.
    #[error("{0}")]
    Backing(Arc<BackingError>),

    /// Configuration validation failures.
    #[error("{0}")]
    Config(Arc<config::ConfigError>),
}

impl Error {
    /// True for the clean-stop terminal condition.
    pub fn is_stopped(&self) -> bool {
        matches!(self, Error::WatcherStopped)
    }
}

/// Errors produced by [`Backing`](crate::Backing) implementations.
#[derive(Debug, thiserror::Error)]
pub enum BackingError {
    /// The fetched entity no longer exists upstream. The manager turns
    /// this into a removal rather than a failure, so implementations must
    /// return it structurally, never as message text.
    #[error("entity {0} not found")]
    NotFound(EntityId),

    /// The upstream change feed closed while the manager was running.
    #[error("backing change stream closed")]
    ChangeStreamClosed,

    /// A second watch was registered while one was still active.
    #[error("backing is already being watched")]
    AlreadyWatched,

    /// Seed or fetch failure with upstream context.
    #[error("{0}")]
    Fetch(String),

    /// Any other upstream failure.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl BackingError {
    /// True iff this is the distinguished "not found" value.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackingError::NotFound(_))
    }
}

impl From<BackingError> for Error {
    fn from(e: BackingError) -> Self {
        Error::Backing(Arc::new(e))
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(Arc::new(e))
    }
}
