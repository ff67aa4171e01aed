// Error taxonomy for the stream loop.
//
// Only `Connection` is fatal; everything else is contained within one
// generation cycle by the driver.

use crate::catalog::EventKind;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum StreamError {
    /// A sink could not be reached at startup. Aborts the run.
    #[error("connection to {target} failed: {source}")]
    Connection {
        target: &'static str,
        #[source]
        source: BoxError,
    },

    /// No eligible subject exists in current state for the chosen kind.
    /// The event is discarded and the loop continues at the next tick.
    #[error("{0} failed validation: no eligible subject")]
    NoEligibleSubject(EventKind),

    /// The relational store rejected a write after successful validation.
    /// The event is dropped without retry.
    #[error("relational write rejected: {0}")]
    Write(#[from] rusqlite::Error),

    /// Archival write failed. Isolated: never affects relational state
    /// or loop continuation.
    #[error("archive write failed: {0}")]
    Archive(#[source] BoxError),
}

impl StreamError {
    pub fn connection(target: &'static str, source: anyhow::Error) -> Self {
        StreamError::Connection {
            target,
            source: source.into(),
        }
    }

    pub fn archive(source: anyhow::Error) -> Self {
        StreamError::Archive(source.into())
    }

    /// Recoverable errors are contained within one cycle and never
    /// escape the driver loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StreamError::Connection { .. })
    }
}
