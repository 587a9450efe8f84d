//! Error channel of the work-function contract.

use thiserror::Error;

/// How a work function signals that it did not produce an output.
///
/// The engine classifies these into a terminal [`RunStatus`]:
/// `Failed` becomes `fail`, `Raised` becomes `exception`. Timeouts are not a
/// work-side error; the engine imposes them from the outside.
///
/// [`RunStatus`]: super::status::RunStatus
#[derive(Debug, Error)]
pub enum WorkError {
    /// The work ran to completion but reported a domain failure.
    #[error("work failed: {0}")]
    Failed(String),

    /// The work hit an unexpected error.
    #[error("work raised: {0}")]
    Raised(String),
}

impl WorkError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }

    pub fn raised(reason: impl Into<String>) -> Self {
        Self::Raised(reason.into())
    }
}
