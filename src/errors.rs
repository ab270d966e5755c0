//! Observer Error Hierarchy
//!
//! Error types for the sample ingestion and reconciliation pipeline, grouped by the layer
//! that raises them. Structural and consistency problems inside a tick are not errors: they
//! are logged and skipped. Only storage failures, configuration problems and lifecycle API
//! misuse surface as [`Error`].

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (storage backends)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Misuse of the source lifecycle API
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Reconciliation pipeline failures
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    /// Storage backend failures
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A single storage call failed
    #[error("Storage {storage} failed on {operation}: {reason}")]
    OperationFailed {
        storage: String,
        operation: &'static str,
        reason: String,
    },

    /// The backend is not reachable
    #[error("Storage {0} is unavailable")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Samples pushed into a source after it was closed
    #[error("Source {source_id} is closed")]
    Closed { source_id: String },

    /// The source registry itself has been shut down
    #[error("Sources are closed")]
    SourcesClosed,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A middleware chain was entered with an invalid context
    #[error("Middleware {middleware} failed: {reason}")]
    Middleware {
        middleware: &'static str,
        reason: String,
    },

    /// The evaluator worker is no longer accepting ticks
    #[error("Evaluator is closed")]
    EvaluatorClosed,

    /// Exclusivity guard could not be acquired
    #[error("Exclusivity guard unavailable: {0}")]
    GuardUnavailable(String),

    /// A stage of the tick panicked
    #[error("Tick stage {stage} panicked: {reason}")]
    Panicked { stage: &'static str, reason: String },
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::System(SystemError::Storage(e))
    }
}
