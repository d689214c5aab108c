//! Error types for the controller.
//!
//! Defines custom error types with classification for retry behavior.

use std::time::Duration;
use thiserror::Error;

/// Stage of the reconcile pipeline an error surfaced from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    /// Backend selection and desired resource synthesis.
    Build,
    /// Get-or-create-or-update of the backend resource.
    Converge,
    /// Writing the parent status.
    Persist,
    /// Adding or removing the finalizer.
    Finalizer,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Build => write!(f, "build"),
            Stage::Converge => write!(f, "converge"),
            Stage::Persist => write!(f, "persist"),
            Stage::Finalizer => write!(f, "finalizer"),
        }
    }
}

/// Error type for controller operations
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Store-level error expected to clear on a later pass
    #[error("Transient store error: {0}")]
    TransientStore(String),

    /// Backend resource could not be brought in line with the desired spec
    #[error("Convergence failed for {name}: {reason}")]
    ConvergenceFailed { name: String, reason: String },

    /// The backend named in the spec is not one this operator drives
    #[error("Unsupported backend: {0:?}")]
    UnsupportedBackend(String),

    /// Missing required field in resource
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An error tagged with the pipeline stage it came from
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Tag this error with the stage it surfaced from.
    ///
    /// Already-tagged errors keep their original stage.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            Error::Stage { .. } => self,
            other => Error::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Stage this error was tagged with, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The underlying error with any stage tag removed
    pub fn root(&self) -> &Error {
        match self {
            Error::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Error::Kube(kube::Error::Api(e)) if e.code == 404)
    }

    /// Check if this error is an optimistic-concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self.root(), Error::Kube(kube::Error::Api(e)) if e.code == 409)
    }

    /// Check if the API server rejected the object as invalid
    pub fn is_rejected(&self) -> bool {
        matches!(self.root(), Error::Kube(kube::Error::Api(e)) if e.code == 400 || e.code == 422)
    }

    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        match self.root() {
            Error::Kube(e) => {
                // Retry on conflicts, network errors, rate limiting, and server errors
                matches!(
                    e,
                    kube::Error::Api(api_err)
                        if api_err.code >= 500 || api_err.code == 429 || api_err.code == 409
                ) || matches!(e, kube::Error::Service(_))
            }
            Error::TransientStore(_) | Error::ConvergenceFailed { .. } => true,
            Error::UnsupportedBackend(_) | Error::MissingField(_) => false,
            Error::Serialization(_) => false,
            Error::Stage { .. } => false,
        }
    }

    /// Get the recommended requeue duration for this error
    pub fn requeue_after(&self) -> Duration {
        if self.is_retryable() {
            Duration::from_secs(30)
        } else {
            Duration::from_secs(300)
        }
    }
}

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;
