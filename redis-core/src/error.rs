//! Reconciliation error abstractions.

use thiserror::Error;

/// A result type where the error is a `ReconcileError`.
pub type ReconcileResult<T> = ::std::result::Result<T, ReconcileError>;

/// Error variants which may arise during a reconciliation pass.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The requested object does not exist.
    ///
    /// This is an expected condition which drives the creation path, it is never surfaced
    /// as a failure.
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },
    /// The resource store failed for a reason other than absence of the object.
    ///
    /// Transient. The pass is aborted and implicitly retried by the next pass.
    #[error("resource store error: {0:#}")]
    Store(anyhow::Error),
    /// The desired state is malformed in a way which prevents building a valid child.
    ///
    /// Retrying will not help until the desired-state record is fixed.
    #[error("invalid desired state: {0}")]
    Render(String),
}

impl ReconcileError {
    /// Construct a new render error from the given message.
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// Check if this error indicates that the target object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error may resolve itself on a later pass without user intervention.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Render(_))
    }

    /// A short label describing this error's class, used for metrics & logging.
    pub fn class(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Store(_) => "store",
            Self::Render(_) => "render",
        }
    }
}
