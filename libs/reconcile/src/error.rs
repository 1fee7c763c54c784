//! Reconciliation errors.

use thiserror::Error;

/// Boxed error carried across the reconciler boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Returned by any call that was aborted by its [`Context`](crate::Context).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Errors that can tell a cancellation apart from an application failure.
pub trait CancelAware {
    /// Returns true if this error only reports that the call was cancelled.
    fn is_cancelled(&self) -> bool;
}

impl CancelAware for Cancelled {
    fn is_cancelled(&self) -> bool {
        true
    }
}

/// The phase of a cycle in which an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connect,
    Observe,
    Create,
    Update,
    Delete,
}

impl Phase {
    /// Attach this phase to an error raised while executing it.
    pub fn wrap<E>(self, err: E) -> ReconcileError
    where
        E: std::error::Error + CancelAware + Send + Sync + 'static,
    {
        if err.is_cancelled() {
            return ReconcileError::Cancelled;
        }

        let source: BoxError = Box::new(err);
        match self {
            Phase::Connect => ReconcileError::Connect(source),
            Phase::Observe => ReconcileError::Observe(source),
            Phase::Create => ReconcileError::Create(source),
            Phase::Update => ReconcileError::Update(source),
            Phase::Delete => ReconcileError::Delete(source),
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Connect => write!(f, "connect"),
            Phase::Observe => write!(f, "observe"),
            Phase::Create => write!(f, "create"),
            Phase::Update => write!(f, "update"),
            Phase::Delete => write!(f, "delete"),
        }
    }
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The connector could not produce an external client.
    #[error("cannot connect to provider: {0}")]
    Connect(#[source] BoxError),

    /// The external resource could not be observed.
    #[error("cannot observe external resource: {0}")]
    Observe(#[source] BoxError),

    /// The external resource could not be created.
    #[error("cannot create external resource: {0}")]
    Create(#[source] BoxError),

    /// The external resource could not be updated.
    #[error("cannot update external resource: {0}")]
    Update(#[source] BoxError),

    /// The external resource could not be deleted.
    #[error("cannot delete external resource: {0}")]
    Delete(#[source] BoxError),

    /// The cycle was cancelled before it finished.
    #[error("reconciliation cancelled")]
    Cancelled,
}

impl ReconcileError {
    /// Returns the phase that failed, if any.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::Connect(_) => Some(Phase::Connect),
            Self::Observe(_) => Some(Phase::Observe),
            Self::Create(_) => Some(Phase::Create),
            Self::Update(_) => Some(Phase::Update),
            Self::Delete(_) => Some(Phase::Delete),
            Self::Cancelled => None,
        }
    }

    /// Returns true if the cycle was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("boom")]
    struct Boom;

    impl CancelAware for Boom {
        fn is_cancelled(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_phase_wrap_keeps_phase() {
        let err = Phase::Create.wrap(Boom);
        assert_eq!(err.phase(), Some(Phase::Create));
        assert_eq!(err.to_string(), "cannot create external resource: boom");
    }

    #[test]
    fn test_phase_wrap_cancelled() {
        let err = Phase::Update.wrap(Cancelled);
        assert!(err.is_cancelled());
        assert_eq!(err.phase(), None);
    }
}
