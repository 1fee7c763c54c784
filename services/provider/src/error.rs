//! Error taxonomy for the instance provider.

use thiserror::Error;
use ukc_reconcile::{CancelAware, Cancelled};

/// Result type for provider operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A run-state transition issued against a remote instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionAction {
    Start,
    Stop,
    Delete,
}

impl std::fmt::Display for TransitionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionAction::Start => write!(f, "start"),
            TransitionAction::Stop => write!(f, "stop"),
            TransitionAction::Delete => write!(f, "delete"),
        }
    }
}

/// Errors raised by the provider and its service client.
#[derive(Debug, Error)]
pub enum Error {
    /// The remote instance does not exist.
    #[error("instance not found: {0}")]
    NotFound(String),

    /// The desired state or a request was rejected as malformed.
    #[error("invalid instance: {0}")]
    Validation(String),

    /// Network, transport or server-side failure.
    #[error("transient API error: {0}")]
    Transient(String),

    /// The API rejected the credential.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("cannot track provider config usage: {0}")]
    Tracking(String),

    #[error("cannot get provider config: {0}")]
    ConfigNotFound(String),

    #[error("cannot get credentials: {0}")]
    Credential(String),

    #[error("cannot create new service client: {0}")]
    ClientConstruction(String),

    /// A start, stop or delete call failed.
    #[error("could not {action} the instance: {source}")]
    Transition {
        action: TransitionAction,
        #[source]
        source: Box<Error>,
    },

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl Error {
    /// Wrap a failed transition call. Cancellation is passed through as is.
    pub fn transition(action: TransitionAction, source: Error) -> Self {
        match source {
            Error::Cancelled(c) => Error::Cancelled(c),
            source => Error::Transition {
                action,
                source: Box::new(source),
            },
        }
    }

    /// Returns true if the remote reported the instance as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl CancelAware for Error {
    fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transient(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_wraps_source() {
        let err = Error::transition(TransitionAction::Stop, Error::Transient("503".into()));
        assert_eq!(
            err.to_string(),
            "could not stop the instance: transient API error: 503"
        );
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_transition_passes_cancellation_through() {
        let err = Error::transition(TransitionAction::Start, Cancelled.into());
        assert!(err.is_cancelled());
    }
}
