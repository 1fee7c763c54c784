//! Events emitted while reconciling a record.

use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

/// Why an event was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventReason {
    CannotConnectToProvider,
    CannotObserveExternalResource,
    CannotCreateExternalResource,
    CannotUpdateExternalResource,
    CannotDeleteExternalResource,
    CreatedExternalResource,
    UpdatedExternalResource,
    DeletedExternalResource,
    ReleasedExternalResource,
}

impl EventReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CannotConnectToProvider => "CannotConnectToProvider",
            Self::CannotObserveExternalResource => "CannotObserveExternalResource",
            Self::CannotCreateExternalResource => "CannotCreateExternalResource",
            Self::CannotUpdateExternalResource => "CannotUpdateExternalResource",
            Self::CannotDeleteExternalResource => "CannotDeleteExternalResource",
            Self::CreatedExternalResource => "CreatedExternalResource",
            Self::UpdatedExternalResource => "UpdatedExternalResource",
            Self::DeletedExternalResource => "DeletedExternalResource",
            Self::ReleasedExternalResource => "ReleasedExternalResource",
        }
    }
}

impl std::fmt::Display for EventReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventType,
    pub reason: EventReason,
    pub message: String,
}

impl Event {
    pub fn normal(reason: EventReason, message: impl Into<String>) -> Self {
        Self {
            kind: EventType::Normal,
            reason,
            message: message.into(),
        }
    }

    pub fn warning(reason: EventReason, message: impl Into<String>) -> Self {
        Self {
            kind: EventType::Warning,
            reason,
            message: message.into(),
        }
    }
}

/// Sink for events about a managed record.
pub trait EventRecorder: Send + Sync {
    /// Record an event about the record identified by `resource`.
    fn record(&self, resource: &str, event: Event);
}

/// Recorder that writes events to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRecorder;

impl EventRecorder for TracingRecorder {
    fn record(&self, resource: &str, event: Event) {
        match event.kind {
            EventType::Normal => info!(
                resource = %resource,
                reason = %event.reason,
                message = %event.message,
                "Event"
            ),
            EventType::Warning => warn!(
                resource = %resource,
                reason = %event.reason,
                message = %event.message,
                "Event"
            ),
        }
    }
}
