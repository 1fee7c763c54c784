//! Managed-resource reconciliation primitives.
//!
//! This library provides the pieces a provider needs to converge one external
//! resource toward the desired state recorded in a managed record:
//!
//! - **Connector**: turns a record into an authenticated external client.
//! - **External client**: observes, creates, updates and deletes the
//!   external resource that backs one record.
//! - **Reconciler**: runs a single convergence cycle and decides exactly one
//!   of no-op, create, update or delete.
//!
//! # Invariants
//!
//! - One cycle issues its remote calls strictly sequentially
//! - Every remote call races the cycle's cancellation signal
//! - Failures are surfaced, never retried inside a cycle

use std::time::Duration;

mod condition;
mod context;
mod error;
mod event;
mod managed;
mod reconciler;

pub use condition::{
    get_condition, set_condition, Condition, ConditionReason, ConditionStatus, ConditionType,
};
pub use context::Context;
pub use error::{BoxError, CancelAware, Cancelled, Phase, ReconcileError};
pub use event::{Event, EventReason, EventRecorder, EventType, TracingRecorder};
pub use managed::{
    DeletionPolicy, ExternalClient, ExternalConnector, ExternalObservation, Managed,
    ResourceState,
};
pub use reconciler::{ManagedReconciler, ReconcileOutcome};

/// Default interval between two cycles for the same record.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
