//! Traits implemented by managed records and their external clients.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::context::Context;
use crate::error::CancelAware;

/// What happens to the external resource when its record is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionPolicy {
    /// Delete the external resource.
    #[default]
    Delete,
    /// Leave the external resource running.
    Orphan,
}

/// A record whose desired state is converged onto an external resource.
pub trait Managed: Send + Sync {
    /// Human-readable key used in logs and events.
    fn key(&self) -> String;

    /// The external name, or `None` if the resource was never created.
    fn external_name(&self) -> Option<&str>;

    /// Record the external name assigned by the remote system.
    fn set_external_name(&mut self, name: &str);

    /// Set a status condition on the record.
    fn set_conditions(&mut self, condition: Condition);

    /// Whether the owner asked for this record to be deleted.
    fn is_deletion_requested(&self) -> bool;

    fn deletion_policy(&self) -> DeletionPolicy {
        DeletionPolicy::Delete
    }
}

/// Per-cycle verdict produced by observing the external resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalObservation {
    pub resource_exists: bool,
    pub resource_up_to_date: bool,
}

/// Derived state of the external resource for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Absent,
    Stale,
    Current,
}

impl ExternalObservation {
    /// The external resource does not exist.
    pub fn absent() -> Self {
        Self {
            resource_exists: false,
            resource_up_to_date: false,
        }
    }

    /// The external resource exists.
    pub fn present(up_to_date: bool) -> Self {
        Self {
            resource_exists: true,
            resource_up_to_date: up_to_date,
        }
    }

    pub fn state(&self) -> ResourceState {
        match (self.resource_exists, self.resource_up_to_date) {
            (false, _) => ResourceState::Absent,
            (true, false) => ResourceState::Stale,
            (true, true) => ResourceState::Current,
        }
    }
}

/// Produces an external client for a record.
#[async_trait]
pub trait ExternalConnector<R: Managed + 'static>: Send + Sync {
    type Client: ExternalClient<R>;
    type Error: std::error::Error + CancelAware + Send + Sync + 'static;

    async fn connect(&self, ctx: &Context, resource: &R) -> Result<Self::Client, Self::Error>;
}

/// Observes, then creates, updates or deletes the external resource backing a
/// record.
#[async_trait]
pub trait ExternalClient<R: Managed + 'static>: Send + Sync {
    type Error: std::error::Error + CancelAware + Send + Sync + 'static;

    /// Inspect the external resource. May write observed fields into the
    /// record's status.
    ///
    /// For a record being deleted, reporting the resource as absent releases
    /// the record without a delete call. Implementations must only do so when
    /// the resource is known to be gone.
    async fn observe(
        &self,
        ctx: &Context,
        resource: &mut R,
    ) -> Result<ExternalObservation, Self::Error>;

    async fn create(&self, ctx: &Context, resource: &mut R) -> Result<(), Self::Error>;

    async fn update(&self, ctx: &Context, resource: &mut R) -> Result<(), Self::Error>;

    async fn delete(&self, ctx: &Context, resource: &mut R) -> Result<(), Self::Error>;
}
