//! Capability interface of the remote instance API.
//!
//! The reconciler only ever talks to these traits; the HTTP implementation
//! lives in [`crate::client`] and tests substitute their own.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ukc_reconcile::Context;

use crate::api::{CreateInstanceRequest, InstanceEntry};
use crate::error::Result;

/// Instance operations bound to a single metro.
///
/// Every call blocks until the API answers, fails, or `ctx` is cancelled.
#[async_trait]
pub trait MetroInstances: Send + Sync {
    /// The metro these calls are routed to.
    fn metro(&self) -> &str;

    /// Fetch an instance by identity.
    async fn get(&self, ctx: &Context, id: &str) -> Result<InstanceEntry>;

    /// Create an instance. Returns the created entry with its identity.
    async fn create(&self, ctx: &Context, request: &CreateInstanceRequest)
        -> Result<InstanceEntry>;

    async fn start(&self, ctx: &Context, id: &str, delay: Duration) -> Result<()>;

    async fn stop(&self, ctx: &Context, id: &str, delay: Duration, force: bool) -> Result<()>;

    async fn delete(&self, ctx: &Context, id: &str) -> Result<()>;
}

/// An authenticated instance API client.
pub trait InstancesService: Send + Sync {
    /// Bind subsequent calls to one metro.
    fn scoped(&self, metro: &str) -> Box<dyn MetroInstances>;
}

/// Builds an authenticated service from raw credential bytes.
pub trait ServiceFactory: Send + Sync {
    fn new_service(&self, token: &[u8]) -> Result<Arc<dyn InstancesService>>;
}

impl<F> ServiceFactory for F
where
    F: Fn(&[u8]) -> Result<Arc<dyn InstancesService>> + Send + Sync,
{
    fn new_service(&self, token: &[u8]) -> Result<Arc<dyn InstancesService>> {
        self(token)
    }
}
