//! Connector: turns an instance record into an authenticated external client.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use ukc_reconcile::{Context, ExternalConnector, Managed};

use crate::credentials::{extract_credentials, ProviderConfig, SecretStore};
use crate::error::{Error, Result};
use crate::external::{FetchErrorPolicy, InstanceClient};
use crate::instance::Instance;
use crate::service::ServiceFactory;

/// Lookup of provider configs by name.
#[async_trait]
pub trait ProviderConfigStore: Send + Sync {
    /// Fetch a provider config, or `None` if it does not exist.
    async fn get_provider_config(&self, ctx: &Context, name: &str)
        -> Result<Option<ProviderConfig>>;
}

/// Records which resources use which provider config.
///
/// Tracking the same pair twice is a no-op.
#[async_trait]
pub trait UsageTracker: Send + Sync {
    async fn track(&self, ctx: &Context, config: &str, resource: &str) -> Result<()>;
}

/// Builds a fresh [`InstanceClient`] for every cycle.
pub struct Connector {
    configs: Arc<dyn ProviderConfigStore>,
    secrets: Arc<dyn SecretStore>,
    usage: Arc<dyn UsageTracker>,
    factory: Arc<dyn ServiceFactory>,
    fetch_error_policy: FetchErrorPolicy,
}

impl Connector {
    /// Create a new connector. `factory` builds the service client from the
    /// extracted credential.
    pub fn new(
        configs: Arc<dyn ProviderConfigStore>,
        secrets: Arc<dyn SecretStore>,
        usage: Arc<dyn UsageTracker>,
        factory: Arc<dyn ServiceFactory>,
    ) -> Self {
        Self {
            configs,
            secrets,
            usage,
            factory,
            fetch_error_policy: FetchErrorPolicy::default(),
        }
    }

    /// Policy handed to every client this connector builds.
    pub fn with_fetch_error_policy(mut self, policy: FetchErrorPolicy) -> Self {
        self.fetch_error_policy = policy;
        self
    }
}

#[async_trait]
impl ExternalConnector<Instance> for Connector {
    type Client = InstanceClient;
    type Error = Error;

    async fn connect(&self, ctx: &Context, instance: &Instance) -> Result<InstanceClient> {
        let config_name = &instance.spec.provider_config_ref.name;

        self.usage
            .track(ctx, config_name, &instance.key())
            .await
            .map_err(|e| stage_error(e, Error::Tracking))?;

        let config = self
            .configs
            .get_provider_config(ctx, config_name)
            .await
            .map_err(|e| stage_error(e, Error::ConfigNotFound))?
            .ok_or_else(|| Error::ConfigNotFound(format!("{} does not exist", config_name)))?;

        let token = extract_credentials(ctx, &config.credentials, self.secrets.as_ref())
            .await
            .map_err(|e| stage_error(e, Error::Credential))?;

        let service = self
            .factory
            .new_service(&token)
            .map_err(|e| stage_error(e, Error::ClientConstruction))?;

        debug!(provider_config = %config_name, "Connected to instance API");
        Ok(InstanceClient::new(service).with_fetch_error_policy(self.fetch_error_policy))
    }
}

/// Attribute an error to a connector stage unless it already names one.
fn stage_error(err: Error, stage: fn(String) -> Error) -> Error {
    match err {
        Error::Cancelled(_)
        | Error::Tracking(_)
        | Error::ConfigNotFound(_)
        | Error::Credential(_)
        | Error::ClientConstruction(_) => err,
        other => stage(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_wraps_foreign_errors() {
        let err = stage_error(Error::Transient("disk".into()), Error::ConfigNotFound);
        assert!(matches!(err, Error::ConfigNotFound(m) if m.contains("disk")));

        let err = stage_error(Error::Credential("no key".into()), Error::ConfigNotFound);
        assert!(matches!(err, Error::Credential(_)));
    }
}
