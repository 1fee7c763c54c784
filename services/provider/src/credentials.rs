//! Provider configs and credential extraction.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use ukc_reconcile::Context;

use crate::error::{Error, Result};

/// Where the API credential of a provider config comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialsSource {
    None,
    Secret,
    Environment,
    Filesystem,
    Inline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeySelector {
    pub namespace: String,
    pub name: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvSelector {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsSelector {
    pub path: PathBuf,
}

/// Credential configuration of a provider config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCredentials {
    pub source: CredentialsSource,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretKeySelector>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<EnvSelector>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs: Option<FsSelector>,

    /// Token embedded in the config. Intended for development only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline: Option<String>,
}

/// Named configuration shared by every instance that references it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub credentials: ProviderCredentials,
}

/// Read access to secrets referenced by provider configs.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch a secret's data, or `None` if it does not exist.
    async fn get_secret(
        &self,
        ctx: &Context,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, Vec<u8>>>>;
}

/// Extract the credential bytes a provider config points at.
pub async fn extract_credentials(
    ctx: &Context,
    credentials: &ProviderCredentials,
    secrets: &dyn SecretStore,
) -> Result<Vec<u8>> {
    match credentials.source {
        CredentialsSource::None => Ok(Vec::new()),
        CredentialsSource::Inline => credentials
            .inline
            .as_ref()
            .map(|token| token.as_bytes().to_vec())
            .ok_or_else(|| Error::Credential("inline credentials are not set".to_string())),
        CredentialsSource::Environment => {
            let selector = credentials.env.as_ref().ok_or_else(|| {
                Error::Credential("environment selector is not set".to_string())
            })?;
            std::env::var(&selector.name)
                .map(String::into_bytes)
                .map_err(|_| {
                    Error::Credential(format!(
                        "environment variable {} is not set",
                        selector.name
                    ))
                })
        }
        CredentialsSource::Filesystem => {
            let selector = credentials.fs.as_ref().ok_or_else(|| {
                Error::Credential("filesystem selector is not set".to_string())
            })?;
            tokio::fs::read(&selector.path).await.map_err(|e| {
                Error::Credential(format!("cannot read {}: {}", selector.path.display(), e))
            })
        }
        CredentialsSource::Secret => {
            let selector = credentials.secret_ref.as_ref().ok_or_else(|| {
                Error::Credential("secret reference is not set".to_string())
            })?;
            let data = secrets
                .get_secret(ctx, &selector.namespace, &selector.name)
                .await?
                .ok_or_else(|| {
                    Error::Credential(format!(
                        "secret {}/{} not found",
                        selector.namespace, selector.name
                    ))
                })?;
            data.get(&selector.key).cloned().ok_or_else(|| {
                Error::Credential(format!(
                    "key {} missing from secret {}/{}",
                    selector.key, selector.namespace, selector.name
                ))
            })
        }
    }
}
