//! File-backed collaborators for running the provider standalone.
//!
//! Layout under the state directory:
//!
//! ```text
//! instances/<name>.json                 instance records, status written back
//! providerconfigs/<name>.json           provider configs
//! secrets/<namespace>/<name>.json       {"key": "value"} secret data
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use ukc_reconcile::Context;

use crate::connector::{ProviderConfigStore, UsageTracker};
use crate::credentials::{ProviderConfig, SecretStore};
use crate::error::Error;
use crate::instance::Instance;

/// Persistence for instance records.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Load every record.
    async fn list_instances(&self) -> Result<Vec<Instance>>;

    /// Load one record, or `None` if it no longer exists.
    async fn get_instance(&self, name: &str) -> Result<Option<Instance>>;

    /// Persist a record, including its status and identity.
    async fn save_instance(&self, instance: &Instance) -> Result<()>;

    /// Remove a record once its deletion has completed.
    async fn remove_instance(&self, name: &str) -> Result<()>;
}

/// Stores records, provider configs and secrets as JSON files.
pub struct FileStore {
    root: PathBuf,
    usages: RwLock<BTreeMap<String, BTreeSet<String>>>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            usages: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create the directory layout if it is missing.
    pub async fn init(&self) -> Result<()> {
        for dir in [self.instances_dir(), self.configs_dir(), self.secrets_dir()] {
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("cannot create {}", dir.display()))?;
        }
        Ok(())
    }

    /// Resources currently recorded as using a provider config.
    pub async fn usages(&self, config: &str) -> Vec<String> {
        self.usages
            .read()
            .await
            .get(config)
            .map(|resources| resources.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn instances_dir(&self) -> PathBuf {
        self.root.join("instances")
    }

    fn configs_dir(&self) -> PathBuf {
        self.root.join("providerconfigs")
    }

    fn secrets_dir(&self) -> PathBuf {
        self.root.join("secrets")
    }

    fn instance_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.instances_dir().join(format!("{}.json", file_name(name)?)))
    }
}

/// Reject names that would escape their directory.
fn file_name(name: &str) -> Result<&str> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        anyhow::bail!("invalid record name '{}'", name);
    }
    Ok(name)
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let value = serde_json::from_slice(&bytes)
                .with_context(|| format!("cannot parse {}", path.display()))?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("cannot read {}", path.display())),
    }
}

#[async_trait]
impl InstanceStore for FileStore {
    async fn list_instances(&self) -> Result<Vec<Instance>> {
        let dir = self.instances_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("cannot list {}", dir.display())),
        };

        let mut instances = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match read_json::<Instance>(&path).await {
                Ok(Some(instance)) => instances.push(instance),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable instance record"),
            }
        }

        instances.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Ok(instances)
    }

    async fn get_instance(&self, name: &str) -> Result<Option<Instance>> {
        read_json(&self.instance_path(name)?).await
    }

    async fn save_instance(&self, instance: &Instance) -> Result<()> {
        let path = self.instance_path(&instance.metadata.name)?;
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(instance)?;

        tokio::fs::create_dir_all(self.instances_dir()).await?;
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("cannot write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("cannot replace {}", path.display()))?;

        debug!(path = %path.display(), "Saved instance record");
        Ok(())
    }

    async fn remove_instance(&self, name: &str) -> Result<()> {
        let path = self.instance_path(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("cannot remove {}", path.display())),
        }
    }
}

#[async_trait]
impl ProviderConfigStore for FileStore {
    async fn get_provider_config(
        &self,
        _ctx: &Context,
        name: &str,
    ) -> crate::error::Result<Option<ProviderConfig>> {
        let name = file_name(name).map_err(|e| Error::ConfigNotFound(e.to_string()))?;
        let path = self.configs_dir().join(format!("{}.json", name));
        read_json(&path)
            .await
            .map_err(|e| Error::ConfigNotFound(format!("{:#}", e)))
    }
}

#[async_trait]
impl SecretStore for FileStore {
    async fn get_secret(
        &self,
        _ctx: &Context,
        namespace: &str,
        name: &str,
    ) -> crate::error::Result<Option<BTreeMap<String, Vec<u8>>>> {
        let namespace = file_name(namespace).map_err(|e| Error::Credential(e.to_string()))?;
        let name = file_name(name).map_err(|e| Error::Credential(e.to_string()))?;
        let path = self.secrets_dir().join(namespace).join(format!("{}.json", name));

        let data: Option<BTreeMap<String, String>> = read_json(&path)
            .await
            .map_err(|e| Error::Credential(format!("{:#}", e)))?;
        Ok(data.map(|data| {
            data.into_iter()
                .map(|(key, value)| (key, value.into_bytes()))
                .collect()
        }))
    }
}

#[async_trait]
impl UsageTracker for FileStore {
    async fn track(&self, _ctx: &Context, config: &str, resource: &str) -> crate::error::Result<()> {
        let mut usages = self.usages.write().await;
        usages
            .entry(config.to_string())
            .or_default()
            .insert(resource.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{CredentialsSource, ProviderCredentials};
    use crate::instance::{InstanceParameters, InstanceState};

    fn instance(name: &str) -> Instance {
        Instance::new(
            name,
            InstanceParameters {
                metro: "fra0".to_string(),
                image: "unikraft.io/app:v1".to_string(),
                memory: "128Mi".to_string(),
                args: vec![],
                port: 443,
                internal_port: 8080,
                desired_state: InstanceState::Running,
            },
        )
    }

    #[tokio::test]
    async fn test_save_list_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.init().await.unwrap();

        store.save_instance(&instance("b")).await.unwrap();
        store.save_instance(&instance("a")).await.unwrap();
        std::fs::write(dir.path().join("instances/notes.txt"), "ignored").unwrap();
        std::fs::write(dir.path().join("instances/broken.json"), "{").unwrap();

        let names: Vec<_> = store
            .list_instances()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.metadata.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);

        assert_eq!(store.get_instance("b").await.unwrap(), Some(instance("b")));

        store.remove_instance("a").await.unwrap();
        store.remove_instance("a").await.unwrap();
        assert_eq!(store.list_instances().await.unwrap().len(), 1);
        assert_eq!(store.get_instance("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejects_path_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(store.save_instance(&instance("../escape")).await.is_err());
    }

    #[tokio::test]
    async fn test_provider_config_and_secret() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.init().await.unwrap();

        let config = ProviderConfig {
            name: "default".to_string(),
            credentials: ProviderCredentials {
                source: CredentialsSource::Inline,
                secret_ref: None,
                env: None,
                fs: None,
                inline: Some("tok".to_string()),
            },
        };
        std::fs::write(
            dir.path().join("providerconfigs/default.json"),
            serde_json::to_vec(&config).unwrap(),
        )
        .unwrap();
        std::fs::create_dir_all(dir.path().join("secrets/system")).unwrap();
        std::fs::write(
            dir.path().join("secrets/system/api.json"),
            r#"{"token": "abc"}"#,
        )
        .unwrap();

        let ctx = Context::background();
        assert_eq!(
            store.get_provider_config(&ctx, "default").await.unwrap(),
            Some(config)
        );
        assert_eq!(store.get_provider_config(&ctx, "other").await.unwrap(), None);

        let secret = store.get_secret(&ctx, "system", "api").await.unwrap().unwrap();
        assert_eq!(secret["token"], b"abc".to_vec());
        assert!(store.get_secret(&ctx, "system", "none").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_usage_tracking_is_idempotent() {
        let store = FileStore::new("/nonexistent");
        let ctx = Context::background();
        store.track(&ctx, "default", "instance/a").await.unwrap();
        store.track(&ctx, "default", "instance/a").await.unwrap();
        store.track(&ctx, "default", "instance/b").await.unwrap();

        assert_eq!(store.usages("default").await, vec!["instance/a", "instance/b"]);
        assert!(store.usages("other").await.is_empty());
    }
}
