//! Shared fixtures: an in-memory instance API and collaborator stores.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ukc_provider::api::{CreateInstanceRequest, InstanceEntry, RemoteInstanceState};
use ukc_provider::connector::{Connector, ProviderConfigStore, UsageTracker};
use ukc_provider::credentials::{
    CredentialsSource, ProviderConfig, ProviderCredentials, SecretKeySelector, SecretStore,
};
use ukc_provider::error::{Error, Result};
use ukc_provider::instance::{InstanceParameters, InstanceState};
use ukc_provider::service::{InstancesService, MetroInstances, ServiceFactory};
use ukc_reconcile::Context;

pub const TOKEN: &str = "test-token";

/// Calls made against the stub API, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Get { metro: String, id: String },
    Create { metro: String, request: CreateInstanceRequest },
    Start { metro: String, id: String, delay: Duration },
    Stop { metro: String, id: String, delay: Duration, force: bool },
    Delete { metro: String, id: String },
}

impl Call {
    /// Returns true for calls that change remote state.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Call::Get { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Get,
    Create,
    Start,
    Stop,
    Delete,
}

/// Failure the stub returns for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Transient,
    NotFound,
    Unauthorized,
    /// Block until the context is cancelled.
    Hang,
    /// Succeed but return an entry without identity.
    NoIdentity,
}

impl Fault {
    fn into_error(self, op: Op) -> Error {
        match self {
            Fault::Transient => Error::Transient(format!("{:?} failed", op)),
            Fault::NotFound => Error::NotFound(format!("{:?}: no such instance", op)),
            Fault::Unauthorized => Error::Unauthorized("bad token".to_string()),
            Fault::Hang | Fault::NoIdentity => Error::Transient(format!("{:?} faulted", op)),
        }
    }
}

type CallHook = Arc<dyn Fn(&Call) + Send + Sync>;

#[derive(Default)]
struct StubState {
    instances: BTreeMap<String, InstanceEntry>,
    calls: Vec<Call>,
    faults: HashMap<Op, Fault>,
    hook: Option<CallHook>,
    next_id: u64,
}

/// In-memory instance API. Clones share state.
#[derive(Clone, Default)]
pub struct StubService {
    state: Arc<Mutex<StubState>>,
}

impl StubService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing instance.
    pub fn insert(&self, id: &str, state: RemoteInstanceState) {
        let mut inner = self.state.lock().unwrap();
        inner.instances.insert(id.to_string(), entry(id, state));
    }

    pub fn remote_state(&self, id: &str) -> Option<RemoteInstanceState> {
        self.state
            .lock()
            .unwrap()
            .instances
            .get(id)
            .map(|entry| entry.state)
    }

    pub fn instance_count(&self) -> usize {
        self.state.lock().unwrap().instances.len()
    }

    pub fn fail(&self, op: Op, fault: Fault) {
        self.state.lock().unwrap().faults.insert(op, fault);
    }

    /// Run `hook` on every call, after it is logged and before it is served.
    pub fn on_call(&self, hook: impl Fn(&Call) + Send + Sync + 'static) {
        self.state.lock().unwrap().hook = Some(Arc::new(hook));
    }

    pub fn heal(&self, op: Op) {
        self.state.lock().unwrap().faults.remove(&op);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }
}

impl InstancesService for StubService {
    fn scoped(&self, metro: &str) -> Box<dyn MetroInstances> {
        Box::new(StubMetro {
            metro: metro.to_string(),
            state: Arc::clone(&self.state),
        })
    }
}

struct StubMetro {
    metro: String,
    state: Arc<Mutex<StubState>>,
}

impl StubMetro {
    /// Log the call and return its configured fault, if any.
    fn begin(&self, op: Op, call: Call) -> Option<Fault> {
        let (fault, hook) = {
            let mut inner = self.state.lock().unwrap();
            inner.calls.push(call.clone());
            (inner.faults.get(&op).copied(), inner.hook.clone())
        };
        if let Some(hook) = hook {
            hook(&call);
        }
        fault
    }

    async fn check(&self, ctx: &Context, op: Op, call: Call) -> Result<Option<Fault>> {
        match self.begin(op, call) {
            Some(Fault::Hang) => {
                ctx.run(std::future::pending::<Result<()>>()).await?;
                Err(Fault::Hang.into_error(op))
            }
            Some(Fault::NoIdentity) => Ok(Some(Fault::NoIdentity)),
            Some(fault) => Err(fault.into_error(op)),
            None => Ok(None),
        }
    }

    fn set_state(&self, id: &str, state: RemoteInstanceState) -> Result<()> {
        let mut inner = self.state.lock().unwrap();
        let entry = inner
            .instances
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        entry.state = state;
        Ok(())
    }
}

#[async_trait]
impl MetroInstances for StubMetro {
    fn metro(&self) -> &str {
        &self.metro
    }

    async fn get(&self, ctx: &Context, id: &str) -> Result<InstanceEntry> {
        let call = Call::Get {
            metro: self.metro.clone(),
            id: id.to_string(),
        };
        self.check(ctx, Op::Get, call).await?;
        self.state
            .lock()
            .unwrap()
            .instances
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn create(
        &self,
        ctx: &Context,
        request: &CreateInstanceRequest,
    ) -> Result<InstanceEntry> {
        let call = Call::Create {
            metro: self.metro.clone(),
            request: request.clone(),
        };
        if self.check(ctx, Op::Create, call).await? == Some(Fault::NoIdentity) {
            return Ok(entry("", RemoteInstanceState::Unknown));
        }

        let mut inner = self.state.lock().unwrap();
        inner.next_id += 1;
        let id = format!("inst-{}", inner.next_id);
        let state = if request.autostart {
            RemoteInstanceState::Running
        } else {
            RemoteInstanceState::Stopped
        };
        let created = entry(&id, state);
        inner.instances.insert(id, created.clone());
        Ok(created)
    }

    async fn start(&self, ctx: &Context, id: &str, delay: Duration) -> Result<()> {
        let call = Call::Start {
            metro: self.metro.clone(),
            id: id.to_string(),
            delay,
        };
        self.check(ctx, Op::Start, call).await?;
        self.set_state(id, RemoteInstanceState::Running)
    }

    async fn stop(&self, ctx: &Context, id: &str, delay: Duration, force: bool) -> Result<()> {
        let call = Call::Stop {
            metro: self.metro.clone(),
            id: id.to_string(),
            delay,
            force,
        };
        self.check(ctx, Op::Stop, call).await?;
        self.set_state(id, RemoteInstanceState::Stopped)
    }

    async fn delete(&self, ctx: &Context, id: &str) -> Result<()> {
        let call = Call::Delete {
            metro: self.metro.clone(),
            id: id.to_string(),
        };
        self.check(ctx, Op::Delete, call).await?;
        self.state
            .lock()
            .unwrap()
            .instances
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }
}

fn entry(id: &str, state: RemoteInstanceState) -> InstanceEntry {
    InstanceEntry {
        uuid: id.to_string(),
        name: None,
        status: Some("success".to_string()),
        message: None,
        state,
        created_at: "2024-01-01T00:00:00Z".to_string(),
        private_ip: "10.0.0.2".to_string(),
        boot_time_us: 1500,
        service_group: None,
    }
}

/// Provider configs, secrets and usage tracking held in memory.
#[derive(Default)]
pub struct MemoryStores {
    configs: Mutex<BTreeMap<String, ProviderConfig>>,
    secrets: Mutex<BTreeMap<(String, String), BTreeMap<String, Vec<u8>>>>,
    usages: Mutex<BTreeMap<String, BTreeSet<String>>>,
    pub fail_tracking: Mutex<bool>,
}

impl MemoryStores {
    /// Stores holding a `default` provider config backed by a secret.
    pub fn with_default_config() -> Self {
        let stores = Self::default();
        stores.put_config(ProviderConfig {
            name: "default".to_string(),
            credentials: ProviderCredentials {
                source: CredentialsSource::Secret,
                secret_ref: Some(SecretKeySelector {
                    namespace: "ukc-system".to_string(),
                    name: "kraftcloud".to_string(),
                    key: "token".to_string(),
                }),
                env: None,
                fs: None,
                inline: None,
            },
        });
        stores.put_secret("ukc-system", "kraftcloud", "token", TOKEN.as_bytes());
        stores
    }

    pub fn put_config(&self, config: ProviderConfig) {
        self.configs
            .lock()
            .unwrap()
            .insert(config.name.clone(), config);
    }

    pub fn put_secret(&self, namespace: &str, name: &str, key: &str, value: &[u8]) {
        self.secrets
            .lock()
            .unwrap()
            .entry((namespace.to_string(), name.to_string()))
            .or_default()
            .insert(key.to_string(), value.to_vec());
    }

    pub fn usages(&self, config: &str) -> Vec<String> {
        self.usages
            .lock()
            .unwrap()
            .get(config)
            .map(|resources| resources.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProviderConfigStore for MemoryStores {
    async fn get_provider_config(
        &self,
        _ctx: &Context,
        name: &str,
    ) -> Result<Option<ProviderConfig>> {
        Ok(self.configs.lock().unwrap().get(name).cloned())
    }
}

#[async_trait]
impl SecretStore for MemoryStores {
    async fn get_secret(
        &self,
        _ctx: &Context,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, Vec<u8>>>> {
        Ok(self
            .secrets
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }
}

#[async_trait]
impl UsageTracker for MemoryStores {
    async fn track(&self, _ctx: &Context, config: &str, resource: &str) -> Result<()> {
        if *self.fail_tracking.lock().unwrap() {
            return Err(Error::Transient("usage store unavailable".to_string()));
        }
        self.usages
            .lock()
            .unwrap()
            .entry(config.to_string())
            .or_default()
            .insert(resource.to_string());
        Ok(())
    }
}

/// A factory that hands out `service` for the test token only.
pub fn stub_factory(service: StubService) -> Arc<dyn ServiceFactory> {
    Arc::new(move |token: &[u8]| -> Result<Arc<dyn InstancesService>> {
        if token != TOKEN.as_bytes() {
            return Err(Error::Unauthorized("unexpected token".to_string()));
        }
        Ok(Arc::new(service.clone()))
    })
}

/// Build a connector backed by in-memory stores and the stub service.
pub fn connector(stores: Arc<MemoryStores>, service: StubService) -> Connector {
    Connector::new(stores.clone(), stores.clone(), stores, stub_factory(service))
}

pub fn params(desired_state: InstanceState) -> InstanceParameters {
    InstanceParameters {
        metro: "fra0".to_string(),
        image: "unikraft.io/nginx:latest".to_string(),
        memory: "256Mi".to_string(),
        args: Vec::new(),
        port: 443,
        internal_port: 8080,
        desired_state,
    }
}
