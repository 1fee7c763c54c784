//! Wire types of the instance API.
//!
//! Every response is wrapped in an envelope whose `data` holds a list of
//! entries; single-instance calls use the first entry.

use serde::{Deserialize, Serialize};

use crate::instance::InstanceState;

/// Run state as reported by the instance API.
///
/// Deliberately separate from [`InstanceState`]: the remote vocabulary is
/// larger and only two of its values have a desired-state equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteInstanceState {
    Running,
    Stopped,
    Starting,
    Stopping,
    Draining,
    Standby,
    #[serde(other)]
    Unknown,
}

impl RemoteInstanceState {
    /// The desired state this remote state corresponds to, if any.
    pub fn desired_equivalent(&self) -> Option<InstanceState> {
        match self {
            RemoteInstanceState::Running => Some(InstanceState::Running),
            RemoteInstanceState::Stopped => Some(InstanceState::Stopped),
            RemoteInstanceState::Starting
            | RemoteInstanceState::Stopping
            | RemoteInstanceState::Draining
            | RemoteInstanceState::Standby
            | RemoteInstanceState::Unknown => None,
        }
    }
}

impl std::fmt::Display for RemoteInstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RemoteInstanceState::Running => "running",
            RemoteInstanceState::Stopped => "stopped",
            RemoteInstanceState::Starting => "starting",
            RemoteInstanceState::Stopping => "stopping",
            RemoteInstanceState::Draining => "draining",
            RemoteInstanceState::Standby => "standby",
            RemoteInstanceState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub errors: Vec<ApiErrorDetail>,
    pub data: Option<EntryList<T>>,
}

impl<T> ApiResponse<T> {
    /// Take the first entry, if any.
    pub fn into_first_entry(self) -> Option<T> {
        self.data.and_then(|data| data.entries.into_iter().next())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntryList<T> {
    #[serde(alias = "instances")]
    pub entries: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub message: String,
}

/// One instance as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceEntry {
    /// Opaque identity of the instance.
    #[serde(alias = "id")]
    pub uuid: String,

    #[serde(default)]
    pub name: Option<String>,

    /// Per-entry outcome; `"error"` when the call failed for this entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default = "unknown_state")]
    pub state: RemoteInstanceState,

    #[serde(default)]
    pub created_at: String,

    #[serde(default)]
    pub private_ip: String,

    /// Boot duration in microseconds.
    #[serde(default)]
    pub boot_time_us: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_group: Option<ServiceGroupEntry>,
}

fn unknown_state() -> RemoteInstanceState {
    RemoteInstanceState::Unknown
}

impl InstanceEntry {
    /// Returns true if the API flagged this entry as failed.
    pub fn is_error(&self) -> bool {
        self.status.as_deref() == Some("error")
    }

    /// The fully-qualified domain name of the first domain binding.
    pub fn dns(&self) -> Option<&str> {
        self.service_group
            .as_ref()
            .and_then(|group| group.domains.first())
            .map(|domain| domain.fqdn.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceGroupEntry {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub domains: Vec<DomainEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEntry {
    pub fqdn: String,
}

/// Connection handlers of a published service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handler {
    Http,
    Tls,
}

/// Body of an instance creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInstanceRequest {
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    pub memory_mb: u64,
    pub autostart: bool,
    pub service_group: CreateServiceGroup,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateServiceGroup {
    pub services: Vec<CreateService>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateService {
    pub port: u16,
    pub destination_port: u16,
    pub handlers: Vec<Handler>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct StartRequest {
    pub waittime_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct StopRequest {
    pub drain_timeout_ms: u64,
    pub force: bool,
}
