//! The instance record: desired parameters, observed status and identity.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ukc_reconcile::{set_condition, Condition, DeletionPolicy, Managed};
use validator::{Validate, ValidationError};

use crate::api::RemoteInstanceState;
use crate::quantity;

/// Annotation holding the identity assigned by the remote API.
pub const EXTERNAL_NAME_ANNOTATION: &str = "ukc.io/external-name";

/// Desired run state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Running,
    Stopped,
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceState::Running => write!(f, "running"),
            InstanceState::Stopped => write!(f, "stopped"),
        }
    }
}

/// The configurable fields of an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InstanceParameters {
    /// Region the instance lives in. Every API call is routed through it.
    #[validate(length(min = 1, message = "metro must not be empty"))]
    pub metro: String,

    #[validate(length(min = 1, message = "image must not be empty"))]
    pub image: String,

    /// Memory request, e.g. `256Mi`.
    #[validate(custom(function = "validate_memory"))]
    pub memory: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Public port of the service binding.
    #[validate(range(min = 1, message = "port must be between 1 and 65535"))]
    pub port: u16,

    /// Port the instance listens on.
    #[validate(range(min = 1, message = "internalPort must be between 1 and 65535"))]
    pub internal_port: u16,

    pub desired_state: InstanceState,
}

fn validate_memory(memory: &str) -> Result<(), ValidationError> {
    quantity::parse_bytes(memory).map(|_| ()).map_err(|e| {
        let mut error = ValidationError::new("memory");
        error.message = Some(e.to_string().into());
        error
    })
}

/// The observable fields of an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceObservation {
    /// Time the instance took to boot.
    #[serde(with = "duration_micros", default)]
    pub boot_time: Duration,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<String>,

    #[serde(default)]
    pub created_at: String,

    #[serde(default, rename = "privateIP")]
    pub private_ip: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<RemoteInstanceState>,
}

/// Reference to the provider config holding the API credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfigReference {
    pub name: String,
}

impl Default for ProviderConfigReference {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSpec {
    pub for_provider: InstanceParameters,

    #[serde(default)]
    pub provider_config_ref: ProviderConfigReference,

    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default)]
    pub at_provider: InstanceObservation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Set by the owner to request deletion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_requested_at: Option<DateTime<Utc>>,
}

/// A declarative instance record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub metadata: ObjectMeta,
    pub spec: InstanceSpec,
    #[serde(default)]
    pub status: InstanceStatus,
}

impl Instance {
    /// Create a record with no identity and empty status.
    pub fn new(name: impl Into<String>, params: InstanceParameters) -> Self {
        Self {
            metadata: ObjectMeta {
                name: name.into(),
                ..Default::default()
            },
            spec: InstanceSpec {
                for_provider: params,
                provider_config_ref: ProviderConfigReference::default(),
                deletion_policy: DeletionPolicy::default(),
            },
            status: InstanceStatus::default(),
        }
    }

    pub fn params(&self) -> &InstanceParameters {
        &self.spec.for_provider
    }

    pub fn metro(&self) -> &str {
        &self.spec.for_provider.metro
    }

    /// Mark the record for deletion.
    pub fn request_deletion(&mut self) {
        if self.metadata.deletion_requested_at.is_none() {
            self.metadata.deletion_requested_at = Some(Utc::now());
        }
    }
}

impl Managed for Instance {
    fn key(&self) -> String {
        format!("instance/{}", self.metadata.name)
    }

    fn external_name(&self) -> Option<&str> {
        self.metadata
            .annotations
            .get(EXTERNAL_NAME_ANNOTATION)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    fn set_external_name(&mut self, name: &str) {
        self.metadata
            .annotations
            .insert(EXTERNAL_NAME_ANNOTATION.to_string(), name.to_string());
    }

    fn set_conditions(&mut self, condition: Condition) {
        set_condition(&mut self.status.conditions, condition);
    }

    fn is_deletion_requested(&self) -> bool {
        self.metadata.deletion_requested_at.is_some()
    }

    fn deletion_policy(&self) -> DeletionPolicy {
        self.spec.deletion_policy
    }
}

/// Serialize a duration as whole microseconds.
mod duration_micros {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_micros()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_micros(u64::deserialize(deserializer)?))
    }
}
