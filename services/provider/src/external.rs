//! External client: observe, create, update and delete one remote instance.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};
use ukc_reconcile::{Condition, Context, ExternalClient, ExternalObservation, Managed};
use validator::Validate;

use crate::api::{CreateInstanceRequest, CreateService, CreateServiceGroup, Handler};
use crate::drift::{self, Transition};
use crate::error::{Error, Result, TransitionAction};
use crate::instance::{Instance, InstanceObservation, InstanceParameters, InstanceState};
use crate::quantity;
use crate::service::InstancesService;

/// How Observe treats a failed fetch.
///
/// A fetch can fail because the instance is gone or because the API is
/// unreachable. `TreatAsAbsent` cannot tell the two apart, so a flaky API can
/// make the next step a create attempt. Records being deleted always
/// propagate errors other than not-found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchErrorPolicy {
    /// Any fetch error means the instance does not exist.
    #[default]
    TreatAsAbsent,
    /// Only "not found" means the instance does not exist; other errors
    /// fail the cycle.
    PropagateTransient,
}

impl FromStr for FetchErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "absent" => Ok(Self::TreatAsAbsent),
            "propagate" => Ok(Self::PropagateTransient),
            other => Err(format!(
                "unknown fetch error policy '{}' (expected 'absent' or 'propagate')",
                other
            )),
        }
    }
}

/// External client for instance records.
pub struct InstanceClient {
    service: Arc<dyn InstancesService>,
    fetch_error_policy: FetchErrorPolicy,
}

impl InstanceClient {
    pub fn new(service: Arc<dyn InstancesService>) -> Self {
        Self {
            service,
            fetch_error_policy: FetchErrorPolicy::default(),
        }
    }

    pub fn with_fetch_error_policy(mut self, policy: FetchErrorPolicy) -> Self {
        self.fetch_error_policy = policy;
        self
    }
}

/// Build the creation request for a record's parameters.
pub fn creation_request(params: &InstanceParameters) -> Result<CreateInstanceRequest> {
    params
        .validate()
        .map_err(|e| Error::Validation(e.to_string()))?;

    let memory_mb = quantity::memory_megabytes(&params.memory)
        .map_err(|e| Error::Validation(format!("failed to parse memory quantity: {}", e)))?;

    Ok(CreateInstanceRequest {
        image: params.image.clone(),
        args: params.args.clone(),
        memory_mb,
        // Instances desired as stopped are created without booting.
        autostart: params.desired_state == InstanceState::Running,
        service_group: CreateServiceGroup {
            services: vec![CreateService {
                port: params.port,
                destination_port: params.internal_port,
                handlers: vec![Handler::Http, Handler::Tls],
            }],
        },
    })
}

#[async_trait]
impl ExternalClient<Instance> for InstanceClient {
    type Error = Error;

    async fn observe(&self, ctx: &Context, instance: &mut Instance) -> Result<ExternalObservation> {
        let Some(id) = instance.external_name().map(str::to_owned) else {
            debug!("Instance has no external name yet");
            return Ok(ExternalObservation::absent());
        };
        let metro = instance.metro().to_owned();

        let entry = match self.service.scoped(&metro).get(ctx, &id).await {
            Ok(entry) => entry,
            Err(Error::Cancelled(c)) => return Err(c.into()),
            Err(e) if e.is_not_found() => {
                debug!(external_name = %id, metro = %metro, "Instance not found");
                return Ok(ExternalObservation::absent());
            }
            // Absent releases a record being deleted, so only a confirmed
            // not-found may do that.
            Err(e)
                if self.fetch_error_policy == FetchErrorPolicy::TreatAsAbsent
                    && !instance.is_deletion_requested() =>
            {
                debug!(external_name = %id, metro = %metro, error = %e, "Fetch failed, treating instance as absent");
                return Ok(ExternalObservation::absent());
            }
            Err(e) => return Err(e),
        };

        instance.status.at_provider = InstanceObservation {
            boot_time: Duration::from_micros(entry.boot_time_us),
            dns: entry.dns().map(str::to_owned),
            created_at: entry.created_at.clone(),
            private_ip: entry.private_ip.clone(),
            state: Some(entry.state),
        };
        instance.set_conditions(Condition::available());

        let desired = instance.params().desired_state;
        let up_to_date = drift::is_up_to_date(entry.state, desired);
        debug!(
            external_name = %id,
            observed = %entry.state,
            desired = %desired,
            up_to_date,
            "Observed instance"
        );
        Ok(ExternalObservation::present(up_to_date))
    }

    async fn create(&self, ctx: &Context, instance: &mut Instance) -> Result<()> {
        let request = creation_request(instance.params())?;
        let metro = instance.metro().to_owned();

        let entry = self.service.scoped(&metro).create(ctx, &request).await?;
        if entry.uuid.is_empty() {
            return Err(Error::Transient(
                "created instance has no identity".to_string(),
            ));
        }

        instance.set_conditions(Condition::creating());
        instance.set_external_name(&entry.uuid);

        info!(
            external_name = %entry.uuid,
            metro = %metro,
            memory_mb = request.memory_mb,
            autostart = request.autostart,
            "Created instance"
        );
        Ok(())
    }

    async fn update(&self, ctx: &Context, instance: &mut Instance) -> Result<()> {
        let id = instance
            .external_name()
            .map(str::to_owned)
            .ok_or_else(|| Error::NotFound("instance has no external name".to_string()))?;
        let desired = instance.params().desired_state;
        let instances = self.service.scoped(instance.metro());

        // Running state is the only mutable property of an instance.
        let entry = instances.get(ctx, &id).await?;

        match drift::transition(entry.state, desired) {
            Some(Transition::Stop) => {
                instances
                    .stop(ctx, &id, Duration::ZERO, false)
                    .await
                    .map_err(|e| Error::transition(TransitionAction::Stop, e))?;
                info!(external_name = %id, "Stopped instance");
            }
            Some(Transition::Start) => {
                instances
                    .start(ctx, &id, Duration::ZERO)
                    .await
                    .map_err(|e| Error::transition(TransitionAction::Start, e))?;
                info!(external_name = %id, "Started instance");
            }
            None => {
                debug!(
                    external_name = %id,
                    observed = %entry.state,
                    desired = %desired,
                    "No transition for observed state"
                );
            }
        }

        Ok(())
    }

    async fn delete(&self, ctx: &Context, instance: &mut Instance) -> Result<()> {
        let Some(id) = instance.external_name().map(str::to_owned) else {
            return Ok(());
        };

        self.service
            .scoped(instance.metro())
            .delete(ctx, &id)
            .await
            .map_err(|e| Error::transition(TransitionAction::Delete, e))?;

        instance.set_conditions(Condition::deleting());
        info!(external_name = %id, "Deleted instance");
        Ok(())
    }
}
