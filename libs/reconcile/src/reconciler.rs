//! The single-cycle managed reconciler.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::condition::Condition;
use crate::context::Context;
use crate::error::{CancelAware, Phase, ReconcileError};
use crate::event::{Event, EventReason, EventRecorder, TracingRecorder};
use crate::managed::{DeletionPolicy, ExternalClient, ExternalConnector, Managed, ResourceState};

/// What a completed cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// External resource already matched the record.
    UpToDate,
    /// External resource was created.
    Created,
    /// External resource was updated.
    Updated,
    /// External resource was deleted; the record may now be removed.
    Deleted,
    /// Record is being deleted and nothing remote is left to delete.
    Released,
}

impl ReconcileOutcome {
    /// Returns true if the owner may drop the record.
    pub fn is_released(&self) -> bool {
        matches!(self, Self::Deleted | Self::Released)
    }
}

/// Runs one convergence cycle: connect, observe, then act.
pub struct ManagedReconciler<C> {
    connector: C,
    recorder: Arc<dyn EventRecorder>,
}

impl<C> ManagedReconciler<C> {
    /// Create a reconciler that records events to tracing.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            recorder: Arc::new(TracingRecorder),
        }
    }

    /// Use a different event recorder.
    pub fn with_recorder(mut self, recorder: Arc<dyn EventRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    /// Reconcile a single record.
    ///
    /// Errors are surfaced to the caller; nothing is retried within a cycle.
    #[instrument(skip_all, fields(resource = %resource.key()))]
    pub async fn reconcile<R>(
        &self,
        ctx: &Context,
        resource: &mut R,
    ) -> Result<ReconcileOutcome, ReconcileError>
    where
        R: Managed + 'static,
        C: ExternalConnector<R>,
    {
        let client = match self.connector.connect(ctx, resource).await {
            Ok(client) => client,
            Err(e) => {
                return Err(self.fail(resource, Phase::Connect, EventReason::CannotConnectToProvider, e))
            }
        };

        let observation = match client.observe(ctx, resource).await {
            Ok(observation) => observation,
            Err(e) => {
                return Err(self.fail(
                    resource,
                    Phase::Observe,
                    EventReason::CannotObserveExternalResource,
                    e,
                ))
            }
        };
        debug!(state = ?observation.state(), "Observed external resource");

        if resource.is_deletion_requested() {
            if resource.deletion_policy() == DeletionPolicy::Orphan || !observation.resource_exists
            {
                debug!(
                    policy = ?resource.deletion_policy(),
                    exists = observation.resource_exists,
                    "Nothing to delete, releasing record"
                );
                resource.set_conditions(Condition::reconcile_success());
                self.recorder.record(
                    &resource.key(),
                    Event::normal(
                        EventReason::ReleasedExternalResource,
                        "External resource released",
                    ),
                );
                return Ok(ReconcileOutcome::Released);
            }

            if let Err(e) = client.delete(ctx, resource).await {
                return Err(self.fail(
                    resource,
                    Phase::Delete,
                    EventReason::CannotDeleteExternalResource,
                    e,
                ));
            }
            return Ok(self.succeed(
                resource,
                ReconcileOutcome::Deleted,
                EventReason::DeletedExternalResource,
                "Successfully requested deletion of external resource",
            ));
        }

        match observation.state() {
            ResourceState::Absent => {
                if let Err(e) = client.create(ctx, resource).await {
                    return Err(self.fail(
                        resource,
                        Phase::Create,
                        EventReason::CannotCreateExternalResource,
                        e,
                    ));
                }
                Ok(self.succeed(
                    resource,
                    ReconcileOutcome::Created,
                    EventReason::CreatedExternalResource,
                    "Successfully requested creation of external resource",
                ))
            }
            ResourceState::Stale => {
                if let Err(e) = client.update(ctx, resource).await {
                    return Err(self.fail(
                        resource,
                        Phase::Update,
                        EventReason::CannotUpdateExternalResource,
                        e,
                    ));
                }
                Ok(self.succeed(
                    resource,
                    ReconcileOutcome::Updated,
                    EventReason::UpdatedExternalResource,
                    "Successfully requested update of external resource",
                ))
            }
            ResourceState::Current => {
                resource.set_conditions(Condition::reconcile_success());
                debug!("External resource is up to date");
                Ok(ReconcileOutcome::UpToDate)
            }
        }
    }

    fn succeed<R: Managed>(
        &self,
        resource: &mut R,
        outcome: ReconcileOutcome,
        reason: EventReason,
        message: &str,
    ) -> ReconcileOutcome {
        resource.set_conditions(Condition::reconcile_success());
        info!(outcome = ?outcome, "Reconciled external resource");
        self.recorder
            .record(&resource.key(), Event::normal(reason, message));
        outcome
    }

    fn fail<R, E>(
        &self,
        resource: &mut R,
        phase: Phase,
        reason: EventReason,
        err: E,
    ) -> ReconcileError
    where
        R: Managed,
        E: std::error::Error + CancelAware + Send + Sync + 'static,
    {
        let err = phase.wrap(err);
        if err.is_cancelled() {
            debug!(phase = %phase, "Reconciliation cancelled");
            return err;
        }

        let message = err.to_string();
        warn!(phase = %phase, error = %message, "Reconciliation failed");
        self.recorder
            .record(&resource.key(), Event::warning(reason, message.clone()));
        resource.set_conditions(Condition::reconcile_error(message));
        err
    }
}
