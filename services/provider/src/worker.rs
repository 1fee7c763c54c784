//! Poll worker that drives one reconciliation cycle per record per tick.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};
use ukc_reconcile::{Context, Managed, ManagedReconciler, ReconcileOutcome};

use crate::connector::Connector;
use crate::instance::Instance;
use crate::store::InstanceStore;

/// Counters for one pass over all records.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassStats {
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// Runs reconciliation passes on a fixed interval.
pub struct InstanceWorker {
    reconciler: ManagedReconciler<Connector>,
    store: Arc<dyn InstanceStore>,
    interval: Duration,
}

impl InstanceWorker {
    pub fn new(
        reconciler: ManagedReconciler<Connector>,
        store: Arc<dyn InstanceStore>,
        interval: Duration,
    ) -> Self {
        Self {
            reconciler,
            store,
            interval,
        }
    }

    /// Run passes until shutdown is signaled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting instance worker"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let ctx = Context::new(shutdown.clone());
                    let stats = self.run_once(&ctx).await;
                    debug!(?stats, "Reconciliation pass complete");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Instance worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Reconcile every record once. Records are reconciled concurrently,
    /// each with its own sequential cycle.
    pub async fn run_once(&self, ctx: &Context) -> PassStats {
        let instances = match self.store.list_instances().await {
            Ok(instances) => instances,
            Err(e) => {
                error!(error = %e, "Failed to list instance records");
                return PassStats::default();
            }
        };

        let results = join_all(
            instances
                .into_iter()
                .map(|instance| self.reconcile_one(ctx, instance)),
        )
        .await;

        let mut stats = PassStats::default();
        for result in results {
            stats.processed += 1;
            match result {
                Some(ReconcileOutcome::Created) => stats.created += 1,
                Some(ReconcileOutcome::Updated) => stats.updated += 1,
                Some(ReconcileOutcome::Deleted) | Some(ReconcileOutcome::Released) => {
                    stats.deleted += 1
                }
                Some(ReconcileOutcome::UpToDate) => {}
                None => stats.failed += 1,
            }
        }

        if stats.created > 0 || stats.updated > 0 || stats.deleted > 0 || stats.failed > 0 {
            info!(
                processed = stats.processed,
                created = stats.created,
                updated = stats.updated,
                deleted = stats.deleted,
                failed = stats.failed,
                "Reconciliation pass complete"
            );
        }

        stats
    }

    /// Run one cycle and persist its result. Returns `None` on failure.
    async fn reconcile_one(&self, ctx: &Context, mut instance: Instance) -> Option<ReconcileOutcome> {
        let name = instance.metadata.name.clone();
        let result = self.reconciler.reconcile(ctx, &mut instance).await;

        let persisted = match &result {
            Err(e) if e.is_cancelled() => return None,
            Ok(outcome) if outcome.is_released() => self.store.remove_instance(&name).await,
            _ => self.write_back(&instance).await,
        };
        if let Err(e) = persisted {
            // Without a stored identity the next pass would create again.
            if matches!(result, Ok(ReconcileOutcome::Created)) {
                error!(
                    instance = %name,
                    external_name = ?instance.external_name(),
                    error = %e,
                    "Failed to persist identity of created instance"
                );
                return None;
            }
            warn!(instance = %name, error = %e, "Failed to persist instance record");
        }

        match result {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(instance = %name, error = %e, "Reconciliation failed, will retry next pass");
                None
            }
        }
    }

    /// Copy status and identity onto the latest stored version of the record,
    /// so fields the owner edited during the cycle are kept.
    async fn write_back(&self, reconciled: &Instance) -> anyhow::Result<()> {
        let name = &reconciled.metadata.name;
        let Some(mut current) = self.store.get_instance(name).await? else {
            debug!(instance = %name, "Record removed during the pass, dropping status");
            return Ok(());
        };

        current.status = reconciled.status.clone();
        if let Some(external_name) = reconciled.external_name() {
            current.set_external_name(external_name);
        }
        self.store.save_instance(&current).await
    }
}
