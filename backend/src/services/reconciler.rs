//! Periodic ledger reconciliation
//!
//! Rebuilds balances from movements for the configured tenants so that any
//! drift between the ledger and stored balances surfaces in the logs.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::InventoryService;

/// Handle to stop a running reconciler and wait for it
#[derive(Debug)]
pub struct ReconcilerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl ReconcilerHandle {
    /// Request shutdown and wait for the current pass to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.join.await {
            tracing::warn!("Reconciler task ended abnormally: {}", e);
        }
    }
}

/// Background reconciliation worker
pub struct Reconciler;

impl Reconciler {
    /// Spawn the worker. Returns `None` when the interval is zero or there
    /// is no tenant to reconcile.
    pub fn spawn(
        service: InventoryService,
        tenants: Vec<Uuid>,
        interval: Duration,
    ) -> Option<ReconcilerHandle> {
        if interval.is_zero() || tenants.is_empty() {
            tracing::info!("Reconciliation worker disabled");
            return None;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(run(service, tenants, interval, shutdown_rx));

        Some(ReconcilerHandle {
            shutdown: shutdown_tx,
            join,
        })
    }
}

async fn run(
    service: InventoryService,
    tenants: Vec<Uuid>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(
        "Reconciliation worker started: {} tenants every {}s",
        tenants.len(),
        interval.as_secs()
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                reconcile_all(&service, &tenants).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!("Reconciliation worker stopped");
}

/// One pass over every tenant. Failures are logged and the pass moves on.
pub async fn reconcile_all(service: &InventoryService, tenants: &[Uuid]) -> usize {
    let mut mismatched = 0;
    for tenant_id in tenants {
        match service.reconcile(*tenant_id).await {
            Ok(report) => mismatched += report.discrepancies.len(),
            Err(e) => tracing::error!(tenant_id = %tenant_id, "Reconciliation failed: {}", e),
        }
    }
    mismatched
}
