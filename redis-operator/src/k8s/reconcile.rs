//! The reconciliation loop.
//!
//! A single pass runs `fetch -> ensure -> assess -> persist status`, and always ends in a
//! requeue after the configured delay, unless the desired-state record no longer exists.
//! Failures never escape a pass: they are logged, counted and retried by the next pass.

use std::time::Duration;

use crate::k8s::ensure::ensure;
use crate::k8s::status::assess;
use crate::k8s::store::{DesiredRef, ResourceStore};
use crate::k8s::topology::Labels;
use crate::prom::{METRIC_RECONCILE_PASSES, METRIC_STATUS_WRITES};
use redis_core::crd::ObservedStatus;
use redis_core::ReconcileError;

/// The outcome of a reconciliation pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    /// Run another pass after the given delay.
    Requeue(Duration),
    /// The record no longer exists, stop reconciling it.
    Stop,
}

/// Drives reconciliation passes against a resource store.
pub struct Reconciler<S> {
    store: S,
    requeue_after: Duration,
}

impl<S: ResourceStore> Reconciler<S> {
    /// Create a new instance.
    pub fn new(store: S, requeue_after: Duration) -> Self {
        Self { store, requeue_after }
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn requeue_after(&self) -> Duration {
        self.requeue_after
    }

    /// Execute a single reconciliation pass for the given record.
    #[tracing::instrument(level = "debug", skip(self, target), fields(target = %target))]
    pub async fn reconcile(&self, target: &DesiredRef) -> PassOutcome {
        let kind = target.topology.kind();
        let obj = match self.store.fetch_desired(target).await {
            Ok(obj) => obj,
            Err(err) if err.is_not_found() => {
                tracing::debug!("object no longer exists, stopping reconciliation");
                metrics::counter!(METRIC_RECONCILE_PASSES, "kind" => kind, "outcome" => "stopped").increment(1);
                return PassOutcome::Stop;
            }
            Err(err) => return self.failed(target, "fetch", err),
        };
        let deployment = match obj.deployment() {
            Ok(deployment) => deployment,
            Err(err) => return self.failed(target, "convert", err),
        };

        let labels = Labels::for_deployment(&deployment);
        match ensure(&self.store, &deployment, &labels).await {
            Ok(report) if report.is_noop() => tracing::debug!("all child objects up-to-date"),
            Ok(report) => tracing::debug!(created = report.created.len(), updated = report.updated.len(), "child objects ensured"),
            Err(err) => return self.failed(target, "ensure", err),
        }

        let status = assess(&self.store, &deployment).await.into_status();
        if status_changed(obj.status(), &status) {
            match self.store.persist_status(target, &status).await {
                Ok(()) => {
                    tracing::debug!(health = %status.health, reason = %status.reason, "status updated");
                    metrics::counter!(METRIC_STATUS_WRITES, "kind" => kind).increment(1);
                }
                Err(err) => tracing::warn!(error = %err, "error persisting status"),
            }
        }

        metrics::counter!(METRIC_RECONCILE_PASSES, "kind" => kind, "outcome" => "ok").increment(1);
        PassOutcome::Requeue(self.requeue_after)
    }

    /// Log & count a failed pass, then requeue.
    fn failed(&self, target: &DesiredRef, stage: &'static str, err: ReconcileError) -> PassOutcome {
        if err.is_retryable() {
            tracing::warn!(error = %err, stage, "reconciliation pass failed, will retry");
        } else {
            tracing::error!(error = %err, stage, retryable = false, "reconciliation pass failed, desired state must be fixed");
        }
        metrics::counter!(METRIC_RECONCILE_PASSES, "kind" => target.topology.kind(), "outcome" => err.class()).increment(1);
        PassOutcome::Requeue(self.requeue_after)
    }
}

/// Check if the given status differs from the last persisted status.
pub fn status_changed(old: Option<&ObservedStatus>, new: &ObservedStatus) -> bool {
    let old = match old {
        Some(old) => old,
        None => return true,
    };
    if old.reason != new.reason {
        return true;
    }
    match (serde_json::to_vec(&old.health), serde_json::to_vec(&new.health)) {
        (Ok(old), Ok(new)) => old != new,
        _ => true,
    }
}
