use std::time::Duration;

use anyhow::{Context, Result};

use super::reconcile::*;
use crate::k8s::fixtures::{self, MemoryStore};
use crate::k8s::status::{assess, Assessment, REASON_UNSUPPORTED};
use crate::k8s::store::DesiredObject;
use redis_core::crd::{HealthStatus, ObservedStatus};
use redis_core::Topology;

const REQUEUE: Duration = Duration::from_secs(10);

fn reconciler() -> Reconciler<MemoryStore> {
    Reconciler::new(MemoryStore::new(), REQUEUE)
}

#[tokio::test]
async fn missing_record_stops_reconciliation() -> Result<()> {
    let reconciler = reconciler();

    let outcome = reconciler.reconcile(&fixtures::standalone_ref("gone")).await;

    assert_eq!(outcome, PassOutcome::Stop);
    assert!(reconciler.store().creates().is_empty(), "expected no children to be created");
    Ok(())
}

#[tokio::test]
async fn standalone_pass_reports_health_and_suppresses_repeats() -> Result<()> {
    let reconciler = reconciler();
    let target = fixtures::standalone_ref("cache");
    reconciler.store().put_desired(DesiredObject::Standalone(fixtures::standalone("cache")));

    let outcome = reconciler.reconcile(&target).await;
    assert_eq!(outcome, PassOutcome::Requeue(REQUEUE));
    assert_eq!(reconciler.store().creates().len(), 4);
    assert_eq!(
        reconciler.store().status_writes(),
        vec![ObservedStatus::failed("0 of 1 replicas ready")],
        "expected a failed status while no replica is ready"
    );

    // Unchanged status is not written again.
    reconciler.store().reset_calls();
    reconciler.reconcile(&target).await;
    assert!(reconciler.store().status_writes().is_empty(), "expected an unchanged status to be suppressed");

    reconciler.store().set_ready_replicas("cache", 1);
    reconciler.reconcile(&target).await;
    assert_eq!(reconciler.store().status_writes(), vec![ObservedStatus::healthy()]);
    let persisted = reconciler.store().desired(&target).context("expected the record to exist")?;
    assert_eq!(persisted.status(), Some(&ObservedStatus::healthy()));
    Ok(())
}

#[tokio::test]
async fn sentinel_reports_explicit_unsupported_health_once() -> Result<()> {
    let reconciler = reconciler();
    let target = fixtures::sentinel_ref("cache");
    reconciler.store().put_desired(DesiredObject::Sentinel(fixtures::sentinel("cache", 3, 3)));

    reconciler.reconcile(&target).await;
    reconciler.reconcile(&target).await;

    let writes = reconciler.store().status_writes();
    assert_eq!(writes.len(), 1, "expected exactly one status write, got {:?}", writes);
    assert_eq!(writes[0].health, HealthStatus::Creating);
    assert_eq!(writes[0].reason, REASON_UNSUPPORTED);
    assert_eq!(reconciler.store().creates().len(), 7);
    Ok(())
}

#[tokio::test]
async fn ensure_failure_requeues_without_status_write() -> Result<()> {
    let reconciler = reconciler();
    let target = fixtures::standalone_ref("cache");
    reconciler.store().put_desired(DesiredObject::Standalone(fixtures::standalone("cache")));
    reconciler.store().fail_get("cache-nodeport", true);

    let outcome = reconciler.reconcile(&target).await;

    assert_eq!(outcome, PassOutcome::Requeue(REQUEUE));
    assert_eq!(reconciler.store().creates().len(), 3, "expected earlier steps to stand");
    assert!(reconciler.store().status_writes().is_empty(), "expected no status write after a failed ensure");
    Ok(())
}

#[tokio::test]
async fn render_error_requeues_without_writes() -> Result<()> {
    let reconciler = reconciler();
    let target = fixtures::standalone_ref("cache");
    let mut obj = fixtures::standalone("cache");
    obj.spec.configuration.insert("bad\nkey".into(), "yes".into());
    reconciler.store().put_desired(DesiredObject::Standalone(obj));

    let outcome = reconciler.reconcile(&target).await;

    assert_eq!(outcome, PassOutcome::Requeue(REQUEUE));
    assert!(reconciler.store().creates().is_empty());
    assert!(reconciler.store().status_writes().is_empty());
    Ok(())
}

#[tokio::test]
async fn store_failures_requeue_with_configured_delay() -> Result<()> {
    let delay = Duration::from_secs(3);
    let reconciler = Reconciler::new(MemoryStore::new(), delay);
    let target = fixtures::standalone_ref("cache");
    reconciler.store().put_desired(DesiredObject::Standalone(fixtures::standalone("cache")));

    reconciler.store().fail_fetch(true);
    assert_eq!(reconciler.reconcile(&target).await, PassOutcome::Requeue(delay));

    // A failed status write does not change the outcome of the pass.
    reconciler.store().fail_fetch(false);
    reconciler.store().fail_status(true);
    assert_eq!(reconciler.reconcile(&target).await, PassOutcome::Requeue(delay));
    assert!(reconciler.store().status_writes().is_empty());
    assert_eq!(reconciler.requeue_after(), delay);
    Ok(())
}

#[tokio::test]
async fn assessment_reports_fetch_errors_as_failed() -> Result<()> {
    let store = MemoryStore::new();
    let deployment = fixtures::standalone_deployment("cache")?;

    let assessment = assess(&store, &deployment).await;

    match assessment {
        Assessment::Observed(status) => {
            assert_eq!(status.health, HealthStatus::Failed);
            assert!(status.reason.contains("not found"), "expected the error text as reason, got {:?}", status.reason);
        }
        other => anyhow::bail!("expected an observed assessment, got {:?}", other),
    }

    let sentinel = fixtures::sentinel_deployment("cache", 3, 3)?;
    assert_eq!(assess(&store, &sentinel).await, Assessment::Unsupported(Topology::Sentinel));
    Ok(())
}

#[test]
fn status_comparison() {
    let healthy = ObservedStatus::healthy();
    assert!(status_changed(None, &healthy), "expected a missing status to be written");
    assert!(!status_changed(Some(&healthy), &ObservedStatus::healthy()));
    assert!(status_changed(Some(&healthy), &ObservedStatus::new(HealthStatus::Failed, "OK")), "expected a health change to be detected");
    assert!(status_changed(Some(&healthy), &ObservedStatus::new(HealthStatus::Healthy, "ok")), "expected a reason change to be detected");
}
