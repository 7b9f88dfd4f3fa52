//! Prometheus metrics of the operator.

/// Reconciliation passes, labelled by CRD `kind` & pass `outcome`.
pub const METRIC_RECONCILE_PASSES: &str = "redis_operator_reconcile_passes_total";
/// Child object writes, labelled by K8s `kind` & `op` (create or update).
pub const METRIC_CHILD_WRITES: &str = "redis_operator_child_writes_total";
/// Status writes, labelled by CRD `kind`.
pub const METRIC_STATUS_WRITES: &str = "redis_operator_status_writes_total";

/// Register the descriptions of all metrics with the installed recorder.
pub fn describe_metrics() {
    metrics::describe_counter!(METRIC_RECONCILE_PASSES, "reconciliation passes by CRD kind and outcome");
    metrics::describe_counter!(METRIC_CHILD_WRITES, "child object creates and updates by object kind");
    metrics::describe_counter!(METRIC_STATUS_WRITES, "status writes by CRD kind");
}
