//! Ensuring that every child of a deployment exists & matches its rendered form.

use crate::k8s::diff::needs_update;
use crate::k8s::render::render;
use crate::k8s::store::ResourceStore;
use crate::k8s::topology::{plan, Labels, ManagedRef};
use crate::prom::METRIC_CHILD_WRITES;
use redis_core::{Deployment, ReconcileResult};

/// A record of the writes performed by an ensure pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnsureReport {
    pub created: Vec<ManagedRef>,
    pub updated: Vec<ManagedRef>,
    pub unchanged: Vec<ManagedRef>,
}

impl EnsureReport {
    /// Check if the pass performed no writes.
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty()
    }
}

/// Ensure all children of the given deployment, in dependency order.
///
/// Absent children are created, present children are replaced by their rendered form only when
/// they differ from it. The first failure aborts the pass, children already written stand and the
/// next pass resumes from the first step.
#[tracing::instrument(level = "debug", skip(store, deployment, labels), fields(name = %deployment.name, ns = %deployment.namespace))]
pub async fn ensure<S>(store: &S, deployment: &Deployment, labels: &Labels) -> ReconcileResult<EnsureReport>
where
    S: ResourceStore + ?Sized,
{
    let mut report = EnsureReport::default();
    for step in plan(deployment.topology) {
        let child = ManagedRef::new(deployment, step.role, step.kind);
        let live = match store.get(&child).await {
            Ok(live) => live,
            Err(err) if err.is_not_found() => {
                let rendered = render(deployment, step.role, step.kind, labels)?;
                store.create(&rendered).await?;
                tracing::info!(child = %child, "created child object");
                metrics::counter!(METRIC_CHILD_WRITES, "kind" => child.kind.api_kind(), "op" => "create").increment(1);
                report.created.push(child);
                continue;
            }
            Err(err) => return Err(err),
        };

        // Endpoints are create-once.
        if !step.kind.is_diffable() {
            report.unchanged.push(child);
            continue;
        }
        let rendered = render(deployment, step.role, step.kind, labels)?;
        if !needs_update(&live, &rendered) {
            report.unchanged.push(child);
            continue;
        }
        store.update(&rendered.with_resource_version_of(&live)).await?;
        tracing::info!(child = %child, "updated child object");
        metrics::counter!(METRIC_CHILD_WRITES, "kind" => child.kind.api_kind(), "op" => "update").increment(1);
        report.updated.push(child);
    }
    Ok(report)
}
