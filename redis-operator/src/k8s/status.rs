//! Health assessment of a deployment.

use crate::k8s::store::{ChildResource, ResourceStore};
use crate::k8s::topology::{ChildKind, ManagedRef};
use redis_core::crd::{HealthStatus, ObservedStatus};
use redis_core::{Deployment, Role, Topology};

/// The reason reported for topologies whose health can not yet be assessed.
pub const REASON_UNSUPPORTED: &str = "health assessment is not implemented for the Sentinel topology";

/// The outcome of a health assessment.
#[derive(Clone, Debug, PartialEq)]
pub enum Assessment {
    /// Health was observed.
    Observed(ObservedStatus),
    /// Health assessment is not supported for the given topology.
    Unsupported(Topology),
}

impl Assessment {
    /// The status to report for this assessment.
    pub fn into_status(self) -> ObservedStatus {
        match self {
            Self::Observed(status) => status,
            Self::Unsupported(_) => ObservedStatus::new(HealthStatus::Creating, REASON_UNSUPPORTED),
        }
    }
}

/// Assess the health of the given deployment from its live workload state.
pub async fn assess<S>(store: &S, deployment: &Deployment) -> Assessment
where
    S: ResourceStore + ?Sized,
{
    if deployment.topology != Topology::Standalone {
        return Assessment::Unsupported(deployment.topology);
    }
    let workload = ManagedRef::new(deployment, Role::Primary, ChildKind::Workload);
    let status = match store.get(&workload).await {
        Ok(ChildResource::StatefulSet(sts)) => {
            let ready = sts.status.as_ref().and_then(|status| status.ready_replicas).unwrap_or(0);
            if ready == 1 {
                ObservedStatus::healthy()
            } else {
                ObservedStatus::failed(format!("{} of 1 replicas ready", ready))
            }
        }
        Ok(other) => ObservedStatus::failed(format!("expected a StatefulSet for {}, found a {}", workload, other.kind_name())),
        Err(err) => ObservedStatus::failed(err.to_string()),
    };
    Assessment::Observed(status)
}
