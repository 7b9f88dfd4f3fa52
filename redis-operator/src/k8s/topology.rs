//! Topology descriptors, child naming & labels.
//!
//! Every child object of a deployment is addressed by a `ManagedRef`, which is derived purely
//! from the deployment's name, the role and the kind of the child. These names are relied upon
//! by existing deployments and must not change.

use std::collections::BTreeMap;

use redis_core::{Deployment, Role, Topology, LABEL_MANAGED_BY, OPERATOR_NAME};

/// The label identifying the deployment to which an object belongs.
pub const LABEL_INSTANCE: &str = "instance";
/// The label identifying the role to which an object belongs.
pub const LABEL_IDENTITY: &str = "identity";

/// The kinds of child objects managed for a deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChildKind {
    /// A ConfigMap holding a role's configuration file.
    Config,
    /// A StatefulSet running a role's pods.
    Workload,
    /// A headless Service addressing a role's pods individually.
    HeadlessEndpoint,
    /// A NodePort Service exposing the primary role outside of the cluster.
    ExternalEndpoint,
}

impl ChildKind {
    /// All kinds, in declaration order.
    pub const ALL: [ChildKind; 4] = [Self::Config, Self::Workload, Self::HeadlessEndpoint, Self::ExternalEndpoint];

    /// The kinds which must be ensured before this kind.
    pub fn depends_on(&self) -> &'static [ChildKind] {
        match self {
            Self::Config => &[],
            Self::Workload => &[Self::Config],
            Self::HeadlessEndpoint | Self::ExternalEndpoint => &[Self::Workload],
        }
    }

    /// Check if this kind of child exists for the given role.
    pub fn applies_to(&self, role: Role) -> bool {
        match self {
            Self::ExternalEndpoint => role == Role::Primary,
            _ => true,
        }
    }

    /// Check if existing objects of this kind are diffed & updated.
    ///
    /// Endpoints are create-once: after creation they are never updated, even when the
    /// rendered shape changes.
    pub fn is_diffable(&self) -> bool {
        matches!(self, Self::Config | Self::Workload)
    }

    /// The K8s kind backing this child kind.
    pub fn api_kind(&self) -> &'static str {
        match self {
            Self::Config => "ConfigMap",
            Self::Workload => "StatefulSet",
            Self::HeadlessEndpoint | Self::ExternalEndpoint => "Service",
        }
    }
}

impl std::fmt::Display for ChildKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Config => "config",
            Self::Workload => "workload",
            Self::HeadlessEndpoint => "headless-endpoint",
            Self::ExternalEndpoint => "external-endpoint",
        })
    }
}

/// The order in which child kinds are ensured.
///
/// Each kind is placed as soon as all of the kinds it depends upon are placed, ties are broken
/// by declaration order.
pub fn ensure_order() -> Vec<ChildKind> {
    let mut order: Vec<ChildKind> = Vec::with_capacity(ChildKind::ALL.len());
    while let Some(kind) = ChildKind::ALL
        .into_iter()
        .find(|kind| !order.contains(kind) && kind.depends_on().iter().all(|dep| order.contains(dep)))
    {
        order.push(kind);
    }
    order
}

/// A single step of an ensure pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Step {
    pub kind: ChildKind,
    pub role: Role,
}

/// Build the ordered list of ensure steps for the given topology.
///
/// Kinds follow `ensure_order`; within a kind, roles follow the topology's role order.
pub fn plan(topology: Topology) -> Vec<Step> {
    ensure_order()
        .into_iter()
        .flat_map(|kind| {
            topology
                .roles()
                .iter()
                .filter(move |role| kind.applies_to(**role))
                .map(move |role| Step { kind, role: *role })
        })
        .collect()
}

/// The deterministic identity of a managed child object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManagedRef {
    pub kind: ChildKind,
    pub role: Role,
    pub namespace: String,
    pub name: String,
}

impl ManagedRef {
    /// Build the identity of the given role's child of the given kind.
    pub fn new(deployment: &Deployment, role: Role, kind: ChildKind) -> Self {
        Self {
            kind,
            role,
            namespace: deployment.namespace.clone(),
            name: child_name(&deployment.name, deployment.topology, role, kind),
        }
    }
}

impl std::fmt::Display for ManagedRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}/{}", self.kind.api_kind(), self.namespace, self.name)
    }
}

/// Derive the name of a child object.
pub fn child_name(name: &str, topology: Topology, role: Role, kind: ChildKind) -> String {
    match (kind, role) {
        (ChildKind::Config, Role::Primary) => format!("{}-redis-configmap", name),
        (ChildKind::Config, Role::Watchdog) => format!("{}-sentinel-configmap", name),
        (ChildKind::Workload | ChildKind::HeadlessEndpoint, Role::Primary) => name.to_string(),
        (ChildKind::Workload | ChildKind::HeadlessEndpoint, Role::Watchdog) => format!("{}-sen", name),
        (ChildKind::ExternalEndpoint, _) => match topology {
            Topology::Sentinel => format!("{}-master", name),
            Topology::Standalone => format!("{}-nodeport", name),
        },
    }
}

/// An immutable set of labels.
///
/// Role specific labels are produced as new values via `for_role`, the receiver is never
/// modified, so labels rendered for one role can not leak into another role's objects.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Labels(BTreeMap<String, String>);

impl Labels {
    /// The base labels of the given deployment.
    pub fn for_deployment(deployment: &Deployment) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(LABEL_INSTANCE.into(), format!("{}_{}", deployment.namespace, deployment.name));
        Self(labels)
    }

    /// A copy of these labels stamped with the given role's identity.
    pub fn for_role(&self, role: Role) -> Self {
        let mut labels = self.0.clone();
        labels.insert(LABEL_IDENTITY.into(), role.identity().into());
        Self(labels)
    }

    /// Get the value of the given label.
    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// The labels used for pod selection.
    pub fn selector(&self) -> BTreeMap<String, String> {
        self.0.clone()
    }

    /// The labels stamped onto object metadata, which includes the canonical managed-by label.
    pub fn metadata(&self) -> BTreeMap<String, String> {
        let mut labels = self.0.clone();
        labels.insert(LABEL_MANAGED_BY.into(), OPERATOR_NAME.into());
        labels
    }
}
