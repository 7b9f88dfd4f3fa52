//! The topology-neutral deployment model.
//!
//! Both CRDs are converted into a `Deployment` before reconciliation, so that a single engine
//! drives every topology.

use std::convert::TryFrom;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;

use crate::crd::{RedisSentinel, RedisStandalone, RequiredMetadata, RoleSpec};
use crate::error::{ReconcileError, ReconcileResult};

/// The shape of a Redis deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topology {
    /// A single Redis instance.
    Standalone,
    /// Redis replicas supervised by a Sentinel quorum.
    Sentinel,
}

impl Topology {
    /// The roles present in this topology, in reconciliation order.
    pub fn roles(&self) -> &'static [Role] {
        match self {
            Self::Standalone => &[Role::Primary],
            Self::Sentinel => &[Role::Primary, Role::Watchdog],
        }
    }

    /// The CRD kind which declares this topology.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Standalone => "RedisStandalone",
            Self::Sentinel => "RedisSentinel",
        }
    }
}

impl std::fmt::Display for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Standalone => "Standalone",
            Self::Sentinel => "Sentinel",
        })
    }
}

/// A role within a deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    /// The Redis data store.
    Primary,
    /// The Sentinel failover watchdog.
    Watchdog,
}

impl Role {
    /// The value of the `identity` label stamped onto this role's objects.
    pub fn identity(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Watchdog => "watchdog",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.identity())
    }
}

/// A validated desired-state record.
#[derive(Clone, Debug, PartialEq)]
pub struct Deployment {
    /// The name of the owning CR; all child names derive from it.
    pub name: String,
    /// The namespace of the owning CR and all of its children.
    pub namespace: String,
    pub topology: Topology,
    pub primary: RoleSpec,
    /// Present iff the topology is `Sentinel`.
    pub watchdog: Option<RoleSpec>,
    /// The controller owner reference stamped onto every child.
    pub owner: OwnerReference,
}

impl Deployment {
    /// The spec of the given role, if the role is part of this deployment.
    pub fn role(&self, role: Role) -> Option<&RoleSpec> {
        match role {
            Role::Primary => Some(&self.primary),
            Role::Watchdog => self.watchdog.as_ref(),
        }
    }

    /// The spec of the given role, else a render error.
    pub fn must_role(&self, role: Role) -> ReconcileResult<&RoleSpec> {
        self.role(role)
            .ok_or_else(|| ReconcileError::render(format!("{} topology has no {} role", self.topology, role)))
    }
}

/// Extract the identity & owner reference shared by all CRDs.
fn identity<K>(obj: &K) -> ReconcileResult<(String, String, OwnerReference)>
where
    K: Resource<DynamicType = ()> + RequiredMetadata,
{
    if obj.name().is_empty() {
        return Err(ReconcileError::render("object has no name"));
    }
    if obj.namespace().is_empty() {
        return Err(ReconcileError::render(format!("{} has no namespace", obj.name())));
    }
    let owner = obj
        .controller_owner_ref(&())
        .filter(|owner| !owner.uid.is_empty())
        .ok_or_else(|| ReconcileError::render(format!("{} has no uid, can not build owner reference", obj.name())))?;
    Ok((obj.name().to_string(), obj.namespace().to_string(), owner))
}

impl TryFrom<&RedisStandalone> for Deployment {
    type Error = ReconcileError;

    fn try_from(obj: &RedisStandalone) -> ReconcileResult<Self> {
        let (name, namespace, owner) = identity(obj)?;
        Ok(Self {
            name,
            namespace,
            topology: Topology::Standalone,
            primary: obj.spec.primary(),
            watchdog: None,
            owner,
        })
    }
}

impl TryFrom<&RedisSentinel> for Deployment {
    type Error = ReconcileError;

    fn try_from(obj: &RedisSentinel) -> ReconcileResult<Self> {
        let (name, namespace, owner) = identity(obj)?;
        Ok(Self {
            name,
            namespace,
            topology: Topology::Sentinel,
            primary: obj.spec.redis.clone(),
            watchdog: Some(obj.spec.sentinel.clone()),
            owner,
        })
    }
}
