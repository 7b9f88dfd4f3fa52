//! RedisSentinel CRD.
//!
//! The code here is used to generate the actual CRD used in K8s. See examples/crd.rs.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{ObservedStatus, RoleSpec};

pub type RedisSentinel = RedisSentinelCRD; // Mostly to resolve a Rust Analyzer issue.

/// CRD spec for the RedisSentinel resource.
///
/// A Sentinel deployment runs a set of Redis replicas alongside an independently scaled set of
/// Sentinel processes which supervise failover. The failover protocol itself runs entirely
/// within the Sentinel pods.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, CustomResource, JsonSchema)]
#[kube(
    root = "RedisSentinelCRD",
    status = "ObservedStatus",
    group = "redis.my.domain",
    version = "v1",
    kind = "RedisSentinel",
    namespaced,
    derive = "PartialEq",
    shortname = "rsentinel",
    printcolumn = r#"{"name":"Redis Replicas","type":"number","jsonPath":".spec.redis.replicas"}"#,
    printcolumn = r#"{"name":"Sentinel Replicas","type":"number","jsonPath":".spec.sentinel.replicas"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.standaloneStatus"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RedisSentinelSpec {
    /// A display name for this deployment.
    #[serde(default)]
    pub name: String,
    /// The Redis data role.
    pub redis: RoleSpec,
    /// The Sentinel watchdog role.
    pub sentinel: RoleSpec,
}
