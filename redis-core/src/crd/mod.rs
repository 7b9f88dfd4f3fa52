//! Redis operator CRDs.
//!
//! References:
//! - https://kubernetes.io/docs/tasks/extend-kubernetes/custom-resources/custom-resource-definitions/
//! - https://kubernetes.io/docs/tasks/extend-kubernetes/custom-resources/custom-resource-definitions/#additional-printer-columns

mod sentinel;
mod standalone;

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::Resource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use sentinel::{RedisSentinel, RedisSentinelSpec};
pub use standalone::{RedisStandalone, RedisStandaloneSpec};

/// A convenience trait built around the fact that all implementors
/// must have the following attributes.
pub trait RequiredMetadata {
    /// The namespace of this object.
    fn namespace(&self) -> &str;

    /// The name of this object.
    fn name(&self) -> &str;
}

impl RequiredMetadata for RedisStandalone {
    fn namespace(&self) -> &str {
        self.meta().namespace.as_deref().unwrap_or_default()
    }

    fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or_default()
    }
}

impl RequiredMetadata for RedisSentinel {
    fn namespace(&self) -> &str {
        self.meta().namespace.as_deref().unwrap_or_default()
    }

    fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or_default()
    }
}

/// The spec of a single role of a Redis deployment.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleSpec {
    /// The number of replicas of this role.
    pub replicas: i32,
    /// The container image to use for this role.
    pub image: String,
    /// The image pull policy of this role's container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
    /// Compute resources of this role's container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    /// Persistent storage of this role.
    ///
    /// Only the primary role provisions persistent volume claims.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<RedisStorage>,
    /// Free-form configuration options, rendered one `key value` pair per line.
    #[serde(default)]
    pub configuration: BTreeMap<String, String>,
}

/// Persistent storage spec.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RedisStorage {
    /// The storage class to use for claims. The cluster default is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    /// The requested size of each claim.
    pub size: Quantity,
    /// Retain claims when the deployment is deleted.
    ///
    /// Accepted for compatibility. Claims currently always follow the `Delete` retention policy.
    #[serde(default)]
    pub retain: bool,
}

/// The health of a Redis deployment.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
pub enum HealthStatus {
    /// All expected replicas are ready.
    Healthy,
    /// The deployment is not in a healthy state.
    Failed,
    /// Health has not yet been determined.
    #[default]
    Creating,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Healthy => "Healthy",
                Self::Failed => "Failed",
                Self::Creating => "Creating",
            }
        )
    }
}

/// CRD status object, shared by all Redis CRDs.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
pub struct ObservedStatus {
    /// The observed health.
    #[serde(rename = "standaloneStatus", default)]
    pub health: HealthStatus,
    /// A human readable explanation of the observed health.
    #[serde(default)]
    pub reason: String,
}

impl ObservedStatus {
    /// Create a new instance.
    pub fn new(health: HealthStatus, reason: impl Into<String>) -> Self {
        Self { health, reason: reason.into() }
    }

    /// A healthy status.
    pub fn healthy() -> Self {
        Self::new(HealthStatus::Healthy, "OK")
    }

    /// A failed status with the given reason.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::new(HealthStatus::Failed, reason)
    }
}
