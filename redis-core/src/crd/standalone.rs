//! RedisStandalone CRD.
//!
//! The code here is used to generate the actual CRD used in K8s. See examples/crd.rs.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ResourceRequirements;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{ObservedStatus, RedisStorage, RoleSpec};

pub type RedisStandalone = RedisStandaloneCRD; // Mostly to resolve a Rust Analyzer issue.

/// CRD spec for the RedisStandalone resource.
///
/// A standalone deployment runs exactly one Redis replica.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, CustomResource, JsonSchema)]
#[kube(
    root = "RedisStandaloneCRD",
    status = "ObservedStatus",
    group = "redis.my.domain",
    version = "v1",
    kind = "RedisStandalone",
    namespaced,
    derive = "PartialEq",
    shortname = "rstandalone",
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.image"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.standaloneStatus"}"#,
    printcolumn = r#"{"name":"Reason","type":"string","jsonPath":".status.reason"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RedisStandaloneSpec {
    /// A display name for this deployment.
    ///
    /// Child object names are derived from the object's metadata name, not from this field.
    #[serde(default)]
    pub name: String,
    /// The Redis image to run.
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<RedisStorage>,
    /// Free-form Redis configuration.
    #[serde(default)]
    pub configuration: BTreeMap<String, String>,
}

impl RedisStandaloneSpec {
    /// The primary role spec of this deployment, pinned to a single replica.
    pub fn primary(&self) -> RoleSpec {
        RoleSpec {
            replicas: 1,
            image: self.image.clone(),
            image_pull_policy: self.image_pull_policy.clone(),
            resources: self.resources.clone(),
            storage: self.storage.clone(),
            configuration: self.configuration.clone(),
        }
    }
}
