//! The resource store collaborator.
//!
//! The reconciliation engine only ever talks to the cluster through the `ResourceStore` trait,
//! which keeps the engine testable against an in-memory store.

use std::future::Future;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::api::{Api, ObjectMeta, Patch, PatchParams, PostParams};
use kube::client::Client;
use kube::Resource;
use serde_json::json;
use tokio::time::timeout;

use crate::k8s::topology::{ChildKind, ManagedRef};
use redis_core::crd::{ObservedStatus, RedisSentinel, RedisStandalone};
use redis_core::{Deployment, ReconcileError, ReconcileResult, Topology};

/// A typed child object, either rendered or as observed in the cluster.
#[derive(Clone, Debug, PartialEq)]
pub enum ChildResource {
    ConfigMap(ConfigMap),
    StatefulSet(StatefulSet),
    Service(Service),
}

impl ChildResource {
    /// The K8s kind of this object.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::ConfigMap(_) => "ConfigMap",
            Self::StatefulSet(_) => "StatefulSet",
            Self::Service(_) => "Service",
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::ConfigMap(obj) => obj.meta(),
            Self::StatefulSet(obj) => obj.meta(),
            Self::Service(obj) => obj.meta(),
        }
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Self::ConfigMap(obj) => obj.meta_mut(),
            Self::StatefulSet(obj) => obj.meta_mut(),
            Self::Service(obj) => obj.meta_mut(),
        }
    }

    /// Take over the resource version of the given live object.
    ///
    /// Rendered objects never carry one, and a replace must name the revision it replaces.
    pub fn with_resource_version_of(mut self, live: &ChildResource) -> Self {
        self.metadata_mut().resource_version = live.metadata().resource_version.clone();
        self
    }

    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.metadata().namespace.as_deref().unwrap_or_default()
    }
}

/// The identity of a desired-state record.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DesiredRef {
    pub topology: Topology,
    pub namespace: String,
    pub name: String,
}

impl std::fmt::Display for DesiredRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}/{}", self.topology.kind(), self.namespace, self.name)
    }
}

/// A desired-state record as fetched from the store.
#[derive(Clone, Debug, PartialEq)]
pub enum DesiredObject {
    Standalone(RedisStandalone),
    Sentinel(RedisSentinel),
}

impl DesiredObject {
    /// Convert this record into a validated deployment.
    pub fn deployment(&self) -> ReconcileResult<Deployment> {
        match self {
            Self::Standalone(obj) => Deployment::try_from(obj),
            Self::Sentinel(obj) => Deployment::try_from(obj),
        }
    }

    /// The last persisted status of this record.
    pub fn status(&self) -> Option<&ObservedStatus> {
        match self {
            Self::Standalone(obj) => obj.status.as_ref(),
            Self::Sentinel(obj) => obj.status.as_ref(),
        }
    }

    #[cfg(test)]
    pub fn set_status(&mut self, status: ObservedStatus) {
        match self {
            Self::Standalone(obj) => obj.status = Some(status),
            Self::Sentinel(obj) => obj.status = Some(status),
        }
    }
}

/// The operations required from the external resource store.
///
/// Implementations must map absence of an object to `ReconcileError::NotFound`, and every other
/// failure to `ReconcileError::Store`.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch the desired-state record of the given identity.
    async fn fetch_desired(&self, target: &DesiredRef) -> ReconcileResult<DesiredObject>;

    /// Fetch the live child object of the given identity.
    async fn get(&self, child: &ManagedRef) -> ReconcileResult<ChildResource>;

    /// Create the given child object.
    async fn create(&self, child: &ChildResource) -> ReconcileResult<()>;

    /// Replace the given child object as a whole.
    ///
    /// The object carries the resource version of the live object it replaces. Fields absent
    /// from the object are removed, whoever set them.
    async fn update(&self, child: &ChildResource) -> ReconcileResult<()>;

    /// Persist the status of the given desired-state record.
    async fn persist_status(&self, target: &DesiredRef, status: &ObservedStatus) -> ReconcileResult<()>;
}

/// A `ResourceStore` backed by the K8s API.
pub struct KubeStore {
    client: Client,
    api_timeout: Duration,
}

impl KubeStore {
    /// Create a new instance.
    pub fn new(client: Client, api_timeout: Duration) -> Self {
        Self { client, api_timeout }
    }

    /// Execute the given API call under the configured timeout.
    ///
    /// A 404 is mapped onto `NotFound`, all other failures onto `Store`.
    async fn call<T, F>(&self, kind: &'static str, name: &str, fut: F) -> ReconcileResult<T>
    where
        F: Future<Output = Result<T, kube::Error>>,
    {
        match timeout(self.api_timeout, fut).await {
            Ok(Ok(val)) => Ok(val),
            Ok(Err(kube::Error::Api(err))) if err.code == http::StatusCode::NOT_FOUND => Err(ReconcileError::NotFound {
                kind,
                name: name.to_string(),
            }),
            Ok(Err(err)) => Err(ReconcileError::Store(anyhow!(err).context(format!("error calling K8s API for {} {}", kind, name)))),
            Err(_) => Err(ReconcileError::Store(anyhow!("timeout while calling K8s API for {} {}", kind, name))),
        }
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn fetch_desired(&self, target: &DesiredRef) -> ReconcileResult<DesiredObject> {
        let kind = target.topology.kind();
        match target.topology {
            Topology::Standalone => {
                let api: Api<RedisStandalone> = Api::namespaced(self.client.clone(), &target.namespace);
                self.call(kind, &target.name, api.get(&target.name)).await.map(DesiredObject::Standalone)
            }
            Topology::Sentinel => {
                let api: Api<RedisSentinel> = Api::namespaced(self.client.clone(), &target.namespace);
                self.call(kind, &target.name, api.get(&target.name)).await.map(DesiredObject::Sentinel)
            }
        }
    }

    #[tracing::instrument(level = "debug", skip(self, child), fields(child = %child))]
    async fn get(&self, child: &ManagedRef) -> ReconcileResult<ChildResource> {
        let kind = child.kind.api_kind();
        match child.kind {
            ChildKind::Config => {
                let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &child.namespace);
                self.call(kind, &child.name, api.get(&child.name)).await.map(ChildResource::ConfigMap)
            }
            ChildKind::Workload => {
                let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), &child.namespace);
                self.call(kind, &child.name, api.get(&child.name)).await.map(ChildResource::StatefulSet)
            }
            ChildKind::HeadlessEndpoint | ChildKind::ExternalEndpoint => {
                let api: Api<Service> = Api::namespaced(self.client.clone(), &child.namespace);
                self.call(kind, &child.name, api.get(&child.name)).await.map(ChildResource::Service)
            }
        }
    }

    #[tracing::instrument(level = "debug", skip(self, child), fields(kind = child.kind_name(), name = child.name()))]
    async fn create(&self, child: &ChildResource) -> ReconcileResult<()> {
        let params = PostParams::default();
        let (kind, name, ns) = (child.kind_name(), child.name(), child.namespace());
        match child {
            ChildResource::ConfigMap(obj) => {
                let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), ns);
                self.call(kind, name, api.create(&params, obj)).await.map(|_| ())
            }
            ChildResource::StatefulSet(obj) => {
                let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), ns);
                self.call(kind, name, api.create(&params, obj)).await.map(|_| ())
            }
            ChildResource::Service(obj) => {
                let api: Api<Service> = Api::namespaced(self.client.clone(), ns);
                self.call(kind, name, api.create(&params, obj)).await.map(|_| ())
            }
        }
    }

    #[tracing::instrument(level = "debug", skip(self, child), fields(kind = child.kind_name(), name = child.name()))]
    async fn update(&self, child: &ChildResource) -> ReconcileResult<()> {
        let params = PostParams::default();
        let (kind, name, ns) = (child.kind_name(), child.name(), child.namespace());
        if child.metadata().resource_version.is_none() {
            return Err(ReconcileError::Store(anyhow!("refusing to replace {} {} without a resource version", kind, name)));
        }
        match child {
            ChildResource::ConfigMap(obj) => {
                let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), ns);
                self.call(kind, name, api.replace(name, &params, obj)).await.map(|_| ())
            }
            ChildResource::StatefulSet(obj) => {
                let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), ns);
                self.call(kind, name, api.replace(name, &params, obj)).await.map(|_| ())
            }
            ChildResource::Service(obj) => {
                let api: Api<Service> = Api::namespaced(self.client.clone(), ns);
                self.call(kind, name, api.replace(name, &params, obj)).await.map(|_| ())
            }
        }
    }

    #[tracing::instrument(level = "debug", skip(self, status))]
    async fn persist_status(&self, target: &DesiredRef, status: &ObservedStatus) -> ReconcileResult<()> {
        let kind = target.topology.kind();
        let params = PatchParams::default();
        let patch = Patch::Merge(json!({ "status": status }));
        match target.topology {
            Topology::Standalone => {
                let api: Api<RedisStandalone> = Api::namespaced(self.client.clone(), &target.namespace);
                self.call(kind, &target.name, api.patch_status(&target.name, &params, &patch)).await.map(|_| ())
            }
            Topology::Sentinel => {
                let api: Api<RedisSentinel> = Api::namespaced(self.client.clone(), &target.namespace);
                self.call(kind, &target.name, api.patch_status(&target.name, &params, &patch)).await.map(|_| ())
            }
        }
    }
}
