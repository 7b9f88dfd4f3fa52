//! Test fixtures: an in-memory resource store & CR builders.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSetStatus;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::ObjectMeta;

use crate::k8s::store::{ChildResource, DesiredObject, DesiredRef, ResourceStore};
use crate::k8s::topology::ManagedRef;
use redis_core::crd::{ObservedStatus, RedisSentinel, RedisSentinelSpec, RedisStandalone, RedisStandaloneSpec, RedisStorage, RoleSpec};
use redis_core::{Deployment, ReconcileError, ReconcileResult, Topology};

pub const NAMESPACE: &str = "default";

type ChildKey = (&'static str, String, String);

#[derive(Default)]
struct Inner {
    desired: BTreeMap<(Topology, String, String), DesiredObject>,
    children: BTreeMap<ChildKey, ChildResource>,
    creates: Vec<String>,
    updates: Vec<String>,
    status_writes: Vec<ObservedStatus>,
    revision: u64,
    fail_get: HashSet<String>,
    fail_create: HashSet<String>,
    fail_fetch: bool,
    fail_status: bool,
}

/// An in-memory `ResourceStore` which records all writes & supports failure injection.
///
/// Every write stamps a fresh resource version, and updates are full replacements which are
/// rejected unless they carry the current resource version.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn put_desired(&self, obj: DesiredObject) {
        let key = match &obj {
            DesiredObject::Standalone(cr) => (Topology::Standalone, ns_of(&cr.metadata), name_of(&cr.metadata)),
            DesiredObject::Sentinel(cr) => (Topology::Sentinel, ns_of(&cr.metadata), name_of(&cr.metadata)),
        };
        self.lock().desired.insert(key, obj);
    }

    pub fn desired(&self, target: &DesiredRef) -> Option<DesiredObject> {
        self.lock().desired.get(&(target.topology, target.namespace.clone(), target.name.clone())).cloned()
    }

    /// Fetch the stored child of the given identity.
    pub fn child(&self, child: &ManagedRef) -> Option<ChildResource> {
        self.lock().children.get(&(child.kind.api_kind(), child.namespace.clone(), child.name.clone())).cloned()
    }

    pub fn child_count(&self) -> usize {
        self.lock().children.len()
    }

    /// Replace a stored child out-of-band.
    pub fn put_child(&self, mut child: ChildResource) {
        let key = child_key(&child);
        let mut inner = self.lock();
        inner.stamp(&mut child);
        inner.children.insert(key, child);
    }

    /// Delete a stored child out-of-band.
    pub fn remove_child(&self, child: &ManagedRef) {
        self.lock().children.remove(&(child.kind.api_kind(), child.namespace.clone(), child.name.clone()));
    }

    /// Set the observed ready replicas of the named StatefulSet.
    pub fn set_ready_replicas(&self, name: &str, ready: i32) {
        let mut inner = self.lock();
        if let Some(ChildResource::StatefulSet(sts)) = inner.children.get_mut(&("StatefulSet", NAMESPACE.to_string(), name.to_string())) {
            sts.status = Some(StatefulSetStatus { ready_replicas: Some(ready), ..Default::default() });
        }
    }

    /// Created objects as `Kind/name`, in order.
    pub fn creates(&self) -> Vec<String> {
        self.lock().creates.clone()
    }

    /// Updated objects as `Kind/name`, in order.
    pub fn updates(&self) -> Vec<String> {
        self.lock().updates.clone()
    }

    pub fn status_writes(&self) -> Vec<ObservedStatus> {
        self.lock().status_writes.clone()
    }

    /// Clear all recorded calls.
    pub fn reset_calls(&self) {
        let mut inner = self.lock();
        inner.creates.clear();
        inner.updates.clear();
        inner.status_writes.clear();
    }

    pub fn fail_get(&self, name: &str, fail: bool) {
        let mut inner = self.lock();
        if fail {
            inner.fail_get.insert(name.into());
        } else {
            inner.fail_get.remove(name);
        }
    }

    pub fn fail_create(&self, name: &str, fail: bool) {
        let mut inner = self.lock();
        if fail {
            inner.fail_create.insert(name.into());
        } else {
            inner.fail_create.remove(name);
        }
    }

    pub fn fail_fetch(&self, fail: bool) {
        self.lock().fail_fetch = fail;
    }

    pub fn fail_status(&self, fail: bool) {
        self.lock().fail_status = fail;
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn fetch_desired(&self, target: &DesiredRef) -> ReconcileResult<DesiredObject> {
        let inner = self.lock();
        if inner.fail_fetch {
            return Err(ReconcileError::Store(anyhow!("injected fetch failure")));
        }
        inner
            .desired
            .get(&(target.topology, target.namespace.clone(), target.name.clone()))
            .cloned()
            .ok_or_else(|| ReconcileError::NotFound {
                kind: target.topology.kind(),
                name: target.name.clone(),
            })
    }

    async fn get(&self, child: &ManagedRef) -> ReconcileResult<ChildResource> {
        let inner = self.lock();
        if inner.fail_get.contains(&child.name) {
            return Err(ReconcileError::Store(anyhow!("injected get failure for {}", child)));
        }
        inner
            .children
            .get(&(child.kind.api_kind(), child.namespace.clone(), child.name.clone()))
            .cloned()
            .ok_or_else(|| ReconcileError::NotFound {
                kind: child.kind.api_kind(),
                name: child.name.clone(),
            })
    }

    async fn create(&self, child: &ChildResource) -> ReconcileResult<()> {
        let mut inner = self.lock();
        if inner.fail_create.contains(child.name()) {
            return Err(ReconcileError::Store(anyhow!("injected create failure for {}", child.name())));
        }
        let key = child_key(child);
        if inner.children.contains_key(&key) {
            return Err(ReconcileError::Store(anyhow!("{} {} already exists", child.kind_name(), child.name())));
        }
        let mut child = child.clone();
        inner.stamp(&mut child);
        inner.creates.push(format!("{}/{}", child.kind_name(), child.name()));
        inner.children.insert(key, child);
        Ok(())
    }

    async fn update(&self, child: &ChildResource) -> ReconcileResult<()> {
        let mut inner = self.lock();
        let key = child_key(child);
        let live = inner.children.get(&key).ok_or_else(|| ReconcileError::NotFound {
            kind: child.kind_name(),
            name: child.name().to_string(),
        })?;
        if live.metadata().resource_version != child.metadata().resource_version {
            return Err(ReconcileError::Store(anyhow!(
                "conflict replacing {} {}: resource version {:?} is not the current {:?}",
                child.kind_name(),
                child.name(),
                child.metadata().resource_version,
                live.metadata().resource_version
            )));
        }
        // Status is owned by the server and survives spec updates.
        let live_status = match live {
            ChildResource::StatefulSet(live) => live.status.clone(),
            _ => None,
        };
        let mut child = child.clone();
        if let ChildResource::StatefulSet(sts) = &mut child {
            sts.status = live_status;
        }
        inner.stamp(&mut child);
        inner.updates.push(format!("{}/{}", child.kind_name(), child.name()));
        inner.children.insert(key, child);
        Ok(())
    }

    async fn persist_status(&self, target: &DesiredRef, status: &ObservedStatus) -> ReconcileResult<()> {
        let mut inner = self.lock();
        if inner.fail_status {
            return Err(ReconcileError::Store(anyhow!("injected status failure")));
        }
        let obj = inner
            .desired
            .get_mut(&(target.topology, target.namespace.clone(), target.name.clone()))
            .ok_or_else(|| ReconcileError::NotFound {
                kind: target.topology.kind(),
                name: target.name.clone(),
            })?;
        obj.set_status(status.clone());
        inner.status_writes.push(status.clone());
        Ok(())
    }
}

impl Inner {
    fn stamp(&mut self, child: &mut ChildResource) {
        self.revision += 1;
        child.metadata_mut().resource_version = Some(self.revision.to_string());
    }
}

fn child_key(child: &ChildResource) -> ChildKey {
    (child.kind_name(), child.namespace().to_string(), child.name().to_string())
}

fn ns_of(meta: &ObjectMeta) -> String {
    meta.namespace.clone().unwrap_or_default()
}

fn name_of(meta: &ObjectMeta) -> String {
    meta.name.clone().unwrap_or_default()
}

fn meta(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.into()),
        namespace: Some(NAMESPACE.into()),
        uid: Some(format!("uid-{}", name)),
        ..Default::default()
    }
}

fn storage() -> RedisStorage {
    RedisStorage {
        storage_class: Some("standard".into()),
        size: Quantity("1Gi".into()),
        retain: false,
    }
}

pub fn standalone(name: &str) -> RedisStandalone {
    let mut obj = RedisStandalone::new(
        name,
        RedisStandaloneSpec {
            name: name.into(),
            image: "redis:7.2".into(),
            image_pull_policy: Some("IfNotPresent".into()),
            resources: None,
            storage: Some(storage()),
            configuration: maplit::btreemap! {
                "maxmemory".into() => "256mb".into(),
                "appendonly".into() => "yes".into(),
            },
        },
    );
    obj.metadata = meta(name);
    obj
}

pub fn sentinel(name: &str, redis_replicas: i32, sentinel_replicas: i32) -> RedisSentinel {
    let mut obj = RedisSentinel::new(
        name,
        RedisSentinelSpec {
            name: name.into(),
            redis: RoleSpec {
                replicas: redis_replicas,
                image: "redis:7.2".into(),
                storage: Some(storage()),
                configuration: maplit::btreemap! { "maxmemory".into() => "256mb".into() },
                ..Default::default()
            },
            sentinel: RoleSpec {
                replicas: sentinel_replicas,
                image: "redis:7.2".into(),
                configuration: maplit::btreemap! { "sentinel".into() => "monitor mymaster 127.0.0.1 6379 2".into() },
                ..Default::default()
            },
        },
    );
    obj.metadata = meta(name);
    obj
}

pub fn standalone_deployment(name: &str) -> Result<Deployment> {
    Ok(Deployment::try_from(&standalone(name))?)
}

pub fn sentinel_deployment(name: &str, redis_replicas: i32, sentinel_replicas: i32) -> Result<Deployment> {
    Ok(Deployment::try_from(&sentinel(name, redis_replicas, sentinel_replicas))?)
}

pub fn standalone_ref(name: &str) -> DesiredRef {
    DesiredRef {
        topology: Topology::Standalone,
        namespace: NAMESPACE.into(),
        name: name.into(),
    }
}

pub fn sentinel_ref(name: &str) -> DesiredRef {
    DesiredRef {
        topology: Topology::Sentinel,
        namespace: NAMESPACE.into(),
        name: name.into(),
    }
}
