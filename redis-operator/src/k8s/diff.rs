//! Change detection between live & rendered child objects.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::ConfigMap;
use serde::Serialize;

use crate::k8s::store::ChildResource;

/// Check if the data of the given config objects differs.
pub fn config_changed(old: &ConfigMap, new: &ConfigMap) -> bool {
    let empty = BTreeMap::new();
    let (old, new) = (old.data.as_ref().unwrap_or(&empty), new.data.as_ref().unwrap_or(&empty));
    if old.len() != new.len() {
        return true;
    }
    new.iter().any(|(key, val)| old.get(key) != Some(val))
}

/// Check if the given workloads differ in replicas, pod template or claim retention policy.
///
/// Rendered templates carry the values the API server would default, so an untouched live
/// template serializes identically to its rendered form.
pub fn workload_changed(old: &StatefulSet, new: &StatefulSet) -> bool {
    let (old, new) = match (old.spec.as_ref(), new.spec.as_ref()) {
        (Some(old), Some(new)) => (old, new),
        (None, None) => return false,
        _ => return true,
    };
    old.replicas != new.replicas
        || json_differs(&old.template, &new.template)
        || json_differs(&old.persistent_volume_claim_retention_policy, &new.persistent_volume_claim_retention_policy)
}

/// Check if the live object must be updated to match the rendered object.
///
/// Only config & workload objects are ever updated. Services are create-once.
pub fn needs_update(live: &ChildResource, rendered: &ChildResource) -> bool {
    match (live, rendered) {
        (ChildResource::ConfigMap(old), ChildResource::ConfigMap(new)) => config_changed(old, new),
        (ChildResource::StatefulSet(old), ChildResource::StatefulSet(new)) => workload_changed(old, new),
        (ChildResource::Service(_), ChildResource::Service(_)) => false,
        _ => true,
    }
}

fn json_differs<T: Serialize>(old: &T, new: &T) -> bool {
    match (serde_json::to_vec(old), serde_json::to_vec(new)) {
        (Ok(old), Ok(new)) => old != new,
        _ => true,
    }
}
