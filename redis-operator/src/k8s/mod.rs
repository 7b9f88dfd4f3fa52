//! Kubernetes controller.
//!
//! This controller watches Redis CRs along with the child objects they own, and drives every
//! observed CR through reconciliation passes. Each CR kind gets its own kube-runtime controller,
//! which guarantees that at most one pass runs for any given CR at a time.

mod diff;
mod ensure;
#[cfg(test)]
mod fixtures;
mod reconcile;
mod render;
mod status;
mod store;
mod topology;

#[cfg(test)]
mod reconcile_test;

use std::sync::Arc;

use anyhow::Result;
use futures::prelude::*;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::api::Api;
use kube::client::Client;
use kube::runtime::controller::{Action, Controller as KubeController};
use kube::runtime::watcher;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::k8s::reconcile::{PassOutcome, Reconciler};
use crate::k8s::store::{DesiredRef, KubeStore};
use redis_core::crd::{RedisSentinel, RedisStandalone};
use redis_core::{ReconcileError, Topology, LABEL_MANAGED_BY, OPERATOR_NAME};

/// Kubernetes controller for watching Redis CRs.
pub struct Controller {
    /// K8s client.
    client: Client,
    /// Runtime config.
    config: Arc<Config>,
    /// A channel used for triggering graceful shutdown.
    shutdown_tx: broadcast::Sender<()>,
}

/// The state shared by all reconciliations of a single CR kind.
struct Context {
    reconciler: Arc<Reconciler<KubeStore>>,
    topology: Topology,
}

impl Controller {
    /// Create a new instance.
    pub fn new(client: Client, config: Arc<Config>, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self { client, config, shutdown_tx }
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    async fn run(self) -> Result<()> {
        let store = KubeStore::new(self.client.clone(), self.config.api_timeout());
        let reconciler = Arc::new(Reconciler::new(store, self.config.requeue_after()));

        let standalone = self.controller::<RedisStandalone>(Topology::Standalone, reconciler.clone());
        let sentinel = self.controller::<RedisSentinel>(Topology::Sentinel, reconciler);

        tracing::info!(namespace = ?self.config.watch_namespace(), "k8s controller initialized");
        futures::join!(standalone, sentinel);

        // If the controllers stopped without a shutdown signal, ensure the rest of the app follows.
        let _ = self.shutdown_tx.send(());
        tracing::debug!("k8s controller shutdown");
        Ok(())
    }

    /// Build an API handle scoped to the configured namespace, or to all namespaces.
    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        match self.config.watch_namespace() {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    /// Run the controller of the given CR kind until shutdown.
    async fn controller<K>(&self, topology: Topology, reconciler: Arc<Reconciler<KubeStore>>)
    where
        K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope> + Clone + DeserializeOwned + std::fmt::Debug + Send + Sync + 'static,
    {
        let owned = watcher::Config::default().labels(&format!("{}={}", LABEL_MANAGED_BY, OPERATOR_NAME));
        let ctx = Arc::new(Context { reconciler, topology });
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        KubeController::new(self.api::<K>(), watcher::Config::default())
            .owns(self.api::<ConfigMap>(), owned.clone())
            .owns(self.api::<StatefulSet>(), owned.clone())
            .owns(self.api::<Service>(), owned)
            .graceful_shutdown_on(async move {
                let _ = shutdown_rx.recv().await;
            })
            .run(reconcile::<K>, error_policy::<K>, ctx)
            .for_each(move |res| async move {
                if let Err(err) = res {
                    tracing::debug!(error = ?err, kind = topology.kind(), "controller event error");
                }
            })
            .await;
        tracing::debug!(kind = topology.kind(), "controller stopped");
    }
}

/// Run a single reconciliation pass for the given CR.
async fn reconcile<K>(obj: Arc<K>, ctx: Arc<Context>) -> std::result::Result<Action, ReconcileError>
where
    K: Resource<DynamicType = ()>,
{
    let target = DesiredRef {
        topology: ctx.topology,
        namespace: obj.namespace().unwrap_or_default(),
        name: obj.name_any(),
    };
    Ok(match ctx.reconciler.reconcile(&target).await {
        PassOutcome::Requeue(delay) => Action::requeue(delay),
        PassOutcome::Stop => Action::await_change(),
    })
}

/// Passes never fail, failures are handled within the pass.
fn error_policy<K>(_obj: Arc<K>, err: &ReconcileError, ctx: Arc<Context>) -> Action {
    tracing::warn!(error = %err, "unexpected reconciliation error");
    Action::requeue(ctx.reconciler.requeue_after())
}
