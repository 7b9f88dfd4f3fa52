use std::sync::Arc;

use anyhow::{Context, Result};
use futures::stream::StreamExt;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{BroadcastStream, SignalStream};
use tokio_stream::StreamMap;

use crate::config::Config;
use crate::k8s::Controller;
use crate::server::HttpServer;

/// What brought the operator down.
#[derive(Debug)]
enum Shutdown {
    /// A process signal, by name.
    Signal(&'static str),
    /// One of the operator's own tasks failed & requested shutdown.
    Requested,
}

/// The running operator: its HTTP server & its controllers.
pub struct App {
    config: Arc<Config>,

    /// Sender half of the shutdown channel, shared with every task.
    shutdown_tx: broadcast::Sender<()>,
    /// Receiver half of the shutdown channel, observing task failures.
    shutdown_rx: BroadcastStream<()>,

    http: JoinHandle<()>,
    controller: JoinHandle<Result<()>>,
}

impl App {
    /// Connect to the cluster & start the HTTP server and controllers.
    pub async fn new(config: Arc<Config>, metrics: PrometheusHandle) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(10);
        let client = kube::Client::try_default().await.context("error initializing K8s client")?;

        let http = HttpServer::new(config.clone(), shutdown_tx.clone(), metrics)
            .spawn()
            .context("error setting up HTTP server")?;
        let controller = Controller::new(client, config.clone(), shutdown_tx.clone()).spawn();

        Ok(Self {
            config,
            shutdown_rx: BroadcastStream::new(shutdown_rx),
            shutdown_tx,
            http,
            controller,
        })
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> Result<()> {
        let cause = self.wait_for_shutdown().await?;
        tracing::info!(?cause, "Redis Operator is shutting down");
        let _ = self.shutdown_tx.send(());

        // Tasks still running after the grace period are abandoned with the runtime.
        let grace = self.config.shutdown_grace();
        let (http, controller) = (self.http, self.controller);
        let joined = tokio::time::timeout(grace, async move {
            if let Err(err) = http.await {
                tracing::error!(error = ?err, "error joining HTTP server task");
            }
            match controller.await {
                Ok(Ok(())) => (),
                Ok(Err(err)) => tracing::error!(error = ?err, "error shutting down k8s controller"),
                Err(err) => tracing::error!(error = ?err, "error joining k8s controller task"),
            }
        })
        .await;
        if joined.is_err() {
            tracing::warn!(?grace, "tasks did not stop within the shutdown grace period");
        }

        tracing::debug!("Redis Operator shutdown complete");
        Ok(())
    }

    /// Block until a termination signal arrives or a task requests shutdown.
    async fn wait_for_shutdown(&mut self) -> Result<Shutdown> {
        let mut signals = StreamMap::new();
        signals.insert("sigterm", SignalStream::new(signal(SignalKind::terminate()).context("error building signal stream")?));
        signals.insert("sigint", SignalStream::new(signal(SignalKind::interrupt()).context("error building signal stream")?));

        tokio::select! {
            Some((name, _)) = signals.next() => Ok(Shutdown::Signal(name)),
            _ = self.shutdown_rx.next() => Ok(Shutdown::Requested),
        }
    }
}
