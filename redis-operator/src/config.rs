//! Runtime configuration.

use std::time::Duration;

use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

/// Runtime configuration data.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// The server's logging config, which uses Rust's `env_logger` directives.
    #[serde(default = "Config::default_rust_log")]
    pub rust_log: String,
    /// The port used for HTTP healthchecks & metrics.
    #[serde(default = "Config::default_http_port")]
    pub http_port: u16,

    /// The Kubernetes namespace to watch.
    ///
    /// All namespaces are watched when absent or empty.
    #[serde(default)]
    pub namespace: Option<String>,
    /// The name of the pod on which this instance is running.
    #[serde(default = "Config::default_pod_name")]
    pub pod_name: String,

    /// The delay in seconds after which every reconciled object is reconciled again.
    #[serde(default = "Config::default_requeue_seconds")]
    pub requeue_seconds: u64,
    /// The timeout in seconds applied to every K8s API call.
    #[serde(default = "Config::default_api_timeout_seconds")]
    pub api_timeout_seconds: u64,
    /// The time in seconds granted to running tasks for a graceful shutdown.
    #[serde(default = "Config::default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: u64,
}

impl Config {
    /// Create a new config instance.
    ///
    /// Currently this routing just parses the runtime environment and builds the application
    /// config from that.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Result<Self> {
        let config: Self = envy::from_env().context("error building config from env")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the given config.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.requeue_seconds >= 1, "REQUEUE_SECONDS must be at least 1, got {}", self.requeue_seconds);
        ensure!(self.api_timeout_seconds >= 1, "API_TIMEOUT_SECONDS must be at least 1, got {}", self.api_timeout_seconds);
        self.log_filter()?;
        Ok(())
    }

    /// The logging filter built from `RUST_LOG`.
    pub fn log_filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_new(&self.rust_log).with_context(|| format!("invalid RUST_LOG directives {:?}", self.rust_log))
    }

    /// The namespace to watch, if watching is restricted to a single namespace.
    pub fn watch_namespace(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|ns| !ns.is_empty())
    }

    pub fn requeue_after(&self) -> Duration {
        Duration::from_secs(self.requeue_seconds)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    fn default_rust_log() -> String {
        "info".into()
    }

    fn default_http_port() -> u16 {
        8080
    }

    fn default_pod_name() -> String {
        "redis-operator".into()
    }

    fn default_requeue_seconds() -> u64 {
        10
    }

    fn default_api_timeout_seconds() -> u64 {
        5
    }

    fn default_shutdown_grace_seconds() -> u64 {
        30
    }
}
