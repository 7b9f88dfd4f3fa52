//! Rendering of child objects from a deployment's desired state.
//!
//! Rendering is pure: the same deployment, role & kind always yield the same object, and no
//! server-assigned fields are ever populated.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetPersistentVolumeClaimRetentionPolicy, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSecurityContext, PodSpec, PodTemplateSpec,
    ResourceRequirements, Service, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;

use crate::k8s::store::ChildResource;
use crate::k8s::topology::{child_name, ChildKind, Labels, ManagedRef};
use redis_core::crd::RoleSpec;
use redis_core::{Deployment, ReconcileError, ReconcileResult, Role};

/// The default client port of the primary role.
pub const DEFAULT_PORT_REDIS: i32 = 6379;
/// The default client port of the watchdog role.
pub const DEFAULT_PORT_SENTINEL: i32 = 26379;

/// The name of the primary role's data volume & claim template.
///
/// NOTE WELL: do not change this name. Existing claims are bound to it.
const VOLUME_DATA: &str = "redis-data";
const PATH_DATA: &str = "/data";
const PATH_CONF: &str = "/conf";
/// The only retention policy currently supported for claims.
const RETENTION_DELETE: &str = "Delete";
/// The upper bound of a label value's length.
pub const MAX_LABEL_VALUE_LEN: usize = 63;

// Values the API server would otherwise fill into a pod template. They are rendered explicitly,
// so that a live template compares equal to its rendered form.
const DEFAULT_RESTART_POLICY: &str = "Always";
const DEFAULT_DNS_POLICY: &str = "ClusterFirst";
const DEFAULT_SCHEDULER: &str = "default-scheduler";
const DEFAULT_TERMINATION_GRACE_SECONDS: i64 = 30;
const DEFAULT_TERMINATION_MESSAGE_PATH: &str = "/dev/termination-log";
const DEFAULT_TERMINATION_MESSAGE_POLICY: &str = "File";
const DEFAULT_CONFIG_MODE: i32 = 0o644;

/// Render the child object of the given kind for the given role.
///
/// `labels` are the deployment's base labels, role labels are derived from them.
pub fn render(deployment: &Deployment, role: Role, kind: ChildKind, labels: &Labels) -> ReconcileResult<ChildResource> {
    if !kind.applies_to(role) {
        return Err(ReconcileError::render(format!("{} does not apply to the {} role", kind, role)));
    }
    let spec = deployment.must_role(role)?;
    let role_labels = labels.for_role(role);
    check_labels(&role_labels)?;
    match kind {
        ChildKind::Config => render_config(deployment, role, spec, &role_labels).map(ChildResource::ConfigMap),
        ChildKind::Workload => render_workload(deployment, role, spec, &role_labels).map(ChildResource::StatefulSet),
        ChildKind::HeadlessEndpoint => render_headless(deployment, role, spec, &role_labels).map(ChildResource::Service),
        ChildKind::ExternalEndpoint => render_external(deployment, spec, labels).map(ChildResource::Service),
    }
}

/// Serialize the given configuration as a config file body.
///
/// One `key value` line per entry, in lexicographic key order. Empty values are rendered as
/// `""`, so that directives like `save ""` remain valid.
pub fn serialize_config(config: &BTreeMap<String, String>) -> ReconcileResult<String> {
    let mut body = String::new();
    for (key, val) in config {
        if key.is_empty() || key.chars().any(char::is_whitespace) {
            return Err(ReconcileError::render(format!("invalid configuration key {:?}", key)));
        }
        if val.contains(|c: char| c == '\n' || c == '\r') {
            return Err(ReconcileError::render(format!("configuration value of {:?} must not contain line breaks", key)));
        }
        body.push_str(key);
        body.push(' ');
        if val.is_empty() {
            body.push_str(r#""""#);
        } else {
            body.push_str(val);
        }
        body.push('\n');
    }
    Ok(body)
}

/// The client port of the given role, taken from its `port` option if present.
pub fn client_port(role: Role, spec: &RoleSpec) -> ReconcileResult<i32> {
    match spec.configuration.get("port") {
        None => Ok(match role {
            Role::Primary => DEFAULT_PORT_REDIS,
            Role::Watchdog => DEFAULT_PORT_SENTINEL,
        }),
        Some(raw) => match raw.trim().parse::<u16>() {
            Ok(port) if port > 0 => Ok(i32::from(port)),
            _ => Err(ReconcileError::render(format!("invalid {} port {:?}", role, raw))),
        },
    }
}

/// The pull policy the API server would assign to the given image.
///
/// Untagged images & the `latest` tag are always pulled.
pub fn default_pull_policy(image: &str) -> &'static str {
    let name = image.rsplit('/').next().unwrap_or(image);
    if name.contains('@') {
        return "IfNotPresent";
    }
    match name.rsplit_once(':') {
        Some((_, tag)) if tag != "latest" => "IfNotPresent",
        _ => "Always",
    }
}

fn check_labels(labels: &Labels) -> ReconcileResult<()> {
    for (key, val) in labels.metadata() {
        if val.len() > MAX_LABEL_VALUE_LEN {
            return Err(ReconcileError::render(format!(
                "value of label {:?} is {} characters long, at most {} are allowed",
                key,
                val.len(),
                MAX_LABEL_VALUE_LEN
            )));
        }
    }
    Ok(())
}

/// The config file name of the given role, and the name used for its container & ports.
fn role_names(role: Role) -> (&'static str, &'static str) {
    match role {
        Role::Primary => ("redis.conf", "redis"),
        Role::Watchdog => ("sentinel.conf", "sentinel"),
    }
}

fn metadata(deployment: &Deployment, name: String, labels: &Labels) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: Some(deployment.namespace.clone()),
        labels: Some(labels.metadata()),
        owner_references: Some(vec![deployment.owner.clone()]),
        ..Default::default()
    }
}

fn render_config(deployment: &Deployment, role: Role, spec: &RoleSpec, labels: &Labels) -> ReconcileResult<ConfigMap> {
    let (file, _) = role_names(role);
    let body = serialize_config(&spec.configuration)?;
    let name = ManagedRef::new(deployment, role, ChildKind::Config).name;
    Ok(ConfigMap {
        metadata: metadata(deployment, name, labels),
        data: Some(maplit::btreemap! { file.to_string() => body }),
        ..Default::default()
    })
}

fn render_workload(deployment: &Deployment, role: Role, spec: &RoleSpec, labels: &Labels) -> ReconcileResult<StatefulSet> {
    if spec.replicas < 0 {
        return Err(ReconcileError::render(format!("{} replicas must not be negative, got {}", role, spec.replicas)));
    }
    if spec.image.trim().is_empty() {
        return Err(ReconcileError::render(format!("{} image must not be empty", role)));
    }
    let port = client_port(role, spec)?;
    let (file, container_name) = role_names(role);
    let conf_volume = format!("{}-conf", container_name);
    let name = ManagedRef::new(deployment, role, ChildKind::Workload).name;

    let mut command = vec!["redis-server".to_string(), format!("{}/{}", PATH_CONF, file)];
    let mut volume_mounts = vec![VolumeMount {
        name: conf_volume.clone(),
        mount_path: PATH_CONF.into(),
        ..Default::default()
    }];
    let mut claims = None;
    match role {
        Role::Watchdog => command.push("--sentinel".into()),
        Role::Primary => {
            let storage = spec
                .storage
                .as_ref()
                .filter(|storage| !storage.size.0.trim().is_empty())
                .ok_or_else(|| ReconcileError::render(format!("{} role requires a storage size", role)))?;
            volume_mounts.push(VolumeMount {
                name: VOLUME_DATA.into(),
                mount_path: PATH_DATA.into(),
                ..Default::default()
            });
            claims = Some(vec![PersistentVolumeClaim {
                metadata: ObjectMeta { name: Some(VOLUME_DATA.into()), ..Default::default() },
                spec: Some(PersistentVolumeClaimSpec {
                    access_modes: Some(vec!["ReadWriteOnce".into()]),
                    storage_class_name: storage.storage_class.clone(),
                    resources: Some(ResourceRequirements {
                        requests: Some(maplit::btreemap! {
                            "storage".into() => storage.size.clone(),
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }]);
        }
    }

    let selector = labels.selector();
    Ok(StatefulSet {
        metadata: metadata(deployment, name, labels),
        spec: Some(StatefulSetSpec {
            replicas: Some(spec.replicas),
            service_name: child_name(&deployment.name, deployment.topology, role, ChildKind::HeadlessEndpoint),
            selector: LabelSelector {
                match_labels: Some(selector.clone()),
                ..Default::default()
            },
            persistent_volume_claim_retention_policy: Some(StatefulSetPersistentVolumeClaimRetentionPolicy {
                when_deleted: Some(RETENTION_DELETE.into()),
                when_scaled: Some(RETENTION_DELETE.into()),
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta { labels: Some(selector), ..Default::default() }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        // NOTE WELL: do not change the name of this container. It will cause breaking changes.
                        name: container_name.into(),
                        image: Some(spec.image.clone()),
                        image_pull_policy: Some(
                            spec.image_pull_policy.clone().unwrap_or_else(|| default_pull_policy(&spec.image).into()),
                        ),
                        command: Some(command),
                        ports: Some(vec![ContainerPort {
                            name: Some(container_name.into()),
                            container_port: port,
                            protocol: Some("TCP".into()),
                            ..Default::default()
                        }]),
                        resources: Some(spec.resources.clone().unwrap_or_default()),
                        volume_mounts: Some(volume_mounts),
                        termination_message_path: Some(DEFAULT_TERMINATION_MESSAGE_PATH.into()),
                        termination_message_policy: Some(DEFAULT_TERMINATION_MESSAGE_POLICY.into()),
                        ..Default::default()
                    }],
                    volumes: Some(vec![Volume {
                        name: conf_volume,
                        config_map: Some(ConfigMapVolumeSource {
                            name: Some(child_name(&deployment.name, deployment.topology, role, ChildKind::Config)),
                            default_mode: Some(DEFAULT_CONFIG_MODE),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    restart_policy: Some(DEFAULT_RESTART_POLICY.into()),
                    dns_policy: Some(DEFAULT_DNS_POLICY.into()),
                    scheduler_name: Some(DEFAULT_SCHEDULER.into()),
                    security_context: Some(PodSecurityContext::default()),
                    termination_grace_period_seconds: Some(DEFAULT_TERMINATION_GRACE_SECONDS),
                    ..Default::default()
                }),
            },
            volume_claim_templates: claims,
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn service_port(role: Role, port: i32) -> ServicePort {
    let (_, port_name) = role_names(role);
    ServicePort {
        name: Some(port_name.into()),
        port,
        target_port: Some(IntOrString::Int(port)),
        protocol: Some("TCP".into()),
        ..Default::default()
    }
}

fn render_headless(deployment: &Deployment, role: Role, spec: &RoleSpec, labels: &Labels) -> ReconcileResult<Service> {
    let port = client_port(role, spec)?;
    let name = ManagedRef::new(deployment, role, ChildKind::HeadlessEndpoint).name;
    Ok(Service {
        metadata: metadata(deployment, name, labels),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".into()),
            cluster_ip: Some("None".into()),
            selector: Some(labels.selector()),
            ports: Some(vec![service_port(role, port)]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// The external endpoint always selects the primary role.
fn render_external(deployment: &Deployment, spec: &RoleSpec, labels: &Labels) -> ReconcileResult<Service> {
    let port = client_port(Role::Primary, spec)?;
    let primary = labels.for_role(Role::Primary);
    let name = ManagedRef::new(deployment, Role::Primary, ChildKind::ExternalEndpoint).name;
    Ok(Service {
        metadata: metadata(deployment, name, &primary),
        spec: Some(ServiceSpec {
            type_: Some("NodePort".into()),
            selector: Some(primary.selector()),
            ports: Some(vec![service_port(Role::Primary, port)]),
            ..Default::default()
        }),
        ..Default::default()
    })
}
