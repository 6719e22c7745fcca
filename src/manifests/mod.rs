//! Desired-state builders for router infrastructure
//!
//! Every function here is pure: given the operator configuration and a
//! ClusterIngress it returns the object the cluster should contain. The
//! reconciler decides what to do with them.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, HTTPGetAction, Namespace, PodSpec, PodTemplateSpec, Probe,
    SecretVolumeSource, Service, ServiceAccount, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::config::OperatorConfig;
use crate::crd::{ClusterIngress, ClusterIngressHighAvailability, ClusterIngressSpec};
use crate::install::InstallConfig;
use crate::Error;

/// Name shared by the router ClusterRole and ClusterRoleBinding
pub const ROUTER_CLUSTER_ROLE: &str = "openshift-ingress-router";

/// Service account the router pods run as
pub const ROUTER_SERVICE_ACCOUNT: &str = "router";

/// Name of the ClusterIngress created from the install config
pub const DEFAULT_CLUSTER_INGRESS: &str = "default";

/// Port serving router health and metrics
pub const ROUTER_STATS_PORT: i32 = 1936;

const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
const MANAGED_BY: &str = "cluster-ingress-operator";
const APP_LABEL: &str = "app";
const ROUTER_LABEL: &str = "router";
const DEFAULT_CERTIFICATE_DIR: &str = "/etc/pki/tls/private";
const DEFAULT_NODE_SELECTOR: &str = "node-role.kubernetes.io/worker";

/// Builds desired objects for the router and its scaffolding
#[derive(Clone, Debug)]
pub struct ManifestFactory {
    namespace: String,
    router_namespace: String,
    router_image: String,
}

impl ManifestFactory {
    /// Create a factory from the operator configuration
    pub fn new(config: &OperatorConfig) -> Self {
        Self {
            namespace: config.namespace.clone(),
            router_namespace: config.router_namespace.clone(),
            router_image: config.router_image.clone(),
        }
    }

    /// Namespace the router objects live in
    pub fn router_namespace_name(&self) -> &str {
        &self.router_namespace
    }

    /// Name of the DaemonSet and Service for a ClusterIngress, e.g. `router-default`
    ///
    /// Derived only from the ClusterIngress name, so every pass computes the
    /// same identity.
    pub fn router_name(ci: &ClusterIngress) -> Result<String, Error> {
        match ci.metadata.name.as_deref() {
            Some(name) if !name.is_empty() => Ok(format!("router-{name}")),
            _ => Err(Error::manifest("clusteringress has no name")),
        }
    }

    /// ClusterRole granting the router read access to routes and endpoints
    pub fn router_cluster_role(&self) -> ClusterRole {
        ClusterRole {
            metadata: self.cluster_meta(ROUTER_CLUSTER_ROLE),
            rules: Some(vec![
                rule(&[""], &["endpoints", "namespaces", "services"], &["list", "watch"]),
                rule(&["authentication.k8s.io"], &["tokenreviews"], &["create"]),
                rule(&["authorization.k8s.io"], &["subjectaccessreviews"], &["create"]),
                rule(&["route.openshift.io"], &["routes"], &["list", "watch"]),
                rule(&["route.openshift.io"], &["routes/status"], &["update"]),
            ]),
            ..Default::default()
        }
    }

    /// Namespace holding all router objects
    pub fn router_namespace(&self) -> Namespace {
        Namespace {
            metadata: self.cluster_meta(&self.router_namespace),
            ..Default::default()
        }
    }

    /// Service account used by router pods
    pub fn router_service_account(&self) -> ServiceAccount {
        ServiceAccount {
            metadata: self.router_meta(ROUTER_SERVICE_ACCOUNT, BTreeMap::new()),
            ..Default::default()
        }
    }

    /// Binds the router ClusterRole to the router service account
    pub fn router_cluster_role_binding(&self) -> ClusterRoleBinding {
        ClusterRoleBinding {
            metadata: self.cluster_meta(ROUTER_CLUSTER_ROLE),
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "ClusterRole".to_string(),
                name: ROUTER_CLUSTER_ROLE.to_string(),
            },
            subjects: Some(vec![Subject {
                kind: "ServiceAccount".to_string(),
                name: ROUTER_SERVICE_ACCOUNT.to_string(),
                namespace: Some(self.router_namespace.clone()),
                ..Default::default()
            }]),
        }
    }

    /// Router DaemonSet for a ClusterIngress
    pub fn router_daemon_set(&self, ci: &ClusterIngress) -> Result<DaemonSet, Error> {
        let name = Self::router_name(ci)?;
        ci.spec
            .validate()
            .map_err(|e| Error::manifest(format!("clusteringress {}: {e}", ci.identity())))?;

        let selector = router_selector(&name);
        let spec = &ci.spec;

        let mut env = vec![
            env_var("ROUTER_SERVICE_NAME", ci.name_any()),
            env_var("ROUTER_SERVICE_NAMESPACE", self.router_namespace.clone()),
            env_var("STATS_PORT", ROUTER_STATS_PORT.to_string()),
        ];
        if let Some(domain) = &spec.ingress_domain {
            env.push(env_var("ROUTER_CANONICAL_HOSTNAME", domain.clone()));
        }
        if let Some(selector) = spec.namespace_selector.as_ref().filter(|s| !s.is_empty()) {
            env.push(env_var("NAMESPACE_LABELS", selector.to_selector_string()));
        }
        if let Some(selector) = spec.route_selector.as_ref().filter(|s| !s.is_empty()) {
            env.push(env_var("ROUTE_LABELS", selector.to_selector_string()));
        }

        let (volumes, volume_mounts) = match &spec.default_certificate_secret {
            Some(secret) => {
                env.push(env_var("DEFAULT_CERTIFICATE_DIR", DEFAULT_CERTIFICATE_DIR));
                (
                    Some(vec![Volume {
                        name: "default-certificate".to_string(),
                        secret: Some(SecretVolumeSource {
                            secret_name: Some(secret.clone()),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    Some(vec![VolumeMount {
                        name: "default-certificate".to_string(),
                        mount_path: DEFAULT_CERTIFICATE_DIR.to_string(),
                        read_only: Some(true),
                        ..Default::default()
                    }]),
                )
            }
            None => (None, None),
        };

        let container = Container {
            name: "router".to_string(),
            image: Some(self.router_image.clone()),
            env: Some(env),
            ports: Some(vec![
                container_port("http", 80),
                container_port("https", 443),
                container_port("stats", ROUTER_STATS_PORT),
            ]),
            liveness_probe: Some(health_probe("/healthz")),
            readiness_probe: Some(health_probe("/healthz/ready")),
            volume_mounts,
            ..Default::default()
        };

        Ok(DaemonSet {
            metadata: self.router_meta(&name, selector.clone()),
            spec: Some(DaemonSetSpec {
                selector: LabelSelector {
                    match_labels: Some(selector.clone()),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(selector),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        service_account_name: Some(ROUTER_SERVICE_ACCOUNT.to_string()),
                        node_selector: Some(node_selector(spec)),
                        containers: vec![container],
                        volumes,
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    /// LoadBalancer Service exposing a cloud-exposed router
    ///
    /// The caller attaches the owner reference once the DaemonSet's uid is known.
    pub fn router_service_cloud(&self, ci: &ClusterIngress) -> Result<Service, Error> {
        let name = Self::router_name(ci)?;
        let selector = router_selector(&name);

        Ok(Service {
            metadata: self.router_meta(&name, selector.clone()),
            spec: Some(ServiceSpec {
                type_: Some("LoadBalancer".to_string()),
                external_traffic_policy: Some("Local".to_string()),
                selector: Some(selector),
                ports: Some(vec![service_port("http", 80), service_port("https", 443)]),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    /// ClusterIngress derived from the cluster install config
    pub fn default_cluster_ingress(&self, install: &InstallConfig) -> ClusterIngress {
        let high_availability = if install.is_cloud_platform() {
            ClusterIngressHighAvailability::cloud()
        } else {
            ClusterIngressHighAvailability::user_defined()
        };

        let mut ci = ClusterIngress::new(
            DEFAULT_CLUSTER_INGRESS,
            ClusterIngressSpec {
                ingress_domain: Some(install.ingress_domain()),
                high_availability: Some(high_availability),
                ..Default::default()
            },
        );
        ci.metadata.namespace = Some(self.namespace.clone());
        ci
    }

    fn cluster_meta(&self, name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(managed_labels(BTreeMap::new())),
            ..Default::default()
        }
    }

    fn router_meta(&self, name: &str, labels: BTreeMap<String, String>) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(self.router_namespace.clone()),
            labels: Some(managed_labels(labels)),
            ..Default::default()
        }
    }
}

/// Label selector matching every object the operator manages
pub fn managed_by_selector() -> String {
    format!("{MANAGED_BY_LABEL}={MANAGED_BY}")
}

fn managed_labels(mut labels: BTreeMap<String, String>) -> BTreeMap<String, String> {
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string());
    labels
}

fn router_selector(router_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (APP_LABEL.to_string(), "router".to_string()),
        (ROUTER_LABEL.to_string(), router_name.to_string()),
    ])
}

fn node_selector(spec: &ClusterIngressSpec) -> BTreeMap<String, String> {
    spec.node_placement
        .as_ref()
        .and_then(|p| p.node_selector.as_ref())
        .filter(|s| !s.is_empty())
        .map(|s| s.match_labels.clone())
        .unwrap_or_else(|| BTreeMap::from([(DEFAULT_NODE_SELECTOR.to_string(), String::new())]))
}

fn rule(groups: &[&str], resources: &[&str], verbs: &[&str]) -> PolicyRule {
    let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    PolicyRule {
        api_groups: Some(owned(groups)),
        resources: Some(owned(resources)),
        verbs: owned(verbs),
        ..Default::default()
    }
}

fn env_var(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn container_port(name: &str, port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: port,
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

fn service_port(name: &str, port: i32) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        protocol: Some("TCP".to_string()),
        target_port: Some(IntOrString::String(name.to_string())),
        ..Default::default()
    }
}

fn health_probe(path: &str) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::Int(ROUTER_STATS_PORT),
            ..Default::default()
        }),
        initial_delay_seconds: Some(10),
        period_seconds: Some(10),
        ..Default::default()
    }
}
