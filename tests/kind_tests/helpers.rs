//! Test helpers for integration tests
//!
//! Provides utilities for managing kind clusters and Kubernetes resources.

use std::process::Command;
use std::sync::{Arc, OnceLock};

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, PostParams};
use kube::{Client, Config};
use tokio::sync::OnceCell;

use cluster_ingress_operator::config::OperatorConfig;
use cluster_ingress_operator::controller::{KubeClientImpl, Reconciler};
use cluster_ingress_operator::crd::{
    self, ClusterIngress, ClusterIngressHighAvailability, ClusterIngressSpec,
};

/// Name of the kind cluster used for integration tests
pub const TEST_CLUSTER_NAME: &str = "cluster-ingress-integration-test";

/// Global lock to ensure cluster is created only once
static CLUSTER_INIT: OnceLock<Result<(), String>> = OnceLock::new();

/// Track if CRD has been installed (async-safe)
static CRD_INSTALLED: OnceCell<Result<(), String>> = OnceCell::const_new();

/// Check if a kind cluster with the given name exists
pub fn kind_cluster_exists(name: &str) -> bool {
    let output = Command::new("kind")
        .args(["get", "clusters"])
        .output()
        .expect("failed to run kind");

    let clusters = String::from_utf8_lossy(&output.stdout);
    clusters.lines().any(|line| line.trim() == name)
}

/// Create a kind cluster for testing
pub fn create_kind_cluster(name: &str) -> Result<(), String> {
    if kind_cluster_exists(name) {
        println!("Kind cluster '{name}' already exists, reusing it");
        return Ok(());
    }

    println!("Creating kind cluster '{name}'...");
    let output = Command::new("kind")
        .args(["create", "cluster", "--name", name, "--wait", "60s"])
        .output()
        .map_err(|e| format!("failed to run kind: {e}"))?;

    if !output.status.success() {
        return Err(format!(
            "failed to create kind cluster: {}",
            String::from_utf8_lossy(&output.stderr)
        ));
    }

    Ok(())
}

/// Create a Kubernetes client connected to the test cluster
pub async fn create_test_client() -> Result<Client, String> {
    let context_name = format!("kind-{TEST_CLUSTER_NAME}");

    let config = Config::from_kubeconfig(&kube::config::KubeConfigOptions {
        context: Some(context_name),
        ..Default::default()
    })
    .await
    .map_err(|e| format!("failed to load kubeconfig: {e}"))?;

    Client::try_from(config).map_err(|e| format!("failed to create client: {e}"))
}

/// Ensure the test cluster is ready (thread-safe, cluster created once)
pub async fn ensure_test_cluster() -> Result<Client, String> {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cluster_result = CLUSTER_INIT.get_or_init(|| create_kind_cluster(TEST_CLUSTER_NAME));
    cluster_result.clone()?;

    let client = create_test_client().await?;

    let crd_result = CRD_INSTALLED
        .get_or_init(|| async {
            let client = create_test_client().await?;
            crd::ensure_crd_installed(&client)
                .await
                .map_err(|e| format!("failed to install CRD: {e}"))
        })
        .await;
    crd_result.clone()?;

    Ok(client)
}

/// Operator configuration isolated to a per-test namespace pair
pub fn test_config(suffix: &str) -> OperatorConfig {
    OperatorConfig::default()
        .namespace(format!("ingress-operator-{suffix}"))
        .router_namespace(format!("ingress-routers-{suffix}"))
}

/// Create the operator namespace if it does not exist
pub async fn ensure_namespace(client: &Client, name: &str) {
    let api: Api<Namespace> = Api::all(client.clone());
    let ns = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    match api.create(&PostParams::default(), &ns).await {
        Ok(_) => {}
        Err(kube::Error::Api(e)) if e.code == 409 => {}
        Err(e) => panic!("failed to create namespace {name}: {e}"),
    }
}

/// Reconciler talking to the test cluster
pub fn reconciler(client: &Client, config: &OperatorConfig) -> Reconciler {
    Reconciler::new(Arc::new(KubeClientImpl::new(client.clone())), config)
}

/// A ClusterIngress in the given namespace
pub fn sample_ingress(name: &str, namespace: &str, cloud: bool) -> ClusterIngress {
    let mut ci = ClusterIngress::new(
        name,
        ClusterIngressSpec {
            ingress_domain: Some(format!("{name}.apps.kind.test")),
            high_availability: Some(if cloud {
                ClusterIngressHighAvailability::cloud()
            } else {
                ClusterIngressHighAvailability::user_defined()
            }),
            ..Default::default()
        },
    );
    ci.metadata.namespace = Some(namespace.to_string());
    ci
}
