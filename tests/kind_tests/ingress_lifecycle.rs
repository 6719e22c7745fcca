//! Integration tests for the reconciliation lifecycle
//!
//! Each story runs real reconciliation passes against the kind cluster with
//! its own operator and router namespaces.

use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, DeleteParams, PostParams};
use kube::ResourceExt;

use cluster_ingress_operator::crd::{ClusterIngress, ClusterIngressHighAvailability};
use cluster_ingress_operator::FINALIZER;

use super::helpers::{ensure_namespace, ensure_test_cluster, reconciler, sample_ingress, test_config};

/// Story: A cloud-exposed ClusterIngress gets a router and a load balancer
///
/// Expected behavior:
/// - The finalizer is attached to the ClusterIngress
/// - A router DaemonSet named after the ingress exists
/// - A LoadBalancer Service is controlled by that DaemonSet
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_cloud_ingress_is_exposed() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let config = test_config("expose");
    ensure_namespace(&client, &config.namespace).await;

    let ingresses: Api<ClusterIngress> = Api::namespaced(client.clone(), &config.namespace);
    let _ = ingresses
        .create(
            &PostParams::default(),
            &sample_ingress("web", &config.namespace, true),
        )
        .await;

    let r = reconciler(&client, &config);
    r.reconcile().await.expect("first pass should succeed");
    r.reconcile().await.expect("second pass should be a no-op");

    let ci = ingresses.get("web").await.expect("clusteringress exists");
    assert!(ci.finalizers().iter().any(|f| f == FINALIZER));

    let daemon_sets: Api<DaemonSet> = Api::namespaced(client.clone(), &config.router_namespace);
    let ds = daemon_sets
        .get("router-web")
        .await
        .expect("router daemonset exists");

    let services: Api<Service> = Api::namespaced(client.clone(), &config.router_namespace);
    let svc = services
        .get("router-web")
        .await
        .expect("load balancer service exists");
    let owner = &svc.metadata.owner_references.expect("service has an owner")[0];
    assert_eq!(Some(owner.uid.clone()), ds.metadata.uid);
    assert_eq!(owner.controller, Some(true));

    // Switching to UserDefined retracts the load balancer
    let mut ci = ingresses.get("web").await.expect("clusteringress exists");
    ci.spec.high_availability = Some(ClusterIngressHighAvailability::user_defined());
    ingresses
        .replace("web", &PostParams::default(), &ci)
        .await
        .expect("failed to update clusteringress");
    r.reconcile().await.expect("pass after policy change");
    assert!(services.get_opt("router-web").await.unwrap().is_none());

    let _ = ingresses.delete("web", &DeleteParams::default()).await;
    r.reconcile().await.expect("teardown pass");
}

/// Story: Deleting a ClusterIngress removes its router before the record goes
///
/// Expected behavior:
/// - While the finalizer is held the ClusterIngress lingers with a deletion timestamp
/// - The next pass deletes the DaemonSet and releases the finalizer
/// - The ClusterIngress is then erased by the API server
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_deleted_ingress_is_torn_down() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let config = test_config("teardown");
    ensure_namespace(&client, &config.namespace).await;

    let ingresses: Api<ClusterIngress> = Api::namespaced(client.clone(), &config.namespace);
    let _ = ingresses
        .create(
            &PostParams::default(),
            &sample_ingress("internal", &config.namespace, false),
        )
        .await;

    let r = reconciler(&client, &config);
    r.reconcile().await.expect("ensure pass");

    ingresses
        .delete("internal", &DeleteParams::default())
        .await
        .expect("failed to delete clusteringress");
    let lingering = ingresses.get("internal").await.expect("held by finalizer");
    assert!(lingering.metadata.deletion_timestamp.is_some());

    let summary = r.reconcile().await.expect("teardown pass");
    assert_eq!(summary.torn_down, 1);

    let daemon_sets: Api<DaemonSet> = Api::namespaced(client.clone(), &config.router_namespace);
    assert!(daemon_sets.get_opt("router-internal").await.unwrap().is_none());
    assert!(ingresses.get_opt("internal").await.unwrap().is_none());
}
