//! Integration tests for CRD operations
//!
//! These tests tell the story of how administrators work with ClusterIngress
//! resources through the Kubernetes API before the operator touches them.

use kube::api::{Api, DeleteParams, PostParams};

use cluster_ingress_operator::crd::{self, ClusterIngress, HighAvailabilityType, LabelSelector};

use super::helpers::{create_test_client, ensure_namespace, ensure_test_cluster, sample_ingress};

const NAMESPACE: &str = "ingress-crd-test";

/// Story: An administrator declares a cloud-exposed router
///
/// Expected behavior:
/// - The ClusterIngress is stored with every spec field intact
/// - The high availability policy round-trips through the API server
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_admin_declares_cloud_router() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    ensure_namespace(&client, NAMESPACE).await;
    let api: Api<ClusterIngress> = Api::namespaced(client.clone(), NAMESPACE);
    let _ = api.delete("public", &DeleteParams::default()).await;

    let mut ci = sample_ingress("public", NAMESPACE, true);
    ci.spec.route_selector = Some(LabelSelector::from_labels([("shard", "public")]));

    let created = api
        .create(&PostParams::default(), &ci)
        .await
        .expect("failed to create clusteringress");

    assert_eq!(created.spec, ci.spec);
    assert_eq!(
        created.spec.high_availability.map(|ha| ha.type_),
        Some(HighAvailabilityType::Cloud)
    );

    let _ = api.delete("public", &DeleteParams::default()).await;
}

/// Story: Two ClusterIngresses can share a namespace and are listed separately
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_admin_lists_ingresses() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    ensure_namespace(&client, NAMESPACE).await;
    let api: Api<ClusterIngress> = Api::namespaced(client.clone(), NAMESPACE);

    for name in ["internal", "partner"] {
        let _ = api.delete(name, &DeleteParams::default()).await;
        api.create(&PostParams::default(), &sample_ingress(name, NAMESPACE, false))
            .await
            .expect("failed to create clusteringress");
    }

    let names: Vec<String> = api
        .list(&Default::default())
        .await
        .expect("failed to list clusteringresses")
        .items
        .into_iter()
        .filter_map(|ci| ci.metadata.name)
        .collect();
    assert!(names.contains(&"internal".to_string()));
    assert!(names.contains(&"partner".to_string()));

    for name in ["internal", "partner"] {
        let _ = api.delete(name, &DeleteParams::default()).await;
    }
}

/// Story: Once the operator's CRD install returns, ClusterIngresses can be created
///
/// Expected behavior:
/// - Re-applying the CRD waits for it to be established again
/// - A create issued immediately afterwards is served, not a 404
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_create_right_after_crd_install() {
    ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let client = create_test_client().await.expect("failed to create client");
    ensure_namespace(&client, NAMESPACE).await;

    crd::ensure_crd_installed(&client)
        .await
        .expect("crd should become established");

    let api: Api<ClusterIngress> = Api::namespaced(client.clone(), NAMESPACE);
    let _ = api.delete("fresh", &DeleteParams::default()).await;
    api.create(&PostParams::default(), &sample_ingress("fresh", NAMESPACE, false))
        .await
        .expect("clusteringress create right after install");

    let _ = api.delete("fresh", &DeleteParams::default()).await;
}
