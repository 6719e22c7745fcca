//! Custom Resource Definitions for the ingress operator

use std::time::Duration;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::wait::{await_condition, conditions};
use kube::{Client, CustomResourceExt};
use tracing::info;

use crate::{Error, FIELD_MANAGER};

mod ingress;
mod types;

pub use ingress::{ClusterIngress, ClusterIngressSpec};
pub use types::{
    ClusterIngressHighAvailability, HighAvailabilityType, LabelSelector, NodePlacement,
};

/// How long startup waits for the API server to serve ClusterIngresses
pub const CRD_ESTABLISH_TIMEOUT: Duration = Duration::from_secs(30);

/// Install the ClusterIngress CRD and wait until it is established
///
/// Applied server-side on every start so the stored schema always matches
/// this binary. Returns only once ClusterIngresses can be created.
pub async fn ensure_crd_installed(client: &Client) -> Result<(), Error> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let name = ClusterIngress::crd_name();

    info!(crd = name, "Installing ClusterIngress CRD...");
    crds.patch(
        name,
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(&ClusterIngress::crd()),
    )
    .await
    .map_err(|e| Error::from(e).context(format!("couldn't apply crd {name}")))?;

    let established = await_condition(crds, name, conditions::is_crd_established());
    match tokio::time::timeout(CRD_ESTABLISH_TIMEOUT, established).await {
        Ok(Ok(_)) => {
            info!(crd = name, "ClusterIngress CRD established");
            Ok(())
        }
        Ok(Err(e)) => Err(Error::crd(format!("watching crd {name} failed: {e}"))),
        Err(_) => Err(Error::crd(format!(
            "crd {name} not established after {}s",
            CRD_ESTABLISH_TIMEOUT.as_secs()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Story: The applied CRD and the waited-on CRD are the same object
    #[test]
    fn story_installed_crd_name_matches_generated_crd() {
        let crd = ClusterIngress::crd();
        assert_eq!(crd.metadata.name.as_deref(), Some(ClusterIngress::crd_name()));
        assert_eq!(ClusterIngress::crd_name(), "clusteringresses.ingress.openshift.io");
    }

    #[test]
    fn crd_errors_render_with_prefix() {
        let err = Error::crd("crd clusteringresses.ingress.openshift.io not established after 30s");
        assert!(err.to_string().starts_with("crd error: "));
    }
}
