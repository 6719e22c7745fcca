//! ClusterIngress Custom Resource Definition
//!
//! A ClusterIngress declares one router deployment for the cluster. The
//! operator turns each one into a router DaemonSet and, for cloud
//! high availability, a LoadBalancer Service in front of it.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    ClusterIngressHighAvailability, HighAvailabilityType, LabelSelector, NodePlacement,
};
use crate::FINALIZER;

/// Specification for a ClusterIngress
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "ingress.openshift.io",
    version = "v1alpha1",
    kind = "ClusterIngress",
    plural = "clusteringresses",
    namespaced,
    printcolumn = r#"{"name":"Domain","type":"string","jsonPath":".spec.ingressDomain"}"#,
    printcolumn = r#"{"name":"HA","type":"string","jsonPath":".spec.highAvailability.type"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterIngressSpec {
    /// Domain the router serves, e.g. `apps.mycluster.example.com`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_domain: Option<String>,

    /// Scheduling constraints for router pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_placement: Option<NodePlacement>,

    /// Secret holding the router's default serving certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_certificate_secret: Option<String>,

    /// Only admit routes from namespaces matching this selector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<LabelSelector>,

    /// Only admit routes matching this selector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_selector: Option<LabelSelector>,

    /// How the router is made reachable; absent behaves like UserDefined: no load balancer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_availability: Option<ClusterIngressHighAvailability>,
}

impl ClusterIngressSpec {
    /// Returns true if the router should be fronted by a cloud load balancer
    pub fn is_cloud_exposed(&self) -> bool {
        matches!(
            self.high_availability,
            Some(ClusterIngressHighAvailability {
                type_: HighAvailabilityType::Cloud
            })
        )
    }

    /// Validate the ingress specification
    pub fn validate(&self) -> Result<(), crate::Error> {
        if let Some(domain) = &self.ingress_domain {
            if domain.is_empty() {
                return Err(crate::Error::validation("ingressDomain must not be empty"));
            }
            if domain.starts_with('.') || domain.ends_with('.') || domain.contains("..") {
                return Err(crate::Error::validation(format!(
                    "ingressDomain {domain:?} is not a valid DNS name"
                )));
            }
            if domain.chars().any(|c| c.is_whitespace() || c.is_uppercase()) {
                return Err(crate::Error::validation(format!(
                    "ingressDomain {domain:?} must be lowercase without whitespace"
                )));
            }
        }
        if let Some(selector) = &self.namespace_selector {
            selector.validate("namespaceSelector")?;
        }
        if let Some(selector) = &self.route_selector {
            selector.validate("routeSelector")?;
        }
        if let Some(selector) = self
            .node_placement
            .as_ref()
            .and_then(|p| p.node_selector.as_ref())
        {
            selector.validate("nodePlacement.nodeSelector")?;
        }
        Ok(())
    }
}

impl ClusterIngress {
    /// `namespace/name` identity used in logs and aggregated errors
    pub fn identity(&self) -> String {
        match self.namespace() {
            Some(ns) => format!("{}/{}", ns, self.name_any()),
            None => self.name_any(),
        }
    }

    /// Returns true once deletion has been requested
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Returns true if the operator's finalizer is present
    pub fn has_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == FINALIZER)
    }
}
