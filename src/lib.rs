//! Cluster Ingress Operator - runs an ingress router for every ClusterIngress
//!
//! Each `ClusterIngress` in the operator namespace declares one router: a
//! DaemonSet of HAProxy routers in the router namespace and, when the
//! ingress asks for cloud high availability, a LoadBalancer Service in front
//! of it. The operator keeps those objects in line with the declarations and
//! removes a router before letting its ClusterIngress go.
//!
//! # Modules
//!
//! - [`crd`] - The ClusterIngress custom resource
//! - [`manifests`] - Desired router objects built from a ClusterIngress
//! - [`controller`] - Reconciliation passes and the Kubernetes client seam
//! - [`dispatcher`] - Turns watch events into coalesced reconciliation passes
//! - [`install`] - Cluster install config used to derive the default ClusterIngress
//! - [`config`] - Runtime configuration
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod crd;
pub mod dispatcher;
pub mod error;
pub mod install;
pub mod manifests;

pub use error::Error;

// =============================================================================
// Default Configuration Constants
// =============================================================================

/// Finalizer held on every live ClusterIngress until its router is deleted
pub const FINALIZER: &str = "ingress.openshift.io/default-cluster-ingress";

/// Namespace watched for ClusterIngress resources
pub const DEFAULT_OPERATOR_NAMESPACE: &str = "openshift-ingress-operator";

/// Namespace holding the router DaemonSets and Services
pub const DEFAULT_ROUTER_NAMESPACE: &str = "openshift-ingress";

/// Router image used when none is configured
pub const DEFAULT_ROUTER_IMAGE: &str = "openshift/origin-haproxy-router:v4.0.0";

/// Field manager name for server-side apply
pub const FIELD_MANAGER: &str = "cluster-ingress-operator";
