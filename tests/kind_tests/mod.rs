//! Integration tests for the cluster ingress operator
//!
//! These tests require a Kubernetes cluster (kind) to run and tell the story
//! of how cluster administrators interact with ClusterIngresses.
//!
//! # Test Organization
//!
//! - `crd_operations`: Stories about creating and reading ClusterIngress
//!   resources through the Kubernetes API
//!
//! - `ingress_lifecycle`: Stories about reconciliation passes creating,
//!   exposing and tearing down routers
//!
//! # Running These Tests
//!
//! ```bash
//! cargo test --test kind -- --ignored --test-threads=1
//! ```

mod crd_operations;
mod helpers;
mod ingress_lifecycle;
