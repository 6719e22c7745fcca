//! Runtime configuration for the operator

use std::time::Duration;

use crate::{DEFAULT_OPERATOR_NAMESPACE, DEFAULT_ROUTER_IMAGE, DEFAULT_ROUTER_NAMESPACE};

/// Shortest resync or retry interval the dispatcher will run with
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Settings shared by the reconciler, the manifest factory and the dispatcher
///
/// Built from CLI flags and environment variables in `main`; the defaults
/// match a standard installation.
#[derive(Clone, Debug, PartialEq)]
pub struct OperatorConfig {
    /// Namespace watched for ClusterIngress resources
    pub namespace: String,
    /// Namespace holding router DaemonSets and Services
    pub router_namespace: String,
    /// Router container image
    pub router_image: String,
    /// Maximum ClusterIngresses converged concurrently within one pass
    pub reconcile_concurrency: usize,
    /// Interval between unconditional reconciliation passes
    pub resync_interval: Duration,
    /// Delay before re-running a pass that reported errors
    pub retry_interval: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_OPERATOR_NAMESPACE.to_string(),
            router_namespace: DEFAULT_ROUTER_NAMESPACE.to_string(),
            router_image: DEFAULT_ROUTER_IMAGE.to_string(),
            reconcile_concurrency: 4,
            resync_interval: Duration::from_secs(300),
            retry_interval: Duration::from_secs(5),
        }
    }
}

impl OperatorConfig {
    /// Set the watched namespace
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the router namespace
    pub fn router_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.router_namespace = namespace.into();
        self
    }

    /// Set the router image
    pub fn router_image(mut self, image: impl Into<String>) -> Self {
        self.router_image = image.into();
        self
    }

    /// Set the per-pass concurrency, clamped to at least 1
    pub fn reconcile_concurrency(mut self, concurrency: usize) -> Self {
        self.reconcile_concurrency = concurrency.max(1);
        self
    }

    /// Set the resync interval, clamped to at least [`MIN_INTERVAL`]
    pub fn resync_interval(mut self, interval: Duration) -> Self {
        self.resync_interval = interval.max(MIN_INTERVAL);
        self
    }

    /// Set the retry interval after a failed pass, clamped to at least [`MIN_INTERVAL`]
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval.max(MIN_INTERVAL);
        self
    }
}
