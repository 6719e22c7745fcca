//! Cluster install config
//!
//! The installer leaves its configuration in the `cluster-config-v1`
//! ConfigMap in `kube-system`. The operator only reads the cluster name,
//! base domain and platform from it, to derive the default ClusterIngress.

use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client};
use serde::Deserialize;
use tracing::debug;

use crate::Error;

/// Namespace containing the install config ConfigMap
pub const INSTALL_CONFIG_NAMESPACE: &str = "kube-system";

/// Name of the install config ConfigMap
pub const INSTALL_CONFIG_NAME: &str = "cluster-config-v1";

/// Data key holding the install config YAML
pub const INSTALL_CONFIG_KEY: &str = "install-config";

/// Subset of the cluster install config used by the operator
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstallConfig {
    /// Cluster metadata
    pub metadata: InstallMetadata,
    /// Base DNS domain of the cluster
    pub base_domain: String,
    /// Infrastructure platform
    #[serde(default)]
    pub platform: Platform,
}

/// Cluster metadata from the install config
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct InstallMetadata {
    /// Cluster name
    pub name: String,
}

/// Infrastructure platform; at most one field is set
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Platform {
    /// Amazon Web Services
    #[serde(default)]
    pub aws: Option<AwsPlatform>,
    /// libvirt (development)
    #[serde(default)]
    pub libvirt: Option<LibvirtPlatform>,
}

/// AWS platform settings
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct AwsPlatform {
    /// AWS region
    #[serde(default)]
    pub region: Option<String>,
}

/// libvirt platform settings
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LibvirtPlatform {
    /// libvirt connection URI
    #[serde(default, rename = "URI")]
    pub uri: Option<String>,
}

impl InstallConfig {
    /// Parse install config YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::install_config(format!("invalid install config: {e}")))?;
        if config.metadata.name.is_empty() {
            return Err(Error::install_config("metadata.name must not be empty"));
        }
        if config.base_domain.is_empty() {
            return Err(Error::install_config("baseDomain must not be empty"));
        }
        Ok(config)
    }

    /// Extract the install config from its ConfigMap
    pub fn from_config_map(config_map: &ConfigMap) -> Result<Self, Error> {
        let yaml = config_map
            .data
            .as_ref()
            .and_then(|d| d.get(INSTALL_CONFIG_KEY))
            .ok_or_else(|| {
                Error::install_config(format!(
                    "configmap {INSTALL_CONFIG_NAMESPACE}/{INSTALL_CONFIG_NAME} has no {INSTALL_CONFIG_KEY} key"
                ))
            })?;
        Self::from_yaml(yaml)
    }

    /// Read the install config from the cluster
    pub async fn load(client: &Client) -> Result<Self, Error> {
        let api: Api<ConfigMap> = Api::namespaced(client.clone(), INSTALL_CONFIG_NAMESPACE);
        let config_map = api.get(INSTALL_CONFIG_NAME).await.map_err(|e| {
            Error::from(e).context(format!(
                "couldn't get configmap {INSTALL_CONFIG_NAMESPACE}/{INSTALL_CONFIG_NAME}"
            ))
        })?;
        let config = Self::from_config_map(&config_map)?;
        debug!(cluster = %config.metadata.name, "loaded install config");
        Ok(config)
    }

    /// Domain the default router serves: `apps.<cluster>.<base domain>`
    pub fn ingress_domain(&self) -> String {
        format!("apps.{}.{}", self.metadata.name, self.base_domain)
    }

    /// Returns true if the platform provisions cloud load balancers
    pub fn is_cloud_platform(&self) -> bool {
        self.platform.aws.is_some()
    }
}
