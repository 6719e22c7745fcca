//! Supporting types for the ClusterIngress CRD

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// High availability strategy for a ClusterIngress
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[non_exhaustive]
pub enum HighAvailabilityType {
    /// Expose the router through a cloud load balancer Service
    Cloud,
    /// The administrator provides external reachability themselves
    UserDefined,
}

impl std::str::FromStr for HighAvailabilityType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Cloud" => Ok(Self::Cloud),
            "UserDefined" => Ok(Self::UserDefined),
            _ => Err(crate::Error::validation(format!(
                "invalid high availability type: {s}, expected one of: Cloud, UserDefined"
            ))),
        }
    }
}

impl std::fmt::Display for HighAvailabilityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cloud => write!(f, "Cloud"),
            Self::UserDefined => write!(f, "UserDefined"),
        }
    }
}

/// High availability configuration
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ClusterIngressHighAvailability {
    /// The strategy used to make the router reachable
    #[serde(rename = "type")]
    pub type_: HighAvailabilityType,
}

impl ClusterIngressHighAvailability {
    /// Cloud load balancer exposure
    pub fn cloud() -> Self {
        Self {
            type_: HighAvailabilityType::Cloud,
        }
    }

    /// Exposure left to the administrator
    pub fn user_defined() -> Self {
        Self {
            type_: HighAvailabilityType::UserDefined,
        }
    }
}

/// Equality-based label selector
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Labels that must all match
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
}

impl LabelSelector {
    /// Create a selector from key/value pairs
    pub fn from_labels<K, V>(labels: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            match_labels: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Returns true if the selector matches everything
    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty()
    }

    /// Render as a selector string, e.g. `env=prod,team=web`
    pub fn to_selector_string(&self) -> String {
        self.match_labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub(crate) fn validate(&self, field: &str) -> Result<(), crate::Error> {
        for (key, value) in &self.match_labels {
            if key.is_empty() {
                return Err(crate::Error::validation(format!(
                    "{field} contains an empty label key"
                )));
            }
            if key.contains([',', '=', ' ']) || value.contains([',', '=', ' ']) {
                return Err(crate::Error::validation(format!(
                    "{field} label {key}={value} contains a reserved character"
                )));
            }
        }
        Ok(())
    }
}

/// Where router pods are scheduled
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodePlacement {
    /// Node labels the router pods must be scheduled onto
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<LabelSelector>,
}
