//! The closed set of objects the operator creates and deletes

use std::fmt;

use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{Namespace, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::Error;

/// Kinds of objects managed by the operator
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ManagedKind {
    /// rbac.authorization.k8s.io/v1 ClusterRole
    ClusterRole,
    /// v1 Namespace
    Namespace,
    /// v1 ServiceAccount
    ServiceAccount,
    /// rbac.authorization.k8s.io/v1 ClusterRoleBinding
    ClusterRoleBinding,
    /// apps/v1 DaemonSet
    DaemonSet,
    /// v1 Service
    Service,
}

impl ManagedKind {
    /// Returns true for kinds that live inside a namespace
    pub fn is_namespaced(self) -> bool {
        matches!(self, Self::ServiceAccount | Self::DaemonSet | Self::Service)
    }
}

impl fmt::Display for ManagedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClusterRole => write!(f, "cluster role"),
            Self::Namespace => write!(f, "namespace"),
            Self::ServiceAccount => write!(f, "service account"),
            Self::ClusterRoleBinding => write!(f, "cluster role binding"),
            Self::DaemonSet => write!(f, "daemonset"),
            Self::Service => write!(f, "service"),
        }
    }
}

/// Identity of a managed object: kind, optional namespace and name
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    /// Object kind
    pub kind: ManagedKind,
    /// Namespace, for namespaced kinds
    pub namespace: Option<String>,
    /// Object name
    pub name: String,
}

impl ObjectKey {
    /// Key of a namespaced object
    pub fn namespaced(
        kind: ManagedKind,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Key of a cluster-scoped object
    pub fn cluster(kind: ManagedKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: None,
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A typed object the operator manages
#[derive(Clone, Debug, PartialEq)]
pub enum ManagedObject {
    /// Router cluster role
    ClusterRole(ClusterRole),
    /// Router namespace
    Namespace(Namespace),
    /// Router service account
    ServiceAccount(ServiceAccount),
    /// Router cluster role binding
    ClusterRoleBinding(ClusterRoleBinding),
    /// Per-ingress router
    DaemonSet(DaemonSet),
    /// Per-ingress load balancer
    Service(Service),
}

impl ManagedObject {
    /// Kind of the wrapped object
    pub fn kind(&self) -> ManagedKind {
        match self {
            Self::ClusterRole(_) => ManagedKind::ClusterRole,
            Self::Namespace(_) => ManagedKind::Namespace,
            Self::ServiceAccount(_) => ManagedKind::ServiceAccount,
            Self::ClusterRoleBinding(_) => ManagedKind::ClusterRoleBinding,
            Self::DaemonSet(_) => ManagedKind::DaemonSet,
            Self::Service(_) => ManagedKind::Service,
        }
    }

    /// Metadata of the wrapped object
    pub fn meta(&self) -> &ObjectMeta {
        match self {
            Self::ClusterRole(o) => &o.metadata,
            Self::Namespace(o) => &o.metadata,
            Self::ServiceAccount(o) => &o.metadata,
            Self::ClusterRoleBinding(o) => &o.metadata,
            Self::DaemonSet(o) => &o.metadata,
            Self::Service(o) => &o.metadata,
        }
    }

    /// Identity of the wrapped object
    ///
    /// Fails if the object has no name, or a namespaced object has no namespace.
    pub fn key(&self) -> Result<ObjectKey, Error> {
        let kind = self.kind();
        let meta = self.meta();
        let name = meta
            .name
            .clone()
            .ok_or_else(|| Error::manifest(format!("{kind} has no name")))?;

        if kind.is_namespaced() {
            let namespace = meta
                .namespace
                .clone()
                .ok_or_else(|| Error::manifest(format!("{kind} {name} has no namespace")))?;
            Ok(ObjectKey::namespaced(kind, namespace, name))
        } else {
            Ok(ObjectKey::cluster(kind, name))
        }
    }

    /// Unwrap a DaemonSet
    pub fn into_daemon_set(self) -> Option<DaemonSet> {
        match self {
            Self::DaemonSet(ds) => Some(ds),
            _ => None,
        }
    }

    /// Unwrap a Service
    pub fn into_service(self) -> Option<Service> {
        match self {
            Self::Service(svc) => Some(svc),
            _ => None,
        }
    }
}

macro_rules! impl_from_object {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for ManagedObject {
                fn from(object: $variant) -> Self {
                    Self::$variant(object)
                }
            }
        )*
    };
}

impl_from_object!(
    ClusterRole,
    Namespace,
    ServiceAccount,
    ClusterRoleBinding,
    DaemonSet,
    Service,
);

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str, namespace: Option<&str>) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: namespace.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn namespaced_key_includes_namespace() {
        let ds = DaemonSet {
            metadata: named("router-web", Some("openshift-ingress")),
            ..Default::default()
        };
        let key = ManagedObject::from(ds).key().unwrap();
        assert_eq!(key.kind, ManagedKind::DaemonSet);
        assert_eq!(key.to_string(), "openshift-ingress/router-web");
    }

    #[test]
    fn cluster_scoped_key_ignores_namespace() {
        let role = ClusterRole {
            metadata: named("openshift-ingress-router", None),
            ..Default::default()
        };
        let key = ManagedObject::from(role).key().unwrap();
        assert_eq!(
            key,
            ObjectKey::cluster(ManagedKind::ClusterRole, "openshift-ingress-router")
        );
    }

    #[test]
    fn key_requires_name_and_namespace() {
        let svc = Service {
            metadata: named("router-web", None),
            ..Default::default()
        };
        let err = ManagedObject::from(svc).key().unwrap_err();
        assert!(err.to_string().contains("service router-web has no namespace"));

        let ns = Namespace::default();
        assert!(ManagedObject::from(ns).key().is_err());
    }

    #[test]
    fn unwrap_helpers_match_variant() {
        let ds = ManagedObject::from(DaemonSet::default());
        assert!(ds.clone().into_service().is_none());
        assert!(ds.into_daemon_set().is_some());
    }
}
