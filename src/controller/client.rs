//! Kubernetes client abstraction used by the reconciler

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{Namespace, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

#[cfg(test)]
use mockall::automock;

use super::object::{ManagedKind, ManagedObject, ObjectKey};
use crate::crd::ClusterIngress;
use crate::Error;

/// Trait abstracting the Kubernetes API operations the reconciler needs
///
/// Create reports an existing object as an error for which
/// [`Error::is_already_exists`] is true; get and delete report an absent
/// object as an error for which [`Error::is_not_found`] is true. This
/// trait allows mocking the cluster in tests.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Create an object, returning the stored copy with server-assigned fields
    async fn create(&self, object: &ManagedObject) -> Result<ManagedObject, Error>;

    /// Fetch the live copy of an object
    async fn get(&self, key: &ObjectKey) -> Result<ManagedObject, Error>;

    /// Delete an object; dependents are garbage collected in the background
    async fn delete(&self, key: &ObjectKey) -> Result<(), Error>;

    /// List ClusterIngresses in a namespace
    async fn list_ingresses(&self, namespace: &str) -> Result<Vec<ClusterIngress>, Error>;

    /// Create a ClusterIngress
    async fn create_ingress(&self, ingress: &ClusterIngress) -> Result<ClusterIngress, Error>;

    /// Replace a ClusterIngress, honouring its resourceVersion
    async fn replace_ingress(&self, ingress: &ClusterIngress) -> Result<ClusterIngress, Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaced<K>(&self, key_namespace: Option<&str>) -> Result<Api<K>, Error>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        let namespace = require_namespace::<K>(key_namespace)?;
        Ok(Api::namespaced(self.client.clone(), namespace))
    }

    fn cluster<K>(&self) -> Api<K>
    where
        K: Resource,
        K::DynamicType: Default,
    {
        Api::all(self.client.clone())
    }
}

fn require_namespace<K>(namespace: Option<&str>) -> Result<&str, Error>
where
    K: Resource<Scope = NamespaceResourceScope>,
    K::DynamicType: Default,
{
    namespace.ok_or_else(|| {
        let dt = K::DynamicType::default();
        let kind = K::kind(&dt).to_string();
        Error::manifest(format!("{kind} requires a namespace"))
    })
}

async fn create_in<K>(api: Api<K>, object: &K) -> Result<K, Error>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    Ok(api.create(&PostParams::default(), object).await?)
}

async fn delete_in<K>(api: Api<K>, name: &str) -> Result<(), Error>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    api.delete(name, &DeleteParams::background()).await?;
    Ok(())
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn create(&self, object: &ManagedObject) -> Result<ManagedObject, Error> {
        let ns = object.meta().namespace.as_deref();
        let created: ManagedObject = match object {
            ManagedObject::ClusterRole(o) => create_in(self.cluster::<ClusterRole>(), o).await?.into(),
            ManagedObject::Namespace(o) => create_in(self.cluster::<Namespace>(), o).await?.into(),
            ManagedObject::ClusterRoleBinding(o) => {
                create_in(self.cluster::<ClusterRoleBinding>(), o).await?.into()
            }
            ManagedObject::ServiceAccount(o) => {
                create_in(self.namespaced::<ServiceAccount>(ns)?, o).await?.into()
            }
            ManagedObject::DaemonSet(o) => create_in(self.namespaced::<DaemonSet>(ns)?, o).await?.into(),
            ManagedObject::Service(o) => create_in(self.namespaced::<Service>(ns)?, o).await?.into(),
        };
        Ok(created)
    }

    async fn get(&self, key: &ObjectKey) -> Result<ManagedObject, Error> {
        let ns = key.namespace.as_deref();
        let name = key.name.as_str();
        let object: ManagedObject = match key.kind {
            ManagedKind::ClusterRole => self.cluster::<ClusterRole>().get(name).await?.into(),
            ManagedKind::Namespace => self.cluster::<Namespace>().get(name).await?.into(),
            ManagedKind::ClusterRoleBinding => {
                self.cluster::<ClusterRoleBinding>().get(name).await?.into()
            }
            ManagedKind::ServiceAccount => {
                self.namespaced::<ServiceAccount>(ns)?.get(name).await?.into()
            }
            ManagedKind::DaemonSet => self.namespaced::<DaemonSet>(ns)?.get(name).await?.into(),
            ManagedKind::Service => self.namespaced::<Service>(ns)?.get(name).await?.into(),
        };
        Ok(object)
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), Error> {
        let ns = key.namespace.as_deref();
        let name = key.name.as_str();
        match key.kind {
            ManagedKind::ClusterRole => delete_in(self.cluster::<ClusterRole>(), name).await,
            ManagedKind::Namespace => delete_in(self.cluster::<Namespace>(), name).await,
            ManagedKind::ClusterRoleBinding => {
                delete_in(self.cluster::<ClusterRoleBinding>(), name).await
            }
            ManagedKind::ServiceAccount => {
                delete_in(self.namespaced::<ServiceAccount>(ns)?, name).await
            }
            ManagedKind::DaemonSet => delete_in(self.namespaced::<DaemonSet>(ns)?, name).await,
            ManagedKind::Service => delete_in(self.namespaced::<Service>(ns)?, name).await,
        }
    }

    async fn list_ingresses(&self, namespace: &str) -> Result<Vec<ClusterIngress>, Error> {
        let api: Api<ClusterIngress> = Api::namespaced(self.client.clone(), namespace);
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items)
    }

    async fn create_ingress(&self, ingress: &ClusterIngress) -> Result<ClusterIngress, Error> {
        let api: Api<ClusterIngress> = self.namespaced(ingress.namespace().as_deref())?;
        Ok(api.create(&PostParams::default(), ingress).await?)
    }

    async fn replace_ingress(&self, ingress: &ClusterIngress) -> Result<ClusterIngress, Error> {
        let api: Api<ClusterIngress> = self.namespaced(ingress.namespace().as_deref())?;
        Ok(api
            .replace(&ingress.name_any(), &PostParams::default(), ingress)
            .await?)
    }
}
