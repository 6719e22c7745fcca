//! ClusterIngress reconciliation
//!
//! A pass ensures the shared router scaffolding, lists every ClusterIngress in
//! the watched namespace and drives each one independently: deleted ingresses
//! are torn down and have their finalizer released, live ones get a router
//! DaemonSet and, when cloud exposed, a LoadBalancer Service owned by it.
//!
//! Per-ingress failures never abort the pass. They are collected in listing
//! order and returned together as [`Error::Aggregate`].

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use k8s_openapi::api::apps::v1::DaemonSet;
use kube::{Resource, ResourceExt};
use tracing::{debug, info, instrument, warn};

use super::client::KubeClient;
use super::object::{ManagedKind, ManagedObject, ObjectKey};
use crate::config::OperatorConfig;
use crate::crd::ClusterIngress;
use crate::error::ReconcileErrors;
use crate::install::InstallConfig;
use crate::manifests::ManifestFactory;
use crate::{Error, FINALIZER};

/// Outcome of [`ensure_created`]
#[derive(Clone, Debug, PartialEq)]
pub enum Applied {
    /// The object was created; holds the stored copy
    Created(ManagedObject),
    /// An object with the same identity was already present
    AlreadyExists(ObjectKey),
}

impl Applied {
    /// Returns true if this call created the object
    pub fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    /// The live object: the created copy, or the existing one fetched from the cluster
    pub async fn adopt(self, kube: &dyn KubeClient) -> Result<ManagedObject, Error> {
        match self {
            Self::Created(object) => Ok(object),
            Self::AlreadyExists(key) => kube
                .get(&key)
                .await
                .map_err(|e| e.context(format!("failed to get {} {key}", key.kind))),
        }
    }
}

/// Create an object, treating "already exists" as success
///
/// Every create the operator performs goes through here, so a pass that
/// overlaps a previous one converges instead of failing.
pub async fn ensure_created(
    kube: &dyn KubeClient,
    object: ManagedObject,
) -> Result<Applied, Error> {
    let key = object.key()?;
    match kube.create(&object).await {
        Ok(created) => {
            info!(kind = %key.kind, object = %key, "created");
            Ok(Applied::Created(created))
        }
        Err(e) if e.is_already_exists() => {
            debug!(kind = %key.kind, object = %key, "already exists");
            Ok(Applied::AlreadyExists(key))
        }
        Err(e) => Err(e.context(format!("failed to create {} {key}", key.kind))),
    }
}

/// Counts from a successful pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// ClusterIngresses whose router was ensured
    pub ensured: usize,
    /// Deleted ClusterIngresses that were torn down
    pub torn_down: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum IngressAction {
    Ensured,
    TornDown,
}

/// Drives routers toward the state declared by ClusterIngresses
pub struct Reconciler {
    kube: Arc<dyn KubeClient>,
    manifests: ManifestFactory,
    namespace: String,
    concurrency: usize,
}

impl Reconciler {
    /// Create a reconciler for the namespace named in `config`
    pub fn new(kube: Arc<dyn KubeClient>, config: &OperatorConfig) -> Self {
        Self {
            kube,
            manifests: ManifestFactory::new(config),
            namespace: config.namespace.clone(),
            concurrency: config.reconcile_concurrency.max(1),
        }
    }

    /// Namespace watched for ClusterIngresses
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Run one full reconciliation pass
    ///
    /// Scaffolding and listing failures abort the pass. Failures for
    /// individual ClusterIngresses are collected and returned together after
    /// every ClusterIngress has been processed.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub async fn reconcile(&self) -> Result<PassSummary, Error> {
        self.ensure_scaffolding().await?;

        let ingresses = self
            .kube
            .list_ingresses(&self.namespace)
            .await
            .map_err(|e| e.context("failed to list clusteringresses"))?;
        debug!(count = ingresses.len(), "listed clusteringresses");

        let this = self;
        let outcomes: Vec<(String, Result<IngressAction, Error>)> =
            stream::iter(ingresses.into_iter().map(move |ci| async move {
                let id = ci.identity();
                let outcome = this.reconcile_ingress(&ci).await;
                (id, outcome)
            }))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut summary = PassSummary::default();
        let mut errors = ReconcileErrors::new();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(IngressAction::Ensured) => summary.ensured += 1,
                Ok(IngressAction::TornDown) => summary.torn_down += 1,
                Err(e) => {
                    warn!(clusteringress = %id, error = %e, "failed to reconcile clusteringress");
                    errors.push(id, e);
                }
            }
        }
        errors.into_result()?;

        info!(
            ensured = summary.ensured,
            torn_down = summary.torn_down,
            "reconciliation pass complete"
        );
        Ok(summary)
    }

    async fn reconcile_ingress(&self, ci: &ClusterIngress) -> Result<IngressAction, Error> {
        if ci.is_deleting() {
            self.teardown(ci).await.map(|_| IngressAction::TornDown)
        } else {
            self.ensure(ci).await.map(|_| IngressAction::Ensured)
        }
    }

    /// Ensure the shared objects every router depends on, in dependency order
    async fn ensure_scaffolding(&self) -> Result<(), Error> {
        let scaffolding: [ManagedObject; 4] = [
            self.manifests.router_cluster_role().into(),
            self.manifests.router_namespace().into(),
            self.manifests.router_service_account().into(),
            self.manifests.router_cluster_role_binding().into(),
        ];
        let mut created = 0;
        for object in scaffolding {
            if ensure_created(self.kube.as_ref(), object).await?.was_created() {
                created += 1;
            }
        }
        if created > 0 {
            info!(created, "created router scaffolding");
        }
        Ok(())
    }

    /// Remove the router of a deleted ClusterIngress, then release its finalizer
    ///
    /// The finalizer stays in place until the DaemonSet delete has returned
    /// success or not-found, so a failed delete is retried on the next pass.
    pub async fn teardown(&self, ci: &ClusterIngress) -> Result<(), Error> {
        let key = self.daemon_set_key(ci)?;
        match self.kube.delete(&key).await {
            Ok(()) => info!(daemonset = %key, "deleted router daemonset"),
            Err(e) if e.is_not_found() => debug!(daemonset = %key, "router daemonset already gone"),
            Err(e) => return Err(e.context(format!("failed to delete daemonset {key}"))),
        }

        if ci.has_finalizer() {
            let mut released = ci.clone();
            released.finalizers_mut().retain(|f| f != FINALIZER);
            self.kube.replace_ingress(&released).await.map_err(|e| {
                e.context(format!(
                    "failed to remove finalizer from clusteringress {}",
                    ci.identity()
                ))
            })?;
            info!(clusteringress = %ci.identity(), "released finalizer");
        }
        Ok(())
    }

    /// Converge the router of a live ClusterIngress
    pub async fn ensure(&self, ci: &ClusterIngress) -> Result<(), Error> {
        let desired = self.manifests.router_daemon_set(ci)?;
        let ci = self.ensure_finalizer(ci).await?;

        let live = ensure_created(self.kube.as_ref(), desired.into())
            .await?
            .adopt(self.kube.as_ref())
            .await?;
        let daemon_set = live
            .into_daemon_set()
            .ok_or_else(|| Error::manifest("router lookup returned a non-daemonset object"))?;

        if ci.spec.is_cloud_exposed() {
            self.ensure_exposure(&ci, &daemon_set).await
        } else {
            self.retract_exposure(&ci, &daemon_set).await
        }
    }

    async fn ensure_finalizer(&self, ci: &ClusterIngress) -> Result<ClusterIngress, Error> {
        if ci.has_finalizer() {
            return Ok(ci.clone());
        }
        let mut held = ci.clone();
        held.finalizers_mut().push(FINALIZER.to_string());
        let stored = self.kube.replace_ingress(&held).await.map_err(|e| {
            e.context(format!(
                "failed to add finalizer to clusteringress {}",
                ci.identity()
            ))
        })?;
        debug!(clusteringress = %ci.identity(), "added finalizer");
        Ok(stored)
    }

    async fn ensure_exposure(&self, ci: &ClusterIngress, owner: &DaemonSet) -> Result<(), Error> {
        let mut service = self.manifests.router_service_cloud(ci)?;
        let owner_ref = owner.controller_owner_ref(&()).ok_or_else(|| {
            Error::manifest(format!(
                "daemonset {} has no uid to own its service",
                owner.name_any()
            ))
        })?;
        service.metadata.owner_references = Some(vec![owner_ref]);
        ensure_created(self.kube.as_ref(), service.into()).await?;
        Ok(())
    }

    /// Delete a LoadBalancer Service left over from when the ingress was cloud exposed
    ///
    /// Only a Service controlled by this router's DaemonSet is removed.
    async fn retract_exposure(&self, ci: &ClusterIngress, owner: &DaemonSet) -> Result<(), Error> {
        let name = ManifestFactory::router_name(ci)?;
        let key = ObjectKey::namespaced(
            ManagedKind::Service,
            self.manifests.router_namespace_name(),
            name,
        );

        let service = match self.kube.get(&key).await {
            Ok(object) => object.into_service().ok_or_else(|| {
                Error::manifest(format!("{key} did not resolve to a service"))
            })?,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.context(format!("failed to get service {key}"))),
        };

        let owner_uid = owner.metadata.uid.as_deref();
        let owned = owner_uid.is_some()
            && service
                .metadata
                .owner_references
                .iter()
                .flatten()
                .any(|r| r.controller == Some(true) && Some(r.uid.as_str()) == owner_uid);
        if !owned {
            debug!(service = %key, "service not owned by router daemonset, leaving it");
            return Ok(());
        }

        match self.kube.delete(&key).await {
            Ok(()) => {
                info!(service = %key, "deleted load balancer service");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.context(format!("failed to delete service {key}"))),
        }
    }

    /// Create the ClusterIngress derived from the install config
    ///
    /// Returns false if it already exists; an existing default is never modified.
    pub async fn ensure_default_ingress(&self, install: &InstallConfig) -> Result<bool, Error> {
        let ci = self.manifests.default_cluster_ingress(install);
        match self.kube.create_ingress(&ci).await {
            Ok(_) => {
                info!(clusteringress = %ci.identity(), "created default clusteringress");
                Ok(true)
            }
            Err(e) if e.is_already_exists() => {
                debug!(clusteringress = %ci.identity(), "default clusteringress already exists");
                Ok(false)
            }
            Err(e) => Err(e.context(format!(
                "failed to create default clusteringress {}",
                ci.identity()
            ))),
        }
    }

    fn daemon_set_key(&self, ci: &ClusterIngress) -> Result<ObjectKey, Error> {
        Ok(ObjectKey::namespaced(
            ManagedKind::DaemonSet,
            self.manifests.router_namespace_name(),
            ManifestFactory::router_name(ci)?,
        ))
    }
}
