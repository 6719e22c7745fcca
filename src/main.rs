//! Cluster Ingress Operator - runs an ingress router for every ClusterIngress

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::Service;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cluster_ingress_operator::config::OperatorConfig;
use cluster_ingress_operator::controller::{KubeClientImpl, Reconciler};
use cluster_ingress_operator::crd::{self, ClusterIngress};
use cluster_ingress_operator::dispatcher::{self, Dispatcher};
use cluster_ingress_operator::install::InstallConfig;
use cluster_ingress_operator::manifests::managed_by_selector;
use cluster_ingress_operator::{
    DEFAULT_OPERATOR_NAMESPACE, DEFAULT_ROUTER_IMAGE, DEFAULT_ROUTER_NAMESPACE,
};

/// Cluster Ingress Operator - runs an ingress router for every ClusterIngress
#[derive(Parser, Debug)]
#[command(name = "cluster-ingress-operator", version, about, long_about = None)]
struct Cli {
    /// Generate the ClusterIngress CRD manifest and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Watches ClusterIngresses and the routers created for them, and
    /// reconciles the whole operator namespace whenever anything changes.
    Controller(ControllerArgs),
}

/// Controller mode arguments
#[derive(Parser, Debug)]
struct ControllerArgs {
    /// Namespace watched for ClusterIngress resources
    #[arg(long, env = "OPERATOR_NAMESPACE", default_value = DEFAULT_OPERATOR_NAMESPACE)]
    namespace: String,

    /// Namespace the router DaemonSets and Services are created in
    #[arg(long, env = "ROUTER_NAMESPACE", default_value = DEFAULT_ROUTER_NAMESPACE)]
    router_namespace: String,

    /// Router container image
    #[arg(long, env = "ROUTER_IMAGE", default_value = DEFAULT_ROUTER_IMAGE)]
    router_image: String,

    /// ClusterIngresses converged concurrently within one pass
    #[arg(long, env = "RECONCILE_CONCURRENCY", default_value = "4")]
    concurrency: usize,

    /// Seconds between unconditional reconciliation passes
    #[arg(
        long,
        env = "RESYNC_INTERVAL_SECS",
        default_value = "300",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    resync_interval_secs: u64,

    /// Seconds to wait before retrying a failed pass
    #[arg(
        long,
        env = "RETRY_INTERVAL_SECS",
        default_value = "5",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    retry_interval_secs: u64,

    /// Do not create the default ClusterIngress from the install config
    #[arg(long)]
    skip_default_ingress: bool,
}

impl Default for ControllerArgs {
    fn default() -> Self {
        Self::parse_from(["controller"])
    }
}

impl ControllerArgs {
    fn operator_config(&self) -> OperatorConfig {
        OperatorConfig::default()
            .namespace(&self.namespace)
            .router_namespace(&self.router_namespace)
            .router_image(&self.router_image)
            .reconcile_concurrency(self.concurrency)
            .resync_interval(Duration::from_secs(self.resync_interval_secs))
            .retry_interval(Duration::from_secs(self.retry_interval_secs))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // The kube client needs a process-wide crypto provider before any TLS handshake
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install crypto provider: {:?}", e);
        std::process::exit(1);
    }

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&ClusterIngress::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    match cli.command {
        Some(Commands::Controller(args)) => run_controller(args).await,
        None => run_controller(ControllerArgs::default()).await,
    }
}

async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    let config = args.operator_config();
    tracing::info!(
        namespace = %config.namespace,
        router_namespace = %config.router_namespace,
        image = %config.router_image,
        "Cluster ingress operator starting..."
    );

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    crd::ensure_crd_installed(&client)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to install ClusterIngress CRD: {}", e))?;

    let kube = Arc::new(KubeClientImpl::new(client.clone()));
    let reconciler = Arc::new(Reconciler::new(kube, &config));

    if args.skip_default_ingress {
        tracing::info!("Skipping default ClusterIngress");
    } else {
        let install = InstallConfig::load(&client)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read install config: {}", e))?;
        reconciler
            .ensure_default_ingress(&install)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to ensure default ClusterIngress: {}", e))?;
    }

    let dispatcher = Dispatcher::new(reconciler, &config);

    let ingresses: Api<ClusterIngress> = Api::namespaced(client.clone(), &config.namespace);
    let daemon_sets: Api<DaemonSet> = Api::namespaced(client.clone(), &config.router_namespace);
    let services: Api<Service> = Api::namespaced(client, &config.router_namespace);
    let managed = WatcherConfig::default().labels(&managed_by_selector());

    let watches = [
        tokio::spawn(dispatcher::watch(
            ingresses,
            WatcherConfig::default(),
            dispatcher.notifier(),
        )),
        tokio::spawn(dispatcher::watch(
            daemon_sets,
            managed.clone(),
            dispatcher.notifier(),
        )),
        tokio::spawn(dispatcher::watch(services, managed, dispatcher.notifier())),
    ];

    tracing::info!("Starting ClusterIngress dispatcher");
    let passes = dispatcher
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await;

    for watch in watches {
        watch.abort();
    }

    tracing::info!(passes, "Cluster ingress operator shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller_args(extra: &[&str]) -> Result<ControllerArgs, clap::Error> {
        let mut argv = vec!["cluster-ingress-operator", "controller"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv)?.command {
            Some(Commands::Controller(args)) => Ok(args),
            None => unreachable!("controller subcommand was given"),
        }
    }

    /// Story: A zero interval is refused at the command line instead of
    /// reaching the dispatcher's timers
    #[test]
    fn story_zero_intervals_are_rejected() {
        assert!(controller_args(&["--resync-interval-secs", "0"]).is_err());
        assert!(controller_args(&["--retry-interval-secs", "0"]).is_err());

        let args = controller_args(&["--resync-interval-secs", "1"]).unwrap();
        assert_eq!(
            args.operator_config().resync_interval,
            Duration::from_secs(1)
        );
    }

    #[test]
    fn defaults_map_into_operator_config() {
        let config = controller_args(&[]).unwrap().operator_config();
        assert_eq!(config.namespace, DEFAULT_OPERATOR_NAMESPACE);
        assert_eq!(config.resync_interval, Duration::from_secs(300));
        assert_eq!(config.retry_interval, Duration::from_secs(5));
    }
}
