//! Event dispatch
//!
//! Watch events only say that something changed. Every notification is
//! collapsed into a single pending trigger on a bounded queue, and one worker
//! turns triggers into full reconciliation passes. A burst of events while a
//! pass is running therefore costs one extra pass, not one per event.

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{OperatorConfig, MIN_INTERVAL};
use crate::controller::{PassSummary, Reconciler};
use crate::Error;

/// Handle used by watchers to request a reconciliation pass
#[derive(Clone, Debug)]
pub struct Notifier {
    tx: mpsc::Sender<()>,
}

impl Notifier {
    /// Request a pass because `kind` object `identity` changed
    ///
    /// Returns true if a new pass was queued, false if one was already
    /// pending or the dispatcher has stopped.
    pub fn notify(&self, kind: &str, identity: &str) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => {
                debug!(kind, object = identity, "queued reconciliation");
                true
            }
            Err(TrySendError::Full(())) => {
                debug!(kind, object = identity, "reconciliation already pending");
                false
            }
            Err(TrySendError::Closed(())) => false,
        }
    }

    /// Returns true once the dispatcher has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Runs reconciliation passes on demand, on a resync timer and after failures
pub struct Dispatcher {
    reconciler: Arc<Reconciler>,
    tx: mpsc::Sender<()>,
    rx: mpsc::Receiver<()>,
    resync_interval: Duration,
    retry_interval: Duration,
}

impl Dispatcher {
    /// Create a dispatcher driving `reconciler`
    pub fn new(reconciler: Arc<Reconciler>, config: &OperatorConfig) -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            reconciler,
            tx,
            rx,
            resync_interval: config.resync_interval.max(MIN_INTERVAL),
            retry_interval: config.retry_interval.max(MIN_INTERVAL),
        }
    }

    /// A handle for queueing passes
    pub fn notifier(&self) -> Notifier {
        Notifier {
            tx: self.tx.clone(),
        }
    }

    /// Run passes until `shutdown` completes, returning how many ran
    ///
    /// The first pass starts immediately. A pass in progress is allowed to
    /// finish before shutdown is observed. The resync timer restarts after
    /// every pass, so it only fires after a quiet `resync_interval`.
    pub async fn run_until<F>(mut self, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut resync = tokio::time::interval(self.resync_interval);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let retry = tokio::time::sleep(self.retry_interval);
        tokio::pin!(retry);
        let mut retry_armed = false;
        let mut passes = 0;

        info!(
            resync_secs = self.resync_interval.as_secs(),
            "dispatcher started"
        );
        loop {
            // Arms are polled in order so a due resync tick and queued
            // notifications are consumed by the same pass
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = resync.tick() => debug!("resync"),
                Some(()) = self.rx.recv() => {}
                _ = &mut retry, if retry_armed => debug!("retrying failed pass"),
            }

            // Anything queued so far is covered by the pass about to start
            while self.rx.try_recv().is_ok() {}
            retry_armed = false;

            passes += 1;
            if self.run_pass().await.is_err() {
                retry.as_mut().reset(Instant::now() + self.retry_interval);
                retry_armed = true;
            }
            resync.reset();
        }

        info!(passes, "dispatcher stopped");
        passes
    }

    pub(crate) async fn run_pass(&self) -> Result<PassSummary, Error> {
        self.reconciler.reconcile().await.inspect_err(|e| {
            error!(error = %e, "reconciliation pass failed");
        })
    }
}

/// Forward watch events for `K` to `notifier` until the dispatcher stops
///
/// Watch errors are logged and the stream backs off and resumes.
pub async fn watch<K>(api: Api<K>, config: watcher::Config, notifier: Notifier)
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
    K::DynamicType: Default,
{
    let dt = K::DynamicType::default();
    let kind = K::kind(&dt).to_string();
    let mut stream = watcher::watcher(api, config).default_backoff().boxed();
    info!(kind = %kind, "watch started");

    while let Some(event) = stream.next().await {
        match event {
            Ok(Event::Apply(object)) | Ok(Event::Delete(object)) => {
                notifier.notify(&kind, &identity(&object));
            }
            Ok(Event::InitDone) => {
                notifier.notify(&kind, "initial list");
            }
            Ok(Event::Init) | Ok(Event::InitApply(_)) => {}
            Err(e) => warn!(kind = %kind, error = %e, "watch error"),
        }
        if notifier.is_closed() {
            break;
        }
    }

    info!(kind = %kind, "watch stopped");
}

fn identity<K: Resource>(object: &K) -> String {
    match object.namespace() {
        Some(ns) => format!("{}/{}", ns, object.name_any()),
        None => object.name_any(),
    }
}
