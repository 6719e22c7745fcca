//! Reconciliation of ClusterIngresses into router infrastructure
//!
//! [`Reconciler`] implements a full pass over the watched namespace;
//! [`KubeClient`] is the seam to the API server so the pass can run against
//! a mock or in-memory cluster in tests.

mod client;
mod object;
mod reconciler;

pub use client::{KubeClient, KubeClientImpl};
pub use object::{ManagedKind, ManagedObject, ObjectKey};
pub use reconciler::{ensure_created, Applied, PassSummary, Reconciler};

#[cfg(test)]
pub use client::MockKubeClient;
