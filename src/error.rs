//! Error types for the cluster ingress operator

use std::fmt;

use thiserror::Error;

/// Main error type for operator operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// A desired object could not be built from a ClusterIngress
    #[error("manifest error: {0}")]
    Manifest(String),

    /// Validation error for CRD specs
    #[error("validation error: {0}")]
    Validation(String),

    /// The ClusterIngress CRD could not be installed or never became established
    #[error("crd error: {0}")]
    Crd(String),

    /// The cluster install config is missing or malformed
    #[error("install config error: {0}")]
    InstallConfig(String),

    /// An error annotated with the operation and object it happened on
    #[error("{context}: {source}")]
    Context {
        /// What was being attempted, e.g. `couldn't create daemonset openshift-ingress/router-default`
        context: String,
        /// The underlying failure
        #[source]
        source: Box<Error>,
    },

    /// One or more ClusterIngresses failed to converge during a pass
    #[error("{0}")]
    Aggregate(ReconcileErrors),
}

impl Error {
    /// Create a manifest error with the given message
    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::Manifest(msg.into())
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a CRD installation error with the given message
    pub fn crd(msg: impl Into<String>) -> Self {
        Self::Crd(msg.into())
    }

    /// Create an install config error with the given message
    pub fn install_config(msg: impl Into<String>) -> Self {
        Self::InstallConfig(msg.into())
    }

    /// Wrap this error with a description of the failed operation
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns true if the API server rejected a create because the object exists
    pub fn is_already_exists(&self) -> bool {
        match self.root() {
            Error::Kube(kube::Error::Api(resp)) => {
                resp.code == 409 && resp.reason == "AlreadyExists"
            }
            _ => false,
        }
    }

    /// Returns true if the API server reported the object as absent
    pub fn is_not_found(&self) -> bool {
        match self.root() {
            Error::Kube(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    /// The innermost error, looking through any added context
    fn root(&self) -> &Error {
        let mut err = self;
        while let Error::Context { source, .. } = err {
            err = source;
        }
        err
    }
}

/// A single ClusterIngress that failed to converge
#[derive(Debug)]
pub struct DeclarationFailure {
    /// `namespace/name` of the ClusterIngress
    pub declaration: String,
    /// Why it failed
    pub error: Error,
}

/// Per-ClusterIngress failures from one reconciliation pass, in listing order
#[derive(Debug, Default)]
pub struct ReconcileErrors {
    failures: Vec<DeclarationFailure>,
}

impl ReconcileErrors {
    /// Create an empty error set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for the given ClusterIngress
    pub fn push(&mut self, declaration: impl Into<String>, error: Error) {
        self.failures.push(DeclarationFailure {
            declaration: declaration.into(),
            error,
        });
    }

    /// Returns true if no failures were recorded
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of failed ClusterIngresses
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Failures in the order the ClusterIngresses were listed
    pub fn failures(&self) -> &[DeclarationFailure] {
        &self.failures
    }

    /// Identities of the failed ClusterIngresses
    pub fn declarations(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.declaration.as_str())
    }

    /// Turn the set into `Ok(())` when empty, or an aggregate error
    pub fn into_result(self) -> Result<(), Error> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Aggregate(self))
        }
    }
}

impl fmt::Display for ReconcileErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.failures.as_slice() {
            [] => write!(f, "no errors"),
            [only] => write!(f, "clusteringress {}: {}", only.declaration, only.error),
            many => {
                write!(f, "[")?;
                for (i, failure) in many.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "clusteringress {}: {}", failure.declaration, failure.error)?;
                }
                write!(f, "]")
            }
        }
    }
}
