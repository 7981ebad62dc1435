//! Error types for the HelidonApp operator

use thiserror::Error;

use crate::workload::DependentKind;

/// Main error type for HelidonApp reconciliation
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error on a read or on the status channel
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// A create or update of a dependent resource was rejected by the API server
    #[error("failed to {verb} {kind} {namespace}/{name}: {source}")]
    Mutation {
        /// "create" or "update"
        verb: &'static str,
        /// Kind of dependent resource
        kind: DependentKind,
        /// Namespace of the dependent (empty for cluster-scoped kinds)
        namespace: String,
        /// Name of the dependent
        name: String,
        /// Underlying API error
        #[source]
        source: kube::Error,
    },

    /// Validation error for HelidonApp specs
    #[error("validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The object delivered to the controller had no namespace or name
    #[error("object is missing {0}")]
    MissingObjectKey(&'static str),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Whether the work queue should redeliver the key after this error.
    ///
    /// Store and mutation failures are transient; validation and malformed
    /// objects need a spec change first.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Kube(_) | Self::Mutation { .. } => true,
            Self::Validation(_) | Self::Serialization(_) | Self::MissingObjectKey(_) => false,
        }
    }
}

/// Returns true if the kube error is an API 404
pub(crate) fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}
