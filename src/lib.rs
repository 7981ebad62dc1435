//! Helidon operator - Kubernetes controller for HelidonApp resources
//!
//! A HelidonApp declares one application. The operator keeps four dependent
//! resources in line with it:
//!
//! - the target namespace, with Istio sidecar injection enabled
//! - a ServiceAccount, when one is named
//! - a Deployment running the application image plus any sidecars
//! - a ClusterIP Service exposing the application port
//!
//! # Modules
//!
//! - [`crd`] - HelidonApp Custom Resource Definition and status
//! - [`workload`] - Desired shapes of the dependent resources
//! - [`drift`] - Field-by-field comparison of observed and desired resources
//! - [`controller`] - Reconcile loop and store access
//! - [`status`] - Status reporting
//! - [`backoff`] - Per-record retry delays
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod backoff;
pub mod controller;
pub mod crd;
pub mod drift;
pub mod error;
pub mod status;
pub mod workload;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
