//! Controller for HelidonApp resources
//!
//! Reconciles each HelidonApp into its namespace, service account, deployment
//! and service, and keeps the deployment and service free of drift.

mod app;
mod client;

pub use app::{
    error_policy, owning_app, reconcile, reconcile_key, AppKey, Context, ControllerConfig,
    PassOutcome,
};
pub use client::{AppKubeClient, AppKubeClientImpl, FIELD_MANAGER};

#[cfg(test)]
pub use client::MockAppKubeClient;
