//! HelidonApp Custom Resource Definition
//!
//! A HelidonApp describes one application: its image, networking, sidecars and
//! volumes. The operator turns it into a namespace, an optional service
//! account, a Deployment and a ClusterIP Service.

use std::collections::BTreeSet;

use k8s_openapi::api::core::v1::{Container, EnvVar, LocalObjectReference, Volume};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::HelidonAppStatus;

/// Specification for a HelidonApp
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "verrazzano.io",
    version = "v1beta1",
    kind = "HelidonApp",
    plural = "helidonapps",
    shortname = "ha",
    status = "HelidonAppStatus",
    namespaced,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.image"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct HelidonAppSpec {
    /// User defined description
    #[serde(default)]
    pub description: String,

    /// Name of the application; also the name of its Deployment and Service
    pub name: String,

    /// Namespace the application's resources are created in
    pub namespace: String,

    /// Container image to run
    pub image: String,

    /// Secrets used to pull the image
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_pull_secrets: Vec<LocalObjectReference>,

    /// Pull policy for the image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,

    /// ServiceAccount the pods run as; created if missing
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_account_name: String,

    /// Number of replicas; unset means 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Service port; 0 means 8080
    #[serde(default)]
    pub port: i32,

    /// Service target port; 0 means the service port
    #[serde(default)]
    pub target_port: i32,

    /// Environment variables for the application container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    /// Init containers run before the application container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub init_containers: Vec<Container>,

    /// Sidecar containers added after the application container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<Container>,

    /// Volumes added to the pod
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
}

impl HelidonAppSpec {
    /// Returns true if the record asks for a managed ServiceAccount
    pub fn has_service_account(&self) -> bool {
        !self.service_account_name.is_empty()
    }

    /// Validate the application specification
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.name.is_empty() {
            return Err(crate::Error::validation("spec.name must not be empty"));
        }
        if self.namespace.is_empty() {
            return Err(crate::Error::validation("spec.namespace must not be empty"));
        }
        if self.image.is_empty() {
            return Err(crate::Error::validation("spec.image must not be empty"));
        }

        if let Some(replicas) = self.replicas {
            if replicas < 0 {
                return Err(crate::Error::validation(format!(
                    "spec.replicas must not be negative, got {replicas}"
                )));
            }
        }

        validate_port("spec.port", self.port)?;
        validate_port("spec.targetPort", self.target_port)?;

        let mut seen = BTreeSet::new();
        for var in &self.env {
            if !seen.insert(var.name.as_str()) {
                return Err(crate::Error::validation(format!(
                    "spec.env contains duplicate variable '{}'",
                    var.name
                )));
            }
        }

        Ok(())
    }
}

/// 0 means "use the default"; anything else must be a TCP port
fn validate_port(field: &str, port: i32) -> Result<(), crate::Error> {
    if port == 0 || (1..=65535).contains(&port) {
        Ok(())
    } else {
        Err(crate::Error::validation(format!(
            "{field} must be between 1 and 65535, got {port}"
        )))
    }
}
