//! Custom Resource Definitions for the HelidonApp operator
//!
//! This module contains the HelidonApp CRD and its status types.

mod app;
mod types;

pub use app::{HelidonApp, HelidonAppSpec};
pub use types::{format_action_time, AppState, HelidonAppStatus, ACTION_TIME_FORMAT};

use kube::CustomResourceExt;

/// Name of the HelidonApp CRD object
pub const CRD_NAME: &str = "helidonapps.verrazzano.io";

/// HelidonApp CRD rendered as YAML
pub fn crd_yaml() -> Result<String, crate::Error> {
    serde_yaml::to_string(&HelidonApp::crd())
        .map_err(|e| crate::Error::serialization(format!("failed to render CRD: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crd_yaml_describes_helidon_app() {
        let yaml = crd_yaml().unwrap();
        assert!(yaml.contains(CRD_NAME));
        assert!(yaml.contains("kind: HelidonApp"));
        assert!(yaml.contains("subresources"));
    }
}
