//! Shared helpers for cluster-backed tests

use std::time::Duration;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::{Client, CustomResourceExt};

use helidon_operator::controller::FIELD_MANAGER;
use helidon_operator::crd::{HelidonApp, CRD_NAME};

/// Connect to the current cluster and make sure the CRD is installed
pub async fn ensure_test_cluster() -> anyhow::Result<Client> {
    let client = Client::try_default().await?;

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    crds.patch(
        CRD_NAME,
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(&HelidonApp::crd()),
    )
    .await?;

    // Give the API server a moment to serve the new resource
    tokio::time::sleep(Duration::from_secs(2)).await;
    Ok(client)
}

/// Best-effort removal of a test namespace
pub async fn cleanup_namespace(client: &Client, name: &str) {
    let api: Api<Namespace> = Api::all(client.clone());
    let _ = api.delete(name, &DeleteParams::default()).await;
}
