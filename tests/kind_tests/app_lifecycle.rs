//! Stories about a HelidonApp's life in a real cluster
//!
//! Passes are driven directly through `reconcile_key` so each step can be
//! observed; the controller runtime is not involved.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, PostParams};

use helidon_operator::controller::{reconcile_key, AppKey, Context, ControllerConfig, PassOutcome};
use helidon_operator::crd::{AppState, HelidonApp, HelidonAppSpec};

use super::helpers::{cleanup_namespace, ensure_test_cluster};

const RECORD_NAMESPACE: &str = "default";

fn sample_app(name: &str, target_namespace: &str) -> HelidonApp {
    HelidonApp {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(RECORD_NAMESPACE.to_string()),
            ..Default::default()
        },
        spec: HelidonAppSpec {
            name: name.to_string(),
            namespace: target_namespace.to_string(),
            image: "nginx:1.25".to_string(),
            port: 80,
            ..Default::default()
        },
        status: None,
    }
}

/// Run passes until one finishes without requeue
async fn converge(key: &AppKey, ctx: &Context) -> Vec<PassOutcome> {
    let mut outcomes = Vec::new();
    for _ in 0..10 {
        let outcome = reconcile_key(key, ctx).await.expect("pass should succeed");
        outcomes.push(outcome);
        if outcome == PassOutcome::Done {
            break;
        }
    }
    outcomes
}

/// Story: an application team applies a HelidonApp and the operator brings up
/// the namespace, deployment and service over successive passes
///
/// Expected behavior:
/// - three requeued passes (namespace, deployment, service done)
/// - the deployment runs the declared image
/// - the record reports Deployed
#[tokio::test]
#[ignore = "requires a cluster - run with: cargo test --test kind -- --ignored"]
async fn story_new_app_converges_to_running_workload() {
    let client = ensure_test_cluster().await.expect("failed to setup cluster");
    let target = "helidon-it-converge";
    let apps: Api<HelidonApp> = Api::namespaced(client.clone(), RECORD_NAMESPACE);
    let _ = apps.delete("converge-app", &DeleteParams::default()).await;

    apps.create(&PostParams::default(), &sample_app("converge-app", target))
        .await
        .expect("create record");

    let ctx = Context::new(client.clone(), ControllerConfig::default());
    let key = AppKey::new(RECORD_NAMESPACE, "converge-app");
    let outcomes = converge(&key, &ctx).await;
    assert_eq!(
        outcomes,
        vec![PassOutcome::Requeue, PassOutcome::Requeue, PassOutcome::Done]
    );

    let namespaces: Api<Namespace> = Api::all(client.clone());
    assert!(namespaces.get(target).await.is_ok());

    let deployments: Api<Deployment> = Api::namespaced(client.clone(), target);
    let deployment = deployments.get("converge-app").await.expect("deployment");
    let image = deployment.spec.unwrap().template.spec.unwrap().containers[0]
        .image
        .clone();
    assert_eq!(image.as_deref(), Some("nginx:1.25"));

    let services: Api<Service> = Api::namespaced(client.clone(), target);
    assert!(services.get("converge-app").await.is_ok());

    let record = apps.get("converge-app").await.unwrap();
    assert_eq!(record.status.and_then(|s| s.state), Some(AppState::Deployed));

    let _ = apps.delete("converge-app", &DeleteParams::default()).await;
    cleanup_namespace(&client, target).await;
}

/// Story: after the team bumps the image, the next pass updates the running
/// deployment and the record reports Updated
#[tokio::test]
#[ignore = "requires a cluster - run with: cargo test --test kind -- --ignored"]
async fn story_image_bump_is_rolled_out() {
    let client = ensure_test_cluster().await.expect("failed to setup cluster");
    let target = "helidon-it-drift";
    let apps: Api<HelidonApp> = Api::namespaced(client.clone(), RECORD_NAMESPACE);
    let _ = apps.delete("drift-app", &DeleteParams::default()).await;

    apps.create(&PostParams::default(), &sample_app("drift-app", target))
        .await
        .expect("create record");

    let ctx = Context::new(client.clone(), ControllerConfig::default());
    let key = AppKey::new(RECORD_NAMESPACE, "drift-app");
    converge(&key, &ctx).await;

    let mut record = apps.get("drift-app").await.unwrap();
    record.spec.image = "nginx:1.26".to_string();
    apps.replace("drift-app", &PostParams::default(), &record)
        .await
        .expect("edit record");

    let outcome = reconcile_key(&key, &ctx).await.expect("drift pass");
    assert_eq!(outcome, PassOutcome::Done);

    let deployments: Api<Deployment> = Api::namespaced(client.clone(), target);
    let deployment = deployments.get("drift-app").await.unwrap();
    let image = deployment.spec.unwrap().template.spec.unwrap().containers[0]
        .image
        .clone();
    assert_eq!(image.as_deref(), Some("nginx:1.26"));

    let record = apps.get("drift-app").await.unwrap();
    assert_eq!(record.status.and_then(|s| s.state), Some(AppState::Updated));

    let _ = apps.delete("drift-app", &DeleteParams::default()).await;
    cleanup_namespace(&client, target).await;
}
