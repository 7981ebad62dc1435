//! Stories about HelidonApp manifests as users write them
//!
//! These run without a cluster: a manifest is parsed the way the API server
//! would hand it to the operator, and the resulting dependents are checked.

use helidon_operator::crd::{crd_yaml, AppState, HelidonApp, HelidonAppStatus};
use helidon_operator::drift;
use helidon_operator::workload::{build, AppOwner, DependentKind, DependentObject, DEFAULT_PORT};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

const MANIFEST: &str = r#"
apiVersion: verrazzano.io/v1beta1
kind: HelidonApp
metadata:
  name: helidon-app
  namespace: apps
  uid: 5b1f3c2e-0000-4000-8000-000000000001
spec:
  name: helidon-app
  namespace: myns
  image: v1
  serviceAccountName: runner
  env:
    - name: JAVA_OPTS
      value: -Xmx256m
  containers:
    - name: fluentd
      image: fluentd:v1
  volumes:
    - name: logs
      emptyDir: {}
status:
  state: Deployed
  lastActionMessage: Helidon application deployed successfully
  lastActionTime: "2020-02-03T04:05:06Z"
"#;

fn parse() -> HelidonApp {
    serde_yaml::from_str(MANIFEST).expect("manifest should parse")
}

fn dependents(app: &HelidonApp) -> Vec<DependentObject> {
    let owner = AppOwner::from_app(app).expect("manifest has uid");
    DependentKind::RECONCILE_ORDER
        .iter()
        .filter_map(|kind| build(*kind, &app.spec, &owner))
        .collect()
}

/// Story: a user's manifest round-trips through the CRD types, status included
#[test]
fn story_manifest_parses_with_status() {
    let app = parse();

    assert_eq!(app.spec.image, "v1");
    assert_eq!(app.spec.port, 0);
    assert_eq!(app.spec.containers.len(), 1);
    assert!(app.spec.validate().is_ok());
    assert_eq!(
        app.status,
        Some(HelidonAppStatus {
            state: Some(AppState::Deployed),
            last_action_message: Some("Helidon application deployed successfully".to_string()),
            last_action_time: Some("2020-02-03T04:05:06Z".to_string()),
        })
    );
}

/// Story: the manifest yields all four dependents, in reconcile order
#[test]
fn story_manifest_yields_four_dependents() {
    let app = parse();
    let kinds: Vec<_> = dependents(&app).iter().map(|o| o.kind()).collect();
    assert_eq!(kinds, DependentKind::RECONCILE_ORDER.to_vec());

    let service = dependents(&app)
        .into_iter()
        .find_map(|o| match o {
            DependentObject::Service(s) => Some(s),
            _ => None,
        })
        .unwrap();
    let port = &service.spec.unwrap().ports.unwrap()[0];
    assert_eq!(port.port, DEFAULT_PORT);
    assert_eq!(port.target_port, Some(IntOrString::Int(DEFAULT_PORT)));
}

/// Story: freshly built dependents never look drifted to the operator
#[test]
fn story_built_dependents_are_in_sync() {
    let app = parse();
    for object in dependents(&app) {
        assert!(
            drift::detect(&object, &app.spec).is_none(),
            "{} reported drift",
            object.key()
        );
    }
}

/// Story: editing the manifest's image drifts only the deployment
#[test]
fn story_image_edit_drifts_deployment_only() {
    let app = parse();
    let built = dependents(&app);

    let mut edited = app.clone();
    edited.spec.image = "v2".to_string();

    let drifted: Vec<_> = built
        .iter()
        .filter_map(|o| drift::detect(o, &edited.spec))
        .collect();
    assert_eq!(drifted.len(), 1);
    assert_eq!(drifted[0].object.kind(), DependentKind::Deployment);
    assert_eq!(drifted[0].field_list(), "image");
}

#[test]
fn test_crd_yaml_is_valid_yaml() {
    let yaml = crd_yaml().unwrap();
    let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(value["spec"]["group"].as_str(), Some("verrazzano.io"));
    assert_eq!(value["spec"]["names"]["kind"].as_str(), Some("HelidonApp"));
}
