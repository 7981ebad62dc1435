//! Drift detection for HelidonApp dependents
//!
//! Compares an observed Deployment or Service with what the record implies,
//! field by field. Every drifted field is corrected on a copy of the observed
//! object so the controller can write all corrections in one update; fields
//! the operator does not manage (status, server defaults, labels added by
//! other controllers) are left as observed.
//!
//! Volumes and sidecar containers are compared by count only. A content change
//! to an existing volume or sidecar is not detected.

use std::fmt;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{ContainerPort, PodSpec, Service, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::crd::HelidonAppSpec;
use crate::workload::{
    desired_containers, desired_service_port, non_empty, resolve_ports, DependentObject,
};

/// A field of a dependent that differs from the record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriftField {
    /// Deployment replica count
    Replicas,
    /// Primary container image
    Image,
    /// Primary container port
    ContainerPort,
    /// Primary container environment
    Env,
    /// Pod image pull secrets
    ImagePullSecrets,
    /// Pod service account name
    ServiceAccountName,
    /// Pod init containers
    InitContainers,
    /// Pod volume count
    Volumes,
    /// Pod container count (primary + sidecars)
    Containers,
    /// Service port or target port
    ServicePort,
}

impl fmt::Display for DriftField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Replicas => "replicas",
            Self::Image => "image",
            Self::ContainerPort => "containerPort",
            Self::Env => "env",
            Self::ImagePullSecrets => "imagePullSecrets",
            Self::ServiceAccountName => "serviceAccountName",
            Self::InitContainers => "initContainers",
            Self::Volumes => "volumes",
            Self::Containers => "containers",
            Self::ServicePort => "port",
        };
        f.write_str(name)
    }
}

/// Corrected object plus the fields that were corrected
#[derive(Clone, Debug, PartialEq)]
pub struct Drift {
    /// Observed object with every drifted field set to the desired value
    pub object: DependentObject,
    /// Fields that differed, in check order
    pub fields: Vec<DriftField>,
}

impl Drift {
    /// Comma-separated field names for logs
    pub fn field_list(&self) -> String {
        self.fields
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Check an observed dependent for drift.
///
/// Namespaces and service accounts only need to exist, so they never drift.
pub fn detect(observed: &DependentObject, spec: &HelidonAppSpec) -> Option<Drift> {
    match observed {
        DependentObject::Deployment(deployment) => {
            deployment_drift(deployment, spec).map(|(updated, fields)| Drift {
                object: DependentObject::Deployment(updated),
                fields,
            })
        }
        DependentObject::Service(service) => service_drift(service, spec).map(|updated| Drift {
            object: DependentObject::Service(updated),
            fields: vec![DriftField::ServicePort],
        }),
        DependentObject::Namespace(_) | DependentObject::ServiceAccount(_) => None,
    }
}

/// Replica counts match, treating an unset desired count as exactly 1.
///
/// The equivalence is one-sided: observed 1 with desired unset is in sync,
/// observed unset with desired 1 is not.
pub fn replicas_equivalent(observed: Option<i32>, desired: Option<i32>) -> bool {
    match (observed, desired) {
        (None, None) => true,
        (Some(observed), None) => observed == 1,
        (None, Some(_)) => false,
        (Some(observed), Some(desired)) => observed == desired,
    }
}

/// Compare an observed Deployment with the record.
///
/// Returns the corrected Deployment and the drifted fields, or `None` when
/// nothing needs updating.
pub fn deployment_drift(
    observed: &Deployment,
    spec: &HelidonAppSpec,
) -> Option<(Deployment, Vec<DriftField>)> {
    let mut updated = observed.clone();
    let mut fields = Vec::new();

    let deploy_spec = updated.spec.get_or_insert_with(DeploymentSpec::default);
    if !replicas_equivalent(deploy_spec.replicas, spec.replicas) {
        deploy_spec.replicas = Some(spec.replicas.unwrap_or(1));
        fields.push(DriftField::Replicas);
    }

    let pod = deploy_spec.template.spec.get_or_insert_with(PodSpec::default);
    check_primary_container(pod, spec, &mut fields);

    if pod.image_pull_secrets.as_deref().unwrap_or_default() != spec.image_pull_secrets.as_slice() {
        pod.image_pull_secrets = non_empty(&spec.image_pull_secrets);
        fields.push(DriftField::ImagePullSecrets);
    }

    if pod.service_account_name.as_deref().unwrap_or_default() != spec.service_account_name {
        pod.service_account_name = spec
            .has_service_account()
            .then(|| spec.service_account_name.clone());
        // deprecated alias; the API server rejects a mismatch with the new name
        pod.service_account = None;
        fields.push(DriftField::ServiceAccountName);
    }

    if pod.init_containers.as_deref().unwrap_or_default() != spec.init_containers.as_slice() {
        pod.init_containers = non_empty(&spec.init_containers);
        fields.push(DriftField::InitContainers);
    }

    let observed_volumes = pod.volumes.as_ref().map_or(0, Vec::len);
    if observed_volumes != spec.volumes.len() {
        pod.volumes = non_empty(&spec.volumes);
        fields.push(DriftField::Volumes);
    }

    if pod.containers.len() != spec.containers.len() + 1 {
        // keep the observed primary container, replace the sidecars
        pod.containers.truncate(1);
        pod.containers.extend(spec.containers.iter().cloned());
        fields.push(DriftField::Containers);
    }

    if fields.is_empty() {
        None
    } else {
        Some((updated, fields))
    }
}

/// Image, port and env of the container at index 0
fn check_primary_container(pod: &mut PodSpec, spec: &HelidonAppSpec, fields: &mut Vec<DriftField>) {
    let Some(primary) = pod.containers.first_mut() else {
        pod.containers = desired_containers(spec);
        fields.push(DriftField::Containers);
        return;
    };

    if primary.image.as_deref() != Some(spec.image.as_str()) {
        primary.image = Some(spec.image.clone());
        fields.push(DriftField::Image);
    }

    // Only an explicitly declared port is enforced on the container
    if spec.port != 0 {
        let desired = resolve_ports(spec).port;
        let observed = primary
            .ports
            .as_ref()
            .and_then(|ports| ports.first())
            .map(|p| p.container_port);
        if observed != Some(desired) {
            match primary.ports.as_mut().and_then(|ports| ports.first_mut()) {
                Some(first) => first.container_port = desired,
                None => {
                    primary.ports = Some(vec![ContainerPort {
                        container_port: desired,
                        ..Default::default()
                    }])
                }
            }
            fields.push(DriftField::ContainerPort);
        }
    }

    if primary.env.as_deref().unwrap_or_default() != spec.env.as_slice() {
        primary.env = non_empty(&spec.env);
        fields.push(DriftField::Env);
    }
}

/// Compare the first port of an observed Service with the resolved ports.
///
/// An unset observed target port means "same as port", which is what the
/// API server defaults it to.
pub fn service_drift(observed: &Service, spec: &HelidonAppSpec) -> Option<Service> {
    let desired = resolve_ports(spec);
    let mut updated = observed.clone();

    let ports = updated
        .spec
        .get_or_insert_with(ServiceSpec::default)
        .ports
        .get_or_insert_with(Vec::new);

    match ports.first_mut() {
        None => ports.push(desired_service_port(spec)),
        Some(first) => {
            let observed_target = match &first.target_port {
                None => Some(first.port),
                Some(IntOrString::Int(port)) => Some(*port),
                Some(IntOrString::String(_)) => None,
            };
            if first.port == desired.port && observed_target == Some(desired.target_port) {
                return None;
            }
            first.port = desired.port;
            first.target_port = Some(IntOrString::Int(desired.target_port));
        }
    }

    Some(updated)
}
