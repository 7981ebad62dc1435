//! Desired shapes of the resources a HelidonApp owns
//!
//! Everything here is pure: a [`HelidonAppSpec`] (plus the owner reference of
//! the record) goes in, k8s-openapi objects come out. The controller compares
//! these shapes with what it reads from the API server.
//!
//! Four dependent kinds are managed, always checked in this order:
//! - Namespace: target namespace, with sidecar injection enabled
//! - ServiceAccount: only when `serviceAccountName` is set
//! - Deployment: primary container followed by the declared sidecars
//! - Service: ClusterIP exposing the resolved port

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, Namespace, PodSpec, PodTemplateSpec, Service, ServiceAccount,
    ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Resource, ResourceExt};

use crate::crd::{HelidonApp, HelidonAppSpec};

/// Port used when the record leaves `port` at 0
pub const DEFAULT_PORT: i32 = 8080;

/// Label selecting the application's pods
pub const APP_LABEL: &str = "app";

/// Namespace label enabling mesh sidecar injection
pub const ISTIO_INJECTION_LABEL: &str = "istio-injection";

/// Standard managed-by label
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of the managed-by label on resources this operator creates
pub const MANAGED_BY: &str = "helidon-operator";

/// Back-reference label naming the owning HelidonApp
pub const OWNER_NAME_LABEL: &str = "verrazzano.io/helidon-app";

/// Back-reference label naming the owning HelidonApp's namespace
pub const OWNER_NAMESPACE_LABEL: &str = "verrazzano.io/helidon-app-namespace";

const SCRAPE_ANNOTATION: &str = "prometheus.io/scrape";
const SCRAPE_PORT_ANNOTATION: &str = "prometheus.io/port";
const SCRAPE_PATH_ANNOTATION: &str = "prometheus.io/path";

// =============================================================================
// Ports
// =============================================================================

/// Service port and target port after defaulting
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedPorts {
    /// Port exposed by the Service and the primary container
    pub port: i32,
    /// Port the Service forwards to
    pub target_port: i32,
}

/// Apply the port defaulting rule.
///
/// `port` falls back to 8080 and `targetPort` falls back to the resolved
/// port. Service building, deployment building and drift detection all go
/// through this function.
pub fn resolve_ports(spec: &HelidonAppSpec) -> ResolvedPorts {
    let port = if spec.port != 0 {
        spec.port
    } else {
        DEFAULT_PORT
    };
    let target_port = if spec.target_port != 0 {
        spec.target_port
    } else {
        port
    };
    ResolvedPorts { port, target_port }
}

// =============================================================================
// Dependent kinds
// =============================================================================

/// The kinds of resource a HelidonApp owns
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DependentKind {
    /// Target namespace (cluster-scoped)
    Namespace,
    /// Optional service account
    ServiceAccount,
    /// Application workload
    Deployment,
    /// Cluster-internal service
    Service,
}

impl DependentKind {
    /// Order in which a reconcile pass checks dependents
    pub const RECONCILE_ORDER: [DependentKind; 4] = [
        DependentKind::Namespace,
        DependentKind::ServiceAccount,
        DependentKind::Deployment,
        DependentKind::Service,
    ];

    /// Whether the record asks for this dependent at all
    pub fn is_declared(self, spec: &HelidonAppSpec) -> bool {
        match self {
            Self::ServiceAccount => spec.has_service_account(),
            Self::Namespace | Self::Deployment | Self::Service => true,
        }
    }

    /// Whether a pass that just created this dependent should be requeued.
    ///
    /// The Service is the last dependent, so creating it finishes first-time
    /// setup.
    pub fn requeue_after_create(self) -> bool {
        !matches!(self, Self::Service)
    }

    /// Key of this dependent for the given record
    pub fn key_for(self, spec: &HelidonAppSpec) -> DependentKey {
        match self {
            Self::Namespace => DependentKey::cluster(self, &spec.namespace),
            Self::ServiceAccount => {
                DependentKey::namespaced(self, &spec.namespace, &spec.service_account_name)
            }
            Self::Deployment | Self::Service => {
                DependentKey::namespaced(self, &spec.namespace, &spec.name)
            }
        }
    }
}

impl fmt::Display for DependentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Namespace => write!(f, "Namespace"),
            Self::ServiceAccount => write!(f, "ServiceAccount"),
            Self::Deployment => write!(f, "Deployment"),
            Self::Service => write!(f, "Service"),
        }
    }
}

/// Exact lookup key of a dependent resource
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DependentKey {
    /// Kind of resource
    pub kind: DependentKind,
    /// Namespace, `None` for cluster-scoped kinds
    pub namespace: Option<String>,
    /// Resource name
    pub name: String,
}

impl DependentKey {
    /// Key for a namespaced resource
    pub fn namespaced(kind: DependentKind, namespace: &str, name: &str) -> Self {
        Self {
            kind,
            namespace: Some(namespace.to_string()),
            name: name.to_string(),
        }
    }

    /// Key for a cluster-scoped resource
    pub fn cluster(kind: DependentKind, name: &str) -> Self {
        Self {
            kind,
            namespace: None,
            name: name.to_string(),
        }
    }
}

impl fmt::Display for DependentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

/// A dependent resource, either built or read back from the API server
#[derive(Clone, Debug, PartialEq)]
pub enum DependentObject {
    /// Target namespace
    Namespace(Namespace),
    /// Service account
    ServiceAccount(ServiceAccount),
    /// Application workload
    Deployment(Deployment),
    /// Cluster-internal service
    Service(Service),
}

impl DependentObject {
    /// Kind tag of this object
    pub fn kind(&self) -> DependentKind {
        match self {
            Self::Namespace(_) => DependentKind::Namespace,
            Self::ServiceAccount(_) => DependentKind::ServiceAccount,
            Self::Deployment(_) => DependentKind::Deployment,
            Self::Service(_) => DependentKind::Service,
        }
    }

    /// Object metadata
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::Namespace(o) => &o.metadata,
            Self::ServiceAccount(o) => &o.metadata,
            Self::Deployment(o) => &o.metadata,
            Self::Service(o) => &o.metadata,
        }
    }

    /// Lookup key taken from the object's own metadata
    pub fn key(&self) -> DependentKey {
        let meta = self.metadata();
        DependentKey {
            kind: self.kind(),
            namespace: meta.namespace.clone(),
            name: meta.name.clone().unwrap_or_default(),
        }
    }
}

// =============================================================================
// Ownership
// =============================================================================

/// The HelidonApp that owns a set of dependents
#[derive(Clone, Debug, PartialEq)]
pub struct AppOwner {
    /// Controller owner reference placed on namespaced dependents
    pub reference: OwnerReference,
    /// Namespace the HelidonApp itself lives in
    pub namespace: String,
}

impl AppOwner {
    /// Owner for a stored HelidonApp.
    ///
    /// Returns `None` until the API server has assigned a UID.
    pub fn from_app(app: &HelidonApp) -> Option<Self> {
        Some(Self {
            reference: app.controller_owner_ref(&())?,
            namespace: app.namespace()?,
        })
    }

    /// Owner references for a dependent living in `namespace`.
    ///
    /// Owner references may not cross namespaces; a dependent outside the
    /// record's namespace is tied back by [`AppOwner::labels`] only.
    pub fn references_for(&self, namespace: &str) -> Option<Vec<OwnerReference>> {
        (self.namespace == namespace).then(|| vec![self.reference.clone()])
    }

    /// Labels naming the owning record
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string()),
            (OWNER_NAME_LABEL.to_string(), self.reference.name.clone()),
            (OWNER_NAMESPACE_LABEL.to_string(), self.namespace.clone()),
        ])
    }
}

// =============================================================================
// Builders
// =============================================================================

/// Build the desired shape of one dependent kind.
///
/// Returns `None` when the record does not declare that dependent.
pub fn build(kind: DependentKind, spec: &HelidonAppSpec, owner: &AppOwner) -> Option<DependentObject> {
    if !kind.is_declared(spec) {
        return None;
    }
    let object = match kind {
        DependentKind::Namespace => DependentObject::Namespace(build_namespace(spec, owner)),
        DependentKind::ServiceAccount => {
            DependentObject::ServiceAccount(build_service_account(spec, owner))
        }
        DependentKind::Deployment => DependentObject::Deployment(build_deployment(spec, owner)),
        DependentKind::Service => DependentObject::Service(build_service(spec, owner)),
    };
    Some(object)
}

fn app_labels(spec: &HelidonAppSpec) -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL.to_string(), spec.name.clone())])
}

/// Selector labels plus the owner labels, for object metadata
fn owned_labels(spec: &HelidonAppSpec, owner: &AppOwner) -> BTreeMap<String, String> {
    let mut labels = owner.labels();
    labels.extend(app_labels(spec));
    labels
}

fn scrape_annotations(ports: ResolvedPorts) -> BTreeMap<String, String> {
    BTreeMap::from([
        (SCRAPE_ANNOTATION.to_string(), "true".to_string()),
        (SCRAPE_PORT_ANNOTATION.to_string(), ports.target_port.to_string()),
        (SCRAPE_PATH_ANNOTATION.to_string(), "/metrics".to_string()),
    ])
}

pub(crate) fn non_empty<T: Clone>(items: &[T]) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items.to_vec())
    }
}

/// Namespace the application runs in.
///
/// Namespaces are cluster-scoped and cannot carry an owner reference to a
/// namespaced HelidonApp, so the owner is recorded as labels instead.
pub fn build_namespace(spec: &HelidonAppSpec, owner: &AppOwner) -> Namespace {
    let mut labels = owner.labels();
    labels.insert(ISTIO_INJECTION_LABEL.to_string(), "enabled".to_string());

    Namespace {
        metadata: ObjectMeta {
            name: Some(spec.namespace.clone()),
            labels: Some(labels),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Service account the pods run as
pub fn build_service_account(spec: &HelidonAppSpec, owner: &AppOwner) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(spec.service_account_name.clone()),
            namespace: Some(spec.namespace.clone()),
            labels: Some(owner.labels()),
            owner_references: owner.references_for(&spec.namespace),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// The primary application container
pub fn primary_container(spec: &HelidonAppSpec) -> Container {
    let ports = resolve_ports(spec);
    Container {
        name: spec.name.clone(),
        image: Some(spec.image.clone()),
        image_pull_policy: spec.image_pull_policy.clone(),
        ports: Some(vec![ContainerPort {
            container_port: ports.port,
            ..Default::default()
        }]),
        env: non_empty(&spec.env),
        ..Default::default()
    }
}

/// Primary container followed by the declared sidecars, in order
pub fn desired_containers(spec: &HelidonAppSpec) -> Vec<Container> {
    std::iter::once(primary_container(spec))
        .chain(spec.containers.iter().cloned())
        .collect()
}

/// Application Deployment
pub fn build_deployment(spec: &HelidonAppSpec, owner: &AppOwner) -> Deployment {
    let labels = app_labels(spec);
    let annotations = scrape_annotations(resolve_ports(spec));

    Deployment {
        metadata: ObjectMeta {
            name: Some(spec.name.clone()),
            namespace: Some(spec.namespace.clone()),
            labels: Some(owned_labels(spec, owner)),
            annotations: Some(annotations.clone()),
            owner_references: owner.references_for(&spec.namespace),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(spec.replicas.unwrap_or(1)),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    annotations: Some(annotations),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    init_containers: non_empty(&spec.init_containers),
                    containers: desired_containers(spec),
                    service_account_name: spec
                        .has_service_account()
                        .then(|| spec.service_account_name.clone()),
                    image_pull_secrets: non_empty(&spec.image_pull_secrets),
                    volumes: non_empty(&spec.volumes),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// The single service port for the resolved ports
pub fn desired_service_port(spec: &HelidonAppSpec) -> ServicePort {
    let ports = resolve_ports(spec);
    ServicePort {
        name: Some("http".to_string()),
        port: ports.port,
        target_port: Some(IntOrString::Int(ports.target_port)),
        ..Default::default()
    }
}

/// ClusterIP Service in front of the Deployment
pub fn build_service(spec: &HelidonAppSpec, owner: &AppOwner) -> Service {
    let labels = app_labels(spec);

    Service {
        metadata: ObjectMeta {
            name: Some(spec.name.clone()),
            namespace: Some(spec.namespace.clone()),
            labels: Some(owned_labels(spec, owner)),
            owner_references: owner.references_for(&spec.namespace),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(labels),
            ports: Some(vec![desired_service_port(spec)]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
