//! Store access for the HelidonApp controller
//!
//! [`AppKubeClient`] is the only way the reconcile engine talks to the API
//! server, so tests can swap in a mock. NotFound on a read is returned as
//! `Ok(None)`; create and update failures are wrapped in [`Error::Mutation`]
//! naming the resource.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Service, ServiceAccount};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::{HelidonApp, HelidonAppStatus};
use crate::error::is_not_found;
use crate::workload::{DependentKey, DependentKind, DependentObject};
use crate::Error;

/// Field manager used for status patches
pub const FIELD_MANAGER: &str = "helidon-operator";

/// Trait abstracting the Kubernetes operations the reconcile engine needs
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AppKubeClient: Send + Sync {
    /// Get a HelidonApp, `None` if it no longer exists
    async fn get_app(&self, namespace: &str, name: &str) -> Result<Option<HelidonApp>, Error>;

    /// Get a dependent by exact key, `None` if it does not exist
    async fn get_dependent(&self, key: &DependentKey) -> Result<Option<DependentObject>, Error>;

    /// Create a dependent
    async fn create_dependent(&self, object: &DependentObject) -> Result<(), Error>;

    /// Replace a dependent with a corrected copy of the observed object
    async fn update_dependent(&self, object: &DependentObject) -> Result<(), Error>;

    /// Write the status subresource of a HelidonApp
    async fn patch_app_status(
        &self,
        namespace: &str,
        name: &str,
        status: &HelidonAppStatus,
    ) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct AppKubeClientImpl {
    client: Client,
}

impl AppKubeClientImpl {
    /// Create a new AppKubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Get an object, mapping 404 to `None`
async fn get_opt<K>(api: &Api<K>, name: &str) -> Result<Option<K>, Error>
where
    K: Clone + DeserializeOwned + Debug,
{
    match api.get(name).await {
        Ok(object) => Ok(Some(object)),
        Err(e) if is_not_found(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn mutation_error(verb: &'static str, object: &DependentObject, source: kube::Error) -> Error {
    let key = object.key();
    Error::Mutation {
        verb,
        kind: key.kind,
        namespace: key.namespace.unwrap_or_default(),
        name: key.name,
        source,
    }
}

async fn create_in<K>(api: Api<K>, object: &K) -> Result<(), kube::Error>
where
    K: Clone + Serialize + DeserializeOwned + Debug,
{
    api.create(&PostParams::default(), object).await.map(|_| ())
}

async fn replace_in<K>(api: Api<K>, name: &str, object: &K) -> Result<(), kube::Error>
where
    K: Clone + Serialize + DeserializeOwned + Debug,
{
    api.replace(name, &PostParams::default(), object)
        .await
        .map(|_| ())
}

fn require_namespace(key: &DependentKey) -> Result<&str, Error> {
    key.namespace
        .as_deref()
        .ok_or(Error::MissingObjectKey("namespace"))
}

#[async_trait]
impl AppKubeClient for AppKubeClientImpl {
    async fn get_app(&self, namespace: &str, name: &str) -> Result<Option<HelidonApp>, Error> {
        get_opt(&self.namespaced::<HelidonApp>(namespace), name).await
    }

    async fn get_dependent(&self, key: &DependentKey) -> Result<Option<DependentObject>, Error> {
        let object = match key.kind {
            DependentKind::Namespace => {
                let api: Api<Namespace> = Api::all(self.client.clone());
                get_opt(&api, &key.name).await?.map(DependentObject::Namespace)
            }
            DependentKind::ServiceAccount => {
                let api = self.namespaced::<ServiceAccount>(require_namespace(key)?);
                get_opt(&api, &key.name)
                    .await?
                    .map(DependentObject::ServiceAccount)
            }
            DependentKind::Deployment => {
                let api = self.namespaced::<Deployment>(require_namespace(key)?);
                get_opt(&api, &key.name).await?.map(DependentObject::Deployment)
            }
            DependentKind::Service => {
                let api = self.namespaced::<Service>(require_namespace(key)?);
                get_opt(&api, &key.name).await?.map(DependentObject::Service)
            }
        };
        Ok(object)
    }

    async fn create_dependent(&self, object: &DependentObject) -> Result<(), Error> {
        let key = object.key();
        debug!(resource = %key, "creating");

        let result = match object {
            DependentObject::Namespace(ns) => create_in(Api::all(self.client.clone()), ns).await,
            DependentObject::ServiceAccount(sa) => {
                create_in(self.namespaced(require_namespace(&key)?), sa).await
            }
            DependentObject::Deployment(deployment) => {
                create_in(self.namespaced(require_namespace(&key)?), deployment).await
            }
            DependentObject::Service(service) => {
                create_in(self.namespaced(require_namespace(&key)?), service).await
            }
        };
        result.map_err(|source| mutation_error("create", object, source))
    }

    async fn update_dependent(&self, object: &DependentObject) -> Result<(), Error> {
        let key = object.key();
        if key.name.is_empty() {
            return Err(Error::MissingObjectKey("name"));
        }
        debug!(resource = %key, "updating");

        let result = match object {
            DependentObject::Namespace(ns) => {
                replace_in(Api::all(self.client.clone()), &key.name, ns).await
            }
            DependentObject::ServiceAccount(sa) => {
                replace_in(self.namespaced(require_namespace(&key)?), &key.name, sa).await
            }
            DependentObject::Deployment(deployment) => {
                replace_in(self.namespaced(require_namespace(&key)?), &key.name, deployment).await
            }
            DependentObject::Service(service) => {
                replace_in(self.namespaced(require_namespace(&key)?), &key.name, service).await
            }
        };
        result.map_err(|source| mutation_error("update", object, source))
    }

    async fn patch_app_status(
        &self,
        namespace: &str,
        name: &str,
        status: &HelidonAppStatus,
    ) -> Result<(), Error> {
        let api = self.namespaced::<HelidonApp>(namespace);
        let status_patch = serde_json::json!({ "status": status });

        api.patch_status(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&status_patch),
        )
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kube::core::ErrorResponse;

    /// Story: a rejected create names the dependent's kind, namespace and name
    #[test]
    fn story_mutation_error_carries_dependent_identity() {
        let object = DependentObject::Deployment(Deployment {
            metadata: ObjectMeta {
                name: Some("helidon-app".to_string()),
                namespace: Some("myns".to_string()),
                ..Default::default()
            },
            ..Default::default()
        });
        let source = kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "quota exceeded".to_string(),
            reason: "Forbidden".to_string(),
            code: 403,
        });

        let err = mutation_error("create", &object, source);
        let msg = err.to_string();
        assert!(msg.starts_with("failed to create Deployment myns/helidon-app: "));
        assert!(msg.contains("quota exceeded"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_cluster_scoped_mutation_has_empty_namespace() {
        let object = DependentObject::Namespace(Namespace {
            metadata: ObjectMeta {
                name: Some("myns".to_string()),
                ..Default::default()
            },
            ..Default::default()
        });
        let source = kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "exists".to_string(),
            reason: "AlreadyExists".to_string(),
            code: 409,
        });

        match mutation_error("create", &object, source) {
            Error::Mutation {
                kind, namespace, ..
            } => {
                assert_eq!(kind, DependentKind::Namespace);
                assert!(namespace.is_empty());
            }
            other => panic!("expected Mutation, got {other:?}"),
        }
    }

    #[test]
    fn test_namespaced_key_requires_namespace() {
        let key = DependentKey::cluster(DependentKind::Deployment, "app");
        assert!(matches!(
            require_namespace(&key),
            Err(Error::MissingObjectKey("namespace"))
        ));
    }
}
