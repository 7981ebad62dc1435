//! HelidonApp controller implementation
//!
//! One reconcile pass walks the dependents in order (namespace, service
//! account, deployment, service). The first missing dependent is created and
//! the pass ends there, so a fresh record takes several passes to converge.
//! Once everything exists, drifted deployment and service fields are corrected.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use crate::backoff::{Backoff, BackoffConfig};
use crate::crd::{AppState, HelidonApp};
use crate::drift;
use crate::status::{Clock, StatusReporter, SystemClock};
use crate::workload::{
    self, AppOwner, DependentKind, DependentObject, OWNER_NAMESPACE_LABEL, OWNER_NAME_LABEL,
};
use crate::Error;

use super::client::{AppKubeClient, AppKubeClientImpl};

/// Settings the controller runs with
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Delay before the next pass after a dependent was created
    pub requeue_after: Duration,
    /// Retry curve for failed passes
    pub backoff: BackoffConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            requeue_after: Duration::from_secs(1),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Controller context shared by every reconcile
pub struct Context {
    /// Kubernetes client for API operations (trait object for testability)
    pub kube: Arc<dyn AppKubeClient>,
    /// Status writer
    pub status: StatusReporter,
    /// Per-record retry delays
    pub backoff: Backoff,
    /// Controller settings
    pub config: ControllerConfig,
}

impl Context {
    /// Create a context talking to the cluster through `client`
    pub fn new(client: Client, config: ControllerConfig) -> Self {
        Self::with_clients(
            Arc::new(AppKubeClientImpl::new(client)),
            Arc::new(SystemClock),
            config,
        )
    }

    /// Create a context from explicit collaborators
    pub fn with_clients(
        kube: Arc<dyn AppKubeClient>,
        clock: Arc<dyn Clock>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            status: StatusReporter::new(kube.clone(), clock),
            backoff: Backoff::new(config.backoff.clone()),
            kube,
            config,
        }
    }

    /// Create a context for testing with a mock client and default settings
    #[cfg(test)]
    pub fn for_testing(kube: Arc<dyn AppKubeClient>) -> Self {
        Self::with_clients(kube, Arc::new(SystemClock), ControllerConfig::default())
    }
}

/// Identity of a HelidonApp in the store
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AppKey {
    /// Namespace of the record
    pub namespace: String,
    /// Name of the record
    pub name: String,
}

impl AppKey {
    /// Key for a record
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a record delivered by the watcher
    pub fn from_app(app: &HelidonApp) -> Result<Self, Error> {
        let namespace = app.namespace().ok_or(Error::MissingObjectKey("namespace"))?;
        let name = app
            .metadata
            .name
            .clone()
            .ok_or(Error::MissingObjectKey("name"))?;
        Ok(Self { namespace, name })
    }
}

impl fmt::Display for AppKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// How a reconcile pass ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    /// Nothing left to do until the record or a dependent changes
    Done,
    /// A dependent was created; run another pass shortly
    Requeue,
}

/// Status messages for one dependent kind.
///
/// Only the deployment and service report their creates and updates.
struct StatusMessages {
    created: &'static str,
    create_failed: &'static str,
    updated: &'static str,
    update_failed: &'static str,
}

fn status_messages(kind: DependentKind) -> Option<StatusMessages> {
    match kind {
        DependentKind::Deployment => Some(StatusMessages {
            created: "Helidon application deployed successfully",
            create_failed: "Helidon application deployment creation failed: ",
            updated: "Helidon application deployment updated",
            update_failed: "Helidon application deployment update failed: ",
        }),
        DependentKind::Service => Some(StatusMessages {
            created: "Helidon application service deployed successfully",
            create_failed: "Helidon application service creation failed: ",
            updated: "Helidon application service updated",
            update_failed: "Helidon application service update failed: ",
        }),
        DependentKind::Namespace | DependentKind::ServiceAccount => None,
    }
}

/// Run one reconcile pass for the record at `key`
pub async fn reconcile_key(key: &AppKey, ctx: &Context) -> Result<PassOutcome, Error> {
    let Some(app) = ctx.kube.get_app(&key.namespace, &key.name).await? else {
        debug!(app = %key, "record no longer exists");
        ctx.backoff.reset(&key.to_string());
        return Ok(PassOutcome::Done);
    };
    reconcile_app(&app, ctx).await
}

async fn reconcile_app(app: &HelidonApp, ctx: &Context) -> Result<PassOutcome, Error> {
    let spec = &app.spec;

    if let Err(e) = spec.validate() {
        warn!(error = %e, "record validation failed");
        let message = format!("Helidon application validation failed: {e}");
        ctx.status
            .report(app, Some(AppState::Failed), message)
            .await?;
        return Ok(PassOutcome::Done);
    }

    let owner = AppOwner::from_app(app).ok_or(Error::MissingObjectKey("uid"))?;

    let mut existing = Vec::with_capacity(DependentKind::RECONCILE_ORDER.len());
    for kind in DependentKind::RECONCILE_ORDER {
        if !kind.is_declared(spec) {
            continue;
        }
        let key = kind.key_for(spec);
        match ctx.kube.get_dependent(&key).await? {
            Some(observed) => existing.push(observed),
            None => {
                info!(resource = %key, "dependent missing");
                return create_dependent(app, kind, &owner, ctx).await;
            }
        }
    }

    for observed in &existing {
        correct_drift(app, observed, ctx).await?;
    }

    Ok(PassOutcome::Done)
}

async fn create_dependent(
    app: &HelidonApp,
    kind: DependentKind,
    owner: &AppOwner,
    ctx: &Context,
) -> Result<PassOutcome, Error> {
    let Some(object) = workload::build(kind, &app.spec, owner) else {
        return Ok(PassOutcome::Done);
    };
    let messages = status_messages(kind);

    match ctx.kube.create_dependent(&object).await {
        Ok(()) => {
            info!(resource = %object.key(), "created");
            if let Some(messages) = &messages {
                ctx.status
                    .report(app, Some(AppState::Deployed), messages.created)
                    .await?;
            }
            Ok(if kind.requeue_after_create() {
                PassOutcome::Requeue
            } else {
                PassOutcome::Done
            })
        }
        Err(err) => {
            error!(resource = %object.key(), error = %err, "create failed");
            if let Some(messages) = &messages {
                record_failure(
                    app,
                    Some(AppState::Failed),
                    format!("{}{}", messages.create_failed, failure_cause(&err)),
                    ctx,
                )
                .await;
            }
            Err(err)
        }
    }
}

async fn correct_drift(
    app: &HelidonApp,
    observed: &DependentObject,
    ctx: &Context,
) -> Result<(), Error> {
    let Some(drift) = drift::detect(observed, &app.spec) else {
        return Ok(());
    };
    let kind = drift.object.kind();
    info!(
        resource = %drift.object.key(),
        fields = %drift.field_list(),
        "correcting drift"
    );

    match ctx.kube.update_dependent(&drift.object).await {
        Ok(()) => {
            if let Some(messages) = status_messages(kind) {
                ctx.status
                    .report(app, Some(AppState::Updated), messages.updated)
                    .await?;
            }
            Ok(())
        }
        Err(err) => {
            error!(resource = %drift.object.key(), error = %err, "update failed");
            if let Some(messages) = status_messages(kind) {
                record_failure(
                    app,
                    None,
                    format!("{}{}", messages.update_failed, failure_cause(&err)),
                    ctx,
                )
                .await;
            }
            Err(err)
        }
    }
}

/// The API server's reason for a rejected mutation
fn failure_cause(err: &Error) -> String {
    match err {
        Error::Mutation { source, .. } => source.to_string(),
        other => other.to_string(),
    }
}

/// Write a failure status; the mutation error wins over a status error
async fn record_failure(
    app: &HelidonApp,
    state: Option<AppState>,
    message: String,
    ctx: &Context,
) {
    if let Err(status_err) = ctx.status.report(app, state, message).await {
        error!(error = %status_err, "failed to record failure in status");
    }
}

/// Reconcile a HelidonApp delivered by the controller runtime
///
/// Re-reads the record so the pass never acts on a stale cache entry.
#[instrument(
    skip(app, ctx),
    fields(app = %app.name_any(), namespace = %app.namespace().unwrap_or_default())
)]
pub async fn reconcile(app: Arc<HelidonApp>, ctx: Arc<Context>) -> Result<Action, Error> {
    let key = AppKey::from_app(&app)?;
    debug!("reconciling");

    let outcome = reconcile_key(&key, &ctx).await?;
    ctx.backoff.reset(&key.to_string());

    Ok(match outcome {
        PassOutcome::Requeue => Action::requeue(ctx.config.requeue_after),
        PassOutcome::Done => Action::await_change(),
    })
}

/// Error policy for the controller
///
/// Retryable errors are requeued with per-record exponential backoff; the rest
/// wait for the record to change.
pub fn error_policy(app: Arc<HelidonApp>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        app = %app.name_any(),
        "reconciliation failed"
    );

    if !error.is_retryable() {
        return Action::await_change();
    }

    let key = AppKey::from_app(&app)
        .map(|k| k.to_string())
        .unwrap_or_else(|_| app.name_any());
    Action::requeue(ctx.backoff.next_delay(&key))
}

/// The HelidonApp a dependent belongs to, read from its owner labels.
///
/// Used to map watch events on dependents back to their record, including
/// dependents outside the record's namespace that carry no owner reference.
pub fn owning_app<K: Resource>(dependent: &K) -> Option<ObjectRef<HelidonApp>> {
    let labels = dependent.labels();
    let name = labels.get(OWNER_NAME_LABEL)?;
    let namespace = labels.get(OWNER_NAMESPACE_LABEL)?;
    Some(ObjectRef::new(name).within(namespace))
}
