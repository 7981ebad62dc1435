//! Status reporting for HelidonApp records
//!
//! Every create or update the controller performs ends with one status write:
//! a state, a human-readable message and the time of the action.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kube::ResourceExt;
use tracing::debug;

use crate::controller::AppKubeClient;
use crate::crd::{AppState, HelidonApp, HelidonAppStatus};
use crate::Error;

/// Source of the current time for status timestamps
pub trait Clock: Send + Sync {
    /// Current UTC time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Writes [`HelidonAppStatus`] for a record
pub struct StatusReporter {
    kube: Arc<dyn AppKubeClient>,
    clock: Arc<dyn Clock>,
}

impl StatusReporter {
    /// Create a reporter writing through `kube` and stamping with `clock`
    pub fn new(kube: Arc<dyn AppKubeClient>, clock: Arc<dyn Clock>) -> Self {
        Self { kube, clock }
    }

    /// Record the outcome of an action on `app`.
    ///
    /// A `state` of `None` keeps the record's current state and only replaces
    /// the message and time. Returns the status that was written.
    pub async fn report(
        &self,
        app: &HelidonApp,
        state: Option<AppState>,
        message: impl Into<String>,
    ) -> Result<HelidonAppStatus, Error> {
        let namespace = app.namespace().ok_or(Error::MissingObjectKey("namespace"))?;
        let name = app
            .metadata
            .name
            .clone()
            .ok_or(Error::MissingObjectKey("name"))?;

        let state = state.or_else(|| app.status.as_ref().and_then(|s| s.state));
        let status = HelidonAppStatus::stamped(state, message, self.clock.now());

        self.kube.patch_app_status(&namespace, &name, &status).await?;
        debug!(
            app = %name,
            state = ?status.state,
            message = status.last_action_message.as_deref().unwrap_or_default(),
            "status updated"
        );

        Ok(status)
    }
}
