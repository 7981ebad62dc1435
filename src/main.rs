//! Helidon Operator - Kubernetes controller for HelidonApp resources

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Service, ServiceAccount};
use kube::runtime::watcher::{self, Config as WatcherConfig};
use kube::runtime::{predicates, reflector, Controller, WatchStreamExt};
use kube::{Api, Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use helidon_operator::backoff::BackoffConfig;
use helidon_operator::controller::{
    error_policy, owning_app, reconcile, Context, ControllerConfig, FIELD_MANAGER,
};
use helidon_operator::crd::{crd_yaml, HelidonApp, CRD_NAME};
use helidon_operator::workload::{MANAGED_BY, MANAGED_BY_LABEL};

/// Helidon Operator - reconciles HelidonApp resources into running applications
#[derive(Parser, Debug)]
#[command(name = "helidon-operator", version, about, long_about = None)]
struct Cli {
    /// Print the CRD manifest and exit
    #[arg(long)]
    crd: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    Controller(ControllerArgs),
}

/// Controller mode arguments
#[derive(Args, Debug)]
struct ControllerArgs {
    /// Only watch HelidonApps in this namespace (all namespaces if unset)
    #[arg(long, env = "WATCH_NAMESPACE")]
    watch_namespace: Option<String>,

    /// Seconds to wait before the next pass after a dependent was created
    #[arg(long, env = "REQUEUE_AFTER_SECS", default_value = "1")]
    requeue_after_secs: u64,

    /// Upper bound in seconds for the retry delay after a failed pass
    #[arg(long, env = "MAX_BACKOFF_SECS", default_value = "300")]
    max_backoff_secs: u64,

    /// Do not install or update the CRD on startup
    #[arg(long)]
    skip_crd_install: bool,
}

impl ControllerArgs {
    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            requeue_after: Duration::from_secs(self.requeue_after_secs),
            backoff: BackoffConfig::with_max_delay(Duration::from_secs(self.max_backoff_secs)),
        }
    }

    /// Controller arguments taken from the environment and defaults only
    fn from_env() -> Self {
        #[derive(Parser)]
        struct Standalone {
            #[command(flatten)]
            args: ControllerArgs,
        }
        Standalone::parse_from(["helidon-operator"]).args
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    if cli.crd {
        println!("{}", crd_yaml()?);
        return Ok(());
    }

    let args = match cli.command {
        Some(Commands::Controller(args)) => args,
        // No subcommand: controller mode with flags from the environment
        None => ControllerArgs::from_env(),
    };
    run_controller(args).await
}

/// Install or update the HelidonApp CRD with server-side apply
///
/// This keeps the CRD schema in step with the operator version.
async fn ensure_crd_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    tracing::info!(crd = CRD_NAME, "installing CRD");
    crds.patch(CRD_NAME, &params, &Patch::Apply(&HelidonApp::crd()))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to install HelidonApp CRD: {}", e))?;

    Ok(())
}

/// Run the HelidonApp controller until SIGINT/SIGTERM
async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    tracing::info!(
        watch_namespace = args.watch_namespace.as_deref().unwrap_or("<all>"),
        "Helidon operator starting"
    );

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if !args.skip_crd_install {
        ensure_crd_installed(&client).await?;
    }

    let apps: Api<HelidonApp> = match &args.watch_namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };

    // Dependents may live outside the record's namespace, so they are watched
    // cluster-wide and mapped back through their owner labels
    let managed = WatcherConfig::default().labels(&format!("{MANAGED_BY_LABEL}={MANAGED_BY}"));

    // Status writes do not bump metadata.generation, so they never start a pass
    let (reader, writer) = reflector::store();
    let app_events = watcher::watcher(apps, WatcherConfig::default())
        .default_backoff()
        .reflect(writer)
        .applied_objects()
        .predicate_filter(predicates::generation);

    let ctx = Arc::new(Context::new(client.clone(), args.controller_config()));

    Controller::for_stream(app_events, reader)
        .watches(
            Api::<Deployment>::all(client.clone()),
            managed.clone(),
            |d| owning_app(&d),
        )
        .watches(
            Api::<Service>::all(client.clone()),
            managed.clone(),
            |s| owning_app(&s),
        )
        .watches(
            Api::<ServiceAccount>::all(client.clone()),
            managed.clone(),
            |sa| owning_app(&sa),
        )
        .watches(Api::<Namespace>::all(client), managed, |ns| owning_app(&ns))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((app, action)) => {
                    tracing::debug!(app = %app, ?action, "reconciliation completed");
                }
                Err(e) => {
                    tracing::warn!(error = ?e, "reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("Helidon operator stopped");
    Ok(())
}
