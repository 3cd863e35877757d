use crate::{index, k8s, lease, status};
use anyhow::{bail, Context, Result};
use clap::Parser;
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use tokio::{sync::mpsc, time::Duration};
use tracing::{info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "connection-controller",
    about = "Resolves ConnectionBinding targets to endpoint URLs"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "openchoreo=info,warn",
        env = "CONNECTION_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    #[clap(long, default_value = "openchoreo-controller-manager")]
    controller_deployment_name: String,

    #[clap(long, default_value = "openchoreo-control-plane")]
    control_plane_namespace: String,

    /// Number of bindings reconciled concurrently.
    #[clap(long, default_value = "4")]
    workers: usize,

    /// Maximum number of bindings waiting to be reconciled.
    #[clap(long, default_value = "10000")]
    queue_capacity: usize,

    /// Interval at which every binding is reconciled, regardless of changes.
    #[clap(long, default_value = "300")]
    resync_period_secs: u64,

    #[clap(long, default_value = "5000")]
    reconcile_timeout_ms: u64,

    #[clap(long, default_value = "100")]
    backoff_base_ms: u64,

    #[clap(long, default_value = "30000")]
    backoff_max_ms: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            controller_deployment_name,
            control_plane_namespace,
            workers,
            queue_capacity,
            resync_period_secs,
            reconcile_timeout_ms,
            backoff_base_ms,
            backoff_max_ms,
        } = self;

        let mut prom = <Registry>::default();
        let index_metrics =
            index::IndexMetrics::register(prom.sub_registry_with_prefix("connection_index"));
        let controller_metrics = status::ControllerMetrics::register(
            prom.sub_registry_with_prefix("connection_status"),
        );

        // The index publishes the bindings that need to be reconciled to the
        // status controller.
        let (updates_tx, updates_rx) = mpsc::channel(queue_capacity.max(1));
        let index = index::Index::shared(updates_tx, index_metrics);

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let hostname =
            std::env::var("HOSTNAME").context("failed to read the HOSTNAME environment variable")?;

        let claims = lease::init(
            &runtime,
            &control_plane_namespace,
            &controller_deployment_name,
            &hostname,
        )
        .await?;

        // Spawn resource watches.

        let release_bindings =
            runtime.watch_all::<k8s::ReleaseBinding>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index.clone(), release_bindings)
                .instrument(info_span!("releasebindings")),
        );

        let connection_bindings =
            runtime.watch_all::<k8s::ConnectionBinding>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index.clone(), connection_bindings)
                .instrument(info_span!("connectionbindings")),
        );

        // Periodically republish every binding so that dropped updates are
        // eventually reconciled.
        tokio::spawn(
            index::Index::run(index.clone(), Duration::from_secs(resync_period_secs))
                .instrument(info_span!("resync")),
        );
        tokio::spawn(
            lease::resync_on_acquire(index.clone(), claims.clone(), hostname.clone())
                .instrument(info_span!("lease")),
        );

        let writer = status::StatusWriter::new(runtime.client());
        let config = status::Config {
            workers,
            queue_capacity,
            reconcile_timeout: Duration::from_millis(reconcile_timeout_ms),
            backoff: status::Backoff {
                base: Duration::from_millis(backoff_base_ms),
                max: Duration::from_millis(backoff_max_ms),
            },
        };
        let status_controller = status::Controller::new(
            index,
            writer,
            updates_rx,
            claims,
            hostname,
            config,
            controller_metrics,
        );
        tokio::spawn(
            status_controller
                .run()
                .instrument(info_span!("status_controller")),
        );

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
