//! Ingest kill events from the event queue, enrich them and store them in PostgreSQL.
use envconfig::Envconfig;
use health::HealthRegistry;
use killmail_common::metrics::setup_metrics_routes;
use killmail_common::store::PgConnector;
use killmail_worker::config::Config;
use killmail_worker::enricher::Enricher;
use killmail_worker::error::WorkerError;
use killmail_worker::pool::WorkerPool;
use killmail_worker::queue::QueuePoller;
use killmail_worker::server;
use killmail_worker::shutdown::ShutdownController;
use killmail_worker::worker::WorkerSettings;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_layer = tracing_subscriber::fmt::layer().with_filter(filter);
    tracing_subscriber::registry().with(log_layer).init();
}

#[tokio::main]
async fn main() -> Result<(), WorkerError> {
    setup_tracing();

    let config = Config::init_from_env().expect("Invalid configuration:");

    let shutdown = ShutdownController::new();
    let _signals = shutdown.trap_signals()?;

    let liveness = HealthRegistry::new("liveness");
    let router = setup_metrics_routes(server::app(liveness.clone(), shutdown.clone()))?;
    let server = server::start(router, &config.bind(), shutdown.clone()).await?;

    let poller = QueuePoller::new(&config.queue_url, &config.user_agent)?;
    let enricher = Enricher::new(&config.esi_url, config.enrich_timeout.0, &config.user_agent)?;
    let settings = WorkerSettings {
        queue_id: config.queue_id.clone(),
        poll_wait_secs: config.poll_wait_secs,
        backoff: config.backoff(),
    };

    info!(
        workers = config.worker_count.get(),
        queue_id = %config.queue_id,
        "starting killmail ingest"
    );

    let result = WorkerPool::new(
        PgConnector::new(&config.database_url),
        poller,
        enricher,
        settings,
        shutdown.clone(),
    )
    .worker_count(config.worker_count)
    .restart_policy(config.restart_policy.provide())
    .liveness(liveness, config.liveness_deadline())
    .run()
    .await;

    shutdown.trigger("worker pool stopped");
    let served = server.await.unwrap_or_else(|_| {
        Err(WorkerError::PanicError {
            worker: "probe server".to_owned(),
        })
    });

    info!("exiting");
    result.and(served)
}
