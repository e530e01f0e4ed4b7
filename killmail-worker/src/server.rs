use std::future::ready;

use axum::{http::StatusCode, routing::get, Router};
use health::HealthRegistry;
use killmail_common::metrics::serve;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::error;

use crate::error::WorkerError;
use crate::shutdown::ShutdownController;

pub async fn index() -> &'static str {
    "killmail worker"
}

/// Probe routes. Readiness flips to 503 as soon as shutdown starts, liveness reports every worker.
pub fn app(liveness: HealthRegistry, shutdown: ShutdownController) -> Router {
    Router::new()
        .route("/", get(index))
        .route(
            "/_readiness",
            get(move || {
                ready(match shutdown.is_triggered() {
                    true => StatusCode::SERVICE_UNAVAILABLE,
                    false => StatusCode::OK,
                })
            }),
        )
        .route("/_liveness", get(move || ready(liveness.get_status())))
}

/// Serve `router` on `bind` until shutdown.
///
/// Failing to bind is returned right away. Failing after that triggers shutdown, so workers
/// never keep running without probes.
pub async fn start(
    router: Router,
    bind: &str,
    shutdown: ShutdownController,
) -> Result<JoinHandle<Result<(), WorkerError>>, WorkerError> {
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|error| WorkerError::ServeError {
            bind: bind.to_owned(),
            error,
        })?;

    let bind = bind.to_owned();
    let stop = shutdown.token();
    Ok(tokio::spawn(async move {
        serve(listener, router, stop.cancelled_owned())
            .await
            .map_err(|error| {
                error!("failed to serve probes and metrics on {}: {}", bind, error);
                shutdown.trigger("probe server failure");
                WorkerError::ServeError { bind, error }
            })
    }))
}
