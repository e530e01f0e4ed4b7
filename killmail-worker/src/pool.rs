use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time;

use health::{ComponentStatus, HealthRegistry};
use killmail_common::retry::RestartPolicy;
use killmail_common::store::StoreConnector;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::enricher::Enricher;
use crate::error::WorkerError;
use crate::metrics_consts::WORKER_RESTARTS;
use crate::queue::QueuePoller;
use crate::shutdown::ShutdownController;
use crate::worker::{KillmailWorker, WorkerExit, WorkerSettings};

/// A fixed number of independent workers, each supervised and each with its own storage.
///
/// A worker whose storage cannot be opened is restarted according to the `RestartPolicy`.
/// Once a worker runs out of restarts, or panics, the whole pool is shut down and `run`
/// returns the error, so the pool never keeps running with fewer workers than configured.
pub struct WorkerPool<C> {
    connector: C,
    poller: QueuePoller,
    enricher: Enricher,
    settings: WorkerSettings,
    worker_count: NonZeroUsize,
    restart_policy: RestartPolicy,
    liveness: HealthRegistry,
    liveness_deadline: time::Duration,
    shutdown: ShutdownController,
}

impl<C: StoreConnector + 'static> WorkerPool<C> {
    pub fn new(
        connector: C,
        poller: QueuePoller,
        enricher: Enricher,
        settings: WorkerSettings,
        shutdown: ShutdownController,
    ) -> Self {
        Self {
            connector,
            poller,
            enricher,
            settings,
            worker_count: NonZeroUsize::MIN,
            restart_policy: RestartPolicy::default(),
            liveness: HealthRegistry::new("liveness"),
            liveness_deadline: time::Duration::from_secs(60),
            shutdown,
        }
    }

    pub fn worker_count(mut self, worker_count: NonZeroUsize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn restart_policy(mut self, restart_policy: RestartPolicy) -> Self {
        self.restart_policy = restart_policy;
        self
    }

    /// Report every worker's health to `registry`, expecting a report at least every `deadline`.
    pub fn liveness(mut self, registry: HealthRegistry, deadline: time::Duration) -> Self {
        self.liveness = registry;
        self.liveness_deadline = deadline;
        self
    }

    /// Run every worker until shutdown, or until one of them fails for good.
    pub async fn run(self) -> Result<(), WorkerError> {
        let pool = Arc::new(self);
        let mut workers = JoinSet::new();
        let mut names = HashMap::new();

        for index in 0..pool.worker_count.get() {
            let name = format!("worker-{index}");
            let handle = workers.spawn(Arc::clone(&pool).supervise(name.clone()));
            names.insert(handle.id(), name);
        }
        info!(workers = pool.worker_count.get(), "worker pool started");

        let mut result = Ok(());
        while let Some(joined) = workers.join_next_with_id().await {
            let outcome = match joined {
                Ok((_, outcome)) => outcome,
                Err(error) => Err(WorkerError::PanicError {
                    worker: names.remove(&error.id()).unwrap_or_default(),
                }),
            };

            if let Err(error) = outcome {
                error!("worker failed: {}", error);
                pool.shutdown.trigger("worker failure");
                if result.is_ok() {
                    result = Err(error);
                }
            }
        }

        info!("worker pool stopped");
        result
    }

    /// Keep one worker running, opening a new storage connection whenever it needs one.
    async fn supervise(self: Arc<Self>, name: String) -> Result<(), WorkerError> {
        let shutdown = self.shutdown.token();
        let mut failures = 0;

        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }
            let liveness = self.liveness.register(name.clone(), self.liveness_deadline);

            let error = match self.connector.connect().await {
                Ok(store) => {
                    failures = 0;
                    let worker = KillmailWorker::new(
                        &name,
                        self.settings.clone(),
                        self.poller.clone(),
                        self.enricher.clone(),
                        store,
                        liveness,
                        shutdown.clone(),
                    );

                    match worker.run().await {
                        WorkerExit::Shutdown => return Ok(()),
                        WorkerExit::ConnectionLost => {
                            warn!(worker = %name, "storage connection lost, reconnecting");
                            continue;
                        }
                    }
                }
                Err(error) => error,
            };

            if !self.restart_policy.allows_restart(failures) {
                liveness.report_status(ComponentStatus::Unhealthy);
                return Err(WorkerError::RestartsExhaustedError {
                    worker: name,
                    attempts: failures + 1,
                    error,
                });
            }

            liveness.report_status(ComponentStatus::Restarting);
            let delay = self.restart_policy.time_until_next_restart(failures);
            failures += 1;
            metrics::counter!(WORKER_RESTARTS).increment(1);
            warn!(worker = %name, attempt = failures, ?delay, "failed to start worker: {}", error);

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
