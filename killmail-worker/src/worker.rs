use std::time;

use health::{ComponentStatus, HealthHandle};
use killmail_common::payload::{self, PayloadSkip};
use killmail_common::store::{KillmailStore, StoreError, UpsertOutcome};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::enricher::Enricher;
use crate::error::EnrichError;
use crate::metrics_consts::{ENRICH_FAILURES, EVENTS_SKIPPED, KILLMAILS_STORED, STORE_ERRORS};
use crate::queue::QueuePoller;

/// Pauses applied before the next poll, per failure class.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    /// After an empty poll, to avoid a tight loop.
    pub empty_poll: time::Duration,
    /// After a failed or invalid enrichment, to go easy on the authoritative API.
    pub rejected: time::Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            empty_poll: time::Duration::from_millis(200),
            rejected: time::Duration::from_secs(5),
        }
    }
}

/// Settings shared by every worker of a pool.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub queue_id: String,
    pub poll_wait_secs: u64,
    pub backoff: Backoff,
}

/// What happened to a single pass through the pipeline.
#[derive(Debug)]
pub enum Iteration {
    /// The poll returned nothing, either because no event was queued or because it failed.
    Empty,
    /// The payload was not a usable kill event.
    Skipped(PayloadSkip),
    /// The authoritative killmail could not be fetched or was invalid.
    Rejected(EnrichError),
    Stored {
        killmail_id: i64,
        outcome: UpsertOutcome,
    },
    /// Storing failed; the event is dropped.
    Dropped(StoreError),
    Cancelled,
}

impl Iteration {
    /// How long to wait before polling again, if at all.
    pub fn backoff(&self, backoff: &Backoff) -> Option<time::Duration> {
        match self {
            Iteration::Empty => Some(backoff.empty_poll),
            Iteration::Rejected(_) => Some(backoff.rejected),
            _ => None,
        }
    }
}

/// Why a worker's loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    Shutdown,
    /// The storage connection broke and the worker needs a new one.
    ConnectionLost,
}

/// A worker polling the event queue and storing every kill it receives.
pub struct KillmailWorker<S> {
    /// An identifier for this worker, used in logs and health reporting.
    name: String,
    settings: WorkerSettings,
    poller: QueuePoller,
    enricher: Enricher,
    /// Storage owned exclusively by this worker.
    store: S,
    liveness: HealthHandle,
    shutdown: CancellationToken,
}

impl<S: KillmailStore> KillmailWorker<S> {
    pub fn new(
        name: &str,
        settings: WorkerSettings,
        poller: QueuePoller,
        enricher: Enricher,
        store: S,
        liveness: HealthHandle,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            name: name.to_owned(),
            settings,
            poller,
            enricher,
            store,
            liveness,
            shutdown,
        }
    }

    /// Run this worker until shutdown is requested or its storage connection is lost.
    pub async fn run(mut self) -> WorkerExit {
        info!(worker = %self.name, "worker started");

        let exit = loop {
            self.liveness.report_healthy();

            let iteration = self.run_once().await;
            if let Iteration::Dropped(error) = &iteration {
                if error.is_connection_lost() {
                    break WorkerExit::ConnectionLost;
                }
            }
            if let Iteration::Cancelled = iteration {
                break WorkerExit::Shutdown;
            }

            if let Some(duration) = iteration.backoff(&self.settings.backoff) {
                if !pause(&self.shutdown, duration).await {
                    break WorkerExit::Shutdown;
                }
            }
        };

        if exit == WorkerExit::Shutdown {
            self.liveness.report_status(ComponentStatus::Stopped);
        }
        info!(worker = %self.name, ?exit, "worker stopped");
        exit
    }

    /// Poll, parse, enrich and store a single event.
    pub async fn run_once(&mut self) -> Iteration {
        if self.shutdown.is_cancelled() {
            return Iteration::Cancelled;
        }

        debug!(worker = %self.name, "polling queue");
        let body = tokio::select! {
            _ = self.shutdown.cancelled() => return Iteration::Cancelled,
            body = self.poller.poll(&self.settings.queue_id, self.settings.poll_wait_secs) => body,
        };

        if self.shutdown.is_cancelled() {
            return Iteration::Cancelled;
        }
        if body.is_empty() {
            return Iteration::Empty;
        }

        let reference = match payload::parse(&body) {
            Ok(reference) => reference,
            Err(skip) => {
                debug!(worker = %self.name, reason = skip.reason(), "skipping payload: {}", skip);
                metrics::counter!(EVENTS_SKIPPED, "reason" => skip.reason()).increment(1);
                return Iteration::Skipped(skip);
            }
        };
        let killmail_id = reference.killmail_id;
        debug!(worker = %self.name, killmail_id, hash = %reference.hash, "received kill");

        if self.shutdown.is_cancelled() {
            return Iteration::Cancelled;
        }

        let enriched = tokio::select! {
            _ = self.shutdown.cancelled() => return Iteration::Cancelled,
            enriched = self.enricher.enrich(reference) => enriched,
        };
        let killmail = match enriched {
            Ok(killmail) => killmail,
            Err(error) => {
                warn!(worker = %self.name, killmail_id, reason = error.reason(), "failed to enrich killmail: {}", error);
                metrics::counter!(ENRICH_FAILURES, "reason" => error.reason()).increment(1);
                return Iteration::Rejected(error);
            }
        };

        if self.shutdown.is_cancelled() {
            return Iteration::Cancelled;
        }

        match self.store.upsert(&killmail).await {
            Ok(outcome) => {
                info!(
                    worker = %self.name,
                    killmail_id,
                    solar_system_id = killmail.solar_system_id,
                    victim_ship = killmail.victim_ship_id,
                    kill_ship = killmail.killer_ship_id,
                    time = %killmail.occurred_at,
                    outcome = outcome.as_str(),
                    "stored killmail"
                );
                metrics::counter!(KILLMAILS_STORED, "outcome" => outcome.as_str()).increment(1);
                Iteration::Stored {
                    killmail_id,
                    outcome,
                }
            }
            Err(error) => {
                error!(worker = %self.name, killmail_id, "failed to store killmail: {}", error);
                metrics::counter!(STORE_ERRORS).increment(1);
                Iteration::Dropped(error)
            }
        }
    }
}

/// Sleep for `duration` unless shutdown is requested first. Returns false on shutdown.
async fn pause(shutdown: &CancellationToken, duration: time::Duration) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
