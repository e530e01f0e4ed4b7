pub const QUEUE_POLLS: &str = "killmail_queue_polls_total";
pub const EVENTS_SKIPPED: &str = "killmail_events_skipped_total";
pub const ENRICH_FAILURES: &str = "killmail_enrich_failures_total";
pub const ENRICH_DURATION: &str = "killmail_enrich_duration_seconds";
pub const KILLMAILS_STORED: &str = "killmail_stored_total";
pub const STORE_ERRORS: &str = "killmail_store_errors_total";
pub const WORKER_RESTARTS: &str = "killmail_worker_restarts_total";
