use std::time;

#[derive(Copy, Clone, Debug)]
/// The policy used to decide when, and whether, a failed worker is started again.
pub struct RestartPolicy {
    /// Coefficient to multiply initial_interval with for every past restart.
    backoff_coefficient: u32,
    /// The backoff interval before the first restart.
    initial_interval: time::Duration,
    /// The maximum possible backoff between restarts.
    maximum_interval: time::Duration,
    /// Consecutive failed starts tolerated before giving up on the worker.
    max_restarts: u32,
}

impl RestartPolicy {
    pub fn new(
        backoff_coefficient: u32,
        initial_interval: time::Duration,
        maximum_interval: time::Duration,
        max_restarts: u32,
    ) -> Self {
        Self {
            backoff_coefficient,
            initial_interval,
            maximum_interval,
            max_restarts,
        }
    }

    /// Calculate the time to wait before restart number `attempt`, starting at 0.
    pub fn time_until_next_restart(&self, attempt: u32) -> time::Duration {
        let factor = self.backoff_coefficient.saturating_pow(attempt);

        std::cmp::min(
            self.initial_interval.saturating_mul(factor),
            self.maximum_interval,
        )
    }

    /// Whether a worker that already failed `failures` consecutive times may be restarted.
    pub fn allows_restart(&self, failures: u32) -> bool {
        failures < self.max_restarts
    }

    pub fn max_restarts(&self) -> u32 {
        self.max_restarts
    }
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            backoff_coefficient: 2,
            initial_interval: time::Duration::from_secs(1),
            maximum_interval: time::Duration::from_secs(60),
            max_restarts: 5,
        }
    }
}
