use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Owns the cancellation signal observed by every worker. Cancelling is idempotent and
/// can only go one way.
#[derive(Clone, Default)]
pub struct ShutdownController {
    token: CancellationToken,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token for a worker or server to observe. Never cancelled by its holder.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn trigger(&self, reason: &str) {
        if !self.token.is_cancelled() {
            info!(reason, "shutting down workers");
            self.token.cancel();
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Install SIGINT and SIGTERM handlers that trigger shutdown when either is received.
    pub fn trap_signals(&self) -> Result<tokio::task::JoinHandle<()>, std::io::Error> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let controller = self.clone();

        Ok(tokio::spawn(async move {
            tokio::select! {
                _ = sigint.recv() => controller.trigger("SIGINT"),
                _ = sigterm.recv() => controller.trigger("SIGTERM"),
                _ = controller.token.cancelled() => {}
            }
        }))
    }
}
