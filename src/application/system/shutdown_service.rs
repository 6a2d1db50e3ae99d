use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Background tasks wait at most this long for their current step to finish.
const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Signals background tasks to stop and waits for them.
pub struct ShutdownService {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    grace_period: Duration,
}

impl ShutdownService {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            tasks: Vec::new(),
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Receiver that flips to `true` when shutdown starts
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn track(&mut self, name: &'static str, handle: JoinHandle<()>) {
        self.tasks.push((name, handle));
    }

    pub async fn shutdown(self) {
        info!("Initiating Graceful Shutdown Sequence...");
        self.shutdown_tx.send_replace(true);

        for (name, handle) in self.tasks {
            match tokio::time::timeout(self.grace_period, handle).await {
                Ok(Ok(())) => info!("{} stopped.", name),
                Ok(Err(e)) => error!("{} ended abnormally: {}", name, e),
                Err(_) => warn!(
                    "{} did not stop within {:?}; abandoning it.",
                    name, self.grace_period
                ),
            }
        }

        info!("Shutdown sequence completed.");
    }
}

impl Default for ShutdownService {
    fn default() -> Self {
        Self::new()
    }
}
