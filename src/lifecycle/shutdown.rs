//! Shutdown coordination.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Coordinator for graceful shutdown.
///
/// Every long-running task (HTTP server, sweeper) subscribes before it
/// starts and exits when the signal arrives.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Tasks still listening for the signal.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for `tasks` to finish, aborting whatever is left after `deadline`.
/// Returns false if anything had to be aborted.
pub async fn drain(tasks: Vec<JoinHandle<()>>, deadline: Duration) -> bool {
    let aborts: Vec<_> = tasks.iter().map(|task| task.abort_handle()).collect();
    let joined = tokio::time::timeout(deadline, futures_util::future::join_all(tasks)).await;

    if joined.is_err() {
        tracing::warn!(deadline = ?deadline, "Shutdown deadline reached, aborting remaining tasks");
        aborts.iter().for_each(|abort| abort.abort());
        return false;
    }
    true
}
