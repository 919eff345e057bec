//! Shutdown coordination.

use std::future::Future;

use tokio::sync::broadcast;

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that every waiter subscribes to.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Resolves once [`trigger`](Self::trigger) is called after this returns.
    pub fn triggered(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            // Closed means every sender is gone, which also ends the wait.
            let _ = rx.recv().await;
        }
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Number of pending waiters.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_wakes_all_waiters() {
        let shutdown = Shutdown::new();
        let first = tokio::spawn(shutdown.triggered());
        let second = tokio::spawn(shutdown.triggered());
        assert_eq!(shutdown.receiver_count(), 2);

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), first).await.unwrap().unwrap();
        tokio::time::timeout(Duration::from_secs(1), second).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_dropped_coordinator_releases_waiters() {
        let shutdown = Shutdown::new();
        let waiter = shutdown.triggered();
        drop(shutdown);
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap();
    }
}
