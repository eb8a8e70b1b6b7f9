use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Default)]
struct LeaseState {
    holders: u64,
    fired: bool,
}

/// Counts the host's references to the worker. When the count drops from one
/// to zero the shutdown signal is raised, once.
#[derive(Debug)]
pub struct LeaseCounter {
    state: Mutex<LeaseState>,
    shutdown_tx: watch::Sender<bool>,
}

impl Default for LeaseCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl LeaseCounter {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            state: Mutex::new(LeaseState::default()),
            shutdown_tx,
        }
    }

    pub fn acquire(&self) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.holders += 1;
        state.holders
    }

    /// Releases one reference. Releasing with no holders is a no-op.
    pub fn release(&self) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.holders == 0 {
            return 0;
        }
        state.holders -= 1;
        if state.holders == 0 && !state.fired {
            state.fired = true;
            info!("last lease released; requesting shutdown");
            self.shutdown_tx.send_replace(true);
        }
        state.holders
    }

    pub fn holders(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .holders
    }

    pub fn shutdown_requested(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }
}

/// Resolves once `rx` reports a shutdown request, or when the sender is gone.
pub async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|requested| *requested).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn last_release_fires_once() {
        let lease = LeaseCounter::new();
        let rx = lease.subscribe();
        assert_eq!(lease.acquire(), 1);
        assert_eq!(lease.acquire(), 2);
        assert_eq!(lease.release(), 1);
        assert!(!*rx.borrow());
        assert_eq!(lease.release(), 0);
        assert!(*rx.borrow());
        assert!(lease.shutdown_requested());
        assert_eq!(lease.release(), 0);
    }

    #[test]
    fn release_without_holders_does_not_fire() {
        let lease = LeaseCounter::new();
        assert_eq!(lease.release(), 0);
        assert!(!lease.shutdown_requested());
    }

    #[tokio::test]
    async fn waiters_wake_on_last_release() {
        let lease = std::sync::Arc::new(LeaseCounter::new());
        lease.acquire();
        let waiter = tokio::spawn(wait_for_shutdown(lease.subscribe()));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());
        lease.release();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("shutdown observed")
            .unwrap();
    }
}
