//! Typed signal dispatcher
//!
//! Signals are plain strings (for example `hassio_discovered_config_entry_removed`).
//! Unlike bus events they carry a typed payload and are never exposed outside
//! the process.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::DEFAULT_CHANNEL_CAPACITY;

/// Dispatcher for one payload type
pub struct Dispatcher<T> {
    signals: DashMap<String, broadcast::Sender<T>>,
    capacity: usize,
}

impl<T: Clone + Send + 'static> Dispatcher<T> {
    pub fn new() -> Self {
        Self {
            signals: DashMap::new(),
            capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Get a receiver for every payload sent on `signal` from now on
    pub fn connect(&self, signal: &str) -> broadcast::Receiver<T> {
        trace!(signal, "Connecting to signal");
        self.signals
            .entry(signal.to_string())
            .or_insert_with(|| {
                let (tx, _) = broadcast::channel(self.capacity);
                tx
            })
            .subscribe()
    }

    /// Connect `target` to `signal`
    ///
    /// Each payload is handled in its own task, so a slow target never holds
    /// back the next payload. The returned handle owns the receiving loop;
    /// abort it to disconnect.
    pub fn connect_with<F, Fut>(&self, signal: &str, target: F) -> JoinHandle<()>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut rx = self.connect(signal);
        let signal = signal.to_string();

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(payload) => {
                        tokio::spawn(target(payload));
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(signal = %signal, "Signal target lagged by {} payloads", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(signal = %signal, "Dispatcher closed");
                        return;
                    }
                }
            }
        })
    }

    /// Send `payload` to everything connected to `signal`
    ///
    /// Returns how many receivers got it.
    pub fn send(&self, signal: &str, payload: T) -> usize {
        match self.signals.get(signal) {
            Some(sender) => {
                let delivered = sender.send(payload).unwrap_or(0);
                debug!(signal, delivered, "Dispatched signal");
                delivered
            }
            None => {
                trace!(signal, "Signal has no targets");
                0
            }
        }
    }
}

impl<T: Clone + Send + 'static> Default for Dispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedDispatcher<T> = Arc<Dispatcher<T>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_send_without_targets() {
        let dispatcher: Dispatcher<String> = Dispatcher::new();
        assert_eq!(dispatcher.send("nobody_home", "payload".to_string()), 0);
    }

    #[tokio::test]
    async fn test_connect_and_send() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.connect("entry_removed");

        assert_eq!(dispatcher.send("entry_removed", 7_u32), 1);
        assert_eq!(rx.recv().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_signals_are_isolated() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.connect("hue_discovered_config_entry_removed");

        dispatcher.send("hassio_discovered_config_entry_removed", 1_u32);

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connect_with_runs_target_per_payload() {
        let dispatcher = Dispatcher::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = seen.clone();
        let handle = dispatcher.connect_with("signal", move |n: usize| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(n, Ordering::SeqCst);
            }
        });

        dispatcher.send("signal", 2);
        dispatcher.send("signal", 3);

        tokio::time::timeout(Duration::from_secs(1), async {
            while seen.load(Ordering::SeqCst) != 5 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        handle.abort();
    }
}
