//! Shutdown coordination.

use std::fmt;
use std::future::Future;

use tokio::sync::broadcast;

use crate::lifecycle::signals::Signal;

/// What started draining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The hosting OS asked the process to stop.
    Signal(Signal),
    /// Shutdown was requested programmatically via [`Shutdown::trigger`].
    Requested,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Signal(signal) => write!(f, "{}", signal),
            Trigger::Requested => f.write_str("requested"),
        }
    }
}

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to.
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Future resolving once [`trigger`](Self::trigger) is called after this point.
    ///
    /// Suitable as the shutdown argument of `Server::run`.
    pub fn requested(&self) -> impl Future<Output = Trigger> + Send + 'static {
        let mut rx = self.subscribe();
        async move {
            // A closed channel means the coordinator is gone: stop as well.
            let _ = rx.recv().await;
            Trigger::Requested
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
