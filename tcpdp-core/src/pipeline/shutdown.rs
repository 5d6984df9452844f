use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// Why the pipeline stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The capture source delivered its end-of-stream sentinel.
    SourceExhausted,
    /// Stopped from outside (Ctrl-C, embedding application).
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::SourceExhausted => f.write_str("source exhausted"),
            StopReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Shared cancellation for every pipeline task. The first reason wins.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<Option<StopReason>>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Request shutdown. Returns `false` if a reason was already set.
    pub fn trigger(&self, reason: StopReason) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    /// Shorthand for `trigger(StopReason::Cancelled)`.
    pub fn cancel(&self) -> bool {
        self.trigger(StopReason::Cancelled)
    }

    pub fn reason(&self) -> Option<StopReason> {
        *self.tx.borrow()
    }

    pub fn is_triggered(&self) -> bool {
        self.reason().is_some()
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of [`Shutdown`].
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<Option<StopReason>>,
}

impl ShutdownSignal {
    /// Resolves once shutdown has been triggered.
    pub async fn wait(&mut self) -> StopReason {
        loop {
            if let Some(reason) = *self.rx.borrow_and_update() {
                return reason;
            }
            if self.rx.changed().await.is_err() {
                // Every Shutdown handle is gone; nobody can stop us anymore
                return StopReason::Cancelled;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_first_reason_wins() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_triggered());
        assert!(shutdown.trigger(StopReason::SourceExhausted));
        assert!(!shutdown.cancel());
        assert_eq!(shutdown.reason(), Some(StopReason::SourceExhausted));
    }

    #[tokio::test]
    async fn test_signal_wakes_waiters() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();
        let waiter = tokio::spawn(async move { signal.wait().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown.cancel();
        assert_eq!(waiter.await.unwrap(), StopReason::Cancelled);
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_reason() {
        let shutdown = Shutdown::new();
        shutdown.trigger(StopReason::SourceExhausted);
        let mut signal = shutdown.subscribe();
        assert_eq!(signal.wait().await, StopReason::SourceExhausted);
    }
}
