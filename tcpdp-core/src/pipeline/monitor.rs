use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::shutdown::ShutdownSignal;

/// Lock-free depth probe for a bounded channel.
///
/// Holds a weak sender, so probing never keeps a channel open.
#[derive(Debug)]
pub struct QueueDepth<T> {
    tx: mpsc::WeakSender<T>,
    capacity: usize,
}

impl<T> Clone for QueueDepth<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            capacity: self.capacity,
        }
    }
}

impl<T> QueueDepth<T> {
    pub fn new(tx: &mpsc::Sender<T>) -> Self {
        Self {
            tx: tx.downgrade(),
            capacity: tx.max_capacity(),
        }
    }

    /// Items currently buffered; 0 once every sender is gone.
    pub fn depth(&self) -> usize {
        self.tx
            .upgrade()
            .map_or(0, |tx| tx.max_capacity() - tx.capacity())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// One sample of both queue depths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferStats {
    pub internal_buffered: usize,
    pub internal_capacity: usize,
    pub source_buffered: usize,
    pub source_capacity: usize,
}

impl BufferStats {
    /// Either queue is more than 10% full.
    pub fn is_congested(&self) -> bool {
        self.internal_buffered > self.internal_capacity / 10
            || self.source_buffered > self.source_capacity / 10
    }
}

/// Default reporter for congested samples.
pub fn log_buffer_stats(stats: BufferStats) {
    info!(
        internal_buffered = stats.internal_buffered,
        source_buffered = stats.source_buffered,
        "buffered packet stats"
    );
}

/// Sample both queues every `period` and report congested samples until shutdown.
///
/// Purely diagnostic: flow control is not affected.
pub async fn monitor_buffers<A, B>(
    internal: QueueDepth<A>,
    source: QueueDepth<B>,
    period: Duration,
    mut shutdown: ShutdownSignal,
    mut report: impl FnMut(BufferStats),
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            reason = shutdown.wait() => {
                debug!(%reason, "buffer monitor stopping");
                return;
            }
            _ = ticker.tick() => {
                let stats = BufferStats {
                    internal_buffered: internal.depth(),
                    internal_capacity: internal.capacity(),
                    source_buffered: source.depth(),
                    source_capacity: source.capacity(),
                };
                if stats.is_congested() {
                    report(stats);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::shutdown::Shutdown;
    use std::sync::Arc;

    use parking_lot::Mutex;

    type Samples = Arc<Mutex<Vec<BufferStats>>>;

    fn spawn_monitor(
        internal: QueueDepth<u32>,
        source: QueueDepth<u32>,
        shutdown: &Shutdown,
    ) -> (Samples, tokio::task::JoinHandle<()>) {
        let samples: Samples = Arc::default();
        let sink = samples.clone();
        let handle = tokio::spawn(monitor_buffers(
            internal,
            source,
            Duration::from_secs(1),
            shutdown.subscribe(),
            move |stats| sink.lock().push(stats),
        ));
        (samples, handle)
    }

    #[tokio::test]
    async fn test_queue_depth() {
        let (tx, mut rx) = mpsc::channel::<u32>(8);
        let depth = QueueDepth::new(&tx);
        assert_eq!(depth.capacity(), 8);
        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();
        assert_eq!(depth.depth(), 2);
        rx.recv().await;
        assert_eq!(depth.depth(), 1);
        drop(tx);
        assert_eq!(depth.depth(), 0);
    }

    #[test]
    fn test_congestion_threshold() {
        let stats = BufferStats {
            internal_buffered: 10,
            internal_capacity: 100,
            source_buffered: 0,
            source_capacity: 1000,
        };
        assert!(!stats.is_congested());
        assert!(BufferStats { internal_buffered: 11, ..stats }.is_congested());
        assert!(BufferStats { source_buffered: 101, ..stats }.is_congested());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_when_over_ten_percent() {
        let (tx, _rx) = mpsc::channel::<u32>(100);
        let (source_tx, _source_rx) = mpsc::channel::<u32>(1000);
        for i in 0..11 {
            tx.send(i).await.unwrap();
        }
        let shutdown = Shutdown::new();
        let (samples, handle) =
            spawn_monitor(QueueDepth::new(&tx), QueueDepth::new(&source_tx), &shutdown);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        {
            let samples = samples.lock();
            assert_eq!(samples.len(), 1);
            assert_eq!(samples[0].internal_buffered, 11);
            assert_eq!(samples[0].source_buffered, 0);
        }

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_when_under_threshold() {
        let (tx, _rx) = mpsc::channel::<u32>(100);
        let (source_tx, _source_rx) = mpsc::channel::<u32>(1000);
        for i in 0..10 {
            tx.send(i).await.unwrap();
        }
        let shutdown = Shutdown::new();
        let (samples, handle) =
            spawn_monitor(QueueDepth::new(&tx), QueueDepth::new(&source_tx), &shutdown);

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert!(samples.lock().is_empty());

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_queue_congestion() {
        let (tx, _rx) = mpsc::channel::<u32>(100);
        let (source_tx, _source_rx) = mpsc::channel::<u32>(20);
        for i in 0..3 {
            source_tx.send(i).await.unwrap();
        }
        let shutdown = Shutdown::new();
        let (samples, handle) =
            spawn_monitor(QueueDepth::new(&tx), QueueDepth::new(&source_tx), &shutdown);

        tokio::time::sleep(Duration::from_millis(1001)).await;
        assert_eq!(samples.lock().len(), 1);
        assert_eq!(samples.lock()[0].source_buffered, 3);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
