//! # Event bus for deployment events.
//!
//! [`Bus`] wraps a bounded [`tokio::sync::mpsc`] channel: any number of
//! watchers publish, and the event pipeline (see [`EventPipeline`]) is the
//! single receiver that fans events out to subscribers.
//!
//! ```text
//! Publishers (many):                  Receiver (one):
//!   Watcher 1 ──┐
//!   Watcher 2 ──┼──────► Bus ───────► pipeline listener ───► SubscriberSet
//!   Watcher N ──┤    (bounded mpsc)
//!   Orchestr. ──┘
//! ```
//!
//! ## Rules
//! - `publish()` stamps `seq` from a counter shared by all clones.
//! - A full channel makes `publish()` wait: nothing is dropped while the
//!   receiver is alive, and a burst of platform log lines slows its watcher
//!   down instead.
//! - Events published after the receiver is gone are lost.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::event::Event;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Sending side of the deployment event channel.
///
/// Cheap to clone; clones share the sender and the sequence counter.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: mpsc::Sender<Event>,
    seq: Arc<AtomicU64>,
}

impl Bus {
    /// Creates a bus with the given channel capacity (minimum 1) and its receiver.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel::<Event>(capacity.max(1));
        let bus = Self {
            tx,
            seq: Arc::new(AtomicU64::new(1)),
        };
        (bus, rx)
    }

    /// Stamps the next sequence number and publishes the event, waiting for
    /// room in the channel.
    ///
    /// If the receiver is gone the event is dropped.
    pub async fn publish(&self, mut ev: Event) {
        ev.seq = self.seq.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(ev).await.is_err() {
            tracing::trace!("event bus closed, event dropped");
        }
    }
}

/// A running bus-to-subscribers pipeline.
///
/// Owns the only long-lived [`Bus`] handle it hands out clones of; once every
/// clone is dropped and [`EventPipeline::close`] is called, the listener drains
/// the channel, closes the subscriber queues and waits for their workers.
pub struct EventPipeline {
    bus: Bus,
    listener: JoinHandle<()>,
}

impl EventPipeline {
    /// Spawns the listener task feeding `subscribers`.
    pub fn start(capacity: usize, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        let (bus, mut rx) = Bus::channel(capacity);
        let set = SubscriberSet::new(subscribers);

        let listener = tokio::spawn(async move {
            while let Some(ev) = rx.recv().await {
                set.emit(&ev).await;
            }
            set.shutdown().await;
        });

        Self { bus, listener }
    }

    /// Handle for publishers.
    pub fn bus(&self) -> Bus {
        self.bus.clone()
    }

    /// Flushes pending events to subscribers and stops the pipeline.
    ///
    /// Completes once all other [`Bus`] clones are gone and every queued event
    /// has been handled.
    pub async fn close(self) {
        drop(self.bus);
        let _ = self.listener.await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn publish_assigns_increasing_sequence() {
        let (bus, mut rx) = Bus::channel(8);
        let clone = bus.clone();

        bus.publish(Event::new(EventKind::RunStarted)).await;
        clone.publish(Event::new(EventKind::RunFinished)).await;

        let a = rx.recv().await.unwrap();
        let b = rx.recv().await.unwrap();
        assert!(a.seq < b.seq);
        assert_eq!(b.kind, EventKind::RunFinished);
    }

    #[tokio::test]
    async fn publish_without_receiver_returns() {
        let (bus, rx) = Bus::channel(1);
        drop(rx);
        bus.publish(Event::new(EventKind::RunStarted)).await;
        bus.publish(Event::new(EventKind::RunFinished)).await;
    }

    /// Slow subscriber with a tiny queue.
    #[derive(Default)]
    struct Sluggish(Mutex<Vec<u64>>);

    #[async_trait]
    impl Subscribe for Sluggish {
        async fn on_event(&self, ev: &Event) {
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.0.lock().unwrap().push(ev.seq);
        }
        fn queue_capacity(&self) -> usize {
            2
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_larger_than_capacity_reaches_slow_subscriber() {
        let sub = Arc::new(Sluggish::default());
        let pipeline = EventPipeline::start(4, vec![sub.clone()]);

        let bus = pipeline.bus();
        let publisher = tokio::spawn(async move {
            for n in 0..300 {
                bus.publish(Event::new(EventKind::PlatformEvent).with_attempt(n))
                    .await;
            }
        });
        publisher.await.unwrap();
        pipeline.close().await;

        let seen = sub.0.lock().unwrap();
        assert_eq!(seen.len(), 300);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }
}
