//! Aggregation and buffering on the event loop's clock.
//!
//! Wraps the pure [`GiftAggregator`] with a monotonic origin so its
//! millisecond deadlines map onto tokio timers, and applies everything it
//! releases to the [`RenderBuffer`].

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use danmuji_core::{AggregationConfig, Feed, GiftAggregator, RenderBuffer};

pub struct Pipeline {
    aggregator: GiftAggregator,
    buffer: RenderBuffer,
    config: watch::Receiver<AggregationConfig>,
    origin: Instant,
}

impl Pipeline {
    pub fn new(config: watch::Receiver<AggregationConfig>) -> Self {
        Self {
            aggregator: GiftAggregator::new(),
            buffer: RenderBuffer::new(),
            config,
            origin: Instant::now(),
        }
    }

    pub fn buffer(&self) -> &RenderBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut RenderBuffer {
        &mut self.buffer
    }

    pub fn pending_bursts(&self) -> usize {
        self.aggregator.pending_len()
    }

    /// Feed one stream item through. Bursts already due are released first
    /// so they keep their place ahead of the new item.
    pub fn push(&mut self, feed: Feed) {
        self.flush_due();
        let window = self.config.borrow().window();
        let now = self.now_ms();
        if let Some(out) = self.aggregator.ingest(feed, window, now) {
            self.buffer.apply(out);
        }
    }

    /// Release every burst whose window has closed. Returns how many.
    pub fn flush_due(&mut self) -> usize {
        let due = self.aggregator.flush_due(self.now_ms());
        let count = due.len();
        for arrival in due {
            tracing::debug!(seq = arrival.seq, "gift burst released");
            self.buffer.apply(Feed::Event(arrival));
        }
        count
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.aggregator
            .next_deadline()
            .map(|ms| self.origin + Duration::from_millis(ms))
    }

    /// Resolves at the next burst deadline; never while nothing is pending.
    /// Cancel-safe.
    pub async fn deadline(&self) {
        match self.next_deadline() {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    }

    fn now_ms(&self) -> u64 {
        let elapsed = Instant::now().saturating_duration_since(self.origin);
        u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use danmuji_core::{Arrival, Event, GiftMessage};

    fn gift(seq: u64, uname: &str, n: u64) -> Feed {
        Feed::Event(Arrival {
            seq,
            event: Event::Gift(GiftMessage {
                uid: 0,
                uname: uname.into(),
                gift_name: "Rose".into(),
                gift_num: n,
            }),
        })
    }

    fn gift_counts(pipeline: &Pipeline) -> Vec<u64> {
        pipeline
            .buffer()
            .items()
            .filter_map(|i| i.event.as_gift().map(|g| g.gift_num))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn burst_released_when_window_closes() {
        let (_tx, rx) = watch::channel(AggregationConfig::with_window_secs(2));
        let mut pipeline = Pipeline::new(rx);
        let start = Instant::now();

        pipeline.push(gift(0, "Alice", 1));
        tokio::time::sleep(Duration::from_secs(1)).await;
        pipeline.push(gift(1, "Alice", 2));
        assert!(pipeline.buffer().is_empty());

        pipeline.deadline().await;
        assert_eq!(Instant::now() - start, Duration::from_secs(2));
        assert_eq!(pipeline.flush_due(), 1);
        assert_eq!(gift_counts(&pipeline), vec![3]);
        assert_eq!(pipeline.next_deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_window_appends_immediately() {
        let (_tx, rx) = watch::channel(AggregationConfig::default());
        let mut pipeline = Pipeline::new(rx);
        pipeline.push(gift(0, "Bob", 5));
        assert_eq!(gift_counts(&pipeline), vec![5]);
        assert_eq!(pipeline.pending_bursts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn config_change_applies_to_new_bursts_only() {
        let (tx, rx) = watch::channel(AggregationConfig::with_window_secs(3));
        let mut pipeline = Pipeline::new(rx);

        pipeline.push(gift(0, "Alice", 1));
        tx.send_replace(AggregationConfig::with_window_secs(1));
        pipeline.push(gift(1, "Carol", 1));

        // Carol's 1s burst closes first; Alice keeps her 3s window.
        pipeline.deadline().await;
        pipeline.flush_due();
        assert_eq!(gift_counts(&pipeline), vec![1]);
        assert_eq!(pipeline.pending_bursts(), 1);

        pipeline.deadline().await;
        pipeline.flush_due();
        assert_eq!(pipeline.pending_bursts(), 0);
        assert_eq!(pipeline.buffer().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_discards_pending_and_clears() {
        let (_tx, rx) = watch::channel(AggregationConfig::with_window_secs(2));
        let mut pipeline = Pipeline::new(rx);
        pipeline.push(Feed::Event(Arrival {
            seq: 0,
            event: Event::RoomPopularity(5),
        }));
        pipeline.push(gift(1, "Alice", 1));
        assert_eq!(pipeline.buffer().len(), 1);

        pipeline.push(Feed::Reset);
        assert!(pipeline.buffer().is_empty());
        assert_eq!(pipeline.next_deadline(), None);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(pipeline.flush_due(), 0);
        assert!(pipeline.buffer().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn due_burst_precedes_the_next_item() {
        let (_tx, rx) = watch::channel(AggregationConfig::with_window_secs(1));
        let mut pipeline = Pipeline::new(rx);
        pipeline.push(gift(0, "Alice", 2));
        tokio::time::sleep(Duration::from_secs(1)).await;
        pipeline.push(Feed::Event(Arrival {
            seq: 1,
            event: Event::RoomPopularity(9),
        }));
        let kinds: Vec<&str> = pipeline.buffer().items().map(|i| i.event.kind()).collect();
        assert_eq!(kinds, vec!["Gift", "RoomPopularity"]);
    }
}
