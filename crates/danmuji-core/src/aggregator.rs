//! Gift combo aggregation: merges repeated gifts from one sender into a
//! single notification per fixed window.
//!
//! The window is anchored to the first gift of a burst. Later gifts for the
//! same key only raise the count; they never move the deadline. Time is
//! supplied by the caller in milliseconds, and the caller arms a single
//! timer for [`GiftAggregator::next_deadline`].

use std::collections::HashMap;

use crate::types::{AggregationKey, Arrival, ComboWindow, Event, Feed};

// ─── Internal ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingAggregate {
    /// First arrival of the burst, `gift_num` holding the running total.
    accumulated: Arrival,
    deadline_ms: u64,
    /// Burst start order, breaks ties between equal deadlines.
    opened: u64,
}

// ─── GiftAggregator ─────────────────────────────────────────────────

/// Batches gift events per (sender, gift) key. Everything else passes
/// straight through.
#[derive(Debug, Default)]
pub struct GiftAggregator {
    pending: HashMap<AggregationKey, PendingAggregate>,
    next_opened: u64,
}

impl GiftAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one stream item through the aggregator.
    ///
    /// Returns the item to forward downstream right now, if any. A `Reset`
    /// discards every pending burst without emitting it and is forwarded.
    /// `window` is the combo setting read at this moment; it only governs
    /// bursts that start with this call.
    pub fn ingest(&mut self, feed: Feed, window: ComboWindow, now_ms: u64) -> Option<Feed> {
        let arrival = match feed {
            Feed::Reset => {
                self.reset();
                return Some(Feed::Reset);
            }
            Feed::Event(arrival) => arrival,
        };

        let window_ms = match window {
            ComboWindow::Millis(ms) if ms > 0 => ms,
            _ => return Some(Feed::Event(arrival)),
        };
        let Some((key, incoming)) = arrival.event.as_gift().map(|g| (g.key(), g.gift_num)) else {
            return Some(Feed::Event(arrival));
        };

        if let Some(pending) = self.pending.get_mut(&key) {
            if let Event::Gift(acc) = &mut pending.accumulated.event {
                acc.gift_num = acc.gift_num.saturating_add(incoming);
            }
            return None;
        }

        let opened = self.next_opened;
        self.next_opened += 1;
        self.pending.insert(
            key,
            PendingAggregate {
                accumulated: arrival,
                deadline_ms: now_ms.saturating_add(window_ms),
                opened,
            },
        );
        None
    }

    /// Earliest deadline among pending bursts.
    pub fn next_deadline(&self) -> Option<u64> {
        self.pending.values().map(|p| p.deadline_ms).min()
    }

    /// Remove and return every burst whose deadline has passed, in
    /// (deadline, burst start) order.
    pub fn flush_due(&mut self, now_ms: u64) -> Vec<Arrival> {
        let due_keys: Vec<AggregationKey> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline_ms <= now_ms)
            .map(|(k, _)| k.clone())
            .collect();

        let mut due: Vec<PendingAggregate> = due_keys
            .iter()
            .filter_map(|k| self.pending.remove(k))
            .collect();
        due.sort_by_key(|p| (p.deadline_ms, p.opened));
        due.into_iter().map(|p| p.accumulated).collect()
    }

    /// Drop all pending bursts without emitting them.
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Running total of the burst for `key`, if one is open.
    pub fn pending_count(&self, key: &AggregationKey) -> Option<u64> {
        self.pending
            .get(key)
            .and_then(|p| p.accumulated.event.as_gift())
            .map(|g| g.gift_num)
    }
}
