//! Bounded display buffer for the live feed.
//!
//! Items are appended at the tail in emission order and only ever removed
//! from the front, once the presentation layer reports that they have
//! scrolled entirely above the viewport. Anything the viewport cannot
//! measure yet counts as visible.

use std::collections::VecDeque;
use std::fmt;
use std::sync::mpsc;

use crate::types::{Event, Feed};

// ─── Identity ───────────────────────────────────────────────────────

/// Opaque identifier of a rendered item. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u64);

impl ItemId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Source of fresh item identifiers.
pub trait IdGenerator {
    fn next_id(&mut self) -> ItemId;
}

/// Counter starting at 1. Clearing the buffer does not rewind it.
#[derive(Debug, Default)]
pub struct MonotonicIds {
    last: u64,
}

impl MonotonicIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for MonotonicIds {
    fn next_id(&mut self) -> ItemId {
        self.last += 1;
        ItemId(self.last)
    }
}

// ─── Viewport ───────────────────────────────────────────────────────

/// Measurement hook supplied by the presentation layer.
pub trait ViewportProbe {
    /// `Some(true)` when the item's whole extent lies above the top edge of
    /// the visible area, `Some(false)` when any of it is visible or below,
    /// `None` when it has not been laid out or measurement is unavailable.
    fn is_above_visible_top(&self, id: ItemId) -> Option<bool>;
}

/// Probe for surfaces that cannot measure anything. Pruning is a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoViewport;

impl ViewportProbe for NoViewport {
    fn is_above_visible_top(&self, _id: ItemId) -> Option<bool> {
        None
    }
}

// ─── Buffer ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedItem {
    pub id: ItemId,
    pub event: Event,
}

/// Change notification delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferChange {
    /// New tail item; the view should scroll to the bottom.
    Appended { id: ItemId },
    Pruned { count: usize },
    Cleared,
}

pub struct RenderBuffer {
    items: VecDeque<RenderedItem>,
    ids: Box<dyn IdGenerator + Send>,
    subscribers: Vec<mpsc::Sender<BufferChange>>,
}

impl fmt::Debug for RenderBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderBuffer")
            .field("len", &self.items.len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl Default for RenderBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderBuffer {
    pub fn new() -> Self {
        Self::with_ids(MonotonicIds::new())
    }

    pub fn with_ids(ids: impl IdGenerator + Send + 'static) -> Self {
        Self {
            items: VecDeque::new(),
            ids: Box::new(ids),
            subscribers: Vec::new(),
        }
    }

    /// Register for change notifications. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe(&mut self) -> mpsc::Receiver<BufferChange> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Append at the tail and request a scroll to the bottom.
    pub fn append(&mut self, event: Event) -> ItemId {
        let id = self.ids.next_id();
        self.items.push_back(RenderedItem { id, event });
        self.notify(BufferChange::Appended { id });
        id
    }

    /// Empty the buffer after a stream reset.
    pub fn clear(&mut self) {
        self.items.clear();
        self.notify(BufferChange::Cleared);
    }

    /// Apply one item of the post-aggregation stream.
    pub fn apply(&mut self, feed: Feed) -> Option<ItemId> {
        match feed {
            Feed::Event(arrival) => Some(self.append(arrival.event)),
            Feed::Reset => {
                self.clear();
                None
            }
        }
    }

    /// Remove the longest prefix of items that have fully scrolled out of
    /// view. Stops at the first item that is visible or unmeasured.
    pub fn prune(&mut self, probe: &dyn ViewportProbe) -> usize {
        let count = self
            .items
            .iter()
            .take_while(|item| probe.is_above_visible_top(item.id) == Some(true))
            .count();
        if count > 0 {
            self.items.drain(..count);
            self.notify(BufferChange::Pruned { count });
        }
        count
    }

    pub fn items(&self) -> impl ExactSizeIterator<Item = &RenderedItem> + DoubleEndedIterator {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn last_id(&self) -> Option<ItemId> {
        self.items.back().map(|item| item.id)
    }

    fn notify(&mut self, change: BufferChange) {
        self.subscribers.retain(|tx| tx.send(change).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Arrival;
    use std::collections::HashMap;

    fn pop(n: i64) -> Event {
        Event::RoomPopularity(n)
    }

    /// Probe backed by a fixed answer per id.
    struct MapProbe(HashMap<ItemId, bool>);

    impl ViewportProbe for MapProbe {
        fn is_above_visible_top(&self, id: ItemId) -> Option<bool> {
            self.0.get(&id).copied()
        }
    }

    #[test]
    fn append_assigns_fresh_ids_in_order() {
        let mut buf = RenderBuffer::new();
        let a = buf.append(pop(1));
        let b = buf.append(pop(2));
        assert!(a < b);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.last_id(), Some(b));
        let events: Vec<&Event> = buf.items().map(|i| &i.event).collect();
        assert_eq!(events, vec![&pop(1), &pop(2)]);
    }

    #[test]
    fn ids_are_not_reused_after_clear() {
        let mut buf = RenderBuffer::new();
        let before = buf.append(pop(1));
        buf.clear();
        assert!(buf.is_empty());
        let after = buf.append(pop(2));
        assert_ne!(before, after);
        assert!(after > before);
    }

    #[test]
    fn custom_id_generator_is_used() {
        struct Evens(u64);
        impl IdGenerator for Evens {
            fn next_id(&mut self) -> ItemId {
                self.0 += 2;
                ItemId::new(self.0)
            }
        }
        let mut buf = RenderBuffer::with_ids(Evens(0));
        assert_eq!(buf.append(pop(1)).get(), 2);
        assert_eq!(buf.append(pop(1)).get(), 4);
    }

    #[test]
    fn apply_reset_clears() {
        let mut buf = RenderBuffer::new();
        for seq in 0..3 {
            buf.apply(Feed::Event(Arrival { seq, event: pop(1) }));
        }
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.apply(Feed::Reset), None);
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn prune_removes_only_the_scrolled_out_prefix() {
        let mut buf = RenderBuffer::new();
        let ids: Vec<ItemId> = (0..5).map(|n| buf.append(pop(n))).collect();
        let probe = MapProbe(HashMap::from([
            (ids[0], true),
            (ids[1], true),
            (ids[2], false),
            (ids[3], true), // above the top but behind a visible item
            (ids[4], false),
        ]));
        assert_eq!(buf.prune(&probe), 2);
        let left: Vec<ItemId> = buf.items().map(|i| i.id).collect();
        assert_eq!(left, vec![ids[2], ids[3], ids[4]]);
    }

    #[test]
    fn prune_stops_at_unmeasured_items() {
        let mut buf = RenderBuffer::new();
        let ids: Vec<ItemId> = (0..3).map(|n| buf.append(pop(n))).collect();
        // ids[1] has not been laid out yet.
        let probe = MapProbe(HashMap::from([(ids[0], true), (ids[2], true)]));
        assert_eq!(buf.prune(&probe), 1);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn prune_without_measurement_is_a_noop() {
        let mut buf = RenderBuffer::new();
        for n in 0..10 {
            buf.append(pop(n));
        }
        assert_eq!(buf.prune(&NoViewport), 0);
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn subscribers_see_every_change() {
        let mut buf = RenderBuffer::new();
        let rx = buf.subscribe();
        let a = buf.append(pop(1));
        buf.append(pop(2));
        buf.prune(&MapProbe(HashMap::from([(a, true)])));
        buf.clear();

        let changes: Vec<BufferChange> = rx.try_iter().collect();
        assert_eq!(changes.len(), 4);
        assert_eq!(changes[0], BufferChange::Appended { id: a });
        assert_eq!(changes[2], BufferChange::Pruned { count: 1 });
        assert_eq!(changes[3], BufferChange::Cleared);
    }

    #[test]
    fn dropped_subscribers_are_forgotten() {
        let mut buf = RenderBuffer::new();
        let rx = buf.subscribe();
        drop(rx);
        buf.append(pop(1));
        assert_eq!(format!("{buf:?}"), "RenderBuffer { len: 1, subscribers: 0 }");
    }

    #[test]
    fn nothing_is_notified_when_prune_removes_nothing() {
        let mut buf = RenderBuffer::new();
        buf.append(pop(1));
        let rx = buf.subscribe();
        buf.prune(&NoViewport);
        assert!(rx.try_recv().is_err());
    }
}
