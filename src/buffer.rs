use std::collections::{HashSet, VecDeque};

use tokio::sync::Mutex;

use crate::types::{EventRow, OrderId, WebhookEvent};

/// Fixed-capacity, insertion-ordered store of webhook events.
///
/// Overflow silently evicts the oldest entry; pushing never errors. All
/// operations take the single internal lock and contain no await point
/// while holding it, so each one is atomic relative to concurrent
/// requests. In particular `consume` performs its read-then-purge inside
/// one critical section: an event pushed after consume returns can never
/// be purged by that consume.
pub struct EventBuffer {
    capacity: usize,
    inner: Mutex<VecDeque<WebhookEvent>>,
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Append an event, evicting the oldest entry when full.
    pub async fn push(&self, event: WebhookEvent) {
        let mut events = self.inner.lock().await;
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Non-destructive read: newest-first, deduplicated by order id
    /// keeping the most recent occurrence.
    pub async fn snapshot(&self) -> Vec<EventRow> {
        let events = self.inner.lock().await;
        dedup_newest_first(&events)
    }

    /// Destructive read: returns the same projection as [`snapshot`],
    /// then removes every stored event (duplicates included) whose order
    /// id appears in the returned set. The purge uses the id set frozen
    /// at read time, so events for other order ids are never lost.
    ///
    /// [`snapshot`]: EventBuffer::snapshot
    pub async fn consume(&self) -> Vec<EventRow> {
        let mut events = self.inner.lock().await;
        let rows = dedup_newest_first(&events);
        let purged: HashSet<OrderId> = rows.iter().map(|row| row.order_id.clone()).collect();
        events.retain(|event| !purged.contains(&event.order_id));
        rows
    }

    /// Empty the buffer unconditionally.
    pub async fn clear(&self) {
        self.inner.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

/// Scan from newest to oldest; the first occurrence of an order id wins.
fn dedup_newest_first(events: &VecDeque<WebhookEvent>) -> Vec<EventRow> {
    let mut seen: HashSet<&OrderId> = HashSet::new();
    let mut rows = Vec::new();
    for event in events.iter().rev() {
        if seen.insert(&event.order_id) {
            rows.push(event.row());
        }
    }
    rows
}
