//! Monotonic-counter-indexed queues over the cache bus.
//!
//! Jobs and events share one design: a producer-side allocation counter
//! (`max_<name>_id`), one payload key per id, and a per-consumer cursor. The
//! consumer walks the half-open range `(cursor, max_id]` one id at a time in
//! increasing order, so delivery order is the allocation order and a crash
//! mid-handler re-delivers exactly the unhandled item on restart.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use harvester_protocol::QueueName;

use crate::cache::CacheBus;
use crate::error::{BusError, Result};

/// One direction of the client/daemon message flow.
#[derive(Debug, Clone, Copy)]
pub struct Queue {
    name: QueueName,
}

/// One consumer's private high-water mark over a queue.
///
/// Every distinct consumer owns its own cursor key. Two consumers sharing a
/// cursor would race it and silently skip each other's unseen items.
#[derive(Debug, Clone)]
pub struct Cursor {
    key: String,
}

impl Cursor {
    /// The queue's canonical consumer: the daemon for jobs, and the daemon's
    /// own bookkeeping sweep for events.
    pub fn canonical(name: QueueName) -> Self {
        Cursor {
            key: name.handled_key(),
        }
    }

    /// An additional independent consumer, keyed by a stable consumer id
    /// (clients use their pid).
    pub fn for_consumer(name: QueueName, consumer: &str) -> Self {
        Cursor {
            key: name.handled_key_for(consumer),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Create the cursor at 0 unless it already exists; a reconnecting
    /// consumer keeps its progress.
    pub fn ensure(&self, bus: &mut CacheBus) -> Result<()> {
        self.ensure_at(bus, 0)
    }

    /// Create the cursor at `position` unless it already exists. A consumer
    /// joining late seeds its cursor at the queue's current high-water mark
    /// so it starts from present state instead of replaying history.
    pub fn ensure_at(&self, bus: &mut CacheBus, position: u64) -> Result<()> {
        bus.ensure_counter(&self.key, position)
    }

    pub fn position(&self, bus: &mut CacheBus) -> Result<u64> {
        bus.counter(&self.key)
    }
}

impl Queue {
    pub fn new(name: QueueName) -> Self {
        Queue { name }
    }

    pub fn name(&self) -> QueueName {
        self.name
    }

    /// Reset both producer-side counters to 0. Only the daemon calls this,
    /// once, while initializing its freshly-derived private namespace.
    pub fn init(&self, bus: &mut CacheBus) -> Result<()> {
        bus.set(&self.name.max_id_key(), &0u64)?;
        bus.set(&self.name.handled_key(), &0u64)?;
        Ok(())
    }

    /// Allocate the next id, then write the payload the builder produces for
    /// it. Fails with [`BusError::QueueUninitialized`] when the allocation
    /// counter is absent, which means no daemon ever set up this namespace.
    pub fn publish<T, F>(&self, bus: &mut CacheBus, build: F) -> Result<u64>
    where
        T: Serialize,
        F: FnOnce(u64) -> T,
    {
        let max_key = self.name.max_id_key();
        let id = match bus.increment(&max_key, 1) {
            Ok(id) => id,
            Err(BusError::KeyNotFound(key)) => return Err(BusError::QueueUninitialized(key)),
            Err(err) => return Err(err),
        };
        bus.set(&self.name.item_key(id), &build(id))?;
        debug!(queue = ?self.name, id, "published");
        Ok(id)
    }

    /// Deliver everything between the consumer's cursor and the allocation
    /// counter, in increasing id order, advancing the cursor one id at a
    /// time after each handler invocation returns.
    ///
    /// An id whose payload is not yet visible stops the walk without
    /// advancing: the item is deferred to the next poll and later ids are
    /// never delivered ahead of it. A payload that is present but
    /// unparseable is dropped with a warning and the cursor advanced, so a
    /// poison item cannot wedge the queue. Missing counters read as 0.
    ///
    /// Returns the delivered ids.
    pub fn drain<T, F>(&self, bus: &mut CacheBus, cursor: &Cursor, mut handle: F) -> Result<Vec<u64>>
    where
        T: DeserializeOwned,
        F: FnMut(u64, T),
    {
        let max_id = bus.counter(&self.name.max_id_key())?;
        let mut handled = cursor.position(bus)?;
        let mut delivered = Vec::new();

        while handled < max_id {
            let id = handled + 1;
            let key = self.name.item_key(id);
            let Some(bytes) = bus.get_raw(&key)? else {
                // Allocated but not yet visible; retry next poll.
                debug!(queue = ?self.name, id, "item not yet visible, deferring");
                break;
            };
            match serde_json::from_slice::<T>(&bytes) {
                Ok(item) => {
                    handle(id, item);
                    delivered.push(id);
                }
                Err(err) => {
                    warn!(queue = ?self.name, id, %err, "dropping malformed item");
                }
            }
            handled = bus.increment(cursor.key(), 1)?;
        }

        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use harvester_protocol::{keys::PROCESS_NAME, Namespace};

    fn bus() -> CacheBus {
        CacheBus::new(
            Box::new(MemoryStore::new()),
            Namespace::for_daemon(PROCESS_NAME, 42),
        )
    }

    fn drain_ids(queue: &Queue, bus: &mut CacheBus, cursor: &Cursor) -> Vec<(u64, String)> {
        let mut seen = Vec::new();
        queue
            .drain::<String, _>(bus, cursor, |id, item| seen.push((id, item)))
            .unwrap();
        seen
    }

    #[test]
    fn publish_requires_initialized_queue() {
        let mut bus = bus();
        let queue = Queue::new(QueueName::Jobs);
        let err = queue.publish(&mut bus, |id| id.to_string()).unwrap_err();
        assert!(matches!(err, BusError::QueueUninitialized(_)));
    }

    #[test]
    fn delivers_in_increasing_id_order_at_most_once() {
        let mut bus = bus();
        let queue = Queue::new(QueueName::Jobs);
        queue.init(&mut bus).unwrap();
        let cursor = Cursor::canonical(QueueName::Jobs);

        for name in ["first", "second", "third"] {
            queue.publish(&mut bus, |_| name.to_string()).unwrap();
        }

        let seen = drain_ids(&queue, &mut bus, &cursor);
        assert_eq!(
            seen,
            vec![
                (1, "first".into()),
                (2, "second".into()),
                (3, "third".into())
            ]
        );
        assert_eq!(cursor.position(&mut bus).unwrap(), 3);

        // Idempotence: nothing new published, nothing re-delivered.
        assert!(drain_ids(&queue, &mut bus, &cursor).is_empty());
    }

    #[test]
    fn missing_item_defers_later_ids_until_visible() {
        let mut bus = bus();
        let queue = Queue::new(QueueName::Events);
        queue.init(&mut bus).unwrap();
        let cursor = Cursor::canonical(QueueName::Events);

        for n in 1..=3u64 {
            queue.publish(&mut bus, |_| format!("event {n}")).unwrap();
        }
        // Simulate a delayed writer: id 2's payload is not visible yet.
        bus.delete(&QueueName::Events.item_key(2)).unwrap();

        let seen = drain_ids(&queue, &mut bus, &cursor);
        assert_eq!(seen, vec![(1, "event 1".into())]);
        assert_eq!(cursor.position(&mut bus).unwrap(), 1);

        // The payload lands; delivery resumes at 2, then 3.
        bus.set(&QueueName::Events.item_key(2), "event 2").unwrap();
        let seen = drain_ids(&queue, &mut bus, &cursor);
        assert_eq!(seen, vec![(2, "event 2".into()), (3, "event 3".into())]);
    }

    #[test]
    fn malformed_item_is_dropped_not_wedged() {
        let mut bus = bus();
        let queue = Queue::new(QueueName::Events);
        queue.init(&mut bus).unwrap();
        let cursor = Cursor::canonical(QueueName::Events);

        queue.publish(&mut bus, |_| "good".to_string()).unwrap();
        queue.publish(&mut bus, |_| "poison".to_string()).unwrap();
        queue.publish(&mut bus, |_| "also good".to_string()).unwrap();
        bus.set(&QueueName::Events.item_key(2), &7u64).unwrap();

        let seen = drain_ids(&queue, &mut bus, &cursor);
        assert_eq!(seen, vec![(1, "good".into()), (3, "also good".into())]);
        assert_eq!(cursor.position(&mut bus).unwrap(), 3);
    }

    #[test]
    fn cursor_created_at_the_high_water_mark_skips_history() {
        let mut bus = bus();
        let queue = Queue::new(QueueName::Events);
        queue.init(&mut bus).unwrap();
        queue.publish(&mut bus, |_| "old".to_string()).unwrap();

        let late = Cursor::for_consumer(QueueName::Events, "900");
        let max = bus.counter(&QueueName::Events.max_id_key()).unwrap();
        late.ensure_at(&mut bus, max).unwrap();
        assert!(drain_ids(&queue, &mut bus, &late).is_empty());

        queue.publish(&mut bus, |_| "new".to_string()).unwrap();
        assert_eq!(drain_ids(&queue, &mut bus, &late), vec![(2, "new".into())]);

        // Re-ensuring never moves an existing cursor.
        late.ensure_at(&mut bus, 0).unwrap();
        assert_eq!(late.position(&mut bus).unwrap(), 2);
    }

    #[test]
    fn independent_cursors_do_not_race() {
        let mut bus = bus();
        let queue = Queue::new(QueueName::Events);
        queue.init(&mut bus).unwrap();

        let daemon = Cursor::canonical(QueueName::Events);
        let client = Cursor::for_consumer(QueueName::Events, "3100");
        client.ensure(&mut bus).unwrap();

        queue.publish(&mut bus, |_| "hello".to_string()).unwrap();

        // The daemon's bookkeeping sweep must not eat the client's copy.
        assert_eq!(drain_ids(&queue, &mut bus, &daemon).len(), 1);
        assert_eq!(drain_ids(&queue, &mut bus, &client).len(), 1);
    }
}
