//! The namespaced, typed cache bus.

use std::time::Duration;

use harvester_protocol::Namespace;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{BusError, Result};
use crate::store::KvBackend;

/// A connection to the shared cache with a per-actor key namespace.
///
/// Every key passed in is implicitly prefixed with the namespace before it
/// reaches the backend, so two actors with different namespaces never observe
/// each other's keys. Values are JSON on the wire, which leaves counters as
/// bare ASCII decimal and keeps the server-side `incr` usable on them.
///
/// The bus is an explicit value handed to whoever needs it; there is no
/// process-wide singleton.
pub struct CacheBus {
    backend: Box<dyn KvBackend>,
    namespace: Namespace,
}

impl CacheBus {
    pub fn new(backend: Box<dyn KvBackend>, namespace: Namespace) -> Self {
        CacheBus { backend, namespace }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Re-point the bus at another actor's keys. Only used during the
    /// startup handshake, before the loop starts; a running actor's
    /// namespace is immutable.
    pub fn set_namespace(&mut self, namespace: Namespace) {
        self.namespace = namespace;
    }

    /// Typed read. A missing key or an unparseable value is `None`; only
    /// transport failures are errors.
    pub fn get<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>> {
        match self.get_raw(key)? {
            None => Ok(None),
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => Ok(Some(value)),
                Err(err) => {
                    debug!(key, %err, "discarding unparseable cache value");
                    Ok(None)
                }
            },
        }
    }

    pub fn get_raw(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        self.backend.get(&self.namespace.key(key))
    }

    pub fn set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        self.set_with_ttl(key, value, None)
    }

    pub fn set_with_ttl<T: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let bytes = serde_json::to_vec(value)
            .map_err(|err| BusError::Protocol(format!("cannot serialize {key}: {err}")))?;
        self.backend.set(&self.namespace.key(key), &bytes, ttl)
    }

    pub fn delete(&mut self, key: &str) -> Result<bool> {
        self.backend.delete(&self.namespace.key(key))
    }

    /// Atomic increment of a counter the owning actor pre-initialized.
    pub fn increment(&mut self, key: &str, delta: u64) -> Result<u64> {
        self.backend.incr(&self.namespace.key(key), delta)
    }

    /// Read a counter, treating an absent or malformed value as 0 so a
    /// transient cache miss never crashes a poll loop. Transport failures
    /// still propagate.
    pub fn counter(&mut self, key: &str) -> Result<u64> {
        let value = self
            .get_raw(key)?
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0);
        Ok(value)
    }

    /// Create a counter at `start` if nobody has yet. Safe for a late-joining
    /// consumer: an existing counter is left untouched.
    pub fn ensure_counter(&mut self, key: &str, start: u64) -> Result<()> {
        self.backend
            .add(&self.namespace.key(key), start.to_string().as_bytes(), None)?;
        Ok(())
    }

    /// Verify the cache is writable from this process: set and delete a
    /// throwaway key under our namespace.
    pub fn probe(&mut self) -> Result<()> {
        self.set("test_key", "test_value")?;
        self.delete("test_key")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use harvester_protocol::keys::PROCESS_NAME;

    fn bus(store: &MemoryStore, namespace: Namespace) -> CacheBus {
        CacheBus::new(Box::new(store.clone()), namespace)
    }

    #[test]
    fn namespaces_are_isolated() {
        let store = MemoryStore::new();
        let mut daemon = bus(&store, Namespace::for_daemon(PROCESS_NAME, 1));
        let mut other = bus(&store, Namespace::for_daemon(PROCESS_NAME, 2));

        daemon.set("shared_name", &41u64).unwrap();
        assert_eq!(other.get::<u64>("shared_name").unwrap(), None);
        assert_eq!(daemon.get::<u64>("shared_name").unwrap(), Some(41));
    }

    #[test]
    fn counters_default_to_zero_and_increment() {
        let store = MemoryStore::new();
        let mut bus = bus(&store, Namespace::top_level(PROCESS_NAME));

        assert_eq!(bus.counter("max_job_id").unwrap(), 0);
        // Not initialized: increment must fail, not create the key.
        assert!(matches!(
            bus.increment("max_job_id", 1),
            Err(BusError::KeyNotFound(_))
        ));

        bus.ensure_counter("max_job_id", 0).unwrap();
        assert_eq!(bus.increment("max_job_id", 1).unwrap(), 1);
        assert_eq!(bus.counter("max_job_id").unwrap(), 1);

        // A second ensure must not reset progress.
        bus.ensure_counter("max_job_id", 0).unwrap();
        assert_eq!(bus.counter("max_job_id").unwrap(), 1);
    }

    #[test]
    fn unparseable_values_read_as_absent() {
        let store = MemoryStore::new();
        let mut bus = bus(&store, Namespace::top_level(PROCESS_NAME));
        bus.set("pids", "not-a-list").unwrap();
        assert_eq!(bus.get::<Vec<u32>>("pids").unwrap(), None);
    }

    #[test]
    fn probe_round_trips() {
        let store = MemoryStore::new();
        let mut bus = bus(&store, Namespace::top_level(PROCESS_NAME));
        bus.probe().unwrap();
        assert_eq!(bus.get::<String>("test_key").unwrap(), None);
    }
}
