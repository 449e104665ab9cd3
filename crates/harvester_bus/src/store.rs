//! Raw key-value backends behind the cache bus.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{BusError, Result};

/// Raw operations against the shared cache.
///
/// Keys are fully namespaced by the time they reach a backend. Counter keys
/// hold bare ASCII decimal so the server-side `incr` stays atomic; everything
/// else is an opaque byte payload.
pub trait KvBackend: Send {
    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set(&mut self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()>;
    /// Store only if the key does not exist yet. Returns whether it stored.
    fn add(&mut self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<bool>;
    /// Returns whether the key existed.
    fn delete(&mut self, key: &str) -> Result<bool>;
    /// Atomic increment of a pre-initialized numeric key. Fails with
    /// [`BusError::KeyNotFound`] if the key was never set; it must not
    /// silently spring into existence at the delta.
    fn incr(&mut self, key: &str, delta: u64) -> Result<u64>;
}

/// In-process backend with the same counter semantics as the cache server.
///
/// Clones share one map, which is what lets tests (and single-process runs)
/// wire a daemon-side and a client-side bus to the same store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvBackend for MemoryStore {
    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.lock().unwrap().get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &[u8], _ttl: Option<Duration>) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn add(&mut self, key: &str, value: &[u8], _ttl: Option<Duration>) -> Result<bool> {
        let mut map = self.inner.lock().unwrap();
        if map.contains_key(key) {
            return Ok(false);
        }
        map.insert(key.to_string(), value.to_vec());
        Ok(true)
    }

    fn delete(&mut self, key: &str) -> Result<bool> {
        Ok(self.inner.lock().unwrap().remove(key).is_some())
    }

    fn incr(&mut self, key: &str, delta: u64) -> Result<u64> {
        let mut map = self.inner.lock().unwrap();
        let current = map
            .get(key)
            .ok_or_else(|| BusError::KeyNotFound(key.to_string()))?;
        let value: u64 = std::str::from_utf8(current)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| {
                BusError::Protocol(format!("cannot increment non-numeric value at {key}"))
            })?;
        let next = value.wrapping_add(delta);
        map.insert(key.to_string(), next.to_string().into_bytes());
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incr_requires_initialized_key() {
        let mut store = MemoryStore::new();
        let err = store.incr("counter", 1).unwrap_err();
        assert!(matches!(err, BusError::KeyNotFound(_)));

        store.set("counter", b"0", None).unwrap();
        assert_eq!(store.incr("counter", 1).unwrap(), 1);
        assert_eq!(store.incr("counter", 2).unwrap(), 3);
    }

    #[test]
    fn add_does_not_overwrite() {
        let mut store = MemoryStore::new();
        assert!(store.add("k", b"first", None).unwrap());
        assert!(!store.add("k", b"second", None).unwrap());
        assert_eq!(store.get("k").unwrap().unwrap(), b"first");
    }

    #[test]
    fn clones_share_state() {
        let mut a = MemoryStore::new();
        let mut b = a.clone();
        a.set("k", b"v", None).unwrap();
        assert_eq!(b.get("k").unwrap().unwrap(), b"v");
    }
}
