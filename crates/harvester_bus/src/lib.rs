//! Cache-backed coordination layer between the Harvester daemon and clients.
//!
//! Everything here sits directly on top of the shared cache server: the
//! namespaced [`CacheBus`], the [`CacheServerSupervisor`] that locates or
//! spawns the server process, the counter-indexed [`Queue`] carrying jobs and
//! events, and the [`registry`] of connected client pids.

pub mod cache;
pub mod error;
pub mod liveness;
pub mod memcached;
pub mod queue;
pub mod registry;
pub mod store;
pub mod supervisor;

pub use cache::CacheBus;
pub use error::{BusError, Result};
pub use liveness::{PidLiveness, SystemLiveness};
pub use memcached::{MemcachedClient, DEFAULT_ADDR};
pub use queue::{Cursor, Queue};
pub use store::{KvBackend, MemoryStore};
pub use supervisor::CacheServerSupervisor;
