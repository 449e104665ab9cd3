//! The daemon's registry of connected client pids.
//!
//! A single JSON list under the well-known `clients` key. Mutations are
//! read-modify-write with no compare-and-swap; tolerable because joins are
//! rare and user-triggered, and only the daemon mutates the list afterwards.

use tracing::debug;

use harvester_protocol::keys;

use crate::cache::CacheBus;
use crate::error::{BusError, Result};
use crate::liveness::PidLiveness;

/// Create the (empty) registry. Daemon startup only.
pub fn init(bus: &mut CacheBus) -> Result<()> {
    bus.set(keys::CLIENTS, &Vec::<u32>::new())
}

pub fn list(bus: &mut CacheBus) -> Result<Vec<u32>> {
    Ok(bus.get(keys::CLIENTS)?.unwrap_or_default())
}

/// Append a client pid. The key must already exist: its absence means this
/// client is pointed at a namespace no compatible daemon set up.
pub fn join(bus: &mut CacheBus, pid: u32) -> Result<Vec<u32>> {
    let Some(mut pids) = bus.get::<Vec<u32>>(keys::CLIENTS)? else {
        return Err(BusError::RegistryJoinFailed { key: keys::CLIENTS });
    };
    if !pids.contains(&pid) {
        pids.push(pid);
    }
    bus.set(keys::CLIENTS, &pids)?;
    Ok(pids)
}

/// Drop every pid the OS no longer reports as running, persist the
/// remainder, and report the removals.
pub fn prune_dead(bus: &mut CacheBus, liveness: &mut dyn PidLiveness) -> Result<Vec<u32>> {
    let pids = list(bus)?;
    let (alive, dead): (Vec<u32>, Vec<u32>) =
        pids.into_iter().partition(|pid| liveness.is_running(*pid));
    if !dead.is_empty() {
        for pid in &dead {
            debug!(pid, "removing client from registry, no longer running");
        }
        bus.set(keys::CLIENTS, &alive)?;
    }
    Ok(dead)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use harvester_protocol::{keys::PROCESS_NAME, Namespace};
    use std::collections::HashSet;

    struct FakeLiveness(HashSet<u32>);

    impl PidLiveness for FakeLiveness {
        fn is_running(&mut self, pid: u32) -> bool {
            self.0.contains(&pid)
        }
    }

    fn bus() -> CacheBus {
        CacheBus::new(
            Box::new(MemoryStore::new()),
            Namespace::for_daemon(PROCESS_NAME, 7),
        )
    }

    #[test]
    fn join_requires_daemon_initialized_registry() {
        let mut bus = bus();
        let err = join(&mut bus, 100).unwrap_err();
        assert!(matches!(err, BusError::RegistryJoinFailed { .. }));
    }

    #[test]
    fn join_appends_and_deduplicates() {
        let mut bus = bus();
        init(&mut bus).unwrap();
        assert_eq!(join(&mut bus, 100).unwrap(), vec![100]);
        assert_eq!(join(&mut bus, 200).unwrap(), vec![100, 200]);
        assert_eq!(join(&mut bus, 100).unwrap(), vec![100, 200]);
    }

    #[test]
    fn prune_removes_only_dead_pids() {
        let mut bus = bus();
        init(&mut bus).unwrap();
        join(&mut bus, 100).unwrap();
        join(&mut bus, 200).unwrap();

        let mut liveness = FakeLiveness(HashSet::from([100]));
        let removed = prune_dead(&mut bus, &mut liveness).unwrap();
        assert_eq!(removed, vec![200]);
        assert_eq!(list(&mut bus).unwrap(), vec![100]);

        // Nothing else to prune on the next sweep.
        assert!(prune_dead(&mut bus, &mut liveness).unwrap().is_empty());
    }
}
