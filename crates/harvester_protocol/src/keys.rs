//! Cache key layout shared by the daemon and all clients.
//!
//! The flat strings below are the wire format of a deployment. Every process
//! talking to the same cache server must produce them byte for byte, so they
//! are defined once here and nowhere else.

/// Executable / namespace stem for all Harvester processes.
pub const PROCESS_NAME: &str = "harvester";

/// JSON list of connected client pids, owned by the daemon.
pub const CLIENTS: &str = "clients";

/// The daemon's pid, published in the top-level namespace at startup.
pub const DAEMON_PID: &str = "daemon_pid";

/// Boolean flag: a folder scan / upload pass is currently in flight.
pub const SCANS_RUNNING: &str = "folderScansAndUploadsRunning";

/// Well-known name of one counter-indexed queue within a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueName {
    /// Client -> daemon command requests.
    Jobs,
    /// Daemon -> client progress and state notifications.
    Events,
}

impl QueueName {
    fn stem(self) -> &'static str {
        match self {
            QueueName::Jobs => "job",
            QueueName::Events => "event",
        }
    }

    /// Counter holding the highest id ever allocated on this queue.
    pub fn max_id_key(self) -> String {
        format!("max_{}_id", self.stem())
    }

    /// Cursor of the queue's canonical consumer: the daemon, for both its
    /// job drain and its bookkeeping sweep of the event queue.
    pub fn handled_key(self) -> String {
        format!("max_handled_{}_id", self.stem())
    }

    /// Cursor of an additional, independent consumer. Each consumer owning
    /// its own cursor is what keeps two drains from racing one counter.
    pub fn handled_key_for(self, consumer: &str) -> String {
        format!("{}_{}", self.handled_key(), consumer)
    }

    /// Key the payload for `id` lives under.
    pub fn item_key(self, id: u64) -> String {
        format!("{}_{}", self.stem(), id)
    }
}

/// Key prefix partitioning one logical actor's keys from everyone else's.
///
/// Assigned at actor startup and immutable afterwards; two concurrently
/// active actors must never share one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace(String);

impl Namespace {
    /// The pre-handshake namespace, used only to publish and resolve
    /// `daemon_pid` before the daemon's private namespace is known.
    pub fn top_level(process_name: &str) -> Self {
        Namespace(format!("{process_name}_"))
    }

    /// The private namespace of the daemon with the given pid. All queue,
    /// registry, and flag keys live here.
    pub fn for_daemon(process_name: &str, pid: u32) -> Self {
        Namespace(format!("{process_name}_{pid}_"))
    }

    pub fn prefix(&self) -> &str {
        &self.0
    }

    /// Fully qualified key as sent to the cache server.
    pub fn key(&self, key: &str) -> String {
        format!("{}{}", self.0, key)
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_key_layout_is_stable() {
        assert_eq!(QueueName::Jobs.max_id_key(), "max_job_id");
        assert_eq!(QueueName::Jobs.handled_key(), "max_handled_job_id");
        assert_eq!(QueueName::Jobs.item_key(7), "job_7");
        assert_eq!(QueueName::Events.max_id_key(), "max_event_id");
        assert_eq!(QueueName::Events.handled_key(), "max_handled_event_id");
        assert_eq!(
            QueueName::Events.handled_key_for("4321"),
            "max_handled_event_id_4321"
        );
        assert_eq!(QueueName::Events.item_key(1), "event_1");
    }

    #[test]
    fn namespace_derivation() {
        let top = Namespace::top_level(PROCESS_NAME);
        assert_eq!(top.key(DAEMON_PID), "harvester_daemon_pid");

        let private = Namespace::for_daemon(PROCESS_NAME, 9001);
        assert_eq!(private.key(CLIENTS), "harvester_9001_clients");
        assert_ne!(top.prefix(), private.prefix());
    }
}
