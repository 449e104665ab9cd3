//! Error taxonomy for the coordination layer.

use thiserror::Error;

/// Errors surfaced by the cache bus and the layers built on it.
///
/// Startup errors (`CacheUnavailable`, `SupervisorLaunchFailed`,
/// `RegistryJoinFailed`) are fatal to the owning process. `PeerLost` is fatal
/// to a client mid-session. Per-item queue trouble never reaches this enum;
/// the queue recovers locally by deferring or dropping the item.
#[derive(Debug, Error)]
pub enum BusError {
    /// The cache server is unreachable. Every bus call is a round trip, so
    /// this can surface from any operation.
    #[error("cache server unavailable")]
    CacheUnavailable(#[source] std::io::Error),

    /// `increment` on a key the owning actor never initialized.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// The server replied with something outside the text protocol.
    #[error("cache protocol violation: {0}")]
    Protocol(String),

    /// Could not locate or spawn the cache server binary.
    #[error("failed to launch cache server")]
    SupervisorLaunchFailed(#[source] std::io::Error),

    /// A queue's allocation counter is missing, so nobody may publish into
    /// it. The daemon initializes these at startup; absence means the
    /// publisher is talking to the wrong namespace or to no daemon at all.
    #[error("queue counter {0} missing; no daemon initialized this namespace")]
    QueueUninitialized(String),

    /// A key the client expects the daemon to have written is absent.
    /// Signals a protocol or version mismatch between client and daemon.
    #[error("{key} missing from daemon namespace; client and daemon may be incompatible")]
    RegistryJoinFailed { key: &'static str },

    /// A process this one depends on is gone. Observed mid-session by a
    /// client; never retried.
    #[error("{what} (pid {pid}) is no longer running")]
    PeerLost { what: &'static str, pid: u32 },
}

pub type Result<T> = std::result::Result<T, BusError>;
