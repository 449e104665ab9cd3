//! The client's main loop: liveness checks, event draining, UI dispatch.

use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use harvester_bus::{registry, BusError, CacheBus, Cursor, PidLiveness, Queue};
use harvester_protocol::{
    keys, Event, EventKind, Job, JobRequest, Namespace, QueueName, SettingsSnapshot, TableId,
};

/// Client tuning knobs.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub process_name: String,
    /// Fixed delay between poll iterations.
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            process_name: keys::PROCESS_NAME.to_string(),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// What failed and why, for a modal-style notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub preamble: String,
    pub reason: String,
}

/// Messages the client loop posts to the UI thread.
///
/// The UI thread owns all UI state exclusively and only reads from the
/// channel; the loop never touches UI state directly.
#[derive(Debug, Clone, PartialEq)]
pub enum UiUpdate {
    Status(String),
    Progress {
        scanned: u64,
        total: u64,
        message: String,
    },
    AddRow {
        table: TableId,
        row: serde_json::Value,
    },
    UpdateRowStatus {
        table: TableId,
        row: serde_json::Value,
    },
    MessageDialog {
        title: String,
        message: String,
        icon: String,
    },
    /// Fatal: the client is about to terminate.
    CriticalFailure(Notice),
}

/// A connected client: observes the daemon's events and submits jobs.
pub struct Client {
    bus: CacheBus,
    liveness: Box<dyn PidLiveness>,
    ui: Sender<UiUpdate>,
    daemon_pid: u32,
    cache_server_pid: u32,
    jobs: Queue,
    events: Queue,
    cursor: Cursor,
    scans_running_at_connect: bool,
    poll_interval: Duration,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("daemon_pid", &self.daemon_pid)
            .field("cache_server_pid", &self.cache_server_pid)
            .field("scans_running_at_connect", &self.scans_running_at_connect)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Startup handshake: probe the cache, resolve the daemon's pid from the
    /// top-level namespace, verify it is alive, re-derive the daemon's
    /// private namespace, and join the client registry.
    ///
    /// A client never starts a daemon or cache server itself; any missing
    /// piece is fatal here.
    pub fn connect(
        mut bus: CacheBus,
        mut liveness: Box<dyn PidLiveness>,
        cache_server_pid: u32,
        ui: Sender<UiUpdate>,
        config: ClientConfig,
    ) -> Result<Self, BusError> {
        bus.set_namespace(Namespace::top_level(&config.process_name));
        bus.probe()?;

        let Some(daemon_pid) = bus.get::<u32>(keys::DAEMON_PID)? else {
            return Err(BusError::RegistryJoinFailed {
                key: keys::DAEMON_PID,
            });
        };
        if !liveness.is_running(daemon_pid) {
            return Err(BusError::PeerLost {
                what: "the Harvester daemon",
                pid: daemon_pid,
            });
        }
        bus.set_namespace(Namespace::for_daemon(&config.process_name, daemon_pid));

        let own_pid = std::process::id();
        registry::join(&mut bus, own_pid)?;
        // A fresh cursor starts at the current high-water mark: a new client
        // renders present state, not the daemon's whole event history. The
        // create-if-absent write keeps a reconnecting client's position.
        let cursor = Cursor::for_consumer(QueueName::Events, &own_pid.to_string());
        let max_event_id = bus.counter(&QueueName::Events.max_id_key())?;
        cursor.ensure_at(&mut bus, max_event_id)?;

        let scans_running_at_connect = bus.get::<bool>(keys::SCANS_RUNNING)?.unwrap_or(false);
        info!(daemon_pid, cache_server_pid, "connected to daemon");

        Ok(Client {
            bus,
            liveness,
            ui,
            daemon_pid,
            cache_server_pid,
            jobs: Queue::new(QueueName::Jobs),
            events: Queue::new(QueueName::Events),
            cursor,
            scans_running_at_connect,
            poll_interval: config.poll_interval,
        })
    }

    pub fn daemon_pid(&self) -> u32 {
        self.daemon_pid
    }

    /// Whether a scan/upload pass was already in flight when we joined. The
    /// UI uses this once, to decide whether a settings dialog may be shown.
    pub fn scans_already_running(&self) -> bool {
        self.scans_running_at_connect
    }

    /// Submit a refresh request to the daemon. Returns the allocated job id.
    pub fn submit_refresh(&mut self, settings: SettingsSnapshot) -> Result<u64, BusError> {
        let id = self.jobs.publish(&mut self.bus, |id| Job {
            id,
            requested_at: Utc::now(),
            request: JobRequest::Refresh { settings },
        })?;
        info!(id, "submitted refresh job");
        Ok(id)
    }

    /// Serve until a peer disappears. Peer loss is fatal by design: the
    /// error propagates, the process exits, and the user relaunches to
    /// reconnect. No retry loop.
    pub fn run(mut self) -> Result<(), BusError> {
        loop {
            self.run_once()?;
            thread::sleep(self.poll_interval);
        }
    }

    /// One poll iteration, exposed so tests can step the loop without time
    /// passing: liveness checks first, then an event drain.
    pub fn run_once(&mut self) -> Result<(), BusError> {
        self.check_peer("the cache server", self.cache_server_pid)?;
        self.check_peer("the Harvester daemon", self.daemon_pid)?;

        let ui = &self.ui;
        self.events
            .drain::<Event, _>(&mut self.bus, &self.cursor, |id, event| {
                let update = match event.kind {
                    EventKind::StatusMessage { message } => UiUpdate::Status(message),
                    EventKind::ProgressIncrement {
                        scanned,
                        total,
                        message,
                    } => UiUpdate::Progress {
                        scanned,
                        total,
                        message,
                    },
                    EventKind::RowAdded { table, row } => UiUpdate::AddRow { table, row },
                    EventKind::RowStatusUpdated { table, row } => {
                        UiUpdate::UpdateRowStatus { table, row }
                    }
                    EventKind::ShowMessageDialog {
                        title,
                        message,
                        icon,
                    } => UiUpdate::MessageDialog {
                        title,
                        message,
                        icon,
                    },
                    EventKind::Unknown => {
                        warn!(id, "ignoring event of unrecognized kind");
                        return;
                    }
                };
                debug!(id, "handled event");
                if ui.send(update).is_err() {
                    debug!(id, "UI channel closed; dropping update");
                }
            })?;
        Ok(())
    }

    fn check_peer(&mut self, what: &'static str, pid: u32) -> Result<(), BusError> {
        if self.liveness.is_running(pid) {
            return Ok(());
        }
        error!(what, pid, "peer stopped running");
        let notice = Notice {
            preamble: format!(
                "The Harvester client must exit, because the connection to {what} has been lost."
            ),
            reason: format!(
                "{what} (PID {pid}) appears to have stopped running. \
                 Feel free to relaunch the client to try reconnecting."
            ),
        };
        let _ = self.ui.send(UiUpdate::CriticalFailure(notice));
        Err(BusError::PeerLost { what, pid })
    }
}
