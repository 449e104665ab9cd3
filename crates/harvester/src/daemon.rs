//! The daemon's main loop and its seam to the scan/upload subsystem.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use harvester_bus::{registry, BusError, CacheBus, Cursor, PidLiveness, Queue};
use harvester_protocol::{keys, Event, EventKind, Job, JobRequest, QueueName, SettingsSnapshot};

/// Daemon tuning knobs.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub process_name: String,
    /// Fixed delay between poll iterations.
    pub poll_interval: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        DaemonConfig {
            process_name: keys::PROCESS_NAME.to_string(),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Entry point into the scan/upload subsystem.
///
/// `dispatch` must hand the work off and return; the daemon loop never waits
/// on a refresh to finish, so polling latency stays independent of how long
/// a pass takes.
pub trait RefreshHandler: Send + Sync {
    fn dispatch(&self, job: Job);
}

/// Producer-side handle for publishing events into the shared queue.
pub struct EventSink<'a> {
    bus: &'a mut CacheBus,
    queue: Queue,
}

impl<'a> EventSink<'a> {
    pub fn new(bus: &'a mut CacheBus) -> Self {
        EventSink {
            bus,
            queue: Queue::new(QueueName::Events),
        }
    }

    pub fn publish(&mut self, kind: EventKind) -> Result<u64, BusError> {
        self.queue.publish(self.bus, |id| Event { id, kind })
    }
}

/// The work a refresh actually performs, behind a seam: folder scanning and
/// file uploading are implemented elsewhere and only publish progress here.
pub trait ScanUploadPass: Send + Sync {
    fn run(&self, settings: &SettingsSnapshot, events: &mut EventSink<'_>) -> anyhow::Result<()>;
}

/// Placeholder pass for builds without the scan pipeline linked in.
pub struct NullPass;

impl ScanUploadPass for NullPass {
    fn run(&self, settings: &SettingsSnapshot, events: &mut EventSink<'_>) -> anyhow::Result<()> {
        warn!(
            data_directory = %settings.data_directory.display(),
            "scan/upload pipeline is not linked into this build"
        );
        events.publish(EventKind::StatusMessage {
            message: "Nothing to do: no scan pipeline available.".to_string(),
        })?;
        Ok(())
    }
}

type BusFactory = dyn Fn() -> Result<CacheBus, BusError> + Send + Sync;

/// Default [`RefreshHandler`]: runs each pass on its own thread with its own
/// bus connection, bracketing the work with the shared scans-running flag
/// and start/finish status events.
pub struct ThreadedRefresh {
    make_bus: Arc<BusFactory>,
    pass: Arc<dyn ScanUploadPass>,
}

impl ThreadedRefresh {
    pub fn new<F>(make_bus: F, pass: Arc<dyn ScanUploadPass>) -> Self
    where
        F: Fn() -> Result<CacheBus, BusError> + Send + Sync + 'static,
    {
        ThreadedRefresh {
            make_bus: Arc::new(make_bus),
            pass,
        }
    }
}

impl RefreshHandler for ThreadedRefresh {
    fn dispatch(&self, job: Job) {
        let JobRequest::Refresh { settings } = job.request else {
            warn!(id = job.id, "refusing to dispatch unrecognized job kind");
            return;
        };
        let make_bus = Arc::clone(&self.make_bus);
        let pass = Arc::clone(&self.pass);
        let id = job.id;
        thread::spawn(move || {
            if let Err(err) = run_pass(&*make_bus, &*pass, &settings) {
                error!(job = id, %err, "refresh pass failed");
            }
        });
    }
}

fn run_pass(
    make_bus: &BusFactory,
    pass: &dyn ScanUploadPass,
    settings: &SettingsSnapshot,
) -> anyhow::Result<()> {
    let mut bus = make_bus()?;
    bus.set(keys::SCANS_RUNNING, &true)?;
    let mut events = EventSink::new(&mut bus);
    events.publish(EventKind::StatusMessage {
        message: "Scanning folders and uploading files...".to_string(),
    })?;
    let result = pass.run(settings, &mut events);
    let message = match &result {
        Ok(()) => "Folder scans and uploads complete.".to_string(),
        Err(err) => format!("Folder scans and uploads failed: {err}"),
    };
    events.publish(EventKind::StatusMessage { message })?;
    bus.set(keys::SCANS_RUNNING, &false)?;
    result
}

/// The daemon: owns the bus, drains jobs, watches clients, and sweeps its
/// own copy of the event stream.
pub struct Daemon {
    bus: CacheBus,
    liveness: Box<dyn PidLiveness>,
    handler: Box<dyn RefreshHandler>,
    jobs: Queue,
    events: Queue,
    job_cursor: Cursor,
    event_cursor: Cursor,
    known_clients: Vec<u32>,
    poll_interval: Duration,
}

impl Daemon {
    /// Startup handshake: probe the cache, publish our pid in the top-level
    /// namespace, switch to the private namespace, and initialize the
    /// registry, both queues, and the scans-running flag.
    ///
    /// Any failure here is fatal; the daemon aborts rather than serve a
    /// half-initialized namespace.
    pub fn connect(
        mut bus: CacheBus,
        liveness: Box<dyn PidLiveness>,
        handler: Box<dyn RefreshHandler>,
        config: DaemonConfig,
    ) -> Result<Self, BusError> {
        let pid = std::process::id();
        bus.set_namespace(harvester_protocol::Namespace::top_level(
            &config.process_name,
        ));
        bus.probe()?;
        bus.set(keys::DAEMON_PID, &pid)?;
        bus.set_namespace(harvester_protocol::Namespace::for_daemon(
            &config.process_name,
            pid,
        ));

        registry::init(&mut bus)?;
        let jobs = Queue::new(QueueName::Jobs);
        let events = Queue::new(QueueName::Events);
        jobs.init(&mut bus)?;
        events.init(&mut bus)?;
        bus.set(keys::SCANS_RUNNING, &false)?;

        info!(pid, namespace = %bus.namespace(), "daemon serving; waiting for clients to connect");
        Ok(Daemon {
            bus,
            liveness,
            handler,
            jobs,
            events,
            job_cursor: Cursor::canonical(QueueName::Jobs),
            event_cursor: Cursor::canonical(QueueName::Events),
            known_clients: Vec::new(),
            poll_interval: config.poll_interval,
        })
    }

    pub fn namespace(&self) -> &harvester_protocol::Namespace {
        self.bus.namespace()
    }

    /// Serve forever. The loop has no terminal state; the process is killed
    /// to stop it. Transport failures propagate and abort the process.
    pub fn run(mut self) -> Result<(), BusError> {
        loop {
            self.run_once()?;
            thread::sleep(self.poll_interval);
        }
    }

    /// One poll iteration, exposed so tests can step the loop without time
    /// passing: watch clients, dispatch jobs, sweep events.
    pub fn run_once(&mut self) -> Result<(), BusError> {
        self.watch_clients()?;
        self.dispatch_jobs()?;
        self.sweep_events()?;
        Ok(())
    }

    fn watch_clients(&mut self) -> Result<(), BusError> {
        let clients = registry::list(&mut self.bus)?;
        for pid in &clients {
            if !self.known_clients.contains(pid) {
                info!(pid, "client connected");
            }
        }
        let removed = registry::prune_dead(&mut self.bus, self.liveness.as_mut())?;
        for pid in &removed {
            info!(pid, "client disconnected");
        }
        self.known_clients = clients
            .into_iter()
            .filter(|pid| !removed.contains(pid))
            .collect();
        Ok(())
    }

    fn dispatch_jobs(&mut self) -> Result<(), BusError> {
        let handler = &self.handler;
        // The cursor advances right after dispatch, not completion: the
        // handler is fire-and-forget and a pass may outlive many polls.
        self.jobs
            .drain::<Job, _>(&mut self.bus, &self.job_cursor, |id, job| {
                if matches!(&job.request, JobRequest::Unknown) {
                    warn!(id, "ignoring job of unrecognized kind");
                } else {
                    info!(id, "dispatching refresh job");
                    handler.dispatch(job);
                }
            })?;
        Ok(())
    }

    fn sweep_events(&mut self) -> Result<(), BusError> {
        // The daemon does not act on its own events; it only moves its own
        // cursor so its view of the queue does not grow without bound.
        // Clients each drain with their own cursor.
        self.events
            .drain::<Event, _>(&mut self.bus, &self.event_cursor, |id, event| {
                debug!(id, kind = ?event.kind, "event swept");
            })?;
        Ok(())
    }
}
