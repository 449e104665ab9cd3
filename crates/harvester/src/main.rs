use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use harvester::cli::HarvesterArgs;
use harvester::client::{Client, ClientConfig, UiUpdate};
use harvester::config;
use harvester::daemon::{Daemon, DaemonConfig, NullPass, ThreadedRefresh};
use harvester_bus::{CacheBus, CacheServerSupervisor, MemcachedClient, SystemLiveness};
use harvester_protocol::{keys, Namespace};

fn main() -> anyhow::Result<()> {
    let args = HarvesterArgs::parse();
    init_tracing(&args.log_level);

    if args.mode.daemon {
        run_daemon(args)
    } else if args.mode.client {
        run_client(args)
    } else {
        bail!("the standalone GUI is not part of this crate; run with --daemon or --client");
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn connect_bus(addr: &str) -> anyhow::Result<CacheBus> {
    let backend = MemcachedClient::connect(addr).context("connecting to the cache server")?;
    Ok(CacheBus::new(
        Box::new(backend),
        Namespace::top_level(keys::PROCESS_NAME),
    ))
}

fn run_daemon(args: HarvesterArgs) -> anyhow::Result<()> {
    let supervisor = CacheServerSupervisor::new();
    let cache_pid = supervisor
        .locate_or_start()
        .context("the daemon needs a cache server")?;
    info!(cache_pid, "cache server is up");

    let bus = connect_bus(&args.cache_addr)?;

    // Each refresh pass gets its own connection, namespaced like the daemon.
    let addr = args.cache_addr.clone();
    let namespace = Namespace::for_daemon(keys::PROCESS_NAME, std::process::id());
    let handler = ThreadedRefresh::new(
        move || {
            let backend = MemcachedClient::connect(&addr)?;
            Ok(CacheBus::new(Box::new(backend), namespace.clone()))
        },
        Arc::new(NullPass),
    );

    let daemon = Daemon::connect(
        bus,
        Box::new(SystemLiveness::new()),
        Box::new(handler),
        DaemonConfig {
            poll_interval: Duration::from_millis(args.poll_interval_ms),
            ..Default::default()
        },
    )?;
    daemon.run()?;
    Ok(())
}

fn run_client(args: HarvesterArgs) -> anyhow::Result<()> {
    let supervisor = CacheServerSupervisor::new();
    let Some(cache_pid) = supervisor.locate() else {
        bail!("the cache server is not running; a client needs an existing daemon to connect to");
    };

    let bus = connect_bus(&args.cache_addr)?;
    let (tx, rx) = mpsc::channel();
    let ui = thread::spawn(move || console_ui(rx));

    let mut client = Client::connect(
        bus,
        Box::new(SystemLiveness::new()),
        cache_pid,
        tx,
        ClientConfig {
            poll_interval: Duration::from_millis(args.poll_interval_ms),
            ..Default::default()
        },
    )?;

    if client.scans_already_running() {
        info!("folder scans and uploads are already running in the daemon");
    }
    if args.refresh {
        let settings = config::load_settings(args.settings.as_deref())?;
        client.submit_refresh(settings)?;
    }

    let result = client.run();
    let _ = ui.join();
    result.map_err(Into::into)
}

/// Headless stand-in for the GUI: owns all "UI" state and only reads from
/// the channel the client loop posts to.
fn console_ui(rx: Receiver<UiUpdate>) {
    for update in rx {
        match update {
            UiUpdate::Status(message) => info!("status: {message}"),
            UiUpdate::Progress {
                scanned,
                total,
                message,
            } => info!("progress {scanned}/{total}: {message}"),
            UiUpdate::AddRow { table, .. } => info!(?table, "row added"),
            UiUpdate::UpdateRowStatus { table, .. } => info!(?table, "row status updated"),
            UiUpdate::MessageDialog { title, message, .. } => info!("[{title}] {message}"),
            UiUpdate::CriticalFailure(notice) => {
                eprintln!("{}\n{}", notice.preamble, notice.reason);
            }
        }
    }
}
