//! Locates, starts, and health-checks the external cache server process.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use sysinfo::{ProcessesToUpdate, System};
use tracing::{debug, info};

use crate::error::{BusError, Result};

#[cfg(windows)]
const SERVER_PROCESS_NAME: &str = "memcached.exe";
#[cfg(not(windows))]
const SERVER_PROCESS_NAME: &str = "memcached";

/// Supervisor for the memcached process every Harvester actor depends on.
///
/// Callers always `locate()` before `start()`, which is what keeps `start`
/// from piling up duplicate servers.
pub struct CacheServerSupervisor {
    binary: PathBuf,
    process_name: String,
}

impl CacheServerSupervisor {
    pub fn new() -> Self {
        Self::with_binary(default_binary_path())
    }

    pub fn with_binary(binary: PathBuf) -> Self {
        CacheServerSupervisor {
            binary,
            process_name: SERVER_PROCESS_NAME.to_string(),
        }
    }

    /// Find a running cache server by exact executable-name match over the
    /// process table.
    pub fn locate(&self) -> Option<u32> {
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);
        let wanted = OsStr::new(&self.process_name);
        system
            .processes()
            .values()
            .find(|process| process.name() == wanted)
            .map(|process| process.pid().as_u32())
    }

    /// Spawn the cache server as a detached background process bound to
    /// loopback. Non-blocking; stdout is not captured.
    pub fn start(&self) -> Result<u32> {
        debug!(binary = %self.binary.display(), "starting cache server");
        let child = Command::new(&self.binary)
            .args(["-l", "127.0.0.1"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(BusError::SupervisorLaunchFailed)?;
        Ok(child.id())
    }

    pub fn is_running(&self) -> bool {
        self.locate().is_some()
    }

    /// Pid of a running server, starting one if none exists. Used by the
    /// daemon only; clients never start the server themselves.
    pub fn locate_or_start(&self) -> Result<u32> {
        if let Some(pid) = self.locate() {
            debug!(pid, "cache server already running");
            return Ok(pid);
        }
        let pid = self.start()?;
        info!(pid, "started cache server");
        Ok(pid)
    }
}

impl Default for CacheServerSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

fn default_binary_path() -> PathBuf {
    if cfg!(windows) {
        // Bundled alongside the executable on Windows.
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("memcached")))
            .unwrap_or_else(|| PathBuf::from("memcached"))
            .join(SERVER_PROCESS_NAME)
    } else {
        PathBuf::from("/usr/bin/memcached")
    }
}
