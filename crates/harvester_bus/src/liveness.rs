//! OS-level process liveness queries.

use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};

/// Whether a remembered pid still refers to a running process.
///
/// Behind a trait so the loops can be driven in tests without real
/// processes dying on cue.
pub trait PidLiveness: Send {
    fn is_running(&mut self, pid: u32) -> bool;
}

/// Liveness backed by the system process table.
pub struct SystemLiveness {
    system: System,
}

impl SystemLiveness {
    pub fn new() -> Self {
        SystemLiveness {
            system: System::new(),
        }
    }
}

impl Default for SystemLiveness {
    fn default() -> Self {
        Self::new()
    }
}

impl PidLiveness for SystemLiveness {
    fn is_running(&mut self, pid: u32) -> bool {
        let pid = Pid::from_u32(pid);
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        match self.system.process(pid) {
            None => false,
            // Only definitively-gone states count as dead. Anything the OS
            // still reports as some flavor of alive is treated as running:
            // falsely declaring a live client dead would silently stop
            // delivering its events.
            Some(process) => !matches!(
                process.status(),
                ProcessStatus::Dead | ProcessStatus::Zombie
            ),
        }
    }
}
