use parking_lot::Mutex;
use sysinfo::{Pid, System};

/// Process enumeration for callers that look windows up by executable name.
pub struct ProcessService {
    system: Mutex<System>,
}

impl ProcessService {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    /// Pids of processes called `name` (ASCII case-insensitive), optionally restricted to children
    /// of `parent_pid`. A parent of 0 matches any process. Sorted ascending.
    pub fn processes_by_name(&self, name: &str, parent_pid: u32) -> Vec<u32> {
        let mut system = self.system.lock();
        system.refresh_processes();
        let mut pids: Vec<u32> = system
            .processes()
            .iter()
            .filter(|(_, process)| process.name().eq_ignore_ascii_case(name))
            .filter(|(_, process)| {
                parent_pid == 0 || process.parent().map(Pid::as_u32) == Some(parent_pid)
            })
            .map(|(pid, _)| pid.as_u32())
            .collect();
        pids.sort_unstable();
        log::trace!("{} process(es) named {name}", pids.len());
        pids
    }

    /// Executable name of `pid`, empty when there is no such process.
    pub fn process_name_by_pid(&self, pid: u32) -> String {
        let mut system = self.system.lock();
        let pid = Pid::from_u32(pid);
        if !system.refresh_process(pid) {
            return String::new();
        }
        system
            .process(pid)
            .map(|process| process.name().to_string())
            .unwrap_or_default()
    }
}

impl Default for ProcessService {
    fn default() -> Self {
        Self::new()
    }
}
