use crate::error::MonitorError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use sysinfo::{ProcessRefreshKind, System, UpdateKind};

/// Minimal per-process facts gathered once per tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    /// `None` when the executable link could not be read, typically
    /// because the process exited mid-scan or belongs to another user.
    pub exe_path: Option<PathBuf>,
    pub parent_name: Option<String>,
    /// Process start, epoch seconds.
    pub started_at: u64,
}

/// All processes seen during one tick, keyed by pid.
///
/// Iteration is in ascending pid order so a tick is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSnapshot {
    processes: BTreeMap<u32, ProcessInfo>,
}

impl ProcessSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, info: ProcessInfo) {
        self.processes.insert(info.pid, info);
    }

    pub fn get(&self, pid: u32) -> Option<&ProcessInfo> {
        self.processes.get(&pid)
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.processes.contains_key(&pid)
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessInfo> {
        self.processes.values()
    }
}

impl FromIterator<ProcessInfo> for ProcessSnapshot {
    fn from_iter<I: IntoIterator<Item = ProcessInfo>>(iter: I) -> Self {
        Self {
            processes: iter.into_iter().map(|info| (info.pid, info)).collect(),
        }
    }
}

/// Source of the OS process table.
pub trait ProcessSource: Send {
    fn snapshot(&mut self) -> Result<ProcessSnapshot, MonitorError>;
}

/// Process table read through `sysinfo`.
pub struct SysinfoSource {
    system: System,
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoSource {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl ProcessSource for SysinfoSource {
    fn snapshot(&mut self) -> Result<ProcessSnapshot, MonitorError> {
        // Re-read the exe link every tick: a recycled pid must not inherit
        // the previous owner's path.
        self.system
            .refresh_processes_specifics(ProcessRefreshKind::new().with_exe(UpdateKind::Always));

        let processes = self.system.processes();
        // The monitor itself is always running, so an empty table means
        // the OS refused the query.
        if processes.is_empty() {
            return Err(MonitorError::Enumeration("process table is empty".into()));
        }

        // On Linux the table also lists kernel threads and every userland
        // thread under its own tid and thread name. Only whole processes
        // are applications.
        Ok(processes
            .iter()
            .filter(|(_, process)| process.thread_kind().is_none())
            .map(|(pid, process)| ProcessInfo {
                pid: pid.as_u32(),
                name: process.name().to_string(),
                exe_path: process.exe().map(Path::to_path_buf),
                parent_name: process
                    .parent()
                    .and_then(|ppid| processes.get(&ppid))
                    .map(|parent| parent.name().to_string()),
                started_at: process.start_time(),
            })
            .collect())
    }
}
