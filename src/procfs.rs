//! Process table access backed by a procfs tree (normally `/proc`).
//!
//! The supervisor only ever talks to the [`ProcessTable`] trait, so the
//! sampling and decision logic can be driven by an in-memory table in tests.
use nix::sys::signal::{self, Signal};
use nix::unistd::{sysconf, Pid, SysconfVar};
use std::path::PathBuf;

/// The kernel stores at most 15 bytes of a task's `comm` name.
const COMM_MAX_LEN: usize = 15;

/// USER_HZ on every mainstream Linux build.
const FALLBACK_CLOCK_TICKS: u64 = 100;

/// A live OS process as seen by the supervisor: its PID plus the name it
/// reported when it was opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pid: u32,
    name: String,
}

impl ProcessHandle {
    pub fn new(pid: u32, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Errors from process table operations.
#[derive(Debug)]
pub enum ProcError {
    /// The process directory could not be listed.
    List {
        root: PathBuf,
        source: std::io::Error,
    },
    /// A per-process file could not be read (usually: the process exited).
    Read {
        pid: u32,
        file: &'static str,
        source: std::io::Error,
    },
    /// A per-process file was readable but not in the expected format.
    Malformed { pid: u32, file: &'static str },
    /// Delivering the kill signal failed.
    Kill { pid: u32, source: nix::errno::Errno },
}

impl std::fmt::Display for ProcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcError::List { root, source } => {
                write!(f, "failed to list processes in {}: {}", root.display(), source)
            }
            ProcError::Read { pid, file, source } => {
                write!(f, "failed to read {} of pid {}: {}", file, pid, source)
            }
            ProcError::Malformed { pid, file } => {
                write!(f, "unexpected {} format for pid {}", file, pid)
            }
            ProcError::Kill { pid, source } => {
                write!(f, "failed to kill pid {}: {}", pid, source)
            }
        }
    }
}

impl std::error::Error for ProcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProcError::List { source, .. } => Some(source),
            ProcError::Read { source, .. } => Some(source),
            ProcError::Malformed { .. } => None,
            ProcError::Kill { source, .. } => Some(source),
        }
    }
}

/// The OS process services the supervisor consumes.
pub trait ProcessTable {
    /// All process IDs currently present, in enumeration order.
    fn list_pids(&self) -> Result<Vec<u32>, ProcError>;

    /// Open a handle to `pid`, reading its reported name.
    fn open(&self, pid: u32) -> Result<ProcessHandle, ProcError>;

    /// Total user + system CPU seconds consumed since the process started.
    fn cpu_seconds(&self, handle: &ProcessHandle) -> Result<f64, ProcError>;

    /// Send the process a kill signal.
    fn kill(&self, handle: &ProcessHandle) -> Result<(), ProcError>;
}

/// [`ProcessTable`] reading a Linux procfs tree.
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
    clock_ticks: u64,
}

impl ProcFs {
    /// The host's `/proc`, with the clock-tick rate queried from the OS.
    pub fn new() -> Self {
        let clock_ticks = match sysconf(SysconfVar::CLK_TCK) {
            Ok(Some(ticks)) if ticks > 0 => ticks as u64,
            _ => FALLBACK_CLOCK_TICKS,
        };
        Self::with_root("/proc", clock_ticks)
    }

    /// A procfs tree rooted elsewhere (used by tests to build fake trees).
    pub fn with_root(root: impl Into<PathBuf>, clock_ticks: u64) -> Self {
        Self {
            root: root.into(),
            clock_ticks: clock_ticks.max(1),
        }
    }

    fn read(&self, pid: u32, file: &'static str) -> Result<String, ProcError> {
        let path = self.root.join(pid.to_string()).join(file);
        std::fs::read_to_string(&path).map_err(|source| ProcError::Read { pid, file, source })
    }

    /// Reported process name: the `Name:` line of `status`, extended from
    /// `argv[0]` when the kernel truncated it.
    fn process_name(&self, pid: u32) -> Result<String, ProcError> {
        let status = self.read(pid, "status")?;
        let name = parse_status_name(&status).ok_or(ProcError::Malformed {
            pid,
            file: "status",
        })?;

        if name.len() < COMM_MAX_LEN {
            return Ok(name.to_string());
        }

        // cmdline is empty for kernel threads and zombies; keep the short name then.
        let extended = self
            .read(pid, "cmdline")
            .ok()
            .and_then(|cmdline| argv0_basename(&cmdline))
            .filter(|base| base.starts_with(name));
        Ok(extended.unwrap_or_else(|| name.to_string()))
    }
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for ProcFs {
    fn list_pids(&self) -> Result<Vec<u32>, ProcError> {
        let entries = std::fs::read_dir(&self.root).map_err(|source| ProcError::List {
            root: self.root.clone(),
            source,
        })?;

        let mut pids: Vec<u32> = entries
            .flatten()
            .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
            .collect();
        pids.sort_unstable();
        Ok(pids)
    }

    fn open(&self, pid: u32) -> Result<ProcessHandle, ProcError> {
        let name = self.process_name(pid)?;
        Ok(ProcessHandle::new(pid, name))
    }

    fn cpu_seconds(&self, handle: &ProcessHandle) -> Result<f64, ProcError> {
        let pid = handle.pid();
        let stat = self.read(pid, "stat")?;
        let ticks = parse_stat_cpu_ticks(&stat).ok_or(ProcError::Malformed { pid, file: "stat" })?;
        Ok(ticks as f64 / self.clock_ticks as f64)
    }

    fn kill(&self, handle: &ProcessHandle) -> Result<(), ProcError> {
        let pid = handle.pid();
        // pid 0 or anything past i32::MAX would address a process group instead.
        let raw = i32::try_from(pid)
            .ok()
            .filter(|raw| *raw > 0)
            .ok_or(ProcError::Kill {
                pid,
                source: nix::errno::Errno::ESRCH,
            })?;
        signal::kill(Pid::from_raw(raw), Signal::SIGKILL)
            .map_err(|source| ProcError::Kill { pid, source })
    }
}

/// Value of the `Name:` line in `/proc/<pid>/status`.
fn parse_status_name(status: &str) -> Option<&str> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("Name:"))
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

/// `utime + stime` in clock ticks from `/proc/<pid>/stat`.
///
/// The command name (field 2) may itself contain spaces and parentheses, so
/// fields are counted from the last `)`.
fn parse_stat_cpu_ticks(stat: &str) -> Option<u64> {
    let (_, rest) = stat.rsplit_once(')')?;
    let mut fields = rest.split_whitespace().skip(11);
    let utime: u64 = fields.next()?.parse().ok()?;
    let stime: u64 = fields.next()?.parse().ok()?;
    Some(utime + stime)
}

/// Basename of the first NUL-separated argument of `/proc/<pid>/cmdline`.
fn argv0_basename(cmdline: &str) -> Option<String> {
    let argv0 = cmdline.split('\0').next().filter(|arg| !arg.is_empty())?;
    let base = argv0.rsplit('/').next().unwrap_or(argv0);
    (!base.is_empty()).then(|| base.to_string())
}
