//! In-memory process table for driving the sampler and supervisor in tests.
use crate::procfs::{ProcError, ProcessHandle, ProcessTable};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

struct FakeProcess {
    pid: u32,
    name: String,
    readings: VecDeque<f64>,
    survives_kill: bool,
}

#[derive(Default)]
struct State {
    processes: Vec<FakeProcess>,
    killed: Vec<u32>,
    reads: Vec<Instant>,
    list_fails: bool,
}

/// Scripted process table. Each process carries a queue of cumulative CPU
/// readings; once the queue runs dry the process behaves as if it exited.
#[derive(Clone, Default)]
pub struct FakeTable {
    state: Arc<Mutex<State>>,
}

impl FakeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a process whose successive load samples will be `loads`.
    pub fn spawn(&self, pid: u32, name: &str, loads: &[f64]) {
        self.spawn_with_readings(pid, name, readings_for(loads));
    }

    /// Add a process with raw cumulative CPU-second readings.
    pub fn spawn_with_readings(&self, pid: u32, name: &str, readings: Vec<f64>) {
        self.state.lock().unwrap().processes.push(FakeProcess {
            pid,
            name: name.to_string(),
            readings: readings.into(),
            survives_kill: false,
        });
    }

    /// Make kill signals to `pid` have no effect.
    pub fn survive_kill(&self, pid: u32) {
        let mut state = self.state.lock().unwrap();
        if let Some(process) = state.processes.iter_mut().find(|p| p.pid == pid) {
            process.survives_kill = true;
        }
    }

    /// Append further load samples to an existing process.
    pub fn extend(&self, pid: u32, loads: &[f64]) {
        let mut state = self.state.lock().unwrap();
        if let Some(process) = state.processes.iter_mut().find(|p| p.pid == pid) {
            let base = process.readings.back().copied().unwrap_or(0.0);
            process
                .readings
                .extend(readings_for(loads).into_iter().map(|r| r + base));
        }
    }

    pub fn set_list_fails(&self, fails: bool) {
        self.state.lock().unwrap().list_fails = fails;
    }

    pub fn killed(&self) -> Vec<u32> {
        self.state.lock().unwrap().killed.clone()
    }

    /// Virtual-clock instants of every CPU-time read.
    pub fn reads(&self) -> Vec<Instant> {
        self.state.lock().unwrap().reads.clone()
    }
}

/// Cumulative readings producing `loads` over 1-second windows.
fn readings_for(loads: &[f64]) -> Vec<f64> {
    let mut readings = Vec::with_capacity(loads.len() * 2);
    let mut cpu = 0.0;
    for load in loads {
        readings.push(cpu);
        cpu += load;
        readings.push(cpu);
        // CPU keeps accruing during the pause between samples.
        cpu += 0.25;
    }
    readings
}

fn gone(pid: u32, file: &'static str) -> ProcError {
    ProcError::Read {
        pid,
        file,
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
    }
}

impl ProcessTable for FakeTable {
    fn list_pids(&self) -> Result<Vec<u32>, ProcError> {
        let state = self.state.lock().unwrap();
        if state.list_fails {
            return Err(ProcError::List {
                root: "/proc".into(),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            });
        }
        Ok(state.processes.iter().map(|p| p.pid).collect())
    }

    fn open(&self, pid: u32) -> Result<ProcessHandle, ProcError> {
        let state = self.state.lock().unwrap();
        state
            .processes
            .iter()
            .find(|p| p.pid == pid)
            .map(|p| ProcessHandle::new(p.pid, p.name.clone()))
            .ok_or_else(|| gone(pid, "status"))
    }

    fn cpu_seconds(&self, handle: &ProcessHandle) -> Result<f64, ProcError> {
        let mut state = self.state.lock().unwrap();
        state.reads.push(Instant::now());
        let position = state.processes.iter().position(|p| p.pid == handle.pid());
        let Some(index) = position else {
            return Err(gone(handle.pid(), "stat"));
        };
        let next = state.processes[index].readings.pop_front();
        match next {
            Some(reading) => Ok(reading),
            None => {
                state.processes.remove(index);
                Err(gone(handle.pid(), "stat"))
            }
        }
    }

    fn kill(&self, handle: &ProcessHandle) -> Result<(), ProcError> {
        let mut state = self.state.lock().unwrap();
        state.killed.push(handle.pid());
        let position = state.processes.iter().position(|p| p.pid == handle.pid());
        match position {
            Some(index) if !state.processes[index].survives_kill => {
                state.processes.remove(index);
                Ok(())
            }
            Some(_) => Err(ProcError::Kill {
                pid: handle.pid(),
                source: nix::errno::Errno::EPERM,
            }),
            None => Err(ProcError::Kill {
                pid: handle.pid(),
                source: nix::errno::Errno::ESRCH,
            }),
        }
    }
}
