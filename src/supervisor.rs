//! Supervisor loop: find the target process, sample its load once per second,
//! kill it after a sustained overload, then back off for the grace period.
//!
//! Two phases, one actor. `Acquire` waits and looks the process up by name
//! until it appears. `Monitor` samples it until a CPU-time read fails, which
//! is taken to mean the process exited, and then falls back to `Acquire`.
//! Every failure is retried on the next tick; nothing here is fatal.
use crate::config::MonitorSettings;
use crate::decider::{OverloadDecider, Verdict};
use crate::locator::locate;
use crate::procfs::{ProcessHandle, ProcessTable};
use crate::sampler::estimate_load;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error};

/// Wait before each attempt to find the target.
pub const ACQUIRE_INTERVAL: Duration = Duration::from_secs(2);

/// Wall-clock span of one load sample.
pub const SAMPLE_WINDOW: Duration = Duration::from_secs(1);

/// Wait between the end of one sample and the start of the next.
pub const SAMPLE_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug)]
enum Phase {
    Acquire,
    Monitor(ProcessHandle),
}

/// What a single [`Supervisor::step`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// No process with the target name right now.
    NotFound,
    /// Found the target; monitoring starts with a full countdown.
    Acquired { pid: u32 },
    /// Took a load sample without firing.
    Sampled { pid: u32, load: f64, verdict: Verdict },
    /// CPU time could not be read; the process is presumed gone.
    Lost { pid: u32 },
    /// Overload streak completed: kill sent and grace period served.
    Killed { pid: u32, load: f64 },
}

pub struct Supervisor<T> {
    table: T,
    settings: MonitorSettings,
    decider: OverloadDecider,
    phase: Phase,
}

impl<T: ProcessTable> Supervisor<T> {
    pub fn new(table: T, settings: MonitorSettings) -> Self {
        let decider = OverloadDecider::new(settings.limit, settings.samples);
        Self {
            table,
            settings,
            decider,
            phase: Phase::Acquire,
        }
    }

    /// Supervise forever.
    pub async fn run(&mut self) {
        debug!(
            name = %self.settings.name,
            limit = self.settings.limit,
            grace_secs = self.settings.grace.as_secs(),
            samples = self.settings.samples.get(),
            "supervising process"
        );
        loop {
            self.step().await;
        }
    }

    /// Advance the state machine by one tick, sleeping as the phase requires.
    pub async fn step(&mut self) -> Step {
        match std::mem::replace(&mut self.phase, Phase::Acquire) {
            Phase::Acquire => self.acquire().await,
            Phase::Monitor(handle) => self.monitor(handle).await,
        }
    }

    async fn acquire(&mut self) -> Step {
        sleep(ACQUIRE_INTERVAL).await;

        match locate(&self.table, &self.settings.name) {
            Ok(handle) => {
                let pid = handle.pid();
                debug!(pid, name = %handle.name(), "acquired target process");
                // A fresh handle never inherits a streak from an earlier process.
                self.decider.reset();
                self.phase = Phase::Monitor(handle);
                Step::Acquired { pid }
            }
            Err(e) => {
                debug!(error = %e, "target process not available");
                Step::NotFound
            }
        }
    }

    async fn monitor(&mut self, handle: ProcessHandle) -> Step {
        let pid = handle.pid();
        let load = match estimate_load(&self.table, &handle, SAMPLE_WINDOW).await {
            Ok(load) => load,
            Err(e) => {
                debug!(error = %e, "lost target process");
                return Step::Lost { pid };
            }
        };

        let verdict = self.decider.observe(load);
        debug!(pid, load, ?verdict, "sampled target process");

        let step = if verdict == Verdict::Fire {
            self.kill(&handle).await;
            Step::Killed { pid, load }
        } else {
            Step::Sampled { pid, load, verdict }
        };

        // Stay on this handle; if the kill worked the next read fails and
        // sends us back to Acquire.
        self.phase = Phase::Monitor(handle);
        sleep(SAMPLE_PAUSE).await;
        step
    }

    /// Send the kill, record it, and serve the grace period without sampling.
    async fn kill(&mut self, handle: &ProcessHandle) {
        // Outcome ignored: the next sample reveals whether the process is gone.
        if let Err(e) = self.table.kill(handle) {
            debug!(error = %e, "kill signal not delivered");
        }
        error!(
            "Killed {} because load factor was more than {:.6}",
            self.settings.name, self.settings.limit
        );
        sleep(self.settings.grace).await;
    }

    /// Remaining overloaded samples before the decider fires.
    #[cfg(test)]
    pub fn countdown(&self) -> u32 {
        self.decider.countdown()
    }

    /// PID currently being monitored, if any.
    #[cfg(test)]
    pub fn monitored_pid(&self) -> Option<u32> {
        match &self.phase {
            Phase::Acquire => None,
            Phase::Monitor(handle) => Some(handle.pid()),
        }
    }
}
