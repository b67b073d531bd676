//! Core model: simulated ticks, core identities, timeline tokens and the per-core dispatch loop.

use crate::clock::{Stage, Ticker};
use crate::process::{Process, ProcessId};
use crate::scheduler::{Dispatch, Scheduler};
use anyhow::{bail, Result};
use log::debug;
use std::fmt;
use std::sync::Arc;

/// Global simulation tick counter (discrete time).
pub type Tick = u64;

/// Identifies a core (0..N).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoreId(pub usize);

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "core {}", self.0)
    }
}

/// What a core did during one tick. One token per tick per core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimelineToken {
    /// The core ran this process for the tick.
    Run(ProcessId),
    /// Nothing was ready.
    Idle,
}

impl TimelineToken {
    pub fn is_idle(&self) -> bool {
        matches!(self, TimelineToken::Idle)
    }

    pub fn process(&self) -> Option<&ProcessId> {
        match self {
            TimelineToken::Run(id) => Some(id),
            TimelineToken::Idle => None,
        }
    }
}

impl fmt::Display for TimelineToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimelineToken::Run(id) => write!(f, "{}", id),
            TimelineToken::Idle => write!(f, "idle"),
        }
    }
}

/// Scheduling loop of one core.
///
/// Each core runs on its own thread and only ever touches shared state through
/// the [`Scheduler`]. While a process is on the core it is owned by the
/// dispatcher; the scheduler only sees its ID in the core slot.
pub struct CoreDispatcher {
    id: CoreId,
    scheduler: Arc<Scheduler>,
    ticker: Ticker,
}

impl CoreDispatcher {
    /// `ticker` must be subscribed to `Stage::Dispatch(id)` and `Stage::Execute(id)`.
    pub fn new(id: CoreId, scheduler: Arc<Scheduler>, ticker: Ticker) -> Self {
        Self {
            id,
            scheduler,
            ticker,
        }
    }

    pub fn id(&self) -> CoreId {
        self.id
    }

    /// Runs until the simulation terminates. Returns how many dispatches this core made.
    pub fn run(mut self) -> Result<u64> {
        let mut dispatches = 0;
        while let Some(now) = self.ticker.wait(Stage::Dispatch(self.id)) {
            let process = match self.scheduler.dispatch(self.id, now) {
                Dispatch::Done => {
                    if self.ticker.finish() {
                        debug!("{} observed termination at tick {}", self.id, now);
                    }
                    break;
                }
                Dispatch::Idle => continue,
                Dispatch::Run(process) => process,
            };
            dispatches += 1;
            self.execute(process)?;
        }
        Ok(dispatches)
    }

    /// Runs `process` one tick per execute stage until it blocks, finishes or is preempted.
    fn execute(&mut self, mut process: Process) -> Result<()> {
        loop {
            let Some(now) = self.ticker.wait(Stage::Execute(self.id)) else {
                bail!("clock stopped while {} was running {}", self.id, process.id);
            };
            match self.scheduler.run_tick(self.id, process, now) {
                Some(still_running) => process = still_running,
                None => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeline_token_display() {
        assert_eq!(TimelineToken::Run(ProcessId::from("P1")).to_string(), "P1");
        assert_eq!(TimelineToken::Idle.to_string(), "idle");
    }

    #[test]
    fn timeline_token_process() {
        let run = TimelineToken::Run(ProcessId::from("P7"));
        assert_eq!(run.process(), Some(&ProcessId::from("P7")));
        assert!(!run.is_idle());
        assert_eq!(TimelineToken::Idle.process(), None);
        assert!(TimelineToken::Idle.is_idle());
    }

    #[test]
    fn core_id_display() {
        assert_eq!(CoreId(3).to_string(), "core 3");
    }
}
