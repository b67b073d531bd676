//! Process model: identity, static burst/block parameters and scheduling state.

use crate::core::Tick;
use std::fmt;

/// Opaque process identifier, unique within a run.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(pub String);

impl From<&str> for ProcessId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for ProcessId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scheduling state. `New -> Ready -> Running -> {Ready | Blocked | Finished}`, `Blocked -> Ready`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessState {
    New,
    Ready,
    Running,
    Blocked,
    Finished,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::New => write!(f, "new"),
            ProcessState::Ready => write!(f, "ready"),
            ProcessState::Running => write!(f, "running"),
            ProcessState::Blocked => write!(f, "blocked"),
            ProcessState::Finished => write!(f, "finished"),
        }
    }
}

/// One simulated task.
#[derive(Clone, Debug)]
pub struct Process {
    pub id: ProcessId,
    /// Tick at which the process enters the system.
    pub arrival: Tick,
    /// CPU ticks needed before the (optional) I/O block.
    pub burst1: Tick,
    /// Whether an I/O block follows phase 1.
    pub blocks: bool,
    /// Ticks spent blocked after phase 1.
    pub block_duration: Tick,
    /// CPU ticks needed after the block. Ignored unless `blocks`.
    pub burst2: Tick,

    pub state: ProcessState,
    /// Burst left in the active phase.
    pub remaining: Tick,
    /// Quantum left in the current dispatch.
    pub quantum_left: Tick,
    /// Block time left. Only meaningful while blocked.
    pub block_left: Tick,
    /// Set once phase 1 is done and the block has been taken.
    pub in_phase2: bool,
    /// Tick of the first dispatch.
    pub start: Option<Tick>,
    pub finish: Option<Tick>,
    pub turnaround: Tick,
    /// Number of dispatches, including the first one.
    pub context_switches: u32,
}

impl Process {
    /// A process that runs `burst` ticks and finishes without blocking.
    pub fn new(id: impl Into<ProcessId>, arrival: Tick, burst: Tick) -> Self {
        Self::with_io(id, arrival, burst, false, 0, 0)
    }

    /// A process that runs `burst1`, blocks for `block_duration`, then runs `burst2`.
    pub fn new_blocking(
        id: impl Into<ProcessId>,
        arrival: Tick,
        burst1: Tick,
        block_duration: Tick,
        burst2: Tick,
    ) -> Self {
        Self::with_io(id, arrival, burst1, true, block_duration, burst2)
    }

    pub fn with_io(
        id: impl Into<ProcessId>,
        arrival: Tick,
        burst1: Tick,
        blocks: bool,
        block_duration: Tick,
        burst2: Tick,
    ) -> Self {
        Self {
            id: id.into(),
            arrival,
            burst1,
            blocks,
            block_duration,
            burst2,
            state: ProcessState::New,
            remaining: burst1,
            quantum_left: 0,
            block_left: 0,
            in_phase2: false,
            start: None,
            finish: None,
            turnaround: 0,
            context_switches: 0,
        }
    }

    /// True when the current burst ends in an I/O block rather than completion.
    pub fn needs_block(&self) -> bool {
        self.blocks && !self.in_phase2
    }

    /// Ticks the process must spend executing or blocked: `burst1 + (block + burst2 if blocks)`.
    pub fn service_time(&self) -> Tick {
        if self.blocks {
            self.burst1 + self.block_duration + self.burst2
        } else {
            self.burst1
        }
    }

    /// `turnaround - service_time`. Only defined once the process has finished.
    pub fn waiting_time(&self) -> Option<Tick> {
        self.finish
            .map(|_| self.turnaround.saturating_sub(self.service_time()))
    }

    pub fn is_finished(&self) -> bool {
        self.state == ProcessState::Finished
    }

    /// Records a dispatch at `now` with the given quantum.
    pub fn on_dispatch(&mut self, now: Tick, quantum: Tick) {
        self.context_switches += 1;
        if self.start.is_none() {
            self.start = Some(now);
        }
        self.state = ProcessState::Running;
        self.quantum_left = quantum;
    }

    /// Consumes one tick of burst and quantum.
    pub fn consume_tick(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
        self.quantum_left = self.quantum_left.saturating_sub(1);
    }
}

impl fmt::Display for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {} left)", self.id, self.state, self.remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_process_defaults() {
        let p = Process::new_blocking("P1", 4, 3, 2, 5);
        assert_eq!(p.state, ProcessState::New);
        assert_eq!(p.remaining, 3);
        assert_eq!(p.quantum_left, 0);
        assert!(!p.in_phase2);
        assert_eq!(p.start, None);
        assert_eq!(p.finish, None);
        assert_eq!(p.context_switches, 0);
        assert!(p.needs_block());
    }

    #[test]
    fn dispatch_records_first_start_only() {
        let mut p = Process::new("P1", 0, 5);
        p.on_dispatch(2, 3);
        assert_eq!(p.state, ProcessState::Running);
        assert_eq!(p.start, Some(2));
        assert_eq!(p.quantum_left, 3);
        p.on_dispatch(9, 3);
        assert_eq!(p.start, Some(2));
        assert_eq!(p.context_switches, 2);
    }

    #[test]
    fn consume_tick_decrements_both_counters() {
        let mut p = Process::new("P1", 0, 2);
        p.on_dispatch(0, 5);
        p.consume_tick();
        assert_eq!(p.remaining, 1);
        assert_eq!(p.quantum_left, 4);
    }

    #[test]
    fn service_time_ignores_block_fields_without_block() {
        let p = Process::with_io("P1", 0, 4, false, 7, 9);
        assert_eq!(p.service_time(), 4);
        assert!(!p.needs_block());
        let q = Process::with_io("P2", 0, 4, true, 7, 9);
        assert_eq!(q.service_time(), 20);
    }

    #[test]
    fn waiting_time_only_after_finish() {
        let mut p = Process::new_blocking("P1", 1, 3, 4, 2);
        assert_eq!(p.waiting_time(), None);
        p.finish = Some(13);
        p.turnaround = 12;
        assert_eq!(p.waiting_time(), Some(3));
    }
}
