//! Trace event recording for the scheduler.
//!
//! Every scheduling action (arrival, dispatch, preemption, block, unblock,
//! completion) is recorded as a `TraceEvent` with the tick it happened in.

use crate::core::{CoreId, Tick};
use crate::process::ProcessId;
use std::fmt;

/// A single scheduling event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    /// Tick during which the event happened.
    pub tick: Tick,
    pub process: ProcessId,
    pub kind: TraceKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKind {
    /// The process entered the ready queue for the first time.
    Arrived,
    /// The process was assigned to a core.
    Dispatched {
        core: CoreId,
        quantum: Tick,
        /// Burst left in the active phase at dispatch time.
        remaining: Tick,
    },
    /// Quantum expired with burst left; the process went back to the ready tail.
    Preempted { core: CoreId },
    /// Phase 1 finished and the process entered I/O.
    Blocked { duration: Tick },
    /// I/O finished and the process went back to the ready tail. A process
    /// with no phase-2 work finishes straight from I/O and records only `Finished`.
    Unblocked,
    /// Both phases are done.
    Finished,
}

impl TraceKind {
    /// Whether this event puts the process at the tail of the ready queue.
    pub fn enqueues(&self) -> bool {
        matches!(
            self,
            TraceKind::Arrived | TraceKind::Preempted { .. } | TraceKind::Unblocked
        )
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:>5}] {} ", self.tick, self.process)?;
        match self.kind {
            TraceKind::Arrived => write!(f, "arrived"),
            TraceKind::Dispatched {
                core,
                quantum,
                remaining,
            } => write!(f, "dispatched on {} (quantum {}, {} left)", core, quantum, remaining),
            TraceKind::Preempted { core } => write!(f, "preempted on {}", core),
            TraceKind::Blocked { duration } => write!(f, "blocked for {}", duration),
            TraceKind::Unblocked => write!(f, "unblocked"),
            TraceKind::Finished => write!(f, "finished"),
        }
    }
}

/// Event counts over a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceSummary {
    pub total_events: usize,
    pub arrivals: usize,
    pub dispatches: usize,
    pub preemptions: usize,
    pub blocks: usize,
    pub unblocks: usize,
    pub completions: usize,
}

impl TraceSummary {
    pub fn from_events(events: &[TraceEvent]) -> Self {
        let mut summary = Self {
            total_events: events.len(),
            ..Default::default()
        };
        for event in events {
            match event.kind {
                TraceKind::Arrived => summary.arrivals += 1,
                TraceKind::Dispatched { .. } => summary.dispatches += 1,
                TraceKind::Preempted { .. } => summary.preemptions += 1,
                TraceKind::Blocked { .. } => summary.blocks += 1,
                TraceKind::Unblocked => summary.unblocks += 1,
                TraceKind::Finished => summary.completions += 1,
            }
        }
        summary
    }
}

impl fmt::Display for TraceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Trace Summary:")?;
        writeln!(f, "  total_events: {}", self.total_events)?;
        writeln!(f, "  arrivals:     {}", self.arrivals)?;
        writeln!(f, "  dispatches:   {}", self.dispatches)?;
        writeln!(f, "  preemptions:  {}", self.preemptions)?;
        writeln!(f, "  blocks:       {}", self.blocks)?;
        writeln!(f, "  unblocks:     {}", self.unblocks)?;
        write!(f, "  completions:  {}", self.completions)
    }
}
