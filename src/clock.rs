//! Simulated clock and tick barrier.
//!
//! A tick is split into ordered [`Stage`]s. The clock driver opens one stage at
//! a time and blocks until every participant subscribed to it has checked in,
//! so all state changes made in a stage are visible before the next one opens
//! and nothing from tick `t` leaks into tick `t + 1`.
//!
//! Participants hold a [`Ticker`]. Calling [`Ticker::wait`] checks out of the
//! stage the participant currently holds and blocks until the requested stage
//! opens. Subscribed stages the participant is not waiting for are checked out
//! of immediately, which is how a busy core skips its dispatch stage and an
//! idle core skips its execute stage.
//!
//! Only one stage is open at any time, so a run is deterministic regardless of
//! how the OS schedules the participant threads.

use crate::core::{CoreId, Tick};
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// One step of a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Pending processes whose arrival tick has come are released.
    Arrivals,
    /// The core picks up a ready process or records an idle tick.
    Dispatch(CoreId),
    /// Blocked processes count down their I/O.
    Unblock,
    /// The core consumes one tick of its process's burst.
    Execute(CoreId),
}

impl Stage {
    /// Stage order of one tick on `num_cores` cores.
    pub fn schedule(num_cores: usize) -> Vec<Stage> {
        let mut stages = Vec::with_capacity(2 * num_cores + 2);
        stages.push(Stage::Arrivals);
        stages.extend((0..num_cores).map(|c| Stage::Dispatch(CoreId(c))));
        stages.push(Stage::Unblock);
        stages.extend((0..num_cores).map(|c| Stage::Execute(CoreId(c))));
        stages
    }
}

struct ClockState {
    now: Tick,
    /// Stage currently open, if any.
    open: Option<Stage>,
    /// Bumped every time a stage opens.
    generation: u64,
    /// Participants that still have to check in for the open stage.
    pending: usize,
    /// Subscribed participants per stage.
    members: HashMap<Stage, usize>,
    finished: bool,
}

impl ClockState {
    fn check_in(&mut self) {
        debug_assert!(self.pending > 0, "check-in without an open stage");
        self.pending = self.pending.saturating_sub(1);
    }
}

/// Shared tick counter. The driver is its only writer.
pub struct Clock {
    mu: Mutex<ClockState>,
    cv: Condvar,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            mu: Mutex::new(ClockState {
                now: 0,
                open: None,
                generation: 0,
                pending: 0,
                members: HashMap::new(),
                finished: false,
            }),
            cv: Condvar::new(),
        }
    }

    // No code panics while holding the lock, so a poisoned state is still consistent.
    fn state(&self) -> MutexGuard<'_, ClockState> {
        self.mu.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn now(&self) -> Tick {
        self.state().now
    }

    pub fn is_finished(&self) -> bool {
        self.state().finished
    }

    /// Raises the termination flag and wakes everyone. Returns true only for the
    /// caller that actually raised it.
    pub fn finish(&self) -> bool {
        let mut s = self.state();
        if s.finished {
            return false;
        }
        s.finished = true;
        s.open = None;
        self.cv.notify_all();
        true
    }

    /// Returns a guard that finishes the clock when dropped, so participants
    /// are released even if the driver bails out or panics.
    pub fn finish_on_drop(&self) -> FinishGuard<'_> {
        FinishGuard { clock: self }
    }

    /// Driver: opens `stage` for the current tick and blocks until all of its
    /// subscribers checked in. Returns false if the clock finished meanwhile.
    pub fn run_stage(&self, stage: Stage) -> bool {
        let mut s = self.state();
        if s.finished {
            return false;
        }
        let members = s.members.get(&stage).copied().unwrap_or(0);
        if members == 0 {
            return true;
        }
        s.open = Some(stage);
        s.generation += 1;
        s.pending = members;
        self.cv.notify_all();
        while s.pending > 0 && !s.finished {
            s = self.cv.wait(s).unwrap_or_else(PoisonError::into_inner);
        }
        s.open = None;
        !s.finished
    }

    /// Driver: moves to the next tick.
    pub fn advance(&self) -> Tick {
        let mut s = self.state();
        s.now += 1;
        s.now
    }

    /// Number of participants currently subscribed to `stage`.
    pub fn subscribers(&self, stage: Stage) -> usize {
        self.state().members.get(&stage).copied().unwrap_or(0)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

pub struct FinishGuard<'a> {
    clock: &'a Clock,
}

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.clock.finish();
    }
}

/// A participant's handle on the clock.
///
/// Dropping the ticker checks out of any stage it still holds and
/// unsubscribes, so a participant that exits early never stalls the driver.
pub struct Ticker {
    clock: Arc<Clock>,
    stages: Vec<Stage>,
    /// Last generation this participant looked at.
    seen: u64,
    /// Holds an open stage it has not checked out of yet.
    holding: bool,
}

impl Ticker {
    /// Subscribes a participant to `stages`. Subscribe before the driver starts,
    /// otherwise the participant may miss the stages of the tick in progress.
    pub fn new(clock: Arc<Clock>, stages: Vec<Stage>) -> Self {
        let seen = {
            let mut s = clock.state();
            for stage in &stages {
                *s.members.entry(*stage).or_insert(0) += 1;
            }
            s.generation
        };
        Self {
            clock,
            stages,
            seen,
            holding: false,
        }
    }

    /// Checks out of the held stage, then blocks until `stage` opens. Returns
    /// the current tick, or `None` once the simulation has finished.
    pub fn wait(&mut self, stage: Stage) -> Option<Tick> {
        debug_assert!(self.stages.contains(&stage), "waiting on unsubscribed {:?}", stage);
        let clock = &self.clock;
        let mut s = clock.state();
        if self.holding {
            self.holding = false;
            s.check_in();
            clock.cv.notify_all();
        }
        loop {
            if s.finished {
                return None;
            }
            if s.generation != self.seen {
                self.seen = s.generation;
                if let Some(open) = s.open {
                    if open == stage {
                        self.holding = true;
                        return Some(s.now);
                    }
                    if self.stages.contains(&open) {
                        s.check_in();
                        clock.cv.notify_all();
                    }
                }
            }
            s = clock.cv.wait(s).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Raises the termination flag. See [`Clock::finish`].
    pub fn finish(&self) -> bool {
        self.clock.finish()
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        let mut s = self.clock.state();
        let counted = self.holding
            || (s.generation != self.seen && s.open.map_or(false, |o| self.stages.contains(&o)));
        if counted && s.open.is_some() && !s.finished {
            s.check_in();
        }
        for stage in &self.stages {
            if let Some(n) = s.members.get_mut(stage) {
                *n = n.saturating_sub(1);
            }
        }
        self.clock.cv.notify_all();
    }
}
