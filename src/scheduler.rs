//! Shared scheduler state: ready queue, blocked set, core slots, pending arrivals,
//! finished list and per-core timelines, all guarded by a single lock.
//!
//! Every public operation takes the lock once, so moves between collections
//! (pending -> ready, blocked -> ready, ready -> core, core -> blocked) are atomic
//! to every other participant.

use crate::core::{CoreId, Tick, TimelineToken};
use crate::process::{Process, ProcessId, ProcessState};
use crate::simulator::Outcome;
use crate::trace::{TraceEvent, TraceKind};
use anyhow::{bail, Result};
use log::{debug, trace};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Simulation configuration.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Number of cores (>= 1).
    pub num_cores: usize,
    /// Base quantum in ticks (>= 1).
    pub quantum: Tick,
    /// Clamp the quantum to the remaining burst at dispatch time.
    pub dynamic_quantum: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            num_cores: 2,
            quantum: 3,
            dynamic_quantum: true,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_cores == 0 {
            bail!("number of cores must be at least 1");
        }
        if self.quantum == 0 {
            bail!("quantum must be at least 1 tick");
        }
        Ok(())
    }

    pub fn quantum_policy(&self) -> QuantumPolicy {
        if self.dynamic_quantum {
            QuantumPolicy::Dynamic(self.quantum)
        } else {
            QuantumPolicy::Fixed(self.quantum)
        }
    }
}

/// How a dispatched process's quantum is sized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuantumPolicy {
    /// Always the base quantum, even if the burst ends earlier.
    Fixed(Tick),
    /// `min(base, remaining burst)`.
    Dynamic(Tick),
}

impl QuantumPolicy {
    pub fn assign(&self, remaining: Tick) -> Tick {
        match *self {
            QuantumPolicy::Fixed(base) => base,
            QuantumPolicy::Dynamic(base) => base.min(remaining),
        }
    }

    pub fn base(&self) -> Tick {
        match *self {
            QuantumPolicy::Fixed(base) | QuantumPolicy::Dynamic(base) => base,
        }
    }
}

/// Result of a core's dispatch attempt.
#[derive(Debug)]
pub enum Dispatch {
    /// The core now owns this process.
    Run(Process),
    /// Nothing was ready; an idle tick was recorded.
    Idle,
    /// Nothing is ready, blocked, pending or running anywhere.
    Done,
}

/// Everything the scheduler lock protects.
struct RunQueues {
    ready: VecDeque<Process>,
    blocked: Vec<Process>,
    /// ID of the process each core is running. The process itself is owned by the core.
    slots: Vec<Option<ProcessId>>,
    /// Not yet arrived, sorted by arrival tick (stable w.r.t. input order).
    pending: VecDeque<Process>,
    finished: Vec<Process>,
    timelines: Vec<Vec<TimelineToken>>,
    trace: Vec<TraceEvent>,
    /// Processes handed to the scheduler.
    population: usize,
}

impl RunQueues {
    fn record(&mut self, tick: Tick, process: &ProcessId, kind: TraceKind) {
        self.trace.push(TraceEvent {
            tick,
            process: process.clone(),
            kind,
        });
    }

    fn enqueue_ready(&mut self, mut process: Process) {
        assert!(
            !self.ready.iter().any(|p| p.id == process.id),
            "{} enqueued while already ready",
            process.id
        );
        process.state = ProcessState::Ready;
        self.ready.push_back(process);
    }

    fn try_dequeue_ready(&mut self) -> Option<Process> {
        self.ready.pop_front()
    }

    fn release_due_arrivals(&mut self, now: Tick) -> usize {
        let due = self.pending.iter().take_while(|p| p.arrival <= now).count();
        let released: Vec<Process> = self.pending.drain(..due).collect();
        for process in released {
            debug!("{} arrived at tick {}", process.id, now);
            self.record(now, &process.id, TraceKind::Arrived);
            self.enqueue_ready(process);
        }
        due
    }

    fn tick_blocked(&mut self, now: Tick) -> usize {
        let mut still_blocked = Vec::with_capacity(self.blocked.len());
        let mut released = 0;
        for mut process in std::mem::take(&mut self.blocked) {
            process.block_left = process.block_left.saturating_sub(1);
            if process.block_left > 0 {
                still_blocked.push(process);
                continue;
            }
            released += 1;
            self.resume(process, now);
        }
        self.blocked = still_blocked;
        released
    }

    /// Returns a process coming out of I/O to the ready tail, or finishes it
    /// if phase 2 has no work.
    fn resume(&mut self, process: Process, now: Tick) {
        if process.remaining == 0 {
            self.finalize(process, now);
        } else {
            debug!("{} unblocked at tick {}", process.id, now);
            self.record(now, &process.id, TraceKind::Unblocked);
            self.enqueue_ready(process);
        }
    }

    fn record_tick(&mut self, core: CoreId, token: TimelineToken) {
        self.timelines[core.0].push(token);
    }

    fn finalize(&mut self, mut process: Process, now: Tick) {
        assert!(
            !self.finished.iter().any(|p| p.id == process.id),
            "{} finished twice",
            process.id
        );
        let finish = now + 1;
        process.state = ProcessState::Finished;
        process.finish = Some(finish);
        process.turnaround = finish.saturating_sub(process.arrival);
        debug!(
            "{} finished at tick {} (turnaround {})",
            process.id, finish, process.turnaround
        );
        self.record(now, &process.id, TraceKind::Finished);
        self.finished.push(process);
    }

    fn block(&mut self, mut process: Process, now: Tick) {
        process.remaining = process.burst2;
        process.in_phase2 = true;
        self.record(
            now,
            &process.id,
            TraceKind::Blocked {
                duration: process.block_duration,
            },
        );
        if process.block_duration == 0 {
            self.resume(process, now);
            return;
        }
        debug!(
            "{} blocked at tick {} for {} ticks",
            process.id, now, process.block_duration
        );
        process.state = ProcessState::Blocked;
        process.block_left = process.block_duration;
        self.blocked.push(process);
    }

    fn is_done(&self) -> bool {
        self.ready.is_empty()
            && self.pending.is_empty()
            && self.blocked.is_empty()
            && self.slots.iter().all(Option::is_none)
    }

    fn occupy(&mut self, core: CoreId, id: &ProcessId) {
        if let Some(current) = &self.slots[core.0] {
            panic!("{} already runs {}, cannot take {}", core, current, id);
        }
        self.slots[core.0] = Some(id.clone());
    }

    fn vacate(&mut self, core: CoreId) {
        self.slots[core.0] = None;
    }
}

/// Arbiter of all shared scheduling state.
pub struct Scheduler {
    queues: Mutex<RunQueues>,
    policy: QuantumPolicy,
    num_cores: usize,
}

impl Scheduler {
    /// Builds the scheduler from already-parsed processes. Processes arriving at
    /// tick 0 start ready (in input order, `initial` first); the rest wait in the
    /// pending list ordered by arrival.
    pub fn new(config: &SchedulerConfig, initial: Vec<Process>, dynamic: Vec<Process>) -> Result<Self> {
        config.validate()?;

        let mut ids = HashSet::new();
        for process in initial.iter().chain(dynamic.iter()) {
            if process.burst1 == 0 {
                bail!("{}: phase-1 burst must be at least 1 tick", process.id);
            }
            if !ids.insert(process.id.clone()) {
                bail!("duplicate process id {}", process.id);
            }
        }

        let mut queues = RunQueues {
            ready: VecDeque::new(),
            blocked: Vec::new(),
            slots: vec![None; config.num_cores],
            pending: VecDeque::new(),
            finished: Vec::new(),
            timelines: vec![Vec::new(); config.num_cores],
            trace: Vec::new(),
            population: ids.len(),
        };

        let (arrived, mut later): (Vec<Process>, Vec<Process>) = initial
            .into_iter()
            .chain(dynamic)
            .partition(|p| p.arrival == 0);
        later.sort_by_key(|p| p.arrival);
        for process in arrived {
            queues.record(0, &process.id, TraceKind::Arrived);
            queues.enqueue_ready(process);
        }
        queues.pending.extend(later);

        Ok(Self {
            queues: Mutex::new(queues),
            policy: config.quantum_policy(),
            num_cores: config.num_cores,
        })
    }

    fn queues(&self) -> MutexGuard<'_, RunQueues> {
        self.queues
            .lock()
            .expect("scheduler state poisoned by a panicking participant")
    }

    pub fn num_cores(&self) -> usize {
        self.num_cores
    }

    pub fn policy(&self) -> QuantumPolicy {
        self.policy
    }

    /// Appends `process` to the ready tail and marks it ready.
    pub fn enqueue_ready(&self, process: Process) {
        self.queues().enqueue_ready(process);
    }

    /// Pops the ready head, if any.
    pub fn try_dequeue_ready(&self) -> Option<Process> {
        self.queues().try_dequeue_ready()
    }

    /// Moves every pending process with `arrival <= now` to the ready queue.
    /// Returns how many were released.
    pub fn release_due_arrivals(&self, now: Tick) -> usize {
        self.queues().release_due_arrivals(now)
    }

    /// Counts every blocked process down by one tick and requeues the expired ones.
    /// Returns how many left the blocked set.
    pub fn tick_blocked(&self, now: Tick) -> usize {
        self.queues().tick_blocked(now)
    }

    pub fn record_tick(&self, core: CoreId, token: TimelineToken) {
        self.queues().record_tick(core, token);
    }

    /// Marks `process` finished during tick `now` (finish = now + 1).
    pub fn finalize(&self, process: Process, now: Tick) {
        self.queues().finalize(process, now);
    }

    /// Sends `process` into I/O after phase 1 ended during tick `now`.
    pub fn block(&self, process: Process, now: Tick) {
        self.queues().block(process, now);
    }

    /// True iff nothing is ready, pending, blocked or running.
    pub fn is_done(&self) -> bool {
        self.queues().is_done()
    }

    pub fn has_pending(&self) -> bool {
        !self.queues().pending.is_empty()
    }

    /// Dispatch step of a core: stop if everything is done, otherwise take the
    /// ready head (sizing its quantum and occupying the core slot) or record an
    /// idle tick.
    pub fn dispatch(&self, core: CoreId, now: Tick) -> Dispatch {
        let mut q = self.queues();
        if q.is_done() {
            return Dispatch::Done;
        }
        let Some(mut process) = q.try_dequeue_ready() else {
            trace!("{} idle at tick {}", core, now);
            q.record_tick(core, TimelineToken::Idle);
            return Dispatch::Idle;
        };
        let quantum = self.policy.assign(process.remaining);
        process.on_dispatch(now, quantum);
        q.occupy(core, &process.id);
        q.record(
            now,
            &process.id,
            TraceKind::Dispatched {
                core,
                quantum,
                remaining: process.remaining,
            },
        );
        debug!(
            "{} dispatched on {} at tick {} (quantum {}, {} left)",
            process.id, core, now, quantum, process.remaining
        );
        Dispatch::Run(process)
    }

    /// Execute step of a core: `process` runs for tick `now`. Returns the process
    /// if it keeps the core; otherwise it has been blocked, finished or preempted
    /// and the core slot is free.
    pub fn run_tick(&self, core: CoreId, mut process: Process, now: Tick) -> Option<Process> {
        process.consume_tick();
        let mut q = self.queues();
        trace!("{} ran {} at tick {}", core, process.id, now);
        q.record_tick(core, TimelineToken::Run(process.id.clone()));
        if process.remaining == 0 {
            if process.needs_block() {
                q.block(process, now);
            } else {
                q.finalize(process, now);
            }
        } else if process.quantum_left == 0 {
            debug!("{} preempted on {} at tick {}", process.id, core, now);
            q.record(now, &process.id, TraceKind::Preempted { core });
            q.enqueue_ready(process);
        } else {
            return Some(process);
        }
        q.vacate(core);
        None
    }

    /// Checks that every process sits in exactly one place and is in the state
    /// that place implies. Only meaningful between stages, when no core holds
    /// the lock mid-move.
    pub fn audit(&self) -> Result<()> {
        let q = self.queues();
        let mut seen: HashMap<&ProcessId, &'static str> = HashMap::new();
        let places = q
            .pending
            .iter()
            .map(|p| (&p.id, "pending"))
            .chain(q.ready.iter().map(|p| (&p.id, "the ready queue")))
            .chain(q.blocked.iter().map(|p| (&p.id, "the blocked set")))
            .chain(q.finished.iter().map(|p| (&p.id, "the finished list")))
            .chain(q.slots.iter().flatten().map(|id| (id, "a core slot")));
        for (id, place) in places {
            if let Some(previous) = seen.insert(id, place) {
                bail!("{} is in both {} and {}", id, previous, place);
            }
        }
        if seen.len() != q.population {
            bail!(
                "{} of {} processes are unaccounted for",
                q.population.saturating_sub(seen.len()),
                q.population
            );
        }

        let misplaced = q
            .ready
            .iter()
            .map(|p| (p, ProcessState::Ready))
            .chain(q.blocked.iter().map(|p| (p, ProcessState::Blocked)))
            .chain(q.finished.iter().map(|p| (p, ProcessState::Finished)))
            .find(|(p, expected)| p.state != *expected);
        if let Some((p, expected)) = misplaced {
            bail!("{} is {} but sits where {} processes belong", p.id, p.state, expected);
        }
        Ok(())
    }

    /// Consumes the scheduler once every participant has exited.
    pub fn into_outcome(self, ticks: Tick) -> Outcome {
        let q = self
            .queues
            .into_inner()
            .expect("scheduler state poisoned by a panicking participant");
        Outcome {
            finished: q.finished,
            timelines: q.timelines,
            trace: q.trace,
            ticks,
        }
    }
}
