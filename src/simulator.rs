//! Tick-synchronised multicore simulator.
//!
//! One thread per core plus an arrival feeder and a block timer, all paced by
//! the [`Clock`]. The thread calling [`Simulator::run`] drives the clock.

use crate::clock::{Clock, Stage, Ticker};
use crate::core::{CoreDispatcher, CoreId, Tick, TimelineToken};
use crate::metrics::Report;
use crate::process::Process;
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::trace::{TraceEvent, TraceSummary};
use crate::workload::Workload;
use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Everything a finished run leaves behind.
#[derive(Clone, Debug)]
pub struct Outcome {
    /// Processes in completion order.
    pub finished: Vec<Process>,
    /// One token per simulated tick, per core.
    pub timelines: Vec<Vec<TimelineToken>>,
    pub trace: Vec<TraceEvent>,
    /// Number of ticks simulated.
    pub ticks: Tick,
}

impl Outcome {
    pub fn process(&self, id: &str) -> Option<&Process> {
        self.finished.iter().find(|p| p.id.0 == id)
    }

    pub fn timeline(&self, core: CoreId) -> &[TimelineToken] {
        &self.timelines[core.0]
    }

    pub fn report(&self) -> Report {
        Report::new(&self.finished, &self.timelines)
    }

    pub fn summary(&self) -> TraceSummary {
        TraceSummary::from_events(&self.trace)
    }
}

/// Round-robin multicore simulator.
pub struct Simulator {
    config: SchedulerConfig,
    scheduler: Scheduler,
}

impl Simulator {
    pub fn new(config: SchedulerConfig, initial: Vec<Process>, dynamic: Vec<Process>) -> Result<Self> {
        let scheduler = Scheduler::new(&config, initial, dynamic)?;
        Ok(Self { config, scheduler })
    }

    pub fn from_workload(config: SchedulerConfig, workload: Workload) -> Result<Self> {
        Self::new(config, workload.initial, workload.dynamic)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Runs the simulation to completion.
    pub fn run(self) -> Result<Outcome> {
        let num_cores = self.config.num_cores;
        info!(
            "Starting round-robin simulation: {} cores, {:?}",
            num_cores,
            self.scheduler.policy()
        );
        let clock = Arc::new(Clock::new());
        let scheduler = Arc::new(self.scheduler);
        let schedule = Stage::schedule(num_cores);

        // Releases every participant if we bail out before the driver starts.
        let finish_guard = clock.finish_on_drop();

        // Subscribe everyone before the first stage opens.
        let feeder = Ticker::new(clock.clone(), vec![Stage::Arrivals]);
        let timer = Ticker::new(clock.clone(), vec![Stage::Unblock]);
        let dispatchers: Vec<CoreDispatcher> = (0..num_cores)
            .map(|c| {
                let id = CoreId(c);
                let ticker = Ticker::new(clock.clone(), vec![Stage::Dispatch(id), Stage::Execute(id)]);
                CoreDispatcher::new(id, scheduler.clone(), ticker)
            })
            .collect();

        let mut handles: Vec<(String, JoinHandle<Result<()>>)> = Vec::with_capacity(num_cores + 2);

        let sched = scheduler.clone();
        handles.push(spawn("arrival-feeder", move || feed_arrivals(&sched, feeder))?);
        let sched = scheduler.clone();
        handles.push(spawn("block-timer", move || run_block_timer(&sched, timer))?);
        for dispatcher in dispatchers {
            let name = format!("core-{}", dispatcher.id().0);
            handles.push(spawn(&name, move || {
                let id = dispatcher.id();
                let dispatches = dispatcher.run()?;
                debug!("{} made {} dispatches", id, dispatches);
                Ok(())
            })?);
        }

        let driven = drive_clock(&clock, &scheduler, &schedule);
        drop(finish_guard);

        let mut failures = Vec::new();
        for (name, handle) in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => failures.push(e.context(format!("{} failed", name))),
                Err(_) => failures.push(anyhow!("{} panicked", name)),
            }
        }
        let ticks = driven?;
        if let Some(failure) = failures.into_iter().next() {
            return Err(failure);
        }

        let scheduler = Arc::try_unwrap(scheduler)
            .map_err(|_| anyhow!("scheduler still shared after every participant exited"))?;
        let outcome = scheduler.into_outcome(ticks);
        info!(
            "Simulation finished after {} ticks, {} processes completed",
            outcome.ticks,
            outcome.finished.len()
        );
        Ok(outcome)
    }
}

fn spawn<F>(name: &str, f: F) -> Result<(String, JoinHandle<Result<()>>)>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    let handle = thread::Builder::new()
        .name(name.to_owned())
        .spawn(f)
        .with_context(|| format!("failed to spawn {}", name))?;
    Ok((name.to_owned(), handle))
}

/// Clock driver: runs every stage of a tick, checks the invariants, and
/// advances the clock until nothing is left to schedule. Returns the number of
/// ticks simulated.
fn drive_clock(clock: &Clock, scheduler: &Scheduler, schedule: &[Stage]) -> Result<Tick> {
    let _finish = clock.finish_on_drop();
    loop {
        scheduler
            .audit()
            .with_context(|| format!("scheduler invariant violated at tick {}", clock.now()))?;
        if scheduler.is_done() {
            clock.finish();
            return Ok(clock.now());
        }
        for &stage in schedule {
            if !clock.run_stage(stage) {
                // A core saw the run was over during its dispatch stage.
                return Ok(clock.now());
            }
        }
        clock.advance();
    }
}

/// Arrival feeder: releases due arrivals once per tick until none are left.
fn feed_arrivals(scheduler: &Scheduler, mut ticker: Ticker) -> Result<()> {
    while scheduler.has_pending() {
        let Some(now) = ticker.wait(Stage::Arrivals) else {
            break;
        };
        scheduler.release_due_arrivals(now);
    }
    debug!("arrival feeder done");
    Ok(())
}

/// Block timer: counts blocked processes down once per tick.
fn run_block_timer(scheduler: &Scheduler, mut ticker: Ticker) -> Result<()> {
    while let Some(now) = ticker.wait(Stage::Unblock) {
        scheduler.tick_blocked(now);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(num_cores: usize, quantum: Tick, dynamic_quantum: bool, processes: Vec<Process>) -> Outcome {
        let config = SchedulerConfig {
            num_cores,
            quantum,
            dynamic_quantum,
        };
        Simulator::new(config, processes, vec![]).unwrap().run().unwrap()
    }

    fn tokens(outcome: &Outcome, core: usize) -> Vec<String> {
        outcome.timeline(CoreId(core)).iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn single_process_fixed_quantum() {
        let out = run(1, 3, false, vec![Process::new("P1", 0, 5)]);
        assert_eq!(tokens(&out, 0), vec!["P1"; 5]);
        let p = out.process("P1").unwrap();
        assert_eq!(p.finish, Some(5));
        assert_eq!(p.turnaround, 5);
        assert_eq!(p.waiting_time(), Some(0));
        assert_eq!(p.context_switches, 2);
        assert_eq!(out.ticks, 5);
    }

    #[test]
    fn blocking_process_dynamic_quantum() {
        let out = run(1, 2, true, vec![Process::new_blocking("P1", 0, 3, 4, 2)]);
        let p = out.process("P1").unwrap();
        assert_eq!(p.finish, Some(9));
        assert_eq!(p.turnaround, 9);
        assert_eq!(p.waiting_time(), Some(0));
        assert_eq!(p.context_switches, 3);
        assert_eq!(
            tokens(&out, 0),
            vec!["P1", "P1", "P1", "idle", "idle", "idle", "idle", "P1", "P1"]
        );
    }

    #[test]
    fn two_cores_run_two_processes_side_by_side() {
        let out = run(
            2,
            10,
            false,
            vec![Process::new("A", 0, 3), Process::new("B", 0, 2)],
        );
        assert_eq!(tokens(&out, 0), vec!["A", "A", "A"]);
        assert_eq!(tokens(&out, 1), vec!["B", "B", "idle"]);
        assert_eq!(out.process("A").unwrap().start, Some(0));
        assert_eq!(out.process("B").unwrap().start, Some(0));
        assert_eq!(out.finished.len(), 2);
    }

    #[test]
    fn dynamic_arrival_waits_for_its_tick() {
        let config = SchedulerConfig {
            num_cores: 1,
            quantum: 2,
            dynamic_quantum: true,
        };
        let out = Simulator::new(config, vec![], vec![Process::new("late", 3, 2)])
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(tokens(&out, 0), vec!["idle", "idle", "idle", "late", "late"]);
        let p = out.process("late").unwrap();
        assert_eq!(p.start, Some(3));
        assert_eq!(p.turnaround, 2);
    }

    #[test]
    fn preempted_process_goes_to_the_back() {
        let out = run(
            1,
            2,
            false,
            vec![Process::new("A", 0, 3), Process::new("B", 0, 2)],
        );
        assert_eq!(tokens(&out, 0), vec!["A", "A", "B", "B", "A"]);
        assert_eq!(out.process("A").unwrap().waiting_time(), Some(2));
        assert_eq!(out.process("B").unwrap().waiting_time(), Some(2));
    }

    #[test]
    fn empty_workload_terminates_immediately() {
        let out = run(3, 2, true, vec![]);
        assert_eq!(out.ticks, 0);
        assert!(out.finished.is_empty());
        assert!(out.timelines.iter().all(|t| t.is_empty()));
    }

    #[test]
    fn invalid_config_is_rejected_before_running() {
        let config = SchedulerConfig {
            num_cores: 0,
            quantum: 2,
            dynamic_quantum: true,
        };
        assert!(Simulator::new(config, vec![Process::new("A", 0, 1)], vec![]).is_err());
    }

    #[test]
    fn runs_are_deterministic() {
        let procs = || {
            vec![
                Process::new_blocking("A", 0, 4, 2, 3),
                Process::new("B", 0, 5),
                Process::new_blocking("C", 0, 2, 1, 1),
            ]
        };
        let first = run(2, 2, true, procs());
        for _ in 0..5 {
            let again = run(2, 2, true, procs());
            assert_eq!(again.timelines, first.timelines);
            assert_eq!(again.trace, first.trace);
        }
    }
}
