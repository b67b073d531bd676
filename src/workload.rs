//! Workloads: the `ID|arrival|burst1|flag|block|burst2` record loader and a
//! seeded synthetic generator.

use crate::core::Tick;
use crate::process::Process;
use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Processes split by arrival: tick 0 (initial) and later (dynamic), each in input order.
#[derive(Clone, Debug, Default)]
pub struct Workload {
    pub initial: Vec<Process>,
    pub dynamic: Vec<Process>,
}

impl Workload {
    pub fn len(&self) -> usize {
        self.initial.len() + self.dynamic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn processes(&self) -> impl Iterator<Item = &Process> {
        self.initial.iter().chain(self.dynamic.iter())
    }

    fn push(&mut self, process: Process) {
        if process.arrival == 0 {
            self.initial.push(process);
        } else {
            self.dynamic.push(process);
        }
    }

    /// Renders the workload back into the record format.
    pub fn to_records(&self) -> String {
        let mut out = String::new();
        for p in self.processes() {
            let flag = if p.blocks { "S" } else { "N" };
            let _ = writeln!(
                out,
                "{}|{}|{}|{}|{}|{}",
                p.id, p.arrival, p.burst1, flag, p.block_duration, p.burst2
            );
        }
        out
    }
}

/// Parses a whole file's worth of records. Fails on the first bad line; nothing
/// is returned from a partially valid input.
pub fn parse_workload(text: &str) -> Result<Workload> {
    let mut workload = Workload::default();
    let mut ids = HashSet::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let process = parse_record(line).with_context(|| format!("line {}", idx + 1))?;
        if !ids.insert(process.id.clone()) {
            bail!("line {}: duplicate process id {}", idx + 1, process.id);
        }
        workload.push(process);
    }
    Ok(workload)
}

pub fn load_workload(path: impl AsRef<Path>) -> Result<Workload> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read workload {}", path.display()))?;
    parse_workload(&text).with_context(|| format!("malformed workload {}", path.display()))
}

fn parse_record(line: &str) -> Result<Process> {
    let fields: Vec<&str> = line.split('|').map(str::trim).collect();
    if fields.len() != 6 {
        bail!("expected 6 '|'-separated fields, found {}", fields.len());
    }
    let id = fields[0];
    if id.is_empty() {
        bail!("empty process id");
    }
    let arrival = parse_ticks("arrival", fields[1])?;
    let burst1 = parse_ticks("phase-1 burst", fields[2])?;
    if burst1 == 0 {
        bail!("phase-1 burst must be at least 1 tick");
    }
    let blocks = parse_flag(fields[3])?;
    let block_duration = parse_ticks("block duration", fields[4])?;
    let burst2 = parse_ticks("phase-2 burst", fields[5])?;
    Ok(Process::with_io(id, arrival, burst1, blocks, block_duration, burst2))
}

fn parse_ticks(name: &str, field: &str) -> Result<Tick> {
    field
        .parse()
        .with_context(|| format!("{} {:?} is not a non-negative integer", name, field))
}

fn parse_flag(field: &str) -> Result<bool> {
    match field.to_lowercase().as_str() {
        "s" | "sim" | "y" | "yes" | "true" => Ok(true),
        "n" | "nao" | "não" | "no" | "false" => Ok(false),
        _ => bail!("block flag {:?} is neither yes nor no", field),
    }
}

/// Synthetic workload configuration.
#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    pub processes: usize,
    /// Arrivals are drawn from `0..=max_arrival`.
    pub max_arrival: Tick,
    /// Bursts are drawn from `1..=max_burst`.
    pub max_burst: Tick,
    /// Fraction of processes that block after phase 1.
    pub block_fraction: f64,
    /// Block durations are drawn from `0..=max_block`.
    pub max_block: Tick,
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            processes: 8,
            max_arrival: 10,
            max_burst: 8,
            block_fraction: 0.4,
            max_block: 5,
            seed: 42,
        }
    }
}

/// Deterministic process generator (xorshift64).
pub struct WorkloadGenerator {
    config: GeneratorConfig,
    state: u64,
    index: usize,
}

impl WorkloadGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        let state = if config.seed == 0 { 1 } else { config.seed };
        Self {
            config,
            state,
            index: 0,
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    fn range(&mut self, min: Tick, max: Tick) -> Tick {
        min + self.next_u64() % (max - min + 1)
    }

    /// Next process, or `None` once `processes` have been generated.
    pub fn next_process(&mut self) -> Option<Process> {
        if self.index >= self.config.processes {
            return None;
        }
        self.index += 1;
        let id = format!("P{}", self.index);
        let arrival = self.range(0, self.config.max_arrival);
        let burst1 = self.range(1, self.config.max_burst.max(1));
        let blocks = (self.next_u64() % 1000) as f64 / 1000.0 < self.config.block_fraction;
        if !blocks {
            return Some(Process::new(id, arrival, burst1));
        }
        let block = self.range(0, self.config.max_block);
        let burst2 = self.range(0, self.config.max_burst);
        Some(Process::new_blocking(id, arrival, burst1, block, burst2))
    }

    pub fn remaining(&self) -> usize {
        self.config.processes.saturating_sub(self.index)
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }
}

/// Builds a full synthetic workload.
pub fn generate_workload(config: GeneratorConfig) -> Workload {
    let mut gen = WorkloadGenerator::new(config);
    let mut workload = Workload::default();
    while let Some(process) = gen.next_process() {
        workload.push(process);
    }
    workload
}
