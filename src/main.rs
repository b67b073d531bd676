//! Runs one simulation from a workload file (or a generated workload) and writes the report.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use rr_multicore_sim::core::CoreId;
use rr_multicore_sim::scheduler::SchedulerConfig;
use rr_multicore_sim::simulator::Simulator;
use rr_multicore_sim::workload::{generate_workload, load_workload, GeneratorConfig};
use std::path::PathBuf;

/// rr-multicore-sim: preemptive Round-Robin scheduling over several cores.
///
/// Each input line describes one process as `ID|arrival|burst1|flag|block|burst2`:
/// it arrives at tick `arrival`, runs `burst1` ticks, and if `flag` is yes (S)
/// it blocks for `block` ticks and then runs another `burst2` ticks.
///
/// The report lists waiting time, turnaround and context switches per process,
/// followed by one Gantt line per core.
#[derive(Debug, Parser)]
struct Opts {
    /// Workload file.
    #[clap(env = "RR_INPUT", default_value = "processes.txt")]
    input: PathBuf,

    /// Number of cores.
    #[clap(short = 'c', long, env = "RR_CORES", default_value = "2")]
    cores: usize,

    /// Base quantum in ticks.
    #[clap(short = 'q', long, env = "RR_QUANTUM", default_value = "3")]
    quantum: u64,

    /// Always hand out the full quantum instead of clamping it to the remaining burst.
    #[clap(long, env = "RR_FIXED_QUANTUM")]
    fixed_quantum: bool,

    /// Where to write the report.
    #[clap(short = 'o', long, default_value = "report.txt")]
    output: PathBuf,

    /// Ignore the input file and simulate this many generated processes.
    #[clap(short = 'g', long)]
    generate: Option<usize>,

    /// Seed for --generate.
    #[clap(long, default_value = "42")]
    seed: u64,

    /// Enable verbose output, including dispatch events. Specify twice to
    /// also log every tick.
    #[clap(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let opts = Opts::parse();

    let llv = match opts.verbose {
        0 => simplelog::LevelFilter::Info,
        1 => simplelog::LevelFilter::Debug,
        _ => simplelog::LevelFilter::Trace,
    };
    let mut lcfg = simplelog::ConfigBuilder::new();
    lcfg.set_time_level(simplelog::LevelFilter::Error)
        .set_location_level(simplelog::LevelFilter::Off)
        .set_target_level(simplelog::LevelFilter::Off)
        .set_thread_level(simplelog::LevelFilter::Off);
    simplelog::TermLogger::init(
        llv,
        lcfg.build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )?;

    let config = SchedulerConfig {
        num_cores: opts.cores,
        quantum: opts.quantum,
        dynamic_quantum: !opts.fixed_quantum,
    };
    config.validate().context("invalid configuration")?;

    let workload = match opts.generate {
        Some(processes) => generate_workload(GeneratorConfig {
            processes,
            seed: opts.seed,
            ..Default::default()
        }),
        None => load_workload(&opts.input)?,
    };
    info!(
        "Loaded {} processes ({} initial, {} dynamic)",
        workload.len(),
        workload.initial.len(),
        workload.dynamic.len()
    );

    let outcome = Simulator::from_workload(config, workload)?.run()?;
    let report = outcome.report();
    report.write_to(&opts.output)?;

    info!("Average waiting:    {:.2}", report.average_waiting());
    info!("Average turnaround: {:.2}", report.average_turnaround());
    for core in 0..report.num_cores() {
        info!(
            "Core {} utilization: {:.1}%",
            core,
            report.utilization(CoreId(core)) * 100.0
        );
    }
    info!("{}", outcome.summary());
    info!("Report written to {}", opts.output.display());
    Ok(())
}
