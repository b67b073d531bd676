//! Multicore Round-Robin scheduling simulator: fixed or dynamic quanta, staggered arrivals, one I/O block per process.

pub mod clock;
pub mod core;
pub mod metrics;
pub mod process;
pub mod scheduler;
pub mod simulator;
pub mod trace;
pub mod workload;
