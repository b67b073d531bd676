//! Worked scenarios, loaded through the record format.

use rr_multicore_sim::core::{CoreId, Tick};
use rr_multicore_sim::scheduler::SchedulerConfig;
use rr_multicore_sim::simulator::{Outcome, Simulator};
use rr_multicore_sim::workload::parse_workload;

fn run(records: &str, num_cores: usize, quantum: Tick, dynamic_quantum: bool) -> Outcome {
    let workload = parse_workload(records).unwrap();
    let config = SchedulerConfig {
        num_cores,
        quantum,
        dynamic_quantum,
    };
    Simulator::from_workload(config, workload).unwrap().run().unwrap()
}

fn gantt(out: &Outcome, core: usize) -> Vec<String> {
    out.timeline(CoreId(core)).iter().map(|t| t.to_string()).collect()
}

#[test]
fn one_core_fixed_quantum_single_process() {
    let out = run("P1|0|5|N|0|0\n", 1, 3, false);
    assert_eq!(gantt(&out, 0), vec!["P1"; 5]);
    let p = out.process("P1").unwrap();
    assert_eq!(p.turnaround, 5);
    assert_eq!(p.waiting_time(), Some(0));
    assert_eq!(p.context_switches, 2);

    let report = out.report().render();
    assert!(report.starts_with("ID | Waiting | Turnaround | Context switches\nP1 | 0 | 5 | 1\n"));
    assert!(report.ends_with("Core 0: P1 | P1 | P1 | P1 | P1\n"));
}

#[test]
fn one_core_dynamic_quantum_with_io_block() {
    let out = run("P1|0|3|S|4|2\n", 1, 2, true);
    let p = out.process("P1").unwrap();
    assert_eq!(p.finish, Some(9));
    assert_eq!(p.turnaround, 9);
    assert_eq!(p.waiting_time(), Some(0));
    let quanta: Vec<Tick> = out
        .trace
        .iter()
        .filter_map(|e| match e.kind {
            rr_multicore_sim::trace::TraceKind::Dispatched { quantum, .. } => Some(quantum),
            _ => None,
        })
        .collect();
    assert_eq!(quanta, vec![2, 1, 2]);
}

#[test]
fn two_cores_share_the_first_tick() {
    let out = run("A|0|2|N|0|0\nB|0|3|N|0|0\n", 2, 5, false);
    assert_eq!(gantt(&out, 0), vec!["A", "A", "idle"]);
    assert_eq!(gantt(&out, 1), vec!["B", "B", "B"]);
    for p in &out.finished {
        assert_eq!(p.start, Some(0));
        assert_eq!(p.context_switches, 1);
        assert_eq!(p.waiting_time(), Some(0));
    }
}

#[test]
fn mixed_workload_on_two_cores() {
    let records = "\
P1|0|4|S|2|2
P2|0|3|N|0|0
P3|2|2|N|0|0
P4|5|1|S|1|1
";
    let out = run(records, 2, 2, true);
    assert_eq!(out.finished.len(), 4);
    for p in &out.finished {
        assert_eq!(p.turnaround, p.finish.unwrap() - p.arrival);
    }
    let rendered = out.report().render();
    let rows: Vec<&str> = rendered.lines().skip(1).take(4).collect();
    assert!(rows[0].starts_with("P1 |"));
    assert!(rows[3].starts_with("P4 |"));
    assert_eq!(rendered.matches("Core ").count(), 2);
}
