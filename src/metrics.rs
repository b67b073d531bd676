//! Run statistics and the textual report: per-process table and per-core Gantt lines.

use crate::core::{CoreId, Tick, TimelineToken};
use crate::process::{Process, ProcessId};
use anyhow::{Context, Result};
use std::fmt;
use std::fs;
use std::path::Path;

/// Report row for one finished process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessStats {
    pub id: ProcessId,
    /// Turnaround minus CPU and I/O time.
    pub waiting: Tick,
    pub turnaround: Tick,
    /// Dispatches minus one: the first dispatch is not a switch away from anything.
    pub context_switches: u32,
}

impl ProcessStats {
    /// `None` unless the process has finished.
    pub fn from_process(process: &Process) -> Option<Self> {
        let waiting = process.waiting_time()?;
        Some(Self {
            id: process.id.clone(),
            waiting,
            turnaround: process.turnaround,
            context_switches: process.context_switches.saturating_sub(1),
        })
    }
}

/// Final statistics of a run.
#[derive(Clone, Debug, Default)]
pub struct Report {
    /// Sorted by process ID.
    rows: Vec<ProcessStats>,
    timelines: Vec<Vec<TimelineToken>>,
}

impl Report {
    pub fn new(finished: &[Process], timelines: &[Vec<TimelineToken>]) -> Self {
        let mut rows: Vec<ProcessStats> = finished.iter().filter_map(ProcessStats::from_process).collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            rows,
            timelines: timelines.to_vec(),
        }
    }

    pub fn rows(&self) -> &[ProcessStats] {
        &self.rows
    }

    pub fn row(&self, id: &str) -> Option<&ProcessStats> {
        self.rows.iter().find(|r| r.id.0 == id)
    }

    pub fn num_cores(&self) -> usize {
        self.timelines.len()
    }

    pub fn average_waiting(&self) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        self.rows.iter().map(|r| r.waiting as f64).sum::<f64>() / self.rows.len() as f64
    }

    pub fn average_turnaround(&self) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        self.rows.iter().map(|r| r.turnaround as f64).sum::<f64>() / self.rows.len() as f64
    }

    /// Fraction of the core's ticks spent running a process (0 for an empty timeline).
    pub fn utilization(&self, core: CoreId) -> f64 {
        let Some(timeline) = self.timelines.get(core.0) else {
            return 0.0;
        };
        if timeline.is_empty() {
            return 0.0;
        }
        let busy = timeline.iter().filter(|t| !t.is_idle()).count();
        busy as f64 / timeline.len() as f64
    }

    /// Renders the table and the Gantt lines.
    pub fn render(&self) -> String {
        self.to_string()
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.render())
            .with_context(|| format!("failed to write report to {}", path.display()))
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ID | Waiting | Turnaround | Context switches")?;
        for r in &self.rows {
            writeln!(f, "{} | {} | {} | {}", r.id, r.waiting, r.turnaround, r.context_switches)?;
        }
        writeln!(f)?;
        writeln!(f, "Gantt timeline:")?;
        for (idx, timeline) in self.timelines.iter().enumerate() {
            let cells: Vec<String> = timeline.iter().map(|t| t.to_string()).collect();
            writeln!(f, "Core {}: {}", idx, cells.join(" | "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(id: &str, arrival: Tick, burst: Tick, finish: Tick, dispatches: u32) -> Process {
        let mut p = Process::new(id, arrival, burst);
        p.finish = Some(finish);
        p.turnaround = finish - arrival;
        p.context_switches = dispatches;
        p
    }

    fn run(id: &str) -> TimelineToken {
        TimelineToken::Run(ProcessId::from(id))
    }

    #[test]
    fn stats_subtract_first_dispatch() {
        let s = ProcessStats::from_process(&finished("P1", 0, 5, 5, 2)).unwrap();
        assert_eq!(s.waiting, 0);
        assert_eq!(s.turnaround, 5);
        assert_eq!(s.context_switches, 1);
    }

    #[test]
    fn unfinished_process_has_no_stats() {
        assert!(ProcessStats::from_process(&Process::new("P1", 0, 5)).is_none());
    }

    #[test]
    fn report_renders_sorted_table_and_gantt() {
        let procs = vec![finished("P2", 0, 2, 4, 1), finished("P1", 0, 2, 2, 1)];
        let timelines = vec![
            vec![run("P1"), run("P1"), run("P2"), run("P2")],
            vec![TimelineToken::Idle],
        ];
        let report = Report::new(&procs, &timelines);
        let expected = "\
ID | Waiting | Turnaround | Context switches
P1 | 0 | 2 | 0
P2 | 2 | 4 | 0

Gantt timeline:
Core 0: P1 | P1 | P2 | P2
Core 1: idle
";
        assert_eq!(report.render(), expected);
    }

    #[test]
    fn rendering_is_idempotent() {
        let procs = vec![finished("B", 1, 3, 9, 3), finished("A", 0, 1, 1, 1)];
        let timelines = vec![vec![run("A"), TimelineToken::Idle, run("B")]];
        let report = Report::new(&procs, &timelines);
        assert_eq!(report.render(), report.render());
        assert_eq!(report.render(), Report::new(&procs, &timelines).render());
    }

    #[test]
    fn averages_and_utilization() {
        let procs = vec![finished("A", 0, 2, 2, 1), finished("B", 0, 2, 6, 1)];
        let timelines = vec![
            vec![run("A"), run("A"), TimelineToken::Idle, TimelineToken::Idle],
            vec![],
        ];
        let report = Report::new(&procs, &timelines);
        assert!((report.average_waiting() - 2.0).abs() < 1e-9);
        assert!((report.average_turnaround() - 4.0).abs() < 1e-9);
        assert!((report.utilization(CoreId(0)) - 0.5).abs() < 1e-9);
        assert_eq!(report.utilization(CoreId(1)), 0.0);
        assert_eq!(report.utilization(CoreId(7)), 0.0);
    }

    #[test]
    fn empty_report() {
        let report = Report::new(&[], &[vec![], vec![]]);
        assert_eq!(report.average_waiting(), 0.0);
        assert_eq!(
            report.render(),
            "ID | Waiting | Turnaround | Context switches\n\nGantt timeline:\nCore 0: \nCore 1: \n"
        );
    }

    #[test]
    fn write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        let report = Report::new(&[finished("A", 0, 1, 1, 1)], &[vec![run("A")]]);
        report.write_to(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), report.render());
    }
}
