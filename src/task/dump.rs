//! Process table snapshot for debugging output.

use super::scheduler::Scheduler;
use super::{relations, Pid};

/// One occupied slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpRow {
    pub slot: usize,
    pub pid: Pid,
    pub parent: Option<Pid>,
    pub priority: i32,
    /// `RUNNING` for the current process, the stored status otherwise.
    pub status: String,
    pub live_children: usize,
    pub cpu_time_ms: u64,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessDump {
    pub rows: Vec<DumpRow>,
}

impl ProcessDump {
    pub fn row(&self, pid: Pid) -> Option<&DumpRow> {
        self.rows.iter().find(|r| r.pid == pid)
    }
}

impl core::fmt::Display for ProcessDump {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        writeln!(
            f,
            "{:<6}{:>6}  {:>8}  {:<16}{:>8}  {:>8}  Name",
            "PID", "Parent", "Priority", "Status", "Children", "CPU(ms)"
        )?;
        for r in &self.rows {
            let parent = r.parent.map_or(-1, |p| i64::from(p.raw()));
            writeln!(
                f,
                "{:<6}{:>6}  {:>8}  {:<16}{:>8}  {:>8}  {}",
                r.pid, parent, r.priority, r.status, r.live_children, r.cpu_time_ms, r.name
            )?;
        }
        Ok(())
    }
}

impl Scheduler {
    /// Snapshot every occupied slot in slot order.
    pub fn dump(&self, now: u64) -> ProcessDump {
        let rows = self
            .table
            .occupied()
            .map(|(slot, p)| {
                let status = if self.current() == Some(p.pid) {
                    String::from("RUNNING")
                } else {
                    p.status.to_string()
                };
                let live_children = relations::live_children(&self.table, p.pid).len();
                DumpRow {
                    slot,
                    pid: p.pid,
                    parent: p.parent,
                    priority: p.priority,
                    status,
                    live_children,
                    cpu_time_ms: self.cpu_time_us(p.pid, now).unwrap_or(0) / 1_000,
                    name: p.name.clone(),
                }
            })
            .collect();
        ProcessDump { rows }
    }
}
