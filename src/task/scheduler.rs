//! Scheduler state: process table, ready queue and the current process.
//!
//! Everything here is plain data manipulation. The kernel wraps a
//! `Scheduler` in a lock and performs the actual context transfer after
//! [`Scheduler::switch`] has decided who runs next.

use std::sync::Arc;

use super::ready::ReadyQueue;
use super::relations;
use super::table::ProcTable;
use super::{Pid, Process, ProcessSpec, Status};
use crate::arch::ExecContext;
use crate::config::KernelConfig;
use crate::error::KernelFault;

/// What a newly created process is to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessRole {
    /// The idle monitor, alone at the reserved lowest priority.
    Idle,
    /// The first ordinary process, created at boot with no parent.
    First,
    Ordinary,
}

/// Outcome of a scheduling decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Switch {
    pub from: Option<Pid>,
    pub to: Pid,
}

impl Switch {
    /// The outgoing process was chosen again; no transfer needed.
    pub fn is_noop(&self) -> bool {
        self.from == Some(self.to)
    }
}

/// What the idle monitor concludes from the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleVerdict {
    /// No live work left.
    Shutdown,
    /// Only the first process is alive and an interrupt may still wake it.
    Waiting,
    /// Live processes exist but none of them can ever run again.
    Deadlock(Vec<Pid>),
}

/// Set `pid` ready and queue it. Returns false if it was already queued or
/// does not exist.
pub(crate) fn wake(table: &mut ProcTable, ready: &mut ReadyQueue, pid: Pid) -> Result<bool, KernelFault> {
    match table.get_mut(pid) {
        Some(p) => {
            p.status = Status::Ready;
            let priority = p.priority;
            Ok(ready.enqueue(pid, priority)?)
        }
        None => Ok(false),
    }
}

pub struct Scheduler {
    pub(crate) table: ProcTable,
    pub(crate) ready: ReadyQueue,
    current: Option<Pid>,
    idle: Option<Pid>,
    first: Option<Pid>,
    time_slice_us: u64,
}

impl Scheduler {
    pub fn new(config: &KernelConfig) -> Self {
        Scheduler {
            table: ProcTable::new(config),
            ready: ReadyQueue::new(config.highest_priority, config.idle_priority()),
            current: None,
            idle: None,
            first: None,
            time_slice_us: config.time_slice_us,
        }
    }

    pub fn table(&self) -> &ProcTable {
        &self.table
    }

    pub fn current(&self) -> Option<Pid> {
        self.current
    }

    pub fn idle(&self) -> Option<Pid> {
        self.idle
    }

    pub fn first(&self) -> Option<Pid> {
        self.first
    }

    pub(crate) fn current_pid(&self) -> Result<Pid, KernelFault> {
        self.current.ok_or(KernelFault::NoCurrentProcess)
    }

    pub(crate) fn record(&self, pid: Pid) -> Result<&Process, KernelFault> {
        self.table
            .get(pid)
            .ok_or(KernelFault::Corrupted("scheduled pid has no process record"))
    }

    pub(crate) fn record_mut(&mut self, pid: Pid) -> Result<&mut Process, KernelFault> {
        self.table
            .get_mut(pid)
            .ok_or(KernelFault::Corrupted("scheduled pid has no process record"))
    }

    pub(crate) fn current_record(&self) -> Result<&Process, KernelFault> {
        self.record(self.current_pid()?)
    }

    pub(crate) fn current_record_mut(&mut self) -> Result<&mut Process, KernelFault> {
        let pid = self.current_pid()?;
        self.record_mut(pid)
    }

    pub fn make_ready(&mut self, pid: Pid) -> Result<bool, KernelFault> {
        wake(&mut self.table, &mut self.ready, pid)
    }

    /// Allocate a record, link it under the current process and queue it.
    pub fn admit(&mut self, spec: ProcessSpec, role: ProcessRole) -> Result<Pid, KernelFault> {
        let pid = self.table.allocate(spec)?;
        if let Some(parent) = self.current {
            relations::attach_child(&mut self.table, parent, pid);
        }
        match role {
            ProcessRole::Idle => self.idle = Some(pid),
            ProcessRole::First => self.first = Some(pid),
            ProcessRole::Ordinary => {}
        }
        self.make_ready(pid)?;
        Ok(pid)
    }

    /// Undo an [`admit`](Self::admit) whose context could not be created.
    pub(crate) fn discard(&mut self, pid: Pid) {
        self.ready.remove(pid);
        if let Some(parent) = self.table.get(pid).and_then(|p| p.parent) {
            relations::detach_child(&mut self.table, parent, pid);
        }
        self.table.evict(pid);
        if self.idle == Some(pid) {
            self.idle = None;
        }
        if self.first == Some(pid) {
            self.first = None;
        }
    }

    pub(crate) fn attach_context(&mut self, pid: Pid, context: Arc<dyn ExecContext>) -> Result<(), KernelFault> {
        self.record_mut(pid)?.context = Some(context);
        Ok(())
    }

    pub(crate) fn context_of(&self, pid: Pid) -> Result<Arc<dyn ExecContext>, KernelFault> {
        self.record(pid)?
            .context
            .clone()
            .ok_or(KernelFault::Corrupted("process has no execution context"))
    }

    /// Decide who runs next.
    ///
    /// Charges the outgoing process for its quantum and re-queues it behind
    /// its peers if it is still ready, then picks the front of the most
    /// urgent non-empty level and starts its quantum at `now`.
    pub fn switch(&mut self, now: u64) -> Result<Switch, KernelFault> {
        let from = self.current;
        if let Some(pid) = from {
            let outgoing = self.record_mut(pid)?;
            outgoing.cpu_time += now.saturating_sub(outgoing.quantum_start);
            if outgoing.status == Status::Ready {
                let priority = outgoing.priority;
                self.ready.enqueue(pid, priority)?;
            }
        }

        let to = self
            .ready
            .dequeue_highest()
            .ok_or(KernelFault::ReadyQueueExhausted)?;
        let incoming = self.record_mut(to)?;
        debug_assert_eq!(incoming.status, Status::Ready);
        incoming.quantum_start = now;
        self.current = Some(to);

        Ok(Switch { from, to })
    }

    /// Whether the current process has used up its time slice.
    pub fn quantum_expired(&self, now: u64) -> Result<bool, KernelFault> {
        let current = self.current_record()?;
        Ok(now.saturating_sub(current.quantum_start) > self.time_slice_us)
    }

    /// CPU time of `pid` in microseconds, counting the running quantum if
    /// `pid` is current.
    pub fn cpu_time_us(&self, pid: Pid, now: u64) -> Option<u64> {
        let p = self.table.get(pid)?;
        let running = if self.current == Some(pid) {
            now.saturating_sub(p.quantum_start)
        } else {
            0
        };
        Some(p.cpu_time + running)
    }

    /// Inspect the table from the idle monitor's point of view.
    ///
    /// Anything alive besides the idle monitor and the first process is a
    /// deadlock, since the idle monitor only runs when nothing else can.
    /// The first process may be waiting on a device; that only counts as
    /// progress if something can still interrupt.
    pub fn idle_verdict(&self, interrupts_pending: bool) -> IdleVerdict {
        let mut first_alive = false;
        let mut stuck = Vec::new();
        for p in self.table.iter() {
            if Some(p.pid) == self.idle || p.status.has_quit() {
                continue;
            }
            if Some(p.pid) == self.first {
                first_alive = true;
            } else {
                stuck.push(p.pid);
            }
        }

        if !stuck.is_empty() {
            if let Some(first) = self.first.filter(|_| first_alive) {
                stuck.insert(0, first);
            }
            return IdleVerdict::Deadlock(stuck);
        }
        match (first_alive, self.first) {
            (true, Some(_)) if interrupts_pending => IdleVerdict::Waiting,
            (true, Some(first)) => IdleVerdict::Deadlock(vec![first]),
            _ => IdleVerdict::Shutdown,
        }
    }
}
