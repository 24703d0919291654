//! Multi-level ready queue: one FIFO per priority.

use std::collections::VecDeque;

use super::Pid;

/// A pid was offered at a priority the queue has no level for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityOutOfRange {
    pub pid: Pid,
    pub priority: i32,
}

impl core::fmt::Display for PriorityOutOfRange {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "priority {} of pid {} out of range", self.priority, self.pid)
    }
}

pub struct ReadyQueue {
    highest: i32,
    levels: Vec<VecDeque<Pid>>,
}

impl ReadyQueue {
    /// Queue covering priorities `highest..=lowest` (lowest includes the
    /// idle monitor's level).
    pub fn new(highest: i32, lowest: i32) -> Self {
        let count = usize::try_from(lowest - highest + 1).unwrap_or(0);
        ReadyQueue {
            highest,
            levels: (0..count).map(|_| VecDeque::new()).collect(),
        }
    }

    fn level(&self, priority: i32) -> Option<usize> {
        usize::try_from(priority - self.highest)
            .ok()
            .filter(|&level| level < self.levels.len())
    }

    /// Append `pid` to its priority's FIFO. A pid that is already queued is
    /// left where it is; returns whether it was added.
    pub fn enqueue(&mut self, pid: Pid, priority: i32) -> Result<bool, PriorityOutOfRange> {
        let level = self
            .level(priority)
            .ok_or(PriorityOutOfRange { pid, priority })?;
        let bucket = &mut self.levels[level];
        if bucket.contains(&pid) {
            return Ok(false);
        }
        bucket.push_back(pid);
        Ok(true)
    }

    /// Pop the front of the most urgent non-empty FIFO.
    pub fn dequeue_highest(&mut self) -> Option<Pid> {
        self.levels.iter_mut().find_map(|bucket| bucket.pop_front())
    }

    pub fn remove(&mut self, pid: Pid) -> bool {
        for bucket in &mut self.levels {
            if let Some(index) = bucket.iter().position(|p| *p == pid) {
                bucket.remove(index);
                return true;
            }
        }
        false
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.levels.iter().any(|bucket| bucket.contains(&pid))
    }

    pub fn len(&self) -> usize {
        self.levels.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.iter().all(VecDeque::is_empty)
    }
}
