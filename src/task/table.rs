//! Fixed-capacity process table.
//!
//! A pid hashes to slot `pid % capacity`. Allocation probes successive
//! candidate pids until one hashes to a free slot, so every record sits
//! exactly at the slot its pid hashes to and lookups never probe.

use super::{Pid, Process, ProcessSpec, Status};
use crate::config::KernelConfig;

/// Pid handed to the first process created (the idle monitor).
pub const FIRST_PID: u32 = 1;

/// Process table allocation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// Every slot is occupied.
    CapacityExceeded,
    /// Priority outside the ordinary range and not the idle priority.
    InvalidPriority(i32),
    /// Stack smaller than the configured minimum.
    InvalidStackSize(usize),
    /// Name empty or too long.
    InvalidName,
    /// Start argument too long.
    InvalidArgument,
}

impl core::fmt::Display for AllocError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            AllocError::CapacityExceeded => write!(f, "process table full"),
            AllocError::InvalidPriority(p) => write!(f, "invalid priority {}", p),
            AllocError::InvalidStackSize(s) => write!(f, "stack size {} below minimum", s),
            AllocError::InvalidName => write!(f, "invalid process name"),
            AllocError::InvalidArgument => write!(f, "start argument too long"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Limits {
    max_name_len: usize,
    max_arg_len: usize,
    min_stack: usize,
    highest_priority: i32,
    lowest_priority: i32,
    idle_priority: i32,
}

pub struct ProcTable {
    slots: Vec<Option<Process>>,
    next_pid: u32,
    limits: Limits,
}

impl ProcTable {
    pub fn new(config: &KernelConfig) -> Self {
        let mut slots = Vec::with_capacity(config.max_procs);
        slots.resize_with(config.max_procs, || None);
        ProcTable {
            slots,
            next_pid: FIRST_PID,
            limits: Limits {
                max_name_len: config.max_name_len,
                max_arg_len: config.max_arg_len,
                min_stack: config.min_stack,
                highest_priority: config.highest_priority,
                lowest_priority: config.lowest_priority,
                idle_priority: config.idle_priority(),
            },
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn slot_of(&self, pid: Pid) -> usize {
        pid.raw() as usize % self.slots.len()
    }

    fn validate(&self, spec: &ProcessSpec) -> Result<(), AllocError> {
        let l = &self.limits;
        if spec.name.is_empty() || spec.name.len() > l.max_name_len {
            return Err(AllocError::InvalidName);
        }
        if spec.arg.len() > l.max_arg_len {
            return Err(AllocError::InvalidArgument);
        }
        if spec.stack_size < l.min_stack {
            return Err(AllocError::InvalidStackSize(spec.stack_size));
        }
        let ordinary = (l.highest_priority..=l.lowest_priority).contains(&spec.priority);
        if !ordinary && spec.priority != l.idle_priority {
            return Err(AllocError::InvalidPriority(spec.priority));
        }
        Ok(())
    }

    /// Create a record for `spec` in the first free slot reached by probing
    /// from the next candidate pid.
    pub fn allocate(&mut self, spec: ProcessSpec) -> Result<Pid, AllocError> {
        self.validate(&spec)?;

        let capacity = self.slots.len();
        for offset in 0..capacity as u32 {
            let candidate = self
                .next_pid
                .checked_add(offset)
                .ok_or(AllocError::CapacityExceeded)?;
            let slot = candidate as usize % capacity;
            if self.slots[slot].is_none() {
                let pid = Pid::new(candidate);
                self.slots[slot] = Some(Process::new(pid, spec));
                self.next_pid = candidate.saturating_add(1);
                return Ok(pid);
            }
        }
        Err(AllocError::CapacityExceeded)
    }

    /// Any record occupying `pid`'s slot under that pid, dead or alive.
    pub fn get(&self, pid: Pid) -> Option<&Process> {
        self.slots[self.slot_of(pid)]
            .as_ref()
            .filter(|p| p.pid == pid)
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Process> {
        let slot = self.slot_of(pid);
        self.slots[slot].as_mut().filter(|p| p.pid == pid)
    }

    /// A record that is still visible to other processes (not `Dead`).
    pub fn lookup(&self, pid: Pid) -> Option<&Process> {
        self.get(pid).filter(|p| p.status != Status::Dead)
    }

    /// Free a `Dead` record's slot. Returns false for anything else.
    pub fn reclaim(&mut self, pid: Pid) -> bool {
        let slot = self.slot_of(pid);
        match &self.slots[slot] {
            Some(p) if p.pid == pid && p.status == Status::Dead => {
                self.slots[slot] = None;
                true
            }
            _ => false,
        }
    }

    /// Remove a record regardless of status. Only used to undo a creation
    /// that failed halfway.
    pub(crate) fn evict(&mut self, pid: Pid) -> Option<Process> {
        let slot = self.slot_of(pid);
        match &self.slots[slot] {
            Some(p) if p.pid == pid => self.slots[slot].take(),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Process> {
        self.slots.iter().flatten()
    }

    /// Occupied slots with their index.
    pub fn occupied(&self) -> impl Iterator<Item = (usize, &Process)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, p)| p.as_ref().map(|p| (slot, p)))
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::testing::spec;

    fn table(max_procs: usize) -> ProcTable {
        ProcTable::new(&KernelConfig::default().with_max_procs(max_procs))
    }

    #[test]
    fn pids_hash_to_their_slot() {
        let mut t = table(4);
        assert_eq!(t.capacity(), 4);
        assert!(t.is_empty());
        let pids: Vec<Pid> = (0..4).map(|i| t.allocate(spec(&format!("p{}", i), 3)).unwrap()).collect();
        for pid in &pids {
            let slot = t.slot_of(*pid);
            assert_eq!(t.occupied().find(|(s, _)| *s == slot).unwrap().1.pid(), *pid);
        }
        assert_eq!(t.len(), 4);
        assert_eq!(t.allocate(spec("full", 3)), Err(AllocError::CapacityExceeded));
    }

    #[test]
    fn dead_slot_is_reused_with_larger_pid() {
        let mut t = table(4);
        let a = t.allocate(spec("a", 3)).unwrap();
        let b = t.allocate(spec("b", 3)).unwrap();
        let _c = t.allocate(spec("c", 3)).unwrap();
        let _d = t.allocate(spec("d", 3)).unwrap();

        assert!(!t.reclaim(b), "live records are not reclaimable");
        t.get_mut(b).unwrap().status = Status::Dead;
        assert!(t.lookup(b).is_none());
        assert!(t.reclaim(b));

        let e = t.allocate(spec("e", 3)).unwrap();
        assert!(e > b);
        assert_eq!(t.slot_of(e), t.slot_of(b));
        assert!(t.get(b).is_none());
        assert_eq!(t.lookup(e).unwrap().name(), "e");
        assert_eq!(t.lookup(a).unwrap().name(), "a");
    }

    #[test]
    fn rejects_bad_inputs() {
        let mut t = table(8);
        assert_eq!(t.allocate(spec("", 3)), Err(AllocError::InvalidName));
        assert_eq!(
            t.allocate(spec(&"x".repeat(51), 3)),
            Err(AllocError::InvalidName)
        );
        assert_eq!(t.allocate(spec("p", 0)), Err(AllocError::InvalidPriority(0)));
        assert_eq!(t.allocate(spec("p", 7)), Err(AllocError::InvalidPriority(7)));
        let idle = t.allocate(spec("idle", 6)).unwrap();
        assert_eq!(t.lookup(idle).unwrap().stack_size(), crate::config::MIN_STACK);

        let mut small = spec("small", 3);
        small.stack_size = 1024;
        assert_eq!(t.allocate(small), Err(AllocError::InvalidStackSize(1024)));

        let mut long_arg = spec("arg", 3);
        long_arg.arg = "a".repeat(101);
        assert_eq!(t.allocate(long_arg), Err(AllocError::InvalidArgument));
    }
}
