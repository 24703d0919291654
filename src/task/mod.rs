//! Process records and the scheduler core built over them.
//!
//! A process is a user-supplied entry function running on its own
//! execution context. Records live in a fixed-capacity table and name
//! each other only by [`Pid`]; the table slot is the sole owner of a
//! record, parent/child/zapper links are plain relations.

pub mod dump;
pub mod lifecycle;
pub mod ready;
pub mod relations;
pub mod scheduler;
pub mod table;

use std::collections::VecDeque;
use std::sync::Arc;

use crate::arch::{ExecContext, Psr};
use crate::kernel::Kernel;

/// Process identifier. Handed out in increasing order and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(u32);

impl Pid {
    pub(crate) const fn new(raw: u32) -> Self {
        Pid(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl core::fmt::Display for Pid {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Custom block codes must be strictly above this value; everything at or
/// below it is reserved for the kernel's own statuses.
pub const BLOCK_CODE_THRESHOLD: i32 = 10;

/// Reason a process blocked itself with `block_me`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockCode(i32);

impl BlockCode {
    /// Returns `None` for codes that collide with reserved statuses.
    pub fn new(code: i32) -> Option<Self> {
        (code > BLOCK_CODE_THRESHOLD).then_some(BlockCode(code))
    }

    pub fn raw(&self) -> i32 {
        self.0
    }
}

/// Persisted process status.
///
/// "Running" is not stored: the running process keeps `Ready` and is
/// recognised by being the scheduler's current process. An empty slot
/// holds no record at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ready,
    BlockedJoin,
    BlockedZap,
    BlockedCustom(BlockCode),
    Quit,
    Dead,
}

impl Status {
    /// Finished running; either waiting to be joined or already joined.
    pub fn has_quit(self) -> bool {
        matches!(self, Status::Quit | Status::Dead)
    }

    pub fn is_blocked(self) -> bool {
        matches!(
            self,
            Status::BlockedJoin | Status::BlockedZap | Status::BlockedCustom(_)
        )
    }
}

impl core::fmt::Display for Status {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Status::Ready => write!(f, "READY"),
            Status::BlockedJoin => write!(f, "BLOCKED_JOIN"),
            Status::BlockedZap => write!(f, "BLOCKED_ZAP"),
            Status::BlockedCustom(code) => write!(f, "BLOCKED({})", code.raw()),
            Status::Quit => write!(f, "QUIT"),
            Status::Dead => write!(f, "DEAD"),
        }
    }
}

/// Entry function of a process: receives the kernel and its start
/// argument, returns the exit code.
pub type EntryFn = Arc<dyn Fn(&Kernel, &str) -> i32 + Send + Sync>;

/// Everything needed to create a process.
#[derive(Clone)]
pub struct ProcessSpec {
    pub name: String,
    pub arg: String,
    pub entry: EntryFn,
    pub stack_size: usize,
    pub priority: i32,
}

impl ProcessSpec {
    pub fn new(name: &str, entry: EntryFn, arg: &str, stack_size: usize, priority: i32) -> Self {
        ProcessSpec {
            name: String::from(name),
            arg: String::from(arg),
            entry,
            stack_size,
            priority,
        }
    }
}

/// One process table entry.
pub struct Process {
    pub(crate) pid: Pid,
    pub(crate) name: String,
    pub(crate) arg: String,
    pub(crate) entry: EntryFn,
    pub(crate) priority: i32,
    pub(crate) stack_size: usize,
    pub(crate) status: Status,
    pub(crate) zapped: bool,
    pub(crate) exit_code: Option<i32>,
    pub(crate) psr: Psr,
    pub(crate) context: Option<Arc<dyn ExecContext>>,
    pub(crate) cpu_time: u64,
    pub(crate) quantum_start: u64,
    pub(crate) parent: Option<Pid>,
    pub(crate) children: Vec<Pid>,
    pub(crate) quit_children: VecDeque<Pid>,
    pub(crate) zappers: Vec<Pid>,
}

impl Process {
    pub(crate) fn new(pid: Pid, spec: ProcessSpec) -> Self {
        Process {
            pid,
            name: spec.name,
            arg: spec.arg,
            entry: spec.entry,
            priority: spec.priority,
            stack_size: spec.stack_size,
            status: Status::Ready,
            zapped: false,
            exit_code: None,
            psr: Psr::INITIAL,
            context: None,
            cpu_time: 0,
            quantum_start: 0,
            parent: None,
            children: Vec::new(),
            quit_children: VecDeque::new(),
            zappers: Vec::new(),
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_zapped(&self) -> bool {
        self.zapped
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn parent(&self) -> Option<Pid> {
        self.parent
    }

    pub fn children(&self) -> &[Pid] {
        &self.children
    }

    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    /// CPU time accumulated over finished quanta, in microseconds.
    pub fn cpu_time(&self) -> u64 {
        self.cpu_time
    }
}

impl core::fmt::Debug for Process {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("status", &self.status)
            .field("zapped", &self.zapped)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::scheduler::{ProcessRole, Scheduler, Switch};
    use super::*;
    use crate::config::KernelConfig;

    pub fn noop_entry() -> EntryFn {
        Arc::new(|_: &Kernel, _: &str| 0)
    }

    pub fn spec(name: &str, priority: i32) -> ProcessSpec {
        ProcessSpec::new(name, noop_entry(), "", crate::config::MIN_STACK, priority)
    }

    /// A scheduler with the idle monitor queued and the first process
    /// running, as right after boot.
    pub fn booted() -> (Scheduler, Pid, Pid) {
        let mut s = Scheduler::new(&KernelConfig::default());
        let idle = s.admit(spec("sentinel", 6), ProcessRole::Idle).unwrap();
        let first = s.admit(spec("start1", 1), ProcessRole::First).unwrap();
        let sw = s.switch(0).unwrap();
        assert_eq!(sw, Switch { from: None, to: first });
        assert_eq!((s.idle(), s.first()), (Some(idle), Some(first)));
        (s, idle, first)
    }
}
