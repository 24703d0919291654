//! Kernel error types.
//!
//! Two tiers: a [`KernelFault`] is a broken contract or invariant and
//! halts the machine; everything else is an ordinary outcome returned to
//! the calling process.

use crate::task::ready::PriorityOutOfRange;
use crate::task::table::AllocError;
use crate::task::Pid;

// ─── Fatal ───────────────────────────────────────────────────────

/// A contract violation by the calling process or a broken kernel
/// invariant. Raising one halts the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelFault {
    /// A kernel operation was called in user mode.
    UserMode { op: &'static str },
    InvalidPriority(i32),
    InvalidStackSize(usize),
    InvalidName,
    InvalidArgument,
    /// No slot for a process the kernel itself needs.
    TableFull,
    /// `quit` while some child has not quit.
    QuitWithLiveChildren { pid: Pid, live: usize },
    ZapMissing(Pid),
    ZapSelf(Pid),
    ZapQuit(Pid),
    /// `block_me` with a code that collides with reserved statuses.
    InvalidBlockCode(i32),
    /// Not even the idle monitor is runnable.
    ReadyQueueExhausted,
    /// A process operation ran with no current process.
    NoCurrentProcess,
    ContextInit(String),
    ProcessPanicked { pid: Pid, message: String },
    /// A quitting process was scheduled again.
    QuitReturned(Pid),
    Corrupted(&'static str),
}

impl From<AllocError> for KernelFault {
    fn from(e: AllocError) -> Self {
        match e {
            AllocError::CapacityExceeded => KernelFault::TableFull,
            AllocError::InvalidPriority(p) => KernelFault::InvalidPriority(p),
            AllocError::InvalidStackSize(s) => KernelFault::InvalidStackSize(s),
            AllocError::InvalidName => KernelFault::InvalidName,
            AllocError::InvalidArgument => KernelFault::InvalidArgument,
        }
    }
}

impl From<PriorityOutOfRange> for KernelFault {
    fn from(e: PriorityOutOfRange) -> Self {
        log::error!("ready queue: {}", e);
        KernelFault::Corrupted("ready process at a priority the queue does not cover")
    }
}

impl core::fmt::Display for KernelFault {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            KernelFault::UserMode { op } => write!(f, "{}(): called while in user mode", op),
            KernelFault::InvalidPriority(p) => write!(f, "fork(): invalid priority {}", p),
            KernelFault::InvalidStackSize(s) => write!(f, "fork(): stack size {} too small", s),
            KernelFault::InvalidName => write!(f, "fork(): invalid process name"),
            KernelFault::InvalidArgument => write!(f, "fork(): start argument too long"),
            KernelFault::TableFull => write!(f, "fork(): no room in the process table"),
            KernelFault::QuitWithLiveChildren { pid, live } => {
                write!(f, "quit(): process {} attempting to quit with {} living children", pid, live)
            }
            KernelFault::ZapMissing(pid) => write!(f, "zap(): process {} does not exist", pid),
            KernelFault::ZapSelf(pid) => write!(f, "zap(): process {} tried to zap itself", pid),
            KernelFault::ZapQuit(pid) => write!(f, "zap(): process {} has already quit", pid),
            KernelFault::InvalidBlockCode(code) => {
                write!(f, "block_me(): status {} collides with a reserved status", code)
            }
            KernelFault::ReadyQueueExhausted => write!(f, "dispatcher: ready queue is empty"),
            KernelFault::NoCurrentProcess => write!(f, "no current process"),
            KernelFault::ContextInit(msg) => write!(f, "fork(): {}", msg),
            KernelFault::ProcessPanicked { pid, message } => {
                write!(f, "process {} panicked: {}", pid, message)
            }
            KernelFault::QuitReturned(pid) => write!(f, "quit(): process {} was resumed", pid),
            KernelFault::Corrupted(what) => write!(f, "corrupted kernel state: {}", what),
        }
    }
}

// ─── Expected outcomes ───────────────────────────────────────────

/// Recoverable `fork` failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkError {
    TableFull,
}

impl core::fmt::Display for ForkError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            ForkError::TableFull => write!(f, "process table full"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
    /// The caller has no children, live or quit.
    NoChildren,
    /// The caller was zapped while waiting.
    Zapped,
}

impl core::fmt::Display for JoinError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            JoinError::NoChildren => write!(f, "no children"),
            JoinError::Zapped => write!(f, "zapped while joining"),
        }
    }
}

/// The caller was zapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zapped;

impl core::fmt::Display for Zapped {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "zapped")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnblockError {
    /// Target missing, the caller itself, or not blocked by `block_me`.
    NotBlocked,
    /// The caller has been zapped; the target was left alone.
    Zapped,
}

impl core::fmt::Display for UnblockError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            UnblockError::NotBlocked => write!(f, "target is not blocked"),
            UnblockError::Zapped => write!(f, "caller was zapped"),
        }
    }
}

/// How a `zap` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZapOutcome {
    /// The target quit.
    Completed,
    /// The caller was itself zapped while waiting.
    WasZapped,
}

// ─── Boot ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootError {
    InvalidConfig(&'static str),
    /// A bootstrap process could not be created.
    Create { name: &'static str, fault: KernelFault },
    /// The first process could not be dispatched.
    Dispatch(KernelFault),
    /// The machine stopped without recording why.
    HaltLost,
}

impl core::fmt::Display for BootError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            BootError::InvalidConfig(why) => write!(f, "invalid configuration: {}", why),
            BootError::Create { name, fault } => write!(f, "startup(): fork of {} failed: {}", name, fault),
            BootError::Dispatch(fault) => write!(f, "startup(): initial dispatch failed: {}", fault),
            BootError::HaltLost => write!(f, "machine halted without a halt record"),
        }
    }
}
