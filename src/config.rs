//! Kernel tunables.
//!
//! Defaults reproduce the classic phase-1 limits: a 50-slot process
//! table, priorities 1 (most urgent) through 5 with the idle monitor
//! alone at 6, and an 80 ms time slice.

use std::sync::Arc;

use crate::arch::clock::{Clock, SystemClock};
use crate::kernel::hooks::ProcessHooks;

/// Number of slots in the process table.
pub const MAX_PROCS: usize = 50;
/// Longest accepted process name, in bytes.
pub const MAX_NAME_LEN: usize = 50;
/// Longest accepted start argument, in bytes.
pub const MAX_ARG_LEN: usize = 100;
/// Smallest stack a process may be created with.
pub const MIN_STACK: usize = 80 * 1024;
/// Most urgent ordinary priority.
pub const HIGHEST_PRIORITY: i32 = 1;
/// Least urgent ordinary priority.
pub const LOWEST_PRIORITY: i32 = 5;
/// Quantum after which `time_slice` yields the CPU.
pub const TIME_SLICE_US: u64 = 80_000;
/// Period of the simulated clock interrupt the idle monitor waits for.
pub const IDLE_TICK_US: u64 = 20_000;

/// Runtime configuration handed to [`Kernel::boot`](crate::Kernel::boot).
#[derive(Clone)]
pub struct KernelConfig {
    pub max_procs: usize,
    pub max_name_len: usize,
    pub max_arg_len: usize,
    pub min_stack: usize,
    pub highest_priority: i32,
    pub lowest_priority: i32,
    pub time_slice_us: u64,
    pub idle_tick_us: u64,
    pub clock: Arc<dyn Clock>,
    pub hooks: Option<Arc<dyn ProcessHooks>>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            max_procs: MAX_PROCS,
            max_name_len: MAX_NAME_LEN,
            max_arg_len: MAX_ARG_LEN,
            min_stack: MIN_STACK,
            highest_priority: HIGHEST_PRIORITY,
            lowest_priority: LOWEST_PRIORITY,
            time_slice_us: TIME_SLICE_US,
            idle_tick_us: IDLE_TICK_US,
            clock: Arc::new(SystemClock),
            hooks: None,
        }
    }
}

impl KernelConfig {
    /// Priority reserved for the idle monitor, one below the least urgent
    /// ordinary priority.
    pub fn idle_priority(&self) -> i32 {
        self.lowest_priority + 1
    }

    pub fn with_max_procs(mut self, max_procs: usize) -> Self {
        self.max_procs = max_procs;
        self
    }

    pub fn with_time_slice_us(mut self, time_slice_us: u64) -> Self {
        self.time_slice_us = time_slice_us;
        self
    }

    pub fn with_idle_tick_us(mut self, idle_tick_us: u64) -> Self {
        self.idle_tick_us = idle_tick_us;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ProcessHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Check the tunables for values the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.max_procs < 2 {
            return Err("process table needs room for the idle monitor and the first process");
        }
        if self.highest_priority > self.lowest_priority {
            return Err("highest priority must not be numerically above the lowest");
        }
        if self.min_stack == 0 {
            return Err("minimum stack size must be non-zero");
        }
        Ok(())
    }
}

impl core::fmt::Debug for KernelConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("KernelConfig")
            .field("max_procs", &self.max_procs)
            .field("max_name_len", &self.max_name_len)
            .field("max_arg_len", &self.max_arg_len)
            .field("min_stack", &self.min_stack)
            .field("highest_priority", &self.highest_priority)
            .field("lowest_priority", &self.lowest_priority)
            .field("time_slice_us", &self.time_slice_us)
            .field("idle_tick_us", &self.idle_tick_us)
            .field("hooks", &self.hooks.is_some())
            .finish_non_exhaustive()
    }
}
