//! coopkernel
//!
//! A cooperative, priority-driven process scheduler for a teaching kernel,
//! running on a simulated single-CPU machine:
//! - fixed-capacity process table with monotonically increasing pids
//! - strict-priority ready queue, round-robin within a level
//! - fork / quit / join / zap / block_me / unblock_proc / time_slice
//! - an idle monitor that detects shutdown and deadlock
//!
//! Every process runs on its own execution context; only one of them
//! makes progress at any time and control changes hands only inside the
//! dispatcher.

pub mod arch;
pub mod config;
pub mod console;
pub mod error;
pub mod kernel;
pub mod task;

pub use config::KernelConfig;
pub use error::{BootError, ForkError, JoinError, KernelFault, UnblockError, ZapOutcome, Zapped};
pub use kernel::hooks::ProcessHooks;
pub use kernel::{Halt, HaltReason, InterruptHandler, Kernel};
pub use task::dump::{DumpRow, ProcessDump};
pub use task::{EntryFn, Pid, Status};
