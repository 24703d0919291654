//! Machine collaborators the scheduler core relies on.
//!
//! The core never looks inside an execution context. It asks the
//! [`Machine`] for a new context bound to a stack and a trampoline, and
//! later asks it to transfer control from one context to another.

pub mod clock;
pub mod host;
pub mod psr;

use std::any::Any;
use std::sync::Arc;

pub use clock::{Clock, ManualClock, SystemClock};
pub use host::HostMachine;
pub use psr::Psr;

/// Code a fresh context runs the first time it is resumed.
pub type Trampoline = Box<dyn FnOnce() + Send + 'static>;

/// An opaque saved execution context.
pub trait ExecContext: Send + Sync {
    /// Let this context run (or continue running).
    fn resume(&self);

    /// Park the calling context until somebody resumes it again.
    fn suspend(&self);

    /// End the calling context for good and resume `to`. The caller's stack
    /// is unwound with [`ExitUnwind`] and its machine resources released.
    fn exit_to(&self, to: &dyn ExecContext) -> !;
}

/// The simulated CPU: context creation, control transfer, time and halt.
pub trait Machine: Send + Sync {
    /// Create a context with a dedicated stack of `stack_size` bytes that
    /// starts executing `entry` when first resumed.
    fn init_context(
        &self,
        name: &str,
        stack_size: usize,
        entry: Trampoline,
    ) -> Result<Arc<dyn ExecContext>, ContextError>;

    /// Save the caller's context and resume `to`. Returns on the outgoing
    /// side only once that context is chosen again.
    fn transfer(&self, from: Option<&dyn ExecContext>, to: &dyn ExecContext) {
        to.resume();
        if let Some(from) = from {
            from.suspend();
        }
    }

    /// Resume `to` and retire `from`, which must be the calling context.
    fn exit(&self, from: &dyn ExecContext, to: &dyn ExecContext) -> ! {
        from.exit_to(to)
    }

    /// Monotonic microsecond counter.
    fn now(&self) -> u64;

    /// Block until the next external interrupt is due.
    fn wait_interrupt(&self);

    /// Stop the machine. Every suspended context is torn down and the
    /// calling context never continues.
    fn halt(&self) -> !;

    /// Block a non-context thread until [`Machine::halt`] has been called
    /// and every context has finished.
    fn wait_halted(&self);
}

/// Unwind payload used to tear down a context's stack on halt.
#[derive(Debug)]
pub struct HaltUnwind;

/// Unwind payload used to end a context whose process has quit.
#[derive(Debug)]
pub struct ExitUnwind;

/// Whether a caught unwind payload is the machine tearing a context down,
/// either on halt or because its process quit.
pub fn is_teardown_unwind(payload: &(dyn Any + Send)) -> bool {
    payload.is::<HaltUnwind>() || payload.is::<ExitUnwind>()
}

/// Context creation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextError(pub String);

impl core::fmt::Display for ContextError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "context init failed: {}", self.0)
    }
}
