//! Observer interface for later kernel phases.

use crate::task::Pid;

/// Notified of process lifecycle events. Every method defaults to a no-op.
///
/// Hooks run on the simulated CPU with the scheduler lock released, but
/// they must not call back into the [`Kernel`](crate::Kernel).
pub trait ProcessHooks: Send + Sync {
    /// `pid` was created and queued; runs before the creator may be preempted.
    fn forked(&self, _pid: Pid) {}

    /// `pid` quit; runs before the dispatcher picks its successor.
    fn quit(&self, _pid: Pid) {}

    /// Control is about to pass from `from` to `to`.
    fn switched(&self, _from: Option<Pid>, _to: Pid) {}
}
