//! The idle monitor.
//!
//! Runs at the reserved lowest priority, so it is only ever chosen when
//! no other process is ready. Each pass it decides whether the machine
//! is finished, deadlocked, or merely waiting for a device, and in the
//! last case sleeps until the next clock interrupt.

use super::{HaltReason, InterruptHandler, Kernel};
use crate::task::scheduler::IdleVerdict;

/// Entry function of the idle monitor process.
pub(super) fn sentinel(kernel: &Kernel, _arg: &str) -> i32 {
    kernel.idle_loop()
}

impl Kernel {
    fn idle_loop(&self) -> ! {
        log::debug!("sentinel: idle monitor running");
        loop {
            self.check_deadlock();
            self.wait_interrupt();
        }
    }

    fn check_deadlock(&self) {
        let handlers_registered = !self.shared.handlers.lock().is_empty();
        let verdict = self.shared.sched.lock().idle_verdict(handlers_registered);
        match verdict {
            IdleVerdict::Waiting => {}
            IdleVerdict::Shutdown => {
                log::info!("sentinel: all processes completed");
                self.halt(0, HaltReason::Shutdown)
            }
            IdleVerdict::Deadlock(blocked) => {
                log::error!("sentinel: deadlock detected, blocked: {:?}", blocked);
                self.halt(1, HaltReason::Deadlock { blocked })
            }
        }
    }

    /// Sleep one clock tick, then run the clock handler followed by every
    /// registered device handler.
    fn wait_interrupt(&self) {
        self.shared.machine.wait_interrupt();
        if !self.psr().interrupts_enabled() {
            return;
        }
        self.time_slice();

        let handlers: Vec<InterruptHandler> = self.shared.handlers.lock().clone();
        for handler in handlers {
            handler(self);
        }
    }
}
