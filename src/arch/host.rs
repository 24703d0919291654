//! Host-thread implementation of the simulated CPU.
//!
//! Every execution context is a host thread parked on a baton. Resuming a
//! context hands it the baton; suspending waits for the baton to come
//! back. The dispatcher only ever hands the baton to one context at a
//! time, so exactly one context makes progress.
//!
//! A context whose process quits leaves the baton registry and unwinds with
//! [`ExitUnwind`], so its thread ends as soon as the next context runs.
//! Halting wakes every parked context with the halt flag raised. They
//! unwind their stacks with [`HaltUnwind`] and the boot thread joins them.

use core::sync::atomic::{AtomicBool, Ordering};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use spin::Mutex as SpinMutex;

use super::clock::Clock;
use super::{
    is_teardown_unwind, ContextError, ExecContext, ExitUnwind, HaltUnwind, Machine, Trampoline,
};

/// Host threads get at least this much stack regardless of what the
/// process asked for; formatting and unwinding need headroom.
pub const HOST_STACK_FLOOR: usize = 256 * 1024;

fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A one-slot handoff: granted by `resume`, consumed by `acquire`.
struct Baton {
    granted: Mutex<bool>,
    signal: Condvar,
}

impl Baton {
    fn new() -> Self {
        Baton {
            granted: Mutex::new(false),
            signal: Condvar::new(),
        }
    }

    fn grant(&self) {
        let mut granted = relock(&self.granted);
        *granted = true;
        self.signal.notify_one();
    }

    /// Wait for the baton. Unwinds the calling thread if the machine halts.
    fn acquire(&self, halted: &AtomicBool) {
        let mut granted = relock(&self.granted);
        loop {
            if halted.load(Ordering::SeqCst) {
                drop(granted);
                panic::resume_unwind(Box::new(HaltUnwind));
            }
            if *granted {
                *granted = false;
                return;
            }
            granted = self
                .signal
                .wait(granted)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn wake(&self) {
        let _granted = relock(&self.granted);
        self.signal.notify_all();
    }
}

struct HostShared {
    halted: AtomicBool,
    batons: SpinMutex<Vec<Arc<Baton>>>,
    threads: SpinMutex<Vec<JoinHandle<()>>>,
    stopped: Mutex<bool>,
    stopped_signal: Condvar,
}

impl HostShared {
    fn forget(&self, baton: &Arc<Baton>) {
        self.batons.lock().retain(|b| !Arc::ptr_eq(b, baton));
    }
}

/// A context backed by one host thread.
pub struct HostContext {
    baton: Arc<Baton>,
    shared: Arc<HostShared>,
}

impl ExecContext for HostContext {
    fn resume(&self) {
        self.baton.grant();
    }

    fn suspend(&self) {
        self.baton.acquire(&self.shared.halted);
    }

    fn exit_to(&self, to: &dyn ExecContext) -> ! {
        self.shared.forget(&self.baton);
        to.resume();
        panic::resume_unwind(Box::new(ExitUnwind))
    }
}

/// The simulated CPU running on host threads.
pub struct HostMachine {
    shared: Arc<HostShared>,
    clock: Arc<dyn Clock>,
    tick: Duration,
}

impl HostMachine {
    pub fn new(clock: Arc<dyn Clock>, tick_us: u64) -> Self {
        HostMachine {
            shared: Arc::new(HostShared {
                halted: AtomicBool::new(false),
                batons: SpinMutex::new(Vec::new()),
                threads: SpinMutex::new(Vec::new()),
                stopped: Mutex::new(false),
                stopped_signal: Condvar::new(),
            }),
            clock,
            tick: Duration::from_micros(tick_us),
        }
    }

    pub fn is_halted(&self) -> bool {
        self.shared.halted.load(Ordering::SeqCst)
    }

    /// Contexts that have not exited yet.
    pub fn live_contexts(&self) -> usize {
        self.shared.batons.lock().len()
    }

    /// Host threads not yet reclaimed. Exited threads are dropped the next
    /// time a context is created.
    pub fn tracked_threads(&self) -> usize {
        self.shared.threads.lock().len()
    }
}

impl Machine for HostMachine {
    fn init_context(
        &self,
        name: &str,
        stack_size: usize,
        entry: Trampoline,
    ) -> Result<Arc<dyn ExecContext>, ContextError> {
        let baton = Arc::new(Baton::new());
        let shared = Arc::clone(&self.shared);
        let thread_baton = Arc::clone(&baton);

        let handle = thread::Builder::new()
            .name(name.to_string())
            .stack_size(stack_size.max(HOST_STACK_FLOOR))
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    thread_baton.acquire(&shared.halted);
                    entry();
                }));
                if let Err(payload) = outcome {
                    if !is_teardown_unwind(payload.as_ref()) {
                        log::error!("context thread died outside the kernel's control");
                    }
                }
            })
            .map_err(|e| ContextError(e.to_string()))?;

        self.shared.batons.lock().push(Arc::clone(&baton));
        let mut threads = self.shared.threads.lock();
        threads.retain(|h| !h.is_finished());
        threads.push(handle);
        drop(threads);

        Ok(Arc::new(HostContext {
            baton,
            shared: Arc::clone(&self.shared),
        }))
    }

    fn now(&self) -> u64 {
        self.clock.now()
    }

    fn wait_interrupt(&self) {
        thread::sleep(self.tick);
    }

    fn halt(&self) -> ! {
        self.shared.halted.store(true, Ordering::SeqCst);
        for baton in self.shared.batons.lock().iter() {
            baton.wake();
        }
        {
            let mut stopped = relock(&self.shared.stopped);
            *stopped = true;
            self.shared.stopped_signal.notify_all();
        }
        panic::resume_unwind(Box::new(HaltUnwind))
    }

    fn wait_halted(&self) {
        let mut stopped = relock(&self.shared.stopped);
        while !*stopped {
            stopped = self
                .shared
                .stopped_signal
                .wait(stopped)
                .unwrap_or_else(PoisonError::into_inner);
        }
        drop(stopped);

        let threads: Vec<JoinHandle<()>> = self.shared.threads.lock().drain(..).collect();
        for handle in threads {
            let _ = handle.join();
        }
        self.shared.batons.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::clock::ManualClock;

    #[test]
    fn contexts_take_turns_and_unwind_on_halt() {
        let machine = Arc::new(HostMachine::new(Arc::new(ManualClock::new()), 1));
        let log = Arc::new(SpinMutex::new(Vec::new()));

        let (log_a, machine_a) = (Arc::clone(&log), Arc::clone(&machine));
        let slot_b: Arc<SpinMutex<Option<Arc<dyn ExecContext>>>> = Arc::new(SpinMutex::new(None));
        let slot_a: Arc<SpinMutex<Option<Arc<dyn ExecContext>>>> = Arc::new(SpinMutex::new(None));

        let (b_for_a, a_for_a) = (Arc::clone(&slot_b), Arc::clone(&slot_a));
        let a = machine
            .init_context(
                "a",
                0,
                Box::new(move || {
                    log_a.lock().push("a1");
                    let me = a_for_a.lock().clone().unwrap();
                    let other = b_for_a.lock().clone().unwrap();
                    machine_a.transfer(Some(&*me), &*other);
                    log_a.lock().push("a2");
                    machine_a.halt();
                }),
            )
            .unwrap();

        let (log_b, machine_b) = (Arc::clone(&log), Arc::clone(&machine));
        let (a_for_b, b_for_b) = (Arc::clone(&slot_a), Arc::clone(&slot_b));
        let b = machine
            .init_context(
                "b",
                0,
                Box::new(move || {
                    log_b.lock().push("b1");
                    let me = b_for_b.lock().clone().unwrap();
                    let other = a_for_b.lock().clone().unwrap();
                    machine_b.transfer(Some(&*me), &*other);
                    log_b.lock().push("never");
                }),
            )
            .unwrap();

        *slot_a.lock() = Some(Arc::clone(&a));
        *slot_b.lock() = Some(Arc::clone(&b));

        machine.transfer(None, &*a);
        machine.wait_halted();

        assert!(machine.is_halted());
        assert_eq!(*log.lock(), vec!["a1", "b1", "a2"]);
    }

    #[test]
    fn exited_context_leaves_the_registry() {
        let machine = Arc::new(HostMachine::new(Arc::new(ManualClock::new()), 1));
        let seen = Arc::new(SpinMutex::new(Vec::new()));
        let slot_a: Arc<SpinMutex<Option<Arc<dyn ExecContext>>>> = Arc::new(SpinMutex::new(None));
        let slot_b: Arc<SpinMutex<Option<Arc<dyn ExecContext>>>> = Arc::new(SpinMutex::new(None));

        let (machine_a, a_for_a, b_for_a) =
            (Arc::clone(&machine), Arc::clone(&slot_a), Arc::clone(&slot_b));
        let a = machine
            .init_context(
                "a",
                0,
                Box::new(move || {
                    let me = a_for_a.lock().clone().unwrap();
                    let next = b_for_a.lock().clone().unwrap();
                    machine_a.exit(&*me, &*next);
                }),
            )
            .unwrap();

        let (machine_b, seen_b) = (Arc::clone(&machine), Arc::clone(&seen));
        let b = machine
            .init_context(
                "b",
                0,
                Box::new(move || {
                    seen_b.lock().push(machine_b.live_contexts());
                    machine_b.halt();
                }),
            )
            .unwrap();

        *slot_a.lock() = Some(Arc::clone(&a));
        *slot_b.lock() = Some(Arc::clone(&b));
        assert_eq!(machine.live_contexts(), 2);

        machine.transfer(None, &*a);
        machine.wait_halted();

        assert_eq!(*seen.lock(), vec![1]);
        assert_eq!(machine.tracked_threads(), 0);
    }
}
