//! Process-facing kernel operations.
//!
//! A [`Kernel`] is the handle every process entry function receives. All
//! operations act on the calling process, which is always the scheduler's
//! current process since only one context runs at a time.
//!
//! Locking discipline: the scheduler lock is taken for pure bookkeeping
//! and always released before a context transfer, a hook call or a halt.

pub mod hooks;
mod ops;
mod sentinel;

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use spin::Mutex;

use crate::arch::{is_teardown_unwind, HostMachine, Machine, Psr, Trampoline};
use crate::config::KernelConfig;
use crate::error::{BootError, KernelFault};
use crate::task::scheduler::{ProcessRole, Scheduler};
use crate::task::{EntryFn, Pid, ProcessSpec};
use hooks::ProcessHooks;

/// Device interrupt handler, run by the idle monitor after each clock tick.
pub type InterruptHandler = Arc<dyn Fn(&Kernel) + Send + Sync>;

/// Why the machine stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    /// Every process finished.
    Shutdown,
    /// Live processes remained with nothing able to run.
    Deadlock { blocked: Vec<Pid> },
    Fault(KernelFault),
}

/// Final state of a booted machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Halt {
    pub code: i32,
    pub reason: HaltReason,
}

impl Halt {
    pub fn is_clean(&self) -> bool {
        self.code == 0 && self.reason == HaltReason::Shutdown
    }
}

impl core::fmt::Display for Halt {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match &self.reason {
            HaltReason::Shutdown => write!(f, "halted ({}): all processes completed", self.code),
            HaltReason::Deadlock { blocked } => {
                write!(f, "halted ({}): deadlock, blocked processes:", self.code)?;
                for pid in blocked {
                    write!(f, " {}", pid)?;
                }
                Ok(())
            }
            HaltReason::Fault(fault) => write!(f, "halted ({}): {}", self.code, fault),
        }
    }
}

struct Shared {
    sched: Mutex<Scheduler>,
    machine: Arc<dyn Machine>,
    config: KernelConfig,
    handlers: Mutex<Vec<InterruptHandler>>,
    halt: Mutex<Option<Halt>>,
}

/// Handle to the running kernel, passed to every process.
pub struct Kernel {
    shared: Arc<Shared>,
}

impl Kernel {
    /// Boot a kernel on host threads and run `start1` as the first process.
    ///
    /// Blocks until the machine halts and returns why it did.
    pub fn boot(config: KernelConfig, start1: EntryFn) -> Result<Halt, BootError> {
        let machine = Arc::new(HostMachine::new(
            Arc::clone(&config.clock),
            config.idle_tick_us,
        ));
        Kernel::boot_on(machine, config, start1)
    }

    /// Like [`Kernel::boot`], on a caller-supplied machine.
    pub fn boot_on(
        machine: Arc<dyn Machine>,
        config: KernelConfig,
        start1: EntryFn,
    ) -> Result<Halt, BootError> {
        config.validate().map_err(BootError::InvalidConfig)?;
        log::info!(
            "startup(): {} slots, priorities {}..={}, time slice {} us",
            config.max_procs,
            config.highest_priority,
            config.lowest_priority,
            config.time_slice_us
        );

        let min_stack = config.min_stack;
        let idle_priority = config.idle_priority();
        let highest = config.highest_priority;
        let kernel = Kernel {
            shared: Arc::new(Shared {
                sched: Mutex::new(Scheduler::new(&config)),
                machine,
                config,
                handlers: Mutex::new(Vec::new()),
                halt: Mutex::new(None),
            }),
        };

        let idle_entry: EntryFn = Arc::new(sentinel::sentinel);
        let idle = ProcessSpec::new("sentinel", idle_entry, "", min_stack, idle_priority);
        kernel
            .create(idle, ProcessRole::Idle)
            .map_err(|fault| BootError::Create { name: "sentinel", fault })?;

        let first = ProcessSpec::new("start1", start1, "", 2 * min_stack, highest);
        let first = kernel
            .create(first, ProcessRole::First)
            .map_err(|fault| BootError::Create { name: "start1", fault })?;
        kernel.notify(|h| h.forked(first));

        kernel.start().map_err(BootError::Dispatch)?;
        kernel.shared.machine.wait_halted();

        let halt = kernel.shared.halt.lock().take();
        halt.ok_or(BootError::HaltLost)
    }

    /// Allocate a record for `spec` and give it an execution context.
    fn create(&self, spec: ProcessSpec, role: ProcessRole) -> Result<Pid, KernelFault> {
        let name = spec.name.clone();
        let stack_size = spec.stack_size;

        let mut sched = self.shared.sched.lock();
        let pid = sched.admit(spec, role)?;
        let shared = Arc::downgrade(&self.shared);
        let trampoline: Trampoline = Box::new(move || launch(shared, pid));
        match self.shared.machine.init_context(&name, stack_size, trampoline) {
            Ok(context) => {
                sched.attach_context(pid, context)?;
                Ok(pid)
            }
            Err(e) => {
                sched.discard(pid);
                Err(KernelFault::ContextInit(e.to_string()))
            }
        }
    }

    /// Hand the CPU to the first process. Runs on the boot thread, which is
    /// not a context and so is never suspended.
    fn start(&self) -> Result<(), KernelFault> {
        let now = self.shared.machine.now();
        let (to, context) = {
            let mut sched = self.shared.sched.lock();
            let to = sched.switch(now)?.to;
            (to, sched.context_of(to)?)
        };
        self.notify(|h| h.switched(None, to));
        self.shared.machine.transfer(None, &*context);
        Ok(())
    }

    /// Give the CPU to the most urgent ready process. Returns once the
    /// caller is chosen again, immediately if it is chosen right away.
    pub(crate) fn dispatch(&self) {
        let now = self.shared.machine.now();
        let step = {
            let mut sched = self.shared.sched.lock();
            sched.switch(now).and_then(|sw| {
                if sw.is_noop() {
                    return Ok((sw, None));
                }
                let to = sched.context_of(sw.to)?;
                let from = match sw.from {
                    Some(pid) => Some(sched.context_of(pid)?),
                    None => None,
                };
                Ok((sw, Some((from, to))))
            })
        };
        let (sw, contexts) = step.unwrap_or_else(|fault| self.fatal(fault));
        let Some((from, to)) = contexts else {
            return;
        };

        log::trace!("dispatcher: {:?} -> {}", sw.from, sw.to);
        self.notify(|h| h.switched(sw.from, sw.to));
        self.shared.machine.transfer(from.as_deref(), &*to);
    }

    /// Switch away from a process that has quit and end its context. The
    /// host resources behind it are released; only the record stays until
    /// the parent joins.
    pub(crate) fn exit_current(&self) -> ! {
        let now = self.shared.machine.now();
        let step = {
            let mut sched = self.shared.sched.lock();
            sched.switch(now).and_then(|sw| match sw.from {
                Some(from) if !sw.is_noop() => {
                    Ok((sw, sched.context_of(from)?, sched.context_of(sw.to)?))
                }
                Some(from) => Err(KernelFault::QuitReturned(from)),
                None => Err(KernelFault::NoCurrentProcess),
            })
        };
        let (sw, from, to) = step.unwrap_or_else(|fault| self.fatal(fault));

        log::trace!("dispatcher: {:?} exits -> {}", sw.from, sw.to);
        self.notify(|h| h.switched(sw.from, sw.to));
        self.shared.machine.exit(&*from, &*to)
    }

    /// Report a broken contract and stop the machine.
    pub(crate) fn fatal(&self, fault: KernelFault) -> ! {
        log::error!("{}", fault);
        self.halt(1, HaltReason::Fault(fault))
    }

    /// Record the first halt reason and stop the machine.
    fn halt(&self, code: i32, reason: HaltReason) -> ! {
        {
            let mut slot = self.shared.halt.lock();
            if slot.is_none() {
                *slot = Some(Halt { code, reason });
            }
        }
        self.shared.machine.halt()
    }

    fn notify(&self, event: impl FnOnce(&dyn ProcessHooks)) {
        if let Some(hooks) = &self.shared.config.hooks {
            event(hooks.as_ref());
        }
    }

    /// Halt with `UserMode` unless the caller runs in kernel mode.
    fn require_kernel_mode(&self, op: &'static str) {
        let check = self.shared.sched.lock().current_record().and_then(|p| {
            if p.psr.in_kernel_mode() {
                Ok(())
            } else {
                Err(KernelFault::UserMode { op })
            }
        });
        check.unwrap_or_else(|fault| self.fatal(fault));
    }

    /// Status word of the caller.
    pub fn psr(&self) -> Psr {
        let psr = self.shared.sched.lock().current_record().map(|p| p.psr);
        psr.unwrap_or_else(|fault| self.fatal(fault))
    }

    fn update_psr(&self, change: impl FnOnce(Psr) -> Psr) {
        let updated = self.shared.sched.lock().current_record_mut().map(|p| {
            p.psr = change(p.psr);
        });
        updated.unwrap_or_else(|fault| self.fatal(fault));
    }

    pub fn config(&self) -> &KernelConfig {
        &self.shared.config
    }
}

/// First code run on a fresh context: enable interrupts, run the entry
/// function and quit with its return value.
fn launch(shared: Weak<Shared>, pid: Pid) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let kernel = Kernel { shared };

    let start = kernel.shared.sched.lock().record_mut(pid).map(|p| {
        p.psr = p.psr.with_interrupts(true);
        (Arc::clone(&p.entry), p.arg.clone())
    });
    let (entry, arg) = start.unwrap_or_else(|fault| kernel.fatal(fault));

    log::debug!("launch(): starting process {}", pid);
    match panic::catch_unwind(AssertUnwindSafe(|| entry(&kernel, arg.as_str()))) {
        Ok(code) => kernel.quit(code),
        Err(payload) if is_teardown_unwind(payload.as_ref()) => panic::resume_unwind(payload),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            kernel.fatal(KernelFault::ProcessPanicked { pid, message })
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        String::from(*s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("non-string panic payload")
    }
}
