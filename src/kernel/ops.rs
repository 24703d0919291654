//! Lifecycle and bookkeeping operations available to processes.

use std::sync::Arc;

use super::{InterruptHandler, Kernel};
use crate::error::{ForkError, JoinError, KernelFault, UnblockError, ZapOutcome, Zapped};
use crate::task::dump::ProcessDump;
use crate::task::lifecycle::JoinStep;
use crate::task::scheduler::ProcessRole;
use crate::task::{BlockCode, EntryFn, Pid, ProcessSpec};

impl Kernel {
    /// Create a child of the caller running `entry(arg)` at `priority`.
    ///
    /// The dispatcher runs before this returns, so a more urgent child
    /// runs first. Invalid arguments halt the machine; only a full table
    /// is reported back.
    pub fn fork(
        &self,
        name: &str,
        entry: EntryFn,
        arg: &str,
        stack_size: usize,
        priority: i32,
    ) -> Result<Pid, ForkError> {
        self.require_kernel_mode("fork");
        if priority == self.shared.config.idle_priority() {
            self.fatal(KernelFault::InvalidPriority(priority));
        }

        let spec = ProcessSpec::new(name, entry, arg, stack_size, priority);
        let pid = match self.create(spec, ProcessRole::Ordinary) {
            Ok(pid) => pid,
            Err(KernelFault::TableFull) => {
                log::warn!("fork(): no room for {}", name);
                return Err(ForkError::TableFull);
            }
            Err(fault) => self.fatal(fault),
        };
        log::debug!("fork(): created {} '{}' at priority {}", pid, name, priority);

        self.notify(|h| h.forked(pid));
        self.dispatch();
        Ok(pid)
    }

    /// Terminate the caller with `code`. Every child must have quit.
    pub fn quit(&self, code: i32) -> ! {
        self.require_kernel_mode("quit");
        let quitting = self.shared.sched.lock().quit_current(code);
        let pid = quitting.unwrap_or_else(|fault| self.fatal(fault));
        log::debug!("quit(): process {} exited with {}", pid, code);

        self.notify(|h| h.quit(pid));
        self.exit_current()
    }

    /// Wait for a child to quit and collect its exit code. Children are
    /// joined in the order they quit.
    pub fn join(&self) -> Result<(Pid, i32), JoinError> {
        self.require_kernel_mode("join");
        loop {
            let step = self.shared.sched.lock().join_step();
            match step.unwrap_or_else(|fault| self.fatal(fault)) {
                JoinStep::NoChildren => return Err(JoinError::NoChildren),
                JoinStep::Joined { child, code } => {
                    log::debug!("join(): collected {} with status {}", child, code);
                    return Ok((child, code));
                }
                JoinStep::Blocked => {
                    self.dispatch();
                    if self.current_zapped() {
                        return Err(JoinError::Zapped);
                    }
                }
            }
        }
    }

    /// Mark `target` as zapped and wait until it quits.
    pub fn zap(&self, target: Pid) -> ZapOutcome {
        self.require_kernel_mode("zap");
        let begun = self.shared.sched.lock().begin_zap(target);
        let me = begun.unwrap_or_else(|fault| self.fatal(fault));
        log::debug!("zap(): process {} waits for {} to quit", me, target);

        loop {
            self.dispatch();
            let progress = self.shared.sched.lock().zap_progress(target);
            if let Some(outcome) = progress.unwrap_or_else(|fault| self.fatal(fault)) {
                log::debug!("zap(): process {} done waiting for {}: {:?}", me, target, outcome);
                return outcome;
            }
        }
    }

    /// Whether some process has zapped the caller.
    pub fn is_zapped(&self) -> bool {
        self.require_kernel_mode("is_zapped");
        self.current_zapped()
    }

    fn current_zapped(&self) -> bool {
        let zapped = self.shared.sched.lock().current_record().map(|p| p.zapped);
        zapped.unwrap_or_else(|fault| self.fatal(fault))
    }

    /// Block the caller with `new_status` until another process unblocks
    /// it. `new_status` must be above the reserved status range.
    pub fn block_me(&self, new_status: i32) -> Result<(), Zapped> {
        self.require_kernel_mode("block_me");
        let code = BlockCode::new(new_status)
            .unwrap_or_else(|| self.fatal(KernelFault::InvalidBlockCode(new_status)));

        let blocked = self.shared.sched.lock().block_current(code);
        if !blocked.unwrap_or_else(|fault| self.fatal(fault)) {
            return Err(Zapped);
        }
        log::debug!("block_me(): blocked with status {}", new_status);
        self.dispatch();

        if self.current_zapped() {
            Err(Zapped)
        } else {
            Ok(())
        }
    }

    /// Make `pid`, blocked by [`Kernel::block_me`], ready again and let the
    /// dispatcher choose between it and the caller.
    pub fn unblock_proc(&self, pid: Pid) -> Result<(), UnblockError> {
        self.require_kernel_mode("unblock_proc");
        let outcome = {
            let mut sched = self.shared.sched.lock();
            sched.current_pid().and_then(|me| sched.unblock(me, pid))
        };
        outcome.unwrap_or_else(|fault| self.fatal(fault))?;
        log::debug!("unblock_proc(): process {} is ready", pid);

        self.dispatch();
        Ok(())
    }

    /// Yield if the caller has used up its time slice.
    pub fn time_slice(&self) {
        self.require_kernel_mode("time_slice");
        let now = self.shared.machine.now();
        let expired = self.shared.sched.lock().quantum_expired(now);
        if expired.unwrap_or_else(|fault| self.fatal(fault)) {
            log::trace!("time_slice(): quantum expired");
            self.dispatch();
        }
    }

    pub fn getpid(&self) -> Pid {
        self.require_kernel_mode("getpid");
        let pid = self.shared.sched.lock().current_pid();
        pid.unwrap_or_else(|fault| self.fatal(fault))
    }

    /// Clock value, in microseconds, when the caller's quantum began.
    pub fn read_cur_start_time(&self) -> u64 {
        self.require_kernel_mode("read_cur_start_time");
        let start = self.shared.sched.lock().current_record().map(|p| p.quantum_start);
        start.unwrap_or_else(|fault| self.fatal(fault))
    }

    /// CPU time consumed by the caller in milliseconds, including the
    /// running quantum.
    pub fn read_time(&self) -> u64 {
        self.require_kernel_mode("read_time");
        let now = self.shared.machine.now();
        let used = {
            let sched = self.shared.sched.lock();
            sched
                .current_pid()
                .and_then(|pid| {
                    sched
                        .cpu_time_us(pid, now)
                        .ok_or(KernelFault::Corrupted("current process has no record"))
                })
        };
        used.unwrap_or_else(|fault| self.fatal(fault)) / 1_000
    }

    /// Print the process table to the console and return it.
    pub fn dump_processes(&self) -> ProcessDump {
        self.require_kernel_mode("dump_processes");
        let now = self.shared.machine.now();
        let dump = self.shared.sched.lock().dump(now);
        crate::kprint!("{}", dump);
        dump
    }

    /// Register `handler` to run after every clock tick the idle monitor
    /// waits for. A blocked first process can only be woken by one.
    pub fn register_interrupt_handler(&self, handler: InterruptHandler) {
        self.require_kernel_mode("register_interrupt_handler");
        self.shared.handlers.lock().push(handler);
    }

    /// Convenience wrapper around [`Kernel::register_interrupt_handler`].
    pub fn on_interrupt(&self, handler: impl Fn(&Kernel) + Send + Sync + 'static) {
        self.register_interrupt_handler(Arc::new(handler));
    }

    pub fn enable_interrupts(&self) {
        self.require_kernel_mode("enable_interrupts");
        self.update_psr(|psr| psr.with_interrupts(true));
    }

    pub fn disable_interrupts(&self) {
        self.require_kernel_mode("disable_interrupts");
        self.update_psr(|psr| psr.with_interrupts(false));
    }

    /// Drop the caller to user mode. Kernel operations called afterwards
    /// halt the machine.
    pub fn enter_user_mode(&self) {
        self.update_psr(|psr| psr.with_user_mode());
    }
}
