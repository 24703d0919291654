//! Process state transitions.
//!
//! Each method is the bookkeeping half of a lifecycle operation. The
//! kernel runs it under the scheduler lock and dispatches afterwards when
//! the caller gave up the CPU.

use super::relations;
use super::scheduler::Scheduler;
use super::{BlockCode, Pid, Status};
use crate::error::{KernelFault, UnblockError, ZapOutcome};

/// Result of one attempt to join a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStep {
    Joined { child: Pid, code: i32 },
    NoChildren,
    /// No child has quit yet; the caller is now `BlockedJoin`.
    Blocked,
}

impl Scheduler {
    /// Mark the current process as quit with `code`.
    ///
    /// Notifies the parent (waking it if it is joining), releases every
    /// zapper and frees quit children nobody will join any more.
    pub fn quit_current(&mut self, code: i32) -> Result<Pid, KernelFault> {
        let pid = self.current_pid()?;
        let live = relations::live_children(&self.table, pid);
        if !live.is_empty() {
            return Err(KernelFault::QuitWithLiveChildren {
                pid,
                live: live.len(),
            });
        }

        let me = self.record_mut(pid)?;
        me.status = Status::Quit;
        me.exit_code = Some(code);
        let parent = me.parent;

        if let Some(parent) = parent {
            relations::record_quit(&mut self.table, parent, pid);
            let joining = self
                .table
                .get(parent)
                .map_or(false, |p| p.status == Status::BlockedJoin);
            if joining {
                self.make_ready(parent)?;
            }
        }
        relations::release_zappers(&mut self.table, &mut self.ready, pid)?;
        relations::release_unjoined(&mut self.table, pid);
        Ok(pid)
    }

    /// Collect the earliest-quit child of the current process, or block.
    pub fn join_step(&mut self) -> Result<JoinStep, KernelFault> {
        let pid = self.current_pid()?;
        let me = self.record_mut(pid)?;
        if me.children.is_empty() {
            return Ok(JoinStep::NoChildren);
        }
        let Some(child) = me.quit_children.pop_front() else {
            me.status = Status::BlockedJoin;
            return Ok(JoinStep::Blocked);
        };

        let corpse = self.record_mut(child)?;
        corpse.status = Status::Dead;
        let code = corpse
            .exit_code
            .ok_or(KernelFault::Corrupted("quit child without exit code"))?;
        relations::reap_dead_children(&mut self.table, pid);
        Ok(JoinStep::Joined { child, code })
    }

    /// Register the current process as a zapper of `target` and block it.
    pub fn begin_zap(&mut self, target: Pid) -> Result<Pid, KernelFault> {
        let me = self.current_pid()?;
        let t = self
            .table
            .lookup(target)
            .ok_or(KernelFault::ZapMissing(target))?;
        if target == me {
            return Err(KernelFault::ZapSelf(me));
        }
        if t.status.has_quit() {
            return Err(KernelFault::ZapQuit(target));
        }

        relations::register_zapper(&mut self.table, target, me);
        self.record_mut(me)?.status = Status::BlockedZap;
        Ok(me)
    }

    /// Re-evaluate a zap after the zapper was resumed. `None` means keep
    /// waiting; the zapper has been put back into `BlockedZap`.
    pub fn zap_progress(&mut self, target: Pid) -> Result<Option<ZapOutcome>, KernelFault> {
        let me = self.current_pid()?;
        if self.record(me)?.zapped {
            return Ok(Some(ZapOutcome::WasZapped));
        }
        let target_done = self
            .table
            .get(target)
            .map_or(true, |t| t.status.has_quit());
        if target_done {
            return Ok(Some(ZapOutcome::Completed));
        }
        self.record_mut(me)?.status = Status::BlockedZap;
        Ok(None)
    }

    /// Block the current process with `code`. Returns false, without
    /// blocking, if it has already been zapped.
    pub fn block_current(&mut self, code: BlockCode) -> Result<bool, KernelFault> {
        let me = self.current_record_mut()?;
        if me.zapped {
            return Ok(false);
        }
        me.status = Status::BlockedCustom(code);
        Ok(true)
    }

    /// Make a process blocked by `block_me` ready again on behalf of
    /// `caller`. The outer error is a broken kernel invariant, the inner
    /// one is reported to the caller.
    pub fn unblock(
        &mut self,
        caller: Pid,
        target: Pid,
    ) -> Result<Result<(), UnblockError>, KernelFault> {
        let blocked = self
            .table
            .lookup(target)
            .map_or(false, |t| matches!(t.status, Status::BlockedCustom(_)));
        if target == caller || !blocked {
            return Ok(Err(UnblockError::NotBlocked));
        }
        if self.table.get(caller).map_or(false, |c| c.zapped) {
            return Ok(Err(UnblockError::Zapped));
        }
        self.make_ready(target)?;
        Ok(Ok(()))
    }
}
