//! Parent/child, quit-child and zapper relations between records.
//!
//! Relations are pid lists stored in the records themselves. A pid whose
//! record is gone simply stops resolving, so a stale link can never reach
//! a reused slot.

use super::ready::ReadyQueue;
use super::scheduler::wake;
use super::table::ProcTable;
use super::{Pid, Status};
use crate::error::KernelFault;

/// Record `child` as the youngest child of `parent`.
pub fn attach_child(table: &mut ProcTable, parent: Pid, child: Pid) {
    if let Some(p) = table.get_mut(parent) {
        p.children.push(child);
    }
    if let Some(c) = table.get_mut(child) {
        c.parent = Some(parent);
    }
}

/// Forget `child` entirely. Used when a creation is rolled back.
pub fn detach_child(table: &mut ProcTable, parent: Pid, child: Pid) {
    if let Some(p) = table.get_mut(parent) {
        p.children.retain(|c| *c != child);
        p.quit_children.retain(|c| *c != child);
    }
}

/// Queue `child` for joining; earliest quitter is joined first.
pub fn record_quit(table: &mut ProcTable, parent: Pid, child: Pid) {
    if let Some(p) = table.get_mut(parent) {
        p.quit_children.push_back(child);
    }
}

/// Drop `Dead` children from `parent`'s list and free their slots.
pub fn reap_dead_children(table: &mut ProcTable, parent: Pid) -> usize {
    let dead: Vec<Pid> = match table.get(parent) {
        Some(p) => p
            .children
            .iter()
            .copied()
            .filter(|c| table.get(*c).map_or(true, |c| c.status == Status::Dead))
            .collect(),
        None => return 0,
    };
    if let Some(p) = table.get_mut(parent) {
        p.children.retain(|c| !dead.contains(c));
    }
    for pid in &dead {
        table.reclaim(*pid);
    }
    dead.len()
}

/// Children of `parent` that have not quit yet.
pub fn live_children(table: &ProcTable, parent: Pid) -> Vec<Pid> {
    table
        .get(parent)
        .map(|p| {
            p.children
                .iter()
                .copied()
                .filter(|c| table.get(*c).map_or(false, |c| !c.status.has_quit()))
                .collect()
        })
        .unwrap_or_default()
}

/// Quit children of `parent` that were never joined. Nobody can join them
/// once `parent` itself quits, so they become `Dead` and are reaped.
pub fn release_unjoined(table: &mut ProcTable, parent: Pid) -> usize {
    let unjoined: Vec<Pid> = match table.get_mut(parent) {
        Some(p) => p.quit_children.drain(..).collect(),
        None => return 0,
    };
    for pid in &unjoined {
        if let Some(child) = table.get_mut(*pid) {
            child.status = Status::Dead;
        }
    }
    reap_dead_children(table, parent)
}

/// `zapper` waits for `target` to quit; `target` is marked zapped.
pub fn register_zapper(table: &mut ProcTable, target: Pid, zapper: Pid) {
    if let Some(t) = table.get_mut(target) {
        t.zappers.push(zapper);
        t.zapped = true;
    }
}

/// Make every process waiting on `target` runnable again.
pub fn release_zappers(
    table: &mut ProcTable,
    ready: &mut ReadyQueue,
    target: Pid,
) -> Result<usize, KernelFault> {
    let zappers = match table.get_mut(target) {
        Some(t) => core::mem::take(&mut t.zappers),
        None => return Ok(0),
    };
    let mut released = 0;
    for zapper in zappers {
        let blocked = table
            .get(zapper)
            .map_or(false, |z| z.status == Status::BlockedZap);
        if blocked && wake(table, ready, zapper)? {
            released += 1;
        }
    }
    Ok(released)
}
