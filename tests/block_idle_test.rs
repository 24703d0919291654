//! block_me / unblock_proc and idle monitor integration tests.

mod common;

use std::sync::Arc;

use coopkernel::{HaltReason, KernelFault, UnblockError};
use common::{entry, run, Trace, MIN_STACK};
use spin::Mutex;

#[test]
fn test_unblocked_process_runs_before_less_urgent_unblocker_continues() {
    let trace = Trace::new();
    let t = Arc::clone(&trace);
    let halt = run(move |k, _| {
        let tb = Arc::clone(&t);
        let sleeper = k
            .fork("sleeper", entry(move |k, _| {
                tb.push("sleeper blocks");
                let woke = k.block_me(20);
                tb.push(format!("sleeper woke: {:?}", woke));
                0
            }), "", MIN_STACK, 2)
            .unwrap();

        let tu = Arc::clone(&t);
        k.fork("waker", entry(move |k, _| {
            tu.push("waker unblocks");
            let result = k.unblock_proc(sleeper);
            tu.push(format!("waker done: {:?}", result));
            0
        }), "", MIN_STACK, 3)
            .unwrap();

        while k.join().is_ok() {}
        0
    });

    assert!(halt.is_clean(), "unexpected halt: {}", halt);
    assert_eq!(
        trace.events(),
        vec![
            "sleeper blocks",
            "waker unblocks",
            "sleeper woke: Ok(())",
            "waker done: Ok(())",
        ]
    );
}

#[test]
fn test_unblock_rejects_targets_that_are_not_blocked() {
    let results = Arc::new(Mutex::new(Vec::new()));
    let r = Arc::clone(&results);
    let halt = run(move |k, _| {
        let child = k.fork("child", entry(|_, _| 0), "", MIN_STACK, 3).unwrap();
        let on_self = k.unblock_proc(k.getpid());
        let on_ready = k.unblock_proc(child);
        k.join().unwrap();
        let on_reaped = k.unblock_proc(child);
        r.lock().extend([on_self, on_ready, on_reaped]);
        0
    });

    assert!(halt.is_clean(), "unexpected halt: {}", halt);
    assert_eq!(*results.lock(), vec![Err(UnblockError::NotBlocked); 3]);
}

#[test]
fn test_reserved_block_code_is_fatal() {
    let halt = run(|k, _| {
        let _ = k.block_me(10);
        0
    });
    assert_eq!(halt.reason, HaltReason::Fault(KernelFault::InvalidBlockCode(10)));
}

#[test]
fn test_all_processes_blocked_is_a_deadlock() {
    let halt = run(|k, _| {
        k.fork("stuck", entry(|k, _| { let _ = k.block_me(20); 0 }), "", MIN_STACK, 3)
            .unwrap();
        let _ = k.join();
        0
    });

    assert_eq!(halt.code, 1);
    match halt.reason {
        HaltReason::Deadlock { blocked } => {
            let raw: Vec<u32> = blocked.iter().map(|p| p.raw()).collect();
            assert_eq!(raw, vec![2, 3]);
        }
        other => panic!("expected deadlock, got {:?}", other),
    }
}

#[test]
fn test_blocked_first_process_without_handlers_is_a_deadlock() {
    let halt = run(|k, _| {
        let _ = k.block_me(20);
        0
    });

    assert_eq!(halt.code, 1);
    assert!(matches!(halt.reason, HaltReason::Deadlock { ref blocked } if blocked.len() == 1));
}

#[test]
fn test_interrupt_handler_wakes_blocked_first_process() {
    let trace = Trace::new();
    let t = Arc::clone(&trace);
    let halt = run(move |k, _| {
        let me = k.getpid();
        k.on_interrupt(move |k| {
            let _ = k.unblock_proc(me);
        });
        t.push("blocking");
        let woke = k.block_me(30);
        t.push(format!("woke: {:?}", woke));
        0
    });

    assert!(halt.is_clean(), "unexpected halt: {}", halt);
    assert_eq!(trace.events(), vec!["blocking", "woke: Ok(())"]);
}

#[test]
fn test_finished_machine_shuts_down_cleanly() {
    let halt = run(|_, _| 0);
    assert_eq!(halt.code, 0);
    assert_eq!(halt.reason, HaltReason::Shutdown);
}
