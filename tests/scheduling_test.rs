//! Dispatcher integration tests: priorities, round-robin, time accounting
//! and phase hooks.

mod common;

use std::sync::Arc;

use coopkernel::arch::ManualClock;
use coopkernel::{BootError, Kernel, KernelConfig, ProcessHooks};
use common::{entry, run, run_with, test_config, HookLog, Trace, MIN_STACK};
use spin::Mutex;

#[test]
fn test_more_urgent_child_runs_to_completion_before_less_urgent_one() {
    let trace = Trace::new();
    let t = Arc::clone(&trace);
    let halt = run(move |k, _| {
        let (t1, t2) = (Arc::clone(&t), Arc::clone(&t));
        k.fork("p1", entry(move |_, _| { t1.push("p1"); 1 }), "", MIN_STACK, 3).unwrap();
        k.fork("p2", entry(move |_, _| { t2.push("p2"); 2 }), "", MIN_STACK, 1).unwrap();
        t.push("start1 resumed");
        for _ in 0..2 {
            let (_, code) = k.join().unwrap();
            t.push(format!("joined {}", code));
        }
        0
    });

    assert!(halt.is_clean(), "unexpected halt: {}", halt);
    assert_eq!(
        trace.events(),
        vec!["p2", "start1 resumed", "joined 2", "p1", "joined 1"],
        "priority-1 child must finish before the priority-3 child starts"
    );
}

#[test]
fn test_equal_priority_processes_alternate_on_time_slice() {
    let clock = Arc::new(ManualClock::new());
    let trace = Trace::new();
    let config = test_config().with_clock(Arc::clone(&clock) as Arc<dyn coopkernel::arch::Clock>);

    let (t, c) = (Arc::clone(&trace), Arc::clone(&clock));
    let halt = run_with(config, move |k, _| {
        for name in ["a", "b"] {
            let (t, c) = (Arc::clone(&t), Arc::clone(&c));
            let worker = entry(move |k, name| {
                for i in 0..3 {
                    t.push(format!("{}{}", name, i));
                    c.advance(100_000);
                    k.time_slice();
                }
                0
            });
            k.fork(name, worker, name, MIN_STACK, 2).unwrap();
        }
        while k.join().is_ok() {}
        0
    });

    assert!(halt.is_clean(), "unexpected halt: {}", halt);
    assert_eq!(trace.events(), vec!["a0", "b0", "a1", "b1", "a2", "b2"]);
}

#[test]
fn test_time_slice_within_quantum_keeps_the_cpu() {
    let trace = Trace::new();
    let t = Arc::clone(&trace);
    let halt = run(move |k, _| {
        let t1 = Arc::clone(&t);
        k.fork("peer", entry(move |_, _| { t1.push("peer"); 0 }), "", MIN_STACK, 1).unwrap();
        // The fork above already handed the CPU to `peer` and back.
        t.push("before");
        k.time_slice();
        t.push("after");
        k.join().unwrap();
        0
    });

    assert!(halt.is_clean(), "unexpected halt: {}", halt);
    assert_eq!(trace.events(), vec!["peer", "before", "after"]);
}

#[test]
fn test_cpu_time_and_quantum_start_follow_the_clock() {
    let clock = Arc::new(ManualClock::new());
    let readings = Arc::new(Mutex::new(Vec::new()));
    let config = test_config().with_clock(Arc::clone(&clock) as Arc<dyn coopkernel::arch::Clock>);

    let (r, c) = (Arc::clone(&readings), Arc::clone(&clock));
    let halt = run_with(config, move |k, _| {
        c.advance(5_000);
        let reading = ("start1", k.read_cur_start_time(), k.read_time());
        r.lock().push(reading);

        let (r2, c2) = (Arc::clone(&r), Arc::clone(&c));
        let child = entry(move |k, _| {
            let reading = ("child", k.read_cur_start_time(), k.read_time());
            r2.lock().push(reading);
            c2.advance(3_000);
            0
        });
        k.fork("child", child, "", MIN_STACK, 1).unwrap();
        let reading = ("start1", k.read_cur_start_time(), k.read_time());
        r.lock().push(reading);
        k.join().unwrap();
        0
    });

    assert!(halt.is_clean(), "unexpected halt: {}", halt);
    assert_eq!(
        *readings.lock(),
        vec![("start1", 0, 5), ("child", 5_000, 0), ("start1", 8_000, 5)]
    );
}

#[test]
fn test_hooks_see_forks_quits_and_switches() {
    let hooks = HookLog::new();
    let config = test_config().with_hooks(Arc::clone(&hooks) as Arc<dyn ProcessHooks>);

    let halt = run_with(config, |k, _| {
        k.fork("child", entry(|_, _| 0), "", MIN_STACK, 3).unwrap();
        k.join().unwrap();
        0
    });

    assert!(halt.is_clean(), "unexpected halt: {}", halt);
    assert_eq!(
        hooks.events(),
        vec![
            "fork 2",
            "switch - -> 2",
            "fork 3",
            "switch 2 -> 3",
            "quit 3",
            "switch 3 -> 2",
            "quit 2",
            "switch 2 -> 1",
        ]
    );
}

#[test]
fn test_boot_rejects_unusable_configuration() {
    let result = Kernel::boot(KernelConfig::default().with_max_procs(1), entry(|_, _| 0));
    assert!(matches!(result, Err(BootError::InvalidConfig(_))));
}
