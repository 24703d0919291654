//! Host resources stay bounded across many fork/join cycles.
//!
//! Kept in its own test binary so no other test's threads show up in the
//! process-wide thread count.

mod common;

use std::sync::Arc;

use coopkernel::arch::{HostMachine, Machine};
use coopkernel::Kernel;
use common::{entry, test_config, MIN_STACK};
use spin::Mutex;

const ROUNDS: usize = 300;
const SLACK: usize = 16;

#[cfg(target_os = "linux")]
fn os_threads() -> Option<usize> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    status
        .lines()
        .find_map(|line| line.strip_prefix("Threads:"))
        .and_then(|count| count.trim().parse().ok())
}

#[cfg(not(target_os = "linux"))]
fn os_threads() -> Option<usize> {
    None
}

#[test]
fn test_reaped_processes_release_their_host_threads() {
    let config = test_config();
    let machine = Arc::new(HostMachine::new(Arc::clone(&config.clock), config.idle_tick_us));
    let baseline = os_threads();

    let samples = Arc::new(Mutex::new(Vec::new()));
    let (m, s) = (Arc::clone(&machine), Arc::clone(&samples));
    let start1 = entry(move |k, _| {
        for round in 0..ROUNDS {
            k.fork("worker", entry(|_, _| 0), "", MIN_STACK, 3).unwrap();
            k.join().unwrap();
            if round % 100 == 99 {
                let sample = (m.live_contexts(), m.tracked_threads(), os_threads());
                s.lock().push(sample);
            }
        }
        0
    });
    let halt = Kernel::boot_on(Arc::clone(&machine) as Arc<dyn Machine>, config, start1)
        .expect("kernel should boot");

    assert!(halt.is_clean(), "unexpected halt: {}", halt);
    let samples = samples.lock();
    assert_eq!(samples.len(), ROUNDS / 100);
    for (live, tracked, threads) in samples.iter() {
        assert_eq!(*live, 2, "only sentinel and start1 should hold contexts");
        assert!(*tracked <= 2 + SLACK, "exited threads were not reclaimed: {}", tracked);
        if let (Some(base), Some(now)) = (baseline, threads) {
            assert!(
                *now <= base + 2 + SLACK,
                "thread count grew from {} to {}",
                base,
                now
            );
        }
    }
}
