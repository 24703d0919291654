//! Demo boot of the coopkernel scheduler.
//!
//! `start1` forks a small family of processes at different priorities,
//! joins them and dumps the process table along the way.

use std::sync::Arc;

use coopkernel::{kprintln, Kernel, KernelConfig};
use log::LevelFilter;

/// Workers exit with the length of their argument, clamped to `i32`.
fn length_code(arg: &str) -> i32 {
    i32::try_from(arg.len()).unwrap_or(i32::MAX)
}

fn worker(kernel: &Kernel, arg: &str) -> i32 {
    kprintln!("{}: started as process {}", arg, kernel.getpid());
    length_code(arg)
}

fn waiter(kernel: &Kernel, _arg: &str) -> i32 {
    kprintln!("waiter: blocking until start1 wakes me");
    match kernel.block_me(20) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

fn start1(kernel: &Kernel, _arg: &str) -> i32 {
    let min_stack = kernel.config().min_stack;

    for (name, priority) in [("low", 4), ("high", 2), ("mid", 3)] {
        if let Err(e) = kernel.fork(name, Arc::new(worker), name, min_stack, priority) {
            kprintln!("start1: fork of {} failed: {}", name, e);
        }
    }
    let sleeper = match kernel.fork("waiter", Arc::new(waiter), "", min_stack, 3) {
        Ok(pid) => pid,
        Err(e) => {
            kprintln!("start1: fork of waiter failed: {}", e);
            return 1;
        }
    };
    kernel.dump_processes();

    for _ in 0..3 {
        match kernel.join() {
            Ok((pid, code)) => kprintln!("start1: joined process {} with status {}", pid, code),
            Err(e) => kprintln!("start1: join failed: {}", e),
        }
    }

    kernel.dump_processes();
    if let Err(e) = kernel.unblock_proc(sleeper) {
        kprintln!("start1: unblock of {} failed: {}", sleeper, e);
    }
    while let Ok((pid, code)) = kernel.join() {
        kprintln!("start1: joined process {} with status {}", pid, code);
    }
    0
}

fn main() {
    coopkernel::console::init(LevelFilter::Info);

    kprintln!("coopkernel v{}", env!("CARGO_PKG_VERSION"));
    kprintln!("==================");

    match Kernel::boot(KernelConfig::default(), Arc::new(start1)) {
        Ok(halt) => {
            kprintln!("{}", halt);
            std::process::exit(halt.code);
        }
        Err(e) => {
            kprintln!("boot failed: {}", e);
            std::process::exit(2);
        }
    }
}
