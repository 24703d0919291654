//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use coopkernel::{EntryFn, Halt, Kernel, KernelConfig, Pid, ProcessHooks};
use spin::Mutex;

pub const MIN_STACK: usize = coopkernel::config::MIN_STACK;

/// Ordered event log filled in by processes and read back by the test.
#[derive(Default)]
pub struct Trace {
    events: Mutex<Vec<String>>,
}

impl Trace {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

/// Records every hook call as a line of text.
#[derive(Default)]
pub struct HookLog(pub Mutex<Vec<String>>);

impl HookLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn switches(&self) -> Vec<String> {
        self.events().into_iter().filter(|e| e.starts_with("switch")).collect()
    }
}

impl ProcessHooks for HookLog {
    fn forked(&self, pid: Pid) {
        self.0.lock().push(format!("fork {}", pid));
    }

    fn quit(&self, pid: Pid) {
        self.0.lock().push(format!("quit {}", pid));
    }

    fn switched(&self, from: Option<Pid>, to: Pid) {
        let from = from.map_or(String::from("-"), |p| p.to_string());
        self.0.lock().push(format!("switch {} -> {}", from, to));
    }
}

pub fn entry<F>(f: F) -> EntryFn
where
    F: Fn(&Kernel, &str) -> i32 + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Default configuration with a fast idle tick.
pub fn test_config() -> KernelConfig {
    KernelConfig::default().with_idle_tick_us(500)
}

pub fn run<F>(start1: F) -> Halt
where
    F: Fn(&Kernel, &str) -> i32 + Send + Sync + 'static,
{
    run_with(test_config(), start1)
}

pub fn run_with<F>(config: KernelConfig, start1: F) -> Halt
where
    F: Fn(&Kernel, &str) -> i32 + Send + Sync + 'static,
{
    Kernel::boot(config, entry(start1)).expect("kernel should boot")
}
