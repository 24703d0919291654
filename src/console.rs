//! Console output for the simulated machine, plus the kernel logger.

use core::fmt;
use std::io::{Stdout, Write as _};

use lazy_static::lazy_static;
use log::{LevelFilter, Log, Metadata, Record};
use spin::Mutex;

/// The machine's only output device.
pub struct Console {
    out: Stdout,
}

impl fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.out.write_all(s.as_bytes()).map_err(|_| fmt::Error)
    }
}

lazy_static! {
    pub static ref CONSOLE: Mutex<Console> = Mutex::new(Console {
        out: std::io::stdout(),
    });
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;
    // Lost console output never stops the machine.
    let _ = CONSOLE.lock().write_fmt(args);
}

/// Print to the console.
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => ($crate::console::_print(format_args!($($arg)*)));
}

/// Print to the console with newline.
#[macro_export]
macro_rules! kprintln {
    () => ($crate::kprint!("\n"));
    ($($arg:tt)*) => ($crate::kprint!("{}\n", format_args!($($arg)*)));
}

/// Routes `log` records to the console as `[LEVEL] target: message`.
pub struct ConsoleLogger;

static LOGGER: ConsoleLogger = ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            crate::kprintln!("{}", format_record(record));
        }
    }

    fn flush(&self) {
        let _ = CONSOLE.lock().out.flush();
    }
}

fn format_record(record: &Record) -> String {
    format!("[{:<5}] {}: {}", record.level(), record.target(), record.args())
}

/// Install the console logger at `level`. Later calls leave the first
/// installation in place.
pub fn init(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}
