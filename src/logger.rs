// Copyright 2024 Google LLC.
// This project is dual-licensed under Apache 2.0 and MIT terms.
// See LICENSE-APACHE and LICENSE-MIT for details.

use core::fmt::Write;

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::mutex::SpinMutex;

/// A logger writing `[LEVEL] message` lines to a sink guarded by a spin
/// mutex, so that it may be shared between threads.
pub struct Logger<W: Send + Write> {
    sink: SpinMutex<W>,
}

impl<W: Send + Write> Logger<W> {
    /// Creates a logger writing to `sink`.
    pub const fn new(sink: W) -> Self {
        Self {
            sink: SpinMutex::new(sink),
        }
    }

    /// Runs `f` with exclusive access to the sink.
    pub fn with_sink<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        f(&mut self.sink.lock())
    }
}

impl<W: Send + Write> Log for Logger<W> {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let sink = &mut *self.sink.lock();
        // Ignore any errors writing to the sink, as there is nowhere to report them.
        let _ = writeln!(sink, "[{}] {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

/// Initialises the logger with the given sink.
///
/// # Errors
///
/// Returns an error if a logger was already installed.
pub fn init(logger: &'static impl Log, max_level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(logger)?;
    log::set_max_level(max_level);
    Ok(())
}
