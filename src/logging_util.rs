//! Logging setup for applications built on the ports, plus in-memory log capture so tests
//! can assert on what a port reported (flushes, delivery failures, missing SRI).

use std::error::Error;
use std::io;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use ahash::AHashMap;
use flexi_logger::writers::LogWriter;
use flexi_logger::{colored_with_thread, DeferredNow, Duplicate, FormatFunction, LogSpecBuilder, Logger, LoggerHandle, WriteMode};
use lazy_static::lazy_static;
#[allow(unused_imports)]
use log::*;
use parking_lot::Mutex;

/// Log verbosity accepted by [`steady_logger::initialize_with_level`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Off => LevelFilter::Off,
        }
    }
}

type CaptureBuffer = Arc<Mutex<Vec<String>>>;

lazy_static! {
    // one buffer per capturing test thread
    static ref CAPTURES: Mutex<AHashMap<ThreadId, CaptureBuffer>> = Mutex::new(AHashMap::new());
    static ref LOGGER_HANDLE: Mutex<Option<LoggerHandle>> = Mutex::new(None);
}

/// Lines captured so far for the calling thread, empty when it is not capturing.
#[doc(hidden)]
pub fn captured_lines() -> Vec<String> {
    CAPTURES.lock()
        .get(&thread::current().id())
        .map(|buffer| buffer.lock().clone())
        .unwrap_or_default()
}

/// Formats each record once and hands a copy to every capturing test.
struct CaptureWriter {
    format: FormatFunction,
}

impl LogWriter for CaptureWriter {
    fn write(&self, now: &mut DeferredNow, record: &Record) -> io::Result<()> {
        let captures = CAPTURES.lock();
        if captures.is_empty() {
            return Ok(());
        }
        let mut line = Vec::new();
        (self.format)(&mut line, now, record)?;
        let line = String::from_utf8_lossy(&line).into_owned();
        // ports log from producer and consumer threads, so every capturing test sees every line
        for buffer in captures.values() {
            buffer.lock().push(line.clone());
        }
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }

    fn max_log_level(&self) -> LevelFilter {
        LevelFilter::max()
    }
}

fn start_logger(level: LogLevel) -> Result<LoggerHandle, Box<dyn Error>> {
    let spec = LogSpecBuilder::new().default(level.to_level_filter()).build();
    let handle = Logger::with(spec)
        .log_to_writer(Box::new(CaptureWriter { format: colored_with_thread }))
        .duplicate_to_stderr(Duplicate::All)
        .format(colored_with_thread)
        .write_mode(WriteMode::Direct)
        .start()?;
    Ok(handle)
}

/// Global logger handle management and per test log capture.
pub mod steady_logger {
    use super::*;

    /// Stops capturing for its thread when dropped.
    pub struct LogCaptureGuard {
        thread_id: ThreadId,
    }

    impl Drop for LogCaptureGuard {
        fn drop(&mut self) {
            CAPTURES.lock().remove(&self.thread_id);
        }
    }

    /// Starts capturing logs for the current test thread. Starts the logger when needed.
    pub fn start_log_capture() -> LogCaptureGuard {
        if let Err(e) = initialize() {
            eprintln!("log capture without a logger: {}", e);
        }
        let thread_id = thread::current().id();
        CAPTURES.lock().insert(thread_id, Arc::new(Mutex::new(Vec::new())));
        LogCaptureGuard { thread_id }
    }

    /// Initializes the logger at `Info` if it is not running yet. Safe to call repeatedly.
    pub fn initialize() -> Result<(), Box<dyn Error>> {
        let mut handle = LOGGER_HANDLE.lock();
        if handle.is_none() {
            *handle = Some(start_logger(LogLevel::Info)?);
        }
        Ok(())
    }

    /// Initializes the logger at `level`, or changes the level of the running logger.
    pub fn initialize_with_level(level: LogLevel) -> Result<(), Box<dyn Error>> {
        let mut handle = LOGGER_HANDLE.lock();
        match handle.as_ref() {
            Some(running) => running.set_new_spec(LogSpecBuilder::new().default(level.to_level_filter()).build()),
            None => *handle = Some(start_logger(level)?),
        }
        Ok(())
    }
}

/// Asserts that the given texts appear, in order, in the logs captured for this test thread.
#[macro_export]
macro_rules! assert_in_logs {
    ($texts:expr) => {{
        // give logging from other threads a moment to land
        std::thread::sleep(std::time::Duration::from_millis(10));

        let logged = $crate::logging_util::captured_lines();
        let texts = $texts;
        let mut found = 0;
        for line in logged.iter() {
            if found < texts.len() && line.contains(texts[found]) {
                found += 1;
            }
        }
        if found < texts.len() {
            for (i, line) in logged.iter().enumerate() {
                eprintln!("[{}]: {}", i, line);
            }
            panic!("{}:{}: expected {:?} in logs, found {} of {}", file!(), line!(), texts, found, texts.len());
        }
    }};
}
