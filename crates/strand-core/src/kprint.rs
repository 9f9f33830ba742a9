//! Leveled diagnostics on stderr
//!
//! Every line goes out under one stderr lock, so lines from sharded
//! executors on different threads never interleave mid-line. Leveled lines
//! carry the thread name when the thread has one.
//!
//! # Environment Variables
//!
//! - `STRAND_LOG_LEVEL=<level>` - off/error/warn/info/debug/trace or 0..5
//!   (default info)
//! - `STRAND_LOG_TIME=1` - Prefix leveled lines with milliseconds since the
//!   first log call
//! - `STRAND_FLUSH_EPRINT=1` - Flush after every line, for crashes inside a
//!   context switch
//!
//! ```ignore
//! use strand_core::{kinfo, ktrace};
//!
//! kinfo!("echo: listening on {}:{}", addr, port);
//! ktrace!("executor: {} -> {}", from, to);
//! ```

use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

use crate::env::{env_get_bool, env_get_opt};

/// Log levels
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    const ALL: [LogLevel; 6] = [
        LogLevel::Off,
        LogLevel::Error,
        LogLevel::Warn,
        LogLevel::Info,
        LogLevel::Debug,
        LogLevel::Trace,
    ];

    /// Levels above `Trace` clamp to `Trace`
    pub fn from_u8(v: u8) -> Self {
        Self::ALL[usize::from(v.min(LogLevel::Trace as u8))]
    }

    /// Level name (any case) or digit
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(n) = s.parse::<u8>() {
            return (n <= LogLevel::Trace as u8).then(|| Self::from_u8(n));
        }
        Self::ALL
            .into_iter()
            .find(|level| level.name().eq_ignore_ascii_case(s))
    }

    pub fn name(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    fn tag(self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "E",
            LogLevel::Warn => "W",
            LogLevel::Info => "I",
            LogLevel::Debug => "D",
            LogLevel::Trace => "T",
        }
    }
}

const FLAG_TIME: u8 = 1 << 0;
const FLAG_FLUSH: u8 = 1 << 1;
const UNSET: u8 = u8::MAX;

// `LEVEL` stays `UNSET` until the first log call reads the environment
static LEVEL: AtomicU8 = AtomicU8::new(UNSET);
static FLAGS: AtomicU8 = AtomicU8::new(0);
static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Read the `STRAND_LOG_*` variables. Runs on first use; calling it again
/// re-reads the environment.
pub fn init() {
    EPOCH.get_or_init(Instant::now);
    let level = env_get_opt::<String>("STRAND_LOG_LEVEL")
        .and_then(|v| LogLevel::parse(&v))
        .unwrap_or(LogLevel::Info);
    let mut flags = 0;
    if env_get_bool("STRAND_LOG_TIME", false) {
        flags |= FLAG_TIME;
    }
    if env_get_bool("STRAND_FLUSH_EPRINT", false) {
        flags |= FLAG_FLUSH;
    }
    FLAGS.store(flags, Ordering::Relaxed);
    LEVEL.store(level as u8, Ordering::Relaxed);
}

#[inline]
fn level_byte() -> u8 {
    let v = LEVEL.load(Ordering::Relaxed);
    if v != UNSET {
        return v;
    }
    init();
    LEVEL.load(Ordering::Relaxed)
}

#[inline]
fn flag(bit: u8) -> bool {
    level_byte();
    FLAGS.load(Ordering::Relaxed) & bit != 0
}

fn set_flag(bit: u8, on: bool) {
    level_byte();
    if on {
        FLAGS.fetch_or(bit, Ordering::Relaxed);
    } else {
        FLAGS.fetch_and(!bit, Ordering::Relaxed);
    }
}

#[inline]
pub fn log_level() -> LogLevel {
    LogLevel::from_u8(level_byte())
}

/// Overrides `STRAND_LOG_LEVEL`
pub fn set_log_level(level: LogLevel) {
    level_byte();
    LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn set_time_enabled(on: bool) {
    set_flag(FLAG_TIME, on);
}

pub fn set_flush_enabled(on: bool) {
    set_flag(FLAG_FLUSH, on);
}

#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level != LogLevel::Off && level <= log_level()
}

#[doc(hidden)]
pub fn _emit(level: Option<LogLevel>, args: fmt::Arguments<'_>, newline: bool) {
    if let Some(level) = level {
        if !level_enabled(level) {
            return;
        }
    }

    let stderr = std::io::stderr();
    let mut out = stderr.lock();
    if let Some(level) = level {
        if flag(FLAG_TIME) {
            let ms = EPOCH.get_or_init(Instant::now).elapsed().as_millis();
            let _ = write!(out, "{:>8}ms ", ms);
        }
        let _ = match std::thread::current().name() {
            Some(name) => write!(out, "{} {}| ", level.tag(), name),
            None => write!(out, "{} | ", level.tag()),
        };
    }
    let _ = out.write_fmt(args);
    if newline {
        let _ = out.write_all(b"\n");
    }
    if flag(FLAG_FLUSH) {
        let _ = out.flush();
    }
}

/// Print to stderr (no newline)
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {
        $crate::kprint::_emit(None, format_args!($($arg)*), false)
    };
}

/// Print a line to stderr, whatever the level
#[macro_export]
macro_rules! kprintln {
    () => {
        $crate::kprint::_emit(None, format_args!(""), true)
    };
    ($($arg:tt)*) => {
        $crate::kprint::_emit(None, format_args!($($arg)*), true)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __klog {
    ($level:ident, $($arg:tt)*) => {
        $crate::kprint::_emit(
            Some($crate::kprint::LogLevel::$level),
            format_args!($($arg)*),
            true,
        )
    };
}

#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => { $crate::__klog!(Error, $($arg)*) };
}

#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => { $crate::__klog!(Warn, $($arg)*) };
}

#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => { $crate::__klog!(Info, $($arg)*) };
}

/// Setup and teardown detail
#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => { $crate::__klog!(Debug, $($arg)*) };
}

/// Per-switch and per-completion detail
#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => { $crate::__klog!(Trace, $($arg)*) };
}
