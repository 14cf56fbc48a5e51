use chrono::Local;
use log::{LevelFilter, Metadata, Record, SetLoggerError};
use std::collections::HashSet;
use std::io::{self, Write};
use std::sync::OnceLock;

// Logger with per-topic filtering of debug/trace output
#[derive(Debug)]
struct ArenaLogger {
    level: LevelFilter,
    topics: Option<HashSet<String>>,
}

impl ArenaLogger {
    fn topic_enabled(&self, target: &str) -> bool {
        match &self.topics {
            Some(topics) => topics.iter().any(|t| target == t || target.starts_with(t.as_str())),
            None => true,
        }
    }
}

impl log::Log for ArenaLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        if metadata.level() > self.level {
            return false;
        }
        // Info and above always pass; the filter only narrows the chatty levels
        match metadata.level() {
            log::Level::Debug | log::Level::Trace => self.topic_enabled(metadata.target()),
            _ => true,
        }
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level_color = match record.level() {
            log::Level::Error => "\x1B[31m",
            log::Level::Warn => "\x1B[33m",
            log::Level::Info => "\x1B[32m",
            log::Level::Debug => "\x1B[36m",
            log::Level::Trace => "\x1B[35m",
        };
        let reset = "\x1B[0m";
        let timestamp = Local::now().format("%H:%M:%S%.3f");

        // Worker threads interleave, so tag lines with the rayon worker index
        let worker = rayon::current_thread_index()
            .map(|i| format!("[W{:02}] ", i))
            .unwrap_or_default();

        let output = format!(
            "{timestamp} {level_color}{level:5}{reset} {worker}{target}: {message}",
            level = record.level(),
            target = record.target(),
            message = record.args()
        );

        // A closed stdout is not worth crashing the simulation over
        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "{}", output);
    }

    fn flush(&self) {
        let _ = io::stdout().flush();
    }
}

static LOGGER: OnceLock<ArenaLogger> = OnceLock::new();

/// Parses a comma-separated topic list such as `"tank,agent"`.
pub fn parse_topics(filter: &str) -> HashSet<String> {
    filter
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// Initialize the logger with optional debug topic filters
pub fn init_logger(level: LevelFilter, debug_filter: Option<String>) -> Result<(), SetLoggerError> {
    let logger = LOGGER.get_or_init(|| ArenaLogger {
        level,
        topics: debug_filter.as_deref().map(parse_topics),
    });
    log::set_logger(logger).map(|()| log::set_max_level(level))
}

// Topic macros. The first argument identifies the tank or agent (side 1 or 2);
// callers that know the simulation tick pass it as `@tick`.
#[macro_export]
macro_rules! debug_tank {
    ($side:expr, @$tick:expr, $($arg:tt)+) => {
        log::debug!(target: "tank", "[T{}][{:04}] {}", $side, $tick, format_args!($($arg)+))
    };
    ($side:expr, $($arg:tt)+) => {
        log::debug!(target: "tank", "[T{}] {}", $side, format_args!($($arg)+))
    };
}

#[macro_export]
macro_rules! debug_agent {
    ($side:expr, @$tick:expr, $($arg:tt)+) => {
        log::debug!(target: "agent", "[A{}][{:04}] {}", $side, $tick, format_args!($($arg)+))
    };
    ($side:expr, $($arg:tt)+) => {
        log::debug!(target: "agent", "[A{}] {}", $side, format_args!($($arg)+))
    };
}

#[macro_export]
macro_rules! debug_train {
    ($side:expr, $($arg:tt)+) => {
        log::debug!(target: "train", "[A{}] {}", $side, format_args!($($arg)+))
    };
}
