//! Tracing setup and an in-memory capture layer.
//!
//! [`CaptureLayer`] is a [`tracing_subscriber::Layer`] that writes every event
//! into a [`LogBuffer`] as a [`LogLine`]. The CLI uses it for `--report`, and
//! tests use it to assert that a warning was actually emitted.

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::Local;
use tracing::Subscriber;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

/// Upper bound on buffered lines before the oldest are dropped.
pub const MAX_LOG_LINES: usize = 2000;

/// Number of lines kept after trimming an overfull buffer.
const LOG_TRIM_TO: usize = 1500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn label(self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl From<tracing::Level> for LogLevel {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => LogLevel::Trace,
            tracing::Level::DEBUG => LogLevel::Debug,
            tracing::Level::INFO => LogLevel::Info,
            tracing::Level::WARN => LogLevel::Warn,
            tracing::Level::ERROR => LogLevel::Error,
        }
    }
}

/// One captured event.
#[derive(Debug, Clone)]
pub struct LogLine {
    /// Local wall-clock time, `HH:MM:SS`.
    pub time: String,
    pub level: LogLevel,
    /// The event message, followed by any extra fields as `{k=v, ...}`.
    pub message: String,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:>5} {}", self.time, self.level.label(), self.message)
    }
}

/// Shared buffer of captured log lines.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<LogLine>>>);

impl LogBuffer {
    /// Take every captured line, leaving the buffer empty.
    pub fn drain(&self) -> Vec<LogLine> {
        let mut buf = self.0.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *buf)
    }

    /// Copy of the captured lines, leaving the buffer intact.
    pub fn lines(&self) -> Vec<LogLine> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Whether any line at `level` contains `needle`.
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|line| line.level == level && line.message.contains(needle))
    }

    fn push(&self, line: LogLine) {
        let mut buf = self.0.lock().unwrap_or_else(|e| e.into_inner());
        buf.push(line);
        if buf.len() > MAX_LOG_LINES {
            let trim_to = buf.len() - LOG_TRIM_TO;
            buf.drain(..trim_to);
        }
    }
}

/// A layer that records events into a [`LogBuffer`].
pub struct CaptureLayer {
    buffer: LogBuffer,
}

impl CaptureLayer {
    /// Create a layer and the buffer it writes to.
    pub fn new() -> (Self, LogBuffer) {
        let buffer = LogBuffer::default();
        (
            Self {
                buffer: buffer.clone(),
            },
            buffer,
        )
    }
}

impl<S: Subscriber + for<'a> LookupSpan<'a>> Layer<S> for CaptureLayer {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let mut message = visitor.message;
        if !visitor.fields.is_empty() {
            let extras: Vec<String> = visitor
                .fields
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            if message.is_empty() {
                message = extras.join(" ");
            } else {
                message = format!("{message} {{{}}}", extras.join(", "));
            }
        }

        self.buffer.push(LogLine {
            time: Local::now().format("%H:%M:%S").to_string(),
            level: LogLevel::from(*event.metadata().level()),
            message,
        });
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        let raw = format!("{value:?}");
        if field.name() == "message" {
            self.message = raw;
        } else {
            self.fields.push((field.name().to_string(), raw));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields
                .push((field.name().to_string(), value.to_string()));
        }
    }
}

/// Install the global subscriber for the CLI.
///
/// Logs go to stderr so stdout stays clean for JSON output. `RUST_LOG`
/// overrides the level picked from `verbosity` (0 = warn, 1 = info,
/// 2 = debug, 3+ = trace). When `capture` is set, every info-or-higher event
/// is also recorded in the returned buffer, whatever the verbosity.
pub fn init_cli_logging(verbosity: u8, capture: bool) -> Option<LogBuffer> {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ctxkeep={default_level}")));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter);

    let (capture_layer, buffer) = if capture {
        let (layer, buffer) = CaptureLayer::new();
        (Some(layer.with_filter(LevelFilter::INFO)), Some(buffer))
    } else {
        (None, None)
    };

    // A second init is harmless; the first subscriber stays.
    let _ = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(capture_layer)
        .try_init();

    buffer
}

/// Run `f` with a [`CaptureLayer`] as the thread's default subscriber and
/// return its result together with everything it logged.
pub fn capture<T>(f: impl FnOnce() -> T) -> (T, LogBuffer) {
    let (layer, buffer) = CaptureLayer::new();
    let subscriber = tracing_subscriber::registry().with(layer);
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{info, warn};

    #[test]
    fn captures_message_and_level() {
        let ((), logs) = capture(|| {
            info!("hello {}", 42);
            warn!("careful");
        });
        let lines = logs.drain();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].level, LogLevel::Info);
        assert_eq!(lines[0].message, "hello 42");
        assert_eq!(lines[1].level, LogLevel::Warn);
        assert!(logs.drain().is_empty());
    }

    #[test]
    fn extra_fields_are_appended() {
        let ((), logs) = capture(|| {
            info!(turns = 3, "truncated");
        });
        assert!(logs.contains(LogLevel::Info, "truncated {turns=3}"));
    }

    #[test]
    fn buffer_is_capped() {
        let ((), logs) = capture(|| {
            for i in 0..(MAX_LOG_LINES + 1) {
                info!("line {i}");
            }
        });
        let lines = logs.lines();
        assert_eq!(lines.len(), LOG_TRIM_TO);
        assert_eq!(lines[LOG_TRIM_TO - 1].message, format!("line {MAX_LOG_LINES}"));
    }

    #[test]
    fn poisoned_buffer_still_records() {
        let (layer, logs) = CaptureLayer::new();
        let shared = logs.clone();
        let poisoner = std::thread::spawn(move || {
            let _guard = shared.0.lock().unwrap();
            panic!("poison the buffer");
        });
        assert!(poisoner.join().is_err());
        assert!(logs.0.is_poisoned());

        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || info!("after poison"));
        assert!(logs.contains(LogLevel::Info, "after poison"));
    }
}
