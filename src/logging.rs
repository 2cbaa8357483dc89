//! Forwarding engine diagnostics to a host-registered sink.
//!
//! Engine code never calls a sink directly; it emits ordinary `tracing`
//! events. This module installs a process-wide subscriber that formats
//! each event and hands it to the currently registered [`LogSink`], if
//! any. With no sink registered, events cost one atomic load and go
//! nowhere.
//!
//! The sink and the severity threshold are both replaceable at runtime;
//! replacing the sink drops the previous one, which is how host-side
//! teardown hooks run. Sinks must not call back into the engine: events
//! can fire while internal locks are held.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::span;
use tracing::subscriber::Interest;
use tracing::{Event, Metadata, Subscriber};

/// Severity of a forwarded message, ordered from most to least severe.
///
/// The numeric codes are part of the boundary contract and never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(i32)]
pub enum LogLevel {
    /// Unrecoverable or data-affecting conditions
    Error = 1,
    /// Anomalies the engine worked around, like a truncated log tail
    Warn = 2,
    /// Lifecycle events (open, close, compaction)
    Info = 3,
    /// Per-operation diagnostics
    Debug = 4,
    /// Everything, including per-key read/write traces
    Trace = 5,
}

impl LogLevel {
    /// The code crossing the boundary.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Parse a boundary code. Unknown codes are rejected, not clamped.
    pub fn from_i32(code: i32) -> Option<LogLevel> {
        match code {
            1 => Some(LogLevel::Error),
            2 => Some(LogLevel::Warn),
            3 => Some(LogLevel::Info),
            4 => Some(LogLevel::Debug),
            5 => Some(LogLevel::Trace),
            _ => None,
        }
    }

    fn from_tracing(level: &tracing::Level) -> LogLevel {
        if *level == tracing::Level::ERROR {
            LogLevel::Error
        } else if *level == tracing::Level::WARN {
            LogLevel::Warn
        } else if *level == tracing::Level::INFO {
            LogLevel::Info
        } else if *level == tracing::Level::DEBUG {
            LogLevel::Debug
        } else {
            LogLevel::Trace
        }
    }
}

/// Receiver for formatted engine diagnostics.
///
/// Owned by the subscriber; dropped when replaced. The `message` borrow
/// is only valid for the duration of the call.
pub trait LogSink: Send + Sync {
    /// Handle one formatted event.
    fn log(&self, level: LogLevel, message: &str);
}

/// Events-only subscriber bridging `tracing` to the registered sink.
///
/// Spans are inert: the engine never opens any, and host code that does
/// gets valid no-op ids back.
struct SinkSubscriber {
    /// Minimum forwarded severity, stored as its boundary code
    max_level: AtomicI32,
    sink: RwLock<Option<Box<dyn LogSink>>>,
}

impl SinkSubscriber {
    fn new() -> SinkSubscriber {
        SinkSubscriber {
            max_level: AtomicI32::new(LogLevel::Trace.as_i32()),
            sink: RwLock::new(None),
        }
    }

    fn passes(&self, level: LogLevel) -> bool {
        level.as_i32() <= self.max_level.load(Ordering::Relaxed)
    }
}

impl Subscriber for SinkSubscriber {
    fn register_callsite(&self, _metadata: &'static Metadata<'static>) -> Interest {
        // Sink and threshold change at runtime; never let callsites
        // cache an enabled/disabled decision.
        Interest::sometimes()
    }

    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        if !metadata.is_event() {
            return false;
        }
        self.passes(LogLevel::from_tracing(metadata.level())) && self.sink.read().is_some()
    }

    fn event(&self, event: &Event<'_>) {
        let level = LogLevel::from_tracing(event.metadata().level());
        if !self.passes(level) {
            return;
        }
        let guard = self.sink.read();
        let Some(sink) = guard.as_ref() else {
            return;
        };

        let mut formatter = EventFormatter::default();
        event.record(&mut formatter);
        let mut line = String::with_capacity(
            event.metadata().target().len() + formatter.message.len() + formatter.fields.len() + 3,
        );
        let _ = write!(line, "{}: {}", event.metadata().target(), formatter.message);
        if !formatter.fields.is_empty() {
            let _ = write!(line, " {}", formatter.fields);
        }
        sink.log(level, &line);
    }

    fn new_span(&self, _attrs: &span::Attributes<'_>) -> span::Id {
        span::Id::from_u64(1)
    }

    fn record(&self, _span: &span::Id, _values: &span::Record<'_>) {}

    fn record_follows_from(&self, _span: &span::Id, _follows: &span::Id) {}

    fn enter(&self, _span: &span::Id) {}

    fn exit(&self, _span: &span::Id) {}
}

/// Collects the `message` field and renders the rest as `key=value`.
#[derive(Default)]
struct EventFormatter {
    message: String,
    fields: String,
}

impl Visit for EventFormatter {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            if !self.fields.is_empty() {
                self.fields.push(' ');
            }
            let _ = write!(self.fields, "{}={:?}", field.name(), value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            if !self.fields.is_empty() {
                self.fields.push(' ');
            }
            let _ = write!(self.fields, "{}={}", field.name(), value);
        }
    }
}

static SUBSCRIBER: Lazy<Arc<SinkSubscriber>> = Lazy::new(|| {
    let subscriber = Arc::new(SinkSubscriber::new());
    // If the host process already installed its own global subscriber,
    // keep it; sink registration then forwards nothing.
    let _ = tracing::subscriber::set_global_default(Arc::clone(&subscriber));
    subscriber
});

/// Register the process-wide sink, or clear it with `None`.
///
/// The previous sink is dropped after the swap, outside the subscriber's
/// lock, so its teardown cannot deadlock against an in-flight event.
pub fn set_sink(sink: Option<Box<dyn LogSink>>) {
    let previous = {
        let mut guard = SUBSCRIBER.sink.write();
        std::mem::replace(&mut *guard, sink)
    };
    drop(previous);
}

/// Set the minimum forwarded severity. Defaults to [`LogLevel::Trace`].
pub fn set_max_level(level: LogLevel) {
    SUBSCRIBER
        .max_level
        .store(level.as_i32(), Ordering::Relaxed);
}

/// The current minimum forwarded severity.
pub fn max_level() -> LogLevel {
    LogLevel::from_i32(SUBSCRIBER.max_level.load(Ordering::Relaxed)).unwrap_or(LogLevel::Trace)
}
