use std::io::{self, Write};
use std::sync::Mutex;
use std::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    fn label(self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub level: Level,
    pub message: String,
}

/// Receiver for the structured events emitted by the template passes.
///
/// Passes never log through global state; callers hand a sink to every
/// operation that wants to report something.
pub trait EventSink: Sync {
    fn emit(&self, event: Event);
}

pub fn emit(sink: &dyn EventSink, level: Level, message: impl Into<String>) {
    sink.emit(Event {
        level,
        message: message.into(),
    });
}

pub struct ConsoleProgress {
    enabled: bool,
    min_level: Level,
    t0: Instant,
}

impl ConsoleProgress {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            min_level: Level::Info,
            t0: Instant::now(),
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.min_level = if verbose { Level::Debug } else { Level::Info };
        self
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        self.write_line(Level::Info, msg.as_ref());
    }

    pub fn progress(&self, label: &str, current: usize, total: usize) {
        if !self.enabled {
            return;
        }
        let total = total.max(1);
        let current = current.min(total);
        let pct = (current as f64 / total as f64) * 100.0;
        let ts = fmt_elapsed(self.t0.elapsed().as_secs_f64());
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "[{ts}] {label} {current}/{total} ({pct:5.1}%)");
    }

    fn write_line(&self, level: Level, msg: &str) {
        if !self.enabled || level < self.min_level {
            return;
        }
        let ts = fmt_elapsed(self.t0.elapsed().as_secs_f64());
        let mut stderr = io::stderr().lock();
        if level == Level::Info {
            let _ = writeln!(stderr, "[{ts}] {msg}");
        } else {
            let _ = writeln!(stderr, "[{ts}] {}: {msg}", level.label());
        }
    }
}

impl EventSink for ConsoleProgress {
    fn emit(&self, event: Event) {
        self.write_line(event.level, &event.message);
    }
}

/// Keeps every event in memory; used by tests and the batch runner.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|evs| evs.clone())
            .unwrap_or_default()
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events.into_inner().unwrap_or_default()
    }

    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.events()
            .iter()
            .any(|e| e.level == level && e.message.contains(needle))
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: Event) {
        if let Ok(mut evs) = self.events.lock() {
            evs.push(event);
        }
    }
}

pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}
}

fn fmt_elapsed(seconds: f64) -> String {
    let seconds = seconds.max(0.0) as u64;
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}
