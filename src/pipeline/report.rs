//! Run reporting injected into every stage.

use std::cell::RefCell;

use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

/// Receives progress and diagnostics from pipeline stages.
///
/// Stages never log through a global; they are handed a reporter so tests
/// can assert on exactly what a stage said.
pub trait Reporter {
    fn report(&self, level: Level, stage: &str, message: &str);

    fn info(&self, stage: &str, message: &str) {
        self.report(Level::Info, stage, message);
    }

    fn warn(&self, stage: &str, message: &str) {
        self.report(Level::Warn, stage, message);
    }

    fn error(&self, stage: &str, message: &str) {
        self.report(Level::Error, stage, message);
    }
}

/// Forwards reports to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, level: Level, stage: &str, message: &str) {
        match level {
            Level::Info => info!(stage, "{message}"),
            Level::Warn => warn!(stage, "{message}"),
            Level::Error => error!(stage, "{message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEvent {
    pub level: Level,
    pub stage: String,
    pub message: String,
}

/// Keeps every report in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: RefCell<Vec<ReportEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ReportEvent> {
        self.events.borrow().clone()
    }

    pub fn messages_for(&self, stage: &str) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter(|e| e.stage == stage)
            .map(|e| e.message.clone())
            .collect()
    }

    pub fn has(&self, level: Level, needle: &str) -> bool {
        self.events
            .borrow()
            .iter()
            .any(|e| e.level == level && e.message.contains(needle))
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, level: Level, stage: &str, message: &str) {
        self.events.borrow_mut().push(ReportEvent {
            level,
            stage: stage.to_string(),
            message: message.to_string(),
        });
    }
}
