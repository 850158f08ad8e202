//! Pipeline metrics.
//!
//! Recorded through the `metrics` facade. Nothing is exported unless the
//! embedding application installs a recorder.

use std::time::Instant;

use crate::error::Phase;

/// Metric names, kept in one place so dashboards and code agree.
pub mod names {
    pub const ROWS_EXTRACTED: &str = "etl_rows_extracted_total";
    pub const ROWS_DROPPED: &str = "etl_rows_dropped_total";
    pub const ROWS_LOADED: &str = "etl_rows_loaded_total";
    pub const RUNS_SUCCEEDED: &str = "etl_runs_succeeded_total";
    pub const RUNS_FAILED: &str = "etl_runs_failed_total";
    pub const PHASE_DURATION: &str = "etl_phase_duration_seconds";
}

pub struct EtlMetrics;

impl EtlMetrics {
    pub fn record_rows_extracted(rows: usize) {
        ::metrics::counter!(names::ROWS_EXTRACTED).increment(rows as u64);
    }

    /// Rows removed by a cleaning stage (missing values, outliers, duplicates).
    pub fn record_rows_dropped(stage: &'static str, rows: usize) {
        if rows > 0 {
            ::metrics::counter!(names::ROWS_DROPPED, "stage" => stage).increment(rows as u64);
        }
    }

    pub fn record_rows_loaded(sink: &'static str, rows: usize) {
        ::metrics::counter!(names::ROWS_LOADED, "sink" => sink).increment(rows as u64);
    }

    pub fn record_run_succeeded() {
        ::metrics::counter!(names::RUNS_SUCCEEDED).increment(1);
    }

    pub fn record_run_failed(phase: Phase) {
        ::metrics::counter!(names::RUNS_FAILED, "phase" => phase.as_str()).increment(1);
    }
}

/// Records the lifetime of the guard into the phase duration histogram.
pub struct TimingGuard {
    start: Instant,
    phase: Phase,
}

impl TimingGuard {
    pub fn new(phase: Phase) -> Self {
        Self {
            start: Instant::now(),
            phase,
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        ::metrics::histogram!(names::PHASE_DURATION, "phase" => self.phase.as_str())
            .record(self.elapsed_secs());
    }
}

pub fn time_phase(phase: Phase) -> TimingGuard {
    TimingGuard::new(phase)
}
