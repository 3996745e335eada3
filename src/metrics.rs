//! Metrics and observability for warehouse-mirror.
//!
//! Counters are kept in-process for snapshots and also emitted through the
//! `metrics` facade, so any installed recorder sees them.

use crate::sync::{SyncReport, TableOutcome, TableReport};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Metrics collector for sync runs.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Runs completed
    pub runs_total: AtomicU64,
    /// Tables fully loaded
    pub tables_loaded: AtomicU64,
    /// Tables incrementally updated
    pub tables_updated: AtomicU64,
    /// Tables skipped
    pub tables_skipped: AtomicU64,
    /// Tables failed
    pub tables_failed: AtomicU64,
    /// Rows copied by full loads
    pub rows_loaded: AtomicU64,
    /// Rows inserted by updates
    pub rows_inserted: AtomicU64,
    /// Rows updated in place
    pub rows_updated: AtomicU64,
    /// Rows deleted
    pub rows_deleted: AtomicU64,
    /// Total table duration in milliseconds
    pub table_duration_ms: AtomicU64,
}

impl Metrics {
    /// Create new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one table.
    pub fn record_table(&self, report: &TableReport) {
        match &report.outcome {
            TableOutcome::Loaded { rows } => {
                self.tables_loaded.fetch_add(1, Ordering::Relaxed);
                self.rows_loaded.fetch_add(*rows, Ordering::Relaxed);
                metrics::counter!("warehouse_mirror_rows_total", "op" => "load").increment(*rows);
            }
            TableOutcome::Updated {
                inserted,
                updated,
                deleted,
            } => {
                self.tables_updated.fetch_add(1, Ordering::Relaxed);
                self.rows_inserted.fetch_add(*inserted, Ordering::Relaxed);
                self.rows_updated.fetch_add(*updated, Ordering::Relaxed);
                self.rows_deleted.fetch_add(*deleted, Ordering::Relaxed);
                metrics::counter!("warehouse_mirror_rows_total", "op" => "insert")
                    .increment(*inserted);
                metrics::counter!("warehouse_mirror_rows_total", "op" => "update")
                    .increment(*updated);
                metrics::counter!("warehouse_mirror_rows_total", "op" => "delete")
                    .increment(*deleted);
            }
            TableOutcome::Skipped { .. } => {
                self.tables_skipped.fetch_add(1, Ordering::Relaxed);
            }
            TableOutcome::Failed { .. } => {
                self.tables_failed.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.table_duration_ms
            .fetch_add(report.duration_ms, Ordering::Relaxed);
        metrics::counter!("warehouse_mirror_tables_total", "outcome" => report.outcome.label())
            .increment(1);
        metrics::histogram!("warehouse_mirror_table_duration_ms")
            .record(report.duration_ms as f64);
    }

    /// Record a completed run.
    pub fn record_run(&self, report: &SyncReport) {
        self.runs_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("warehouse_mirror_runs_total", "success" => report.success.to_string())
            .increment(1);
        metrics::histogram!("warehouse_mirror_run_duration_ms").record(report.duration_ms as f64);
    }

    /// Get snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runs_total: self.runs_total.load(Ordering::Relaxed),
            tables_loaded: self.tables_loaded.load(Ordering::Relaxed),
            tables_updated: self.tables_updated.load(Ordering::Relaxed),
            tables_skipped: self.tables_skipped.load(Ordering::Relaxed),
            tables_failed: self.tables_failed.load(Ordering::Relaxed),
            rows_loaded: self.rows_loaded.load(Ordering::Relaxed),
            rows_inserted: self.rows_inserted.load(Ordering::Relaxed),
            rows_updated: self.rows_updated.load(Ordering::Relaxed),
            rows_deleted: self.rows_deleted.load(Ordering::Relaxed),
            table_duration_ms: self.table_duration_ms.load(Ordering::Relaxed),
        }
    }

    /// Reset all metrics.
    pub fn reset(&self) {
        for counter in [
            &self.runs_total,
            &self.tables_loaded,
            &self.tables_updated,
            &self.tables_skipped,
            &self.tables_failed,
            &self.rows_loaded,
            &self.rows_inserted,
            &self.rows_updated,
            &self.rows_deleted,
            &self.table_duration_ms,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Runs completed
    pub runs_total: u64,
    /// Tables fully loaded
    pub tables_loaded: u64,
    /// Tables incrementally updated
    pub tables_updated: u64,
    /// Tables skipped
    pub tables_skipped: u64,
    /// Tables failed
    pub tables_failed: u64,
    /// Rows copied by full loads
    pub rows_loaded: u64,
    /// Rows inserted by updates
    pub rows_inserted: u64,
    /// Rows updated in place
    pub rows_updated: u64,
    /// Rows deleted
    pub rows_deleted: u64,
    /// Total table duration in milliseconds
    pub table_duration_ms: u64,
}

impl MetricsSnapshot {
    /// Tables processed, skipped ones excluded.
    pub fn tables_processed(&self) -> u64 {
        self.tables_loaded + self.tables_updated + self.tables_failed
    }

    /// Rows written to the warehouse.
    pub fn rows_written(&self) -> u64 {
        self.rows_loaded + self.rows_inserted + self.rows_updated + self.rows_deleted
    }

    /// Calculate success rate over processed tables.
    pub fn success_rate(&self) -> f64 {
        let processed = self.tables_processed();
        if processed == 0 {
            0.0
        } else {
            (processed - self.tables_failed) as f64 / processed as f64
        }
    }

    /// Calculate rows written per second.
    pub fn rows_per_second(&self) -> f64 {
        if self.table_duration_ms == 0 {
            0.0
        } else {
            (self.rows_written() as f64 * 1000.0) / self.table_duration_ms as f64
        }
    }
}

/// Timer for measuring operation duration.
pub struct Timer {
    start: Instant,
    label: String,
}

impl Timer {
    /// Start a new timer.
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            label: label.into(),
        }
    }

    /// Get elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Stop timer and log duration.
    pub fn stop(self) -> u64 {
        let elapsed = self.elapsed_ms();
        tracing::debug!("{} completed in {}ms", self.label, elapsed);
        elapsed
    }
}
