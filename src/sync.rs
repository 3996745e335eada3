//! Per-table sync orchestration for warehouse-mirror.
//!
//! Each configured table moves through
//! `Probing → Provisioning → {FullLoading | Updating} → Done | Failed`.
//! A table failure is recorded and the run continues with the next table;
//! losing either connection ends the run.

use crate::config::{RetryConfig, SyncConfig, TableMapping, UnsupportedTypePolicy};
use crate::connector::{RowStream, SourceConnector, TargetConnector};
use crate::error::{Error, Result};
use crate::load::FullLoader;
use crate::metrics::{Metrics, Timer};
use crate::postgres::PostgresSource;
use crate::provision::{ProvisionOutcome, TableProvisioner};
use crate::schema::{ColumnSpec, TableSpec};
use crate::sql::{any_row, count_target, select_source};
use crate::type_map::map_type;
use crate::update::{IncrementalUpdater, RowIdentity};
use crate::value::Value;
use crate::warehouse::DuckDbWarehouse;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

/// How a table is brought up to date. Decided once per table per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDecision {
    /// Target is new or empty: copy every row
    FullLoad,
    /// Target has rows: diff and apply changes
    Incremental,
}

impl fmt::Display for SyncDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncDecision::FullLoad => write!(f, "full load"),
            SyncDecision::Incremental => write!(f, "incremental"),
        }
    }
}

/// Outcome of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableOutcome {
    /// Full load finished
    Loaded {
        /// Rows copied
        rows: u64,
    },
    /// Incremental update finished
    Updated {
        /// Rows inserted
        inserted: u64,
        /// Rows updated in place
        updated: u64,
        /// Rows deleted
        deleted: u64,
    },
    /// Table was not processed
    Skipped {
        /// Why
        reason: String,
    },
    /// Table failed; the run continued
    Failed {
        /// Error message
        cause: String,
        /// Stable error code
        code: String,
    },
}

impl TableOutcome {
    /// Whether this outcome is a failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, TableOutcome::Failed { .. })
    }

    /// Rows written to the warehouse.
    pub fn rows_affected(&self) -> u64 {
        match self {
            TableOutcome::Loaded { rows } => *rows,
            TableOutcome::Updated {
                inserted,
                updated,
                deleted,
            } => inserted + updated + deleted,
            _ => 0,
        }
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            TableOutcome::Loaded { .. } => "loaded",
            TableOutcome::Updated { .. } => "updated",
            TableOutcome::Skipped { .. } => "skipped",
            TableOutcome::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for TableOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableOutcome::Loaded { rows } => write!(f, "loaded {} rows", rows),
            TableOutcome::Updated {
                inserted,
                updated,
                deleted,
            } => {
                write!(f, "updated {} rows / inserted {} rows", updated, inserted)?;
                if *deleted > 0 {
                    write!(f, " / deleted {} rows", deleted)?;
                }
                Ok(())
            }
            TableOutcome::Skipped { reason } => write!(f, "skipped: {}", reason),
            TableOutcome::Failed { cause, .. } => write!(f, "failed: {}", cause),
        }
    }
}

/// Per-table entry of a [`SyncReport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableReport {
    /// Source table name
    pub source_table: String,
    /// Target table name
    pub target_table: String,
    /// Decision taken, if the table got that far
    pub decision: Option<SyncDecision>,
    /// Result
    pub outcome: TableOutcome,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

/// Summary of a run, one entry per configured table in configured order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    /// Whether every table succeeded or was skipped
    pub success: bool,
    /// Per-table results
    pub tables: Vec<TableReport>,
    /// Total duration in milliseconds
    pub duration_ms: u64,
    /// Timestamp when the run completed
    pub completed_at: String,
}

impl SyncReport {
    fn new(tables: Vec<TableReport>, duration_ms: u64) -> Self {
        Self {
            success: !tables.iter().any(|t| t.outcome.is_failure()),
            tables,
            duration_ms,
            completed_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Report entry for a source table.
    pub fn table(&self, source_table: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.source_table == source_table)
    }

    /// Total rows written across tables.
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.outcome.rows_affected()).sum()
    }

    /// Tables that failed.
    pub fn failed_tables(&self) -> impl Iterator<Item = &TableReport> {
        self.tables.iter().filter(|t| t.outcome.is_failure())
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for table in &self.tables {
            writeln!(f, "{}: {}", table.source_table, table.outcome)?;
        }
        Ok(())
    }
}

/// Warehouse-side state of a configured table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableStatus {
    /// Source table name
    pub source_table: String,
    /// Target table name
    pub target_table: String,
    /// Whether the table is part of runs
    pub enabled: bool,
    /// Whether the target table exists
    pub exists: bool,
    /// Row count of the target table
    pub rows: Option<i64>,
    /// What the next run would do
    pub next: SyncDecision,
}

/// Sync progress callback.
pub type ProgressCallback = Box<dyn Fn(SyncProgress) + Send + Sync>;

/// Sync progress update.
#[derive(Debug, Clone)]
pub struct SyncProgress {
    /// Source table being processed
    pub table: String,
    /// Phase just entered
    pub phase: SyncPhase,
    /// 1-based position of the table in the run
    pub position: usize,
    /// Number of configured tables
    pub total_tables: usize,
    /// Rows written, once known
    pub rows: Option<u64>,
}

/// Per-table phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Reading source metadata
    Probing,
    /// Creating or checking the target table
    Provisioning,
    /// Copying all rows
    FullLoading,
    /// Applying changes
    Updating,
    /// Finished
    Done,
    /// Failed
    Failed,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPhase::Probing => write!(f, "probing"),
            SyncPhase::Provisioning => write!(f, "provisioning"),
            SyncPhase::FullLoading => write!(f, "loading"),
            SyncPhase::Updating => write!(f, "updating"),
            SyncPhase::Done => write!(f, "done"),
            SyncPhase::Failed => write!(f, "failed"),
        }
    }
}

/// Run-wide settings the engine needs.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Prefix for target table names
    pub prefix: String,
    /// Warehouse schema for target tables
    pub target_schema: String,
    /// Rows per INSERT
    pub batch_size: usize,
    /// Per-table transactions
    pub use_transactions: bool,
    /// Unmapped source types
    pub unsupported_types: UnsupportedTypePolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            target_schema: "main".into(),
            batch_size: 1000,
            use_transactions: true,
            unsupported_types: UnsupportedTypePolicy::Fail,
        }
    }
}

impl From<&SyncConfig> for SyncOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            prefix: config.sync.prefix.clone(),
            target_schema: config.warehouse.schema.clone(),
            batch_size: config.sync.batch_size,
            use_transactions: config.sync.use_transactions,
            unsupported_types: config.sync.unsupported_types,
        }
    }
}

/// The two connections of a run. Dropping the context closes both.
pub struct SyncContext<S, T> {
    source: S,
    target: T,
}

impl<S: SourceConnector, T: TargetConnector> SyncContext<S, T> {
    /// Bundle a source and a target connection.
    pub fn new(source: S, target: T) -> Self {
        Self { source, target }
    }

    /// Source connection.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Mutable source connection.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Target connection.
    pub fn target(&self) -> &T {
        &self.target
    }
}

/// A probed source table, ready to provision and sync.
struct Probe<'a> {
    spec: TableSpec,
    identity: RowIdentity,
    rows: RowStream<'a>,
}

/// Mirrors configured tables from a source into a warehouse.
pub struct SyncEngine<S, T> {
    context: SyncContext<S, T>,
    options: SyncOptions,
    tables: Vec<TableMapping>,
    metrics: Arc<Metrics>,
    progress_callback: Option<Arc<ProgressCallback>>,
}

/// Engine over PostgreSQL and DuckDB/MotherDuck.
pub type SyncClient = SyncEngine<PostgresSource, DuckDbWarehouse>;

impl SyncEngine<PostgresSource, DuckDbWarehouse> {
    /// Open both connections described by `config`.
    #[instrument(skip(config), fields(tables = config.tables.len()))]
    pub async fn connect(config: &SyncConfig) -> Result<Self> {
        config.validate()?;
        info!("Initializing sync client...");

        let source = PostgresSource::connect(&config.source, &config.retry).await?;
        let target = DuckDbWarehouse::connect(config.warehouse.clone())?;

        Ok(Self::new(
            SyncContext::new(source, target),
            SyncOptions::from(config),
            config.tables.clone(),
        ))
    }
}

impl<S: SourceConnector, T: TargetConnector> SyncEngine<S, T> {
    /// Create an engine over an open context.
    pub fn new(context: SyncContext<S, T>, options: SyncOptions, tables: Vec<TableMapping>) -> Self {
        Self {
            context,
            options,
            tables,
            metrics: Arc::new(Metrics::new()),
            progress_callback: None,
        }
    }

    /// Set progress callback.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(SyncProgress) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(Box::new(callback)));
        self
    }

    /// Record into a shared metrics collector.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Metrics collected by this engine.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Configured tables.
    pub fn tables(&self) -> &[TableMapping] {
        &self.tables
    }

    /// Connections of this engine.
    pub fn context(&self) -> &SyncContext<S, T> {
        &self.context
    }

    /// Mutable access to the connections.
    pub fn context_mut(&mut self) -> &mut SyncContext<S, T> {
        &mut self.context
    }

    /// Test connectivity to both systems.
    pub async fn test_connectivity(&self) -> Result<()> {
        info!("Testing connectivity...");

        self.context.source.ping().await?;
        info!("Source: OK");

        self.context.target.ping()?;
        info!("Warehouse: OK");

        Ok(())
    }

    /// Mirror every configured table.
    ///
    /// Returns `Err` only when a connection is lost; table failures are
    /// recorded in the report.
    #[instrument(skip(self), fields(tables = self.tables.len()))]
    pub async fn run(&self) -> Result<SyncReport> {
        let start = Instant::now();
        info!("Starting sync of {} tables", self.tables.len());

        let mut reports = Vec::with_capacity(self.tables.len());
        for (idx, mapping) in self.tables.iter().enumerate() {
            let report = self.sync_table(mapping, idx + 1).await?;
            self.metrics.record_table(&report);
            reports.push(report);
        }

        let report = SyncReport::new(reports, start.elapsed().as_millis() as u64);
        self.metrics.record_run(&report);

        if report.success {
            info!(
                "Sync completed successfully in {}ms. Rows written: {}, Tables: {}",
                report.duration_ms,
                report.total_rows(),
                report.tables.len()
            );
        } else {
            warn!(
                "Sync completed with errors in {}ms. Rows written: {}, Failed tables: {}",
                report.duration_ms,
                report.total_rows(),
                report.failed_tables().count()
            );
        }

        Ok(report)
    }

    /// Mirror one table. Fatal errors are returned, all others recorded.
    #[instrument(skip(self, mapping), fields(table = %mapping.source_table))]
    async fn sync_table(&self, mapping: &TableMapping, position: usize) -> Result<TableReport> {
        let timer = Timer::start(format!("sync {}", mapping.source_table));
        let target_table = mapping.target_name(&self.options.prefix);

        if !mapping.enabled {
            debug!("Skipping disabled table: {}", mapping.source_table);
            return Ok(TableReport {
                source_table: mapping.source_table.clone(),
                target_table,
                decision: None,
                outcome: TableOutcome::Skipped {
                    reason: "disabled".into(),
                },
                duration_ms: timer.stop(),
            });
        }

        info!("Syncing table: {} -> {}", mapping.source_table, target_table);
        let mut decision = None;
        let outcome = match self.mirror(mapping, position, &mut decision).await {
            Ok(outcome) => {
                self.report_progress(mapping, SyncPhase::Done, position, Some(outcome.rows_affected()));
                info!("{}: {}", mapping.source_table, outcome);
                outcome
            }
            Err(e) if e.is_fatal() => {
                self.report_progress(mapping, SyncPhase::Failed, position, None);
                error!("Aborting run at {}: {}", mapping.source_table, e);
                return Err(e);
            }
            Err(e) => {
                self.report_progress(mapping, SyncPhase::Failed, position, None);
                warn!("Failed to sync table {}: {}", mapping.source_table, e);
                TableOutcome::Failed {
                    cause: e.to_string(),
                    code: e.code().into(),
                }
            }
        };

        Ok(TableReport {
            source_table: mapping.source_table.clone(),
            target_table,
            decision,
            outcome,
            duration_ms: timer.stop(),
        })
    }

    async fn mirror(
        &self,
        mapping: &TableMapping,
        position: usize,
        decision: &mut Option<SyncDecision>,
    ) -> Result<TableOutcome> {
        self.report_progress(mapping, SyncPhase::Probing, position, None);
        let probe = self.probe(mapping).await?;

        self.report_progress(mapping, SyncPhase::Provisioning, position, None);
        let provisioned = TableProvisioner::new(&self.context.target).ensure_table(&probe.spec)?;
        let chosen = self.decide(&probe.spec, provisioned)?;
        *decision = Some(chosen);
        debug!("Decision for {}: {}", mapping.source_table, chosen);

        match chosen {
            SyncDecision::FullLoad => {
                self.report_progress(mapping, SyncPhase::FullLoading, position, None);
                let rows = FullLoader::new(
                    &self.context.target,
                    self.options.batch_size,
                    self.options.use_transactions,
                )
                .load(probe.rows, &probe.spec)
                .await?;
                Ok(TableOutcome::Loaded { rows })
            }
            SyncDecision::Incremental => {
                self.report_progress(mapping, SyncPhase::Updating, position, None);
                let stats = IncrementalUpdater::new(
                    &self.context.target,
                    self.options.batch_size,
                    self.options.use_transactions,
                )
                .delete_missing(mapping.delete_missing)
                .update(probe.rows, &probe.spec, &probe.identity)
                .await?;
                Ok(TableOutcome::Updated {
                    inserted: stats.inserted,
                    updated: stats.updated,
                    deleted: stats.deleted,
                })
            }
        }
    }

    /// Resolve the row identity and open the source cursor.
    async fn probe(&self, mapping: &TableMapping) -> Result<Probe<'_>> {
        let key_columns = if mapping.key_columns.is_empty() {
            self.context.source.primary_key(&mapping.source_table).await?
        } else {
            mapping.key_columns.clone()
        };

        let result = self
            .context
            .source
            .query(&select_source(&mapping.source_table))
            .await?;

        let source_width = result.columns.len();
        let mut columns = Vec::with_capacity(source_width);
        let mut keep = Vec::with_capacity(source_width);
        for (idx, column) in result.columns.iter().enumerate() {
            match map_type(&column.name, &column.type_name) {
                Ok(target_type) => {
                    columns.push(ColumnSpec::new(&column.name, &column.type_name, target_type));
                    keep.push(idx);
                }
                Err(e) if self.options.unsupported_types == UnsupportedTypePolicy::SkipColumn => {
                    warn!("Skipping column of {}: {}", mapping.source_table, e);
                }
                Err(e) => return Err(e),
            }
        }

        let spec = TableSpec::new(
            &mapping.source_table,
            &self.options.prefix,
            &self.options.target_schema,
            columns,
        );
        let identity = RowIdentity::resolve(&spec, &key_columns)?;

        let rows = if keep.len() == source_width {
            result.rows
        } else {
            let table = mapping.source_table.clone();
            result
                .rows
                .map(move |row| project(row?, &keep, source_width, &table))
                .boxed()
        };

        Ok(Probe {
            spec,
            identity,
            rows,
        })
    }

    /// Full load for a new or empty table, incremental otherwise.
    pub fn decide(&self, spec: &TableSpec, provisioned: ProvisionOutcome) -> Result<SyncDecision> {
        if provisioned == ProvisionOutcome::Created {
            return Ok(SyncDecision::FullLoad);
        }
        let probe = self.context.target.query(&any_row(spec))?;
        Ok(if probe.is_empty() {
            SyncDecision::FullLoad
        } else {
            SyncDecision::Incremental
        })
    }

    /// Warehouse-side state of every configured table.
    pub fn status(&self) -> Result<Vec<TableStatus>> {
        let provisioner = TableProvisioner::new(&self.context.target);

        self.tables
            .iter()
            .map(|mapping| {
                let spec = TableSpec::new(
                    &mapping.source_table,
                    &self.options.prefix,
                    &self.options.target_schema,
                    Vec::new(),
                );
                let exists = !provisioner.existing_columns(&spec)?.is_empty();
                let rows = if exists {
                    match self.context.target.query(&count_target(&spec))?.rows.first() {
                        Some(row) => match row.first() {
                            Some(Value::Int(n)) => Some(*n),
                            _ => None,
                        },
                        None => None,
                    }
                } else {
                    None
                };
                let next = match rows {
                    Some(n) if n > 0 => SyncDecision::Incremental,
                    _ => SyncDecision::FullLoad,
                };

                Ok(TableStatus {
                    source_table: mapping.source_table.clone(),
                    target_table: spec.target_name,
                    enabled: mapping.enabled,
                    exists,
                    rows,
                    next,
                })
            })
            .collect()
    }

    /// Report progress via callback.
    fn report_progress(
        &self,
        mapping: &TableMapping,
        phase: SyncPhase,
        position: usize,
        rows: Option<u64>,
    ) {
        if let Some(ref callback) = self.progress_callback {
            callback(SyncProgress {
                table: mapping.source_table.clone(),
                phase,
                position,
                total_tables: self.tables.len(),
                rows,
            });
        }
    }
}

/// Keep only the mapped columns of a source row.
fn project(row: Vec<Value>, keep: &[usize], width: usize, table: &str) -> Result<Vec<Value>> {
    if row.len() != width {
        return Err(Error::schema(format!(
            "row of {} has {} values, expected {}",
            table,
            row.len(),
            width
        )));
    }
    let mut row: Vec<Option<Value>> = row.into_iter().map(Some).collect();
    Ok(keep.iter().filter_map(|&idx| row[idx].take()).collect())
}

/// Create exponential backoff from config.
pub fn create_backoff(config: &RetryConfig) -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(config.initial_backoff())
        .with_max_interval(config.max_backoff())
        .with_multiplier(config.multiplier)
        .with_randomization_factor(if config.jitter { 0.5 } else { 0.0 })
        .with_max_elapsed_time(Some(Duration::from_secs(300)))
        .build()
}
