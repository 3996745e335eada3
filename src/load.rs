//! Full load of a source table into an empty warehouse table.

use crate::connector::{RowStream, SourceRow, TargetConnector};
use crate::error::{Error, Result};
use crate::schema::TableSpec;
use crate::sql::{Statement, insert_rows};
use futures::StreamExt;
use tracing::{debug, info, instrument, warn};

/// Explicit transaction on a warehouse connection.
///
/// A scope opened with `enabled == false` is a no-op, so callers can use the
/// same code path with and without transactions.
pub(crate) struct WriteScope<'a, T: TargetConnector> {
    target: &'a T,
    active: bool,
}

impl<'a, T: TargetConnector> WriteScope<'a, T> {
    pub(crate) fn begin(target: &'a T, enabled: bool) -> Result<Self> {
        if enabled {
            target.execute(&Statement::new("BEGIN TRANSACTION"))?;
        }
        Ok(Self {
            target,
            active: enabled,
        })
    }

    pub(crate) fn commit(mut self) -> Result<()> {
        if self.active {
            self.active = false;
            self.target.execute(&Statement::new("COMMIT"))?;
        }
        Ok(())
    }

    /// Roll back, returning whether anything was undone.
    pub(crate) fn rollback(mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        match self.target.execute(&Statement::new("ROLLBACK")) {
            Ok(_) => true,
            Err(e) => {
                warn!("Rollback failed: {}", e);
                false
            }
        }
    }
}

impl<T: TargetConnector> Drop for WriteScope<'_, T> {
    fn drop(&mut self) {
        if self.active {
            let _ = self.target.execute(&Statement::new("ROLLBACK"));
        }
    }
}

/// Reject a row whose width differs from the table's.
pub(crate) fn check_width(spec: &TableSpec, row: &SourceRow, position: u64) -> Result<()> {
    if row.len() != spec.width() {
        return Err(Error::schema(format!(
            "row {} of {} has {} values, expected {}",
            position + 1,
            spec.source_name,
            row.len(),
            spec.width()
        )));
    }
    Ok(())
}

/// Streams source rows into an empty target table in batches.
pub struct FullLoader<'a, T: TargetConnector> {
    target: &'a T,
    batch_size: usize,
    use_transactions: bool,
}

impl<'a, T: TargetConnector> FullLoader<'a, T> {
    /// Create a loader.
    pub fn new(target: &'a T, batch_size: usize, use_transactions: bool) -> Self {
        Self {
            target,
            batch_size: batch_size.max(1),
            use_transactions,
        }
    }

    /// Copy every row of `rows` into the target table of `spec`.
    ///
    /// Returns the number of rows read, which equals the number inserted.
    /// Any failure stops the load with [`Error::PartialLoad`]; with
    /// transactions enabled the rows already written are rolled back.
    #[instrument(skip(self, rows, spec), fields(table = %spec.target_name))]
    pub async fn load(&self, rows: RowStream<'_>, spec: &TableSpec) -> Result<u64> {
        let scope = WriteScope::begin(self.target, self.use_transactions)?;
        let mut written = 0u64;

        let outcome = match self.copy_rows(rows, spec, &mut written).await {
            Ok(()) => scope
                .commit()
                .map_err(|cause| (cause, self.use_transactions)),
            Err(cause) => Err((cause, scope.rollback())),
        };

        match outcome {
            Ok(()) => {
                info!("Loaded {} rows into {}", written, spec.target_name);
                Ok(written)
            }
            Err((cause, rolled_back)) => {
                warn!(
                    rows_written = written,
                    rolled_back, "Full load of {} failed: {}", spec.target_name, cause
                );
                Err(Error::partial_load(
                    &spec.target_name,
                    written,
                    rolled_back,
                    cause,
                ))
            }
        }
    }

    async fn copy_rows(
        &self,
        mut rows: RowStream<'_>,
        spec: &TableSpec,
        written: &mut u64,
    ) -> Result<()> {
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut read = 0u64;

        while let Some(row) = rows.next().await {
            let mut row = row?;
            check_width(spec, &row, read)?;
            spec.conform_row(&mut row);
            read += 1;
            batch.push(row);

            if batch.len() >= self.batch_size {
                *written += self.flush(spec, &mut batch)?;
            }
        }
        *written += self.flush(spec, &mut batch)?;

        if *written != read {
            return Err(Error::target_execute_msg(
                format!("INSERT INTO {}", spec.qualified_target()),
                format!("read {} rows but inserted {}", read, written),
            ));
        }
        Ok(())
    }

    fn flush(&self, spec: &TableSpec, batch: &mut Vec<SourceRow>) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }
        let statement = insert_rows(spec, batch);
        let inserted = self.target.execute(&statement)?;
        debug!(rows = batch.len(), inserted, "Inserted batch");
        batch.clear();
        Ok(inserted as u64)
    }
}
