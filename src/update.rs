//! Incremental update of a populated warehouse table.
//!
//! The current target rows are read once and indexed by row identity. Each
//! source row is then inserted (unknown identity), updated in place (known
//! identity, different non-key values) or left alone. Rows are never
//! deleted and re-inserted to express a change.

use crate::connector::{RowStream, SourceRow, TargetConnector};
use crate::error::{Error, Result};
use crate::load::{WriteScope, check_width};
use crate::schema::TableSpec;
use crate::sql::{delete_row, insert_rows, select_target, update_row};
use crate::value::Value;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument, warn};

/// How rows of a table are told apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowIdentity {
    /// Positions of the key columns in the table spec
    Key(Vec<usize>),
    /// No key: the whole row is its identity
    FullRow,
}

impl RowIdentity {
    /// Resolve key column names against a spec. No names means full-row
    /// identity.
    pub fn resolve(spec: &TableSpec, key_columns: &[String]) -> Result<Self> {
        if key_columns.is_empty() {
            return Ok(RowIdentity::FullRow);
        }
        key_columns
            .iter()
            .map(|name| {
                spec.position(name).ok_or_else(|| {
                    Error::schema(format!(
                        "key column '{}' is not a mirrored column of {}",
                        name, spec.source_name
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(RowIdentity::Key)
    }

    /// Column positions compared to match rows.
    pub fn positions(&self, spec: &TableSpec) -> Vec<usize> {
        match self {
            RowIdentity::Key(positions) => positions.clone(),
            RowIdentity::FullRow => (0..spec.width()).collect(),
        }
    }

    fn key_of(positions: &[usize], row: &[Value]) -> Vec<Value> {
        positions.iter().map(|&idx| row[idx].clone()).collect()
    }
}

/// Counts from one incremental update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStats {
    /// Rows inserted
    pub inserted: u64,
    /// Rows updated in place
    pub updated: u64,
    /// Rows deleted (only with `delete_missing`)
    pub deleted: u64,
    /// Source rows already present and equal
    pub unchanged: u64,
}

impl UpdateStats {
    /// Rows written to the warehouse.
    pub fn rows_affected(&self) -> u64 {
        self.inserted + self.updated + self.deleted
    }
}

/// Brings a populated target table in line with its source.
pub struct IncrementalUpdater<'a, T: TargetConnector> {
    target: &'a T,
    batch_size: usize,
    use_transactions: bool,
    delete_missing: bool,
}

impl<'a, T: TargetConnector> IncrementalUpdater<'a, T> {
    /// Create an updater.
    pub fn new(target: &'a T, batch_size: usize, use_transactions: bool) -> Self {
        Self {
            target,
            batch_size: batch_size.max(1),
            use_transactions,
            delete_missing: false,
        }
    }

    /// Also delete target rows whose identity no longer occurs in the source.
    pub fn delete_missing(mut self, on: bool) -> Self {
        self.delete_missing = on;
        self
    }

    /// Apply the source rows to the target table.
    #[instrument(skip(self, rows, spec, identity), fields(table = %spec.target_name))]
    pub async fn update(
        &self,
        rows: RowStream<'_>,
        spec: &TableSpec,
        identity: &RowIdentity,
    ) -> Result<UpdateStats> {
        let scope = WriteScope::begin(self.target, self.use_transactions)?;

        match self.apply(rows, spec, identity).await {
            Ok(stats) => {
                scope.commit()?;
                info!(
                    inserted = stats.inserted,
                    updated = stats.updated,
                    deleted = stats.deleted,
                    unchanged = stats.unchanged,
                    "Updated {}",
                    spec.target_name
                );
                Ok(stats)
            }
            Err(e) => {
                let rolled_back = scope.rollback();
                warn!(rolled_back, "Update of {} failed: {}", spec.target_name, e);
                Err(e)
            }
        }
    }

    async fn apply(
        &self,
        mut rows: RowStream<'_>,
        spec: &TableSpec,
        identity: &RowIdentity,
    ) -> Result<UpdateStats> {
        let positions = identity.positions(spec);
        let mut index = self.index_target(spec, &positions)?;
        debug!(keys = index.len(), "Indexed target rows");

        let mut stats = UpdateStats::default();
        let mut seen: HashSet<Vec<Value>> = HashSet::new();
        let mut pending: Vec<SourceRow> = Vec::new();
        let mut read = 0u64;

        while let Some(row) = rows.next().await {
            let mut row = row?;
            check_width(spec, &row, read)?;
            spec.conform_row(&mut row);
            read += 1;

            let key = RowIdentity::key_of(&positions, &row);
            seen.insert(key.clone());

            match identity {
                RowIdentity::FullRow => match index.get_mut(&key) {
                    Some(slot) if slot.remaining > 0 => {
                        slot.remaining -= 1;
                        stats.unchanged += 1;
                    }
                    _ => {
                        stats.inserted += 1;
                        pending.push(row);
                    }
                },
                RowIdentity::Key(_) => match index.get_mut(&key) {
                    Some(slot) => {
                        let changed: Vec<usize> = (0..spec.width())
                            .filter(|idx| !positions.contains(idx))
                            .filter(|&idx| slot.row[idx] != row[idx])
                            .collect();
                        if changed.is_empty() {
                            stats.unchanged += 1;
                        } else {
                            // The matched row may still be waiting in `pending`
                            self.insert(spec, &mut pending)?;
                            self.target
                                .execute(&update_row(spec, &positions, &changed, &row))?;
                            stats.updated += 1;
                            slot.row = row;
                        }
                    }
                    None => {
                        index.insert(
                            key,
                            IndexedRow {
                                row: row.clone(),
                                remaining: 0,
                            },
                        );
                        stats.inserted += 1;
                        pending.push(row);
                    }
                },
            }

            if pending.len() >= self.batch_size {
                self.insert(spec, &mut pending)?;
            }
        }
        self.insert(spec, &mut pending)?;

        if self.delete_missing {
            for (key, slot) in &index {
                if !seen.contains(key) {
                    stats.deleted += self
                        .target
                        .execute(&delete_row(spec, &positions, &slot.row))?
                        as u64;
                }
            }
        }

        Ok(stats)
    }

    /// Current target rows keyed by identity. For full-row identity the slot
    /// counts duplicates so repeated source rows are matched one-to-one.
    fn index_target(
        &self,
        spec: &TableSpec,
        positions: &[usize],
    ) -> Result<HashMap<Vec<Value>, IndexedRow>> {
        let current = self.target.query(&select_target(spec))?;
        let mut index: HashMap<Vec<Value>, IndexedRow> = HashMap::with_capacity(current.rows.len());

        for row in current.rows {
            let key = RowIdentity::key_of(positions, &row);
            index
                .entry(key)
                .and_modify(|slot| slot.remaining += 1)
                .or_insert(IndexedRow { row, remaining: 1 });
        }
        Ok(index)
    }

    fn insert(&self, spec: &TableSpec, pending: &mut Vec<SourceRow>) -> Result<()> {
        if pending.is_empty() {
            return Ok(());
        }
        let inserted = self.target.execute(&insert_rows(spec, pending))?;
        debug!(inserted, "Inserted new rows");
        pending.clear();
        Ok(())
    }
}

struct IndexedRow {
    row: SourceRow,
    remaining: usize,
}
