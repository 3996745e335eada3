//! Connector interfaces consumed by the sync engine.
//!
//! The engine never talks to a database directly: it issues [`Statement`]s
//! through a [`SourceConnector`] and a [`TargetConnector`]. Every call
//! returns a [`Result`]; there are no sentinel values.

use crate::error::{Error, Result};
use crate::sql::Statement;
use crate::value::Value;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use std::collections::HashMap;

/// One row of values aligned with the result's columns.
pub type SourceRow = Vec<Value>;

/// Lazy, single-pass sequence of source rows.
pub type RowStream<'a> = BoxStream<'a, Result<SourceRow>>;

/// Column metadata reported by a connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    /// Column name
    pub name: String,
    /// Type name as the connector reports it
    pub type_name: String,
}

impl ColumnMeta {
    /// Create column metadata.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Result of a source query: metadata is available before any row is read.
pub struct SourceResult<'a> {
    /// Result columns, in row order
    pub columns: Vec<ColumnMeta>,
    /// Row cursor, consumed once
    pub rows: RowStream<'a>,
}

impl std::fmt::Debug for SourceResult<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceResult")
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

/// Read access to the system of record.
#[allow(async_fn_in_trait)]
pub trait SourceConnector {
    /// Run a read query.
    async fn query(&self, statement: &Statement) -> Result<SourceResult<'_>>;

    /// Primary key columns of a table, in key order. Empty when unknown.
    async fn primary_key(&self, _table: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// Test connectivity.
    async fn ping(&self) -> Result<()>;
}

/// Fully read result of a warehouse query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetResult {
    /// Result column names
    pub columns: Vec<String>,
    /// Rows
    pub rows: Vec<Vec<Value>>,
}

impl TargetResult {
    /// Whether the query returned no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Read/write/DDL access to the warehouse.
pub trait TargetConnector {
    /// Run a query and read all of its rows.
    fn query(&self, statement: &Statement) -> Result<TargetResult>;

    /// Run a DDL or DML statement, returning the affected row count.
    fn execute(&self, statement: &Statement) -> Result<usize>;

    /// Test connectivity.
    fn ping(&self) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    columns: Vec<ColumnMeta>,
    rows: Vec<SourceRow>,
    primary_key: Vec<String>,
}

/// In-process source holding tables in memory.
///
/// Understands the statements the engine sends a source: `SELECT * FROM
/// <table>`. Used by tests and by embedders mirroring data they already
/// hold.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    tables: HashMap<String, MemoryTable>,
    disconnect_on: Option<String>,
}

impl MemorySource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a table.
    pub fn with_table(
        mut self,
        name: impl Into<String>,
        columns: Vec<ColumnMeta>,
        rows: Vec<SourceRow>,
    ) -> Self {
        self.set_table(name, columns, rows);
        self
    }

    /// Declare the primary key of a table added earlier.
    pub fn with_primary_key(
        mut self,
        table: &str,
        columns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        if let Some(t) = self.tables.get_mut(table) {
            t.primary_key = columns.into_iter().map(Into::into).collect();
        }
        self
    }

    /// Simulate losing the connection when `table` is queried.
    pub fn disconnect_on(mut self, table: impl Into<String>) -> Self {
        self.disconnect_on = Some(table.into());
        self
    }

    /// Add (or replace) a table in place.
    pub fn set_table(
        &mut self,
        name: impl Into<String>,
        columns: Vec<ColumnMeta>,
        rows: Vec<SourceRow>,
    ) {
        let name = name.into();
        let primary_key = self
            .tables
            .get(&name)
            .map(|t| t.primary_key.clone())
            .unwrap_or_default();
        self.tables.insert(
            name,
            MemoryTable {
                columns,
                rows,
                primary_key,
            },
        );
    }

    /// Replace the rows of an existing table.
    pub fn set_rows(&mut self, table: &str, rows: Vec<SourceRow>) {
        if let Some(t) = self.tables.get_mut(table) {
            t.rows = rows;
        }
    }

    fn table_of(sql: &str) -> Option<String> {
        let upper = sql.to_ascii_uppercase();
        let from = upper.find(" FROM ")? + " FROM ".len();
        let rest = sql[from..].trim();
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        Some(
            rest[..end]
                .split('.')
                .map(|part| part.trim_matches('"').replace("\"\"", "\""))
                .collect::<Vec<_>>()
                .join("."),
        )
    }
}

impl SourceConnector for MemorySource {
    async fn query(&self, statement: &Statement) -> Result<SourceResult<'_>> {
        let sql = statement.sql();
        let name = Self::table_of(sql)
            .ok_or_else(|| Error::source_query_msg(sql, "Unsupported statement"))?;

        if self.disconnect_on.as_deref() == Some(name.as_str()) {
            return Err(Error::source_disconnected(format!(
                "connection lost while reading {}",
                name
            )));
        }

        let table = self
            .tables
            .get(&name)
            .ok_or_else(|| Error::source_query_msg(sql, format!("relation {} does not exist", name)))?;

        Ok(SourceResult {
            columns: table.columns.clone(),
            rows: stream::iter(table.rows.clone().into_iter().map(Ok)).boxed(),
        })
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        Ok(self
            .tables
            .get(table)
            .map(|t| t.primary_key.clone())
            .unwrap_or_default())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
