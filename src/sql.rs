//! Statement construction.
//!
//! Data values never appear in SQL text: they are bound as parameters.
//! Identifiers (table and column names from configuration or source
//! metadata) are double-quoted with embedded quotes doubled.

use crate::schema::TableSpec;
use crate::value::Value;

/// A SQL statement with bound parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    sql: String,
    params: Vec<Value>,
}

impl Statement {
    /// Create a statement without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Create a statement with parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Append a parameter.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    /// SQL text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Bound parameters, in placeholder order.
    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Statement::new(sql)
    }
}

/// Quote a single identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a possibly schema-qualified name (`schema.table`).
pub fn quote_qualified(name: &str) -> String {
    name.split('.').map(quote_ident).collect::<Vec<_>>().join(".")
}

fn column_list(spec: &TableSpec) -> String {
    spec.columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `SELECT *` over a source table: column metadata plus every row.
pub fn select_source(source_table: &str) -> Statement {
    Statement::new(format!("SELECT * FROM {}", quote_qualified(source_table)))
}

/// Columns of a warehouse table, in ordinal order.
pub fn describe_target(schema: &str, table: &str) -> Statement {
    Statement::new(
        "SELECT column_name, data_type FROM information_schema.columns \
         WHERE table_catalog = current_database() AND table_schema = ? AND table_name = ? \
         ORDER BY ordinal_position",
    )
    .bind(schema)
    .bind(table)
}

/// Probe whether a warehouse table holds at least one row.
pub fn any_row(spec: &TableSpec) -> Statement {
    Statement::new(format!("SELECT 1 FROM {} LIMIT 1", spec.qualified_target()))
}

/// Read every row of a warehouse table in table column order.
pub fn select_target(spec: &TableSpec) -> Statement {
    Statement::new(format!(
        "SELECT {} FROM {}",
        column_list(spec),
        spec.qualified_target()
    ))
}

/// Count the rows of a warehouse table.
pub fn count_target(spec: &TableSpec) -> Statement {
    Statement::new(format!("SELECT COUNT(*) FROM {}", spec.qualified_target()))
}

/// Multi-row parameterized insert.
pub fn insert_rows(spec: &TableSpec, rows: &[Vec<Value>]) -> Statement {
    let placeholders = format!(
        "({})",
        vec!["?"; spec.width()].join(", ")
    );
    let values = vec![placeholders.as_str(); rows.len()].join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        spec.qualified_target(),
        column_list(spec),
        values
    );
    let params = rows.iter().flat_map(|row| row.iter().cloned()).collect();
    Statement::with_params(sql, params)
}

fn key_predicate(spec: &TableSpec, key: &[usize]) -> String {
    key.iter()
        .map(|&idx| format!("{} IS NOT DISTINCT FROM ?", quote_ident(&spec.columns[idx].name)))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Update the given columns of the rows matching a key.
pub fn update_row(spec: &TableSpec, key: &[usize], changed: &[usize], row: &[Value]) -> Statement {
    let assignments = changed
        .iter()
        .map(|&idx| format!("{} = ?", quote_ident(&spec.columns[idx].name)))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        spec.qualified_target(),
        assignments,
        key_predicate(spec, key)
    );
    let params = changed
        .iter()
        .chain(key.iter())
        .map(|&idx| row[idx].clone())
        .collect();
    Statement::with_params(sql, params)
}

/// Delete the rows matching a key.
pub fn delete_row(spec: &TableSpec, key: &[usize], row: &[Value]) -> Statement {
    let sql = format!(
        "DELETE FROM {} WHERE {}",
        spec.qualified_target(),
        key_predicate(spec, key)
    );
    let params = key.iter().map(|&idx| row[idx].clone()).collect();
    Statement::with_params(sql, params)
}
