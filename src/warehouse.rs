//! DuckDB / MotherDuck warehouse connector for warehouse-mirror.

use crate::config::WarehouseConfig;
use crate::connector::{TargetConnector, TargetResult};
use crate::error::{Error, Result};
use crate::sql::{Statement, quote_ident};
use crate::value::Value;
use duckdb::Connection;
use duckdb::types::Value as DuckValue;
use tracing::{debug, info, instrument};

/// DuckDB warehouse client.
pub struct DuckDbWarehouse {
    conn: Connection,
    config: WarehouseConfig,
}

impl DuckDbWarehouse {
    /// Open the warehouse described by `config`.
    ///
    /// `path` is `:memory:`, a database file, or a MotherDuck `md:<database>`
    /// URI; for the latter the configured token is appended.
    #[instrument(skip(config), fields(path = %config.display_path()))]
    pub fn connect(config: WarehouseConfig) -> Result<Self> {
        info!("Opening warehouse...");

        let conn = if config.path == ":memory:" {
            Connection::open_in_memory()
        } else if config.path.starts_with("md:") {
            let conn_str = match config.token {
                Some(ref token) if !config.path.contains("motherduck_token=") => {
                    let sep = if config.path.contains('?') { '&' } else { '?' };
                    format!("{}{}motherduck_token={}", config.path, sep, token)
                }
                _ => config.path.clone(),
            };
            Connection::open(&conn_str)
        } else {
            Connection::open(&config.path)
        }
        .map_err(|e| Error::target_connection("Failed to open warehouse", e))?;

        let warehouse = Self { conn, config };
        warehouse.ensure_schema()?;

        info!("Opened warehouse: {}", warehouse.config.display_path());
        Ok(warehouse)
    }

    /// Open a throwaway in-memory warehouse.
    pub fn in_memory() -> Result<Self> {
        Self::connect(WarehouseConfig {
            path: ":memory:".into(),
            ..Default::default()
        })
    }

    /// Ensure the target schema exists.
    pub fn ensure_schema(&self) -> Result<()> {
        if self.config.schema != "main" {
            let query = format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(&self.config.schema));
            self.conn
                .execute(&query, [])
                .map_err(|e| Error::target_connection("Create schema failed", e))?;
        }
        Ok(())
    }
}

fn bind_params(statement: &Statement) -> Vec<DuckValue> {
    statement.params().iter().map(Value::to_duckdb).collect()
}

impl TargetConnector for DuckDbWarehouse {
    fn query(&self, statement: &Statement) -> Result<TargetResult> {
        debug!(sql = statement.sql(), params = statement.params().len(), "Warehouse query");

        let sql = statement.sql();
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| Error::target_query(sql, "Prepare failed", e))?;

        let mut rows = Vec::new();
        {
            let mut cursor = stmt
                .query(duckdb::params_from_iter(bind_params(statement)))
                .map_err(|e| Error::target_query(sql, "Query failed", e))?;

            while let Some(row) = cursor
                .next()
                .map_err(|e| Error::target_query(sql, "Row fetch failed", e))?
            {
                let width = row.as_ref().column_count();
                let mut values = Vec::with_capacity(width);
                for idx in 0..width {
                    let value: DuckValue = row
                        .get(idx)
                        .map_err(|e| Error::target_query(sql, "Value decode failed", e))?;
                    values.push(Value::from_duckdb(value));
                }
                rows.push(values);
            }
        }

        Ok(TargetResult {
            columns: stmt.column_names(),
            rows,
        })
    }

    fn execute(&self, statement: &Statement) -> Result<usize> {
        debug!(sql = statement.sql(), params = statement.params().len(), "Warehouse execute");

        self.conn
            .execute(
                statement.sql(),
                duckdb::params_from_iter(bind_params(statement)),
            )
            .map_err(|e| Error::target_execute(statement.sql(), "Execute failed", e))
    }

    fn ping(&self) -> Result<()> {
        self.conn
            .query_row("SELECT 1", [], |row| row.get::<_, i32>(0))
            .map_err(|e| Error::target_connection("Ping failed", e))?;
        Ok(())
    }
}
