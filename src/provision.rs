//! Target table provisioning.

use crate::connector::TargetConnector;
use crate::error::{Error, Result};
use crate::schema::{ExistingColumn, TableSpec};
use crate::sql::{Statement, describe_target};
use crate::value::Value;
use tracing::{debug, info, instrument};

/// Result of [`TableProvisioner::ensure_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// The table did not exist and was created
    Created,
    /// A compatible table was already present
    AlreadyExists,
}

/// Creates warehouse tables and checks existing ones against a [`TableSpec`].
pub struct TableProvisioner<'a, T: TargetConnector> {
    target: &'a T,
}

impl<'a, T: TargetConnector> TableProvisioner<'a, T> {
    /// Create a provisioner over a warehouse connection.
    pub fn new(target: &'a T) -> Self {
        Self { target }
    }

    /// Columns of the target table, empty when it does not exist.
    pub fn existing_columns(&self, spec: &TableSpec) -> Result<Vec<ExistingColumn>> {
        let result = self
            .target
            .query(&describe_target(&spec.target_schema, &spec.target_name))?;

        result
            .rows
            .into_iter()
            .map(|row| match row.as_slice() {
                [Value::Text(name), Value::Text(data_type)] => Ok(ExistingColumn {
                    name: name.clone(),
                    data_type: data_type.clone(),
                }),
                other => Err(Error::schema(format!(
                    "unexpected information_schema row for {}: {:?}",
                    spec.target_name, other
                ))),
            })
            .collect()
    }

    /// Make sure the target table exists with the expected columns.
    ///
    /// Idempotent: once a call has returned `Created`, later calls return
    /// `AlreadyExists` and issue no DDL.
    #[instrument(skip(self, spec), fields(table = %spec.target_name))]
    pub fn ensure_table(&self, spec: &TableSpec) -> Result<ProvisionOutcome> {
        if spec.columns.is_empty() {
            return Err(Error::schema(format!(
                "{} has no columns to mirror",
                spec.source_name
            )));
        }

        let existing = self.existing_columns(spec)?;
        if existing.is_empty() {
            let ddl = spec.to_duckdb_ddl();
            debug!(ddl = %ddl, "Creating table");
            self.target.execute(&Statement::new(ddl))?;
            info!("Created table {}", spec.target_name);
            return Ok(ProvisionOutcome::Created);
        }

        spec.check_compatible(&existing)?;
        debug!("Table {} already exists", spec.target_name);
        Ok(ProvisionOutcome::AlreadyExists)
    }
}
