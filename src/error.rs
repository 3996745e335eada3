//! Error types for warehouse-mirror.

use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed source error carried by connector failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for warehouse-mirror operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
        /// Source error if any
        #[source]
        source: Option<BoxError>,
    },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Source connection error. Fatal to the whole run.
    #[error("Source connection error: {message}")]
    SourceConnection {
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<BoxError>,
    },

    /// Source query error
    #[error("Source query failed ({message}): {statement}")]
    SourceQuery {
        /// Offending statement
        statement: String,
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<BoxError>,
    },

    /// Warehouse connection error. Fatal to the whole run.
    #[error("Warehouse connection error: {message}")]
    TargetConnection {
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<duckdb::Error>,
    },

    /// Warehouse read error
    #[error("Warehouse query failed ({message}): {statement}")]
    TargetQuery {
        /// Offending statement
        statement: String,
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<duckdb::Error>,
    },

    /// Warehouse DDL/DML error
    #[error("Warehouse statement failed ({message}): {statement}")]
    TargetExecute {
        /// Offending statement
        statement: String,
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<duckdb::Error>,
    },

    /// Source column type with no warehouse mapping
    #[error("Unsupported source type '{type_name}' for column '{column}'")]
    UnsupportedType {
        /// Column name
        column: String,
        /// Source type name as reported by the connector
        type_name: String,
    },

    /// Existing warehouse table does not match the source schema
    #[error("Schema mismatch for table '{table}': {detail}")]
    SchemaMismatch {
        /// Target table name
        table: String,
        /// First difference found
        detail: String,
    },

    /// Schema error
    #[error("Schema error: {message}")]
    Schema {
        /// Error message
        message: String,
    },

    /// A full load aborted part-way through
    #[error(
        "Full load of '{table}' aborted after {rows_written} rows{}: {source}",
        rollback_note(.rolled_back)
    )]
    PartialLoad {
        /// Target table name
        table: String,
        /// Rows written before the failure
        rows_written: u64,
        /// Whether the written rows were rolled back
        rolled_back: bool,
        /// Failure that stopped the load
        #[source]
        source: Box<Error>,
    },

    /// Retry exhausted
    #[error("Operation failed after {attempts} attempts: {message}")]
    RetryExhausted {
        /// Number of attempts made
        attempts: u32,
        /// Error message
        message: String,
        /// Last error encountered
        #[source]
        last_error: Option<Box<Error>>,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn rollback_note(rolled_back: &bool) -> &'static str {
    if *rolled_back { " (rolled back)" } else { "" }
}

impl Error {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a source connection error.
    pub fn source_connection(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::SourceConnection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a source connection error without an underlying cause.
    pub fn source_disconnected(message: impl Into<String>) -> Self {
        Self::SourceConnection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a source query error.
    pub fn source_query(
        statement: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::SourceQuery {
            statement: statement.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a source query error without an underlying cause.
    pub fn source_query_msg(statement: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceQuery {
            statement: statement.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a warehouse connection error.
    pub fn target_connection(message: impl Into<String>, source: duckdb::Error) -> Self {
        Self::TargetConnection {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a warehouse query error.
    pub fn target_query(
        statement: impl Into<String>,
        message: impl Into<String>,
        source: duckdb::Error,
    ) -> Self {
        Self::TargetQuery {
            statement: statement.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a warehouse execute error.
    pub fn target_execute(
        statement: impl Into<String>,
        message: impl Into<String>,
        source: duckdb::Error,
    ) -> Self {
        Self::TargetExecute {
            statement: statement.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a warehouse execute error without an underlying cause.
    pub fn target_execute_msg(statement: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TargetExecute {
            statement: statement.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create an unsupported type error.
    pub fn unsupported_type(column: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::UnsupportedType {
            column: column.into(),
            type_name: type_name.into(),
        }
    }

    /// Create a schema mismatch error.
    pub fn schema_mismatch(table: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            table: table.into(),
            detail: detail.into(),
        }
    }

    /// Create a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Wrap the failure that stopped a full load.
    pub fn partial_load(
        table: impl Into<String>,
        rows_written: u64,
        rolled_back: bool,
        cause: Error,
    ) -> Self {
        Self::PartialLoad {
            table: table.into(),
            rows_written,
            rolled_back,
            source: Box::new(cause),
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::SourceConnection { .. } | Error::TargetConnection { .. } | Error::Io(_)
        )
    }

    /// Whether this error ends the whole run rather than a single table.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::SourceConnection { .. } | Error::TargetConnection { .. } => true,
            Error::PartialLoad { source, .. } => source.is_fatal(),
            Error::RetryExhausted { last_error, .. } => {
                last_error.as_ref().is_some_and(|e| e.is_fatal())
            }
            _ => false,
        }
    }

    /// Get the error code for metrics/logging.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "CONFIG_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::SourceConnection { .. } => "SOURCE_CONNECTION_ERROR",
            Error::SourceQuery { .. } => "SOURCE_QUERY_ERROR",
            Error::TargetConnection { .. } => "TARGET_CONNECTION_ERROR",
            Error::TargetQuery { .. } => "TARGET_QUERY_ERROR",
            Error::TargetExecute { .. } => "TARGET_EXECUTE_ERROR",
            Error::UnsupportedType { .. } => "UNSUPPORTED_TYPE",
            Error::SchemaMismatch { .. } => "SCHEMA_MISMATCH",
            Error::Schema { .. } => "SCHEMA_ERROR",
            Error::PartialLoad { .. } => "PARTIAL_LOAD",
            Error::RetryExhausted { .. } => "RETRY_EXHAUSTED",
            Error::Io(_) => "IO_ERROR",
        }
    }
}
