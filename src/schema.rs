//! Schema types and DDL generation for warehouse-mirror.

use crate::error::{Error, Result};
use crate::sql::quote_ident;
use crate::value::Value;
use rust_decimal::RoundingStrategy;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column types supported by the warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Boolean
    Boolean,
    /// Small integer (2 bytes)
    SmallInt,
    /// Integer (4 bytes)
    Integer,
    /// Big integer (8 bytes)
    BigInt,
    /// Single precision float
    Real,
    /// Double precision float
    Double,
    /// Decimal/Numeric with precision and scale
    Decimal {
        /// Precision (total digits)
        precision: u8,
        /// Scale (digits after decimal)
        scale: u8,
    },
    /// Variable-length string
    Varchar,
    /// Date
    Date,
    /// Time
    Time,
    /// Timestamp without timezone
    Timestamp,
    /// Timestamp with timezone
    TimestampTz,
    /// Binary data
    Blob,
}

impl ColumnType {
    /// Convert to DuckDB type string, as DuckDB itself reports it in
    /// `information_schema.columns`.
    pub fn to_duckdb(&self) -> String {
        match self {
            ColumnType::Boolean => "BOOLEAN".into(),
            ColumnType::SmallInt => "SMALLINT".into(),
            ColumnType::Integer => "INTEGER".into(),
            ColumnType::BigInt => "BIGINT".into(),
            ColumnType::Real => "FLOAT".into(),
            ColumnType::Double => "DOUBLE".into(),
            ColumnType::Decimal { precision, scale } => {
                format!("DECIMAL({},{})", precision, scale)
            }
            ColumnType::Varchar => "VARCHAR".into(),
            ColumnType::Date => "DATE".into(),
            ColumnType::Time => "TIME".into(),
            ColumnType::Timestamp => "TIMESTAMP".into(),
            ColumnType::TimestampTz => "TIMESTAMP WITH TIME ZONE".into(),
            ColumnType::Blob => "BLOB".into(),
        }
    }

    /// Bring a source value to the precision this column stores.
    ///
    /// Decimals are rounded half away from zero to the column scale and
    /// floats bound for a `FLOAT` column are narrowed to single precision,
    /// so a value read back from the warehouse equals the conformed source
    /// value.
    pub fn conform(&self, value: Value) -> Value {
        match (self, value) {
            (ColumnType::Decimal { scale, .. }, Value::Decimal(d)) => Value::Decimal(
                d.round_dp_with_strategy((*scale).into(), RoundingStrategy::MidpointAwayFromZero),
            ),
            (ColumnType::Real, Value::Float(f)) => Value::Float(f64::from(f as f32)),
            (_, value) => value,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_duckdb())
    }
}

/// Equivalent spellings of warehouse types.
const TYPE_ALIASES: &[(&str, &str)] = &[
    ("BOOL", "BOOLEAN"),
    ("LOGICAL", "BOOLEAN"),
    ("INT2", "SMALLINT"),
    ("SHORT", "SMALLINT"),
    ("INT", "INTEGER"),
    ("INT4", "INTEGER"),
    ("SIGNED", "INTEGER"),
    ("INT8", "BIGINT"),
    ("LONG", "BIGINT"),
    ("REAL", "FLOAT"),
    ("FLOAT4", "FLOAT"),
    ("FLOAT8", "DOUBLE"),
    ("NUMERIC", "DECIMAL"),
    ("TEXT", "VARCHAR"),
    ("STRING", "VARCHAR"),
    ("CHAR", "VARCHAR"),
    ("BPCHAR", "VARCHAR"),
    ("DATETIME", "TIMESTAMP"),
    ("TIMESTAMPTZ", "TIMESTAMP WITH TIME ZONE"),
    ("BYTEA", "BLOB"),
    ("BINARY", "BLOB"),
    ("VARBINARY", "BLOB"),
];

/// Normalize a warehouse type name so equivalent spellings compare equal.
pub fn canonical_type(type_name: &str) -> String {
    let upper = type_name
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase();
    let (base, params) = match upper.find('(') {
        Some(idx) => (upper[..idx].trim_end(), upper[idx..].replace(' ', "")),
        None => (upper.as_str(), String::new()),
    };
    let base = TYPE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == base)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(base);
    // VARCHAR(n) is reported as plain VARCHAR
    if base == "VARCHAR" {
        return base.to_string();
    }
    format!("{}{}", base, params)
}

/// One column of a mirrored table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name
    pub name: String,
    /// Type name as reported by the source
    pub source_type: String,
    /// Warehouse storage type
    pub target_type: ColumnType,
}

impl ColumnSpec {
    /// Create a new column spec.
    pub fn new(
        name: impl Into<String>,
        source_type: impl Into<String>,
        target_type: ColumnType,
    ) -> Self {
        Self {
            name: name.into(),
            source_type: source_type.into(),
            target_type,
        }
    }
}

/// Description of one table being mirrored during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Source table name, possibly schema-qualified
    pub source_name: String,
    /// Warehouse schema holding the target table
    pub target_schema: String,
    /// Target table name (prefix + source name)
    pub target_name: String,
    /// Columns, in row order
    pub columns: Vec<ColumnSpec>,
}

impl TableSpec {
    /// Create a table spec, deriving the target name from the prefix.
    pub fn new(
        source_name: impl Into<String>,
        prefix: &str,
        target_schema: impl Into<String>,
        columns: Vec<ColumnSpec>,
    ) -> Self {
        let source_name = source_name.into();
        Self {
            target_name: Self::target_name_for(prefix, &source_name),
            source_name,
            target_schema: target_schema.into(),
            columns,
        }
    }

    /// Deterministic target table name for a source table.
    pub fn target_name_for(prefix: &str, source_name: &str) -> String {
        format!("{}{}", prefix, source_name.replace('.', "_"))
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Position of a column, matched case-insensitively.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Conform every value of a row to its column's storage precision.
    pub fn conform_row(&self, row: &mut [Value]) {
        for (value, column) in row.iter_mut().zip(&self.columns) {
            *value = column.target_type.conform(std::mem::take(value));
        }
    }

    /// Quoted, schema-qualified target table.
    pub fn qualified_target(&self) -> String {
        format!(
            "{}.{}",
            quote_ident(&self.target_schema),
            quote_ident(&self.target_name)
        )
    }

    /// Generate CREATE TABLE DDL for DuckDB/MotherDuck.
    pub fn to_duckdb_ddl(&self) -> String {
        let mut ddl = format!("CREATE TABLE IF NOT EXISTS {} (\n", self.qualified_target());

        let col_defs: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("    {} {}", quote_ident(&c.name), c.target_type.to_duckdb()))
            .collect();

        ddl.push_str(&col_defs.join(",\n"));
        ddl.push_str("\n)");
        ddl
    }

    /// Check an existing warehouse table against this spec.
    ///
    /// Column count, names (case-insensitive, in order) and canonical types
    /// must all agree.
    pub fn check_compatible(&self, existing: &[ExistingColumn]) -> Result<()> {
        if existing.len() != self.columns.len() {
            return Err(Error::schema_mismatch(
                &self.target_name,
                format!(
                    "expected {} columns, found {}",
                    self.columns.len(),
                    existing.len()
                ),
            ));
        }

        for (idx, (want, have)) in self.columns.iter().zip(existing).enumerate() {
            if !want.name.eq_ignore_ascii_case(&have.name) {
                return Err(Error::schema_mismatch(
                    &self.target_name,
                    format!(
                        "column {} is '{}', expected '{}'",
                        idx + 1,
                        have.name,
                        want.name
                    ),
                ));
            }
            let expected = canonical_type(&want.target_type.to_duckdb());
            let found = canonical_type(&have.data_type);
            if expected != found {
                return Err(Error::schema_mismatch(
                    &self.target_name,
                    format!(
                        "column '{}' has type {}, expected {}",
                        have.name, found, expected
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// A column of a table that already exists in the warehouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingColumn {
    /// Column name
    pub name: String,
    /// Type as reported by `information_schema.columns`
    pub data_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders_spec() -> TableSpec {
        TableSpec::new(
            "orders",
            "mirror_",
            "main",
            vec![
                ColumnSpec::new(
                    "id",
                    "NUMBER",
                    ColumnType::Decimal {
                        precision: 38,
                        scale: 9,
                    },
                ),
                ColumnSpec::new("note", "varchar", ColumnType::Varchar),
                ColumnSpec::new("created_at", "timestamptz", ColumnType::TimestampTz),
            ],
        )
    }

    #[test]
    fn test_table_ddl() {
        let ddl = orders_spec().to_duckdb_ddl();
        assert!(ddl.contains("CREATE TABLE IF NOT EXISTS \"main\".\"mirror_orders\""));
        assert!(ddl.contains("\"id\" DECIMAL(38,9)"));
        assert!(ddl.contains("\"created_at\" TIMESTAMP WITH TIME ZONE"));
    }

    #[test]
    fn test_target_name_for_qualified_source() {
        assert_eq!(
            TableSpec::target_name_for("src_", "sales.orders"),
            "src_sales_orders"
        );
        assert_eq!(TableSpec::target_name_for("", "orders"), "orders");
    }

    #[test]
    fn test_canonical_type_aliases() {
        assert_eq!(canonical_type("timestamptz"), "TIMESTAMP WITH TIME ZONE");
        assert_eq!(canonical_type("numeric(10, 2)"), "DECIMAL(10,2)");
        assert_eq!(canonical_type("varchar(255)"), "VARCHAR");
        assert_eq!(canonical_type("REAL"), "FLOAT");
        assert_eq!(canonical_type("INTEGER"), "INTEGER");
    }

    #[test]
    fn test_conform_rounds_to_column_scale() {
        let cents = ColumnType::Decimal {
            precision: 10,
            scale: 2,
        };
        let d = |s: &str| Value::Decimal(s.parse().unwrap());
        assert_eq!(cents.conform(d("1.005")).canonical(), "n:1.01");
        assert_eq!(cents.conform(d("-1.005")).canonical(), "n:-1.01");
        assert_eq!(cents.conform(d("7.5")).canonical(), "n:7.5");
        assert_eq!(cents.conform(Value::Int(3)), Value::Int(3));
        assert!(cents.conform(Value::Null).is_null());

        let wide = ColumnType::Decimal {
            precision: 38,
            scale: 9,
        };
        assert_eq!(
            wide.conform(d("0.123456789012")).canonical(),
            "n:0.123456789"
        );
        assert_eq!(
            ColumnType::Real.conform(Value::Float(0.1)),
            Value::Float(f64::from(0.1f32))
        );
    }

    #[test]
    fn test_conform_row_follows_columns() {
        let mut row = vec![
            Value::Decimal("2.0000000004".parse().unwrap()),
            Value::from("x"),
            Value::Null,
        ];
        orders_spec().conform_row(&mut row);
        assert_eq!(row[0].canonical(), "n:2");
        assert_eq!(row[1], Value::from("x"));
    }

    #[test]
    fn test_compatible_schema() {
        let existing = vec![
            ExistingColumn {
                name: "ID".into(),
                data_type: "DECIMAL(38,9)".into(),
            },
            ExistingColumn {
                name: "note".into(),
                data_type: "VARCHAR".into(),
            },
            ExistingColumn {
                name: "created_at".into(),
                data_type: "TIMESTAMP WITH TIME ZONE".into(),
            },
        ];
        assert!(orders_spec().check_compatible(&existing).is_ok());
    }

    #[test]
    fn test_schema_mismatch_detected() {
        let existing = vec![
            ExistingColumn {
                name: "id".into(),
                data_type: "INTEGER".into(),
            },
            ExistingColumn {
                name: "note".into(),
                data_type: "VARCHAR".into(),
            },
            ExistingColumn {
                name: "created_at".into(),
                data_type: "TIMESTAMP WITH TIME ZONE".into(),
            },
        ];
        let err = orders_spec().check_compatible(&existing).unwrap_err();
        assert_eq!(err.code(), "SCHEMA_MISMATCH");
        assert!(err.to_string().contains("column 'id'"));

        let err = orders_spec().check_compatible(&existing[..2]).unwrap_err();
        assert!(err.to_string().contains("expected 3 columns, found 2"));
    }
}
