//! Source type name to warehouse type mapping.
//!
//! Lookups go through [`TYPE_MAP`], keyed by the normalized source type name
//! (upper-case, parameters such as `(10,2)` removed, whitespace collapsed).
//! PostgreSQL internal names (`int4`, `timestamptz`) and the ANSI/Oracle
//! spellings other sources report (`NUMBER`, `VARCHAR2`) share the table.
//! Supporting a new source type means adding a row.
//!
//! Exact numerics keep a declared `(precision, scale)` when DuckDB can hold
//! it; unconstrained ones get [`DEFAULT_DECIMAL`].

use crate::error::{Error, Result};
use crate::schema::ColumnType;

/// Storage for exact numerics declared without usable parameters.
pub const DEFAULT_DECIMAL: ColumnType = ColumnType::Decimal {
    precision: 38,
    scale: 9,
};

/// Largest DECIMAL precision DuckDB supports.
const MAX_PRECISION: u8 = 38;

/// Largest scale a decoded decimal value can carry.
const MAX_SCALE: u8 = 28;

/// Normalized source type name → warehouse type.
pub static TYPE_MAP: &[(&str, ColumnType)] = &[
    // Boolean
    ("BOOL", ColumnType::Boolean),
    ("BOOLEAN", ColumnType::Boolean),
    // Integers
    ("INT2", ColumnType::SmallInt),
    ("SMALLINT", ColumnType::SmallInt),
    ("TINYINT", ColumnType::SmallInt),
    ("SMALLSERIAL", ColumnType::SmallInt),
    ("INT", ColumnType::Integer),
    ("INT4", ColumnType::Integer),
    ("INTEGER", ColumnType::Integer),
    ("SERIAL", ColumnType::Integer),
    ("MEDIUMINT", ColumnType::Integer),
    ("INT8", ColumnType::BigInt),
    ("BIGINT", ColumnType::BigInt),
    ("BIGSERIAL", ColumnType::BigInt),
    ("OID", ColumnType::BigInt),
    // Floating point & exact numerics
    ("FLOAT4", ColumnType::Real),
    ("REAL", ColumnType::Real),
    ("BINARY_FLOAT", ColumnType::Real),
    ("FLOAT8", ColumnType::Double),
    ("FLOAT", ColumnType::Double),
    ("DOUBLE", ColumnType::Double),
    ("DOUBLE PRECISION", ColumnType::Double),
    ("BINARY_DOUBLE", ColumnType::Double),
    ("NUMERIC", DEFAULT_DECIMAL),
    ("DECIMAL", DEFAULT_DECIMAL),
    ("NUMBER", DEFAULT_DECIMAL),
    ("MONEY", ColumnType::Decimal {
        precision: 19,
        scale: 2,
    }),
    // Character data
    ("TEXT", ColumnType::Varchar),
    ("VARCHAR", ColumnType::Varchar),
    ("CHARACTER VARYING", ColumnType::Varchar),
    ("VARCHAR2", ColumnType::Varchar),
    ("NVARCHAR", ColumnType::Varchar),
    ("NVARCHAR2", ColumnType::Varchar),
    ("CHAR", ColumnType::Varchar),
    ("CHARACTER", ColumnType::Varchar),
    ("NCHAR", ColumnType::Varchar),
    ("BPCHAR", ColumnType::Varchar),
    ("NAME", ColumnType::Varchar),
    ("CLOB", ColumnType::Varchar),
    ("NCLOB", ColumnType::Varchar),
    ("LONG", ColumnType::Varchar),
    ("CITEXT", ColumnType::Varchar),
    ("UUID", ColumnType::Varchar),
    ("JSON", ColumnType::Varchar),
    ("JSONB", ColumnType::Varchar),
    ("XML", ColumnType::Varchar),
    // Date & time
    ("DATE", ColumnType::Date),
    ("TIME", ColumnType::Time),
    ("TIME WITHOUT TIME ZONE", ColumnType::Time),
    ("TIMESTAMP", ColumnType::Timestamp),
    ("TIMESTAMP WITHOUT TIME ZONE", ColumnType::Timestamp),
    ("DATETIME", ColumnType::Timestamp),
    ("TIMESTAMPTZ", ColumnType::TimestampTz),
    ("TIMESTAMP WITH TIME ZONE", ColumnType::TimestampTz),
    ("TIMESTAMP WITH LOCAL TIME ZONE", ColumnType::TimestampTz),
    // Binary
    ("BYTEA", ColumnType::Blob),
    ("BLOB", ColumnType::Blob),
    ("RAW", ColumnType::Blob),
    ("LONG RAW", ColumnType::Blob),
    ("BINARY", ColumnType::Blob),
    ("VARBINARY", ColumnType::Blob),
];

/// Normalize a reported source type name into a [`TYPE_MAP`] key.
pub fn normalize_type_name(type_name: &str) -> String {
    let mut out = String::with_capacity(type_name.len());
    let mut depth = 0usize;
    for ch in type_name.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Numeric parameters of a type name: `(p)` or `(p,s)`.
fn type_params(type_name: &str) -> Option<(u8, u8)> {
    let start = type_name.find('(')?;
    let end = start + type_name[start..].find(')')?;
    let mut parts = type_name[start + 1..end].split(',').map(str::trim);
    let precision = parts.next()?.parse::<u8>().ok()?;
    let scale = match parts.next() {
        Some(s) => s.parse::<u8>().ok()?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }
    Some((precision, scale))
}

/// Map a source column type to its warehouse type.
///
/// Fails with [`Error::UnsupportedType`] for names absent from the table;
/// `column` is only used to make that error useful.
pub fn map_type(column: &str, source_type: &str) -> Result<ColumnType> {
    let key = normalize_type_name(source_type);
    let target = TYPE_MAP
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, target)| *target)
        .ok_or_else(|| Error::unsupported_type(column, source_type))?;

    if target != DEFAULT_DECIMAL {
        return Ok(target);
    }
    Ok(match type_params(source_type) {
        Some((precision, scale))
            if (1..=MAX_PRECISION).contains(&precision)
                && scale <= precision
                && scale <= MAX_SCALE =>
        {
            ColumnType::Decimal { precision, scale }
        }
        _ => DEFAULT_DECIMAL,
    })
}
