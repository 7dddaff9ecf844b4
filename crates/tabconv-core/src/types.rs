//! Core types for tabconv

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A database value that can represent any SQL type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,
    /// Boolean
    Bool(bool),
    /// 8-bit signed integer
    Int8(i8),
    /// 16-bit signed integer
    Int16(i16),
    /// 32-bit signed integer
    Int32(i32),
    /// 64-bit signed integer
    Int64(i64),
    /// 32-bit floating point
    Float32(f32),
    /// 64-bit floating point
    Float64(f64),
    /// Decimal/Numeric (stored as string for precision)
    Decimal(String),
    /// UTF-8 string
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// UUID
    Uuid(Uuid),
    /// Date (year, month, day)
    Date(NaiveDate),
    /// Time (hour, minute, second, nanosecond)
    Time(NaiveTime),
    /// DateTime without timezone
    DateTime(NaiveDateTime),
    /// DateTime with timezone (UTC)
    DateTimeUtc(DateTime<Utc>),
    /// JSON value
    Json(serde_json::Value),
}

impl Value {
    /// Whether the value is a number, used for alignment and quoting decisions
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Value::Int8(_)
                | Value::Int16(_)
                | Value::Int32(_)
                | Value::Int64(_)
                | Value::Float32(_)
                | Value::Float64(_)
                | Value::Decimal(_)
        )
    }

    /// Try to get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int8(v) => Some(*v as i64),
            Value::Int16(v) => Some(*v as i64),
            Value::Int32(v) => Some(*v as i64),
            Value::Int64(v) => Some(*v),
            Value::String(s) => s.parse::<i64>().ok(),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int8(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float32(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Decimal(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Uuid(v) => write!(f, "{}", v),
            Value::Date(v) => write!(f, "{}", v),
            Value::Time(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "{}", v),
            Value::DateTimeUtc(v) => write!(f, "{}", v.to_rfc3339()),
            Value::Json(v) => write!(f, "{}", v),
        }
    }
}

/// Generic SQL type of a result column, independent of the vendor's type name.
///
/// Drivers report the closest match; value converters dispatch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SqlType {
    Boolean,
    Integer,
    BigInt,
    Decimal,
    Double,
    Char,
    VarChar,
    LongVarChar,
    /// Character large object
    Clob,
    Binary,
    VarBinary,
    /// Unbounded binary column that is not exposed as a large object
    LongVarBinary,
    /// Binary large object
    Blob,
    Date,
    Time,
    Timestamp,
    TimestampWithTimezone,
    #[default]
    Other,
}

impl SqlType {
    /// Classify a native type name (e.g. `VARCHAR(20)`, `bytea`, `TIMESTAMP WITH TIME ZONE`)
    pub fn from_native(native_type: &str) -> Self {
        let upper = native_type.trim().to_uppercase();
        if upper.starts_with("TIMESTAMP") && upper.contains("TIME ZONE") {
            return SqlType::TimestampWithTimezone;
        }
        let base = upper.split('(').next().unwrap_or("").trim();

        match base {
            "BOOLEAN" | "BOOL" | "BIT" => SqlType::Boolean,
            "INTEGER" | "INT" | "INT4" | "SMALLINT" | "INT2" | "TINYINT" | "MEDIUMINT" => {
                SqlType::Integer
            }
            "BIGINT" | "INT8" => SqlType::BigInt,
            "NUMERIC" | "DECIMAL" | "NUMBER" | "MONEY" => SqlType::Decimal,
            "REAL" | "FLOAT" | "FLOAT4" | "FLOAT8" | "DOUBLE" | "DOUBLE PRECISION" => {
                SqlType::Double
            }
            "CHAR" | "NCHAR" | "CHARACTER" | "BPCHAR" => SqlType::Char,
            "VARCHAR" | "NVARCHAR" | "VARCHAR2" | "NVARCHAR2" | "CHARACTER VARYING" => {
                SqlType::VarChar
            }
            "TEXT" | "NTEXT" | "LONGTEXT" | "MEDIUMTEXT" | "LONG" => SqlType::LongVarChar,
            "CLOB" | "NCLOB" => SqlType::Clob,
            "BINARY" => SqlType::Binary,
            "VARBINARY" | "RAW" => SqlType::VarBinary,
            "IMAGE" | "LONGBLOB" | "MEDIUMBLOB" | "LONG RAW" => SqlType::LongVarBinary,
            "BLOB" | "BYTEA" | "OID" => SqlType::Blob,
            "DATE" => SqlType::Date,
            "TIME" => SqlType::Time,
            "DATETIME" | "DATETIME2" | "TIMESTAMP" => SqlType::Timestamp,
            "TIMESTAMPTZ" | "DATETIMEOFFSET" => SqlType::TimestampWithTimezone,
            _ => SqlType::Other,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            SqlType::Integer | SqlType::BigInt | SqlType::Decimal | SqlType::Double
        )
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            SqlType::Date | SqlType::Time | SqlType::Timestamp | SqlType::TimestampWithTimezone
        )
    }
}

/// A row from a query result
#[derive(Debug, Clone)]
pub struct Row {
    /// Column values
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Get a value by column index
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }
}

/// Column metadata
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ColumnMeta {
    /// Column name
    #[serde(default)]
    pub name: String,
    /// Data type (database-specific string)
    #[serde(default)]
    pub data_type: String,
    /// Generic SQL type
    #[serde(default)]
    pub sql_type: SqlType,
    /// Whether the column can be NULL
    #[serde(default)]
    pub nullable: bool,
    /// Column ordinal position (0-based)
    #[serde(default)]
    pub ordinal: usize,
}

impl ColumnMeta {
    /// Column metadata whose generic type is derived from the native type name
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, ordinal: usize) -> Self {
        let data_type = data_type.into();
        Self {
            name: name.into(),
            sql_type: SqlType::from_native(&data_type),
            data_type,
            nullable: true,
            ordinal,
        }
    }
}

/// Query result
#[derive(Debug, Clone)]
pub struct QueryResult {
    /// Unique query ID
    pub id: Uuid,
    /// Column metadata
    pub columns: Vec<ColumnMeta>,
    /// Result rows
    pub rows: Vec<Row>,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Create a new empty query result
    pub fn empty() -> Self {
        Self {
            id: Uuid::new_v4(),
            columns: Vec::new(),
            rows: Vec::new(),
            execution_time_ms: 0,
        }
    }

    /// Build a result from column metadata and row values
    pub fn from_rows(columns: Vec<ColumnMeta>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            rows: rows.into_iter().map(Row::new).collect(),
            columns,
            ..Self::empty()
        }
    }

    /// First column of the first row as an integer, as returned by `COUNT(*)`
    pub fn scalar_i64(&self) -> Option<i64> {
        self.rows.first().and_then(|r| r.get(0)).and_then(Value::as_i64)
    }
}
