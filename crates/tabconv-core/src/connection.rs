//! Connection and cursor traits

use crate::{ColumnMeta, QueryResult, Result, SchemaIntrospection, Value};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::io::Read;

/// Byte stream over a single column value of the current row
pub type ColumnStream<'a> = Box<dyn Read + Send + 'a>;

/// A database connection
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "sqlite", "postgresql", "mysql")
    fn driver_name(&self) -> &str;

    /// Execute a query and materialize every row (used for small auxiliary
    /// queries such as `COUNT(*)`)
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Execute a query and return a forward-only cursor over its rows.
    ///
    /// The cursor is released when dropped.
    async fn open_cursor(&self, sql: &str) -> Result<Box<dyn RowCursor>>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Get schema introspection interface if supported
    fn as_schema_introspection(&self) -> Option<&dyn SchemaIntrospection> {
        None
    }
}

/// A forward-only cursor over query rows.
///
/// `next` advances to the following row; the accessors read columns of the
/// current row by 0-based ordinal. The accessor set mirrors what database
/// client libraries expose, so that value converters can choose how a
/// column is read (generic object, large-object handle, raw byte stream, or
/// timestamp) per vendor.
#[async_trait]
pub trait RowCursor: Send {
    /// Metadata for every column, in select order
    fn columns(&self) -> &[ColumnMeta];

    /// Advance to the next row. Returns `false` once the rows are exhausted.
    async fn next(&mut self) -> Result<bool>;

    /// Read a column through the generic object accessor
    fn get_value(&self, ordinal: usize) -> Result<Value>;

    /// Open a binary large object through its large-object handle.
    /// `None` means SQL NULL.
    fn get_blob(&self, ordinal: usize) -> Result<Option<ColumnStream<'_>>>;

    /// Read a binary column through the raw binary-stream accessor.
    /// `None` means SQL NULL.
    fn get_binary_stream(&self, ordinal: usize) -> Result<Option<ColumnStream<'_>>>;

    /// Open a character large object as a UTF-8 byte stream.
    /// `None` means SQL NULL.
    fn get_clob(&self, ordinal: usize) -> Result<Option<ColumnStream<'_>>>;

    /// Read a column through the standard timestamp accessor
    fn get_timestamp(&self, ordinal: usize) -> Result<Option<NaiveDateTime>>;
}
