//! In-memory cursor over a materialized query result

use crate::{ColumnMeta, ColumnStream, QueryResult, Result, Row, RowCursor, TabconvError, Value};
use async_trait::async_trait;
use chrono::{NaiveDateTime, NaiveTime};
use std::io::Cursor;

/// `RowCursor` over a fully fetched `QueryResult`.
///
/// Drivers whose client library has no streaming result set return this
/// from `Connection::open_cursor`. Large-object accessors stream straight
/// out of the buffered value.
#[derive(Debug)]
pub struct ResultSetCursor {
    columns: Vec<ColumnMeta>,
    rows: std::vec::IntoIter<Row>,
    current: Option<Row>,
}

impl ResultSetCursor {
    pub fn new(result: QueryResult) -> Self {
        Self {
            columns: result.columns,
            rows: result.rows.into_iter(),
            current: None,
        }
    }

    fn value_at(&self, ordinal: usize) -> Result<&Value> {
        let row = self.current.as_ref().ok_or(TabconvError::NoCurrentRow)?;
        row.get(ordinal).ok_or(TabconvError::ColumnOutOfRange {
            index: ordinal,
            count: row.values.len(),
        })
    }

    fn bytes_at(&self, ordinal: usize) -> Result<Option<ColumnStream<'_>>> {
        let stream: ColumnStream<'_> = match self.value_at(ordinal)? {
            Value::Null => return Ok(None),
            Value::Bytes(bytes) => Box::new(Cursor::new(bytes.as_slice())),
            Value::String(s) => Box::new(Cursor::new(s.as_bytes())),
            other => Box::new(Cursor::new(other.to_string().into_bytes())),
        };
        Ok(Some(stream))
    }
}

#[async_trait]
impl RowCursor for ResultSetCursor {
    fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    async fn next(&mut self) -> Result<bool> {
        self.current = self.rows.next();
        Ok(self.current.is_some())
    }

    fn get_value(&self, ordinal: usize) -> Result<Value> {
        self.value_at(ordinal).cloned()
    }

    fn get_blob(&self, ordinal: usize) -> Result<Option<ColumnStream<'_>>> {
        self.bytes_at(ordinal)
    }

    fn get_binary_stream(&self, ordinal: usize) -> Result<Option<ColumnStream<'_>>> {
        self.bytes_at(ordinal)
    }

    fn get_clob(&self, ordinal: usize) -> Result<Option<ColumnStream<'_>>> {
        self.bytes_at(ordinal)
    }

    fn get_timestamp(&self, ordinal: usize) -> Result<Option<NaiveDateTime>> {
        match self.value_at(ordinal)? {
            Value::Null => Ok(None),
            Value::DateTime(dt) => Ok(Some(*dt)),
            Value::DateTimeUtc(dt) => Ok(Some(dt.naive_utc())),
            Value::Date(d) => Ok(Some(d.and_time(NaiveTime::MIN))),
            Value::String(s) => parse_timestamp(s).map(Some).ok_or_else(|| {
                TabconvError::Other(format!("cannot read '{}' as a timestamp", s))
            }),
            other => Err(TabconvError::Other(format!(
                "cannot read {:?} as a timestamp",
                other
            ))),
        }
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s.trim(), fmt).ok())
}
