//! JSON array-of-objects record adapters

use std::io::{Read, Write};

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde_json::Value as JsonValue;
use tabconv_core::{ColumnMeta, Value};

use crate::records::{Record, RecordError, RecordSink, RecordSource};

/// Convert an exported value to JSON. Binary values become base64 strings
/// and decimals stay strings to keep their precision.
pub fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(v) => JsonValue::Bool(*v),
        Value::Int8(v) => JsonValue::from(*v),
        Value::Int16(v) => JsonValue::from(*v),
        Value::Int32(v) => JsonValue::from(*v),
        Value::Int64(v) => JsonValue::from(*v),
        Value::Float32(v) => serde_json::Number::from_f64(*v as f64)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Float64(v) => serde_json::Number::from_f64(*v)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Bytes(bytes) => JsonValue::String(BASE64.encode(bytes)),
        Value::Json(v) => v.clone(),
        other => JsonValue::String(other.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkState {
    Idle,
    Open { written: u64 },
    Closed,
}

/// Writes `[ {..}, {..} ]`, one object per line
pub struct JsonRecordSink<W: Write> {
    out: W,
    names: Vec<String>,
    state: SinkState,
}

impl<W: Write> JsonRecordSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            names: Vec::new(),
            state: SinkState::Idle,
        }
    }
}

impl<W: Write> RecordSink for JsonRecordSink<W> {
    fn begin(&mut self, columns: &[ColumnMeta]) -> Result<(), RecordError> {
        if self.state != SinkState::Idle {
            return Err(RecordError::IllegalState("collection already started"));
        }
        self.names = columns.iter().map(|c| c.name.clone()).collect();
        self.out.write_all(b"[")?;
        self.state = SinkState::Open { written: 0 };
        Ok(())
    }

    fn write_record(&mut self, values: &[Value]) -> Result<(), RecordError> {
        let SinkState::Open { written } = self.state else {
            return Err(RecordError::IllegalState("record outside of a collection"));
        };
        if values.len() != self.names.len() {
            return Err(RecordError::MalformedRoot(format!(
                "record has {} values for {} fields",
                values.len(),
                self.names.len()
            )));
        }

        let lead: &[u8] = if written == 0 { b"\n  " } else { b",\n  " };
        self.out.write_all(lead)?;
        let object: serde_json::Map<String, JsonValue> = self
            .names
            .iter()
            .cloned()
            .zip(values.iter().map(value_to_json))
            .collect();
        serde_json::to_writer(&mut self.out, &object)?;
        self.state = SinkState::Open {
            written: written + 1,
        };
        Ok(())
    }

    fn finish(&mut self) -> Result<(), RecordError> {
        match self.state {
            SinkState::Idle => self.out.write_all(b"[]\n")?,
            SinkState::Open { written: 0 } => self.out.write_all(b"]\n")?,
            SinkState::Open { .. } => self.out.write_all(b"\n]\n")?,
            SinkState::Closed => return Ok(()),
        }
        self.state = SinkState::Closed;
        self.out.flush()?;
        Ok(())
    }
}

/// Reads a JSON document whose root is an array of flat objects.
///
/// Field names are the union of all object keys in first-seen order. Nested
/// values are kept as their JSON text.
pub struct JsonRecordSource {
    names: Vec<String>,
    records: std::vec::IntoIter<serde_json::Map<String, JsonValue>>,
}

impl JsonRecordSource {
    pub fn new<R: Read>(input: R) -> Result<Self, RecordError> {
        let root: JsonValue = serde_json::from_reader(input)?;
        let JsonValue::Array(items) = root else {
            return Err(RecordError::MalformedRoot(
                "root element must be an array of objects".into(),
            ));
        };

        let mut objects = Vec::with_capacity(items.len());
        let mut names: Vec<String> = Vec::new();
        for (idx, item) in items.into_iter().enumerate() {
            let JsonValue::Object(object) = item else {
                return Err(RecordError::MalformedRoot(format!(
                    "element {} is not an object",
                    idx
                )));
            };
            for key in object.keys() {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
            objects.push(object);
        }

        Ok(Self {
            names,
            records: objects.into_iter(),
        })
    }
}

impl RecordSource for JsonRecordSource {
    fn field_names(&self) -> &[String] {
        &self.names
    }

    fn read_record(&mut self) -> Result<Option<Record>, RecordError> {
        let Some(mut object) = self.records.next() else {
            return Ok(None);
        };
        let record = self
            .names
            .iter()
            .map(|name| {
                let value = match object.remove(name) {
                    None | Some(JsonValue::Null) => None,
                    Some(JsonValue::String(s)) => Some(s),
                    Some(other) => Some(other.to_string()),
                };
                (name.clone(), value)
            })
            .collect();
        Ok(Some(record))
    }
}
