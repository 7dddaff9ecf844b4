//! Column type inference over a record source
//!
//! Each field's type is widened record by record along
//! `Integer -> Double -> String`. `Date` is chosen for fields with a date
//! format hint and `Blob` absorbs a field for good once a value is too long
//! to inline or the hint asks for a file.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::records::{Record, RecordError, RecordSource};

/// Values longer than this (in characters) are classified as `Blob`
pub const MAX_INLINE_LENGTH: usize = 4000;

/// Format hint that forces a field to be handled as a large object
pub const FILE_HINT: &str = "file";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferredType {
    #[default]
    Unset,
    String,
    Integer,
    Double,
    Date,
    Blob,
}

/// Per-field format hints, e.g. a date pattern like `dd.MM.yyyy` or `file`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldHints {
    hints: HashMap<String, String>,
}

impl FieldHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, hint: impl Into<String>) -> Self {
        self.insert(field, hint);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, hint: impl Into<String>) {
        self.hints.insert(field.into(), hint.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.hints.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.hints.is_empty()
    }
}

impl FromIterator<(String, String)> for FieldHints {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            hints: iter.into_iter().collect(),
        }
    }
}

/// Switches for two inference rules whose literal behavior is questionable.
///
/// The defaults keep the literal behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferenceOptions {
    /// An empty value resets the field to `Unset`. When off, empty values
    /// leave the type unchanged.
    pub reset_on_empty: bool,
    /// A hinted field becomes `Date` even when neither the hint pattern nor
    /// ISO-8601 parses the value. When off, such a value gives `String`.
    pub date_on_hint_failure: bool,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            reset_on_empty: true,
            date_on_hint_failure: true,
        }
    }
}

/// Incremental inference state for one pass over a source
#[derive(Debug)]
pub struct TypeInference<'a> {
    hints: &'a FieldHints,
    options: InferenceOptions,
    types: IndexMap<String, InferredType>,
}

impl<'a> TypeInference<'a> {
    pub fn new<S: AsRef<str>>(
        field_names: &[S],
        hints: &'a FieldHints,
        options: InferenceOptions,
    ) -> Self {
        Self {
            hints,
            options,
            types: field_names
                .iter()
                .map(|n| (n.as_ref().to_string(), InferredType::Unset))
                .collect(),
        }
    }

    pub fn observe(&mut self, record: &Record) {
        for (name, value) in record {
            let hint = self.hints.get(name);
            let current = self.types.entry(name.clone()).or_default();
            *current = next_type(*current, value.as_deref(), hint, self.options);
        }
    }

    pub fn types(&self) -> &IndexMap<String, InferredType> {
        &self.types
    }

    pub fn into_types(self) -> IndexMap<String, InferredType> {
        self.types
    }
}

/// Read the whole source and return the inferred type of every field
pub fn infer_types(
    source: &mut dyn RecordSource,
    hints: &FieldHints,
    options: InferenceOptions,
) -> Result<IndexMap<String, InferredType>, RecordError> {
    let mut inference = TypeInference::new(source.field_names(), hints, options);
    let mut records = 0u64;
    while let Some(record) = source.read_record()? {
        inference.observe(&record);
        records += 1;
    }
    tracing::debug!(records, fields = inference.types().len(), "type inference finished");
    Ok(inference.into_types())
}

fn next_type(
    current: InferredType,
    value: Option<&str>,
    hint: Option<&str>,
    options: InferenceOptions,
) -> InferredType {
    use InferredType::*;

    if current == Blob {
        return Blob;
    }

    let value = match value {
        Some(v) if !v.is_empty() => v,
        _ => {
            return if options.reset_on_empty {
                Unset
            } else {
                current
            };
        }
    };

    if hint == Some(FILE_HINT) || value.chars().count() > MAX_INLINE_LENGTH {
        return Blob;
    }

    if let Some(pattern) = hint.filter(|h| current != String && is_date_hint(h)) {
        let parsed = parse_with_pattern(value, pattern) || parse_iso(value);
        return if parsed || options.date_on_hint_failure {
            Date
        } else {
            String
        };
    }

    if !matches!(current, String | Date | Double) && value.parse::<i64>().is_ok() {
        return Integer;
    }

    if !matches!(current, String | Date) && parses_as_double(value) {
        return Double;
    }

    String
}

fn is_date_hint(hint: &str) -> bool {
    let hint = hint.trim();
    !(hint.is_empty() || hint == "." || hint == "," || hint == FILE_HINT)
}

fn parses_as_double(value: &str) -> bool {
    value.chars().any(|c| c.is_ascii_digit()) && value.parse::<f64>().is_ok()
}

fn parse_with_pattern(value: &str, pattern: &str) -> bool {
    let format = date_pattern_to_chrono(pattern);
    NaiveDateTime::parse_from_str(value, &format).is_ok()
        || NaiveDate::parse_from_str(value, &format).is_ok()
}

fn parse_iso(value: &str) -> bool {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f").is_ok()
        || DateTime::parse_from_rfc3339(value).is_ok()
}

/// Translate a `yyyy-MM-dd HH:mm:ss` style pattern to a chrono format string.
///
/// Text in single quotes is literal; `''` is a single quote.
pub fn date_pattern_to_chrono(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            i += 1;
            if chars.get(i) == Some(&'\'') {
                out.push('\'');
                i += 1;
                continue;
            }
            while i < chars.len() && chars[i] != '\'' {
                push_literal(&mut out, chars[i]);
                i += 1;
            }
            i += 1;
            continue;
        }

        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == c {
            run += 1;
        }
        i += run;

        let spec = match (c, run) {
            ('y', 2) => "%y",
            ('y', _) => "%Y",
            ('M', 1 | 2) => "%m",
            ('M', 3) => "%b",
            ('M', _) => "%B",
            ('d', _) => "%d",
            ('H', _) => "%H",
            ('h', _) => "%I",
            ('m', _) => "%M",
            ('s', _) => "%S",
            ('S', 3) => "%3f",
            ('S', 6) => "%6f",
            ('S', _) => "%f",
            ('a', _) => "%p",
            ('E', 1..=3) => "%a",
            ('E', _) => "%A",
            ('X' | 'Z', _) => "%z",
            _ => {
                for _ in 0..run {
                    push_literal(&mut out, c);
                }
                continue;
            }
        };
        out.push_str(spec);
    }
    out
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}
