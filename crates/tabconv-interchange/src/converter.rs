//! Per-vendor value conversion for export
//!
//! A `ValueConverter` reads one column of the cursor's current row and turns
//! it into a value a record sink can write. Large objects are inlined or
//! streamed to side files next to the output, depending on `LobOptions`.
//! Vendors differ only in which cursor accessor is used for a few column
//! types; those choices are the overridable hooks of the trait.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tabconv_core::{ColumnStream, RowCursor, SqlType, TabconvError, Value};
use thiserror::Error;
use uuid::Uuid;

/// Date literals some databases hand out instead of NULL
const NULL_DATE_SENTINELS: &[&str] = &["0000-00-00", "0000-00-00 00:00:00"];

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Failed to read column {ordinal}: {source}")]
    Cursor {
        ordinal: usize,
        #[source]
        source: TabconvError,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Database vendor, derived from the connection's driver name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseVendor {
    PostgreSql,
    MySql,
    SqlServer,
    Oracle,
    Sqlite,
    Generic,
}

impl DatabaseVendor {
    pub fn from_driver_name(driver: &str) -> Self {
        match driver.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Self::PostgreSql,
            "mysql" | "mariadb" => Self::MySql,
            "mssql" | "sqlserver" | "sql server" => Self::SqlServer,
            "oracle" => Self::Oracle,
            "sqlite" | "sqlite3" => Self::Sqlite,
            _ => Self::Generic,
        }
    }

    /// Quote an identifier the way this vendor expects
    pub fn quote_identifier(&self, name: &str) -> String {
        match self {
            Self::MySql => format!("`{}`", name.replace('`', "``")),
            Self::SqlServer => format!("[{}]", name.replace(']', "]]")),
            _ => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }
}

/// Large-object handling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LobOptions {
    /// Write each large object to its own side file and export its file name
    pub externalize: bool,
    /// Wrap each side file in a single-entry zip archive
    pub zip: bool,
}

/// Large-object policy plus the output file side files are named after
#[derive(Debug, Clone, Copy)]
pub struct LobContext<'a> {
    pub options: LobOptions,
    pub output_path: Option<&'a Path>,
}

impl<'a> LobContext<'a> {
    /// Inline every large object
    pub fn inline() -> Self {
        Self {
            options: LobOptions::default(),
            output_path: None,
        }
    }

    pub fn new(options: LobOptions, output_path: Option<&'a Path>) -> Self {
        Self {
            options,
            output_path,
        }
    }

    fn side_file_target(&self) -> Option<&'a Path> {
        if self.options.externalize {
            self.output_path
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LobKind {
    Binary,
    Character,
}

impl LobKind {
    fn suffix(self) -> &'static str {
        match self {
            LobKind::Binary => "blob",
            LobKind::Character => "clob",
        }
    }
}

/// Strategy for reading cursor columns of one database vendor
pub trait ValueConverter: Send + Sync {
    fn vendor(&self) -> DatabaseVendor;

    /// Convert column `ordinal` of the cursor's current row
    fn convert(
        &self,
        cursor: &dyn RowCursor,
        ordinal: usize,
        lob: &LobContext<'_>,
    ) -> Result<Value, ConvertError> {
        let sql_type = cursor
            .columns()
            .get(ordinal)
            .map(|c| c.sql_type)
            .ok_or(ConvertError::Cursor {
                ordinal,
                source: TabconvError::ColumnOutOfRange {
                    index: ordinal,
                    count: cursor.columns().len(),
                },
            })?;

        match sql_type {
            SqlType::Blob => {
                let stream = self.open_blob(cursor, ordinal).map_err(cursor_err(ordinal))?;
                lob_value(stream, LobKind::Binary, lob)
            }
            SqlType::Clob => {
                let stream = cursor.get_clob(ordinal).map_err(cursor_err(ordinal))?;
                lob_value(stream, LobKind::Character, lob)
            }
            SqlType::LongVarBinary if self.streams_long_binary() => {
                let stream = cursor
                    .get_binary_stream(ordinal)
                    .map_err(cursor_err(ordinal))?;
                lob_value(stream, LobKind::Binary, lob)
            }
            SqlType::TimestampWithTimezone => self
                .read_timestamp_with_timezone(cursor, ordinal)
                .map_err(cursor_err(ordinal)),
            _ => {
                let value = cursor.get_value(ordinal).map_err(cursor_err(ordinal))?;
                Ok(normalize_null_date(sql_type, value))
            }
        }
    }

    /// Open a binary large object. Defaults to the large-object handle.
    fn open_blob<'c>(
        &self,
        cursor: &'c dyn RowCursor,
        ordinal: usize,
    ) -> Result<Option<ColumnStream<'c>>, TabconvError> {
        cursor.get_blob(ordinal)
    }

    /// Whether long binary columns are streamed and treated as large objects
    fn streams_long_binary(&self) -> bool {
        false
    }

    fn read_timestamp_with_timezone(
        &self,
        cursor: &dyn RowCursor,
        ordinal: usize,
    ) -> Result<Value, TabconvError> {
        cursor.get_value(ordinal)
    }
}

fn cursor_err(ordinal: usize) -> impl Fn(TabconvError) -> ConvertError {
    move |source| ConvertError::Cursor { ordinal, source }
}

fn normalize_null_date(sql_type: SqlType, value: Value) -> Value {
    match &value {
        Value::String(s)
            if (sql_type.is_temporal() || sql_type == SqlType::Other)
                && NULL_DATE_SENTINELS.contains(&s.trim()) =>
        {
            Value::Null
        }
        _ => value,
    }
}

fn lob_value(
    stream: Option<ColumnStream<'_>>,
    kind: LobKind,
    lob: &LobContext<'_>,
) -> Result<Value, ConvertError> {
    let Some(mut stream) = stream else {
        return Ok(Value::Null);
    };

    if let Some(output) = lob.side_file_target() {
        let name = write_side_file(&mut stream, kind, output, lob.options.zip)?;
        return Ok(Value::String(name));
    }

    match kind {
        LobKind::Binary => {
            let mut bytes = Vec::new();
            stream.read_to_end(&mut bytes)?;
            Ok(Value::Bytes(bytes))
        }
        LobKind::Character => {
            let mut text = String::new();
            stream.read_to_string(&mut text)?;
            Ok(Value::String(text))
        }
    }
}

/// Side file path for a large object: `<stem>_<token>.<blob|clob>[.zip]`
/// in the output file's directory
pub fn side_file_path(output: &Path, suffix: &str, zip: bool) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export".to_string());
    let mut name = format!("{}_{}.{}", stem, Uuid::new_v4().simple(), suffix);
    if zip {
        name.push_str(".zip");
    }
    output.with_file_name(name)
}

/// Stream one large object into a new side file and return its file name
fn write_side_file(
    stream: &mut dyn Read,
    kind: LobKind,
    output: &Path,
    zip: bool,
) -> Result<String, ConvertError> {
    let path = side_file_path(output, kind.suffix(), zip);
    let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
    let bytes = if zip {
        write_zipped(stream, file, &path)?
    } else {
        let mut file = io::BufWriter::new(file);
        let bytes = io::copy(stream, &mut file)?;
        file.flush()?;
        bytes
    };

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    tracing::debug!(file = %name, bytes, kind = kind.suffix(), "large object externalized");
    Ok(name)
}

fn write_zipped(stream: &mut dyn Read, file: File, path: &Path) -> Result<u64, ConvertError> {
    // The entry is the archive's own name without `.zip`
    let entry = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut archive = zip::ZipWriter::new(file);
    archive.start_file(entry, zip::write::SimpleFileOptions::default())?;
    let bytes = io::copy(stream, &mut archive)?;
    archive.finish()?;
    Ok(bytes)
}

/// Large objects through their handles, everything else through the
/// generic accessor
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericConverter;

impl ValueConverter for GenericConverter {
    fn vendor(&self) -> DatabaseVendor {
        DatabaseVendor::Generic
    }
}

/// PostgreSQL exposes no large-object streaming for `bytea`; blobs are read
/// through the binary stream accessor
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresConverter;

impl ValueConverter for PostgresConverter {
    fn vendor(&self) -> DatabaseVendor {
        DatabaseVendor::PostgreSql
    }

    fn open_blob<'c>(
        &self,
        cursor: &'c dyn RowCursor,
        ordinal: usize,
    ) -> Result<Option<ColumnStream<'c>>, TabconvError> {
        cursor.get_binary_stream(ordinal)
    }
}

/// MySQL and SQL Server report large binaries as long binary columns and
/// stream them directly
#[derive(Debug, Clone, Copy)]
pub struct LongBinaryConverter {
    vendor: DatabaseVendor,
}

impl ValueConverter for LongBinaryConverter {
    fn vendor(&self) -> DatabaseVendor {
        self.vendor
    }

    fn streams_long_binary(&self) -> bool {
        true
    }
}

/// Oracle timestamps with time zone go through the timestamp accessor
#[derive(Debug, Clone, Copy, Default)]
pub struct OracleConverter;

impl ValueConverter for OracleConverter {
    fn vendor(&self) -> DatabaseVendor {
        DatabaseVendor::Oracle
    }

    fn read_timestamp_with_timezone(
        &self,
        cursor: &dyn RowCursor,
        ordinal: usize,
    ) -> Result<Value, TabconvError> {
        Ok(cursor
            .get_timestamp(ordinal)?
            .map(Value::DateTime)
            .unwrap_or(Value::Null))
    }
}

/// Select the converter for a vendor
pub fn converter_for(vendor: DatabaseVendor) -> Box<dyn ValueConverter> {
    match vendor {
        DatabaseVendor::PostgreSql => Box::new(PostgresConverter),
        DatabaseVendor::MySql | DatabaseVendor::SqlServer => {
            Box::new(LongBinaryConverter { vendor })
        }
        DatabaseVendor::Oracle => Box::new(OracleConverter),
        DatabaseVendor::Sqlite | DatabaseVendor::Generic => Box::new(GenericConverter),
    }
}
