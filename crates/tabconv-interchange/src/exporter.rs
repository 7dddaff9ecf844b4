//! Export orchestration
//!
//! An `ExportJob` exports either one query or a list of tables. For tables
//! it discovers columns and keys through `SchemaIntrospection`, orders
//! primary-key columns first and the rest alphabetically, and orders rows by
//! the primary key. Each row is read through the vendor's `ValueConverter`
//! and handed to a `RecordSink` writing into the resolved output.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::Local;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tabconv_core::{
    ColumnInfo, Connection, ForeignKeyInfo, PrimaryKeyInfo, RowCursor,
    SchemaIntrospection, TabconvError, Value,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::converter::{ConvertError, DatabaseVendor, LobContext, LobOptions, ValueConverter, converter_for};
use crate::csv_error::CsvError;
use crate::export_log::ExportLog;
use crate::format::CsvSettings;
use crate::json_records::JsonRecordSink;
use crate::output::{OutputStream, OutputTarget};
use crate::records::{CsvRecordSink, RecordError, RecordSink};

/// Errors during export
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Query error in {context}: {source}")]
    Query {
        context: String,
        #[source]
        source: TabconvError,
    },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Schema introspection not supported")]
    SchemaIntrospectionNotSupported,

    #[error("Output already exists: {}", .0.display())]
    OutputExists(PathBuf),

    #[error("Invalid export job: {0}")]
    InvalidJob(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Csv(#[from] CsvError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error("Export task failed: {0}")]
    Task(String),
}

/// Output format of the exported rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

/// What to export
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportTarget {
    /// A single query; `name` labels the output and the log
    Query { sql: String, name: String },
    /// Tables by name; empty means every table of the schema
    Tables(Vec<String>),
}

impl ExportTarget {
    pub fn query(sql: impl Into<String>) -> Self {
        Self::Query {
            sql: sql.into(),
            name: "query".to_string(),
        }
    }

    pub fn tables<S: Into<String>>(tables: impl IntoIterator<Item = S>) -> Self {
        Self::Tables(tables.into_iter().map(Into::into).collect())
    }
}

/// Options for export operations
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub format: ExportFormat,
    pub csv: CsvSettings,
    /// Write a header row (delimited output only)
    pub write_headers: bool,
    /// Align delimited columns in a second pass
    pub beautify: bool,
    pub lob: LobOptions,
    /// Write each output as a single entry of a zip archive
    pub zip: bool,
    /// Companion log file
    pub log_path: Option<PathBuf>,
    /// Dump table structure instead of rows
    pub structure_only: bool,
    /// Schema name (for databases that support schemas)
    pub schema: Option<String>,
    /// WHERE clause filter for each table
    pub filters: HashMap<String, String>,
    /// Tables to include when every table is exported (empty = all)
    pub include_tables: Vec<String>,
    /// Tables to exclude
    pub exclude_tables: Vec<String>,
    /// Maximum number of rows to export per table (None = unlimited)
    pub row_limit: Option<u64>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: ExportFormat::Csv,
            csv: CsvSettings::default(),
            write_headers: true,
            beautify: false,
            lob: LobOptions::default(),
            zip: false,
            log_path: None,
            structure_only: false,
            schema: None,
            filters: HashMap::new(),
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
            row_limit: None,
        }
    }
}

impl ExportOptions {
    pub fn json() -> Self {
        Self {
            format: ExportFormat::Json,
            ..Default::default()
        }
    }

    pub fn structure_only() -> Self {
        Self {
            structure_only: true,
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.row_limit = Some(limit);
        self
    }

    pub fn with_filter(mut self, table: impl Into<String>, filter: impl Into<String>) -> Self {
        self.filters.insert(table.into(), filter.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    fn should_include_table(&self, table_name: &str) -> bool {
        if !self.include_tables.is_empty() && !self.include_tables.iter().any(|t| t == table_name)
        {
            return false;
        }
        !self.exclude_tables.iter().any(|t| t == table_name)
    }
}

/// Progress callback for export operations
pub type ExportProgressCallback = Box<dyn Fn(ExportProgress) + Send + Sync>;

/// Export progress information
#[derive(Debug, Clone)]
pub struct ExportProgress {
    /// Current phase of export
    pub phase: ExportPhase,
    /// Current table being exported
    pub current_table: Option<String>,
    /// Total number of tables
    pub total_tables: usize,
    /// Number of tables completed
    pub tables_completed: usize,
    /// Rows exported for current table
    pub rows_exported: u64,
    /// Total rows in current table (if known)
    pub total_rows: Option<u64>,
}

/// Phases of the export process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportPhase {
    Starting,
    /// Fetching table list, columns and keys
    FetchingSchema,
    ExportingData,
    Cancelled,
    Complete,
}

type FileLog = ExportLog<std::io::BufWriter<std::fs::File>>;

/// Rows exported between two `ExportingData` progress events
const PROGRESS_INTERVAL: u64 = 1000;

/// Counters shared with an `ExportHandle`
#[derive(Debug)]
struct ExportCounters {
    rows_exported: AtomicU64,
    tables_completed: AtomicUsize,
    total_tables: AtomicUsize,
    /// Pre-counted rows of the current table, -1 when unknown
    current_total: AtomicI64,
}

impl Default for ExportCounters {
    fn default() -> Self {
        Self {
            rows_exported: AtomicU64::new(0),
            tables_completed: AtomicUsize::new(0),
            total_tables: AtomicUsize::new(0),
            current_total: AtomicI64::new(-1),
        }
    }
}

/// Point-in-time view of a running export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub rows_exported: u64,
    pub tables_completed: usize,
    pub total_tables: usize,
    pub current_table_rows: Option<u64>,
}

/// Result of one exported table or query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSummary {
    pub name: String,
    pub rows: u64,
    /// File written, `None` for console output
    pub output: Option<PathBuf>,
}

/// Result of a finished or cancelled export
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub tables: Vec<TableSummary>,
    pub total_rows: u64,
    pub elapsed: Duration,
    /// Stopped early on request; not an error
    pub cancelled: bool,
}

/// One query to run, with the name it is exported under
#[derive(Debug, Clone)]
struct ExportUnit {
    name: String,
    select_sql: String,
    count_sql: String,
    /// Set for tables; used by the structure dump
    table: Option<String>,
}

enum UnitOutcome {
    Done(TableSummary),
    Cancelled(TableSummary),
}

/// A validated export, ready to run once
pub struct ExportJob {
    connection: Arc<dyn Connection>,
    target: ExportTarget,
    output: OutputTarget,
    options: ExportOptions,
    vendor: DatabaseVendor,
    converter: Box<dyn ValueConverter>,
    progress_callback: Option<ExportProgressCallback>,
    cancel: CancellationToken,
    counters: Arc<ExportCounters>,
    console_writer: Mutex<Option<Box<dyn Write + Send>>>,
}

impl ExportJob {
    /// Validate the job and select the value converter from the driver name
    pub fn new(
        connection: Arc<dyn Connection>,
        target: ExportTarget,
        output: OutputTarget,
        options: ExportOptions,
    ) -> Result<Self, ExportError> {
        match &target {
            ExportTarget::Query { sql, .. } => {
                if sql.trim().is_empty() {
                    return Err(ExportError::InvalidJob("query text is empty".into()));
                }
                if options.structure_only {
                    return Err(ExportError::InvalidJob(
                        "structure-only export needs a table list".into(),
                    ));
                }
            }
            ExportTarget::Tables(tables) => {
                if matches!(output, OutputTarget::File(_)) && tables.len() != 1 {
                    return Err(ExportError::InvalidJob(
                        "a single output file takes exactly one table; use a directory".into(),
                    ));
                }
            }
        }
        if options.beautify && options.format != ExportFormat::Csv {
            return Err(ExportError::InvalidJob(
                "beautification applies to delimited output only".into(),
            ));
        }
        if options.zip && output.is_console() {
            return Err(ExportError::InvalidJob(
                "zip output needs a file target".into(),
            ));
        }
        if options.lob.externalize && output.is_console() {
            tracing::warn!("large objects are inlined when exporting to the console");
        }

        let vendor = DatabaseVendor::from_driver_name(connection.driver_name());
        Ok(Self {
            converter: converter_for(vendor),
            vendor,
            connection,
            target,
            output,
            options,
            progress_callback: None,
            cancel: CancellationToken::new(),
            counters: Arc::new(ExportCounters::default()),
            console_writer: Mutex::new(None),
        })
    }

    /// Set progress callback
    pub fn with_progress_callback(mut self, callback: ExportProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Use an externally owned cancellation token
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Send console output to `writer` instead of stdout
    pub fn with_console_writer(mut self, writer: Box<dyn Write + Send>) -> Self {
        *self.console_writer.get_mut() = Some(writer);
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn vendor(&self) -> DatabaseVendor {
        self.vendor
    }

    pub fn progress(&self) -> ProgressSnapshot {
        snapshot(&self.counters)
    }

    /// Run in the background on the tokio runtime
    pub fn spawn(self) -> ExportHandle {
        let cancel = self.cancel.clone();
        let counters = self.counters.clone();
        let task = tokio::spawn(async move { self.run().await });
        ExportHandle {
            cancel,
            counters,
            task,
        }
    }

    /// Run to completion or cancellation
    pub async fn run(&self) -> Result<ExportSummary, ExportError> {
        let started = Instant::now();
        let mut log = match &self.options.log_path {
            Some(path) => Some(ExportLog::create(path)?),
            None => None,
        };
        if let Some(log) = log.as_mut() {
            log.start(&self.describe())?;
        }
        tracing::info!(job = %self.describe(), vendor = ?self.vendor, "export started");
        self.report(ExportPhase::Starting, None, 0, None);

        let result = self.run_units(&mut log, started).await;

        match &result {
            Ok(summary) => {
                if let Some(log) = log.as_mut() {
                    if summary.cancelled {
                        log.cancelled()?;
                    }
                    log.finish(summary.total_rows)?;
                }
                tracing::info!(
                    rows = summary.total_rows,
                    tables = summary.tables.len(),
                    cancelled = summary.cancelled,
                    elapsed_ms = summary.elapsed.as_millis() as u64,
                    "export finished"
                );
            }
            Err(e) => {
                if let Some(log) = log.as_mut() {
                    if let Err(log_err) = log.error(e) {
                        tracing::warn!(error = %log_err, "failed to write export log");
                    }
                }
                tracing::error!(error = %e, "export failed");
            }
        }
        result
    }

    fn describe(&self) -> String {
        match &self.target {
            ExportTarget::Query { name, .. } => format!("query {}", name),
            ExportTarget::Tables(tables) if tables.is_empty() => "all tables".to_string(),
            ExportTarget::Tables(tables) => format!("tables {}", tables.join(", ")),
        }
    }

    async fn run_units(
        &self,
        log: &mut Option<FileLog>,
        started: Instant,
    ) -> Result<ExportSummary, ExportError> {
        let units = self.resolve_units().await?;
        self.counters.total_tables.store(units.len(), Ordering::Relaxed);
        if matches!(self.target, ExportTarget::Tables(_))
            && matches!(self.output, OutputTarget::File(_))
            && units.len() != 1
        {
            return Err(ExportError::InvalidJob(format!(
                "{} tables resolved for a single output file",
                units.len()
            )));
        }

        let mut console = match self.output {
            OutputTarget::Console => Some(self.console_stream()),
            _ => None,
        };
        // Tables sharing the console as JSON form one object keyed by table name
        let json_document = console.is_some()
            && self.options.format == ExportFormat::Json
            && !self.options.structure_only
            && matches!(self.target, ExportTarget::Tables(_));
        if json_document {
            if let Some(out) = console.as_mut() {
                out.write_all(b"{\n")?;
            }
        }

        let mut summary = ExportSummary {
            tables: Vec::new(),
            total_rows: 0,
            elapsed: Duration::ZERO,
            cancelled: false,
        };

        for (index, unit) in units.iter().enumerate() {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            if let Some(log) = log.as_mut() {
                log.table_started(&unit.name)?;
            }

            let outcome = match console.as_mut() {
                Some(out) => {
                    if json_document {
                        write_json_key(out, index, &unit.name)?;
                    }
                    self.export_unit(unit, index, out, false, log).await?
                }
                None => {
                    let extension = if self.options.structure_only {
                        "txt"
                    } else {
                        self.options.format.extension()
                    };
                    let path = self
                        .output
                        .resolve(&unit.name, extension, self.options.zip, Local::now())
                        .ok_or_else(|| ExportError::InvalidJob("no output path".into()))?;
                    let mut out = OutputStream::create(&path, self.options.zip, extension)?;
                    let outcome = self.export_unit(unit, index, &mut out, true, log).await;
                    match outcome {
                        Ok(UnitOutcome::Cancelled(table)) if table.rows == 0 => {
                            out.discard()?;
                            UnitOutcome::Cancelled(TableSummary {
                                output: None,
                                ..table
                            })
                        }
                        Ok(outcome) => {
                            out.finish()?;
                            outcome
                        }
                        Err(e) => {
                            // Keep what was written; closing completes a zip archive.
                            if let Err(close_err) = out.finish() {
                                tracing::warn!(error = %close_err, "failed to close output after error");
                            }
                            return Err(e);
                        }
                    }
                }
            };

            let (table, cancelled) = match outcome {
                UnitOutcome::Done(table) => (table, false),
                UnitOutcome::Cancelled(table) => (table, true),
            };
            if let Some(log) = log.as_mut() {
                log.table_finished(&table.name, table.rows)?;
            }
            summary.total_rows += table.rows;
            summary.tables.push(table);
            if cancelled {
                summary.cancelled = true;
                break;
            }
            self.counters.tables_completed.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(mut out) = console {
            if json_document {
                out.write_all(b"}\n")?;
            }
            out.finish()?;
        }

        summary.elapsed = started.elapsed();
        let phase = if summary.cancelled {
            ExportPhase::Cancelled
        } else {
            ExportPhase::Complete
        };
        self.report(phase, None, summary.total_rows, None);
        Ok(summary)
    }

    async fn resolve_units(&self) -> Result<Vec<ExportUnit>, ExportError> {
        match &self.target {
            ExportTarget::Query { sql, name } => Ok(vec![ExportUnit {
                name: name.clone(),
                select_sql: sql.clone(),
                count_sql: format!("SELECT COUNT(*) FROM ({}) q", sql.trim().trim_end_matches(';')),
                table: None,
            }]),
            ExportTarget::Tables(requested) => {
                self.report(ExportPhase::FetchingSchema, None, 0, None);
                let introspection = self.connection.as_schema_introspection();
                let tables = if requested.is_empty() {
                    let introspection =
                        introspection.ok_or(ExportError::SchemaIntrospectionNotSupported)?;
                    introspection
                        .list_tables(self.options.schema.as_deref())
                        .await
                        .map_err(|e| ExportError::Schema(e.to_string()))?
                        .into_iter()
                        .map(|t| t.name)
                        .filter(|name| self.options.should_include_table(name))
                        .collect()
                } else {
                    requested.clone()
                };

                let mut units = Vec::with_capacity(tables.len());
                for table in tables {
                    units.push(self.table_unit(introspection, &table).await?);
                }
                Ok(units)
            }
        }
    }

    fn qualified_name(&self, table: &str) -> String {
        match &self.options.schema {
            Some(schema) => format!(
                "{}.{}",
                self.vendor.quote_identifier(schema),
                self.vendor.quote_identifier(table)
            ),
            None => self.vendor.quote_identifier(table),
        }
    }

    async fn table_unit(
        &self,
        introspection: Option<&dyn SchemaIntrospection>,
        table: &str,
    ) -> Result<ExportUnit, ExportError> {
        let from = self.qualified_name(table);
        let filter = self
            .options
            .filters
            .get(table)
            .filter(|f| !f.trim().is_empty())
            .map(|f| format!(" WHERE {}", f))
            .unwrap_or_default();

        let (column_list, order_by) = match introspection {
            Some(introspection) => {
                let schema = self.options.schema.as_deref();
                let columns = introspection
                    .get_columns(schema, table)
                    .await
                    .map_err(|e| ExportError::Schema(e.to_string()))?;
                let pk = introspection
                    .get_primary_key(schema, table)
                    .await
                    .map_err(|e| ExportError::Schema(e.to_string()))?;
                let ordered = ordered_columns(&columns, pk.as_ref());
                let column_list = if ordered.is_empty() {
                    "*".to_string()
                } else {
                    self.quoted_list(&ordered)
                };
                let order_by = match pk {
                    Some(pk) if !pk.columns.is_empty() => {
                        format!(" ORDER BY {}", self.quoted_list(&pk.columns))
                    }
                    _ => String::new(),
                };
                (column_list, order_by)
            }
            None => ("*".to_string(), String::new()),
        };

        Ok(ExportUnit {
            name: table.to_string(),
            select_sql: format!("SELECT {} FROM {}{}{}", column_list, from, filter, order_by),
            count_sql: format!("SELECT COUNT(*) FROM {}{}", from, filter),
            table: Some(table.to_string()),
        })
    }

    fn quoted_list(&self, names: &[String]) -> String {
        names
            .iter()
            .map(|n| self.vendor.quote_identifier(n))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Pre-count for progress; a failure only costs the total
    async fn count_rows(&self, unit: &ExportUnit) -> Option<u64> {
        match self.connection.query(&unit.count_sql, &[]).await {
            Ok(result) => result.scalar_i64().and_then(|n| u64::try_from(n).ok()),
            Err(e) => {
                tracing::warn!(unit = %unit.name, error = %e, "row count failed; total unknown");
                None
            }
        }
    }

    async fn export_unit(
        &self,
        unit: &ExportUnit,
        index: usize,
        out: &mut OutputStream,
        owns_output: bool,
        log: &mut Option<FileLog>,
    ) -> Result<UnitOutcome, ExportError> {
        let output_path = out.path().map(|p| p.to_path_buf());
        if self.options.structure_only {
            let table = unit.table.as_deref().unwrap_or(&unit.name);
            self.write_structure(table, out).await?;
            return Ok(UnitOutcome::Done(TableSummary {
                name: unit.name.clone(),
                rows: 0,
                output: output_path,
            }));
        }

        let total = self.count_rows(unit).await;
        self.counters
            .current_total
            .store(total.map(|t| t as i64).unwrap_or(-1), Ordering::Relaxed);
        if let Some(log) = log.as_mut() {
            log.total_rows(total)?;
        }
        self.report(ExportPhase::ExportingData, Some(&unit.name), 0, total);
        tracing::debug!(unit = %unit.name, index, total, sql = %unit.select_sql, "exporting");

        let query_err = |source: TabconvError| ExportError::Query {
            context: format!("export of {}", unit.name),
            source,
        };
        let mut cursor = self
            .connection
            .open_cursor(&unit.select_sql)
            .await
            .map_err(query_err)?;

        let columns = cursor.columns().to_vec();
        let lob = LobContext::new(
            self.options.lob,
            if owns_output { output_path.as_deref() } else { None },
        );

        let mut rows = 0u64;
        let mut cancelled = false;
        {
            let mut sink = self.make_sink(out)?;
            sink.begin(&columns)?;
            loop {
                if self.cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
                if self.options.row_limit.is_some_and(|limit| rows >= limit) {
                    break;
                }
                if !cursor.next().await.map_err(query_err)? {
                    break;
                }
                let values = self.convert_row(cursor.as_ref(), columns.len(), &lob)?;
                sink.write_record(&values)?;
                rows += 1;
                self.counters.rows_exported.fetch_add(1, Ordering::Relaxed);
                if rows % PROGRESS_INTERVAL == 0 {
                    self.report(ExportPhase::ExportingData, Some(&unit.name), rows, total);
                }
            }
            if !(cancelled && rows == 0 && owns_output) {
                sink.finish()?;
            }
        }
        drop(cursor);

        self.report(ExportPhase::ExportingData, Some(&unit.name), rows, total);
        let table = TableSummary {
            name: unit.name.clone(),
            rows,
            output: output_path,
        };
        if cancelled {
            tracing::info!(unit = %unit.name, rows, "export cancelled");
            Ok(UnitOutcome::Cancelled(table))
        } else {
            tracing::debug!(unit = %unit.name, rows, "unit exported");
            Ok(UnitOutcome::Done(table))
        }
    }

    fn convert_row(
        &self,
        cursor: &dyn RowCursor,
        column_count: usize,
        lob: &LobContext<'_>,
    ) -> Result<Vec<Value>, ExportError> {
        (0..column_count)
            .map(|ordinal| {
                self.converter
                    .convert(cursor, ordinal, lob)
                    .map_err(ExportError::from)
            })
            .collect()
    }

    fn console_stream(&self) -> OutputStream {
        match self.console_writer.lock().take() {
            Some(writer) => OutputStream::from_writer(writer),
            None => OutputStream::console(),
        }
    }

    fn make_sink<'o>(
        &self,
        out: &'o mut OutputStream,
    ) -> Result<Box<dyn RecordSink + Send + 'o>, ExportError> {
        let settings = self.options.csv.clone();
        let headers = self.options.write_headers;
        Ok(match self.options.format {
            ExportFormat::Csv if self.options.beautify => {
                Box::new(CsvRecordSink::beautified(out, settings, headers)?)
            }
            ExportFormat::Csv => Box::new(CsvRecordSink::new(out, settings, headers)),
            ExportFormat::Json => Box::new(JsonRecordSink::new(out)),
        })
    }

    async fn write_structure(&self, table: &str, out: &mut OutputStream) -> Result<(), ExportError> {
        let introspection = self
            .connection
            .as_schema_introspection()
            .ok_or(ExportError::SchemaIntrospectionNotSupported)?;
        let schema = self.options.schema.as_deref();
        let columns = introspection
            .get_columns(schema, table)
            .await
            .map_err(|e| ExportError::Schema(e.to_string()))?;
        let pk = introspection
            .get_primary_key(schema, table)
            .await
            .map_err(|e| ExportError::Schema(e.to_string()))?;
        let fks = introspection
            .get_foreign_keys(schema, table)
            .await
            .map_err(|e| ExportError::Schema(e.to_string()))?;

        out.write_all(format_structure(table, &columns, pk.as_ref(), &fks).as_bytes())?;
        Ok(())
    }

    fn report(
        &self,
        phase: ExportPhase,
        table: Option<&str>,
        rows_exported: u64,
        total_rows: Option<u64>,
    ) {
        if let Some(ref callback) = self.progress_callback {
            callback(ExportProgress {
                phase,
                current_table: table.map(str::to_string),
                total_tables: self.counters.total_tables.load(Ordering::Relaxed),
                tables_completed: self.counters.tables_completed.load(Ordering::Relaxed),
                rows_exported,
                total_rows,
            });
        }
    }
}

/// Primary-key columns in key order, then the rest alphabetically
pub fn ordered_columns(columns: &[ColumnInfo], pk: Option<&PrimaryKeyInfo>) -> Vec<String> {
    let pk_columns: Vec<String> = pk
        .map(|pk| {
            pk.columns
                .iter()
                .filter(|c| columns.iter().any(|col| &col.name == *c))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    let mut rest: Vec<String> = columns
        .iter()
        .map(|c| c.name.clone())
        .filter(|name| !pk_columns.contains(name))
        .collect();
    rest.sort_by_key(|name| name.to_lowercase());

    pk_columns.into_iter().chain(rest).collect()
}

/// Textual schema dump of one table
pub fn format_structure(
    table: &str,
    columns: &[ColumnInfo],
    pk: Option<&PrimaryKeyInfo>,
    fks: &[ForeignKeyInfo],
) -> String {
    let mut text = format!("Table: {}\n", table);
    text.push_str("Columns:\n");
    let mut sorted: Vec<&ColumnInfo> = columns.iter().collect();
    sorted.sort_by_key(|c| c.ordinal);
    for col in sorted {
        text.push_str(&format!(
            "  {} {}{}\n",
            col.name,
            col.data_type,
            if col.nullable { "" } else { " NOT NULL" }
        ));
    }
    match pk {
        Some(pk) if !pk.columns.is_empty() => {
            text.push_str(&format!("Primary key: {}\n", pk.columns.join(", ")));
        }
        _ => text.push_str("Primary key: none\n"),
    }
    if !fks.is_empty() {
        text.push_str("Foreign keys:\n");
        for fk in fks {
            let target = match &fk.referenced_schema {
                Some(schema) => format!("{}.{}", schema, fk.referenced_table),
                None => fk.referenced_table.clone(),
            };
            text.push_str(&format!(
                "  {} ({}) -> {} ({}) ON UPDATE {} ON DELETE {}\n",
                fk.name,
                fk.columns.join(", "),
                target,
                fk.referenced_columns.join(", "),
                fk.on_update.as_sql(),
                fk.on_delete.as_sql()
            ));
        }
    }
    text
}

fn write_json_key(out: &mut OutputStream, index: usize, name: &str) -> Result<(), ExportError> {
    if index > 0 {
        out.write_all(b",\n")?;
    }
    let key = serde_json::to_string(name).map_err(RecordError::from)?;
    write!(out, "{}: ", key)?;
    Ok(())
}

fn snapshot(counters: &ExportCounters) -> ProgressSnapshot {
    let current = counters.current_total.load(Ordering::Relaxed);
    ProgressSnapshot {
        rows_exported: counters.rows_exported.load(Ordering::Relaxed),
        tables_completed: counters.tables_completed.load(Ordering::Relaxed),
        total_tables: counters.total_tables.load(Ordering::Relaxed),
        current_table_rows: u64::try_from(current).ok(),
    }
}

/// Handle to an export running in the background
pub struct ExportHandle {
    cancel: CancellationToken,
    counters: Arc<ExportCounters>,
    task: tokio::task::JoinHandle<Result<ExportSummary, ExportError>>,
}

impl ExportHandle {
    /// Ask the job to stop after the current row
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn progress(&self) -> ProgressSnapshot {
        snapshot(&self.counters)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) -> Result<ExportSummary, ExportError> {
        self.task
            .await
            .map_err(|e| ExportError::Task(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tabconv_core::ForeignKeyAction;

    fn column(name: &str, data_type: &str, ordinal: usize) -> ColumnInfo {
        ColumnInfo::new(name, data_type, ordinal)
    }

    #[test]
    fn test_ordered_columns_pk_first() {
        let columns = vec![
            column("name", "TEXT", 0),
            column("Age", "INTEGER", 1),
            column("id", "INTEGER", 2),
            column("region", "TEXT", 3),
        ];
        let pk = PrimaryKeyInfo {
            name: None,
            columns: vec!["region".into(), "id".into()],
        };
        assert_eq!(
            ordered_columns(&columns, Some(&pk)),
            vec!["region", "id", "Age", "name"]
        );
        assert_eq!(
            ordered_columns(&columns, None),
            vec!["Age", "id", "name", "region"]
        );
    }

    #[test]
    fn test_format_structure() {
        let mut id = column("id", "INTEGER", 0);
        id.nullable = false;
        let columns = vec![id, column("owner_id", "INTEGER", 1)];
        let pk = PrimaryKeyInfo {
            name: Some("pk_pets".into()),
            columns: vec!["id".into()],
        };
        let fk = ForeignKeyInfo {
            name: "fk_owner".into(),
            columns: vec!["owner_id".into()],
            referenced_table: "people".into(),
            referenced_schema: None,
            referenced_columns: vec!["id".into()],
            on_update: ForeignKeyAction::NoAction,
            on_delete: ForeignKeyAction::Cascade,
        };
        assert_eq!(
            format_structure("pets", &columns, Some(&pk), &[fk]),
            "Table: pets\n\
             Columns:\n  id INTEGER NOT NULL\n  owner_id INTEGER\n\
             Primary key: id\n\
             Foreign keys:\n  fk_owner (owner_id) -> people (id) ON UPDATE NO ACTION ON DELETE CASCADE\n"
        );
    }

    #[test]
    fn test_include_exclude() {
        let options = ExportOptions {
            include_tables: vec!["a".into(), "b".into()],
            exclude_tables: vec!["b".into()],
            ..Default::default()
        };
        assert!(options.should_include_table("a"));
        assert!(!options.should_include_table("b"));
        assert!(!options.should_include_table("c"));
    }
}
