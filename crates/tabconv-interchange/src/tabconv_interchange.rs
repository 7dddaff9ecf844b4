//! tabconv Interchange - moving tabular data between databases and text files
//!
//! This crate holds the conversion pipeline built on `tabconv-core`:
//!
//! - Delimited text: a configurable reader and writer (`CsvSettings`,
//!   `CsvReader`, `CsvWriter`) plus a column-aligning `BeautifyingCsvWriter`
//! - Records: name-keyed rows read from CSV or JSON (`RecordSource`) and
//!   written back out (`RecordSink`)
//! - Type inference over record streams, guided by per-field format hints
//! - Vendor-aware value conversion, including LOB externalization
//! - The export job: query or table export to console, files or zip archives,
//!   with progress, cancellation and a companion log
//!
//! # Architecture
//!
//! ```text
//! Connection → RowCursor → ValueConverter → RecordSink → OutputStream
//!                                             (CSV / JSON)   (console / file / zip)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let job = ExportJob::new(
//!     connection,
//!     ExportTarget::tables(["people"]),
//!     OutputTarget::parse("people.csv"),
//!     ExportOptions::default(),
//! )?;
//! let summary = job.run().await?;
//! println!("{} rows", summary.total_rows);
//! ```

mod beautify;
mod config;
mod converter;
mod csv_error;
mod csv_reader;
mod csv_writer;
mod export_log;
mod exporter;
mod format;
mod inference;
mod json_records;
mod output;
mod records;

pub use beautify::BeautifyingCsvWriter;
pub use config::{ColumnSection, ConfigError, ConversionConfig, CsvSection};
pub use converter::{
    ConvertError, DatabaseVendor, GenericConverter, LobContext, LobOptions, LongBinaryConverter,
    OracleConverter, PostgresConverter, ValueConverter, converter_for, side_file_path,
};
pub use csv_error::CsvError;
pub use csv_reader::{CsvReader, CsvRow};
pub use csv_writer::{CsvWriter, render_value};
pub use export_log::{ExportLog, format_elapsed};
pub use exporter::{
    ExportError, ExportFormat, ExportHandle, ExportJob, ExportOptions, ExportPhase,
    ExportProgress, ExportProgressCallback, ExportSummary, ExportTarget, ProgressSnapshot,
    TableSummary, format_structure, ordered_columns,
};
pub use format::{CsvSettings, CsvSettingsBuilder, LineBreak, QuoteMode, SettingsError};
pub use inference::{
    FILE_HINT, FieldHints, InferenceOptions, InferredType, MAX_INLINE_LENGTH, TypeInference,
    date_pattern_to_chrono, infer_types,
};
pub use json_records::{JsonRecordSink, JsonRecordSource, value_to_json};
pub use output::{CONSOLE, OutputStream, OutputTarget, generated_file_name, zip_entry_name};
pub use records::{
    CsvRecordSink, CsvRecordSource, Record, RecordError, RecordPreview, RecordSink, RecordSource,
    preview_records,
};
