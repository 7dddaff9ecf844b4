//! Output sink resolution
//!
//! An export writes to the console, a file, or a single entry inside a zip
//! archive. Directory targets get a timestamped file name per table, and an
//! existing file is never overwritten.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::exporter::ExportError;

/// Reserved output name for standard output
pub const CONSOLE: &str = "console";

/// Where an export writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Console,
    /// A single output file
    File(PathBuf),
    /// A directory receiving one auto-named file per table
    Directory(PathBuf),
}

impl OutputTarget {
    /// `console` selects standard output; an existing directory selects
    /// auto-named files; anything else is a file path.
    pub fn parse(spec: &str) -> Self {
        if spec.trim().eq_ignore_ascii_case(CONSOLE) {
            return Self::Console;
        }
        let path = PathBuf::from(spec);
        if path.is_dir() {
            Self::Directory(path)
        } else {
            Self::File(path)
        }
    }

    pub fn is_console(&self) -> bool {
        matches!(self, Self::Console)
    }

    /// Concrete file path for one exported unit, `None` for the console
    pub fn resolve(
        &self,
        name: &str,
        extension: &str,
        zip: bool,
        now: DateTime<Local>,
    ) -> Option<PathBuf> {
        match self {
            Self::Console => None,
            Self::File(path) => Some(path.clone()),
            Self::Directory(dir) => Some(dir.join(generated_file_name(name, extension, zip, now))),
        }
    }
}

/// `<name>_<yyyyMMdd_HHmmss>.<ext>[.zip]` with path-hostile characters replaced
pub fn generated_file_name(name: &str, extension: &str, zip: bool, now: DateTime<Local>) -> String {
    let safe: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let mut file_name = format!("{}_{}.{}", safe, now.format("%Y%m%d_%H%M%S"), extension);
    if zip {
        file_name.push_str(".zip");
    }
    file_name
}

/// Name of the single entry inside an output archive: the archive's file
/// name without `.zip`, given `extension` when nothing else remains
pub fn zip_entry_name(path: &Path, extension: &str) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let inner = if file_name.to_ascii_lowercase().ends_with(".zip") {
        &file_name[..file_name.len() - 4]
    } else {
        file_name.as_str()
    };
    if inner.contains('.') {
        inner.to_string()
    } else {
        format!("{}.{}", if inner.is_empty() { "export" } else { inner }, extension)
    }
}

enum Sink {
    Console(Box<dyn Write + Send>),
    File(BufWriter<File>),
    Zip(zip::ZipWriter<File>),
}

/// An open output. Writes go to the console, the file, or the archive entry.
pub struct OutputStream {
    sink: Sink,
    path: Option<PathBuf>,
}

impl OutputStream {
    pub fn console() -> Self {
        Self::from_writer(Box::new(io::stdout()))
    }

    /// Wrap an arbitrary writer (treated like the console)
    pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            sink: Sink::Console(writer),
            path: None,
        }
    }

    /// Create a new output file, optionally as a single-entry zip archive.
    /// Fails with `OutputExists` if anything is already at `path`.
    pub fn create(path: &Path, zip: bool, extension: &str) -> Result<Self, ExportError> {
        if path.exists() {
            return Err(ExportError::OutputExists(path.to_path_buf()));
        }
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => ExportError::OutputExists(path.to_path_buf()),
                _ => ExportError::Io(e),
            })?;

        let sink = if zip {
            let mut archive = zip::ZipWriter::new(file);
            archive.start_file(
                zip_entry_name(path, extension),
                zip::write::SimpleFileOptions::default(),
            )?;
            Sink::Zip(archive)
        } else {
            Sink::File(BufWriter::new(file))
        };
        tracing::debug!(path = %path.display(), zip, "output created");

        Ok(Self {
            sink,
            path: Some(path.to_path_buf()),
        })
    }

    /// File this stream writes to, `None` for the console
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Flush and close; completes the archive for zip outputs
    pub fn finish(self) -> Result<(), ExportError> {
        match self.sink {
            Sink::Console(mut w) => w.flush()?,
            Sink::File(mut w) => w.flush()?,
            Sink::Zip(archive) => {
                archive.finish()?;
            }
        }
        Ok(())
    }

    /// Close and delete the file
    pub fn discard(self) -> Result<(), ExportError> {
        let path = self.path.clone();
        drop(self.sink);
        if let Some(path) = path {
            fs::remove_file(&path)?;
            tracing::debug!(path = %path.display(), "output discarded");
        }
        Ok(())
    }
}

impl Write for OutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.sink {
            Sink::Console(w) => w.write(buf),
            Sink::File(w) => w.write(buf),
            Sink::Zip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.sink {
            Sink::Console(w) => w.flush(),
            Sink::File(w) => w.flush(),
            Sink::Zip(w) => w.flush(),
        }
    }
}
