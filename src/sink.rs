//! Results file: one CSV row per processed prospectus.
//!
//! The file is truncated and given its header once at the start of a run,
//! then every row is flushed as soon as it is written, so a run that dies
//! half-way leaves every finished row on disk. The file starts with a UTF-8
//! BOM so Excel opens the Chinese headers correctly.

use crate::error::VcExtractError;
use crate::output::{OutputRow, FIELDNAMES};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Append-only CSV writer for one run.
pub struct CsvSink {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows: usize,
}

impl CsvSink {
    /// Create or truncate `path` and write the BOM and header.
    pub fn create(path: &Path) -> Result<Self, VcExtractError> {
        let mut file = File::create(path).map_err(|e| map_io_error(path, e))?;
        file.write_all(UTF8_BOM).map_err(|e| map_io_error(path, e))?;

        let mut writer = csv::WriterBuilder::new().from_writer(file);
        writer
            .write_record(FIELDNAMES)
            .map_err(|e| map_csv_error(path, e))?;
        writer.flush().map_err(|e| map_io_error(path, e))?;

        debug!("Results file {} initialised", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            writer,
            rows: 0,
        })
    }

    /// Append one row and flush it to disk.
    pub fn append(&mut self, row: &OutputRow) -> Result<(), VcExtractError> {
        self.writer
            .write_record(row.to_record())
            .map_err(|e| map_csv_error(&self.path, e))?;
        self.writer
            .flush()
            .map_err(|e| map_io_error(&self.path, e))?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows_written(&self) -> usize {
        self.rows
    }

    /// Flush and close; returns the number of rows written.
    pub fn finish(mut self) -> Result<usize, VcExtractError> {
        self.writer
            .flush()
            .map_err(|e| map_io_error(&self.path, e))?;
        Ok(self.rows)
    }
}

fn map_csv_error(path: &Path, e: csv::Error) -> VcExtractError {
    match e.into_kind() {
        csv::ErrorKind::Io(io) => map_io_error(path, io),
        other => VcExtractError::SinkWriteFailed {
            path: path.to_path_buf(),
            detail: format!("{:?}", other),
        },
    }
}

/// Permission errors (and Windows sharing violations) mean another program
/// holds the file.
fn map_io_error(path: &Path, e: io::Error) -> VcExtractError {
    if e.kind() == io::ErrorKind::PermissionDenied || is_sharing_violation(&e) {
        VcExtractError::SinkLocked {
            path: path.to_path_buf(),
        }
    } else {
        VcExtractError::SinkWriteFailed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        }
    }
}

#[cfg(windows)]
fn is_sharing_violation(e: &io::Error) -> bool {
    // ERROR_SHARING_VIOLATION / ERROR_LOCK_VIOLATION
    matches!(e.raw_os_error(), Some(32) | Some(33))
}

#[cfg(not(windows))]
fn is_sharing_violation(_e: &io::Error) -> bool {
    false
}
