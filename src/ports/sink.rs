//! Record sink port for persisting issued codes.

use std::path::PathBuf;

use crate::error::SinkError;
use crate::issuer::CodeRecord;

/// Files and rows produced by a sink once it is closed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkSummary {
    /// Every file opened during the run, in sequence order.
    pub files: Vec<PathBuf>,
    /// Total data rows written across all files.
    pub rows: u64,
}

/// Append-only destination for issued codes, shared by all workers.
pub trait RecordSink: Send + Sync {
    /// Appends one record. Concurrent calls never interleave partial rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the row cannot be written or the sink is closed.
    fn write(&self, record: &CodeRecord) -> Result<(), SinkError>;

    /// Flushes and closes the active file. Calling it again returns the same
    /// summary.
    ///
    /// # Errors
    ///
    /// Returns an error if buffered rows cannot be flushed.
    fn close(&self) -> Result<SinkSummary, SinkError>;
}
