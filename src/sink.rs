//! Rotating CSV output shared by all workers.
//!
//! Rows go to `<stem>_<NNN>.csv` in the output directory. Numbering continues
//! after the highest sequence already present, so earlier runs are kept. When
//! the active file holds `capacity` rows, the next write closes it and opens the
//! next sequence number first. Check, rotate and write all happen under one lock, so rows
//! from concurrent workers never interleave.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info};

use crate::error::SinkError;
use crate::issuer::CodeRecord;
use crate::ports::sink::{RecordSink, SinkSummary};

/// Header row written at the top of every file when headers are enabled.
pub const HEADER: [&str; 3] = ["Discount Codes", "Expiry Date", "Offer"];

/// Where and how rows are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    /// Directory holding the output files; created if missing.
    pub dir: PathBuf,
    /// Maximum data rows per file.
    pub capacity: u64,
    /// Whether each file starts with [`HEADER`].
    pub header: bool,
}

/// Deterministic name of output file number `sequence`.
#[must_use]
pub fn file_name(stem: &str, sequence: u32) -> String {
    format!("{stem}_{sequence:03}.csv")
}

/// Sequence number encoded in `name` when it is an output file for `stem`.
#[must_use]
pub fn parse_sequence(stem: &str, name: &str) -> Option<u32> {
    let digits = name.strip_prefix(stem)?.strip_prefix('_')?.strip_suffix(".csv")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Highest sequence number among `stem` output files in `dir`, or 0.
///
/// # Errors
///
/// Returns [`SinkError::Open`] if `dir` cannot be listed.
pub fn last_sequence(dir: &Path, stem: &str) -> Result<u32, SinkError> {
    let open_err = |source| SinkError::Open { path: dir.to_path_buf(), source };
    let mut last = 0;
    for entry in std::fs::read_dir(dir).map_err(open_err)? {
        let entry = entry.map_err(open_err)?;
        if let Some(seq) = entry.file_name().to_str().and_then(|n| parse_sequence(stem, n)) {
            last = last.max(seq);
        }
    }
    Ok(last)
}

struct OutputFile {
    writer: csv::Writer<File>,
    path: PathBuf,
    rows: u64,
}

#[derive(Default)]
struct SinkState {
    current: Option<OutputFile>,
    sequence: u32,
    files: Vec<PathBuf>,
    rows: u64,
    closed: bool,
}

/// [`RecordSink`] writing CSV files that rotate at a fixed row count.
pub struct RotatingCsvSink {
    config: SinkConfig,
    stem: String,
    state: Mutex<SinkState>,
}

impl RotatingCsvSink {
    /// Creates the output directory and opens the first file, numbered after
    /// any output already present for `stem`.
    ///
    /// Existing files are never overwritten: a name collision is an error.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Open`] if the directory or first file cannot be
    /// created.
    pub fn create(config: SinkConfig, stem: impl Into<String>) -> Result<Self, SinkError> {
        let stem = stem.into();
        std::fs::create_dir_all(&config.dir)
            .map_err(|source| SinkError::Open { path: config.dir.clone(), source })?;
        let sequence = last_sequence(&config.dir, &stem)?;
        if sequence > 0 {
            info!(stem = %stem, after = sequence, "continuing numbering after existing output");
        }
        let state = SinkState { sequence, ..SinkState::default() };
        let sink = Self { config, stem, state: Mutex::new(state) };
        {
            let mut state = sink.state.lock().map_err(|_| SinkError::Poisoned)?;
            sink.rotate(&mut state)?;
        }
        Ok(sink)
    }

    /// Output directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    /// Closes the sink and deletes its files, provided nothing was written.
    ///
    /// Used when a run fails before its first code is issued.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Flush`] if a file cannot be removed.
    pub fn abandon(&self) -> Result<(), SinkError> {
        let summary = self.close()?;
        if summary.rows > 0 {
            return Ok(());
        }
        for path in &summary.files {
            std::fs::remove_file(path)?;
            debug!(path = %path.display(), "empty output file removed");
        }
        Ok(())
    }

    fn rotate(&self, state: &mut SinkState) -> Result<(), SinkError> {
        if let Some(mut full) = state.current.take() {
            full.writer.flush()?;
            debug!(path = %full.path.display(), rows = full.rows, "output file closed");
        }

        let sequence = state.sequence + 1;
        let path = self.config.dir.join(file_name(&self.stem, sequence));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| SinkError::Open { path: path.clone(), source })?;
        state.sequence = sequence;
        let mut writer = csv::Writer::from_writer(file);
        if self.config.header {
            writer.write_record(HEADER)?;
            writer.flush()?;
        }

        info!(path = %path.display(), "writing codes to new output file");
        state.files.push(path.clone());
        state.current = Some(OutputFile { writer, path, rows: 0 });
        Ok(())
    }
}

impl RecordSink for RotatingCsvSink {
    fn write(&self, record: &CodeRecord) -> Result<(), SinkError> {
        let mut state = self.state.lock().map_err(|_| SinkError::Poisoned)?;
        if state.closed {
            return Err(SinkError::Closed);
        }

        let full = state.current.as_ref().map_or(true, |f| f.rows >= self.config.capacity);
        if full {
            self.rotate(&mut state)?;
        }

        let state = &mut *state;
        let file = state.current.as_mut().ok_or(SinkError::Closed)?;
        file.writer.write_record([&record.code, &record.expiry, &record.offer])?;
        file.writer.flush()?;
        file.rows += 1;
        state.rows += 1;
        Ok(())
    }

    fn close(&self) -> Result<SinkSummary, SinkError> {
        let mut state = self.state.lock().map_err(|_| SinkError::Poisoned)?;
        if let Some(mut last) = state.current.take() {
            last.writer.flush()?;
            debug!(path = %last.path.display(), rows = last.rows, "output file closed");
        }
        state.closed = true;
        Ok(SinkSummary { files: state.files.clone(), rows: state.rows })
    }
}
