//! Time-range index over segment files.
//!
//! Segment files encode their covered window in the file name:
//! `{start_ms}-{end_ms}.json` (or `.json.zst`), optionally grouped under a
//! per-symbol directory:
//!
//! ```text
//! data/json/
//! ├── btcusdt/
//! │   ├── 1707318000000-1707318300000.json
//! │   └── 1707318300000-1707318600000.json.zst
//! └── ethusdt/
//!     └── 1707318000000-1707318300000.json
//! ```
//!
//! [`discover`] finds candidate files, [`SegmentIndex::build`] parses their
//! names into [`IndexEntry`]s sorted by start time. Files whose names do not
//! parse are skipped and recorded in the index's [`DiagnosticLog`].

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::diagnostics::{DiagnosticCategory, DiagnosticLog};
use crate::error::{HistoryError, Result};
use crate::timefmt;

/// Extension of plain segment files.
pub const SEGMENT_EXTENSION: &str = ".json";

/// Extension of zstd-compressed segment files.
pub const COMPRESSED_SEGMENT_EXTENSION: &str = ".json.zst";

/// Extensions recognised by default.
pub fn default_extensions() -> Vec<String> {
    let mut extensions = vec![SEGMENT_EXTENSION.to_string()];
    if cfg!(feature = "compression") {
        extensions.push(COMPRESSED_SEGMENT_EXTENSION.to_string());
    }
    extensions
}

// ============================================================================
// Index Entry
// ============================================================================

/// One indexed segment file and the window its name claims to cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Window start (ms since epoch, inclusive)
    pub start: i64,

    /// Window end (ms since epoch, inclusive)
    pub end: i64,

    /// Segment file
    pub path: PathBuf,
}

impl IndexEntry {
    /// Returns true if `time` falls inside `[start, end]`.
    #[inline]
    pub fn contains(&self, time: i64) -> bool {
        self.start <= time && time <= self.end
    }

    /// Returns true if the window intersects `[t0, t1]`.
    #[inline]
    pub fn overlaps(&self, t0: i64, t1: i64) -> bool {
        !(self.end < t0 || self.start > t1)
    }

    /// Window length in milliseconds.
    #[inline]
    pub fn duration_ms(&self) -> i64 {
        self.end - self.start
    }

    /// Window start as a UTC datetime.
    pub fn start_datetime(&self) -> Option<DateTime<Utc>> {
        timefmt::to_datetime(self.start)
    }

    /// Window end as a UTC datetime.
    pub fn end_datetime(&self) -> Option<DateTime<Utc>> {
        timefmt::to_datetime(self.end)
    }
}

/// Human-facing description of one indexed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub file: String,
    pub start: String,
    pub end: String,
    pub start_ms: i64,
    pub end_ms: i64,
}

impl From<&IndexEntry> for FileInfo {
    fn from(entry: &IndexEntry) -> Self {
        Self {
            file: entry.path.display().to_string(),
            start: timefmt::format_millis(entry.start),
            end: timefmt::format_millis(entry.end),
            start_ms: entry.start,
            end_ms: entry.end,
        }
    }
}

/// Why a file name could not be indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameError {
    /// Not `{int}-{int}`
    Malformed,
    /// `start > end`
    Inverted,
}

/// Parse `{start}-{end}` from a segment file name.
///
/// Everything from the first `.` on is ignored, so `1000-2000.json` and
/// `1000-2000.json.zst` both yield `(1000, 2000)`.
pub fn parse_segment_name(file_name: &str) -> std::result::Result<(i64, i64), NameError> {
    let stem = file_name.split('.').next().unwrap_or(file_name);
    let (start_str, end_str) = stem.split_once('-').ok_or(NameError::Malformed)?;

    let start: i64 = start_str.parse().map_err(|_| NameError::Malformed)?;
    let end: i64 = end_str.parse().map_err(|_| NameError::Malformed)?;

    if start > end {
        return Err(NameError::Inverted);
    }
    Ok((start, end))
}

// ============================================================================
// Discovery
// ============================================================================

fn has_segment_extension(path: &Path, extensions: &[String]) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| extensions.iter().any(|ext| name.ends_with(ext.as_str())))
}

/// Find candidate segment files.
///
/// With `symbol`, only the immediate children of `directory/symbol/` are
/// considered; without, `directory` is walked recursively. Files are kept if
/// their name ends with one of `extensions`. The result is sorted by path.
///
/// # Errors
///
/// [`HistoryError::Io`] if `directory` itself cannot be read. A missing
/// symbol directory is not an error: it yields no files and a
/// [`DiagnosticCategory::MissingDirectory`] record.
pub fn discover(
    directory: &Path,
    symbol: Option<&str>,
    extensions: &[String],
    diagnostics: &mut DiagnosticLog,
) -> Result<Vec<PathBuf>> {
    let meta = fs::metadata(directory).map_err(|e| HistoryError::io(directory, e))?;
    if !meta.is_dir() {
        return Err(HistoryError::Io {
            path: directory.to_path_buf(),
            message: "not a directory".to_string(),
        });
    }

    let mut files = Vec::new();

    match symbol {
        Some(symbol) => {
            let symbol_dir = directory.join(symbol);
            if !symbol_dir.is_dir() {
                diagnostics.record(
                    DiagnosticCategory::MissingDirectory,
                    &symbol_dir,
                    format!("no data directory for symbol '{}'", symbol),
                );
                return Ok(files);
            }
            collect_files(&symbol_dir, false, extensions, &mut files, diagnostics)?;
        }
        None => collect_files(directory, true, extensions, &mut files, diagnostics)?,
    }

    files.sort();
    log::debug!(
        "Discovered {} segment files under {}",
        files.len(),
        directory.display()
    );
    Ok(files)
}

fn collect_files(
    dir: &Path,
    recursive: bool,
    extensions: &[String],
    files: &mut Vec<PathBuf>,
    diagnostics: &mut DiagnosticLog,
) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| HistoryError::io(dir, e))?;

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                diagnostics.record(DiagnosticCategory::UnreadableEntry, dir, e.to_string());
                continue;
            }
        };

        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(e) => {
                diagnostics.record(DiagnosticCategory::UnreadableEntry, &path, e.to_string());
                continue;
            }
        };

        if file_type.is_dir() {
            if recursive {
                if let Err(e) = collect_files(&path, true, extensions, files, diagnostics) {
                    diagnostics.record(DiagnosticCategory::UnreadableEntry, &path, e.to_string());
                }
            }
        } else if has_segment_extension(&path, extensions) {
            files.push(path);
        }
    }

    Ok(())
}

/// Symbol directories under a dataset root, sorted by name.
pub fn list_symbols<P: AsRef<Path>>(directory: P) -> Result<Vec<String>> {
    let directory = directory.as_ref();
    let mut symbols = Vec::new();

    for entry in fs::read_dir(directory).map_err(|e| HistoryError::io(directory, e))? {
        let entry = entry.map_err(|e| HistoryError::io(directory, e))?;
        if entry.path().is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                symbols.push(name.to_string());
            }
        }
    }

    symbols.sort();
    Ok(symbols)
}

// ============================================================================
// Segment Index
// ============================================================================

/// Sorted list of indexed segment files.
///
/// Immutable after build. Entries are ordered by start time; files with
/// equal starts keep their discovery order. Overlapping windows are allowed
/// and resolved first-match-wins by [`SegmentIndex::file_for_time`].
#[derive(Debug, Clone, Default)]
pub struct SegmentIndex {
    entries: Vec<IndexEntry>,
    diagnostics: DiagnosticLog,
}

impl SegmentIndex {
    /// Build an index from candidate files with default diagnostics.
    pub fn build<I, P>(files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self::build_with_diagnostics(files, DiagnosticLog::new())
    }

    /// Build an index, appending skip records to an existing log.
    pub fn build_with_diagnostics<I, P>(files: I, mut diagnostics: DiagnosticLog) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut entries = Vec::new();

        for file in files {
            let path = file.as_ref();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name,
                None => {
                    diagnostics.record(
                        DiagnosticCategory::MalformedFilename,
                        path,
                        "file name is not valid UTF-8",
                    );
                    continue;
                }
            };

            match parse_segment_name(name) {
                Ok((start, end)) => entries.push(IndexEntry {
                    start,
                    end,
                    path: path.to_path_buf(),
                }),
                Err(NameError::Malformed) => {
                    diagnostics.record(
                        DiagnosticCategory::MalformedFilename,
                        path,
                        "expected {start}-{end} in file name",
                    );
                }
                Err(NameError::Inverted) => {
                    diagnostics.record(
                        DiagnosticCategory::InvertedRange,
                        path,
                        "range start is after range end",
                    );
                }
            }
        }

        // stable: equal starts keep discovery order
        entries.sort_by_key(|e| e.start);

        log::info!(
            "Indexed {} segment files ({} skipped)",
            entries.len(),
            diagnostics.count_by_category(DiagnosticCategory::MalformedFilename)
                + diagnostics.count_by_category(DiagnosticCategory::InvertedRange)
        );

        Self {
            entries,
            diagnostics,
        }
    }

    /// Indexed entries in ascending start order.
    #[inline]
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Number of indexed files.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no file was indexed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records of every file or directory skipped while building.
    #[inline]
    pub fn diagnostics(&self) -> &DiagnosticLog {
        &self.diagnostics
    }

    /// First entry, in index order, whose window contains `time`.
    pub fn file_for_time(&self, time: i64) -> Option<&IndexEntry> {
        // entries past this point start after `time`
        let candidates = self.entries.partition_point(|e| e.start <= time);
        self.entries[..candidates].iter().find(|e| e.end >= time)
    }

    /// Entries whose window intersects `[t0, t1]`, in index order.
    pub fn files_overlapping(&self, t0: i64, t1: i64) -> Vec<&IndexEntry> {
        self.entries.iter().filter(|e| e.overlaps(t0, t1)).collect()
    }

    /// `(earliest start, latest end)` across all entries.
    pub fn available_range(&self) -> Option<(i64, i64)> {
        let start = self.entries.first()?.start;
        let end = self.entries.iter().map(|e| e.end).max()?;
        Some((start, end))
    }

    /// Describe every entry with formatted times.
    pub fn list_files(&self) -> Vec<FileInfo> {
        self.entries.iter().map(FileInfo::from).collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
