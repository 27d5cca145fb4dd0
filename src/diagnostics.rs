//! Structured diagnostics for dataset loading.
//!
//! Index building never aborts on a bad auxiliary file. Instead the file is
//! skipped and a [`Diagnostic`] is recorded, so callers can inspect data
//! quality programmatically rather than scraping console output.
//!
//! # Design Philosophy
//!
//! 1. **Not fail silently**: every skipped file leaves a record
//! 2. **Not fail loudly**: one malformed file never aborts a dataset load
//! 3. **Enable debugging**: each record carries the path and the reason
//!
//! # Example
//!
//! ```ignore
//! use lob_history::{load_dataset, DiagnosticCategory};
//!
//! let dataset = load_dataset("data/json", Some("btcusdt"))?;
//! let diags = dataset.index().diagnostics();
//!
//! for d in diags.by_category(DiagnosticCategory::MalformedFilename) {
//!     println!("skipped {}: {}", d.path.display(), d.message);
//! }
//!
//! diags.export_to_file("diagnostics.json")?;
//! ```

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

/// Category of diagnostic for classification and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCategory {
    /// File name does not encode `{start}-{end}` as two integers
    MalformedFilename,

    /// File name encodes a range whose start is after its end
    InvertedRange,

    /// Requested symbol directory does not exist
    MissingDirectory,

    /// Directory entry could not be read during discovery
    UnreadableEntry,
}

impl DiagnosticCategory {
    /// Get a human-readable name for the category.
    pub fn name(&self) -> &'static str {
        match self {
            DiagnosticCategory::MalformedFilename => "MALFORMED_FILENAME",
            DiagnosticCategory::InvertedRange => "INVERTED_RANGE",
            DiagnosticCategory::MissingDirectory => "MISSING_DIRECTORY",
            DiagnosticCategory::UnreadableEntry => "UNREADABLE_ENTRY",
        }
    }
}

/// A single diagnostic record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Unique diagnostic ID (auto-incremented)
    pub id: u64,

    /// Diagnostic category
    pub category: DiagnosticCategory,

    /// File or directory the diagnostic is about
    pub path: PathBuf,

    /// Human-readable reason
    pub message: String,

    /// Wall clock time when recorded (milliseconds since epoch)
    pub recorded_at: i64,

    /// Additional context as key-value pairs
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub context: HashMap<String, String>,
}

impl Diagnostic {
    /// Create a new diagnostic.
    pub fn new(
        id: u64,
        category: DiagnosticCategory,
        path: impl AsRef<Path>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id,
            category,
            path: path.as_ref().to_path_buf(),
            message: message.into(),
            recorded_at: chrono::Utc::now().timestamp_millis(),
            context: HashMap::new(),
        }
    }

    /// Add context key-value pair.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Summary statistics for diagnostics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticSummary {
    /// Total number of diagnostics recorded (including any not retained)
    pub total: u64,

    /// Count by category name
    pub by_category: HashMap<String, u64>,
}

/// Configuration for the diagnostic log.
#[derive(Debug, Clone)]
pub struct DiagnosticsConfig {
    /// Maximum number of diagnostics to keep in memory
    pub max_diagnostics: usize,

    /// Whether to emit each diagnostic through `log::warn!`
    pub log_diagnostics: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            max_diagnostics: 10_000,
            log_diagnostics: true,
        }
    }
}

impl DiagnosticsConfig {
    /// Set the retention cap.
    pub fn with_max_diagnostics(mut self, max: usize) -> Self {
        self.max_diagnostics = max;
        self
    }

    /// Enable/disable logging of each diagnostic.
    pub fn with_logging(mut self, log: bool) -> Self {
        self.log_diagnostics = log;
        self
    }
}

/// Collected diagnostics from one dataset load.
#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    /// Configuration
    config: DiagnosticsConfig,

    /// Stored diagnostics
    diagnostics: Vec<Diagnostic>,

    /// Next ID to hand out
    next_id: u64,

    /// Count by category (for fast summary)
    category_counts: AHashMap<DiagnosticCategory, u64>,
}

impl DiagnosticLog {
    /// Create a new log with default configuration.
    pub fn new() -> Self {
        Self::with_config(DiagnosticsConfig::default())
    }

    /// Create a new log with custom configuration.
    pub fn with_config(config: DiagnosticsConfig) -> Self {
        Self {
            config,
            diagnostics: Vec::new(),
            next_id: 1,
            category_counts: AHashMap::new(),
        }
    }

    /// Record a diagnostic about `path`.
    ///
    /// Returns the diagnostic ID.
    pub fn record(
        &mut self,
        category: DiagnosticCategory,
        path: impl AsRef<Path>,
        message: impl Into<String>,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.push(Diagnostic::new(id, category, path, message))
    }

    /// Record a fully built diagnostic, re-numbering it in this log.
    pub fn push(&mut self, mut diagnostic: Diagnostic) -> u64 {
        if diagnostic.id == 0 || diagnostic.id >= self.next_id {
            diagnostic.id = self.next_id;
            self.next_id += 1;
        }

        if self.config.log_diagnostics {
            log::warn!(
                "[{}] {}: {}",
                diagnostic.category.name(),
                diagnostic.path.display(),
                diagnostic.message
            );
        }

        *self.category_counts.entry(diagnostic.category).or_insert(0) += 1;

        let id = diagnostic.id;
        if self.diagnostics.len() < self.config.max_diagnostics {
            self.diagnostics.push(diagnostic);
        }
        id
    }

    /// Number of retained diagnostics.
    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    /// Check if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.total_count() == 0
    }

    /// Total count including diagnostics beyond the retention cap.
    pub fn total_count(&self) -> u64 {
        self.category_counts.values().sum()
    }

    /// Count for a specific category.
    pub fn count_by_category(&self, category: DiagnosticCategory) -> u64 {
        self.category_counts.get(&category).copied().unwrap_or(0)
    }

    /// All retained diagnostics in record order.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Retained diagnostics of one category.
    pub fn by_category(&self, category: DiagnosticCategory) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.category == category)
            .collect()
    }

    /// Summary statistics.
    pub fn summary(&self) -> DiagnosticSummary {
        let by_category = self
            .category_counts
            .iter()
            .map(|(cat, count)| (cat.name().to_string(), *count))
            .collect();

        DiagnosticSummary {
            total: self.total_count(),
            by_category,
        }
    }

    /// Export summary and diagnostics to a JSON file.
    pub fn export_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        #[derive(Serialize)]
        struct Export<'a> {
            summary: DiagnosticSummary,
            diagnostics: &'a [Diagnostic],
        }

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let export = Export {
            summary: self.summary(),
            diagnostics: &self.diagnostics,
        };
        serde_json::to_writer_pretty(&mut writer, &export).map_err(std::io::Error::other)?;
        writer.flush()
    }

    /// Clear all diagnostics.
    pub fn clear(&mut self) {
        self.diagnostics.clear();
        self.category_counts.clear();
    }
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> DiagnosticLog {
        DiagnosticLog::with_config(DiagnosticsConfig::default().with_logging(false))
    }

    #[test]
    fn test_category_names() {
        assert_eq!(
            DiagnosticCategory::MalformedFilename.name(),
            "MALFORMED_FILENAME"
        );
        assert_eq!(DiagnosticCategory::InvertedRange.name(), "INVERTED_RANGE");
    }

    #[test]
    fn test_record_and_count() {
        let mut log = quiet();
        let id1 = log.record(DiagnosticCategory::MalformedFilename, "a/abc.json", "bad");
        let id2 = log.record(DiagnosticCategory::MalformedFilename, "a/x-y.json", "bad");
        let id3 = log.record(DiagnosticCategory::InvertedRange, "a/9-1.json", "start > end");

        assert_eq!((id1, id2, id3), (1, 2, 3));
        assert_eq!(log.len(), 3);
        assert_eq!(log.count_by_category(DiagnosticCategory::MalformedFilename), 2);
        assert_eq!(log.count_by_category(DiagnosticCategory::MissingDirectory), 0);
        assert_eq!(log.by_category(DiagnosticCategory::InvertedRange).len(), 1);
        assert_eq!(log.diagnostics()[0].path, PathBuf::from("a/abc.json"));
    }

    #[test]
    fn test_retention_cap_keeps_counting() {
        let config = DiagnosticsConfig::default()
            .with_logging(false)
            .with_max_diagnostics(1);
        let mut log = DiagnosticLog::with_config(config);

        log.record(DiagnosticCategory::UnreadableEntry, "x", "1");
        log.record(DiagnosticCategory::UnreadableEntry, "y", "2");

        assert_eq!(log.len(), 1);
        assert_eq!(log.total_count(), 2);
        assert!(!log.is_empty());
    }

    #[test]
    fn test_summary() {
        let mut log = quiet();
        log.record(DiagnosticCategory::MalformedFilename, "abc.json", "bad");
        log.record(DiagnosticCategory::MissingDirectory, "data/ethusdt", "missing");

        let summary = log.summary();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.by_category.get("MALFORMED_FILENAME"), Some(&1));
        assert_eq!(summary.by_category.get("MISSING_DIRECTORY"), Some(&1));
    }

    #[test]
    fn test_push_with_context() {
        let mut log = quiet();
        let diag = Diagnostic::new(0, DiagnosticCategory::InvertedRange, "9-1.json", "inverted")
            .with_context("start", "9")
            .with_context("end", "1");
        let id = log.push(diag);

        assert_eq!(id, 1);
        assert_eq!(log.diagnostics()[0].context.get("start"), Some(&"9".to_string()));
    }

    #[test]
    fn test_export_to_file() {
        let mut log = quiet();
        log.record(DiagnosticCategory::MalformedFilename, "abc.json", "bad name");

        let path = std::env::temp_dir().join(format!(
            "diagnostics_export_{}.json",
            std::process::id()
        ));
        log.export_to_file(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["summary"]["total"], 1);
        assert_eq!(value["diagnostics"][0]["category"], "MalformedFilename");
        assert_eq!(value["diagnostics"][0]["message"], "bad name");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_clear() {
        let mut log = quiet();
        log.record(DiagnosticCategory::MalformedFilename, "abc.json", "bad");
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.len(), 0);
    }
}
