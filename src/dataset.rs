//! Multi-file dataset queries.
//!
//! A [`Dataset`] ties together discovery, the [`SegmentIndex`], segment
//! loading (optionally cached) and book reconstruction to answer two
//! questions:
//!
//! - what did the book look like at time `t`? ([`Dataset::at_time`])
//! - every book between `t0` and `t1`, sampled every N updates per file
//!   ([`Dataset::in_range`])
//!
//! # Example
//!
//! ```ignore
//! use lob_history::{Dataset, DatasetConfig};
//!
//! let config = DatasetConfig::new("data/json")
//!     .with_symbol("btcusdt")
//!     .with_cache_capacity(8);
//! let dataset = Dataset::open(config)?;
//!
//! if let Some((first, last)) = dataset.available_range() {
//!     let books = dataset.in_range(first, last, 10, Some(5))?;
//!     println!("{} sampled books", books.len());
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::{CacheStats, SegmentCache};
use crate::diagnostics::{DiagnosticLog, DiagnosticsConfig};
use crate::error::{HistoryError, Result};
use crate::index::{default_extensions, discover, FileInfo, IndexEntry, SegmentIndex};
use crate::segment::{load_segment, SegmentLog};
use crate::types::BookSnapshot;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for opening a dataset.
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    /// Dataset root directory
    pub root: PathBuf,

    /// Restrict to `root/{symbol}/` (None = walk the whole tree)
    pub symbol: Option<String>,

    /// Recognised segment file suffixes
    pub extensions: Vec<String>,

    /// Segments kept decoded in memory (0 = no caching)
    pub cache_capacity: usize,

    /// Diagnostics settings for discovery and indexing
    pub diagnostics: DiagnosticsConfig,
}

impl DatasetConfig {
    /// Create a configuration with default settings.
    ///
    /// # Defaults
    ///
    /// - `symbol`: None
    /// - `extensions`: `.json`, plus `.json.zst` with the `compression` feature
    /// - `cache_capacity`: 0
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            symbol: None,
            extensions: default_extensions(),
            cache_capacity: 0,
            diagnostics: DiagnosticsConfig::default(),
        }
    }

    /// Restrict the dataset to one symbol directory.
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    /// Replace the recognised segment extensions.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Keep up to `capacity` decoded segments in memory.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Set diagnostics settings.
    pub fn with_diagnostics(mut self, diagnostics: DiagnosticsConfig) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            return Err(HistoryError::InvalidConfig(
                "root cannot be empty".to_string(),
            ));
        }
        if let Some(symbol) = &self.symbol {
            if symbol.is_empty() {
                return Err(HistoryError::InvalidConfig(
                    "symbol cannot be empty".to_string(),
                ));
            }
            if symbol.contains(['/', '\\']) || symbol == "." || symbol == ".." {
                return Err(HistoryError::InvalidConfig(format!(
                    "symbol '{}' must be a single directory name",
                    symbol
                )));
            }
        }
        if self.extensions.is_empty() {
            return Err(HistoryError::InvalidConfig(
                "at least one segment extension is required".to_string(),
            ));
        }
        if self.extensions.iter().any(|e| e.is_empty()) {
            return Err(HistoryError::InvalidConfig(
                "segment extensions cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Dataset
// ============================================================================

/// Indexed collection of segment files with point and range queries.
#[derive(Debug)]
pub struct Dataset {
    config: DatasetConfig,
    index: SegmentIndex,
    cache: SegmentCache,
}

impl Dataset {
    /// Discover and index segment files.
    ///
    /// # Errors
    ///
    /// - [`HistoryError::InvalidConfig`] if the configuration is invalid
    /// - [`HistoryError::Io`] if the root directory cannot be read
    pub fn open(config: DatasetConfig) -> Result<Self> {
        config.validate()?;

        let mut diagnostics = DiagnosticLog::with_config(config.diagnostics.clone());
        let files = discover(
            &config.root,
            config.symbol.as_deref(),
            &config.extensions,
            &mut diagnostics,
        )?;
        let index = SegmentIndex::build_with_diagnostics(&files, diagnostics);

        log::info!(
            "Opened dataset {} (symbol: {}, {} files)",
            config.root.display(),
            config.symbol.as_deref().unwrap_or("*"),
            index.len()
        );

        Ok(Self {
            cache: SegmentCache::new(config.cache_capacity),
            config,
            index,
        })
    }

    /// Configuration the dataset was opened with.
    #[inline]
    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    /// Underlying file index.
    #[inline]
    pub fn index(&self) -> &SegmentIndex {
        &self.index
    }

    /// Load (or fetch from cache) the segment behind an index entry.
    pub fn segment(&self, entry: &IndexEntry) -> Result<Arc<SegmentLog>> {
        log::debug!("Resolving segment {}", entry.path.display());
        self.cache.get_or_load(&entry.path, |path| load_segment(path))
    }

    /// Book at `time`, trimmed to `depth` levels per side.
    ///
    /// Returns `Ok(None)` if no file covers `time`, or if `time` precedes
    /// the covering file's base snapshot.
    pub fn at_time(&self, time: i64, depth: Option<usize>) -> Result<Option<BookSnapshot>> {
        let Some(entry) = self.index.file_for_time(time) else {
            log::debug!("No segment covers {}", time);
            return Ok(None);
        };

        let segment = self.segment(entry)?;
        Ok(segment
            .reconstruct_at_time(time)
            .map(|book| book.snapshot(depth)))
    }

    /// Every book with `t0 <= time <= t1`, sampled every `freq` offsets.
    ///
    /// Sampling is per file: offset `k` of a file is kept iff `k % freq == 0`
    /// and its time lies in range. Results from all overlapping files are
    /// merged and stably sorted by time.
    ///
    /// # Errors
    ///
    /// - [`HistoryError::InvalidArgument`] if `freq` is 0
    /// - any load error from an overlapping file
    pub fn in_range(
        &self,
        t0: i64,
        t1: i64,
        freq: usize,
        depth: Option<usize>,
    ) -> Result<Vec<BookSnapshot>> {
        if freq == 0 {
            return Err(HistoryError::InvalidArgument(
                "freq must be at least 1".to_string(),
            ));
        }
        if t0 > t1 {
            return Ok(Vec::new());
        }

        let entries = self.index.files_overlapping(t0, t1);
        log::debug!(
            "Range [{}, {}] overlaps {} segment files",
            t0,
            t1,
            entries.len()
        );

        let mut books = Vec::new();
        for entry in entries {
            let segment = self.segment(entry)?;
            books.extend(
                segment
                    .replay()
                    .filter(|(offset, book)| {
                        offset % freq == 0 && t0 <= book.time() && book.time() <= t1
                    })
                    .map(|(_, book)| book.snapshot(depth)),
            );
        }

        // stable: equal times keep file and offset order
        books.sort_by_key(|b| b.time);
        Ok(books)
    }

    /// `(earliest start, latest end)` across all indexed files.
    pub fn available_range(&self) -> Option<(i64, i64)> {
        self.index.available_range()
    }

    /// Describe every indexed file.
    pub fn list_files(&self) -> Vec<FileInfo> {
        self.index.list_files()
    }

    /// Skip records from discovery and indexing.
    pub fn diagnostics(&self) -> &DiagnosticLog {
        self.index.diagnostics()
    }

    /// Segment cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

/// Open a dataset with default settings.
pub fn load_dataset<P: AsRef<Path>>(directory: P, symbol: Option<&str>) -> Result<Dataset> {
    let mut config = DatasetConfig::new(directory);
    if let Some(symbol) = symbol {
        config = config.with_symbol(symbol);
    }
    Dataset::open(config)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::BookState;
    use crate::segment::Segment;
    use crate::types::{Diff, Level};
    use std::fs;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn unique_temp_dir(test_name: &str) -> PathBuf {
        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "dataset_test_{}_{}_{}",
            std::process::id(),
            test_name,
            counter
        ))
    }

    fn cleanup(dir: &Path) {
        let _ = fs::remove_dir_all(dir);
    }

    fn quiet(root: &Path) -> DatasetConfig {
        DatasetConfig::new(root)
            .with_symbol("btcusdt")
            .with_diagnostics(DiagnosticsConfig::default().with_logging(false))
    }

    /// Write a segment whose book gains one bid level per diff.
    fn write_segment(dir: &Path, start: i64, times: &[i64], end: i64) {
        let diffs = times
            .iter()
            .enumerate()
            .map(|(i, &t)| Diff::new(t).with_bid(100.0 - i as f64, 1.0))
            .collect();
        let mut snapshot = BookState::new(start);
        snapshot.set_level(crate::types::Side::Ask, 200.0, 1.0);
        Segment::new("btcusdt", snapshot, diffs)
            .save(dir.join(format!("{}-{}.json", start, end)))
            .unwrap();
    }

    fn sample_dataset(name: &str) -> PathBuf {
        let root = unique_temp_dir(name);
        let dir = root.join("btcusdt");
        fs::create_dir_all(&dir).unwrap();
        write_segment(&dir, 1000, &[1010, 1020, 1030, 1040], 1999);
        write_segment(&dir, 2000, &[2010, 2020], 2999);
        root
    }

    #[test]
    fn test_config_defaults() {
        let config = DatasetConfig::new("data");
        assert_eq!(config.cache_capacity, 0);
        assert!(config.symbol.is_none());
        assert!(config.extensions.contains(&".json".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(DatasetConfig::new("").validate().is_err());
        assert!(DatasetConfig::new("d").with_symbol("").validate().is_err());
        assert!(DatasetConfig::new("d").with_symbol("a/b").validate().is_err());
        assert!(DatasetConfig::new("d").with_symbol(".").validate().is_err());
        assert!(DatasetConfig::new("d").with_symbol("..").validate().is_err());
        assert!(DatasetConfig::new("d")
            .with_extensions(Vec::<String>::new())
            .validate()
            .is_err());
        assert!(matches!(
            DatasetConfig::new("d").with_extensions([""]).validate(),
            Err(HistoryError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_at_time() {
        let root = sample_dataset("at_time");
        let dataset = Dataset::open(quiet(&root)).unwrap();

        assert_eq!(dataset.index().len(), 2);
        assert!(dataset.at_time(999, None).unwrap().is_none());

        let book = dataset.at_time(1025, None).unwrap().unwrap();
        assert_eq!(book.time, 1020);
        assert_eq!(book.bids.len(), 2);

        let book = dataset.at_time(2010, Some(1)).unwrap().unwrap();
        assert_eq!(book.time, 2010);
        assert_eq!(book.bids, vec![Level::new(100.0, 1.0)]);
        assert_eq!(book.asks, vec![Level::new(200.0, 1.0)]);

        assert!(dataset.at_time(3000, None).unwrap().is_none());

        cleanup(&root);
    }

    #[test]
    fn test_in_range_across_files() {
        let root = sample_dataset("in_range");
        let dataset = Dataset::open(quiet(&root)).unwrap();

        let books = dataset.in_range(1020, 2010, 1, None).unwrap();
        let times: Vec<i64> = books.iter().map(|b| b.time).collect();
        assert_eq!(times, vec![1020, 1030, 1040, 2000, 2010]);

        cleanup(&root);
    }

    #[test]
    fn test_in_range_sampling_is_per_file() {
        let root = sample_dataset("sampling");
        let dataset = Dataset::open(quiet(&root)).unwrap();

        // offsets 0, 2, 4 of the first file and 0, 2 of the second
        let books = dataset.in_range(0, 5000, 2, None).unwrap();
        let times: Vec<i64> = books.iter().map(|b| b.time).collect();
        assert_eq!(times, vec![1000, 1020, 1040, 2000, 2020]);

        cleanup(&root);
    }

    #[test]
    fn test_in_range_edge_cases() {
        let root = sample_dataset("range_edges");
        let dataset = Dataset::open(quiet(&root)).unwrap();

        assert!(matches!(
            dataset.in_range(0, 5000, 0, None),
            Err(HistoryError::InvalidArgument(_))
        ));
        assert!(dataset.in_range(2000, 1000, 1, None).unwrap().is_empty());
        assert!(dataset.in_range(5000, 6000, 1, None).unwrap().is_empty());

        let books = dataset.in_range(1000, 1000, 1, Some(0)).unwrap();
        assert_eq!(books.len(), 1);
        assert!(books[0].bids.is_empty() && books[0].asks.is_empty());

        cleanup(&root);
    }

    #[test]
    fn test_available_range_and_list_files() {
        let root = sample_dataset("list_files");
        let dataset = Dataset::open(quiet(&root)).unwrap();

        assert_eq!(dataset.available_range(), Some((1000, 2999)));

        let files = dataset.list_files();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].start_ms, 1000);
        assert_eq!(files[1].end_ms, 2999);
        assert!(files[0].file.ends_with("1000-1999.json"));

        cleanup(&root);
    }

    #[test]
    fn test_cache_serves_repeat_queries() {
        let root = sample_dataset("cache");
        let dataset = Dataset::open(quiet(&root).with_cache_capacity(4)).unwrap();

        dataset.at_time(1010, None).unwrap();
        dataset.at_time(1020, None).unwrap();
        dataset.in_range(1000, 1999, 1, None).unwrap();

        let stats = dataset.cache_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);

        cleanup(&root);
    }

    #[test]
    fn test_corrupt_segment_surfaces_error() {
        let root = sample_dataset("corrupt");
        fs::write(root.join("btcusdt/3000-3999.json"), "not json").unwrap();
        let dataset = Dataset::open(quiet(&root)).unwrap();

        assert!(matches!(
            dataset.at_time(3500, None),
            Err(HistoryError::Decode(_))
        ));
        // files that don't overlap the range are never opened
        assert_eq!(dataset.in_range(1000, 1999, 1, None).unwrap().len(), 5);

        cleanup(&root);
    }

    #[test]
    fn test_load_dataset_missing_symbol() {
        let root = sample_dataset("missing_symbol");
        let dataset = load_dataset(&root, Some("ethusdt")).unwrap();

        assert!(dataset.index().is_empty());
        assert_eq!(dataset.available_range(), None);
        assert_eq!(dataset.diagnostics().len(), 1);

        cleanup(&root);
    }
}
