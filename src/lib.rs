//! # LOB-History
//!
//! Historical order book reconstruction from snapshot + diff segment files.
//!
//! A collector writes the order book of one symbol as a series of closed,
//! time-bounded segment files. Each file holds a full base snapshot and an
//! ordered list of price-level diffs. This library answers:
//!
//! - what did the book look like at a given offset or time inside one file?
//! - what did it look like at a given time across a whole directory?
//! - every book in a time range, optionally sampled every N updates?
//!
//! ## Features
//!
//! - **Snapshot + Diff Replay**: volume `0` deletes a level, anything else replaces it
//! - **Time Lookup**: binary search over segment timestamps, last tied update wins
//! - **Filename Index**: `{start_ms}-{end_ms}.json` windows, malformed names skipped
//! - **Range Queries**: per-file sampling, globally time-ordered output
//! - **Structured Diagnostics**: skipped files recorded instead of printed
//! - **Segment Cache**: optional LRU of decoded segments
//! - **Compressed Segments**: `.json.zst` files via zstd
//!
//! ## Quick Start
//!
//! ### Single Segment
//!
//! ```rust
//! use lob_history::{Segment, SegmentLog};
//!
//! let json = r#"{
//!     "Symbol": "btcusdt",
//!     "Start": { "Time": 1000, "Bids": {"100.0": "1.0"}, "Asks": {"101.0": "1.0"} },
//!     "History": [ { "Time": 1005, "Bids": {"100.0": "0"}, "Asks": {"101.5": "2.0"} } ]
//! }"#;
//!
//! let log = SegmentLog::new(Segment::from_json_str(json).unwrap()).unwrap();
//!
//! let book = log.reconstruct_at_offset(1).unwrap();
//! assert!(book.bids().is_empty());
//! assert_eq!(book.sorted_asks(None).len(), 2);
//! assert_eq!(book.spread(), 0.0);
//!
//! assert!(log.reconstruct_at_time(999).is_none());
//! ```
//!
//! ### Dataset Directory
//!
//! ```ignore
//! use lob_history::load_dataset;
//!
//! let dataset = load_dataset("data/json", Some("btcusdt"))?;
//!
//! if let Some(book) = dataset.at_time(1_707_318_120_000, Some(10))? {
//!     println!("{} mid={:.2}", book.timestamp(), book.mid_price());
//! }
//!
//! // Every 10th update per file, top 5 levels
//! for book in dataset.in_range(1_707_318_000_000, 1_707_318_600_000, 10, Some(5))? {
//!     println!("{} spread={:.2}", book.time, book.spread());
//! }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Core types: `Level`, `Diff`, `BookSnapshot`, `Side`, `BookConsistency` |
//! | [`book`] | In-memory book: `BookState` |
//! | [`segment`] | Segment decoding and replay: `Segment`, `SegmentLog`, `Replay` |
//! | [`index`] | Filename index: `SegmentIndex`, `IndexEntry`, `discover` |
//! | [`dataset`] | Point and range queries: `Dataset`, `DatasetConfig` |
//! | [`cache`] | Decoded segment LRU: `SegmentCache` |
//! | [`diagnostics`] | Skip records: `DiagnosticLog`, `Diagnostic`, `DiagnosticCategory` |
//! | [`timefmt`] | Millisecond timestamp formatting and parsing |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `compression` | ✅ | Read and write zstd-compressed `.json.zst` segments |

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod book;
pub mod cache;
pub mod dataset;
pub mod diagnostics;
pub mod error;
pub mod index;
pub mod segment;
pub mod timefmt;
pub mod types;

// Re-exports - Core types
pub use error::{HistoryError, Result};
pub use types::{BookConsistency, BookSnapshot, Diff, Level, Price, PriceLevels, Side};

// Re-exports - Book and replay
pub use book::BookState;
pub use segment::{load_segment, Replay, Segment, SegmentLog, SegmentStats};

// Re-exports - Index and queries
pub use dataset::{load_dataset, Dataset, DatasetConfig};
pub use index::{
    discover, list_symbols, parse_segment_name, FileInfo, IndexEntry, NameError, SegmentIndex,
};

// Re-exports - Cache
pub use cache::{CacheStats, SegmentCache};

// Re-exports - Diagnostics
pub use diagnostics::{
    Diagnostic, DiagnosticCategory, DiagnosticLog, DiagnosticSummary, DiagnosticsConfig,
};
