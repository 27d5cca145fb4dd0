//! Segment loading and offset/time-indexed replay.
//!
//! A segment is one closed, time-bounded log file: a base snapshot followed
//! by an ordered list of diffs. [`SegmentLog`] wraps a decoded [`Segment`]
//! together with its derived timestamp sequence and reconstructs the book at
//! any offset or time by replaying diffs onto a copy of the snapshot.
//!
//! # Wire Format
//!
//! ```text
//! {
//!   "Symbol": "btcusdt",
//!   "Start":   { "Time": 1000, "Bids": {"100.0": "1.0"}, "Asks": {"101.0": "1.0"} },
//!   "History": [ { "Time": 1005, "Bids": {"100.0": "0"}, "Asks": {"101.5": "2.0"} } ]
//! }
//! ```
//!
//! Prices (keys) and volumes (values) are decimal strings; plain JSON
//! numbers are accepted for volumes as well. A volume of `"0"` in a diff
//! deletes the level.
//!
//! # Replay Cost
//!
//! Every reconstruction replays from the base snapshot (O(diffs)). Nothing
//! is carried between calls, so a `SegmentLog` is immutable once built and
//! can be shared freely.
//!
//! # Example
//!
//! ```ignore
//! use lob_history::load_segment;
//!
//! let log = load_segment("data/json/btcusdt/1707318000000-1707318300000.json")?;
//! let book = log.reconstruct_at_offset(0)?;
//! println!("spread at start: {}", book.spread());
//!
//! if let Some(book) = log.reconstruct_at_time(1_707_318_120_000) {
//!     println!("top bid: {:?}", book.sorted_bids(Some(1)));
//! }
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::book::BookState;
use crate::error::{HistoryError, Result};
use crate::types::{Diff, PriceLevels};

/// I/O buffer size for segment reads.
///
/// Segment files are read whole before decoding; a large buffer keeps the
/// syscall count low for multi-megabyte windows.
pub const IO_BUFFER_SIZE: usize = 1024 * 1024; // 1 MB

/// File suffix marking a zstd-compressed segment.
pub const COMPRESSED_SUFFIX: &str = ".zst";

// ============================================================================
// Wire Types
// ============================================================================

/// Volume as written on disk: a decimal string or a bare number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawVolume {
    Text(String),
    Number(f64),
}

impl RawVolume {
    fn as_text(&self) -> String {
        match self {
            RawVolume::Text(s) => s.clone(),
            RawVolume::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawBook {
    time: i64,
    #[serde(default)]
    bids: IndexMap<String, RawVolume>,
    #[serde(default)]
    asks: IndexMap<String, RawVolume>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawSegment {
    symbol: String,
    start: RawBook,
    #[serde(default)]
    history: Vec<RawBook>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireBook {
    time: i64,
    bids: BTreeMap<String, String>,
    asks: BTreeMap<String, String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireSegment<'a> {
    symbol: &'a str,
    start: WireBook,
    history: Vec<WireBook>,
}

/// Normalize wire keys to prices in document order, so a later spelling of
/// the same price (`"100.0"` after `"100.00"`) overrides the earlier one.
fn parse_levels(raw: &IndexMap<String, RawVolume>) -> Result<PriceLevels> {
    let mut levels = PriceLevels::new();
    for (price_str, raw_volume) in raw {
        let invalid = |reason: &'static str| HistoryError::InvalidLevel {
            price: price_str.clone(),
            volume: raw_volume.as_text(),
            reason,
        };

        let price: f64 = price_str
            .trim()
            .parse()
            .map_err(|_| invalid("price is not a number"))?;
        let volume: f64 = match raw_volume {
            RawVolume::Text(s) => s.trim().parse().map_err(|_| invalid("volume is not a number"))?,
            RawVolume::Number(n) => *n,
        };

        if !price.is_finite() {
            return Err(invalid("price is not finite"));
        }
        if !volume.is_finite() {
            return Err(invalid("volume is not finite"));
        }
        if volume < 0.0 {
            return Err(invalid("volume is negative"));
        }

        levels.insert(OrderedFloat(price), volume);
    }
    Ok(levels)
}

fn format_levels(levels: &PriceLevels) -> BTreeMap<String, String> {
    levels
        .iter()
        .map(|(price, volume)| (price.into_inner().to_string(), volume.to_string()))
        .collect()
}

// ============================================================================
// Segment
// ============================================================================

/// Decoded segment: base snapshot plus ordered diffs.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Trading symbol (e.g. "btcusdt")
    pub symbol: String,

    /// Full book at the start of the window
    pub start_snapshot: BookState,

    /// Diffs in non-decreasing time order
    pub diffs: Vec<Diff>,
}

impl Segment {
    /// Create a segment from its parts.
    pub fn new(symbol: impl Into<String>, start_snapshot: BookState, diffs: Vec<Diff>) -> Self {
        Self {
            symbol: symbol.into(),
            start_snapshot,
            diffs,
        }
    }

    /// Decode a segment from JSON bytes.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let raw: RawSegment = serde_json::from_slice(bytes)?;

        let start_snapshot = BookState::from_levels(
            raw.start.time,
            parse_levels(&raw.start.bids)?,
            parse_levels(&raw.start.asks)?,
        );

        let diffs = raw
            .history
            .iter()
            .map(|entry| -> Result<Diff> {
                Ok(Diff {
                    time: entry.time,
                    bid_changes: parse_levels(&entry.bids)?,
                    ask_changes: parse_levels(&entry.asks)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            symbol: raw.symbol,
            start_snapshot,
            diffs,
        })
    }

    /// Decode a segment from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::from_json_slice(json.as_bytes())
    }

    /// Read and decode a segment file.
    ///
    /// Files ending in `.zst` are zstd-decompressed first (requires the
    /// `compression` feature).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = read_segment_bytes(path)?;
        Self::from_json_slice(&bytes).map_err(|e| e.in_file(path))
    }

    /// Encode the segment in the on-disk JSON format.
    pub fn write_json<W: Write>(&self, writer: W) -> Result<()> {
        let wire = WireSegment {
            symbol: &self.symbol,
            start: WireBook {
                time: self.start_snapshot.time(),
                bids: format_levels(self.start_snapshot.bids()),
                asks: format_levels(self.start_snapshot.asks()),
            },
            history: self
                .diffs
                .iter()
                .map(|d| WireBook {
                    time: d.time,
                    bids: format_levels(&d.bid_changes),
                    asks: format_levels(&d.ask_changes),
                })
                .collect(),
        };
        serde_json::to_writer(writer, &wire)?;
        Ok(())
    }

    /// Write the segment to `path`, zstd-compressing when the path ends in
    /// `.zst` (requires the `compression` feature).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| HistoryError::io(path, e))?;
        let mut writer = BufWriter::with_capacity(IO_BUFFER_SIZE, file);

        if is_compressed(path) {
            #[cfg(feature = "compression")]
            {
                let mut encoder = zstd::stream::write::Encoder::new(&mut writer, 0)
                    .map_err(|e| HistoryError::io(path, e))?;
                self.write_json(&mut encoder)?;
                encoder.finish().map_err(|e| HistoryError::io(path, e))?;
            }
            #[cfg(not(feature = "compression"))]
            return Err(compression_disabled(path));
        } else {
            self.write_json(&mut writer)?;
        }

        writer.flush().map_err(|e| HistoryError::io(path, e))
    }

    /// Segment timestamps: snapshot time followed by every diff time.
    pub fn timestamps(&self) -> Vec<i64> {
        std::iter::once(self.start_snapshot.time())
            .chain(self.diffs.iter().map(|d| d.time))
            .collect()
    }
}

/// Returns true if the path names a compressed segment.
pub(crate) fn is_compressed(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(COMPRESSED_SUFFIX))
}

#[cfg(not(feature = "compression"))]
fn compression_disabled(path: &Path) -> HistoryError {
    HistoryError::Decode(format!(
        "{}: compressed segments require the `compression` feature",
        path.display()
    ))
}

fn read_segment_bytes(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path).map_err(|e| HistoryError::io(path, e))?;
    let mut bytes = Vec::new();

    if is_compressed(path) {
        #[cfg(feature = "compression")]
        {
            let reader = BufReader::with_capacity(IO_BUFFER_SIZE, file);
            let mut decoder = zstd::stream::read::Decoder::with_buffer(reader)
                .map_err(|e| HistoryError::io(path, e))?;
            decoder
                .read_to_end(&mut bytes)
                .map_err(|e| HistoryError::io(path, e))?;
        }
        #[cfg(not(feature = "compression"))]
        return Err(compression_disabled(path));
    } else {
        let mut reader = BufReader::with_capacity(IO_BUFFER_SIZE, file);
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| HistoryError::io(path, e))?;
    }

    Ok(bytes)
}

// ============================================================================
// Segment Log
// ============================================================================

/// Summary counters for one segment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentStats {
    /// Number of diffs after the base snapshot
    pub diff_count: usize,

    /// Total level changes across all diffs
    pub level_changes: usize,

    /// Level changes that delete a level
    pub deletions: usize,

    /// Distinct values in the timestamp sequence
    pub distinct_timestamps: usize,

    /// Bid levels in the base snapshot
    pub start_bid_levels: usize,

    /// Ask levels in the base snapshot
    pub start_ask_levels: usize,
}

/// Replayable view over one segment.
///
/// Holds the derived `timestamps` sequence (`[start] ++ diff times`) for
/// binary-search lookup by time.
#[derive(Debug, Clone)]
pub struct SegmentLog {
    /// Source file, when loaded from disk
    path: Option<PathBuf>,

    /// Decoded segment
    segment: Segment,

    /// Snapshot time followed by each diff time (non-decreasing)
    timestamps: Vec<i64>,

    /// Precomputed counters
    stats: SegmentStats,
}

impl SegmentLog {
    /// Build a log over a decoded segment.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::UnorderedTimestamps`] if the timestamp
    /// sequence decreases anywhere; time lookup depends on it being sorted.
    pub fn new(segment: Segment) -> Result<Self> {
        let timestamps = segment.timestamps();

        if let Some(offset) = timestamps.windows(2).position(|w| w[1] < w[0]) {
            return Err(HistoryError::UnorderedTimestamps {
                offset: offset + 1,
                previous: timestamps[offset],
                time: timestamps[offset + 1],
            });
        }

        let mut distinct_timestamps = timestamps.len();
        distinct_timestamps -= timestamps.windows(2).filter(|w| w[0] == w[1]).count();

        let stats = SegmentStats {
            diff_count: segment.diffs.len(),
            level_changes: segment.diffs.iter().map(Diff::change_count).sum(),
            deletions: segment.diffs.iter().map(Diff::deletion_count).sum(),
            distinct_timestamps,
            start_bid_levels: segment.start_snapshot.bid_levels(),
            start_ask_levels: segment.start_snapshot.ask_levels(),
        };

        Ok(Self {
            path: None,
            segment,
            timestamps,
            stats,
        })
    }

    /// Load and index a segment file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let segment = Segment::load(path)?;
        let mut segment_log = Self::new(segment).map_err(|e| e.in_file(path))?;
        segment_log.path = Some(path.to_path_buf());

        let (first, last) = segment_log.time_range();
        log::debug!(
            "Loaded segment {} ({} diffs, {} -> {})",
            path.display(),
            segment_log.stats.diff_count,
            first,
            last
        );

        Ok(segment_log)
    }

    /// Symbol recorded in the segment.
    #[inline]
    pub fn symbol(&self) -> &str {
        &self.segment.symbol
    }

    /// File the segment was loaded from, if any.
    #[inline]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Underlying segment.
    #[inline]
    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    /// Snapshot time followed by every diff time.
    #[inline]
    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    /// Number of diffs; valid offsets are `0..=diff_count()`.
    #[inline]
    pub fn diff_count(&self) -> usize {
        self.segment.diffs.len()
    }

    /// First and last timestamp in the segment.
    pub fn time_range(&self) -> (i64, i64) {
        // timestamps always holds at least the snapshot time
        let first = self.timestamps[0];
        let last = self.timestamps[self.timestamps.len() - 1];
        (first, last)
    }

    /// Precomputed counters.
    #[inline]
    pub fn stats(&self) -> &SegmentStats {
        &self.stats
    }

    /// Greatest offset whose timestamp is `<= time`.
    ///
    /// With tied timestamps this is the last of the ties. `None` if `time`
    /// precedes the snapshot.
    pub fn offset_at_time(&self, time: i64) -> Option<usize> {
        self.timestamps.partition_point(|&ts| ts <= time).checked_sub(1)
    }

    /// Book after applying the first `offset` diffs.
    ///
    /// Offset 0 is the unmodified base snapshot.
    ///
    /// # Errors
    ///
    /// [`HistoryError::OffsetOutOfRange`] if `offset > diff_count()`.
    pub fn reconstruct_at_offset(&self, offset: usize) -> Result<BookState> {
        let max = self.diff_count();
        if offset > max {
            return Err(HistoryError::OffsetOutOfRange { offset, max });
        }
        Ok(self.replay_to(offset))
    }

    /// Last known book at or before `time`.
    ///
    /// Returns `None` if `time` is earlier than the base snapshot.
    pub fn reconstruct_at_time(&self, time: i64) -> Option<BookState> {
        self.offset_at_time(time).map(|offset| self.replay_to(offset))
    }

    /// Every book in the segment, one per offset.
    ///
    /// Element 0 is the base snapshot and element `k` the book after diff
    /// `k - 1`. Each element is an independent value.
    pub fn reconstruct_all(&self) -> Vec<BookState> {
        self.replay().map(|(_, book)| book).collect()
    }

    /// Iterate `(offset, book)` pairs from the base snapshot forward.
    ///
    /// Each yielded book is an owned copy; the iterator keeps replaying on
    /// its own internal state.
    pub fn replay(&self) -> Replay<'_> {
        Replay {
            diffs: &self.segment.diffs,
            book: self.segment.start_snapshot.clone(),
            next: 0,
        }
    }

    fn replay_to(&self, offset: usize) -> BookState {
        let mut book = self.segment.start_snapshot.clone();
        for diff in &self.segment.diffs[..offset] {
            book.apply(diff);
        }
        book
    }
}

/// Forward replay over a segment; see [`SegmentLog::replay`].
#[derive(Debug, Clone)]
pub struct Replay<'a> {
    diffs: &'a [Diff],
    book: BookState,
    next: usize,
}

impl Iterator for Replay<'_> {
    type Item = (usize, BookState);

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.next;
        if offset > self.diffs.len() {
            return None;
        }
        if offset > 0 {
            self.book.apply(&self.diffs[offset - 1]);
        }
        self.next += 1;
        Some((offset, self.book.clone()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.diffs.len() + 1).saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Replay<'_> {}

/// Load a single segment file.
pub fn load_segment<P: AsRef<Path>>(path: P) -> Result<SegmentLog> {
    SegmentLog::load(path)
}

// ============================================================================
// Tests
// ============================================================================
