//! CLI tool for inspecting order book history datasets.
//!
//! Prints JSON to stdout so the output can be piped into `jq` or loaded
//! from a notebook.
//!
//! # Usage
//!
//! ```bash
//! # Indexed files and the covered range
//! cargo run --release --bin lob_history -- files data/json --symbol btcusdt
//!
//! # Book at one instant, top 10 levels
//! cargo run --release --bin lob_history -- at data/json \
//!     --symbol btcusdt --time 2024-02-07T15:02:00 --depth 10
//!
//! # Every 10th update in a window
//! cargo run --release --bin lob_history -- range data/json \
//!     --symbol btcusdt --from 1707318000000 --to 1707318600000 --freq 10
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;

use lob_history::timefmt::{format_millis, parse_timestamp};
use lob_history::{list_symbols, Dataset, DatasetConfig, HistoryError, Result};

/// Subcommand to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Symbols,
    Files,
    At,
    Range,
}

/// Command-line arguments
struct Args {
    command: Command,
    /// Dataset root directory
    directory: PathBuf,
    /// Restrict to one symbol directory
    symbol: Option<String>,
    /// Query time for `at`
    time: Option<i64>,
    /// Range start for `range`
    from: Option<i64>,
    /// Range end for `range`
    to: Option<i64>,
    /// Keep every Nth update per file
    freq: usize,
    /// Levels per side (None = all)
    depth: Option<usize>,
    /// Segment cache capacity
    cache: usize,
    /// Pretty-print JSON
    pretty: bool,
}

fn parse_args() -> std::result::Result<Args, String> {
    let args: Vec<String> = env::args().collect();

    let mut command: Option<Command> = None;
    let mut directory: Option<PathBuf> = None;
    let mut symbol: Option<String> = None;
    let mut time: Option<i64> = None;
    let mut from: Option<i64> = None;
    let mut to: Option<i64> = None;
    let mut freq = 1usize;
    let mut depth: Option<usize> = None;
    let mut cache = 0usize;
    let mut pretty = false;

    let mut i = 1;
    while i < args.len() {
        let arg = args[i].as_str();
        match arg {
            "--symbol" | "-s" | "--time" | "-t" | "--from" | "--to" | "--freq" | "-f"
            | "--depth" | "-d" | "--cache" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| format!("{} requires a value", arg))?;
                match arg {
                    "--symbol" | "-s" => symbol = Some(value.clone()),
                    "--time" | "-t" => time = Some(parse_time(value)?),
                    "--from" => from = Some(parse_time(value)?),
                    "--to" => to = Some(parse_time(value)?),
                    "--freq" | "-f" => freq = parse_number(arg, value)?,
                    "--depth" | "-d" => depth = Some(parse_number(arg, value)?),
                    _ => cache = parse_number(arg, value)?,
                }
            }
            "--pretty" | "-p" => {
                pretty = true;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            positional => {
                if command.is_none() {
                    command = Some(match positional {
                        "symbols" => Command::Symbols,
                        "files" => Command::Files,
                        "at" => Command::At,
                        "range" => Command::Range,
                        other => return Err(format!("Unknown command: {}", other)),
                    });
                } else if directory.is_none() {
                    directory = Some(PathBuf::from(positional));
                } else {
                    return Err(format!("Unknown argument: {}", positional));
                }
            }
        }
        i += 1;
    }

    let command = command.ok_or("A command is required")?;
    let directory = directory.ok_or("Dataset directory is required")?;

    match command {
        Command::At if time.is_none() => return Err("at requires --time".to_string()),
        Command::Range if from.is_none() || to.is_none() => {
            return Err("range requires --from and --to".to_string())
        }
        _ => {}
    }

    Ok(Args {
        command,
        directory,
        symbol,
        time,
        from,
        to,
        freq,
        depth,
        cache,
        pretty,
    })
}

fn parse_time(value: &str) -> std::result::Result<i64, String> {
    parse_timestamp(value).map_err(|e| e.to_string())
}

fn parse_number(flag: &str, value: &str) -> std::result::Result<usize, String> {
    value
        .parse()
        .map_err(|_| format!("{} expects a non-negative integer, got '{}'", flag, value))
}

fn print_help() {
    eprintln!(
        r#"
Order Book History Inspector

Reconstructs historical order books from snapshot + diff segment files
named {{start_ms}}-{{end_ms}}.json and prints the result as JSON.

USAGE:
    lob_history symbols <DIR>
    lob_history files <DIR> [--symbol <SYM>]
    lob_history at <DIR> --time <TIME> [--symbol <SYM>] [--depth <N>]
    lob_history range <DIR> --from <TIME> --to <TIME> [--freq <N>] [--depth <N>]

OPTIONS:
    -s, --symbol <SYM>    Only read <DIR>/<SYM>/
    -t, --time <TIME>     Query instant
        --from <TIME>     Range start (inclusive)
        --to <TIME>       Range end (inclusive)
    -f, --freq <N>        Keep every Nth update per file [default: 1]
    -d, --depth <N>       Price levels per side [default: all]
        --cache <N>       Keep N decoded segments in memory [default: 0]
    -p, --pretty          Pretty-print JSON
    -h, --help            Print this help message

TIME FORMATS:
    1707318000000            Milliseconds since epoch
    2024-02-07               Midnight UTC
    2024-02-07T15:00:00.250  UTC datetime
    2024-02-07T16:00:00+01:00

NOTES:
    - Log verbosity is controlled by RUST_LOG (default: info)
    - Skipped files are reported as warnings on stderr
"#
    );
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", out);
    Ok(())
}

#[derive(Serialize)]
struct FilesReport {
    files: Vec<lob_history::FileInfo>,
    available_range: Option<RangeReport>,
    skipped: u64,
}

#[derive(Serialize)]
struct RangeReport {
    start: String,
    end: String,
    start_ms: i64,
    end_ms: i64,
}

fn open_dataset(args: &Args) -> Result<Dataset> {
    let mut config = DatasetConfig::new(&args.directory).with_cache_capacity(args.cache);
    if let Some(symbol) = &args.symbol {
        config = config.with_symbol(symbol.clone());
    }
    Dataset::open(config)
}

fn run(args: &Args) -> Result<()> {
    if args.command == Command::Symbols {
        return print_json(&list_symbols(&args.directory)?, args.pretty);
    }

    let dataset = open_dataset(args)?;

    match args.command {
        Command::Files => {
            let report = FilesReport {
                files: dataset.list_files(),
                available_range: dataset.available_range().map(|(start, end)| RangeReport {
                    start: format_millis(start),
                    end: format_millis(end),
                    start_ms: start,
                    end_ms: end,
                }),
                skipped: dataset.diagnostics().total_count(),
            };
            print_json(&report, args.pretty)
        }
        Command::At => {
            let time = args
                .time
                .ok_or_else(|| HistoryError::InvalidArgument("missing --time".to_string()))?;
            let book = dataset.at_time(time, args.depth)?;
            if book.is_none() {
                log::warn!("No book recorded at or before {}", format_millis(time));
            }
            print_json(&book, args.pretty)
        }
        Command::Range => {
            let (from, to) = match (args.from, args.to) {
                (Some(from), Some(to)) => (from, to),
                _ => {
                    return Err(HistoryError::InvalidArgument(
                        "missing --from/--to".to_string(),
                    ))
                }
            };

            let start = Instant::now();
            let books = dataset.in_range(from, to, args.freq, args.depth)?;
            log::info!(
                "Reconstructed {} books in {:.2}s",
                books.len(),
                start.elapsed().as_secs_f64()
            );

            let stats = dataset.cache_stats();
            if args.cache > 0 {
                log::info!(
                    "Segment cache: {} hits, {} misses ({:.0}% hit rate)",
                    stats.hits,
                    stats.misses,
                    stats.hit_rate() * 100.0
                );
            }

            print_json(&books, args.pretty)
        }
        Command::Symbols => Ok(()),
    }
}

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
