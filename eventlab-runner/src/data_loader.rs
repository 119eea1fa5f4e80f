//! Bar loading for the runner.
//!
//! Two sources:
//! 1. A directory of per-symbol CSV files (`{dir}/{SYMBOL}.csv`)
//! 2. Deterministic synthetic bars seeded from the symbol names
//!
//! Synthetic data is for development and tests. The same symbols always
//! produce the same bars.

use anyhow::Context;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use eventlab_core::data::MarketData;
use eventlab_core::domain::Bar;

use crate::config::{StrategyKind, SweepConfig};

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("bad row in {path}: {source}")]
    Row {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("bad timestamp '{value}' in {path}")]
    Timestamp { path: PathBuf, value: String },
    #[error("no usable bars for '{symbol}'")]
    Empty { symbol: String },
}

/// Where a sweep's bars come from.
#[derive(Debug, Clone)]
pub enum DataSource {
    CsvDir(PathBuf),
    Synthetic { start: NaiveDate, bars: usize },
}

impl DataSource {
    /// Synthetic bars starting 2018-01-01.
    pub fn synthetic(bars: usize) -> Self {
        DataSource::Synthetic {
            start: NaiveDate::from_ymd_opt(2018, 1, 1).unwrap_or_default(),
            bars,
        }
    }
}

impl Default for DataSource {
    fn default() -> Self {
        DataSource::synthetic(1_500)
    }
}

#[derive(Debug, Deserialize)]
struct CsvBar {
    datetime: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    adj_close: f64,
    volume: f64,
}

fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
    FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(value, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Read one symbol's CSV file. Void rows (any NaN price) are dropped.
pub fn load_csv_symbol(path: &Path, symbol: &str) -> Result<Vec<Bar>, LoadError> {
    let mut reader = csv::Reader::from_path(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut bars = Vec::new();
    let mut void = 0usize;
    for record in reader.deserialize::<CsvBar>() {
        let row = record.map_err(|source| LoadError::Row {
            path: path.to_path_buf(),
            source,
        })?;
        let timestamp = parse_datetime(row.datetime.trim()).ok_or_else(|| LoadError::Timestamp {
            path: path.to_path_buf(),
            value: row.datetime.clone(),
        })?;
        let bar = Bar {
            symbol: symbol.to_string(),
            timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            adj_close: row.adj_close,
            volume: if row.volume.is_finite() && row.volume > 0.0 {
                row.volume.round() as u64
            } else {
                0
            },
        };
        if bar.is_void() {
            void += 1;
            continue;
        }
        bars.push(bar);
    }

    if void > 0 {
        warn!(%symbol, void, "dropped void bars");
    }
    if bars.is_empty() {
        return Err(LoadError::Empty {
            symbol: symbol.to_string(),
        });
    }
    Ok(bars)
}

/// Load `{dir}/{SYMBOL}.csv` for every symbol, keeping the given order.
pub fn load_csv_bars(dir: &Path, symbols: &[String]) -> Result<MarketData, LoadError> {
    let mut series = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let path = dir.join(format!("{symbol}.csv"));
        let bars = load_csv_symbol(&path, symbol)?;
        info!(%symbol, bars = bars.len(), path = %path.display(), "loaded bars");
        series.push((symbol.clone(), bars));
    }
    Ok(MarketData::from_series(series))
}

fn seeded_rng(key: &str) -> StdRng {
    let seed: [u8; 32] = *blake3::hash(key.as_bytes()).as_bytes();
    StdRng::from_seed(seed)
}

/// The first `n` weekdays on or after `start`, at midnight.
fn weekdays(start: NaiveDate, n: usize) -> Vec<NaiveDateTime> {
    let mut out = Vec::with_capacity(n);
    let mut current = start;
    while out.len() < n {
        let weekday = current.weekday();
        if weekday != chrono::Weekday::Sat && weekday != chrono::Weekday::Sun {
            if let Some(ts) = current.and_hms_opt(0, 0, 0) {
                out.push(ts);
            }
        }
        current += Duration::days(1);
    }
    out
}

fn bar_from_close(
    symbol: &str,
    timestamp: NaiveDateTime,
    open: f64,
    close: f64,
    rng: &mut StdRng,
) -> Bar {
    let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
    let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
    Bar {
        symbol: symbol.to_string(),
        timestamp,
        open,
        high,
        low,
        close,
        adj_close: close,
        volume: rng.gen_range(500_000..5_000_000u64),
    }
}

/// Random-walk bars for one symbol, one per weekday.
pub fn synthetic_trend(symbol: &str, start: NaiveDate, n: usize) -> Vec<Bar> {
    let mut rng = seeded_rng(symbol);
    let drift: f64 = rng.gen_range(-0.0005..0.001);
    let mut price = 100.0_f64;

    weekdays(start, n)
        .into_iter()
        .map(|ts| {
            let daily_return: f64 = drift + rng.gen_range(-0.02..0.02);
            let open = price;
            let close = price * (1.0 + daily_return);
            price = close;
            bar_from_close(symbol, ts, open, close, &mut rng)
        })
        .collect()
}

/// A cointegrated pair: leg B is a random walk, leg A tracks `1.5 × B`
/// plus a mean-reverting spread.
pub fn synthetic_pair(
    leg_a: &str,
    leg_b: &str,
    start: NaiveDate,
    n: usize,
) -> Vec<(String, Vec<Bar>)> {
    let mut rng = seeded_rng(&format!("{leg_a}/{leg_b}"));
    let timestamps = weekdays(start, n);

    let mut b_price = 50.0_f64;
    let mut spread = 0.0_f64;
    let mut a_prev = 1.5 * b_price;
    let mut b_prev = b_price;
    let mut a_bars = Vec::with_capacity(n);
    let mut b_bars = Vec::with_capacity(n);

    for ts in timestamps {
        b_price *= 1.0 + rng.gen_range(-0.015..0.015);
        // Ornstein-Uhlenbeck step toward zero.
        spread += -0.1 * spread + rng.gen_range(-1.0..1.0);
        let a_price = (1.5 * b_price + spread).max(1.0);

        a_bars.push(bar_from_close(leg_a, ts, a_prev, a_price, &mut rng));
        b_bars.push(bar_from_close(leg_b, ts, b_prev, b_price, &mut rng));
        a_prev = a_price;
        b_prev = b_price;
    }

    vec![(leg_a.to_string(), a_bars), (leg_b.to_string(), b_bars)]
}

/// Synthetic fixture shaped for the strategy kind.
pub fn synthetic_market(
    kind: StrategyKind,
    symbols: &[String],
    start: NaiveDate,
    n: usize,
) -> MarketData {
    match (kind, symbols) {
        (StrategyKind::PairsMeanReversion, [a, b]) => {
            MarketData::from_series(synthetic_pair(a, b, start, n))
        }
        _ => MarketData::from_series(
            symbols
                .iter()
                .map(|s| (s.clone(), synthetic_trend(s, start, n)))
                .collect(),
        ),
    }
}

/// Resolve the bars a sweep needs from `source`.
pub fn load_market_data(config: &SweepConfig, source: &DataSource) -> anyhow::Result<MarketData> {
    let symbols = &config.backtest.symbols;
    match source {
        DataSource::CsvDir(dir) => load_csv_bars(dir, symbols)
            .with_context(|| format!("loading bars from {}", dir.display())),
        DataSource::Synthetic { start, bars } => {
            warn!(?symbols, "using synthetic bars");
            Ok(synthetic_market(config.strategy.kind, symbols, *start, *bars))
        }
    }
}
