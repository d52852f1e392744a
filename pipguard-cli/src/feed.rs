//! CSV bar feed and the ATR it carries into each market snapshot.
//!
//! Expected columns: `time,open,high,low,close[,spread_pips]`, with `time` in
//! RFC 3339 (`2024-03-05T10:00:00Z`).

use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use pipguard_core::domain::MarketSnapshot;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Bar {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub spread_pips: Option<f64>,
}

impl Bar {
    /// OHLC finite and ordered: low <= open, close <= high.
    pub fn is_sane(&self) -> bool {
        let finite = [self.open, self.high, self.low, self.close]
            .iter()
            .all(|v| v.is_finite());
        finite
            && self.low <= self.high
            && (self.low..=self.high).contains(&self.open)
            && (self.low..=self.high).contains(&self.close)
    }

    /// Snapshot quoted at the close: bid = close, ask = close + spread.
    pub fn snapshot(&self, pip_size: f64, default_spread_pips: f64, atr: f64) -> MarketSnapshot {
        let spread = self.spread_pips.unwrap_or(default_spread_pips);
        MarketSnapshot::new(self.time, self.close, self.close + spread * pip_size, pip_size)
            .with_spread_pips(spread)
            .with_bar(self.high, self.low)
            .with_atr(atr)
    }
}

pub fn read_bars_file(path: &Path) -> Result<Vec<Bar>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open bars file {}", path.display()))?;
    read_bars(file).with_context(|| format!("failed to read bars from {}", path.display()))
}

pub fn read_bars<R: Read>(reader: R) -> Result<Vec<Bar>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut bars = Vec::new();
    for (i, row) in rdr.deserialize::<Bar>().enumerate() {
        let bar = row.with_context(|| format!("row {}", i + 1))?;
        if !bar.is_sane() {
            bail!("row {}: OHLC values are not consistent", i + 1);
        }
        if let Some(prev) = bars.last().map(|b: &Bar| b.time) {
            if bar.time <= prev {
                bail!("row {}: time {} is not after {}", i + 1, bar.time, prev);
            }
        }
        bars.push(bar);
    }
    if bars.is_empty() {
        bail!("no bars");
    }
    Ok(bars)
}

/// True Range series.
/// TR[0] = high[0] - low[0] (no previous close).
/// TR[t] = max(high[t]-low[t], |high[t]-close[t-1]|, |low[t]-close[t-1]|).
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(bars.len());
    for (i, bar) in bars.iter().enumerate() {
        let range = bar.high - bar.low;
        let value = match i.checked_sub(1).map(|p| bars[p].close) {
            None => range,
            Some(pc) => range.max((bar.high - pc).abs()).max((bar.low - pc).abs()),
        };
        tr.push(value);
    }
    tr
}

/// Simple average of the last `period` true ranges. NaN until warmed up.
pub fn atr(bars: &[Bar], period: usize) -> Vec<f64> {
    let tr = true_range(bars);
    let mut out = vec![f64::NAN; tr.len()];
    if period == 0 {
        return out;
    }
    let mut sum = 0.0;
    for i in 0..tr.len() {
        sum += tr[i];
        if i >= period {
            sum -= tr[i - period];
        }
        if i + 1 >= period {
            out[i] = sum / period as f64;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
time,open,high,low,close,spread_pips
2024-03-05T10:00:00Z,1.1000,1.1010,1.0995,1.1005,
2024-03-05T10:01:00Z,1.1005,1.1020,1.1000,1.1015,1.5
2024-03-05T10:02:00Z,1.1015,1.1018,1.0990,1.0995,
";

    #[test]
    fn reads_csv_with_optional_spread() {
        let bars = read_bars(CSV.as_bytes()).unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].spread_pips, None);
        assert_eq!(bars[1].spread_pips, Some(1.5));
    }

    #[test]
    fn reads_csv_without_spread_column() {
        let csv = "time,open,high,low,close\n2024-03-05T10:00:00Z,1.0,1.2,0.9,1.1\n";
        let bars = read_bars(csv.as_bytes()).unwrap();
        assert_eq!(bars[0].spread_pips, None);
    }

    #[test]
    fn rejects_inconsistent_bars() {
        let csv = "time,open,high,low,close\n2024-03-05T10:00:00Z,1.0,0.9,1.2,1.1\n";
        assert!(read_bars(csv.as_bytes()).is_err());
    }

    #[test]
    fn rejects_unordered_times() {
        let csv = "time,open,high,low,close\n\
            2024-03-05T10:01:00Z,1.0,1.2,0.9,1.1\n\
            2024-03-05T10:00:00Z,1.0,1.2,0.9,1.1\n";
        assert!(read_bars(csv.as_bytes()).is_err());
    }

    #[test]
    fn true_range_uses_previous_close() {
        let bars = read_bars(CSV.as_bytes()).unwrap();
        let tr = true_range(&bars);
        assert!((tr[0] - 0.0015).abs() < 1e-12);
        assert!((tr[1] - 0.0020).abs() < 1e-12);
        // high - low = 0.0028 beats |1.1018 - 1.1015| and |1.0990 - 1.1015|
        assert!((tr[2] - 0.0028).abs() < 1e-12);
    }

    #[test]
    fn atr_warms_up_then_averages() {
        let bars = read_bars(CSV.as_bytes()).unwrap();
        let atr = atr(&bars, 2);
        assert!(atr[0].is_nan());
        assert!((atr[1] - 0.00175).abs() < 1e-12);
        assert!((atr[2] - 0.0024).abs() < 1e-12);
    }

    #[test]
    fn snapshot_quotes_at_close() {
        let bars = read_bars(CSV.as_bytes()).unwrap();
        let m = bars[1].snapshot(0.0001, 1.0, 0.002);
        assert_eq!(m.bid, 1.1015);
        assert!((m.ask - 1.10165).abs() < 1e-12);
        assert_eq!(m.spread_pips, 1.5);
        assert_eq!(m.bar_high, 1.1020);
        assert_eq!(m.atr_value, 0.002);

        let m = bars[0].snapshot(0.0001, 1.0, f64::NAN);
        assert_eq!(m.spread_pips, 1.0);
    }
}
