//! Bars, bar tables, and the metadata that travels with them.

use super::period::Period;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One OHLCV record at a fixed granularity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Returns true if any OHLC field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }
}

/// Describes what a stored or fetched series was asked for and what it holds.
///
/// Invariant: `first_bar <= last_bar <= requested_end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesMetadata {
    pub symbol: String,
    pub period: Period,
    pub requested_start: NaiveDateTime,
    pub requested_end: NaiveDateTime,
    pub first_bar: NaiveDateTime,
    pub last_bar: NaiveDateTime,
    pub provider: String,
    /// Timestamp of the newest bar when it carries zero volume, which
    /// usually means the contract stopped trading.
    #[serde(default)]
    pub expiration_hint: Option<NaiveDateTime>,
}

/// Timestamp-ordered, timestamp-unique bars paired with their metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct BarTable {
    meta: SeriesMetadata,
    bars: Vec<Bar>,
}

impl BarTable {
    /// Build a table from raw bars for the requested window.
    ///
    /// Bars are sorted and deduplicated (last occurrence wins). Returns
    /// `None` when there are no bars, since an empty series has no
    /// boundaries to describe.
    pub fn from_bars(
        symbol: impl Into<String>,
        period: Period,
        requested_start: NaiveDateTime,
        requested_end: NaiveDateTime,
        provider: impl Into<String>,
        bars: Vec<Bar>,
    ) -> Option<Self> {
        let bars = normalize(bars);
        let first = bars.first()?.timestamp;
        let last = bars.last()?.timestamp;
        let meta = SeriesMetadata {
            symbol: symbol.into(),
            period,
            requested_start: requested_start.min(first),
            requested_end: requested_end.max(last),
            first_bar: first,
            last_bar: last,
            provider: provider.into(),
            expiration_hint: expiration_hint(&bars),
        };
        Some(Self { meta, bars })
    }

    /// Reassemble a table from stored parts. Bars are re-normalized and the
    /// bar boundaries are recomputed from them; returns `None` if empty.
    pub fn from_parts(meta: SeriesMetadata, bars: Vec<Bar>) -> Option<Self> {
        let bars = normalize(bars);
        let first = bars.first()?.timestamp;
        let last = bars.last()?.timestamp;
        let meta = SeriesMetadata {
            requested_start: meta.requested_start.min(first),
            requested_end: meta.requested_end.max(last),
            first_bar: first,
            last_bar: last,
            ..meta
        };
        Some(Self { meta, bars })
    }

    pub fn meta(&self) -> &SeriesMetadata {
        &self.meta
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn into_parts(self) -> (SeriesMetadata, Vec<Bar>) {
        (self.meta, self.bars)
    }

    /// Union of `self` and `newer`; bars from `newer` win on equal
    /// timestamps. The requested window spans both inputs, provider and
    /// expiration hint come from `newer`.
    pub fn merged_with(self, newer: BarTable) -> BarTable {
        let requested_start = self.meta.requested_start.min(newer.meta.requested_start);
        let requested_end = self.meta.requested_end.max(newer.meta.requested_end);

        let mut bars = self.bars;
        bars.extend(newer.bars);
        let bars = normalize(bars);

        // Both inputs are non-empty, so these fallbacks are never taken.
        let first = bars.first().map_or(newer.meta.first_bar, |b| b.timestamp);
        let last = bars.last().map_or(newer.meta.last_bar, |b| b.timestamp);

        let meta = SeriesMetadata {
            requested_start: requested_start.min(first),
            requested_end: requested_end.max(last),
            first_bar: first,
            last_bar: last,
            ..newer.meta
        };
        BarTable { meta, bars }
    }
}

/// Sort by timestamp and keep the last bar seen for each timestamp.
fn normalize(mut bars: Vec<Bar>) -> Vec<Bar> {
    // Stable sort keeps input order among equal timestamps, so the
    // later duplicate is the one that survives.
    bars.sort_by_key(|b| b.timestamp);
    let mut out: Vec<Bar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match out.last_mut() {
            Some(prev) if prev.timestamp == bar.timestamp => *prev = bar,
            _ => out.push(bar),
        }
    }
    out
}

fn expiration_hint(bars: &[Bar]) -> Option<NaiveDateTime> {
    bars.last()
        .filter(|b| b.volume == 0.0)
        .map(|b| b.timestamp)
}
