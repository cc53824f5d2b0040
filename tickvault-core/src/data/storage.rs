//! Archive storage for bar series.
//!
//! Layout: `{root}/symbol={SYMBOL}/period={KEY}/bars.parquet` with a
//! `meta.json` sidecar next to it.
//!
//! - Writes are atomic per series: both files go to `.tmp` first and are
//!   renamed into place, metadata last, so a reader never sees new
//!   metadata describing old bars.
//! - Loads validate the Parquet schema. Corrupt files are quarantined
//!   (`{file}.quarantined`) and reported as missing so the series is
//!   fetched again.

use super::schema::BarSchema;
use crate::domain::{Bar, BarTable, Period, SeriesMetadata};
use chrono::NaiveDateTime;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no archived series for {symbol} ({period})")]
    NotFound { symbol: String, period: Period },

    #[error("storage I/O error: {0}")]
    Io(String),

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("corrupt archive: {0}")]
    Corrupt(String),

    #[error("metadata serialization: {0}")]
    Serialization(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

/// Where bar series are archived.
///
/// `persist` must be all-or-nothing per series: a failed write leaves
/// the previously stored series intact.
pub trait Storage: Send + Sync {
    fn name(&self) -> &str;

    fn load(&self, symbol: &str, period: Period) -> Result<BarTable, StorageError>;

    fn persist(&self, table: &BarTable) -> Result<(), StorageError>;
}

/// Metadata sidecar for one archived series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMeta {
    #[serde(flatten)]
    pub series: SeriesMetadata,
    pub bar_count: usize,
    pub data_hash: String,
    pub stored_at: NaiveDateTime,
}

/// One row of `ParquetStorage::status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesStatus {
    pub symbol: String,
    pub period: Period,
    pub first_bar: NaiveDateTime,
    pub last_bar: NaiveDateTime,
    pub bar_count: usize,
    pub provider: String,
}

/// Parquet-backed archive.
pub struct ParquetStorage {
    root: PathBuf,
}

impl ParquetStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn series_dir(&self, symbol: &str, period: Period) -> PathBuf {
        self.root
            .join(format!("symbol={symbol}"))
            .join(format!("period={}", period.storage_key()))
    }

    fn bars_path(&self, symbol: &str, period: Period) -> PathBuf {
        self.series_dir(symbol, period).join("bars.parquet")
    }

    fn meta_path(&self, symbol: &str, period: Period) -> PathBuf {
        self.series_dir(symbol, period).join("meta.json")
    }

    /// Read the metadata sidecar, if present and parseable.
    pub fn get_meta(&self, symbol: &str, period: Period) -> Option<StoredMeta> {
        let content = fs::read_to_string(self.meta_path(symbol, period)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Every archived series under the root, sorted by symbol then period.
    pub fn status(&self) -> Result<Vec<SeriesStatus>, StorageError> {
        let mut out = Vec::new();
        if !self.root.exists() {
            return Ok(out);
        }

        for sym_entry in read_dir(&self.root)? {
            let sym_name = sym_entry.file_name().to_string_lossy().to_string();
            let Some(symbol) = sym_name.strip_prefix("symbol=") else {
                continue;
            };
            for period_entry in read_dir(&sym_entry.path())? {
                let period_name = period_entry.file_name().to_string_lossy().to_string();
                let Some(period) = period_name
                    .strip_prefix("period=")
                    .and_then(Period::from_storage_key)
                else {
                    continue;
                };
                if let Some(meta) = self.get_meta(symbol, period) {
                    out.push(SeriesStatus {
                        symbol: symbol.to_string(),
                        period,
                        first_bar: meta.series.first_bar,
                        last_bar: meta.series.last_bar,
                        bar_count: meta.bar_count,
                        provider: meta.series.provider,
                    });
                }
            }
        }

        out.sort_by(|a, b| a.symbol.cmp(&b.symbol).then(a.period.cmp(&b.period)));
        Ok(out)
    }

    fn quarantine(&self, path: &Path, reason: &str) {
        let mut quarantined = path.as_os_str().to_owned();
        quarantined.push(".quarantined");
        tracing::warn!(path = %path.display(), reason, "quarantining corrupt archive file");
        if let Err(e) = fs::rename(path, &quarantined) {
            tracing::warn!(path = %path.display(), error = %e, "quarantine rename failed");
        }
    }
}

impl Storage for ParquetStorage {
    fn name(&self) -> &str {
        "parquet"
    }

    fn load(&self, symbol: &str, period: Period) -> Result<BarTable, StorageError> {
        let not_found = || StorageError::NotFound {
            symbol: symbol.to_string(),
            period,
        };

        let bars_path = self.bars_path(symbol, period);
        let meta_path = self.meta_path(symbol, period);
        if !bars_path.exists() || !meta_path.exists() {
            return Err(not_found());
        }

        let meta_json =
            fs::read_to_string(&meta_path).map_err(|e| StorageError::Io(format!("read meta: {e}")))?;
        let meta: StoredMeta = match serde_json::from_str(&meta_json) {
            Ok(m) => m,
            Err(e) => {
                self.quarantine(&meta_path, &e.to_string());
                return Err(not_found());
            }
        };

        let bars = match load_and_validate_parquet(&bars_path) {
            Ok(bars) => bars,
            Err(e) => {
                self.quarantine(&bars_path, &e.to_string());
                return Err(not_found());
            }
        };

        BarTable::from_parts(meta.series, bars).ok_or_else(not_found)
    }

    fn persist(&self, table: &BarTable) -> Result<(), StorageError> {
        let meta = table.meta();
        let dir = self.series_dir(&meta.symbol, meta.period);
        fs::create_dir_all(&dir).map_err(|e| StorageError::Io(format!("create dir: {e}")))?;

        let bars_path = self.bars_path(&meta.symbol, meta.period);
        let meta_path = self.meta_path(&meta.symbol, meta.period);
        let bars_tmp = bars_path.with_extension("parquet.tmp");
        let meta_tmp = meta_path.with_extension("json.tmp");

        let stored = StoredMeta {
            series: meta.clone(),
            bar_count: table.len(),
            data_hash: data_hash(table.bars())?,
            stored_at: chrono::Utc::now().naive_utc(),
        };
        let meta_json = serde_json::to_string_pretty(&stored)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let mut df = bars_to_dataframe(&meta.symbol, table.bars())?;
        let staged = write_parquet(&mut df, &bars_tmp).and_then(|()| {
            fs::write(&meta_tmp, meta_json).map_err(|e| StorageError::Io(format!("meta write: {e}")))
        });
        if let Err(e) = staged {
            let _ = fs::remove_file(&bars_tmp);
            let _ = fs::remove_file(&meta_tmp);
            return Err(e);
        }

        // The previous bars file is set aside until the new metadata lands,
        // so a failed metadata rename leaves the old pair intact.
        let bars_prev = bars_path.with_extension("parquet.prev");
        let had_prev = bars_path.exists();
        if had_prev {
            fs::rename(&bars_path, &bars_prev).map_err(|e| {
                let _ = fs::remove_file(&bars_tmp);
                let _ = fs::remove_file(&meta_tmp);
                StorageError::Io(format!("set aside previous bars: {e}"))
            })?;
        }
        let restore = || {
            if had_prev {
                if let Err(e) = fs::rename(&bars_prev, &bars_path) {
                    tracing::error!(path = %bars_path.display(), error = %e, "failed to restore previous bars");
                }
            }
        };

        if let Err(e) = fs::rename(&bars_tmp, &bars_path) {
            let _ = fs::remove_file(&bars_tmp);
            let _ = fs::remove_file(&meta_tmp);
            restore();
            return Err(StorageError::Io(format!("atomic rename failed: {e}")));
        }
        if let Err(e) = fs::rename(&meta_tmp, &meta_path) {
            let _ = fs::remove_file(&meta_tmp);
            let _ = fs::remove_file(&bars_path);
            restore();
            return Err(StorageError::Io(format!("atomic rename failed: {e}")));
        }
        if had_prev {
            let _ = fs::remove_file(&bars_prev);
        }

        tracing::debug!(
            symbol = %meta.symbol,
            period = %meta.period,
            rows = table.len(),
            "persisted series"
        );
        Ok(())
    }
}

fn read_dir(path: &Path) -> Result<Vec<fs::DirEntry>, StorageError> {
    fs::read_dir(path)
        .map_err(|e| StorageError::Io(format!("read dir {}: {e}", path.display())))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StorageError::Io(format!("dir entry: {e}")))
}

fn data_hash(bars: &[Bar]) -> Result<String, StorageError> {
    let bytes =
        serde_json::to_vec(bars).map_err(|e| StorageError::Serialization(format!("hash: {e}")))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn bars_to_dataframe(symbol: &str, bars: &[Bar]) -> Result<DataFrame, StorageError> {
    let timestamps: Vec<i64> = bars
        .iter()
        .map(|b| b.timestamp.and_utc().timestamp_millis())
        .collect();
    let symbols: Vec<&str> = vec![symbol; bars.len()];
    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

    DataFrame::new(vec![
        Column::new("timestamp".into(), timestamps)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .map_err(|e| StorageError::Parquet(format!("timestamp cast: {e}")))?,
        Column::new("symbol".into(), symbols),
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
    ])
    .map_err(|e| StorageError::Parquet(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), StorageError> {
    let file =
        fs::File::create(path).map_err(|e| StorageError::Io(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| StorageError::Parquet(format!("write parquet: {e}")))?;
    Ok(())
}

fn load_and_validate_parquet(path: &Path) -> Result<Vec<Bar>, StorageError> {
    let file = fs::File::open(path).map_err(|e| StorageError::Io(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| StorageError::Parquet(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(StorageError::Corrupt("empty parquet file".into()));
    }
    BarSchema::validate(&df).map_err(|e| StorageError::Corrupt(e.to_string()))?;

    dataframe_to_bars(&df)
}

fn dataframe_to_bars(df: &DataFrame) -> Result<Vec<Bar>, StorageError> {
    let col_err = |e: PolarsError| StorageError::Parquet(format!("column read: {e}"));

    let ts_col = df
        .column("timestamp")
        .map_err(col_err)?
        .cast(&DataType::Int64)
        .map_err(col_err)?;
    let ts_ca = ts_col.i64().map_err(col_err)?;
    let open_ca = df.column("open").map_err(col_err)?.f64().map_err(col_err)?;
    let high_ca = df.column("high").map_err(col_err)?.f64().map_err(col_err)?;
    let low_ca = df.column("low").map_err(col_err)?.f64().map_err(col_err)?;
    let close_ca = df.column("close").map_err(col_err)?.f64().map_err(col_err)?;
    let vol_ca = df.column("volume").map_err(col_err)?.f64().map_err(col_err)?;

    let n = df.height();
    let mut bars = Vec::with_capacity(n);
    for i in 0..n {
        let millis = ts_ca
            .get(i)
            .ok_or_else(|| StorageError::Corrupt(format!("null timestamp at row {i}")))?;
        let timestamp = chrono::DateTime::from_timestamp_millis(millis)
            .map(|dt| dt.naive_utc())
            .ok_or_else(|| StorageError::Corrupt(format!("timestamp out of range at row {i}")))?;

        bars.push(Bar {
            timestamp,
            open: open_ca.get(i).unwrap_or(f64::NAN),
            high: high_ca.get(i).unwrap_or(f64::NAN),
            low: low_ca.get(i).unwrap_or(f64::NAN),
            close: close_ca.get(i).unwrap_or(f64::NAN),
            volume: vol_ca.get(i).unwrap_or(0.0),
        });
    }

    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::env;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_root() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = env::temp_dir().join(format!("tickvault_storage_{}_{id}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn ts(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn sample_table() -> BarTable {
        let bars = (2..=4)
            .map(|d| Bar {
                timestamp: ts(d),
                open: 100.0 + d as f64,
                high: 102.0 + d as f64,
                low: 99.0 + d as f64,
                close: 101.0 + d as f64,
                volume: 1000.0,
            })
            .collect();
        BarTable::from_bars("SPY", Period::Daily, ts(1), ts(5), "test", bars).unwrap()
    }

    #[test]
    fn persist_and_load_roundtrip() {
        let root = temp_root();
        let storage = ParquetStorage::new(&root);
        let table = sample_table();

        storage.persist(&table).unwrap();
        let loaded = storage.load("SPY", Period::Daily).unwrap();

        assert_eq!(loaded, table);
        assert!(!root
            .join("symbol=SPY/period=1d/bars.parquet.tmp")
            .exists());

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn missing_series_is_not_found() {
        let root = temp_root();
        let storage = ParquetStorage::new(&root);

        let err = storage.load("SPY", Period::Daily).unwrap_err();
        assert!(err.is_not_found());

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn periods_are_stored_separately() {
        let root = temp_root();
        let storage = ParquetStorage::new(&root);
        storage.persist(&sample_table()).unwrap();

        assert!(storage.load("SPY", Period::Monthly).unwrap_err().is_not_found());
        assert!(storage.load("SPY", Period::Minute1).unwrap_err().is_not_found());

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn corrupt_parquet_is_quarantined() {
        let root = temp_root();
        let storage = ParquetStorage::new(&root);
        storage.persist(&sample_table()).unwrap();

        let bars_path = root.join("symbol=SPY/period=1d/bars.parquet");
        fs::write(&bars_path, b"not parquet").unwrap();

        let err = storage.load("SPY", Period::Daily).unwrap_err();
        assert!(err.is_not_found());
        assert!(!bars_path.exists());
        assert!(root
            .join("symbol=SPY/period=1d/bars.parquet.quarantined")
            .exists());

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn failed_meta_write_keeps_previous_series() {
        let root = temp_root();
        let storage = ParquetStorage::new(&root);
        let original = sample_table();
        storage.persist(&original).unwrap();

        let dir = root.join("symbol=SPY/period=1d");
        let meta_path = dir.join("meta.json");
        let meta_bytes = fs::read(&meta_path).unwrap();
        // A directory in place of meta.json makes the final rename fail.
        fs::remove_file(&meta_path).unwrap();
        fs::create_dir_all(meta_path.join("blocker")).unwrap();

        let bar = Bar {
            timestamp: ts(10),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1.0,
        };
        let replacement =
            BarTable::from_bars("SPY", Period::Daily, ts(1), ts(10), "test", vec![bar]).unwrap();
        assert!(storage.persist(&replacement).is_err());
        assert!(dir.join("bars.parquet").exists());
        assert!(!dir.join("bars.parquet.prev").exists());
        assert!(!dir.join("bars.parquet.tmp").exists());

        fs::remove_dir_all(&meta_path).unwrap();
        fs::write(&meta_path, meta_bytes).unwrap();
        assert_eq!(storage.load("SPY", Period::Daily).unwrap(), original);

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn meta_sidecar_records_hash_and_count() {
        let root = temp_root();
        let storage = ParquetStorage::new(&root);
        storage.persist(&sample_table()).unwrap();

        let meta = storage.get_meta("SPY", Period::Daily).unwrap();
        assert_eq!(meta.bar_count, 3);
        assert_eq!(meta.series.provider, "test");
        assert_eq!(meta.data_hash.len(), 64);

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn status_lists_series() {
        let root = temp_root();
        let storage = ParquetStorage::new(&root);
        storage.persist(&sample_table()).unwrap();

        let status = storage.status().unwrap();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].symbol, "SPY");
        assert_eq!(status[0].period, Period::Daily);
        assert_eq!(status[0].bar_count, 3);

        let _ = fs::remove_dir_all(&root);
    }
}
