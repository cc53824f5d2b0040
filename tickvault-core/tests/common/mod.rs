//! Scripted provider and in-memory storage shared by integration tests.

#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tickvault_core::data::{FetchError, Provider, Storage, StorageError};
use tickvault_core::domain::{Bar, BarTable, Instrument, InstrumentKind, Period, RollCycle};
use tickvault_core::InstrumentConfig;

pub fn dt(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// One daily bar per calendar day in `[start, end]`.
pub fn daily_bars(start: NaiveDateTime, end: NaiveDateTime, close: f64) -> Vec<Bar> {
    let mut bars = Vec::new();
    let mut ts = start.date().and_hms_opt(0, 0, 0).unwrap();
    if ts < start {
        ts += Duration::days(1);
    }
    while ts <= end {
        bars.push(Bar {
            timestamp: ts,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1_000.0,
        });
        ts += Duration::days(1);
    }
    bars
}

pub fn stock(code: &str, periods: Vec<Period>) -> InstrumentConfig {
    InstrumentConfig {
        code: code.into(),
        kind: InstrumentKind::Stock,
        symbol: None,
        roll_cycle: None,
        exchange: None,
        periods,
        tick_date: None,
        backfill_start_date: None,
        lookback_days: 360,
    }
}

pub fn future(code: &str, cycle: &str, periods: Vec<Period>) -> InstrumentConfig {
    InstrumentConfig {
        code: code.into(),
        kind: InstrumentKind::Future,
        symbol: None,
        roll_cycle: Some(RollCycle::parse(cycle).unwrap()),
        exchange: None,
        periods,
        tick_date: NaiveDate::from_ymd_opt(2008, 5, 4),
        backfill_start_date: None,
        lookback_days: 360,
    }
}

#[derive(Debug, Clone)]
pub enum Response {
    /// Daily bars across the requested window at this close.
    Bars(f64),
    Fail(FetchError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub symbol: String,
    pub period: Period,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Provider answering from per-symbol scripts, then from a fallback.
pub struct MockProvider {
    periods: Vec<Period>,
    scripts: Mutex<HashMap<String, VecDeque<Response>>>,
    fallback: Response,
    calls: Mutex<Vec<Call>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            periods: vec![Period::Daily, Period::Hour1],
            scripts: Mutex::new(HashMap::new()),
            fallback: Response::Bars(100.0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fallback(mut self, fallback: Response) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn script(self, symbol: &str, responses: Vec<Response>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(symbol.to_string(), responses.into());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn supported_periods(&self) -> &[Period] {
        &self.periods
    }

    fn fetch(
        &self,
        instrument: &Instrument,
        period: Period,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<BarTable, FetchError> {
        let symbol = instrument.symbol();
        self.calls.lock().unwrap().push(Call {
            symbol: symbol.clone(),
            period,
            start,
            end,
        });

        let response = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&symbol)
            .and_then(|script| script.pop_front())
            .unwrap_or_else(|| self.fallback.clone());

        match response {
            Response::Fail(e) => Err(e),
            Response::Bars(close) => BarTable::from_bars(
                symbol.clone(),
                period,
                start,
                end,
                self.name(),
                daily_bars(start, end, close),
            )
            .ok_or(FetchError::NotFound { symbol, period }),
        }
    }
}

/// Storage keeping series in a map.
pub struct MemoryStorage {
    name: String,
    series: Mutex<HashMap<(String, Period), BarTable>>,
    fail_load: bool,
    fail_persist: bool,
    persists: AtomicUsize,
}

impl MemoryStorage {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            series: Mutex::new(HashMap::new()),
            fail_load: false,
            fail_persist: false,
            persists: AtomicUsize::new(0),
        }
    }

    pub fn failing_load(name: &str) -> Self {
        Self {
            fail_load: true,
            ..Self::new(name)
        }
    }

    pub fn failing_persist(name: &str) -> Self {
        Self {
            fail_persist: true,
            ..Self::new(name)
        }
    }

    pub fn get(&self, symbol: &str, period: Period) -> Option<BarTable> {
        self.series
            .lock()
            .unwrap()
            .get(&(symbol.to_string(), period))
            .cloned()
    }

    pub fn insert(&self, table: BarTable) {
        let key = (table.meta().symbol.clone(), table.meta().period);
        self.series.lock().unwrap().insert(key, table);
    }

    pub fn persist_count(&self) -> usize {
        self.persists.load(Ordering::SeqCst)
    }
}

impl Storage for MemoryStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self, symbol: &str, period: Period) -> Result<BarTable, StorageError> {
        if self.fail_load {
            return Err(StorageError::Io("disk unavailable".into()));
        }
        self.get(symbol, period).ok_or(StorageError::NotFound {
            symbol: symbol.to_string(),
            period,
        })
    }

    fn persist(&self, table: &BarTable) -> Result<(), StorageError> {
        if self.fail_persist {
            return Err(StorageError::Io("disk full".into()));
        }
        self.persists.fetch_add(1, Ordering::SeqCst);
        self.insert(table.clone());
        Ok(())
    }
}
