//! TickVault Core: historical bar download engine.
//!
//! This crate keeps a local archive of OHLCV bars up to date:
//! - Domain types (periods, bars, futures contracts, instruments)
//! - Provider and storage seams with Yahoo and Parquet implementations
//! - Job generation from instrument configs and roll cycles
//! - Fair round-robin scheduling under a shared call allowance
//! - Coverage evaluation and idempotent merge of fetched bars

pub mod config;
pub mod data;
pub mod domain;
pub mod engine;

pub use config::{AppConfig, ConfigError, DownloadSettings, InstrumentConfig};
