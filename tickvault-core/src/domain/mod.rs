//! Domain types for tickvault

pub mod bar;
pub mod contract;
pub mod instrument;
pub mod period;

pub use bar::{Bar, BarTable, SeriesMetadata};
pub use contract::{
    Contract, ContractError, ContractStatus, FutureContractSpec, MonthCode, RollCycle,
};
pub use instrument::{Instrument, InstrumentKind};
pub use period::{ParsePeriodError, Period};
