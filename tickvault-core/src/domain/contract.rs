//! Futures month codes, roll cycles, and dated contracts.
//!
//! A futures root (e.g. `GC`) trades one contract per month in its roll
//! cycle. Contracts are materialized on every run from the cycle and a
//! year; they are never persisted.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContractError {
    #[error("unknown futures month code '{0}' (expected one of FGHJKMNQUVXZ)")]
    UnknownMonthCode(char),

    #[error("roll cycle is empty")]
    EmptyRollCycle,

    #[error("invalid contract date {year}-{month:02}")]
    InvalidDate { year: i32, month: u32 },
}

/// The twelve canonical futures month letters, F = January through Z = December.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MonthCode {
    F,
    G,
    H,
    J,
    K,
    M,
    N,
    Q,
    U,
    V,
    X,
    Z,
}

impl MonthCode {
    pub const ALL: [MonthCode; 12] = [
        MonthCode::F,
        MonthCode::G,
        MonthCode::H,
        MonthCode::J,
        MonthCode::K,
        MonthCode::M,
        MonthCode::N,
        MonthCode::Q,
        MonthCode::U,
        MonthCode::V,
        MonthCode::X,
        MonthCode::Z,
    ];

    /// Calendar month number, 1..=12.
    pub fn month(self) -> u32 {
        self as u32 + 1
    }

    pub fn from_month(month: u32) -> Option<Self> {
        Self::ALL.get(month.checked_sub(1)? as usize).copied()
    }

    pub fn letter(self) -> char {
        match self {
            MonthCode::F => 'F',
            MonthCode::G => 'G',
            MonthCode::H => 'H',
            MonthCode::J => 'J',
            MonthCode::K => 'K',
            MonthCode::M => 'M',
            MonthCode::N => 'N',
            MonthCode::Q => 'Q',
            MonthCode::U => 'U',
            MonthCode::V => 'V',
            MonthCode::X => 'X',
            MonthCode::Z => 'Z',
        }
    }
}

impl TryFrom<char> for MonthCode {
    type Error = ContractError;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        let upper = c.to_ascii_uppercase();
        Self::ALL
            .iter()
            .find(|m| m.letter() == upper)
            .copied()
            .ok_or(ContractError::UnknownMonthCode(c))
    }
}

impl fmt::Display for MonthCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Ordered, duplicate-free set of month codes a root trades.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RollCycle(Vec<MonthCode>);

impl RollCycle {
    /// Parse a cycle such as `"GJMQVZ"`. Letters are sorted into calendar
    /// order and duplicates are collapsed.
    pub fn parse(s: &str) -> Result<Self, ContractError> {
        let mut codes = s
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(MonthCode::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        codes.sort();
        codes.dedup();
        if codes.is_empty() {
            return Err(ContractError::EmptyRollCycle);
        }
        Ok(Self(codes))
    }

    pub fn codes(&self) -> &[MonthCode] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// How many jobs the scheduler pops per visit for a root with this cycle.
    pub fn burst_size(&self) -> usize {
        match self.0.len() {
            n if n > 10 => 3,
            n if n > 7 => 2,
            _ => 1,
        }
    }
}

impl TryFrom<String> for RollCycle {
    type Error = ContractError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RollCycle> for String {
    fn from(cycle: RollCycle) -> Self {
        cycle.to_string()
    }
}

impl fmt::Display for RollCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for code in &self.0 {
            write!(f, "{code}")?;
        }
        Ok(())
    }
}

/// Static description of a futures root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FutureContractSpec {
    pub root: String,
    pub roll_cycle: RollCycle,
    /// Earliest date with reliable intraday bars.
    pub tick_date: Option<NaiveDate>,
    pub earliest_start: Option<NaiveDate>,
    pub lookback_days: i64,
    /// Exchange suffix some providers need to resolve dated symbols.
    pub exchange: Option<String>,
}

impl FutureContractSpec {
    /// All contracts of this root for one year, in cycle order.
    pub fn contracts_for_year(
        &self,
        year: i32,
        now: NaiveDateTime,
    ) -> Result<Vec<Contract>, ContractError> {
        self.roll_cycle
            .codes()
            .iter()
            .map(|code| Contract::new(self, year, *code, now))
            .collect()
    }
}

/// Whether a contract month is still in the future relative to "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractStatus {
    Active,
    Expired,
}

/// A dated futures contract with its trading window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub root: String,
    pub year: i32,
    pub month_code: MonthCode,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub status: ContractStatus,
    pub exchange: Option<String>,
}

impl Contract {
    /// Materialize a contract.
    ///
    /// The window ends at the last second of the contract month (clamped
    /// to `now`) and starts at midnight `lookback_days` before that end.
    pub fn new(
        spec: &FutureContractSpec,
        year: i32,
        month_code: MonthCode,
        now: NaiveDateTime,
    ) -> Result<Self, ContractError> {
        let month = month_code.month();
        let last_day = last_day_of_month(year, month)
            .ok_or(ContractError::InvalidDate { year, month })?;
        let month_end = last_day
            .and_hms_opt(23, 59, 59)
            .ok_or(ContractError::InvalidDate { year, month })?;
        let status = if month_end < now {
            ContractStatus::Expired
        } else {
            ContractStatus::Active
        };
        let end = month_end.min(now);
        let start = NaiveDateTime::new(
            (end - Duration::days(spec.lookback_days)).date(),
            NaiveTime::MIN,
        );

        Ok(Self {
            root: spec.root.clone(),
            year,
            month_code,
            start,
            end,
            status,
            exchange: spec.exchange.clone(),
        })
    }

    pub fn month(&self) -> u32 {
        self.month_code.month()
    }

    /// Root + month letter + two-digit year, e.g. `GCQ25`.
    pub fn symbol(&self) -> String {
        format!(
            "{}{}{:02}",
            self.root,
            self.month_code,
            self.year.rem_euclid(100)
        )
    }

    pub fn is_expired(&self) -> bool {
        self.status == ContractStatus::Expired
    }
}

pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

/// Start of the first day of `year`.
pub fn year_start(year: i32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, 1, 1).map(|d| NaiveDateTime::new(d, NaiveTime::MIN))
}

/// Last second of the last day of `year`.
pub fn year_end(year: i32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, 12, 31)?.and_hms_opt(23, 59, 59)
}
