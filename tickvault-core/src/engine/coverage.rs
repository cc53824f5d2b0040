//! Coverage evaluation: does the archive already satisfy a request?
//!
//! Compares request boundaries against the stored series boundaries with a
//! one-bar tolerance instead of scanning for gaps bar by bar.

use crate::domain::SeriesMetadata;
use chrono::{Duration, NaiveDateTime};

/// A series whose newest bar lags its own requested end by more than this
/// many days (or one bar, if longer) is assumed to have no further data,
/// e.g. an expired contract.
pub const EXPIRATION_THRESHOLD_DAYS: i64 = 7;

/// Days of overlap kept before the newest stored bar when topping up a series.
pub const LOW_DATA_THRESHOLD_DAYS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Stored boundaries cover the request within tolerance.
    Covered,
    /// Stored data stopped well before its requested end.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    Skip(SkipReason),
    Refetch {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
}

impl Coverage {
    pub fn is_skip(&self) -> bool {
        matches!(self, Coverage::Skip(_))
    }
}

/// Decide whether `[start, end]` must be fetched given the stored series.
///
/// The returned start is never later than the requested `end`, and the
/// returned end never falls short of the stored series' start, so the
/// refetched window always touches or overlaps what is archived.
pub fn evaluate(
    start: NaiveDateTime,
    end: NaiveDateTime,
    existing: Option<&SeriesMetadata>,
) -> Coverage {
    let Some(meta) = existing else {
        return Coverage::Refetch { start, end };
    };

    if meta.requested_end - meta.last_bar > stale_after(meta) {
        return Coverage::Skip(SkipReason::Stale);
    }

    let tolerance = meta.period.polling_delta();
    let end_covered = end <= meta.requested_end + tolerance;
    let start_covered = meta.requested_start - tolerance <= start;
    if start_covered && end_covered {
        return Coverage::Skip(SkipReason::Covered);
    }

    let mut new_start = start;
    if start_covered {
        // Only the tail is missing: top up from just before the newest bar.
        new_start = meta.last_bar - Duration::days(LOW_DATA_THRESHOLD_DAYS);
    }
    let (new_start, new_end) = touching(new_start, end, Some(meta));

    Coverage::Refetch {
        start: new_start.min(end),
        end: new_end,
    }
}

/// Widen `[start, end]` until it overlaps or touches the stored window.
///
/// Fetches that skip [`evaluate`] go through this so that a merge never
/// sees disjoint windows.
pub fn touching(
    start: NaiveDateTime,
    end: NaiveDateTime,
    existing: Option<&SeriesMetadata>,
) -> (NaiveDateTime, NaiveDateTime) {
    match existing {
        Some(meta) => (start.min(meta.requested_end), end.max(meta.requested_start)),
        None => (start, end),
    }
}

/// Monthly and quarterly bars are stamped at period start, so their lag
/// after a fresh fetch can exceed the fixed threshold.
fn stale_after(meta: &SeriesMetadata) -> Duration {
    Duration::days(EXPIRATION_THRESHOLD_DAYS).max(meta.period.bar_duration())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Period;
    use chrono::NaiveDate;

    fn dt(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn meta(start: NaiveDateTime, end: NaiveDateTime, last_bar: NaiveDateTime) -> SeriesMetadata {
        SeriesMetadata {
            symbol: "SPY".into(),
            period: Period::Daily,
            requested_start: start,
            requested_end: end,
            first_bar: start,
            last_bar,
            provider: "test".into(),
            expiration_hint: None,
        }
    }

    #[test]
    fn missing_series_refetches_full_window() {
        let c = evaluate(dt(2020, 1, 1), dt(2021, 1, 1), None);
        assert_eq!(
            c,
            Coverage::Refetch {
                start: dt(2020, 1, 1),
                end: dt(2021, 1, 1)
            }
        );
    }

    #[test]
    fn tail_gap_refetches_from_last_bar_minus_overlap() {
        let m = meta(dt(2020, 1, 1), dt(2024, 1, 1), dt(2024, 1, 1));
        let c = evaluate(dt(2020, 6, 1), dt(2024, 6, 1), Some(&m));
        assert_eq!(
            c,
            Coverage::Refetch {
                start: dt(2023, 12, 29),
                end: dt(2024, 6, 1)
            }
        );
    }

    #[test]
    fn stale_series_is_skipped_regardless_of_request() {
        let m = meta(dt(2024, 1, 1), dt(2024, 3, 31), dt(2024, 3, 21));
        let c = evaluate(dt(2020, 1, 1), dt(2030, 1, 1), Some(&m));
        assert_eq!(c, Coverage::Skip(SkipReason::Stale));
    }

    #[test]
    fn monthly_series_lagging_by_less_than_a_bar_is_topped_up() {
        let m = SeriesMetadata {
            period: Period::Monthly,
            ..meta(dt(2020, 1, 1), dt(2025, 10, 17), dt(2025, 10, 1))
        };
        let c = evaluate(dt(2020, 1, 1), dt(2026, 6, 17), Some(&m));
        assert_eq!(
            c,
            Coverage::Refetch {
                start: dt(2025, 9, 28),
                end: dt(2026, 6, 17)
            }
        );
    }

    #[test]
    fn monthly_series_lagging_by_more_than_a_bar_is_stale() {
        let m = SeriesMetadata {
            period: Period::Monthly,
            ..meta(dt(2020, 1, 1), dt(2025, 10, 17), dt(2025, 8, 1))
        };
        let c = evaluate(dt(2020, 1, 1), dt(2026, 6, 17), Some(&m));
        assert_eq!(c, Coverage::Skip(SkipReason::Stale));
    }

    #[test]
    fn touching_widens_disjoint_windows() {
        let m = meta(dt(2024, 1, 1), dt(2024, 3, 1), dt(2024, 3, 1));
        assert_eq!(
            touching(dt(2022, 1, 1), dt(2022, 12, 31), Some(&m)),
            (dt(2022, 1, 1), dt(2024, 1, 1))
        );
        assert_eq!(
            touching(dt(2025, 1, 1), dt(2025, 6, 1), Some(&m)),
            (dt(2024, 3, 1), dt(2025, 6, 1))
        );
        assert_eq!(
            touching(dt(2024, 2, 1), dt(2024, 2, 10), Some(&m)),
            (dt(2024, 2, 1), dt(2024, 2, 10))
        );
        assert_eq!(
            touching(dt(2022, 1, 1), dt(2022, 12, 31), None),
            (dt(2022, 1, 1), dt(2022, 12, 31))
        );
    }

    #[test]
    fn request_within_tolerance_is_covered() {
        let m = meta(dt(2020, 1, 2), dt(2024, 1, 1), dt(2024, 1, 1));
        let c = evaluate(dt(2020, 1, 1), dt(2024, 1, 2), Some(&m));
        assert_eq!(c, Coverage::Skip(SkipReason::Covered));
    }

    #[test]
    fn request_beyond_tolerance_is_not_covered() {
        let m = meta(dt(2020, 1, 3), dt(2024, 1, 1), dt(2024, 1, 1));
        let c = evaluate(dt(2020, 1, 1), dt(2024, 1, 1), Some(&m));
        assert!(!c.is_skip());
    }

    #[test]
    fn head_gap_keeps_requested_start() {
        let m = meta(dt(2022, 1, 1), dt(2024, 1, 1), dt(2024, 1, 1));
        let c = evaluate(dt(2020, 1, 1), dt(2023, 1, 1), Some(&m));
        assert_eq!(
            c,
            Coverage::Refetch {
                start: dt(2020, 1, 1),
                end: dt(2023, 1, 1)
            }
        );
    }

    #[test]
    fn request_entirely_before_archive_is_extended_to_touch_it() {
        let m = meta(dt(2022, 1, 1), dt(2024, 1, 1), dt(2024, 1, 1));
        let c = evaluate(dt(2019, 1, 1), dt(2020, 1, 1), Some(&m));
        assert_eq!(
            c,
            Coverage::Refetch {
                start: dt(2019, 1, 1),
                end: dt(2022, 1, 1)
            }
        );
    }

    #[test]
    fn superset_request_refetches_everything() {
        let m = meta(dt(2022, 1, 1), dt(2023, 1, 1), dt(2023, 1, 1));
        let c = evaluate(dt(2020, 1, 1), dt(2025, 1, 1), Some(&m));
        assert_eq!(
            c,
            Coverage::Refetch {
                start: dt(2020, 1, 1),
                end: dt(2025, 1, 1)
            }
        );
    }
}
