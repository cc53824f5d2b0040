//! Merge freshly fetched bars into an archived series.

use crate::domain::BarTable;
use tracing::warn;

/// Combine `incoming` with the stored series, if any.
///
/// Incoming bars win on timestamp conflicts. When the two requested
/// windows do not touch at all, the stored series is dropped and
/// `incoming` is returned as is.
pub fn merge(incoming: BarTable, existing: Option<BarTable>) -> BarTable {
    let Some(existing) = existing else {
        return incoming;
    };

    let new = incoming.meta();
    let old = existing.meta();
    if new.requested_start > old.requested_end || new.requested_end < old.requested_start {
        warn!(
            symbol = %new.symbol,
            period = %new.period,
            incoming_start = %new.requested_start,
            incoming_end = %new.requested_end,
            existing_start = %old.requested_start,
            existing_end = %old.requested_end,
            "disjoint windows, replacing stored series"
        );
        return incoming;
    }

    existing.merged_with(incoming)
}
