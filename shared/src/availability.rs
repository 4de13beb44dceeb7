//! Per-day stock arithmetic over an already-fetched set of ledger intervals.
//!
//! Nothing here touches a datastore, so nothing here can fail. Callers that fetch
//! the intervals own the fail-closed behaviour.

use chrono::{Months, NaiveDate};

use crate::{AvailabilityInterval, AvailabilityResult};

/// Every calendar day in `[start, end]`, inclusive. Empty when `start > end`.
pub fn days(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |day| *day <= end)
}

/// Units held on `day` by consuming intervals. Summed in `i64` so an
/// overfull ledger cannot wrap.
pub fn consumed_on(intervals: &[AvailabilityInterval], day: NaiveDate) -> i64 {
    intervals
        .iter()
        .filter(|interval| interval.status.is_consuming() && interval.covers(day))
        .map(|interval| i64::from(interval.quantity))
        .sum()
}

/// Units still free on `day`, never negative.
pub fn remaining_on(total_stock: i32, intervals: &[AvailabilityInterval], day: NaiveDate) -> i32 {
    let remaining = (i64::from(total_stock) - consumed_on(intervals, day)).max(0);
    i32::try_from(remaining).unwrap_or(i32::MAX)
}

/// Walks `[start, end]` and reports the smallest remaining quantity and every day
/// that cannot satisfy `requested`.
pub fn compute_availability(
    total_stock: i32,
    intervals: &[AvailabilityInterval],
    start: NaiveDate,
    end: NaiveDate,
    requested: i32,
) -> AvailabilityResult {
    if start > end {
        return AvailabilityResult::unavailable("empty date range");
    }

    let mut min_available = i32::MAX;
    let mut conflicting_dates = Vec::new();

    for day in days(start, end) {
        let day_available = remaining_on(total_stock, intervals, day);
        min_available = min_available.min(day_available);
        if day_available < requested {
            conflicting_dates.push(day);
        }
    }

    let available = min_available >= requested && conflicting_dates.is_empty();
    AvailabilityResult {
        available,
        min_available_quantity: min_available,
        reason: (!available).then(|| {
            format!(
                "only {} unit(s) free on {} day(s) of the requested range",
                min_available,
                conflicting_dates.len()
            )
        }),
        conflicting_dates,
        verification_failed: false,
    }
}

/// First day in `[start, end]` with fewer than `needed` units free, stopping there.
pub fn first_shortfall(
    total_stock: i32,
    intervals: &[AvailabilityInterval],
    start: NaiveDate,
    end: NaiveDate,
    needed: i32,
) -> Option<NaiveDate> {
    days(start, end).find(|day| remaining_on(total_stock, intervals, *day) < needed)
}

/// First and last day of a calendar month, or `None` for an invalid month.
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let last = first.checked_add_months(Months::new(1))?.pred_opt()?;
    Some((first, last))
}
