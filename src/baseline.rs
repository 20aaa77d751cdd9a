/*!
 * Baseline (cyclone-free) activity levels.
 *
 * Historical runs compare against a single season-wide average computed
 * from the cyclone-absent days. Nowcast runs have no season to average, so
 * they use a rolling window over a static reference table of recent daily
 * counts, anchored just before each cyclone's start date.
 */

use chrono::NaiveDate;
use log::warn;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{Error, StormFishResult};

/// Rows of recent-history counts taken per rolling baseline window.
pub const BASELINE_WINDOW_ROWS: usize = 30;

/// How far past the end of the reference table a cyclone start may lie and
/// still use the table, inclusive.
pub const MAX_FUTURE_LAG_DAYS: i64 = 21;

/// Static reference table of daily per-ground counts, date ascending.
#[derive(Debug, Clone)]
pub struct ReferenceTable {
    pub dates: Vec<NaiveDate>,
    /// One row per date, one column per ground, aligned with `dates`.
    pub counts: Vec<Vec<f64>>,
}

impl ReferenceTable {
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }
}

/// Season-wide per-ground daily average over cyclone-absent days, rounded
/// to whole boats.
pub fn historical_baseline(
    ground_count: usize,
    counts_by_date: &FxHashMap<NaiveDate, Vec<u32>>,
    cyclone_dates: &FxHashSet<NaiveDate>,
) -> StormFishResult<Vec<f64>> {
    let mut sums = vec![0.0_f64; ground_count];
    let mut days = 0u32;

    for (date, counts) in counts_by_date {
        if cyclone_dates.contains(date) {
            continue;
        }
        days += 1;
        for (ground_id, count) in counts.iter().enumerate() {
            sums[ground_id] += f64::from(*count);
        }
    }

    if days == 0 {
        return Err(Error::EmptyResult(
            "no cyclone-free days available for the baseline".to_string(),
        ));
    }

    Ok(sums
        .into_iter()
        .map(|sum| (sum / f64::from(days)).round())
        .collect())
}

/**
 * Rolling per-ground baseline for one cyclone in a nowcast run.
 *
 * When the cyclone starts inside the reference table's date range, only
 * rows strictly before the start are eligible; when it starts after the
 * table ends, the whole table is eligible as long as the gap is at most
 * [MAX_FUTURE_LAG_DAYS]. The baseline is the per-ground mean of the last
 * [BASELINE_WINDOW_ROWS] eligible rows, rounded. Returns `None`, with a
 * warning, when this cyclone cannot be baselined.
 */
pub fn nowcast_baseline(
    table: &ReferenceTable,
    cyclone: &str,
    start: NaiveDate,
) -> Option<Vec<f64>> {
    let last = table.last_date()?;

    let eligible: Vec<&Vec<f64>> = if start <= last {
        table
            .dates
            .iter()
            .zip(&table.counts)
            .filter(|(date, _)| **date < start)
            .map(|(_, row)| row)
            .collect()
    } else if (start - last).num_days() <= MAX_FUTURE_LAG_DAYS {
        table.counts.iter().collect()
    } else {
        warn!(
            "skipping baseline for {}: start {} is too far in the future of the reference table",
            cyclone, start
        );
        return None;
    };

    if eligible.is_empty() {
        warn!("skipping baseline for {}: no baseline rows before {}", cyclone, start);
        return None;
    }

    let window = &eligible[eligible.len().saturating_sub(BASELINE_WINDOW_ROWS)..];
    let ground_count = window[0].len();
    let mut means = vec![0.0_f64; ground_count];
    for row in window {
        for (ground_id, count) in row.iter().enumerate() {
            means[ground_id] += count;
        }
    }
    for mean in means.iter_mut() {
        *mean = (*mean / window.len() as f64).round();
    }

    Some(means)
}
