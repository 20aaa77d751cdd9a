/*!
 * Fishing-activity aggregation.
 *
 * Splits the season's detections into cyclone-present and cyclone-absent
 * days and rolls them up into the daily and monthly tables the impact
 * calculation joins against. A cyclone only counts as present if its
 * EEZ-clipped track spans at least a full day; single-fix crossings are
 * treated as noise.
 */

use chrono::{Datelike, NaiveDate};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    detection::BoatDetection,
    grounds::{ground_for_detection, FishingGround},
    track::CycloneTrackPoint,
};

/// Minimum track span inside the EEZ for a cyclone to count, in days.
const MIN_CYCLONE_SPAN_DAYS: i64 = 1;

/// Per-day, per-ground activity with the cyclone flag attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyActivityRecord {
    pub date: NaiveDate,
    pub ground_id: usize,
    pub boat_count: u32,
    pub cyclone_present: bool,
}

/// Mean daily boat count for one calendar month.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonthlyMean {
    pub year: i32,
    pub month: u32,
    pub mean_boats: f64,
}

/**
 * The dates on which a qualifying cyclone was inside the EEZ.
 *
 * Track points are grouped by storm name; a group qualifies when its dates
 * span at least [MIN_CYCLONE_SPAN_DAYS]. The result is the union of the
 * qualifying groups' dates.
 */
pub fn qualifying_cyclone_dates(points: &[CycloneTrackPoint]) -> FxHashSet<NaiveDate> {
    let mut by_name: FxHashMap<&str, Vec<NaiveDate>> = FxHashMap::default();
    for point in points {
        by_name.entry(point.name.as_str()).or_default().push(point.date());
    }

    let mut dates = FxHashSet::default();
    for group in by_name.values() {
        let first = group.iter().min().copied();
        let last = group.iter().max().copied();
        if let (Some(first), Some(last)) = (first, last) {
            if (last - first).num_days() >= MIN_CYCLONE_SPAN_DAYS {
                dates.extend(group.iter().copied());
            }
        }
    }
    dates
}

/// Split detections into (cyclone-present, cyclone-absent) day sets. Every
/// detection lands in exactly one side.
pub fn partition_detections(
    detections: Vec<BoatDetection>,
    cyclone_dates: &FxHashSet<NaiveDate>,
) -> (Vec<BoatDetection>, Vec<BoatDetection>) {
    detections
        .into_iter()
        .partition(|d| cyclone_dates.contains(&d.date()))
}

/// Total boat count per date, sorted by date.
pub fn daily_totals(detections: &[BoatDetection]) -> Vec<(NaiveDate, u32)> {
    let mut counts: FxHashMap<NaiveDate, u32> = FxHashMap::default();
    for detection in detections {
        *counts.entry(detection.date()).or_insert(0) += 1;
    }
    let mut totals: Vec<(NaiveDate, u32)> = counts.into_iter().collect();
    totals.sort_by_key(|(date, _)| *date);
    totals
}

/// Mean daily boat count per calendar month, sorted by (year, month).
pub fn monthly_means(daily: &[(NaiveDate, u32)]) -> Vec<MonthlyMean> {
    let mut sums: FxHashMap<(i32, u32), (u64, u32)> = FxHashMap::default();
    for (date, count) in daily {
        let entry = sums.entry((date.year(), date.month())).or_insert((0, 0));
        entry.0 += u64::from(*count);
        entry.1 += 1;
    }

    let mut means: Vec<MonthlyMean> = sums
        .into_iter()
        .map(|((year, month), (sum, days))| MonthlyMean {
            year,
            month,
            mean_boats: sum as f64 / f64::from(days),
        })
        .collect();
    means.sort_by_key(|m| (m.year, m.month));
    means
}

/// Boat counts per ground for each date, as a vector indexed by contour id.
/// Detections outside every ground are dropped by the spatial join.
pub fn ground_counts_by_date(
    grounds: &[FishingGround],
    detections: &[BoatDetection],
) -> FxHashMap<NaiveDate, Vec<u32>> {
    let mut by_date: FxHashMap<NaiveDate, Vec<u32>> = FxHashMap::default();
    for detection in detections {
        if let Some(ground_id) = ground_for_detection(grounds, detection) {
            let counts = by_date
                .entry(detection.date())
                .or_insert_with(|| vec![0; grounds.len()]);
            counts[ground_id] += 1;
        }
    }
    by_date
}

/// The flat per-day per-ground activity table, sorted by (date, ground).
pub fn activity_records(
    grounds: &[FishingGround],
    detections: &[BoatDetection],
    cyclone_dates: &FxHashSet<NaiveDate>,
) -> Vec<DailyActivityRecord> {
    let mut records = Vec::new();
    for (date, counts) in ground_counts_by_date(grounds, detections) {
        for (ground_id, boat_count) in counts.into_iter().enumerate() {
            records.push(DailyActivityRecord {
                date,
                ground_id,
                boat_count,
                cyclone_present: cyclone_dates.contains(&date),
            });
        }
    }
    records.sort_by_key(|r| (r.date, r.ground_id));
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 7, day).unwrap()
    }

    fn track_point(name: &str, day: u32) -> CycloneTrackPoint {
        CycloneTrackPoint {
            name: name.to_string(),
            lon: 125.0,
            lat: 13.0,
            timestamp: date(day).and_hms_opt(6, 0, 0).unwrap(),
            wind: 50.0,
            storm_speed: 12.0,
        }
    }

    fn detection_on(day: u32) -> BoatDetection {
        BoatDetection {
            lon: 120.0,
            lat: 10.0,
            timestamp: date(day).and_hms_opt(1, 0, 0).unwrap(),
            quality_flag: 1,
        }
    }

    #[test]
    fn single_day_crossings_do_not_qualify() {
        let points = vec![
            track_point("MARIA", 3),
            track_point("MARIA", 4),
            track_point("BRIEF", 10),
        ];

        let dates = qualifying_cyclone_dates(&points);
        assert!(dates.contains(&date(3)));
        assert!(dates.contains(&date(4)));
        assert!(!dates.contains(&date(10)));
    }

    #[test]
    fn partition_is_a_disjoint_cover() {
        let detections = vec![detection_on(1), detection_on(2), detection_on(3)];
        let mut cyclone_dates = FxHashSet::default();
        cyclone_dates.insert(date(2));

        let (with, without) = partition_detections(detections.clone(), &cyclone_dates);
        assert_eq!(with.len() + without.len(), detections.len());
        assert!(with.iter().all(|d| d.date() == date(2)));
        assert!(without.iter().all(|d| d.date() != date(2)));
    }

    #[test]
    fn daily_totals_count_and_sort() {
        let detections = vec![detection_on(2), detection_on(1), detection_on(2)];
        let totals = daily_totals(&detections);
        assert_eq!(totals, vec![(date(1), 1), (date(2), 2)]);
    }

    #[test]
    fn monthly_means_average_over_observed_days() {
        let daily = vec![(date(1), 10), (date(2), 20), (NaiveDate::from_ymd_opt(2023, 8, 1).unwrap(), 7)];
        let means = monthly_means(&daily);
        assert_eq!(means.len(), 2);
        assert!((means[0].mean_boats - 15.0).abs() < 1e-12);
        assert_eq!(means[0].month, 7);
        assert!((means[1].mean_boats - 7.0).abs() < 1e-12);
    }
}
