/*!
 * The final impact table.
 *
 * Joins storm attributes, the distance pivot, activity counts, and the
 * baseline into one row per cyclone and date, expressing the change in
 * fishing activity as a signed percentage against the baseline. Nowcast
 * runs have no observed counts during the storm yet, so a fixed pre-fitted
 * cubic regression supplies predicted counts instead.
 */

use chrono::NaiveDate;
use log::warn;
use rustc_hash::FxHashMap;

use crate::{
    baseline::{nowcast_baseline, ReferenceTable},
    distance::CycloneDistanceRow,
    track::CycloneTrackPoint,
};

/// Marker for a ground the regression model does not cover.
pub const UNMODELED: &str = "n/a";

/// Sentinel for an infinite increase over a zero baseline.
pub const INFINITE_INCREASE: &str = "+\u{221e}%";

/// Storm attributes aggregated per (date, cyclone).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StormDayStats {
    pub mean_storm_speed: f64,
    pub max_storm_speed: f64,
    pub max_wind: f64,
}

/// One row of the final impact table.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpactRow {
    pub name: String,
    pub date: NaiveDate,
    pub mean_storm_speed: f64,
    pub max_storm_speed: f64,
    pub max_wind: f64,
    /// Minimum distance to each ground, km, indexed by contour id.
    pub distances_km: Vec<f64>,
    /// Observed (historical) or predicted (nowcast) boat count per ground.
    pub boat_counts: Vec<f64>,
    pub baseline: Vec<f64>,
    pub percent_difference: Vec<String>,
}

impl ImpactRow {
    /// Summed distance across grounds, the duplicate-date tie-break key.
    fn total_distance(&self) -> f64 {
        self.distances_km.iter().sum()
    }
}

/// Aggregate track fixes into per-day storm attributes.
pub fn storm_day_stats(
    points: &[CycloneTrackPoint],
) -> FxHashMap<(NaiveDate, String), StormDayStats> {
    let mut sums: FxHashMap<(NaiveDate, String), (f64, u32, f64, f64)> = FxHashMap::default();
    for point in points {
        let entry = sums
            .entry((point.date(), point.name.clone()))
            .or_insert((0.0, 0, f64::NEG_INFINITY, f64::NEG_INFINITY));
        entry.0 += point.storm_speed;
        entry.1 += 1;
        entry.2 = entry.2.max(point.storm_speed);
        entry.3 = entry.3.max(point.wind);
    }

    sums.into_iter()
        .map(|(key, (sum, n, max_speed, max_wind))| {
            (
                key,
                StormDayStats {
                    mean_storm_speed: sum / f64::from(n),
                    max_storm_speed: max_speed,
                    max_wind,
                },
            )
        })
        .collect()
}

/// Signed percentage change of `value` against `baseline`.
pub fn percent_difference(value: f64, baseline: f64) -> String {
    if baseline == 0.0 {
        if value == 0.0 {
            "+0%".to_string()
        } else {
            INFINITE_INCREASE.to_string()
        }
    } else {
        format!("{:+.1}%", (value - baseline) / baseline * 100.0)
    }
}

/**
 * Build the historical impact table.
 *
 * One row per date: when two cyclones produce rows for the same date, the
 * one with the minimum summed distance across grounds wins. Storm
 * attributes or counts missing from the joins are treated as zero.
 */
pub fn historical_impact(
    distance_rows: &[CycloneDistanceRow],
    stats: &FxHashMap<(NaiveDate, String), StormDayStats>,
    counts_by_date: &FxHashMap<NaiveDate, Vec<u32>>,
    baseline: &[f64],
) -> Vec<ImpactRow> {
    let mut rows = Vec::with_capacity(distance_rows.len());
    for pivot in distance_rows {
        let day_stats = stats
            .get(&(pivot.date, pivot.name.clone()))
            .copied()
            .unwrap_or_default();

        let boat_counts: Vec<f64> = match counts_by_date.get(&pivot.date) {
            Some(counts) => counts.iter().map(|c| f64::from(*c)).collect(),
            None => vec![0.0; baseline.len()],
        };

        let percent_difference = boat_counts
            .iter()
            .zip(baseline)
            .map(|(count, base)| percent_difference(*count, *base))
            .collect();

        rows.push(ImpactRow {
            name: pivot.name.clone(),
            date: pivot.date,
            mean_storm_speed: day_stats.mean_storm_speed,
            max_storm_speed: day_stats.max_storm_speed,
            max_wind: day_stats.max_wind,
            distances_km: pivot.distances_km.clone(),
            boat_counts,
            baseline: baseline.to_vec(),
            percent_difference,
        });
    }

    dedup_dates_by_min_distance(rows)
}

/// Keep one row per date, preferring the minimum summed distance.
fn dedup_dates_by_min_distance(rows: Vec<ImpactRow>) -> Vec<ImpactRow> {
    let mut best: FxHashMap<NaiveDate, ImpactRow> = FxHashMap::default();
    for row in rows {
        match best.get(&row.date) {
            Some(existing) if existing.total_distance() <= row.total_distance() => {}
            _ => {
                best.insert(row.date, row);
            }
        }
    }

    let mut rows: Vec<ImpactRow> = best.into_values().collect();
    rows.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.name.cmp(&b.name)));
    rows
}

/// Pre-fitted cubic regression coefficients, one optional set per ground.
/// Order: intercept, distance, mean storm speed, wind, wind², wind³.
#[derive(Debug, Clone)]
pub struct RegressionModel {
    pub coefficients: Vec<Option<[f64; 6]>>,
}

impl Default for RegressionModel {
    /// The production-fitted coefficient table. Grounds 4 and 5 were never
    /// modeled and stay unpredicted.
    fn default() -> Self {
        RegressionModel {
            coefficients: vec![
                Some([3.862524, -0.000233, -0.006981, -0.000301, 0.000157, -0.000001]),
                Some([2.824298, 0.000638, 0.001755, -0.014819, 0.000173, -0.000001]),
                Some([4.140008, 0.001268, -0.020501, -0.014269, 0.000184, -0.000001]),
                Some([4.216685, 0.000409, -0.002017, -0.010676, 0.000148, -0.000001]),
                None,
                None,
            ],
        }
    }
}

impl RegressionModel {
    /// Predicted boat count for one ground, or `None` when the ground is
    /// not modeled.
    pub fn predict(
        &self,
        ground_id: usize,
        distance_km: f64,
        mean_storm_speed: f64,
        wind: f64,
    ) -> Option<f64> {
        let b = self.coefficients.get(ground_id).copied().flatten()?;
        let log_boats = b[0]
            + b[1] * distance_km
            + b[2] * mean_storm_speed
            + b[3] * wind
            + b[4] * wind.powi(2)
            + b[5] * wind.powi(3);
        Some(log_boats.exp().round())
    }
}

/**
 * Build the nowcast impact table.
 *
 * Every cyclone gets a rolling baseline anchored at its first EEZ date;
 * cyclones without a usable baseline window are dropped entirely. Counts
 * are regression predictions, with unmodeled grounds reported as zero and
 * marked [UNMODELED] in the percentage column.
 */
pub fn nowcast_impact(
    distance_rows: &[CycloneDistanceRow],
    stats: &FxHashMap<(NaiveDate, String), StormDayStats>,
    model: &RegressionModel,
    reference: &ReferenceTable,
) -> Vec<ImpactRow> {
    // First EEZ date per cyclone anchors its baseline window.
    let mut starts: FxHashMap<&str, NaiveDate> = FxHashMap::default();
    for row in distance_rows {
        starts
            .entry(row.name.as_str())
            .and_modify(|d| *d = (*d).min(row.date))
            .or_insert(row.date);
    }

    let mut baselines: FxHashMap<&str, Vec<f64>> = FxHashMap::default();
    for (name, start) in &starts {
        if let Some(baseline) = nowcast_baseline(reference, name, *start) {
            baselines.insert(*name, baseline);
        }
    }

    let mut rows = Vec::new();
    for pivot in distance_rows {
        let Some(baseline) = baselines.get(pivot.name.as_str()) else {
            continue;
        };
        let day_stats = stats
            .get(&(pivot.date, pivot.name.clone()))
            .copied()
            .unwrap_or_default();

        let mut boat_counts = Vec::with_capacity(pivot.distances_km.len());
        let mut percent = Vec::with_capacity(pivot.distances_km.len());
        for (ground_id, distance_km) in pivot.distances_km.iter().enumerate() {
            match model.predict(
                ground_id,
                *distance_km,
                day_stats.mean_storm_speed,
                day_stats.max_wind,
            ) {
                Some(predicted) => {
                    let base = baseline.get(ground_id).copied().unwrap_or(0.0);
                    boat_counts.push(predicted);
                    percent.push(percent_difference(predicted, base));
                }
                None => {
                    warn!("ground {} is not modeled, no prediction for {}", ground_id, pivot.name);
                    boat_counts.push(0.0);
                    percent.push(UNMODELED.to_string());
                }
            }
        }

        rows.push(ImpactRow {
            name: pivot.name.clone(),
            date: pivot.date,
            mean_storm_speed: day_stats.mean_storm_speed,
            max_storm_speed: day_stats.max_storm_speed,
            max_wind: day_stats.max_wind,
            distances_km: pivot.distances_km.clone(),
            boat_counts,
            baseline: baseline.clone(),
            percent_difference: percent,
        });
    }

    rows.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.name.cmp(&b.name)));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 7, day).unwrap()
    }

    fn pivot(name: &str, day: u32, distances: Vec<f64>) -> CycloneDistanceRow {
        CycloneDistanceRow { date: date(day), name: name.to_string(), distances_km: distances }
    }

    #[test]
    fn percent_difference_formats() {
        assert_eq!(percent_difference(0.0, 0.0), "+0%");
        assert_eq!(percent_difference(5.0, 0.0), INFINITE_INCREASE);
        assert_eq!(percent_difference(40.0, 50.0), "-20.0%");
        assert_eq!(percent_difference(60.0, 50.0), "+20.0%");
    }

    #[test]
    fn storm_day_stats_aggregate_per_day() {
        let fix = |day: u32, hour: u32, speed: f64, wind: f64| CycloneTrackPoint {
            name: "MARIA".to_string(),
            lon: 125.0,
            lat: 13.0,
            timestamp: date(day).and_hms_opt(hour, 0, 0).unwrap(),
            wind,
            storm_speed: speed,
        };
        let stats = storm_day_stats(&[fix(1, 0, 10.0, 60.0), fix(1, 6, 20.0, 80.0), fix(2, 0, 5.0, 40.0)]);

        let day1 = stats[&(date(1), "MARIA".to_string())];
        assert!((day1.mean_storm_speed - 15.0).abs() < 1e-12);
        assert_eq!(day1.max_storm_speed, 20.0);
        assert_eq!(day1.max_wind, 80.0);
        assert_eq!(stats[&(date(2), "MARIA".to_string())].max_wind, 40.0);
    }

    #[test]
    fn duplicate_dates_keep_the_minimum_summed_distance() {
        let stats = FxHashMap::default();
        let mut counts = FxHashMap::default();
        counts.insert(date(1), vec![4_u32, 6]);

        let rows = historical_impact(
            &[
                pivot("FAR", 1, vec![200.0, 300.0]),
                pivot("NEAR", 1, vec![50.0, 80.0]),
            ],
            &stats,
            &counts,
            &[2.0, 3.0],
        );

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "NEAR");
        assert_eq!(rows[0].boat_counts, vec![4.0, 6.0]);
        assert_eq!(rows[0].percent_difference, vec!["+100.0%", "+100.0%"]);
    }

    #[test]
    fn missing_joins_fill_with_zero() {
        let stats = FxHashMap::default();
        let counts = FxHashMap::default();
        let rows = historical_impact(&[pivot("MARIA", 1, vec![50.0])], &stats, &counts, &[0.0]);

        assert_eq!(rows[0].mean_storm_speed, 0.0);
        assert_eq!(rows[0].boat_counts, vec![0.0]);
        assert_eq!(rows[0].percent_difference, vec!["+0%"]);
    }

    #[test]
    fn regression_predicts_rounded_counts_and_skips_unmodeled_grounds() {
        let model = RegressionModel::default();

        let predicted = model.predict(0, 100.0, 10.0, 90.0).unwrap();
        let log_boats = 3.862524 + (-0.000233) * 100.0 + (-0.006981) * 10.0 + (-0.000301) * 90.0
            + 0.000157 * 90.0_f64.powi(2) + (-0.000001) * 90.0_f64.powi(3);
        assert_eq!(predicted, log_boats.exp().round());

        assert!(model.predict(4, 100.0, 10.0, 90.0).is_none());
        assert!(model.predict(9, 100.0, 10.0, 90.0).is_none());
    }

    #[test]
    fn nowcast_drops_cyclones_without_a_baseline_window() {
        let start = NaiveDate::from_ymd_opt(2023, 5, 1).unwrap();
        let reference = ReferenceTable {
            dates: (0..10).map(|i| start + Duration::days(i)).collect(),
            counts: vec![vec![10.0]; 10],
        };

        let stats = FxHashMap::default();
        let model = RegressionModel::default();
        // MARIA starts 100 days after the reference table ends.
        let rows = nowcast_impact(
            &[pivot("MARIA", 31, vec![50.0])],
            &stats,
            &model,
            &reference,
        );
        assert!(rows.is_empty());
    }

    #[test]
    fn nowcast_marks_unmodeled_grounds() {
        let start = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        let reference = ReferenceTable {
            dates: (0..40).map(|i| start + Duration::days(i)).collect(),
            counts: vec![vec![10.0; 5]; 40],
        };

        let stats = FxHashMap::default();
        let model = RegressionModel::default();
        let rows = nowcast_impact(
            &[pivot("MARIA", 15, vec![50.0, 60.0, 70.0, 80.0, 90.0])],
            &stats,
            &model,
            &reference,
        );

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].percent_difference[4], UNMODELED);
        assert_eq!(rows[0].boat_counts[4], 0.0);
        assert_ne!(rows[0].percent_difference[0], UNMODELED);
    }
}
