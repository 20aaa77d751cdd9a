/*!
 * Cyclone-to-ground distances.
 *
 * For every day a named cyclone has track fixes, the distance from the
 * storm to each fishing ground is the minimum great-circle distance from
 * any of that day's fixes to the ground's centroid.
 */

use chrono::NaiveDate;
use rustc_hash::FxHashMap;

use crate::{
    geo::{great_circle_distance, round1},
    grounds::FishingGround,
    track::CycloneTrackPoint,
};

/// One row of the distance pivot: a (date, cyclone) pair with a distance
/// per ground, indexed by contour id.
#[derive(Debug, Clone, PartialEq)]
pub struct CycloneDistanceRow {
    pub date: NaiveDate,
    pub name: String,
    pub distances_km: Vec<f64>,
}

/**
 * Build the distance pivot from track fixes and fishing grounds.
 *
 * Every fix contributes a candidate distance to every ground, rounded to a
 * tenth of a kilometer; the pivot keeps the minimum per (date, cyclone,
 * ground). Rows come back sorted by (date, name). Empty inputs produce an
 * empty pivot.
 */
pub fn min_distances(
    points: &[CycloneTrackPoint],
    grounds: &[FishingGround],
) -> Vec<CycloneDistanceRow> {
    if points.is_empty() || grounds.is_empty() {
        return Vec::new();
    }

    let mut mins: FxHashMap<(NaiveDate, &str), Vec<f64>> = FxHashMap::default();
    for point in points {
        let row = mins
            .entry((point.date(), point.name.as_str()))
            .or_insert_with(|| vec![f64::INFINITY; grounds.len()]);
        for ground in grounds {
            let km = round1(great_circle_distance(
                point.lat,
                point.lon,
                ground.centroid.lat,
                ground.centroid.lon,
            ));
            if km < row[ground.contour_id] {
                row[ground.contour_id] = km;
            }
        }
    }

    let mut rows: Vec<CycloneDistanceRow> = mins
        .into_iter()
        .map(|((date, name), distances_km)| CycloneDistanceRow {
            date,
            name: name.to_string(),
            distances_km,
        })
        .collect();
    rows.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.name.cmp(&b.name)));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coord;
    use geo::{polygon, MultiPolygon};

    fn ground_at(contour_id: usize, lon: f64, lat: f64) -> FishingGround {
        let polygon = polygon![
            (x: lon - 0.1, y: lat - 0.1),
            (x: lon + 0.1, y: lat - 0.1),
            (x: lon + 0.1, y: lat + 0.1),
            (x: lon - 0.1, y: lat + 0.1),
            (x: lon - 0.1, y: lat - 0.1),
        ];
        FishingGround {
            contour_id,
            polygon: MultiPolygon::new(vec![polygon]),
            centroid: Coord { lat, lon },
        }
    }

    fn fix(name: &str, day: u32, hour: u32, lon: f64, lat: f64) -> CycloneTrackPoint {
        CycloneTrackPoint {
            name: name.to_string(),
            lon,
            lat,
            timestamp: NaiveDate::from_ymd_opt(2023, 7, day)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
            wind: 60.0,
            storm_speed: 10.0,
        }
    }

    #[test]
    fn empty_inputs_give_an_empty_pivot() {
        assert!(min_distances(&[], &[ground_at(0, 120.0, 10.0)]).is_empty());
        assert!(min_distances(&[fix("MARIA", 1, 0, 120.0, 10.0)], &[]).is_empty());
    }

    #[test]
    fn pivot_keeps_the_closest_fix_per_day() {
        let grounds = vec![ground_at(0, 120.0, 10.0)];
        // Two fixes on the same day, the second one closer to the ground.
        let points = vec![
            fix("MARIA", 1, 0, 120.0, 15.0),
            fix("MARIA", 1, 12, 120.0, 11.0),
        ];

        let rows = min_distances(&points, &grounds);
        assert_eq!(rows.len(), 1);
        // About one degree of latitude.
        assert!((rows[0].distances_km[0] - 111.2).abs() < 0.5);
    }

    #[test]
    fn rows_are_sorted_by_date_then_name() {
        let grounds = vec![ground_at(0, 120.0, 10.0)];
        let points = vec![
            fix("ZETA", 1, 0, 121.0, 10.0),
            fix("ALPHA", 2, 0, 121.0, 10.0),
            fix("ALPHA", 1, 0, 121.0, 10.0),
        ];

        let rows = min_distances(&points, &grounds);
        let keys: Vec<(NaiveDate, &str)> =
            rows.iter().map(|r| (r.date, r.name.as_str())).collect();
        assert_eq!(
            keys,
            vec![
                (NaiveDate::from_ymd_opt(2023, 7, 1).unwrap(), "ALPHA"),
                (NaiveDate::from_ymd_opt(2023, 7, 1).unwrap(), "ZETA"),
                (NaiveDate::from_ymd_opt(2023, 7, 2).unwrap(), "ALPHA"),
            ]
        );
    }

    #[test]
    fn distances_are_ordered_by_contour_id() {
        let grounds = vec![ground_at(0, 120.0, 10.0), ground_at(1, 125.0, 10.0)];
        let rows = min_distances(&[fix("MARIA", 1, 0, 120.0, 10.0)], &grounds);
        assert_eq!(rows[0].distances_km.len(), 2);
        assert!(rows[0].distances_km[0] < rows[0].distances_km[1]);
        assert_eq!(rows[0].distances_km[0], 0.0);
    }
}
