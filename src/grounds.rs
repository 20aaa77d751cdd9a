/*!
 * Fishing-ground polygons and where they come from.
 *
 * A fishing ground is a polygon where boats concentrate on days without a
 * cyclone nearby. Grounds are either estimated from the density of the
 * season's detections or loaded from a precomputed set supplied with the
 * run; the [GroundSource] trait is the seam between the two.
 */

use chrono::NaiveDate;
use geo::{Area, BooleanOps, Contains, Intersects, MultiPolygon, Point, Polygon};
use log::{info, warn};
use rustc_hash::FxHashSet;

use crate::{
    detection::BoatDetection,
    error::{Error, StormFishResult},
    geo::{multipolygon_centroid, Coord},
};

mod contour;
mod density;

pub use contour::extract_contour_polygons;
pub use density::{evaluate_density, percentile};

/// Grid resolution for density estimation, per axis.
pub const DENSITY_GRID_SIZE: usize = 100;

/// Density percentile above which a grid cell counts as a fishing ground.
pub const DENSITY_PERCENTILE: f64 = 90.0;

/// One merged fishing ground.
#[derive(Debug, Clone)]
pub struct FishingGround {
    /// Stable id within a run, contiguous from 0 in merge order.
    pub contour_id: usize,
    pub polygon: MultiPolygon<f64>,
    pub centroid: Coord,
}

impl FishingGround {
    /// Whether a point lies strictly inside this ground.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        self.polygon.contains(&Point::new(lon, lat))
    }
}

/// Where a run's fishing grounds come from.
pub trait GroundSource {
    fn grounds(&self, detections: &[BoatDetection]) -> StormFishResult<Vec<FishingGround>>;
}

/// Estimate grounds from the density surface of the supplied detections.
pub struct EstimateFromDensity;

/// Use a precomputed ground set as-is, ignoring the detections.
pub struct LoadPrecomputed {
    pub grounds: Vec<FishingGround>,
}

impl GroundSource for EstimateFromDensity {
    fn grounds(&self, detections: &[BoatDetection]) -> StormFishResult<Vec<FishingGround>> {
        estimate_grounds(detections)
    }
}

impl GroundSource for LoadPrecomputed {
    fn grounds(&self, _detections: &[BoatDetection]) -> StormFishResult<Vec<FishingGround>> {
        if self.grounds.is_empty() {
            return Err(Error::EmptyResult(
                "precomputed fishing-ground set is empty".to_string(),
            ));
        }
        validate_contour_ids(&self.grounds)?;
        Ok(self.grounds.clone())
    }
}

/// Contour ids index per-ground vectors everywhere downstream, so they must
/// be exactly 0..len in order.
pub fn validate_contour_ids(grounds: &[FishingGround]) -> StormFishResult<()> {
    for (idx, ground) in grounds.iter().enumerate() {
        if ground.contour_id != idx {
            return Err(Error::DataValidation(format!(
                "fishing-ground contour ids must be contiguous from 0, found {} at position {}",
                ground.contour_id, idx
            )));
        }
    }
    Ok(())
}

/// Detections usable for ground estimation: cyclone-absent days, eastern
/// hemisphere positions only.
pub fn estimation_inputs(
    detections: &[BoatDetection],
    cyclone_dates: &FxHashSet<NaiveDate>,
) -> Vec<BoatDetection> {
    detections
        .iter()
        .filter(|d| d.lon > 0.0 && !cyclone_dates.contains(&d.date()))
        .copied()
        .collect()
}

/// A polygon sane enough to attempt a boolean union with.
fn union_safe(polygon: &MultiPolygon<f64>) -> bool {
    polygon.unsigned_area() > 0.0
        && polygon
            .iter()
            .flat_map(|p| p.exterior().coords())
            .all(|c| c.x.is_finite() && c.y.is_finite())
}

/**
 * Merge overlapping candidate polygons into disjoint fishing grounds.
 *
 * One pass over the candidates in extraction order: each candidate is
 * unioned into the first already-merged ground it intersects, otherwise it
 * starts a new ground. A union that cannot be computed is logged and the
 * candidate kept separate rather than failing the run.
 */
pub fn merge_candidates(candidates: Vec<Polygon<f64>>) -> StormFishResult<Vec<FishingGround>> {
    let mut merged: Vec<MultiPolygon<f64>> = Vec::new();

    'next: for candidate in candidates {
        let candidate = MultiPolygon::new(vec![candidate]);
        for existing in merged.iter_mut() {
            if existing.intersects(&candidate) {
                if union_safe(existing) && union_safe(&candidate) {
                    *existing = existing.union(&candidate);
                    continue 'next;
                }
                warn!("skipping unmergeable fishing-ground polygons: {}",
                    Error::Geometry("degenerate polygon in union".to_string()));
            }
        }
        merged.push(candidate);
    }

    merged
        .into_iter()
        .enumerate()
        .map(|(contour_id, polygon)| {
            let centroid = multipolygon_centroid(&polygon)?;
            Ok(FishingGround { contour_id, polygon, centroid })
        })
        .collect()
}

/// Full estimation pipeline: density surface, threshold, contours, merge.
pub fn estimate_grounds(detections: &[BoatDetection]) -> StormFishResult<Vec<FishingGround>> {
    if detections.is_empty() {
        return Err(Error::EmptyResult(
            "no detections available for fishing-ground estimation".to_string(),
        ));
    }

    let points: Vec<(f64, f64)> = detections.iter().map(|d| (d.lon, d.lat)).collect();
    let grid = evaluate_density(&points, DENSITY_GRID_SIZE)?;
    let threshold = percentile(&grid.flat_values(), DENSITY_PERCENTILE);

    let candidates = extract_contour_polygons(&grid, threshold);
    if candidates.is_empty() {
        return Err(Error::EmptyResult(
            "density surface produced no contour polygons".to_string(),
        ));
    }

    let grounds = merge_candidates(candidates)?;
    info!(
        "estimated {} fishing grounds from {} detections",
        grounds.len(),
        detections.len()
    );
    Ok(grounds)
}

/// Assign each detection to the ground that contains it, if any.
pub fn ground_for_detection(grounds: &[FishingGround], detection: &BoatDetection) -> Option<usize> {
    grounds
        .iter()
        .find(|g| g.contains(detection.lon, detection.lat))
        .map(|g| g.contour_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use geo::polygon;

    fn square(x0: f64, y0: f64, side: f64) -> Polygon<f64> {
        polygon![
            (x: x0, y: y0),
            (x: x0 + side, y: y0),
            (x: x0 + side, y: y0 + side),
            (x: x0, y: y0 + side),
            (x: x0, y: y0),
        ]
    }

    #[test]
    fn overlapping_candidates_merge_into_one_ground() {
        let candidates = vec![square(0.0, 0.0, 2.0), square(1.0, 0.0, 2.0), square(10.0, 10.0, 1.0)];
        let grounds = merge_candidates(candidates).unwrap();

        assert_eq!(grounds.len(), 2);
        assert_eq!(grounds[0].contour_id, 0);
        assert_eq!(grounds[1].contour_id, 1);

        // The merged ground covers both source squares.
        assert!(grounds[0].contains(0.5, 0.5));
        assert!(grounds[0].contains(2.5, 0.5));
        assert!(grounds[1].contains(10.5, 10.5));
    }

    #[test]
    fn merged_grounds_are_disjoint() {
        let candidates = vec![square(0.0, 0.0, 2.0), square(1.0, 1.0, 2.0), square(5.0, 5.0, 2.0)];
        let grounds = merge_candidates(candidates).unwrap();
        for a in &grounds {
            for b in &grounds {
                if a.contour_id != b.contour_id {
                    assert!(!a.polygon.intersects(&b.polygon));
                }
            }
        }
    }

    #[test]
    fn merging_is_idempotent_for_disjoint_inputs() {
        let candidates = vec![square(0.0, 0.0, 1.0), square(5.0, 0.0, 1.0)];
        let grounds = merge_candidates(candidates.clone()).unwrap();
        assert_eq!(grounds.len(), candidates.len());
    }

    #[test]
    fn estimation_inputs_drop_cyclone_days_and_western_longitudes() {
        let day = |d: u32| NaiveDate::from_ymd_opt(2023, 7, d).unwrap();
        let det = |lon: f64, d: u32| BoatDetection {
            lon,
            lat: 10.0,
            timestamp: day(d).and_hms_opt(1, 0, 0).unwrap(),
            quality_flag: 1,
        };

        let mut cyclone_dates = FxHashSet::default();
        cyclone_dates.insert(day(2));

        let kept = estimation_inputs(&[det(120.0, 1), det(120.0, 2), det(-120.0, 1)], &cyclone_dates);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].date(), day(1));
    }

    #[test]
    fn spatial_join_uses_strict_containment() {
        let grounds = merge_candidates(vec![square(0.0, 0.0, 2.0)]).unwrap();
        let at = |lon: f64, lat: f64| BoatDetection {
            lon,
            lat,
            timestamp: NaiveDate::from_ymd_opt(2023, 7, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            quality_flag: 1,
        };

        assert_eq!(ground_for_detection(&grounds, &at(1.0, 1.0)), Some(0));
        assert_eq!(ground_for_detection(&grounds, &at(5.0, 5.0)), None);
        // Boundary points are not within the ground.
        assert_eq!(ground_for_detection(&grounds, &at(0.0, 1.0)), None);
    }

    #[test]
    fn precomputed_grounds_with_gapped_ids_are_rejected() {
        let mut grounds = merge_candidates(vec![square(0.0, 0.0, 1.0)]).unwrap();
        grounds[0].contour_id = 5;

        let source = LoadPrecomputed { grounds };
        let err = source.grounds(&[]).unwrap_err();
        assert!(matches!(err, Error::DataValidation(_)));

        let valid = LoadPrecomputed {
            grounds: merge_candidates(vec![square(0.0, 0.0, 1.0), square(5.0, 0.0, 1.0)]).unwrap(),
        };
        assert_eq!(valid.grounds(&[]).unwrap().len(), 2);
    }
}
