/*!
 * Iso-contour extraction from a density grid by marching squares.
 *
 * Each grid cell contributes up to two line segments with endpoints
 * linearly interpolated onto the cell edges where the surface crosses the
 * threshold. Segments are then chained end to end into rings. Contours
 * that run off the edge of the grid come back as open polylines and are
 * closed during repair; anything with fewer than 3 distinct vertices is
 * discarded as noise.
 */

use geo::{LineString, Polygon};
use rustc_hash::FxHashMap;

use super::density::DensityGrid;

type Pt = (f64, f64);

/// Quantization for endpoint matching while chaining segments.
const CHAIN_SCALE: f64 = 1.0e9;

fn key(p: Pt) -> (i64, i64) {
    ((p.0 * CHAIN_SCALE).round() as i64, (p.1 * CHAIN_SCALE).round() as i64)
}

/// Interpolate the threshold crossing between two grid corners.
fn interp(threshold: f64, a: Pt, va: f64, b: Pt, vb: f64) -> Pt {
    if (vb - va).abs() < f64::EPSILON {
        return a;
    }
    let t = (threshold - va) / (vb - va);
    (a.0 + t * (b.0 - a.0), a.1 + t * (b.1 - a.1))
}

/// Marching-squares segments for every cell of the grid.
fn cell_segments(grid: &DensityGrid, threshold: f64) -> Vec<(Pt, Pt)> {
    let nx = grid.xs.len();
    let ny = grid.ys.len();
    let mut segments = Vec::new();

    for iy in 0..ny - 1 {
        for ix in 0..nx - 1 {
            let (x0, x1) = (grid.xs[ix], grid.xs[ix + 1]);
            let (y0, y1) = (grid.ys[iy], grid.ys[iy + 1]);

            let bl = grid.value(ix, iy);
            let br = grid.value(ix + 1, iy);
            let tr = grid.value(ix + 1, iy + 1);
            let tl = grid.value(ix, iy + 1);

            let mut case = 0u8;
            if bl >= threshold {
                case |= 1;
            }
            if br >= threshold {
                case |= 2;
            }
            if tr >= threshold {
                case |= 4;
            }
            if tl >= threshold {
                case |= 8;
            }
            if case == 0 || case == 15 {
                continue;
            }

            let bottom = || interp(threshold, (x0, y0), bl, (x1, y0), br);
            let right = || interp(threshold, (x1, y0), br, (x1, y1), tr);
            let top = || interp(threshold, (x0, y1), tl, (x1, y1), tr);
            let left = || interp(threshold, (x0, y0), bl, (x0, y1), tl);

            match case {
                1 | 14 => segments.push((left(), bottom())),
                2 | 13 => segments.push((bottom(), right())),
                3 | 12 => segments.push((left(), right())),
                4 | 11 => segments.push((top(), right())),
                6 | 9 => segments.push((bottom(), top())),
                7 | 8 => segments.push((left(), top())),
                5 | 10 => {
                    // Saddle cell. Disambiguate with the cell-center value.
                    let center_inside = (bl + br + tr + tl) / 4.0 >= threshold;
                    let diagonal_inside = case == 5;
                    if center_inside == diagonal_inside {
                        segments.push((bottom(), right()));
                        segments.push((left(), top()));
                    } else {
                        segments.push((left(), bottom()));
                        segments.push((top(), right()));
                    }
                }
                _ => unreachable!(),
            }
        }
    }

    segments
}

/// Chain loose segments into vertex rings by matching endpoints.
fn chain_segments(segments: &[(Pt, Pt)]) -> Vec<Vec<Pt>> {
    let mut adjacency: FxHashMap<(i64, i64), Vec<usize>> = FxHashMap::default();
    for (idx, (a, b)) in segments.iter().enumerate() {
        adjacency.entry(key(*a)).or_default().push(idx);
        adjacency.entry(key(*b)).or_default().push(idx);
    }

    let mut used = vec![false; segments.len()];
    let mut rings = Vec::new();

    for start in 0..segments.len() {
        if used[start] {
            continue;
        }
        used[start] = true;

        let (a, b) = segments[start];
        let mut chain = vec![a, b];

        // Walk forward from the tail, then backward from the head if the
        // contour turned out to be open in that direction.
        for forward in [true, false] {
            loop {
                let tip = if forward { *chain.last().unwrap() } else { chain[0] };
                let Some(candidates) = adjacency.get(&key(tip)) else {
                    break;
                };
                let Some(&next) = candidates.iter().find(|&&i| !used[i]) else {
                    break;
                };
                used[next] = true;

                let (na, nb) = segments[next];
                let other = if key(na) == key(tip) { nb } else { na };
                if forward {
                    chain.push(other);
                } else {
                    chain.insert(0, other);
                }
            }
        }

        rings.push(chain);
    }

    rings
}

/// Close a chain, drop duplicate consecutive vertices, and reject rings
/// that are too small to bound any area.
fn repair_ring(mut chain: Vec<Pt>) -> Option<Vec<Pt>> {
    chain.dedup_by(|a, b| key(*a) == key(*b));
    if chain.len() > 1 && key(chain[0]) == key(*chain.last().unwrap()) {
        chain.pop();
    }
    if chain.len() < 3 {
        return None;
    }
    Some(chain)
}

/// Extract candidate fishing-ground polygons at the given density threshold.
pub fn extract_contour_polygons(grid: &DensityGrid, threshold: f64) -> Vec<Polygon<f64>> {
    let segments = cell_segments(grid, threshold);

    chain_segments(&segments)
        .into_iter()
        .filter_map(repair_ring)
        .map(|ring| {
            let line: LineString<f64> = ring.into_iter().collect();
            Polygon::new(line, vec![])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Area, Contains, Point};

    /// A grid with a single radial bump centered in the middle.
    fn bump_grid(size: usize) -> DensityGrid {
        let xs: Vec<f64> = (0..size).map(|i| i as f64).collect();
        let ys = xs.clone();
        let center = (size - 1) as f64 / 2.0;
        let values = ys
            .iter()
            .map(|&y| {
                xs.iter()
                    .map(|&x| {
                        let d2 = (x - center).powi(2) + (y - center).powi(2);
                        (-d2 / (2.0 * center)).exp()
                    })
                    .collect()
            })
            .collect();
        DensityGrid { xs, ys, values }
    }

    #[test]
    fn single_bump_yields_one_closed_contour_around_the_peak() {
        let grid = bump_grid(21);
        let polygons = extract_contour_polygons(&grid, 0.5);

        assert_eq!(polygons.len(), 1);
        let polygon = &polygons[0];
        assert!(polygon.unsigned_area() > 0.0);
        assert!(polygon.contains(&Point::new(10.0, 10.0)));
        assert!(!polygon.contains(&Point::new(0.5, 0.5)));
    }

    #[test]
    fn flat_grid_below_threshold_yields_nothing() {
        let xs: Vec<f64> = (0..5).map(|i| i as f64).collect();
        let grid = DensityGrid {
            xs: xs.clone(),
            ys: xs,
            values: vec![vec![0.1; 5]; 5],
        };
        assert!(extract_contour_polygons(&grid, 0.5).is_empty());
    }

    #[test]
    fn degenerate_two_point_chains_are_discarded() {
        assert!(repair_ring(vec![(0.0, 0.0), (1.0, 0.0), (0.0, 0.0)]).is_none());
        assert!(repair_ring(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)]).is_some());
    }
}
