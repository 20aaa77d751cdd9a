/*!
 * Gaussian kernel density estimation on a regular grid.
 *
 * The estimator matches the classic Scott's-rule KDE: the bandwidth matrix
 * is the full 2-D sample covariance of the data scaled by n^(-1/3)
 * (n^(-1/(d+4)) squared for d = 2), and the density is evaluated on a
 * regular grid spanning the bounding box of the data.
 */

use crate::error::{Error, StormFishResult};

/// A regular density grid in data coordinates.
#[derive(Debug, Clone)]
pub struct DensityGrid {
    /// Grid x coordinates, ascending, both endpoints included.
    pub xs: Vec<f64>,
    /// Grid y coordinates, ascending, both endpoints included.
    pub ys: Vec<f64>,
    /// Density values indexed as `values[iy][ix]`.
    pub values: Vec<Vec<f64>>,
}

impl DensityGrid {
    pub fn value(&self, ix: usize, iy: usize) -> f64 {
        self.values[iy][ix]
    }

    /// All grid values flattened, for threshold selection.
    pub fn flat_values(&self) -> Vec<f64> {
        self.values.iter().flatten().copied().collect()
    }
}

/// Unbiased 2-D sample covariance: (sxx, sxy, syy).
fn sample_covariance(points: &[(f64, f64)]) -> (f64, f64, f64) {
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut syy = 0.0;
    for &(x, y) in points {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }
    let denom = n - 1.0;
    (sxx / denom, sxy / denom, syy / denom)
}

fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    if num == 1 {
        return vec![start];
    }
    let step = (stop - start) / (num - 1) as f64;
    (0..num).map(|i| start + step * i as f64).collect()
}

/**
 * Evaluate a Scott's-rule Gaussian KDE of the points on a `grid_size` ×
 * `grid_size` grid spanning their bounding box.
 *
 * Fails with [Error::DataValidation] when there are too few points or the
 * point cloud is degenerate (singular covariance), since no meaningful
 * density surface exists in either case.
 */
pub fn evaluate_density(points: &[(f64, f64)], grid_size: usize) -> StormFishResult<DensityGrid> {
    if points.len() < 3 {
        return Err(Error::DataValidation(format!(
            "density estimation needs at least 3 points, got {}",
            points.len()
        )));
    }

    let n = points.len() as f64;
    let (sxx, sxy, syy) = sample_covariance(points);

    // Scott's rule for d = 2: factor = n^(-1/6), bandwidth = cov * factor^2.
    let factor2 = n.powf(-1.0 / 3.0);
    let h_xx = sxx * factor2;
    let h_xy = sxy * factor2;
    let h_yy = syy * factor2;

    let det = h_xx * h_yy - h_xy * h_xy;
    if !(det > 0.0) || !det.is_finite() {
        return Err(Error::DataValidation(
            "degenerate point cloud, density covariance is singular".to_string(),
        ));
    }

    // Inverse of the 2x2 bandwidth matrix.
    let inv_xx = h_yy / det;
    let inv_xy = -h_xy / det;
    let inv_yy = h_xx / det;
    let norm = 1.0 / (n * 2.0 * std::f64::consts::PI * det.sqrt());

    let min_x = points.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let max_x = points.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
    let min_y = points.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
    let max_y = points.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);

    let xs = linspace(min_x, max_x, grid_size);
    let ys = linspace(min_y, max_y, grid_size);

    let mut values = Vec::with_capacity(grid_size);
    for &gy in &ys {
        let mut row = Vec::with_capacity(grid_size);
        for &gx in &xs {
            let mut sum = 0.0;
            for &(px, py) in points {
                let dx = gx - px;
                let dy = gy - py;
                let quad = dx * dx * inv_xx + 2.0 * dx * dy * inv_xy + dy * dy * inv_yy;
                sum += (-0.5 * quad).exp();
            }
            row.push(norm * sum);
        }
        values.push(row);
    }

    Ok(DensityGrid { xs, ys, values })
}

/// Linear-interpolation percentile over unsorted values, `q` in 0..=100.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    debug_assert!(!values.is_empty());
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_interpolates_linearly() {
        let values = vec![4.0, 1.0, 3.0, 2.0];
        assert!((percentile(&values, 0.0) - 1.0).abs() < 1e-12);
        assert!((percentile(&values, 100.0) - 4.0).abs() < 1e-12);
        assert!((percentile(&values, 50.0) - 2.5).abs() < 1e-12);
        assert!((percentile(&values, 90.0) - 3.7).abs() < 1e-12);
    }

    #[test]
    fn density_peaks_near_the_data() {
        let mut points = Vec::new();
        for i in 0..10 {
            for j in 0..10 {
                points.push((i as f64 * 0.1, j as f64 * 0.1));
            }
        }
        points.push((5.0, 5.0));

        let grid = evaluate_density(&points, 50).unwrap();
        let flat = grid.flat_values();
        assert!(flat.iter().all(|v| v.is_finite() && *v >= 0.0));

        // The cluster near the origin should be much denser than the lone
        // outlier corner.
        let near_cluster = grid.value(0, 0);
        let near_outlier = grid.value(49, 49);
        assert!(near_cluster > near_outlier);
    }

    #[test]
    fn too_few_points_is_rejected() {
        let err = evaluate_density(&[(0.0, 0.0), (1.0, 1.0)], 10).unwrap_err();
        assert!(matches!(err, Error::DataValidation(_)));
    }

    #[test]
    fn collinear_points_are_rejected() {
        let points: Vec<(f64, f64)> = (0..10).map(|i| (i as f64, 0.0)).collect();
        let err = evaluate_density(&points, 10).unwrap_err();
        assert!(matches!(err, Error::DataValidation(_)));
    }
}
