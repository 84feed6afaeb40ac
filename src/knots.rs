use crate::sphere::GeometryError;
use ndarray::{Array1, ArrayView1};

/// Boundary offset that keeps the extreme observation times strictly inside
/// the half-open knot range.
pub const DEFAULT_KNOT_TINY: f64 = 1e-5;

/// Nearest-rank quantile with rounding on sorted `values`:
/// `values[clamp(floor(n p + 0.5), 1, n) - 1]`.
fn quantile_nearest_rank(values: &[f64], p: f64) -> f64 {
    let n = values.len();
    let h = (n as f64 * p + 0.5).floor() as isize;
    let h = h.clamp(1, n as isize) as usize;
    values[h - 1]
}

/// Knot vector of length `max(dimension, 2)` for the times `t`.
///
/// Boundary knots sit `tiny` outside the data range. The `dimension - 2`
/// interior knots are quantiles at `k / (m + 1)` of the distinct times with
/// the minimum and maximum left out; with fewer than three distinct times all
/// of them are used instead. Repeated quantiles are kept, which leaves a
/// non-increasing vector when `t` has too few distinct values for the
/// requested dimension.
pub fn knots_quantile(
    t: ArrayView1<'_, f64>,
    dimension: usize,
    tiny: f64,
) -> Result<Array1<f64>, GeometryError> {
    if t.is_empty() {
        return Err(GeometryError::InvalidInput(
            "knot placement needs at least one time point".to_string(),
        ));
    }
    if t.iter().any(|v| !v.is_finite()) {
        return Err(GeometryError::InvalidInput("time points must be finite".to_string()));
    }

    let mut distinct: Vec<f64> = t.to_vec();
    distinct.sort_by(|a, b| a.total_cmp(b));
    distinct.dedup();

    let lo = distinct[0];
    let hi = distinct[distinct.len() - 1];
    let number_interior = dimension.max(2) - 2;

    let mut knots = Vec::with_capacity(number_interior + 2);
    knots.push(lo - tiny);
    if number_interior > 0 {
        let middle: &[f64] = if distinct.len() > 2 {
            &distinct[1..distinct.len() - 1]
        } else {
            &distinct
        };
        let denom = (number_interior + 1) as f64;
        knots.extend(
            (1..=number_interior).map(|k| quantile_nearest_rank(middle, k as f64 / denom)),
        );
    }
    knots.push(hi + tiny);
    Ok(Array1::from_vec(knots))
}

/// Zero-based row indices `floor(linspace(1, n, dimension) - 1)` used to seed
/// control points from the observations.
pub fn equispaced_indices(n: usize, dimension: usize) -> Vec<usize> {
    if n == 0 || dimension == 0 {
        return Vec::new();
    }
    if dimension == 1 {
        return vec![0];
    }
    let step = (n as f64 - 1.0) / (dimension as f64 - 1.0);
    (0..dimension)
        .map(|i| {
            let position = 1.0 + step * i as f64;
            ((position - 1.0).floor().max(0.0) as usize).min(n - 1)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn two_knots_bracket_the_data() {
        let t = array![3.0, 1.0, 2.0, 2.0, 8.0];
        let knots = knots_quantile(t.view(), 2, DEFAULT_KNOT_TINY).unwrap();
        assert_abs_diff_eq!(
            knots.as_slice().unwrap(),
            &[1.0 - 1e-5, 8.0 + 1e-5][..],
            epsilon = 1e-15
        );
        // dimension below two is promoted.
        let knots = knots_quantile(t.view(), 0, 0.5).unwrap();
        assert_eq!(knots.to_vec(), vec![0.5, 8.5]);
    }

    #[test]
    fn interior_knots_use_nearest_rank_quantiles() {
        let t = Array1::from_iter((0..10).map(|i| i as f64));
        // Interior values 1..=8 (n = 8); p = 1/3, 2/3 -> h = floor(3.17) = 3, floor(5.83) = 5.
        let knots = knots_quantile(t.view(), 4, 0.0).unwrap();
        assert_eq!(knots.to_vec(), vec![0.0, 3.0, 5.0, 9.0]);
    }

    #[test]
    fn duplicate_times_are_ignored() {
        let t = array![0.0, 0.0, 1.0, 1.0, 2.0, 2.0, 3.0, 4.0];
        // Distinct interior values 1, 2, 3; p = 1/2 -> h = floor(2.0) = 2.
        let knots = knots_quantile(t.view(), 3, 0.0).unwrap();
        assert_eq!(knots.to_vec(), vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn sparse_times_fall_back_to_all_distinct_values() {
        let t = array![0.0, 1.0];
        let knots = knots_quantile(t.view(), 3, 1e-5).unwrap();
        assert_eq!(knots.len(), 3);
        assert_eq!(knots[1], 0.0);
    }

    #[test]
    fn empty_times_are_rejected() {
        let t = Array1::<f64>::zeros(0);
        assert!(matches!(
            knots_quantile(t.view(), 3, 1e-5),
            Err(GeometryError::InvalidInput(_))
        ));
    }

    #[test]
    fn equispaced_indices_cover_both_ends() {
        assert_eq!(equispaced_indices(10, 4), vec![0, 3, 6, 9]);
        assert_eq!(equispaced_indices(5, 2), vec![0, 4]);
        assert_eq!(equispaced_indices(3, 1), vec![0]);
    }
}
