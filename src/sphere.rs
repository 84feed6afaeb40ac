use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use thiserror::Error;

/// Below this angle the ratio helpers switch to their Taylor limits.
const SMALL_ANGLE: f64 = 1e-6;

/// Floor applied to `sin(theta)` for nearly antipodal pairs, where the
/// minor arc stops being unique.
const ANTIPODAL_SIN_FLOOR: f64 = 1e-12;

/// Errors raised by the geometric building blocks of the spline engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error(
        "The provided knot vector is invalid: {0}. It must be strictly increasing and contain only finite values."
    )]
    InvalidKnotVector(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

#[inline]
pub fn safe_acos(x: f64) -> f64 {
    x.clamp(-1.0, 1.0).acos()
}

#[inline]
pub fn safe_asin(x: f64) -> f64 {
    x.clamp(-1.0, 1.0).asin()
}

#[inline]
pub fn dot(u: ArrayView1<'_, f64>, v: ArrayView1<'_, f64>) -> f64 {
    u.dot(&v)
}

pub fn cross(u: ArrayView1<'_, f64>, v: ArrayView1<'_, f64>) -> Array1<f64> {
    Array1::from_vec(vec![
        u[1] * v[2] - u[2] * v[1],
        u[2] * v[0] - u[0] * v[2],
        u[0] * v[1] - u[1] * v[0],
    ])
}

#[inline]
pub fn norm(u: ArrayView1<'_, f64>) -> f64 {
    u.dot(&u).sqrt()
}

/// Unit vector in the direction of `v`; the zero vector is returned unchanged.
pub fn normalize(v: ArrayView1<'_, f64>) -> Array1<f64> {
    let n = norm(v);
    if n == 0.0 { v.to_owned() } else { &v / n }
}

/// Row-wise [`normalize`] of an `n x d` array.
pub fn normalize_rows(x: ArrayView2<'_, f64>) -> Array2<f64> {
    let mut out = x.to_owned();
    for mut row in out.rows_mut() {
        let n = norm(row.view());
        if n > 0.0 {
            row /= n;
        }
    }
    out
}

/// Removes the component of `v` along the unit vector `p`.
pub fn project_tangent(p: ArrayView1<'_, f64>, v: ArrayView1<'_, f64>) -> Array1<f64> {
    let along = p.dot(&v);
    &v - &(&p * along)
}

/// Great-circle distance between the directions of `x` and `y`, in radians.
pub fn spherical_dist(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> f64 {
    let xn = normalize(x);
    let yn = normalize(y);
    safe_acos(xn.dot(&yn))
}

/// Exponential map on S²: walks from `x` along the tangent vector `v` for
/// arc length `|v|`.
pub fn exp_map(x: ArrayView1<'_, f64>, v: ArrayView1<'_, f64>) -> Array1<f64> {
    let base = normalize(x);
    let nv = norm(v);
    if nv == 0.0 {
        return base;
    }
    &base * nv.cos() + &(&v * (nv.sin() / nv))
}

#[inline]
fn floored_sin(theta: f64) -> f64 {
    theta.sin().max(ANTIPODAL_SIN_FLOOR)
}

/// `theta / sin(theta)`, equal to 1 at the origin.
#[inline]
pub(crate) fn theta_over_sin(theta: f64) -> f64 {
    if theta < SMALL_ANGLE {
        1.0 + theta * theta / 6.0
    } else {
        theta / floored_sin(theta)
    }
}

/// Derivative of `acos(v) / sqrt(1 - v^2)` with respect to `v`, written in
/// terms of `theta = acos(v)`: `(theta cos(theta) - sin(theta)) / sin^3(theta)`.
#[inline]
pub(crate) fn theta_over_sin_slope(theta: f64) -> f64 {
    if theta < SMALL_ANGLE {
        -1.0 / 3.0 - 2.0 * theta * theta / 15.0
    } else {
        let s = floored_sin(theta);
        (theta * theta.cos() - theta.sin()) / (s * s * s)
    }
}

/// Slerp weight `sin(s theta) / sin(theta)`; tends to `s` as `theta -> 0`.
#[inline]
pub(crate) fn slerp_weight(theta: f64, s: f64) -> f64 {
    if theta < SMALL_ANGLE {
        s
    } else {
        (s * theta).sin() / floored_sin(theta)
    }
}

/// Sensitivity of the slerp weight to the segment angle:
/// `(sin(s theta) cos(theta) - s cos(s theta) sin(theta)) / sin^3(theta)`.
#[inline]
pub(crate) fn slerp_weight_slope(theta: f64, s: f64) -> f64 {
    if theta < SMALL_ANGLE {
        (s * s * s - s) / 3.0
    } else {
        let st = floored_sin(theta);
        ((s * theta).sin() * theta.cos() - s * (s * theta).cos() * theta.sin()) / (st * st * st)
    }
}

pub(crate) fn require_columns(
    x: ArrayView2<'_, f64>,
    cols: usize,
    label: &str,
) -> Result<(), GeometryError> {
    if x.ncols() != cols {
        return Err(GeometryError::DimensionMismatch(format!(
            "{label} must have {cols} columns, but has {}",
            x.ncols()
        )));
    }
    Ok(())
}

pub(crate) fn require_point(p: ArrayView1<'_, f64>, label: &str) -> Result<(), GeometryError> {
    if p.len() != 3 {
        return Err(GeometryError::DimensionMismatch(format!(
            "{label} must be a 3-vector, but has length {}",
            p.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn safe_trig_clamps_out_of_domain_arguments() {
        assert_abs_diff_eq!(safe_acos(1.0 + 1e-12), 0.0, epsilon = 1e-15);
        assert_abs_diff_eq!(safe_acos(-1.5), std::f64::consts::PI, epsilon = 1e-15);
        assert_abs_diff_eq!(safe_asin(2.0), std::f64::consts::FRAC_PI_2, epsilon = 1e-15);
    }

    #[test]
    fn cross_of_basis_vectors() {
        let x = array![1.0, 0.0, 0.0];
        let y = array![0.0, 1.0, 0.0];
        let z = cross(x.view(), y.view());
        assert_abs_diff_eq!(z.as_slice().unwrap(), &[0.0, 0.0, 1.0][..], epsilon = 1e-15);
    }

    #[test]
    fn normalize_leaves_zero_vector_alone() {
        let z = array![0.0, 0.0, 0.0];
        assert_eq!(normalize(z.view()), z);
        let rows = normalize_rows(array![[3.0, 0.0, 4.0], [0.0, 0.0, 0.0]].view());
        assert_abs_diff_eq!(rows[[0, 0]], 0.6, epsilon = 1e-15);
        assert_abs_diff_eq!(rows[[0, 2]], 0.8, epsilon = 1e-15);
        assert_eq!(rows.row(1).sum(), 0.0);
    }

    #[test]
    fn exp_map_travels_along_great_circle() {
        let x = array![1.0, 0.0, 0.0];
        let v = array![0.0, std::f64::consts::FRAC_PI_2, 0.0];
        let out = exp_map(x.view(), v.view());
        assert_abs_diff_eq!(out.as_slice().unwrap(), &[0.0, 1.0, 0.0][..], epsilon = 1e-12);

        let still = exp_map(x.view(), array![0.0, 0.0, 0.0].view());
        assert_eq!(still, x);
    }

    #[test]
    fn spherical_dist_ignores_magnitude() {
        let x = array![2.0, 0.0, 0.0];
        let y = array![0.0, 0.0, 5.0];
        assert_abs_diff_eq!(
            spherical_dist(x.view(), y.view()),
            std::f64::consts::FRAC_PI_2,
            epsilon = 1e-15
        );
    }

    #[test]
    fn ratio_helpers_are_continuous_at_zero() {
        for &(exact, small) in &[
            (theta_over_sin(1e-3), theta_over_sin(1e-7)),
            (theta_over_sin_slope(1e-3), theta_over_sin_slope(1e-7)),
            (slerp_weight(1e-3, 0.3), slerp_weight(1e-7, 0.3)),
            (slerp_weight_slope(1e-3, 0.3), slerp_weight_slope(1e-7, 0.3)),
        ] {
            assert_abs_diff_eq!(exact, small, epsilon = 1e-5);
        }
    }

    #[test]
    fn project_tangent_removes_radial_part() {
        let p = array![0.0, 0.0, 1.0];
        let v = array![1.0, 2.0, 3.0];
        let t = project_tangent(p.view(), v.view());
        assert_abs_diff_eq!(t.dot(&p), 0.0, epsilon = 1e-15);
        assert_abs_diff_eq!(t[0], 1.0, epsilon = 1e-15);
    }
}
