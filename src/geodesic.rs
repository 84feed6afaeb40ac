//! Great-circle interpolation and the piecewise-geodesic curve model.
//!
//! A piecewise geodesic is fully described by `K` control points and `K`
//! strictly increasing knots: on `[knots[j], knots[j + 1])` the curve runs
//! along the minor arc from `control_points[j]` to `control_points[j + 1]`
//! at constant speed.
//!
//! Every interval is half-open, including the last one. A time equal to the
//! final knot, or outside `[knots[0], knots[K - 1])`, has no curve point and
//! is dropped from the output. Results are emitted segment by segment, so the
//! output follows the input order only when `t` is sorted.

use crate::sphere::{GeometryError, normalize, require_columns, require_point, safe_acos};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Below this `sin(omega)` the endpoints are treated as coincident or
/// antipodal and the arc is replaced by a normalized chord.
const DEGENERATE_SIN: f64 = 1e-10;

/// Point at time `t` on the minor arc from `p` (time `a`) to `q` (time `b`).
///
/// The fractional position is clamped to `[0, 1]`, so times outside the
/// window return the nearer endpoint.
pub fn geodesic_point(
    t: f64,
    p: ArrayView1<'_, f64>,
    q: ArrayView1<'_, f64>,
    a: f64,
    b: f64,
) -> Array1<f64> {
    let p = normalize(p);
    let q = normalize(q);
    if !(b > a) {
        return p;
    }
    let s = ((t - a) / (b - a)).clamp(0.0, 1.0);
    slerp_unit(p.view(), q.view(), s)
}

/// Spherical linear interpolation between two unit vectors.
pub(crate) fn slerp_unit(p: ArrayView1<'_, f64>, q: ArrayView1<'_, f64>, s: f64) -> Array1<f64> {
    let omega = safe_acos(p.dot(&q));
    let sin_omega = omega.sin();
    let blended = if sin_omega < DEGENERATE_SIN {
        &p * (1.0 - s) + &(&q * s)
    } else {
        (&p * ((1.0 - s) * omega).sin() + &(&q * (s * omega).sin())) / sin_omega
    };
    let n = blended.dot(&blended).sqrt();
    if n < DEGENERATE_SIN {
        p.to_owned()
    } else {
        blended / n
    }
}

/// Vectorized [`geodesic_point`]: one row per entry of `t`, each computed
/// independently of the others.
pub fn geodesic(
    t: ArrayView1<'_, f64>,
    p: ArrayView1<'_, f64>,
    q: ArrayView1<'_, f64>,
    a: f64,
    b: f64,
) -> Result<Array2<f64>, GeometryError> {
    require_point(p, "geodesic start point")?;
    require_point(q, "geodesic end point")?;
    let mut out = Array2::<f64>::zeros((t.len(), 3));
    for (i, &ti) in t.iter().enumerate() {
        out.row_mut(i).assign(&geodesic_point(ti, p, q, a, b));
    }
    Ok(out)
}

/// Checks the shape and ordering contract shared by every consumer of a
/// control polygon.
pub fn validate_polygon(
    control_points: ArrayView2<'_, f64>,
    knots: ArrayView1<'_, f64>,
) -> Result<(), GeometryError> {
    require_columns(control_points, 3, "control points")?;
    if control_points.nrows() < 2 {
        return Err(GeometryError::InvalidInput(format!(
            "a piecewise geodesic needs at least 2 control points, got {}",
            control_points.nrows()
        )));
    }
    if knots.len() != control_points.nrows() {
        return Err(GeometryError::DimensionMismatch(format!(
            "{} knots were given for {} control points",
            knots.len(),
            control_points.nrows()
        )));
    }
    if knots.iter().any(|k| !k.is_finite()) {
        return Err(GeometryError::InvalidKnotVector(
            "knot vector contains a non-finite value".to_string(),
        ));
    }
    if let Some(j) = knots
        .windows(2)
        .into_iter()
        .position(|w| !(w[1] > w[0]))
    {
        return Err(GeometryError::InvalidKnotVector(format!(
            "knots[{}] = {} is not below knots[{}] = {}",
            j,
            knots[j],
            j + 1,
            knots[j + 1]
        )));
    }
    Ok(())
}

/// Evaluates the piecewise geodesic at every `t` inside
/// `[knots[0], knots[K - 1])`, segment by segment.
pub fn piecewise_geodesic(
    t: ArrayView1<'_, f64>,
    control_points: ArrayView2<'_, f64>,
    knots: ArrayView1<'_, f64>,
) -> Result<Array2<f64>, GeometryError> {
    validate_polygon(control_points, knots)?;
    Ok(piecewise_geodesic_unchecked(t, control_points, knots))
}

/// [`piecewise_geodesic`] without the polygon checks, for callers that hold a
/// validated [`crate::types::ControlPolygon`].
pub(crate) fn piecewise_geodesic_unchecked(
    t: ArrayView1<'_, f64>,
    control_points: ArrayView2<'_, f64>,
    knots: ArrayView1<'_, f64>,
) -> Array2<f64> {
    let k = control_points.nrows();
    let mut rows: Vec<f64> = Vec::with_capacity(3 * t.len());
    let mut count = 0usize;
    for j in 0..k - 1 {
        let (a, b) = (knots[j], knots[j + 1]);
        let p = normalize(control_points.row(j));
        let q = normalize(control_points.row(j + 1));
        for &ti in t.iter().filter(|&&ti| ti >= a && ti < b) {
            let point = slerp_unit(p.view(), q.view(), (ti - a) / (b - a));
            rows.extend(point.iter());
            count += 1;
        }
    }
    // Shape always matches the pushed buffer.
    Array2::from_shape_vec((count, 3), rows).unwrap_or_else(|_| Array2::zeros((0, 3)))
}

/// Index of the segment whose half-open interval contains `t`, if any.
pub(crate) fn segment_index(t: f64, knots: ArrayView1<'_, f64>) -> Option<usize> {
    let k = knots.len();
    if k < 2 || !(t >= knots[0] && t < knots[k - 1]) {
        return None;
    }
    // Last knot strictly greater than t, minus one.
    let upper = knots
        .as_slice()
        .map(|ks| ks.partition_point(|&kn| kn <= t))
        .unwrap_or_else(|| knots.iter().take_while(|&&kn| kn <= t).count());
    Some(upper - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use std::f64::consts::FRAC_1_SQRT_2;

    #[test]
    fn endpoints_are_exact() {
        let p = array![1.0, 0.0, 0.0];
        let q = array![0.0, 0.6, 0.8];
        let start = geodesic_point(0.0, p.view(), q.view(), 0.0, 1.0);
        let end = geodesic_point(1.0, p.view(), q.view(), 0.0, 1.0);
        assert_abs_diff_eq!(start.as_slice().unwrap(), p.as_slice().unwrap(), epsilon = 1e-14);
        assert_abs_diff_eq!(end.as_slice().unwrap(), q.as_slice().unwrap(), epsilon = 1e-14);
    }

    #[test]
    fn times_outside_window_clamp_to_endpoints() {
        let p = array![1.0, 0.0, 0.0];
        let q = array![0.0, 1.0, 0.0];
        let before = geodesic_point(-3.0, p.view(), q.view(), 0.0, 1.0);
        let after = geodesic_point(7.0, p.view(), q.view(), 0.0, 1.0);
        assert_abs_diff_eq!(before.as_slice().unwrap(), p.as_slice().unwrap(), epsilon = 1e-14);
        assert_abs_diff_eq!(after.as_slice().unwrap(), q.as_slice().unwrap(), epsilon = 1e-14);
    }

    #[test]
    fn coincident_endpoints_return_the_point() {
        let p = array![0.0, 0.0, 1.0];
        let mid = geodesic_point(0.4, p.view(), p.view(), 0.0, 1.0);
        assert_abs_diff_eq!(mid.as_slice().unwrap(), p.as_slice().unwrap(), epsilon = 1e-14);
    }

    #[test]
    fn antipodal_endpoints_stay_finite() {
        let p = array![1.0, 0.0, 0.0];
        let q = array![-1.0, 0.0, 0.0];
        for s in [0.0, 0.25, 0.5, 0.75] {
            let g = geodesic_point(s, p.view(), q.view(), 0.0, 1.0);
            assert!(g.iter().all(|v| v.is_finite()));
            assert_abs_diff_eq!(g.dot(&g), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn piecewise_drops_final_knot_time() {
        let cp = array![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let knots = array![0.0, 1.0];
        let t = array![0.0, 0.5, 1.0];
        let gamma = piecewise_geodesic(t.view(), cp.view(), knots.view()).unwrap();
        assert_eq!(gamma.nrows(), 2);
        assert_abs_diff_eq!(
            gamma.as_slice().unwrap(),
            &[1.0, 0.0, 0.0, FRAC_1_SQRT_2, FRAC_1_SQRT_2, 0.0][..],
            epsilon = 1e-12
        );
    }

    #[test]
    fn piecewise_output_follows_segment_order() {
        let cp = array![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let knots = array![0.0, 1.0, 2.0];
        // Second-segment time first in the input.
        let t = array![1.5, 0.5];
        let gamma = piecewise_geodesic(t.view(), cp.view(), knots.view()).unwrap();
        assert_abs_diff_eq!(gamma[[0, 1]], FRAC_1_SQRT_2, epsilon = 1e-12);
        assert_abs_diff_eq!(gamma[[0, 2]], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(gamma[[1, 2]], FRAC_1_SQRT_2, epsilon = 1e-12);
    }

    #[test]
    fn polygon_validation_rejects_bad_knots() {
        let cp = array![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let flat = array![0.0, 1.0, 1.0];
        assert!(matches!(
            validate_polygon(cp.view(), flat.view()),
            Err(GeometryError::InvalidKnotVector(_))
        ));
        let short = array![0.0, 1.0];
        assert!(matches!(
            validate_polygon(cp.view(), short.view()),
            Err(GeometryError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn segment_lookup_matches_half_open_rule() {
        let knots = array![0.0, 1.0, 3.0];
        assert_eq!(segment_index(0.0, knots.view()), Some(0));
        assert_eq!(segment_index(0.999, knots.view()), Some(0));
        assert_eq!(segment_index(1.0, knots.view()), Some(1));
        assert_eq!(segment_index(3.0, knots.view()), None);
        assert_eq!(segment_index(-0.1, knots.view()), None);
    }
}
