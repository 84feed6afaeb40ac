//! Closed-form Riemannian gradients of the loss and the jump penalty with
//! respect to a single control point.
//!
//! All gradients are first formed in R³ and then projected onto the tangent
//! plane at the control point, which gives the Riemannian gradient on S² for
//! the embedded metric.

use crate::geodesic::{segment_index, slerp_unit};
use crate::penalty::{JumpTerm, jump_term, penalty};
use crate::sphere::{
    project_tangent, safe_acos, slerp_weight, slerp_weight_slope, theta_over_sin,
    theta_over_sin_slope,
};
use crate::types::ControlPolygon;
use ndarray::{Array1, ArrayView1, ArrayView2};

/// Which end of a segment the differentiated control point sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentEnd {
    Start,
    End,
}

/// `J^T y` for the geodesic `gamma(s)` from `p` to `q`, differentiated with
/// respect to the chosen endpoint.
///
/// With `R_s = sin(s theta) / sin(theta)` and `Q_s` its angle sensitivity:
/// `J_p^T y = R_{1-s} y + q (Q_{1-s} <p, y> + Q_s <q, y>)` and
/// `J_q^T y = R_s y + p (Q_s <q, y> + Q_{1-s} <p, y>)`.
fn segment_jacobian_t(
    p: ArrayView1<'_, f64>,
    q: ArrayView1<'_, f64>,
    s: f64,
    end: SegmentEnd,
    y: ArrayView1<'_, f64>,
) -> Array1<f64> {
    let theta = safe_acos(p.dot(&q));
    let q_s = slerp_weight_slope(theta, s);
    let q_1s = slerp_weight_slope(theta, 1.0 - s);
    let scalar = q_1s * p.dot(&y) + q_s * q.dot(&y);
    match end {
        SegmentEnd::Start => &y * slerp_weight(theta, 1.0 - s) + &(&q * scalar),
        SegmentEnd::End => &y * slerp_weight(theta, s) + &(&p * scalar),
    }
}

/// Riemannian gradient of `1/2 sum_i dist(y_i, gamma(t_i))^2` at control
/// point `index`.
///
/// Observations on the segment ending at the point enter through the end
/// Jacobian, those on the segment starting there through the start Jacobian.
pub fn loss_gradient(
    t: ArrayView1<'_, f64>,
    y: ArrayView2<'_, f64>,
    polygon: &ControlPolygon,
    index: usize,
) -> Array1<f64> {
    let knots = polygon.knots();
    let k = polygon.dimension();
    let target = polygon.point(index);
    let mut total = Array1::<f64>::zeros(3);

    for (i, &ti) in t.iter().enumerate() {
        let Some(seg) = segment_index(ti, knots) else {
            continue;
        };
        let end = if index > 0 && seg == index - 1 {
            SegmentEnd::End
        } else if index + 1 < k && seg == index {
            SegmentEnd::Start
        } else {
            continue;
        };
        let p = polygon.point(seg);
        let q = polygon.point(seg + 1);
        let s = (ti - knots[seg]) / (knots[seg + 1] - knots[seg]);
        let gamma = slerp_unit(p, q, s);

        let yi = y.row(i);
        let y_norm = yi.dot(&yi).sqrt();
        if y_norm == 0.0 {
            continue;
        }
        let yi = &yi / y_norm;
        let phi = safe_acos(yi.dot(&gamma));
        let jt_y = segment_jacobian_t(p, q, s, end, yi.view());
        let tangent = project_tangent(target, jt_y.view());
        total.scaled_add(-theta_over_sin(phi), &tangent);
    }
    total
}

/// Role of the differentiated point inside one jump term `d(p1, p2, p3)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JumpRole {
    /// The point is `p1`: the jump centred one step ahead.
    Trailing,
    /// The point is `p2`: its own jump.
    Centre,
    /// The point is `p3`: the jump centred one step behind.
    Leading,
}

/// `J^T d` for a jump term differentiated with respect to one of its three
/// points. With `c' = h(theta1) / delta1`, `a' = h(theta2) / delta2` and
/// `h(theta) = (theta cos(theta) - sin(theta)) / sin^3(theta)`:
///
/// - `J_p1^T d = c d + p2 <c' (p1 - u p2) - c p2, d>`
/// - `J_p3^T d = a d + p2 <a' (p3 - v p2) - a p2, d>`
/// - `J_p2^T d = -(a v + c u) d + p3 <a' (p3 - v p2) - a p2, d>
///               + p1 <c' (p1 - u p2) - c p2, d>`
fn jump_jacobian_t(
    term: &JumpTerm,
    p1: ArrayView1<'_, f64>,
    p2: ArrayView1<'_, f64>,
    p3: ArrayView1<'_, f64>,
    role: JumpRole,
    d: ArrayView1<'_, f64>,
) -> Array1<f64> {
    let c_slope = theta_over_sin_slope(term.theta1) / term.delta1;
    let a_slope = theta_over_sin_slope(term.theta2) / term.delta2;
    // <c' (p1 - u p2) - c p2, d> and <a' (p3 - v p2) - a p2, d>
    let back = c_slope * (p1.dot(&d) - term.u * p2.dot(&d)) - term.c * p2.dot(&d);
    let ahead = a_slope * (p3.dot(&d) - term.v * p2.dot(&d)) - term.a * p2.dot(&d);
    match role {
        JumpRole::Trailing => &d * term.c + &(&p2 * back),
        JumpRole::Leading => &d * term.a + &(&p2 * ahead),
        JumpRole::Centre => {
            &d * (-(term.a * term.v + term.c * term.u)) + &(&p3 * ahead) + &(&p1 * back)
        }
    }
}

/// Riemannian gradient of `sqrt(sum_j |w_j d_j|^2)` at control point
/// `index`. Up to three jump terms involve a given point; endpoints and
/// their neighbours see fewer. Zero when the penalty itself vanishes.
pub fn penalty_gradient(polygon: &ControlPolygon, index: usize) -> Array1<f64> {
    let k = polygon.dimension();
    let mut total = Array1::<f64>::zeros(3);
    if k < 3 {
        return total;
    }
    let value = penalty(polygon);
    if value <= f64::MIN_POSITIVE {
        return total;
    }

    let cases = [
        (index + 1, JumpRole::Trailing),
        (index, JumpRole::Centre),
        (index.wrapping_sub(1), JumpRole::Leading),
    ];
    for (centre, role) in cases {
        if centre == 0 || centre >= k - 1 {
            continue;
        }
        let term = jump_term(polygon, centre);
        let (p1, p2, p3) = (
            polygon.point(centre - 1),
            polygon.point(centre),
            polygon.point(centre + 1),
        );
        let d = term.jump(p1, p2, p3);
        let w = term.weight();
        let jt_d = jump_jacobian_t(&term, p1, p2, p3, role, d.view());
        total.scaled_add(w * w, &jt_d);
    }

    let target = polygon.point(index);
    project_tangent(target, total.view()) / value
}

/// Gradient of `loss + lambda * penalty` at control point `index`.
pub fn objective_gradient(
    t: ArrayView1<'_, f64>,
    y: ArrayView2<'_, f64>,
    polygon: &ControlPolygon,
    index: usize,
    lambda: f64,
) -> Array1<f64> {
    let mut grad = loss_gradient(t, y, polygon, index);
    if lambda > 0.0 && polygon.num_interior() > 0 {
        grad.scaled_add(lambda, &penalty_gradient(polygon, index));
    }
    grad
}
