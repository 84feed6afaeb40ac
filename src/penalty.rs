//! Data-fit loss and the jump roughness penalty of a piecewise geodesic.

use crate::sphere::{GeometryError, require_columns, safe_acos, spherical_dist, theta_over_sin};
use crate::types::ControlPolygon;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

#[derive(Default, Clone, Copy)]
pub(crate) struct KahanSum {
    sum: f64,
    c: f64,
}

impl KahanSum {
    pub(crate) fn add(&mut self, value: f64) {
        let y = value - self.c;
        let t = self.sum + y;
        self.c = (t - self.sum) - y;
        self.sum = t;
    }

    pub(crate) fn sum(self) -> f64 {
        self.sum
    }
}

/// Half the sum of squared geodesic residuals between paired rows of `y` and
/// `gamma`.
pub fn calculate_loss(
    y: ArrayView2<'_, f64>,
    gamma: ArrayView2<'_, f64>,
) -> Result<f64, GeometryError> {
    require_columns(y, 3, "observations")?;
    require_columns(gamma, 3, "curve points")?;
    if y.nrows() != gamma.nrows() {
        return Err(GeometryError::DimensionMismatch(format!(
            "{} observations but {} curve points",
            y.nrows(),
            gamma.nrows()
        )));
    }
    Ok(loss_unchecked(y, gamma))
}

pub(crate) fn loss_unchecked(y: ArrayView2<'_, f64>, gamma: ArrayView2<'_, f64>) -> f64 {
    let mut acc = KahanSum::default();
    for (yi, gi) in y.rows().into_iter().zip(gamma.rows()) {
        let d = spherical_dist(yi, gi);
        acc.add(d * d);
    }
    0.5 * acc.sum()
}

/// Coefficients of one interior jump term, shared with the gradient code.
///
/// For neighbours `p1, p2, p3` and knot gaps `delta1, delta2` the jump is
/// `a (p3 - v p2) + c (p1 - u p2)` with `u = <p1, p2>`, `v = <p2, p3>`,
/// `a = theta2 / (sin(theta2) delta2)` and `c = theta1 / (sin(theta1) delta1)`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct JumpTerm {
    pub u: f64,
    pub v: f64,
    pub theta1: f64,
    pub theta2: f64,
    pub delta1: f64,
    pub delta2: f64,
    pub a: f64,
    pub c: f64,
}

impl JumpTerm {
    pub(crate) fn new(
        p1: ArrayView1<'_, f64>,
        p2: ArrayView1<'_, f64>,
        p3: ArrayView1<'_, f64>,
        delta1: f64,
        delta2: f64,
    ) -> Self {
        let u = p1.dot(&p2).clamp(-1.0, 1.0);
        let v = p2.dot(&p3).clamp(-1.0, 1.0);
        let theta1 = safe_acos(u);
        let theta2 = safe_acos(v);
        Self {
            u,
            v,
            theta1,
            theta2,
            delta1,
            delta2,
            a: theta_over_sin(theta2) / delta2,
            c: theta_over_sin(theta1) / delta1,
        }
    }

    /// Jump vector `a p3 - (a cos(theta2) + c cos(theta1)) p2 + c p1`.
    pub(crate) fn jump(
        &self,
        p1: ArrayView1<'_, f64>,
        p2: ArrayView1<'_, f64>,
        p3: ArrayView1<'_, f64>,
    ) -> Array1<f64> {
        let mid = self.a * self.v + self.c * self.u;
        &p3 * self.a - &(&p2 * mid) + &(&p1 * self.c)
    }

    /// Average of the two adjacent knot gaps.
    pub(crate) fn weight(&self) -> f64 {
        0.5 * (self.delta1 + self.delta2)
    }
}

pub(crate) fn jump_term(polygon: &ControlPolygon, j: usize) -> JumpTerm {
    let knots = polygon.knots();
    JumpTerm::new(
        polygon.point(j - 1),
        polygon.point(j),
        polygon.point(j + 1),
        knots[j] - knots[j - 1],
        knots[j + 1] - knots[j],
    )
}

/// One jump 3-vector per interior control point (`K - 2` rows).
pub fn jump_linear(
    control_points: ArrayView2<'_, f64>,
    knots: ArrayView1<'_, f64>,
) -> Result<Array2<f64>, GeometryError> {
    let polygon = ControlPolygon::new(control_points.to_owned(), knots.to_owned())?;
    Ok(jumps_of(&polygon))
}

pub(crate) fn jumps_of(polygon: &ControlPolygon) -> Array2<f64> {
    let m = polygon.num_interior();
    let mut out = Array2::<f64>::zeros((m, 3));
    for j in 1..=m {
        let term = jump_term(polygon, j);
        let d = term.jump(polygon.point(j - 1), polygon.point(j), polygon.point(j + 1));
        out.row_mut(j - 1).assign(&d);
    }
    out
}

/// Knot-spacing weights `((k[j+1] - k[j]) + (k[j] - k[j-1])) / 2` for the
/// interior knots.
pub fn jump_weights(knots: ArrayView1<'_, f64>) -> Array1<f64> {
    let k = knots.len();
    if k < 3 {
        return Array1::zeros(0);
    }
    Array1::from_iter((1..k - 1).map(|j| 0.5 * (knots[j + 1] - knots[j - 1])))
}

/// Weighted jump energy `|w_j d_j|^2` of each interior point.
pub fn jump_energies(polygon: &ControlPolygon) -> Array1<f64> {
    let jumps = jumps_of(polygon);
    let weights = jump_weights(polygon.knots());
    Array1::from_iter(
        jumps
            .rows()
            .into_iter()
            .zip(weights.iter())
            .map(|(d, &w)| w * w * d.dot(&d)),
    )
}

/// Roughness `sqrt(sum_j |w_j d_j|^2)`; zero without interior points.
pub fn penalty(polygon: &ControlPolygon) -> f64 {
    if polygon.num_interior() == 0 {
        return 0.0;
    }
    let mut acc = KahanSum::default();
    for &e in jump_energies(polygon).iter() {
        acc.add(e);
    }
    acc.sum().sqrt()
}

/// Loss and penalty of a polygon against the observations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectiveValue {
    pub loss: f64,
    pub penalty: f64,
    pub lambda: f64,
}

impl ObjectiveValue {
    pub fn total(&self) -> f64 {
        self.loss + self.lambda * self.penalty
    }
}

/// `loss + lambda * penalty`, with the penalty skipped for `lambda == 0` or
/// when no interior point exists.
///
/// Every `t` must lie in `[knots[0], knots[K - 1])` and `t` must be sorted so
/// that curve rows pair with observation rows.
pub fn objective(
    t: ArrayView1<'_, f64>,
    y: ArrayView2<'_, f64>,
    polygon: &ControlPolygon,
    lambda: f64,
) -> Result<ObjectiveValue, GeometryError> {
    require_columns(y, 3, "observations")?;
    if t.len() != y.nrows() {
        return Err(GeometryError::DimensionMismatch(format!(
            "{} time points for {} observations",
            t.len(),
            y.nrows()
        )));
    }
    if t.windows(2).into_iter().any(|w| !(w[1] >= w[0])) {
        return Err(GeometryError::InvalidInput("time points must be sorted".to_string()));
    }
    let knots = polygon.knots();
    let (lo, hi) = (knots[0], knots[knots.len() - 1]);
    if let Some(bad) = t.iter().find(|&&ti| !(ti >= lo && ti < hi)) {
        return Err(GeometryError::InvalidInput(format!(
            "time {bad} lies outside the knot range [{lo}, {hi})"
        )));
    }
    Ok(objective_unchecked(t, y, polygon, lambda))
}

/// [`objective`] for inputs the fitter has already validated.
pub(crate) fn objective_unchecked(
    t: ArrayView1<'_, f64>,
    y: ArrayView2<'_, f64>,
    polygon: &ControlPolygon,
    lambda: f64,
) -> ObjectiveValue {
    let gamma = polygon.evaluate(t);
    let loss = loss_unchecked(y, gamma.view());
    let penalty = if lambda > 0.0 && polygon.num_interior() > 0 {
        penalty(polygon)
    } else {
        0.0
    };
    ObjectiveValue {
        loss,
        penalty,
        lambda,
    }
}
