use crate::geodesic::{piecewise_geodesic_unchecked, validate_polygon};
use crate::sphere::{GeometryError, normalize};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Control points and their knots, kept in lock-step.
///
/// Invariants: at least two rows, three columns, one strictly increasing finite
/// knot per control point. Control points are stored normalized. Updates
/// return a new polygon so a trial step never aliases the committed state.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlPolygon {
    control_points: Array2<f64>,
    knots: Array1<f64>,
}

impl ControlPolygon {
    pub fn new(control_points: Array2<f64>, knots: Array1<f64>) -> Result<Self, GeometryError> {
        validate_polygon(control_points.view(), knots.view())?;
        if control_points.iter().any(|v| !v.is_finite()) {
            return Err(GeometryError::InvalidInput(
                "control points contain a non-finite coordinate".to_string(),
            ));
        }
        let mut control_points = control_points;
        for mut row in control_points.rows_mut() {
            let unit = normalize(row.view());
            if unit.dot(&unit) == 0.0 {
                return Err(GeometryError::InvalidInput(
                    "control points must be non-zero vectors".to_string(),
                ));
            }
            row.assign(&unit);
        }
        Ok(Self {
            control_points,
            knots,
        })
    }

    /// Number of control points `K`.
    pub fn dimension(&self) -> usize {
        self.knots.len()
    }

    pub fn num_interior(&self) -> usize {
        self.dimension().saturating_sub(2)
    }

    pub fn control_points(&self) -> ArrayView2<'_, f64> {
        self.control_points.view()
    }

    pub fn knots(&self) -> ArrayView1<'_, f64> {
        self.knots.view()
    }

    pub fn point(&self, j: usize) -> ArrayView1<'_, f64> {
        self.control_points.row(j)
    }

    /// Copy of this polygon with control point `j` replaced by the direction
    /// of `point`.
    pub fn with_point(&self, j: usize, point: ArrayView1<'_, f64>) -> Self {
        let mut next = self.clone();
        let unit = normalize(point);
        if unit.dot(&unit) > 0.0 {
            next.control_points.row_mut(j).assign(&unit);
        }
        next
    }

    /// New polygon without the listed interior points (indices into the
    /// control points, so `1..=K-2`). Endpoints are never removed; repeated or
    /// out-of-range indices are ignored.
    pub fn without_interior(&self, remove: &[usize]) -> Self {
        let k = self.dimension();
        let keep: Vec<usize> = (0..k)
            .filter(|&j| j == 0 || j == k - 1 || !remove.contains(&j))
            .collect();
        Self {
            control_points: self.control_points.select(Axis(0), &keep),
            knots: self.knots.select(Axis(0), &keep),
        }
    }

    /// Curve evaluated at `t` under the half-open segment rule.
    pub fn evaluate(&self, t: ArrayView1<'_, f64>) -> Array2<f64> {
        piecewise_geodesic_unchecked(t, self.control_points.view(), self.knots.view())
    }
}
