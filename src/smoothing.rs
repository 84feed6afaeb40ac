//! Penalized piecewise-geodesic spline fitting.
//!
//! For every penalty weight `lambda` the control points are refined by
//! block-coordinate Riemannian descent: each point in turn takes a gradient
//! step along the sphere, with a halving line search on the full objective.
//! After every sweep, interior points whose weighted jump has become
//! negligible are pruned together with their knots. Successive `lambda`
//! values start from the polygon left by the previous one, so the fitted
//! dimension never grows along the sweep.

use crate::gradient::objective_gradient;
use crate::knots::{DEFAULT_KNOT_TINY, equispaced_indices, knots_quantile};
use crate::penalty::{jump_energies, objective_unchecked, penalty};
use crate::sphere::{GeometryError, exp_map};
use crate::types::ControlPolygon;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Attempts per line search; the last candidate is taken even if it is worse.
const MAX_LINE_SEARCH_HALVINGS: usize = 100;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),
}

fn default_step_size() -> f64 {
    1.0
}

fn default_max_iter() -> usize {
    1000
}

fn default_epsilon_iter() -> f64 {
    1e-3
}

fn default_jump_eps() -> f64 {
    1e-4
}

/// Optimizer controls shared by every `lambda` of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplineFitOptions {
    /// Initial step of each line search.
    #[serde(default = "default_step_size")]
    pub step_size: f64,
    /// Outer sweeps per `lambda`.
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
    /// Convergence threshold on the change of the objective between sweeps.
    #[serde(default = "default_epsilon_iter")]
    pub epsilon_iter: f64,
    /// Interior points with weighted jump energy below this are pruned.
    #[serde(default = "default_jump_eps")]
    pub jump_eps: f64,
}

impl Default for SplineFitOptions {
    fn default() -> Self {
        Self {
            step_size: default_step_size(),
            max_iter: default_max_iter(),
            epsilon_iter: default_epsilon_iter(),
            jump_eps: default_jump_eps(),
        }
    }
}

impl SplineFitOptions {
    pub fn validate(&self) -> Result<(), FitError> {
        if !(self.step_size.is_finite() && self.step_size > 0.0) {
            return Err(FitError::InvalidInput(format!(
                "step_size must be positive and finite, got {}",
                self.step_size
            )));
        }
        if self.max_iter == 0 {
            return Err(FitError::InvalidInput("max_iter must be at least 1".to_string()));
        }
        if !(self.epsilon_iter.is_finite() && self.epsilon_iter > 0.0) {
            return Err(FitError::InvalidInput(format!(
                "epsilon_iter must be positive and finite, got {}",
                self.epsilon_iter
            )));
        }
        if !(self.jump_eps.is_finite() && self.jump_eps >= 0.0) {
            return Err(FitError::InvalidInput(format!(
                "jump_eps must be non-negative and finite, got {}",
                self.jump_eps
            )));
        }
        Ok(())
    }
}

/// Starting polygon of a fit. Explicit control points fix the dimension;
/// otherwise `dimension` rows of the data are taken at equal index spacing.
/// Missing knots are placed at quantiles of the observation times.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplineInit {
    pub control_points: Option<Array2<f64>>,
    pub dimension: Option<usize>,
    pub knots: Option<Array1<f64>>,
}

impl SplineInit {
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: Some(dimension),
            ..Self::default()
        }
    }

    pub fn from_control_points(control_points: Array2<f64>) -> Self {
        Self {
            control_points: Some(control_points),
            ..Self::default()
        }
    }

    pub fn knots(mut self, knots: Array1<f64>) -> Self {
        self.knots = Some(knots);
        self
    }
}

/// Final state for one `lambda`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitRecord {
    pub lambda: f64,
    pub control_points: Array2<f64>,
    pub knots: Array1<f64>,
    /// Fitted curve at the observation times.
    pub gamma: Array2<f64>,
    pub dimension: usize,
    pub loss: f64,
    pub penalty: f64,
    /// `loss + lambda * penalty`.
    pub objective: f64,
    pub bic: f64,
    pub iterations: usize,
    pub converged: bool,
}

impl FitRecord {
    pub fn polygon(&self) -> Result<ControlPolygon, GeometryError> {
        ControlPolygon::new(self.control_points.clone(), self.knots.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplineFitResult {
    pub fits: Vec<FitRecord>,
    pub bic_list: Vec<f64>,
    pub dimension_list: Vec<usize>,
}

impl SplineFitResult {
    /// Index of the smallest BIC; NaN entries are skipped and ties keep the
    /// first.
    pub fn best_index(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, &bic) in self.bic_list.iter().enumerate() {
            if bic.is_nan() {
                continue;
            }
            match best {
                Some((_, b)) if bic >= b => {}
                _ => best = Some((i, bic)),
            }
        }
        best.map(|(i, _)| i)
    }

    pub fn best_fit(&self) -> Option<&FitRecord> {
        self.best_index().and_then(|i| self.fits.get(i))
    }
}

/// `count` values log-spaced from `min` to `max`, both included.
pub fn lambda_grid(min: f64, max: f64, count: usize) -> Result<Vec<f64>, FitError> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max >= min) {
        return Err(FitError::InvalidInput(format!(
            "lambda grid needs 0 < min <= max, got [{min}, {max}]"
        )));
    }
    if count == 0 {
        return Err(FitError::InvalidInput("lambda grid needs at least one value".to_string()));
    }
    if count == 1 {
        return Ok(vec![min]);
    }
    let grid = Array1::linspace(min.ln(), max.ln(), count).mapv(f64::exp);
    let mut grid = grid.to_vec();
    // Pin the ends against exp/ln rounding.
    grid[0] = min;
    grid[count - 1] = max;
    Ok(grid)
}

fn validate_data(t: ArrayView1<'_, f64>, y: ArrayView2<'_, f64>) -> Result<(), FitError> {
    if y.ncols() != 3 {
        return Err(FitError::InvalidInput(format!(
            "observations must have 3 columns, got {}",
            y.ncols()
        )));
    }
    if y.nrows() == 0 {
        return Err(FitError::InvalidInput("no observations".to_string()));
    }
    if t.len() != y.nrows() {
        return Err(FitError::InvalidInput(format!(
            "{} time points for {} observations",
            t.len(),
            y.nrows()
        )));
    }
    if t.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(FitError::InvalidInput("times and observations must be finite".to_string()));
    }
    if let Some(i) = y.rows().into_iter().position(|row| row.dot(&row) == 0.0) {
        return Err(FitError::InvalidInput(format!(
            "observation {i} is the zero vector"
        )));
    }
    if let Some(i) = t.windows(2).into_iter().position(|w| w[1] < w[0]) {
        return Err(FitError::InvalidInput(format!(
            "time points must be non-decreasing (t[{}] > t[{}])",
            i,
            i + 1
        )));
    }
    Ok(())
}

fn validate_lambdas(lambdas: &[f64]) -> Result<(), FitError> {
    if lambdas.is_empty() {
        return Err(FitError::InvalidInput("at least one lambda is required".to_string()));
    }
    if let Some(bad) = lambdas.iter().find(|l| !(l.is_finite() && **l >= 0.0)) {
        return Err(FitError::InvalidInput(format!(
            "lambda values must be finite and non-negative, got {bad}"
        )));
    }
    Ok(())
}

fn initial_polygon(
    t: ArrayView1<'_, f64>,
    y: ArrayView2<'_, f64>,
    init: &SplineInit,
) -> Result<ControlPolygon, FitError> {
    let control_points = match (&init.control_points, init.dimension) {
        (Some(cp), dimension) => {
            if let Some(k) = dimension.filter(|&k| k != cp.nrows()) {
                return Err(FitError::InvalidInput(format!(
                    "dimension {k} disagrees with {} control points",
                    cp.nrows()
                )));
            }
            if cp.ncols() != 3 {
                return Err(FitError::InvalidInput(format!(
                    "control points must have 3 columns, got {}",
                    cp.ncols()
                )));
            }
            cp.clone()
        }
        (None, Some(k)) => y.select(Axis(0), &equispaced_indices(y.nrows(), k)),
        (None, None) => {
            return Err(FitError::InvalidInput(
                "either control points or a dimension is required".to_string(),
            ));
        }
    };
    let dimension = control_points.nrows();
    if dimension < 2 {
        return Err(FitError::InvalidInput(format!(
            "dimension must be at least 2, got {dimension}"
        )));
    }

    let knots = match &init.knots {
        Some(k) => k.clone(),
        None => knots_quantile(t, dimension, DEFAULT_KNOT_TINY)?,
    };
    if knots.len() != dimension {
        return Err(FitError::InvalidInput(format!(
            "{} knots for {dimension} control points",
            knots.len()
        )));
    }
    if knots.iter().any(|k| !k.is_finite())
        || knots.windows(2).into_iter().any(|w| !(w[1] > w[0]))
    {
        return Err(FitError::InvalidInput(
            "knots must be finite and strictly increasing".to_string(),
        ));
    }
    let (lo, hi) = (knots[0], knots[dimension - 1]);
    if let Some(bad) = t.iter().find(|&&ti| !(ti >= lo && ti < hi)) {
        return Err(FitError::InvalidInput(format!(
            "time {bad} lies outside the knot range [{lo}, {hi})"
        )));
    }

    Ok(ControlPolygon::new(control_points, knots)?)
}

/// `n ln(R) + 3 ln(n) K`. An exact fit has `R = 0`; it is floored at the
/// smallest positive double so the score stays finite and serializable.
fn bic_score(n: usize, objective: f64, dimension: usize) -> f64 {
    let n = n as f64;
    n * objective.max(f64::MIN_POSITIVE).ln() + 3.0 * n.ln() * dimension as f64
}

/// Drops interior points whose weighted jump energy is below `jump_eps`.
/// Returns the polygon to continue with and the number of removed points.
fn prune_flat_points(polygon: ControlPolygon, jump_eps: f64) -> (ControlPolygon, usize) {
    let remove: Vec<usize> = jump_energies(&polygon)
        .iter()
        .enumerate()
        .filter(|&(_, &e)| e < jump_eps)
        .map(|(i, _)| i + 1)
        .collect();
    if remove.is_empty() {
        return (polygon, 0);
    }
    let pruned = polygon.without_interior(&remove);
    (pruned, remove.len())
}

/// One block-coordinate pass: every control point in order takes a
/// line-searched step against its gradient. Returns the updated polygon and
/// its objective.
fn coordinate_sweep(
    t: ArrayView1<'_, f64>,
    y: ArrayView2<'_, f64>,
    mut polygon: ControlPolygon,
    mut current: f64,
    lambda: f64,
    step_size: f64,
) -> (ControlPolygon, f64) {
    for j in 0..polygon.dimension() {
        let grad = objective_gradient(t, y, &polygon, j, lambda);
        let mut step = step_size;
        for attempt in 1..=MAX_LINE_SEARCH_HALVINGS {
            let direction = &grad * (-step);
            let moved = exp_map(polygon.point(j), direction.view());
            let candidate = polygon.with_point(j, moved.view());
            let value = objective_unchecked(t, y, &candidate, lambda).total();
            if value <= current || attempt == MAX_LINE_SEARCH_HALVINGS {
                if value > current {
                    log::debug!(
                        "line search for point {} exhausted, accepting {:.6e} over {:.6e}",
                        j,
                        value,
                        current
                    );
                }
                polygon = candidate;
                current = value;
                break;
            }
            step *= 0.5;
        }
    }
    (polygon, current)
}

/// Fits one penalized piecewise geodesic per entry of `lambdas`, in order,
/// each warm-started from the previous result.
///
/// `t` must be sorted and lie in `[knots[0], knots[K - 1])`; `y` holds one
/// observation per row. Every input check runs before the first iteration.
/// Hitting `max_iter` is reported through `converged = false`, not as an
/// error.
pub fn penalized_linear_spherical_spline(
    t: ArrayView1<'_, f64>,
    y: ArrayView2<'_, f64>,
    init: &SplineInit,
    lambdas: &[f64],
    options: &SplineFitOptions,
) -> Result<SplineFitResult, FitError> {
    options.validate()?;
    validate_lambdas(lambdas)?;
    validate_data(t, y)?;
    let mut polygon = initial_polygon(t, y, init)?;

    let mut fits = Vec::with_capacity(lambdas.len());

    for &lambda in lambdas {
        let mut current = objective_unchecked(t, y, &polygon, lambda).total();
        let mut previous = f64::INFINITY;
        let mut iterations = 0;
        let mut converged = false;

        for iter in 1..=options.max_iter {
            iterations = iter;
            let (swept, _) = coordinate_sweep(t, y, polygon, current, lambda, options.step_size);
            polygon = swept;

            if lambda > 0.0 && polygon.dimension() > 2 {
                let (pruned, removed) = prune_flat_points(polygon, options.jump_eps);
                polygon = pruned;
                if removed > 0 {
                    log::debug!(
                        "lambda {:.4e} iteration {}: pruned {} point(s), dimension now {}",
                        lambda,
                        iter,
                        removed,
                        polygon.dimension()
                    );
                }
            }

            current = objective_unchecked(t, y, &polygon, lambda).total();
            log::debug!(
                "lambda {:.4e} iteration {}: objective {:.8e}, dimension {}",
                lambda,
                iter,
                current,
                polygon.dimension()
            );
            if (current - previous).abs() < options.epsilon_iter {
                converged = true;
                break;
            }
            previous = current;
        }

        if !converged {
            log::warn!(
                "lambda {:.4e} stopped after {} iterations without converging",
                lambda,
                options.max_iter
            );
        }

        let value = objective_unchecked(t, y, &polygon, lambda);
        let raw_penalty = penalty(&polygon);
        let dimension = polygon.dimension();
        let objective_value = value.total();
        let bic = bic_score(y.nrows(), objective_value, dimension);
        log::info!(
            "lambda {:.4e}: dimension {}, objective {:.6e}, BIC {:.4}, {} iterations",
            lambda,
            dimension,
            objective_value,
            bic,
            iterations
        );

        fits.push(FitRecord {
            lambda,
            control_points: polygon.control_points().to_owned(),
            knots: polygon.knots().to_owned(),
            gamma: polygon.evaluate(t),
            dimension,
            loss: value.loss,
            penalty: raw_penalty,
            objective: objective_value,
            bic,
            iterations,
            converged,
        });
    }

    let bic_list = fits.iter().map(|f| f.bic).collect();
    let dimension_list = fits.iter().map(|f| f.dimension).collect();
    Ok(SplineFitResult {
        fits,
        bic_list,
        dimension_list,
    })
}
