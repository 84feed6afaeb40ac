#![deny(dead_code)]
#![deny(unused_imports)]

pub mod coords;
pub mod geodesic;
pub mod gradient;
pub mod knots;
pub mod penalty;
pub mod smoothing;
pub mod sphere;
pub mod types;

pub use coords::{
    cartesian_to_latlon_degrees, cartesian_to_spherical, edp, latlon_degrees_to_cartesian,
    spherical_to_cartesian,
};
pub use geodesic::{geodesic, geodesic_point, piecewise_geodesic, validate_polygon};
pub use gradient::{loss_gradient, objective_gradient, penalty_gradient};
pub use knots::{DEFAULT_KNOT_TINY, equispaced_indices, knots_quantile};
pub use penalty::{
    ObjectiveValue, calculate_loss, jump_energies, jump_linear, jump_weights, objective, penalty,
};
pub use smoothing::{
    FitError, FitRecord, SplineFitOptions, SplineFitResult, SplineInit, lambda_grid,
    penalized_linear_spherical_spline,
};
pub use sphere::{
    GeometryError, cross, dot, exp_map, norm, normalize, normalize_rows, project_tangent,
    safe_acos, safe_asin, spherical_dist,
};
pub use types::ControlPolygon;
