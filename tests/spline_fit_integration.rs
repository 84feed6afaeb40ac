use approx::assert_abs_diff_eq;
use ndarray::{Array1, Array2, array};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;
use spheresmooth::{
    FitError, GeometryError, SplineFitOptions, SplineFitResult, SplineInit, knots_quantile,
    lambda_grid, normalize, penalized_linear_spherical_spline, piecewise_geodesic,
};

/// Noisy samples of a path that runs along the equator and then turns north.
fn corner_path(n: usize, seed: u64) -> (Array1<f64>, Array2<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let truth = array![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.6, 0.8]];
    let knots = array![0.0, 1.0, 2.0 + 1e-9];
    let mut t = Array1::from_iter((0..n).map(|_| rng.random_range(0.0..2.0)));
    t.as_slice_mut().unwrap().sort_by(f64::total_cmp);
    let clean = piecewise_geodesic(t.view(), truth.view(), knots.view()).unwrap();
    let noise = Normal::new(0.0, 0.02).unwrap();
    let mut y = clean;
    for mut row in y.rows_mut() {
        for v in row.iter_mut() {
            *v += rng.sample(noise);
        }
        let unit = normalize(row.view());
        row.assign(&unit);
    }
    (t, y)
}

fn quick_options() -> SplineFitOptions {
    SplineFitOptions {
        max_iter: 200,
        ..SplineFitOptions::default()
    }
}

#[test]
fn sweep_records_one_fit_per_lambda_with_shrinking_dimension() {
    let (t, y) = corner_path(80, 3);
    let lambdas = lambda_grid(1e-4, 1.0, 6).unwrap();
    let result = penalized_linear_spherical_spline(
        t.view(),
        y.view(),
        &SplineInit::with_dimension(8),
        &lambdas,
        &quick_options(),
    )
    .unwrap();

    assert_eq!(result.fits.len(), lambdas.len());
    assert_eq!(result.bic_list.len(), lambdas.len());
    assert_eq!(result.dimension_list.len(), lambdas.len());
    assert!(result.dimension_list[0] <= 8);
    for pair in result.dimension_list.windows(2) {
        assert!(pair[1] <= pair[0], "dimensions {:?}", result.dimension_list);
    }

    for (fit, &lambda) in result.fits.iter().zip(lambdas.iter()) {
        assert_eq!(fit.lambda, lambda);
        assert_eq!(fit.gamma.nrows(), t.len());
        assert_eq!(fit.control_points.nrows(), fit.dimension);
        assert_eq!(fit.knots.len(), fit.dimension);
        for row in fit.control_points.rows() {
            assert_abs_diff_eq!(row.dot(&row), 1.0, epsilon = 1e-10);
        }
        assert!(fit.bic.is_finite());
    }

    let best = result.best_fit().unwrap();
    assert!(best.loss / (t.len() as f64) < 0.01, "mean loss {}", best.loss);
}

#[test]
fn explicit_initialization_is_respected() {
    let (t, y) = corner_path(40, 8);
    let knots = knots_quantile(t.view(), 4, 1e-5).unwrap();
    let cp = array![
        [1.0, 0.0, 0.0],
        [0.7, 0.7, 0.0],
        [0.0, 1.0, 0.1],
        [0.0, 0.6, 0.8]
    ];
    let init = SplineInit::from_control_points(cp).knots(knots.clone());
    let result =
        penalized_linear_spherical_spline(t.view(), y.view(), &init, &[0.0], &quick_options())
            .unwrap();
    let fit = &result.fits[0];
    assert_eq!(fit.dimension, 4);
    assert_eq!(fit.knots, knots);
}

#[test]
fn degenerate_control_point_surfaces_as_geometry_error() {
    let (t, y) = corner_path(20, 1);
    let init = SplineInit::from_control_points(array![[0.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
    let err = penalized_linear_spherical_spline(t.view(), y.view(), &init, &[0.1], &quick_options())
        .unwrap_err();
    assert!(matches!(
        err,
        FitError::Geometry(GeometryError::InvalidInput(_))
    ));
}

#[test]
fn times_outside_explicit_knots_are_rejected() {
    let (t, y) = corner_path(20, 4);
    let init = SplineInit::with_dimension(3).knots(array![0.5, 1.0, 1.5]);
    let err = penalized_linear_spherical_spline(t.view(), y.view(), &init, &[0.1], &quick_options())
        .unwrap_err();
    assert!(matches!(err, FitError::InvalidInput(_)));
}

#[test]
fn result_round_trips_through_json() {
    let (t, y) = corner_path(30, 6);
    let result = penalized_linear_spherical_spline(
        t.view(),
        y.view(),
        &SplineInit::with_dimension(4),
        &[1e-3, 1e-2],
        &quick_options(),
    )
    .unwrap();
    let payload = serde_json::to_string(&result).unwrap();
    let back: SplineFitResult = serde_json::from_str(&payload).unwrap();
    assert_eq!(back.dimension_list, result.dimension_list);
    assert_eq!(back.best_index(), result.best_index());
    let polygon = back.fits[0].polygon().unwrap();
    assert_eq!(polygon.dimension(), result.fits[0].dimension);
}
