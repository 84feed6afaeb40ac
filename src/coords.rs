use crate::sphere::{GeometryError, require_columns, require_point};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use std::f64::consts::TAU;

/// Cartesian rows `(x, y, z)` to `(theta, phi)` rows, with inclination
/// `theta` in `[0, pi]` measured from `+z` and azimuth `phi` in `[0, 2 pi)`.
/// A zero row is read as lying on the unit sphere.
pub fn cartesian_to_spherical(x: ArrayView2<'_, f64>) -> Result<Array2<f64>, GeometryError> {
    require_columns(x, 3, "cartesian coordinates")?;
    let mut out = Array2::<f64>::zeros((x.nrows(), 2));
    for (i, row) in x.rows().into_iter().enumerate() {
        let (theta, phi) = point_to_spherical(row);
        out[[i, 0]] = theta;
        out[[i, 1]] = phi;
    }
    Ok(out)
}

/// `(theta, phi)` rows to unit Cartesian rows.
pub fn spherical_to_cartesian(
    theta_phi: ArrayView2<'_, f64>,
) -> Result<Array2<f64>, GeometryError> {
    require_columns(theta_phi, 2, "spherical coordinates")?;
    let mut out = Array2::<f64>::zeros((theta_phi.nrows(), 3));
    for (i, row) in theta_phi.rows().into_iter().enumerate() {
        let (theta, phi) = (row[0], row[1]);
        let sin_theta = theta.sin();
        out[[i, 0]] = sin_theta * phi.cos();
        out[[i, 1]] = sin_theta * phi.sin();
        out[[i, 2]] = theta.cos();
    }
    Ok(out)
}

fn point_to_spherical(p: ArrayView1<'_, f64>) -> (f64, f64) {
    let r = p.dot(&p).sqrt();
    let r = if r == 0.0 { 1.0 } else { r };
    let theta = (p[2] / r).clamp(-1.0, 1.0).acos();
    let phi = p[1].atan2(p[0]).rem_euclid(TAU);
    // rem_euclid can round up to exactly 2 pi for tiny negative angles.
    let phi = if phi >= TAU { 0.0 } else { phi };
    (theta, phi)
}

/// Equal-distance projection of a single point onto the plane tangent at the
/// north pole: the result has length equal to the polar angle.
pub fn edp(p: ArrayView1<'_, f64>) -> Result<Array1<f64>, GeometryError> {
    require_point(p, "projected point")?;
    let (theta, phi) = point_to_spherical(p);
    Ok(Array1::from_vec(vec![theta * phi.cos(), theta * phi.sin()]))
}

/// `(latitude, longitude)` rows in degrees to unit Cartesian rows.
pub fn latlon_degrees_to_cartesian(
    lat_lon: ArrayView2<'_, f64>,
) -> Result<Array2<f64>, GeometryError> {
    require_columns(lat_lon, 2, "latitude/longitude coordinates")?;
    let mut spherical = Array2::<f64>::zeros((lat_lon.nrows(), 2));
    for (i, row) in lat_lon.rows().into_iter().enumerate() {
        spherical[[i, 0]] = (90.0 - row[0]).to_radians();
        spherical[[i, 1]] = row[1].to_radians().rem_euclid(TAU);
    }
    spherical_to_cartesian(spherical.view())
}

/// Unit Cartesian rows to `(latitude, longitude)` rows in degrees, with
/// longitude folded into `(-180, 180]`.
pub fn cartesian_to_latlon_degrees(x: ArrayView2<'_, f64>) -> Result<Array2<f64>, GeometryError> {
    let mut out = cartesian_to_spherical(x)?;
    for mut row in out.rows_mut() {
        let lat = 90.0 - row[0].to_degrees();
        let mut lon = row[1].to_degrees();
        if lon > 180.0 {
            lon -= 360.0;
        }
        row[0] = lat;
        row[1] = lon;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn spherical_round_trip_on_generic_point() {
        let theta_phi = array![[PI / 4.0, PI / 3.0], [PI / 6.0, 5.0 * PI / 4.0]];
        let xyz = spherical_to_cartesian(theta_phi.view()).unwrap();
        for row in xyz.rows() {
            assert_abs_diff_eq!(row.dot(&row), 1.0, epsilon = 1e-12);
        }
        let back = cartesian_to_spherical(xyz.view()).unwrap();
        assert_abs_diff_eq!(
            back.as_slice().unwrap(),
            theta_phi.as_slice().unwrap(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn azimuth_is_wrapped_into_positive_range() {
        let xyz = array![[0.0, -1.0, 0.0]];
        let sph = cartesian_to_spherical(xyz.view()).unwrap();
        assert_abs_diff_eq!(sph[[0, 0]], FRAC_PI_2, epsilon = 1e-15);
        assert_abs_diff_eq!(sph[[0, 1]], 3.0 * FRAC_PI_2, epsilon = 1e-15);
    }

    #[test]
    fn zero_row_is_read_as_unit_radius() {
        let sph = cartesian_to_spherical(array![[0.0, 0.0, 0.0]].view()).unwrap();
        assert_abs_diff_eq!(sph[[0, 0]], FRAC_PI_2, epsilon = 1e-15);
        assert_eq!(sph[[0, 1]], 0.0);
    }

    #[test]
    fn wrong_width_is_rejected() {
        let err = cartesian_to_spherical(array![[1.0, 0.0]].view()).unwrap_err();
        assert!(matches!(err, GeometryError::DimensionMismatch(_)));
        let err = spherical_to_cartesian(array![[1.0, 0.0, 0.0]].view()).unwrap_err();
        assert!(matches!(err, GeometryError::DimensionMismatch(_)));
    }

    #[test]
    fn edp_preserves_polar_distance() {
        let p = array![1.0, 0.0, 0.0];
        let proj = edp(p.view()).unwrap();
        assert_abs_diff_eq!(proj[0], FRAC_PI_2, epsilon = 1e-15);
        assert_abs_diff_eq!(proj[1], 0.0, epsilon = 1e-15);
        let north = edp(array![0.0, 0.0, 1.0].view()).unwrap();
        assert_abs_diff_eq!(north.dot(&north), 0.0, epsilon = 1e-15);
    }

    #[test]
    fn latlon_round_trip() {
        let ll = array![[45.0, -120.0], [-10.0, 30.0]];
        let xyz = latlon_degrees_to_cartesian(ll.view()).unwrap();
        let back = cartesian_to_latlon_degrees(xyz.view()).unwrap();
        assert_abs_diff_eq!(back.as_slice().unwrap(), ll.as_slice().unwrap(), epsilon = 1e-10);
    }
}
