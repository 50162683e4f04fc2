use crate::core::grid_align::validate_raster;
use crate::types::{Field, Raster, SlideResult, METERS_PER_DEGREE_LAT, METERS_PER_DEGREE_LON};
use ndarray::{s, Array2, Zip};

/// Slope and aspect derived from one elevation raster (degrees)
#[derive(Debug, Clone)]
pub struct TerrainDerivatives {
    /// Angle from horizontal, 0-90
    pub slope: Raster,
    /// Compass bearing of the downslope direction, 0-360 clockwise from north
    pub aspect: Raster,
}

/// Slope/aspect estimation with Horn's 3x3 weighted gradient
pub struct TerrainModel;

impl TerrainModel {
    /// Compute slope and aspect on the elevation raster's own grid
    ///
    /// Border cells and cells with a no-data neighbour are no-data. Flat
    /// cells get aspect 0.
    pub fn compute(elevation: &Raster) -> SlideResult<TerrainDerivatives> {
        let crs = validate_raster(elevation)?;
        log::debug!(
            "Computing slope/aspect for '{}' ({}x{}, {})",
            elevation.name,
            elevation.grid.width,
            elevation.grid.height,
            crs
        );

        let (height, width) = elevation.data.dim();
        let mut slope = Array2::from_elem((height, width), f64::NAN);
        let mut aspect = Array2::from_elem((height, width), f64::NAN);

        if height >= 3 && width >= 3 {
            let spacing = Self::pixel_spacing_meters(elevation);
            let dem = &elevation.data;

            Zip::indexed(slope.slice_mut(s![1..height - 1, 1..width - 1]))
                .and(aspect.slice_mut(s![1..height - 1, 1..width - 1]))
                .for_each(|(i, j), slope_out, aspect_out| {
                    let (row, col) = (i + 1, j + 1);
                    let (dx, dy) = spacing[row];
                    if let Some((dz_dx, dz_dy)) = Self::horn_gradient(dem, row, col, dx, dy) {
                        *slope_out = Self::slope_degrees(dz_dx, dz_dy);
                        *aspect_out = Self::aspect_degrees(dz_dx, dz_dy);
                    }
                });
        }

        Ok(TerrainDerivatives {
            slope: elevation.with_data("slope", slope),
            aspect: elevation.with_data("aspect", aspect),
        })
    }

    /// Signed pixel size in metres for each row: (east step, north step)
    fn pixel_spacing_meters(elevation: &Raster) -> Vec<(f64, f64)> {
        let gt = &elevation.grid.geo_transform;
        let geographic = elevation
            .grid
            .crs
            .as_ref()
            .map(|crs| crs.is_geographic())
            .unwrap_or(false);

        (0..elevation.grid.height)
            .map(|row| {
                if geographic {
                    let lat = gt.pixel_center(row, 0).1.to_radians();
                    (
                        gt.pixel_width * METERS_PER_DEGREE_LON * lat.cos(),
                        gt.pixel_height * METERS_PER_DEGREE_LAT,
                    )
                } else {
                    (gt.pixel_width, gt.pixel_height)
                }
            })
            .collect()
    }

    /// Gradient in map axes: (dz/dEast, dz/dNorth)
    ///
    /// `dx`/`dy` are signed, so the grid may be north-up or south-up.
    fn horn_gradient(dem: &Field, row: usize, col: usize, dx: f64, dy: f64) -> Option<(f64, f64)> {
        let w = dem.slice(s![row - 1..=row + 1, col - 1..=col + 1]);
        if w.iter().any(|v| v.is_nan()) {
            return None;
        }
        let (a, b, c) = (w[[0, 0]], w[[0, 1]], w[[0, 2]]);
        let (d, f) = (w[[1, 0]], w[[1, 2]]);
        let (g, h, i) = (w[[2, 0]], w[[2, 1]], w[[2, 2]]);

        let dz_dcol = ((c + 2.0 * f + i) - (a + 2.0 * d + g)) / 8.0;
        let dz_drow = ((g + 2.0 * h + i) - (a + 2.0 * b + c)) / 8.0;

        Some((dz_dcol / dx, dz_drow / dy))
    }

    fn slope_degrees(dz_dx: f64, dz_dy: f64) -> f64 {
        (dz_dx * dz_dx + dz_dy * dz_dy).sqrt().atan().to_degrees()
    }

    fn aspect_degrees(dz_dx: f64, dz_dy: f64) -> f64 {
        if dz_dx == 0.0 && dz_dy == 0.0 {
            return 0.0;
        }
        // Downslope is the negative gradient; bearing = atan2(east, north)
        let bearing = (-dz_dx).atan2(-dz_dy).to_degrees();
        let wrapped = bearing.rem_euclid(360.0);
        if wrapped >= 360.0 || wrapped == 0.0 {
            0.0
        } else {
            wrapped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Crs, GeoTransform, GridSpec};
    use approx::assert_abs_diff_eq;

    fn dem(f: impl Fn(usize, usize) -> f64) -> Raster {
        Raster::new(
            "dem",
            Array2::from_shape_fn((5, 5), |(i, j)| f(i, j)),
            GridSpec::new(Crs::Epsg(32633), GeoTransform::north_up(0.0, 50.0, 10.0), 5, 5),
        )
    }

    #[test]
    fn test_flat_terrain() {
        let terrain = TerrainModel::compute(&dem(|_, _| 100.0)).unwrap();
        assert_abs_diff_eq!(terrain.slope.data[[2, 2]], 0.0);
        assert_abs_diff_eq!(terrain.aspect.data[[2, 2]], 0.0);
    }

    #[test]
    fn test_plane_rising_east_faces_west() {
        // 10 m rise per 10 m pixel eastwards: 45 degree slope
        let terrain = TerrainModel::compute(&dem(|_, j| j as f64 * 10.0)).unwrap();
        assert_abs_diff_eq!(terrain.slope.data[[2, 2]], 45.0, epsilon = 1e-9);
        assert_abs_diff_eq!(terrain.aspect.data[[2, 2]], 270.0, epsilon = 1e-9);
    }

    #[test]
    fn test_plane_rising_north_faces_south() {
        // Row 0 is the northern edge of a north-up grid
        let terrain = TerrainModel::compute(&dem(|i, _| (4 - i) as f64 * 5.0)).unwrap();
        assert_abs_diff_eq!(terrain.aspect.data[[2, 2]], 180.0, epsilon = 1e-9);
        assert_abs_diff_eq!(terrain.slope.data[[2, 2]], 0.5f64.atan().to_degrees(), epsilon = 1e-9);
    }

    #[test]
    fn test_plane_rising_south_faces_north() {
        let terrain = TerrainModel::compute(&dem(|i, _| i as f64 * 5.0)).unwrap();
        assert_abs_diff_eq!(terrain.aspect.data[[2, 2]], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_geographic_pixel_sizes_in_meters() {
        // 0.0001 deg pixels around 46 N; 10 m rise per pixel eastwards
        let gt = GeoTransform::north_up(10.0, 46.00025, 0.0001);
        let elevation = Raster::new(
            "dem",
            Array2::from_shape_fn((5, 5), |(_, j)| j as f64 * 10.0),
            GridSpec::new(Crs::Epsg(4326), gt, 5, 5),
        );
        let terrain = TerrainModel::compute(&elevation).unwrap();

        let lat = gt.pixel_center(2, 2).1.to_radians();
        let dx_m = 0.0001 * METERS_PER_DEGREE_LON * lat.cos();
        let expected = (10.0 / dx_m).atan().to_degrees();
        assert_abs_diff_eq!(terrain.slope.data[[2, 2]], expected, epsilon = 1e-9);
        assert_abs_diff_eq!(terrain.aspect.data[[2, 2]], 270.0, epsilon = 1e-9);

        // Same ground step on a metric grid gives the same slope
        let metric = Raster::new(
            "dem",
            Array2::from_shape_fn((5, 5), |(_, j)| j as f64 * 10.0),
            GridSpec::new(Crs::Epsg(32632), GeoTransform::north_up(0.0, 100.0, dx_m), 5, 5),
        );
        let metric_slope = TerrainModel::compute(&metric).unwrap().slope.data[[2, 2]];
        assert_abs_diff_eq!(terrain.slope.data[[2, 2]], metric_slope, epsilon = 1e-9);
    }

    #[test]
    fn test_geographic_north_step_uses_latitude_length() {
        let elevation = Raster::new(
            "dem",
            Array2::from_shape_fn((5, 5), |(i, _)| (4 - i) as f64 * 5.0),
            GridSpec::new(Crs::Epsg(4326), GeoTransform::north_up(10.0, 46.00025, 0.0001), 5, 5),
        );
        let terrain = TerrainModel::compute(&elevation).unwrap();
        let expected = (5.0 / (0.0001 * METERS_PER_DEGREE_LAT)).atan().to_degrees();
        assert_abs_diff_eq!(terrain.slope.data[[2, 2]], expected, epsilon = 1e-9);
        assert_abs_diff_eq!(terrain.aspect.data[[2, 2]], 180.0, epsilon = 1e-9);
    }

    #[test]
    fn test_south_up_grid_keeps_compass_aspect() {
        // Positive pixel height: row 0 is the southern edge
        let south_up = GeoTransform {
            pixel_height: 10.0,
            ..GeoTransform::north_up(0.0, 0.0, 10.0)
        };
        let grid = GridSpec::new(Crs::Epsg(32633), south_up, 5, 5);

        let rising_north = Raster::new("dem", Array2::from_shape_fn((5, 5), |(i, _)| i as f64 * 5.0), grid.clone());
        let terrain = TerrainModel::compute(&rising_north).unwrap();
        assert_abs_diff_eq!(terrain.aspect.data[[2, 2]], 180.0, epsilon = 1e-9);
        assert_abs_diff_eq!(terrain.slope.data[[2, 2]], 0.5f64.atan().to_degrees(), epsilon = 1e-9);

        let rising_south = Raster::new("dem", Array2::from_shape_fn((5, 5), |(i, _)| (4 - i) as f64 * 5.0), grid);
        let terrain = TerrainModel::compute(&rising_south).unwrap();
        assert_abs_diff_eq!(terrain.aspect.data[[2, 2]], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_borders_and_nodata_neighbours_propagate() {
        let mut elevation = dem(|i, j| (i + j) as f64);
        elevation.data[[1, 1]] = f64::NAN;
        let terrain = TerrainModel::compute(&elevation).unwrap();
        assert!(terrain.slope.data[[0, 2]].is_nan());
        assert!(terrain.aspect.data[[4, 4]].is_nan());
        assert!(terrain.slope.data[[2, 2]].is_nan());
        assert!(!terrain.slope.data[[3, 3]].is_nan());
    }

    #[test]
    fn test_slope_within_range() {
        let terrain = TerrainModel::compute(&dem(|i, j| ((i * 7 + j * 13) % 5) as f64 * 40.0)).unwrap();
        for value in terrain.slope.data.iter().filter(|v| !v.is_nan()) {
            assert!((0.0..=90.0).contains(value));
        }
        for value in terrain.aspect.data.iter().filter(|v| !v.is_nan()) {
            assert!((0.0..360.0).contains(value));
        }
    }
}
