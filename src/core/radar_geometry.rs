use crate::core::grid_align::validate_raster;
use crate::core::terrain::TerrainModel;
use crate::types::{Field, Raster, SarAcquisition, SlideError, SlideResult};
use geo::{Area, BooleanOps, BoundingRect, Contains, MultiPolygon, Point, Polygon};
use ndarray::Zip;
use std::f64::consts::FRAC_PI_2;

/// Slopes are capped this far (radians) below vertical before `tan`
pub const SLOPE_SATURATION_EPS: f64 = 1e-6;

/// Scalar look direction measured over an area of interest
#[derive(Debug, Clone, Copy)]
pub struct LookDirectionEstimate {
    /// Compass bearing in degrees, 0-360 clockwise from north
    pub bearing_deg: f64,
    /// Number of incidence-aspect pixels averaged
    pub sample_count: usize,
}

/// Terrain-relative radar viewing angles on the canonical grid
#[derive(Debug, Clone)]
pub struct RadarGeometry {
    /// θ_loc = θ_i - α_r (radians)
    pub local_incidence: Raster,
    /// α_r, terrain tilt projected into the range direction (radians)
    pub range_slope: Raster,
    /// α_az, terrain tilt projected into the azimuth direction (radians)
    pub azimuth_slope: Option<Raster>,
    /// Pixels whose slope hit the saturation cap
    pub saturated_pixels: usize,
}

/// Composes SAR acquisition geometry with terrain geometry
#[derive(Debug, Clone)]
pub struct RadarGeometryModel {
    look_direction_deg: f64,
    include_azimuth_slope: bool,
}

impl RadarGeometryModel {
    pub fn new(look_direction_deg: f64) -> Self {
        Self {
            look_direction_deg,
            include_azimuth_slope: false,
        }
    }

    /// Also derive the azimuth-direction slope component
    pub fn with_azimuth_slope(mut self, enabled: bool) -> Self {
        self.include_azimuth_slope = enabled;
        self
    }

    pub fn look_direction_deg(&self) -> f64 {
        self.look_direction_deg
    }

    /// Estimate the look direction as the mean aspect of the incidence band
    ///
    /// Incidence angle grows monotonically across range, so the aspect of
    /// the band is constant over the swath. Bearings are averaged on the
    /// circle. This is the only full-area reduction in the geometry chain:
    /// everything downstream waits on this scalar.
    pub fn estimate_look_direction(
        acquisition: &SarAcquisition,
        area_of_interest: &Polygon<f64>,
    ) -> SlideResult<LookDirectionEstimate> {
        let region: MultiPolygon<f64> = area_of_interest.intersection(&acquisition.footprint);
        if region.0.is_empty() || region.unsigned_area() == 0.0 {
            return Err(SlideError::Geometry(
                "Area of interest does not intersect the acquisition footprint".to_string(),
            ));
        }
        let bounds = region.bounding_rect().ok_or_else(|| {
            SlideError::Geometry("Area of interest has no extent".to_string())
        })?;

        let aspect = TerrainModel::compute(&acquisition.incidence)?.aspect;
        let gt = &aspect.grid.geo_transform;

        let (mut sum_sin, mut sum_cos, mut count) = (0.0, 0.0, 0usize);
        for ((row, col), value) in aspect.data.indexed_iter() {
            if value.is_nan() {
                continue;
            }
            let (x, y) = gt.pixel_center(row, col);
            if x < bounds.min().x || x > bounds.max().x || y < bounds.min().y || y > bounds.max().y {
                continue;
            }
            if !region.contains(&Point::new(x, y)) {
                continue;
            }
            let bearing = value.to_radians();
            sum_sin += bearing.sin();
            sum_cos += bearing.cos();
            count += 1;
        }

        if count == 0 {
            return Err(SlideError::Geometry(format!(
                "No valid incidence-angle pixels inside the area of interest for '{}'",
                acquisition.incidence.name
            )));
        }
        if sum_sin.hypot(sum_cos) / (count as f64) < 1e-9 {
            return Err(SlideError::Geometry(
                "Incidence-angle aspect has no dominant direction".to_string(),
            ));
        }

        let bearing_deg = sum_sin.atan2(sum_cos).to_degrees().rem_euclid(360.0);
        log::info!(
            "Estimated look direction {:.3} deg from {} incidence pixels",
            bearing_deg,
            count
        );
        Ok(LookDirectionEstimate {
            bearing_deg,
            sample_count: count,
        })
    }

    /// φ_r = φ_i - φ_s (radians)
    ///
    /// Not wrapped to [-π, π]; every consumer takes its sine or cosine.
    pub fn relative_aspect(look_direction_rad: f64, aspect_rad: f64) -> f64 {
        look_direction_rad - aspect_rad
    }

    fn saturate(slope_rad: f64) -> f64 {
        slope_rad.min(FRAC_PI_2 - SLOPE_SATURATION_EPS)
    }

    fn is_saturated(slope_rad: f64) -> bool {
        slope_rad > FRAC_PI_2 - SLOPE_SATURATION_EPS
    }

    /// α_r = atan(tan(α_s) · cos(φ_r))
    pub fn range_slope(slope_rad: f64, relative_aspect_rad: f64) -> f64 {
        (Self::saturate(slope_rad).tan() * relative_aspect_rad.cos()).atan()
    }

    /// α_az = atan(tan(α_s) · sin(φ_r))
    pub fn azimuth_slope(slope_rad: f64, relative_aspect_rad: f64) -> f64 {
        (Self::saturate(slope_rad).tan() * relative_aspect_rad.sin()).atan()
    }

    /// θ_loc = θ_i - α_r
    pub fn local_incidence(incidence_rad: f64, range_slope_rad: f64) -> f64 {
        incidence_rad - range_slope_rad
    }

    /// Derive local incidence and range slope from aligned inputs (degrees)
    pub fn compute(&self, incidence: &Raster, slope: &Raster, aspect: &Raster) -> SlideResult<RadarGeometry> {
        for raster in [incidence, slope, aspect] {
            validate_raster(raster)?;
        }
        for other in [slope, aspect] {
            if other.grid != incidence.grid {
                return Err(SlideError::Alignment(format!(
                    "'{}' is not on the grid of '{}'; align before combining",
                    other.name, incidence.name
                )));
            }
        }

        let look_rad = self.look_direction_deg.to_radians();

        let relative_aspect = aspect
            .data
            .mapv(|a| Self::relative_aspect(look_rad, a.to_radians()));

        let range_slope = combine_fields(&slope.data, &relative_aspect, |s, phi| {
            Self::range_slope(s.to_radians(), phi)
        });

        let local_incidence = combine_fields(&incidence.data, &range_slope, |theta, alpha_r| {
            Self::local_incidence(theta.to_radians(), alpha_r)
        });

        let azimuth_slope = self.include_azimuth_slope.then(|| {
            let data = combine_fields(&slope.data, &relative_aspect, |s, phi| {
                Self::azimuth_slope(s.to_radians(), phi)
            });
            incidence.with_data("azimuth_slope", data)
        });

        let saturated_pixels = slope
            .data
            .iter()
            .filter(|s| Self::is_saturated(s.to_radians()))
            .count();
        if saturated_pixels > 0 {
            log::warn!(
                "{} pixels with near-vertical slope saturated at {:.6} rad",
                saturated_pixels,
                FRAC_PI_2 - SLOPE_SATURATION_EPS
            );
        }

        Ok(RadarGeometry {
            local_incidence: incidence.with_data("local_incidence", local_incidence),
            range_slope: incidence.with_data("range_slope", range_slope),
            azimuth_slope,
            saturated_pixels,
        })
    }
}

/// Pixel-wise combination of two equally shaped fields
#[cfg(feature = "parallel")]
pub(crate) fn combine_fields<F>(a: &Field, b: &Field, f: F) -> Field
where
    F: Fn(f64, f64) -> f64 + Sync + Send,
{
    Zip::from(a).and(b).par_map_collect(|&x, &y| f(x, y))
}

/// Pixel-wise combination of two equally shaped fields
#[cfg(not(feature = "parallel"))]
pub(crate) fn combine_fields<F>(a: &Field, b: &Field, f: F) -> Field
where
    F: Fn(f64, f64) -> f64,
{
    Zip::from(a).and(b).map_collect(|&x, &y| f(x, y))
}
