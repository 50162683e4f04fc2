use crate::types::{nearest_index, BoundingBox, Crs, Field, GeoTransform, GridSpec, Raster, SlideError, SlideResult};
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use ndarray::{Array2, Axis, Zip};

/// Resampling kernel used when re-expressing a raster on another grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Resampling {
    /// Value of the source pixel containing the target centre (circular fields)
    Nearest,
    /// Bilinear interpolation between the four nearest source centres
    Bilinear,
}

/// Transforms map coordinates between two coordinate reference systems
pub trait PointTransform {
    /// Transform coordinates in place
    fn transform(&self, xs: &mut [f64], ys: &mut [f64]) -> SlideResult<()>;
}

/// Transform between identical CRSs
pub struct IdentityTransform;

impl PointTransform for IdentityTransform {
    fn transform(&self, _xs: &mut [f64], _ys: &mut [f64]) -> SlideResult<()> {
        Ok(())
    }
}

/// OSR-backed transform between two distinct CRSs
pub struct GdalTransform {
    inner: CoordTransform,
}

impl GdalTransform {
    pub fn new(source: &Crs, target: &Crs) -> SlideResult<Self> {
        let source_ref = spatial_ref(source)?;
        let target_ref = spatial_ref(target)?;
        let inner = CoordTransform::new(&source_ref, &target_ref).map_err(|e| {
            SlideError::Alignment(format!("Cannot transform {} -> {}: {}", source, target, e))
        })?;
        Ok(Self { inner })
    }
}

impl PointTransform for GdalTransform {
    fn transform(&self, xs: &mut [f64], ys: &mut [f64]) -> SlideResult<()> {
        let mut zs = vec![0.0; xs.len()];
        self.inner
            .transform_coords(xs, ys, &mut zs)
            .map_err(|e| SlideError::Alignment(format!("Coordinate transform failed: {}", e)))
    }
}

fn spatial_ref(crs: &Crs) -> SlideResult<SpatialRef> {
    let srs = match crs {
        Crs::Epsg(code) => SpatialRef::from_epsg(*code),
        Crs::Wkt(wkt) => SpatialRef::from_wkt(wkt),
    }
    .map_err(|e| SlideError::Alignment(format!("Invalid CRS {}: {}", crs, e)))?;
    srs.set_axis_mapping_strategy(gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);
    Ok(srs)
}

/// Build the transform taking coordinates from `source` into `target`
pub fn transformer_between(source: &Crs, target: &Crs) -> SlideResult<Box<dyn PointTransform>> {
    if source == target {
        Ok(Box::new(IdentityTransform))
    } else {
        Ok(Box::new(GdalTransform::new(source, target)?))
    }
}

/// Check that a grid carries enough information to take part in alignment
pub fn validate_grid<'a>(grid: &'a GridSpec, name: &str) -> SlideResult<&'a Crs> {
    let crs = grid.crs.as_ref().ok_or_else(|| {
        SlideError::Alignment(format!("Raster '{}' has no coordinate reference system", name))
    })?;
    let gt = &grid.geo_transform;
    if gt.is_degenerate() {
        return Err(SlideError::Alignment(format!(
            "Raster '{}' has a degenerate pixel size ({}, {})",
            name, gt.pixel_width, gt.pixel_height
        )));
    }
    if !gt.is_axis_aligned() {
        return Err(SlideError::Alignment(format!(
            "Raster '{}' has a rotated geotransform, which is not supported",
            name
        )));
    }
    if grid.width == 0 || grid.height == 0 {
        return Err(SlideError::Alignment(format!("Raster '{}' is empty", name)));
    }
    Ok(crs)
}

/// Grid checks plus agreement between the data array and the grid size
pub fn validate_raster(raster: &Raster) -> SlideResult<&Crs> {
    let crs = validate_grid(&raster.grid, &raster.name)?;
    if raster.data.dim() != raster.grid.shape() {
        return Err(SlideError::Alignment(format!(
            "Raster '{}' holds {:?} values but its grid is {:?}",
            raster.name,
            raster.data.dim(),
            raster.grid.shape()
        )));
    }
    Ok(crs)
}

/// Re-expresses raster fields on one canonical pixel grid
#[derive(Debug, Clone)]
pub struct GridAligner {
    target: GridSpec,
    /// Pixels where the reference raster has no data
    nodata_mask: Option<Array2<bool>>,
}

impl GridAligner {
    /// Canonical grid taken from an explicit grid description
    pub fn from_grid(grid: GridSpec) -> SlideResult<Self> {
        validate_grid(&grid, "target grid")?;
        Ok(Self {
            target: grid,
            nodata_mask: None,
        })
    }

    /// Canonical grid pinned from a representative raster
    ///
    /// When `resolution` (metres) is given the reference's CRS, origin and
    /// extent are kept and only the pixel size changes.
    pub fn from_reference(reference: &Raster, resolution: Option<f64>) -> SlideResult<Self> {
        validate_raster(reference)?;
        let native = Self {
            target: reference.grid.clone(),
            nodata_mask: Some(reference.data.mapv(f64::is_nan)),
        };

        let Some(resolution) = resolution else {
            return Ok(native);
        };
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(SlideError::Config(format!(
                "Analysis resolution must be positive, got {}",
                resolution
            )));
        }

        let grid = &reference.grid;
        let gt = grid.geo_transform;
        let (step_x, step_y) = grid.metric_step(resolution);
        let width = ((grid.width as f64 * gt.pixel_width.abs()) / step_x).ceil() as usize;
        let height = ((grid.height as f64 * gt.pixel_height.abs()) / step_y).ceil() as usize;
        let target = GridSpec {
            crs: grid.crs.clone(),
            geo_transform: GeoTransform {
                pixel_width: step_x.copysign(gt.pixel_width),
                pixel_height: step_y.copysign(gt.pixel_height),
                ..gt
            },
            width: width.max(1),
            height: height.max(1),
        };
        log::debug!(
            "Refining canonical grid from {}x{} to {}x{} at {} m/pixel",
            grid.width, grid.height, target.width, target.height, resolution
        );

        let refined = Self::from_grid(target)?;
        let mask = refined
            .align(reference, Resampling::Nearest)?
            .data
            .mapv(f64::is_nan);
        Ok(Self {
            nodata_mask: Some(mask),
            ..refined
        })
    }

    pub fn grid(&self) -> &GridSpec {
        &self.target
    }

    /// Re-express `raster` on the canonical grid
    ///
    /// Target pixels outside the source extent, or masked in the reference
    /// raster, become no-data.
    pub fn align(&self, raster: &Raster, resampling: Resampling) -> SlideResult<Raster> {
        let target_crs = validate_grid(&self.target, "target grid")?;
        let source_crs = validate_raster(raster)?;

        let mut data = if raster.grid == self.target {
            raster.data.clone()
        } else {
            log::debug!(
                "Aligning '{}' ({} {}x{}) onto {} {}x{} with {:?}",
                raster.name,
                source_crs,
                raster.grid.width,
                raster.grid.height,
                target_crs,
                self.target.width,
                self.target.height,
                resampling
            );
            let transform = transformer_between(target_crs, source_crs)?;
            let source_coords = self.source_coordinates(transform.as_ref())?;
            resample(raster, &source_coords, self.target.shape(), resampling)
        };

        if let Some(mask) = &self.nodata_mask {
            Zip::from(&mut data).and(mask).for_each(|value, &masked| {
                if masked {
                    *value = f64::NAN;
                }
            });
        }

        Ok(Raster::new(raster.name.clone(), data, self.target.clone()))
    }

    /// Target pixel centres expressed in the source CRS, row by row
    fn source_coordinates(&self, transform: &dyn PointTransform) -> SlideResult<Vec<(Vec<f64>, Vec<f64>)>> {
        let gt = &self.target.geo_transform;
        (0..self.target.height)
            .map(|row| {
                let mut xs: Vec<f64> = (0..self.target.width)
                    .map(|col| gt.pixel_center(row, col).0)
                    .collect();
                let mut ys = vec![gt.pixel_center(row, 0).1; self.target.width];
                transform.transform(&mut xs, &mut ys)?;
                Ok((xs, ys))
            })
            .collect()
    }

    /// Merge tiles onto one grid pinned from the first (representative) tile
    ///
    /// The mosaic keeps the representative tile's CRS, pixel size and origin
    /// and covers the union of all tile extents. Earlier tiles take precedence
    /// where tiles overlap.
    pub fn mosaic(tiles: &[Raster], resampling: Resampling) -> SlideResult<Raster> {
        let representative = tiles
            .first()
            .ok_or_else(|| SlideError::Alignment("No tiles to mosaic".to_string()))?;
        let pinned_crs = validate_raster(representative)?;
        let gt = representative.grid.geo_transform;

        log::info!(
            "Mosaicking {} tiles on {} pinned from '{}'",
            tiles.len(),
            pinned_crs,
            representative.name
        );

        let mut extent = representative.grid.bounds();
        for tile in &tiles[1..] {
            let tile_crs = validate_raster(tile)?;
            let transform = transformer_between(tile_crs, pinned_crs)?;
            extent = extent.union(&transformed_bounds(&tile.grid.bounds(), transform.as_ref())?);
        }

        let grid = snapped_grid(pinned_crs.clone(), &gt, &extent);
        log::debug!("Mosaic grid: {}x{} pixels, bounds {:?}", grid.width, grid.height, grid.bounds());
        let aligner = Self::from_grid(grid)?;

        let mut merged = Array2::from_elem(aligner.target.shape(), f64::NAN);
        for tile in tiles {
            let aligned = aligner.align(tile, resampling)?;
            Zip::from(&mut merged).and(&aligned.data).for_each(|out, &value| {
                if out.is_nan() && !value.is_nan() {
                    *out = value;
                }
            });
        }

        Ok(Raster::new(
            representative.name.clone(),
            merged,
            aligner.target,
        ))
    }
}

/// Bounds of a box after transforming its corners
fn transformed_bounds(bounds: &BoundingBox, transform: &dyn PointTransform) -> SlideResult<BoundingBox> {
    let mut xs = vec![bounds.min_x, bounds.max_x, bounds.max_x, bounds.min_x];
    let mut ys = vec![bounds.min_y, bounds.min_y, bounds.max_y, bounds.max_y];
    transform.transform(&mut xs, &mut ys)?;
    Ok(BoundingBox {
        min_x: xs.iter().copied().fold(f64::INFINITY, f64::min),
        max_x: xs.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        min_y: ys.iter().copied().fold(f64::INFINITY, f64::min),
        max_y: ys.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    })
}

/// Grid covering `extent` on the pixel lattice of `gt`
fn snapped_grid(crs: Crs, gt: &GeoTransform, extent: &BoundingBox) -> GridSpec {
    const EPS: f64 = 1e-9;

    let ca = (extent.min_x - gt.top_left_x) / gt.pixel_width;
    let cb = (extent.max_x - gt.top_left_x) / gt.pixel_width;
    let ra = (extent.min_y - gt.top_left_y) / gt.pixel_height;
    let rb = (extent.max_y - gt.top_left_y) / gt.pixel_height;

    let col_start = (ca.min(cb) + EPS).floor();
    let col_end = (ca.max(cb) - EPS).ceil();
    let row_start = (ra.min(rb) + EPS).floor();
    let row_end = (ra.max(rb) - EPS).ceil();

    GridSpec {
        crs: Some(crs),
        geo_transform: GeoTransform {
            top_left_x: gt.top_left_x + col_start * gt.pixel_width,
            top_left_y: gt.top_left_y + row_start * gt.pixel_height,
            ..*gt
        },
        width: (col_end - col_start).max(1.0) as usize,
        height: (row_end - row_start).max(1.0) as usize,
    }
}

/// Sample the source raster at precomputed source-CRS coordinates
fn resample(
    source: &Raster,
    coords: &[(Vec<f64>, Vec<f64>)],
    shape: (usize, usize),
    resampling: Resampling,
) -> Field {
    let mut out = Array2::from_elem(shape, f64::NAN);
    let gt = source.grid.geo_transform;

    let fill_row = |(row, mut line): (usize, ndarray::ArrayViewMut1<f64>)| {
        let (xs, ys) = &coords[row];
        for (col, value) in line.iter_mut().enumerate() {
            let (row_f, col_f) = gt.fractional_index(xs[col], ys[col]);
            *value = match resampling {
                Resampling::Nearest => sample_nearest(&source.data, row_f, col_f),
                Resampling::Bilinear => sample_bilinear(&source.data, row_f, col_f),
            };
        }
    };

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        out.axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(fill_row);
    }
    #[cfg(not(feature = "parallel"))]
    {
        out.axis_iter_mut(Axis(0)).enumerate().for_each(fill_row);
    }

    out
}

fn sample_nearest(data: &Field, row_f: f64, col_f: f64) -> f64 {
    let (height, width) = data.dim();
    match (nearest_index(row_f, height), nearest_index(col_f, width)) {
        (Some(row), Some(col)) => data[[row, col]],
        _ => f64::NAN,
    }
}

fn sample_bilinear(data: &Field, row_f: f64, col_f: f64) -> f64 {
    let (height, width) = data.dim();
    if nearest_index(row_f, height).is_none() || nearest_index(col_f, width).is_none() {
        return f64::NAN;
    }

    // Half-pixel border: clamp onto the outermost centres
    let r = row_f.clamp(0.0, (height - 1) as f64);
    let c = col_f.clamp(0.0, (width - 1) as f64);
    let r0 = r.floor() as usize;
    let c0 = c.floor() as usize;
    let r1 = (r0 + 1).min(height - 1);
    let c1 = (c0 + 1).min(width - 1);
    let dr = r - r0 as f64;
    let dc = c - c0 as f64;

    let v00 = data[[r0, c0]];
    let v01 = data[[r0, c1]];
    let v10 = data[[r1, c0]];
    let v11 = data[[r1, c1]];

    if v00.is_nan() || v01.is_nan() || v10.is_nan() || v11.is_nan() {
        return sample_nearest(data, row_f, col_f);
    }

    v00 * (1.0 - dr) * (1.0 - dc) + v01 * (1.0 - dr) * dc + v10 * dr * (1.0 - dc) + v11 * dr * dc
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn raster(name: &str, data: Field, x0: f64, y0: f64, pixel: f64) -> Raster {
        let (height, width) = data.dim();
        Raster::new(
            name,
            data,
            GridSpec::new(Crs::Epsg(32633), GeoTransform::north_up(x0, y0, pixel), width, height),
        )
    }

    #[test]
    fn test_align_same_grid_is_identity() {
        let data = Array2::from_shape_fn((3, 4), |(i, j)| (i * 4 + j) as f64);
        let reference = raster("ref", data.clone(), 0.0, 30.0, 10.0);
        let aligner = GridAligner::from_reference(&reference, None).unwrap();
        let aligned = aligner.align(&reference, Resampling::Bilinear).unwrap();
        assert_eq!(aligned.data, data);
    }

    #[test]
    fn test_align_outside_extent_is_nodata() {
        let reference = raster("ref", Array2::zeros((4, 4)), 0.0, 40.0, 10.0);
        // Source covers only the left half of the reference grid
        let source = raster("src", Array2::from_elem((4, 2), 5.0), 0.0, 40.0, 10.0);
        let aligner = GridAligner::from_reference(&reference, None).unwrap();
        let aligned = aligner.align(&source, Resampling::Nearest).unwrap();
        assert_eq!(aligned.data[[1, 0]], 5.0);
        assert_eq!(aligned.data[[1, 1]], 5.0);
        assert!(aligned.data[[1, 2]].is_nan());
        assert!(aligned.data[[1, 3]].is_nan());
    }

    #[test]
    fn test_align_applies_reference_nodata_mask() {
        let mut reference_data = Array2::zeros((2, 2));
        reference_data[[0, 0]] = f64::NAN;
        let reference = raster("ref", reference_data, 0.0, 20.0, 10.0);
        let source = raster("src", Array2::from_elem((2, 2), 1.0), 0.0, 20.0, 10.0);
        let aligner = GridAligner::from_reference(&reference, None).unwrap();
        let aligned = aligner.align(&source, Resampling::Nearest).unwrap();
        assert!(aligned.data[[0, 0]].is_nan());
        assert_eq!(aligned.data[[1, 1]], 1.0);
    }

    #[test]
    fn test_bilinear_on_linear_ramp() {
        // Values increase by 1 per 10 m eastwards
        let source = raster(
            "ramp",
            Array2::from_shape_fn((4, 4), |(_, j)| j as f64),
            0.0,
            40.0,
            10.0,
        );
        let target = GridSpec::new(Crs::Epsg(32633), GeoTransform::north_up(5.0, 35.0, 10.0), 3, 3);
        let aligner = GridAligner::from_grid(target).unwrap();
        let aligned = aligner.align(&source, Resampling::Bilinear).unwrap();
        assert_abs_diff_eq!(aligned.data[[0, 0]], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(aligned.data[[1, 2]], 2.5, epsilon = 1e-12);
    }

    #[test]
    fn test_refined_resolution_keeps_origin() {
        let reference = raster("ref", Array2::from_elem((2, 2), 1.0), 100.0, 200.0, 20.0);
        let aligner = GridAligner::from_reference(&reference, Some(10.0)).unwrap();
        let grid = aligner.grid();
        assert_eq!(grid.shape(), (4, 4));
        assert_eq!(grid.geo_transform.top_left_x, 100.0);
        assert_eq!(grid.geo_transform.pixel_height, -10.0);
        let aligned = aligner.align(&reference, Resampling::Nearest).unwrap();
        assert!(aligned.data.iter().all(|v| *v == 1.0));
    }

    #[test]
    fn test_refined_resolution_is_metric_on_geographic_grid() {
        // 0.001 deg pixels, grid centred on 46 N
        let reference = Raster::new(
            "theta",
            Array2::from_elem((20, 20), 35.0),
            GridSpec::new(Crs::Epsg(4326), GeoTransform::north_up(10.0, 46.01, 0.001), 20, 20),
        );
        let aligner = GridAligner::from_reference(&reference, Some(10.0)).unwrap();
        let gt = aligner.grid().geo_transform;

        let lat = 46f64.to_radians();
        assert_abs_diff_eq!(gt.pixel_width, 10.0 / (111_320.0 * lat.cos()), epsilon = 1e-12);
        assert_abs_diff_eq!(gt.pixel_height, -10.0 / 110_574.0, epsilon = 1e-12);
        assert_eq!((gt.top_left_x, gt.top_left_y), (10.0, 46.01));
        // 0.02 deg of latitude is about 2211 m: 222 rows of 10 m
        assert_eq!(aligner.grid().height, 222);

        let aligned = aligner.align(&reference, Resampling::Bilinear).unwrap();
        assert!(aligned.data.iter().filter(|v| !v.is_nan()).all(|v| *v == 35.0));
        assert!(aligned.valid_count() > 200 * 150);
        // The last row overhangs the reference extent
        assert!(aligned.data[[221, 0]].is_nan());
    }

    #[test]
    fn test_data_grid_shape_mismatch_is_alignment_error() {
        let reference = raster("ref", Array2::zeros((4, 4)), 0.0, 40.0, 10.0);
        let mut short = raster("short", Array2::zeros((4, 4)), 0.0, 40.0, 10.0);
        short.data = Array2::zeros((3, 4));

        let aligner = GridAligner::from_reference(&reference, None).unwrap();
        assert!(matches!(
            aligner.align(&short, Resampling::Nearest),
            Err(SlideError::Alignment(_))
        ));
        assert!(matches!(
            GridAligner::from_reference(&short, None),
            Err(SlideError::Alignment(_))
        ));
        assert!(matches!(
            GridAligner::mosaic(&[reference, short], Resampling::Nearest),
            Err(SlideError::Alignment(_))
        ));
    }

    #[test]
    fn test_missing_crs_is_alignment_error() {
        let mut reference = raster("ref", Array2::zeros((2, 2)), 0.0, 20.0, 10.0);
        reference.grid.crs = None;
        assert!(matches!(
            GridAligner::from_reference(&reference, None),
            Err(SlideError::Alignment(_))
        ));
    }

    #[test]
    fn test_mosaic_pins_representative_grid() {
        let west = raster("w", Array2::from_elem((2, 2), 1.0), 0.0, 20.0, 10.0);
        let east = raster("e", Array2::from_elem((2, 2), 2.0), 20.0, 20.0, 10.0);
        let mosaic = GridAligner::mosaic(&[west, east], Resampling::Nearest).unwrap();
        assert_eq!(mosaic.grid.shape(), (2, 4));
        assert_eq!(mosaic.grid.geo_transform.top_left_x, 0.0);
        assert_eq!(mosaic.data[[0, 1]], 1.0);
        assert_eq!(mosaic.data[[1, 2]], 2.0);
    }

    #[test]
    fn test_mosaic_first_tile_wins_overlap() {
        let first = raster("a", Array2::from_elem((2, 2), 1.0), 0.0, 20.0, 10.0);
        let second = raster("b", Array2::from_elem((2, 2), 9.0), 10.0, 20.0, 10.0);
        let mosaic = GridAligner::mosaic(&[first, second], Resampling::Nearest).unwrap();
        assert_eq!(mosaic.grid.shape(), (2, 3));
        assert_eq!(mosaic.data[[0, 1]], 1.0);
        assert_eq!(mosaic.data[[0, 2]], 9.0);
    }

    #[test]
    fn test_mosaic_rejects_empty_input() {
        assert!(matches!(
            GridAligner::mosaic(&[], Resampling::Nearest),
            Err(SlideError::Alignment(_))
        ));
    }
}
