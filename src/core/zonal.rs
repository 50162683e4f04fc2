use crate::core::grid_align::validate_raster;
use crate::types::{GeoTransform, GridSpec, ObjectId, PolygonFeature, PolygonInventory, Raster, SlideError, SlideResult};
use geo::{BoundingRect, Contains, MultiPolygon, Point};
use num_traits::Float;
use serde::{Deserialize, Serialize};

/// One polygon's statistic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZonalRow {
    pub object_id: ObjectId,
    /// Median of valid samples; `None` when the polygon has none
    pub value: Option<f64>,
    /// Number of valid samples that entered the median
    pub pixel_count: usize,
}

/// Per-polygon statistics for one field, in inventory order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZonalTable {
    pub field: String,
    pub rows: Vec<ZonalRow>,
}

impl ZonalTable {
    /// Polygons without any valid sample
    pub fn empty_zones(&self) -> usize {
        self.rows.iter().filter(|row| row.value.is_none()).count()
    }

    pub fn get(&self, object_id: &ObjectId) -> Option<&ZonalRow> {
        self.rows.iter().find(|row| &row.object_id == object_id)
    }
}

/// Median of a sample set
///
/// Even counts average the two middle values. The input order does not
/// affect the result.
pub fn median<T: Float>(values: &mut [T]) -> Option<T> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        let two = T::one() + T::one();
        Some((values[mid - 1] + values[mid]) / two)
    }
}

/// Reduces a raster field to one spatial median per polygon
#[derive(Debug, Clone, Default)]
pub struct ZonalAggregator {
    /// Sampling lattice spacing in metres; `None` samples native pixels
    scale: Option<f64>,
}

impl ZonalAggregator {
    pub fn new(scale: Option<f64>) -> SlideResult<Self> {
        if let Some(s) = scale {
            if !(s.is_finite() && s > 0.0) {
                return Err(SlideError::Config(format!(
                    "Zonal sampling scale must be positive, got {}",
                    s
                )));
            }
        }
        Ok(Self { scale })
    }

    pub fn scale(&self) -> Option<f64> {
        self.scale
    }

    /// Median of `field` over every polygon of `inventory`
    pub fn aggregate(&self, field: &Raster, inventory: &PolygonInventory) -> SlideResult<ZonalTable> {
        let field_crs = validate_raster(field)?;
        match inventory.crs() {
            Some(crs) if crs != field_crs => {
                return Err(SlideError::Alignment(format!(
                    "Inventory CRS {} differs from field '{}' CRS {}",
                    crs, field.name, field_crs
                )));
            }
            Some(_) => {}
            None => log::debug!("Inventory has no CRS; assuming {}", field_crs),
        }

        let lattice = self.sampling_lattice(&field.grid);
        let reduce = |feature: &PolygonFeature| {
            let mut samples = Self::collect_samples(field, &lattice, &feature.geometry);
            ZonalRow {
                object_id: feature.object_id.clone(),
                value: median(&mut samples),
                pixel_count: samples.len(),
            }
        };

        #[cfg(feature = "parallel")]
        let rows: Vec<ZonalRow> = {
            use rayon::prelude::*;
            inventory.features().par_iter().map(reduce).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let rows: Vec<ZonalRow> = inventory.features().iter().map(reduce).collect();

        let table = ZonalTable {
            field: field.name.clone(),
            rows,
        };
        let empty = table.empty_zones();
        if empty > 0 {
            log::warn!(
                "{} of {} polygons have no valid '{}' pixels",
                empty,
                table.rows.len(),
                field.name
            );
        }
        Ok(table)
    }

    /// Lattice of sample centres anchored at the field origin
    ///
    /// On geographic grids the metric spacing becomes degrees at the grid's
    /// centre latitude.
    fn sampling_lattice(&self, grid: &GridSpec) -> GeoTransform {
        let gt = grid.geo_transform;
        match self.scale {
            Some(s) => {
                let (step_x, step_y) = grid.metric_step(s);
                GeoTransform {
                    pixel_width: step_x.copysign(gt.pixel_width),
                    pixel_height: step_y.copysign(gt.pixel_height),
                    ..gt
                }
            }
            None => gt,
        }
    }

    /// Valid field values at lattice centres inside the polygon
    fn collect_samples(field: &Raster, lattice: &GeoTransform, polygon: &MultiPolygon<f64>) -> Vec<f64> {
        let Some(bounds) = polygon.bounding_rect() else {
            return Vec::new();
        };
        let (ra, ca) = lattice.fractional_index(bounds.min().x, bounds.min().y);
        let (rb, cb) = lattice.fractional_index(bounds.max().x, bounds.max().y);
        let row_range = (ra.min(rb).floor() as i64)..=(ra.max(rb).ceil() as i64);
        let col_range = (ca.min(cb).floor() as i64)..=(ca.max(cb).ceil() as i64);

        let mut samples = Vec::new();
        for row in row_range {
            let y = lattice.top_left_y + (row as f64 + 0.5) * lattice.pixel_height;
            for col in col_range.clone() {
                let x = lattice.top_left_x + (col as f64 + 0.5) * lattice.pixel_width;
                if !polygon.contains(&Point::new(x, y)) {
                    continue;
                }
                if let Some(value) = field.value_at(x, y) {
                    samples.push(value);
                }
            }
        }
        samples
    }
}
