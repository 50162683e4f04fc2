use chrono::{DateTime, Utc};
use geo::{BoundingRect, Coord, LineString, MultiPolygon, Polygon};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Per-pixel scalar field values; `NaN` marks no-data
pub type Field = Array2<f64>;

/// Metres per degree of latitude
pub const METERS_PER_DEGREE_LAT: f64 = 110_574.0;
/// Metres per degree of longitude at the equator
pub const METERS_PER_DEGREE_LON: f64 = 111_320.0;

/// Coordinate reference system descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Crs {
    /// Registered EPSG code (e.g. 4326, 32633)
    Epsg(u32),
    /// Full OGC WKT definition
    Wkt(String),
}

impl Crs {
    /// Whether coordinates are angular (degrees) rather than metric
    pub fn is_geographic(&self) -> bool {
        match self {
            Crs::Epsg(code) => matches!(code, 4326 | 4258 | 4269 | 4979),
            Crs::Wkt(wkt) => {
                let head = wkt.trim_start();
                head.starts_with("GEOGCS") || head.starts_with("GEOGCRS")
            }
        }
    }
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Crs::Epsg(code) => write!(f, "EPSG:{}", code),
            Crs::Wkt(wkt) => {
                let short: String = wkt.chars().take(32).collect();
                write!(f, "WKT({}...)", short)
            }
        }
    }
}

/// Geospatial bounding box in the units of the owning CRS
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x < other.max_x
            && other.min_x < self.max_x
            && self.min_y < other.max_y
            && other.min_y < self.max_y
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            max_x: self.max_x.max(other.max_x),
            min_y: self.min_y.min(other.min_y),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Rectangle polygon covering the box
    pub fn to_polygon(&self) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (self.min_x, self.min_y),
                (self.max_x, self.min_y),
                (self.max_x, self.max_y),
                (self.min_x, self.max_y),
                (self.min_x, self.min_y),
            ]),
            vec![],
        )
    }
}

/// Geospatial transformation parameters (GDAL ordering)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform without rotation terms
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_size: f64) -> Self {
        Self {
            top_left_x,
            pixel_width: pixel_size,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_size,
        }
    }

    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    /// Map coordinates of the centre of pixel (row, col)
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.top_left_x + (col as f64 + 0.5) * self.pixel_width,
            self.top_left_y + (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Fractional (row, col) index where integer values are pixel centres
    pub fn fractional_index(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (y - self.top_left_y) / self.pixel_height - 0.5,
            (x - self.top_left_x) / self.pixel_width - 0.5,
        )
    }

    pub fn is_axis_aligned(&self) -> bool {
        self.rotation_x == 0.0 && self.rotation_y == 0.0
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.pixel_width.is_finite() && self.pixel_height.is_finite())
            || self.pixel_width == 0.0
            || self.pixel_height == 0.0
    }
}

/// A pixel grid: CRS, geotransform and size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub crs: Option<Crs>,
    pub geo_transform: GeoTransform,
    pub width: usize,
    pub height: usize,
}

impl GridSpec {
    pub fn new(crs: Crs, geo_transform: GeoTransform, width: usize, height: usize) -> Self {
        Self {
            crs: Some(crs),
            geo_transform,
            width,
            height,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Map-unit step (x, y) spanning `meters` on the ground
    ///
    /// Geographic grids are converted at the latitude of the grid centre.
    pub fn metric_step(&self, meters: f64) -> (f64, f64) {
        let geographic = self.crs.as_ref().map(Crs::is_geographic).unwrap_or(false);
        if !geographic {
            return (meters, meters);
        }
        let bounds = self.bounds();
        let lat = (0.5 * (bounds.min_y + bounds.max_y)).to_radians();
        (
            meters / (METERS_PER_DEGREE_LON * lat.cos()),
            meters / METERS_PER_DEGREE_LAT,
        )
    }

    /// Outer extent of the grid
    pub fn bounds(&self) -> BoundingBox {
        let gt = &self.geo_transform;
        let x0 = gt.top_left_x;
        let x1 = gt.top_left_x + self.width as f64 * gt.pixel_width;
        let y0 = gt.top_left_y;
        let y1 = gt.top_left_y + self.height as f64 * gt.pixel_height;
        BoundingBox {
            min_x: x0.min(x1),
            max_x: x0.max(x1),
            min_y: y0.min(y1),
            max_y: y0.max(y1),
        }
    }
}

/// A named raster field on an explicit grid
#[derive(Debug, Clone)]
pub struct Raster {
    pub name: String,
    pub data: Field,
    pub grid: GridSpec,
}

impl Raster {
    pub fn new(name: impl Into<String>, data: Field, grid: GridSpec) -> Self {
        Self {
            name: name.into(),
            data,
            grid,
        }
    }

    /// Broadcast a measured scalar across a grid
    pub fn constant(name: impl Into<String>, value: f64, grid: GridSpec) -> Self {
        let data = Array2::from_elem(grid.shape(), value);
        Self::new(name, data, grid)
    }

    /// Derive a new field on the same grid
    pub fn with_data(&self, name: impl Into<String>, data: Field) -> Self {
        Self::new(name, data, self.grid.clone())
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }

    /// Value of the pixel containing map coordinate (x, y)
    pub fn value_at(&self, x: f64, y: f64) -> Option<f64> {
        let (row, col) = self.grid.geo_transform.fractional_index(x, y);
        let row = nearest_index(row, self.grid.height)?;
        let col = nearest_index(col, self.grid.width)?;
        let value = *self.data.get([row, col])?;
        (!value.is_nan()).then_some(value)
    }
}

/// Identifying attribute of an inventory polygon
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObjectId {
    Int(i64),
    Text(String),
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectId::Int(id) => write!(f, "{}", id),
            ObjectId::Text(id) => write!(f, "{}", id),
        }
    }
}

/// One landslide polygon and its identifier
#[derive(Debug, Clone)]
pub struct PolygonFeature {
    pub object_id: ObjectId,
    pub geometry: MultiPolygon<f64>,
}

/// Read-only landslide inventory with unique identifiers
#[derive(Debug, Clone)]
pub struct PolygonInventory {
    features: Vec<PolygonFeature>,
    crs: Option<Crs>,
}

impl PolygonInventory {
    pub fn new(features: Vec<PolygonFeature>, crs: Option<Crs>) -> SlideResult<Self> {
        let mut seen = HashSet::with_capacity(features.len());
        for feature in &features {
            if !seen.insert(&feature.object_id) {
                return Err(SlideError::InvalidFormat(format!(
                    "Duplicate object_id in inventory: {}",
                    feature.object_id
                )));
            }
        }
        Ok(Self { features, crs })
    }

    pub fn features(&self) -> &[PolygonFeature] {
        &self.features
    }

    pub fn crs(&self) -> Option<&Crs> {
        self.crs.as_ref()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Extent of all polygons, `None` for an empty inventory
    pub fn bounds(&self) -> Option<BoundingBox> {
        self.features
            .iter()
            .filter_map(|feature| feature.geometry.bounding_rect())
            .map(|rect| BoundingBox {
                min_x: rect.min().x,
                max_x: rect.max().x,
                min_y: rect.min().y,
                max_y: rect.max().y,
            })
            .reduce(|a, b| a.union(&b))
    }
}

/// Acquisition descriptors carried alongside the incidence band
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AcquisitionInfo {
    pub platform: Option<String>,
    /// Sensor mode / sub-swath label, e.g. "IW2"
    pub mode: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
}

/// A SAR acquisition's incidence-angle band and footprint
#[derive(Debug, Clone)]
pub struct SarAcquisition {
    /// Incidence angle in degrees
    pub incidence: Raster,
    pub footprint: Polygon<f64>,
    pub info: AcquisitionInfo,
}

impl SarAcquisition {
    /// Acquisition whose footprint is the valid extent of the incidence band
    pub fn from_incidence(incidence: Raster, info: AcquisitionInfo) -> SlideResult<Self> {
        let footprint = valid_extent(&incidence)
            .ok_or_else(|| {
                SlideError::Geometry(format!(
                    "Incidence raster '{}' contains no valid pixels",
                    incidence.name
                ))
            })?
            .to_polygon();
        Ok(Self {
            incidence,
            footprint,
            info,
        })
    }
}

/// Index of the pixel whose footprint contains fractional index `f`
pub fn nearest_index(f: f64, len: usize) -> Option<usize> {
    let index = (f + 0.5).floor();
    if !index.is_finite() || index < 0.0 || index >= len as f64 {
        return None;
    }
    Some(index as usize)
}

/// Extent covered by non-NaN pixels
pub fn valid_extent(raster: &Raster) -> Option<BoundingBox> {
    let gt = &raster.grid.geo_transform;
    let mut extent: Option<BoundingBox> = None;
    for ((row, col), value) in raster.data.indexed_iter() {
        if value.is_nan() {
            continue;
        }
        let a = Coord {
            x: gt.top_left_x + col as f64 * gt.pixel_width,
            y: gt.top_left_y + row as f64 * gt.pixel_height,
        };
        let b = Coord {
            x: a.x + gt.pixel_width,
            y: a.y + gt.pixel_height,
        };
        let cell = BoundingBox {
            min_x: a.x.min(b.x),
            max_x: a.x.max(b.x),
            min_y: a.y.min(b.y),
            max_y: a.y.max(b.y),
        };
        extent = Some(match extent {
            Some(e) => e.union(&cell),
            None => cell,
        });
    }
    extent
}

/// Error types for landslide geometry processing
#[derive(Debug, thiserror::Error)]
pub enum SlideError {
    #[error("Alignment error: {0}")]
    Alignment(String),

    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for landslide geometry operations
pub type SlideResult<T> = Result<T, SlideError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(width: usize, height: usize) -> GridSpec {
        GridSpec::new(
            Crs::Epsg(32633),
            GeoTransform::north_up(1000.0, 2000.0, 10.0),
            width,
            height,
        )
    }

    #[test]
    fn test_grid_bounds_north_up() {
        let bounds = grid(4, 3).bounds();
        assert_eq!(bounds.min_x, 1000.0);
        assert_eq!(bounds.max_x, 1040.0);
        assert_eq!(bounds.min_y, 1970.0);
        assert_eq!(bounds.max_y, 2000.0);
    }

    #[test]
    fn test_pixel_center_round_trip() {
        let gt = GeoTransform::north_up(0.0, 100.0, 5.0);
        let (x, y) = gt.pixel_center(3, 7);
        let (row, col) = gt.fractional_index(x, y);
        assert!((row - 3.0).abs() < 1e-12);
        assert!((col - 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_value_at_skips_nodata() {
        let mut data = Array2::from_elem((2, 2), 1.0);
        data[[0, 1]] = f64::NAN;
        let raster = Raster::new("t", data, grid(2, 2));
        assert_eq!(raster.value_at(1005.0, 1995.0), Some(1.0));
        assert_eq!(raster.value_at(1015.0, 1995.0), None);
        assert_eq!(raster.value_at(900.0, 1995.0), None);
    }

    #[test]
    fn test_metric_step_projected_and_geographic() {
        assert_eq!(grid(4, 4).metric_step(10.0), (10.0, 10.0));

        // Centre latitude 46 deg
        let geographic = GridSpec::new(Crs::Epsg(4326), GeoTransform::north_up(10.0, 46.01, 0.001), 20, 20);
        let (dx, dy) = geographic.metric_step(10.0);
        assert!((dx - 10.0 / (METERS_PER_DEGREE_LON * 46f64.to_radians().cos())).abs() < 1e-12);
        assert!((dy - 10.0 / METERS_PER_DEGREE_LAT).abs() < 1e-12);
        assert!(dx > dy);
    }

    #[test]
    fn test_value_at_tolerates_short_data() {
        let raster = Raster::new("t", Array2::from_elem((1, 1), 2.0), grid(2, 2));
        assert_eq!(raster.value_at(1005.0, 1995.0), Some(2.0));
        assert_eq!(raster.value_at(1015.0, 1985.0), None);
    }

    #[test]
    fn test_inventory_rejects_duplicate_ids() {
        let poly = BoundingBox {
            min_x: 0.0,
            max_x: 1.0,
            min_y: 0.0,
            max_y: 1.0,
        }
        .to_polygon();
        let features = vec![
            PolygonFeature {
                object_id: ObjectId::Int(7),
                geometry: poly.clone().into(),
            },
            PolygonFeature {
                object_id: ObjectId::Int(7),
                geometry: poly.into(),
            },
        ];
        assert!(matches!(
            PolygonInventory::new(features, None),
            Err(SlideError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_inventory_bounds() {
        let square = |min_x: f64, min_y: f64| PolygonFeature {
            object_id: ObjectId::Text(format!("{}-{}", min_x, min_y)),
            geometry: BoundingBox {
                min_x,
                max_x: min_x + 5.0,
                min_y,
                max_y: min_y + 5.0,
            }
            .to_polygon()
            .into(),
        };
        let inventory = PolygonInventory::new(vec![square(0.0, 10.0), square(20.0, -5.0)], None).unwrap();
        let bounds = inventory.bounds().unwrap();
        assert_eq!((bounds.min_x, bounds.max_x), (0.0, 25.0));
        assert_eq!((bounds.min_y, bounds.max_y), (-5.0, 15.0));
        assert!(PolygonInventory::new(vec![], None).unwrap().bounds().is_none());
    }

    #[test]
    fn test_valid_extent_ignores_nan_border() {
        let mut data = Array2::from_elem((3, 3), f64::NAN);
        data[[1, 1]] = 30.0;
        let raster = Raster::new("theta", data, grid(3, 3));
        let extent = valid_extent(&raster).unwrap();
        assert_eq!(extent.min_x, 1010.0);
        assert_eq!(extent.max_x, 1020.0);
        assert_eq!(extent.min_y, 1980.0);
        assert_eq!(extent.max_y, 1990.0);
    }

    #[test]
    fn test_geographic_detection() {
        assert!(Crs::Epsg(4326).is_geographic());
        assert!(!Crs::Epsg(32633).is_geographic());
        assert!(Crs::Wkt("GEOGCS[\"WGS 84\"]".to_string()).is_geographic());
    }
}
