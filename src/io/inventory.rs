use crate::core::grid_align::{transformer_between, PointTransform};
use crate::io::raster::RasterReader;
use crate::types::{Crs, ObjectId, PolygonFeature, PolygonInventory, SlideError, SlideResult};
use gdal::vector::{FieldValue, LayerAccess};
use gdal::Dataset;
use geo::{Coord, LineString, MultiPolygon, Polygon};
use std::path::Path;

/// Reads a landslide polygon inventory from any OGR vector source
pub struct InventoryReader;

impl InventoryReader {
    /// Read the first layer, keyed by `id_field`
    ///
    /// With `target_crs` set, polygons are reprojected into it.
    pub fn read<P: AsRef<Path>>(
        path: P,
        id_field: &str,
        target_crs: Option<&Crs>,
    ) -> SlideResult<PolygonInventory> {
        log::info!("Reading landslide inventory from: {}", path.as_ref().display());
        let dataset = Dataset::open(path.as_ref())?;
        let mut layer = dataset.layer(0)?;
        let source_crs = layer
            .spatial_ref()
            .and_then(|srs| RasterReader::crs_from_spatial_ref(&srs));

        let mut features = Vec::new();
        let mut skipped = 0usize;
        for feature in layer.features() {
            let object_id = match feature.field(id_field)? {
                Some(value) => Self::object_id(value, id_field)?,
                None => {
                    return Err(SlideError::InvalidFormat(format!(
                        "Feature without '{}' attribute",
                        id_field
                    )))
                }
            };
            let geometry = match feature.geometry_by_index(0)?.to_geo()? {
                geo::Geometry::Polygon(polygon) => MultiPolygon::from(polygon),
                geo::Geometry::MultiPolygon(multi) => multi,
                other => {
                    log::warn!("Skipping non-polygon feature {} ({:?})", object_id, kind(&other));
                    skipped += 1;
                    continue;
                }
            };
            features.push(PolygonFeature { object_id, geometry });
        }
        if skipped > 0 {
            log::warn!("Skipped {} non-polygon features", skipped);
        }
        log::info!("Read {} landslide polygons", features.len());

        let inventory = PolygonInventory::new(features, source_crs)?;
        match target_crs {
            Some(target) => Self::reproject(&inventory, target),
            None => Ok(inventory),
        }
    }

    fn object_id(value: FieldValue, id_field: &str) -> SlideResult<ObjectId> {
        match value {
            FieldValue::IntegerValue(v) => Ok(ObjectId::Int(v as i64)),
            FieldValue::Integer64Value(v) => Ok(ObjectId::Int(v)),
            FieldValue::RealValue(v) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => Ok(ObjectId::Int(v as i64)),
            FieldValue::StringValue(v) => Ok(ObjectId::Text(v)),
            other => Err(SlideError::InvalidFormat(format!(
                "Unsupported '{}' identifier value: {:?}",
                id_field, other
            ))),
        }
    }

    /// Inventory with every polygon expressed in `target`
    pub fn reproject(inventory: &PolygonInventory, target: &Crs) -> SlideResult<PolygonInventory> {
        let source = inventory.crs().ok_or_else(|| {
            SlideError::Alignment("Inventory has no coordinate reference system".to_string())
        })?;
        if source == target {
            return Ok(inventory.clone());
        }
        log::info!("Reprojecting inventory from {} to {}", source, target);
        let transform = transformer_between(source, target)?;
        let features = inventory
            .features()
            .iter()
            .map(|feature| {
                Ok(PolygonFeature {
                    object_id: feature.object_id.clone(),
                    geometry: reproject_multipolygon(&feature.geometry, transform.as_ref())?,
                })
            })
            .collect::<SlideResult<Vec<_>>>()?;
        PolygonInventory::new(features, Some(target.clone()))
    }
}

fn kind(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::LineString(_) | geo::Geometry::Line(_) => "LineString",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        _ => "other",
    }
}

/// Apply a point transform to every vertex
pub fn reproject_multipolygon(
    multi: &MultiPolygon<f64>,
    transform: &dyn PointTransform,
) -> SlideResult<MultiPolygon<f64>> {
    let ring = |line: &LineString<f64>| -> SlideResult<LineString<f64>> {
        let mut xs: Vec<f64> = line.coords().map(|c| c.x).collect();
        let mut ys: Vec<f64> = line.coords().map(|c| c.y).collect();
        transform.transform(&mut xs, &mut ys)?;
        Ok(LineString::from(
            xs.into_iter()
                .zip(ys)
                .map(|(x, y)| Coord { x, y })
                .collect::<Vec<_>>(),
        ))
    };
    let polygons = multi
        .iter()
        .map(|polygon| {
            let exterior = ring(polygon.exterior())?;
            let interiors = polygon
                .interiors()
                .iter()
                .map(|line| ring(line))
                .collect::<SlideResult<Vec<_>>>()?;
            Ok(Polygon::new(exterior, interiors))
        })
        .collect::<SlideResult<Vec<_>>>()?;
    Ok(MultiPolygon::new(polygons))
}
