use crate::types::{Crs, GeoTransform, GridSpec, Raster, SlideError, SlideResult};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, Metadata};
use ndarray::Array2;
use std::path::Path;

/// GDAL-backed raster band reader
pub struct RasterReader;

impl RasterReader {
    /// Read one band (1-based) as a no-data-aware f64 raster
    pub fn read_band<P: AsRef<Path>>(path: P, band_index: isize, name: &str) -> SlideResult<Raster> {
        log::info!("Reading raster band {} from: {}", band_index, path.as_ref().display());
        let dataset = Dataset::open(path.as_ref())?;
        Self::read_dataset_band(&dataset, band_index, name)
    }

    /// Read the first band whose description matches `description`
    pub fn read_named_band<P: AsRef<Path>>(path: P, description: &str) -> SlideResult<Raster> {
        let dataset = Dataset::open(path.as_ref())?;
        let band_index = Self::find_band(&dataset, description)?;
        log::debug!("Band '{}' is index {} in {}", description, band_index, path.as_ref().display());
        Self::read_dataset_band(&dataset, band_index, description)
    }

    fn find_band(dataset: &Dataset, description: &str) -> SlideResult<isize> {
        for index in 1..=dataset.raster_count() {
            let band = dataset.rasterband(index)?;
            if band.description()?.eq_ignore_ascii_case(description) {
                return Ok(index);
            }
        }
        if dataset.raster_count() == 1 {
            log::warn!("No band named '{}'; using the only band", description);
            return Ok(1);
        }
        Err(SlideError::InvalidFormat(format!(
            "Dataset has no band named '{}'",
            description
        )))
    }

    fn read_dataset_band(dataset: &Dataset, band_index: isize, name: &str) -> SlideResult<Raster> {
        let geo_transform = GeoTransform::from_gdal(dataset.geo_transform()?);
        let (width, height) = dataset.raster_size();
        let crs = Self::dataset_crs(dataset);
        if crs.is_none() {
            log::warn!("Raster '{}' carries no projection", name);
        }

        let band = dataset.rasterband(band_index)?;
        let nodata = band.no_data_value();
        let buffer = band.read_as::<f64>((0, 0), (width, height), (width, height), None)?;

        let mut data = Array2::from_shape_vec((height, width), buffer.data)
            .map_err(|e| SlideError::Processing(format!("Failed to reshape band data: {}", e)))?;
        if let Some(nodata) = nodata {
            data.mapv_inplace(|v| if v == nodata { f64::NAN } else { v });
        }

        log::debug!("Raster '{}': {}x{}, {:?}", name, width, height, geo_transform);
        Ok(Raster::new(
            name,
            data,
            GridSpec {
                crs,
                geo_transform,
                width,
                height,
            },
        ))
    }

    /// Prefer the EPSG code; fall back to the WKT definition
    pub fn dataset_crs(dataset: &Dataset) -> Option<Crs> {
        let srs = dataset.spatial_ref().ok()?;
        Self::crs_from_spatial_ref(&srs)
    }

    pub fn crs_from_spatial_ref(srs: &SpatialRef) -> Option<Crs> {
        if let Ok(code) = srs.auth_code() {
            if code > 0 {
                return Some(Crs::Epsg(code as u32));
            }
        }
        srs.to_wkt().ok().filter(|wkt| !wkt.is_empty()).map(Crs::Wkt)
    }
}
