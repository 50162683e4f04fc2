use crate::io::raster::RasterReader;
use crate::types::{valid_extent, BoundingBox, Raster, SlideResult};
use std::path::{Path, PathBuf};

/// Digital Elevation Model reader
pub struct DemReader;

impl DemReader {
    /// Read DEM tiles in the given order; the first one is representative
    pub fn read_tiles<P: AsRef<Path>>(tile_paths: &[P]) -> SlideResult<Vec<Raster>> {
        log::info!("Reading {} DEM tiles", tile_paths.len());
        tile_paths
            .iter()
            .enumerate()
            .map(|(i, path)| RasterReader::read_band(path, 1, &format!("dem_tile_{}", i)))
            .collect()
    }

    /// Find DEM tiles in a directory, sorted by file name
    pub fn find_dem_files<P: AsRef<Path>>(dir: P) -> SlideResult<Vec<PathBuf>> {
        let mut dem_files = Vec::new();
        for entry in std::fs::read_dir(dir.as_ref())?.flatten() {
            let path = entry.path();
            if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
                let extension = extension.to_ascii_lowercase();
                if extension == "hgt" || extension == "tif" || extension == "tiff" {
                    dem_files.push(path);
                }
            }
        }
        dem_files.sort();
        log::info!("Found {} DEM files in {}", dem_files.len(), dir.as_ref().display());
        Ok(dem_files)
    }

    /// Check that valid DEM data covers the required extent
    pub fn validate_dem_coverage(dem: &Raster, required: &BoundingBox) -> bool {
        let Some(dem_bbox) = valid_extent(dem) else {
            log::warn!("DEM contains no valid elevation");
            return false;
        };
        let coverage_ok = dem_bbox.min_x <= required.min_x
            && dem_bbox.max_x >= required.max_x
            && dem_bbox.min_y <= required.min_y
            && dem_bbox.max_y >= required.max_y;

        if coverage_ok {
            log::info!("DEM provides adequate coverage");
        } else {
            log::warn!("DEM coverage insufficient");
            log::warn!(
                "Required: x [{:.3}, {:.3}], y [{:.3}, {:.3}]",
                required.min_x, required.max_x, required.min_y, required.max_y
            );
            log::warn!(
                "Available: x [{:.3}, {:.3}], y [{:.3}, {:.3}]",
                dem_bbox.min_x, dem_bbox.max_x, dem_bbox.min_y, dem_bbox.max_y
            );
        }
        coverage_ok
    }
}
