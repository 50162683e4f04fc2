use crate::config::PipelineConfig;
use crate::core::pipeline::{LandslideGeometryPipeline, PipelineInputs, PipelineOutput};
use crate::io::dem::DemReader;
use crate::io::export::TableWriter;
use crate::io::inventory::InventoryReader;
use crate::io::sar::IncidenceReader;
use crate::types::{BoundingBox, SlideError, SlideResult};
use std::path::{Path, PathBuf};

/// On-disk locations of every pipeline input
#[derive(Debug, Clone)]
pub struct FileSources {
    /// DEM tiles; the first is the representative tile
    pub dem_paths: Vec<PathBuf>,
    /// Raster carrying the incidence-angle band
    pub incidence_path: PathBuf,
    /// Vector landslide inventory
    pub inventory_path: PathBuf,
    /// Area of interest in the incidence raster's CRS (None = whole footprint)
    pub area_of_interest: Option<BoundingBox>,
}

impl FileSources {
    /// Load every handle, reprojecting the inventory onto the SAR CRS
    pub fn load(&self, config: &PipelineConfig) -> SlideResult<PipelineInputs> {
        let dem_tiles = DemReader::read_tiles(&self.dem_paths)?;
        if dem_tiles.is_empty() {
            return Err(SlideError::Processing("No DEM tiles given".to_string()));
        }

        let acquisition = IncidenceReader::read(&self.incidence_path)?;
        let sar_crs = acquisition.incidence.grid.crs.clone().ok_or_else(|| {
            SlideError::Alignment(format!(
                "Incidence raster {} has no projection",
                self.incidence_path.display()
            ))
        })?;

        let inventory = InventoryReader::read(&self.inventory_path, &config.id_field, Some(&sar_crs))?;
        let area_of_interest = match &self.area_of_interest {
            Some(bbox) => bbox.to_polygon(),
            None => acquisition.footprint.clone(),
        };

        Ok(PipelineInputs {
            dem_tiles,
            acquisition,
            area_of_interest,
            inventory,
        })
    }
}

/// Load inputs, run the pipeline and write every table to `output_dir`
pub fn run_from_files<P: AsRef<Path>>(
    config: PipelineConfig,
    sources: &FileSources,
    output_dir: P,
) -> SlideResult<(PipelineOutput, Vec<PathBuf>)> {
    let pipeline = LandslideGeometryPipeline::new(config)?;
    let inputs = sources.load(pipeline.config())?;
    let output = pipeline.run(&inputs)?;
    let written = TableWriter::new(output_dir)?.write_output(&output)?;
    Ok((output, written))
}
