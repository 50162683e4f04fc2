use crate::core::decorrelation::SensorConstants;
use crate::core::grid_align::Resampling;
use crate::types::{SlideError, SlideResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parameters for one landslide geometry run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Perpendicular baseline in metres
    pub b_perp: f64,
    /// Sensor constants for the acquisition's mode / sub-swath
    pub sensor: SensorConstants,
    /// Zonal sampling spacing in metres, converted to degrees on geographic grids (None = native pixels)
    pub zonal_scale: Option<f64>,
    /// Canonical grid pixel size in metres (None = incidence raster's own)
    pub analysis_resolution: Option<f64>,
    /// Skip the look-direction estimate and use this bearing (degrees)
    pub look_direction_deg: Option<f64>,
    /// Also export the azimuth-direction slope component
    pub include_azimuth_slope: bool,
    /// Inventory attribute holding the unique polygon identifier
    pub id_field: String,
    /// Kernel used to mosaic DEM tiles
    pub dem_resampling: Resampling,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            b_perp: 150.0,
            sensor: SensorConstants::default(),
            zonal_scale: Some(10.0),
            analysis_resolution: None,
            look_direction_deg: None,
            include_azimuth_slope: false,
            id_field: "object_id".to_string(),
            dem_resampling: Resampling::Bilinear,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file; missing keys take defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> SlideResult<Self> {
        log::info!("Reading pipeline configuration: {}", path.as_ref().display());
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> SlideResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SlideResult<()> {
        if !(self.b_perp.is_finite() && self.b_perp >= 0.0) {
            return Err(SlideError::Config(format!(
                "b_perp must be a non-negative number of metres, got {}",
                self.b_perp
            )));
        }
        self.sensor.validate()?;

        for (name, value) in [
            ("zonal_scale", self.zonal_scale),
            ("analysis_resolution", self.analysis_resolution),
        ] {
            if let Some(v) = value {
                if !(v.is_finite() && v > 0.0) {
                    return Err(SlideError::Config(format!("{} must be positive, got {}", name, v)));
                }
            }
        }
        if let Some(bearing) = self.look_direction_deg {
            if !bearing.is_finite() {
                return Err(SlideError::Config("look_direction_deg must be finite".to_string()));
            }
        }
        if self.id_field.trim().is_empty() {
            return Err(SlideError::Config("id_field must not be empty".to_string()));
        }
        Ok(())
    }
}
