//! SARslide: SAR acquisition geometry and geometric decorrelation per landslide
//!
//! Derives terrain-relative radar viewing angles and a first-order geometric
//! coherence estimate from a DEM and one acquisition's incidence-angle band,
//! then summarizes every field as a spatial median over each polygon of a
//! landslide inventory.

pub mod config;
pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use crate::config::PipelineConfig;
pub use crate::core::{
    DecorrelationModel, GridAligner, LandslideGeometryPipeline, PipelineInputs, PipelineOutput, Product,
    RadarGeometryModel, SensorConstants, TerrainModel, ZonalAggregator, ZonalTable,
};
pub use crate::io::{run_from_files, FileSources};
pub use crate::types::{
    AcquisitionInfo, BoundingBox, Crs, GeoTransform, GridSpec, ObjectId, PolygonFeature, PolygonInventory,
    Raster, SarAcquisition, SlideError, SlideResult,
};

#[cfg(feature = "python")]
mod python {
    use super::*;
    use numpy::{IntoPyArray, PyArray2, PyReadonlyArray2};
    use pyo3::exceptions::{PyRuntimeError, PyValueError};
    use pyo3::prelude::*;
    use std::path::PathBuf;

    fn to_py_err(e: SlideError) -> PyErr {
        match e {
            SlideError::Config(_) => PyValueError::new_err(e.to_string()),
            _ => PyRuntimeError::new_err(e.to_string()),
        }
    }

    /// Modeled geometric coherence for an array of local incidence angles (radians)
    #[pyfunction]
    #[pyo3(signature = (local_incidence, b_perp, mode = "IW2"))]
    fn geometric_coherence<'py>(
        py: Python<'py>,
        local_incidence: PyReadonlyArray2<'py, f64>,
        b_perp: f64,
        mode: &str,
    ) -> PyResult<&'py PyArray2<f64>> {
        let constants = SensorConstants::for_mode(mode)
            .ok_or_else(|| PyValueError::new_err(format!("Unknown sensor mode: {}", mode)))?;
        let model = DecorrelationModel::new(b_perp, constants).map_err(to_py_err)?;
        let coherence = local_incidence.as_array().mapv(|theta| model.coherence(theta));
        Ok(coherence.into_pyarray(py))
    }

    /// Range-direction slope for slope/relative-aspect arrays (radians)
    #[pyfunction]
    fn range_slope<'py>(
        py: Python<'py>,
        slope: PyReadonlyArray2<'py, f64>,
        relative_aspect: PyReadonlyArray2<'py, f64>,
    ) -> PyResult<&'py PyArray2<f64>> {
        let slope = slope.as_array();
        let relative_aspect = relative_aspect.as_array();
        if slope.dim() != relative_aspect.dim() {
            return Err(PyValueError::new_err("slope and relative_aspect shapes differ"));
        }
        let out = ndarray::Zip::from(slope)
            .and(relative_aspect)
            .map_collect(|&s, &phi| RadarGeometryModel::range_slope(s, phi));
        Ok(out.into_pyarray(py))
    }

    /// Run the file-based pipeline; returns the written file paths
    #[pyfunction]
    #[pyo3(signature = (dem_paths, incidence_path, inventory_path, output_dir, config_path = None, area_of_interest = None))]
    fn run_pipeline(
        dem_paths: Vec<String>,
        incidence_path: String,
        inventory_path: String,
        output_dir: String,
        config_path: Option<String>,
        area_of_interest: Option<(f64, f64, f64, f64)>,
    ) -> PyResult<Vec<String>> {
        let config = match config_path {
            Some(path) => PipelineConfig::from_json_file(path).map_err(to_py_err)?,
            None => PipelineConfig::default(),
        };
        let sources = FileSources {
            dem_paths: dem_paths.into_iter().map(PathBuf::from).collect(),
            incidence_path: incidence_path.into(),
            inventory_path: inventory_path.into(),
            area_of_interest: area_of_interest.map(|(min_x, min_y, max_x, max_y)| BoundingBox {
                min_x,
                max_x,
                min_y,
                max_y,
            }),
        };
        let (_, written) = run_from_files(config, &sources, output_dir).map_err(to_py_err)?;
        Ok(written
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect())
    }

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(geometric_coherence, m)?)?;
        m.add_function(wrap_pyfunction!(range_slope, m)?)?;
        m.add_function(wrap_pyfunction!(run_pipeline, m)?)?;
        Ok(())
    }
}
