//! Core raster geometry and aggregation modules

pub mod decorrelation;
pub mod grid_align;
pub mod pipeline;
pub mod radar_geometry;
pub mod terrain;
pub mod zonal;

// Re-export main types
pub use decorrelation::{CoherenceField, DecorrelationModel, SensorConstants};
pub use grid_align::{GridAligner, PointTransform, Resampling};
pub use pipeline::{LandslideGeometryPipeline, PipelineInputs, PipelineOutput, Product, ProductReport};
pub use radar_geometry::{LookDirectionEstimate, RadarGeometry, RadarGeometryModel};
pub use terrain::{TerrainDerivatives, TerrainModel};
pub use zonal::{median, ZonalAggregator, ZonalRow, ZonalTable};
