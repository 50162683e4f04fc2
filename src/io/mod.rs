//! Source and sink adapters backed by GDAL

pub mod dem;
pub mod export;
pub mod inventory;
pub mod raster;
pub mod sar;
pub mod sources;

pub use dem::DemReader;
pub use export::TableWriter;
pub use inventory::InventoryReader;
pub use raster::RasterReader;
pub use sar::IncidenceReader;
pub use sources::{run_from_files, FileSources};
