use crate::io::raster::RasterReader;
use crate::types::{AcquisitionInfo, SarAcquisition, SlideResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use gdal::{Dataset, Metadata};
use std::path::Path;

/// Band description of the incidence-angle layer
pub const INCIDENCE_BAND: &str = "angle";

/// Reads a SAR incidence-angle band and its acquisition metadata
pub struct IncidenceReader;

impl IncidenceReader {
    /// Read the incidence band (degrees) and derive the footprint from its valid extent
    pub fn read<P: AsRef<Path>>(path: P) -> SlideResult<SarAcquisition> {
        log::info!("Reading SAR incidence angle from: {}", path.as_ref().display());
        let incidence = RasterReader::read_named_band(path.as_ref(), INCIDENCE_BAND)?;
        let dataset = Dataset::open(path.as_ref())?;
        let info = Self::acquisition_info(&dataset);
        log::debug!("Acquisition info: {:?}", info);
        SarAcquisition::from_incidence(incidence, info)
    }

    fn acquisition_info(dataset: &Dataset) -> AcquisitionInfo {
        let item = |key: &str| dataset.metadata_item(key, "").filter(|v| !v.trim().is_empty());
        AcquisitionInfo {
            platform: item("PLATFORM").or_else(|| item("MISSION_ID")),
            mode: item("SWATH").or_else(|| item("MODE")),
            start_time: item("ACQUISITION_START_TIME").and_then(|v| parse_time(&v)),
        }
    }
}

/// Accept RFC 3339 and the zone-less ISO form used in SAR annotations
pub fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(value.trim()) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value.trim(), "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|t| t.and_utc())
}
