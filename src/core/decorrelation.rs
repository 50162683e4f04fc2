use crate::types::{Raster, SlideError, SlideResult};
use serde::{Deserialize, Serialize};

/// Speed of light in vacuum (m/s)
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// |tan θ_loc| below this is treated as grazing geometry
pub const TAN_SINGULARITY_THRESHOLD: f64 = 1e-12;

/// Acquisition geometry constants for one sensor mode / sub-swath
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConstants {
    /// Mode label the constants belong to, e.g. "IW2"
    pub mode: String,
    /// Radar wavelength λ (m)
    pub wavelength: f64,
    /// Earth-satellite distance r (m)
    pub slant_range: f64,
    /// Chirp bandwidth Bw (Hz)
    pub bandwidth: f64,
    /// Speed of light c (m/s)
    #[serde(default = "default_speed_of_light")]
    pub speed_of_light: f64,
}

fn default_speed_of_light() -> f64 {
    SPEED_OF_LIGHT
}

impl SensorConstants {
    const S1_WAVELENGTH: f64 = 0.05547;
    const S1_SLANT_RANGE: f64 = 693_000.0;

    fn sentinel1(mode: &str, bandwidth: f64) -> Self {
        Self {
            mode: mode.to_string(),
            wavelength: Self::S1_WAVELENGTH,
            slant_range: Self::S1_SLANT_RANGE,
            bandwidth,
            speed_of_light: SPEED_OF_LIGHT,
        }
    }

    /// Sentinel-1 IW1 sub-swath
    pub fn sentinel1_iw1() -> Self {
        Self::sentinel1("IW1", 56_500_000.0)
    }

    /// Sentinel-1 IW2 sub-swath
    pub fn sentinel1_iw2() -> Self {
        Self::sentinel1("IW2", 48_300_000.0)
    }

    /// Sentinel-1 IW3 sub-swath
    pub fn sentinel1_iw3() -> Self {
        Self::sentinel1("IW3", 42_800_000.0)
    }

    /// Preset lookup by sub-swath label
    pub fn for_mode(mode: &str) -> Option<Self> {
        match mode.to_uppercase().as_str() {
            "IW1" => Some(Self::sentinel1_iw1()),
            "IW2" => Some(Self::sentinel1_iw2()),
            "IW3" => Some(Self::sentinel1_iw3()),
            _ => None,
        }
    }

    pub fn validate(&self) -> SlideResult<()> {
        let fields = [
            ("wavelength", self.wavelength),
            ("slant_range", self.slant_range),
            ("bandwidth", self.bandwidth),
            ("speed_of_light", self.speed_of_light),
        ];
        for (name, value) in fields {
            if !(value.is_finite() && value > 0.0) {
                return Err(SlideError::Config(format!(
                    "Sensor constant {} for mode {} must be positive, got {}",
                    name, self.mode, value
                )));
            }
        }
        Ok(())
    }
}

impl Default for SensorConstants {
    fn default() -> Self {
        Self::sentinel1_iw2()
    }
}

/// Coherence field plus the number of pixels forced to zero
#[derive(Debug, Clone)]
pub struct CoherenceField {
    pub coherence: Raster,
    pub singular_pixels: usize,
}

/// First-order geometric decorrelation from a single perpendicular baseline
///
/// coh = 1 - (c · Bperp) / (λ · r · Bw · |tan θ_loc|)
#[derive(Debug, Clone)]
pub struct DecorrelationModel {
    b_perp: f64,
    constants: SensorConstants,
}

impl DecorrelationModel {
    pub fn new(b_perp: f64, constants: SensorConstants) -> SlideResult<Self> {
        if !(b_perp.is_finite() && b_perp >= 0.0) {
            return Err(SlideError::Config(format!(
                "Perpendicular baseline must be a non-negative number of metres, got {}",
                b_perp
            )));
        }
        constants.validate()?;
        Ok(Self { b_perp, constants })
    }

    pub fn b_perp(&self) -> f64 {
        self.b_perp
    }

    pub fn constants(&self) -> &SensorConstants {
        &self.constants
    }

    /// Unclamped formula value; `None` at the grazing singularity
    pub fn raw_coherence(&self, local_incidence_rad: f64) -> Option<f64> {
        let tan_abs = local_incidence_rad.tan().abs();
        if !tan_abs.is_finite() {
            // θ_loc at ±π/2: denominator unbounded
            return Some(1.0);
        }
        if tan_abs < TAN_SINGULARITY_THRESHOLD {
            return None;
        }
        let c = &self.constants;
        let numerator = c.speed_of_light * self.b_perp;
        let denominator = c.wavelength * c.slant_range * c.bandwidth * tan_abs;
        Some(1.0 - numerator / denominator)
    }

    /// Coherence clamped to [0, 1]; grazing geometry maps to 0
    pub fn coherence(&self, local_incidence_rad: f64) -> f64 {
        if local_incidence_rad.is_nan() {
            return f64::NAN;
        }
        match self.raw_coherence(local_incidence_rad) {
            Some(raw) => raw.clamp(0.0, 1.0),
            None => 0.0,
        }
    }

    /// Evaluate the model over a local-incidence raster (radians)
    pub fn compute(&self, local_incidence: &Raster) -> CoherenceField {
        let data = local_incidence.data.mapv(|theta| self.coherence(theta));
        let singular_pixels = local_incidence
            .data
            .iter()
            .filter(|theta| !theta.is_nan() && self.raw_coherence(**theta).is_none())
            .count();
        if singular_pixels > 0 {
            log::warn!(
                "{} pixels at grazing local incidence; coherence set to 0",
                singular_pixels
            );
        }
        log::debug!(
            "Coherence for Bperp={} m with {} constants",
            self.b_perp,
            self.constants.mode
        );
        CoherenceField {
            coherence: local_incidence.with_data("coherence", data),
            singular_pixels,
        }
    }
}
