use crate::config::PipelineConfig;
use crate::core::decorrelation::DecorrelationModel;
use crate::core::grid_align::{GridAligner, Resampling};
use crate::core::radar_geometry::{combine_fields, LookDirectionEstimate, RadarGeometryModel};
use crate::core::terrain::TerrainModel;
use crate::core::zonal::{ZonalAggregator, ZonalTable};
use crate::io::dem::DemReader;
use crate::types::{PolygonInventory, Raster, SarAcquisition, SlideError, SlideResult};
use geo::Polygon;
use serde::{Deserialize, Serialize};

/// Named per-polygon products
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Product {
    LocalIncidence,
    RangeSlope,
    TerrainSlope,
    TerrainAspect,
    IncidenceSlopeDifference,
    Coherence,
    AzimuthSlope,
}

impl Product {
    /// Products every run exports
    pub const STANDARD: [Product; 6] = [
        Product::LocalIncidence,
        Product::RangeSlope,
        Product::TerrainSlope,
        Product::TerrainAspect,
        Product::IncidenceSlopeDifference,
        Product::Coherence,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Product::LocalIncidence => "local_incidence_angle",
            Product::RangeSlope => "range_slope",
            Product::TerrainSlope => "terrain_slope",
            Product::TerrainAspect => "terrain_aspect",
            Product::IncidenceSlopeDifference => "incidence_slope_difference",
            Product::Coherence => "geometric_coherence",
            Product::AzimuthSlope => "azimuth_slope",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Product::TerrainSlope | Product::TerrainAspect => "degrees",
            Product::Coherence => "unitless",
            _ => "radians",
        }
    }

    /// Whether the product depends on the look-direction estimate
    pub fn needs_look_direction(&self) -> bool {
        !matches!(self, Product::TerrainSlope | Product::TerrainAspect)
    }
}

impl std::fmt::Display for Product {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Outcome of one product plus its diagnostics
#[derive(Debug, Clone)]
pub struct ProductReport {
    pub product: Product,
    /// Table, or the reason the product could not be computed
    pub outcome: Result<ZonalTable, String>,
    /// Pixels resolved by a clamping/saturation policy
    pub singular_pixels: usize,
}

impl ProductReport {
    pub fn empty_zones(&self) -> usize {
        self.outcome.as_ref().map(|t| t.empty_zones()).unwrap_or(0)
    }
}

/// Everything one run produced
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub look_direction: Option<LookDirectionEstimate>,
    pub reports: Vec<ProductReport>,
}

impl PipelineOutput {
    pub fn report(&self, product: Product) -> Option<&ProductReport> {
        self.reports.iter().find(|r| r.product == product)
    }

    pub fn table(&self, product: Product) -> Option<&ZonalTable> {
        self.report(product).and_then(|r| r.outcome.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (Product, &str)> {
        self.reports
            .iter()
            .filter_map(|r| r.outcome.as_ref().err().map(|e| (r.product, e.as_str())))
    }
}

/// Source-collaborator handles for one run
#[derive(Debug, Clone)]
pub struct PipelineInputs {
    /// Elevation tiles; the first one is the representative tile
    pub dem_tiles: Vec<Raster>,
    pub acquisition: SarAcquisition,
    pub area_of_interest: Polygon<f64>,
    pub inventory: PolygonInventory,
}

/// Aligned intermediate fields shared by all products
struct AlignedFields {
    incidence: Raster,
    slope: Raster,
    aspect: Raster,
}

/// DEM + acquisition geometry -> per-landslide statistic tables
pub struct LandslideGeometryPipeline {
    config: PipelineConfig,
}

impl LandslideGeometryPipeline {
    pub fn new(config: PipelineConfig) -> SlideResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every product against the inventory
    ///
    /// Failures that affect all products (DEM mosaic, grid alignment,
    /// sensor constants) return `Err`. A missing look direction only fails
    /// the products that depend on it.
    pub fn run(&self, inputs: &PipelineInputs) -> SlideResult<PipelineOutput> {
        log::info!(
            "Starting landslide geometry pipeline for {} polygons",
            inputs.inventory.len()
        );
        self.check_sensor_mode(&inputs.acquisition)?;

        let decorrelation = DecorrelationModel::new(self.config.b_perp, self.config.sensor.clone())?;
        let zonal = ZonalAggregator::new(self.config.zonal_scale)?;

        // Step 1: elevation on one pinned projection, then terrain derivatives
        log::info!("Step 1: Mosaicking {} DEM tiles", inputs.dem_tiles.len());
        let dem = GridAligner::mosaic(&inputs.dem_tiles, self.config.dem_resampling)?;
        if dem.grid.crs.as_ref() == inputs.inventory.crs() {
            if let Some(bounds) = inputs.inventory.bounds() {
                DemReader::validate_dem_coverage(&dem, &bounds);
            }
        }
        log::info!("Step 2: Computing terrain slope and aspect");
        let terrain = TerrainModel::compute(&dem)?;

        // Step 3: canonical grid from the incidence band
        log::info!("Step 3: Aligning fields to the SAR grid");
        let aligner = GridAligner::from_reference(
            &inputs.acquisition.incidence,
            self.config.analysis_resolution,
        )?;
        let fields = AlignedFields {
            incidence: aligner.align(&inputs.acquisition.incidence, Resampling::Bilinear)?,
            slope: aligner.align(&terrain.slope, Resampling::Bilinear)?,
            aspect: aligner.align(&terrain.aspect, Resampling::Nearest)?,
        };

        let mut reports = Vec::new();
        let aggregate = |product: Product, field: &Raster, singular_pixels: usize| {
            let outcome = zonal
                .aggregate(field, &inputs.inventory)
                .map(|mut table| {
                    table.field = product.name().to_string();
                    table
                })
                .map_err(|e| e.to_string());
            ProductReport {
                product,
                outcome,
                singular_pixels,
            }
        };

        log::info!("Step 4: Aggregating terrain products");
        reports.push(aggregate(Product::TerrainSlope, &fields.slope, 0));
        reports.push(aggregate(Product::TerrainAspect, &fields.aspect, 0));

        // Step 5: look direction is a full-area barrier for radar products
        log::info!("Step 5: Resolving look direction");
        let look_direction = match self.config.look_direction_deg {
            Some(bearing_deg) => Ok(LookDirectionEstimate {
                bearing_deg,
                sample_count: 0,
            }),
            None => RadarGeometryModel::estimate_look_direction(
                &inputs.acquisition,
                &inputs.area_of_interest,
            ),
        };

        let radar_products = self.radar_products();
        match &look_direction {
            Ok(estimate) => {
                log::info!("Step 6: Computing radar geometry and coherence");
                let model = RadarGeometryModel::new(estimate.bearing_deg)
                    .with_azimuth_slope(self.config.include_azimuth_slope);
                match model.compute(&fields.incidence, &fields.slope, &fields.aspect) {
                    Ok(geometry) => {
                        let difference = combine_fields(&geometry.local_incidence.data, &fields.slope.data, |theta_loc, slope| {
                            theta_loc - slope.to_radians()
                        });
                        let difference = fields.incidence.with_data("incidence_slope_difference", difference);
                        let coherence = decorrelation.compute(&geometry.local_incidence);
                        let saturated = geometry.saturated_pixels;

                        reports.push(aggregate(Product::LocalIncidence, &geometry.local_incidence, saturated));
                        reports.push(aggregate(Product::RangeSlope, &geometry.range_slope, saturated));
                        reports.push(aggregate(Product::IncidenceSlopeDifference, &difference, saturated));
                        reports.push(aggregate(
                            Product::Coherence,
                            &coherence.coherence,
                            coherence.singular_pixels,
                        ));
                        if let Some(azimuth) = &geometry.azimuth_slope {
                            reports.push(aggregate(Product::AzimuthSlope, azimuth, saturated));
                        }
                    }
                    Err(e) => reports.extend(Self::failed(&radar_products, &e)),
                }
            }
            Err(e) => reports.extend(Self::failed(&radar_products, e)),
        }

        for report in &reports {
            match &report.outcome {
                Ok(table) => log::info!(
                    "Product {}: {} rows ({} empty zones, {} singular pixels)",
                    report.product,
                    table.rows.len(),
                    report.empty_zones(),
                    report.singular_pixels
                ),
                Err(reason) => log::error!("Product {} failed: {}", report.product, reason),
            }
        }

        Ok(PipelineOutput {
            look_direction: look_direction.ok(),
            reports,
        })
    }

    fn radar_products(&self) -> Vec<Product> {
        let mut products: Vec<Product> = Product::STANDARD
            .iter()
            .copied()
            .filter(Product::needs_look_direction)
            .collect();
        if self.config.include_azimuth_slope {
            products.push(Product::AzimuthSlope);
        }
        products
    }

    fn failed(products: &[Product], error: &SlideError) -> Vec<ProductReport> {
        products
            .iter()
            .map(|&product| ProductReport {
                product,
                outcome: Err(error.to_string()),
                singular_pixels: 0,
            })
            .collect()
    }

    /// Constants must belong to the acquisition's own mode
    fn check_sensor_mode(&self, acquisition: &SarAcquisition) -> SlideResult<()> {
        match &acquisition.info.mode {
            Some(mode) if !mode.eq_ignore_ascii_case(&self.config.sensor.mode) => {
                Err(SlideError::Config(format!(
                    "Sensor constants are for mode {} but the acquisition is {}",
                    self.config.sensor.mode, mode
                )))
            }
            Some(_) => Ok(()),
            None => {
                log::warn!(
                    "Acquisition declares no mode; using {} constants",
                    self.config.sensor.mode
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AcquisitionInfo, BoundingBox, Crs, GeoTransform, GridSpec, ObjectId, PolygonFeature};
    use ndarray::Array2;

    fn grid() -> GridSpec {
        GridSpec::new(Crs::Epsg(32633), GeoTransform::north_up(0.0, 100.0, 10.0), 10, 10)
    }

    fn inputs(mode: Option<&str>) -> PipelineInputs {
        let dem = Raster::new("dem", Array2::from_shape_fn((10, 10), |(_, j)| j as f64 * 5.0), grid());
        let incidence = Raster::new("theta", Array2::from_shape_fn((10, 10), |(_, j)| 30.0 + j as f64 * 0.1), grid());
        let acquisition = SarAcquisition::from_incidence(
            incidence,
            AcquisitionInfo {
                mode: mode.map(str::to_string),
                ..Default::default()
            },
        )
        .unwrap();
        let area_of_interest = acquisition.footprint.clone();
        let inventory = PolygonInventory::new(
            vec![PolygonFeature {
                object_id: ObjectId::Int(1),
                geometry: BoundingBox {
                    min_x: 20.0,
                    max_x: 60.0,
                    min_y: 20.0,
                    max_y: 60.0,
                }
                .to_polygon()
                .into(),
            }],
            Some(Crs::Epsg(32633)),
        )
        .unwrap();
        PipelineInputs {
            dem_tiles: vec![dem],
            acquisition,
            area_of_interest,
            inventory,
        }
    }

    #[test]
    fn test_product_catalogue() {
        assert_eq!(Product::STANDARD.len(), 6);
        assert!(!Product::TerrainSlope.needs_look_direction());
        assert!(Product::Coherence.needs_look_direction());
        assert_eq!(Product::TerrainAspect.unit(), "degrees");
    }

    #[test]
    fn test_sensor_mode_mismatch_is_rejected() {
        let pipeline = LandslideGeometryPipeline::new(PipelineConfig::default()).unwrap();
        let result = pipeline.run(&inputs(Some("IW3")));
        assert!(matches!(result, Err(SlideError::Config(_))));
    }

    #[test]
    fn test_all_standard_products_produced() {
        let pipeline = LandslideGeometryPipeline::new(PipelineConfig {
            zonal_scale: None,
            ..Default::default()
        })
        .unwrap();
        let output = pipeline.run(&inputs(Some("iw2"))).unwrap();
        assert_eq!(output.failures().count(), 0);
        for product in Product::STANDARD {
            let table = output.table(product).unwrap();
            assert_eq!(table.field, product.name());
            assert!(table.rows[0].value.is_some(), "{}", product);
        }
        assert!(output.table(Product::AzimuthSlope).is_none());
        // Incidence decreases westwards, so the band's aspect points west
        let look = output.look_direction.unwrap();
        assert!((look.bearing_deg - 270.0).abs() < 1e-6);
    }

    #[test]
    fn test_look_direction_failure_keeps_terrain_products() {
        let pipeline = LandslideGeometryPipeline::new(PipelineConfig::default()).unwrap();
        let mut run_inputs = inputs(None);
        run_inputs.area_of_interest = BoundingBox {
            min_x: 5000.0,
            max_x: 6000.0,
            min_y: 5000.0,
            max_y: 6000.0,
        }
        .to_polygon();
        let output = pipeline.run(&run_inputs).unwrap();
        assert!(output.look_direction.is_none());
        assert!(output.table(Product::TerrainSlope).is_some());
        assert!(output.table(Product::TerrainAspect).is_some());
        let failed: Vec<Product> = output.failures().map(|(p, _)| p).collect();
        assert_eq!(failed.len(), 4);
        assert!(failed.contains(&Product::Coherence));
    }
}
