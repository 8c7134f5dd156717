//! End-to-end orchestration of the sampling and carbon branches.
//!
//! Each branch is a pure function over the store's immutable assets: every
//! stage allocates new rasters/tables, nothing mutates a source layer.
//! The two branches share the forest mask and change segments but are
//! otherwise independent.

use crate::config::DealConfig;
use crate::core::carbon::CarbonAccumulator;
use crate::core::landuse::LandUseAttributor;
use crate::core::sampler::{AdaptiveStratifiedSampler, SamplerInputs, SamplingOutcome};
use crate::core::stand_age::{StandAgeReconstructor, StandAgeSeries};
use crate::core::strata::StrataClassifier;
use crate::io::export::RunManifest;
use crate::io::store::GeoDataStore;
use crate::types::{CarbonRecord, ClassImage, MrvResult};

/// Everything the sampling branch produces for export and review
pub struct SamplingBranchOutput {
    pub manifest: RunManifest,
    pub loss_strata: ClassImage,
    pub gain_strata: ClassImage,
    /// Per-stratum pixel counts over the whole grid, for the area report
    pub loss_pixel_counts: Vec<(u8, u64)>,
    pub gain_pixel_counts: Vec<(u8, u64)>,
    pub outcome: SamplingOutcome,
}

/// Everything the carbon branch produces for export
pub struct CarbonBranchOutput {
    pub manifest: RunManifest,
    pub stand_age: StandAgeSeries,
    pub records: Vec<CarbonRecord>,
}

/// One deal/report-year run against a geo data store
pub struct MrvPipeline<'a, S: GeoDataStore> {
    config: &'a DealConfig,
    store: &'a S,
}

impl<'a, S: GeoDataStore> MrvPipeline<'a, S> {
    pub fn new(config: &'a DealConfig, store: &'a S) -> MrvResult<Self> {
        config.validate()?;
        Ok(Self { config, store })
    }

    /// Classify strata, draw the validation point set, attribute land use
    pub fn run_sampling(&self) -> MrvResult<SamplingBranchOutput> {
        log::info!(
            "Sampling branch: deal '{}', report year {}",
            self.config.deal,
            self.config.study_end
        );
        let assets = &self.config.assets;
        let mask = self.store.forest_mask(&assets.forest_mask)?;
        let loss_segments = self.store.change_segments(&assets.loss_segments)?;
        let gain_segments = self.store.change_segments(&assets.gain_segments)?;
        let land_use = self.store.vector_layer(&assets.land_use)?;
        let boundary_layer = assets
            .boundary
            .as_deref()
            .map(|id| self.store.vector_layer(id))
            .transpose()?;
        let boundary = boundary_layer
            .and_then(|layer| layer.features.first())
            .map(|feature| &feature.polygon);

        let classifier = StrataClassifier::new(self.config);
        let loss_strata = classifier.classify_loss(loss_segments, mask)?;
        let gain_strata = classifier.classify_gain(gain_segments, mask)?;

        let loss_pixel_counts = self
            .store
            .zonal_count(&loss_strata, boundary)?
            .into_iter()
            .collect();
        let gain_pixel_counts = self
            .store
            .zonal_count(&gain_strata, boundary)?
            .into_iter()
            .collect();

        let sampler = AdaptiveStratifiedSampler::new(self.config);
        let outcome = sampler.draw(
            self.store,
            &SamplerInputs {
                loss_strata: &loss_strata,
                gain_strata: &gain_strata,
                loss_segments,
                gain_segments,
                land_use,
                boundary,
            },
        )?;

        Ok(SamplingBranchOutput {
            manifest: RunManifest::new(self.config),
            loss_strata,
            gain_strata,
            loss_pixel_counts,
            gain_pixel_counts,
            outcome,
        })
    }

    /// Reconstruct stand age and accumulate carbon per land use and year
    pub fn run_carbon(&self) -> MrvResult<CarbonBranchOutput> {
        log::info!(
            "Carbon branch: deal '{}', report year {}",
            self.config.deal,
            self.config.study_end
        );
        let assets = &self.config.assets;
        let mask = self.store.forest_mask(&assets.forest_mask)?;
        let loss_segments = self.store.change_segments(&assets.loss_segments)?;
        let gain_segments = self.store.change_segments(&assets.gain_segments)?;
        let land_use = self.store.vector_layer(&assets.land_use)?;
        let land_cover = assets
            .land_cover
            .as_deref()
            .map(|id| self.store.land_cover(id))
            .transpose()?;

        let stand_age = StandAgeReconstructor::new(self.config)
            .reconstruct(loss_segments, gain_segments, mask)?;

        let (rows, cols) = self.store.dimensions();
        let land_use_codes =
            LandUseAttributor::rasterize(land_use, self.store.transform(), rows, cols)?;

        let records = CarbonAccumulator::new(self.config).accumulate(
            &stand_age,
            &land_use_codes,
            land_cover,
        )?;

        Ok(CarbonBranchOutput {
            manifest: RunManifest::new(self.config),
            stand_age,
            records,
        })
    }
}
