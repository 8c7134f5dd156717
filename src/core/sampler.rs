//! Adaptive stratified sampling of validation points.
//!
//! Simple random sampling alone cannot guarantee a minimum per-stratum
//! count when strata are spatially rare, and independent repeated draws
//! would double-count pixels. The sampler therefore runs four sequential
//! phases over a shrinking eligible universe: an initial simple-random
//! draw, then deficit-driven top-ups per loss stratum, per gain stratum
//! inside the intervention polygon, and per land-use polygon. Phase 1
//! alone remains a valid simple random sample; all phases together meet
//! the per-stratum minimums. The eligible mask is threaded functionally
//! from phase to phase, never mutated in place.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::DealConfig;
use crate::core::landuse::LandUseAttributor;
use crate::io::store::{ClassQuota, GeoDataStore};
use crate::types::{
    ChangeSegmentStack, ClassImage, GainStratum, LandUse, LandUseLayer, LossStratum, MaskImage,
    MrvError, MrvResult, PixelIndex, Polygon, SamplePoint, SamplingPhase,
};

/// Rasters and layers one sampling run draws from
pub struct SamplerInputs<'a> {
    pub loss_strata: &'a ClassImage,
    pub gain_strata: &'a ClassImage,
    pub loss_segments: &'a ChangeSegmentStack,
    pub gain_segments: &'a ChangeSegmentStack,
    pub land_use: &'a LandUseLayer,
    /// Overall eligible region (farm boundary); None samples the full grid
    pub boundary: Option<&'a Polygon>,
}

/// One minimum-count constraint the sampler tries to satisfy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SamplingConstraint {
    Loss(LossStratum),
    GainInIntervention(GainStratum),
    LandUse(LandUse),
}

impl std::fmt::Display for SamplingConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SamplingConstraint::Loss(s) => write!(f, "loss stratum {}", s),
            SamplingConstraint::GainInIntervention(g) => {
                write!(f, "gain stratum {} in intervention", g)
            }
            SamplingConstraint::LandUse(u) => write!(f, "land use {}", u),
        }
    }
}

/// A constraint the eligible population could not satisfy.
///
/// Shortfalls surface for manual reconciliation; they never abort a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StratumShortfall {
    pub constraint: SamplingConstraint,
    pub required: usize,
    pub achieved: usize,
}

/// Points drawn by one phase
#[derive(Debug, Clone, Serialize)]
pub struct PhaseSummary {
    pub phase: String,
    pub drawn: usize,
}

/// Result of one sampling run: the point set plus the evidence needed to
/// check every minimum-count constraint downstream
#[derive(Debug, Clone, Serialize)]
pub struct SamplingOutcome {
    pub points: Vec<SamplePoint>,
    pub loss_histogram: BTreeMap<LossStratum, usize>,
    /// Gain histogram restricted to points attributed to the intervention
    pub gain_histogram_intervention: BTreeMap<GainStratum, usize>,
    pub land_use_histogram: BTreeMap<LandUse, usize>,
    pub phases: Vec<PhaseSummary>,
    pub shortfalls: Vec<StratumShortfall>,
}

impl SamplingOutcome {
    pub fn all_minimums_met(&self) -> bool {
        self.shortfalls.is_empty()
    }
}

/// Multi-phase sampler with deficit-driven top-ups over a shrinking universe
pub struct AdaptiveStratifiedSampler<'a> {
    config: &'a DealConfig,
}

impl<'a> AdaptiveStratifiedSampler<'a> {
    pub fn new(config: &'a DealConfig) -> Self {
        Self { config }
    }

    /// Run all four phases and finalize the point set.
    ///
    /// Phase order is load-bearing: each phase draws only from pixels no
    /// earlier phase selected, so reordering phases changes the result.
    pub fn draw<S: GeoDataStore>(
        &self,
        store: &S,
        inputs: &SamplerInputs<'_>,
    ) -> MrvResult<SamplingOutcome> {
        let dims = store.dimensions();
        if inputs.loss_strata.dim() != dims || inputs.gain_strata.dim() != dims {
            return Err(MrvError::DimensionMismatch(format!(
                "strata bands {:?}/{:?} do not match store grid {:?}",
                inputs.loss_strata.dim(),
                inputs.gain_strata.dim(),
                dims
            )));
        }

        let target = self.config.sampling.target_per_stratum();
        let seed = self.config.sampling.seed;
        let mut phases = Vec::new();

        // Phase 1: simple random sample sized for the most granular category
        let initial_count = LossStratum::ALL.len() * target;
        log::info!(
            "Sampling phase 1 (initial): {} points, seed {}",
            initial_count,
            seed
        );
        let eligible = MaskImage::from_elem(dims, 1);
        let picks = store.sample_random(&eligible, inputs.boundary, initial_count, seed)?;
        let mut points =
            self.make_points(store, inputs, &picks, SamplingPhase::Initial)?;
        let eligible = exclude(&eligible, &picks);
        phases.push(PhaseSummary {
            phase: SamplingPhase::Initial.to_string(),
            drawn: picks.len(),
        });

        // Phase 2: per-loss-stratum deficit top-up
        let quotas: Vec<ClassQuota> = LossStratum::ALL
            .iter()
            .map(|stratum| ClassQuota {
                class: stratum.code(),
                count: deficit(target, count_loss(&points, *stratum)),
            })
            .collect();
        log::info!(
            "Sampling phase 2 (loss top-up): deficits {:?}",
            quotas.iter().map(|q| q.count).collect::<Vec<_>>()
        );
        let draw =
            store.sample_stratified(inputs.loss_strata, &eligible, inputs.boundary, &quotas, seed)?;
        points.extend(self.make_points(
            store,
            inputs,
            &draw.selected,
            SamplingPhase::AdditionalLoss,
        )?);
        let eligible = exclude(&eligible, &draw.selected);
        phases.push(PhaseSummary {
            phase: SamplingPhase::AdditionalLoss.to_string(),
            drawn: draw.selected.len(),
        });

        // Phase 3: per-gain-stratum deficit top-up inside the intervention
        let intervention = inputs.land_use.feature(LandUse::Intervention);
        let eligible = if let Some(feature) = intervention {
            let quotas: Vec<ClassQuota> = GainStratum::ALL
                .iter()
                .map(|stratum| ClassQuota {
                    class: stratum.code(),
                    count: deficit(
                        target,
                        count_gain_in(&points, *stratum, &feature.polygon),
                    ),
                })
                .collect();
            log::info!(
                "Sampling phase 3 (gain top-up in intervention): deficits {:?}",
                quotas.iter().map(|q| q.count).collect::<Vec<_>>()
            );
            let draw = store.sample_stratified(
                inputs.gain_strata,
                &eligible,
                Some(&feature.polygon),
                &quotas,
                seed,
            )?;
            points.extend(self.make_points(
                store,
                inputs,
                &draw.selected,
                SamplingPhase::AdditionalGain,
            )?);
            phases.push(PhaseSummary {
                phase: SamplingPhase::AdditionalGain.to_string(),
                drawn: draw.selected.len(),
            });
            exclude(&eligible, &draw.selected)
        } else {
            log::info!("Sampling phase 3 skipped: no intervention polygon");
            eligible
        };

        // Phase 4: per-land-use top-up. A constant class band makes the
        // stratified primitive behave as plain random sampling while still
        // honoring the not-yet-selected mask.
        let ones_band = ClassImage::from_elem(dims, 1);
        let mut eligible = eligible;
        for feature in &inputs.land_use.features {
            let inside = points
                .iter()
                .filter(|p| feature.polygon.contains(p.lon, p.lat))
                .count();
            let needed = deficit(target, inside);
            if needed == 0 {
                continue;
            }
            log::info!(
                "Sampling phase 4 ({} top-up): {} more points",
                feature.land_use,
                needed
            );
            let draw = store.sample_stratified(
                &ones_band,
                &eligible,
                Some(&feature.polygon),
                &[ClassQuota {
                    class: 1,
                    count: needed,
                }],
                seed,
            )?;
            points.extend(self.make_points(
                store,
                inputs,
                &draw.selected,
                SamplingPhase::AdditionalLandUse(feature.land_use),
            )?);
            eligible = exclude(&eligible, &draw.selected);
            phases.push(PhaseSummary {
                phase: SamplingPhase::AdditionalLandUse(feature.land_use).to_string(),
                drawn: draw.selected.len(),
            });
        }

        // Finalization: land-use attribution, dense renumbering, histograms
        LandUseAttributor::attribute(&mut points, inputs.land_use)?;
        for (i, point) in points.iter_mut().enumerate() {
            point.plot_id = i as u32;
        }

        let outcome = self.summarize(points, phases, intervention.is_some(), inputs.land_use);
        log::info!(
            "Sampling finished: {} points, {} shortfalls",
            outcome.points.len(),
            outcome.shortfalls.len()
        );
        Ok(outcome)
    }

    fn make_points<S: GeoDataStore>(
        &self,
        store: &S,
        inputs: &SamplerInputs<'_>,
        pixels: &[PixelIndex],
        phase: SamplingPhase,
    ) -> MrvResult<Vec<SamplePoint>> {
        pixels
            .iter()
            .map(|&(row, col)| {
                let loss_code = inputs.loss_strata[[row, col]];
                let gain_code = inputs.gain_strata[[row, col]];
                let loss_stratum = LossStratum::from_code(loss_code).ok_or_else(|| {
                    MrvError::Processing(format!(
                        "unexpected loss stratum code {} at ({}, {})",
                        loss_code, row, col
                    ))
                })?;
                let gain_stratum = GainStratum::from_code(gain_code).ok_or_else(|| {
                    MrvError::Processing(format!(
                        "unexpected gain stratum code {} at ({}, {})",
                        gain_code, row, col
                    ))
                })?;
                let (lon, lat) = store.transform().pixel_center(row, col);
                Ok(SamplePoint {
                    plot_id: 0, // assigned densely at finalization
                    lon,
                    lat,
                    row,
                    col,
                    loss_stratum,
                    gain_stratum,
                    land_use: None,
                    phase,
                    loss_segment: inputs.loss_segments.sample_at(row, col),
                    gain_segment: inputs.gain_segments.sample_at(row, col),
                })
            })
            .collect()
    }

    fn summarize(
        &self,
        points: Vec<SamplePoint>,
        phases: Vec<PhaseSummary>,
        has_intervention: bool,
        layer: &LandUseLayer,
    ) -> SamplingOutcome {
        let target = self.config.sampling.target_per_stratum();

        let mut loss_histogram = BTreeMap::new();
        let mut gain_histogram_intervention = BTreeMap::new();
        let mut land_use_histogram = BTreeMap::new();
        for point in &points {
            *loss_histogram.entry(point.loss_stratum).or_insert(0) += 1;
            if point.land_use == Some(LandUse::Intervention) {
                *gain_histogram_intervention
                    .entry(point.gain_stratum)
                    .or_insert(0) += 1;
            }
            if let Some(land_use) = point.land_use {
                *land_use_histogram.entry(land_use).or_insert(0) += 1;
            }
        }

        // Re-check every constraint against the final histograms; a stratum
        // whose eligible population ran out surfaces here, not as an error.
        let mut shortfalls = Vec::new();
        for stratum in LossStratum::ALL {
            let achieved = loss_histogram.get(&stratum).copied().unwrap_or(0);
            if achieved < target {
                shortfalls.push(StratumShortfall {
                    constraint: SamplingConstraint::Loss(stratum),
                    required: target,
                    achieved,
                });
            }
        }
        if has_intervention {
            for stratum in GainStratum::ALL {
                let achieved = gain_histogram_intervention
                    .get(&stratum)
                    .copied()
                    .unwrap_or(0);
                if achieved < target {
                    shortfalls.push(StratumShortfall {
                        constraint: SamplingConstraint::GainInIntervention(stratum),
                        required: target,
                        achieved,
                    });
                }
            }
        }
        for feature in &layer.features {
            let achieved = land_use_histogram
                .get(&feature.land_use)
                .copied()
                .unwrap_or(0);
            if achieved < target {
                shortfalls.push(StratumShortfall {
                    constraint: SamplingConstraint::LandUse(feature.land_use),
                    required: target,
                    achieved,
                });
            }
        }
        for shortfall in &shortfalls {
            log::warn!(
                "Sampling shortfall: {} has {} of {} required points",
                shortfall.constraint,
                shortfall.achieved,
                shortfall.required
            );
        }

        SamplingOutcome {
            points,
            loss_histogram,
            gain_histogram_intervention,
            land_use_histogram,
            phases,
            shortfalls,
        }
    }
}

fn deficit(target: usize, achieved: usize) -> usize {
    target.saturating_sub(achieved)
}

fn count_loss(points: &[SamplePoint], stratum: LossStratum) -> usize {
    points.iter().filter(|p| p.loss_stratum == stratum).count()
}

fn count_gain_in(points: &[SamplePoint], stratum: GainStratum, region: &Polygon) -> usize {
    points
        .iter()
        .filter(|p| p.gain_stratum == stratum && region.contains(p.lon, p.lat))
        .count()
}

/// New eligibility mask with the selected pixels cleared
fn exclude(eligible: &MaskImage, selected: &[PixelIndex]) -> MaskImage {
    let mut out = eligible.clone();
    for &(row, col) in selected {
        out[[row, col]] = 0;
    }
    out
}
