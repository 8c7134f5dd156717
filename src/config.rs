//! Per-run configuration for one deal and report year.
//!
//! All parameters live in an immutable [`DealConfig`] passed by reference
//! into each component. Two deals (or two report years of the same deal)
//! run concurrently on separate configs without shared state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{LandUse, MrvError, MrvResult};

/// Statistical minimum of interpretable points per stratum
pub const DEFAULT_MIN_PER_STRATUM: u32 = 30;

/// Safety buffer on top of the statistical minimum
pub const DEFAULT_SAMPLE_BUFFER: f64 = 0.10;

/// Ground area of one 30 m pixel in hectares
pub const DEFAULT_PIXEL_AREA_HA: f64 = 0.09;

/// Sampling minimums, buffer and seed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Minimum interpretable points required per stratum
    pub min_per_stratum: u32,
    /// Fractional buffer added to the minimum (interpreters drop some points)
    pub buffer: f64,
    /// Seed threaded through every sampling call of one run
    pub seed: u64,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            min_per_stratum: DEFAULT_MIN_PER_STRATUM,
            buffer: DEFAULT_SAMPLE_BUFFER,
            seed: 0,
        }
    }
}

impl SamplingParams {
    /// Buffered per-stratum target, e.g. 30 -> 33
    pub fn target_per_stratum(&self) -> usize {
        (self.min_per_stratum as f64 * (1.0 + self.buffer)).round() as usize
    }
}

/// One three-parameter asymptotic growth curve: b0 * (1 - e^(-b1*age))^b2
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowthCurve {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
}

impl GrowthCurve {
    /// Carbon density (tC/ha) at a given stand age
    pub fn density(&self, age: u16) -> f64 {
        self.b0 * (1.0 - (-self.b1 * f64::from(age)).exp()).powf(self.b2)
    }
}

/// Central curve plus low/high confidence-bound variants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowthParams {
    pub central: GrowthCurve,
    pub low: GrowthCurve,
    pub high: GrowthCurve,
}

impl GrowthParams {
    /// All three bounds on the same curve (zero-width interval)
    pub fn uniform(curve: GrowthCurve) -> Self {
        Self {
            central: curve,
            low: curve,
            high: curve,
        }
    }
}

impl Default for GrowthParams {
    fn default() -> Self {
        // Secondary-forest regrowth fit for the southwestern Amazon
        GrowthParams::uniform(GrowthCurve {
            b0: 110.19,
            b1: 0.1244,
            b2: 4.959,
        })
    }
}

/// Fixed carbon density (tC/ha) substituted for a non-forest class
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CarbonConstant {
    pub central: f64,
    pub low: f64,
    pub high: f64,
}

/// Growth curves, pixel geometry and non-forest substitution table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarbonParams {
    /// Pixel area in hectares, converts density to per-pixel mass
    pub pixel_area_ha: f64,
    /// Land-use specific growth curves
    pub growth: BTreeMap<LandUse, GrowthParams>,
    /// Curve applied where a land use has no entry in `growth`
    pub default_growth: GrowthParams,
    /// Per-land-cover-class constants overriding the curve on non-forest pixels
    pub nonforest_carbon: BTreeMap<u8, CarbonConstant>,
}

impl Default for CarbonParams {
    fn default() -> Self {
        Self {
            pixel_area_ha: DEFAULT_PIXEL_AREA_HA,
            growth: BTreeMap::new(),
            default_growth: GrowthParams::default(),
            nonforest_carbon: BTreeMap::new(),
        }
    }
}

/// Logical asset keys resolved against the geo data store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetIds {
    pub forest_mask: String,
    pub loss_segments: String,
    pub gain_segments: String,
    pub land_use: String,
    /// Farm boundary layer restricting the sampling universe
    pub boundary: Option<String>,
    /// Annual land-cover classification, needed for non-forest substitution
    pub land_cover: Option<String>,
}

impl Default for AssetIds {
    fn default() -> Self {
        Self {
            forest_mask: "forest_mask".to_string(),
            loss_segments: "loss_segments".to_string(),
            gain_segments: "gain_segments".to_string(),
            land_use: "land_use".to_string(),
            boundary: None,
            land_cover: None,
        }
    }
}

/// Immutable configuration for one deal and report year
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealConfig {
    /// Project site name, e.g. "horta"
    pub deal: String,
    /// First year of the study window
    pub study_start: i32,
    /// Last year of the study window (the report year)
    pub study_end: i32,
    /// First year of the observable forest-mask record
    pub baseline_year: i32,
    /// Age assumed for pixels already forest at the observable baseline
    pub assumed_baseline_age: u16,
    pub sampling: SamplingParams,
    pub carbon: CarbonParams,
    pub assets: AssetIds,
}

impl DealConfig {
    pub fn new(deal: &str, study_start: i32, study_end: i32, baseline_year: i32) -> Self {
        Self {
            deal: deal.to_string(),
            study_start,
            study_end,
            baseline_year,
            assumed_baseline_age: 30,
            sampling: SamplingParams::default(),
            carbon: CarbonParams::default(),
            assets: AssetIds::default(),
        }
    }

    pub fn validate(&self) -> MrvResult<()> {
        if self.study_start > self.study_end {
            return Err(MrvError::InvalidConfig(format!(
                "study window start {} is after end {}",
                self.study_start, self.study_end
            )));
        }
        if self.baseline_year > self.study_start {
            return Err(MrvError::InvalidConfig(format!(
                "baseline year {} is after study start {}",
                self.baseline_year, self.study_start
            )));
        }
        if self.sampling.min_per_stratum == 0 {
            return Err(MrvError::InvalidConfig(
                "minimum per stratum must be at least 1".to_string(),
            ));
        }
        if self.sampling.buffer < 0.0 {
            return Err(MrvError::InvalidConfig(format!(
                "sample buffer must be non-negative, got {}",
                self.sampling.buffer
            )));
        }
        if self.carbon.pixel_area_ha <= 0.0 {
            return Err(MrvError::InvalidConfig(format!(
                "pixel area must be positive, got {}",
                self.carbon.pixel_area_ha
            )));
        }
        for (land_use, params) in &self.carbon.growth {
            for curve in [params.central, params.low, params.high] {
                if curve.b0 < 0.0 || curve.b1 < 0.0 || curve.b2 <= 0.0 {
                    return Err(MrvError::InvalidConfig(format!(
                        "growth coefficients for {} out of range: {:?}",
                        land_use, curve
                    )));
                }
            }
        }
        Ok(())
    }

    /// Number of years in the study window, inclusive
    pub fn study_len(&self) -> usize {
        (self.study_end - self.study_start + 1) as usize
    }

    /// Growth parameters for a land use, falling back to the default curve
    pub fn growth_for(&self, land_use: LandUse) -> &GrowthParams {
        self.carbon
            .growth
            .get(&land_use)
            .unwrap_or(&self.carbon.default_growth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_target() {
        let params = SamplingParams::default();
        assert_eq!(params.target_per_stratum(), 33);

        let no_buffer = SamplingParams {
            buffer: 0.0,
            ..Default::default()
        };
        assert_eq!(no_buffer.target_per_stratum(), 30);
    }

    #[test]
    fn test_validate_rejects_inverted_window() {
        let config = DealConfig::new("horta", 2020, 2008, 1985);
        assert!(matches!(
            config.validate(),
            Err(MrvError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_late_baseline() {
        let config = DealConfig::new("horta", 2008, 2020, 2010);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_curve_is_positive_and_bounded() {
        let curve = GrowthParams::default().central;
        assert_eq!(curve.density(0), 0.0);
        assert!(curve.density(30) > 0.0);
        assert!(curve.density(200) <= curve.b0);
    }
}
