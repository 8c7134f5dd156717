//! Carbon accumulation from stand age via asymptotic growth curves.
//!
//! Different management regimes grow at empirically different rates, so
//! each land use carries its own coefficient set; one global curve would
//! bias estimates in mixed-land-use project areas. Aggregation treats
//! pixel-level estimation errors as independent when summing variances, a
//! documented simplifying assumption rather than a spatial-correlation
//! model.

use std::collections::BTreeMap;

use crate::config::DealConfig;
use crate::core::stand_age::StandAgeSeries;
use crate::types::{
    CarbonRecord, ClassImage, LandCoverSeries, LandUse, MrvError, MrvResult,
};

/// z-score of the two-sided 95% interval
const Z_95: f64 = 1.96;

#[derive(Debug, Clone, Copy, Default)]
struct CarbonTally {
    sum: f64,
    var_low: f64,
    var_high: f64,
}

/// Applies growth curves and non-forest constants to a stand-age series and
/// aggregates carbon per land use and year
pub struct CarbonAccumulator<'a> {
    config: &'a DealConfig,
}

impl<'a> CarbonAccumulator<'a> {
    pub fn new(config: &'a DealConfig) -> Self {
        Self { config }
    }

    /// Per-pixel carbon for every study year, summed per (land use, year)
    /// with a ±95% CI from the summed per-pixel variance contributions.
    ///
    /// `land_use_codes` is the rasterized land-use partition. When a
    /// land-cover series is supplied, pixels whose class has an entry in
    /// the non-forest constant table take that constant instead of the
    /// curve; the curve is undefined on non-forest cover.
    pub fn accumulate(
        &self,
        series: &StandAgeSeries,
        land_use_codes: &ClassImage,
        land_cover: Option<&LandCoverSeries>,
    ) -> MrvResult<Vec<CarbonRecord>> {
        let dim = series.dim();
        if land_use_codes.dim() != dim {
            return Err(MrvError::DimensionMismatch(format!(
                "land-use raster {:?} does not match stand-age grid {:?}",
                land_use_codes.dim(),
                dim
            )));
        }
        if let Some(lc) = land_cover {
            if lc.dim() != dim {
                return Err(MrvError::DimensionMismatch(format!(
                    "land-cover series {:?} does not match stand-age grid {:?}",
                    lc.dim(),
                    dim
                )));
            }
            if lc.start_year() > series.start_year() || lc.end_year() < series.end_year() {
                return Err(MrvError::MissingBand(format!(
                    "land cover covers {}..={}, stand age needs {}..={}",
                    lc.start_year(),
                    lc.end_year(),
                    series.start_year(),
                    series.end_year()
                )));
            }
        }

        let (rows, cols) = dim;
        let area = self.config.carbon.pixel_area_ha;
        log::info!(
            "Accumulating carbon {}..={} over {:?} pixels ({} ha each)",
            series.start_year(),
            series.end_year(),
            dim,
            area
        );

        // resolve land-use codes once; an unknown code is a data defect
        let mut land_uses = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                let code = land_use_codes[[row, col]];
                let land_use = LandUse::from_code(code).ok_or_else(|| {
                    MrvError::Processing(format!(
                        "unexpected land-use code {} at ({}, {})",
                        code, row, col
                    ))
                })?;
                land_uses.push(land_use);
            }
        }

        let mut records = Vec::new();
        for year in series.start_year()..=series.end_year() {
            let ages = series.ages(year)?;
            let cover = land_cover.map(|lc| lc.layer(year)).transpose()?;

            let mut tallies: BTreeMap<LandUse, CarbonTally> = BTreeMap::new();
            for row in 0..rows {
                for col in 0..cols {
                    let land_use = land_uses[row * cols + col];
                    let constant = cover.and_then(|layer| {
                        self.config.carbon.nonforest_carbon.get(&layer[[row, col]])
                    });

                    let (central, low, high) = match constant {
                        // fixed non-forest value overrides the curve entirely
                        Some(c) => (c.central * area, c.low * area, c.high * area),
                        None => {
                            let growth = self.config.growth_for(land_use);
                            let age = ages[[row, col]];
                            (
                                growth.central.density(age) * area,
                                growth.low.density(age) * area,
                                growth.high.density(age) * area,
                            )
                        }
                    };

                    let tally = tallies.entry(land_use).or_default();
                    tally.sum += central;
                    tally.var_low += ((central - low) / Z_95).powi(2);
                    tally.var_high += ((high - central) / Z_95).powi(2);
                }
            }

            for (land_use, tally) in tallies {
                records.push(CarbonRecord {
                    year,
                    land_use,
                    carbon_sum: tally.sum,
                    carbon_sum_low_ci: tally.sum - Z_95 * tally.var_low.sqrt(),
                    carbon_sum_high_ci: tally.sum + Z_95 * tally.var_high.sqrt(),
                });
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::config::{CarbonConstant, GrowthCurve, GrowthParams};
    use crate::core::stand_age::StandAgeReconstructor;
    use crate::types::{AnnualForestMask, ChangeSegmentStack, MaskImage};

    fn amazon_curve() -> GrowthCurve {
        GrowthCurve {
            b0: 110.19,
            b1: 0.1244,
            b2: 4.959,
        }
    }

    #[test]
    fn test_curve_boundary_conditions() {
        let curve = amazon_curve();
        assert_eq!(curve.density(0), 0.0);
        // asymptote approaches b0
        assert_relative_eq!(curve.density(1000), curve.b0, epsilon = 1e-6);
        assert!(curve.density(500) <= curve.b0);
    }

    #[test]
    fn test_curve_at_age_31_reproducible() {
        let curve = amazon_curve();
        let per_pixel = curve.density(31) * 0.09;
        let expected = 110.19 * (1.0 - (-0.1244f64 * 31.0).exp()).powf(4.959) * 0.09;
        assert_relative_eq!(per_pixel, expected, epsilon = 1e-9);
        // ~8.92 tC for a 31-year stand on a 0.09 ha pixel
        assert!(per_pixel > 8.9 && per_pixel < 8.94);
        assert_relative_eq!(per_pixel, curve.density(31) * 0.09, epsilon = 1e-12);
    }

    /// One stable-forest pixel established 1990, one never-forest pixel.
    fn series_1990() -> (DealConfig, StandAgeSeries) {
        let mut config = DealConfig::new("cafe_apui", 2019, 2020, 1985);
        config.carbon.default_growth = GrowthParams::uniform(amazon_curve());

        let mut layers = Vec::new();
        for year in 1985..=2020 {
            let mut layer = MaskImage::zeros((1, 2));
            layer[[0, 0]] = u8::from(year >= 1990);
            layers.push(layer);
        }
        let mask = AnnualForestMask::new(1985, layers).unwrap();
        let loss = ChangeSegmentStack::empty(1, 2);
        let gain = ChangeSegmentStack::empty(1, 2);
        let series = StandAgeReconstructor::new(&config)
            .reconstruct(&loss, &gain, &mask)
            .unwrap();
        (config, series)
    }

    #[test]
    fn test_accumulate_stable_pixel() {
        let (config, series) = series_1990();
        assert_eq!(series.age_at(2020, 0, 0).unwrap(), 31);

        let land_use = ClassImage::from_elem((1, 2), LandUse::Intervention.code());
        let records = CarbonAccumulator::new(&config)
            .accumulate(&series, &land_use, None)
            .unwrap();

        // 2019 and 2020, single land use
        assert_eq!(records.len(), 2);
        let r2020 = records.iter().find(|r| r.year == 2020).unwrap();
        let expected = amazon_curve().density(31) * 0.09; // never-forest pixel adds 0
        assert_relative_eq!(r2020.carbon_sum, expected, epsilon = 1e-9);
        // uniform bounds mean a zero-width interval
        assert_relative_eq!(r2020.carbon_sum_low_ci, expected, epsilon = 1e-9);
        assert_relative_eq!(r2020.carbon_sum_high_ci, expected, epsilon = 1e-9);
    }

    #[test]
    fn test_ci_recovers_bounds_for_single_pixel() {
        let (mut config, series) = series_1990();
        let central = amazon_curve();
        let low = GrowthCurve { b0: 90.0, ..central };
        let high = GrowthCurve { b0: 130.0, ..central };
        config.carbon.default_growth = GrowthParams { central, low, high };

        let land_use = ClassImage::from_elem((1, 2), LandUse::Reference.code());
        let records = CarbonAccumulator::new(&config)
            .accumulate(&series, &land_use, None)
            .unwrap();
        let r2020 = records.iter().find(|r| r.year == 2020).unwrap();

        // one contributing pixel: +-1.96 * sqrt(((bound-central)/1.96)^2) = bound
        assert_relative_eq!(r2020.carbon_sum_low_ci, low.density(31) * 0.09, epsilon = 1e-9);
        assert_relative_eq!(
            r2020.carbon_sum_high_ci,
            high.density(31) * 0.09,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_nonforest_constant_overrides_curve() {
        let (mut config, series) = series_1990();
        const PASTURE: u8 = 15;
        config.carbon.nonforest_carbon.insert(
            PASTURE,
            CarbonConstant {
                central: 5.0,
                low: 3.0,
                high: 7.0,
            },
        );

        // both pixels pasture in every year, including the forested one
        let layers = vec![ClassImage::from_elem((1, 2), PASTURE); 2];
        let cover = LandCoverSeries::new(2019, layers).unwrap();

        let land_use = ClassImage::from_elem((1, 2), LandUse::Intervention.code());
        let records = CarbonAccumulator::new(&config)
            .accumulate(&series, &land_use, Some(&cover))
            .unwrap();
        let r2020 = records.iter().find(|r| r.year == 2020).unwrap();

        // 2 pixels x 5.0 tC/ha x 0.09 ha, the curve plays no part
        assert_relative_eq!(r2020.carbon_sum, 2.0 * 5.0 * 0.09, epsilon = 1e-12);
    }

    #[test]
    fn test_land_use_specific_curves() {
        let (mut config, series) = series_1990();
        config.carbon.growth.insert(
            LandUse::Intervention,
            GrowthParams::uniform(GrowthCurve {
                b0: 55.0,
                b1: 0.2,
                b2: 2.0,
            }),
        );

        let land_use = ClassImage::from_elem((1, 2), LandUse::Intervention.code());
        let records = CarbonAccumulator::new(&config)
            .accumulate(&series, &land_use, None)
            .unwrap();
        let r2020 = records.iter().find(|r| r.year == 2020).unwrap();

        let expected = 55.0 * (1.0 - (-0.2f64 * 31.0).exp()).powf(2.0) * 0.09;
        assert_relative_eq!(r2020.carbon_sum, expected, epsilon = 1e-9);
    }

    #[test]
    fn test_unknown_land_use_code_is_error() {
        let (config, series) = series_1990();
        let land_use = ClassImage::from_elem((1, 2), 99);
        let result = CarbonAccumulator::new(&config).accumulate(&series, &land_use, None);
        assert!(matches!(result, Err(MrvError::Processing(_))));
    }

    #[test]
    fn test_records_ordered_by_year_then_land_use() {
        let (config, series) = series_1990();
        let mut land_use = ClassImage::from_elem((1, 2), LandUse::Intervention.code());
        land_use[[0, 1]] = LandUse::Reference.code();

        let records = CarbonAccumulator::new(&config)
            .accumulate(&series, &land_use, None)
            .unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].year, 2019);
        assert_eq!(records[0].land_use, LandUse::Intervention);
        assert_eq!(records[1].land_use, LandUse::Reference);
        assert_eq!(records[2].year, 2020);
    }
}
