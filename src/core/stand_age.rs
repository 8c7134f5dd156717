//! Per-pixel reconstruction of forest history and stand age.
//!
//! Stand age is path-dependent: a pixel's age at year Y depends on when its
//! forest was established, which differs between a stand that survived, one
//! that was cleared and regrew, and one that newly grew on former
//! non-forest. No single closed-form formula expresses the reset-to-zero at
//! a loss and the restart-at-one at a later gain, so each pixel's event
//! order is classified once into a [`ForestHistoryCase`] and a pure
//! per-case formula is evaluated for every study year. Ages are always
//! recomputed from the full history, never incremented from the previous
//! year's raster.

use ndarray::{Array2, Zip};

use crate::config::DealConfig;
use crate::types::{
    AgeImage, AnnualForestMask, ChangeSegmentStack, MaskImage, MrvError, MrvResult,
};

/// When a stand was established, relative to the observable record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Establishment {
    /// Already forest in the first observable year; true year unknown
    BeforeBaseline,
    /// First observed as forest in this year
    InYear(i32),
}

/// The six mutually exclusive temporal histories a pixel can have.
///
/// At most one loss and one gain event per pixel are representable within
/// the study window; pixels disturbed more often than the segments can
/// express collapse to the nearest representable history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForestHistoryCase {
    /// Forest before the study window and never lost
    Stable { established: Establishment },
    /// Never forest, no gain
    NeverForest,
    /// Forest, then deforested, never regained
    LostOnly {
        established: Establishment,
        loss_year: i32,
    },
    /// Non-forest, then gained
    GainedOnly { gain_year: i32 },
    /// Forest, lost, later regained
    LostThenGained {
        established: Establishment,
        loss_year: i32,
        gain_year: i32,
    },
    /// Gained on former non-forest, later lost again
    GainedThenLost { gain_year: i32, loss_year: i32 },
}

/// Stand ages for every study year, plus the per-pixel history cases and
/// the forest flag each age was derived against
#[derive(Debug, Clone)]
pub struct StandAgeSeries {
    start_year: i32,
    ages: Vec<AgeImage>,
    forest: Vec<MaskImage>,
    cases: Array2<ForestHistoryCase>,
}

impl StandAgeSeries {
    pub fn start_year(&self) -> i32 {
        self.start_year
    }

    pub fn end_year(&self) -> i32 {
        self.start_year + self.ages.len() as i32 - 1
    }

    pub fn dim(&self) -> (usize, usize) {
        self.cases.dim()
    }

    pub fn ages(&self, year: i32) -> MrvResult<&AgeImage> {
        self.index(year).map(|i| &self.ages[i])
    }

    pub fn forest(&self, year: i32) -> MrvResult<&MaskImage> {
        self.index(year).map(|i| &self.forest[i])
    }

    pub fn age_at(&self, year: i32, row: usize, col: usize) -> MrvResult<u16> {
        Ok(self.ages(year)?[[row, col]])
    }

    pub fn case_at(&self, row: usize, col: usize) -> ForestHistoryCase {
        self.cases[[row, col]]
    }

    fn index(&self, year: i32) -> MrvResult<usize> {
        if year < self.start_year || year > self.end_year() {
            return Err(MrvError::MissingBand(format!(
                "no stand-age layer for {} (series covers {}..={})",
                year,
                self.start_year,
                self.end_year()
            )));
        }
        Ok((year - self.start_year) as usize)
    }
}

/// Reconstructs per-pixel stand age from segments and the forest mask
pub struct StandAgeReconstructor<'a> {
    config: &'a DealConfig,
}

impl<'a> StandAgeReconstructor<'a> {
    pub fn new(config: &'a DealConfig) -> Self {
        Self { config }
    }

    /// Classify every pixel's history, then evaluate its age for each year
    /// of the study window.
    pub fn reconstruct(
        &self,
        loss: &ChangeSegmentStack,
        gain: &ChangeSegmentStack,
        mask: &AnnualForestMask,
    ) -> MrvResult<StandAgeSeries> {
        let dim = mask.dim();
        if loss.dim() != dim || gain.dim() != dim {
            return Err(MrvError::DimensionMismatch(format!(
                "segment stacks {:?}/{:?} do not match mask {:?}",
                loss.dim(),
                gain.dim(),
                dim
            )));
        }
        if mask.start_year() > self.config.baseline_year
            || mask.end_year() < self.config.study_end
        {
            return Err(MrvError::MissingBand(format!(
                "forest mask covers {}..={}, run needs {}..={}",
                mask.start_year(),
                mask.end_year(),
                self.config.baseline_year,
                self.config.study_end
            )));
        }

        log::info!(
            "Reconstructing stand age {}..={} over {:?} pixels",
            self.config.study_start,
            self.config.study_end,
            dim
        );

        let (rows, cols) = dim;
        let baseline = self.config.baseline_year;
        let mut cases = Array2::from_elem(dim, ForestHistoryCase::NeverForest);
        for row in 0..rows {
            for col in 0..cols {
                cases[[row, col]] = classify_history(
                    loss.detection_year_at(row, col),
                    gain.detection_year_at(row, col),
                    mask.first_forest_year(row, col),
                    baseline,
                );
            }
        }

        let assumed_age = self.config.assumed_baseline_age;
        let mut ages = Vec::with_capacity(self.config.study_len());
        let mut forest = Vec::with_capacity(self.config.study_len());
        for year in self.config.study_start..=self.config.study_end {
            let mut layer = AgeImage::zeros(dim);
            Zip::from(&mut layer).and(&cases).par_for_each(|age, &case| {
                *age = age_for_year(case, year, baseline, assumed_age);
            });
            ages.push(layer);
            forest.push(mask.layer(year)?.clone());
        }

        Ok(StandAgeSeries {
            start_year: self.config.study_start,
            ages,
            forest,
            cases,
        })
    }
}

/// Determine a pixel's history case from its segment years and mask record.
///
/// The mask takes precedence over segments when the two conflict: a gain
/// recorded for a pixel already forest at baseline is ignored, a loss
/// recorded for a pixel never observed as forest collapses the history to
/// NeverForest (or GainedOnly when a valid later gain exists). A gain year
/// before the observable baseline carries no usable age information.
pub fn classify_history(
    loss_year: Option<i32>,
    gain_year: Option<i32>,
    first_forest_year: Option<i32>,
    baseline_year: i32,
) -> ForestHistoryCase {
    let gain_year = match gain_year {
        Some(g) if g < baseline_year => return ForestHistoryCase::NeverForest,
        other => other,
    };
    let forest_at_baseline = first_forest_year == Some(baseline_year);
    let established = first_forest_year.map(|year| {
        if year <= baseline_year {
            Establishment::BeforeBaseline
        } else {
            Establishment::InYear(year)
        }
    });

    match (loss_year, gain_year) {
        (None, None) => match established {
            Some(established) => ForestHistoryCase::Stable { established },
            None => ForestHistoryCase::NeverForest,
        },
        (Some(loss), None) => match established {
            Some(established) if forest_before(first_forest_year, loss) => {
                ForestHistoryCase::LostOnly {
                    established,
                    loss_year: loss,
                }
            }
            _ => ForestHistoryCase::NeverForest,
        },
        (None, Some(gain)) => {
            if forest_at_baseline {
                // mask wins: already forest, the gain segment is spurious
                ForestHistoryCase::Stable {
                    established: Establishment::BeforeBaseline,
                }
            } else {
                ForestHistoryCase::GainedOnly { gain_year: gain }
            }
        }
        (Some(loss), Some(gain)) => {
            if loss <= gain {
                match established {
                    Some(established) if forest_before(first_forest_year, loss) => {
                        ForestHistoryCase::LostThenGained {
                            established,
                            loss_year: loss,
                            gain_year: gain,
                        }
                    }
                    _ => ForestHistoryCase::GainedOnly { gain_year: gain },
                }
            } else if forest_at_baseline {
                // gain before loss on an already-forest pixel: keep the loss
                ForestHistoryCase::LostOnly {
                    established: Establishment::BeforeBaseline,
                    loss_year: loss,
                }
            } else {
                ForestHistoryCase::GainedThenLost {
                    gain_year: gain,
                    loss_year: loss,
                }
            }
        }
    }
}

fn forest_before(first_forest_year: Option<i32>, year: i32) -> bool {
    first_forest_year.map_or(false, |f| f < year)
}

/// Age of a pixel at one year under its history case. Never negative; zero
/// exactly from a loss year onward, one exactly at a gain year.
pub fn age_for_year(
    case: ForestHistoryCase,
    year: i32,
    baseline_year: i32,
    assumed_baseline_age: u16,
) -> u16 {
    let standing = |established: Establishment| -> u16 {
        match established {
            Establishment::BeforeBaseline => {
                clamp_age(i64::from(year - baseline_year) + i64::from(assumed_baseline_age))
            }
            Establishment::InYear(e) => {
                if year >= e {
                    clamp_age(i64::from(year - e) + 1)
                } else {
                    0
                }
            }
        }
    };
    let regrown = |gain_year: i32| -> u16 {
        if year >= gain_year {
            clamp_age(i64::from(year - gain_year) + 1)
        } else {
            0
        }
    };

    match case {
        ForestHistoryCase::Stable { established } => standing(established),
        ForestHistoryCase::NeverForest => 0,
        ForestHistoryCase::LostOnly {
            established,
            loss_year,
        } => {
            if year < loss_year {
                standing(established)
            } else {
                0
            }
        }
        ForestHistoryCase::GainedOnly { gain_year } => regrown(gain_year),
        ForestHistoryCase::LostThenGained {
            established,
            loss_year,
            gain_year,
        } => {
            if year < loss_year {
                standing(established)
            } else {
                regrown(gain_year)
            }
        }
        ForestHistoryCase::GainedThenLost {
            gain_year,
            loss_year,
        } => {
            if year < loss_year {
                regrown(gain_year)
            } else {
                0
            }
        }
    }
}

fn clamp_age(age: i64) -> u16 {
    age.clamp(0, i64::from(u16::MAX)) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::YearImage;

    const BASELINE: i32 = 1985;

    #[test]
    fn test_stable_forest_known_establishment() {
        let case = classify_history(None, None, Some(1990), BASELINE);
        assert_eq!(
            case,
            ForestHistoryCase::Stable {
                established: Establishment::InYear(1990)
            }
        );
        // establishment 1990 evaluated at 2020 -> 31
        assert_eq!(age_for_year(case, 2020, BASELINE, 30), 31);
        assert_eq!(age_for_year(case, 1990, BASELINE, 30), 1);
        assert_eq!(age_for_year(case, 1989, BASELINE, 30), 0);
    }

    #[test]
    fn test_stable_forest_before_baseline() {
        let case = classify_history(None, None, Some(BASELINE), BASELINE);
        // (2000 - 1985) + 30 assumed years
        assert_eq!(age_for_year(case, 2000, BASELINE, 30), 45);
    }

    #[test]
    fn test_never_forest() {
        let case = classify_history(None, None, None, BASELINE);
        assert_eq!(case, ForestHistoryCase::NeverForest);
        assert_eq!(age_for_year(case, 2015, BASELINE, 30), 0);
    }

    #[test]
    fn test_loss_resets_age_to_zero_at_event_year() {
        let case = classify_history(Some(2010), None, Some(BASELINE), BASELINE);
        assert!(age_for_year(case, 2009, BASELINE, 30) > 0);
        assert_eq!(age_for_year(case, 2010, BASELINE, 30), 0);
        assert_eq!(age_for_year(case, 2020, BASELINE, 30), 0);
    }

    #[test]
    fn test_gain_restarts_age_at_one() {
        let case = classify_history(None, Some(2012), None, BASELINE);
        assert_eq!(case, ForestHistoryCase::GainedOnly { gain_year: 2012 });
        assert_eq!(age_for_year(case, 2011, BASELINE, 30), 0);
        assert_eq!(age_for_year(case, 2012, BASELINE, 30), 1);
        assert_eq!(age_for_year(case, 2020, BASELINE, 30), 9);
    }

    #[test]
    fn test_lost_then_gained() {
        let case = classify_history(Some(2005), Some(2012), Some(BASELINE), BASELINE);
        assert_eq!(
            case,
            ForestHistoryCase::LostThenGained {
                established: Establishment::BeforeBaseline,
                loss_year: 2005,
                gain_year: 2012,
            }
        );
        assert!(age_for_year(case, 2004, BASELINE, 30) > 0);
        assert_eq!(age_for_year(case, 2005, BASELINE, 30), 0);
        assert_eq!(age_for_year(case, 2011, BASELINE, 30), 0);
        assert_eq!(age_for_year(case, 2012, BASELINE, 30), 1);
        assert_eq!(age_for_year(case, 2015, BASELINE, 30), 4);
    }

    #[test]
    fn test_gained_then_lost() {
        let case = classify_history(Some(2018), Some(2010), None, BASELINE);
        assert_eq!(
            case,
            ForestHistoryCase::GainedThenLost {
                gain_year: 2010,
                loss_year: 2018,
            }
        );
        assert_eq!(age_for_year(case, 2009, BASELINE, 30), 0);
        assert_eq!(age_for_year(case, 2010, BASELINE, 30), 1);
        assert_eq!(age_for_year(case, 2017, BASELINE, 30), 8);
        assert_eq!(age_for_year(case, 2018, BASELINE, 30), 0);
        assert_eq!(age_for_year(case, 2020, BASELINE, 30), 0);
    }

    #[test]
    fn test_gain_before_baseline_has_no_age_information() {
        let case = classify_history(None, Some(1980), Some(1990), BASELINE);
        assert_eq!(case, ForestHistoryCase::NeverForest);
    }

    #[test]
    fn test_monotonic_growth_between_events() {
        let case = classify_history(Some(2018), Some(2005), None, BASELINE);
        for year in 2005..2017 {
            let now = age_for_year(case, year, BASELINE, 30);
            let next = age_for_year(case, year + 1, BASELINE, 30);
            assert_eq!(next, now + 1);
        }
    }

    #[test]
    fn test_reconstruct_small_grid() {
        let mut config = DealConfig::new("inocas", 2018, 2020, 2015);
        config.assumed_baseline_age = 25;

        // (0,0): forest the whole record; (0,1): gained 2019
        let mut layers = Vec::new();
        for year in 2015..=2020 {
            let mut layer = MaskImage::from_elem((1, 2), 0);
            layer[[0, 0]] = 1;
            layer[[0, 1]] = u8::from(year >= 2019);
            layers.push(layer);
        }
        let mask = AnnualForestMask::new(2015, layers).unwrap();

        let loss = ChangeSegmentStack::empty(1, 2);
        let mut gain = ChangeSegmentStack::empty(1, 2);
        gain.year_of_detection = YearImage::from_shape_vec((1, 2), vec![0, 2019]).unwrap();

        let series = StandAgeReconstructor::new(&config)
            .reconstruct(&loss, &gain, &mask)
            .unwrap();

        assert_eq!(series.start_year(), 2018);
        assert_eq!(series.end_year(), 2020);
        // pixel (0,0): before-baseline forest, 25 + (year - 2015)
        assert_eq!(series.age_at(2018, 0, 0).unwrap(), 28);
        assert_eq!(series.age_at(2020, 0, 0).unwrap(), 30);
        // pixel (0,1): gained 2019
        assert_eq!(series.age_at(2018, 0, 1).unwrap(), 0);
        assert_eq!(series.age_at(2019, 0, 1).unwrap(), 1);
        assert_eq!(series.age_at(2020, 0, 1).unwrap(), 2);
        assert!(matches!(
            series.case_at(0, 1),
            ForestHistoryCase::GainedOnly { gain_year: 2019 }
        ));
    }

    #[test]
    fn test_reconstruct_rejects_short_mask() {
        let config = DealConfig::new("inocas", 2018, 2020, 2015);
        let mask =
            AnnualForestMask::new(2015, vec![MaskImage::zeros((1, 1)); 4]).unwrap(); // ends 2018
        let loss = ChangeSegmentStack::empty(1, 1);
        let gain = ChangeSegmentStack::empty(1, 1);
        let result = StandAgeReconstructor::new(&config).reconstruct(&loss, &gain, &mask);
        assert!(matches!(result, Err(MrvError::MissingBand(_))));
    }
}
