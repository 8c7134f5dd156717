//! Loss and gain strata from change segments and the annual forest mask.

use crate::config::DealConfig;
use crate::types::{
    AnnualForestMask, ChangeSegmentStack, ClassImage, GainStratum, LossStratum, MrvError,
    MrvResult,
};

/// Classifies per-pixel change segments into loss and gain strata
pub struct StrataClassifier<'a> {
    config: &'a DealConfig,
}

impl<'a> StrataClassifier<'a> {
    pub fn new(config: &'a DealConfig) -> Self {
        Self { config }
    }

    /// Loss strata (codes 1-4) for every pixel.
    ///
    /// Undisturbed pixels split on whether they were forest through the whole
    /// study window (StableForest) or not (NonForest). Disturbed pixels split
    /// on the mask at the end of the window: still forest in both the report
    /// year and the year before it means Degradation, non-forest in the
    /// report year means Deforestation. A disturbed pixel that reads
    /// non-forest before the report year but forest in it keeps the
    /// Degradation code, the remap's fallback branch.
    pub fn classify_loss(
        &self,
        loss: &ChangeSegmentStack,
        mask: &AnnualForestMask,
    ) -> MrvResult<ClassImage> {
        let dim = mask.dim();
        if loss.dim() != dim {
            return Err(MrvError::DimensionMismatch(format!(
                "loss segments have shape {:?}, mask has {:?}",
                loss.dim(),
                dim
            )));
        }

        let start = self.config.study_start;
        let end = self.config.study_end;
        log::info!(
            "Classifying loss strata for {}..={} over {:?} pixels",
            start,
            end,
            dim
        );

        let forest_all = mask.forest_in_all_years(start, end)?;
        let f_end = mask.layer(end)?;
        let f_preend = mask.layer(end - 1)?;

        let (rows, cols) = dim;
        let mut out = ClassImage::zeros(dim);
        for row in 0..rows {
            for col in 0..cols {
                let stratum = if loss.detection_year_at(row, col).is_none() {
                    // no detected disturbance is the default outcome, not an error
                    if forest_all[[row, col]] != 0 {
                        LossStratum::StableForest
                    } else {
                        LossStratum::NonForest
                    }
                } else {
                    let end_forest = f_end[[row, col]] != 0;
                    let preend_forest = f_preend[[row, col]] != 0;
                    if preend_forest && end_forest {
                        LossStratum::Degradation
                    } else if !end_forest {
                        LossStratum::Deforestation
                    } else {
                        LossStratum::Degradation
                    }
                };
                out[[row, col]] = stratum.code();
            }
        }
        Ok(out)
    }

    /// Gain strata (0/1): a detected gain segment on a pixel that was not
    /// forest through the whole window. Stable-forest pixels cannot gain.
    pub fn classify_gain(
        &self,
        gain: &ChangeSegmentStack,
        mask: &AnnualForestMask,
    ) -> MrvResult<ClassImage> {
        let dim = mask.dim();
        if gain.dim() != dim {
            return Err(MrvError::DimensionMismatch(format!(
                "gain segments have shape {:?}, mask has {:?}",
                gain.dim(),
                dim
            )));
        }

        log::info!(
            "Classifying gain strata for {}..={} over {:?} pixels",
            self.config.study_start,
            self.config.study_end,
            dim
        );

        let forest_all = mask.forest_in_all_years(self.config.study_start, self.config.study_end)?;

        let (rows, cols) = dim;
        let mut out = ClassImage::zeros(dim);
        for row in 0..rows {
            for col in 0..cols {
                let gained = gain.detection_year_at(row, col).is_some()
                    && forest_all[[row, col]] == 0;
                out[[row, col]] = if gained {
                    GainStratum::Gain.code()
                } else {
                    GainStratum::NoGain.code()
                };
            }
        }
        Ok(out)
    }
}
