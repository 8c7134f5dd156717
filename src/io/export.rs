//! Export formatting for downstream consumers.
//!
//! The interpretation tool is strict about its ingest format: flat
//! `PLOTID,SAMPLEID,LON,LAT` coordinate columns first, no `system:index`,
//! no geometry column. The other writers produce the confusion-matrix,
//! pixel-count and carbon time-series CSV surfaces.

use std::io::Write;

use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::Serialize;

use crate::config::DealConfig;
use crate::types::{CarbonRecord, MrvError, MrvResult, SamplePoint};

/// Provenance stamp attached to every export of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub deal: String,
    pub report_year: i32,
    pub seed: u64,
    pub generated_at: DateTime<Utc>,
}

impl RunManifest {
    pub fn new(config: &DealConfig) -> Self {
        Self {
            deal: config.deal.clone(),
            report_year: config.study_end,
            seed: config.sampling.seed,
            generated_at: Utc::now(),
        }
    }
}

/// Square interpreter-vs-map tally with human-readable stratum labels.
///
/// Rows are map strata, columns are interpreted (ground-truth) strata.
/// Filling it from raw interpreter answers happens upstream; this type
/// only holds and formats the finished tally.
#[derive(Debug, Clone)]
pub struct ConfusionMatrix {
    labels: Vec<String>,
    counts: Array2<u64>,
}

impl ConfusionMatrix {
    pub fn new(labels: Vec<String>) -> Self {
        let n = labels.len();
        Self {
            labels,
            counts: Array2::zeros((n, n)),
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn set(&mut self, map_idx: usize, interpreted_idx: usize, count: u64) {
        self.counts[[map_idx, interpreted_idx]] = count;
    }

    pub fn get(&self, map_idx: usize, interpreted_idx: usize) -> u64 {
        self.counts[[map_idx, interpreted_idx]]
    }
}

/// CSV/JSON formatting for the four export surfaces
pub struct ExportAdapter;

impl ExportAdapter {
    /// CEO sample-point CSV.
    ///
    /// Column order matters to the ingest side: the id/coordinate columns
    /// come first, then strata, land use, phase and the raw segment bands.
    pub fn write_ceo_points<W: Write>(writer: &mut W, points: &[SamplePoint]) -> MrvResult<()> {
        log::info!("Writing CEO sample-point CSV: {} points", points.len());

        writeln!(
            writer,
            "PLOTID,SAMPLEID,LON,LAT,loss_stratum,loss_stratum_label,gain_stratum,\
             gain_stratum_label,land_use,sampling_phase,loss_year,loss_magnitude,\
             loss_duration,loss_pre_value,gain_year,gain_magnitude,gain_duration,gain_pre_value"
        )?;

        for point in points {
            let land_use = point
                .land_use
                .ok_or_else(|| {
                    MrvError::Processing(format!(
                        "point {} exported before land-use attribution",
                        point.plot_id
                    ))
                })?
                .label();
            writeln!(
                writer,
                "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
                point.plot_id,
                point.plot_id,
                point.lon,
                point.lat,
                point.loss_stratum.code(),
                point.loss_stratum.label(),
                point.gain_stratum.code(),
                point.gain_stratum.label(),
                land_use,
                point.phase,
                point.loss_segment.year_of_detection,
                point.loss_segment.magnitude,
                point.loss_segment.duration,
                point.loss_segment.pre_value,
                point.gain_segment.year_of_detection,
                point.gain_segment.magnitude,
                point.gain_segment.duration,
                point.gain_segment.pre_value,
            )?;
        }
        Ok(())
    }

    /// Row-labelled confusion matrix with readable strata names as headers
    pub fn write_confusion_matrix<W: Write>(
        writer: &mut W,
        matrix: &ConfusionMatrix,
    ) -> MrvResult<()> {
        write!(writer, "map_stratum")?;
        for label in matrix.labels() {
            write!(writer, ",{}", label)?;
        }
        writeln!(writer)?;

        for (i, label) in matrix.labels().iter().enumerate() {
            write!(writer, "{}", label)?;
            for j in 0..matrix.labels().len() {
                write!(writer, ",{}", matrix.get(i, j))?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }

    /// Per-stratum pixel counts: `map_name,map_value,count,readable`
    pub fn write_pixel_counts<W, F>(
        writer: &mut W,
        map_name: &str,
        counts: &[(u8, u64)],
        readable: F,
    ) -> MrvResult<()>
    where
        W: Write,
        F: Fn(u8) -> String,
    {
        writeln!(writer, "map_name,map_value,count,readable")?;
        for &(value, count) in counts {
            writeln!(writer, "{},{},{},{}", map_name, value, count, readable(value))?;
        }
        Ok(())
    }

    /// Carbon time series: `carbonSum,carbonSum_lowCI,carbonSum_highCI,year,land_use`
    pub fn write_carbon_series<W: Write>(
        writer: &mut W,
        records: &[CarbonRecord],
    ) -> MrvResult<()> {
        log::info!("Writing carbon time-series CSV: {} records", records.len());

        writeln!(writer, "carbonSum,carbonSum_lowCI,carbonSum_highCI,year,land_use")?;
        for record in records {
            writeln!(
                writer,
                "{},{},{},{},{}",
                record.carbon_sum,
                record.carbon_sum_low_ci,
                record.carbon_sum_high_ci,
                record.year,
                record.land_use.label(),
            )?;
        }
        Ok(())
    }

    /// Serialize any report structure (sampling outcome, manifest) as JSON
    pub fn write_json_report<W: Write, T: Serialize>(writer: &mut W, report: &T) -> MrvResult<()> {
        serde_json::to_writer_pretty(&mut *writer, report)?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}
