//! Geo data store boundary.
//!
//! The production pipeline runs against a distributed raster/vector engine
//! that resolves assets by logical key and executes sampling and zonal
//! queries server-side. [`GeoDataStore`] captures that contract;
//! [`MemoryStore`] is the in-process implementation used for pipeline runs
//! over materialized rasters and for tests. Missing assets and bands fail
//! loudly; there is no silent default-to-zero anywhere on this boundary.

use std::collections::{BTreeMap, HashMap};

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;

use crate::types::{
    AnnualForestMask, ChangeSegmentStack, ClassImage, GeoTransform, LandCoverSeries, LandUseLayer,
    MaskImage, MrvError, MrvResult, PixelIndex, Polygon,
};

/// Per-class point quota for a stratified draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassQuota {
    pub class: u8,
    pub count: usize,
}

/// Outcome of one stratified draw, shortfalls made explicit
#[derive(Debug, Clone, Default)]
pub struct StratifiedDraw {
    /// Selected pixels, in draw order
    pub selected: Vec<PixelIndex>,
    /// Classes whose quota exceeded the remaining eligible population
    pub shortfalls: Vec<ClassShortfall>,
}

/// A class whose requested quota could not be met from the eligible universe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassShortfall {
    pub class: u8,
    pub requested: usize,
    pub available: usize,
}

/// Read-side contract of the external raster/vector engine
pub trait GeoDataStore {
    fn transform(&self) -> &GeoTransform;

    /// (rows, cols) of every raster asset in this store
    fn dimensions(&self) -> (usize, usize);

    fn forest_mask(&self, asset_id: &str) -> MrvResult<&AnnualForestMask>;

    fn change_segments(&self, asset_id: &str) -> MrvResult<&ChangeSegmentStack>;

    fn land_cover(&self, asset_id: &str) -> MrvResult<&LandCoverSeries>;

    fn vector_layer(&self, asset_id: &str) -> MrvResult<&LandUseLayer>;

    /// Draw `count` distinct pixels uniformly from the eligible universe.
    ///
    /// The universe is every pixel with a nonzero `eligible` flag whose
    /// center falls inside `region` (when given). If fewer than `count`
    /// pixels remain, all of them are returned. Deterministic for a fixed
    /// (seed, eligible, region) triple.
    fn sample_random(
        &self,
        eligible: &MaskImage,
        region: Option<&Polygon>,
        count: usize,
        seed: u64,
    ) -> MrvResult<Vec<PixelIndex>>;

    /// Draw per-class quotas from `class`, restricted to the eligible universe.
    ///
    /// A class with fewer remaining pixels than its quota yields all of them
    /// plus a [`ClassShortfall`] entry; exhaustion is an outcome, not an error.
    fn sample_stratified(
        &self,
        class: &ClassImage,
        eligible: &MaskImage,
        region: Option<&Polygon>,
        quotas: &[ClassQuota],
        seed: u64,
    ) -> MrvResult<StratifiedDraw>;

    /// Per-class pixel counts of `class` within the eligible universe
    fn zonal_count(
        &self,
        class: &ClassImage,
        region: Option<&Polygon>,
    ) -> MrvResult<BTreeMap<u8, u64>>;
}

/// In-memory geo data store over materialized rasters and vector layers
pub struct MemoryStore {
    transform: GeoTransform,
    rows: usize,
    cols: usize,
    masks: HashMap<String, AnnualForestMask>,
    segments: HashMap<String, ChangeSegmentStack>,
    land_cover: HashMap<String, LandCoverSeries>,
    vectors: HashMap<String, LandUseLayer>,
}

impl MemoryStore {
    pub fn new(transform: GeoTransform, rows: usize, cols: usize) -> Self {
        Self {
            transform,
            rows,
            cols,
            masks: HashMap::new(),
            segments: HashMap::new(),
            land_cover: HashMap::new(),
            vectors: HashMap::new(),
        }
    }

    pub fn insert_forest_mask(&mut self, asset_id: &str, mask: AnnualForestMask) -> MrvResult<()> {
        self.check_dim(mask.dim(), asset_id)?;
        self.masks.insert(asset_id.to_string(), mask);
        Ok(())
    }

    pub fn insert_change_segments(
        &mut self,
        asset_id: &str,
        segments: ChangeSegmentStack,
    ) -> MrvResult<()> {
        self.check_dim(segments.dim(), asset_id)?;
        self.segments.insert(asset_id.to_string(), segments);
        Ok(())
    }

    pub fn insert_land_cover(&mut self, asset_id: &str, series: LandCoverSeries) -> MrvResult<()> {
        self.check_dim(series.dim(), asset_id)?;
        self.land_cover.insert(asset_id.to_string(), series);
        Ok(())
    }

    pub fn insert_vector_layer(&mut self, asset_id: &str, layer: LandUseLayer) {
        self.vectors.insert(asset_id.to_string(), layer);
    }

    fn check_dim(&self, dim: (usize, usize), asset_id: &str) -> MrvResult<()> {
        if dim != (self.rows, self.cols) {
            return Err(MrvError::DimensionMismatch(format!(
                "asset '{}' has shape {:?}, store expects ({}, {})",
                asset_id, dim, self.rows, self.cols
            )));
        }
        Ok(())
    }

    /// Pixels with a nonzero eligibility flag whose center lies in the region,
    /// enumerated in row-major order so draws are reproducible.
    fn eligible_pixels(
        &self,
        eligible: &MaskImage,
        region: Option<&Polygon>,
    ) -> MrvResult<Vec<PixelIndex>> {
        if eligible.dim() != (self.rows, self.cols) {
            return Err(MrvError::DimensionMismatch(format!(
                "eligibility mask has shape {:?}, store expects ({}, {})",
                eligible.dim(),
                self.rows,
                self.cols
            )));
        }
        let bbox = region.map(|p| p.bounding_box());
        let mut pixels = Vec::new();
        for row in 0..self.rows {
            for col in 0..self.cols {
                if eligible[[row, col]] == 0 {
                    continue;
                }
                if let Some(poly) = region {
                    let (lon, lat) = self.transform.pixel_center(row, col);
                    // bbox reject before the full ray cast
                    if !bbox.as_ref().map_or(true, |b| b.contains(lon, lat))
                        || !poly.contains(lon, lat)
                    {
                        continue;
                    }
                }
                pixels.push((row, col));
            }
        }
        Ok(pixels)
    }
}

impl GeoDataStore for MemoryStore {
    fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    fn dimensions(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    fn forest_mask(&self, asset_id: &str) -> MrvResult<&AnnualForestMask> {
        self.masks
            .get(asset_id)
            .ok_or_else(|| MrvError::MissingAsset(format!("forest mask '{}'", asset_id)))
    }

    fn change_segments(&self, asset_id: &str) -> MrvResult<&ChangeSegmentStack> {
        self.segments
            .get(asset_id)
            .ok_or_else(|| MrvError::MissingAsset(format!("change segments '{}'", asset_id)))
    }

    fn land_cover(&self, asset_id: &str) -> MrvResult<&LandCoverSeries> {
        self.land_cover
            .get(asset_id)
            .ok_or_else(|| MrvError::MissingAsset(format!("land cover '{}'", asset_id)))
    }

    fn vector_layer(&self, asset_id: &str) -> MrvResult<&LandUseLayer> {
        self.vectors
            .get(asset_id)
            .ok_or_else(|| MrvError::MissingAsset(format!("vector layer '{}'", asset_id)))
    }

    fn sample_random(
        &self,
        eligible: &MaskImage,
        region: Option<&Polygon>,
        count: usize,
        seed: u64,
    ) -> MrvResult<Vec<PixelIndex>> {
        let universe = self.eligible_pixels(eligible, region)?;
        log::debug!(
            "random draw: {} requested from {} eligible pixels",
            count,
            universe.len()
        );
        if universe.len() <= count {
            return Ok(universe);
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let picks = index::sample(&mut rng, universe.len(), count);
        Ok(picks.iter().map(|i| universe[i]).collect())
    }

    fn sample_stratified(
        &self,
        class: &ClassImage,
        eligible: &MaskImage,
        region: Option<&Polygon>,
        quotas: &[ClassQuota],
        seed: u64,
    ) -> MrvResult<StratifiedDraw> {
        if class.dim() != (self.rows, self.cols) {
            return Err(MrvError::DimensionMismatch(format!(
                "class band has shape {:?}, store expects ({}, {})",
                class.dim(),
                self.rows,
                self.cols
            )));
        }
        let universe = self.eligible_pixels(eligible, region)?;
        let mut by_class: BTreeMap<u8, Vec<PixelIndex>> = BTreeMap::new();
        for &(row, col) in &universe {
            by_class
                .entry(class[[row, col]])
                .or_default()
                .push((row, col));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut draw = StratifiedDraw::default();
        for quota in quotas {
            if quota.count == 0 {
                continue;
            }
            let pool = by_class.get(&quota.class).map_or(&[][..], Vec::as_slice);
            if pool.len() <= quota.count {
                draw.selected.extend_from_slice(pool);
                if pool.len() < quota.count {
                    log::debug!(
                        "stratified draw: class {} exhausted ({} available, {} requested)",
                        quota.class,
                        pool.len(),
                        quota.count
                    );
                    draw.shortfalls.push(ClassShortfall {
                        class: quota.class,
                        requested: quota.count,
                        available: pool.len(),
                    });
                }
            } else {
                let picks = index::sample(&mut rng, pool.len(), quota.count);
                draw.selected.extend(picks.iter().map(|i| pool[i]));
            }
        }
        Ok(draw)
    }

    fn zonal_count(
        &self,
        class: &ClassImage,
        region: Option<&Polygon>,
    ) -> MrvResult<BTreeMap<u8, u64>> {
        if class.dim() != (self.rows, self.cols) {
            return Err(MrvError::DimensionMismatch(format!(
                "class band has shape {:?}, store expects ({}, {})",
                class.dim(),
                self.rows,
                self.cols
            )));
        }
        let all = MaskImage::from_elem((self.rows, self.cols), 1);
        let mut counts = BTreeMap::new();
        for (row, col) in self.eligible_pixels(&all, region)? {
            *counts.entry(class[[row, col]]).or_insert(0u64) += 1;
        }
        Ok(counts)
    }
}
