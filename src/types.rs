use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Binary mask raster (1 = set, 0 = clear)
pub type MaskImage = Array2<u8>;

/// Categorical class raster (stratum codes, land-cover codes)
pub type ClassImage = Array2<u8>;

/// Integer year raster (0 = no detection)
pub type YearImage = Array2<i32>;

/// Continuous-valued raster (magnitudes, spectral values)
pub type ValueImage = Array2<f32>;

/// Per-year stand age raster
pub type AgeImage = Array2<u16>;

/// (row, col) pixel index into a raster
pub type PixelIndex = (usize, usize);

/// Loss strata derived from change segments and the annual forest mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LossStratum {
    StableForest,
    Degradation,
    Deforestation,
    NonForest,
}

impl LossStratum {
    pub const ALL: [LossStratum; 4] = [
        LossStratum::StableForest,
        LossStratum::Degradation,
        LossStratum::Deforestation,
        LossStratum::NonForest,
    ];

    /// Integer code used in class rasters and exports
    pub fn code(&self) -> u8 {
        match self {
            LossStratum::StableForest => 1,
            LossStratum::Degradation => 2,
            LossStratum::Deforestation => 3,
            LossStratum::NonForest => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(LossStratum::StableForest),
            2 => Some(LossStratum::Degradation),
            3 => Some(LossStratum::Deforestation),
            4 => Some(LossStratum::NonForest),
            _ => None,
        }
    }

    /// Human-readable label for CEO exports and reports
    pub fn label(&self) -> &'static str {
        match self {
            LossStratum::StableForest => "Stable Forest",
            LossStratum::Degradation => "Degradation",
            LossStratum::Deforestation => "Deforestation",
            LossStratum::NonForest => "Non-Forest",
        }
    }
}

impl std::fmt::Display for LossStratum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Gain strata: whether a valid gain segment was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GainStratum {
    NoGain,
    Gain,
}

impl GainStratum {
    pub const ALL: [GainStratum; 2] = [GainStratum::NoGain, GainStratum::Gain];

    pub fn code(&self) -> u8 {
        match self {
            GainStratum::NoGain => 0,
            GainStratum::Gain => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(GainStratum::NoGain),
            1 => Some(GainStratum::Gain),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GainStratum::NoGain => "No Gain",
            GainStratum::Gain => "Gain",
        }
    }
}

impl std::fmt::Display for GainStratum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Land-use designation of a project polygon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LandUse {
    Intervention,
    Reference,
    Counterfactual,
    Undesignated,
    /// Outside every designated polygon
    Other,
}

impl LandUse {
    /// The designations that carry their own polygon in a land-use layer
    pub const DESIGNATED: [LandUse; 4] = [
        LandUse::Intervention,
        LandUse::Reference,
        LandUse::Counterfactual,
        LandUse::Undesignated,
    ];

    pub fn code(&self) -> u8 {
        match self {
            LandUse::Intervention => 1,
            LandUse::Reference => 2,
            LandUse::Counterfactual => 3,
            LandUse::Undesignated => 4,
            LandUse::Other => 0,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(LandUse::Intervention),
            2 => Some(LandUse::Reference),
            3 => Some(LandUse::Counterfactual),
            4 => Some(LandUse::Undesignated),
            0 => Some(LandUse::Other),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LandUse::Intervention => "Intervention",
            LandUse::Reference => "Reference",
            LandUse::Counterfactual => "Counterfactual",
            LandUse::Undesignated => "Undesignated",
            LandUse::Other => "Other",
        }
    }

    /// Lowercase key for phase tags and report fields
    pub fn key(&self) -> &'static str {
        match self {
            LandUse::Intervention => "intervention",
            LandUse::Reference => "reference",
            LandUse::Counterfactual => "counterfactual",
            LandUse::Undesignated => "undesignated",
            LandUse::Other => "other",
        }
    }
}

impl std::fmt::Display for LandUse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Which sampler phase selected a point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplingPhase {
    Initial,
    AdditionalLoss,
    AdditionalGain,
    AdditionalLandUse(LandUse),
}

impl std::fmt::Display for SamplingPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SamplingPhase::Initial => write!(f, "initial"),
            SamplingPhase::AdditionalLoss => write!(f, "additional_loss"),
            SamplingPhase::AdditionalGain => write!(f, "additional_gain"),
            SamplingPhase::AdditionalLandUse(lu) => write!(f, "additional_{}", lu.key()),
        }
    }
}

/// Raw change-segment attributes at one pixel, carried through to exports
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentSample {
    /// Calendar year the change was detected, 0 = no detected change
    pub year_of_detection: i32,
    pub magnitude: f32,
    /// Segment duration in years
    pub duration: i32,
    /// Spectral index value immediately before the change
    pub pre_value: f32,
}

impl SegmentSample {
    /// Detection year as an Option (0 means no detected segment)
    pub fn detection_year(&self) -> Option<i32> {
        if self.year_of_detection > 0 {
            Some(self.year_of_detection)
        } else {
            None
        }
    }
}

/// One validation sample point, immutable after finalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    /// Dense 0-based id assigned at finalization (CEO PLOTID)
    pub plot_id: u32,
    pub lon: f64,
    pub lat: f64,
    pub row: usize,
    pub col: usize,
    pub loss_stratum: LossStratum,
    pub gain_stratum: GainStratum,
    /// Filled by land-use attribution; None until then
    pub land_use: Option<LandUse>,
    pub phase: SamplingPhase,
    pub loss_segment: SegmentSample,
    pub gain_segment: SegmentSample,
}

/// Co-registered change-detection bands for one delta type (loss or gain)
#[derive(Debug, Clone)]
pub struct ChangeSegmentStack {
    pub year_of_detection: YearImage,
    pub magnitude: ValueImage,
    pub duration: YearImage,
    pub pre_value: ValueImage,
}

impl ChangeSegmentStack {
    pub fn new(
        year_of_detection: YearImage,
        magnitude: ValueImage,
        duration: YearImage,
        pre_value: ValueImage,
    ) -> MrvResult<Self> {
        let dim = year_of_detection.dim();
        if magnitude.dim() != dim || duration.dim() != dim || pre_value.dim() != dim {
            return Err(MrvError::DimensionMismatch(format!(
                "segment bands disagree: yod {:?}, magnitude {:?}, duration {:?}, pre_value {:?}",
                dim,
                magnitude.dim(),
                duration.dim(),
                pre_value.dim()
            )));
        }
        Ok(Self {
            year_of_detection,
            magnitude,
            duration,
            pre_value,
        })
    }

    /// Stack with no detected segments anywhere (the undisturbed default)
    pub fn empty(rows: usize, cols: usize) -> Self {
        Self {
            year_of_detection: YearImage::zeros((rows, cols)),
            magnitude: ValueImage::zeros((rows, cols)),
            duration: YearImage::zeros((rows, cols)),
            pre_value: ValueImage::zeros((rows, cols)),
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.year_of_detection.dim()
    }

    /// Detection year at a pixel, None when no segment was detected
    pub fn detection_year_at(&self, row: usize, col: usize) -> Option<i32> {
        let year = self.year_of_detection[[row, col]];
        if year > 0 {
            Some(year)
        } else {
            None
        }
    }

    /// All raw attributes at a pixel, for carrying onto sample points
    pub fn sample_at(&self, row: usize, col: usize) -> SegmentSample {
        SegmentSample {
            year_of_detection: self.year_of_detection[[row, col]],
            magnitude: self.magnitude[[row, col]],
            duration: self.duration[[row, col]],
            pre_value: self.pre_value[[row, col]],
        }
    }
}

/// Annual forest/non-forest mask, one binary layer per calendar year
#[derive(Debug, Clone)]
pub struct AnnualForestMask {
    start_year: i32,
    layers: Vec<MaskImage>,
}

impl AnnualForestMask {
    pub fn new(start_year: i32, layers: Vec<MaskImage>) -> MrvResult<Self> {
        if layers.is_empty() {
            return Err(MrvError::InvalidInput(
                "forest mask needs at least one annual layer".to_string(),
            ));
        }
        let dim = layers[0].dim();
        for (i, layer) in layers.iter().enumerate() {
            if layer.dim() != dim {
                return Err(MrvError::DimensionMismatch(format!(
                    "mask layer {} has shape {:?}, expected {:?}",
                    start_year + i as i32,
                    layer.dim(),
                    dim
                )));
            }
        }
        Ok(Self { start_year, layers })
    }

    /// Combine two independent mask sources: forest wherever EITHER says forest.
    ///
    /// The OR combination biases toward not under-counting forest; a
    /// consensus rule would drop pixels a single classifier misses.
    pub fn combine_or(a: &AnnualForestMask, b: &AnnualForestMask) -> MrvResult<AnnualForestMask> {
        if a.start_year != b.start_year || a.layers.len() != b.layers.len() {
            return Err(MrvError::DimensionMismatch(format!(
                "mask year ranges disagree: {}..={} vs {}..={}",
                a.start_year,
                a.end_year(),
                b.start_year,
                b.end_year()
            )));
        }
        if a.dim() != b.dim() {
            return Err(MrvError::DimensionMismatch(format!(
                "mask shapes disagree: {:?} vs {:?}",
                a.dim(),
                b.dim()
            )));
        }
        let layers = a
            .layers
            .iter()
            .zip(&b.layers)
            .map(|(la, lb)| {
                let mut out = la.clone();
                out.zip_mut_with(lb, |x, &y| *x = u8::from(*x != 0 || y != 0));
                out
            })
            .collect();
        AnnualForestMask::new(a.start_year, layers)
    }

    pub fn start_year(&self) -> i32 {
        self.start_year
    }

    pub fn end_year(&self) -> i32 {
        self.start_year + self.layers.len() as i32 - 1
    }

    pub fn dim(&self) -> (usize, usize) {
        self.layers[0].dim()
    }

    /// Layer for one calendar year; a year outside the record is a loud error
    pub fn layer(&self, year: i32) -> MrvResult<&MaskImage> {
        if year < self.start_year || year > self.end_year() {
            return Err(MrvError::MissingBand(format!(
                "no forest mask layer for {} (record covers {}..={})",
                year,
                self.start_year,
                self.end_year()
            )));
        }
        Ok(&self.layers[(year - self.start_year) as usize])
    }

    pub fn is_forest(&self, year: i32, row: usize, col: usize) -> MrvResult<bool> {
        Ok(self.layer(year)?[[row, col]] != 0)
    }

    /// Mask of pixels that are forest in every year of [start, end]
    pub fn forest_in_all_years(&self, start: i32, end: i32) -> MrvResult<MaskImage> {
        let (rows, cols) = self.dim();
        let mut out = MaskImage::from_elem((rows, cols), 1);
        for year in start..=end {
            let layer = self.layer(year)?;
            out.zip_mut_with(layer, |x, &y| *x &= u8::from(y != 0));
        }
        Ok(out)
    }

    /// First year the pixel appears as forest, None if it never does
    pub fn first_forest_year(&self, row: usize, col: usize) -> Option<i32> {
        self.layers
            .iter()
            .position(|layer| layer[[row, col]] != 0)
            .map(|i| self.start_year + i as i32)
    }
}

/// Annual land-cover classification, one class raster per calendar year
#[derive(Debug, Clone)]
pub struct LandCoverSeries {
    start_year: i32,
    layers: Vec<ClassImage>,
}

impl LandCoverSeries {
    pub fn new(start_year: i32, layers: Vec<ClassImage>) -> MrvResult<Self> {
        if layers.is_empty() {
            return Err(MrvError::InvalidInput(
                "land-cover series needs at least one annual layer".to_string(),
            ));
        }
        let dim = layers[0].dim();
        for (i, layer) in layers.iter().enumerate() {
            if layer.dim() != dim {
                return Err(MrvError::DimensionMismatch(format!(
                    "land-cover layer {} has shape {:?}, expected {:?}",
                    start_year + i as i32,
                    layer.dim(),
                    dim
                )));
            }
        }
        Ok(Self { start_year, layers })
    }

    pub fn start_year(&self) -> i32 {
        self.start_year
    }

    pub fn end_year(&self) -> i32 {
        self.start_year + self.layers.len() as i32 - 1
    }

    pub fn dim(&self) -> (usize, usize) {
        self.layers[0].dim()
    }

    pub fn layer(&self, year: i32) -> MrvResult<&ClassImage> {
        if year < self.start_year || year > self.end_year() {
            return Err(MrvError::MissingBand(format!(
                "no land-cover layer for {} (record covers {}..={})",
                year,
                self.start_year,
                self.end_year()
            )));
        }
        Ok(&self.layers[(year - self.start_year) as usize])
    }

    pub fn class_at(&self, year: i32, row: usize, col: usize) -> MrvResult<u8> {
        Ok(self.layer(year)?[[row, col]])
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }
}

/// Affine raster-to-geographic transformation parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with no rotation terms
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            top_left_x,
            pixel_width,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height,
        }
    }

    /// Geographic coordinates of a pixel center
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let fc = col as f64 + 0.5;
        let fr = row as f64 + 0.5;
        let lon = self.top_left_x + fc * self.pixel_width + fr * self.rotation_x;
        let lat = self.top_left_y + fc * self.rotation_y + fr * self.pixel_height;
        (lon, lat)
    }
}

/// Simple polygon defined by an exterior ring of (lon, lat) vertices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: Vec<(f64, f64)>,
}

impl Polygon {
    pub fn new(exterior: Vec<(f64, f64)>) -> Self {
        Self { exterior }
    }

    /// Axis-aligned rectangle as a polygon
    pub fn rectangle(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self::new(vec![
            (min_lon, min_lat),
            (max_lon, min_lat),
            (max_lon, max_lat),
            (min_lon, max_lat),
        ])
    }

    /// Even-odd ray-cast point-in-polygon test
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        let n = self.exterior.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = self.exterior[i];
            let (xj, yj) = self.exterior[j];
            if (yi > lat) != (yj > lat) {
                let x_cross = (xj - xi) * (lat - yi) / (yj - yi) + xi;
                if lon < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let mut bbox = BoundingBox {
            min_lon: f64::INFINITY,
            max_lon: f64::NEG_INFINITY,
            min_lat: f64::INFINITY,
            max_lat: f64::NEG_INFINITY,
        };
        for &(lon, lat) in &self.exterior {
            bbox.min_lon = bbox.min_lon.min(lon);
            bbox.max_lon = bbox.max_lon.max(lon);
            bbox.min_lat = bbox.min_lat.min(lat);
            bbox.max_lat = bbox.max_lat.max(lat);
        }
        bbox
    }
}

/// One designated land-use polygon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandUsePolygon {
    pub land_use: LandUse,
    pub polygon: Polygon,
}

/// Non-overlapping land-use partition of the project area
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandUseLayer {
    pub features: Vec<LandUsePolygon>,
}

impl LandUseLayer {
    pub fn new(features: Vec<LandUsePolygon>) -> Self {
        Self { features }
    }

    /// First feature carrying the given designation
    pub fn feature(&self, land_use: LandUse) -> Option<&LandUsePolygon> {
        self.features.iter().find(|f| f.land_use == land_use)
    }
}

/// Aggregated carbon stock for one land use and year, with a ±95% CI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarbonRecord {
    pub year: i32,
    pub land_use: LandUse,
    /// Summed central estimate over the land-use polygon, tC
    pub carbon_sum: f64,
    pub carbon_sum_low_ci: f64,
    pub carbon_sum_high_ci: f64,
}

/// Error types for MRV processing
#[derive(Debug, thiserror::Error)]
pub enum MrvError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing asset: {0}")]
    MissingAsset(String),

    #[error("Missing band: {0}")]
    MissingBand(String),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Overlapping land-use polygons: {0}")]
    OverlappingLandUse(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Report serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for MRV operations
pub type MrvResult<T> = Result<T, MrvError>;
