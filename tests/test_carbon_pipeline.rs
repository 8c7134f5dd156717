use approx::assert_relative_eq;
use canopy::config::{CarbonConstant, DealConfig, GrowthCurve, GrowthParams};
use canopy::core::{ForestHistoryCase, MrvPipeline};
use canopy::io::export::ExportAdapter;
use canopy::io::store::MemoryStore;
use canopy::types::{
    AnnualForestMask, ChangeSegmentStack, ClassImage, GeoTransform, LandCoverSeries, LandUse,
    LandUseLayer, LandUsePolygon, MaskImage, Polygon,
};

const PASTURE: u8 = 15;

/// 2x2 deal, study 2015..=2020, mask record from 1985:
///   (0,0) forest since 1990, undisturbed          -> 31 years old in 2020
///   (0,1) forest at baseline, deforested 2018     -> age 0 from 2018
///   (1,0) never forest, gained 2016               -> age 5 in 2020
///   (1,1) never forest                            -> age 0, pasture cover
fn build(config: &DealConfig) -> MemoryStore {
    let transform = GeoTransform::north_up(-61.0, -9.5, 0.01, -0.01);
    let mut store = MemoryStore::new(transform, 2, 2);

    let mut layers = Vec::new();
    for year in config.baseline_year..=config.study_end {
        let mut layer = MaskImage::zeros((2, 2));
        layer[[0, 0]] = u8::from(year >= 1990);
        layer[[0, 1]] = u8::from(year < 2018);
        layer[[1, 0]] = u8::from(year >= 2016);
        layers.push(layer);
    }
    store
        .insert_forest_mask(
            &config.assets.forest_mask,
            AnnualForestMask::new(config.baseline_year, layers).unwrap(),
        )
        .unwrap();

    let mut loss = ChangeSegmentStack::empty(2, 2);
    loss.year_of_detection[[0, 1]] = 2018;
    store
        .insert_change_segments(&config.assets.loss_segments, loss)
        .unwrap();

    let mut gain = ChangeSegmentStack::empty(2, 2);
    gain.year_of_detection[[1, 0]] = 2016;
    store
        .insert_change_segments(&config.assets.gain_segments, gain)
        .unwrap();

    store.insert_vector_layer(
        &config.assets.land_use,
        LandUseLayer::new(vec![LandUsePolygon {
            land_use: LandUse::Intervention,
            polygon: Polygon::rectangle(-61.0, -9.52, -60.98, -9.5),
        }]),
    );

    store
}

fn config() -> DealConfig {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut config = DealConfig::new("inocas", 2015, 2020, 1985);
    config.assumed_baseline_age = 30;
    config
}

fn curve() -> GrowthCurve {
    GrowthParams::default().central
}

#[test]
fn test_history_cases_and_ages() {
    let config = config();
    let store = build(&config);
    let output = MrvPipeline::new(&config, &store)
        .expect("valid config")
        .run_carbon()
        .expect("carbon branch");
    let series = &output.stand_age;

    assert!(matches!(
        series.case_at(0, 0),
        ForestHistoryCase::Stable { .. }
    ));
    assert!(matches!(
        series.case_at(0, 1),
        ForestHistoryCase::LostOnly { loss_year: 2018, .. }
    ));
    assert!(matches!(
        series.case_at(1, 0),
        ForestHistoryCase::GainedOnly { gain_year: 2016 }
    ));
    assert_eq!(series.case_at(1, 1), ForestHistoryCase::NeverForest);

    // stable pixel: established 1990, so 31 years old in 2020
    assert_eq!(series.age_at(2020, 0, 0).unwrap(), 31);

    // reset law at the loss event
    assert!(series.age_at(2017, 0, 1).unwrap() > 0);
    assert_eq!(series.age_at(2018, 0, 1).unwrap(), 0);
    assert_eq!(series.age_at(2020, 0, 1).unwrap(), 0);

    // restart law at the gain event
    assert_eq!(series.age_at(2015, 1, 0).unwrap(), 0);
    assert_eq!(series.age_at(2016, 1, 0).unwrap(), 1);
    assert_eq!(series.age_at(2020, 1, 0).unwrap(), 5);

    // monotonicity on uninterrupted intervals
    for year in 2015..2020 {
        let now = series.age_at(year, 0, 0).unwrap();
        let next = series.age_at(year + 1, 0, 0).unwrap();
        assert_eq!(next, now + 1);
    }
}

#[test]
fn test_carbon_sums_follow_the_curve() {
    let config = config();
    let store = build(&config);
    let output = MrvPipeline::new(&config, &store)
        .unwrap()
        .run_carbon()
        .unwrap();

    // one land use, six years
    assert_eq!(output.records.len(), 6);

    let area = config.carbon.pixel_area_ha;
    let r2020 = output
        .records
        .iter()
        .find(|r| r.year == 2020)
        .expect("2020 record");
    assert_eq!(r2020.land_use, LandUse::Intervention);

    // stable pixel at 31, gained pixel at 5, two pixels at zero
    let expected = (curve().density(31) + curve().density(5)) * area;
    assert_relative_eq!(r2020.carbon_sum, expected, epsilon = 1e-9);

    // in 2015 the later-deforested pixel is still standing: established
    // before the 1985 baseline, so 30 assumed years plus the record
    let r2015 = output.records.iter().find(|r| r.year == 2015).unwrap();
    let expected_2015 = (curve().density(26) + curve().density(60)) * area;
    assert_relative_eq!(r2015.carbon_sum, expected_2015, epsilon = 1e-9);
}

#[test]
fn test_carbon_is_zero_at_age_zero() {
    assert_eq!(curve().density(0), 0.0);
}

#[test]
fn test_nonforest_substitution_through_pipeline() {
    let mut config = config();
    config.assets.land_cover = Some("land_cover".to_string());
    config
        .carbon
        .nonforest_carbon
        .insert(PASTURE, CarbonConstant {
            central: 5.0,
            low: 3.0,
            high: 7.0,
        });

    let mut store = build(&config);
    // pasture on the never-forest pixel for every study year
    let mut layers = Vec::new();
    for _ in config.study_start..=config.study_end {
        let mut layer = ClassImage::zeros((2, 2));
        layer[[1, 1]] = PASTURE;
        layers.push(layer);
    }
    store
        .insert_land_cover(
            "land_cover",
            LandCoverSeries::new(config.study_start, layers).unwrap(),
        )
        .unwrap();

    let output = MrvPipeline::new(&config, &store)
        .unwrap()
        .run_carbon()
        .unwrap();
    let r2020 = output.records.iter().find(|r| r.year == 2020).unwrap();

    let area = config.carbon.pixel_area_ha;
    let expected = (curve().density(31) + curve().density(5) + 5.0) * area;
    assert_relative_eq!(r2020.carbon_sum, expected, epsilon = 1e-9);
    // the pasture constant widens the interval
    assert!(r2020.carbon_sum_high_ci > r2020.carbon_sum);
    assert!(r2020.carbon_sum_low_ci < r2020.carbon_sum);
}

#[test]
fn test_carbon_csv_export() {
    let config = config();
    let store = build(&config);
    let output = MrvPipeline::new(&config, &store)
        .unwrap()
        .run_carbon()
        .unwrap();

    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("inocas_2020_carbon.csv");
    let mut file = std::fs::File::create(&path).expect("create csv");
    ExportAdapter::write_carbon_series(&mut file, &output.records).expect("write csv");

    let text = std::fs::read_to_string(&path).expect("read back");
    assert!(text.starts_with("carbonSum,carbonSum_lowCI,carbonSum_highCI,year,land_use\n"));
    assert_eq!(text.lines().count() - 1, output.records.len());
    assert!(text.contains(",2020,Intervention"));
}

#[test]
fn test_repeated_carbon_runs_are_identical() {
    let config = config();
    let store = build(&config);
    let pipeline = MrvPipeline::new(&config, &store).unwrap();

    let first = pipeline.run_carbon().unwrap();
    let second = pipeline.run_carbon().unwrap();
    assert_eq!(first.records, second.records);
}
