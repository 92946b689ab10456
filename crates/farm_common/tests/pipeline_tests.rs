//! Prediction pipeline tests: dataset -> encoding -> split -> fit -> predict.
//!
//! Deterministic, no network.

use approx::{assert_abs_diff_eq, assert_relative_eq};
use farm_common::{Dataset, ModelConfig, UsagePredictor, UsageRecord};
use std::io::Write;

const FOUR_ROWS: &str = "\
Area,Year,Value
X,2000,10
X,2001,12
Y,2000,5
Y,2001,7
";

fn record(region: &str, year: i32, value: f64) -> UsageRecord {
    UsageRecord {
        region: region.to_string(),
        year,
        value,
    }
}

/// Three regions over twenty years with a wobble so the fit is not exact
fn synthetic_dataset() -> Dataset {
    let mut records = Vec::new();
    for (code, region) in ["Brazil", "India", "Kenya"].iter().enumerate() {
        for year in 1990..2010 {
            let wobble = ((year * 7 + code as i32 * 3) % 5) as f64 - 2.0;
            let value = 100.0 + 40.0 * code as f64 + 3.5 * f64::from(year - 1990) + wobble;
            records.push(record(region, year, value));
        }
    }
    Dataset::from_records(records).unwrap()
}

// ============================================================================
// End-to-end scenario
// ============================================================================

#[test]
fn test_four_row_scenario_follows_linear_trend() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(FOUR_ROWS.as_bytes()).unwrap();

    let dataset = Dataset::load(file.path()).unwrap();
    let predictor = UsagePredictor::train(&dataset, &ModelConfig::default()).unwrap();

    let prediction = predictor.predict_region("X", 2002).unwrap();
    assert_abs_diff_eq!(prediction, 14.0, epsilon = 1e-9);
    assert_eq!(predictor.encoding().encode("X"), Some(0));
    assert_eq!(predictor.predict(0, 2002), prediction);
}

#[test]
fn test_four_row_scenario_reproducible() {
    let dataset = Dataset::from_reader(FOUR_ROWS.as_bytes()).unwrap();
    let a = UsagePredictor::train(&dataset, &ModelConfig::default()).unwrap();
    let b = UsagePredictor::train(&dataset, &ModelConfig::default()).unwrap();

    assert_eq!(a.predict(0, 2002).to_bits(), b.predict(0, 2002).to_bits());
    assert_eq!(a.predict(1, 2002).to_bits(), b.predict(1, 2002).to_bits());
}

#[test]
fn test_small_training_partition_refits_without_evaluation() {
    let dataset = Dataset::from_reader(FOUR_ROWS.as_bytes()).unwrap();
    let predictor = UsagePredictor::train(&dataset, &ModelConfig::default()).unwrap();

    assert_eq!(predictor.split_sizes(), (2, 2));
    assert!(predictor.evaluation().is_none());
}

// ============================================================================
// Determinism and linearity
// ============================================================================

#[test]
fn test_prediction_bit_for_bit_reproducible() {
    let dataset = synthetic_dataset();
    let config = ModelConfig::default();
    let first = UsagePredictor::train(&dataset, &config).unwrap();
    let second = UsagePredictor::train(&dataset, &config).unwrap();

    for code in 0..3 {
        for year in [1985, 2000, 2016] {
            let value = first.predict(code, year);
            assert_eq!(value.to_bits(), first.predict(code, year).to_bits());
            assert_eq!(value.to_bits(), second.predict(code, year).to_bits());
        }
    }
}

#[test]
fn test_prediction_linear_in_year() {
    let dataset = synthetic_dataset();
    let predictor = UsagePredictor::train(&dataset, &ModelConfig::default()).unwrap();
    let year_coef = predictor.coefficients().year;

    for code in 0..3 {
        for year in 1995..2020 {
            let step = predictor.predict(code, year + 1) - predictor.predict(code, year);
            assert_relative_eq!(step, year_coef, max_relative = 1e-9);
        }
    }
}

#[test]
fn test_synthetic_fit_recovers_trend() {
    let dataset = synthetic_dataset();
    let predictor = UsagePredictor::train(&dataset, &ModelConfig::default()).unwrap();

    assert_eq!(predictor.split_sizes(), (42, 18));
    let coefficients = predictor.coefficients();
    assert_abs_diff_eq!(coefficients.year, 3.5, epsilon = 0.2);
    assert_abs_diff_eq!(coefficients.region, 40.0, epsilon = 1.0);

    let eval = predictor.evaluation().expect("held-out evaluation");
    assert_eq!(eval.samples, 18);
    assert!(eval.r2 > 0.95, "r2 = {}", eval.r2);
    assert!(eval.rmse < 3.0, "rmse = {}", eval.rmse);
}

#[test]
fn test_extrapolates_unseen_inputs() {
    let dataset = synthetic_dataset();
    let predictor = UsagePredictor::train(&dataset, &ModelConfig::default()).unwrap();

    assert!(predictor.predict(25, 2050).is_finite());
    assert!(predictor.predict(-3, 1900).is_finite());
    assert!(predictor.predict_region("Atlantis", 2000).is_none());
}

#[test]
fn test_different_seed_changes_split() {
    let dataset = synthetic_dataset();
    let a = UsagePredictor::train(&dataset, &ModelConfig { test_fraction: 0.3, seed: 1 }).unwrap();
    let b = UsagePredictor::train(&dataset, &ModelConfig { test_fraction: 0.3, seed: 2 }).unwrap();

    assert_ne!(
        a.coefficients().intercept.to_bits(),
        b.coefficients().intercept.to_bits()
    );
}

// ============================================================================
// Region encoding
// ============================================================================

#[test]
fn test_region_encoding_is_bijection_onto_range() {
    let dataset = synthetic_dataset();
    let predictor = UsagePredictor::train(&dataset, &ModelConfig::default()).unwrap();
    let encoding = predictor.encoding();

    let regions = dataset.regions();
    assert_eq!(encoding.len(), regions.len());

    let mut codes: Vec<i64> = regions
        .iter()
        .map(|r| encoding.encode(r).unwrap())
        .collect();
    codes.sort_unstable();
    assert_eq!(codes, (0..regions.len() as i64).collect::<Vec<_>>());

    for region in &regions {
        let code = encoding.encode(region).unwrap();
        assert_eq!(encoding.decode(code), Some(region.as_str()));
    }
}

// ============================================================================
// Trend aggregation
// ============================================================================

#[test]
fn test_trend_means_per_year() {
    let dataset = Dataset::from_records(vec![
        record("A", 1990, 10.0),
        record("B", 1990, 20.0),
        record("A", 1991, 5.0),
        record("A", 1993, 1.0),
        record("B", 1993, 2.0),
        record("C", 1993, 6.0),
        record("A", 1999, 100.0),
    ])
    .unwrap();

    let trend = dataset.trend(1990, 1995);
    let years: Vec<i32> = trend.iter().map(|p| p.year).collect();
    assert_eq!(years, vec![1990, 1991, 1993]);
    assert_abs_diff_eq!(trend[0].average, 15.0);
    assert_abs_diff_eq!(trend[1].average, 5.0);
    assert_abs_diff_eq!(trend[2].average, 3.0);

    let single = dataset.trend(1999, 1999);
    assert_eq!(single.len(), 1);
    assert_abs_diff_eq!(single[0].average, 100.0);

    assert!(dataset.trend(2000, 2016).is_empty());
}
