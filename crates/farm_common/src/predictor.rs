//! Usage Predictor
//!
//! Two-feature ordinary least squares: (region code, year) -> usage value.
//!
//! Training happens once per loaded dataset:
//! 1. Regions are encoded as dense integer codes in sorted order.
//! 2. Records are shuffled with a seeded RNG and split into training and
//!    held-out partitions.
//! 3. OLS is fitted on the training partition (minimum-norm when the design
//!    is rank-deficient).
//! 4. R² and RMSE are computed on the held-out partition for diagnostics.
//!
//! The fitted [`UsagePredictor`] is immutable and reused for every prediction.

use crate::config::ModelConfig;
use crate::dataset::{Dataset, UsageRecord};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Relative determinant threshold below which the 2x2 system is treated as rank-deficient
const RANK_EPSILON: f64 = 1e-10;

/// Predictor training errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("cannot train on an empty dataset")]
    EmptyDataset,

    #[error("test fraction must be in [0, 1), got {0}")]
    InvalidTestFraction(f64),
}

/// Bijection between region identifiers and `0..n`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegionEncoding {
    codes: BTreeMap<String, i64>,
    regions: Vec<String>,
}

impl RegionEncoding {
    /// Assign codes to the sorted distinct regions of a dataset
    pub fn from_dataset(dataset: &Dataset) -> Self {
        let regions = dataset.regions();
        let codes = regions
            .iter()
            .enumerate()
            .map(|(code, region)| (region.clone(), code as i64))
            .collect();
        Self { codes, regions }
    }

    pub fn encode(&self, region: &str) -> Option<i64> {
        self.codes.get(region).copied()
    }

    pub fn decode(&self, code: i64) -> Option<&str> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| self.regions.get(idx))
            .map(String::as_str)
    }

    /// Regions in code order
    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Fitted linear model, stored around the training means
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub region_mean: f64,
    pub year_mean: f64,
    pub value_mean: f64,
    pub region_coef: f64,
    pub year_coef: f64,
    /// Rank of the centered design (0, 1 or 2)
    pub rank: u8,
}

impl LinearFit {
    /// Least-squares fit of `value ~ region + year` over (region, year, value) samples.
    ///
    /// Returns None for an empty sample set.
    pub fn fit(samples: &[(f64, f64, f64)]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len() as f64;
        let region_mean = samples.iter().map(|s| s.0).sum::<f64>() / n;
        let year_mean = samples.iter().map(|s| s.1).sum::<f64>() / n;
        let value_mean = samples.iter().map(|s| s.2).sum::<f64>() / n;

        // Centered scatter matrix [[srr, sry], [sry, syy]] and cross terms
        let (mut srr, mut sry, mut syy, mut srv, mut syv) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for &(region, year, value) in samples {
            let dr = region - region_mean;
            let dy = year - year_mean;
            let dv = value - value_mean;
            srr += dr * dr;
            sry += dr * dy;
            syy += dy * dy;
            srv += dr * dv;
            syv += dy * dv;
        }

        let trace = srr + syy;
        let det = srr * syy - sry * sry;

        let (region_coef, year_coef, rank) = if trace <= 0.0 {
            (0.0, 0.0, 0)
        } else if det > RANK_EPSILON * trace * trace {
            (
                (syy * srv - sry * syv) / det,
                (srr * syv - sry * srv) / det,
                2,
            )
        } else {
            // Rank one: the pseudo-inverse of S is S / trace(S)^2
            let scale = trace * trace;
            (
                (srr * srv + sry * syv) / scale,
                (sry * srv + syy * syv) / scale,
                1,
            )
        };

        Some(Self {
            region_mean,
            year_mean,
            value_mean,
            region_coef,
            year_coef,
            rank,
        })
    }

    pub fn predict(&self, region: f64, year: f64) -> f64 {
        self.value_mean
            + self.region_coef * (region - self.region_mean)
            + self.year_coef * (year - self.year_mean)
    }

    /// Value predicted at region 0, year 0
    pub fn intercept(&self) -> f64 {
        self.value_mean - self.region_coef * self.region_mean - self.year_coef * self.year_mean
    }
}

/// Held-out fit quality
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub r2: f64,
    pub rmse: f64,
    pub samples: usize,
}

impl Evaluation {
    /// Score predictions against actual values. Needs at least two samples.
    pub fn score(actual: &[f64], predicted: &[f64]) -> Option<Self> {
        if actual.len() < 2 || actual.len() != predicted.len() {
            return None;
        }
        let n = actual.len() as f64;
        let mean = actual.iter().sum::<f64>() / n;
        let ss_res: f64 = actual
            .iter()
            .zip(predicted)
            .map(|(a, p)| (a - p).powi(2))
            .sum();
        let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();

        let r2 = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res == 0.0 {
            1.0
        } else {
            0.0
        };

        Some(Self {
            r2,
            rmse: (ss_res / n).sqrt(),
            samples: actual.len(),
        })
    }
}

/// Intercept and feature weights in original units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coefficients {
    pub intercept: f64,
    pub region: f64,
    pub year: f64,
}

/// Trained usage model
#[derive(Debug, Clone)]
pub struct UsagePredictor {
    encoding: RegionEncoding,
    fit: LinearFit,
    evaluation: Option<Evaluation>,
    train_size: usize,
    test_size: usize,
}

impl UsagePredictor {
    /// Encode, split, fit and evaluate
    pub fn train(dataset: &Dataset, config: &ModelConfig) -> Result<Self, ModelError> {
        if dataset.is_empty() {
            return Err(ModelError::EmptyDataset);
        }
        if !(0.0..1.0).contains(&config.test_fraction) {
            return Err(ModelError::InvalidTestFraction(config.test_fraction));
        }

        let encoding = RegionEncoding::from_dataset(dataset);
        let samples: Vec<(f64, f64, f64)> = dataset
            .records()
            .iter()
            .map(|r| encode_record(&encoding, r))
            .collect();

        let (train_idx, test_idx) = split_indices(samples.len(), config.test_fraction, config.seed);
        let train: Vec<_> = train_idx.iter().map(|&i| samples[i]).collect();
        let test: Vec<_> = test_idx.iter().map(|&i| samples[i]).collect();

        let full_fit = LinearFit::fit(&samples).ok_or(ModelError::EmptyDataset)?;
        let train_fit = LinearFit::fit(&train).filter(|fit| fit.rank >= full_fit.rank);

        let (fit, evaluation) = match train_fit {
            Some(fit) => {
                let actual: Vec<f64> = test.iter().map(|s| s.2).collect();
                let predicted: Vec<f64> = test.iter().map(|s| fit.predict(s.0, s.1)).collect();
                (fit, Evaluation::score(&actual, &predicted))
            }
            None => {
                warn!(
                    "Training partition ({} records) cannot determine the model, refitting on all {} records",
                    train.len(),
                    samples.len()
                );
                (full_fit, None)
            }
        };

        match &evaluation {
            Some(eval) => info!(
                "Usage model trained on {} records: R2 {:.4}, RMSE {:.4} over {} held out",
                train.len(),
                eval.r2,
                eval.rmse,
                eval.samples
            ),
            None => info!("Usage model trained, no held-out evaluation available"),
        }

        Ok(Self {
            encoding,
            fit,
            evaluation,
            train_size: train.len(),
            test_size: test.len(),
        })
    }

    /// Predict usage for an encoded region and year.
    ///
    /// No range checks: unseen codes and years are extrapolated linearly.
    pub fn predict(&self, region_code: i64, year: i32) -> f64 {
        self.fit.predict(region_code as f64, f64::from(year))
    }

    /// Encode a region identifier, then predict
    pub fn predict_region(&self, region: &str, year: i32) -> Option<f64> {
        self.encoding
            .encode(region)
            .map(|code| self.predict(code, year))
    }

    pub fn encoding(&self) -> &RegionEncoding {
        &self.encoding
    }

    pub fn fit(&self) -> &LinearFit {
        &self.fit
    }

    pub fn coefficients(&self) -> Coefficients {
        Coefficients {
            intercept: self.fit.intercept(),
            region: self.fit.region_coef,
            year: self.fit.year_coef,
        }
    }

    /// Held-out R² and RMSE, if a usable held-out partition existed
    pub fn evaluation(&self) -> Option<&Evaluation> {
        self.evaluation.as_ref()
    }

    /// (training, held-out) partition sizes
    pub fn split_sizes(&self) -> (usize, usize) {
        (self.train_size, self.test_size)
    }
}

fn encode_record(encoding: &RegionEncoding, record: &UsageRecord) -> (f64, f64, f64) {
    // Every region in the dataset is in the encoding it was built from
    let code = encoding.encode(&record.region).unwrap_or_default();
    (code as f64, f64::from(record.year), record.value)
}

/// Seeded shuffle split: `ceil(fraction * n)` indices held out, the rest for training.
pub fn split_indices(n: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let test_len = ((test_fraction * n as f64).ceil() as usize).min(n);
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(test_len);
    (train, indices)
}
