/// Wave-height regression: feature engineering, a random-forest regressor
/// trained on a time-ordered split, and held-out evaluation.
pub mod features;
pub mod forest;

pub use features::{
    build_features, default_predictors, lag_column, wave_steepness, FeatureFrame, SteepnessClass, TARGET,
};
pub use forest::{ForestConfig, RandomForest};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::ModelConfig;
use crate::model::AnalysisError;

/// Fixed wave-height buckets (m) for the bucketed evaluation: [lower, upper).
pub const HEIGHT_BUCKETS: [(&str, f64, f64); 4] = [
    ("0-2 m", 0.0, 2.0),
    ("2-4 m", 2.0, 4.0),
    ("4-6 m", 4.0, 6.0),
    (">6 m", 6.0, f64::INFINITY),
];

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    pub n: usize,
    pub rmse: f64,
    pub mae: f64,
    /// `None` when the actual values have no variance.
    pub r_squared: Option<f64>,
    /// Mean of predicted − actual.
    pub bias: f64,
}

impl Metrics {
    /// `None` for empty or mismatched inputs.
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Option<Self> {
        if actual.is_empty() || actual.len() != predicted.len() {
            return None;
        }
        let n = actual.len() as f64;
        let errors: Vec<f64> = predicted.iter().zip(actual).map(|(p, a)| p - a).collect();
        let mean_actual = actual.iter().sum::<f64>() / n;
        let sse: f64 = errors.iter().map(|e| e * e).sum();
        let sst: f64 = actual.iter().map(|a| (a - mean_actual).powi(2)).sum();

        Some(Metrics {
            n: actual.len(),
            rmse: (sse / n).sqrt(),
            mae: errors.iter().map(|e| e.abs()).sum::<f64>() / n,
            r_squared: (sst > 0.0).then(|| 1.0 - sse / sst),
            bias: errors.iter().sum::<f64>() / n,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketMetrics {
    pub bucket: &'static str,
    /// `None` when no held-out row falls in the bucket.
    pub metrics: Option<Metrics>,
}

/// Metrics per wave-height bucket of the actual values.
pub fn bucket_metrics(actual: &[f64], predicted: &[f64]) -> Vec<BucketMetrics> {
    HEIGHT_BUCKETS
        .iter()
        .map(|&(bucket, lo, hi)| {
            let (a, p): (Vec<f64>, Vec<f64>) = actual
                .iter()
                .zip(predicted)
                .filter(|(a, _)| **a >= lo && **a < hi)
                .map(|(a, p)| (*a, *p))
                .unzip();
            BucketMetrics {
                bucket,
                metrics: Metrics::compute(&a, &p),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub n_train: usize,
    pub n_test: usize,
    /// First time in the held-out slice.
    pub split_time: DateTime<Utc>,
    pub overall: Option<Metrics>,
    pub by_height: Vec<BucketMetrics>,
    pub oob_r_squared: Option<f64>,
    pub oob_rmse: Option<f64>,
    /// Most important first.
    pub importance: Vec<FeatureImportance>,
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WaveHeightModel {
    predictors: Vec<String>,
    forest: RandomForest,
}

#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub model: WaveHeightModel,
    pub evaluation: Evaluation,
}

fn missing_columns(frame: &FeatureFrame, names: &[String]) -> Vec<String> {
    names.iter().filter(|n| !frame.has_column(n)).cloned().collect()
}

impl WaveHeightModel {
    pub fn predictors(&self) -> &[String] {
        &self.predictors
    }

    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }

    /// Predictions for every row of `frame`; rows with a null predictor give
    /// `None`. Fails when any predictor column is absent from the frame.
    pub fn predict(&self, frame: &FeatureFrame) -> Result<Vec<Option<f64>>, AnalysisError> {
        let missing = missing_columns(frame, &self.predictors);
        if !missing.is_empty() {
            return Err(AnalysisError::MissingPredictors(missing));
        }
        Ok((0..frame.len())
            .map(|i| frame.row(i, &self.predictors).map(|row| self.forest.predict(&row)))
            .collect())
    }
}

/// Trains the regressor on the earliest `train_fraction` of the complete
/// rows and evaluates it on the rest.
///
/// Rows with a null target or predictor are dropped before the split. Rows
/// are ordered by time (stations interleaved) and never shuffled.
pub fn train(frame: &FeatureFrame, predictors: &[String], config: &ModelConfig) -> Result<TrainedModel, AnalysisError> {
    let mut required = predictors.to_vec();
    required.push(TARGET.to_string());
    let missing = missing_columns(frame, &required);
    if !missing.is_empty() {
        return Err(AnalysisError::MissingPredictors(missing));
    }
    if !(config.train_fraction > 0.0 && config.train_fraction < 1.0) {
        return Err(AnalysisError::InvalidConfiguration(format!(
            "train fraction must be in (0, 1), got {}",
            config.train_fraction
        )));
    }

    let target = frame.column(TARGET).unwrap_or_default();
    let mut rows: Vec<(DateTime<Utc>, Vec<f64>, f64)> = (0..frame.len())
        .filter_map(|i| Some((frame.times[i], frame.row(i, predictors)?, target[i]?)))
        .collect();
    rows.sort_by_key(|(time, _, _)| *time);

    let needed = config.min_complete_rows.max(2);
    if rows.len() < needed {
        return Err(AnalysisError::insufficient("wave-height model complete rows", needed, rows.len()));
    }

    let split = ((rows.len() as f64 * config.train_fraction).floor() as usize).clamp(1, rows.len() - 1);
    let (train_rows, test_rows) = rows.split_at(split);

    let x: Vec<Vec<f64>> = train_rows.iter().map(|(_, r, _)| r.clone()).collect();
    let y: Vec<f64> = train_rows.iter().map(|(_, _, t)| *t).collect();
    let forest = RandomForest::fit(
        &x,
        &y,
        &ForestConfig {
            n_trees: config.n_trees,
            min_node_size: config.min_node_size,
            features_per_split: config.features_per_split,
            seed: config.seed,
        },
    )?;

    let actual: Vec<f64> = test_rows.iter().map(|(_, _, t)| *t).collect();
    let predicted: Vec<f64> = test_rows.iter().map(|(_, r, _)| forest.predict(r)).collect();

    let mut importance: Vec<FeatureImportance> = predictors
        .iter()
        .zip(&forest.importance)
        .map(|(feature, importance)| FeatureImportance {
            feature: feature.clone(),
            importance: *importance,
        })
        .collect();
    importance.sort_by(|a, b| b.importance.total_cmp(&a.importance));

    let evaluation = Evaluation {
        n_train: train_rows.len(),
        n_test: test_rows.len(),
        split_time: test_rows[0].0,
        overall: Metrics::compute(&actual, &predicted),
        by_height: bucket_metrics(&actual, &predicted),
        oob_r_squared: forest.oob_r_squared,
        oob_rmse: forest.oob_rmse,
        importance,
    };

    log::info!(
        "wave-height model: {} train / {} test rows, {} trees, test RMSE {}",
        evaluation.n_train,
        evaluation.n_test,
        forest.n_trees(),
        evaluation
            .overall
            .as_ref()
            .map_or("n/a".to_string(), |m| format!("{:.3}", m.rmse))
    );

    Ok(TrainedModel {
        model: WaveHeightModel {
            predictors: predictors.to_vec(),
            forest,
        },
        evaluation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_on_known_errors() {
        let m = Metrics::compute(&[1.0, 2.0, 3.0], &[2.0, 2.0, 2.0]).unwrap();
        assert_eq!(m.n, 3);
        assert!((m.rmse - (2.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!((m.mae - 2.0 / 3.0).abs() < 1e-12);
        assert!(m.bias.abs() < 1e-12);
        assert!((m.r_squared.unwrap() - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_actuals_have_no_r_squared() {
        let m = Metrics::compute(&[2.0, 2.0], &[2.5, 2.5]).unwrap();
        assert_eq!(m.r_squared, None);
        assert!((m.bias - 0.5).abs() < 1e-12);
        assert!(Metrics::compute(&[], &[]).is_none());
    }

    #[test]
    fn test_buckets_are_fixed_half_open() {
        let actual = [0.5, 2.0, 3.9, 6.0, 11.0];
        let predicted = [0.5, 2.0, 4.1, 6.5, 10.0];
        let buckets = bucket_metrics(&actual, &predicted);
        let counts: Vec<usize> = buckets.iter().map(|b| b.metrics.as_ref().map_or(0, |m| m.n)).collect();
        assert_eq!(counts, vec![1, 2, 0, 2]);
        assert_eq!(buckets[3].bucket, ">6 m");
        assert!(buckets[2].metrics.is_none());
    }

    #[test]
    fn test_train_rejects_absent_columns() {
        let frame = FeatureFrame::default();
        let err = train(&frame, &["swell_height".to_string()], &ModelConfig::default()).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::MissingPredictors(vec!["swell_height".to_string(), TARGET.to_string()])
        );
    }
}
