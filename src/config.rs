//! Analysis configuration loader - parses analysis.toml
//!
//! Every threshold, window and model setting used by the analysis core lives
//! in one `AnalysisConfig` passed down by the caller. Each field defaults to
//! the documented value, so an `analysis.toml` only needs the settings it
//! overrides (or can be absent altogether).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::analysis::decompose::Frequency;
use crate::model::AnalysisError;

/// Default config file, relative to the working directory.
pub const CONFIG_PATH: &str = "analysis.toml";

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Rogue wave / rogue gust criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RogueConfig {
    /// Hmax/Hs ratio above which a wave is rogue.
    pub wave_ratio_threshold: f64,
    /// Minimum Hs (m) for an observation to be a candidate.
    pub wave_min_height_m: f64,
    /// Gust factor considered "typical" for open-sea winds.
    pub typical_gust_factor: f64,
    /// Multiple of the typical gust factor that defines a rogue gust.
    pub gust_factor_multiplier: f64,
    /// Minimum sustained wind (m/s) for a gust candidate.
    pub gust_min_wind_ms: f64,
}

impl Default for RogueConfig {
    fn default() -> Self {
        Self {
            wave_ratio_threshold: 2.0,
            wave_min_height_m: 2.0,
            typical_gust_factor: 1.3,
            gust_factor_multiplier: 2.0,
            gust_min_wind_ms: 5.0,
        }
    }
}

impl RogueConfig {
    /// Gust/wind ratio above which a gust is rogue (1.3 × 2 = 2.6 by default).
    pub fn gust_ratio_threshold(&self) -> f64 {
        self.typical_gust_factor * self.gust_factor_multiplier
    }
}

/// Seasonal-trend decomposition settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompositionConfig {
    /// Named cycle: daily, weekly, monthly or annual.
    pub frequency: String,
    pub inner_iterations: usize,
    /// Robustness (outer) iterations; 0 disables robust reweighting.
    pub robust_iterations: usize,
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            frequency: "daily".to_string(),
            inner_iterations: 2,
            robust_iterations: 0,
        }
    }
}

impl DecompositionConfig {
    /// The configured cycle, parsed from its name.
    pub fn frequency(&self) -> Result<Frequency, AnalysisError> {
        Frequency::parse(&self.frequency)
    }
}

/// Aggregate statistics, linear trend and anomaly settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub min_years_for_trend: usize,
    pub anomaly_z_threshold: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            min_years_for_trend: 3,
            anomaly_z_threshold: 3.0,
        }
    }
}

/// Extreme value engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtremesConfig {
    /// Minimum annual maxima for a GEV fit.
    pub min_years: usize,
    /// Quantile of the valid values used as the default POT threshold.
    pub threshold_quantile: f64,
    pub decluster: bool,
    pub decluster_hours: f64,
    /// Minimum (declustered) exceedances for a GPD fit.
    pub min_exceedances: usize,
    pub confidence_level: f64,
    /// Return periods (years) reported by the batch report.
    pub return_periods: Vec<f64>,
    pub curve_max_period: f64,
    pub curve_points: usize,
}

impl Default for ExtremesConfig {
    fn default() -> Self {
        Self {
            min_years: 5,
            threshold_quantile: 0.95,
            decluster: true,
            decluster_hours: 48.0,
            min_exceedances: 30,
            confidence_level: 0.95,
            return_periods: vec![2.0, 5.0, 10.0, 25.0, 50.0, 100.0],
            curve_max_period: 200.0,
            curve_points: 50,
        }
    }
}

/// Wave-height regression settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub train_fraction: f64,
    /// Lags in hours for the target and wind speed.
    pub lags: Vec<u32>,
    pub n_trees: usize,
    pub min_complete_rows: usize,
    pub min_node_size: usize,
    /// Predictors tried per split; `None` means one third of the predictors.
    pub features_per_split: Option<usize>,
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            train_fraction: 0.7,
            lags: vec![1, 2, 3],
            n_trees: 500,
            min_complete_rows: 100,
            min_node_size: 5,
            features_per_split: None,
            seed: 42,
        }
    }
}

/// Per-station batch orchestration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

// ---------------------------------------------------------------------------
// Root configuration
// ---------------------------------------------------------------------------

/// Root configuration structure for TOML parsing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub rogue: RogueConfig,
    pub decomposition: DecompositionConfig,
    pub trend: TrendConfig,
    pub extremes: ExtremesConfig,
    pub model: ModelConfig,
    pub batch: BatchConfig,
}

impl AnalysisConfig {
    /// Rejects settings no analysis can run with.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let invalid = |msg: String| -> Result<(), AnalysisError> {
            Err(AnalysisError::InvalidConfiguration(msg))
        };

        let positives = [
            ("rogue.wave_ratio_threshold", self.rogue.wave_ratio_threshold),
            ("rogue.typical_gust_factor", self.rogue.typical_gust_factor),
            ("rogue.gust_factor_multiplier", self.rogue.gust_factor_multiplier),
            ("trend.anomaly_z_threshold", self.trend.anomaly_z_threshold),
            ("extremes.decluster_hours", self.extremes.decluster_hours),
            ("extremes.curve_max_period", self.extremes.curve_max_period),
        ];
        for (name, value) in positives {
            if !(value > 0.0) {
                return invalid(format!("{} must be positive, got {}", name, value));
            }
        }
        if self.rogue.wave_min_height_m < 0.0 || self.rogue.gust_min_wind_ms < 0.0 {
            return invalid("rogue minimum base values must not be negative".to_string());
        }
        self.decomposition.frequency()?;
        if self.decomposition.inner_iterations == 0 {
            return invalid("decomposition.inner_iterations must be at least 1".to_string());
        }
        let q = self.extremes.threshold_quantile;
        if !(q > 0.0 && q < 1.0) {
            return invalid(format!("extremes.threshold_quantile must be in (0, 1), got {}", q));
        }
        let c = self.extremes.confidence_level;
        if !(c > 0.0 && c < 1.0) {
            return invalid(format!("extremes.confidence_level must be in (0, 1), got {}", c));
        }
        if self.extremes.curve_max_period <= 1.1 {
            return invalid("extremes.curve_max_period must exceed 1.1 years".to_string());
        }
        if self.extremes.return_periods.iter().any(|p| !(*p > 1.0)) {
            return invalid("extremes.return_periods must all exceed 1 year".to_string());
        }
        let f = self.model.train_fraction;
        if !(f > 0.0 && f < 1.0) {
            return invalid(format!("model.train_fraction must be in (0, 1), got {}", f));
        }
        if self.model.lags.is_empty() || self.model.lags.contains(&0) {
            return invalid("model.lags must be a non-empty list of positive hours".to_string());
        }
        if self.model.n_trees == 0 || self.model.min_node_size == 0 {
            return invalid("model.n_trees and model.min_node_size must be at least 1".to_string());
        }
        if self.batch.workers == 0 {
            return invalid("batch.workers must be at least 1".to_string());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Errors while reading `analysis.toml`.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io { path: String, source: std::io::Error },

    #[error("Failed to parse {path}: {source}")]
    Parse { path: String, source: toml::de::Error },

    #[error(transparent)]
    Invalid(AnalysisError),
}

/// Parses and validates a configuration document.
pub fn parse_config(contents: &str, origin: &str) -> Result<AnalysisConfig, ConfigError> {
    let config: AnalysisConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: origin.to_string(),
        source,
    })?;
    config.validate().map_err(ConfigError::Invalid)?;
    Ok(config)
}

/// Loads configuration from a TOML file.
pub fn load_config_from(path: &Path) -> Result<AnalysisConfig, ConfigError> {
    let display = path.display().to_string();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: display.clone(),
        source,
    })?;
    parse_config(&contents, &display)
}

/// Loads `analysis.toml` from the working directory, falling back to the
/// documented defaults when the file does not exist.
pub fn load_config() -> Result<AnalysisConfig, ConfigError> {
    let path = Path::new(CONFIG_PATH);
    if !path.exists() {
        log::info!("{} not found, using default analysis settings", CONFIG_PATH);
        return Ok(AnalysisConfig::default());
    }
    load_config_from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = AnalysisConfig::default();
        assert_eq!(config.rogue.wave_ratio_threshold, 2.0);
        assert_eq!(config.rogue.wave_min_height_m, 2.0);
        assert!((config.rogue.gust_ratio_threshold() - 2.6).abs() < 1e-12);
        assert_eq!(config.rogue.gust_min_wind_ms, 5.0);
        assert_eq!(config.extremes.min_years, 5);
        assert_eq!(config.extremes.decluster_hours, 48.0);
        assert_eq!(config.extremes.min_exceedances, 30);
        assert_eq!(config.extremes.threshold_quantile, 0.95);
        assert_eq!(config.model.train_fraction, 0.7);
        assert_eq!(config.model.lags, vec![1, 2, 3]);
        assert_eq!(config.model.n_trees, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config = parse_config(
            "[extremes]\ndecluster_hours = 72.0\n\n[rogue]\ntypical_gust_factor = 1.4\n",
            "inline",
        )
        .expect("partial config should parse");
        assert_eq!(config.extremes.decluster_hours, 72.0);
        assert_eq!(config.extremes.min_exceedances, 30);
        assert!((config.rogue.gust_ratio_threshold() - 2.8).abs() < 1e-12);
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = parse_config("", "inline").unwrap();
        assert_eq!(config, AnalysisConfig::default());
    }

    #[test]
    fn test_non_positive_threshold_rejected() {
        let err = parse_config("[rogue]\nwave_ratio_threshold = 0.0\n", "inline").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(AnalysisError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_frequency_is_parsed_from_section() {
        let config = parse_config("[decomposition]\nfrequency = \"Weekly\"\n", "inline").unwrap();
        assert_eq!(config.decomposition.frequency(), Ok(Frequency::Weekly));
        assert_eq!(AnalysisConfig::default().decomposition.frequency(), Ok(Frequency::Daily));
    }

    #[test]
    fn test_read_failure_keeps_io_source() {
        let err = load_config_from(Path::new("/nonexistent/analysis.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().starts_with("Failed to read /nonexistent/analysis.toml"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_unknown_frequency_rejected() {
        let err = parse_config("[decomposition]\nfrequency = \"fortnightly\"\n", "inline").unwrap_err();
        assert!(err.to_string().contains("fortnightly"));
    }

    #[test]
    fn test_train_fraction_out_of_range_rejected() {
        let mut config = AnalysisConfig::default();
        config.model.train_fraction = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_toml_reports_origin() {
        let err = parse_config("[extremes\n", "analysis.toml").unwrap_err();
        assert!(err.to_string().starts_with("Failed to parse analysis.toml"));
    }

    #[test]
    fn test_shipped_analysis_toml_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(CONFIG_PATH);
        let config = load_config_from(&path).expect("analysis.toml should load");
        assert_eq!(config.extremes.return_periods.len(), 6);
    }
}
