/// Feature engineering for the wave-height regression.
///
/// Features are built per station in time order and stored column-wise in a
/// `FeatureFrame`. Lags and the pressure tendency look back a fixed number
/// of hours on the station's own clock: if no observation exists exactly
/// k hours earlier the lag is null rather than borrowed from a neighbour.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::analysis::groupings::group_by_station;
use crate::analysis::gust::gust_factor;
use crate::config::ModelConfig;
use crate::model::{AnalysisError, Observation, Variable};

pub const TARGET: &str = "wave_height";

pub const WIND_DIR_SIN: &str = "wind_dir_sin";
pub const WIND_DIR_COS: &str = "wind_dir_cos";
pub const HOUR: &str = "hour";
pub const MONTH: &str = "month";
pub const WAVE_STEEPNESS: &str = "wave_steepness";
pub const GUST_FACTOR: &str = "gust_factor";
pub const PRESSURE_TENDENCY: &str = "pressure_tendency";

/// Deep-water wavelength factor g / 2π, in m/s².
const WAVELENGTH_FACTOR: f64 = 1.56;

// ---------------------------------------------------------------------------
// Derived quantities
// ---------------------------------------------------------------------------

/// Wave steepness H / (1.56 T²); `None` on a missing value or zero period.
pub fn wave_steepness(height: Option<f64>, period: Option<f64>) -> Option<f64> {
    let (h, t) = (height?, period?);
    let denom = WAVELENGTH_FACTOR * t * t;
    if denom == 0.0 || !denom.is_finite() {
        return None;
    }
    let s = h / denom;
    s.is_finite().then_some(s)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SteepnessClass {
    Safe,      // < 0.04
    Moderate,  // 0.04 - 0.06
    Dangerous, // >= 0.06
}

impl SteepnessClass {
    pub fn of(steepness: Option<f64>) -> Option<Self> {
        let s = steepness?;
        Some(if s < 0.04 {
            SteepnessClass::Safe
        } else if s < 0.06 {
            SteepnessClass::Moderate
        } else {
            SteepnessClass::Dangerous
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SteepnessClass::Safe => "safe",
            SteepnessClass::Moderate => "moderate",
            SteepnessClass::Dangerous => "dangerous",
        }
    }
}

pub fn lag_column(variable: Variable, hours: u32) -> String {
    format!("{}_lag{}", variable, hours)
}

/// Default predictor set for a lag configuration.
pub fn default_predictors(lags: &[u32]) -> Vec<String> {
    let mut names: Vec<String> = [
        Variable::WindSpeed.as_str(),
        Variable::Gust.as_str(),
        Variable::WavePeriod.as_str(),
        Variable::AtmosphericPressure.as_str(),
        PRESSURE_TENDENCY,
        WIND_DIR_SIN,
        WIND_DIR_COS,
        HOUR,
        MONTH,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    for &k in lags {
        names.push(lag_column(Variable::WaveHeight, k));
        names.push(lag_column(Variable::WindSpeed, k));
    }
    names
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// Column-oriented table of engineered features, one row per observation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureFrame {
    pub station_ids: Vec<String>,
    pub times: Vec<DateTime<Utc>>,
    columns: BTreeMap<String, Vec<Option<f64>>>,
}

impl FeatureFrame {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns.get(name).map(|c| c.as_slice())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|k| k.as_str())
    }

    /// Adds or replaces a column of the frame's length.
    pub fn insert_column(&mut self, name: impl Into<String>, values: Vec<Option<f64>>) -> Result<(), AnalysisError> {
        let name = name.into();
        if values.len() != self.len() {
            return Err(AnalysisError::InvalidConfiguration(format!(
                "column '{}' has {} rows, frame has {}",
                name,
                values.len(),
                self.len()
            )));
        }
        self.columns.insert(name, values);
        Ok(())
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Vec<Option<f64>>> {
        self.columns.remove(name)
    }

    /// Row values for `names`, `None` if any is missing.
    pub fn row(&self, index: usize, names: &[String]) -> Option<Vec<f64>> {
        names
            .iter()
            .map(|n| self.columns.get(n).and_then(|c| c[index]))
            .collect()
    }
}

/// Engineers the feature table, stations in id order, each in time order.
pub fn build_features(observations: &[Observation], config: &ModelConfig) -> FeatureFrame {
    let grouped = group_by_station(observations.to_vec());

    let mut frame = FeatureFrame::default();
    let mut columns: BTreeMap<String, Vec<Option<f64>>> = BTreeMap::new();
    let mut push = |name: &str, value: Option<f64>| {
        columns.entry(name.to_string()).or_default().push(value);
    };

    for (station_id, series) in &grouped {
        let by_time: HashMap<DateTime<Utc>, &Observation> = series.iter().map(|o| (o.time, o)).collect();
        let back = |obs: &Observation, hours: u32, variable: Variable| {
            by_time
                .get(&(obs.time - Duration::hours(hours as i64)))
                .and_then(|prev| prev.value(variable))
        };

        for obs in series {
            frame.station_ids.push(station_id.clone());
            frame.times.push(obs.time);

            for variable in Variable::ALL {
                push(variable.as_str(), obs.value(variable));
            }

            let radians = obs.value(Variable::WindDirection).map(f64::to_radians);
            push(WIND_DIR_SIN, radians.map(f64::sin));
            push(WIND_DIR_COS, radians.map(f64::cos));
            push(HOUR, Some(obs.time.hour() as f64));
            push(MONTH, Some(obs.time.month() as f64));
            push(
                WAVE_STEEPNESS,
                wave_steepness(obs.value(Variable::WaveHeight), obs.value(Variable::WavePeriod)),
            );
            push(GUST_FACTOR, gust_factor(obs));

            let pressure = obs.value(Variable::AtmosphericPressure);
            let previous = back(obs, 1, Variable::AtmosphericPressure);
            push(PRESSURE_TENDENCY, pressure.zip(previous).map(|(p, q)| p - q));

            for &k in &config.lags {
                push(&lag_column(Variable::WaveHeight, k), back(obs, k, Variable::WaveHeight));
                push(&lag_column(Variable::WindSpeed, k), back(obs, k, Variable::WindSpeed));
            }
        }
    }

    frame.columns = columns;
    frame
}
