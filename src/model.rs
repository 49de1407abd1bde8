//! Core data types for the buoy extreme-value analysis service.
//!
//! This module defines the shared domain model imported by all other modules:
//! the `Observation` row, the `Variable` column names, the calendar/wind
//! categories used to give detected events context, and `AnalysisError`.
//! It contains no I/O.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// QC flag value marking a good observation.
pub const QC_GOOD: i32 = 1;

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

/// One hourly record from a buoy.
///
/// `(station_id, time)` identifies an observation. Every measurement is
/// nullable: `None` means the sensor did not report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub station_id: String,
    pub time: DateTime<Utc>,
    pub wave_height: Option<f64>,          // Hs, m
    pub hmax: Option<f64>,                 // largest individual wave, m
    pub wave_period: Option<f64>,          // s
    pub wind_direction: Option<f64>,       // degrees true
    pub wind_speed: Option<f64>,           // sustained, m/s
    pub gust: Option<f64>,                 // m/s
    pub atmospheric_pressure: Option<f64>, // hPa
    pub air_temperature: Option<f64>,      // °C
    pub sea_temperature: Option<f64>,      // °C
    pub qc_flag: i32,
}

impl Observation {
    /// Empty observation (all measurements null, QC good).
    pub fn new(station_id: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            station_id: station_id.into(),
            time,
            wave_height: None,
            hmax: None,
            wave_period: None,
            wind_direction: None,
            wind_speed: None,
            gust: None,
            atmospheric_pressure: None,
            air_temperature: None,
            sea_temperature: None,
            qc_flag: QC_GOOD,
        }
    }

    /// Builder-style setter, handy for fixtures.
    pub fn with(mut self, variable: Variable, value: f64) -> Self {
        self.set(variable, Some(value));
        self
    }

    /// Valid value of a column: present and finite.
    pub fn value(&self, variable: Variable) -> Option<f64> {
        let raw = match variable {
            Variable::WaveHeight => self.wave_height,
            Variable::Hmax => self.hmax,
            Variable::WavePeriod => self.wave_period,
            Variable::WindDirection => self.wind_direction,
            Variable::WindSpeed => self.wind_speed,
            Variable::Gust => self.gust,
            Variable::AtmosphericPressure => self.atmospheric_pressure,
            Variable::AirTemperature => self.air_temperature,
            Variable::SeaTemperature => self.sea_temperature,
        };
        raw.filter(|v| v.is_finite())
    }

    pub fn set(&mut self, variable: Variable, value: Option<f64>) {
        let slot = match variable {
            Variable::WaveHeight => &mut self.wave_height,
            Variable::Hmax => &mut self.hmax,
            Variable::WavePeriod => &mut self.wave_period,
            Variable::WindDirection => &mut self.wind_direction,
            Variable::WindSpeed => &mut self.wind_speed,
            Variable::Gust => &mut self.gust,
            Variable::AtmosphericPressure => &mut self.atmospheric_pressure,
            Variable::AirTemperature => &mut self.air_temperature,
            Variable::SeaTemperature => &mut self.sea_temperature,
        };
        *slot = value;
    }

    pub fn is_good(&self) -> bool {
        self.qc_flag == QC_GOOD
    }
}

// ---------------------------------------------------------------------------
// Variables
// ---------------------------------------------------------------------------

/// Numeric measurement columns of the observation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    WaveHeight,
    Hmax,
    WavePeriod,
    WindDirection,
    WindSpeed,
    Gust,
    AtmosphericPressure,
    AirTemperature,
    SeaTemperature,
}

impl Variable {
    pub const ALL: [Variable; 9] = [
        Variable::WaveHeight,
        Variable::Hmax,
        Variable::WavePeriod,
        Variable::WindDirection,
        Variable::WindSpeed,
        Variable::Gust,
        Variable::AtmosphericPressure,
        Variable::AirTemperature,
        Variable::SeaTemperature,
    ];

    /// Column name as stored in the warehouse.
    pub fn as_str(&self) -> &'static str {
        match self {
            Variable::WaveHeight => "wave_height",
            Variable::Hmax => "hmax",
            Variable::WavePeriod => "wave_period",
            Variable::WindDirection => "wind_direction",
            Variable::WindSpeed => "wind_speed",
            Variable::Gust => "gust",
            Variable::AtmosphericPressure => "atmospheric_pressure",
            Variable::AirTemperature => "air_temperature",
            Variable::SeaTemperature => "sea_temperature",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Variable::WaveHeight | Variable::Hmax => "m",
            Variable::WavePeriod => "s",
            Variable::WindDirection => "deg",
            Variable::WindSpeed | Variable::Gust => "m/s",
            Variable::AtmosphericPressure => "hPa",
            Variable::AirTemperature | Variable::SeaTemperature => "degC",
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variable {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Variable::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| AnalysisError::InvalidConfiguration(format!("unknown variable '{}'", s)))
    }
}

// ---------------------------------------------------------------------------
// Calendar and wind categories
// ---------------------------------------------------------------------------

/// Meteorological season.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Season {
    Winter, // DJF
    Spring, // MAM
    Summer, // JJA
    Autumn, // SON
}

impl Season {
    pub const ALL: [Season; 4] = [Season::Winter, Season::Spring, Season::Summer, Season::Autumn];

    pub fn from_month(month: u32) -> Self {
        match month {
            12 | 1 | 2 => Season::Winter,
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            _ => Season::Autumn,
        }
    }

    pub fn of(time: &DateTime<Utc>) -> Self {
        Season::from_month(time.month())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Winter => "DJF",
            Season::Spring => "MAM",
            Season::Summer => "JJA",
            Season::Autumn => "SON",
        }
    }
}

/// Six-hour block of the (UTC) day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeOfDay {
    Night,
    Morning,
    Afternoon,
    Evening,
}

impl TimeOfDay {
    pub fn of(time: &DateTime<Utc>) -> Self {
        match time.hour() {
            0..=5 => TimeOfDay::Night,
            6..=11 => TimeOfDay::Morning,
            12..=17 => TimeOfDay::Afternoon,
            _ => TimeOfDay::Evening,
        }
    }
}

/// Sustained wind speed bucket, edges 5/10/15/20/25 m/s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WindCategory {
    Calm,     // < 5
    Light,    // 5-10
    Moderate, // 10-15
    Fresh,    // 15-20
    Strong,   // 20-25
    Gale,     // >= 25
}

impl WindCategory {
    pub fn from_speed(speed: f64) -> Self {
        if speed < 5.0 {
            WindCategory::Calm
        } else if speed < 10.0 {
            WindCategory::Light
        } else if speed < 15.0 {
            WindCategory::Moderate
        } else if speed < 20.0 {
            WindCategory::Fresh
        } else if speed < 25.0 {
            WindCategory::Strong
        } else {
            WindCategory::Gale
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WindCategory::Calm => "<5 m/s",
            WindCategory::Light => "5-10 m/s",
            WindCategory::Moderate => "10-15 m/s",
            WindCategory::Fresh => "15-20 m/s",
            WindCategory::Strong => "20-25 m/s",
            WindCategory::Gale => ">25 m/s",
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised by the analysis core.
///
/// `InsufficientData` is recoverable: batch callers record it and carry on
/// with partial results. The other variants stop the unit of work they were
/// raised in.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("insufficient data for {context}: need at least {needed}, got {got}")]
    InsufficientData {
        context: String,
        needed: usize,
        got: usize,
    },

    #[error("insufficient exceedances above {threshold:.3}: need at least {needed}, got {got}")]
    InsufficientExceedances {
        needed: usize,
        got: usize,
        threshold: f64,
    },

    #[error("missing predictor columns: {}", .0.join(", "))]
    MissingPredictors(Vec<String>),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("fit failed: {0}")]
    FitFailed(String),
}

impl AnalysisError {
    pub fn insufficient(context: impl Into<String>, needed: usize, got: usize) -> Self {
        AnalysisError::InsufficientData {
            context: context.into(),
            needed,
            got,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, AnalysisError::InsufficientData { .. })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
