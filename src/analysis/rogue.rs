/// Rogue-event detection.
///
/// An observation is a rogue event when a peak value is large compared with
/// its background: Hmax against significant wave height for waves, the peak
/// gust against sustained wind for gusts. Detection is a pure filter and
/// sort over an observation slice; nothing is persisted here.
///
/// Candidates are observations where both peak and base are valid and the
/// base is positive. Eligible candidates also meet the minimum base value.
/// Events are eligible candidates whose ratio exceeds the threshold.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::RogueConfig;
use crate::model::{AnalysisError, Observation, Season, TimeOfDay, Variable, WindCategory};
use crate::stats;

/// Co-located variables compared between rogue and normal observations.
pub const BREAKDOWN_VARIABLES: [Variable; 6] = [
    Variable::WaveHeight,
    Variable::Hmax,
    Variable::WavePeriod,
    Variable::WindSpeed,
    Variable::Gust,
    Variable::AtmosphericPressure,
];

// ---------------------------------------------------------------------------
// Criterion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RogueKind {
    Wave,
    Gust,
}

/// A peak/base ratio rule: event when `peak / base > threshold` and
/// `base >= min_base`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RogueCriterion {
    pub kind: RogueKind,
    pub threshold: f64,
    pub min_base: f64,
}

impl RogueCriterion {
    pub fn wave(config: &RogueConfig) -> Self {
        Self {
            kind: RogueKind::Wave,
            threshold: config.wave_ratio_threshold,
            min_base: config.wave_min_height_m,
        }
    }

    pub fn gust(config: &RogueConfig) -> Self {
        Self {
            kind: RogueKind::Gust,
            threshold: config.gust_ratio_threshold(),
            min_base: config.gust_min_wind_ms,
        }
    }

    pub fn peak_variable(&self) -> Variable {
        match self.kind {
            RogueKind::Wave => Variable::Hmax,
            RogueKind::Gust => Variable::Gust,
        }
    }

    pub fn base_variable(&self) -> Variable {
        match self.kind {
            RogueKind::Wave => Variable::WaveHeight,
            RogueKind::Gust => Variable::WindSpeed,
        }
    }

    /// Human-readable rule, e.g. `hmax/wave_height > 2.0 (wave_height >= 2 m)`.
    pub fn definition(&self) -> String {
        let base = self.base_variable();
        format!(
            "{}/{} > {:.1} ({} >= {} {})",
            self.peak_variable(),
            base,
            self.threshold,
            base,
            self.min_base,
            base.unit()
        )
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !(self.threshold.is_finite() && self.threshold > 0.0) {
            return Err(AnalysisError::InvalidConfiguration(format!(
                "rogue ratio threshold must be positive, got {}",
                self.threshold
            )));
        }
        if !(self.min_base.is_finite() && self.min_base >= 0.0) {
            return Err(AnalysisError::InvalidConfiguration(format!(
                "minimum base value must be non-negative, got {}",
                self.min_base
            )));
        }
        Ok(())
    }

    /// Peak/base ratio of a candidate, `None` when the row is not a candidate.
    pub fn ratio(&self, obs: &Observation) -> Option<f64> {
        rogue_ratio(obs.value(self.peak_variable()), obs.value(self.base_variable()))
    }

    fn is_eligible(&self, obs: &Observation) -> bool {
        self.ratio(obs).is_some()
            && obs.value(self.base_variable()).is_some_and(|b| b >= self.min_base)
    }
}

/// `peak / base`, or `None` when either value is missing or base is not
/// positive.
pub fn rogue_ratio(peak: Option<f64>, base: Option<f64>) -> Option<f64> {
    match (peak, base) {
        (Some(p), Some(b)) if b > 0.0 => Some(p / b),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// A detected rogue observation with its categorical context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RogueEvent {
    pub station_id: String,
    pub time: DateTime<Utc>,
    pub kind: RogueKind,
    pub peak: f64,
    pub base: f64,
    pub ratio: f64,
    pub wind_category: Option<WindCategory>,
    pub time_of_day: TimeOfDay,
    pub season: Season,
    pub observation: Observation,
}

fn to_event(obs: &Observation, criterion: &RogueCriterion, ratio: f64) -> Option<RogueEvent> {
    Some(RogueEvent {
        station_id: obs.station_id.clone(),
        time: obs.time,
        kind: criterion.kind,
        peak: obs.value(criterion.peak_variable())?,
        base: obs.value(criterion.base_variable())?,
        ratio,
        wind_category: obs.value(Variable::WindSpeed).map(WindCategory::from_speed),
        time_of_day: TimeOfDay::of(&obs.time),
        season: Season::of(&obs.time),
        observation: obs.clone(),
    })
}

/// All rogue events, highest ratio first; equal ratios most recent first.
pub fn detect(observations: &[Observation], criterion: &RogueCriterion) -> Result<Vec<RogueEvent>, AnalysisError> {
    criterion.validate()?;

    let mut events: Vec<RogueEvent> = observations
        .iter()
        .filter(|obs| criterion.is_eligible(obs))
        .filter_map(|obs| {
            let ratio = criterion.ratio(obs)?;
            if ratio > criterion.threshold {
                to_event(obs, criterion, ratio)
            } else {
                None
            }
        })
        .collect();

    events.sort_by(|a, b| b.ratio.total_cmp(&a.ratio).then(b.time.cmp(&a.time)));
    Ok(events)
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionOutcome {
    /// No row passed the candidate and minimum-base filters.
    NoEligibleCandidates,
    /// Eligible rows exist, none above the ratio threshold.
    BelowThreshold,
    EventsFound,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RogueDetectionSummary {
    pub outcome: DetectionOutcome,
    pub candidates: usize,
    pub eligible: usize,
    pub events: usize,
    /// Events as a percentage of eligible rows; `None` when nothing is eligible.
    pub occurrence_pct: Option<f64>,
}

pub fn summarize(observations: &[Observation], criterion: &RogueCriterion) -> Result<RogueDetectionSummary, AnalysisError> {
    criterion.validate()?;

    let candidates = observations.iter().filter(|o| criterion.ratio(o).is_some()).count();
    let eligible: Vec<f64> = observations
        .iter()
        .filter(|o| criterion.is_eligible(o))
        .filter_map(|o| criterion.ratio(o))
        .collect();
    let events = eligible.iter().filter(|r| **r > criterion.threshold).count();

    let outcome = if eligible.is_empty() {
        DetectionOutcome::NoEligibleCandidates
    } else if events == 0 {
        DetectionOutcome::BelowThreshold
    } else {
        DetectionOutcome::EventsFound
    };

    Ok(RogueDetectionSummary {
        outcome,
        candidates,
        eligible: eligible.len(),
        events,
        occurrence_pct: percentage(events, eligible.len()),
    })
}

pub(crate) fn percentage(part: usize, whole: usize) -> Option<f64> {
    if whole == 0 {
        None
    } else {
        Some(100.0 * part as f64 / whole as f64)
    }
}

// ---------------------------------------------------------------------------
// Comparative statistics
// ---------------------------------------------------------------------------

/// Mean of one co-located variable for rogue and for normal rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableBreakdown {
    pub variable: Variable,
    pub rogue_mean: Option<f64>,
    pub normal_mean: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationRogueStats {
    pub station_id: String,
    pub eligible: usize,
    pub events: usize,
    pub occurrence_pct: Option<f64>,
    /// Mean and max ratio over every eligible row of the station.
    pub mean_ratio: Option<f64>,
    pub max_ratio: Option<f64>,
    pub breakdown: Vec<VariableBreakdown>,
}

fn mean_of(rows: &[&Observation], variable: Variable) -> Option<f64> {
    let values: Vec<f64> = rows.iter().filter_map(|o| o.value(variable)).collect();
    if values.is_empty() { None } else { Some(stats::mean(&values)) }
}

/// Per-station rogue counts and rogue-vs-normal means, ordered by station.
pub fn comparative_stats(
    observations: &[Observation],
    criterion: &RogueCriterion,
) -> Result<Vec<StationRogueStats>, AnalysisError> {
    criterion.validate()?;

    let mut by_station: BTreeMap<&str, (Vec<&Observation>, Vec<&Observation>)> = BTreeMap::new();
    for obs in observations.iter().filter(|o| criterion.is_eligible(o)) {
        let (rogue, normal) = by_station.entry(obs.station_id.as_str()).or_default();
        match criterion.ratio(obs) {
            Some(r) if r > criterion.threshold => rogue.push(obs),
            _ => normal.push(obs),
        }
    }

    Ok(by_station
        .into_iter()
        .map(|(station_id, (rogue, normal))| {
            let ratios: Vec<f64> = rogue.iter().chain(&normal).filter_map(|o| criterion.ratio(o)).collect();
            let eligible = rogue.len() + normal.len();
            StationRogueStats {
                station_id: station_id.to_string(),
                eligible,
                events: rogue.len(),
                occurrence_pct: percentage(rogue.len(), eligible),
                mean_ratio: if ratios.is_empty() { None } else { Some(stats::mean(&ratios)) },
                max_ratio: ratios.iter().copied().reduce(f64::max),
                breakdown: BREAKDOWN_VARIABLES
                    .iter()
                    .map(|&variable| VariableBreakdown {
                        variable,
                        rogue_mean: mean_of(&rogue, variable),
                        normal_mean: mean_of(&normal, variable),
                    })
                    .collect(),
            }
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
