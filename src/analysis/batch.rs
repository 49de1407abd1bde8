/// Per-station batch report.
///
/// Every station is analyzed independently on a worker pool: rogue-event
/// counts, the annual trend, a GEV block-maxima fit and a GPD
/// peaks-over-threshold fit, each with return levels. A failing unit is
/// recorded as a `SkippedUnit` and the batch carries on. The combined report
/// is assembled only after every station has reported back.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::mpsc;
use std::sync::Arc;
use threadpool::ThreadPool;

use crate::analysis::extremes::{
    fit_block_maxima, fit_peaks_over_threshold, return_levels, ExtremeFit, FittedDistribution, ReturnLevelEstimate,
};
use crate::analysis::groupings::group_by_station;
use crate::analysis::rogue::{summarize, RogueCriterion, RogueDetectionSummary};
use crate::analysis::trend::{annual_stats, AnnualSummary};
use crate::config::AnalysisConfig;
use crate::logging::{log_batch_summary, unit_target};
use crate::model::{Observation, Variable};
use crate::stations::display_name;

/// A unit of work that produced no result, with a one-line reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedUnit {
    pub station_id: String,
    pub analysis: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationReport {
    pub station_id: String,
    pub station_name: String,
    pub n_observations: usize,
    pub rogue_waves: Option<RogueDetectionSummary>,
    pub rogue_gusts: Option<RogueDetectionSummary>,
    pub annual: AnnualSummary,
    /// Fitted, or the insufficient-data sentinel with the raw maxima.
    pub gev: Option<ExtremeFit>,
    pub gev_return_levels: Vec<ReturnLevelEstimate>,
    pub gpd: Option<FittedDistribution>,
    pub gpd_return_levels: Vec<ReturnLevelEstimate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub generated_at: DateTime<Utc>,
    pub variable: Variable,
    /// Ordered by station id.
    pub stations: Vec<StationReport>,
    pub skipped: Vec<SkippedUnit>,
}

impl BatchReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Stations with no skipped unit.
    pub fn complete_stations(&self) -> usize {
        self.stations
            .iter()
            .filter(|s| !self.skipped.iter().any(|u| u.station_id == s.station_id))
            .count()
    }
}

// ---------------------------------------------------------------------------
// Single station
// ---------------------------------------------------------------------------

/// Runs every analysis of the report for one station's observations.
pub fn analyze_station(
    station_id: &str,
    observations: &[Observation],
    variable: Variable,
    config: &AnalysisConfig,
) -> (StationReport, Vec<SkippedUnit>) {
    let mut skipped = Vec::new();
    let mut skip = |analysis: &str, reason: String| {
        log::warn!(target: unit_target(station_id, analysis).as_str(), "skipped: {}", reason);
        skipped.push(SkippedUnit {
            station_id: station_id.to_string(),
            analysis: analysis.to_string(),
            reason,
        });
    };

    let mut rogue = |analysis: &str, criterion: RogueCriterion| match summarize(observations, &criterion) {
        Ok(summary) => Some(summary),
        Err(e) => {
            skip(analysis, e.to_string());
            None
        }
    };
    let rogue_waves = rogue("rogue_waves", RogueCriterion::wave(&config.rogue));
    let rogue_gusts = rogue("rogue_gusts", RogueCriterion::gust(&config.rogue));

    let annual = annual_stats(observations, variable, &config.trend);
    let periods = &config.extremes.return_periods;
    let level = config.extremes.confidence_level;

    let (gev, gev_return_levels) = match fit_block_maxima(observations, variable, &config.extremes) {
        Ok(fit) => match return_levels(&fit, periods, level) {
            Ok(rows) => (Some(fit), rows),
            Err(e) => {
                skip("gev_return_levels", e.to_string());
                (Some(fit), Vec::new())
            }
        },
        Err(e) => {
            skip("gev", e.to_string());
            (None, Vec::new())
        }
    };

    let (gpd, gpd_return_levels) = match fit_peaks_over_threshold(observations, variable, None, &config.extremes) {
        Ok(dist) => match return_levels(&ExtremeFit::from(dist.clone()), periods, level) {
            Ok(rows) => (Some(dist), rows),
            Err(e) => {
                skip("gpd_return_levels", e.to_string());
                (Some(dist), Vec::new())
            }
        },
        Err(e) => {
            skip("gpd", e.to_string());
            (None, Vec::new())
        }
    };

    let report = StationReport {
        station_id: station_id.to_string(),
        station_name: display_name(station_id),
        n_observations: observations.len(),
        rogue_waves,
        rogue_gusts,
        annual,
        gev,
        gev_return_levels,
        gpd,
        gpd_return_levels,
    };
    (report, skipped)
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// Analyzes every station in `observations` on `config.batch.workers`
/// threads and merges the results, ordered by station id.
pub fn run_batch(observations: Vec<Observation>, variable: Variable, config: &AnalysisConfig) -> BatchReport {
    let grouped = group_by_station(observations);
    let station_ids: Vec<String> = grouped.keys().cloned().collect();
    let total = station_ids.len();

    let pool = ThreadPool::new(config.batch.workers.clamp(1, total.max(1)));
    let config = Arc::new(config.clone());
    let (tx, rx) = mpsc::channel();

    for (station_id, series) in grouped {
        let tx = tx.clone();
        let config = Arc::clone(&config);
        pool.execute(move || {
            let result = analyze_station(&station_id, &series, variable, &config);
            // The receiver outlives every job
            let _ = tx.send((station_id, result));
        });
    }
    drop(tx);

    let mut results: BTreeMap<String, (StationReport, Vec<SkippedUnit>)> = rx.iter().collect();
    pool.join();

    let mut stations = Vec::with_capacity(total);
    let mut skipped = Vec::new();
    for station_id in station_ids {
        match results.remove(&station_id) {
            Some((report, units)) => {
                stations.push(report);
                skipped.extend(units);
            }
            None => {
                log::error!(target: unit_target(&station_id, "station").as_str(), "worker did not report a result");
                skipped.push(SkippedUnit {
                    station_id,
                    analysis: "station".to_string(),
                    reason: "worker panicked before reporting".to_string(),
                });
            }
        }
    }

    let report = BatchReport {
        generated_at: Utc::now(),
        variable,
        stations,
        skipped,
    };
    log_batch_summary(total, report.complete_stations(), report.skipped.len());
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn calm_week(station: &str) -> Vec<Observation> {
        let start = Utc.with_ymd_and_hms(2021, 3, 1, 0, 0, 0).unwrap();
        (0..168)
            .map(|h| {
                Observation::new(station, start + Duration::hours(h))
                    .with(Variable::WaveHeight, 1.0 + (h % 12) as f64 * 0.1)
                    .with(Variable::Hmax, 1.8)
                    .with(Variable::WindSpeed, 8.0)
                    .with(Variable::Gust, 10.0)
            })
            .collect()
    }

    #[test]
    fn test_short_record_is_partial_not_fatal() {
        let (report, skipped) = analyze_station("M2", &calm_week("M2"), Variable::WaveHeight, &AnalysisConfig::default());
        assert_eq!(report.n_observations, 168);
        assert!(matches!(report.gev, Some(ExtremeFit::InsufficientData { .. })));
        assert_eq!(report.gev_return_levels.len(), 6);
        assert!(report.gev_return_levels.iter().all(|r| r.point_estimate.is_none()));

        // Too few exceedances for the GPD is the only skipped unit
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].analysis, "gpd");
        assert!(report.gpd.is_none());
        assert!(report.rogue_waves.is_some());
    }

    #[test]
    fn test_batch_orders_stations_and_collects_skips() {
        let mut obs = calm_week("M6");
        obs.extend(calm_week("M1"));
        obs.extend(calm_week("M4"));
        let report = run_batch(obs, Variable::WaveHeight, &AnalysisConfig::default());

        let ids: Vec<&str> = report.stations.iter().map(|s| s.station_id.as_str()).collect();
        assert_eq!(ids, vec!["M1", "M4", "M6"]);
        assert_eq!(report.skipped.len(), 3);
        assert_eq!(report.complete_stations(), 0);
    }

    #[test]
    fn test_empty_batch() {
        let report = run_batch(Vec::new(), Variable::WaveHeight, &AnalysisConfig::default());
        assert!(report.stations.is_empty());
        assert!(report.skipped.is_empty());
        let json = report.to_json().unwrap();
        assert!(json.contains("\"variable\": \"wave_height\""));
    }
}
