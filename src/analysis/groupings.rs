/// Station grouping and series organization utilities.
///
/// `group_by_station` takes the flat observation table returned by a source
/// and splits it into per-station series, making it convenient to run a
/// per-station analysis without filtering a flat list every time. The other
/// helpers pull a single variable out of a station series, either as the
/// valid (time, value) points or regularized onto an hourly grid.

use chrono::{DateTime, Duration, DurationRound, Utc};
use std::collections::BTreeMap;

use crate::model::{Observation, Variable};

const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 3600.0;

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// Groups observations by station id, each series sorted by time.
///
/// If the same (station, time) key appears more than once, the last one
/// encountered wins.
pub fn group_by_station(observations: Vec<Observation>) -> BTreeMap<String, Vec<Observation>> {
    let mut keyed: BTreeMap<String, BTreeMap<DateTime<Utc>, Observation>> = BTreeMap::new();

    for obs in observations {
        keyed
            .entry(obs.station_id.clone())
            .or_default()
            .insert(obs.time, obs);
    }

    keyed
        .into_iter()
        .map(|(station, rows)| (station, rows.into_values().collect()))
        .collect()
}

/// Valid (time, value) points of one variable, in input order.
pub fn valid_points(observations: &[Observation], variable: Variable) -> Vec<(DateTime<Utc>, f64)> {
    observations
        .iter()
        .filter_map(|o| o.value(variable).map(|v| (o.time, v)))
        .collect()
}

/// Valid values of one variable, in input order.
pub fn valid_values(observations: &[Observation], variable: Variable) -> Vec<f64> {
    observations.iter().filter_map(|o| o.value(variable)).collect()
}

/// Time spanned by a set of points, in years. Zero for fewer than two points.
pub fn years_spanned(points: &[(DateTime<Utc>, f64)]) -> f64 {
    let first = points.iter().map(|(t, _)| *t).min();
    let last = points.iter().map(|(t, _)| *t).max();
    match (first, last) {
        (Some(a), Some(b)) => (b - a).num_seconds() as f64 / SECONDS_PER_YEAR,
        _ => 0.0,
    }
}

// ---------------------------------------------------------------------------
// Hourly grid
// ---------------------------------------------------------------------------

/// Regularizes one variable onto a complete hourly grid.
///
/// Timestamps are floored to the hour; several valid values in the same hour
/// are averaged; hours with no valid value are `None`. The grid runs from the
/// first to the last hour holding a valid value. Empty input yields an empty
/// grid.
pub fn hourly_grid(observations: &[Observation], variable: Variable) -> Vec<(DateTime<Utc>, Option<f64>)> {
    let mut buckets: BTreeMap<DateTime<Utc>, (f64, usize)> = BTreeMap::new();
    for (time, value) in valid_points(observations, variable) {
        let hour = time.duration_trunc(Duration::hours(1)).unwrap_or(time);
        let slot = buckets.entry(hour).or_insert((0.0, 0));
        slot.0 += value;
        slot.1 += 1;
    }

    let (Some(&first), Some(&last)) = (buckets.keys().next(), buckets.keys().next_back()) else {
        return Vec::new();
    };

    let hours = (last - first).num_hours();
    (0..=hours)
        .map(|h| {
            let t = first + Duration::hours(h);
            let value = buckets.get(&t).map(|(sum, n)| sum / *n as f64);
            (t, value)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 1, day, hour, minute, 0).unwrap()
    }

    fn wave(station: &str, time: DateTime<Utc>, hs: f64) -> Observation {
        Observation::new(station, time).with(Variable::WaveHeight, hs)
    }

    #[test]
    fn test_group_by_station_sorts_each_series_by_time() {
        let grouped = group_by_station(vec![
            wave("M4", at(1, 2, 0), 3.0),
            wave("M2", at(1, 0, 0), 1.0),
            wave("M4", at(1, 0, 0), 2.0),
        ]);
        assert_eq!(grouped.len(), 2);
        let m4 = &grouped["M4"];
        assert_eq!(m4.len(), 2);
        assert!(m4[0].time < m4[1].time);
    }

    #[test]
    fn test_group_by_station_last_duplicate_wins() {
        let grouped = group_by_station(vec![
            wave("M4", at(1, 0, 0), 2.0),
            wave("M4", at(1, 0, 0), 5.0),
        ]);
        assert_eq!(grouped["M4"].len(), 1);
        assert_eq!(grouped["M4"][0].wave_height, Some(5.0));
    }

    #[test]
    fn test_group_by_station_empty_input_returns_empty_map() {
        assert!(group_by_station(vec![]).is_empty());
    }

    #[test]
    fn test_hourly_grid_fills_gaps_and_averages_duplicates() {
        let obs = vec![
            wave("M4", at(1, 0, 0), 2.0),
            wave("M4", at(1, 0, 30), 4.0),
            wave("M4", at(1, 3, 0), 1.0),
        ];
        let grid = hourly_grid(&obs, Variable::WaveHeight);
        assert_eq!(grid.len(), 4);
        assert_eq!(grid[0], (at(1, 0, 0), Some(3.0)));
        assert_eq!(grid[1].1, None);
        assert_eq!(grid[2].1, None);
        assert_eq!(grid[3], (at(1, 3, 0), Some(1.0)));
    }

    #[test]
    fn test_hourly_grid_ignores_missing_values() {
        let obs = vec![Observation::new("M4", at(1, 0, 0))];
        assert!(hourly_grid(&obs, Variable::WaveHeight).is_empty());
    }

    #[test]
    fn test_years_spanned() {
        let a = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2022, 1, 1, 12, 0, 0).unwrap();
        let span = years_spanned(&[(a, 1.0), (b, 2.0)]);
        assert!((span - 2.0).abs() < 0.01);
        assert_eq!(years_spanned(&[(a, 1.0)]), 0.0);
    }
}
