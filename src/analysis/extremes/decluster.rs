/// Threshold exceedances and runs declustering.
///
/// Consecutive exceedances of the same storm are strongly correlated, which
/// breaks the independence assumption of the GPD likelihood. Declustering
/// keeps one peak per cluster: walking forward in time, an exceedance at
/// least `window` after the last kept peak starts a new cluster; anything
/// closer competes with that kept peak and the larger of the two stays.
/// Every retained pair is therefore at least `window` apart, which makes the
/// operation idempotent.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Exceedance {
    pub time: DateTime<Utc>,
    pub value: f64,
}

/// Points strictly above `threshold`, in time order.
pub fn exceedances(points: &[(DateTime<Utc>, f64)], threshold: f64) -> Vec<Exceedance> {
    let mut out: Vec<Exceedance> = points
        .iter()
        .filter(|(_, v)| *v > threshold)
        .map(|&(time, value)| Exceedance { time, value })
        .collect();
    out.sort_by_key(|e| e.time);
    out
}

/// One peak per cluster; `window_hours` is the minimum separation between
/// independent peaks.
pub fn decluster(exceedances: &[Exceedance], window_hours: f64) -> Vec<Exceedance> {
    let mut sorted = exceedances.to_vec();
    sorted.sort_by_key(|e| e.time);

    let window = Duration::seconds((window_hours * 3600.0).round() as i64);
    let mut kept: Vec<Exceedance> = Vec::with_capacity(sorted.len());

    for e in sorted {
        match kept.last_mut() {
            Some(last) if e.time - last.time < window => {
                if e.value > last.value {
                    *last = e;
                }
            }
            _ => kept.push(e),
        }
    }
    kept
}
