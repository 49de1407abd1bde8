//! Read-only access to the observation table.
//!
//! The analysis core never talks to storage directly; it receives
//! `Vec<Observation>` snapshots fetched through an `ObservationSource`.
//! Two sources exist:
//! - `MemorySource` — an in-memory table (tests, pre-loaded data)
//! - `postgres::PostgresSource` — the `buoy.observations` warehouse table

pub mod postgres;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::error::Error;

use crate::model::{Observation, Variable, QC_GOOD};

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// Filter/select description understood by every source.
///
/// Results are always ordered by (station_id, time).
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationQuery {
    /// Stations to include; empty means all stations.
    pub station_ids: Vec<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Accepted QC flags; `None` accepts every flag.
    pub qc_flags: Option<Vec<i32>>,
    /// Measurement columns to return; `None` returns all of them.
    /// Unselected columns come back null.
    pub columns: Option<Vec<Variable>>,
}

impl Default for ObservationQuery {
    fn default() -> Self {
        Self {
            station_ids: Vec::new(),
            start: None,
            end: None,
            qc_flags: Some(vec![QC_GOOD]),
            columns: None,
        }
    }
}

impl ObservationQuery {
    /// Good-QC rows for every station.
    pub fn good_quality() -> Self {
        Self::default()
    }

    pub fn station(mut self, station_id: impl Into<String>) -> Self {
        self.station_ids.push(station_id.into());
        self
    }

    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn any_quality(mut self) -> Self {
        self.qc_flags = None;
        self
    }

    pub fn select(mut self, columns: &[Variable]) -> Self {
        self.columns = Some(columns.to_vec());
        self
    }

    /// Row-level predicate (station, time range, QC flag).
    pub fn matches(&self, obs: &Observation) -> bool {
        if !self.station_ids.is_empty() && !self.station_ids.iter().any(|s| s == &obs.station_id) {
            return false;
        }
        if self.start.is_some_and(|start| obs.time < start) {
            return false;
        }
        if self.end.is_some_and(|end| obs.time > end) {
            return false;
        }
        if let Some(flags) = &self.qc_flags {
            if !flags.contains(&obs.qc_flag) {
                return false;
            }
        }
        true
    }

    /// Nulls every column not in the selection.
    pub fn project(&self, mut obs: Observation) -> Observation {
        if let Some(columns) = &self.columns {
            for variable in Variable::ALL {
                if !columns.contains(&variable) {
                    obs.set(variable, None);
                }
            }
        }
        obs
    }
}

// ---------------------------------------------------------------------------
// Source trait
// ---------------------------------------------------------------------------

/// Tabular query capability provided by the storage layer.
pub trait ObservationSource {
    fn fetch(&mut self, query: &ObservationQuery) -> Result<Vec<Observation>, Box<dyn Error>>;
}

// ---------------------------------------------------------------------------
// In-memory table
// ---------------------------------------------------------------------------

/// In-memory observation table keyed by (station_id, time).
///
/// Inserting a row whose key already exists replaces the earlier row.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    rows: BTreeMap<(String, DateTime<Utc>), Observation>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_observations(observations: impl IntoIterator<Item = Observation>) -> Self {
        let mut source = Self::new();
        source.extend(observations);
        source
    }

    pub fn insert(&mut self, obs: Observation) {
        self.rows.insert((obs.station_id.clone(), obs.time), obs);
    }

    pub fn extend(&mut self, observations: impl IntoIterator<Item = Observation>) {
        for obs in observations {
            self.insert(obs);
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl ObservationSource for MemorySource {
    fn fetch(&mut self, query: &ObservationQuery) -> Result<Vec<Observation>, Box<dyn Error>> {
        Ok(self
            .rows
            .values()
            .filter(|obs| query.matches(obs))
            .map(|obs| query.project(obs.clone()))
            .collect())
    }
}
