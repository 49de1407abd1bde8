/// Observation source backed by the `buoy.observations` warehouse table.
///
/// Measurements are stored as NUMERIC and read through `rust_decimal`.

use chrono::{DateTime, Utc};
use postgres::{Client, Row};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::error::Error;

use super::{ObservationQuery, ObservationSource};
use crate::db::{self, DbConfigError};
use crate::model::Observation;

const SELECT_OBSERVATIONS: &str = "
    SELECT station_id, time,
           wave_height, hmax, wave_period, wind_direction, wind_speed, gust,
           atmospheric_pressure, air_temperature, sea_temperature, qc_flag
    FROM buoy.observations
    WHERE ($1::text[] IS NULL OR station_id = ANY($1))
      AND ($2::timestamptz IS NULL OR time >= $2)
      AND ($3::timestamptz IS NULL OR time <= $3)
      AND ($4::int[] IS NULL OR qc_flag = ANY($4))
    ORDER BY station_id, time";

pub struct PostgresSource {
    client: Client,
}

impl PostgresSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connects via DATABASE_URL and checks the observation table exists.
    pub fn connect() -> Result<Self, DbConfigError> {
        Ok(Self::new(db::connect_and_verify()?))
    }
}

fn numeric(row: &Row, idx: usize) -> Option<f64> {
    let value: Option<Decimal> = row.get(idx);
    value.and_then(|d| d.to_f64())
}

fn row_to_observation(row: &Row) -> Observation {
    let station_id: String = row.get(0);
    let time: DateTime<Utc> = row.get(1);
    Observation {
        station_id,
        time,
        wave_height: numeric(row, 2),
        hmax: numeric(row, 3),
        wave_period: numeric(row, 4),
        wind_direction: numeric(row, 5),
        wind_speed: numeric(row, 6),
        gust: numeric(row, 7),
        atmospheric_pressure: numeric(row, 8),
        air_temperature: numeric(row, 9),
        sea_temperature: numeric(row, 10),
        qc_flag: row.get(11),
    }
}

impl ObservationSource for PostgresSource {
    fn fetch(&mut self, query: &ObservationQuery) -> Result<Vec<Observation>, Box<dyn Error>> {
        let stations: Option<Vec<String>> = if query.station_ids.is_empty() {
            None
        } else {
            Some(query.station_ids.clone())
        };

        let rows = self.client.query(
            SELECT_OBSERVATIONS,
            &[&stations, &query.start, &query.end, &query.qc_flags],
        )?;

        log::debug!("Fetched {} observation rows", rows.len());

        Ok(rows
            .iter()
            .map(|row| query.project(row_to_observation(row)))
            .collect())
    }
}
