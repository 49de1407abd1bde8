/// buoymon_service: extreme-value and rogue-event analysis for the Irish
/// weather buoy network.
///
/// # Module structure
///
/// ```text
/// buoymon_service
/// ├── model       — shared data types (Observation, Variable, AnalysisError, …)
/// ├── config      — analysis settings loader (analysis.toml)
/// ├── logging     — `log` backend with console markers and optional log file
/// ├── stations    — buoy registry (M1–M6, FS1, AMETS berths, …)
/// ├── db          — PostgreSQL connection with actionable setup errors
/// ├── store
/// │   ├── (mod)   — ObservationQuery, ObservationSource, MemorySource
/// │   └── postgres — read-only source over buoy.observations
/// ├── stats       — descriptive statistics, OLS with p-values, normal quantiles
/// ├── optimize    — Nelder-Mead and numerical derivatives for likelihood fits
/// └── analysis
///     ├── groupings  — per-station grouping and hourly regularization
///     ├── rogue      — rogue wave / rogue gust detection
///     ├── gust       — gust-factor analysis and rate comparison
///     ├── decompose  — STL seasonal-trend decomposition
///     ├── trend      — aggregate statistics, annual trend, anomalies
///     ├── extremes   — GEV / GPD fits and return levels
///     ├── wave_model — wave-height regression
///     └── batch      — per-station batch report
/// ```

/// Public modules
pub mod analysis;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod optimize;
pub mod stations;
pub mod stats;
pub mod store;
