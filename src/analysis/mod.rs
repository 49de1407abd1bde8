/// Analysis core for the buoy extreme-value service.
///
/// Every function here is a pure transformation over an in-memory
/// observation snapshot; fetching the data is the caller's job.
///
/// Submodules:
/// - `groupings`  — per-station grouping, valid-value extraction, hourly grid.
/// - `rogue`      — rogue wave / rogue gust detection and station statistics.
/// - `gust`       — wave-vs-gust rate comparison and gust-factor summaries.
/// - `decompose`  — STL seasonal-trend decomposition.
/// - `trend`      — monthly/seasonal/annual aggregates, trend and anomalies.
/// - `extremes`   — GEV/GPD fitting, declustering and return levels.
/// - `wave_model` — wave-height feature engineering and random forest.
/// - `batch`      — per-station report on a worker pool.

pub mod batch;
pub mod decompose;
pub mod extremes;
pub mod groupings;
pub mod gust;
pub mod rogue;
pub mod trend;
pub mod wave_model;
