//! Shared primitive types used across the engine.

/// Broker identity key. Unique across the broker set.
pub type AgentId = i64;

/// A calendar year of the performance extracts.
pub type Year = i32;

/// Years carried as per-year columns. Nothing outside this window is stored.
pub const SUPPORTED_YEARS: [Year; 4] = [2022, 2023, 2024, 2025];

/// Earliest year the dataset covers. Retention cohorts that joined
/// before this year are pinned to it.
pub const EARLIEST_DATA_YEAR: Year = SUPPORTED_YEARS[0];

/// Bucket name for brokers whose grouping attribute is missing.
pub const UNKNOWN_GROUP: &str = "unknown";

/// Synthetic per-row column appended to cross tabulations.
pub const TOTAL_COLUMN: &str = "Total";

pub fn is_supported_year(year: Year) -> bool {
    SUPPORTED_YEARS.contains(&year)
}

/// Round half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
