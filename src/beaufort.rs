//! Unit conversions and the Beaufort wave-height estimate used by day predictions
//!
//! When a buoy reports wind but no wave height, the wave height is estimated
//! from the wind speed using the "probable wave height" column of the Beaufort
//! scale.

/// Knots per meter-per-second
pub const KNOTS_PER_MS: f64 = 1.9438444924405793;

/// Feet per meter
pub const FEET_PER_METER: f64 = 3.28084;

/// Estimate above 63 knots (hurricane force). Stays finite through unit conversions.
pub const HURRICANE_WAVE_HEIGHT_FT: f64 = 100.0;

/// Upper wind bound (knots, inclusive) → probable wave height (feet)
const BEAUFORT_TABLE: [(f64, f64); 11] = [
    (3.0, 0.25),
    (6.0, 1.0),
    (10.0, 3.0),
    (16.0, 5.0),
    (21.0, 8.0),
    (27.0, 13.0),
    (33.0, 19.0),
    (40.0, 25.0),
    (47.0, 32.0),
    (55.0, 41.0),
    (63.0, 52.0),
];

pub fn ms_to_knots(speed_ms: f64) -> f64 {
    speed_ms * KNOTS_PER_MS
}

pub fn meters_to_feet(meters: f64) -> f64 {
    meters * FEET_PER_METER
}

/// Estimate wave height in feet from wind speed in knots
///
/// # Examples
///
/// ```
/// use ship_weather_service::beaufort::estimate_wave_height_ft;
///
/// assert_eq!(estimate_wave_height_ft(0.0), 0.25);
/// assert_eq!(estimate_wave_height_ft(10.0), 3.0);
/// assert_eq!(estimate_wave_height_ft(10.5), 5.0);
/// ```
pub fn estimate_wave_height_ft(wind_speed_kts: f64) -> f64 {
    BEAUFORT_TABLE
        .iter()
        .find(|(max_kts, _)| wind_speed_kts <= *max_kts)
        .map(|(_, wave_ft)| *wave_ft)
        .unwrap_or(HURRICANE_WAVE_HEIGHT_FT)
}
