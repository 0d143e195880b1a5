//! Missing-data sentinel normalization for NDBC stdmet values
//!
//! The archive writes "no data" as a run of nines whose width depends on the
//! column (`99.00` for wave height, `999` for wind direction, `9999.0` for
//! pressure, ...). Any of these codes means absent for every column.

/// Codes the archive uses for "no measurement"
pub const SENTINEL_CODES: [f64; 3] = [9999.0, 999.0, 99.0];

/// True when `value` is one of the archive's missing-data codes
pub fn is_sentinel(value: f64) -> bool {
    SENTINEL_CODES.contains(&value)
}

/// Map sentinel codes and non-finite numbers to `None`, pass everything else through.
///
/// ```
/// use ship_weather_service::stdmet::sentinel::normalize;
///
/// assert_eq!(normalize(Some(99.0)), None);
/// assert_eq!(normalize(Some(12.5)), Some(12.5));
/// assert_eq!(normalize(None), None);
/// ```
pub fn normalize(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && !is_sentinel(*v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_codes_become_none() {
        for code in SENTINEL_CODES {
            assert_eq!(normalize(Some(code)), None, "{code} should be absent");
        }
    }

    #[test]
    fn test_regular_values_pass_through() {
        for value in [0.0, -1.5, 3.28, 98.9, 99.5, 360.0, 1013.2, 10_000.0] {
            assert_eq!(normalize(Some(value)), Some(value));
        }
    }

    #[test]
    fn test_none_is_idempotent() {
        assert_eq!(normalize(None), None);
        assert_eq!(normalize(normalize(Some(999.0))), None);
    }

    #[test]
    fn test_non_finite_values_become_none() {
        assert_eq!(normalize(Some(f64::NAN)), None);
        assert_eq!(normalize(Some(f64::INFINITY)), None);
    }
}
