//! Distance estimation (log-distance path-loss model)
//!
//!   RSSI = calibration − 10 · n · log₁₀(d)
//!   ⟹  d = 10^((calibration − RSSI) / (10 · n))
//!
//! `calibration` is the expected signal strength at 1 m.

/// Closest distance ever reported (metres)
pub const MIN_DISTANCE: f64 = 0.1;

/// Estimate distance in metres, rounded to one decimal place
pub fn estimate_distance(smoothed_rssi: f64, calibration: i8, path_loss_exponent: f64) -> f64 {
    let exponent = (calibration as f64 - smoothed_rssi) / (10.0 * path_loss_exponent);
    let d = 10.0_f64.powf(exponent);
    ((d * 10.0).round() / 10.0).max(MIN_DISTANCE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_at_reference() {
        assert_eq!(estimate_distance(-59.0, -59, 2.0), 1.0);
    }

    #[test]
    fn test_weaker_signal_is_further() {
        // 20 dB below reference with n = 2 is 10 m
        assert_eq!(estimate_distance(-79.0, -59, 2.0), 10.0);
        assert!(estimate_distance(-70.0, -59, 2.0) > estimate_distance(-65.0, -59, 2.0));
    }

    #[test]
    fn test_clamped_at_minimum() {
        assert_eq!(estimate_distance(-10.0, -59, 2.0), MIN_DISTANCE);
    }
}
