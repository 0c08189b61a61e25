//! Approximate solar and wind output curves.
//!
//! These are reproducible estimates, not certified physical models.

/// Irradiance at standard test conditions (W/m²).
pub const REFERENCE_IRRADIANCE_WM2: f64 = 1000.0;
/// Cell temperature at standard test conditions (°C).
pub const REFERENCE_TEMPERATURE_C: f64 = 25.0;
/// Relative output change per °C away from the reference temperature.
pub const TEMPERATURE_COEFFICIENT: f64 = -0.004;
/// Wiring, inverter and soiling losses.
pub const PERFORMANCE_RATIO: f64 = 0.8;

pub const CUT_IN_SPEED_MS: f64 = 3.0;
pub const RATED_SPEED_MS: f64 = 12.0;

/// Estimated PV output in kW.
///
/// `P = rated * (G / 1000) * (1 - 0.004 * (T - 25)) * 0.8`, never negative.
/// Negative irradiance is treated as darkness.
pub fn estimate_solar_kw(irradiance_wm2: f64, rated_kw: f64, temperature_c: f64) -> f64 {
    let normalized = irradiance_wm2.max(0.0) / REFERENCE_IRRADIANCE_WM2;
    let temp_factor = 1.0 + TEMPERATURE_COEFFICIENT * (temperature_c - REFERENCE_TEMPERATURE_C);
    (rated_kw * normalized * temp_factor * PERFORMANCE_RATIO).max(0.0)
}

/// Estimated turbine output in kW from a cubic power curve.
///
/// Zero up to cut-in, cubic ramp to rated speed, flat at `rated_kw` beyond.
pub fn estimate_wind_kw(wind_speed_ms: f64, rated_kw: f64) -> f64 {
    if wind_speed_ms.is_nan() || wind_speed_ms <= CUT_IN_SPEED_MS {
        return 0.0;
    }
    if wind_speed_ms >= RATED_SPEED_MS {
        return rated_kw;
    }
    let ratio = (wind_speed_ms - CUT_IN_SPEED_MS) / (RATED_SPEED_MS - CUT_IN_SPEED_MS);
    rated_kw * ratio.powi(3)
}
