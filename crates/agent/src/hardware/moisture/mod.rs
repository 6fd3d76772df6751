//! Soil moisture sensing. Raw ADC readings are mapped onto the `[0, 1]`
//! dryness scale the watering engine expects, using per-sensor dry/wet
//! calibration endpoints.

#[cfg(feature = "adc")]
pub mod adc;
#[cfg(feature = "sim")]
pub mod sim;

use anyhow::Result;

use super::MoistureSensor;
use crate::config::MoistureConfig;

/// Convert a raw ADC reading to a `[0.0, 1.0]` dryness value (0.0 = reads
/// as `raw_wet`, 1.0 = reads as `raw_dry`). Out-of-range readings clamp.
pub fn dryness(raw: i32, raw_dry: i32, raw_wet: i32) -> f64 {
    let range = raw_dry - raw_wet;
    if range == 0 {
        return 1.0; // degenerate calibration
    }
    let d = (raw - raw_wet) as f64 / range as f64;
    d.clamp(0.0, 1.0)
}

/// Build the moisture sensor for the enabled feature set. `adc` wins over
/// `sim` when both are enabled.
#[cfg(feature = "adc")]
pub fn build(cfg: &MoistureConfig) -> Result<Option<Box<dyn MoistureSensor>>> {
    let sensor = adc::AdcMoistureSensor::new(cfg.i2c_addr, cfg.channel, cfg.raw_dry, cfg.raw_wet)?;
    Ok(Some(Box::new(sensor)))
}

#[cfg(all(not(feature = "adc"), feature = "sim"))]
pub fn build(cfg: &MoistureConfig) -> Result<Option<Box<dyn MoistureSensor>>> {
    let scenario = sim::Scenario::from_str_lossy(&cfg.sim_scenario);
    tracing::info!(%scenario, "using simulated moisture sensor");
    Ok(Some(Box::new(sim::SimMoistureSensor::new(
        scenario,
        cfg.raw_dry,
        cfg.raw_wet,
    ))))
}

#[cfg(all(not(feature = "adc"), not(feature = "sim")))]
pub fn build(_cfg: &MoistureConfig) -> Result<Option<Box<dyn MoistureSensor>>> {
    tracing::warn!("no moisture sensor compiled in (enable `adc` or `sim`)");
    Ok(None)
}

// ===========================================================================
// Tests
// ===========================================================================
