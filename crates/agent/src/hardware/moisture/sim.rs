//! Simulated soil moisture sensor for running the agent without hardware.
//!
//! The soil is modelled as a dryness level in calibration-span units
//! (0.0 at `raw_wet`, 1.0 at `raw_dry`) that creeps toward dry, wanders a
//! little and is pulled back toward the middle of the span. Each reading
//! adds converter noise and, now and then, a glitch, then is projected
//! back onto raw ADS1115 counts so it goes through the same calibration
//! path as a real sensor.

use std::fmt;
use std::sync::Mutex;

use anyhow::{anyhow, Result};

use super::dryness;
use crate::hardware::MoistureSensor;

const ADC_MAX: f64 = 32767.0;

/// N(0, sigma) via the Irwin-Hall sum of twelve uniforms.
fn normal(sigma: f64) -> f64 {
    let sum: f64 = (0..12).map(|_| fastrand::f64()).sum();
    (sum - 6.0) * sigma
}

/// Soil behaviour selectable via `moisture.sim_scenario`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Starts in the middle and dries out steadily.
    Drying,
    /// Barely moves. Useful when nothing should get watered.
    Stable,
    /// Noisy sensor with frequent glitches.
    Flaky,
    /// Starts well on the wet side.
    Wet,
}

impl Scenario {
    pub fn from_str_lossy(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "stable" => Self::Stable,
            "flaky" => Self::Flaky,
            "wet" => Self::Wet,
            _ => Self::Drying,
        }
    }

    fn profile(self) -> Profile {
        match self {
            Self::Drying => Profile {
                start: 0.5,
                drift: 0.001,
                wander: 0.01,
                pull: 0.02,
                noise: 0.006,
                glitch_rate: 0.03,
                glitch_size: 0.14,
            },
            Self::Stable => Profile {
                start: 0.5,
                drift: 0.000_15,
                wander: 0.004,
                pull: 0.05,
                noise: 0.003,
                glitch_rate: 0.005,
                glitch_size: 0.07,
            },
            Self::Flaky => Profile {
                start: 0.5,
                drift: 0.0007,
                wander: 0.018,
                pull: 0.02,
                noise: 0.014,
                glitch_rate: 0.1,
                glitch_size: 0.21,
            },
            Self::Wet => Profile {
                start: 0.2,
                drift: 0.0002,
                wander: 0.006,
                pull: 0.02,
                noise: 0.004,
                glitch_rate: 0.02,
                glitch_size: 0.1,
            },
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Drying => "drying",
            Self::Stable => "stable",
            Self::Flaky => "flaky",
            Self::Wet => "wet",
        };
        f.write_str(name)
    }
}

/// Per-sample dynamics, all in calibration-span units.
#[derive(Debug, Clone, Copy)]
struct Profile {
    start: f64,
    drift: f64,
    wander: f64,
    pull: f64,
    noise: f64,
    glitch_rate: f64,
    glitch_size: f64,
}

pub struct SimMoistureSensor {
    /// Underlying soil dryness; may overshoot the span slightly.
    soil: Mutex<f64>,
    profile: Profile,
    raw_dry: i32,
    raw_wet: i32,
}

impl SimMoistureSensor {
    pub fn new(scenario: Scenario, raw_dry: i32, raw_wet: i32) -> Self {
        let profile = scenario.profile();
        Self {
            soil: Mutex::new(profile.start + normal(0.03)),
            profile,
            raw_dry,
            raw_wet,
        }
    }

    /// Advance the soil by one step and return the sensor's raw ADC count.
    pub fn sample_raw(&self) -> Result<i32> {
        let p = &self.profile;
        let mut soil = self.soil.lock().map_err(|_| anyhow!("sim soil state poisoned"))?;

        let step = p.drift + p.pull * (0.5 - *soil) + normal(p.wander);
        *soil = (*soil + step).clamp(-0.04, 1.04);

        let mut reading = *soil + normal(p.noise);
        if fastrand::f64() < p.glitch_rate {
            reading += normal(p.glitch_size);
        }

        Ok(self.to_raw(reading))
    }

    fn to_raw(&self, level: f64) -> i32 {
        let span = f64::from(self.raw_dry - self.raw_wet);
        let raw = f64::from(self.raw_wet) + level * span;
        raw.round().clamp(0.0, ADC_MAX) as i32
    }
}

impl MoistureSensor for SimMoistureSensor {
    fn value(&self) -> Result<f64> {
        let raw = self.sample_raw()?;
        Ok(dryness(raw, self.raw_dry, self.raw_wet))
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn mean_value(sim: &SimMoistureSensor, n: usize) -> f64 {
        (0..n).map(|_| sim.value().unwrap()).sum::<f64>() / n as f64
    }

    #[test]
    fn raw_counts_stay_on_the_adc_scale() {
        let sim = SimMoistureSensor::new(Scenario::Flaky, 26000, 12000);
        for _ in 0..500 {
            let raw = sim.sample_raw().unwrap();
            assert!((0..=32767).contains(&raw), "raw count out of range: {raw}");
        }
    }

    #[test]
    fn value_is_a_dryness_fraction() {
        let sim = SimMoistureSensor::new(Scenario::Drying, 26000, 12000);
        for _ in 0..200 {
            let v = sim.value().unwrap();
            assert!((0.0..=1.0).contains(&v), "dryness out of range: {v}");
        }
    }

    #[test]
    fn stable_soil_moves_smoothly() {
        let sim = SimMoistureSensor::new(Scenario::Stable, 26000, 12000);
        let raws: Vec<i32> = (0..100).map(|_| sim.sample_raw().unwrap()).collect();
        let worst = raws.windows(2).map(|w| (w[1] - w[0]).abs()).max().unwrap();
        // Rare glitches can still land here.
        assert!(worst < 5000, "jump between samples too large: {worst}");
    }

    #[test]
    fn wet_scenario_reads_on_the_wet_side() {
        let sim = SimMoistureSensor::new(Scenario::Wet, 26000, 12000);
        let avg = mean_value(&sim, 10);
        assert!(avg < 0.5, "expected wet side, got {avg:.3}");
    }

    #[test]
    fn inverted_calibration_still_maps_to_dryness() {
        // Resistive sensors read higher when wet.
        let sim = SimMoistureSensor::new(Scenario::Wet, 9000, 21000);
        let avg = mean_value(&sim, 10);
        assert!(avg < 0.5, "expected wet side, got {avg:.3}");
    }

    #[test]
    fn scenario_names() {
        assert_eq!(Scenario::from_str_lossy(" STABLE "), Scenario::Stable);
        assert_eq!(Scenario::from_str_lossy("Flaky"), Scenario::Flaky);
        assert_eq!(Scenario::from_str_lossy("wet"), Scenario::Wet);
        assert_eq!(Scenario::from_str_lossy("sahara"), Scenario::Drying);
        assert_eq!(Scenario::Drying.to_string(), "drying");
        assert_eq!(Scenario::Wet.to_string(), "wet");
    }
}
