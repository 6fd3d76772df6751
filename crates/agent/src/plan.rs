//! Watering plans as pushed by the backend.
//!
//! The wire format is a JSON object tagged by `plan_type`; it is parsed once
//! into [`Plan`] and the engine only ever sees the typed value. Unknown
//! `plan_type` strings parse to [`Plan::Unrecognized`] instead of failing so
//! the engine can answer them with an "invalid plan" status.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time_keeper::{TimeError, WallTime, Weekday};

const DEFAULT_PLAN_NAME: &str = "unnamed";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("plan name must not be empty")]
    EmptyName,
    #[error("moisture_threshold {0} out of range [0.0, 1.0]")]
    ThresholdOutOfRange(f64),
    #[error(transparent)]
    Time(#[from] TimeError),
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "plan_type", rename_all = "snake_case")]
pub enum Plan {
    /// Water once, right now.
    Basic(PlanCore),
    /// Water when the soil reads drier than a threshold, checked on a
    /// fixed interval.
    Moisture(MoisturePlan),
    /// Water at scheduled weekday/time slots.
    TimeBased(TimePlan),
    /// Control message: drop whatever plan is running.
    Delete,
    #[serde(other)]
    Unrecognized,
}

impl Plan {
    pub fn plan_type(&self) -> &'static str {
        match self {
            Self::Basic(_) => "basic",
            Self::Moisture(_) => "moisture",
            Self::TimeBased(_) => "time_based",
            Self::Delete => "delete",
            Self::Unrecognized => "unrecognized",
        }
    }

    pub fn core(&self) -> Option<&PlanCore> {
        match self {
            Self::Basic(core) => Some(core),
            Self::Moisture(p) => Some(&p.core),
            Self::TimeBased(p) => Some(&p.core),
            Self::Delete | Self::Unrecognized => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.core().map(PlanCore::name)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.core() {
            Some(core) => write!(
                f,
                "{} ({}): {}ml",
                core.name,
                self.plan_type(),
                core.water_volume
            ),
            None => f.write_str(self.plan_type()),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared fields
// ---------------------------------------------------------------------------

/// Fields every watering plan carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PlanCoreWire")]
pub struct PlanCore {
    name: String,
    water_volume: u32,
}

#[derive(Deserialize)]
struct PlanCoreWire {
    #[serde(default = "default_plan_name")]
    name: String,
    water_volume: u32,
}

fn default_plan_name() -> String {
    DEFAULT_PLAN_NAME.to_string()
}

impl TryFrom<PlanCoreWire> for PlanCore {
    type Error = PlanError;

    fn try_from(w: PlanCoreWire) -> Result<Self, Self::Error> {
        Self::new(w.name, w.water_volume)
    }
}

impl PlanCore {
    pub fn new(name: impl Into<String>, water_volume: u32) -> Result<Self, PlanError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PlanError::EmptyName);
        }
        Ok(Self { name, water_volume })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Millilitres to dispense per watering.
    pub fn water_volume(&self) -> u32 {
        self.water_volume
    }
}

// ---------------------------------------------------------------------------
// Moisture plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MoisturePlanWire")]
pub struct MoisturePlan {
    #[serde(flatten)]
    core: PlanCore,
    moisture_threshold: f64,
    check_interval: u32,
}

#[derive(Deserialize)]
struct MoisturePlanWire {
    #[serde(flatten)]
    core: PlanCore,
    moisture_threshold: f64,
    check_interval: u32,
}

impl TryFrom<MoisturePlanWire> for MoisturePlan {
    type Error = PlanError;

    fn try_from(w: MoisturePlanWire) -> Result<Self, Self::Error> {
        Self::new(w.core, w.moisture_threshold, w.check_interval)
    }
}

impl MoisturePlan {
    pub fn new(core: PlanCore, moisture_threshold: f64, check_interval: u32) -> Result<Self, PlanError> {
        if !(0.0..=1.0).contains(&moisture_threshold) {
            return Err(PlanError::ThresholdOutOfRange(moisture_threshold));
        }
        Ok(Self {
            core,
            moisture_threshold,
            check_interval,
        })
    }

    pub fn core(&self) -> &PlanCore {
        &self.core
    }

    pub fn moisture_threshold(&self) -> f64 {
        self.moisture_threshold
    }

    /// Minutes between moisture checks.
    pub fn check_interval(&self) -> u32 {
        self.check_interval
    }
}

// ---------------------------------------------------------------------------
// Time plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimePlan {
    #[serde(flatten)]
    core: PlanCore,
    weekday_times: Vec<WaterTime>,
    #[serde(default)]
    execute_only_once: bool,
}

impl TimePlan {
    pub fn new(core: PlanCore, weekday_times: Vec<WaterTime>, execute_only_once: bool) -> Self {
        Self {
            core,
            weekday_times,
            execute_only_once,
        }
    }

    pub fn core(&self) -> &PlanCore {
        &self.core
    }

    pub fn weekday_times(&self) -> &[WaterTime] {
        &self.weekday_times
    }

    pub fn execute_only_once(&self) -> bool {
        self.execute_only_once
    }
}

/// One scheduled watering slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaterTime {
    pub weekday: Weekday,
    pub time_water: WallTime,
}

impl WaterTime {
    pub fn new(weekday: Weekday, time_water: &str) -> Result<Self, PlanError> {
        Ok(Self {
            weekday,
            time_water: time_water.parse()?,
        })
    }
}

// ===========================================================================
// Tests
// ===========================================================================
