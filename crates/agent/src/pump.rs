//! Plan execution engine: owns the water budget, the pump relay and the
//! watering bookkeeping, and turns one [`Plan`] into one [`Status`] per cycle.
//!
//! ## Plan dispatch
//!
//! ```text
//! basic ───────▶ water_plant ──▶ BASIC_PLAN_SUCCESS | INSUFFICIENT_WATER
//! moisture ──▶ running ─▶ timing gate ─▶ dryness check ─▶ water_plant
//! time_based ▶ running ─▶ first matching weekday/time slot ─▶ water_plant
//! delete ──────▶ running cleared, DELETED_PLAN (watering_status = false)
//! unrecognized ▶ INVALID_PLAN, nothing touched
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Result};
use tracing::{error, info, warn};

use crate::hardware::{MoistureSensor, Relay};
use crate::plan::{MoisturePlan, Plan, TimePlan};
use crate::status::{self, Status};
use crate::time_keeper::{Clock, TimeKeeper, WallTime};

/// Construction-time constants for a [`Pump`].
#[derive(Debug, Clone)]
pub struct PumpSettings {
    /// Container capacity in ml.
    pub water_max_capacity: u32,
    /// Pump flow rate in ml/s.
    pub water_pumped_in_second: u32,
    /// Initial cached moisture value.
    pub moisture_max_level: f64,
    /// Extra dwell added once after every capacity reset.
    pub stabilization_secs: u64,
}

// ---------------------------------------------------------------------------
// Relay guard
// ---------------------------------------------------------------------------

/// Turns the relay off when dropped: on success, on error and when the
/// watering future is cancelled mid-dwell.
struct RelayGuard<'a> {
    relay: &'a mut dyn Relay,
}

impl<'a> RelayGuard<'a> {
    fn engage(relay: &'a mut dyn Relay) -> Result<Self> {
        let guard = Self { relay };
        guard.relay.on()?;
        Ok(guard)
    }
}

impl Drop for RelayGuard<'_> {
    fn drop(&mut self) {
        self.relay.off();
        info!("relay released");
    }
}

// ---------------------------------------------------------------------------
// Pump
// ---------------------------------------------------------------------------

pub struct Pump {
    water_max_capacity: u32,
    water_level: u32,
    water_pumped_in_second: u32,
    stabilization_secs: u64,
    moisture_level: f64,
    running_plan: Option<Plan>,
    watering_status: Option<Status>,
    water_time: TimeKeeper,
    water_reset: bool,
    relay: Box<dyn Relay>,
    moisture_sensor: Option<Box<dyn MoistureSensor>>,
}

impl Pump {
    pub fn new(
        settings: PumpSettings,
        relay: Box<dyn Relay>,
        moisture_sensor: Option<Box<dyn MoistureSensor>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        ensure!(
            settings.water_pumped_in_second > 0,
            "water_pumped_in_second must be positive"
        );

        let mut water_time = TimeKeeper::new(clock);
        water_time.time_last_watered = Some(water_time.get_current_time());
        water_time.date_last_watered = Some(water_time.get_current_date());

        info!(
            capacity_ml = settings.water_max_capacity,
            rate_ml_s = settings.water_pumped_in_second,
            moisture_sensor = moisture_sensor.is_some(),
            "pump initialised"
        );

        Ok(Self {
            water_max_capacity: settings.water_max_capacity,
            water_level: settings.water_max_capacity,
            water_pumped_in_second: settings.water_pumped_in_second,
            stabilization_secs: settings.stabilization_secs,
            moisture_level: settings.moisture_max_level,
            running_plan: None,
            watering_status: None,
            water_time,
            water_reset: true,
            relay,
            moisture_sensor,
        })
    }

    // -- Accessors --------------------------------------------------------

    pub fn running_plan(&self) -> Option<&Plan> {
        self.running_plan.as_ref()
    }

    pub fn watering_status(&self) -> Option<&Status> {
        self.watering_status.as_ref()
    }

    pub fn water_level(&self) -> u32 {
        self.water_level
    }

    pub fn water_max_capacity(&self) -> u32 {
        self.water_max_capacity
    }

    /// Last sensor value observed after a moisture-plan dispense.
    pub fn moisture_level(&self) -> f64 {
        self.moisture_level
    }

    pub fn water_time(&self) -> &TimeKeeper {
        &self.water_time
    }

    // -- Plan dispatch ----------------------------------------------------

    pub async fn execute_water_plan(&mut self, plan: &Plan) -> Status {
        info!(plan = %plan, "executing plan");

        let status = match plan {
            Plan::Basic(core) => {
                if self.water_plant(core.water_volume()).await {
                    Status::success(status::BASIC_PLAN_SUCCESS)
                } else {
                    Status::failure(status::INSUFFICIENT_WATER)
                }
            }
            Plan::Moisture(moisture_plan) => {
                self.running_plan = Some(plan.clone());
                self.water_plant_by_moisture(moisture_plan).await
            }
            Plan::TimeBased(time_plan) => {
                self.running_plan = Some(plan.clone());
                self.water_plant_by_timer(time_plan).await
            }
            Plan::Delete => {
                info!("running plan deleted");
                self.running_plan = None;
                Status::failure(status::DELETED_PLAN)
            }
            Plan::Unrecognized => {
                error!("unrecognized plan type");
                Status::failure(status::INVALID_PLAN)
            }
        };

        info!(status = %status, "plan executed");
        self.watering_status = Some(status.clone());
        status
    }

    // -- Moisture plans ---------------------------------------------------

    async fn water_plant_by_moisture(&mut self, plan: &MoisturePlan) -> Status {
        let interval = i64::from(plan.check_interval());
        if !self.check_moisture_timing(interval) {
            return Status::failure(status::PLAN_CONDITION_NOT_MET);
        }

        let Some(sensor_value) = self.read_moisture_sensor() else {
            warn!("moisture plan needs a moisture sensor, skipping");
            return Status::failure(status::PLAN_CONDITION_NOT_MET);
        };

        let moisture_percent = moisture_percent(sensor_value);
        let threshold = plan.moisture_threshold();
        info!(moisture_percent, sensor_value, threshold, "moisture check");

        if f64::from(moisture_percent) >= threshold {
            info!("moisture sufficient, no watering needed");
            return Status::failure(status::PLAN_CONDITION_NOT_MET);
        }

        if !self.water_plant(plan.core().water_volume()).await {
            return Status::failure(status::INSUFFICIENT_WATER);
        }

        self.water_time.time_last_watered = Some(self.water_time.get_current_time());
        self.moisture_level = sensor_value;
        Status::success(status::SUCCESS_MOISTURE)
    }

    /// Passes only when the last watering sits exactly one `interval` before
    /// now. A record older than two intervals is re-synchronised to that
    /// boundary first.
    fn check_moisture_timing(&mut self, interval: i64) -> bool {
        let target = self.water_time.get_current_time_minus_delta(interval);
        let last = *self.water_time.time_last_watered.get_or_insert(target);

        let out_of_range = self.water_time.get_current_time_minus_delta(interval * 2);
        let last = if last < out_of_range {
            info!(%last, %out_of_range, %target, "last watering out of range, resynchronising");
            self.water_time.time_last_watered = Some(target);
            target
        } else {
            last
        };

        if last != target {
            info!(%target, %last, "moisture timing constraint not met");
            return false;
        }
        true
    }

    // -- Time plans -------------------------------------------------------

    async fn water_plant_by_timer(&mut self, plan: &TimePlan) -> Status {
        let weekday = self.water_time.get_current_weekday();
        let now = self.water_time.get_current_time();
        let today = self.water_time.get_current_date();
        info!(%weekday, %now, "checking scheduled watering");

        let slot = plan.weekday_times().iter().find(|slot| {
            slot.weekday == weekday
                && slot.time_water == now
                && !self.already_watered_at(slot.time_water, today)
        });

        let Some(slot) = slot else {
            info!("no scheduled slot matches");
            return Status::failure(status::PLAN_CONDITION_NOT_MET);
        };
        let slot_time = slot.time_water;
        info!(weekday = %slot.weekday, time = %slot_time, "scheduled slot matched");

        if !self.water_plant(plan.core().water_volume()).await {
            return Status::failure(status::INSUFFICIENT_WATER);
        }

        self.water_time.time_last_watered = Some(slot_time);
        self.water_time.date_last_watered = Some(today);
        if plan.execute_only_once() {
            info!("single-shot plan done, clearing");
            self.running_plan = None;
        }
        Status::success(status::SUCCESS_TIMER)
    }

    fn already_watered_at(&self, at: WallTime, today: time::Date) -> bool {
        self.water_time.time_last_watered == Some(at) && self.water_time.date_last_watered == Some(today)
    }

    // -- Dispensing -------------------------------------------------------

    /// Reserves `ml` from the budget and runs the pump for the matching
    /// duration. Returns `false` if the budget is short or the relay fails.
    pub async fn water_plant(&mut self, ml: u32) -> bool {
        if !self.is_water_level_sufficient(ml) {
            warn!(ml, water_level = self.water_level, "insufficient water");
            return false;
        }

        let secs = self.get_water_time_in_seconds_from_percent(ml);
        info!(ml, secs, "watering started");

        let guard = match RelayGuard::engage(self.relay.as_mut()) {
            Ok(guard) => guard,
            Err(e) => {
                error!("relay failed to switch on: {e:#}");
                return false;
            }
        };
        tokio::time::sleep(Duration::from_secs(secs)).await;
        drop(guard);

        info!(ml, remaining_ml = self.water_level, "watering completed");
        true
    }

    /// Consumes `ml` from the budget if enough is left; otherwise leaves the
    /// level untouched.
    pub fn is_water_level_sufficient(&mut self, ml: u32) -> bool {
        match self.water_level.checked_sub(ml) {
            Some(remaining) => {
                self.water_level = remaining;
                true
            }
            None => false,
        }
    }

    /// Pump-on seconds for `ml`, plus the stabilisation bonus on the first
    /// call after a reset.
    pub fn get_water_time_in_seconds_from_percent(&mut self, ml: u32) -> u64 {
        let base = (f64::from(ml) / f64::from(self.water_pumped_in_second)).round_ties_even() as u64;
        if self.water_reset {
            self.water_reset = false;
            info!(bonus_secs = self.stabilization_secs, "adding stabilisation time after reset");
            return base + self.stabilization_secs;
        }
        base
    }

    // -- Readings ---------------------------------------------------------

    fn read_moisture_sensor(&self) -> Option<f64> {
        let sensor = self.moisture_sensor.as_ref()?;
        match sensor.value() {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("moisture sensor read failed: {e:#}");
                None
            }
        }
    }

    /// `round(100 - value * 100)`; 0 when no reading is available.
    pub fn get_moisture_level_in_percent(&self) -> i32 {
        match self.read_moisture_sensor() {
            Some(value) => moisture_percent(value),
            None => 0,
        }
    }

    pub fn get_water_level_in_percent(&self) -> f64 {
        if self.water_max_capacity == 0 {
            return 0.0;
        }
        100.0 * f64::from(self.water_level) / f64::from(self.water_max_capacity)
    }

    /// The container was refilled to `capacity` ml.
    pub fn reset_water_level(&mut self, capacity: u32) {
        info!(from_ml = self.water_level, to_ml = capacity, "water level reset");
        self.water_max_capacity = capacity;
        self.water_level = capacity;
        self.water_reset = true;
    }
}

fn moisture_percent(value: f64) -> i32 {
    (100.0 - value * 100.0).round_ties_even() as i32
}

// ===========================================================================
// Tests
// ===========================================================================
