//! Reconciliation loop. One cycle:
//!
//! 1. post the `healthcheck` status
//! 2. apply a queued water-capacity reset and report the new level
//! 3. capture and upload a requested photo (a failed capture only skips
//!    the upload)
//! 4. run the server's plan, else the pump's running plan, else just
//!    report moisture
//! 5. report the plan status plus water and moisture levels
//!
//! A failing cycle is logged and recorded; the loop always carries on after
//! the normal wait.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::communicator::ServerCommunicator;
use crate::hardware::Camera;
use crate::pump::Pump;
use crate::state::SharedState;
use crate::status::Status;

pub struct ServerChecker<C> {
    pump: Pump,
    communicator: C,
    camera: Arc<dyn Camera>,
    wait_time_between_cycle: Duration,
    shared: SharedState,
}

/// A failed fetch counts as "nothing queued" for this cycle.
fn or_none<T>(fetched: Result<Option<T>>, what: &str) -> Option<T> {
    fetched.unwrap_or_else(|e| {
        warn!("fetching {what} failed: {e:#}");
        None
    })
}

/// Reports are best-effort.
fn log_report(result: Result<()>, what: &str) {
    if let Err(e) = result {
        warn!("posting {what} failed: {e:#}");
    }
}

impl<C: ServerCommunicator> ServerChecker<C> {
    pub fn new(
        pump: Pump,
        communicator: C,
        camera: Arc<dyn Camera>,
        wait_time_between_cycle: Duration,
        shared: SharedState,
    ) -> Self {
        Self {
            pump,
            communicator,
            camera,
            wait_time_between_cycle,
            shared,
        }
    }

    pub fn pump(&self) -> &Pump {
        &self.pump
    }

    pub fn communicator(&self) -> &C {
        &self.communicator
    }

    /// Runs cycles until the future is dropped.
    pub async fn run(mut self) {
        info!(
            wait_secs = self.wait_time_between_cycle.as_secs(),
            "reconciliation loop started"
        );
        self.shared
            .write()
            .await
            .record_system("agent started".to_string());

        loop {
            if let Err(e) = self.run_cycle().await {
                error!("cycle failed: {e:#}");
                self.shared
                    .write()
                    .await
                    .record_error(format!("cycle failed: {e:#}"));
            }
            self.publish().await;
            tokio::time::sleep(self.wait_time_between_cycle).await;
        }
    }

    pub async fn run_cycle(&mut self) -> Result<()> {
        log_report(
            self.communicator
                .post_plan_execution(&Status::health_check())
                .await,
            "health check",
        );

        self.check_water_reset().await;
        self.check_picture().await;

        let fetched = or_none(self.communicator.get_plan().await, "plan");
        let plan = match fetched {
            Some(plan) => {
                info!(plan = %plan, "new plan from server");
                Some(plan)
            }
            None => self.pump.running_plan().cloned(),
        };

        match plan {
            Some(plan) => {
                let status = self.pump.execute_water_plan(&plan).await;
                self.shared.write().await.record_plan(&plan, &status);
                self.send_result(
                    self.pump.get_moisture_level_in_percent(),
                    &status,
                    self.pump.get_water_level_in_percent(),
                )
                .await;
            }
            None => {
                debug!("no plan to run, reporting moisture only");
                let moisture = self.pump.get_moisture_level_in_percent();
                log_report(self.communicator.post_moisture(moisture).await, "moisture");
            }
        }
        Ok(())
    }

    async fn check_water_reset(&mut self) {
        let Some(reset) = or_none(self.communicator.get_water_level().await, "water level") else {
            return;
        };
        self.pump.reset_water_level(reset.water);
        self.shared.write().await.record_water_reset(reset.water);
        log_report(
            self.communicator
                .post_water(self.pump.get_water_level_in_percent())
                .await,
            "water level",
        );
    }

    async fn check_picture(&mut self) {
        let Some(request) = or_none(self.communicator.get_picture().await, "picture request") else {
            return;
        };
        let photo_id = request.photo_id;
        info!(%photo_id, "photo requested");

        if let Err(e) = self.capture(&photo_id).await {
            error!("{e:#}");
            self.shared.write().await.record_error(format!("{e:#}"));
            return;
        }
        self.shared.write().await.record_photo(&photo_id);
        log_report(self.communicator.post_picture(&photo_id).await, "picture");
    }

    /// Runs the camera on the blocking pool; capture includes the warm-up.
    async fn capture(&self, photo_id: &str) -> Result<()> {
        let camera = Arc::clone(&self.camera);
        let name = photo_id.to_string();
        tokio::task::spawn_blocking(move || camera.take_photo(&name))
            .await
            .context("camera task panicked")
            .and_then(|captured| captured)
            .with_context(|| format!("capturing photo {photo_id}"))
    }

    async fn send_result(&self, moisture: i32, status: &Status, water: f64) {
        log_report(self.communicator.post_plan_execution(status).await, "status");
        log_report(self.communicator.post_water(water).await, "water level");
        log_report(self.communicator.post_moisture(moisture).await, "moisture");
    }

    async fn publish(&self) {
        let water = self.pump.get_water_level_in_percent();
        let moisture = self.pump.get_moisture_level_in_percent();
        let running = self.pump.running_plan().cloned();
        self.shared
            .write()
            .await
            .record_cycle(water, moisture, running);
    }
}

// ===========================================================================
// Tests
// ===========================================================================
