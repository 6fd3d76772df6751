//! Device collaborators the watering engine drives: the pump relay, the soil
//! moisture sensor and the camera.
//!
//! Real drivers are gated behind cargo features (`gpio`, `adc`); without them
//! the agent runs against a logging relay and a simulated sensor.

pub mod camera;
pub mod moisture;
pub mod relay;

/// Switches the pump on and off.
pub trait Relay: Send {
    fn on(&mut self) -> anyhow::Result<()>;

    /// Must be safe to call repeatedly and must not fail.
    fn off(&mut self);
}

/// Soil reading in `[0.0, 1.0]`: 0.0 is fully wet, 1.0 is fully dry.
pub trait MoistureSensor: Send + Sync {
    fn value(&self) -> anyhow::Result<f64>;
}

/// Capture blocks until the photo is on disk.
pub trait Camera: Send + Sync {
    fn take_photo(&self, name: &str) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------
