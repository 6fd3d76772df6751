//! Pump relay on a GPIO pin. The `gpio` feature selects the rppal driver;
//! without it the relay only logs what it would have done.

use anyhow::Result;

use super::Relay;

#[cfg(feature = "gpio")]
use anyhow::Context;
#[cfg(feature = "gpio")]
use rppal::gpio::{Gpio, Level, OutputPin};

/// Pin level that energises the coil. Active-low boards pull the input to
/// ground to switch on.
#[cfg(feature = "gpio")]
fn level_for(on: bool, active_low: bool) -> Level {
    if on == active_low {
        Level::Low
    } else {
        Level::High
    }
}

// ---------------------------------------------------------------------------
// rppal-backed relay (Raspberry Pi only)
// ---------------------------------------------------------------------------
#[cfg(feature = "gpio")]
pub struct PumpRelay {
    pin: OutputPin,
    active_low: bool,
    engaged: bool,
}

#[cfg(feature = "gpio")]
impl PumpRelay {
    pub fn new(gpio_pin: u8, active_low: bool) -> Result<Self> {
        let pin = Gpio::new()
            .context("failed to open gpio")?
            .get(gpio_pin)
            .with_context(|| format!("gpio pin {gpio_pin} unavailable"))?
            .into_output();

        let mut relay = Self {
            pin,
            active_low,
            engaged: true,
        };
        // The pump must never start out running.
        relay.drive(false);
        tracing::info!(gpio_pin, active_low, "pump relay ready");
        Ok(relay)
    }

    fn drive(&mut self, on: bool) {
        self.pin.write(level_for(on, self.active_low));
        if self.engaged != on {
            tracing::info!(on, "pump relay switched");
        }
        self.engaged = on;
    }
}

#[cfg(feature = "gpio")]
impl Relay for PumpRelay {
    fn on(&mut self) -> Result<()> {
        self.drive(true);
        Ok(())
    }

    fn off(&mut self) {
        self.drive(false);
    }
}

// ---------------------------------------------------------------------------
// Logging relay (no hardware)
// ---------------------------------------------------------------------------
#[cfg(not(feature = "gpio"))]
pub struct PumpRelay {
    gpio_pin: u8,
    engaged: bool,
}

#[cfg(not(feature = "gpio"))]
impl PumpRelay {
    pub fn new(gpio_pin: u8, _active_low: bool) -> Result<Self> {
        tracing::info!(gpio_pin, "[mock-gpio] pump relay not wired, logging only");
        Ok(Self {
            gpio_pin,
            engaged: false,
        })
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    fn drive(&mut self, on: bool) {
        if self.engaged != on {
            tracing::info!(gpio_pin = self.gpio_pin, on, "[mock-gpio] pump relay switched");
        }
        self.engaged = on;
    }
}

#[cfg(not(feature = "gpio"))]
impl Relay for PumpRelay {
    fn on(&mut self) -> Result<()> {
        self.drive(true);
        Ok(())
    }

    fn off(&mut self) {
        self.drive(false);
    }
}

// ===========================================================================
// Tests
// ===========================================================================
