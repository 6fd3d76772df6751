//! Capacitive soil sensor wired to one input of an ADS1115 over I2C.
//!
//! Conversions are single-shot at ±4.096 V full scale and 128 SPS. At that
//! gain a sensor powered from 3.3 V reads roughly 26000 in dry air and 12000
//! in water.

use std::sync::Mutex;
use std::{thread, time::Duration};

use anyhow::{anyhow, ensure, Context, Result};
use rppal::i2c::I2c;

use super::dryness;
use crate::hardware::MoistureSensor;

// ── Registers ───────────────────────────────────────────────────────────────

const REG_CONVERSION: u8 = 0x00;
const REG_CONFIG: u8 = 0x01;

// ── Config word fields ──────────────────────────────────────────────────────

/// Write: start a single-shot conversion. Read: conversion finished.
const OS: u16 = 1 << 15;
/// Single-ended mux selections start at AIN0/GND = 0b100.
const MUX_AIN0_GND: u16 = 0b100;
const MUX_SHIFT: u16 = 12;
const PGA_4_096V: u16 = 0b001 << 9;
const MODE_SINGLE_SHOT: u16 = 1 << 8;
const DR_128_SPS: u16 = 0b100 << 5;
const COMP_DISABLED: u16 = 0b11;

const MAX_CHANNEL: u8 = 3;

/// One conversion at 128 SPS takes about 7.8 ms.
const CONVERSION_TIME: Duration = Duration::from_millis(9);
const READY_POLLS: usize = 3;
const READY_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Config word that starts a conversion of `channel` against ground.
fn start_conversion(channel: u8) -> u16 {
    let mux = (MUX_AIN0_GND + u16::from(channel)) << MUX_SHIFT;
    OS | mux | PGA_4_096V | MODE_SINGLE_SHOT | DR_128_SPS | COMP_DISABLED
}

// ── Driver ──────────────────────────────────────────────────────────────────

pub struct AdcMoistureSensor {
    bus: Mutex<I2c>,
    channel: u8,
    raw_dry: i32,
    raw_wet: i32,
}

impl AdcMoistureSensor {
    /// Open I2C bus 1 and address the converter at `addr`.
    pub fn new(addr: u16, channel: u8, raw_dry: i32, raw_wet: i32) -> Result<Self> {
        ensure!(
            channel <= MAX_CHANNEL,
            "ads1115 channel {channel} out of range (0..={MAX_CHANNEL})"
        );

        let mut bus = I2c::new().context("failed to open i2c bus")?;
        bus.set_slave_address(addr)
            .with_context(|| format!("no ads1115 at 0x{addr:02x}"))?;

        tracing::info!(
            addr = format_args!("0x{addr:02x}"),
            channel,
            raw_dry,
            raw_wet,
            "soil sensor ready"
        );

        Ok(Self {
            bus: Mutex::new(bus),
            channel,
            raw_dry,
            raw_wet,
        })
    }

    /// Run one conversion and return its count (0..=32767 single-ended).
    fn convert(&self) -> Result<i32> {
        let bus = self.bus.lock().map_err(|_| anyhow!("i2c bus lock poisoned"))?;

        write_register(&bus, REG_CONFIG, start_conversion(self.channel))?;
        thread::sleep(CONVERSION_TIME);

        for _ in 0..READY_POLLS {
            if read_register(&bus, REG_CONFIG)? & OS != 0 {
                break;
            }
            thread::sleep(READY_POLL_INTERVAL);
        }

        let count = read_register(&bus, REG_CONVERSION)? as i16;
        // Negative counts only appear on a corrupted transfer.
        Ok(i32::from(count).max(0))
    }
}

fn write_register(bus: &I2c, reg: u8, value: u16) -> Result<()> {
    bus.block_write(reg, &value.to_be_bytes())
        .with_context(|| format!("i2c write to register {reg:#04x} failed"))
}

fn read_register(bus: &I2c, reg: u8) -> Result<u16> {
    let mut buf = [0u8; 2];
    bus.block_read(reg, &mut buf)
        .with_context(|| format!("i2c read of register {reg:#04x} failed"))?;
    Ok(u16::from_be_bytes(buf))
}

impl MoistureSensor for AdcMoistureSensor {
    fn value(&self) -> Result<f64> {
        let raw = self.convert()?;
        let value = dryness(raw, self.raw_dry, self.raw_wet);
        tracing::debug!(raw, value, "soil sensor sample");
        Ok(value)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
