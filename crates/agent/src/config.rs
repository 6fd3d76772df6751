//! TOML config file loading and validation.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::pump::PumpSettings;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub device: DeviceConfig,
    pub server: ServerConfig,
    pub pump: PumpConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    pub relay: RelayConfig,
    #[serde(default)]
    pub moisture: MoistureConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub web: WebConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub guid: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PumpConfig {
    pub water_max_capacity: u32,
    pub water_pumped_in_second: u32,
    #[serde(default = "default_moisture_max_level")]
    pub moisture_max_level: f64,
    #[serde(default = "default_stabilization")]
    pub stabilization_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_wait_time")]
    pub wait_time_between_cycle: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    pub gpio_pin: u8,
    #[serde(default)]
    pub active_low: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MoistureConfig {
    #[serde(default = "default_i2c_addr")]
    pub i2c_addr: u16,
    #[serde(default)]
    pub channel: u8,
    #[serde(default = "default_raw_dry")]
    pub raw_dry: i32,
    #[serde(default = "default_raw_wet")]
    pub raw_wet: i32,
    #[serde(default = "default_sim_scenario")]
    pub sim_scenario: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "default_photos_dir")]
    pub photos_dir: PathBuf,
    pub command: Option<String>,
    #[serde(default = "default_warmup")]
    pub warmup_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_request_timeout() -> u64 {
    10
}
fn default_moisture_max_level() -> f64 {
    100.0
}
fn default_stabilization() -> u64 {
    3
}
fn default_wait_time() -> u64 {
    60
}
fn default_i2c_addr() -> u16 {
    0x48
}
fn default_raw_dry() -> i32 {
    26000
}
fn default_raw_wet() -> i32 {
    12000
}
fn default_sim_scenario() -> String {
    "drying".to_string()
}
fn default_photos_dir() -> PathBuf {
    PathBuf::from("photos")
}
fn default_warmup() -> u64 {
    2
}
fn default_true() -> bool {
    true
}
fn default_port() -> u16 {
    8080
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            wait_time_between_cycle: default_wait_time(),
        }
    }
}

impl Default for MoistureConfig {
    fn default() -> Self {
        Self {
            i2c_addr: default_i2c_addr(),
            channel: 0,
            raw_dry: default_raw_dry(),
            raw_wet: default_raw_wet(),
            sim_scenario: default_sim_scenario(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            photos_dir: default_photos_dir(),
            command: None,
            warmup_secs: default_warmup(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// BCM GPIO pins on the 40-pin header. GPIO 0-1 belong to the ID EEPROM.
const VALID_GPIO_PINS: std::ops::RangeInclusive<u8> = 2..=27;

/// Maximum single-ended reading from the ADS1115 (15-bit unsigned).
const ADS1115_MAX: i32 = 32767;

const ADS1115_MAX_CHANNEL: u8 = 3;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate every section. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_identity(&mut errors);
        self.validate_pump(&mut errors);
        self.validate_hardware(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_identity(&self, errors: &mut Vec<String>) {
        if self.device.guid.trim().is_empty() {
            errors.push("device.guid is empty".to_string());
        }

        let url = self.server.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(format!(
                "server.base_url '{url}' must start with http:// or https://"
            ));
        }
        if self.server.request_timeout_secs == 0 {
            errors.push("server.request_timeout_secs must be positive".to_string());
        }
    }

    fn validate_pump(&self, errors: &mut Vec<String>) {
        if self.pump.water_max_capacity == 0 {
            errors.push("pump.water_max_capacity must be positive".to_string());
        }
        if self.pump.water_pumped_in_second == 0 {
            errors.push("pump.water_pumped_in_second must be positive".to_string());
        }
        if !(0.0..=100.0).contains(&self.pump.moisture_max_level) {
            errors.push(format!(
                "pump.moisture_max_level {} out of range [0, 100]",
                self.pump.moisture_max_level
            ));
        }
        if self.timing.wait_time_between_cycle == 0 {
            errors.push("timing.wait_time_between_cycle must be positive".to_string());
        }
    }

    fn validate_hardware(&self, errors: &mut Vec<String>) {
        // ── Relay ───────────────────────────────────────────
        if !VALID_GPIO_PINS.contains(&self.relay.gpio_pin) {
            errors.push(format!(
                "relay.gpio_pin {} is not a valid BCM GPIO pin (allowed: 2-27)",
                self.relay.gpio_pin
            ));
        }

        // ── Moisture ADC ────────────────────────────────────
        let m = &self.moisture;
        if m.channel > ADS1115_MAX_CHANNEL {
            errors.push(format!(
                "moisture.channel {} out of range [0, {ADS1115_MAX_CHANNEL}]",
                m.channel
            ));
        }
        if !(0..=ADS1115_MAX).contains(&m.raw_dry) {
            errors.push(format!(
                "moisture.raw_dry {} out of ADS1115 range [0, {ADS1115_MAX}]",
                m.raw_dry
            ));
        }
        if !(0..=ADS1115_MAX).contains(&m.raw_wet) {
            errors.push(format!(
                "moisture.raw_wet {} out of ADS1115 range [0, {ADS1115_MAX}]",
                m.raw_wet
            ));
        }
        if m.raw_dry == m.raw_wet {
            errors.push(format!(
                "moisture.raw_dry and raw_wet are both {}, calibration range is zero",
                m.raw_dry
            ));
        }

        // ── Camera ──────────────────────────────────────────
        if let Some(cmd) = &self.camera.command {
            if cmd.trim().is_empty() {
                errors.push("camera.command is empty (omit it to disable capture)".to_string());
            }
        }

        // ── Web ─────────────────────────────────────────────
        if self.web.enabled && self.web.port == 0 {
            errors.push("web.port must be non-zero when web.enabled".to_string());
        }
    }

    pub fn pump_settings(&self) -> PumpSettings {
        PumpSettings {
            water_max_capacity: self.pump.water_max_capacity,
            water_pumped_in_second: self.pump.water_pumped_in_second,
            moisture_max_level: self.pump.moisture_max_level,
            stabilization_secs: self.pump.stabilization_secs,
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.
pub fn load(path: &str) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[device]
guid = "8c5f2a0e-1234"

[server]
base_url = "http://127.0.0.1:8000"

[pump]
water_max_capacity = 3000
water_pumped_in_second = 10

[relay]
gpio_pin = 17
"#;

    // -- Helper: a valid baseline config that passes validation -----------

    fn valid_config() -> Config {
        toml::from_str(MINIMAL).unwrap()
    }

    /// Assert validation fails and the error message contains `needle`.
    fn assert_validation_err(cfg: &Config, needle: &str) {
        let err = cfg.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(
            msg.contains(needle),
            "expected error containing {needle:?}, got: {msg}"
        );
    }

    // -- Parsing ----------------------------------------------------------

    #[test]
    fn parse_minimal_config_fills_defaults() {
        let cfg = valid_config();
        assert_eq!(cfg.device.guid, "8c5f2a0e-1234");
        assert_eq!(cfg.server.request_timeout_secs, 10);
        assert_eq!(cfg.pump.moisture_max_level, 100.0);
        assert_eq!(cfg.pump.stabilization_secs, 3);
        assert_eq!(cfg.timing.wait_time_between_cycle, 60);
        assert!(!cfg.relay.active_low);
        assert_eq!(cfg.moisture.i2c_addr, 0x48);
        assert_eq!(cfg.moisture.sim_scenario, "drying");
        assert!(cfg.camera.command.is_none());
        assert_eq!(cfg.camera.warmup_secs, 2);
        assert!(cfg.web.enabled);
        assert_eq!(cfg.web.port, 8080);
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[device]
guid = "abc"

[server]
base_url = "https://plants.example.org"
request_timeout_secs = 5

[pump]
water_max_capacity = 1500
water_pumped_in_second = 20
moisture_max_level = 80
stabilization_secs = 0

[timing]
wait_time_between_cycle = 30

[relay]
gpio_pin = 27
active_low = true

[moisture]
i2c_addr = 0x49
channel = 2
raw_dry = 25000
raw_wet = 11000
sim_scenario = "flaky"

[camera]
photos_dir = "/var/lib/plant-agent/photos"
command = "libcamera-still"
warmup_secs = 1

[web]
enabled = false
port = 9090
"#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.moisture.i2c_addr, 0x49);
        assert_eq!(cfg.camera.command.as_deref(), Some("libcamera-still"));
        assert!(!cfg.web.enabled);

        let settings = cfg.pump_settings();
        assert_eq!(settings.water_max_capacity, 1500);
        assert_eq!(settings.water_pumped_in_second, 20);
        assert_eq!(settings.stabilization_secs, 0);
    }

    #[test]
    fn missing_required_section_fails_to_parse() {
        let toml_str = MINIMAL.replace("[relay]\ngpio_pin = 17\n", "");
        assert!(toml::from_str::<Config>(&toml_str).is_err());
    }

    // -- Validation: valid configs pass -----------------------------------

    #[test]
    fn valid_config_passes() {
        valid_config().validate().unwrap();
    }

    // -- Identity ---------------------------------------------------------

    #[test]
    fn empty_guid_rejected() {
        let mut cfg = valid_config();
        cfg.device.guid = "  ".into();
        assert_validation_err(&cfg, "device.guid is empty");
    }

    #[test]
    fn base_url_without_scheme_rejected() {
        let mut cfg = valid_config();
        cfg.server.base_url = "127.0.0.1:8000".into();
        assert_validation_err(&cfg, "must start with http:// or https://");
    }

    #[test]
    fn zero_request_timeout_rejected() {
        let mut cfg = valid_config();
        cfg.server.request_timeout_secs = 0;
        assert_validation_err(&cfg, "request_timeout_secs must be positive");
    }

    // -- Pump -------------------------------------------------------------

    #[test]
    fn zero_capacity_rejected() {
        let mut cfg = valid_config();
        cfg.pump.water_max_capacity = 0;
        assert_validation_err(&cfg, "water_max_capacity must be positive");
    }

    #[test]
    fn zero_flow_rate_rejected() {
        let mut cfg = valid_config();
        cfg.pump.water_pumped_in_second = 0;
        assert_validation_err(&cfg, "water_pumped_in_second must be positive");
    }

    #[test]
    fn moisture_max_level_out_of_range() {
        let mut cfg = valid_config();
        cfg.pump.moisture_max_level = 120.0;
        assert_validation_err(&cfg, "moisture_max_level 120 out of range");
    }

    #[test]
    fn zero_cycle_wait_rejected() {
        let mut cfg = valid_config();
        cfg.timing.wait_time_between_cycle = 0;
        assert_validation_err(&cfg, "wait_time_between_cycle must be positive");
    }

    // -- Hardware ---------------------------------------------------------

    #[test]
    fn gpio_pin_1_rejected() {
        let mut cfg = valid_config();
        cfg.relay.gpio_pin = 1;
        assert_validation_err(&cfg, "not a valid BCM GPIO pin");
    }

    #[test]
    fn gpio_pin_28_rejected() {
        let mut cfg = valid_config();
        cfg.relay.gpio_pin = 28;
        assert_validation_err(&cfg, "not a valid BCM GPIO pin");
    }

    #[test]
    fn gpio_boundaries_accepted() {
        let mut cfg = valid_config();
        cfg.relay.gpio_pin = 2;
        cfg.validate().unwrap();
        cfg.relay.gpio_pin = 27;
        cfg.validate().unwrap();
    }

    #[test]
    fn adc_channel_out_of_range() {
        let mut cfg = valid_config();
        cfg.moisture.channel = 4;
        assert_validation_err(&cfg, "moisture.channel 4 out of range");
    }

    #[test]
    fn raw_dry_too_high() {
        let mut cfg = valid_config();
        cfg.moisture.raw_dry = 40000;
        assert_validation_err(&cfg, "raw_dry 40000 out of ADS1115 range");
    }

    #[test]
    fn raw_wet_negative() {
        let mut cfg = valid_config();
        cfg.moisture.raw_wet = -100;
        assert_validation_err(&cfg, "raw_wet -100 out of ADS1115 range");
    }

    #[test]
    fn raw_dry_equals_wet() {
        let mut cfg = valid_config();
        cfg.moisture.raw_dry = 15000;
        cfg.moisture.raw_wet = 15000;
        assert_validation_err(&cfg, "calibration range is zero");
    }

    #[test]
    fn blank_camera_command_rejected() {
        let mut cfg = valid_config();
        cfg.camera.command = Some(" ".into());
        assert_validation_err(&cfg, "camera.command is empty");
    }

    #[test]
    fn zero_web_port_rejected_only_when_enabled() {
        let mut cfg = valid_config();
        cfg.web.port = 0;
        assert_validation_err(&cfg, "web.port must be non-zero");
        cfg.web.enabled = false;
        cfg.validate().unwrap();
    }

    // -- Multiple errors reported at once ---------------------------------

    #[test]
    fn multiple_errors_collected() {
        let mut cfg = valid_config();
        cfg.device.guid = "".into();
        cfg.pump.water_pumped_in_second = 0;
        cfg.relay.gpio_pin = 0;
        let msg = format!("{:#}", cfg.validate().unwrap_err());
        assert!(msg.contains("3 errors"), "wrong count in: {msg}");
        assert!(msg.contains("device.guid is empty"), "missing guid error in: {msg}");
        assert!(msg.contains("water_pumped_in_second"), "missing pump error in: {msg}");
        assert!(msg.contains("not a valid BCM GPIO pin"), "missing gpio error in: {msg}");
    }

    // -- Load -------------------------------------------------------------

    #[test]
    fn load_reports_missing_file() {
        let err = load("/nonexistent/plant-agent.toml").unwrap_err();
        assert!(format!("{err:#}").contains("failed to read config"));
    }

    #[test]
    fn load_reads_and_validates_file() {
        let path = std::env::temp_dir().join("plant-agent-config-test.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let cfg = load(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.relay.gpio_pin, 17);
        let _ = std::fs::remove_file(&path);
    }
}
