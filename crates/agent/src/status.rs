use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Status messages
// ---------------------------------------------------------------------------

pub const INSUFFICIENT_WATER: &str = "[Insufficient water in the container]";
pub const SUCCESS_MOISTURE: &str = "[Plant successfully watered with moisture plan]";
pub const SUCCESS_TIMER: &str = "[Plant successfully watered with timer plan]";
pub const BASIC_PLAN_SUCCESS: &str = "[Successful watering of plant]";
pub const INVALID_PLAN: &str = "[Invalid plan]";
pub const DELETED_PLAN: &str = "[Watering plan deleted]";
pub const PLAN_CONDITION_NOT_MET: &str = "[Plan condition not met]";
pub const HEALTH_CHECK: &str = "healthcheck";

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Outcome of one plan-execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StatusWire")]
pub struct Status {
    watering_status: bool,
    message: String,
}

#[derive(Deserialize)]
struct StatusWire {
    watering_status: bool,
    message: String,
}

impl TryFrom<StatusWire> for Status {
    type Error = String;

    fn try_from(w: StatusWire) -> Result<Self, Self::Error> {
        if w.message.trim().is_empty() {
            return Err("status message must not be empty".into());
        }
        Ok(Self {
            watering_status: w.watering_status,
            message: w.message,
        })
    }
}

impl Status {
    pub fn success(message: &'static str) -> Self {
        Self {
            watering_status: true,
            message: message.to_string(),
        }
    }

    pub fn failure(message: &'static str) -> Self {
        Self {
            watering_status: false,
            message: message.to_string(),
        }
    }

    /// Liveness sentinel sent at the start of every cycle.
    pub fn health_check() -> Self {
        Self::failure(HEALTH_CHECK)
    }

    pub fn watering_status(&self) -> bool {
        self.watering_status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.watering_status { "ok" } else { "failed" };
        write!(f, "{mark} {}", self.message)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
