use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::plan::Plan;
use crate::status::Status;

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

// ---------------------------------------------------------------------------
// Public type alias
// ---------------------------------------------------------------------------

pub type SharedState = Arc<RwLock<AgentState>>;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// Snapshot of the live agent, published by the reconciliation loop after
/// every cycle. Readers never touch the pump directly.
pub struct AgentState {
    pub started_at: Instant,
    pub water_percent: f64,
    pub moisture_percent: i32,
    pub running_plan: Option<Plan>,
    pub last_status: Option<Status>,
    pub cycles: u64,
    pub last_cycle: Option<OffsetDateTime>,
    pub events: VecDeque<AgentEvent>,
}

#[derive(Clone, Serialize)]
pub struct AgentEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Plan,
    Water,
    Photo,
    Error,
    System,
}

// ---------------------------------------------------------------------------
// JSON response (what the API returns)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub water_percent: f64,
    pub moisture_percent: i32,
    pub running_plan: Option<Plan>,
    pub last_status: Option<Status>,
    pub cycles: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_cycle: Option<OffsetDateTime>,
    pub events: Vec<AgentEvent>,
}

// ---------------------------------------------------------------------------
// Construction & mutation
// ---------------------------------------------------------------------------

impl AgentState {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            water_percent: 100.0,
            moisture_percent: 0,
            running_plan: None,
            last_status: None,
            cycles: 0,
            last_cycle: None,
            events: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    pub fn shared() -> SharedState {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Publish the readings taken at the end of a cycle.
    pub fn record_cycle(
        &mut self,
        water_percent: f64,
        moisture_percent: i32,
        running_plan: Option<Plan>,
    ) {
        self.water_percent = water_percent;
        self.moisture_percent = moisture_percent;
        self.running_plan = running_plan;
        self.cycles += 1;
        self.last_cycle = Some(OffsetDateTime::now_utc());
    }

    /// Record the outcome of a plan execution.
    pub fn record_plan(&mut self, plan: &Plan, status: &Status) {
        self.last_status = Some(status.clone());
        self.push_event(EventKind::Plan, format!("{plan}: {status}"));
    }

    /// Record a server-driven refill.
    pub fn record_water_reset(&mut self, capacity_ml: u32) {
        self.push_event(EventKind::Water, format!("water reset to {capacity_ml}ml"));
    }

    pub fn record_photo(&mut self, photo_id: &str) {
        self.push_event(EventKind::Photo, format!("photo {photo_id} captured"));
    }

    /// Record an error event.
    pub fn record_error(&mut self, detail: String) {
        self.push_event(EventKind::Error, detail);
    }

    /// Record a generic system event.
    pub fn record_system(&mut self, detail: String) {
        self.push_event(EventKind::System, detail);
    }

    /// Build the JSON-serialisable status snapshot.
    pub fn to_status(&self) -> StatusResponse {
        StatusResponse {
            uptime_secs: self.started_at.elapsed().as_secs(),
            water_percent: self.water_percent,
            moisture_percent: self.moisture_percent,
            running_plan: self.running_plan.clone(),
            last_status: self.last_status.clone(),
            cycles: self.cycles,
            last_cycle: self.last_cycle,
            events: self.events.iter().rev().cloned().collect(),
        }
    }

    fn push_event(&mut self, kind: EventKind, detail: String) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(AgentEvent {
            ts: OffsetDateTime::now_utc(),
            kind,
            detail,
        });
    }
}

impl Default for AgentState {
    fn default() -> Self {
        Self::new()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanCore;
    use crate::status;

    #[test]
    fn ring_buffer_keeps_newest_events() {
        let mut st = AgentState::new();
        for i in 0..(MAX_EVENTS + 25) {
            st.record_system(format!("event {i}"));
        }
        assert_eq!(st.events.len(), MAX_EVENTS);
        assert_eq!(st.events.front().unwrap().detail, "event 25");

        let status = st.to_status();
        assert_eq!(status.events[0].detail, format!("event {}", MAX_EVENTS + 24));
    }

    #[test]
    fn record_cycle_updates_snapshot() {
        let mut st = AgentState::new();
        let plan = Plan::Basic(PlanCore::new("p", 100).unwrap());
        st.record_cycle(42.5, 61, Some(plan.clone()));
        st.record_cycle(40.0, 60, Some(plan.clone()));

        assert_eq!(st.cycles, 2);
        assert_eq!(st.water_percent, 40.0);
        assert_eq!(st.moisture_percent, 60);
        assert_eq!(st.running_plan, Some(plan));
        assert!(st.last_cycle.is_some());
    }

    #[test]
    fn record_plan_keeps_last_status_and_logs_event() {
        let mut st = AgentState::new();
        let plan = Plan::Basic(PlanCore::new("lawn", 200).unwrap());
        let status = Status::success(status::BASIC_PLAN_SUCCESS);
        st.record_plan(&plan, &status);

        assert_eq!(st.last_status, Some(status));
        let ev = st.events.back().unwrap();
        assert_eq!(ev.kind, EventKind::Plan);
        assert!(ev.detail.contains("lawn"), "{}", ev.detail);
    }

    #[test]
    fn status_response_serialises() {
        let mut st = AgentState::new();
        st.record_water_reset(1500);
        st.record_photo("ph-1");
        st.record_error("boom".into());
        st.record_cycle(50.0, 30, None);

        let json = serde_json::to_value(st.to_status()).unwrap();
        assert_eq!(json["water_percent"], 50.0);
        assert_eq!(json["moisture_percent"], 30);
        assert_eq!(json["cycles"], 1);
        assert!(json["running_plan"].is_null());
        assert!(json["last_cycle"].is_string());
        let kinds: Vec<&str> = json["events"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["kind"].as_str().unwrap())
            .collect();
        assert_eq!(kinds, vec!["error", "photo", "water"]);
    }
}
