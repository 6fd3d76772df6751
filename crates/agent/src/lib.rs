//! Plant-watering device agent: polls a backend for watering plans, runs
//! them against a pump relay and a soil moisture sensor, and reports back.

pub mod communicator;
pub mod config;
pub mod hardware;
pub mod plan;
pub mod pump;
pub mod server_checker;
pub mod state;
pub mod status;
pub mod time_keeper;
pub mod web;
