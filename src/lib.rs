pub mod app;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod health;
pub mod registry;
pub mod telemetry;
pub mod transport;
