pub mod config;
pub mod pages;
pub mod state;
pub mod telemetry;
