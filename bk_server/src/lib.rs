//! HTTP server and background sweeps for the bracketeer tournament engine.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod sweeps;
