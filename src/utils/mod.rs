//! Configuration utilities

pub mod config;

pub use config::{ConfigError, SerialSettings, SolverSettings, ThresholdSettings, TrackerConfig};
