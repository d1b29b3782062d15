//! Core types and constants for the position tracking system

pub mod types;
pub mod constants;

pub use types::*;
pub use constants::*;
