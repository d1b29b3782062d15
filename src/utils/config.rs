//! Tracker configuration: loaded once at startup, immutable afterwards

use crate::core::constants::{
    DEFAULT_ANCHORS, DEFAULT_BAUD_RATE, DEFAULT_INITIAL_GUESS, DEFAULT_MAX_FRAME_LEN,
    DEFAULT_MAX_INVALID_ANCHORS, DEFAULT_POLL_PERIOD_MS, DEFAULT_SMOOTHING_ALPHA,
    MIN_ANCHORS_FOR_FIX,
};
use crate::core::{AnchorSet, Axis};
use crate::events::threshold::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Serial port parameters (8N1 framing is implied)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialSettings {
    /// Port identifier, e.g. `COM26` or `/dev/ttyUSB0`
    pub port: String,
    pub baud_rate: u32,
    /// Per-operation timeout (milliseconds). Command links cap it at
    /// `MAX_COMMAND_WRITE_TIMEOUT_MS` since opcode writes run inside a tick.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    10
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: "COM26".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Levenberg-Marquardt termination parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    pub max_iterations: usize,
    /// Relative cost reduction below which the fit is converged
    pub ftol: f64,
    /// Relative step size below which the fit is converged
    pub xtol: f64,
    /// Gradient magnitude below which the fit is converged
    pub gtol: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-10,
        }
    }
}

/// One boundary condition of the playing field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSettings {
    /// Unique key, e.g. `player1`
    pub name: String,
    /// Label prefix shown to the operator
    pub display_name: String,
    pub axis: Axis,
    pub direction: Direction,
    pub value: f64,
    /// Opcode sent to the peripheral when the boundary is crossed
    pub opcode: u8,
}

/// Complete tracker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Inbound ranging stream
    pub serial: SerialSettings,
    /// Optional radio bridge for outbound opcodes
    #[serde(default)]
    pub command_link: Option<SerialSettings>,
    pub poll_period_ms: u64,
    /// Anchor positions, index-aligned with the distance lists
    pub anchors: Vec<[f64; 3]>,
    pub expected_anchor_count: usize,
    pub initial_guess: [f64; 3],
    /// Weight of the previous filtered position, in [0, 1]
    pub smoothing_alpha: f64,
    pub max_invalid_anchors: usize,
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
    #[serde(default)]
    pub solver: SolverSettings,
    pub thresholds: Vec<ThresholdSettings>,
}

fn default_max_frame_len() -> usize {
    DEFAULT_MAX_FRAME_LEN
}

/// Configuration errors; all of them are raised before polling starts
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {message}")]
    Io { path: String, message: String },
    #[error("failed to parse configuration: {message}")]
    Serialization { message: String },
    #[error("invalid {parameter} = {value}: {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },
    #[error("expected {expected} anchors, configuration lists {actual}")]
    AnchorCountMismatch { expected: usize, actual: usize },
    #[error("at least one threshold must be configured")]
    NoThresholds,
}

impl ConfigError {
    fn invalid(parameter: &str, value: impl ToString, reason: &str) -> Self {
        ConfigError::InvalidParameter {
            parameter: parameter.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            serial: SerialSettings::default(),
            command_link: None,
            poll_period_ms: DEFAULT_POLL_PERIOD_MS,
            anchors: DEFAULT_ANCHORS.to_vec(),
            expected_anchor_count: DEFAULT_ANCHORS.len(),
            initial_guess: DEFAULT_INITIAL_GUESS,
            smoothing_alpha: DEFAULT_SMOOTHING_ALPHA,
            max_invalid_anchors: DEFAULT_MAX_INVALID_ANCHORS,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            solver: SolverSettings::default(),
            thresholds: default_thresholds(),
        }
    }
}

/// Canonical scoring lines of the reference field
pub fn default_thresholds() -> Vec<ThresholdSettings> {
    vec![
        ThresholdSettings {
            name: "player1".to_string(),
            display_name: "Player 1 Score".to_string(),
            axis: Axis::Y,
            direction: Direction::AtLeast,
            value: 530.0,
            opcode: 0xFF,
        },
        ThresholdSettings {
            name: "player2".to_string(),
            display_name: "Player 2 Score".to_string(),
            axis: Axis::Y,
            direction: Direction::AtMost,
            value: 30.0,
            opcode: 0x4B,
        },
        ThresholdSettings {
            name: "wall".to_string(),
            display_name: "Virtual Wall".to_string(),
            axis: Axis::X,
            direction: Direction::AtLeast,
            value: 285.0,
            opcode: 0x4A,
        },
    ]
}

impl TrackerConfig {
    /// Load and validate a JSON configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::Io {
            path: path_str,
            message: e.to_string(),
        })?;
        Self::from_json_str(&content)
    }

    /// Parse and validate a JSON configuration document
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: TrackerConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::Serialization {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialization {
            message: e.to_string(),
        })
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_period_ms)
    }

    pub fn anchor_set(&self) -> AnchorSet {
        AnchorSet::from_rows(&self.anchors)
    }

    /// Reject configurations that would only fail later, during polling
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.anchors.len() != self.expected_anchor_count {
            return Err(ConfigError::AnchorCountMismatch {
                expected: self.expected_anchor_count,
                actual: self.anchors.len(),
            });
        }
        if self.anchors.len() < MIN_ANCHORS_FOR_FIX {
            return Err(ConfigError::invalid(
                "anchors",
                self.anchors.len(),
                "at least three anchors are needed for a 3D fix",
            ));
        }
        if self
            .anchors
            .iter()
            .chain(std::iter::once(&self.initial_guess))
            .flatten()
            .any(|c| !c.is_finite())
        {
            return Err(ConfigError::invalid(
                "anchors",
                "non-finite",
                "anchor coordinates and the initial guess must be finite",
            ));
        }
        if !(0.0..=1.0).contains(&self.smoothing_alpha) {
            return Err(ConfigError::invalid(
                "smoothing_alpha",
                self.smoothing_alpha,
                "must lie in [0, 1]",
            ));
        }
        if self.poll_period_ms == 0 {
            return Err(ConfigError::invalid("poll_period_ms", 0, "must be positive"));
        }
        if self.max_invalid_anchors > self.anchors.len() {
            return Err(ConfigError::invalid(
                "max_invalid_anchors",
                self.max_invalid_anchors,
                "cannot exceed the anchor count",
            ));
        }
        if self.max_frame_len == 0 {
            return Err(ConfigError::invalid("max_frame_len", 0, "must be positive"));
        }
        if self.solver.max_iterations == 0 {
            return Err(ConfigError::invalid(
                "solver.max_iterations",
                0,
                "must be positive",
            ));
        }
        for (name, tol) in [
            ("solver.ftol", self.solver.ftol),
            ("solver.xtol", self.solver.xtol),
            ("solver.gtol", self.solver.gtol),
        ] {
            if !tol.is_finite() || tol < 0.0 {
                return Err(ConfigError::invalid(name, tol, "must be finite and non-negative"));
            }
        }

        if self.thresholds.is_empty() {
            return Err(ConfigError::NoThresholds);
        }
        let mut names = HashSet::new();
        for threshold in &self.thresholds {
            if !names.insert(threshold.name.as_str()) {
                return Err(ConfigError::invalid(
                    "thresholds.name",
                    &threshold.name,
                    "threshold names must be unique",
                ));
            }
            if !threshold.value.is_finite() {
                return Err(ConfigError::invalid(
                    "thresholds.value",
                    threshold.value,
                    "must be finite",
                ));
            }
        }

        Ok(())
    }
}
