//! Core data types for the position tracking system

use crate::core::constants::{INVALID_DISTANCE, MIN_ANCHORS_FOR_FIX};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate axis of a position estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Component of `position` along this axis
    pub fn component(self, position: &Vector3<f64>) -> f64 {
        match self {
            Axis::X => position.x,
            Axis::Y => position.y,
            Axis::Z => position.z,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => write!(f, "x"),
            Axis::Y => write!(f, "y"),
            Axis::Z => write!(f, "z"),
        }
    }
}

/// Fixed, ordered set of anchor positions.
///
/// Index `i` of every [`DistanceVector`] refers to anchor `i` of this set.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorSet {
    positions: Vec<Vector3<f64>>,
}

impl AnchorSet {
    pub fn new(positions: Vec<Vector3<f64>>) -> Self {
        Self { positions }
    }

    pub fn from_rows(rows: &[[f64; 3]]) -> Self {
        Self::new(rows.iter().map(|r| Vector3::new(r[0], r[1], r[2])).collect())
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[Vector3<f64>] {
        &self.positions
    }

    /// Pair every valid reading with its anchor.
    ///
    /// Returns `None` when the vector does not match this set in length.
    pub fn valid_subset(&self, distances: &DistanceVector) -> Option<ValidSubset> {
        if distances.len() != self.len() {
            return None;
        }

        let mut anchors = Vec::with_capacity(self.len());
        let mut ranges = Vec::with_capacity(self.len());
        for (anchor, reading) in self.positions.iter().zip(distances.readings()) {
            if let Reading::Range(range) = reading {
                anchors.push(*anchor);
                ranges.push(*range);
            }
        }

        Some(ValidSubset { anchors, ranges })
    }
}

/// A single anchor-to-target range reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// Non-negative measured range
    Range(f64),
    /// Anchor reported the sentinel value
    Unavailable,
}

impl Reading {
    pub fn is_valid(&self) -> bool {
        matches!(self, Reading::Range(_))
    }

    /// Wire value, with the sentinel for unavailable readings
    pub fn wire_value(&self) -> f64 {
        match self {
            Reading::Range(range) => *range,
            Reading::Unavailable => INVALID_DISTANCE,
        }
    }
}

/// One frame's worth of per-anchor readings, replaced wholesale each cycle
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceVector {
    readings: Vec<Reading>,
}

impl DistanceVector {
    pub fn new(readings: Vec<Reading>) -> Self {
        Self { readings }
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn invalid_count(&self) -> usize {
        self.readings.iter().filter(|r| !r.is_valid()).count()
    }

    pub fn valid_count(&self) -> usize {
        self.len() - self.invalid_count()
    }

    /// Encode as the list literal the ranging firmware emits, without terminator
    pub fn to_frame_text(&self) -> String {
        let values: Vec<String> = self
            .readings
            .iter()
            .map(|r| format_wire_value(r.wire_value()))
            .collect();
        format!("[{}]", values.join(", "))
    }
}

fn format_wire_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Valid anchors and their ranges, compacted in anchor order
#[derive(Debug, Clone, PartialEq)]
pub struct ValidSubset {
    pub anchors: Vec<Vector3<f64>>,
    pub ranges: Vec<f64>,
}

impl ValidSubset {
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Whether enough pairs remain to solve for three unknowns
    pub fn is_solvable(&self) -> bool {
        self.len() >= MIN_ANCHORS_FOR_FIX
    }
}
