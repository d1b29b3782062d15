//! Edge-triggered threshold detection
//!
//! Each configured boundary runs a two-state latch:
//! `Armed -> (predicate true) -> Fired -> (predicate false) -> Armed`.
//! Only the `Armed -> Fired` transition produces an event, so a target that
//! sits past a line for many polls scores once and sends one opcode.

use crate::utils::config::ThresholdSettings;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Comparison applied between a coordinate and the trigger value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Coordinate >= value
    AtLeast,
    /// Coordinate <= value
    AtMost,
}

impl Direction {
    pub fn holds(self, coordinate: f64, value: f64) -> bool {
        match self {
            Direction::AtLeast => coordinate >= value,
            Direction::AtMost => coordinate <= value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchState {
    Armed,
    Fired,
}

/// One boundary crossing
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdEvent {
    pub name: String,
    /// Operator-facing label, e.g. `Player 1 Score: 3`
    pub label: String,
    /// Crossings of this boundary so far, including this one
    pub count: u32,
    pub opcode: u8,
    /// Filtered position that triggered the crossing
    pub position: Vector3<f64>,
}

#[derive(Debug, Clone)]
struct Boundary {
    settings: ThresholdSettings,
    state: LatchState,
    count: u32,
}

/// Evaluates every boundary against each new filtered position
#[derive(Debug, Clone)]
pub struct ThresholdDetector {
    boundaries: Vec<Boundary>,
}

impl ThresholdDetector {
    pub fn new(thresholds: &[ThresholdSettings]) -> Self {
        let boundaries = thresholds
            .iter()
            .map(|settings| Boundary {
                settings: settings.clone(),
                state: LatchState::Armed,
                count: 0,
            })
            .collect();
        Self { boundaries }
    }

    /// Advance every latch and return the crossings, in configuration order
    pub fn evaluate(&mut self, position: &Vector3<f64>) -> Vec<ThresholdEvent> {
        let mut events = Vec::new();

        for boundary in &mut self.boundaries {
            let settings = &boundary.settings;
            let coordinate = settings.axis.component(position);
            let crossed = settings.direction.holds(coordinate, settings.value);

            match (boundary.state, crossed) {
                (LatchState::Armed, true) => {
                    boundary.state = LatchState::Fired;
                    boundary.count += 1;
                    events.push(ThresholdEvent {
                        name: settings.name.clone(),
                        label: format!("{}: {}", settings.display_name, boundary.count),
                        count: boundary.count,
                        opcode: settings.opcode,
                        position: *position,
                    });
                }
                (LatchState::Fired, false) => {
                    boundary.state = LatchState::Armed;
                }
                _ => {}
            }
        }

        events
    }

    pub fn state(&self, name: &str) -> Option<LatchState> {
        self.find(name).map(|b| b.state)
    }

    pub fn count(&self, name: &str) -> Option<u32> {
        self.find(name).map(|b| b.count)
    }

    /// Crossing counts per boundary, in configuration order
    pub fn counts(&self) -> Vec<(&str, u32)> {
        self.boundaries
            .iter()
            .map(|b| (b.settings.name.as_str(), b.count))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    fn find(&self, name: &str) -> Option<&Boundary> {
        self.boundaries.iter().find(|b| b.settings.name == name)
    }
}
