//! Exponential smoothing of solved positions

use nalgebra::Vector3;

/// Exponential moving average over solved positions.
///
/// `F <- alpha * F + (1 - alpha) * R`, starting from the origin.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialFilter {
    /// Current filtered position
    state: Vector3<f64>,
    /// Weight of the previous estimate
    alpha: f64,
    updates: u64,
}

impl ExponentialFilter {
    pub fn new(alpha: f64) -> Self {
        Self {
            state: Vector3::zeros(),
            alpha,
            updates: 0,
        }
    }

    /// Blend a new raw position into the state and return the result
    pub fn update(&mut self, raw: &Vector3<f64>) -> Vector3<f64> {
        self.state = self.state * self.alpha + raw * (1.0 - self.alpha);
        self.updates += 1;
        self.state
    }

    pub fn position(&self) -> Vector3<f64> {
        self.state
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Number of raw positions absorbed since the last reset
    pub fn update_count(&self) -> u64 {
        self.updates
    }

    /// Reset filter state to the origin
    pub fn reset(&mut self) {
        self.state = Vector3::zeros();
        self.updates = 0;
    }
}
