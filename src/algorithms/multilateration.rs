//! Range-based multilateration by damped Gauss-Newton (Levenberg-Marquardt)
//!
//! Minimizes `sum_i (|a_i - p| - d_i)^2` over the 3D point `p`. The Jacobian
//! of each residual is the unit vector from the anchor to `p`, so no finite
//! differencing is needed. The problem is three unknowns over at most a
//! handful of anchors, so the normal equations are solved densely.

use crate::core::constants::MIN_ANCHORS_FOR_FIX;
use crate::core::ValidSubset;
use crate::utils::config::SolverSettings;
use nalgebra::{DMatrix, DVector, Vector3};

const INITIAL_DAMPING: f64 = 1e-3;
const MIN_DAMPING: f64 = 1e-15;
const MAX_DAMPING: f64 = 1e15;
const DAMPING_FACTOR: f64 = 10.0;
/// Floor for diagonal scaling, keeps the damped system positive definite
const MIN_DIAGONAL: f64 = 1e-12;

/// How a solve ended
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolveStatus {
    Converged,
    /// Iteration budget exhausted, damping blew up or values went non-finite
    Diverged,
    /// Fewer than three anchor/range pairs
    Underdetermined,
}

/// Result of a solve. On failure `position` holds the fallback origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub position: Vector3<f64>,
    pub status: SolveStatus,
    pub iterations: usize,
    /// Sum of squared range residuals at `position`
    pub cost: f64,
}

impl Solution {
    pub fn is_converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }

    fn fallback(status: SolveStatus, iterations: usize) -> Self {
        Self {
            position: Vector3::zeros(),
            status,
            iterations,
            cost: f64::NAN,
        }
    }
}

/// Stateless solver; every call starts from the configured initial guess
#[derive(Debug, Clone)]
pub struct MultilaterationSolver {
    initial_guess: Vector3<f64>,
    settings: SolverSettings,
}

impl MultilaterationSolver {
    pub fn new(initial_guess: Vector3<f64>, settings: SolverSettings) -> Self {
        Self {
            initial_guess,
            settings,
        }
    }

    pub fn initial_guess(&self) -> Vector3<f64> {
        self.initial_guess
    }

    /// Fit a position to the subset
    pub fn solve(&self, subset: &ValidSubset) -> Solution {
        if subset.len() < MIN_ANCHORS_FOR_FIX || subset.anchors.len() != subset.ranges.len() {
            return Solution::fallback(SolveStatus::Underdetermined, 0);
        }

        let SolverSettings {
            max_iterations,
            ftol,
            xtol,
            gtol,
        } = self.settings;

        let mut estimate = self.initial_guess;
        let (mut residuals, mut jacobian) = residuals_and_jacobian(subset, &estimate);
        let mut cost = residuals.norm_squared();
        let mut lambda = INITIAL_DAMPING;

        for iteration in 1..=max_iterations {
            if !cost.is_finite() {
                return Solution::fallback(SolveStatus::Diverged, iteration);
            }

            let gradient = jacobian.tr_mul(&residuals);
            if gradient.amax() <= gtol {
                return Self::converged(estimate, iteration, cost);
            }

            let jtj = jacobian.tr_mul(&jacobian);
            let mut damped = jtj.clone();
            for i in 0..3 {
                damped[(i, i)] += lambda * jtj[(i, i)].max(MIN_DIAGONAL);
            }

            let step = match damped.cholesky() {
                Some(chol) => chol.solve(&(-&gradient)),
                None => {
                    lambda *= DAMPING_FACTOR;
                    if lambda > MAX_DAMPING {
                        return Solution::fallback(SolveStatus::Diverged, iteration);
                    }
                    continue;
                }
            };
            let step = Vector3::new(step[0], step[1], step[2]);

            // Step negligible relative to the estimate: nothing left to gain
            if step.norm() <= xtol * (estimate.norm() + xtol) {
                return Self::converged(estimate, iteration, cost);
            }

            let candidate = estimate + step;
            let (candidate_residuals, candidate_jacobian) =
                residuals_and_jacobian(subset, &candidate);
            let candidate_cost = candidate_residuals.norm_squared();

            if candidate_cost.is_finite() && candidate_cost < cost {
                let reduction = cost - candidate_cost;
                estimate = candidate;
                residuals = candidate_residuals;
                jacobian = candidate_jacobian;
                let previous_cost = cost;
                cost = candidate_cost;
                lambda = (lambda / DAMPING_FACTOR).max(MIN_DAMPING);

                if reduction <= ftol * previous_cost {
                    return Self::converged(estimate, iteration, cost);
                }
            } else {
                lambda *= DAMPING_FACTOR;
                if lambda > MAX_DAMPING {
                    return Solution::fallback(SolveStatus::Diverged, iteration);
                }
            }
        }

        Solution::fallback(SolveStatus::Diverged, max_iterations)
    }

    fn converged(position: Vector3<f64>, iterations: usize, cost: f64) -> Solution {
        Solution {
            position,
            status: SolveStatus::Converged,
            iterations,
            cost,
        }
    }
}

/// Residuals `|p - a_i| - d_i` and their Jacobian with respect to `p`
fn residuals_and_jacobian(
    subset: &ValidSubset,
    estimate: &Vector3<f64>,
) -> (DVector<f64>, DMatrix<f64>) {
    let n = subset.len();
    let mut residuals = DVector::zeros(n);
    let mut jacobian = DMatrix::zeros(n, 3);

    for (i, (anchor, range)) in subset.anchors.iter().zip(&subset.ranges).enumerate() {
        let diff = estimate - anchor;
        let predicted_range = diff.norm();
        residuals[i] = predicted_range - range;

        // Undefined only at the anchor itself; leave that row zero
        if predicted_range > 1e-12 {
            let unit = diff / predicted_range;
            jacobian[(i, 0)] = unit.x;
            jacobian[(i, 1)] = unit.y;
            jacobian[(i, 2)] = unit.z;
        }
    }

    (residuals, jacobian)
}
