//! Synchronous tracking pipeline
//!
//! bytes -> frames -> distance vector -> solve -> smooth -> threshold events.
//! One [`CycleOutcome`] is produced per completed frame. Skipped cycles never
//! touch the filter or the threshold latches.

use crate::algorithms::{MultilaterationSolver, SolveStatus};
use crate::core::AnchorSet;
use crate::events::{ThresholdDetector, ThresholdEvent};
use crate::processing::framing::{FrameError, FrameParser};
use crate::processing::parser::{DecodeError, MeasurementParser};
use crate::processing::smoothing::ExponentialFilter;
use crate::utils::config::{ConfigError, TrackerConfig};
use nalgebra::Vector3;

/// Why a frame did not produce a position update
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    Malformed(FrameError),
    Decode(DecodeError),
    InsufficientAnchors { valid: usize },
    /// Solver did not converge; its fallback position is discarded
    Degraded { status: SolveStatus, iterations: usize },
}

/// A successful cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleUpdate {
    pub raw: Vector3<f64>,
    pub filtered: Vector3<f64>,
    pub valid_anchors: usize,
    pub iterations: usize,
    pub events: Vec<ThresholdEvent>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Updated(CycleUpdate),
    Skipped(SkipReason),
}

impl CycleOutcome {
    pub fn is_update(&self) -> bool {
        matches!(self, CycleOutcome::Updated(_))
    }
}

/// Running counters for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerStats {
    pub frames: u64,
    pub updates: u64,
    pub malformed_frames: u64,
    pub decode_failures: u64,
    pub too_many_invalid: u64,
    pub insufficient_anchors: u64,
    pub degraded_solves: u64,
    pub events: u64,
    pub commands_sent: u64,
    pub commands_dropped: u64,
    /// Recoverable link read errors that cost one tick
    pub read_errors_skipped: u64,
}

impl TrackerStats {
    pub fn skipped(&self) -> u64 {
        self.malformed_frames
            + self.decode_failures
            + self.too_many_invalid
            + self.insufficient_anchors
            + self.degraded_solves
    }
}

/// Owns all per-session tracking state
#[derive(Debug, Clone)]
pub struct PositionTracker {
    framing: FrameParser,
    decoder: MeasurementParser,
    anchors: AnchorSet,
    solver: MultilaterationSolver,
    filter: ExponentialFilter,
    detector: ThresholdDetector,
    stats: TrackerStats,
}

impl PositionTracker {
    /// Build every stage from a configuration, validating it first
    pub fn from_config(config: &TrackerConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let g = config.initial_guess;
        Ok(Self {
            framing: FrameParser::new(config.max_frame_len),
            decoder: MeasurementParser::new(config.anchors.len(), config.max_invalid_anchors),
            anchors: config.anchor_set(),
            solver: MultilaterationSolver::new(
                Vector3::new(g[0], g[1], g[2]),
                config.solver.clone(),
            ),
            filter: ExponentialFilter::new(config.smoothing_alpha),
            detector: ThresholdDetector::new(&config.thresholds),
            stats: TrackerStats::default(),
        })
    }

    /// Feed freshly read bytes and run one cycle per completed frame
    pub fn ingest(&mut self, bytes: &[u8]) -> Vec<CycleOutcome> {
        self.framing
            .feed(bytes)
            .into_iter()
            .map(|frame| match frame {
                Ok(text) => self.process_frame(&text),
                Err(e) => {
                    self.stats.malformed_frames += 1;
                    log::warn!("Discarded malformed frame: {}", e);
                    CycleOutcome::Skipped(SkipReason::Malformed(e))
                }
            })
            .collect()
    }

    /// Run decode, solve, smooth and detect for one frame payload
    pub fn process_frame(&mut self, text: &str) -> CycleOutcome {
        self.stats.frames += 1;

        let distances = match self.decoder.parse(text) {
            Ok(distances) => distances,
            Err(e) => {
                match e {
                    DecodeError::TooManyInvalid { .. } => {
                        self.stats.too_many_invalid += 1;
                        log::warn!("Lost too many anchors: {}", e);
                    }
                    _ => {
                        self.stats.decode_failures += 1;
                        log::warn!("Error parsing line: {} | Line was: {}", e, text);
                    }
                }
                return CycleOutcome::Skipped(SkipReason::Decode(e));
            }
        };

        let subset = match self.anchors.valid_subset(&distances) {
            Some(subset) if subset.is_solvable() => subset,
            other => {
                let valid = other.map_or(0, |s| s.len());
                self.stats.insufficient_anchors += 1;
                log::warn!("Not enough valid anchors to compute position ({})", valid);
                return CycleOutcome::Skipped(SkipReason::InsufficientAnchors { valid });
            }
        };

        let solution = self.solver.solve(&subset);
        if !solution.is_converged() {
            self.stats.degraded_solves += 1;
            log::warn!(
                "Degraded cycle: solver {:?} after {} iterations",
                solution.status,
                solution.iterations
            );
            return CycleOutcome::Skipped(SkipReason::Degraded {
                status: solution.status,
                iterations: solution.iterations,
            });
        }

        let filtered = self.filter.update(&solution.position);
        log::debug!(
            "Position (filtered): [{:.2}, {:.2}, {:.2}]",
            filtered.x,
            filtered.y,
            filtered.z
        );

        let events = self.detector.evaluate(&filtered);
        for event in &events {
            log::info!("{}", event.label);
        }

        self.stats.updates += 1;
        self.stats.events += events.len() as u64;

        CycleOutcome::Updated(CycleUpdate {
            raw: solution.position,
            filtered,
            valid_anchors: subset.len(),
            iterations: solution.iterations,
            events,
        })
    }

    pub fn filtered_position(&self) -> Vector3<f64> {
        self.filter.position()
    }

    pub fn filter(&self) -> &ExponentialFilter {
        &self.filter
    }

    pub fn detector(&self) -> &ThresholdDetector {
        &self.detector
    }

    pub fn anchors(&self) -> &AnchorSet {
        &self.anchors
    }

    pub fn stats(&self) -> &TrackerStats {
        &self.stats
    }

    /// Gate frame decoding without closing the link
    pub fn set_reading_enabled(&mut self, enabled: bool) {
        self.framing.set_enabled(enabled);
    }

    /// Explicit restart: filtered position back to the origin
    pub fn reset_filter(&mut self) {
        self.filter.reset();
    }

    /// Drop any partial frame left in the buffer
    pub fn reset_framing(&mut self) {
        self.framing.reset();
    }

    pub(crate) fn record_skipped_read(&mut self) {
        self.stats.read_errors_skipped += 1;
    }

    pub(crate) fn record_command(&mut self, sent: bool) {
        if sent {
            self.stats.commands_sent += 1;
        } else {
            self.stats.commands_dropped += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DistanceVector, Reading};
    use crate::utils::config::SolverSettings;
    use approx::assert_relative_eq;

    fn tracker() -> PositionTracker {
        PositionTracker::from_config(&TrackerConfig::default()).unwrap()
    }

    fn frame_for(target: &Vector3<f64>, unavailable: &[usize]) -> String {
        let config = TrackerConfig::default();
        let readings = config
            .anchor_set()
            .positions()
            .iter()
            .enumerate()
            .map(|(i, a)| {
                if unavailable.contains(&i) {
                    Reading::Unavailable
                } else {
                    Reading::Range((a - target).norm())
                }
            })
            .collect();
        format!("{}\n", DistanceVector::new(readings).to_frame_text())
    }

    #[test]
    fn test_five_valid_anchors_moves_filter_halfway() {
        let mut tracker = tracker();
        let outcomes = tracker.ingest(b"[200,200,200,200,200,-1]\n");
        assert_eq!(outcomes.len(), 1);

        // Same subset solved directly, from the same starting point
        let config = TrackerConfig::default();
        let g = config.initial_guess;
        let solver = MultilaterationSolver::new(
            Vector3::new(g[0], g[1], g[2]),
            SolverSettings::default(),
        );
        let subset = config
            .anchor_set()
            .valid_subset(
                &MeasurementParser::new(6, 2)
                    .parse("[200,200,200,200,200,-1]")
                    .unwrap(),
            )
            .unwrap();
        let expected = solver.solve(&subset);
        assert!(expected.is_converged());

        match &outcomes[0] {
            CycleOutcome::Updated(update) => {
                assert_eq!(update.valid_anchors, 5);
                assert_eq!(update.raw, expected.position);
                assert_relative_eq!(update.filtered, expected.position * 0.5);
            }
            other => panic!("expected update, got {:?}", other),
        }
        assert_relative_eq!(tracker.filtered_position(), expected.position * 0.5);
    }

    #[test]
    fn test_three_invalid_anchors_skips_cycle() {
        let mut tracker = tracker();
        let outcomes = tracker.ingest(b"[-1,-1,-1,100,100,100]\n");

        assert_eq!(
            outcomes,
            vec![CycleOutcome::Skipped(SkipReason::Decode(
                DecodeError::TooManyInvalid {
                    invalid: 3,
                    allowed: 2
                }
            ))]
        );
        assert_eq!(tracker.filtered_position(), Vector3::zeros());
        assert_eq!(tracker.filter().update_count(), 0);
        assert_eq!(tracker.stats().too_many_invalid, 1);
        assert_eq!(tracker.stats().events, 0);
    }

    #[test]
    fn test_skipped_cycles_leave_filter_untouched() {
        let mut tracker = tracker();
        tracker.ingest(frame_for(&Vector3::new(150.0, 300.0, 60.0), &[]).as_bytes());
        let before = tracker.filtered_position();

        let noise: &[&[u8]] = &[
            b"[-1,-1,-1,-1,100,100]\n",
            b"[1,2,3]\n",
            b"not a list\n",
            &[0xFF, 0xFE, b'\n'],
            b"[1, 2, -7, 4, 5, 6]\n",
        ];
        for chunk in noise {
            let outcomes = tracker.ingest(chunk);
            assert!(outcomes.iter().all(|o| !o.is_update()));
            assert_eq!(tracker.filtered_position(), before);
        }

        let stats = tracker.stats();
        assert_eq!(stats.updates, 1);
        assert_eq!(stats.malformed_frames, 1);
        assert_eq!(stats.decode_failures, 3);
        assert_eq!(stats.too_many_invalid, 1);
        assert_eq!(stats.skipped(), 5);
    }

    #[test]
    fn test_insufficient_anchors_when_budget_allows_it() {
        let mut config = TrackerConfig::default();
        config.max_invalid_anchors = 4;
        let mut tracker = PositionTracker::from_config(&config).unwrap();

        let outcomes = tracker.ingest(b"[-1,-1,-1,-1,100,100]\n");
        assert_eq!(
            outcomes,
            vec![CycleOutcome::Skipped(SkipReason::InsufficientAnchors { valid: 2 })]
        );
        assert_eq!(tracker.filtered_position(), Vector3::zeros());
    }

    #[test]
    fn test_degraded_solve_does_not_update_filter() {
        let mut config = TrackerConfig::default();
        config.solver = SolverSettings {
            max_iterations: 1,
            ftol: 0.0,
            xtol: 0.0,
            gtol: 0.0,
        };
        let mut tracker = PositionTracker::from_config(&config).unwrap();

        let outcomes = tracker.ingest(frame_for(&Vector3::new(200.0, 300.0, 40.0), &[]).as_bytes());
        assert!(matches!(
            outcomes[0],
            CycleOutcome::Skipped(SkipReason::Degraded {
                status: SolveStatus::Diverged,
                ..
            })
        ));
        assert_eq!(tracker.filtered_position(), Vector3::zeros());
        assert_eq!(tracker.stats().degraded_solves, 1);
    }

    #[test]
    fn test_filter_converges_on_stationary_target() {
        let mut tracker = tracker();
        let target = Vector3::new(180.0, 260.0, 45.0);
        let frame = frame_for(&target, &[2]);

        for _ in 0..40 {
            tracker.ingest(frame.as_bytes());
        }
        assert_relative_eq!(tracker.filtered_position(), target, epsilon = 1e-3);
    }

    #[test]
    fn test_player1_crossing_fires_once() {
        let mut config = TrackerConfig::default();
        config.thresholds.truncate(1);
        config.thresholds[0].value = 565.0;
        config.smoothing_alpha = 0.0;
        let mut tracker = PositionTracker::from_config(&config).unwrap();

        let inside = frame_for(&Vector3::new(150.0, 300.0, 50.0), &[]);
        let across = frame_for(&Vector3::new(150.0, 566.0, 50.0), &[]);

        assert!(tracker.ingest(inside.as_bytes())[0].is_update());

        let first = tracker.ingest(across.as_bytes());
        match &first[0] {
            CycleOutcome::Updated(update) => {
                assert_eq!(update.events.len(), 1);
                assert_eq!(update.events[0].opcode, 0xFF);
                assert_eq!(update.events[0].label, "Player 1 Score: 1");
            }
            other => panic!("expected update, got {:?}", other),
        }

        match &tracker.ingest(across.as_bytes())[0] {
            CycleOutcome::Updated(update) => assert!(update.events.is_empty()),
            other => panic!("expected update, got {:?}", other),
        }
        assert_eq!(tracker.detector().count("player1"), Some(1));
        assert_eq!(tracker.stats().events, 1);
    }

    #[test]
    fn test_partial_frames_across_ingests() {
        let mut tracker = tracker();
        let frame = frame_for(&Vector3::new(150.0, 300.0, 60.0), &[]);
        let (head, tail) = frame.as_bytes().split_at(frame.len() / 2);

        assert!(tracker.ingest(head).is_empty());
        assert!(tracker.ingest(&[]).is_empty());
        let outcomes = tracker.ingest(tail);
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_update());
    }

    #[test]
    fn test_reading_gate_and_reset() {
        let mut tracker = tracker();
        let frame = frame_for(&Vector3::new(150.0, 300.0, 60.0), &[]);

        tracker.set_reading_enabled(false);
        assert!(tracker.ingest(frame.as_bytes()).is_empty());
        tracker.set_reading_enabled(true);
        assert!(tracker.ingest(frame.as_bytes())[0].is_update());

        tracker.reset_filter();
        assert_eq!(tracker.filtered_position(), Vector3::zeros());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = TrackerConfig::default();
        config.expected_anchor_count = 5;
        assert!(PositionTracker::from_config(&config).is_err());
    }
}
