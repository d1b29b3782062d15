//! Fixed-period polling session
//!
//! A [`TrackingSession`] exclusively owns the ranging link, the command sink
//! and the [`PositionTracker`]. Each tick drains whatever the link has ready,
//! runs the pipeline over every completed frame, forwards threshold opcodes
//! and publishes the current filtered position to subscribers.
//!
//! [`TrackingSession::start`] moves the session onto a dedicated thread.
//! Ticks never overlap: the next one is scheduled only after the previous one
//! returned, so a slow cycle delays the timer instead of stacking work.

use crate::api::callback::{CallbackHandle, EventCallback, PositionCallback, Subscribers};
use crate::api::types::{PollReport, PositionUpdate, TrackerError, TrackerEvent, TrackerResult};
use crate::events::ThresholdEvent;
use crate::hardware::{CommandSink, RangingLink, RecoveryStrategy};
use crate::processing::{CycleOutcome, PositionTracker};
use crate::utils::config::TrackerConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub struct TrackingSession {
    tracker: PositionTracker,
    link: Box<dyn RangingLink>,
    commands: Box<dyn CommandSink>,
    subscribers: Subscribers,
    period: Duration,
    sequence: u64,
    read_buf: Vec<u8>,
}

impl TrackingSession {
    /// Build a session over an already opened link
    pub fn new(
        config: &TrackerConfig,
        link: Box<dyn RangingLink>,
        commands: Box<dyn CommandSink>,
    ) -> TrackerResult<Self> {
        let tracker = PositionTracker::from_config(config)?;
        if !commands.is_available() {
            log::warn!("No command link attached; threshold opcodes will be dropped");
        }

        Ok(Self {
            tracker,
            link,
            commands,
            subscribers: Subscribers::new(),
            period: config.poll_period(),
            sequence: 0,
            read_buf: Vec::with_capacity(config.max_frame_len),
        })
    }

    pub fn on_position(&mut self, callback: PositionCallback) -> CallbackHandle {
        self.subscribers.on_position(callback)
    }

    pub fn on_event(&mut self, callback: EventCallback) -> CallbackHandle {
        self.subscribers.on_event(callback)
    }

    pub fn unsubscribe(&mut self, handle: CallbackHandle) -> bool {
        self.subscribers.unsubscribe(handle)
    }

    pub fn tracker(&self) -> &PositionTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut PositionTracker {
        &mut self.tracker
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run one tick.
    ///
    /// Recoverable read errors cost this tick's data only. Any other read
    /// failure is published as [`TrackerEvent::LinkFailed`] and returned;
    /// the caller must not poll again.
    pub fn poll_once(&mut self) -> TrackerResult<PollReport> {
        self.read_buf.clear();
        let bytes_read = match self.link.read_available(&mut self.read_buf) {
            Ok(n) => n,
            Err(e) => match e.recovery_strategy() {
                RecoveryStrategy::Skip => {
                    log::warn!("Skipping read on {}: {}", self.link.name(), e);
                    self.tracker.record_skipped_read();
                    self.read_buf.clear();
                    0
                }
                RecoveryStrategy::Fail => {
                    log::error!("Ranging link {} failed: {}", self.link.name(), e);
                    self.subscribers
                        .publish_event(&TrackerEvent::LinkFailed(e.clone()));
                    return Err(e.into());
                }
            },
        };

        let outcomes = self.tracker.ingest(&self.read_buf);

        let events: Vec<ThresholdEvent> = outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                CycleOutcome::Updated(update) => Some(update.events.iter().cloned()),
                CycleOutcome::Skipped(_) => None,
            })
            .flatten()
            .collect();

        let mut commands_sent = 0;
        for event in events {
            if self.emit(event.opcode) {
                commands_sent += 1;
            }
            self.subscribers.publish_event(&TrackerEvent::Threshold(event));
        }

        self.sequence += 1;
        self.subscribers.publish_position(&PositionUpdate {
            position: self.tracker.filtered_position(),
            sequence: self.sequence,
            fresh: outcomes.iter().any(CycleOutcome::is_update),
        });

        Ok(PollReport {
            bytes_read,
            outcomes,
            commands_sent,
        })
    }

    /// Fire-and-forget opcode; failures are recorded, never retried
    fn emit(&mut self, opcode: u8) -> bool {
        if !self.commands.is_available() {
            log::warn!("Command link unavailable, dropped opcode 0x{:02X}", opcode);
            self.tracker.record_command(false);
            return false;
        }

        match self.commands.send(opcode) {
            Ok(()) => {
                log::info!("[Sent] 0x{:02X}", opcode);
                self.tracker.record_command(true);
                true
            }
            Err(e) => {
                log::warn!("Failed to send opcode 0x{:02X}: {}", opcode, e);
                self.tracker.record_command(false);
                false
            }
        }
    }

    /// Close the link and hand back the tracker with filter and latches intact
    pub fn close(mut self) -> PositionTracker {
        if self.link.is_open() {
            self.link.close();
            log::info!("Closed ranging link {}", self.link.name());
        }
        self.tracker.reset_framing();
        self.tracker
    }

    /// Move the session onto its polling thread
    pub fn start(self) -> TrackerResult<SessionHandle> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let link_name = self.link.name().to_string();

        let worker = thread::Builder::new()
            .name("tracker-poll".to_string())
            .spawn(move || self.run(&flag))
            .map_err(|e| TrackerError::Thread {
                details: e.to_string(),
            })?;

        log::info!("Tracking session started on {}", link_name);
        Ok(SessionHandle {
            running,
            worker: Some(worker),
        })
    }

    fn run(mut self, running: &AtomicBool) -> PositionTracker {
        let mut next_tick = Instant::now();

        while running.load(Ordering::SeqCst) {
            if self.poll_once().is_err() {
                break;
            }

            next_tick += self.period;
            let now = Instant::now();
            if next_tick <= now {
                next_tick = now;
                continue;
            }

            // park_timeout may wake early; stop() unparks on purpose
            loop {
                let now = Instant::now();
                if !running.load(Ordering::SeqCst) || now >= next_tick {
                    break;
                }
                thread::park_timeout(next_tick - now);
            }
        }

        running.store(false, Ordering::SeqCst);
        self.close()
    }
}

/// Control handle for a started session
pub struct SessionHandle {
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<PositionTracker>>,
}

impl SessionHandle {
    /// False once stopped or after the link failed
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Emergency stop: halt the timer, close the link, return the tracker
    pub fn stop(mut self) -> TrackerResult<PositionTracker> {
        let tracker = self.halt()?;
        log::info!("Tracking session stopped");
        Ok(tracker)
    }

    fn halt(&mut self) -> TrackerResult<PositionTracker> {
        let worker = self.worker.take().ok_or_else(|| TrackerError::Thread {
            details: "session already stopped".to_string(),
        })?;

        self.running.store(false, Ordering::SeqCst);
        worker.thread().unpark();
        worker.join().map_err(|_| TrackerError::Thread {
            details: "polling thread panicked".to_string(),
        })
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.halt();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DistanceVector, Reading};
    use crate::hardware::{CommError, MockCommandSink, MockLink, MockLinkHandle, NullCommandSink};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use std::sync::mpsc;
    use std::sync::Mutex;

    fn frame_for(target: &Vector3<f64>) -> String {
        let readings = TrackerConfig::default()
            .anchor_set()
            .positions()
            .iter()
            .map(|a| Reading::Range((a - target).norm()))
            .collect();
        DistanceVector::new(readings).to_frame_text()
    }

    fn player1_config() -> TrackerConfig {
        let mut config = TrackerConfig::default();
        config.thresholds.truncate(1);
        config.thresholds[0].value = 565.0;
        config.smoothing_alpha = 0.0;
        config.poll_period_ms = 5;
        config
    }

    fn session(config: &TrackerConfig) -> (TrackingSession, MockLinkHandle, MockCommandSink) {
        let link = MockLink::new("mock0");
        let handle = link.handle();
        let sink = MockCommandSink::new();
        let session =
            TrackingSession::new(config, Box::new(link), Box::new(sink.clone())).unwrap();
        (session, handle, sink)
    }

    #[test]
    fn test_every_tick_publishes_last_known_position() {
        let (mut session, link, _) = session(&TrackerConfig::default());
        let updates = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&updates);
        session.on_position(Box::new(move |u| seen.lock().unwrap().push(*u)));

        session.poll_once().unwrap();
        link.push_line(&frame_for(&Vector3::new(150.0, 300.0, 60.0)));
        let report = session.poll_once().unwrap();
        assert_eq!(report.updates(), 1);
        session.poll_once().unwrap();

        let updates = updates.lock().unwrap();
        assert_eq!(updates.len(), 3);
        assert_eq!(updates[0].position, Vector3::zeros());
        assert!(!updates[0].fresh);
        assert!(updates[1].fresh);
        assert_relative_eq!(
            updates[1].position,
            Vector3::new(75.0, 150.0, 30.0),
            epsilon = 1e-6
        );
        assert!(!updates[2].fresh);
        assert_eq!(updates[2].position, updates[1].position);
        assert_eq!(
            updates.iter().map(|u| u.sequence).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_crossing_sends_one_opcode() {
        let (mut session, link, sink) = session(&player1_config());
        let events = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&events);
        session.on_event(Box::new(move |e| seen.lock().unwrap().push(e.clone())));

        link.push_line(&frame_for(&Vector3::new(150.0, 300.0, 50.0)));
        session.poll_once().unwrap();
        for _ in 0..5 {
            link.push_line(&frame_for(&Vector3::new(150.0, 566.0, 50.0)));
            session.poll_once().unwrap();
        }

        assert_eq!(sink.sent(), vec![0xFF]);
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            TrackerEvent::Threshold(event) => assert_eq!(event.label, "Player 1 Score: 1"),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(session.tracker().stats().commands_sent, 1);
    }

    #[test]
    fn test_unavailable_command_link_is_a_recorded_no_op() {
        let config = player1_config();
        let link = MockLink::new("mock0");
        let handle = link.handle();
        let mut session =
            TrackingSession::new(&config, Box::new(link), Box::new(NullCommandSink)).unwrap();

        handle.push_line(&frame_for(&Vector3::new(150.0, 566.0, 50.0)));
        let report = session.poll_once().unwrap();

        assert_eq!(report.updates(), 1);
        assert_eq!(report.commands_sent, 0);
        assert_eq!(session.tracker().stats().commands_dropped, 1);
        assert_eq!(session.tracker().detector().count("player1"), Some(1));
    }

    #[test]
    fn test_all_frames_in_one_chunk_are_processed() {
        let (mut session, link, _) = session(&TrackerConfig::default());
        let frame = frame_for(&Vector3::new(150.0, 300.0, 60.0));
        link.push_bytes(format!("{}\n{}\n[1,2\n", frame, frame).as_bytes());

        let report = session.poll_once().unwrap();
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.updates(), 2);
        assert_eq!(session.tracker().filter().update_count(), 2);
    }

    #[test]
    fn test_read_failure_publishes_link_failed() {
        let (mut session, link, _) = session(&TrackerConfig::default());
        let failures = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&failures);
        session.on_event(Box::new(move |e| {
            if let TrackerEvent::LinkFailed(err) = e {
                seen.lock().unwrap().push(err.clone());
            }
        }));

        link.fail_next_read(CommError::io("read", "device reports readiness"));
        let result = session.poll_once();

        assert!(matches!(result, Err(TrackerError::Comm(CommError::Io { .. }))));
        assert_eq!(failures.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_recoverable_read_error_skips_tick() {
        let (mut session, link, _) = session(&TrackerConfig::default());
        let failures = Arc::new(Mutex::new(0));
        let seen = Arc::clone(&failures);
        session.on_event(Box::new(move |e| {
            if let TrackerEvent::LinkFailed(_) = e {
                *seen.lock().unwrap() += 1;
            }
        }));

        link.fail_next_read(CommError::Timeout { timeout_ms: 10 });
        link.push_line(&frame_for(&Vector3::new(150.0, 300.0, 60.0)));

        let report = session.poll_once().unwrap();
        assert_eq!(report.bytes_read, 0);
        assert!(report.outcomes.is_empty());
        assert_eq!(session.tracker().stats().read_errors_skipped, 1);

        // The queued frame arrives on the next tick
        assert_eq!(session.poll_once().unwrap().updates(), 1);
        assert_eq!(*failures.lock().unwrap(), 0);
        assert!(link.is_open());
    }

    #[test]
    fn test_close_preserves_filter_state() {
        let (mut session, link, _) = session(&TrackerConfig::default());
        link.push_line(&frame_for(&Vector3::new(150.0, 300.0, 60.0)));
        link.push_bytes(b"[12, 3");
        session.poll_once().unwrap();
        session.poll_once().unwrap();
        let position = session.tracker().filtered_position();

        let tracker = session.close();
        assert_eq!(tracker.filtered_position(), position);
        assert_eq!(link.close_count(), 1);
        assert!(!link.is_open());
    }

    #[test]
    fn test_start_and_stop() {
        let (mut session, link, sink) = session(&player1_config());
        let (tx, rx) = mpsc::channel();
        session.on_position(Box::new(move |u| {
            if u.fresh {
                let _ = tx.send(*u);
            }
        }));

        link.push_line(&frame_for(&Vector3::new(150.0, 566.0, 50.0)));
        let handle = session.start().unwrap();
        assert!(handle.is_running());

        let update = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_relative_eq!(update.position, Vector3::new(150.0, 566.0, 50.0), epsilon = 1e-3);

        let tracker = handle.stop().unwrap();
        assert_eq!(link.close_count(), 1);
        assert_eq!(tracker.stats().updates, 1);
        assert_eq!(tracker.detector().count("player1"), Some(1));
        assert_eq!(sink.sent(), vec![0xFF]);
    }

    #[test]
    fn test_started_session_survives_read_timeout() {
        let (mut session, link, _) = session(&player1_config());
        let (tx, rx) = mpsc::channel();
        session.on_position(Box::new(move |u| {
            if u.fresh {
                let _ = tx.send(*u);
            }
        }));

        link.fail_next_read(CommError::Timeout { timeout_ms: 10 });
        link.push_line(&frame_for(&Vector3::new(150.0, 300.0, 50.0)));
        let handle = session.start().unwrap();

        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
        assert!(handle.is_running());
        assert_eq!(link.close_count(), 0);

        let tracker = handle.stop().unwrap();
        assert_eq!(tracker.stats().read_errors_skipped, 1);
        assert_eq!(tracker.stats().updates, 1);
        assert_eq!(link.close_count(), 1);
    }

    #[test]
    fn test_link_failure_ends_polling_thread() {
        let (mut session, link, _) = session(&player1_config());
        let (tx, rx) = mpsc::channel();
        session.on_event(Box::new(move |e| {
            if let TrackerEvent::LinkFailed(err) = e {
                let _ = tx.send(err.clone());
            }
        }));

        let handle = session.start().unwrap();
        link.disconnect();

        let err = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(err, CommError::ConnectionLost { .. }));

        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!handle.is_running());
        assert!(handle.stop().is_ok());
    }
}
