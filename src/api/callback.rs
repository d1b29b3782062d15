//! Subscriber registry for position updates and tracker events

use crate::api::types::{PositionUpdate, TrackerEvent};
use std::collections::BTreeMap;

/// Callback function type for per-tick position updates
pub type PositionCallback = Box<dyn Fn(&PositionUpdate) + Send>;

/// Callback function type for threshold and link events
pub type EventCallback = Box<dyn Fn(&TrackerEvent) + Send>;

/// Callback registration handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallbackHandle(u32);

impl CallbackHandle {
    pub fn id(&self) -> u32 {
        self.0
    }
}

/// Registered subscribers, notified in registration order
#[derive(Default)]
pub struct Subscribers {
    counter: u32,
    position_callbacks: BTreeMap<CallbackHandle, PositionCallback>,
    event_callbacks: BTreeMap<CallbackHandle, EventCallback>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_position(&mut self, callback: PositionCallback) -> CallbackHandle {
        let handle = self.next_handle();
        self.position_callbacks.insert(handle, callback);
        handle
    }

    pub fn on_event(&mut self, callback: EventCallback) -> CallbackHandle {
        let handle = self.next_handle();
        self.event_callbacks.insert(handle, callback);
        handle
    }

    /// Remove a callback of either kind; false if the handle is unknown
    pub fn unsubscribe(&mut self, handle: CallbackHandle) -> bool {
        self.position_callbacks.remove(&handle).is_some()
            || self.event_callbacks.remove(&handle).is_some()
    }

    pub fn publish_position(&self, update: &PositionUpdate) {
        for callback in self.position_callbacks.values() {
            callback(update);
        }
    }

    pub fn publish_event(&self, event: &TrackerEvent) {
        for callback in self.event_callbacks.values() {
            callback(event);
        }
    }

    /// Number of registered (position, event) callbacks
    pub fn count(&self) -> (usize, usize) {
        (self.position_callbacks.len(), self.event_callbacks.len())
    }

    fn next_handle(&mut self) -> CallbackHandle {
        self.counter += 1;
        CallbackHandle(self.counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::CommError;
    use nalgebra::Vector3;
    use std::sync::{Arc, Mutex};

    fn update(sequence: u64) -> PositionUpdate {
        PositionUpdate {
            position: Vector3::zeros(),
            sequence,
            fresh: false,
        }
    }

    #[test]
    fn test_publish_reaches_every_subscriber() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut subscribers = Subscribers::new();

        for tag in 0..2u64 {
            let seen = Arc::clone(&seen);
            subscribers.on_position(Box::new(move |u| {
                seen.lock().unwrap().push((tag, u.sequence));
            }));
        }

        subscribers.publish_position(&update(7));
        assert_eq!(*seen.lock().unwrap(), vec![(0, 7), (1, 7)]);
    }

    #[test]
    fn test_unsubscribe() {
        let hits = Arc::new(Mutex::new(0));
        let mut subscribers = Subscribers::new();

        let counter = Arc::clone(&hits);
        let position = subscribers.on_position(Box::new(move |_| {
            *counter.lock().unwrap() += 1;
        }));
        let event = subscribers.on_event(Box::new(|_| {}));
        assert_ne!(position, event);
        assert_eq!(subscribers.count(), (1, 1));

        assert!(subscribers.unsubscribe(position));
        assert!(!subscribers.unsubscribe(position));
        assert!(subscribers.unsubscribe(event));
        assert_eq!(subscribers.count(), (0, 0));

        subscribers.publish_position(&update(1));
        subscribers.publish_event(&TrackerEvent::LinkFailed(CommError::LinkUnavailable));
        assert_eq!(*hits.lock().unwrap(), 0);
    }
}
