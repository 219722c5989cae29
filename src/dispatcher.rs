//! Topic dispatcher.
//!
//! Routes every inbound message to the observers registered for its exact
//! topic. Registration order is delivery order; the same handle registered
//! twice under one topic is stored once. Topic filters with wildcards belong
//! to the broker-side subscription, not to this registry.

use crate::message::MqttMessage;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Capability implemented by anything that wants inbound messages.
///
/// Closures of the shape `Fn(&str, &str)` implement it via the blanket impl,
/// so ad-hoc handlers do not need a named type.
pub trait TopicObserver: Send + Sync {
    fn on_message(&self, topic: &str, payload: &str);
}

impl<F> TopicObserver for F
where
    F: Fn(&str, &str) + Send + Sync,
{
    fn on_message(&self, topic: &str, payload: &str) {
        self(topic, payload)
    }
}

/// Shared observer handle. Identity (`Arc::ptr_eq`) is what makes two
/// registrations "the same observer".
pub type ObserverHandle = Arc<dyn TopicObserver>;

/// Registry mapping exact topic strings to their observers.
#[derive(Default)]
pub struct TopicDispatcher {
    observers: HashMap<String, Vec<ObserverHandle>>,
}

impl TopicDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `observer` to `topic`. Registering the same handle under the same
    /// topic again is a no-op.
    pub fn register(&mut self, topic: impl Into<String>, observer: ObserverHandle) {
        let topic = topic.into();
        let entry = self.observers.entry(topic).or_default();
        if !entry.iter().any(|known| Arc::ptr_eq(known, &observer)) {
            entry.push(observer);
        }
    }

    /// Removes `observer` from `topic`. Unknown topics and handles are
    /// tolerated silently; an emptied topic entry is dropped.
    pub fn unregister(&mut self, topic: &str, observer: &ObserverHandle) {
        let Some(entry) = self.observers.get_mut(topic) else {
            return;
        };
        entry.retain(|known| !Arc::ptr_eq(known, observer));
        if entry.is_empty() {
            self.observers.remove(topic);
        }
    }

    /// Delivers `message` to every observer of its topic, in registration
    /// order. No observers is a silent no-op. A panicking observer is caught
    /// and logged so it cannot block delivery to the rest.
    pub fn dispatch(&self, message: &MqttMessage) {
        let Some(entry) = self.observers.get(message.topic()) else {
            return;
        };
        let payload = match message.text() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(topic = message.topic(), error = %e, "dropping undecodable payload");
                return;
            }
        };
        debug!(
            topic = message.topic(),
            observers = entry.len(),
            "dispatching message"
        );
        for observer in entry {
            let delivery = catch_unwind(AssertUnwindSafe(|| {
                observer.on_message(message.topic(), payload);
            }));
            if delivery.is_err() {
                error!(topic = message.topic(), "observer panicked during dispatch");
            }
        }
    }

    /// Number of observers currently registered for `topic`.
    pub fn observer_count(&self, topic: &str) -> usize {
        self.observers.get(topic).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Deliveries = Arc<Mutex<Vec<(String, String)>>>;

    fn recording_observer() -> (ObserverHandle, Deliveries) {
        let log: Deliveries = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let observer: ObserverHandle = Arc::new(move |topic: &str, payload: &str| {
            sink.lock()
                .unwrap()
                .push((topic.to_string(), payload.to_string()));
        });
        (observer, log)
    }

    #[test]
    fn dispatches_to_registered_observer() {
        // Scenario: one observer on "sensors/temp" sees exactly one delivery.
        let mut dispatcher = TopicDispatcher::new();
        let (observer, log) = recording_observer();
        dispatcher.register("sensors/temp", observer);

        dispatcher.dispatch(&MqttMessage::from_text("sensors/temp", "21.5"));

        let deliveries = log.lock().unwrap();
        assert_eq!(
            *deliveries,
            vec![("sensors/temp".to_string(), "21.5".to_string())]
        );
    }

    #[test]
    fn duplicate_registration_delivers_once() {
        let mut dispatcher = TopicDispatcher::new();
        let (observer, log) = recording_observer();
        dispatcher.register("sensors/temp", Arc::clone(&observer));
        dispatcher.register("sensors/temp", observer);

        assert_eq!(dispatcher.observer_count("sensors/temp"), 1);
        dispatcher.dispatch(&MqttMessage::from_text("sensors/temp", "21.5"));
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn unregistered_observer_is_never_invoked() {
        let mut dispatcher = TopicDispatcher::new();
        let (observer, log) = recording_observer();
        dispatcher.register("x", Arc::clone(&observer));
        dispatcher.unregister("x", &observer);

        dispatcher.dispatch(&MqttMessage::from_text("x", "y"));
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(dispatcher.observer_count("x"), 0);
    }

    #[test]
    fn unregister_unknown_topic_or_handle_is_tolerated() {
        let mut dispatcher = TopicDispatcher::new();
        let (observer, _log) = recording_observer();
        dispatcher.unregister("never/registered", &observer);

        let (other, _other_log) = recording_observer();
        dispatcher.register("x", observer);
        dispatcher.unregister("x", &other);
        assert_eq!(dispatcher.observer_count("x"), 1);
    }

    #[test]
    fn exact_topic_match_only() {
        let mut dispatcher = TopicDispatcher::new();
        let (on_parent, parent_log) = recording_observer();
        let (on_exact, exact_log) = recording_observer();
        let (on_child, child_log) = recording_observer();
        dispatcher.register("a", on_parent);
        dispatcher.register("a/b", on_exact);
        dispatcher.register("a/b/c", on_child);

        dispatcher.dispatch(&MqttMessage::from_text("a/b", "payload"));

        assert!(parent_log.lock().unwrap().is_empty());
        assert_eq!(exact_log.lock().unwrap().len(), 1);
        assert!(child_log.lock().unwrap().is_empty());
    }

    #[test]
    fn dispatch_without_observers_is_a_no_op() {
        let dispatcher = TopicDispatcher::new();
        dispatcher.dispatch(&MqttMessage::from_text("nobody/home", "payload"));
    }

    #[test]
    fn delivery_follows_registration_order() {
        let mut dispatcher = TopicDispatcher::new();
        let order: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
        for tag in [1u8, 2, 3] {
            let order = Arc::clone(&order);
            let observer: ObserverHandle = Arc::new(move |_: &str, _: &str| {
                order.lock().unwrap().push(tag);
            });
            dispatcher.register("t", observer);
        }

        dispatcher.dispatch(&MqttMessage::from_text("t", "payload"));
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn panicking_observer_does_not_block_the_rest() {
        let mut dispatcher = TopicDispatcher::new();
        let faulty: ObserverHandle = Arc::new(|_: &str, _: &str| {
            panic!("observer bug");
        });
        let (observer, log) = recording_observer();
        dispatcher.register("t", faulty);
        dispatcher.register("t", observer);

        dispatcher.dispatch(&MqttMessage::from_text("t", "payload"));
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn undecodable_payload_is_dropped_not_delivered() {
        let mut dispatcher = TopicDispatcher::new();
        let (observer, log) = recording_observer();
        dispatcher.register("camera/frame", observer);

        dispatcher.dispatch(&MqttMessage::from_bytes("camera/frame", vec![0xff, 0xfe]));
        assert!(log.lock().unwrap().is_empty());
    }
}
