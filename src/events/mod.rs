//! Notification bus: typed publish/subscribe for run observers

mod run_log;

pub use run_log::{LogLevel, RunLog};

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};

/// Channel an event is published on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Human-readable log lines
    Console,
    /// Percentage progress, 0 to 100
    Progress,
    /// Terminal success/failure of a run
    Finish,
}

/// One notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Console(String),
    Progress(u8),
    Finish(bool),
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Event::Console(_) => Topic::Console,
            Event::Progress(_) => Topic::Progress,
            Event::Finish(_) => Topic::Finish,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Console(line) => f.write_str(line),
            Event::Progress(percent) => write!(f, "{}%", percent),
            Event::Finish(true) => f.write_str("finished successfully"),
            Event::Finish(false) => f.write_str("finished with errors"),
        }
    }
}

/// Listener callback; invoked on whichever thread publishes.
pub type Listener = dyn Fn(&Event) + Send + Sync;

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Registry of listeners keyed by topic.
///
/// Listeners run synchronously inside `publish`, outside of the registry lock,
/// so a listener may itself subscribe or unsubscribe.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(SubscriptionId, Topic, Arc<Listener>)>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for events of `topic`
    pub fn subscribe<F>(&self, topic: Topic, listener: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, topic, Arc::new(listener)));
        id
    }

    /// Remove a listener; `false` if the id was not registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _, _)| *existing != id);
        listeners.len() != before
    }

    /// Deliver `event` to every listener of its topic, in subscription order
    pub fn publish(&self, event: &Event) {
        let topic = event.topic();
        let targets: Vec<Arc<Listener>> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, listener_topic, _)| *listener_topic == topic)
            .map(|(_, _, listener)| Arc::clone(listener))
            .collect();

        for listener in targets {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder(bus: &EventBus, topic: Topic) -> (SubscriptionId, Arc<Mutex<Vec<Event>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = bus.subscribe(topic, move |event| {
            sink.lock().expect("lock events").push(event.clone());
        });
        (id, seen)
    }

    #[test]
    fn test_listeners_receive_only_their_topic() {
        let bus = EventBus::new();
        let (_, console) = recorder(&bus, Topic::Console);
        let (_, progress) = recorder(&bus, Topic::Progress);

        bus.publish(&Event::Console("hello".to_string()));
        bus.publish(&Event::Progress(42));
        bus.publish(&Event::Finish(true));

        assert_eq!(
            *console.lock().expect("lock"),
            vec![Event::Console("hello".to_string())]
        );
        assert_eq!(*progress.lock().expect("lock"), vec![Event::Progress(42)]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let (id, seen) = recorder(&bus, Topic::Finish);

        bus.publish(&Event::Finish(true));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(&Event::Finish(false));

        assert_eq!(*seen.lock().expect("lock"), vec![Event::Finish(true)]);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_listener_may_subscribe_while_publishing() {
        let bus = Arc::new(EventBus::new());
        let inner = Arc::clone(&bus);
        bus.subscribe(Topic::Console, move |_| {
            inner.subscribe(Topic::Progress, |_| {});
        });

        bus.publish(&Event::Console("first".to_string()));
        assert_eq!(bus.listener_count(), 2);
    }

    #[test]
    fn test_event_display() {
        assert_eq!(Event::Progress(7).to_string(), "7%");
        assert_eq!(Event::Console("line".to_string()).to_string(), "line");
        assert_eq!(Event::Finish(false).topic(), Topic::Finish);
    }
}
