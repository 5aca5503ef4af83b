//! In-process publish/subscribe fan-out, keyed by `simulation_id`.
//!
//! One [`EventBus`] instance is shared by every task handler and every
//! live WebSocket connection in the process. It owns nothing durable —
//! restarting the process drops all subscribers, which is fine since
//! single-instance fan-out is acceptable for this engine's scope —
//! horizontal/process-restart fan-out is not a goal here.
//!
//! Subscribers hold only a receiving half of a bounded channel; a slow
//! subscriber that lets its buffer fill is evicted on the next publish
//! rather than allowed to block the publisher.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::event::Event;

/// Per-subscriber buffer depth. Slow subscribers are dropped rather than
/// letting the publisher block on a full channel.
const SUBSCRIBER_BUFFER: usize = 256;

struct Subscriber {
    id: u64,
    sender: mpsc::Sender<Event>,
}

/// A handle to an open subscription. Dropping it (or calling
/// [`EventBus::unsubscribe`] explicitly) removes the subscriber from the
/// registry on the next publish pass for that `sim_id`.
pub struct Subscription {
    pub simulation_id: String,
    pub id: u64,
    pub receiver: mpsc::Receiver<Event>,
}

#[derive(Default)]
pub struct EventBus {
    subscribers: DashMap<String, Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(EventBus::default())
    }

    /// Registers a new subscriber for `sim_id` and returns its receiving
    /// half plus an id usable with [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe(&self, simulation_id: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .entry(simulation_id.to_string())
            .or_insert_with(Vec::new)
            .push(Subscriber { id, sender: tx });
        Subscription {
            simulation_id: simulation_id.to_string(),
            id,
            receiver: rx,
        }
    }

    /// Explicitly removes a subscriber. Harmless to call more than once,
    /// or for a subscriber that already evicted itself by disconnecting.
    pub fn unsubscribe(&self, simulation_id: &str, id: u64) {
        if let Some(mut subs) = self.subscribers.get_mut(simulation_id) {
            subs.retain(|s| s.id != id);
        }
    }

    /// Delivers `events` to every current subscriber of `simulation_id`,
    /// in order. Subscribers whose buffer is full or whose receiver has
    /// been dropped are evicted; this never fails the publisher.
    pub fn publish(&self, simulation_id: &str, events: &[Event]) {
        if events.is_empty() {
            return;
        }
        let Some(mut subs) = self.subscribers.get_mut(simulation_id) else {
            return;
        };
        subs.retain(|sub| {
            for event in events {
                if sub.sender.try_send(event.clone()).is_err() {
                    return false;
                }
            }
            true
        });
    }

    /// Number of live subscribers for a simulation (for tests/diagnostics).
    pub fn subscriber_count(&self, simulation_id: &str) -> usize {
        self.subscribers
            .get(simulation_id)
            .map(|s| s.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    #[tokio::test]
    async fn publish_delivers_in_order_to_subscriber() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("sim-1");

        let events = vec![
            Event::new(
                "sim-1",
                EventKind::Log {
                    message: "first".into(),
                    level: "info".into(),
                },
            ),
            Event::new(
                "sim-1",
                EventKind::Log {
                    message: "second".into(),
                    level: "info".into(),
                },
            ),
        ];
        bus.publish("sim-1", &events);

        let first = sub.receiver.recv().await.unwrap();
        let second = sub.receiver.recv().await.unwrap();
        assert_eq!(first.type_str(), "log");
        match first.kind {
            EventKind::Log { message, .. } => assert_eq!(message, "first"),
            _ => panic!("wrong kind"),
        }
        match second.kind {
            EventKind::Log { message, .. } => assert_eq!(message, "second"),
            _ => panic!("wrong kind"),
        }
    }

    #[tokio::test]
    async fn publish_to_unknown_sim_is_a_silent_no_op() {
        let bus = EventBus::new();
        bus.publish(
            "no-subscribers",
            &[Event::new(
                "no-subscribers",
                EventKind::SimulationEnded {
                    message: "done".into(),
                },
            )],
        );
    }

    #[tokio::test]
    async fn dropped_receiver_is_evicted_on_next_publish() {
        let bus = EventBus::new();
        let sub = bus.subscribe("sim-2");
        drop(sub.receiver);

        bus.publish(
            "sim-2",
            &[Event::new(
                "sim-2",
                EventKind::SimulationEnded {
                    message: "done".into(),
                },
            )],
        );
        assert_eq!(bus.subscriber_count("sim-2"), 0);
    }

    #[tokio::test]
    async fn unsubscribe_removes_the_named_subscriber() {
        let bus = EventBus::new();
        let sub_a = bus.subscribe("sim-3");
        let _sub_b = bus.subscribe("sim-3");
        assert_eq!(bus.subscriber_count("sim-3"), 2);
        bus.unsubscribe("sim-3", sub_a.id);
        assert_eq!(bus.subscriber_count("sim-3"), 1);
    }
}
