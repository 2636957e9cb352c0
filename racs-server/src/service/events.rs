//! Event fan-out
//!
//! A single bus task multiplexes three control channels (register,
//! unregister, publish) over a map of subscriber sinks. Each sink is a
//! bounded channel; a subscriber that stops draining loses events rather
//! than stalling the bus, and a subscriber whose receiver is gone is pruned
//! on the next publish.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Capacity of each subscriber's sink.
const SINK_DEPTH: usize = 64;

struct Subscriber {
    id: u64,
    sink: mpsc::Sender<String>,
    /// Signalled once the bus has installed the sink, so a subscriber never
    /// misses events published right after [`EventBus::subscribe`] returns.
    ready: oneshot::Sender<()>,
}

/// Cloneable handle to the bus task.
#[derive(Clone)]
pub struct EventBus {
    publish: mpsc::Sender<String>,
    register: mpsc::Sender<Subscriber>,
    unregister: mpsc::Sender<u64>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    /// Spawn the bus loop and return its handle.
    pub fn start() -> EventBus {
        let (publish, mut publish_rx) = mpsc::channel::<String>(SINK_DEPTH);
        let (register, mut register_rx) = mpsc::channel::<Subscriber>(16);
        let (unregister, mut unregister_rx) = mpsc::channel::<u64>(16);

        tokio::spawn(async move {
            let mut sinks: HashMap<u64, mpsc::Sender<String>> = HashMap::new();
            loop {
                tokio::select! {
                    subscriber = register_rx.recv() => {
                        let Some(subscriber) = subscriber else { break };
                        debug!("Subscriber {} registered", subscriber.id);
                        sinks.insert(subscriber.id, subscriber.sink);
                        let _ = subscriber.ready.send(());
                    }
                    id = unregister_rx.recv() => {
                        let Some(id) = id else { break };
                        debug!("Subscriber {} unregistered", id);
                        sinks.remove(&id);
                    }
                    event = publish_rx.recv() => {
                        let Some(event) = event else { break };
                        let mut dead = Vec::new();
                        for (id, sink) in &sinks {
                            match sink.try_send(event.clone()) {
                                Ok(()) => {}
                                Err(TrySendError::Full(_)) => {
                                    warn!("Subscriber {} is slow, dropping event", id);
                                }
                                Err(TrySendError::Closed(_)) => dead.push(*id),
                            }
                        }
                        for id in dead {
                            sinks.remove(&id);
                        }
                    }
                }
            }
        });

        EventBus {
            publish,
            register,
            unregister,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Deliver an event record to every currently-registered subscriber.
    pub async fn publish(&self, event: serde_json::Value) {
        if self.publish.send(event.to_string()).await.is_err() {
            warn!("Event bus is gone, dropping event");
        }
    }

    /// Register a new subscriber; returns its id and the event stream once
    /// the bus has installed the sink.
    pub async fn subscribe(&self) -> (u64, mpsc::Receiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sink, events) = mpsc::channel(SINK_DEPTH);
        let (ready, registered) = oneshot::channel();
        if self.register.send(Subscriber { id, sink, ready }).await.is_err() {
            warn!("Event bus is gone, subscriber {} will see nothing", id);
        } else {
            let _ = registered.await;
        }
        (id, events)
    }

    /// Remove a subscriber. Safe to call from `Drop`; never blocks.
    pub fn unsubscribe(&self, id: u64) {
        let _ = self.unregister.try_send(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let bus = EventBus::start();
        let (_a, mut rx_a) = bus.subscribe().await;
        let (_b, mut rx_b) = bus.subscribe().await;

        bus.publish(json!({"event": "project/state", "id": 1, "state": "CLONING"}))
            .await;

        let got_a = rx_a.recv().await.unwrap();
        let got_b = rx_b.recv().await.unwrap();
        assert_eq!(got_a, got_b);
        assert!(got_a.contains("project/state"));
    }

    #[tokio::test]
    async fn test_publish_order_per_subscriber() {
        let bus = EventBus::start();
        let (_id, mut rx) = bus.subscribe().await;

        for n in 0..10 {
            bus.publish(json!({"event": "project/version", "id": 1, "version": n}))
                .await;
        }
        for n in 0..10 {
            let event = rx.recv().await.unwrap();
            assert!(event.contains(&format!("\"version\":{n}")), "event {event}");
        }
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::start();
        let (id, mut rx) = bus.subscribe().await;

        bus.unsubscribe(id);
        // The unregister races the publish; drain until the bus has seen it.
        loop {
            bus.publish(json!({"event": "tick"})).await;
            match tokio::time::timeout(std::time::Duration::from_millis(50), rx.recv()).await {
                Ok(Some(_)) => continue,
                _ => break,
            }
        }
    }

    #[tokio::test]
    async fn test_dead_subscriber_does_not_stall_the_bus() {
        let bus = EventBus::start();
        let (_dead, rx_dead) = bus.subscribe().await;
        drop(rx_dead);
        let (_live, mut rx_live) = bus.subscribe().await;

        bus.publish(json!({"event": "one"})).await;
        bus.publish(json!({"event": "two"})).await;

        assert!(rx_live.recv().await.unwrap().contains("one"));
        assert!(rx_live.recv().await.unwrap().contains("two"));
    }
}
