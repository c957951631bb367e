use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub: one channel per space, fed with every applied event. Hosts
/// watch their own spaces for incoming requests; dashboards watch bookings
/// move. Slow subscribers lag and drop, they never block the engine.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl NotifyHub {
    pub fn new() -> Self {
        Self { channels: DashMap::new() }
    }

    /// Subscribe to a space's events. Creates the channel if needed.
    pub fn subscribe(&self, space_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(space_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send an event. No-op if nobody is listening.
    pub fn send(&self, space_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&space_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Remove a space's channel once the space is gone.
    pub fn remove(&self, space_id: &Ulid) {
        self.channels.remove(space_id);
    }
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BookingStatus, Event};

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let space_id = Ulid::new();
        let mut rx = hub.subscribe(space_id);

        let event = Event::BookingTransitioned {
            id: Ulid::new(),
            space_id,
            to: BookingStatus::Confirmed,
            at: 1_000,
            reserved_until: None,
            reason: None,
        };
        hub.send(space_id, &event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        let space_id = Ulid::new();
        hub.send(space_id, &Event::SpaceRemoved { id: space_id });
    }

    #[tokio::test]
    async fn channels_are_per_space() {
        let hub = NotifyHub::new();
        let a = Ulid::new();
        let b = Ulid::new();
        let mut rx_a = hub.subscribe(a);
        let _rx_b = hub.subscribe(b);

        hub.send(b, &Event::SpaceRemoved { id: b });
        hub.send(a, &Event::SpaceRemoved { id: a });

        let received = rx_a.recv().await.unwrap();
        assert_eq!(received, Event::SpaceRemoved { id: a });
    }
}
