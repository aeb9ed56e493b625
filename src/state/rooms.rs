use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::dto::sse::ServerEvent;

/// Fan-out hub with one broadcast channel per committee room.
///
/// Publishing never waits on subscribers: a full channel overwrites the oldest
/// message and slow receivers observe a lag instead of stalling the sender.
pub struct RoomHub {
    rooms: DashMap<String, broadcast::Sender<ServerEvent>>,
    capacity: usize,
}

impl RoomHub {
    /// Construct a hub whose rooms buffer up to `capacity` events each.
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Register a new subscriber on the committee room, creating it if needed.
    pub fn subscribe(&self, room: &str) -> broadcast::Receiver<ServerEvent> {
        self.rooms
            .entry(room.to_owned())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Send an event to everyone in the room; returns how many subscribers got it.
    pub fn publish(&self, room: &str, event: ServerEvent) -> usize {
        let delivered = match self.rooms.get(room) {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => return 0,
        };

        if delivered == 0 {
            // Last subscriber left; drop the room unless someone re-joined meanwhile.
            self.rooms
                .remove_if(room, |_, sender| sender.receiver_count() == 0);
        }
        delivered
    }

    /// Number of live subscribers in a room.
    pub fn subscriber_count(&self, room: &str) -> usize {
        self.rooms
            .get(room)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;

    fn event(name: &str) -> ServerEvent {
        ServerEvent::new(Some(name.to_string()), "{}".to_string())
    }

    #[test]
    fn events_only_reach_their_room() {
        let hub = RoomHub::new(8);
        let mut c1 = hub.subscribe("c1");
        let mut c2 = hub.subscribe("c2");

        assert_eq!(hub.publish("c1", event("timer-started")), 1);

        assert_eq!(c1.try_recv().unwrap().event.as_deref(), Some("timer-started"));
        assert!(matches!(c2.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn publishing_without_subscribers_is_dropped() {
        let hub = RoomHub::new(8);
        assert_eq!(hub.publish("nobody", event("timer-update")), 0);
        assert_eq!(hub.rooms.len(), 0);
    }

    #[test]
    fn empty_rooms_are_released() {
        let hub = RoomHub::new(8);
        let receiver = hub.subscribe("c1");
        assert_eq!(hub.subscriber_count("c1"), 1);
        drop(receiver);

        assert_eq!(hub.publish("c1", event("timer-update")), 0);
        assert_eq!(hub.rooms.len(), 0);
    }

    #[test]
    fn slow_subscriber_lags_instead_of_blocking() {
        let hub = RoomHub::new(2);
        let mut slow = hub.subscribe("c1");
        for _ in 0..5 {
            hub.publish("c1", event("timer-update"));
        }
        assert!(matches!(slow.try_recv(), Err(TryRecvError::Lagged(_))));
    }
}
