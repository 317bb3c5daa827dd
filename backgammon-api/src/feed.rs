//! Per-room change notification.
//!
//! One broadcast channel per room, created on first subscription and
//! removed when its last [`Subscription`] drops. Delivery is best effort: a
//! subscriber that falls behind re-reads the room instead of replaying what
//! it missed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast::{self, error::RecvError};

use crate::RoomView;

pub struct Feed {
    capacity: usize,
    rooms: Mutex<HashMap<String, broadcast::Sender<RoomView>>>,
}

impl Feed {
    pub fn new(capacity: usize) -> Self {
        Feed {
            capacity: capacity.max(1),
            rooms: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(self: &Arc<Self>, code: &str) -> Subscription {
        let mut rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        let receiver = rooms
            .entry(code.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        Subscription {
            feed: Arc::clone(self),
            code: code.to_string(),
            receiver: Some(receiver),
        }
    }

    /// Push a new record to the room's subscribers. Returns how many got it.
    pub fn publish(&self, view: RoomView) -> usize {
        let rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        match rooms.get(&view.code) {
            Some(sender) => sender.send(view).unwrap_or(0),
            None => 0,
        }
    }

    /// Drop the room's channel if nobody listens any more.
    fn release(&self, code: &str) {
        let mut rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        if rooms.get(code).is_some_and(|sender| sender.receiver_count() == 0) {
            rooms.remove(code);
        }
    }

    #[cfg(test)]
    pub fn channels(&self) -> usize {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// A live subscription to one room.
pub struct Subscription {
    feed: Arc<Feed>,
    code: String,
    receiver: Option<broadcast::Receiver<RoomView>>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Result<RoomView, RecvError> {
        match self.receiver.as_mut() {
            Some(receiver) => receiver.recv().await,
            None => Err(RecvError::Closed),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // The receiver has to go first so the count below no longer sees it.
        drop(self.receiver.take());
        self.feed.release(&self.code);
    }
}
