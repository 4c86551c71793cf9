use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::dm::Message;

/// Real-time fan-out. One room per conversation, one sender per connected
/// socket session; a user with three tabs open holds three sessions.
/// Membership is process-local and rebuilt from client joins, nothing
/// here is durable.
pub struct Hub {
    rooms: Mutex<HashMap<Uuid, HashMap<Uuid, UnboundedSender<String>>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Idempotent: joining a room twice keeps a single subscription.
    pub fn join(&self, session_id: Uuid, conversation_id: Uuid, tx: UnboundedSender<String>) {
        let mut rooms = self.rooms.lock().unwrap();
        rooms.entry(conversation_id).or_default().insert(session_id, tx);
    }

    /// Leaving a room the session never joined is a no-op.
    pub fn leave(&self, session_id: Uuid, conversation_id: Uuid) {
        let mut rooms = self.rooms.lock().unwrap();
        if let Some(room) = rooms.get_mut(&conversation_id) {
            room.remove(&session_id);
            if room.is_empty() {
                rooms.remove(&conversation_id);
            }
        }
    }

    /// Drops the session from every room; called when its socket closes.
    pub fn leave_all(&self, session_id: Uuid) {
        let mut rooms = self.rooms.lock().unwrap();
        rooms.retain(|_, room| {
            room.remove(&session_id);
            !room.is_empty()
        });
    }

    /// Best-effort delivery to every session joined to the conversation's
    /// room, pruning dead sessions on the way. Returns how many sessions
    /// the payload reached.
    pub fn publish(&self, conversation_id: Uuid, message: &Message) -> usize {
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!("could not encode push payload for {conversation_id}: {err}");
                return 0;
            }
        };

        let mut rooms = self.rooms.lock().unwrap();
        let Some(room) = rooms.get_mut(&conversation_id) else {
            return 0;
        };

        let mut delivered = 0;
        room.retain(|_, tx| match tx.send(payload.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(_) => false,
        });
        if room.is_empty() {
            rooms.remove(&conversation_id);
        }
        delivered
    }
}
