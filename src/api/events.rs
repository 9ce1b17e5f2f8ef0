//! Real-time transcript streaming via Server-Sent Events (SSE).
//!
//! Pipeline operations publish every transcript entry here; connected
//! SSE clients receive them live, and the CLI sees them on stdout.

use once_cell::sync::Lazy;
use tokio::sync::broadcast;

use crate::store::{ChatMessage, Role};

/// Global transcript broadcaster.
pub static EVENTS: Lazy<EventBroadcaster> = Lazy::new(EventBroadcaster::new);

/// Broadcasts transcript entries to all connected SSE clients.
pub struct EventBroadcaster {
    sender: broadcast::Sender<ChatMessage>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Send a transcript entry to all subscribers.
    pub fn publish(&self, message: &ChatMessage) {
        let prefix = match message.role {
            Role::User => "👤",
            Role::Assistant => "🤖",
            Role::System => "ℹ️ ",
            Role::Error => "❌",
        };
        println!("   {} {}", prefix, message.content);

        // Ignore if no receivers are connected
        let _ = self.sender.send(message.clone());
    }

    /// Get a receiver for SSE streaming.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatMessage> {
        self.sender.subscribe()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Publish a transcript entry to all subscribers.
pub fn publish(message: &ChatMessage) {
    EVENTS.publish(message);
}
