//! Process-wide chat state shared by every connection.

use std::sync::Arc;

use crate::bus::{BroadcastBus, Inbox};
use crate::config::ChatConfig;
use crate::presence::PresenceTracker;
use crate::registry::SessionRegistry;
use crate::websocket::Connection;

#[derive(Debug)]
pub struct ChatHub {
    pub registry: Arc<SessionRegistry>,
    pub bus: Arc<BroadcastBus>,
    pub presence: Arc<PresenceTracker>,
    pub chat: ChatConfig,
}

impl ChatHub {
    pub fn new(chat: ChatConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let bus = Arc::new(BroadcastBus::new(registry.clone(), chat.queue_capacity));
        let presence = Arc::new(PresenceTracker::new(registry.clone(), bus.clone()));
        Self {
            registry,
            bus,
            presence,
            chat,
        }
    }

    /// Starts a connection in the `Unjoined` state together with its inbound stream.
    pub fn open(self: &Arc<Self>) -> (Connection, Inbox) {
        let (subscription, inbox) = self.bus.subscribe();
        (Connection::new(self.clone(), subscription), inbox)
    }

    pub async fn online_count(&self) -> usize {
        self.registry.len().await
    }
}
