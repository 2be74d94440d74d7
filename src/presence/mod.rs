//! Presence tracking for the chat server
//!
//! Every effective registry mutation goes through here and is followed by
//! exactly one notice carrying the new online list.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::bus::{BroadcastBus, Message, MessageDraft, MessageKind, Subscription};
use crate::error::ChatError;
use crate::registry::{OnlineUser, SessionId, SessionRegistry};

#[derive(Debug)]
pub struct PresenceTracker {
    registry: Arc<SessionRegistry>,
    bus: Arc<BroadcastBus>,
    // Held across mutation and publish so notices leave in mutation order.
    gate: Mutex<()>,
}

impl PresenceTracker {
    pub fn new(registry: Arc<SessionRegistry>, bus: Arc<BroadcastBus>) -> Self {
        Self {
            registry,
            bus,
            gate: Mutex::new(()),
        }
    }

    pub async fn join(
        &self,
        id: SessionId,
        name: &str,
        avatar: String,
        outbox: Subscription,
    ) -> Result<SessionId, ChatError> {
        let _gate = self.gate.lock().await;
        let id = self.registry.register_as(id, name, avatar, outbox).await?;
        if let Some(user) = self.registry.get(&id).await {
            self.announce(MessageKind::JoinNotice, &user).await;
            info!("'{}' joined the chat", user.name);
        }
        Ok(id)
    }

    /// Returns false when the session was already gone; nothing is published then.
    pub async fn leave(&self, id: &SessionId) -> bool {
        let _gate = self.gate.lock().await;
        let Some(session) = self.registry.unregister(id).await else {
            return false;
        };
        session.outbox().close();
        self.announce(MessageKind::LeaveNotice, &session.presence()).await;
        info!("'{}' left the chat", session.name);
        true
    }

    /// Re-selecting the current avatar changes nothing and publishes nothing.
    pub async fn change_avatar(&self, id: &SessionId, avatar: String) -> Result<(), ChatError> {
        let _gate = self.gate.lock().await;
        let before = self.registry.revision().await;
        self.registry.update_avatar(id, avatar).await?;
        if self.registry.revision().await != before {
            if let Some(user) = self.registry.get(id).await {
                self.announce(MessageKind::PresenceUpdate, &user).await;
            }
        }
        Ok(())
    }

    pub async fn online(&self) -> Vec<OnlineUser> {
        self.registry.list_sessions().await
    }

    async fn announce(&self, kind: MessageKind, user: &OnlineUser) -> Arc<Message> {
        let online = self.registry.list_sessions().await;
        self.bus.publish(MessageDraft::presence(kind, user, online)).await
    }
}
