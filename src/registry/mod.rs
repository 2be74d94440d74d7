//! Session registry for the chat server
//!
//! Owns every joined session, enforces display-name uniqueness and keeps
//! join order for the online list.

mod session;

pub use session::{OnlineUser, Session, SessionId};

use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::bus::Subscription;
use crate::error::{ChatError, ValidationField};

#[derive(Debug, Default)]
pub(crate) struct RegistryState {
    sessions: HashMap<SessionId, Session>,
    join_order: Vec<SessionId>,
    names: HashMap<String, SessionId>,
    revision: u64,
}

impl RegistryState {
    fn online(&self) -> Vec<OnlineUser> {
        self.join_order
            .iter()
            .filter_map(|id| self.sessions.get(id))
            .map(Session::presence)
            .collect()
    }
}

/// Point-in-time copy of the online list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceSnapshot {
    pub revision: u64,
    pub online: Vec<OnlineUser>,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    state: RwLock<RegistryState>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(
        &self,
        name: &str,
        avatar: String,
        outbox: Subscription,
    ) -> Result<SessionId, ChatError> {
        self.register_as(SessionId::new(), name, avatar, outbox).await
    }

    /// Registers under an id the caller allocated up front, so it can still
    /// clean up if it is cancelled while the call is in flight.
    pub async fn register_as(
        &self,
        id: SessionId,
        name: &str,
        avatar: String,
        outbox: Subscription,
    ) -> Result<SessionId, ChatError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationField::BlankName.into());
        }

        let mut state = self.state.write().await;
        if state.sessions.contains_key(&id) {
            return Err(ChatError::AlreadyJoined);
        }
        if state.names.contains_key(name) {
            debug!("Rejected join for taken name '{}'", name);
            return Err(ChatError::NameTaken(name.to_string()));
        }

        state.names.insert(name.to_string(), id);
        state.join_order.push(id);
        state.sessions.insert(id, Session::new(id, name.to_string(), avatar, outbox));
        state.revision += 1;

        info!("Registered session {} as '{}'", id, name);
        Ok(id)
    }

    /// Removes the session and returns it. Unknown ids are a no-op.
    pub async fn unregister(&self, id: &SessionId) -> Option<Session> {
        let mut state = self.state.write().await;
        let session = state.sessions.remove(id)?;
        state.names.remove(&session.name);
        state.join_order.retain(|joined| joined != id);
        state.revision += 1;

        info!("Unregistered session {} ('{}')", id, session.name);
        Some(session)
    }

    pub async fn update_avatar(&self, id: &SessionId, avatar: String) -> Result<(), ChatError> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(id)
            .ok_or(ChatError::UnknownSession(*id))?;
        if session.avatar == avatar {
            return Ok(());
        }
        session.avatar = avatar;
        state.revision += 1;
        Ok(())
    }

    pub async fn list_sessions(&self) -> Vec<OnlineUser> {
        self.state.read().await.online()
    }

    pub async fn snapshot(&self) -> PresenceSnapshot {
        let state = self.state.read().await;
        PresenceSnapshot {
            revision: state.revision,
            online: state.online(),
        }
    }

    pub async fn revision(&self) -> u64 {
        self.state.read().await.revision
    }

    pub async fn get(&self, id: &SessionId) -> Option<OnlineUser> {
        self.state.read().await.sessions.get(id).map(Session::presence)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Mailboxes of every live session, in join order.
    pub(crate) async fn recipients(&self) -> Vec<Subscription> {
        let state = self.state.read().await;
        state
            .join_order
            .iter()
            .filter_map(|id| state.sessions.get(id))
            .filter(|session| session.is_live())
            .map(|session| session.outbox().clone())
            .collect()
    }

    pub(crate) async fn outbox(&self, id: &SessionId) -> Option<Subscription> {
        self.state
            .read()
            .await
            .sessions
            .get(id)
            .map(|session| session.outbox().clone())
    }

    /// Blocks every registry mutation until the guard is dropped.
    #[cfg(test)]
    pub(crate) async fn hold(&self) -> tokio::sync::RwLockWriteGuard<'_, RegistryState> {
        self.state.write().await
    }
}
