use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bus::Subscription;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Server-side state for one joined client.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    pub avatar: String,
    pub joined_at: DateTime<Utc>,
    outbox: Subscription,
}

impl Session {
    pub(crate) fn new(id: SessionId, name: String, avatar: String, outbox: Subscription) -> Self {
        Self {
            id,
            name,
            avatar,
            joined_at: Utc::now(),
            outbox,
        }
    }

    /// A session is live until its mailbox is closed.
    pub fn is_live(&self) -> bool {
        !self.outbox.is_closed()
    }

    pub(crate) fn outbox(&self) -> &Subscription {
        &self.outbox
    }

    pub fn presence(&self) -> OnlineUser {
        OnlineUser {
            name: self.name.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

/// One row of the online list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineUser {
    pub name: String,
    pub avatar: String,
}
