use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bus::{Message, MessageDraft, Subscription};
use crate::error::{ChatError, ValidationField};
use crate::hub::ChatHub;
use crate::registry::SessionId;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    #[serde(rename = "join")]
    Join {
        name: String,
        #[serde(default)]
        avatar: Option<usize>,
    },
    #[serde(rename = "send")]
    Send { text: String },
    #[serde(rename = "change_avatar")]
    ChangeAvatar { avatar: usize },
    #[serde(rename = "leave")]
    Leave,
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "pong")]
    Pong,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    #[serde(rename = "welcome")]
    Welcome { avatars: Vec<String> },
    #[serde(rename = "joined")]
    Joined { session_id: SessionId, name: String, avatar: String },
    #[serde(rename = "event")]
    Event { message: Message },
    #[serde(rename = "error")]
    Error {
        code: String,
        field: Option<ValidationField>,
        message: String,
    },
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "pong")]
    Pong,
}

impl ServerMessage {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.to_string(),
            field: None,
            message: message.into(),
        }
    }
}

impl From<&ChatError> for ServerMessage {
    fn from(err: &ChatError) -> Self {
        ServerMessage::Error {
            code: err.code().to_string(),
            field: err.field(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unjoined,
    Joining,
    Joined,
    Closed,
}

#[derive(Debug)]
struct JoinedAs {
    name: String,
    avatar: String,
}

/// Per-client state machine: `Unjoined -> Joining -> Joined -> Closed`.
///
/// Owns one session id and one mailbox subscription for its whole life.
/// Both are released on `leave`, or from `Drop` if the handler dies first.
pub struct Connection {
    id: Uuid,
    session_id: SessionId,
    hub: Arc<ChatHub>,
    subscription: Subscription,
    state: ConnectionState,
    joined: Option<JoinedAs>,
    // Set while the registry may hold an entry for `session_id`.
    may_be_registered: bool,
    released: bool,
}

impl Connection {
    pub(crate) fn new(hub: Arc<ChatHub>, subscription: Subscription) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: SessionId::new(),
            hub,
            subscription,
            state: ConnectionState::Unjoined,
            joined: None,
            may_be_registered: false,
            released: false,
        }
    }

    pub async fn join(&mut self, name: &str, avatar: Option<usize>) -> Result<SessionId, ChatError> {
        match self.state {
            ConnectionState::Closed => return Err(ChatError::ConnectionClosed),
            ConnectionState::Joining | ConnectionState::Joined => return Err(ChatError::AlreadyJoined),
            ConnectionState::Unjoined => {}
        }

        let avatar = self.validate_join(name, avatar).map_err(|field| {
            debug!("Rejected join on connection {}: {}", self.id, field);
            ChatError::Validation(field)
        })?;

        self.state = ConnectionState::Joining;
        self.may_be_registered = true;
        let joined = self
            .hub
            .presence
            .join(self.session_id, name, avatar.clone(), self.subscription.clone())
            .await;

        match joined {
            Ok(session_id) => {
                self.state = ConnectionState::Joined;
                self.joined = Some(JoinedAs {
                    name: name.trim().to_string(),
                    avatar,
                });
                info!("Connection {} joined as session {}", self.id, session_id);
                Ok(session_id)
            }
            Err(e) => {
                self.state = ConnectionState::Unjoined;
                self.may_be_registered = false;
                Err(e)
            }
        }
    }

    fn validate_join(&self, name: &str, avatar: Option<usize>) -> Result<String, ValidationField> {
        if name.trim().is_empty() {
            return Err(ValidationField::BlankName);
        }
        let index = avatar.ok_or(ValidationField::NoAvatarSelected)?;
        self.lookup_avatar(index)
    }

    fn lookup_avatar(&self, index: usize) -> Result<String, ValidationField> {
        self.hub
            .chat
            .avatar(index)
            .map(str::to_string)
            .ok_or(ValidationField::UnknownAvatar)
    }

    /// Publishes a chat line. Blank text is ignored and yields `Ok(None)`.
    pub async fn send(&mut self, text: &str) -> Result<Option<Arc<Message>>, ChatError> {
        let author = self.joined_session()?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        if text.chars().count() > self.hub.chat.max_message_chars {
            return Err(ValidationField::MessageTooLong.into());
        }

        let draft = MessageDraft::chat(author.name.clone(), text, Some(author.avatar.clone()));
        Ok(Some(self.hub.bus.publish(draft).await))
    }

    pub async fn change_avatar(&mut self, index: usize) -> Result<(), ChatError> {
        self.joined_session()?;
        let avatar = self.lookup_avatar(index)?;
        self.hub
            .presence
            .change_avatar(&self.session_id, avatar.clone())
            .await?;
        if let Some(joined) = self.joined.as_mut() {
            joined.avatar = avatar;
        }
        Ok(())
    }

    /// Moves to `Closed` and releases the session. Safe to call repeatedly.
    pub async fn leave(&mut self) {
        if self.released {
            return;
        }
        self.state = ConnectionState::Closed;
        self.subscription.close();
        if self.may_be_registered {
            self.hub.bus.unsubscribe(&self.session_id).await;
            self.hub.presence.leave(&self.session_id).await;
            self.may_be_registered = false;
        }
        self.joined = None;
        self.released = true;
        info!("Connection {} closed", self.id);
    }

    /// Applies one client request and returns the direct reply, if any.
    pub async fn handle(&mut self, request: ClientMessage) -> Option<ServerMessage> {
        let result = match request {
            ClientMessage::Join { name, avatar } => match self.join(&name, avatar).await {
                Ok(session_id) => {
                    let joined = self.joined.as_ref()?;
                    return Some(ServerMessage::Joined {
                        session_id,
                        name: joined.name.clone(),
                        avatar: joined.avatar.clone(),
                    });
                }
                Err(e) => Err(e),
            },
            ClientMessage::Send { text } => self.send(&text).await.map(|_| ()),
            ClientMessage::ChangeAvatar { avatar } => self.change_avatar(avatar).await,
            ClientMessage::Leave => {
                self.leave().await;
                Ok(())
            }
            ClientMessage::Ping => return Some(ServerMessage::Pong),
            ClientMessage::Pong => Ok(()),
        };

        match result {
            Ok(()) => None,
            Err(e) => {
                warn!("Request on connection {} failed: {}", self.id, e);
                Some(ServerMessage::from(&e))
            }
        }
    }

    fn joined_session(&self) -> Result<&JoinedAs, ChatError> {
        match self.state {
            ConnectionState::Closed => Err(ChatError::ConnectionClosed),
            ConnectionState::Joined => self.joined.as_ref().ok_or(ChatError::NotJoined),
            _ => Err(ChatError::NotJoined),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn session_id(&self) -> Option<SessionId> {
        (self.state == ConnectionState::Joined).then_some(self.session_id)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.subscription.close();
        if !self.may_be_registered {
            return;
        }

        let presence = self.hub.presence.clone();
        let session_id = self.session_id;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                warn!(
                    "Connection {} dropped without leaving, releasing session {}",
                    self.id, session_id
                );
                runtime.spawn(async move {
                    presence.leave(&session_id).await;
                });
            }
            Err(_) => {
                warn!("No runtime to release session {} of connection {}", session_id, self.id);
            }
        }
    }
}
