use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::OnlineUser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    Chat,
    JoinNotice,
    LeaveNotice,
    PresenceUpdate,
}

/// A published message. Shared between subscribers as `Arc<Message>` and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Global publish order, identical for every subscriber.
    pub seq: u64,
    pub kind: MessageKind,
    pub author: String,
    pub text: String,
    pub avatar: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Online list right after the mutation, present on presence kinds only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online: Option<Vec<OnlineUser>>,
}

/// Message contents before the bus assigns sequence and timestamp.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    kind: MessageKind,
    author: String,
    text: String,
    avatar: Option<String>,
    online: Option<Vec<OnlineUser>>,
}

impl MessageDraft {
    pub fn chat(author: impl Into<String>, text: impl Into<String>, avatar: Option<String>) -> Self {
        Self {
            kind: MessageKind::Chat,
            author: author.into(),
            text: text.into(),
            avatar,
            online: None,
        }
    }

    pub fn presence(kind: MessageKind, user: &OnlineUser, online: Vec<OnlineUser>) -> Self {
        let text = match kind {
            MessageKind::JoinNotice => format!("{} has joined the chat.", user.name),
            MessageKind::LeaveNotice => format!("{} has left the chat.", user.name),
            _ => format!("{} changed their avatar.", user.name),
        };
        Self {
            kind,
            author: user.name.clone(),
            text,
            avatar: Some(user.avatar.clone()),
            online: Some(online),
        }
    }

    pub(crate) fn seal(self, seq: u64, timestamp: DateTime<Utc>) -> Message {
        Message {
            seq,
            kind: self.kind,
            author: self.author,
            text: self.text,
            avatar: self.avatar,
            timestamp,
            online: self.online,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(serde_json::to_string(&MessageKind::JoinNotice).unwrap(), "\"join-notice\"");
        assert_eq!(serde_json::to_string(&MessageKind::PresenceUpdate).unwrap(), "\"presence-update\"");
    }

    #[test]
    fn test_presence_draft_text() {
        let alice = OnlineUser { name: "alice".into(), avatar: "a.png".into() };
        let message = MessageDraft::presence(MessageKind::JoinNotice, &alice, vec![alice.clone()])
            .seal(7, Utc::now());

        assert_eq!(message.text, "alice has joined the chat.");
        assert_eq!(message.seq, 7);
        assert_eq!(message.online.as_deref(), Some(&[alice][..]));

        let json = serde_json::to_value(
            MessageDraft::chat("alice", "hi", None).seal(8, Utc::now()),
        ).unwrap();
        assert!(json.get("online").is_none());
        assert_eq!(json["kind"], "chat");
    }
}
