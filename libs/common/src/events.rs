//! Event contracts shared between domain-event producers and the relay
//! service.
//!
//! Producers (the chat and message services) serialize these onto the
//! `chat` and `message` queue subjects; the relay deserializes them and
//! fans them out to connected clients wrapped in an [`Envelope`]. The
//! serde renames below are the wire format — changing them is a breaking
//! protocol change for every producer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chat-level mutation, published on the `chat` subject.
///
/// The meaning of `users` depends on the action: the users added for
/// [`ChatAction::AddUsers`], the users removed for
/// [`ChatAction::DeleteUsers`], and empty for whole-chat actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    pub action: ChatAction,
    #[serde(rename = "chatId")]
    pub chat_id: Uuid,
    #[serde(default)]
    pub users: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatAction {
    #[serde(rename = "newChat")]
    NewChat,
    #[serde(rename = "updateChat")]
    UpdateChat,
    #[serde(rename = "deleteChat")]
    DeleteChat,
    /// Remove the listed users from the chat.
    #[serde(rename = "delUsers")]
    DeleteUsers,
    /// Add the listed users to the chat.
    #[serde(rename = "addUsers")]
    AddUsers,
    /// Internal bootstrap event: a user's connection came online and
    /// should be tracked by this chat's broker. Never published on the
    /// queue by producers.
    #[serde(rename = "addWebSocketUser")]
    AddWebSocketUser,
    /// Outbound-only variant delivered to a user who was just removed
    /// from the chat.
    #[serde(rename = "userRemoved")]
    UserRemoved,
}

impl ChatEvent {
    /// The "you were removed" notice sent to evicted users in place of
    /// the generic [`ChatAction::DeleteUsers`] broadcast.
    pub fn removal_notice(chat_id: Uuid) -> Self {
        Self {
            action: ChatAction::UserRemoved,
            chat_id,
            users: Vec::new(),
        }
    }
}

/// A message-level mutation, published on the `message` subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub action: MessageAction,
    #[serde(rename = "payload")]
    pub message: MessagePayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageAction {
    #[serde(rename = "newMessage")]
    NewMessage,
    #[serde(rename = "updateMessage")]
    UpdateMessage,
    #[serde(rename = "deleteMessage")]
    DeleteMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(rename = "messageId")]
    pub message_id: Uuid,
    #[serde(rename = "authorID")]
    pub author_id: Uuid,
    pub text: String,
    #[serde(rename = "datetime")]
    pub sent_at: DateTime<Utc>,
    #[serde(rename = "chatId")]
    pub chat_id: Uuid,
    #[serde(rename = "isRedacted", default)]
    pub is_redacted: bool,
}

/// The unit delivered to a client socket: one JSON document per
/// WebSocket text frame, tagged with the event family it wraps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "messageType", content = "payload", rename_all = "lowercase")]
pub enum Envelope {
    Chat(ChatEvent),
    Message(MessageEvent),
}
