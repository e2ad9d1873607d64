//! The persistence collaborator: who belongs to a chat, and which chats
//! a user belongs to.
//!
//! Only used to seed broker membership and connection subscriptions —
//! the relay performs no persistence I/O of its own.

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

/// A failed directory lookup. Broker creation that hits one of these is
/// abandoned and retried on the next event for the same chat.
#[derive(Debug)]
pub struct DirectoryError(pub String);

impl std::fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "directory lookup failed: {}", self.0)
    }
}

impl std::error::Error for DirectoryError {}

impl From<reqwest::Error> for DirectoryError {
    fn from(err: reqwest::Error) -> Self {
        Self(err.to_string())
    }
}

/// Membership queries answered by the chat service.
#[async_trait]
pub trait ChatDirectory: Send + Sync {
    /// All chats the user currently belongs to.
    async fn user_chats(&self, user_id: Uuid) -> Result<Vec<Uuid>, DirectoryError>;

    /// All users currently belonging to the chat.
    async fn chat_members(&self, chat_id: Uuid) -> Result<Vec<Uuid>, DirectoryError>;
}

/// Production implementation backed by the chat service's REST API.
#[derive(Clone)]
pub struct HttpChatDirectory {
    chat_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct UserChatsResponse {
    #[serde(rename = "chatIds")]
    chat_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
struct ChatMembersResponse {
    #[serde(rename = "userIds")]
    user_ids: Vec<Uuid>,
}

impl HttpChatDirectory {
    pub fn new(chat_url: &str) -> Self {
        Self {
            chat_url: chat_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChatDirectory for HttpChatDirectory {
    async fn user_chats(&self, user_id: Uuid) -> Result<Vec<Uuid>, DirectoryError> {
        let body: UserChatsResponse = self
            .http
            .get(format!("{}/api/v1/users/{user_id}/chats", self.chat_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body.chat_ids)
    }

    async fn chat_members(&self, chat_id: Uuid) -> Result<Vec<Uuid>, DirectoryError> {
        let body: ChatMembersResponse = self
            .http
            .get(format!("{}/api/v1/chats/{chat_id}/users", self.chat_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body.user_ids)
    }
}
