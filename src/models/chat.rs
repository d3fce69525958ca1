use chrono::Utc;
use serde::{ Serialize, Deserialize };
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

const THREAD_LABEL_LEN: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversationError {
    #[error("Unknown message role: '{0}'")]
    UnknownRole(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ConversationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(ConversationError::UnknownRole(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: i64,
}

/// One logical conversation with the remote agent.
///
/// The thread id groups turns server-side; the parent message id chains each
/// request to the last assistant turn the server reported. Only
/// [`Conversation::record_parent`] changes the parent id, and callers feed it
/// from agent replies only.
#[derive(Clone, Debug, Serialize)]
pub struct Conversation {
    thread_id: String,
    parent_message_id: Option<String>,
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn start() -> Self {
        Self {
            thread_id: Uuid::new_v4().to_string(),
            parent_message_id: None,
            messages: Vec::new(),
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// Thread id shortened for display, e.g. `1b4e28ba...`.
    pub fn short_thread_id(&self) -> String {
        let prefix: String = self.thread_id.chars().take(THREAD_LABEL_LEN).collect();
        format!("{}...", prefix)
    }

    pub fn parent_message_id(&self) -> Option<&str> {
        self.parent_message_id.as_deref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Appends a message whose role arrives as text. Anything other than
    /// `user` or `assistant` is rejected and the history is left untouched.
    pub fn append(
        &mut self,
        role: &str,
        content: impl Into<String>
    ) -> Result<&ChatMessage, ConversationError> {
        let role = role.parse::<Role>()?;
        Ok(self.push(role, content))
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) -> &ChatMessage {
        self.messages.push(ChatMessage {
            role,
            content: content.into(),
            timestamp: Utc::now().timestamp(),
        });
        &self.messages[self.messages.len() - 1]
    }

    pub fn record_parent(&mut self, message_id: Option<&str>) {
        match message_id {
            Some(id) if !id.is_empty() => {
                self.parent_message_id = Some(id.to_string());
            }
            _ => {}
        }
    }

    /// Discards the whole history and starts over on a new thread.
    pub fn clear(&mut self) {
        *self = Conversation::start();
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::start()
    }
}
