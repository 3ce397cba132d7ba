//! Conversation messages shared by every participant of a group chat.
//!
//! A [`ChatMessage`] is immutable once it has been appended to a
//! [`History`](crate::history::History): all fields are private and exposed via
//! accessors, and the only mutators are consuming builder methods used while the
//! message is being assembled by an agent.
//!
//! # Example
//!
//! ```
//! use agora::message::{AuthorRole, ChatMessage, ContentItem};
//!
//! let seed = ChatMessage::user("Teams issue: frequent disconnections during video calls.");
//! assert_eq!(seed.role(), AuthorRole::User);
//! assert!(seed.author_id().is_none());
//!
//! let reply = ChatMessage::from_agent("master", "MasterAgent", "SUCCESS")
//!     .with_item(ContentItem::FileReference { file_ref: "kb-42".into() })
//!     .with_metadata("confidence", 0.9);
//! assert_eq!(reply.author_id(), Some("master"));
//! assert_eq!(reply.items().len(), 1);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthorRole {
    /// The human (or application) that seeded the conversation.
    User,
    /// A participant of the group.
    Agent,
    /// Out-of-band directives, e.g. agent instructions.
    System,
}

impl fmt::Display for AuthorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthorRole::User => write!(f, "user"),
            AuthorRole::Agent => write!(f, "agent"),
            AuthorRole::System => write!(f, "system"),
        }
    }
}

/// Non-text payloads carried alongside a message's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    Text { text: String },
    /// A quoted span that cites a file.
    Annotation { quote: String, file_ref: String },
    FileReference { file_ref: String },
    /// Either a URI or an inline `data:` URI.
    Image { source: String },
    FunctionCall { call_id: String },
    FunctionResult { call_id: String },
}

/// A single, immutable unit of conversation.
///
/// Deserialization enforces the same invariant as the constructors: a
/// [`AuthorRole::User`] message never carries an author id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawChatMessage")]
pub struct ChatMessage {
    role: AuthorRole,
    author_id: Option<String>,
    author_name: Option<String>,
    content: Option<Arc<str>>,
    items: Vec<ContentItem>,
    metadata: HashMap<String, serde_json::Value>,
    created_at: DateTime<Utc>,
}

/// Wire shape of [`ChatMessage`], validated before conversion.
#[derive(Deserialize)]
struct RawChatMessage {
    role: AuthorRole,
    author_id: Option<String>,
    author_name: Option<String>,
    content: Option<Arc<str>>,
    items: Vec<ContentItem>,
    metadata: HashMap<String, serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl TryFrom<RawChatMessage> for ChatMessage {
    type Error = String;

    fn try_from(raw: RawChatMessage) -> Result<Self, Self::Error> {
        if raw.role == AuthorRole::User && raw.author_id.is_some() {
            return Err("user messages must not carry an author_id".to_string());
        }
        Ok(Self {
            role: raw.role,
            author_id: raw.author_id,
            author_name: raw.author_name,
            content: raw.content,
            items: raw.items,
            metadata: raw.metadata,
            created_at: raw.created_at,
        })
    }
}

impl ChatMessage {
    fn build(
        role: AuthorRole,
        author_id: Option<String>,
        author_name: Option<String>,
        content: Option<Arc<str>>,
    ) -> Self {
        Self {
            role,
            author_id,
            author_name,
            content,
            items: Vec::new(),
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    /// A message from the human user. User messages never carry an author id.
    pub fn user(content: impl Into<String>) -> Self {
        Self::build(AuthorRole::User, None, None, Some(Arc::from(content.into())))
    }

    /// A system directive with no author attribution.
    pub fn system(content: impl Into<String>) -> Self {
        Self::build(
            AuthorRole::System,
            None,
            None,
            Some(Arc::from(content.into())),
        )
    }

    /// A message attributed to the agent `agent_id` (display name `agent_name`).
    pub fn from_agent(
        agent_id: impl Into<String>,
        agent_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::build(
            AuthorRole::Agent,
            Some(agent_id.into()),
            Some(agent_name.into()),
            Some(Arc::from(content.into())),
        )
    }

    /// An agent message with no text content, e.g. one that only carries
    /// function calls or file references.
    pub fn agent_without_content(
        agent_id: impl Into<String>,
        agent_name: impl Into<String>,
    ) -> Self {
        Self::build(
            AuthorRole::Agent,
            Some(agent_id.into()),
            Some(agent_name.into()),
            None,
        )
    }

    /// Attach a content item (builder pattern).
    pub fn with_item(mut self, item: ContentItem) -> Self {
        self.items.push(item);
        self
    }

    /// Attach a metadata entry (builder pattern).
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn role(&self) -> AuthorRole {
        self.role
    }

    pub fn author_id(&self) -> Option<&str> {
        self.author_id.as_deref()
    }

    pub fn author_name(&self) -> Option<&str> {
        self.author_name.as_deref()
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn items(&self) -> &[ContentItem] {
        &self.items
    }

    pub fn metadata(&self) -> &HashMap<String, serde_json::Value> {
        &self.metadata
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether this message was produced by the agent `agent_id`.
    pub fn is_from(&self, agent_id: &str) -> bool {
        self.author_id.as_deref() == Some(agent_id)
    }

    /// Case-insensitive substring check on the text content.
    ///
    /// Returns `false` for messages without content.
    pub fn content_contains_ignore_case(&self, needle: &str) -> bool {
        match &self.content {
            Some(content) => content.to_lowercase().contains(&needle.to_lowercase()),
            None => false,
        }
    }
}
