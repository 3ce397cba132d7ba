//! The agent capability consumed by the turn loop.
//!
//! Anything that can look at a [`HistoryView`] and asynchronously yield new
//! [`ChatMessage`]s qualifies as an [`Agent`]. The engine does not care whether
//! an agent calls a model, runs a retrieval pipeline or replays a script, which
//! makes mock agents trivial to write in tests.
//!
//! Agents are shared through `Arc<dyn Agent>` and may be invoked concurrently by
//! *different* groups; the engine guarantees at most one in-flight invocation
//! per group.
//!
//! # Example
//!
//! ```rust
//! use agora::agent::{Agent, AgentError, MessageStream, message_stream};
//! use agora::history::HistoryView;
//! use agora::message::ChatMessage;
//! use async_trait::async_trait;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Agent for Echo {
//!     fn id(&self) -> &str { "echo" }
//!     fn name(&self) -> &str { "Echo" }
//!
//!     async fn invoke(&self, history: HistoryView) -> Result<MessageStream, AgentError> {
//!         let last = history.last().and_then(|m| m.content()).unwrap_or("").to_string();
//!         Ok(message_stream(vec![ChatMessage::from_agent("echo", "Echo", last)]))
//!     }
//! }
//! ```

use crate::agora::client_wrapper::ClientWrapper;
use crate::agora::history::HistoryView;
use crate::agora::message::{AuthorRole, ChatMessage};
use async_trait::async_trait;
use futures_util::stream::{self, Stream};
use std::error::Error;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed error produced by an agent collaborator.
pub type AgentError = Box<dyn Error + Send + Sync>;

/// The messages produced by one agent turn, possibly yielded incrementally.
///
/// The engine drains the stream to completion before appending anything, so
/// an `Err` item anywhere in the stream fails the whole turn.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<ChatMessage, AgentError>> + Send>>;

/// Wrap an already-computed batch of messages as a [`MessageStream`].
pub fn message_stream(messages: Vec<ChatMessage>) -> MessageStream {
    Box::pin(stream::iter(messages.into_iter().map(Ok)))
}

/// A participant of a conversation group.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Identifier, unique within a group. Selection strategies refer to agents by it.
    fn id(&self) -> &str;

    /// Human-readable display name.
    fn name(&self) -> &str;

    /// Produce this agent's contribution for the given snapshot.
    ///
    /// Retrying transient failures is the agent's own business; the engine
    /// aborts the group on the first error.
    async fn invoke(&self, history: HistoryView) -> Result<MessageStream, AgentError>;
}

/// An agent defined by natural-language instructions and a model client.
///
/// On each turn it sends its instructions as a system message followed by the
/// whole conversation, and yields the model's reply attributed to itself.
///
/// ```rust,no_run
/// # use agora::agent::InstructedAgent;
/// # use agora::client_wrapper::ClientWrapper;
/// # use std::sync::Arc;
/// # fn client() -> Arc<dyn ClientWrapper> { unimplemented!() }
/// let master = InstructedAgent::new("master", "MasterAgent", client())
///     .with_instructions("Evaluate the proposed solution. Reply SUCCESS if it is sufficient.");
/// ```
pub struct InstructedAgent {
    pub id: String,
    pub name: String,
    pub instructions: Option<String>,
    client: Arc<dyn ClientWrapper>,
}

impl InstructedAgent {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        client: Arc<dyn ClientWrapper>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            instructions: None,
            client,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    fn build_request(&self, history: &HistoryView) -> Vec<ChatMessage> {
        let mut request = Vec::with_capacity(history.len() + 1);
        if let Some(instructions) = &self.instructions {
            request.push(ChatMessage::system(instructions.as_str()));
        }
        request.extend(history.iter().cloned());
        request
    }
}

#[async_trait]
impl Agent for InstructedAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, history: HistoryView) -> Result<MessageStream, AgentError> {
        let request = self.build_request(&history);
        log::debug!(
            "Agent '{}' calling model '{}' with {} messages",
            self.id,
            self.client.model_name(),
            request.len()
        );

        let reply = self.client.send_message(&request).await?;

        // Re-attribute the reply so the group history records who spoke.
        let mut message = match reply.content() {
            Some(content) => ChatMessage::from_agent(&self.id, &self.name, content),
            None => ChatMessage::agent_without_content(&self.id, &self.name),
        };
        for item in reply.items() {
            message = message.with_item(item.clone());
        }
        for (key, value) in reply.metadata() {
            message = message.with_metadata(key.clone(), value.clone());
        }
        debug_assert_eq!(message.role(), AuthorRole::Agent);

        Ok(message_stream(vec![message]))
    }
}
