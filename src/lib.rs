//! # Agora
//!
//! Agora is a turn-taking engine for group chats between autonomous agents. A
//! [`ConversationGroup`] owns a shared, append-only [`History`], asks a
//! [`SelectionStrategy`] who speaks next, lets that [`Agent`] contribute messages,
//! and asks a [`TerminationStrategy`] whether the exchange is resolved, until
//! it is or the group's iteration cap is reached. A [`GroupRunner`] drives many
//! groups concurrently and collects their final histories.
//!
//! What an agent does internally (calling a model, retrieving documents,
//! running tools) is not Agora's concern: an [`Agent`] is anything that turns a
//! [`HistoryView`] into a stream of [`ChatMessage`]s.
//!
//! ## Core Concepts
//!
//! * **Messages and history**: [`ChatMessage`] is immutable; [`History`] is the
//!   append-only log owned by one group, and [`HistoryView`] the O(1) snapshot
//!   handed to agents and strategies.
//! * **Selection**: [`selection::SequentialSelection`],
//!   [`selection::RuleBasedSelection`] and [`selection::PolicyDrivenSelection`].
//! * **Termination**: [`termination::ApprovalTermination`],
//!   [`termination::PolicyDrivenTermination`], [`termination::IterationCap`] and
//!   [`termination::CompositeTermination`].
//! * **Observability**: attach an [`EventHandler`] to receive [`GroupEvent`]s;
//!   diagnostics go through the `log` facade (see [`init_logger`]).
//! * **Cancellation**: pass a `tokio_util` `CancellationToken`; a cancelled group
//!   keeps every message appended by completed turns.
//!
//! ## Getting Started
//!
//! ```rust
//! use agora::agent::{message_stream, Agent, AgentError, MessageStream};
//! use agora::selection::SequentialSelection;
//! use agora::termination::ApprovalTermination;
//! use agora::{ChatMessage, ConversationGroup, GroupConfig, HistoryView};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct Scripted {
//!     id: &'static str,
//!     reply: &'static str,
//! }
//!
//! #[async_trait]
//! impl Agent for Scripted {
//!     fn id(&self) -> &str { self.id }
//!     fn name(&self) -> &str { self.id }
//!     async fn invoke(&self, _history: HistoryView) -> Result<MessageStream, AgentError> {
//!         Ok(message_stream(vec![ChatMessage::from_agent(self.id, self.id, self.reply)]))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     agora::init_logger();
//!
//!     let mut group = ConversationGroup::new(
//!         Arc::new(SequentialSelection::new()),
//!         Arc::new(ApprovalTermination::new(["reviewer"])),
//!     )
//!     .with_config(GroupConfig::default().with_max_iterations(6));
//!
//!     group.add_agent(Arc::new(Scripted { id: "writer", reply: "Draft v1" }))?;
//!     group.add_agent(Arc::new(Scripted { id: "reviewer", reply: "SUCCESS" }))?;
//!     group.seed(ChatMessage::user("Write a haiku about borrow checking."))?;
//!
//!     let outcome = group.run().await?;
//!     assert_eq!(outcome.iterations, 2);
//!     assert_eq!(outcome.history.len(), 3);
//!     Ok(())
//! }
//! ```

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// Applications embedding Agora can opt in to `RUST_LOG` driven diagnostics
/// (`RUST_LOG=agora=debug` shows every turn) without choosing a logging backend
/// upfront.
///
/// ```rust
/// agora::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

// Import the top-level `agora` module.
pub mod agora;

// Re-exporting key items for easier external access.
pub use agora::agent;
pub use agora::agent::{Agent, AgentError, InstructedAgent, MessageStream};
pub use agora::client_wrapper;
pub use agora::client_wrapper::ClientWrapper;
pub use agora::config;
pub use agora::config::GroupConfig;
pub use agora::conversation_group;
pub use agora::conversation_group::{
    CompletionReason, ConversationAborted, ConversationGroup, ConversationOutcome, GroupError,
    GroupStatus,
};
pub use agora::event;
pub use agora::event::{EventHandler, GroupEvent};
pub use agora::history;
pub use agora::history::{History, HistoryView};
pub use agora::message;
pub use agora::message::{AuthorRole, ChatMessage, ContentItem};
pub use agora::runner;
pub use agora::runner::{GroupRunner, RunReport};
pub use agora::selection;
pub use agora::selection::SelectionStrategy;
pub use agora::termination;
pub use agora::termination::TerminationStrategy;
