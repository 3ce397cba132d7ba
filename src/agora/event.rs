//! Group chat event system.
//!
//! Implement [`EventHandler`] to observe a
//! [`ConversationGroup`](crate::conversation_group::ConversationGroup) while it
//! runs: run start/end, speaker selection, each agent's output, and the outcome
//! of every termination check. Transcript rendering is a caller concern, so
//! [`GroupEvent::AgentResponded`] carries the produced messages themselves.
//!
//! # Event Flow (two agents, approval on turn 2)
//!
//! ```text
//! RunStarted { agent_count: 2, max_iterations: 10 }
//!   ├─ AgentSelected { agent: "teams", iteration: 1 }
//!   ├─ AgentResponded { agent: "teams", messages: [..] }
//!   ├─ TerminationChecked { iteration: 1, should_stop: false }
//!   ├─ AgentSelected { agent: "master", iteration: 2 }
//!   ├─ AgentResponded { agent: "master", messages: [..] }
//!   └─ TerminationChecked { iteration: 2, should_stop: true }
//! RunCompleted { iterations: 2, reason: TerminationSignaled }
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use agora::event::{EventHandler, GroupEvent};
//! use async_trait::async_trait;
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl EventHandler for Printer {
//!     async fn on_group_event(&self, event: &GroupEvent) {
//!         if let GroupEvent::AgentResponded { agent_name, messages, .. } = event {
//!             for message in messages {
//!                 println!("# {}: {}", agent_name, message.content().unwrap_or(""));
//!             }
//!         }
//!     }
//! }
//! ```

use crate::agora::conversation_group::{CompletionReason, GroupError};
use crate::agora::message::ChatMessage;
use async_trait::async_trait;

/// Events emitted by a conversation group during
/// [`run`](crate::conversation_group::ConversationGroup::run).
///
/// Every variant carries the `group_id` so one handler can observe several
/// groups run concurrently by a [`GroupRunner`](crate::runner::GroupRunner).
#[derive(Debug, Clone)]
pub enum GroupEvent {
    /// The turn loop is starting.
    RunStarted {
        group_id: String,
        group_name: String,
        agent_count: usize,
        max_iterations: usize,
    },

    /// The selection strategy picked the next speaker.
    AgentSelected {
        group_id: String,
        agent_id: String,
        agent_name: String,
        /// 1-based number of the turn about to run.
        iteration: usize,
    },

    /// An agent finished its turn. `messages` may be empty.
    AgentResponded {
        group_id: String,
        agent_id: String,
        agent_name: String,
        iteration: usize,
        messages: Vec<ChatMessage>,
    },

    /// An agent invocation failed; the group is about to abort.
    AgentFailed {
        group_id: String,
        agent_id: String,
        agent_name: String,
        error: String,
    },

    /// The termination strategy was consulted after a turn.
    TerminationChecked {
        group_id: String,
        agent_id: String,
        iteration: usize,
        should_stop: bool,
    },

    /// The group reached `Completed`.
    RunCompleted {
        group_id: String,
        iterations: usize,
        history_len: usize,
        reason: CompletionReason,
    },

    /// The group reached `Aborted`.
    RunAborted {
        group_id: String,
        iterations: usize,
        history_len: usize,
        reason: GroupError,
    },
}

/// Receives [`GroupEvent`]s.
///
/// The default implementation is a no-op. Handlers are shared via
/// `Arc<dyn EventHandler>` and may be called from several groups at once, so any
/// internal state needs synchronization (`Mutex`, atomics).
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_group_event(&self, _event: &GroupEvent) {}
}
