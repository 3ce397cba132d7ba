//! Concurrent execution of independent conversation groups.
//!
//! [`GroupRunner::run_all`] seeds every group, spawns each turn loop as its own
//! `tokio` task, and only then awaits the results, in submission order. Groups
//! share nothing mutable, so one group aborting never affects its siblings.
//!
//! # Example
//!
//! ```rust,no_run
//! use agora::conversation_group::ConversationGroup;
//! use agora::message::ChatMessage;
//! use agora::runner::GroupRunner;
//!
//! # async fn example(teams_chat: ConversationGroup, azure_chat: ConversationGroup) {
//! let report = GroupRunner::new()
//!     .run_all(vec![
//!         (teams_chat, ChatMessage::user("Teams: frequent disconnections during video calls.")),
//!         (azure_chat, ChatMessage::user("AKS: node resource exhaustion.")),
//!     ])
//!     .await;
//!
//! for (group_id, result) in report.iter() {
//!     match result {
//!         Ok(outcome) => println!("{}: {} messages", group_id, outcome.history.len()),
//!         Err(aborted) => println!("{}: {}", group_id, aborted),
//!     }
//! }
//! # }
//! ```

use crate::agora::conversation_group::{
    ConversationAborted, ConversationGroup, ConversationOutcome, GroupError, RunResult,
};
use crate::agora::event::EventHandler;
use crate::agora::history::HistoryView;
use crate::agora::message::ChatMessage;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Per-group results of [`GroupRunner::run_all`], in submission order.
#[derive(Debug)]
pub struct RunReport {
    entries: Vec<(String, RunResult)>,
}

impl RunReport {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(group_id, result)` pairs in the order the groups were submitted.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RunResult)> {
        self.entries.iter().map(|(id, result)| (id.as_str(), result))
    }

    /// Result for `group_id`. With duplicate ids, the first submission wins.
    pub fn get(&self, group_id: &str) -> Option<&RunResult> {
        self.entries
            .iter()
            .find(|(id, _)| id == group_id)
            .map(|(_, result)| result)
    }

    pub fn completed(&self) -> impl Iterator<Item = &ConversationOutcome> {
        self.entries.iter().filter_map(|(_, r)| r.as_ref().ok())
    }

    pub fn aborted(&self) -> impl Iterator<Item = &ConversationAborted> {
        self.entries.iter().filter_map(|(_, r)| r.as_ref().err())
    }

    pub fn into_entries(self) -> Vec<(String, RunResult)> {
        self.entries
    }
}

impl IntoIterator for RunReport {
    type Item = (String, RunResult);
    type IntoIter = std::vec::IntoIter<(String, RunResult)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Drives several [`ConversationGroup`]s concurrently (fan-out / fan-in).
#[derive(Default)]
pub struct GroupRunner {
    cancellation: Option<CancellationToken>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl GroupRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel every group still running when `token` fires.
    ///
    /// Each group without a token of its own receives a child token; groups
    /// that already carry a token keep it.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Observe every group that has no handler of its own.
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Seed and run every group concurrently, returning results in submission order.
    ///
    /// All groups are spawned before any result is awaited. A group that cannot
    /// be seeded (it already ran) is reported as aborted with
    /// [`GroupError::InvalidAppend`] and is not spawned. A panicking agent aborts
    /// its own group with [`GroupError::AgentInvocation`] and keeps the partial
    /// history; only a task lost outside the turn loop (a panicking strategy or
    /// event handler, runtime shutdown) is reported as [`GroupError::TaskFailed`]
    /// with an empty history.
    pub async fn run_all(&self, groups: Vec<(ConversationGroup, ChatMessage)>) -> RunReport {
        log::info!("Runner starting {} conversation groups", groups.len());

        let mut pending: Vec<(String, Result<JoinHandle<RunResult>, ConversationAborted>)> =
            Vec::with_capacity(groups.len());

        for (mut group, seed) in groups {
            let group_id = group.id.clone();

            if let Err(reason) = group.seed(seed) {
                pending.push((
                    group_id.clone(),
                    Err(ConversationAborted {
                        group_id,
                        reason,
                        history: group.history(),
                        iterations: group.iteration_count(),
                    }),
                ));
                continue;
            }

            if let Some(token) = &self.cancellation {
                if group.cancellation_token().is_none() {
                    group.set_cancellation(token.child_token());
                }
            }
            if let Some(handler) = &self.event_handler {
                if !group.has_event_handler() {
                    group.set_event_handler(Arc::clone(handler));
                }
            }

            let handle = tokio::spawn(async move { group.run().await });
            pending.push((group_id, Ok(handle)));
        }

        let mut entries = Vec::with_capacity(pending.len());
        for (group_id, task) in pending {
            let result = match task {
                Err(aborted) => Err(aborted),
                Ok(handle) => match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        log::error!("Group '{}' task failed: {}", group_id, e);
                        Err(ConversationAborted {
                            group_id: group_id.clone(),
                            reason: GroupError::TaskFailed(e.to_string()),
                            history: HistoryView::default(),
                            iterations: 0,
                        })
                    }
                },
            };
            entries.push((group_id, result));
        }

        let completed = entries.iter().filter(|(_, r)| r.is_ok()).count();
        log::info!(
            "Runner finished: {} completed, {} aborted",
            completed,
            entries.len() - completed
        );

        RunReport { entries }
    }
}
