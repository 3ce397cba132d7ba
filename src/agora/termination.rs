//! Stop conditions evaluated after every turn.
//!
//! A [`TerminationStrategy`] sees the history (including the messages the last
//! speaker just produced), the id of that speaker and the number of completed
//! turns. Independently of the configured strategy, every
//! [`ConversationGroup`](crate::conversation_group::ConversationGroup) stops once
//! its `max_iterations` is reached, so a strategy that never fires cannot keep a
//! group alive forever.

use crate::agora::client_wrapper::ClientWrapper;
use crate::agora::history::HistoryView;
use crate::agora::message::ChatMessage;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// Decides whether a conversation is finished.
#[async_trait]
pub trait TerminationStrategy: Send + Sync {
    /// `iteration` is the number of turns completed so far, including the one
    /// `last_speaker` just took.
    async fn should_stop(
        &self,
        history: &HistoryView,
        last_speaker: &str,
        iteration: usize,
    ) -> bool;
}

fn approver_set<I, S>(agents: I) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    agents.into_iter().map(Into::into).collect()
}

/// Stops once a designated approver's latest message contains a marker token.
///
/// The marker match is a case-insensitive substring match on the most recent
/// message, which must have been authored by `last_speaker`. Content is only
/// inspected when `last_speaker` is an approver; an empty approver set lets
/// every participant approve.
///
/// ```
/// use agora::termination::{ApprovalTermination, TerminationStrategy};
/// use agora::history::History;
/// use agora::message::ChatMessage;
///
/// # #[tokio::main]
/// # async fn main() {
/// let strategy = ApprovalTermination::new(["master"]);
/// let mut history = History::new();
/// history.append(vec![ChatMessage::from_agent("master", "MasterAgent", "Looks good: SUCCESS")]);
///
/// assert!(strategy.should_stop(&history.snapshot(), "master", 2).await);
/// assert!(!strategy.should_stop(&history.snapshot(), "teams", 2).await);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ApprovalTermination {
    approvers: HashSet<String>,
    marker: String,
}

impl ApprovalTermination {
    pub fn new<I, S>(approvers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            approvers: approver_set(approvers),
            marker: "SUCCESS".to_string(),
        }
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    fn is_approver(&self, agent_id: &str) -> bool {
        self.approvers.is_empty() || self.approvers.contains(agent_id)
    }
}

#[async_trait]
impl TerminationStrategy for ApprovalTermination {
    async fn should_stop(
        &self,
        history: &HistoryView,
        last_speaker: &str,
        _iteration: usize,
    ) -> bool {
        if !self.is_approver(last_speaker) {
            return false;
        }
        // A silent approver turn must not pick up the previous speaker's marker
        history
            .last()
            .filter(|m| m.is_from(last_speaker))
            .map(|m| m.content_contains_ignore_case(&self.marker))
            .unwrap_or(false)
    }
}

/// Stops once `iteration >= max_iterations`, regardless of content.
#[derive(Debug, Clone, Copy)]
pub struct IterationCap {
    pub max_iterations: usize,
}

impl IterationCap {
    pub fn new(max_iterations: usize) -> Self {
        Self { max_iterations }
    }
}

#[async_trait]
impl TerminationStrategy for IterationCap {
    async fn should_stop(
        &self,
        _history: &HistoryView,
        _last_speaker: &str,
        iteration: usize,
    ) -> bool {
        iteration >= self.max_iterations
    }
}

/// Interprets a policy reply as "stop" / "continue".
pub type TerminationParser = Arc<dyn Fn(&str) -> bool + Send + Sync>;

const DEFAULT_TERMINATION_PROMPT: &str = "\
Determine if the provided solution will restore the system to an optimal state.
If the solution will work and restore the system, respond with a single word: SUCCESS.
If the solution is not sufficient, suggest improvements or ask for additional information.

History:
{{history}}";

/// Asks a model whether the conversation is resolved.
///
/// The template's `{{history}}` placeholder is filled with the rendered
/// transcript. The default parser stops when the reply contains `SUCCESS`
/// (case-insensitive). If the client fails, the strategy logs a warning and
/// answers "do not stop"; the group's iteration cap still applies.
pub struct PolicyDrivenTermination {
    client: Arc<dyn ClientWrapper>,
    template: String,
    parser: TerminationParser,
    approvers: HashSet<String>,
    history_limit: Option<usize>,
}

impl PolicyDrivenTermination {
    pub fn new(client: Arc<dyn ClientWrapper>) -> Self {
        Self {
            client,
            template: DEFAULT_TERMINATION_PROMPT.to_string(),
            parser: Arc::new(|reply: &str| reply.to_lowercase().contains("success")),
            approvers: HashSet::new(),
            history_limit: None,
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn with_parser(mut self, parser: TerminationParser) -> Self {
        self.parser = parser;
        self
    }

    /// Only consult the model after one of these agents has spoken.
    pub fn with_approvers<I, S>(mut self, approvers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.approvers = approver_set(approvers);
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = Some(limit);
        self
    }
}

#[async_trait]
impl TerminationStrategy for PolicyDrivenTermination {
    async fn should_stop(
        &self,
        history: &HistoryView,
        last_speaker: &str,
        _iteration: usize,
    ) -> bool {
        if !self.approvers.is_empty() && !self.approvers.contains(last_speaker) {
            return false;
        }

        let prompt = self
            .template
            .replace("{{history}}", &history.render_transcript(self.history_limit));

        match self.client.send_message(&[ChatMessage::user(prompt)]).await {
            Ok(reply) => (self.parser)(reply.content().unwrap_or("")),
            Err(e) => {
                log::warn!(
                    "Termination check via '{}' failed, continuing: {}",
                    self.client.model_name(),
                    e
                );
                false
            }
        }
    }
}

/// How a [`CompositeTermination`] combines its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Stop when any member says stop.
    Any,
    /// Stop only when every member says stop.
    All,
}

/// Combines several strategies into one.
///
/// Members are evaluated in order and evaluation short-circuits, so put cheap
/// checks (approval, caps) before policy-driven ones.
pub struct CompositeTermination {
    aggregation: Aggregation,
    strategies: Vec<Arc<dyn TerminationStrategy>>,
}

impl CompositeTermination {
    pub fn any(strategies: Vec<Arc<dyn TerminationStrategy>>) -> Self {
        Self {
            aggregation: Aggregation::Any,
            strategies,
        }
    }

    pub fn all(strategies: Vec<Arc<dyn TerminationStrategy>>) -> Self {
        Self {
            aggregation: Aggregation::All,
            strategies,
        }
    }
}

#[async_trait]
impl TerminationStrategy for CompositeTermination {
    async fn should_stop(
        &self,
        history: &HistoryView,
        last_speaker: &str,
        iteration: usize,
    ) -> bool {
        if self.strategies.is_empty() {
            return false;
        }
        for strategy in &self.strategies {
            let stop = strategy.should_stop(history, last_speaker, iteration).await;
            match self.aggregation {
                Aggregation::Any if stop => return true,
                Aggregation::All if !stop => return false,
                _ => {}
            }
        }
        self.aggregation == Aggregation::All
    }
}
