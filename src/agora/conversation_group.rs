//! The turn-taking engine.
//!
//! A [`ConversationGroup`] owns one [`History`], a fixed roster of agents, a
//! [`SelectionStrategy`] and a [`TerminationStrategy`]. [`ConversationGroup::run`]
//! drives the turn loop:
//!
//! ```text
//! Idle ──run()──▶ Running ──┬─▶ Completed   (termination signaled / iteration cap)
//!                  ▲   │    └─▶ Aborted     (selection, agent or cancellation failure)
//!                  └───┘ one turn: select → invoke → append → check
//! ```
//!
//! Turns within a group are strictly sequential: an agent's messages are fully
//! appended before the next selection happens. `run` takes `&mut self`, so a
//! group can never have two turns in flight.
//!
//! # Example
//!
//! ```rust,no_run
//! use agora::agent::Agent;
//! use agora::conversation_group::ConversationGroup;
//! use agora::message::ChatMessage;
//! use agora::selection::SequentialSelection;
//! use agora::termination::ApprovalTermination;
//! use agora::GroupConfig;
//! use std::sync::Arc;
//!
//! # async fn example(teams: Arc<dyn Agent>, master: Arc<dyn Agent>) {
//! let mut group = ConversationGroup::new(
//!     Arc::new(SequentialSelection::new().with_initial_agent("teams")),
//!     Arc::new(ApprovalTermination::new(["master"])),
//! )
//! .with_name("Teams support")
//! .with_config(GroupConfig::default().with_max_iterations(10));
//!
//! group.add_agent(teams).unwrap();
//! group.add_agent(master).unwrap();
//! group.seed(ChatMessage::user("Frequent disconnections during video calls.")).unwrap();
//!
//! match group.run().await {
//!     Ok(outcome) => println!("done after {} turns", outcome.iterations),
//!     Err(aborted) => eprintln!("{}", aborted),
//! }
//! # }
//! ```

use crate::agora::agent::{Agent, AgentError};
use crate::agora::config::GroupConfig;
use crate::agora::event::{EventHandler, GroupEvent};
use crate::agora::history::{History, HistoryView};
use crate::agora::message::ChatMessage;
use crate::agora::selection::{SelectionError, SelectionStrategy};
use crate::agora::termination::TerminationStrategy;
use futures_util::{FutureExt, StreamExt};
use std::any::Any;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a [`ConversationGroup`]. `Completed` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStatus {
    Idle,
    Running,
    Completed,
    Aborted,
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupStatus::Idle => write!(f, "Idle"),
            GroupStatus::Running => write!(f, "Running"),
            GroupStatus::Completed => write!(f, "Completed"),
            GroupStatus::Aborted => write!(f, "Aborted"),
        }
    }
}

/// Why a group completed normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionReason {
    /// The termination strategy said stop.
    TerminationSignaled,
    /// `max_iterations` turns were taken. A designed stop, not a failure.
    IterationCapReached,
}

/// Errors that abort a conversation group or reject a caller request.
///
/// # Examples
///
/// ```
/// use agora::conversation_group::GroupError;
///
/// let err = GroupError::UnknownAgent("ghost".into());
/// assert_eq!(err.to_string(), "Unknown agent: ghost");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupError {
    /// Selection named an agent that is not on the roster.
    UnknownAgent(String),
    /// The agent collaborator failed. Never retried by the engine.
    AgentInvocation { agent_id: String, message: String },
    /// A strategy referenced a participant it has no rule for.
    UnknownParticipant(String),
    /// Policy-driven selection produced no usable participant.
    SelectionParse(String),
    EmptyRoster,
    /// Selection picked the previous speaker again and the strategy does not
    /// allow consecutive turns.
    RepeatedSpeaker(String),
    /// The caller's cancellation token fired.
    Cancelled,
    /// `run` was called on a group without agents.
    NoAgents,
    /// `add_agent` was called with an id already on the roster.
    DuplicateAgent(String),
    /// A message was seeded into a group that is no longer idle.
    InvalidAppend(String),
    /// `run` was called on a group that already ran.
    NotReusable(GroupStatus),
    /// The task running the group panicked or was cancelled by the runtime.
    TaskFailed(String),
}

impl fmt::Display for GroupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupError::UnknownAgent(id) => write!(f, "Unknown agent: {}", id),
            GroupError::AgentInvocation { agent_id, message } => {
                write!(f, "Agent '{}' failed: {}", agent_id, message)
            }
            GroupError::UnknownParticipant(id) => write!(f, "Unknown participant: {}", id),
            GroupError::SelectionParse(reply) => {
                write!(f, "Could not parse a participant from: {:?}", reply)
            }
            GroupError::EmptyRoster => write!(f, "Roster is empty"),
            GroupError::RepeatedSpeaker(id) => {
                write!(f, "Agent '{}' was selected for two turns in a row", id)
            }
            GroupError::Cancelled => write!(f, "Cancelled"),
            GroupError::NoAgents => write!(f, "No agents in conversation group"),
            GroupError::DuplicateAgent(id) => write!(f, "Agent with id '{}' already exists", id),
            GroupError::InvalidAppend(msg) => write!(f, "Invalid append: {}", msg),
            GroupError::NotReusable(status) => {
                write!(f, "Group is {} and cannot be run again", status)
            }
            GroupError::TaskFailed(msg) => write!(f, "Task failed: {}", msg),
        }
    }
}

impl Error for GroupError {}

impl From<SelectionError> for GroupError {
    fn from(err: SelectionError) -> Self {
        match err {
            SelectionError::UnknownParticipant(id) => GroupError::UnknownParticipant(id),
            SelectionError::SelectionParse(reply) => GroupError::SelectionParse(reply),
            SelectionError::EmptyRoster => GroupError::EmptyRoster,
        }
    }
}

/// A group that reached `Completed`.
#[derive(Debug, Clone)]
pub struct ConversationOutcome {
    pub group_id: String,
    /// The full final history, seed message included.
    pub history: HistoryView,
    /// Turns taken.
    pub iterations: usize,
    pub reason: CompletionReason,
}

/// A group that reached `Aborted`, with whatever history it had accumulated.
///
/// Messages appended by completed turns are preserved; a turn that was
/// interrupted or failed contributes nothing.
#[derive(Debug, Clone)]
pub struct ConversationAborted {
    pub group_id: String,
    pub reason: GroupError,
    pub history: HistoryView,
    pub iterations: usize,
}

impl ConversationAborted {
    pub fn is_cancelled(&self) -> bool {
        self.reason == GroupError::Cancelled
    }
}

impl fmt::Display for ConversationAborted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Conversation '{}' aborted after {} turns: {}",
            self.group_id, self.iterations, self.reason
        )
    }
}

impl Error for ConversationAborted {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.reason)
    }
}

/// Result of [`ConversationGroup::run`].
pub type RunResult = Result<ConversationOutcome, ConversationAborted>;

/// One conversation: a history, a roster and the policies that drive it.
pub struct ConversationGroup {
    /// Stable identifier used in logs, events and runner reports.
    pub id: String,

    /// Human-readable name.
    pub name: String,

    history: History,

    /// Agents in roster order. Sequential selection follows this order.
    roster: Vec<Arc<dyn Agent>>,

    selection: Arc<dyn SelectionStrategy>,
    termination: Arc<dyn TerminationStrategy>,
    config: GroupConfig,

    iteration_count: usize,
    last_speaker: Option<String>,
    status: GroupStatus,

    cancellation: Option<CancellationToken>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl ConversationGroup {
    /// Create an idle group with a random id and the default [`GroupConfig`].
    pub fn new(
        selection: Arc<dyn SelectionStrategy>,
        termination: Arc<dyn TerminationStrategy>,
    ) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        Self {
            name: id.clone(),
            id,
            history: History::new(),
            roster: Vec::new(),
            selection,
            termination,
            config: GroupConfig::default(),
            iteration_count: 0,
            last_speaker: None,
            status: GroupStatus::Idle,
            cancellation: None,
            event_handler: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_config(mut self, config: GroupConfig) -> Self {
        self.config = config;
        self
    }

    /// Observe cancellation of `token` at every suspend point of the turn loop.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn set_cancellation(&mut self, token: CancellationToken) {
        self.cancellation = Some(token);
    }

    pub fn cancellation_token(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn set_event_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.event_handler = Some(handler);
    }

    pub fn has_event_handler(&self) -> bool {
        self.event_handler.is_some()
    }

    /// Add an agent to the end of the roster.
    ///
    /// Agents are shared, not owned: the same `Arc` may sit on the rosters of
    /// several groups running concurrently.
    pub fn add_agent(&mut self, agent: Arc<dyn Agent>) -> Result<(), GroupError> {
        if self.roster.iter().any(|a| a.id() == agent.id()) {
            return Err(GroupError::DuplicateAgent(agent.id().to_string()));
        }
        self.roster.push(agent);
        Ok(())
    }

    pub fn get_agent(&self, id: &str) -> Option<&Arc<dyn Agent>> {
        self.roster.iter().find(|a| a.id() == id)
    }

    /// Roster agent ids in order.
    pub fn agent_ids(&self) -> Vec<String> {
        self.roster.iter().map(|a| a.id().to_string()).collect()
    }

    /// Append an initial message before the group runs.
    ///
    /// Fails with [`GroupError::InvalidAppend`] once the group has left `Idle`:
    /// from then on the turn loop is the history's only writer.
    pub fn seed(&mut self, message: ChatMessage) -> Result<(), GroupError> {
        if self.status != GroupStatus::Idle {
            return Err(GroupError::InvalidAppend(format!(
                "group '{}' is {}",
                self.id, self.status
            )));
        }
        self.history.append(std::iter::once(message));
        Ok(())
    }

    pub fn history(&self) -> HistoryView {
        self.history.snapshot()
    }

    pub fn status(&self) -> GroupStatus {
        self.status
    }

    pub fn iteration_count(&self) -> usize {
        self.iteration_count
    }

    pub fn last_speaker(&self) -> Option<&str> {
        self.last_speaker.as_deref()
    }

    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    async fn emit(&self, event: GroupEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_group_event(&event).await;
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map(|token| token.is_cancelled())
            .unwrap_or(false)
    }

    /// Await `fut` unless the cancellation token fires first (`None`).
    async fn cancellable<F: Future>(&self, fut: F) -> Option<F::Output> {
        match &self.cancellation {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => None,
                out = fut => Some(out),
            },
            None => Some(fut.await),
        }
    }

    /// Run the turn loop until the group completes or aborts.
    ///
    /// # Errors
    ///
    /// Every fatal condition transitions the group to [`GroupStatus::Aborted`]
    /// and is returned as [`ConversationAborted`] together with the partial
    /// history. Calling `run` on a group that already finished returns
    /// [`GroupError::NotReusable`] without touching its state.
    pub async fn run(&mut self) -> RunResult {
        if self.status != GroupStatus::Idle {
            return Err(ConversationAborted {
                group_id: self.id.clone(),
                reason: GroupError::NotReusable(self.status),
                history: self.history.snapshot(),
                iterations: self.iteration_count,
            });
        }

        self.status = GroupStatus::Running;
        if self.roster.is_empty() {
            return self.abort(GroupError::NoAgents).await;
        }

        log::info!(
            "Group '{}' ({}) started with {} agents, max {} iterations",
            self.name,
            self.id,
            self.roster.len(),
            self.config.max_iterations
        );
        self.emit(GroupEvent::RunStarted {
            group_id: self.id.clone(),
            group_name: self.name.clone(),
            agent_count: self.roster.len(),
            max_iterations: self.config.max_iterations,
        })
        .await;

        let roster_ids = self.agent_ids();

        loop {
            if self.is_cancelled() {
                return self.abort(GroupError::Cancelled).await;
            }
            if self.iteration_count >= self.config.max_iterations {
                return self.complete(CompletionReason::IterationCapReached).await;
            }

            // Select
            let snapshot = self.history.snapshot();
            let selection = self
                .cancellable(self.selection.next(
                    &snapshot,
                    &roster_ids,
                    self.last_speaker.as_deref(),
                ))
                .await;
            let agent_id = match selection {
                None => return self.abort(GroupError::Cancelled).await,
                Some(Err(e)) => return self.abort(e.into()).await,
                Some(Ok(agent_id)) => agent_id,
            };

            if roster_ids.len() > 1
                && !self.selection.allows_consecutive_turns()
                && self.last_speaker.as_deref() == Some(agent_id.as_str())
            {
                return self.abort(GroupError::RepeatedSpeaker(agent_id)).await;
            }

            let agent = match self.get_agent(&agent_id) {
                Some(agent) => Arc::clone(agent),
                None => return self.abort(GroupError::UnknownAgent(agent_id)).await,
            };

            let turn = self.iteration_count + 1;
            log::debug!("Group '{}' turn {}: '{}' selected", self.id, turn, agent_id);
            self.emit(GroupEvent::AgentSelected {
                group_id: self.id.clone(),
                agent_id: agent_id.clone(),
                agent_name: agent.name().to_string(),
                iteration: turn,
            })
            .await;

            // Invoke, draining the stream before anything is appended
            let invocation = self.cancellable(collect_turn(&agent, snapshot)).await;
            let produced = match invocation {
                None => return self.abort(GroupError::Cancelled).await,
                Some(Err(e)) => {
                    self.emit(GroupEvent::AgentFailed {
                        group_id: self.id.clone(),
                        agent_id: agent_id.clone(),
                        agent_name: agent.name().to_string(),
                        error: e.to_string(),
                    })
                    .await;
                    return self
                        .abort(GroupError::AgentInvocation {
                            agent_id,
                            message: e.to_string(),
                        })
                        .await;
                }
                Some(Ok(messages)) => messages,
            };

            // Append; a silent agent still used its turn
            self.history.append(produced.iter().cloned());
            self.last_speaker = Some(agent_id.clone());
            self.iteration_count = turn;
            log::debug!(
                "Group '{}' turn {}: '{}' produced {} messages",
                self.id,
                turn,
                agent_id,
                produced.len()
            );
            self.emit(GroupEvent::AgentResponded {
                group_id: self.id.clone(),
                agent_id: agent_id.clone(),
                agent_name: agent.name().to_string(),
                iteration: turn,
                messages: produced,
            })
            .await;

            // Check termination
            let snapshot = self.history.snapshot();
            let verdict = self
                .cancellable(self.termination.should_stop(&snapshot, &agent_id, turn))
                .await;
            let should_stop = match verdict {
                None => return self.abort(GroupError::Cancelled).await,
                Some(stop) => stop,
            };
            self.emit(GroupEvent::TerminationChecked {
                group_id: self.id.clone(),
                agent_id,
                iteration: turn,
                should_stop,
            })
            .await;

            if should_stop {
                return self.complete(CompletionReason::TerminationSignaled).await;
            }
        }
    }

    async fn complete(&mut self, reason: CompletionReason) -> RunResult {
        self.status = GroupStatus::Completed;
        log::info!(
            "Group '{}' completed after {} turns ({:?})",
            self.id,
            self.iteration_count,
            reason
        );
        self.emit(GroupEvent::RunCompleted {
            group_id: self.id.clone(),
            iterations: self.iteration_count,
            history_len: self.history.len(),
            reason,
        })
        .await;

        Ok(ConversationOutcome {
            group_id: self.id.clone(),
            history: self.history.snapshot(),
            iterations: self.iteration_count,
            reason,
        })
    }

    async fn abort(&mut self, reason: GroupError) -> RunResult {
        self.status = GroupStatus::Aborted;
        if reason == GroupError::Cancelled {
            log::info!(
                "Group '{}' cancelled after {} turns",
                self.id,
                self.iteration_count
            );
        } else {
            log::warn!(
                "Group '{}' aborted after {} turns: {}",
                self.id,
                self.iteration_count,
                reason
            );
        }
        self.emit(GroupEvent::RunAborted {
            group_id: self.id.clone(),
            iterations: self.iteration_count,
            history_len: self.history.len(),
            reason: reason.clone(),
        })
        .await;

        Err(ConversationAborted {
            group_id: self.id.clone(),
            reason,
            history: self.history.snapshot(),
            iterations: self.iteration_count,
        })
    }
}

/// Invoke `agent` and drain its stream. Any error fails the whole turn, and so
/// does a panic inside the agent, which keeps the group's partial history.
async fn collect_turn(
    agent: &Arc<dyn Agent>,
    snapshot: HistoryView,
) -> Result<Vec<ChatMessage>, AgentError> {
    let turn = async move {
        let mut stream = agent.invoke(snapshot).await?;
        let mut produced = Vec::new();
        while let Some(message) = stream.next().await {
            produced.push(message?);
        }
        Ok::<_, AgentError>(produced)
    };

    match AssertUnwindSafe(turn).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(format!("agent panicked: {}", panic_message(&*payload)).into()),
    }
}

fn panic_message<'a>(payload: &'a (dyn Any + Send + 'static)) -> &'a str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
