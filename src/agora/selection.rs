//! Turn-order policies: who speaks next.
//!
//! A [`SelectionStrategy`] is consulted once per turn with a snapshot of the
//! history, the roster's agent ids (in roster order) and the previous speaker.
//! Three variants ship with the crate:
//!
//! | Strategy | Decision |
//! |----------|----------|
//! | [`SequentialSelection`] | cycle through the roster, starting from an initial agent |
//! | [`RuleBasedSelection`] | follow a fixed `speaker -> next speaker` map |
//! | [`PolicyDrivenSelection`] | ask a model, parse the participant name out of its reply |
//!
//! By default the engine refuses to let the same agent speak twice in a row
//! (unless the roster has a single member). Strategies that deliberately want
//! consecutive turns opt out via
//! [`allows_consecutive_turns`](SelectionStrategy::allows_consecutive_turns).

use crate::agora::client_wrapper::ClientWrapper;
use crate::agora::history::HistoryView;
use crate::agora::message::ChatMessage;
use async_trait::async_trait;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Why a strategy could not name the next speaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    /// A participant referenced by the strategy (previous speaker, initial
    /// agent) is not known to it.
    UnknownParticipant(String),
    /// A policy-driven strategy got a reply naming no known participant.
    SelectionParse(String),
    /// The roster handed to the strategy was empty.
    EmptyRoster,
}

impl fmt::Display for SelectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionError::UnknownParticipant(id) => write!(f, "Unknown participant: {}", id),
            SelectionError::SelectionParse(reply) => {
                write!(f, "Could not parse a participant from: {:?}", reply)
            }
            SelectionError::EmptyRoster => write!(f, "Roster is empty"),
        }
    }
}

impl Error for SelectionError {}

/// Picks the next agent to act.
#[async_trait]
pub trait SelectionStrategy: Send + Sync {
    /// Return the id of the agent that takes the next turn.
    ///
    /// `last_speaker` is `None` on the first turn.
    async fn next(
        &self,
        history: &HistoryView,
        roster: &[String],
        last_speaker: Option<&str>,
    ) -> Result<String, SelectionError>;

    /// Whether the engine should accept the same agent taking two turns in a row.
    fn allows_consecutive_turns(&self) -> bool {
        false
    }
}

/// Cycles through the roster in order, wrapping around after the last entry.
///
/// ```
/// use agora::history::HistoryView;
/// use agora::selection::{SelectionStrategy, SequentialSelection};
///
/// # #[tokio::main]
/// # async fn main() {
/// let roster = vec!["teams".to_string(), "master".to_string()];
/// let strategy = SequentialSelection::new().with_initial_agent("teams");
/// let history = HistoryView::default();
///
/// assert_eq!(strategy.next(&history, &roster, None).await.unwrap(), "teams");
/// assert_eq!(strategy.next(&history, &roster, Some("teams")).await.unwrap(), "master");
/// assert_eq!(strategy.next(&history, &roster, Some("master")).await.unwrap(), "teams");
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct SequentialSelection {
    initial_agent: Option<String>,
}

impl SequentialSelection {
    /// Start with the first roster entry.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.initial_agent = Some(agent_id.into());
        self
    }
}

#[async_trait]
impl SelectionStrategy for SequentialSelection {
    async fn next(
        &self,
        _history: &HistoryView,
        roster: &[String],
        last_speaker: Option<&str>,
    ) -> Result<String, SelectionError> {
        if roster.is_empty() {
            return Err(SelectionError::EmptyRoster);
        }

        match last_speaker {
            None => match &self.initial_agent {
                Some(initial) if roster.contains(initial) => Ok(initial.clone()),
                Some(initial) => Err(SelectionError::UnknownParticipant(initial.clone())),
                None => Ok(roster[0].clone()),
            },
            Some(last) => {
                let position = roster
                    .iter()
                    .position(|id| id == last)
                    .ok_or_else(|| SelectionError::UnknownParticipant(last.to_string()))?;
                Ok(roster[(position + 1) % roster.len()].clone())
            }
        }
    }
}

/// Follows a fixed adjacency map: after `from` speaks, `to` speaks.
///
/// This expresses "after TeamsAgent it is MasterAgent's turn, after MasterAgent
/// it is TeamsAgent's turn" without touching the turn loop.
#[derive(Debug, Clone)]
pub struct RuleBasedSelection {
    initial_agent: String,
    rules: HashMap<String, String>,
    allow_consecutive: bool,
}

impl RuleBasedSelection {
    pub fn new(initial_agent: impl Into<String>) -> Self {
        Self {
            initial_agent: initial_agent.into(),
            rules: HashMap::new(),
            allow_consecutive: false,
        }
    }

    /// After `from` has spoken, `to` takes the next turn.
    pub fn with_rule(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.rules.insert(from.into(), to.into());
        self
    }

    /// Permit self-loops such as `a -> a`.
    pub fn allow_consecutive_turns(mut self) -> Self {
        self.allow_consecutive = true;
        self
    }
}

#[async_trait]
impl SelectionStrategy for RuleBasedSelection {
    async fn next(
        &self,
        _history: &HistoryView,
        roster: &[String],
        last_speaker: Option<&str>,
    ) -> Result<String, SelectionError> {
        if roster.is_empty() {
            return Err(SelectionError::EmptyRoster);
        }

        match last_speaker {
            None => Ok(self.initial_agent.clone()),
            Some(last) => self
                .rules
                .get(last)
                .cloned()
                .ok_or_else(|| SelectionError::UnknownParticipant(last.to_string())),
        }
    }

    fn allows_consecutive_turns(&self) -> bool {
        self.allow_consecutive
    }
}

/// Parses a model reply into one of the roster's agent ids.
pub type SelectionParser = Arc<dyn Fn(&str, &[String]) -> Option<String> + Send + Sync>;

const DEFAULT_SELECTION_PROMPT: &str = "\
Determine which participant takes the next turn in a conversation based on the most recent participant.
State only the name of the participant to take the next turn.
No participant should take more than one turn in a row.

Choose only from these participants:
{{agents}}

History:
{{history}}";

/// Default reply parser: an exact (trimmed, case-insensitive) match wins,
/// otherwise the first roster id mentioned anywhere in the reply.
pub fn parse_participant(reply: &str, roster: &[String]) -> Option<String> {
    let trimmed = reply.trim().trim_matches(|c: char| c == '"' || c == '.' || c == '\'');
    if let Some(exact) = roster.iter().find(|id| id.eq_ignore_ascii_case(trimmed)) {
        return Some(exact.clone());
    }

    let lowered = reply.to_lowercase();
    roster
        .iter()
        .filter_map(|id| lowered.find(&id.to_lowercase()).map(|pos| (pos, id)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, id)| id.clone())
}

/// Delegates the choice to a model and parses its answer.
///
/// The prompt template may use `{{agents}}` (one `- id` line per roster entry)
/// and `{{history}}` (see [`HistoryView::render_transcript`]). When the reply
/// names no participant, the strategy retries up to `retries` times, then falls
/// back to `fallback_agent` if one is configured, and otherwise fails with
/// [`SelectionError::SelectionParse`].
pub struct PolicyDrivenSelection {
    client: Arc<dyn ClientWrapper>,
    template: String,
    parser: SelectionParser,
    initial_agent: Option<String>,
    fallback_agent: Option<String>,
    retries: usize,
    history_limit: Option<usize>,
    allow_consecutive: bool,
}

impl PolicyDrivenSelection {
    pub fn new(client: Arc<dyn ClientWrapper>) -> Self {
        Self {
            client,
            template: DEFAULT_SELECTION_PROMPT.to_string(),
            parser: Arc::new(parse_participant),
            initial_agent: None,
            fallback_agent: None,
            retries: 1,
            history_limit: None,
            allow_consecutive: false,
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn with_parser(mut self, parser: SelectionParser) -> Self {
        self.parser = parser;
        self
    }

    /// Skip the model on the first turn and start with this agent.
    pub fn with_initial_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.initial_agent = Some(agent_id.into());
        self
    }

    pub fn with_fallback_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.fallback_agent = Some(agent_id.into());
        self
    }

    /// Extra attempts after the first unparseable reply.
    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    /// Only render the last `limit` messages into `{{history}}`.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = Some(limit);
        self
    }

    pub fn allow_consecutive_turns(mut self) -> Self {
        self.allow_consecutive = true;
        self
    }

    fn render_prompt(&self, history: &HistoryView, roster: &[String]) -> String {
        let agents = roster
            .iter()
            .map(|id| format!("- {}", id))
            .collect::<Vec<_>>()
            .join("\n");
        self.template
            .replace("{{agents}}", &agents)
            .replace("{{history}}", &history.render_transcript(self.history_limit))
    }
}

#[async_trait]
impl SelectionStrategy for PolicyDrivenSelection {
    async fn next(
        &self,
        history: &HistoryView,
        roster: &[String],
        last_speaker: Option<&str>,
    ) -> Result<String, SelectionError> {
        if roster.is_empty() {
            return Err(SelectionError::EmptyRoster);
        }
        if last_speaker.is_none() {
            if let Some(initial) = &self.initial_agent {
                return Ok(initial.clone());
            }
        }

        let prompt = [ChatMessage::user(self.render_prompt(history, roster))];
        let mut last_reply = String::new();

        for attempt in 0..=self.retries {
            match self.client.send_message(&prompt).await {
                Ok(reply) => {
                    let text = reply.content().unwrap_or("");
                    if let Some(agent_id) = (self.parser)(text, roster) {
                        return Ok(agent_id);
                    }
                    log::warn!(
                        "Selection attempt {} could not parse a participant from {:?}",
                        attempt + 1,
                        text
                    );
                    last_reply = text.to_string();
                }
                Err(e) => {
                    log::warn!(
                        "Selection attempt {} failed calling '{}': {}",
                        attempt + 1,
                        self.client.model_name(),
                        e
                    );
                    last_reply = e.to_string();
                }
            }
        }

        match &self.fallback_agent {
            Some(fallback) if roster.contains(fallback) => {
                log::info!("Selection falling back to '{}'", fallback);
                Ok(fallback.clone())
            }
            _ => Err(SelectionError::SelectionParse(last_reply)),
        }
    }

    fn allows_consecutive_turns(&self) -> bool {
        self.allow_consecutive
    }
}
