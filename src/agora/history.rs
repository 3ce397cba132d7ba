//! Append-only conversation log and its read-only snapshots.
//!
//! A [`History`] is owned by exactly one
//! [`ConversationGroup`](crate::conversation_group::ConversationGroup), which is
//! its only writer. Agents and strategies only ever see a [`HistoryView`]: a
//! point-in-time snapshot whose length never changes, even if the group appends
//! more messages afterwards.
//!
//! Snapshots share storage with the log through an `Arc`, so taking one is O(1).
//! Appending while a snapshot is alive clones the backing vector once
//! (copy-on-write); message contents are `Arc<str>` so this stays cheap.
//!
//! ```
//! use agora::history::History;
//! use agora::message::ChatMessage;
//!
//! let mut history = History::new();
//! history.append(vec![ChatMessage::user("hi")]);
//! let before = history.snapshot();
//!
//! history.append(vec![ChatMessage::from_agent("a", "Alice", "hello")]);
//! assert_eq!(before.len(), 1);
//! assert_eq!(history.snapshot().len(), 2);
//! ```

use crate::agora::message::ChatMessage;
use std::ops::Index;
use std::sync::Arc;

/// The append-only message log of one conversation.
#[derive(Debug, Clone, Default)]
pub struct History {
    messages: Arc<Vec<ChatMessage>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend the log with `messages`, preserving their order.
    ///
    /// Existing entries are never reordered or modified; outstanding snapshots
    /// keep seeing exactly what they saw before the call.
    pub fn append<I>(&mut self, messages: I)
    where
        I: IntoIterator<Item = ChatMessage>,
    {
        let mut messages = messages.into_iter().peekable();
        if messages.peek().is_none() {
            return;
        }
        Arc::make_mut(&mut self.messages).extend(messages);
    }

    /// An immutable view of every message appended so far.
    pub fn snapshot(&self) -> HistoryView {
        HistoryView {
            messages: Arc::clone(&self.messages),
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// A read-only, point-in-time view of a [`History`].
#[derive(Debug, Clone, Default)]
pub struct HistoryView {
    messages: Arc<Vec<ChatMessage>>,
}

impl HistoryView {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ChatMessage> {
        self.messages.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChatMessage> {
        self.messages.iter()
    }

    pub fn as_slice(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// The most recent message, if any.
    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// The most recent message authored by `agent_id`.
    ///
    /// Callers use this (rather than a fixed offset from the end) to pull out
    /// e.g. the last proposal an approver signed off on.
    pub fn last_from(&self, agent_id: &str) -> Option<&ChatMessage> {
        self.messages.iter().rev().find(|m| m.is_from(agent_id))
    }

    pub fn to_vec(&self) -> Vec<ChatMessage> {
        self.messages.as_ref().clone()
    }

    /// Plain-text transcript of the last `limit` messages (all when `None`),
    /// one `author: content` line per message.
    ///
    /// Used to fill the `{{history}}` placeholder of policy-driven strategies.
    pub fn render_transcript(&self, limit: Option<usize>) -> String {
        let skip = match limit {
            Some(limit) => self.messages.len().saturating_sub(limit),
            None => 0,
        };

        self.messages
            .iter()
            .skip(skip)
            .map(|m| {
                let author = m
                    .author_name()
                    .or_else(|| m.author_id())
                    .map(str::to_string)
                    .unwrap_or_else(|| m.role().to_string());
                format!("{}: {}", author, m.content().unwrap_or(""))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Index<usize> for HistoryView {
    type Output = ChatMessage;

    fn index(&self, index: usize) -> &Self::Output {
        &self.messages[index]
    }
}

impl<'a> IntoIterator for &'a HistoryView {
    type Item = &'a ChatMessage;
    type IntoIter = std::slice::Iter<'a, ChatMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshots_are_stable_across_appends() {
        let mut history = History::new();
        history.append(vec![ChatMessage::user("seed")]);
        let first = history.snapshot();

        history.append(vec![
            ChatMessage::from_agent("a", "A", "one"),
            ChatMessage::from_agent("a", "A", "two"),
        ]);

        assert_eq!(first.len(), 1);
        let second = history.snapshot();
        assert_eq!(second.len(), 3);
        assert_eq!(second[1].content(), Some("one"));
        assert_eq!(second[2].content(), Some("two"));
    }

    #[test]
    fn empty_append_is_a_no_op() {
        let mut history = History::new();
        history.append(Vec::new());
        assert!(history.is_empty());
    }

    #[test]
    fn last_from_finds_most_recent_author_message() {
        let mut history = History::new();
        history.append(vec![
            ChatMessage::user("seed"),
            ChatMessage::from_agent("teams", "TeamsAgent", "proposal 1"),
            ChatMessage::from_agent("master", "MasterAgent", "needs work"),
            ChatMessage::from_agent("teams", "TeamsAgent", "proposal 2"),
            ChatMessage::from_agent("master", "MasterAgent", "SUCCESS"),
        ]);

        let view = history.snapshot();
        assert_eq!(view.last_from("teams").unwrap().content(), Some("proposal 2"));
        assert!(view.last_from("azure").is_none());
    }

    #[test]
    fn transcript_respects_limit() {
        let mut history = History::new();
        history.append(vec![
            ChatMessage::user("seed"),
            ChatMessage::from_agent("a", "Alice", "first"),
            ChatMessage::from_agent("b", "Bob", "second"),
        ]);

        let view = history.snapshot();
        assert_eq!(view.render_transcript(Some(2)), "Alice: first\nBob: second");
        assert!(view.render_transcript(None).starts_with("user: seed"));
    }
}
