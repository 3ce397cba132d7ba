use agora::client_wrapper::{ClientError, ClientWrapper};
use agora::history::{History, HistoryView};
use agora::message::ChatMessage;
use agora::selection::{
    PolicyDrivenSelection, RuleBasedSelection, SelectionError, SelectionStrategy,
    SequentialSelection,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn ids(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

/// Replies with each scripted answer in turn, repeating the last one.
struct ScriptedClient {
    replies: Vec<Result<String, String>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedClient {
    fn new(replies: Vec<Result<&str, &str>>) -> Self {
        Self {
            replies: replies
                .into_iter()
                .map(|r| r.map(str::to_string).map_err(str::to_string))
                .collect(),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ClientWrapper for ScriptedClient {
    async fn send_message(&self, messages: &[ChatMessage]) -> Result<ChatMessage, ClientError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap()
            .push(messages[0].content().unwrap_or("").to_string());
        let reply = &self.replies[call.min(self.replies.len() - 1)];
        match reply {
            Ok(text) => Ok(ChatMessage::system(text.as_str())),
            Err(e) => Err(e.clone().into()),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[tokio::test]
async fn test_sequential_cycles_from_initial_agent() {
    let roster = ids(&["A", "B"]);
    let strategy = SequentialSelection::new().with_initial_agent("A");
    let history = HistoryView::default();

    let mut last: Option<String> = None;
    let mut order = Vec::new();
    for _ in 0..6 {
        let next = strategy
            .next(&history, &roster, last.as_deref())
            .await
            .unwrap();
        order.push(next.clone());
        last = Some(next);
    }

    assert_eq!(order, ids(&["A", "B", "A", "B", "A", "B"]));
}

#[tokio::test]
async fn test_sequential_defaults_to_first_roster_entry_and_wraps() {
    let roster = ids(&["x", "y", "z"]);
    let strategy = SequentialSelection::new();
    let history = HistoryView::default();

    assert_eq!(strategy.next(&history, &roster, None).await.unwrap(), "x");
    assert_eq!(strategy.next(&history, &roster, Some("z")).await.unwrap(), "x");
    assert_eq!(strategy.next(&history, &roster, Some("x")).await.unwrap(), "y");
}

#[tokio::test]
async fn test_sequential_rejects_unknown_speakers_and_empty_rosters() {
    let history = HistoryView::default();

    let strategy = SequentialSelection::new().with_initial_agent("ghost");
    assert_eq!(
        strategy.next(&history, &ids(&["a"]), None).await,
        Err(SelectionError::UnknownParticipant("ghost".into()))
    );
    assert_eq!(
        SequentialSelection::new()
            .next(&history, &ids(&["a"]), Some("b"))
            .await,
        Err(SelectionError::UnknownParticipant("b".into()))
    );
    assert_eq!(
        SequentialSelection::new().next(&history, &[], None).await,
        Err(SelectionError::EmptyRoster)
    );
}

#[tokio::test]
async fn test_rule_based_two_party_alternation() {
    let roster = ids(&["A", "M"]);
    let strategy = RuleBasedSelection::new("A")
        .with_rule("A", "M")
        .with_rule("M", "A");
    let history = HistoryView::default();

    let mut last: Option<String> = None;
    let mut order = Vec::new();
    for _ in 0..5 {
        let next = strategy
            .next(&history, &roster, last.as_deref())
            .await
            .unwrap();
        if let Some(previous) = &last {
            assert_ne!(previous, &next, "speaker repeated consecutively");
        }
        order.push(next.clone());
        last = Some(next);
    }

    assert_eq!(order, ids(&["A", "M", "A", "M", "A"]));
    assert!(!strategy.allows_consecutive_turns());
}

#[tokio::test]
async fn test_rule_based_unmapped_speaker_is_unknown_participant() {
    let strategy = RuleBasedSelection::new("A").with_rule("A", "M");
    let result = strategy
        .next(&HistoryView::default(), &ids(&["A", "M"]), Some("M"))
        .await;
    assert_eq!(result, Err(SelectionError::UnknownParticipant("M".into())));
}

#[tokio::test]
async fn test_policy_driven_parses_reply_and_renders_prompt() {
    let client = Arc::new(ScriptedClient::new(vec![Ok("TeamsAgent")]));
    let strategy = PolicyDrivenSelection::new(client.clone())
        .with_template("Pick one of:\n{{agents}}\n---\n{{history}}");

    let mut history = History::new();
    history.append(vec![
        ChatMessage::user("calls drop"),
        ChatMessage::from_agent("MasterAgent", "MasterAgent", "need more detail"),
    ]);

    let roster = ids(&["MasterAgent", "TeamsAgent"]);
    let next = strategy
        .next(&history.snapshot(), &roster, Some("MasterAgent"))
        .await
        .unwrap();
    assert_eq!(next, "TeamsAgent");

    let prompts = client.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("- MasterAgent\n- TeamsAgent"));
    assert!(prompts[0].contains("MasterAgent: need more detail"));
}

#[tokio::test]
async fn test_policy_driven_retries_once_then_fails() {
    let client = Arc::new(ScriptedClient::new(vec![Ok("no idea"), Ok("still no idea")]));
    let strategy = PolicyDrivenSelection::new(client.clone());

    let result = strategy
        .next(&HistoryView::default(), &ids(&["a1", "b1"]), Some("a1"))
        .await;

    assert_eq!(
        result,
        Err(SelectionError::SelectionParse("still no idea".into()))
    );
    assert_eq!(client.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_policy_driven_recovers_on_retry() {
    let client = Arc::new(ScriptedClient::new(vec![Err("rate limited"), Ok("b1")]));
    let strategy = PolicyDrivenSelection::new(client.clone());

    let next = strategy
        .next(&HistoryView::default(), &ids(&["a1", "b1"]), Some("a1"))
        .await
        .unwrap();

    assert_eq!(next, "b1");
    assert_eq!(client.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_policy_driven_fallback_and_initial_agent() {
    let client = Arc::new(ScriptedClient::new(vec![Ok("???")]));
    let strategy = PolicyDrivenSelection::new(client.clone())
        .with_retries(0)
        .with_initial_agent("a1")
        .with_fallback_agent("b1");
    let roster = ids(&["a1", "b1"]);
    let history = HistoryView::default();

    // First turn never consults the model
    assert_eq!(strategy.next(&history, &roster, None).await.unwrap(), "a1");
    assert_eq!(client.calls.load(Ordering::SeqCst), 0);

    assert_eq!(
        strategy.next(&history, &roster, Some("a1")).await.unwrap(),
        "b1"
    );
    assert_eq!(client.calls.load(Ordering::SeqCst), 1);
}
