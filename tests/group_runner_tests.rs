use agora::agent::{message_stream, Agent, AgentError, MessageStream};
use agora::conversation_group::{CompletionReason, ConversationGroup, GroupError};
use agora::event::{EventHandler, GroupEvent};
use agora::history::HistoryView;
use agora::message::ChatMessage;
use agora::runner::GroupRunner;
use agora::selection::SequentialSelection;
use agora::termination::{ApprovalTermination, IterationCap};
use agora::GroupConfig;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;
use tokio_util::sync::CancellationToken;

struct StepAgent {
    id: String,
    reply: String,
    calls: AtomicUsize,
    fail_on: Option<usize>,
    panic_on: Option<usize>,
    delay: Option<Duration>,
    barrier: Option<Arc<Barrier>>,
}

impl StepAgent {
    fn new(id: &str, reply: &str) -> Self {
        Self {
            id: id.to_string(),
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
            fail_on: None,
            panic_on: None,
            delay: None,
            barrier: None,
        }
    }

    fn failing_on(mut self, call: usize) -> Self {
        self.fail_on = Some(call);
        self
    }

    fn panicking_on(mut self, call: usize) -> Self {
        self.panic_on = Some(call);
        self
    }

    /// Block until every holder of `barrier` is mid-turn at the same time.
    fn meeting_at(mut self, barrier: Arc<Barrier>) -> Self {
        self.barrier = Some(barrier);
        self
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Agent for StepAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.id
    }

    async fn invoke(&self, _history: HistoryView) -> Result<MessageStream, AgentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        if self.panic_on == Some(call) {
            panic!("{} hit a bug on call {}", self.id, call);
        }
        if self.fail_on == Some(call) {
            return Err("backend unavailable".into());
        }
        Ok(message_stream(vec![ChatMessage::from_agent(
            &self.id,
            &self.id,
            self.reply.as_str(),
        )]))
    }
}

#[derive(Default)]
struct GroupIdCollector {
    started: Mutex<HashSet<String>>,
}

#[async_trait]
impl EventHandler for GroupIdCollector {
    async fn on_group_event(&self, event: &GroupEvent) {
        if let GroupEvent::RunStarted { group_id, .. } = event {
            self.started.lock().unwrap().insert(group_id.clone());
        }
    }
}

fn capped_group(id: &str, max_iterations: usize, agents: Vec<StepAgent>) -> ConversationGroup {
    let mut group = ConversationGroup::new(
        Arc::new(SequentialSelection::new()),
        Arc::new(IterationCap::new(usize::MAX)),
    )
    .with_id(id)
    .with_config(GroupConfig::default().with_max_iterations(max_iterations));
    for agent in agents {
        group.add_agent(Arc::new(agent)).unwrap();
    }
    group
}

#[tokio::test]
async fn test_failing_group_does_not_affect_sibling() {
    let failing = capped_group(
        "failing",
        10,
        vec![StepAgent::new("a", "ok"), StepAgent::new("b", "ok").failing_on(1)],
    );
    let healthy = capped_group(
        "healthy",
        3,
        vec![StepAgent::new("x", "ok"), StepAgent::new("y", "ok")],
    );

    let report = GroupRunner::new()
        .run_all(vec![
            (failing, ChatMessage::user("first problem")),
            (healthy, ChatMessage::user("second problem")),
        ])
        .await;

    assert_eq!(report.len(), 2);
    let ids: Vec<&str> = report.iter().map(|(id, _)| id).collect();
    assert_eq!(ids, vec!["failing", "healthy"]);

    let aborted = report.get("failing").unwrap().as_ref().unwrap_err();
    assert!(matches!(
        aborted.reason,
        GroupError::AgentInvocation { ref agent_id, .. } if agent_id == "b"
    ));
    assert_eq!(aborted.iterations, 1);
    assert_eq!(aborted.history.len(), 2);

    let outcome = report.get("healthy").unwrap().as_ref().unwrap();
    assert_eq!(outcome.iterations, 3);
    assert_eq!(outcome.reason, CompletionReason::IterationCapReached);
    assert_eq!(outcome.history.len(), 4);
    assert_eq!(outcome.history[0].content(), Some("second problem"));

    assert_eq!(report.completed().count(), 1);
    assert_eq!(report.aborted().count(), 1);
}

#[tokio::test]
async fn test_results_follow_submission_order_not_finish_order() {
    let slow = capped_group(
        "slow",
        2,
        vec![StepAgent::new("s", "late").slow(Duration::from_millis(50))],
    );
    let fast = capped_group("fast", 2, vec![StepAgent::new("f", "early")]);

    let report = GroupRunner::new()
        .run_all(vec![
            (slow, ChatMessage::user("slow")),
            (fast, ChatMessage::user("fast")),
        ])
        .await;

    let entries = report.into_entries();
    assert_eq!(entries[0].0, "slow");
    assert_eq!(entries[1].0, "fast");
    assert!(entries.iter().all(|(_, result)| result.is_ok()));
}

#[tokio::test]
async fn test_groups_run_concurrently() {
    // Each agent waits until all four groups are mid-turn; run sequentially,
    // the first group would wait forever.
    let barrier = Arc::new(Barrier::new(4));
    let groups = (0..4)
        .map(|i| {
            let group = capped_group(
                &format!("g{}", i),
                1,
                vec![StepAgent::new("w", "done").meeting_at(Arc::clone(&barrier))],
            );
            (group, ChatMessage::user("go"))
        })
        .collect();

    let report = tokio::time::timeout(Duration::from_secs(30), GroupRunner::new().run_all(groups))
        .await
        .expect("groups did not run concurrently");

    assert_eq!(report.completed().count(), 4);
}

#[tokio::test]
async fn test_panicking_agent_keeps_partial_history() {
    let crashing = capped_group(
        "crashing",
        10,
        vec![StepAgent::new("a", "ok").panicking_on(2), StepAgent::new("b", "ok")],
    );
    let healthy = capped_group("healthy", 2, vec![StepAgent::new("x", "ok")]);

    let report = GroupRunner::new()
        .run_all(vec![
            (crashing, ChatMessage::user("first problem")),
            (healthy, ChatMessage::user("second problem")),
        ])
        .await;

    // Turns a1 and b1 completed; a2 panicked
    let aborted = report.get("crashing").unwrap().as_ref().unwrap_err();
    match &aborted.reason {
        GroupError::AgentInvocation { agent_id, message } => {
            assert_eq!(agent_id, "a");
            assert!(message.contains("a hit a bug on call 2"));
        }
        other => panic!("unexpected reason: {:?}", other),
    }
    assert_eq!(aborted.iterations, 2);
    assert_eq!(aborted.history.len(), 3);

    let outcome = report.get("healthy").unwrap().as_ref().unwrap();
    assert_eq!(outcome.iterations, 2);
}

#[tokio::test]
async fn test_already_run_group_is_reported_not_spawned() {
    let mut used = capped_group("used", 1, vec![StepAgent::new("a", "ok")]);
    used.run().await.unwrap();

    let report = GroupRunner::new()
        .run_all(vec![(used, ChatMessage::user("again"))])
        .await;

    let aborted = report.get("used").unwrap().as_ref().unwrap_err();
    assert!(matches!(aborted.reason, GroupError::InvalidAppend(_)));
    assert_eq!(aborted.history.len(), 1);
}

#[tokio::test]
async fn test_runner_cancellation_and_shared_handler() {
    let token = CancellationToken::new();
    let handler = Arc::new(GroupIdCollector::default());

    let groups = ["one", "two"]
        .iter()
        .map(|id| {
            let group = capped_group(
                id,
                1000,
                vec![
                    StepAgent::new("a", "thinking").slow(Duration::from_millis(5)),
                    StepAgent::new("b", "thinking").slow(Duration::from_millis(5)),
                ],
            );
            (group, ChatMessage::user("endless"))
        })
        .collect();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(40)).await;
        canceller.cancel();
    });

    let report = GroupRunner::new()
        .with_cancellation(token)
        .with_event_handler(handler.clone())
        .run_all(groups)
        .await;

    for (_, result) in report.iter() {
        let aborted = result.as_ref().unwrap_err();
        assert!(aborted.is_cancelled());
        // seed plus one message per completed turn
        assert_eq!(aborted.history.len(), aborted.iterations + 1);
    }

    let started = handler.started.lock().unwrap();
    assert!(started.contains("one"));
    assert!(started.contains("two"));
}

#[tokio::test]
async fn test_empty_submission() {
    let report = GroupRunner::new().run_all(Vec::new()).await;
    assert!(report.is_empty());
}

#[tokio::test]
async fn test_approval_groups_under_runner() {
    let mut group = ConversationGroup::new(
        Arc::new(SequentialSelection::new().with_initial_agent("specialist")),
        Arc::new(ApprovalTermination::new(["master"])),
    )
    .with_id("support");
    group
        .add_agent(Arc::new(StepAgent::new("specialist", "Try reinstalling")))
        .unwrap();
    group
        .add_agent(Arc::new(StepAgent::new("master", "Looks right. SUCCESS")))
        .unwrap();

    let report = GroupRunner::new()
        .run_all(vec![(group, ChatMessage::user("App crashes"))])
        .await;

    let outcome = report.get("support").unwrap().as_ref().unwrap();
    assert_eq!(outcome.reason, CompletionReason::TerminationSignaled);
    assert_eq!(
        outcome.history.last_from("specialist").unwrap().content(),
        Some("Try reinstalling")
    );
}
