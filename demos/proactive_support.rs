//! Proactive Support Demo
//!
//! Two independent support desks run side by side. In each one a specialist
//! agent (Microsoft Teams, Azure Kubernetes Service) proposes a fix for a
//! reported problem and a master agent reviews it, replying `SUCCESS` once the
//! solution is good enough.
//!
//! The model clients here are scripted so the demo runs offline; swap
//! `ScriptedClient` for any real `ClientWrapper` implementation.
//!
//! Run with: RUST_LOG=agora=info cargo run --example proactive_support

use agora::agent::InstructedAgent;
use agora::client_wrapper::{ClientError, ClientWrapper};
use agora::event::{EventHandler, GroupEvent};
use agora::message::{ChatMessage, ContentItem};
use agora::selection::SequentialSelection;
use agora::termination::ApprovalTermination;
use agora::{ConversationGroup, GroupConfig, GroupRunner};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const TEAMS_AGENT: &str = "TeamsAgent";
const AZURE_AGENT: &str = "AzureAgent";
const MASTER_AGENT: &str = "MasterAgent";

const TEAMS_INSTRUCTIONS: &str = "You are a proactive support agent specialized in Microsoft Teams. \
Analyze usage patterns such as frequent disconnections and crashes, decide whether the Teams \
system state is optimal and, if not, propose a solution.";

const AZURE_INSTRUCTIONS: &str = "You are a proactive support agent specialized in Azure Kubernetes \
Service (AKS). Analyze cluster health such as node resource exhaustion, decide whether the AKS \
system state is optimal and, if not, propose a solution.";

const MASTER_INSTRUCTIONS: &str = "You are the master agent. Evaluate the solutions proposed by the \
specialist agents. If a solution is sufficient, reply with SUCCESS; otherwise explain what is missing.";

/// Replays canned answers, one per call, repeating the last one.
struct ScriptedClient {
    model: String,
    replies: Vec<ChatMessage>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    fn new(model: &str, replies: Vec<ChatMessage>) -> Self {
        Self {
            model: model.to_string(),
            replies,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ClientWrapper for ScriptedClient {
    async fn send_message(&self, _messages: &[ChatMessage]) -> Result<ChatMessage, ClientError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let last = self.replies.len().saturating_sub(1);
        self.replies
            .get(call.min(last))
            .cloned()
            .ok_or_else(|| format!("model '{}' has no scripted replies", self.model).into())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Prints every turn as it happens.
struct TranscriptPrinter;

#[async_trait]
impl EventHandler for TranscriptPrinter {
    async fn on_group_event(&self, event: &GroupEvent) {
        match event {
            GroupEvent::RunStarted {
                group_name,
                agent_count,
                max_iterations,
                ..
            } => {
                println!(
                    "\n[{}] started: {} agents, up to {} turns",
                    group_name, agent_count, max_iterations
                );
            }
            GroupEvent::AgentResponded {
                group_id,
                iteration,
                messages,
                ..
            } => {
                for message in messages {
                    let author = message
                        .author_name()
                        .or(message.author_id())
                        .unwrap_or("unknown");
                    println!(
                        "[{}] #{} {} ({}): {}",
                        group_id,
                        iteration,
                        author,
                        message.role(),
                        message.content().unwrap_or("")
                    );
                    for item in message.items() {
                        print_item(group_id, item);
                    }
                }
            }
            GroupEvent::AgentFailed {
                group_id,
                agent_id,
                error,
                ..
            } => {
                println!("[{}] {} failed: {}", group_id, agent_id, error);
            }
            GroupEvent::RunCompleted {
                group_id,
                iterations,
                reason,
                ..
            } => {
                println!("[{}] completed after {} turns ({:?})", group_id, iterations, reason);
            }
            GroupEvent::RunAborted {
                group_id, reason, ..
            } => {
                println!("[{}] aborted: {}", group_id, reason);
            }
            _ => {}
        }
    }
}

fn print_item(group_id: &str, item: &ContentItem) {
    match item {
        ContentItem::Text { text } => println!("[{}]     text: {}", group_id, text),
        ContentItem::Annotation { quote, file_ref } => {
            println!("[{}]     annotation: \"{}\" ({})", group_id, quote, file_ref)
        }
        ContentItem::FileReference { file_ref } => {
            println!("[{}]     file: {}", group_id, file_ref)
        }
        ContentItem::Image { source } => println!("[{}]     image: {}", group_id, source),
        ContentItem::FunctionCall { call_id } => {
            println!("[{}]     function call: {}", group_id, call_id)
        }
        ContentItem::FunctionResult { call_id } => {
            println!("[{}]     function result: {}", group_id, call_id)
        }
    }
}

fn support_group(
    id: &str,
    specialist: Arc<InstructedAgent>,
    master: Arc<InstructedAgent>,
) -> Result<ConversationGroup, Box<dyn std::error::Error>> {
    let specialist_id = specialist.id.clone();
    let mut group = ConversationGroup::new(
        Arc::new(SequentialSelection::new().with_initial_agent(specialist_id)),
        Arc::new(ApprovalTermination::new([MASTER_AGENT])),
    )
    .with_id(id)
    .with_name(format!("{} support desk", id))
    .with_config(GroupConfig::default().with_max_iterations(10));

    group.add_agent(specialist)?;
    group.add_agent(master)?;
    Ok(group)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    agora::init_logger();

    println!("=== Proactive Support using Multi-Agents ===");

    let teams_client = Arc::new(ScriptedClient::new(
        "scripted-teams",
        vec![
            ChatMessage::system(
                "Disconnections correlate with Wi-Fi roaming. Suggest switching the client to a wired connection.",
            ),
            ChatMessage::system(
                "Updated plan: update the Teams client, clear its cache, and enable QoS tagging for media traffic on the corporate network.",
            )
            .with_item(ContentItem::FileReference {
                file_ref: "teams-network-qos.md".into(),
            }),
        ],
    ));
    let azure_client = Arc::new(ScriptedClient::new(
        "scripted-azure",
        vec![ChatMessage::system(
            "Nodes hit memory pressure. Enable the cluster autoscaler and set resource requests and limits on the noisy workloads.",
        )
        .with_item(ContentItem::Annotation {
            quote: "node-3 MemoryPressure=True".into(),
            file_ref: "kubectl-describe-nodes.txt".into(),
        })
        .with_metadata("confidence", 0.9)],
    ));
    let teams_master_client = Arc::new(ScriptedClient::new(
        "scripted-master",
        vec![
            ChatMessage::system(
                "A wired connection is not always available. Propose a fix that works for remote users.",
            ),
            ChatMessage::system("The proposal addresses the root cause. SUCCESS"),
        ],
    ));
    let azure_master_client = Arc::new(ScriptedClient::new(
        "scripted-master",
        vec![ChatMessage::system(
            "Autoscaling plus resource limits is sufficient. SUCCESS",
        )],
    ));

    let teams_agent = Arc::new(
        InstructedAgent::new(TEAMS_AGENT, TEAMS_AGENT, teams_client)
            .with_instructions(TEAMS_INSTRUCTIONS),
    );
    let azure_agent = Arc::new(
        InstructedAgent::new(AZURE_AGENT, AZURE_AGENT, azure_client)
            .with_instructions(AZURE_INSTRUCTIONS),
    );
    let master_agent = |client: Arc<ScriptedClient>| {
        Arc::new(
            InstructedAgent::new(MASTER_AGENT, MASTER_AGENT, client)
                .with_instructions(MASTER_INSTRUCTIONS),
        )
    };

    let teams_chat = support_group("teams", teams_agent, master_agent(teams_master_client))?;
    let azure_chat = support_group("azure", azure_agent, master_agent(azure_master_client))?;

    let report = GroupRunner::new()
        .with_event_handler(Arc::new(TranscriptPrinter))
        .run_all(vec![
            (
                teams_chat,
                ChatMessage::user(
                    "Teams issue: frequent disconnections and crashes during video calls.",
                ),
            ),
            (
                azure_chat,
                ChatMessage::user("AKS issue: node resource exhaustion in the production cluster."),
            ),
        ])
        .await;

    println!("\n=== Final solutions ===");
    for (group_id, result) in report.iter() {
        match result {
            Ok(outcome) => {
                let solution = outcome
                    .history
                    .iter()
                    .rev()
                    .find(|m| m.author_id().map_or(false, |id| id != MASTER_AGENT))
                    .and_then(|m| m.content())
                    .unwrap_or("(no proposal)");
                let verdict = outcome
                    .history
                    .last_from(MASTER_AGENT)
                    .and_then(|m| m.content())
                    .unwrap_or("(no verdict)");
                println!("[{}] solution: {}", group_id, solution);
                println!("[{}] verdict:  {}", group_id, verdict);
            }
            Err(aborted) => println!("[{}] {}", group_id, aborted),
        }
    }

    Ok(())
}
