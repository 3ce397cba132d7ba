use crate::agora::message::ChatMessage;
use async_trait::async_trait;
use std::error::Error;

/// Boxed error returned by model clients.
pub type ClientError = Box<dyn Error + Send + Sync>;

/// A ClientWrapper is the boundary to whatever produces model completions.
///
/// The engine never talks to a provider itself. Policy-driven strategies
/// ([`PolicyDrivenSelection`](crate::selection::PolicyDrivenSelection),
/// [`PolicyDrivenTermination`](crate::termination::PolicyDrivenTermination)) and
/// [`InstructedAgent`](crate::agent::InstructedAgent) all delegate to a
/// ClientWrapper, so any provider SDK (or a scripted mock in tests) can be
/// plugged in by implementing this trait.
///
/// Implementations must tolerate concurrent calls: one client is typically
/// shared by several agents and groups via `Arc`.
#[async_trait]
pub trait ClientWrapper: Send + Sync {
    /// Send the conversation so far and return the model's reply.
    ///
    /// The returned message's role and attribution are ignored by callers that
    /// re-attribute the reply (e.g. [`InstructedAgent`](crate::agent::InstructedAgent)).
    async fn send_message(&self, messages: &[ChatMessage]) -> Result<ChatMessage, ClientError>;

    /// Identifier of the underlying model, used in logs.
    fn model_name(&self) -> &str;
}
