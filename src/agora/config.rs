//! Per-group configuration.
//!
//! There is no process-wide configuration: every
//! [`ConversationGroup`](crate::conversation_group::ConversationGroup) receives
//! its own [`GroupConfig`]. Users construct it however they want; no config-file
//! parsing dependencies are introduced.
//!
//! # Example
//!
//! ```rust
//! use agora::GroupConfig;
//!
//! // Ten turns, as in the reference support-desk scenario
//! let config = GroupConfig::default();
//! assert_eq!(config.max_iterations, 10);
//!
//! let short = GroupConfig::default().with_max_iterations(3);
//! assert_eq!(short.max_iterations, 3);
//! ```

/// Limits applied to a single conversation group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupConfig {
    /// Hard upper bound on turns. Reaching it completes the group normally.
    pub max_iterations: usize,
}

impl GroupConfig {
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self { max_iterations: 10 }
    }
}
