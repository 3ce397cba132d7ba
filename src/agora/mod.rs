// src/agora/mod.rs

pub mod agent;
pub mod client_wrapper;
pub mod config;
pub mod conversation_group;
pub mod event;
pub mod history;
pub mod message;
pub mod runner;
pub mod selection;
pub mod termination;

pub use conversation_group::ConversationGroup;
pub use runner::GroupRunner;
