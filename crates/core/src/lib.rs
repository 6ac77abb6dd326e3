//! # Policy Agent Core
//!
//! Domain types, traits, and error definitions for the Policy Agent
//! assistant. This crate has **zero framework dependencies**: it defines the
//! domain model that the provider, tool and agent crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the agent loop is a trait here (`Provider`, `Tool`).
//! Implementations live in their respective crates, which keeps the loop
//! testable with scripted providers and stub tools.

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{ProviderError, ToolError};
pub use message::{Conversation, ConversationId, Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolDefinition, Usage};
pub use tool::{
    ParamSpec, ParamType, Tool, ToolArgs, ToolInput, ToolInvocation, ToolKind, ToolObservation,
    ToolRegistry, ToolSpec,
};
