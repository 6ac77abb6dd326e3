//! LLM Provider implementations for Policy Agent.
//!
//! All providers implement the `policy_agent_core::Provider` trait.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
