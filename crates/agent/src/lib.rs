//! The agent loop of Policy Agent.
//!
//! A run follows a **Think → Act → Observe** cycle:
//!
//! 1. **Receive** a user request and append it to the session history
//! 2. **Think**: stream one completion with the system prompt, the
//!    conversation and the tool definitions
//! 3. **Act**: if the model called a tool, execute exactly that one tool and
//!    append its observation, then think again
//! 4. **Answer**: plain text ends the run
//!
//! The run stops with exactly one [`RunOutcome`]: `Done` with the answer, or
//! `Failed` when the step budget runs out, the model keeps calling tools that
//! do not exist, the provider fails, or the caller cancels.

pub mod loop_runner;
pub mod outcome;
pub mod prompt;
pub mod stream_event;

#[cfg(test)]
mod test_helpers;

pub use loop_runner::AgentLoop;
pub use outcome::{FailureReason, RunOutcome};
pub use prompt::{resolve_system_prompt, DEFAULT_SYSTEM_PROMPT};
pub use stream_event::{
    check_trace, final_answer_from_tokens, AgentEvent, NoopObserver, RecordingObserver,
    TraceObserver,
};
