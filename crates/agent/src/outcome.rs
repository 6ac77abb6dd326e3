//! Terminal results of an agent run.

use policy_agent_core::message::Conversation;
use thiserror::Error;

/// Why a run stopped without an answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("the model kept calling an unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("step budget of {budget} exhausted before a final answer")]
    BudgetExhausted { budget: u32 },

    #[error("run cancelled")]
    Cancelled,

    #[error("provider error: {0}")]
    Provider(String),
}

impl FailureReason {
    /// Stable machine-readable code, used in `run_failed` events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownTool { .. } => "unknown_tool",
            Self::BudgetExhausted { .. } => "budget_exhausted",
            Self::Cancelled => "cancelled",
            Self::Provider(_) => "provider_error",
        }
    }
}

/// Exactly one of these ends every run.
///
/// Both variants carry the full conversation as it stood when the run
/// stopped, including the new user message and every tool exchange.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Done {
        /// Everything the model streamed during the run.
        answer: String,
        conversation: Conversation,
        steps: u32,
        tool_calls: u32,
    },
    Failed {
        reason: FailureReason,
        conversation: Conversation,
        steps: u32,
    },
}

impl RunOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }

    pub fn answer(&self) -> Option<&str> {
        match self {
            Self::Done { answer, .. } => Some(answer),
            Self::Failed { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            Self::Done { .. } => None,
            Self::Failed { reason, .. } => Some(reason),
        }
    }

    pub fn conversation(&self) -> &Conversation {
        match self {
            Self::Done { conversation, .. } | Self::Failed { conversation, .. } => conversation,
        }
    }

    /// Number of THINKING entries the run made.
    pub fn steps(&self) -> u32 {
        match self {
            Self::Done { steps, .. } | Self::Failed { steps, .. } => *steps,
        }
    }
}
