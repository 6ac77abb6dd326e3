//! Agent-level trace events.
//!
//! Every run emits an ordered stream of `AgentEvent`s to a [`TraceObserver`]:
//! token fragments as the model streams, a start/end pair around each tool
//! call, and exactly one terminal event (`final_answer` or `run_failed`).

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;

/// Events emitted by the agent while a run is in progress.
///
/// - `token`        partial text from the LLM
/// - `tool_start`   the agent is invoking a tool
/// - `tool_end`     the tool produced its observation
/// - `final_answer` the run completed with this answer
/// - `run_failed`   the run stopped without an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Partial text token from the LLM.
    Token { text: String },

    /// The agent is calling a tool.
    ToolStart {
        tool_name: String,
        arguments: serde_json::Value,
    },

    /// Tool execution completed, successfully or not.
    ToolEnd {
        tool_name: String,
        output: String,
        succeeded: bool,
    },

    /// The run is complete.
    FinalAnswer { text: String },

    /// The run ended in a failure state.
    RunFailed { code: String, message: String },
}

impl AgentEvent {
    /// Wire name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Token { .. } => "token",
            Self::ToolStart { .. } => "tool_start",
            Self::ToolEnd { .. } => "tool_end",
            Self::FinalAnswer { .. } => "final_answer",
            Self::RunFailed { .. } => "run_failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FinalAnswer { .. } | Self::RunFailed { .. })
    }
}

/// Receives trace events in emission order.
///
/// Called inline from the run, so implementations should return quickly.
pub trait TraceObserver: Send + Sync {
    fn on_event(&self, event: &AgentEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TraceObserver for NoopObserver {
    fn on_event(&self, _event: &AgentEvent) {}
}

/// Keeps every event for later inspection.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<AgentEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AgentEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl TraceObserver for RecordingObserver {
    fn on_event(&self, event: &AgentEvent) {
        let mut events = self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        events.push(event.clone());
    }
}

/// Forwards events into a channel. A closed receiver drops them silently.
impl TraceObserver for UnboundedSender<AgentEvent> {
    fn on_event(&self, event: &AgentEvent) {
        let _ = self.send(event.clone());
    }
}

/// Rebuild the final answer by concatenating every token fragment in
/// emission order.
///
/// For a completed run this equals the `FinalAnswer` text, including any
/// narration the model streamed before its tool calls.
pub fn final_answer_from_tokens(events: &[AgentEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::Token { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

/// Check that a trace follows the event grammar:
/// `Token* (ToolStart ToolEnd Token*)* (FinalAnswer | RunFailed)`,
/// where the terminal event may be missing only while a run is in progress.
pub fn check_trace(events: &[AgentEvent]) -> Result<(), String> {
    let mut open_tool: Option<&str> = None;

    for (i, event) in events.iter().enumerate() {
        if i > 0 && events[i - 1].is_terminal() {
            return Err(format!("event {i} ({}) follows the terminal event", event.event_type()));
        }

        match event {
            AgentEvent::ToolStart { tool_name, .. } => {
                if let Some(open) = open_tool {
                    return Err(format!("tool_start for {tool_name} while {open} is in flight"));
                }
                open_tool = Some(tool_name.as_str());
            }
            AgentEvent::ToolEnd { tool_name, .. } => match open_tool.take() {
                Some(open) if open == tool_name.as_str() => {}
                Some(open) => return Err(format!("tool_end for {tool_name} closes {open}")),
                None => return Err(format!("tool_end for {tool_name} without tool_start")),
            },
            other => {
                if let Some(open) = open_tool {
                    return Err(format!("{} while {open} is in flight", other.event_type()));
                }
            }
        }
    }

    Ok(())
}
