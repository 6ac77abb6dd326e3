//! Terminal rendering of the agent trace.

use policy_agent_agent::{AgentEvent, TraceObserver};
use std::io::Write;
use std::sync::Mutex;

/// Tool output longer than this is cut in the transcript.
pub const TOOL_OUTPUT_LIMIT: usize = 500;

pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max).collect();
    cut.push_str("...");
    cut
}

struct State<W> {
    out: W,
    mid_line: bool,
}

/// Streams tokens as they arrive and frames each tool call.
pub struct TerminalRenderer<W: Write + Send> {
    state: Mutex<State<W>>,
}

impl TerminalRenderer<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            state: Mutex::new(State {
                out,
                mid_line: false,
            }),
        }
    }

    pub fn into_inner(self) -> W {
        let state = self
            .state
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.out
    }

    fn write(state: &mut State<W>, event: &AgentEvent) -> std::io::Result<()> {
        let out = &mut state.out;
        match event {
            AgentEvent::Token { text } => {
                if !state.mid_line {
                    write!(out, "\n  助手 > ")?;
                    state.mid_line = true;
                }
                write!(out, "{text}")?;
            }
            AgentEvent::ToolStart {
                tool_name,
                arguments,
            } => {
                if state.mid_line {
                    writeln!(out)?;
                    state.mid_line = false;
                }
                writeln!(out, "  🔧 调用工具: {tool_name}")?;
                writeln!(out, "     输入: {arguments}")?;
            }
            AgentEvent::ToolEnd {
                output, succeeded, ..
            } => {
                let shown = truncate_chars(output, TOOL_OUTPUT_LIMIT);
                if *succeeded {
                    writeln!(out, "     工具输出: {shown}")?;
                } else {
                    writeln!(out, "     ⚠️  工具出错: {shown}")?;
                }
            }
            AgentEvent::FinalAnswer { .. } => {
                writeln!(out)?;
                state.mid_line = false;
            }
            AgentEvent::RunFailed { code, message } => {
                if state.mid_line {
                    writeln!(out)?;
                    state.mid_line = false;
                }
                writeln!(out, "  ❌ 运行失败 [{code}]: {message}")?;
            }
        }
        out.flush()
    }
}

impl<W: Write + Send> TraceObserver for TerminalRenderer<W> {
    fn on_event(&self, event: &AgentEvent) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = Self::write(&mut state, event) {
            tracing::debug!("Terminal write failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(events: &[AgentEvent]) -> String {
        let renderer = TerminalRenderer::new(Vec::new());
        for e in events {
            renderer.on_event(e);
        }
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    #[test]
    fn truncates_by_characters() {
        assert_eq!(truncate_chars("短", 500), "短");
        let long = "政".repeat(600);
        let cut = truncate_chars(&long, TOOL_OUTPUT_LIMIT);
        assert_eq!(cut.chars().count(), TOOL_OUTPUT_LIMIT + 3);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn tool_call_is_framed_and_output_cut() {
        let text = rendered(&[
            AgentEvent::ToolStart {
                tool_name: "policy_search".into(),
                arguments: serde_json::json!({"query": "深圳"}),
            },
            AgentEvent::ToolEnd {
                tool_name: "policy_search".into(),
                output: "x".repeat(800),
                succeeded: true,
            },
        ]);
        assert!(text.contains("调用工具: policy_search"));
        assert!(text.contains(r#"输入: {"query":"深圳"}"#));
        let output_line = text.lines().find(|l| l.contains("工具输出")).unwrap();
        assert!(output_line.ends_with(&format!("{}...", "x".repeat(10))));
        assert!(output_line.len() < 600);
    }

    #[test]
    fn tokens_stream_on_one_line() {
        let text = rendered(&[
            AgentEvent::Token { text: "你".into() },
            AgentEvent::Token { text: "好".into() },
            AgentEvent::FinalAnswer { text: "你好".into() },
        ]);
        assert!(text.contains("助手 > 你好\n"));
    }

    #[test]
    fn failure_is_a_distinct_line() {
        let text = rendered(&[
            AgentEvent::Token { text: "部分".into() },
            AgentEvent::RunFailed {
                code: "cancelled".into(),
                message: "run cancelled".into(),
            },
        ]);
        assert!(text.contains("部分\n  ❌ 运行失败 [cancelled]: run cancelled"));
    }
}
