//! The agent reasoning loop implementation.
//!
//! A run alternates between THINKING (one streamed model call) and ACTING
//! (one tool call) until the model answers in plain text or the run fails.

use crate::outcome::{FailureReason, RunOutcome};
use crate::prompt::resolve_system_prompt;
use crate::stream_event::{AgentEvent, TraceObserver};
use policy_agent_config::AppConfig;
use policy_agent_core::error::{ProviderError, ToolError};
use policy_agent_core::message::{Conversation, Message, MessageToolCall};
use policy_agent_core::provider::{Provider, ProviderRequest};
use policy_agent_core::tool::{ToolInvocation, ToolRegistry};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What the model decided in one THINKING step.
enum Decision {
    Answer(String),
    Call {
        narration: String,
        call: MessageToolCall,
    },
}

enum State {
    Thinking,
    Acting(MessageToolCall),
}

/// The agent loop that orchestrates LLM calls and tool execution.
///
/// Holds only shared read-only collaborators, so one instance can serve
/// any number of concurrent runs.
#[derive(Clone)]
pub struct AgentLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// Tool registry
    tools: Arc<ToolRegistry>,

    /// The model to use
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Max tokens per response
    max_tokens: Option<u32>,

    /// Sent before the conversation, never stored in it
    system_prompt: String,

    /// Maximum THINKING entries per run
    step_budget: u32,

    /// Consecutive unknown-tool calls tolerated before giving up
    failure_limit: u32,
}

impl AgentLoop {
    /// Create a new agent loop with the default prompt and limits.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            provider,
            tools,
            model: model.into(),
            temperature: 0.0,
            max_tokens: None,
            system_prompt: resolve_system_prompt(None).to_string(),
            step_budget: 12,
            failure_limit: 2,
        }
    }

    /// Build a loop from the `[llm]` and `[agent]` config sections.
    pub fn from_config(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        config: &AppConfig,
    ) -> Self {
        Self::new(provider, config.llm.model.clone(), tools)
            .with_temperature(config.llm.temperature)
            .with_max_tokens(config.llm.max_tokens)
            .with_step_budget(config.agent.step_budget)
            .with_failure_limit(config.agent.consecutive_tool_failure_limit)
            .with_system_prompt(resolve_system_prompt(config.agent.system_prompt.as_deref()))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the max tokens per LLM response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set the maximum number of THINKING entries per run. At least 1.
    pub fn with_step_budget(mut self, budget: u32) -> Self {
        self.step_budget = budget.max(1);
        self
    }

    pub fn with_failure_limit(mut self, limit: u32) -> Self {
        self.failure_limit = limit;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one user request to a terminal outcome.
    ///
    /// `history` is copied, never mutated; the returned outcome carries the
    /// extended conversation. The answer of a completed run is all the text
    /// the model streamed during it, narration before tool calls included,
    /// so it always equals the concatenated `Token` events. Every event of the run goes to `observer`, and
    /// `cancel` is honored at each step boundary and while the model streams.
    /// A tool call already in flight always completes.
    pub async fn run(
        &self,
        history: &Conversation,
        user_input: &str,
        observer: &dyn TraceObserver,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let mut conversation = history.clone();
        conversation.push(Message::user(user_input));

        info!(
            conversation_id = %conversation.id,
            messages = conversation.len(),
            budget = self.step_budget,
            "Starting agent run"
        );

        let mut state = State::Thinking;
        let mut steps: u32 = 0;
        let mut tool_calls: u32 = 0;
        let mut unknown_streak: u32 = 0;
        let mut streamed = String::new();

        loop {
            state = match state {
                State::Thinking => {
                    if cancel.is_cancelled() {
                        return self.fail(FailureReason::Cancelled, conversation, steps, observer);
                    }

                    steps += 1;
                    if steps > self.step_budget {
                        warn!(conversation_id = %conversation.id, steps, "Step budget exhausted");
                        let reason = FailureReason::BudgetExhausted {
                            budget: self.step_budget,
                        };
                        return self.fail(reason, conversation, steps, observer);
                    }

                    debug!(conversation_id = %conversation.id, step = steps, "Thinking");

                    match self.think(&conversation, observer, cancel).await {
                        Ok(Decision::Answer(text)) => {
                            streamed.push_str(&text);
                            conversation.push(Message::assistant(text));
                            let answer = streamed;
                            observer.on_event(&AgentEvent::FinalAnswer {
                                text: answer.clone(),
                            });
                            info!(
                                conversation_id = %conversation.id,
                                steps,
                                tool_calls,
                                "Agent run completed"
                            );
                            return RunOutcome::Done {
                                answer,
                                conversation,
                                steps,
                                tool_calls,
                            };
                        }
                        Ok(Decision::Call { narration, call }) => {
                            streamed.push_str(&narration);
                            conversation.push(Message::assistant_tool_call(narration, call.clone()));
                            State::Acting(call)
                        }
                        Err(reason) => return self.fail(reason, conversation, steps, observer),
                    }
                }

                State::Acting(call) => {
                    if cancel.is_cancelled() {
                        conversation.push(Message::tool_result(
                            &call.id,
                            "Error: run cancelled before the tool was executed",
                        ));
                        return self.fail(FailureReason::Cancelled, conversation, steps, observer);
                    }

                    let invocation = ToolInvocation::from_call(&call);
                    observer.on_event(&AgentEvent::ToolStart {
                        tool_name: call.name.clone(),
                        arguments: invocation.input.to_value(),
                    });

                    if !self.tools.contains(&call.name) {
                        unknown_streak += 1;
                        warn!(tool = %call.name, streak = unknown_streak, "Model called an unknown tool");

                        let output = format!(
                            "Error: {}. Available tools: {}",
                            ToolError::NotFound(call.name.clone()),
                            self.tools.names().join(", ")
                        );
                        observer.on_event(&AgentEvent::ToolEnd {
                            tool_name: call.name.clone(),
                            output: output.clone(),
                            succeeded: false,
                        });
                        conversation.push(Message::tool_result(&call.id, output));

                        if unknown_streak > self.failure_limit {
                            let reason = FailureReason::UnknownTool { name: call.name };
                            return self.fail(reason, conversation, steps, observer);
                        }
                        State::Thinking
                    } else {
                        let observation = self.tools.execute(&invocation).await;
                        debug!(
                            tool = %call.name,
                            succeeded = observation.succeeded,
                            chars = observation.output.chars().count(),
                            "Tool finished"
                        );

                        observer.on_event(&AgentEvent::ToolEnd {
                            tool_name: observation.tool_name.clone(),
                            output: observation.output.clone(),
                            succeeded: observation.succeeded,
                        });
                        conversation.push(Message::tool_result(&call.id, observation.output));

                        unknown_streak = 0;
                        tool_calls += 1;
                        State::Thinking
                    }
                }
            };
        }
    }

    /// One streamed model call. Tokens are forwarded as they arrive.
    async fn think(
        &self,
        conversation: &Conversation,
        observer: &dyn TraceObserver,
        cancel: &CancellationToken,
    ) -> Result<Decision, FailureReason> {
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        messages.push(Message::system(self.system_prompt.as_str()));
        messages.extend(conversation.messages.iter().cloned());

        let request = ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: self.tools.definitions(),
            stream: true,
        };

        let provider_failed = |e: ProviderError| FailureReason::Provider(e.to_string());

        let mut rx = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FailureReason::Cancelled),
            stream = self.provider.stream(request) => stream.map_err(provider_failed)?,
        };

        let mut text = String::new();
        let mut calls: Vec<MessageToolCall> = Vec::new();
        let mut finished = false;

        while !finished {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FailureReason::Cancelled),
                next = rx.recv() => next,
            };

            let Some(chunk) = next else {
                return Err(provider_failed(ProviderError::StreamInterrupted(
                    "stream closed before the final chunk".into(),
                )));
            };
            let chunk = chunk.map_err(provider_failed)?;

            if let Some(content) = chunk.content
                && !content.is_empty()
            {
                observer.on_event(&AgentEvent::Token {
                    text: content.clone(),
                });
                text.push_str(&content);
            }
            calls.extend(chunk.tool_calls);
            finished = chunk.done;
        }

        if calls.len() > 1 {
            warn!(
                count = calls.len(),
                first = %calls[0].name,
                "Model requested several tool calls, acting on the first only"
            );
        }

        match calls.into_iter().next() {
            Some(call) => Ok(Decision::Call {
                narration: text,
                call,
            }),
            None if text.trim().is_empty() => Err(provider_failed(ProviderError::EmptyResponse(
                "model returned neither text nor a tool call".into(),
            ))),
            None => Ok(Decision::Answer(text)),
        }
    }

    fn fail(
        &self,
        reason: FailureReason,
        conversation: Conversation,
        steps: u32,
        observer: &dyn TraceObserver,
    ) -> RunOutcome {
        warn!(
            conversation_id = %conversation.id,
            code = reason.code(),
            steps,
            "Agent run failed: {reason}"
        );
        observer.on_event(&AgentEvent::RunFailed {
            code: reason.code().to_string(),
            message: reason.to_string(),
        });
        RunOutcome::Failed {
            reason,
            conversation,
            steps,
        }
    }
}
