//! Scripted collaborators for agent loop tests.

use crate::stream_event::{AgentEvent, RecordingObserver, TraceObserver};
use async_trait::async_trait;
use policy_agent_core::error::{ProviderError, ToolError};
use policy_agent_core::message::{MessageToolCall, Role};
use policy_agent_core::provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk};
use policy_agent_core::tool::{ParamSpec, Tool, ToolArgs, ToolKind, ToolSpec};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

type ChunkSender = mpsc::Sender<Result<StreamChunk, ProviderError>>;

/// One scripted model turn.
pub enum Step {
    /// Stream these fragments as the final answer.
    Tokens(Vec<String>),
    /// One final chunk carrying optional narration and the tool calls.
    ToolCall {
        narration: String,
        calls: Vec<MessageToolCall>,
    },
    /// Fail before streaming anything.
    Error(ProviderError),
    /// Stream these fragments, then an error.
    Broken(Vec<String>, ProviderError),
    /// Stream these fragments, then hang without finishing.
    Stall(Vec<String>),
}

/// A provider that plays back a script, one step per `stream` call.
///
/// Once the script runs out every call fails with `EmptyResponse`.
pub struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ProviderRequest>>,
    stalled: Mutex<Vec<ChunkSender>>,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
            stalled: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

fn content(text: &str) -> Result<StreamChunk, ProviderError> {
    Ok(StreamChunk {
        content: Some(text.to_string()),
        ..StreamChunk::default()
    })
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::EmptyResponse("scripted provider only streams".into()))
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> Result<mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let step = self.steps.lock().unwrap().pop_front();

        let (tx, rx) = mpsc::channel(64);
        match step {
            None => return Err(ProviderError::EmptyResponse("script exhausted".into())),
            Some(Step::Error(e)) => return Err(e),
            Some(Step::Tokens(tokens)) => {
                for t in &tokens {
                    tx.send(content(t)).await.unwrap();
                }
                tx.send(Ok(StreamChunk {
                    done: true,
                    ..StreamChunk::default()
                }))
                .await
                .unwrap();
            }
            Some(Step::ToolCall { narration, calls }) => {
                tx.send(Ok(StreamChunk {
                    content: Some(narration),
                    tool_calls: calls,
                    done: true,
                    usage: None,
                }))
                .await
                .unwrap();
            }
            Some(Step::Broken(tokens, e)) => {
                for t in &tokens {
                    tx.send(content(t)).await.unwrap();
                }
                tx.send(Err(e)).await.unwrap();
            }
            Some(Step::Stall(tokens)) => {
                for t in &tokens {
                    tx.send(content(t)).await.unwrap();
                }
                self.stalled.lock().unwrap().push(tx);
            }
        }
        Ok(rx)
    }
}

/// Answers each request from its own conversation, so concurrent runs
/// sharing one provider stay independent: a user turn gets a search call
/// for its text, a tool result gets an answer quoting it.
pub struct EchoProvider;

#[async_trait]
impl Provider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::EmptyResponse("echo provider only streams".into()))
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> Result<mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError> {
        let last = request
            .messages
            .last()
            .ok_or_else(|| ProviderError::EmptyResponse("no messages".into()))?;

        let chunk = match last.role {
            Role::Tool => StreamChunk {
                content: Some(format!("answer: {}", last.content)),
                done: true,
                ..StreamChunk::default()
            },
            _ => StreamChunk {
                tool_calls: vec![make_tool_call(
                    &format!("call_{}", last.content),
                    "policy_search",
                    serde_json::json!({ "query": last.content }),
                )],
                done: true,
                ..StreamChunk::default()
            },
        };

        // Yield so concurrent runs interleave.
        tokio::task::yield_now().await;
        let (tx, rx) = mpsc::channel(1);
        let _ = tx.send(Ok(chunk)).await;
        Ok(rx)
    }
}

pub fn tokens(parts: &[&str]) -> Step {
    Step::Tokens(parts.iter().map(|s| s.to_string()).collect())
}

pub fn call(id: &str, name: &str, args: Value) -> Step {
    Step::ToolCall {
        narration: String::new(),
        calls: vec![make_tool_call(id, name, args)],
    }
}

pub fn make_tool_call(id: &str, name: &str, args: Value) -> MessageToolCall {
    let arguments = match args {
        Value::String(raw) => raw,
        other => other.to_string(),
    };
    MessageToolCall {
        id: id.into(),
        name: name.into(),
        arguments,
    }
}

/// How a [`StubTool`] answers.
pub enum Reply {
    Fixed(String),
    /// "result for {query}"
    Echo,
    Fail(ToolError),
    /// Cancels the run while executing, then returns the text.
    CancelThen(CancellationToken, String),
}

/// A tool that records the arguments it was called with.
pub struct StubTool {
    spec: ToolSpec,
    reply: Reply,
    calls: Mutex<Vec<Map<String, Value>>>,
}

impl StubTool {
    pub fn search(reply: Reply) -> Self {
        Self::with_spec(
            ToolSpec::new(ToolKind::PolicySearch, "Search policies")
                .param(ParamSpec::required("query", "keywords")),
            reply,
        )
    }

    pub fn translate(reply: Reply) -> Self {
        Self::with_spec(
            ToolSpec::new(ToolKind::BaiduTranslate, "Translate text")
                .param(ParamSpec::required("query", "text"))
                .param(ParamSpec::optional("to_lang", "target language")),
            reply,
        )
    }

    pub fn email(reply: Reply) -> Self {
        Self::with_spec(
            ToolSpec::new(ToolKind::SendEmail, "Send an email")
                .param(ParamSpec::required("subject", "subject"))
                .param(ParamSpec::required("content", "body"))
                .param(ParamSpec::optional("to_email", "recipient")),
            reply,
        )
    }

    fn with_spec(spec: ToolSpec, reply: Reply) -> Self {
        Self {
            spec,
            reply,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Map<String, Value>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Tool for StubTool {
    fn kind(&self) -> ToolKind {
        self.spec.kind
    }

    fn spec(&self) -> ToolSpec {
        self.spec.clone()
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ToolError> {
        self.calls.lock().unwrap().push(args.0.clone());
        match &self.reply {
            Reply::Fixed(text) => Ok(text.clone()),
            Reply::Echo => Ok(format!("result for {}", args.str("query").unwrap_or_default())),
            Reply::Fail(e) => Err(e.clone()),
            Reply::CancelThen(token, text) => {
                token.cancel();
                tokio::task::yield_now().await;
                Ok(text.clone())
            }
        }
    }
}

/// Records events and cancels the run on the first token.
pub struct CancelOnToken {
    pub token: CancellationToken,
    pub recorder: RecordingObserver,
}

impl CancelOnToken {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            recorder: RecordingObserver::new(),
        }
    }
}

impl TraceObserver for CancelOnToken {
    fn on_event(&self, event: &AgentEvent) {
        if matches!(event, AgentEvent::Token { .. }) {
            self.token.cancel();
        }
        self.recorder.on_event(event);
    }
}
