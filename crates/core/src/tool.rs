//! Tool abstraction: the capabilities the agent can invoke.
//!
//! The set of tools is closed: every adapter belongs to a [`ToolKind`], and
//! the [`ToolRegistry`] is a dispatch table from kind to adapter that is
//! validated when tools are registered. Arguments produced by the model are
//! checked against the tool's [`ToolSpec`] before the adapter ever sees them.

use crate::error::ToolError;
use crate::message::MessageToolCall;
use crate::provider::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// The closed set of tools the assistant knows how to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Government policy / announcement web search
    PolicySearch,
    /// Baidu Fanyi text translation
    BaiduTranslate,
    /// Business email dispatch over SMTP
    SendEmail,
}

impl ToolKind {
    pub const ALL: [ToolKind; 3] = [Self::PolicySearch, Self::BaiduTranslate, Self::SendEmail];

    /// The name the language model uses to call this tool.
    pub fn name(self) -> &'static str {
        match self {
            Self::PolicySearch => "policy_search",
            Self::BaiduTranslate => "baidu_translate",
            Self::SendEmail => "send_email",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// JSON type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Boolean,
}

impl ParamType {
    pub fn json_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
        }
    }
}

/// One named parameter of a tool's input schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub param_type: ParamType,
    pub required: bool,
    pub description: String,
}

impl ParamSpec {
    /// A required string parameter.
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: ParamType::String,
            required: true,
            description: description.into(),
        }
    }

    /// An optional string parameter.
    pub fn optional(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, description)
        }
    }

    pub fn with_type(mut self, param_type: ParamType) -> Self {
        self.param_type = param_type;
        self
    }
}

/// Name, description and input schema of a tool, as presented to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub kind: ToolKind,
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
}

impl ToolSpec {
    pub fn new(kind: ToolKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            name: kind.name().to_string(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    /// The only required parameter, when there is exactly one.
    ///
    /// Tools with a single required string parameter also accept plain text.
    pub fn single_required_param(&self) -> Option<&ParamSpec> {
        let mut required = self.params.iter().filter(|p| p.required);
        match (required.next(), required.next()) {
            (Some(param), None) => Some(param),
            _ => None,
        }
    }

    /// Render the spec as a tool definition with a JSON Schema.
    pub fn to_definition(&self) -> ToolDefinition {
        let mut properties = Map::new();
        for param in &self.params {
            properties.insert(
                param.name.clone(),
                serde_json::json!({
                    "type": param.param_type.json_type(),
                    "description": param.description,
                }),
            );
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }

    /// Structural checks run once, at registration time.
    fn check(&self) -> Result<(), ToolError> {
        let invalid = |reason: String| ToolError::InvalidSpec {
            tool_name: self.name.clone(),
            reason,
        };

        if self.name != self.kind.name() {
            return Err(invalid(format!(
                "name must be '{}' for kind {:?}",
                self.kind.name(),
                self.kind
            )));
        }
        for (i, param) in self.params.iter().enumerate() {
            if param.name.trim().is_empty() {
                return Err(invalid("parameter names must not be empty".into()));
            }
            if self.params[..i].iter().any(|p| p.name == param.name) {
                return Err(invalid(format!("duplicate parameter '{}'", param.name)));
            }
        }
        Ok(())
    }

    /// Validate raw model input against this schema.
    ///
    /// Unknown keys are dropped; `null` counts as absent.
    pub fn validate(&self, input: &ToolInput) -> Result<ToolArgs, ToolError> {
        match input {
            ToolInput::Text(text) => {
                let param = self
                    .single_required_param()
                    .filter(|p| p.param_type == ParamType::String)
                    .ok_or_else(|| {
                        ToolError::InvalidArguments(format!(
                            "{} expects structured arguments ({}), got plain text",
                            self.name,
                            self.param_names().join(", ")
                        ))
                    })?;
                let mut args = Map::new();
                args.insert(param.name.clone(), Value::String(text.clone()));
                self.validate(&ToolInput::Args(args))
            }
            ToolInput::Args(map) => {
                let mut args = Map::new();
                for param in &self.params {
                    match map.get(&param.name) {
                        None | Some(Value::Null) => {
                            if param.required {
                                return Err(ToolError::InvalidArguments(format!(
                                    "missing required field '{}'",
                                    param.name
                                )));
                            }
                        }
                        Some(value) if !param.param_type.matches(value) => {
                            return Err(ToolError::InvalidArguments(format!(
                                "field '{}' must be of type {}",
                                param.name,
                                param.param_type.json_type()
                            )));
                        }
                        Some(Value::String(s)) if param.required && s.trim().is_empty() => {
                            return Err(ToolError::InvalidArguments(format!(
                                "field '{}' must not be empty",
                                param.name
                            )));
                        }
                        Some(value) => {
                            args.insert(param.name.clone(), value.clone());
                        }
                    }
                }
                Ok(ToolArgs(args))
            }
        }
    }

    fn param_names(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.name.as_str()).collect()
    }
}

/// Raw tool input as produced by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolInput {
    /// A single free-text value
    Text(String),
    /// A structured argument mapping
    Args(Map<String, Value>),
}

impl ToolInput {
    /// Interpret the argument string of a tool call.
    ///
    /// A JSON object is structured input; a JSON string, any other JSON
    /// value, or text that is not JSON at all is treated as free text.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Args(Map::new());
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(map)) => Self::Args(map),
            Ok(Value::String(text)) => Self::Text(text),
            _ => Self::Text(trimmed.to_string()),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Text(text) => Value::String(text.clone()),
            Self::Args(map) => Value::Object(map.clone()),
        }
    }
}

/// Arguments that passed schema validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs(pub Map<String, Value>);

impl ToolArgs {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// A string argument; blank strings count as absent.
    pub fn str(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn require_str(&self, name: &str) -> Result<&str, ToolError> {
        self.str(name)
            .ok_or_else(|| ToolError::InvalidArguments(format!("missing required field '{name}'")))
    }

    pub fn u64(&self, name: &str) -> Option<u64> {
        self.0.get(name).and_then(Value::as_u64)
    }
}

/// A decided tool call: created by the model, consumed once by dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    /// Unique call ID (matches the LLM's tool_call.id)
    pub call_id: String,

    /// Name of the tool to execute
    pub tool_name: String,

    /// Arguments as produced by the model
    pub input: ToolInput,
}

impl ToolInvocation {
    pub fn from_call(call: &MessageToolCall) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            input: ToolInput::parse(&call.arguments),
        }
    }
}

/// The text result of executing a tool, success or failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolObservation {
    pub tool_name: String,
    pub output: String,
    pub succeeded: bool,
}

impl ToolObservation {
    pub fn success(tool_name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            output: output.into(),
            succeeded: true,
        }
    }

    /// The single error-observation shape shared by every failure.
    pub fn failure(tool_name: impl Into<String>, error: &ToolError) -> Self {
        Self {
            tool_name: tool_name.into(),
            output: format!("Error: {error}"),
            succeeded: false,
        }
    }
}

/// An adapter turning an external capability into a callable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Which entry of the closed tool set this adapter implements.
    fn kind(&self) -> ToolKind;

    /// The schema presented to the model.
    fn spec(&self) -> ToolSpec;

    /// Execute with arguments already validated against `spec()`.
    ///
    /// Provider failures must come back as `Err`, never as a panic.
    async fn execute(&self, args: ToolArgs) -> Result<String, ToolError>;
}

struct RegisteredTool {
    spec: ToolSpec,
    adapter: Arc<dyn Tool>,
}

/// The ordered dispatch table of available tools.
///
/// Registration order is presentation order: `list_specs()` and
/// `definitions()` return tools exactly in the order they were registered.
#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under an explicit spec.
    pub fn register(&mut self, spec: ToolSpec, adapter: Arc<dyn Tool>) -> Result<(), ToolError> {
        spec.check()?;
        if adapter.kind() != spec.kind {
            return Err(ToolError::InvalidSpec {
                tool_name: spec.name.clone(),
                reason: format!("adapter implements {}, spec declares {}", adapter.kind(), spec.kind),
            });
        }
        if self.entries.iter().any(|e| e.spec.kind == spec.kind) {
            return Err(ToolError::AlreadyRegistered(spec.name));
        }
        debug!(tool = %spec.name, params = spec.params.len(), "Registered tool");
        self.entries.push(RegisteredTool { spec, adapter });
        Ok(())
    }

    /// Register an adapter under its own spec.
    pub fn register_tool(&mut self, adapter: Arc<dyn Tool>) -> Result<(), ToolError> {
        let spec = adapter.spec();
        self.register(spec, adapter)
    }

    /// Look up an adapter by the name the model used.
    pub fn resolve(&self, name: &str) -> Result<&dyn Tool, ToolError> {
        self.entry(name)
            .map(|e| e.adapter.as_ref())
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    pub fn spec(&self, name: &str) -> Option<&ToolSpec> {
        self.entry(name).map(|e| &e.spec)
    }

    /// Specs in registration order.
    pub fn list_specs(&self) -> Vec<&ToolSpec> {
        self.entries.iter().map(|e| &e.spec).collect()
    }

    /// Tool definitions for the provider request, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.entries.iter().map(|e| e.spec.to_definition()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.spec.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Validate and run an invocation. Never fails: every error becomes a
    /// failed observation.
    pub async fn execute(&self, invocation: &ToolInvocation) -> ToolObservation {
        let name = invocation.tool_name.as_str();
        let Some(entry) = self.entry(name) else {
            return ToolObservation::failure(name, &ToolError::NotFound(name.to_string()));
        };

        let args = match entry.spec.validate(&invocation.input) {
            Ok(args) => args,
            Err(e) => {
                warn!(tool = name, error = %e, "Rejected tool arguments");
                return ToolObservation::failure(name, &e);
            }
        };

        match entry.adapter.execute(args).await {
            Ok(output) => ToolObservation::success(name, output),
            Err(e) => {
                warn!(tool = name, error = %e, "Tool execution failed");
                ToolObservation::failure(name, &e)
            }
        }
    }

    fn entry(&self, name: &str) -> Option<&RegisteredTool> {
        let kind = ToolKind::from_name(name)?;
        self.entries.iter().find(|e| e.spec.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Echoes its query back; stands in for the search adapter.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn kind(&self) -> ToolKind {
            ToolKind::PolicySearch
        }

        fn spec(&self) -> ToolSpec {
            ToolSpec::new(ToolKind::PolicySearch, "Echoes back the query")
                .param(ParamSpec::required("query", "text to echo"))
        }

        async fn execute(&self, args: ToolArgs) -> Result<String, ToolError> {
            Ok(args.require_str("query")?.to_string())
        }
    }

    /// Always fails like a provider outage.
    struct BrokenMailer;

    #[async_trait]
    impl Tool for BrokenMailer {
        fn kind(&self) -> ToolKind {
            ToolKind::SendEmail
        }

        fn spec(&self) -> ToolSpec {
            ToolSpec::new(ToolKind::SendEmail, "Sends mail")
                .param(ParamSpec::required("subject", "subject line"))
                .param(ParamSpec::required("content", "html body"))
                .param(ParamSpec::optional("to_email", "recipient"))
        }

        async fn execute(&self, _args: ToolArgs) -> Result<String, ToolError> {
            Err(ToolError::ExecutionFailed {
                tool_name: "send_email".into(),
                reason: "connection refused".into(),
            })
        }
    }

    fn invocation(name: &str, raw: &str) -> ToolInvocation {
        ToolInvocation {
            call_id: "call_1".into(),
            tool_name: name.into(),
            input: ToolInput::parse(raw),
        }
    }

    #[test]
    fn kind_names_round_trip() {
        for kind in ToolKind::ALL {
            assert_eq!(ToolKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ToolKind::from_name("shell"), None);
    }

    #[test]
    fn registry_register_and_resolve() {
        let mut registry = ToolRegistry::new();
        registry.register_tool(Arc::new(EchoTool)).unwrap();
        assert!(registry.resolve("policy_search").is_ok());
        assert_eq!(
            registry.resolve("nonexistent").err(),
            Some(ToolError::NotFound("nonexistent".into()))
        );
    }

    #[test]
    fn resolve_known_but_unregistered_kind_is_not_found() {
        let mut registry = ToolRegistry::new();
        registry.register_tool(Arc::new(EchoTool)).unwrap();
        assert!(matches!(registry.resolve("send_email"), Err(ToolError::NotFound(_))));
    }

    #[test]
    fn duplicate_kind_is_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register_tool(Arc::new(EchoTool)).unwrap();
        let err = registry.register_tool(Arc::new(EchoTool)).unwrap_err();
        assert_eq!(err, ToolError::AlreadyRegistered("policy_search".into()));
    }

    #[test]
    fn spec_kind_must_match_adapter() {
        let mut registry = ToolRegistry::new();
        let spec = ToolSpec::new(ToolKind::SendEmail, "mismatched");
        let err = registry.register(spec, Arc::new(EchoTool)).unwrap_err();
        assert!(matches!(err, ToolError::InvalidSpec { .. }));
    }

    #[test]
    fn spec_with_duplicate_params_is_rejected() {
        let mut registry = ToolRegistry::new();
        let spec = ToolSpec::new(ToolKind::PolicySearch, "dup")
            .param(ParamSpec::required("query", "a"))
            .param(ParamSpec::optional("query", "b"));
        let err = registry.register(spec, Arc::new(EchoTool)).unwrap_err();
        assert!(err.to_string().contains("duplicate parameter"));
    }

    #[test]
    fn spec_name_must_match_kind() {
        let mut registry = ToolRegistry::new();
        let mut spec = EchoTool.spec();
        spec.name = "web_search".into();
        assert!(registry.register(spec, Arc::new(EchoTool)).is_err());
    }

    #[test]
    fn definitions_follow_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register_tool(Arc::new(BrokenMailer)).unwrap();
        registry.register_tool(Arc::new(EchoTool)).unwrap();
        let defs = registry.definitions();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "send_email");
        assert_eq!(defs[1].name, "policy_search");
        assert_eq!(registry.names(), vec!["send_email", "policy_search"]);
        assert_eq!(defs[0].parameters["required"], serde_json::json!(["subject", "content"]));
    }

    #[test]
    fn parse_distinguishes_text_and_structured_input() {
        assert_eq!(ToolInput::parse("\"Hello\""), ToolInput::Text("Hello".into()));
        assert_eq!(ToolInput::parse("Hello World"), ToolInput::Text("Hello World".into()));
        assert!(matches!(ToolInput::parse(r#"{"query":"x"}"#), ToolInput::Args(_)));
        assert_eq!(ToolInput::parse("  "), ToolInput::Args(Map::new()));
    }

    #[test]
    fn plain_text_binds_to_single_required_param() {
        let spec = EchoTool.spec();
        let args = spec.validate(&ToolInput::Text("深圳 政府补贴".into())).unwrap();
        assert_eq!(args.str("query"), Some("深圳 政府补贴"));
    }

    #[test]
    fn plain_text_rejected_for_multi_param_tools() {
        let spec = BrokenMailer.spec();
        let err = spec.validate(&ToolInput::Text("hi".into())).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn validation_reports_missing_and_mistyped_fields() {
        let spec = BrokenMailer.spec();
        let missing = spec.validate(&ToolInput::parse(r#"{"subject":"s"}"#)).unwrap_err();
        assert!(missing.to_string().contains("'content'"));

        let mistyped = spec
            .validate(&ToolInput::parse(r#"{"subject":"s","content":42}"#))
            .unwrap_err();
        assert!(mistyped.to_string().contains("type string"));
    }

    #[test]
    fn validation_drops_unknown_keys_and_nulls() {
        let spec = BrokenMailer.spec();
        let args = spec
            .validate(&ToolInput::parse(
                r#"{"subject":"s","content":"<p>c</p>","to_email":null,"cc":"x"}"#,
            ))
            .unwrap();
        assert!(args.get("to_email").is_none());
        assert!(args.get("cc").is_none());
        assert_eq!(args.str("content"), Some("<p>c</p>"));
    }

    #[tokio::test]
    async fn registry_execute_tool() {
        let mut registry = ToolRegistry::new();
        registry.register_tool(Arc::new(EchoTool)).unwrap();

        let obs = registry
            .execute(&invocation("policy_search", r#"{"query":"hello world"}"#))
            .await;
        assert!(obs.succeeded);
        assert_eq!(obs.output, "hello world");
    }

    #[tokio::test]
    async fn validation_failure_becomes_observation() {
        let mut registry = ToolRegistry::new();
        registry.register_tool(Arc::new(EchoTool)).unwrap();

        let obs = registry.execute(&invocation("policy_search", "{}")).await;
        assert!(!obs.succeeded);
        assert!(obs.output.starts_with("Error: Invalid tool arguments"));
    }

    #[tokio::test]
    async fn provider_failure_becomes_observation() {
        let mut registry = ToolRegistry::new();
        registry.register_tool(Arc::new(BrokenMailer)).unwrap();

        let obs = registry
            .execute(&invocation("send_email", r#"{"subject":"s","content":"c"}"#))
            .await;
        assert!(!obs.succeeded);
        assert!(obs.output.contains("connection refused"));
    }

    #[tokio::test]
    async fn missing_tool_becomes_observation() {
        let registry = ToolRegistry::new();
        let obs = registry.execute(&invocation("nonexistent", "{}")).await;
        assert!(!obs.succeeded);
        assert_eq!(obs.output, "Error: Tool not found: nonexistent");
    }

    #[tokio::test]
    async fn repeated_resolution_behaves_identically() {
        let mut registry = ToolRegistry::new();
        registry.register_tool(Arc::new(EchoTool)).unwrap();

        let first = registry.resolve("policy_search").unwrap();
        let second = registry.resolve("policy_search").unwrap();
        assert_eq!(first.kind(), second.kind());
        assert_eq!(first.spec(), second.spec());

        let args = || ToolArgs(serde_json::json!({"query": "same"}).as_object().unwrap().clone());
        assert_eq!(first.execute(args()).await, second.execute(args()).await);
    }
}
