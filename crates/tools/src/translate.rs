//! Text translation through the Baidu Fanyi general translation API.
//!
//! Each request is signed with `md5(appid + q + salt + secret)` using a
//! fresh random salt.

use async_trait::async_trait;
use policy_agent_config::TranslateConfig;
use policy_agent_core::error::ToolError;
use policy_agent_core::tool::{ParamSpec, Tool, ToolArgs, ToolKind, ToolSpec};
use rand::Rng;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

struct Credentials {
    app_id: String,
    secret_key: String,
}

pub struct BaiduTranslateTool {
    client: reqwest::Client,
    endpoint: String,
    credentials: Option<Credentials>,
    default_to: String,
    default_from: String,
    timeout_secs: u64,
}

impl BaiduTranslateTool {
    pub fn new(config: &TranslateConfig) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ToolError::NotConfigured(format!("baidu_translate HTTP client: {e}")))?;

        let credentials = config.credentials().map(|(app_id, secret_key)| Credentials {
            app_id: app_id.to_string(),
            secret_key: secret_key.to_string(),
        });

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            credentials,
            default_to: config.default_target_lang.clone(),
            default_from: config.default_source_lang.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    fn failed(reason: String) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: ToolKind::BaiduTranslate.name().into(),
            reason,
        }
    }
}

/// Request signature expected by the Fanyi API.
fn sign(app_id: &str, query: &str, salt: u32, secret_key: &str) -> String {
    format!("{:x}", md5::compute(format!("{app_id}{query}{salt}{secret_key}")))
}

#[async_trait]
impl Tool for BaiduTranslateTool {
    fn kind(&self) -> ToolKind {
        ToolKind::BaiduTranslate
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            ToolKind::BaiduTranslate,
            "专业的商务翻译工具，使用百度翻译引擎。用于将文本精准翻译成中文或其他语言。",
        )
        .param(ParamSpec::required("query", "待翻译的文本"))
        .param(ParamSpec::optional(
            "to_lang",
            format!("目标语言代码，如 zh、en、jp，默认 {}", self.default_to),
        ))
        .param(ParamSpec::optional("from_lang", "源语言代码，默认 auto 自动检测"))
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ToolError> {
        let creds = self.credentials.as_ref().ok_or_else(|| {
            ToolError::NotConfigured(
                "Baidu Translate API credentials (BAIDU_APP_ID, BAIDU_SECRET_KEY)".into(),
            )
        })?;

        let query = args.require_str("query")?;
        let to_lang = args.str("to_lang").unwrap_or(self.default_to.as_str());
        let from_lang = args.str("from_lang").unwrap_or(self.default_from.as_str());

        let salt: u32 = rand::rng().random_range(32768..=65536);
        let salt_str = salt.to_string();
        let signature = sign(&creds.app_id, query, salt, &creds.secret_key);

        debug!(from = from_lang, to = to_lang, chars = query.chars().count(), "Translating");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("from", from_lang),
                ("to", to_lang),
                ("appid", creds.app_id.as_str()),
                ("salt", salt_str.as_str()),
                ("sign", signature.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::Timeout {
                        tool_name: ToolKind::BaiduTranslate.name().into(),
                        timeout_secs: self.timeout_secs,
                    }
                } else {
                    Self::failed(format!("Request Error: {e}"))
                }
            })?;

        let body = response
            .text()
            .await
            .map_err(|e| Self::failed(format!("Request Error: {e}")))?;
        let reply: FanyiResponse = serde_json::from_str(&body)
            .map_err(|_| Self::failed(format!("Translation Error: {body}")))?;

        match reply {
            FanyiResponse {
                trans_result: Some(lines),
                ..
            } if !lines.is_empty() => Ok(lines
                .into_iter()
                .map(|line| line.dst)
                .collect::<Vec<_>>()
                .join("\n")),
            FanyiResponse {
                error_code: Some(code),
                error_msg,
                ..
            } => Err(Self::failed(format!(
                "Translation Error: {} {}",
                code.text(),
                error_msg.unwrap_or_default()
            ))),
            _ => Err(Self::failed(format!("Translation Error: {body}"))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FanyiResponse {
    #[serde(default)]
    trans_result: Option<Vec<FanyiLine>>,
    /// Sent as a string by the API, but tolerate numbers
    #[serde(default)]
    error_code: Option<ErrorCode>,
    #[serde(default)]
    error_msg: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorCode {
    Text(String),
    Number(i64),
}

impl ErrorCode {
    fn text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FanyiLine {
    dst: String,
}
