//! Policy search over the DuckDuckGo Instant Answer API.
//!
//! Summarises the abstract, the direct answer and the related topics of a
//! query into plain text the model can read.

use async_trait::async_trait;
use policy_agent_config::SearchConfig;
use policy_agent_core::error::ToolError;
use policy_agent_core::tool::{ParamSpec, Tool, ToolArgs, ToolKind, ToolSpec};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub struct PolicySearchTool {
    client: reqwest::Client,
    endpoint: String,
    region: String,
    max_results: usize,
    timeout_secs: u64,
}

impl PolicySearchTool {
    pub fn new(config: &SearchConfig) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("policy-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ToolError::NotConfigured(format!("policy_search HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            region: config.region.clone(),
            max_results: config.max_results.max(1),
            timeout_secs: config.timeout_secs,
        })
    }

    async fn query(&self, query: &str) -> Result<InstantAnswer, ToolError> {
        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: ToolKind::PolicySearch.name().into(),
            reason,
        };

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
                ("kl", self.region.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::Timeout {
                        tool_name: ToolKind::PolicySearch.name().into(),
                        timeout_secs: self.timeout_secs,
                    }
                } else {
                    failed(format!("Search Error: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("Search Error: HTTP {}", status.as_u16())));
        }

        // The endpoint does not always label its body as JSON.
        let body = response
            .text()
            .await
            .map_err(|e| failed(format!("Search Error: {e}")))?;
        serde_json::from_str(&body).map_err(|e| failed(format!("Search Error: malformed response: {e}")))
    }
}

#[async_trait]
impl Tool for PolicySearchTool {
    fn kind(&self) -> ToolKind {
        ToolKind::PolicySearch
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            ToolKind::PolicySearch,
            "用于查找政府政策、公告和相关信息。输入应为具体的搜索关键词，如'深圳市政府补贴'、'进出口电机设备改造'等。",
        )
        .param(ParamSpec::required("query", "搜索关键词"))
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ToolError> {
        let query = args.require_str("query")?;
        debug!(query, region = %self.region, "Searching policies");

        let answer = self.query(query).await?;
        Ok(answer.summarize(query, self.max_results))
    }
}

/// The subset of the Instant Answer response we read.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstantAnswer {
    #[serde(default)]
    heading: String,
    #[serde(default)]
    abstract_text: String,
    #[serde(default, rename = "AbstractURL")]
    abstract_url: String,
    /// Usually a string, but calculator-style answers send an object.
    #[serde(default)]
    answer: serde_json::Value,
    #[serde(default)]
    related_topics: Vec<RelatedTopic>,
}

/// Either a single topic or a named group of topics.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RelatedTopic {
    #[serde(default)]
    text: String,
    #[serde(default, rename = "FirstURL")]
    first_url: String,
    #[serde(default)]
    topics: Vec<RelatedTopic>,
}

impl RelatedTopic {
    fn flatten<'a>(&'a self, out: &mut Vec<&'a RelatedTopic>) {
        if !self.text.is_empty() {
            out.push(self);
        }
        for topic in &self.topics {
            topic.flatten(out);
        }
    }
}

impl InstantAnswer {
    fn summarize(&self, query: &str, max_results: usize) -> String {
        let mut lines = Vec::new();

        if !self.abstract_text.is_empty() {
            let mut line = if self.heading.is_empty() {
                self.abstract_text.clone()
            } else {
                format!("{}: {}", self.heading, self.abstract_text)
            };
            if !self.abstract_url.is_empty() {
                line.push_str(&format!(" ({})", self.abstract_url));
            }
            lines.push(line);
        }

        if let Some(answer) = self.answer.as_str()
            && !answer.is_empty()
        {
            lines.push(answer.to_string());
        }

        let mut topics = Vec::new();
        for topic in &self.related_topics {
            topic.flatten(&mut topics);
        }
        for topic in topics.into_iter().take(max_results) {
            if topic.first_url.is_empty() {
                lines.push(format!("- {}", topic.text));
            } else {
                lines.push(format!("- {} ({})", topic.text, topic.first_url));
            }
        }

        if lines.is_empty() {
            format!("No search results found for '{query}'.")
        } else {
            lines.join("\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tool_for(server: &MockServer) -> PolicySearchTool {
        PolicySearchTool::new(&SearchConfig {
            endpoint: server.uri(),
            max_results: 2,
            ..SearchConfig::default()
        })
        .unwrap()
    }

    fn args(query: &str) -> ToolArgs {
        ToolArgs(serde_json::json!({ "query": query }).as_object().unwrap().clone())
    }

    #[test]
    fn tool_definition() {
        let def = PolicySearchTool::new(&SearchConfig::default()).unwrap().spec().to_definition();
        assert_eq!(def.name, "policy_search");
        assert_eq!(def.parameters["required"], serde_json::json!(["query"]));
    }

    #[test]
    fn summary_flattens_grouped_topics() {
        let answer: InstantAnswer = serde_json::from_value(serde_json::json!({
            "Heading": "深圳",
            "AbstractText": "深圳市是广东省副省级市。",
            "AbstractURL": "https://example.org/shenzhen",
            "RelatedTopics": [
                {"Text": "深圳市人民政府", "FirstURL": "https://www.sz.gov.cn"},
                {"Name": "政策", "Topics": [
                    {"Text": "深圳市商务局", "FirstURL": "https://commerce.sz.gov.cn"},
                    {"Text": "third", "FirstURL": "https://example.org/3"}
                ]}
            ]
        }))
        .unwrap();

        let summary = answer.summarize("深圳", 2);
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("深圳: 深圳市是广东省副省级市。"));
        assert_eq!(lines[2], "- 深圳市商务局 (https://commerce.sz.gov.cn)");
    }

    #[test]
    fn empty_answer_says_no_results() {
        let summary = InstantAnswer::default().summarize("nothing", 5);
        assert_eq!(summary, "No search results found for 'nothing'.");
    }

    #[test]
    fn non_string_answer_keeps_the_topics() {
        let body = r#"{
            "Answer": {"from": "calculator", "id": "calculator", "result": ""},
            "AbstractText": "",
            "RelatedTopics": [{"Text": "深圳市 政策", "FirstURL": "https://www.sz.gov.cn/zc"}]
        }"#;
        let answer: InstantAnswer = serde_json::from_str(body).unwrap();
        assert_eq!(
            answer.summarize("深圳", 5),
            "- 深圳市 政策 (https://www.sz.gov.cn/zc)"
        );
    }

    #[tokio::test]
    async fn search_sends_region_and_summarizes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "深圳市政府补贴"))
            .and(query_param("kl", "cn-zh"))
            .and(query_param("format", "json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/x-javascript")
                    .set_body_string(
                        r#"{"Answer":"","AbstractText":"","RelatedTopics":[{"Text":"2024年深圳市企业补贴申报指南","FirstURL":"https://www.sz.gov.cn/a"}]}"#,
                    ),
            )
            .mount(&server)
            .await;

        let output = tool_for(&server).execute(args("深圳市政府补贴")).await.unwrap();
        assert_eq!(output, "- 2024年深圳市企业补贴申报指南 (https://www.sz.gov.cn/a)");
    }

    #[tokio::test]
    async fn http_failure_is_execution_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = tool_for(&server).execute(args("policy")).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
        assert!(err.to_string().contains("Search Error: HTTP 503"));
    }
}
