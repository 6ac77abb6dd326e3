//! Tool implementations for Policy Agent.
//!
//! Each tool wraps one external service: DuckDuckGo for policy search, Baidu
//! Fanyi for translation, and an SMTP relay for email. Credentials come from
//! [`AppConfig`]; a tool without credentials still registers and answers
//! every call with a "not configured" error observation.

pub mod email;
pub mod search;
pub mod translate;

use policy_agent_config::AppConfig;
use policy_agent_core::error::ToolError;
use policy_agent_core::tool::ToolRegistry;
use std::sync::Arc;
use tracing::warn;

pub use email::{MailTransport, SendEmailTool, SmtpMailer};
pub use search::PolicySearchTool;
pub use translate::BaiduTranslateTool;

/// Create the registry of all three tools, in presentation order:
/// `policy_search`, `baidu_translate`, `send_email`.
pub fn default_registry(config: &AppConfig) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();

    registry.register_tool(Arc::new(PolicySearchTool::new(&config.search)?))?;

    let translate = BaiduTranslateTool::new(&config.translate)?;
    if !translate.is_configured() {
        warn!("BAIDU_APP_ID / BAIDU_SECRET_KEY not configured, baidu_translate will report errors");
    }
    registry.register_tool(Arc::new(translate))?;

    let email = SendEmailTool::new(&config.email)?;
    if !email.is_configured() {
        warn!("QQ_EMAIL_USER / QQ_EMAIL_PASSWORD not configured, send_email will report errors");
    }
    registry.register_tool(Arc::new(email))?;

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy_agent_core::tool::{ToolInput, ToolInvocation};

    #[test]
    fn default_registry_order_is_stable() {
        let registry = default_registry(&AppConfig::default()).unwrap();
        assert_eq!(registry.names(), vec!["policy_search", "baidu_translate", "send_email"]);

        let again = default_registry(&AppConfig::default()).unwrap();
        assert_eq!(registry.definitions(), again.definitions());
    }

    #[tokio::test]
    async fn unconfigured_email_yields_error_observation() {
        let registry = default_registry(&AppConfig::default()).unwrap();
        let obs = registry
            .execute(&ToolInvocation {
                call_id: "call_1".into(),
                tool_name: "send_email".into(),
                input: ToolInput::parse(r#"{"subject":"s","content":"c","to_email":"a@qq.com"}"#),
            })
            .await;

        assert!(!obs.succeeded);
        assert!(obs.output.starts_with("Error: Tool not configured: QQ Email credentials"));
    }

    #[tokio::test]
    async fn unconfigured_translate_accepts_plain_text_then_reports() {
        let registry = default_registry(&AppConfig::default()).unwrap();
        let obs = registry
            .execute(&ToolInvocation {
                call_id: "call_1".into(),
                tool_name: "baidu_translate".into(),
                input: ToolInput::parse("Hello World"),
            })
            .await;

        assert!(!obs.succeeded);
        assert!(obs.output.contains("Baidu Translate API credentials"));
    }
}
