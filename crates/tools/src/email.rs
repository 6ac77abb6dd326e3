//! Business email dispatch over SMTP.
//!
//! Messages are HTML, sent from the configured mailbox (QQ mail by default)
//! to either the address the model extracted from the request or the
//! configured default recipient.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use policy_agent_config::EmailConfig;
use policy_agent_core::error::ToolError;
use policy_agent_core::tool::{ParamSpec, Tool, ToolArgs, ToolKind, ToolSpec};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Where a built message goes. `SmtpMailer` in production.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, message: Message) -> Result<(), String>;
}

/// Authenticated SMTP relay. Port 465 uses implicit TLS, others STARTTLS.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig, user: &str, password: &str) -> Result<Self, ToolError> {
        let builder = if config.smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
        }
        .map_err(|e| ToolError::NotConfigured(format!("SMTP relay {}: {e}", config.smtp_host)))?;

        let transport = builder
            .port(config.smtp_port)
            .credentials(Credentials::new(user.to_string(), password.to_string()))
            .timeout(Some(Duration::from_secs(config.timeout_secs)))
            .build();

        debug!(host = %config.smtp_host, port = config.smtp_port, "SMTP transport initialized");
        Ok(Self { transport })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn deliver(&self, message: Message) -> Result<(), String> {
        self.transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

pub struct SendEmailTool {
    sender: Option<Address>,
    default_recipient: Option<String>,
    from_name: String,
    to_name: String,
    transport: Option<Arc<dyn MailTransport>>,
}

impl SendEmailTool {
    /// Build the tool from config. Without credentials the tool still
    /// registers, and every call reports that it is not configured.
    pub fn new(config: &EmailConfig) -> Result<Self, ToolError> {
        let transport = match config.credentials() {
            Some((user, password)) => {
                Some(Arc::new(SmtpMailer::new(config, user, password)?) as Arc<dyn MailTransport>)
            }
            None => None,
        };
        Self::with_transport(config, transport)
    }

    /// Build the tool around a caller-supplied transport.
    pub fn with_transport(
        config: &EmailConfig,
        transport: Option<Arc<dyn MailTransport>>,
    ) -> Result<Self, ToolError> {
        let sender = match config.credentials() {
            Some((user, _)) => Some(user.parse::<Address>().map_err(|e| {
                ToolError::NotConfigured(format!("QQ_EMAIL_USER is not a valid address: {e}"))
            })?),
            None => None,
        };

        Ok(Self {
            sender,
            default_recipient: config.default_recipient().map(str::to_string),
            from_name: config.from_name.clone(),
            to_name: config.to_name.clone(),
            transport,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.sender.is_some() && self.transport.is_some()
    }

    fn build_message(
        &self,
        sender: &Address,
        recipient: &str,
        subject: &str,
        html: &str,
    ) -> Result<Message, ToolError> {
        let to: Address = recipient.parse().map_err(|e| {
            ToolError::InvalidArguments(format!("invalid recipient address '{recipient}': {e}"))
        })?;

        Message::builder()
            .from(Mailbox::new(Some(self.from_name.clone()), sender.clone()))
            .to(Mailbox::new(Some(self.to_name.clone()), to))
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html.to_string())
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: ToolKind::SendEmail.name().into(),
                reason: format!("Failed to build email: {e}"),
            })
    }
}

#[async_trait]
impl Tool for SendEmailTool {
    fn kind(&self) -> ToolKind {
        ToolKind::SendEmail
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(ToolKind::SendEmail, "发送专业的商务邮件。可以指定收件人。")
            .param(ParamSpec::required("subject", "邮件主题"))
            .param(ParamSpec::required("content", "邮件正文内容，支持HTML"))
            .param(ParamSpec::optional(
                "to_email",
                "收件人邮箱地址。如果不指定，则使用默认配置。",
            ))
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ToolError> {
        let (Some(sender), Some(transport)) = (&self.sender, &self.transport) else {
            return Err(ToolError::NotConfigured(
                "QQ Email credentials (QQ_EMAIL_USER, QQ_EMAIL_PASSWORD)".into(),
            ));
        };

        let subject = args.require_str("subject")?;
        let content = args.require_str("content")?;
        let recipient = args
            .str("to_email")
            .or(self.default_recipient.as_deref())
            .ok_or_else(|| {
                ToolError::InvalidArguments(
                    "Target email not specified: pass to_email or set TARGET_EMAIL".into(),
                )
            })?;

        let message = self.build_message(sender, recipient, subject, content)?;

        transport
            .deliver(message)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: ToolKind::SendEmail.name().into(),
                reason: format!("Failed to send email: {e}"),
            })?;

        info!(to = recipient, "Email sent");
        Ok(format!("Email sent successfully to {recipient}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Captures messages instead of talking to a server.
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<Message>>,
        fail_with: Option<String>,
    }

    #[async_trait]
    impl MailTransport for RecordingTransport {
        async fn deliver(&self, message: Message) -> Result<(), String> {
            if let Some(reason) = &self.fail_with {
                return Err(reason.clone());
            }
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }

    fn config(default_recipient: Option<&str>) -> EmailConfig {
        EmailConfig {
            user: Some("agent@qq.com".into()),
            password: Some("auth-code".into()),
            default_recipient: default_recipient.map(String::from),
            ..EmailConfig::default()
        }
    }

    fn args(value: serde_json::Value) -> ToolArgs {
        ToolArgs(value.as_object().unwrap().clone())
    }

    fn recipients(message: &Message) -> Vec<String> {
        message.envelope().to().iter().map(|a| a.to_string()).collect()
    }

    #[tokio::test]
    async fn explicit_recipient_wins_over_default() {
        let transport = Arc::new(RecordingTransport::default());
        let tool =
            SendEmailTool::with_transport(&config(Some("default@example.com")), Some(transport.clone()))
                .unwrap();

        let output = tool
            .execute(args(serde_json::json!({
                "subject": "Policy update",
                "content": "<p>Dear partner,</p>",
                "to_email": "partner@qq.com"
            })))
            .await
            .unwrap();

        assert_eq!(output, "Email sent successfully to partner@qq.com");
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(recipients(&sent[0]), vec!["partner@qq.com"]);

        let raw = String::from_utf8(sent[0].formatted()).unwrap();
        assert!(raw.contains("Subject: Policy update"));
        assert!(raw.contains("text/html"));
        assert!(raw.contains("\"Policy Agent\" <agent@qq.com>") || raw.contains("Policy Agent <agent@qq.com>"));
    }

    #[tokio::test]
    async fn falls_back_to_default_recipient() {
        let transport = Arc::new(RecordingTransport::default());
        let tool =
            SendEmailTool::with_transport(&config(Some("boss@example.com")), Some(transport.clone()))
                .unwrap();

        let output = tool
            .execute(args(serde_json::json!({"subject": "s", "content": "<b>c</b>"})))
            .await
            .unwrap();
        assert_eq!(output, "Email sent successfully to boss@example.com");
        assert_eq!(recipients(&transport.sent.lock().unwrap()[0]), vec!["boss@example.com"]);
    }

    #[tokio::test]
    async fn no_recipient_anywhere_is_an_error() {
        let transport = Arc::new(RecordingTransport::default());
        let tool = SendEmailTool::with_transport(&config(None), Some(transport.clone())).unwrap();

        let err = tool
            .execute(args(serde_json::json!({"subject": "s", "content": "c"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Target email not specified"));
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_credentials_reported_before_anything_else() {
        let tool = SendEmailTool::new(&EmailConfig::default()).unwrap();
        assert!(!tool.is_configured());

        let err = tool
            .execute(args(serde_json::json!({"subject": "s", "content": "c", "to_email": "x@qq.com"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotConfigured(_)));
        assert!(err.to_string().contains("QQ Email credentials"));
    }

    #[tokio::test]
    async fn invalid_recipient_is_rejected() {
        let transport = Arc::new(RecordingTransport::default());
        let tool = SendEmailTool::with_transport(&config(None), Some(transport)).unwrap();

        let err = tool
            .execute(args(serde_json::json!({"subject": "s", "content": "c", "to_email": "not-an-email"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn transport_failure_is_execution_error() {
        let transport = Arc::new(RecordingTransport {
            fail_with: Some("535 Login fail".into()),
            ..RecordingTransport::default()
        });
        let tool = SendEmailTool::with_transport(&config(Some("a@b.com")), Some(transport)).unwrap();

        let err = tool
            .execute(args(serde_json::json!({"subject": "s", "content": "c"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to send email: 535 Login fail"));
    }
}
