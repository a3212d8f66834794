use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

use crate::config::EmailConfig;
use crate::error::ToolError;
use crate::util::{escape_html, http};

use super::{param_str, Action, Params, Tool, ToolOutcome};

const TIMEOUT: Duration = Duration::from_secs(30);

/// Send e-mail through the Brevo v3 transactional API.
pub struct SendEmailTool {
    config: EmailConfig,
}

impl SendEmailTool {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<String, ToolError> {
        let recipient_name = to.split('@').next().unwrap_or(to);
        let html = format!(
            "<div style=\"font-family: Arial, sans-serif; line-height: 1.6;\">\
             <h2>{}</h2><div style=\"white-space: pre-line;\">{}</div></div>",
            escape_html(subject),
            escape_html(body)
        );

        let payload = json!({
            "sender": {"name": self.config.sender_name, "email": self.config.sender_email},
            "to": [{"email": to, "name": recipient_name}],
            "subject": subject,
            "htmlContent": html,
            "textContent": body,
        });

        let url = format!("{}/smtp/email", self.config.api_base.trim_end_matches('/'));
        let resp = http::client()
            .post(&url)
            .header("api-key", &self.config.api_key)
            .header("accept", "application/json")
            .timeout(TIMEOUT)
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        let data: Value = resp.json().await.unwrap_or(Value::Null);

        if status.as_u16() != 201 {
            let message = data
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error");
            let message = match data.get("code").and_then(|v| v.as_str()) {
                Some(code) => format!("{message} ({code})"),
                None => message.to_string(),
            };
            return Err(ToolError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let message_id = data
            .get("messageId")
            .and_then(|v| v.as_str())
            .unwrap_or("n/a");
        info!("Email sent to {} (messageId {})", to, message_id);
        Ok(format!("Email sent to {to} with subject '{subject}' (messageId: {message_id})"))
    }
}

#[async_trait]
impl Tool for SendEmailTool {
    fn action(&self) -> Action {
        Action::SendEmail
    }

    fn description(&self) -> &str {
        "Send an e-mail"
    }

    fn parameters(&self) -> Value {
        json!({"to": "alice@example.com", "subject": "Meeting notes", "body": "Hi Alice, ..."})
    }

    async fn execute(&self, params: &Params) -> ToolOutcome {
        let to = param_str(params, "to");
        let subject = param_str(params, "subject");
        let body = param_str(params, "body");

        if to.is_empty() || subject.is_empty() || body.is_empty() {
            return ToolOutcome::error("recipient, subject and body must not be empty");
        }
        if !to.contains('@') {
            return ToolOutcome::error(format!("'{to}' is not an e-mail address"));
        }
        if self.config.api_key.is_empty() {
            return ToolOutcome::error(ToolError::NotConfigured(
                "e-mail service (BREVO_API_KEY)".to_string(),
            ));
        }

        match self.send(&to, &subject, &body).await {
            Ok(msg) => ToolOutcome::Text(msg),
            Err(e) => ToolOutcome::error(format!("failed to send e-mail: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email_params(to: &str, subject: &str, body: &str) -> Params {
        serde_json::from_value(json!({"to": to, "subject": subject, "body": body})).unwrap()
    }

    fn tool(api_base: &str, api_key: &str) -> SendEmailTool {
        SendEmailTool::new(EmailConfig {
            api_key: api_key.to_string(),
            api_base: api_base.to_string(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_empty_fields_short_circuit() {
        // Unroutable base: any network attempt would fail differently
        let t = tool("http://127.0.0.1:9", "xkeysib-test");
        let out = t.execute(&email_params("", "Hi", "Body")).await;
        assert_eq!(out.text(), "Error: recipient, subject and body must not be empty");
        let out = t.execute(&email_params("a@b.c", "", "Body")).await;
        assert!(out.is_error());
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let out = tool("http://127.0.0.1:9", "")
            .execute(&email_params("a@b.c", "Hi", "Body"))
            .await;
        assert_eq!(out.text(), "Error: e-mail service (BREVO_API_KEY) is not configured");
    }

    #[tokio::test]
    async fn test_send_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/smtp/email")
            .match_header("api-key", "xkeysib-test")
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"messageId":"<abc@smtp>"}"#)
            .create_async()
            .await;

        let out = tool(&server.url(), "xkeysib-test")
            .execute(&email_params("bob@example.com", "Report", "See attached"))
            .await;
        assert!(!out.is_error());
        assert!(out.text().contains("bob@example.com"));
        assert!(out.text().contains("<abc@smtp>"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_api_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/smtp/email")
            .with_status(401)
            .with_body(r#"{"message":"Key not found","code":"unauthorized"}"#)
            .create_async()
            .await;

        let out = tool(&server.url(), "bad")
            .execute(&email_params("bob@example.com", "Report", "x"))
            .await;
        assert!(out.is_error());
        assert!(out.text().contains("Key not found (unauthorized)"));
    }
}
