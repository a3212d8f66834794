use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::channel::Channel;
use crate::types::OutboundMessage;

use super::{param_bool, param_list, param_str, Action, Params, Tool, ToolOutcome};

/// Post a message to the group chat through the outbound channel.
pub struct SendGroupMessageTool {
    channel: Arc<dyn Channel>,
}

impl SendGroupMessageTool {
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl Tool for SendGroupMessageTool {
    fn action(&self) -> Action {
        Action::SendGroupMessage
    }

    fn description(&self) -> &str {
        "Post a message to the group chat, optionally mentioning people"
    }

    fn parameters(&self) -> Value {
        json!({"content": "Stand-up starts in 5 minutes", "at_mobiles": ["13800000000"], "is_at_all": false})
    }

    async fn execute(&self, params: &Params) -> ToolOutcome {
        let content = param_str(params, "content");
        if content.is_empty() {
            return ToolOutcome::error("content is required");
        }

        let msg = OutboundMessage {
            content,
            at_user_ids: param_list(params, "at_user_ids"),
            at_mobiles: param_list(params, "at_mobiles"),
            is_at_all: param_bool(params, "is_at_all", false),
        };

        match self.channel.send(&msg).await {
            Ok(()) => ToolOutcome::Text(format!("Message posted to {} group chat.", self.channel.name())),
            Err(e) => ToolOutcome::error(format!("failed to post group message: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChannelError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl Channel for Recorder {
        fn name(&self) -> &str {
            "test"
        }

        fn is_configured(&self) -> bool {
            true
        }

        async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push(msg.clone());
            Ok(())
        }

        async fn send_file(&self, _: &str, _: Vec<u8>, _: &[String]) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_posts_with_mentions() {
        let recorder = Arc::new(Recorder::default());
        let tool = SendGroupMessageTool::new(recorder.clone());
        let params: Params = serde_json::from_value(json!({
            "content": "Lunch?",
            "at_mobiles": "13800000000, 13900000000",
            "is_at_all": "true"
        }))
        .unwrap();

        let out = tool.execute(&params).await;
        assert_eq!(out.text(), "Message posted to test group chat.");

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].content, "Lunch?");
        assert_eq!(sent[0].at_mobiles, vec!["13800000000", "13900000000"]);
        assert!(sent[0].is_at_all);
    }

    #[tokio::test]
    async fn test_requires_content() {
        let tool = SendGroupMessageTool::new(Arc::new(Recorder::default()));
        assert_eq!(tool.execute(&Params::new()).await.text(), "Error: content is required");
    }
}
