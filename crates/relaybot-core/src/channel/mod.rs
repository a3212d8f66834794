pub mod dingtalk;

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::types::OutboundMessage;

/// Outbound group-chat channel.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel name (e.g., "dingtalk").
    fn name(&self) -> &str;

    /// Whether credentials are present to actually deliver messages.
    fn is_configured(&self) -> bool;

    /// Post a text message.
    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError>;

    /// Upload a file and post it as a file message.
    async fn send_file(
        &self,
        file_name: &str,
        data: Vec<u8>,
        at_user_ids: &[String],
    ) -> Result<(), ChannelError>;
}
