//! Fallback for channel types without a registered sender.

use async_trait::async_trait;

use super::{ChannelSender, DeliveryOutcome, DispatchContext};
use crate::Result;

#[derive(Debug, Default)]
pub struct UnsupportedChannelSender;

#[async_trait]
impl ChannelSender for UnsupportedChannelSender {
    fn channel_type(&self) -> &'static str {
        "unsupported"
    }

    async fn send(&self, ctx: &DispatchContext<'_>) -> Result<Vec<DeliveryOutcome>> {
        Ok(vec![DeliveryOutcome::failed(format!(
            "unsupported channel type: {}",
            ctx.channel.channel_type
        ))])
    }
}
