//! Senders whose transport is simulated: sms, whatsapp and iot_device.
//!
//! Delivery is recorded as `sent` once the required destination field is
//! present; nothing leaves the process.

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::{ChannelSender, DeliveryOutcome, DispatchContext};
use crate::database::models::ChannelType;
use crate::Result;

pub struct SimulatedSender {
    channel_type: &'static str,
    destination_field: &'static str,
}

impl SimulatedSender {
    pub fn new(channel_type: &'static str, destination_field: &'static str) -> Self {
        Self {
            channel_type,
            destination_field,
        }
    }

    pub fn sms() -> Self {
        Self::new(ChannelType::Sms.as_str(), "phone_number")
    }

    pub fn whatsapp() -> Self {
        Self::new(ChannelType::Whatsapp.as_str(), "phone_number")
    }

    pub fn iot_device() -> Self {
        Self::new(ChannelType::IotDevice.as_str(), "device_endpoint")
    }
}

#[async_trait]
impl ChannelSender for SimulatedSender {
    fn channel_type(&self) -> &'static str {
        self.channel_type
    }

    async fn send(&self, ctx: &DispatchContext<'_>) -> Result<Vec<DeliveryOutcome>> {
        let Some(destination) = ctx.channel.config_value(self.destination_field) else {
            return Ok(vec![DeliveryOutcome::failed(format!(
                "{} {} not configured",
                self.channel_type, self.destination_field
            ))]);
        };

        info!(
            channel_type = self.channel_type,
            destination = %destination,
            event_id = %ctx.event.id,
            "Simulated delivery"
        );

        Ok(vec![DeliveryOutcome::sent(json!({
            (self.destination_field): destination,
            "message": ctx.alert_text(),
            "simulated": true,
        }))])
    }
}
