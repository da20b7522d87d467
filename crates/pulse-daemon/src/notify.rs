//! HTTP delivery of spike notifications

use std::time::Duration;

use async_trait::async_trait;
use pulse_engine::{DeliveryError, NotificationSink};
use pulse_types::SpikePayload;
use reqwest::Client;

use crate::error::{delivery_error, SinkError};

/// POSTs each payload as JSON to `{base_url}/edits/spikes`.
pub struct HttpNotificationSink {
    client: Client,
    endpoint: String,
}

impl HttpNotificationSink {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SinkError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/edits/spikes", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl NotificationSink for HttpNotificationSink {
    async fn deliver(&self, payload: &SpikePayload) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await
            .map_err(delivery_error)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}
