use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_sqs::Client as SqsClient;
use std::time::Duration;

use super::source::{QueueMessage, QueueSource};

pub struct SqsQueue {
    client: SqsClient,
    queue_url: String,
}

impl SqsQueue {
    pub fn new(client: SqsClient, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
        }
    }

    /// Resolves AWS configuration from the environment and builds a client.
    ///
    /// `region` overrides the region from the default provider chain;
    /// `endpoint_url` points the client at an SQS-compatible endpoint such as
    /// a local emulator.
    pub async fn connect(
        queue_url: &str,
        region: Option<&str>,
        endpoint_url: Option<&str>,
    ) -> Result<Self> {
        let config = get_aws_config(region, endpoint_url).await?;
        let client = SqsClient::new(&config);
        Ok(Self::new(client, queue_url))
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }
}

pub async fn get_aws_config(
    region: Option<&str>,
    endpoint_url: Option<&str>,
) -> Result<aws_config::SdkConfig> {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

    if let Some(region) = region {
        loader = loader.region(aws_config::Region::new(region.to_string()));
    }
    if let Some(endpoint_url) = endpoint_url {
        loader = loader.endpoint_url(endpoint_url);
    }

    let config = loader.load().await;

    if config.region().is_none() {
        anyhow::bail!("No AWS region configured; set AWS_REGION or pass --region");
    }

    Ok(config)
}

fn to_queue_message(message: &aws_sdk_sqs::types::Message) -> Option<QueueMessage> {
    let Some(receipt_handle) = message.receipt_handle() else {
        log::warn!(
            "Skipping message {:?} without receipt handle",
            message.message_id()
        );
        return None;
    };

    Some(QueueMessage {
        message_id: message.message_id().unwrap_or_default().to_string(),
        body: message.body().unwrap_or_default().to_string(),
        receipt_handle: receipt_handle.to_string(),
    })
}

#[async_trait]
impl QueueSource for SqsQueue {
    async fn receive_batch(&self, max_messages: i32, wait: Duration) -> Result<Vec<QueueMessage>> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages)
            .wait_time_seconds(wait.as_secs() as i32)
            .send()
            .await
            .with_context(|| format!("Failed to receive messages from queue: {}", self.queue_url))?;

        let messages: Vec<QueueMessage> = output
            .messages()
            .iter()
            .filter_map(to_queue_message)
            .collect();

        log::debug!(
            "Received {} messages from {}",
            messages.len(),
            self.queue_url
        );

        Ok(messages)
    }

    async fn delete_by_receipt(&self, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .with_context(|| format!("Failed to delete message with receipt handle: {}", receipt_handle))?;

        Ok(())
    }
}
