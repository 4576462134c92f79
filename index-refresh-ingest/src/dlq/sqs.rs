//! SQS dead-letter sink.

use async_trait::async_trait;
use aws_sdk_sqs::Client;
use tracing::{debug, info};

use super::DlqSink;
use crate::errors::IngestError;

/// SQS message size limit.
pub const SQS_MAX_MESSAGE_BYTES: usize = 256 * 1024;

/// Parts of an SQS queue ARN, `arn:<partition>:sqs:<region>:<account>:<name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueArn {
    pub region: String,
    pub account_id: String,
    pub queue_name: String,
}

impl QueueArn {
    pub fn parse(arn: &str) -> Result<Self, IngestError> {
        let parts: Vec<&str> = arn.trim().split(':').collect();
        match parts.as_slice() {
            ["arn", _partition, "sqs", region, account, name]
                if !account.is_empty() && !name.is_empty() =>
            {
                Ok(Self {
                    region: region.to_string(),
                    account_id: account.to_string(),
                    queue_name: name.to_string(),
                })
            }
            _ => Err(IngestError::dlq(format!("invalid SQS queue ARN: {}", arn))),
        }
    }
}

/// Sends envelopes to an SQS queue resolved from its ARN.
pub struct SqsDlqSink {
    client: Client,
    queue_url: String,
}

impl SqsDlqSink {
    /// Resolve the queue URL for `arn` and build the sink.
    pub async fn from_arn(client: Client, arn: &str) -> Result<Self, IngestError> {
        let arn = QueueArn::parse(arn)?;
        let response = client
            .get_queue_url()
            .queue_name(&arn.queue_name)
            .queue_owner_aws_account_id(&arn.account_id)
            .send()
            .await
            .map_err(|e| {
                IngestError::dlq(format!("cannot resolve queue {}: {}", arn.queue_name, e))
            })?;

        let queue_url = response
            .queue_url()
            .ok_or_else(|| IngestError::dlq(format!("queue {} has no URL", arn.queue_name)))?
            .to_string();

        info!(queue = %arn.queue_name, url = %queue_url, "DLQ enabled");
        Ok(Self { client, queue_url })
    }
}

#[async_trait]
impl DlqSink for SqsDlqSink {
    fn max_message_bytes(&self) -> usize {
        SQS_MAX_MESSAGE_BYTES
    }

    async fn send(&self, body: String) -> Result<(), IngestError> {
        let bytes = body.len();
        let response = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| IngestError::dlq(format!("send_message failed: {}", e)))?;

        debug!(
            message_id = response.message_id().unwrap_or_default(),
            bytes,
            "DLQ message sent"
        );
        Ok(())
    }
}
