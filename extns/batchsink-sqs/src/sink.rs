//! Delivery of batches to an SQS queue with `SendMessageBatch`.
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use aws_sdk_sqs::Client;
use aws_sdk_sqs::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_sqs::types::SendMessageBatchRequestEntry;
use batchsink_core::convert::Serializer;
use batchsink_core::{
    BatchClient, BatchEntry, BatchResult, BatchWriter, BufferedWriter, ClassifierChain,
    EntryConverter, EntryFailure, Matcher, RecordContext, Rule, SerializingConverter,
    ServiceError, ServiceErrorKind, SinkMetrics,
};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::client::create_sqs_client;
use crate::config::SqsSinkConfig;
use crate::{Error, Result};

pub const DELAY_SECONDS_HEADER: &str = "DelaySeconds";
pub const MESSAGE_GROUP_ID_HEADER: &str = "MessageGroupId";
pub const MESSAGE_DEDUPLICATION_ID_HEADER: &str = "MessageDeduplicationId";

/// Codes SQS answers with when the queue is gone.
pub const QUEUE_DOES_NOT_EXIST_CODES: &[&str] =
    &["AWS.SimpleQueueService.NonExistentQueue", "QueueDoesNotExist"];

/// The standard chain plus SQS's missing-queue codes.
pub fn sqs_classifier_chain() -> ClassifierChain {
    ClassifierChain::standard().with_rule(Rule::fatal(
        "queue-does-not-exist",
        Matcher::ErrorCode(QUEUE_DOES_NOT_EXIST_CODES),
        "Encountered non-recoverable exception: the SQS queue does not exist",
    ))
}

/// Translates an SDK failure into a [ServiceError], keeping the SDK error as its source.
pub fn service_error<E, R>(err: SdkError<E, R>) -> ServiceError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: Debug + Send + Sync + 'static,
{
    let code = err.code().map(str::to_string);
    let kind = match (&err, code.as_deref()) {
        (SdkError::TimeoutError(_) | SdkError::DispatchFailure(_), _) => {
            ServiceErrorKind::Transport
        }
        (_, Some(code)) if QUEUE_DOES_NOT_EXIST_CODES.contains(&code) => {
            ServiceErrorKind::ResourceNotFound
        }
        _ => ServiceErrorKind::Service,
    };
    let message = match err.message() {
        Some(message) => message.to_string(),
        None => DisplayErrorContext(&err).to_string(),
    };

    let service_error = ServiceError::new(kind, message).with_source(err);
    match code {
        Some(code) => service_error.with_code(code),
        None => service_error,
    }
}

/// [BatchClient] on top of the SQS SDK client. The SDK client is dropped on [BatchClient::close].
#[derive(Debug)]
pub struct SqsBatchClient {
    client: RwLock<Option<Client>>,
}

impl SqsBatchClient {
    pub fn new(client: Client) -> Self {
        Self {
            client: RwLock::new(Some(client)),
        }
    }

    pub fn is_released(&self) -> bool {
        self.client.read().is_none()
    }

    fn client(&self) -> std::result::Result<Client, ServiceError> {
        self.client.read().clone().ok_or_else(|| {
            ServiceError::new(
                ServiceErrorKind::ResourceNotFound,
                "SQS client has already been released",
            )
        })
    }
}

/// Builds the SQS request entry of `entry` under the batch-local id `batch_id`.
fn request_entry(
    batch_id: String,
    entry: &BatchEntry,
) -> std::result::Result<SendMessageBatchRequestEntry, ServiceError> {
    let body = std::str::from_utf8(&entry.payload)
        .map_err(|e| ServiceError::invalid_entry(&entry.id, &e.to_string()))?;

    let mut builder = SendMessageBatchRequestEntry::builder()
        .id(batch_id)
        .message_body(body);

    if let Some(delay) = entry.headers.get(DELAY_SECONDS_HEADER) {
        let delay = delay.parse::<i32>().map_err(|e| {
            let reason = format!("invalid {DELAY_SECONDS_HEADER} {delay:?}: {e}");
            ServiceError::invalid_entry(&entry.id, &reason)
        })?;
        builder = builder.delay_seconds(delay);
    }
    if let Some(group_id) = entry.headers.get(MESSAGE_GROUP_ID_HEADER) {
        builder = builder.message_group_id(group_id);
    }
    if let Some(dedup_id) = entry.headers.get(MESSAGE_DEDUPLICATION_ID_HEADER) {
        builder = builder.message_deduplication_id(dedup_id);
    }

    builder
        .build()
        .map_err(|e| ServiceError::invalid_entry(&entry.id, &e.to_string()))
}

impl BatchClient for SqsBatchClient {
    async fn send_batch(
        &self,
        destination: &str,
        entries: &[BatchEntry],
    ) -> std::result::Result<BatchResult, ServiceError> {
        // SQS restricts the characters of batch entry ids, so entries are sent under
        // batch-local ids and correlated back afterwards.
        let mut request_entries = Vec::with_capacity(entries.len());
        let mut id_correlation = HashMap::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let batch_id = format!("msg_{index}");
            request_entries.push(request_entry(batch_id.clone(), entry)?);
            id_correlation.insert(batch_id, entry.id.as_str());
        }

        let output = self
            .client()?
            .send_message_batch()
            .queue_url(destination)
            .set_entries(Some(request_entries))
            .send()
            .await
            .map_err(service_error)?;

        let mut failed = Vec::with_capacity(output.failed.len());
        for failure in output.failed {
            let Some(id) = id_correlation.get(failure.id.as_str()) else {
                warn!(batch_id = %failure.id, "SQS reported a failure for an unknown batch id");
                continue;
            };
            failed.push(EntryFailure {
                code: Some(failure.code),
                message: failure.message,
                sender_fault: Some(failure.sender_fault),
                ..EntryFailure::new(*id)
            });
        }

        debug!(
            successful = output.successful.len(),
            failed = failed.len(),
            "SendMessageBatch completed"
        );
        Ok(BatchResult::with_failed(failed))
    }

    async fn close(&self) {
        if self.client.write().take().is_some() {
            info!("Released SQS client");
        } else {
            debug!("SQS client was already released");
        }
    }
}

/// Converter that only lets UTF-8 payloads through, since an SQS message body is text.
#[derive(Debug, Clone, Default)]
pub struct SqsEntryConverter<S> {
    inner: SerializingConverter<S>,
}

impl<S> SqsEntryConverter<S> {
    pub fn new(serializer: S) -> Self {
        Self {
            inner: SerializingConverter::new(serializer),
        }
    }
}

impl<T, S> EntryConverter<T> for SqsEntryConverter<S>
where
    S: Serializer<T>,
{
    fn convert(&self, record: T, context: &RecordContext) -> BatchEntry {
        let entry = self.inner.convert(record, context);
        if entry.is_valid() && std::str::from_utf8(&entry.payload).is_err() {
            warn!(id = %entry.id, "Record is not valid UTF-8, it will be rejected on submit");
            return BatchEntry::invalid(entry.id, "SQS message bodies must be valid UTF-8");
        }
        entry
    }
}

/// Builds a [BatchWriter] delivering to an SQS queue.
#[derive(Clone)]
pub struct SqsSinkBuilder {
    config: SqsSinkConfig,
    client: Option<Client>,
    classifier: ClassifierChain,
}

impl SqsSinkBuilder {
    pub fn new(config: SqsSinkConfig) -> Self {
        Self {
            config,
            client: None,
            classifier: sqs_classifier_chain(),
        }
    }

    /// Uses an existing client instead of creating one from the configuration.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn classifier(mut self, classifier: ClassifierChain) -> Self {
        self.classifier = classifier;
        self
    }

    pub async fn build(self) -> Result<BatchWriter<SqsBatchClient>> {
        self.config.validate()?;

        let client = match self.client {
            Some(client) => client,
            None => create_sqs_client(&self.config).await?,
        };

        let queue_url = match &self.config.queue_url {
            Some(queue_url) if !queue_url.is_empty() => queue_url.clone(),
            _ => resolve_queue_url(&client, &self.config).await?,
        };

        info!(
            %queue_url,
            fail_on_error = self.config.writer.fail_on_error,
            "SQS writer ready"
        );
        Ok(BatchWriter::new(
            SqsBatchClient::new(client),
            queue_url,
            self.config.writer.fail_on_error,
        )
        .with_classifier(self.classifier))
    }

    /// Builds the writer and puts a [BufferedWriter] using the configured limits in front of it.
    pub async fn build_buffered<V>(
        self,
        converter: V,
        metrics: SinkMetrics,
    ) -> Result<BufferedWriter<V, SqsBatchClient>> {
        let writer_config = self.config.writer.clone();
        let writer = self.build().await?;
        Ok(BufferedWriter::new(
            Arc::new(writer),
            converter,
            writer_config,
            metrics,
        )?)
    }
}

async fn resolve_queue_url(client: &Client, config: &SqsSinkConfig) -> Result<String> {
    let queue_name = config
        .queue_name
        .as_deref()
        .ok_or_else(|| Error::InvalidConfig("queue_name is required".to_string()))?;

    let output = client
        .get_queue_url()
        .queue_name(queue_name)
        .set_queue_owner_aws_account_id(config.queue_owner_aws_account_id.clone())
        .send()
        .await
        .map_err(|err| Error::Sqs(err.into()))?;

    let queue_url = output
        .queue_url
        .ok_or_else(|| Error::Other("Queue URL not found".to_string()))?;
    info!(%queue_url, "Queue URL found");
    Ok(queue_url)
}
