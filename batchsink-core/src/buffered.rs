//! A minimal, sequential engine in front of a [BatchWriter].
//!
//! [BufferedWriter] converts and buffers records, cuts the buffer into batches that respect the
//! configured count and byte limits, and re-drives the residual entries of each batch with
//! exponential backoff until they are delivered. It keeps one batch in flight at a time; the
//! [BatchWriter] underneath can be shared with other engines that submit concurrently.
//!
//! Error handling: a fail-fast or fatal failure counts the entries of the failed batch as errors
//! and aborts the writer, every later call returns an error. Entries that were not part of the
//! failed batch stay buffered and are reported when the writer is closed.
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::backoff::RetryBackoff;
use crate::client::BatchClient;
use crate::config::WriterConfig;
use crate::convert::{EntryConverter, RecordContext};
use crate::entry::{BatchEntry, size_in_bytes};
use crate::error::{Error, Result, Retryability};
use crate::metrics::SinkMetrics;
use crate::writer::BatchWriter;

pub struct BufferedWriter<V, C> {
    writer: Arc<BatchWriter<C>>,
    converter: V,
    config: WriterConfig,
    metrics: SinkMetrics,
    buffer: VecDeque<BatchEntry>,
    /// Reason the writer stopped accepting work, set on the first fatal or fail-fast failure.
    aborted: Option<String>,
}

impl<V, C> BufferedWriter<V, C>
where
    C: BatchClient + Sync,
{
    pub fn new(
        writer: Arc<BatchWriter<C>>,
        converter: V,
        config: WriterConfig,
        metrics: SinkMetrics,
    ) -> Result<Self> {
        config.validate()?;
        if config.fail_on_error != writer.fail_on_error() {
            return Err(Error::InvalidConfig(format!(
                "fail_on_error is {} in the configuration but {} on the batch writer",
                config.fail_on_error,
                writer.fail_on_error()
            )));
        }
        Ok(Self {
            writer,
            converter,
            config,
            metrics,
            buffer: VecDeque::new(),
            aborted: None,
        })
    }

    /// Number of entries waiting to be delivered.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn metrics(&self) -> &SinkMetrics {
        &self.metrics
    }

    pub async fn write<T>(&mut self, record: T) -> Result<()>
    where
        V: EntryConverter<T>,
    {
        self.write_with_context(record, &RecordContext::default())
            .await
    }

    /// Converts and buffers the record, flushing once `max_buffered_requests` entries are waiting.
    pub async fn write_with_context<T>(&mut self, record: T, context: &RecordContext) -> Result<()>
    where
        V: EntryConverter<T>,
    {
        self.ensure_usable()?;

        let entry = self.converter.convert(record, context);
        let size = size_in_bytes(&entry);
        if size > self.config.max_record_size_in_bytes {
            return Err(Error::RecordTooLarge {
                size,
                limit: self.config.max_record_size_in_bytes,
            });
        }
        self.buffer.push_back(entry);

        if self.buffer.len() >= self.config.max_buffered_requests {
            self.flush().await?;
        }
        Ok(())
    }

    /// Delivers every buffered entry, retrying residual entries with backoff.
    pub async fn flush(&mut self) -> Result<()> {
        self.ensure_usable()?;

        let mut backoff = RetryBackoff::from(&self.config.retry);
        while !self.buffer.is_empty() {
            if self.writer.is_closed() {
                return Err(Error::Closed);
            }

            let batch = self.next_batch();
            let batch_len = batch.len();
            let sizes: HashMap<String, usize> = batch
                .iter()
                .map(|entry| (entry.id.clone(), size_in_bytes(entry)))
                .collect();

            let mut residual = Vec::new();
            let outcome = match self
                .writer
                .submit(batch, |entries| residual = entries)
                .await
            {
                Ok(outcome) => outcome,
                Err(err) => {
                    if err.is_sink_failure() {
                        self.metrics.records_out_errors.inc_by(batch_len as u64);
                        self.metrics.send_errors.inc_by(batch_len as u64);
                        self.abort(&err);
                    }
                    return Err(err);
                }
            };

            let undelivered: usize = residual
                .iter()
                .map(|entry| entry.id.as_str())
                .chain(outcome.rejected.iter().map(|failure| failure.id.as_str()))
                .filter_map(|id| sizes.get(id))
                .sum();
            let batch_bytes: usize = sizes.values().sum();
            self.metrics.records_out.inc_by(outcome.delivered as u64);
            self.metrics
                .bytes_out
                .inc_by(batch_bytes.saturating_sub(undelivered) as u64);

            if !outcome.rejected.is_empty() {
                let rejected = outcome.rejected.len();
                self.metrics.records_out_errors.inc_by(rejected as u64);
                self.metrics.send_errors.inc_by(rejected as u64);
                let err = Error::fail_fast_rejected(rejected);
                self.abort(&err);
                return Err(err);
            }

            if residual.is_empty() {
                backoff.reset();
                continue;
            }

            let retrying = residual.len();
            self.metrics.retries.inc_by(retrying as u64);
            // back to the front, keeping their order, so they go out with the next batch
            for entry in residual.into_iter().rev() {
                self.buffer.push_front(entry);
            }

            match backoff.next() {
                Some(delay) => {
                    warn!(
                        attempt = backoff.attempt(),
                        retrying,
                        ?delay,
                        "Retrying undelivered entries"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    error!(
                        attempts = backoff.attempt(),
                        pending = self.buffer.len(),
                        "Retries exhausted, entries remain buffered"
                    );
                    return Err(Error::Sink {
                        message: format!(
                            "retries exhausted with {retrying} entries still undelivered"
                        ),
                        retryable: Retryability::Retryable,
                        source: None,
                    });
                }
            }
        }
        Ok(())
    }

    /// Flushes what is buffered and closes the underlying [BatchWriter]. A failing flush is
    /// returned after the writer has been closed.
    pub async fn close(mut self) -> Result<()> {
        let flushed = match &self.aborted {
            None => self.flush().await,
            Some(reason) if !self.buffer.is_empty() => Err(Error::Sink {
                message: format!(
                    "closing with {} undelivered entries after an earlier failure: {reason}",
                    self.buffer.len()
                ),
                retryable: Retryability::NotRetryable,
                source: None,
            }),
            Some(_) => Ok(()),
        };

        self.writer.close().await;
        info!(pending = self.buffer.len(), "Buffered writer closed");
        flushed
    }

    /// Takes the next batch off the front of the buffer, bounded by count and payload size.
    fn next_batch(&mut self) -> Vec<BatchEntry> {
        let mut batch = Vec::with_capacity(self.config.max_batch_size.min(self.buffer.len()));
        let mut batch_bytes = 0;
        while batch.len() < self.config.max_batch_size {
            let Some(size) = self.buffer.front().map(size_in_bytes) else {
                break;
            };
            if !batch.is_empty() && batch_bytes + size > self.config.max_batch_size_in_bytes {
                break;
            }
            let Some(entry) = self.buffer.pop_front() else {
                break;
            };
            batch_bytes += size;
            batch.push(entry);
        }
        batch
    }

    fn abort(&mut self, err: &Error) {
        error!(
            ?err,
            pending = self.buffer.len(),
            "Aborting writer, no more records will be written"
        );
        self.aborted = Some(err.to_string());
    }

    fn ensure_usable(&self) -> Result<()> {
        match &self.aborted {
            Some(reason) => Err(Error::Sink {
                message: format!("writer was aborted by an earlier failure: {reason}"),
                retryable: Retryability::NotRetryable,
                source: None,
            }),
            None => Ok(()),
        }
    }
}
