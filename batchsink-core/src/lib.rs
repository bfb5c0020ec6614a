//! Batched, asynchronous delivery of records to a remote queueing service.
//!
//! A [BatchWriter] submits one batch at a time to a [BatchClient] and reconciles the per-entry
//! result: entries the service did not accept are handed back to the caller through a residual
//! callback, failures of the whole request are classified by a [ClassifierChain] into fatal and
//! retryable ones. Nothing is dropped silently; an entry is either delivered, handed back, or
//! part of a returned [Error].
//!
//! [BufferedWriter] is a small sequential engine on top of a [BatchWriter] that buffers records,
//! cuts batches and re-drives residual entries with backoff.

pub mod backoff;
pub mod buffered;
pub mod classify;
pub mod client;
pub mod config;
pub mod convert;
pub mod entry;
pub mod error;
pub mod metrics;
pub mod writer;

#[cfg(test)]
mod test_utils;

pub use buffered::BufferedWriter;
pub use classify::{
    ClassifiedFailure, ClassifierChain, FailureKind, Matcher, Rule, ServiceError, ServiceErrorKind,
};
pub use client::BatchClient;
pub use config::{RetryConfig, WriterConfig};
pub use convert::{EntryConverter, RecordContext, SerializingConverter};
pub use entry::{BatchEntry, BatchResult, EntryFailure, size_in_bytes};
pub use error::{Error, Result, Retryability};
pub use metrics::SinkMetrics;
pub use writer::{BatchOutcome, BatchWriter};
