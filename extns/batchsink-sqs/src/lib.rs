//! Amazon SQS binding for [batchsink_core].
//!
//! [sink::SqsBatchClient] delivers batches with `SendMessageBatch` and translates the SDK's
//! results and errors into the core's [batchsink_core::BatchResult] and
//! [batchsink_core::ServiceError]. [sink::SqsSinkBuilder] wires a client, the queue URL and the
//! SQS classifier chain into a [batchsink_core::BatchWriter].
use aws_config::BehaviorVersion;

pub mod client;
pub mod config;
pub mod sink;

pub use client::create_sqs_client;
pub use config::{SQS_DEFAULT_REGION, SqsSinkConfig};
pub use sink::{SqsBatchClient, SqsEntryConverter, SqsSinkBuilder, sqs_classifier_chain};

/// Errors raised while setting up an SQS writer.
///
/// Failures of batch submissions are reported through [batchsink_core::Error], wrapped in
/// [Error::Core] where they cross this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed with SQS error - {0}")]
    Sqs(#[from] aws_sdk_sqs::Error),

    #[error("Failed with sink error - {0}")]
    Core(#[from] batchsink_core::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = core::result::Result<T, Error>;

impl From<String> for Error {
    fn from(value: String) -> Self {
        Error::Other(value)
    }
}

pub(crate) fn aws_behavior_version() -> BehaviorVersion {
    BehaviorVersion::latest()
}
