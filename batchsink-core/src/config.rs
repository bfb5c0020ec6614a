use serde::Deserialize;

use crate::error::{Error, Result};

const DEFAULT_MAX_BATCH_SIZE: usize = 10;
const DEFAULT_MAX_BUFFERED_REQUESTS: usize = 5000;
const DEFAULT_MAX_BATCH_SIZE_IN_BYTES: usize = 256 * 1024;
const DEFAULT_MAX_RECORD_SIZE_IN_BYTES: usize = 256 * 1024;

const DEFAULT_MAX_RETRY_ATTEMPTS: u16 = u16::MAX;
const DEFAULT_INITIAL_RETRY_INTERVAL_IN_MS: u32 = 100;
const DEFAULT_MAX_RETRY_INTERVAL_IN_MS: u32 = 30_000;
const DEFAULT_RETRY_FACTOR: f64 = 2.0;
const DEFAULT_RETRY_JITTER: f64 = 0.0;

/// Backoff applied before a batch's residual entries are submitted again.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retry_attempts: u16,
    pub initial_retry_interval_in_ms: u32,
    pub max_retry_interval_in_ms: u32,
    pub retry_factor: f64,
    /// Randomization between 0.0 and 1.0 applied to every interval.
    pub retry_jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            initial_retry_interval_in_ms: DEFAULT_INITIAL_RETRY_INTERVAL_IN_MS,
            max_retry_interval_in_ms: DEFAULT_MAX_RETRY_INTERVAL_IN_MS,
            retry_factor: DEFAULT_RETRY_FACTOR,
            retry_jitter: DEFAULT_RETRY_JITTER,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.retry_jitter) {
            return Err(Error::InvalidConfig(format!(
                "retry_jitter must be between 0.0 and 1.0, got {}",
                self.retry_jitter
            )));
        }
        if self.retry_factor < 1.0 {
            return Err(Error::InvalidConfig(format!(
                "retry_factor must be at least 1.0, got {}",
                self.retry_factor
            )));
        }
        if self.initial_retry_interval_in_ms > self.max_retry_interval_in_ms {
            return Err(Error::InvalidConfig(
                "initial_retry_interval_in_ms cannot exceed max_retry_interval_in_ms".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings of a writer, supplied when it is constructed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Abort on the first error of any kind instead of retrying.
    pub fail_on_error: bool,
    /// Maximum number of entries in one batch request.
    pub max_batch_size: usize,
    /// Number of buffered entries that forces a flush.
    pub max_buffered_requests: usize,
    /// Maximum summed payload size of one batch request.
    pub max_batch_size_in_bytes: usize,
    /// Maximum payload size of a single record.
    pub max_record_size_in_bytes: usize,
    pub retry: RetryConfig,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            fail_on_error: false,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_buffered_requests: DEFAULT_MAX_BUFFERED_REQUESTS,
            max_batch_size_in_bytes: DEFAULT_MAX_BATCH_SIZE_IN_BYTES,
            max_record_size_in_bytes: DEFAULT_MAX_RECORD_SIZE_IN_BYTES,
            retry: RetryConfig::default(),
        }
    }
}

impl WriterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(Error::InvalidConfig(
                "max_batch_size must be greater than 0".to_string(),
            ));
        }
        if self.max_buffered_requests < self.max_batch_size {
            return Err(Error::InvalidConfig(format!(
                "max_buffered_requests ({}) must be at least max_batch_size ({})",
                self.max_buffered_requests, self.max_batch_size
            )));
        }
        if self.max_record_size_in_bytes > self.max_batch_size_in_bytes {
            return Err(Error::InvalidConfig(format!(
                "max_record_size_in_bytes ({}) cannot exceed max_batch_size_in_bytes ({})",
                self.max_record_size_in_bytes, self.max_batch_size_in_bytes
            )));
        }
        self.retry.validate()
    }
}
