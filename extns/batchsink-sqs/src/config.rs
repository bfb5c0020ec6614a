use batchsink_core::WriterConfig;
use serde::Deserialize;

use crate::{Error, Result};

pub const SQS_DEFAULT_REGION: &str = "us-west-2";

/// Entries a single `SendMessageBatch` request accepts.
const SQS_MAX_BATCH_SIZE: usize = 10;

/// Configuration of a writer delivering to an SQS queue.
///
/// The queue is addressed either by `queue_url`, or by `queue_name` (and optionally the owning
/// account) in which case the URL is looked up when the writer is built.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SqsSinkConfig {
    pub region: String,
    pub queue_url: Option<String>,
    pub queue_name: Option<String>,
    pub queue_owner_aws_account_id: Option<String>,
    /// Overrides the SQS endpoint, e.g. for a local emulator.
    pub endpoint_url: Option<String>,
    pub writer: WriterConfig,
}

impl Default for SqsSinkConfig {
    fn default() -> Self {
        Self {
            region: SQS_DEFAULT_REGION.to_string(),
            queue_url: None,
            queue_name: None,
            queue_owner_aws_account_id: None,
            endpoint_url: None,
            writer: WriterConfig::default(),
        }
    }
}

impl SqsSinkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.region.is_empty() {
            return Err(Error::InvalidConfig("region is required".to_string()));
        }

        let has_url = self.queue_url.as_deref().is_some_and(|url| !url.is_empty());
        let has_name = self
            .queue_name
            .as_deref()
            .is_some_and(|name| !name.is_empty());
        if !has_url && !has_name {
            return Err(Error::InvalidConfig(
                "either queue_url or queue_name is required".to_string(),
            ));
        }

        if self.writer.max_batch_size > SQS_MAX_BATCH_SIZE {
            return Err(Error::InvalidConfig(format!(
                "max_batch_size must be at most {SQS_MAX_BATCH_SIZE} for SQS, got {}",
                self.writer.max_batch_size
            )));
        }

        self.writer.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SqsSinkConfig::default();
        assert_eq!(config.region, SQS_DEFAULT_REGION);
        assert_eq!(config.writer.max_batch_size, 10);
        assert_eq!(config.writer.max_buffered_requests, 5000);
        assert_eq!(config.writer.max_batch_size_in_bytes, 256 * 1024);
        assert_eq!(config.writer.max_record_size_in_bytes, 256 * 1024);
        // no queue configured yet
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_deserialize_config() {
        let config: SqsSinkConfig = serde_json::from_str(
            r#"{
                "region": "us-east-1",
                "queue_name": "test-q",
                "queue_owner_aws_account_id": "123456789012",
                "writer": {"fail_on_error": true, "max_batch_size": 5}
            }"#,
        )
        .unwrap();

        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.queue_name.as_deref(), Some("test-q"));
        assert_eq!(config.queue_url, None);
        assert!(config.writer.fail_on_error);
        assert_eq!(config.writer.max_batch_size, 5);
        assert_eq!(config.writer.max_buffered_requests, 5000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_failures() {
        let config = SqsSinkConfig {
            region: "".to_string(),
            queue_name: Some("test-q".to_string()),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = SqsSinkConfig {
            queue_name: Some("".to_string()),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = SqsSinkConfig {
            queue_url: Some("http://localhost:4566/000000000000/test-q".to_string()),
            writer: WriterConfig {
                max_batch_size: 20,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = SqsSinkConfig {
            queue_url: Some("http://localhost:4566/000000000000/test-q".to_string()),
            writer: WriterConfig {
                max_buffered_requests: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::Core(batchsink_core::Error::InvalidConfig(_)))
        ));
    }
}
