use aws_config::Region;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_sqs::Client;

use crate::config::{SQS_DEFAULT_REGION, SqsSinkConfig};
use crate::{Result, aws_behavior_version};

/// Creates an SQS client for the configured region and endpoint.
pub async fn create_sqs_client(config: &SqsSinkConfig) -> Result<Client> {
    config.validate()?;

    tracing::info!(region = %config.region, "Creating SQS client in region");

    let region_provider = RegionProviderChain::first_try(Region::new(config.region.clone()))
        .or_default_provider()
        .or_else(Region::new(SQS_DEFAULT_REGION));

    let mut config_builder = aws_config::defaults(aws_behavior_version()).region(region_provider);
    if let Some(endpoint_url) = &config.endpoint_url {
        config_builder = config_builder.endpoint_url(endpoint_url);
    }

    let shared_config = config_builder.load().await;
    Ok(Client::new(&shared_config))
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::Error;

    #[test(tokio::test)]
    async fn test_client_creation_with_defaults() {
        let config = SqsSinkConfig {
            queue_name: Some("test-queue".to_string()),
            ..Default::default()
        };

        let client = create_sqs_client(&config).await.unwrap();
        assert_eq!(
            client.config().region().map(ToString::to_string),
            Some(SQS_DEFAULT_REGION.to_string())
        );
    }

    #[test(tokio::test)]
    async fn test_client_creation_with_custom_endpoint() {
        let config = SqsSinkConfig {
            region: "us-east-1".to_string(),
            queue_url: Some("http://localhost:4566/000000000000/test-queue".to_string()),
            endpoint_url: Some("http://localhost:4566".to_string()),
            ..Default::default()
        };

        let client = create_sqs_client(&config).await.unwrap();
        assert_eq!(
            client.config().region().map(ToString::to_string),
            Some("us-east-1".to_string())
        );
    }

    #[test(tokio::test)]
    async fn test_client_creation_validation_failure() {
        let config = SqsSinkConfig::default();
        let result = create_sqs_client(&config).await;
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
