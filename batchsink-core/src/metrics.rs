use prometheus_client::metrics::counter::Counter;
use prometheus_client::registry::Registry;

// Prefix of the sub-registry all the sink metrics live in.
const SINK_REGISTRY_PREFIX: &str = "sink";

// counters, the _total suffix is added by the prometheus client library
const RECORDS_OUT: &str = "records_out";
const RECORDS_OUT_ERRORS: &str = "records_out_errors";
const SEND_ERRORS: &str = "send_errors";
const BYTES_OUT: &str = "bytes_out";
const RETRIES: &str = "retries";

/// Counters kept by the engine driving a [crate::writer::BatchWriter].
///
/// Counters are cheap to clone and share their value, so the same [SinkMetrics] can be handed to
/// several writers.
#[derive(Debug, Clone, Default)]
pub struct SinkMetrics {
    /// Records durably accepted by the service.
    pub records_out: Counter,
    /// Records that failed for good.
    pub records_out_errors: Counter,
    /// Records whose send attempt failed and was not retried.
    pub send_errors: Counter,
    /// Payload bytes durably accepted by the service.
    pub bytes_out: Counter,
    /// Entries handed back for another attempt.
    pub retries: Counter,
}

impl SinkMetrics {
    /// Creates the counters and registers them in a `sink` sub-registry of `registry`.
    pub fn register(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        let sink_registry = registry.sub_registry_with_prefix(SINK_REGISTRY_PREFIX);
        sink_registry.register(
            RECORDS_OUT,
            "A Counter to keep track of the total number of records written to the sink",
            metrics.records_out.clone(),
        );
        sink_registry.register(
            RECORDS_OUT_ERRORS,
            "A Counter to keep track of the total number of records that could not be written to the sink",
            metrics.records_out_errors.clone(),
        );
        sink_registry.register(
            SEND_ERRORS,
            "A Counter to keep track of the total number of records whose send attempt failed without a retry",
            metrics.send_errors.clone(),
        );
        sink_registry.register(
            BYTES_OUT,
            "A Counter to keep track of the total number of payload bytes written to the sink",
            metrics.bytes_out.clone(),
        );
        sink_registry.register(
            RETRIES,
            "A Counter to keep track of the total number of records handed back for another attempt",
            metrics.retries.clone(),
        );
        metrics
    }
}

#[cfg(test)]
mod tests {
    use prometheus_client::encoding::text::encode;

    use super::*;

    #[test]
    fn test_registered_metrics_are_exposed() {
        let mut registry = Registry::default();
        let metrics = SinkMetrics::register(&mut registry);
        metrics.records_out.inc_by(3);
        metrics.records_out_errors.inc();

        let mut buffer = String::new();
        encode(&mut buffer, &registry).unwrap();

        assert!(buffer.contains("sink_records_out_total 3"));
        assert!(buffer.contains("sink_records_out_errors_total 1"));
        assert!(buffer.contains("sink_send_errors_total 0"));
        assert!(buffer.contains("sink_bytes_out_total 0"));
        assert!(buffer.contains("sink_retries_total 0"));
    }

    #[test]
    fn test_clones_share_values() {
        let metrics = SinkMetrics::default();
        let cloned = metrics.clone();
        cloned.send_errors.inc_by(10);
        assert_eq!(metrics.send_errors.get(), 10);
    }
}
