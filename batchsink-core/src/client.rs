use crate::classify::ServiceError;
use crate::entry::{BatchEntry, BatchResult};

/// The remote service a [crate::writer::BatchWriter] delivers to.
///
/// Implementations own the transport; timeouts are theirs to enforce.
#[trait_variant::make(BatchClient: Send)]
#[allow(dead_code)]
pub trait LocalBatchClient {
    /// Sends all entries, in order, as a single request to `destination`.
    ///
    /// `Err` means the request as a whole was rejected and nothing is known about the individual
    /// entries. `Ok` lists the entries the service did not accept.
    async fn send_batch(
        &self,
        destination: &str,
        entries: &[BatchEntry],
    ) -> Result<BatchResult, ServiceError>;

    /// Releases the underlying client.
    async fn close(&self);
}
