use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;

use crate::classify::{ServiceError, ServiceErrorKind};
use crate::client::BatchClient;
use crate::entry::{BatchEntry, BatchResult, EntryFailure};

type Responder = Box<dyn Fn(&[BatchEntry]) -> Result<BatchResult, ServiceError> + Send + Sync>;

/// In-memory [BatchClient] with a scripted response, recording every request it receives.
pub(crate) struct MockClient {
    responder: Responder,
    requests: Mutex<Vec<Vec<BatchEntry>>>,
    close_count: AtomicUsize,
    /// When set, every request waits for a permit before it is answered.
    gate: Option<Arc<Semaphore>>,
}

impl MockClient {
    pub(crate) fn new(
        responder: impl Fn(&[BatchEntry]) -> Result<BatchResult, ServiceError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
            close_count: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// Accepts every entry.
    pub(crate) fn succeeding() -> Self {
        Self::new(|_| Ok(BatchResult::success()))
    }

    /// Reports the given ids as failed.
    pub(crate) fn failing_ids(ids: &[&str]) -> Self {
        let failed: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        Self::new(move |_| {
            Ok(BatchResult::with_failed(
                failed.iter().map(EntryFailure::new).collect(),
            ))
        })
    }

    /// Rejects every request as a whole.
    pub(crate) fn rejecting(kind: ServiceErrorKind, code: Option<&'static str>) -> Self {
        Self::new(move |_| {
            let err = ServiceError::new(kind, "request rejected");
            Err(match code {
                Some(code) => err.with_code(code),
                None => err,
            })
        })
    }

    /// Rejects every request as if the service could not be reached.
    pub(crate) fn connection_refused() -> Self {
        Self::new(|_| {
            Err(ServiceError::new(
                ServiceErrorKind::Transport,
                "Unable to execute HTTP request: Connection refused",
            )
            .with_source(std::io::Error::from(std::io::ErrorKind::ConnectionRefused)))
        })
    }

    pub(crate) fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub(crate) fn requests(&self) -> Vec<Vec<BatchEntry>> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

impl BatchClient for MockClient {
    async fn send_batch(
        &self,
        _destination: &str,
        entries: &[BatchEntry],
    ) -> Result<BatchResult, ServiceError> {
        self.requests.lock().unwrap().push(entries.to_vec());
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        (self.responder)(entries)
    }

    async fn close(&self) {
        self.close_count.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) fn entries(payloads: &[&str]) -> Vec<BatchEntry> {
    payloads
        .iter()
        .enumerate()
        .map(|(i, payload)| BatchEntry::new(format!("id-{i}"), payload.to_string()))
        .collect()
}
