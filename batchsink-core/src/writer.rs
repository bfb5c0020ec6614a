//! Submission of a single batch and reconciliation of its outcome.
//!
//! [BatchWriter::submit] issues one request for the entries it is given and tells the caller,
//! through the residual callback, which of those entries still need to be delivered. It never
//! retries on its own; re-driving the residual entries (with backoff) is up to the caller.
//!
//! ```text
//!                         (Ok) -- failed ids ∩ entries --> on_residual(residual)
//!                        /                                  [fail_on_error: rejected, no callback]
//! submit(entries) --> send
//!                        \              (fail_on_error) --> FailFast
//!                         (Err) -- classify --> (Fatal) --> Sink
//!                                           \
//!                                            (Retryable) --> on_residual(entries)
//! ```
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::classify::{ClassifierChain, FailureKind, ServiceError};
use crate::client::BatchClient;
use crate::entry::{BatchEntry, BatchResult, EntryFailure};
use crate::error::{Error, Result};

/// What became of the entries of one submitted batch.
#[derive(Debug, Default, PartialEq)]
pub struct BatchOutcome {
    /// Entries the service durably accepted.
    pub delivered: usize,
    /// Entries handed back through the residual callback.
    pub retried: usize,
    /// Entries the service rejected while `fail_on_error` is set. They are not handed back and
    /// must be accounted for as errors by the caller.
    pub rejected: Vec<EntryFailure>,
}

/// Shared, lock-free state of a writer.
#[derive(Debug, Default)]
struct WriterState {
    in_flight: AtomicUsize,
    closed: AtomicBool,
    drained: Notify,
    /// Set once the client has been released by the first `close()`.
    released: AtomicBool,
    released_notify: Notify,
}

impl WriterState {
    /// Registers a submission, refusing it once the writer is closed.
    fn acquire(&self) -> Result<InFlightGuard<'_>> {
        // increment before looking at `closed` so that close() either sees this submission or
        // this submission sees close().
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlightGuard { state: self };
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        Ok(guard)
    }
}

/// Releases the in-flight slot of a submission on every exit path.
struct InFlightGuard<'a> {
    state: &'a WriterState,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.state.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state.drained.notify_waiters();
        }
    }
}

/// Submits batches of [BatchEntry]s to a [BatchClient] and reconciles the per-entry results.
///
/// The writer is meant to be shared (e.g. behind an `Arc`) by every task that submits batches for
/// the same destination; concurrent submissions only share the in-flight counter and the closed
/// flag.
pub struct BatchWriter<C> {
    client: C,
    destination: String,
    fail_on_error: bool,
    classifier: ClassifierChain,
    state: WriterState,
}

impl<C> BatchWriter<C>
where
    C: BatchClient + Sync,
{
    /// Creates a writer that classifies failures with [ClassifierChain::standard].
    pub fn new(client: C, destination: impl Into<String>, fail_on_error: bool) -> Self {
        Self {
            client,
            destination: destination.into(),
            fail_on_error,
            classifier: ClassifierChain::standard(),
            state: WriterState::default(),
        }
    }

    pub fn with_classifier(mut self, classifier: ClassifierChain) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn fail_on_error(&self) -> bool {
        self.fail_on_error
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Number of submissions that have not completed yet.
    pub fn in_flight(&self) -> usize {
        self.state.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Sends `entries` as one batch and invokes `on_residual` with the entries that still have to
    /// be delivered, in their original order. An empty residual means the batch is complete.
    ///
    /// `on_residual` is invoked at most once; it is not invoked when an error is returned, nor
    /// when entries are rejected while `fail_on_error` is set (see [BatchOutcome::rejected]).
    pub async fn submit<F>(&self, entries: Vec<BatchEntry>, on_residual: F) -> Result<BatchOutcome>
    where
        F: FnOnce(Vec<BatchEntry>) + Send,
    {
        let _in_flight = self.state.acquire()?;

        if let Some(entry) = entries.iter().find(|entry| !entry.is_valid()) {
            let reason = entry.invalid.as_deref().unwrap_or_default();
            let err = ServiceError::invalid_entry(&entry.id, reason);
            return self.handle_request_failure(err, entries, on_residual);
        }

        debug!(
            destination = %self.destination,
            entries = entries.len(),
            "Submitting batch"
        );
        match self.client.send_batch(&self.destination, &entries).await {
            Ok(result) => Ok(self.reconcile(result, entries, on_residual)),
            Err(err) => self.handle_request_failure(err, entries, on_residual),
        }
    }

    /// The request as a whole failed, so none of the entries is known to be delivered.
    fn handle_request_failure<F>(
        &self,
        err: ServiceError,
        entries: Vec<BatchEntry>,
        on_residual: F,
    ) -> Result<BatchOutcome>
    where
        F: FnOnce(Vec<BatchEntry>),
    {
        let failure = self.classifier.classify(err);

        if self.fail_on_error {
            error!(
                entries = entries.len(),
                fatal = failure.is_fatal(),
                error = %failure.cause,
                "Batch request failed, not retrying since fail_on_error is set"
            );
            return Err(Error::fail_fast(failure));
        }

        match failure.kind {
            FailureKind::Fatal => {
                error!(
                    entries = entries.len(),
                    code = ?failure.cause.code,
                    error = %failure.cause,
                    "Batch request failed with a non-recoverable error"
                );
                Err(Error::sink(failure))
            }
            FailureKind::Retryable => {
                let retried = entries.len();
                warn!(
                    entries = retried,
                    error = %failure.cause,
                    "Batch request failed with a retryable error, handing the whole batch back"
                );
                on_residual(entries);
                Ok(BatchOutcome {
                    retried,
                    ..Default::default()
                })
            }
        }
    }

    /// The request succeeded; keep the entries the service reported as failed.
    fn reconcile<F>(
        &self,
        result: BatchResult,
        entries: Vec<BatchEntry>,
        on_residual: F,
    ) -> BatchOutcome
    where
        F: FnOnce(Vec<BatchEntry>),
    {
        let total = entries.len();
        let failed_ids = result.failed_ids();
        let residual: Vec<BatchEntry> = entries
            .into_iter()
            .filter(|entry| failed_ids.contains(entry.id.as_str()))
            .collect();

        if residual.len() < failed_ids.len() {
            warn!(
                unknown = failed_ids.len() - residual.len(),
                "Service reported failures for ids that were not part of the batch, ignoring them"
            );
        }
        let delivered = total - residual.len();

        if residual.is_empty() {
            debug!(delivered, "Batch fully delivered");
            on_residual(Vec::new());
            return BatchOutcome {
                delivered,
                ..Default::default()
            };
        }

        let mut error_map = HashMap::new();
        for failure in &result.failed {
            let code = failure.code.as_deref().unwrap_or("unknown");
            *error_map.entry(code).or_insert(0) += 1;
        }

        if self.fail_on_error {
            let mut residual_ids: HashSet<&str> =
                residual.iter().map(|entry| entry.id.as_str()).collect();
            let rejected: Vec<EntryFailure> = result
                .failed
                .iter()
                .filter(|failure| residual_ids.remove(failure.id.as_str()))
                .cloned()
                .collect();
            error!(
                rejected = rejected.len(),
                errors = ?error_map,
                "Entries rejected by the service, not retrying since fail_on_error is set"
            );
            return BatchOutcome {
                delivered,
                rejected,
                ..Default::default()
            };
        }

        let retried = residual.len();
        warn!(
            retried,
            delivered,
            errors = ?error_map,
            "Batch partially failed, handing failed entries back"
        );
        on_residual(residual);
        BatchOutcome {
            delivered,
            retried,
            ..Default::default()
        }
    }

    /// Stops accepting submissions, waits for the in-flight ones to complete and releases the
    /// client. Later calls release nothing and return once the first call has released the client.
    pub async fn close(&self) {
        if self.state.closed.swap(true, Ordering::SeqCst) {
            loop {
                let released = self.state.released_notify.notified();
                if self.state.released.load(Ordering::SeqCst) {
                    debug!(destination = %self.destination, "Batch writer already closed");
                    return;
                }
                released.await;
            }
        }

        loop {
            // registered before the check so a wakeup in between is not lost
            let drained = self.state.drained.notified();
            let in_flight = self.in_flight();
            if in_flight == 0 {
                break;
            }
            info!(in_flight, "Waiting for in-flight batches before closing");
            drained.await;
        }

        self.client.close().await;
        self.state.released.store(true, Ordering::SeqCst);
        self.state.released_notify.notify_waiters();
        info!(destination = %self.destination, "Batch writer closed");
    }
}
