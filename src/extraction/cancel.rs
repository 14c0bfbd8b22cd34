//! User cancellation for in-flight extractions.
//!
//! Each request registers a oneshot sender; `cancel_all` fires every one of
//! them and the request future loses the race in `run_cancellable`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::oneshot;

use super::ExtractionError;

#[derive(Default)]
pub struct CancelRegistry {
    inflight: Mutex<HashMap<u64, oneshot::Sender<()>>>,
    next_id: AtomicU64,
}

/// Handle held by one in-flight request.
pub struct CancelTicket {
    id: u64,
    receiver: oneshot::Receiver<()>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self) -> CancelTicket {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        if let Ok(mut inflight) = self.inflight.lock() {
            inflight.insert(id, sender);
        }
        CancelTicket { id, receiver }
    }

    /// Signal every in-flight request. Returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let senders: Vec<oneshot::Sender<()>> = match self.inflight.lock() {
            Ok(mut inflight) => inflight.drain().map(|(_, sender)| sender).collect(),
            Err(_) => return 0,
        };
        let count = senders.len();
        for sender in senders {
            let _ = sender.send(());
        }
        if count > 0 {
            tracing::info!(count, "Extraction cancelled by user");
        }
        count
    }

    pub fn in_flight(&self) -> usize {
        self.inflight.lock().map(|inflight| inflight.len()).unwrap_or(0)
    }

    fn finish(&self, id: u64) {
        if let Ok(mut inflight) = self.inflight.lock() {
            inflight.remove(&id);
        }
    }
}

/// Unregisters its ticket when dropped, including when the caller's future
/// is dropped mid-flight.
struct InFlight<'a> {
    registry: &'a CancelRegistry,
    id: u64,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.registry.finish(self.id);
    }
}

/// Run `request` until it completes or the registry cancels it.
pub async fn run_cancellable<F, T>(registry: &CancelRegistry, request: F) -> Result<T, ExtractionError>
where
    F: Future<Output = Result<T, ExtractionError>>,
{
    let CancelTicket { id, receiver } = registry.register();
    let _in_flight = InFlight { registry, id };
    tokio::select! {
        result = request => result,
        Ok(()) = receiver => Err(ExtractionError::Cancelled),
    }
}
