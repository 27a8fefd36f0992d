//! Completion mailbox
//!
//! Bridges zone deliveries, which happen on whatever thread retired the
//! request, to the connection task waiting on it. A completion can arrive
//! before the connection registers interest (the scan that follows enqueueing
//! may retire the request at once), so each slot remembers whichever side
//! showed up first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace};

use tz_core::{Completion, Notifier, RequestId};

enum Slot {
    Waiting(oneshot::Sender<Completion>),
    Done(Completion),
}

/// Zone notifier owned by the daemon
pub struct CompletionMailbox {
    slots: Mutex<HashMap<RequestId, Slot>>,
    crossings: AtomicU64,
    interrupts: mpsc::UnboundedSender<u32>,
}

impl CompletionMailbox {
    /// Create a mailbox forwarding band-crossed signals to `interrupts`
    pub fn new(interrupts: mpsc::UnboundedSender<u32>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            crossings: AtomicU64::new(0),
            interrupts,
        }
    }

    /// Receiver for the terminal outcome of `id`.
    ///
    /// Must be called at most once per queued request.
    pub fn register(&self, id: RequestId) -> oneshot::Receiver<Completion> {
        let (tx, rx) = oneshot::channel();
        let mut slots = self.slots.lock();
        match slots.remove(&id) {
            Some(Slot::Done(completion)) => {
                trace!("Completion for {} arrived before registration", id);
                let _ = tx.send(completion);
            }
            Some(Slot::Waiting(_)) => {
                debug!("Duplicate registration for {}, replacing", id);
                slots.insert(id, Slot::Waiting(tx));
            }
            None => {
                slots.insert(id, Slot::Waiting(tx));
            }
        }
        rx
    }

    /// Band-crossed signals raised so far
    pub fn crossings(&self) -> u64 {
        self.crossings.load(Ordering::Relaxed)
    }

    /// Slots not yet consumed by both sides
    pub fn outstanding(&self) -> usize {
        self.slots.lock().len()
    }
}

impl Notifier for CompletionMailbox {
    fn complete(&self, id: RequestId, completion: Completion) {
        let mut slots = self.slots.lock();
        match slots.remove(&id) {
            Some(Slot::Waiting(tx)) => {
                if tx.send(completion).is_err() {
                    debug!("Waiter for {} went away before completion", id);
                }
            }
            Some(Slot::Done(previous)) => {
                // Exactly-once delivery is the zone's invariant; keep the first.
                debug!("Second completion for {} ignored ({:?})", id, completion);
                slots.insert(id, Slot::Done(previous));
            }
            None => {
                slots.insert(id, Slot::Done(completion));
            }
        }
    }

    fn band_published(&self, low: u32, high: u32) {
        trace!("Band published: [{}, {}]", low, high);
    }

    fn band_crossed(&self, reading: u32) {
        self.crossings.fetch_add(1, Ordering::Relaxed);
        let _ = self.interrupts.send(reading);
    }
}

/// Drain band-crossed signals until every sender is gone
pub async fn run_interrupt_worker(mut interrupts: mpsc::UnboundedReceiver<u32>) {
    while let Some(reading) = interrupts.recv().await {
        info!("INTERRUPT: reading {} left the monitored band", reading);
    }
    debug!("Interrupt worker exited");
}
