//! Tokio expiry scheduler
//!
//! Each armed timer is a sleeping task. Fired ids are funnelled through one
//! channel so a single worker drives every `on_timer_expired` call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, trace};

use tz_core::{ExpiryScheduler, RequestId, ThermalZone};
use tz_error::{Result, ThermalError};

pub struct TokioScheduler {
    runtime: Handle,
    timers: Arc<Mutex<HashMap<RequestId, AbortHandle>>>,
    fired: mpsc::UnboundedSender<RequestId>,
}

impl TokioScheduler {
    /// Create a scheduler spawning onto `runtime`, plus the receiving end of
    /// its fired-timer channel for [`run_expiry_worker`].
    pub fn new(runtime: Handle) -> (Self, mpsc::UnboundedReceiver<RequestId>) {
        let (fired, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            runtime,
            timers: Arc::new(Mutex::new(HashMap::new())),
            fired,
        };
        (scheduler, rx)
    }

    /// Timers armed and neither fired nor cancelled
    pub fn armed_count(&self) -> usize {
        self.timers.lock().len()
    }
}

impl ExpiryScheduler for TokioScheduler {
    fn arm(&self, id: RequestId, delay: Duration) -> Result<()> {
        if self.fired.is_closed() {
            return Err(ThermalError::TimerUnavailable(
                "expiry worker is not running".into(),
            ));
        }

        let timers = self.timers.clone();
        let fired = self.fired.clone();

        // Hold the map lock across spawn so the task cannot remove its entry
        // before it is inserted.
        let mut armed = self.timers.lock();
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            timers.lock().remove(&id);
            trace!("Expiry timer fired for {}", id);
            let _ = fired.send(id);
        });
        armed.insert(id, task.abort_handle());
        trace!("Armed expiry timer for {} in {:?}", id, delay);
        Ok(())
    }

    fn cancel(&self, id: RequestId) {
        if let Some(task) = self.timers.lock().remove(&id) {
            task.abort();
            trace!("Cancelled expiry timer for {}", id);
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, task) in self.timers.lock().drain() {
            task.abort();
        }
    }
}

/// Feed fired timers into the zone until the scheduler is dropped
pub async fn run_expiry_worker(zone: Arc<ThermalZone>, mut fired: mpsc::UnboundedReceiver<RequestId>) {
    while let Some(id) = fired.recv().await {
        zone.on_timer_expired(id);
    }
    debug!("Expiry worker exited");
}
