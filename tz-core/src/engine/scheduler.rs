//! Expiry scheduler
//!
//! One one-shot timer per finite-deadline request. A fired timer calls back
//! into the zone on the scheduler's own worker. Cancellation is advisory: a
//! timer may still fire after `cancel`, and the zone treats that as a no-op.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, info, trace};

use crate::data::RequestId;
use crate::{Result, ThermalError};

/// Callback invoked with the id of each expired timer
pub type ExpiryHandler = Arc<dyn Fn(RequestId) + Send + Sync>;

/// Scheduled-task abstraction behind request deadlines.
///
/// Both methods are called with the queue lock held and must not block on
/// anything that could wait for that lock.
#[cfg_attr(test, mockall::automock)]
pub trait ExpiryScheduler: Send + Sync {
    /// Start a one-shot timer that reports `id` after `delay`
    fn arm(&self, id: RequestId, delay: Duration) -> Result<()>;

    /// Best-effort cancellation of a previously armed timer
    fn cancel(&self, id: RequestId);
}

/// Cancelled entries tolerated in the heap beyond twice the armed count
const STALE_SLACK: usize = 64;

struct TimerQueue {
    heap: BinaryHeap<Reverse<(Instant, RequestId)>>,
    /// Live deadline per armed id; heap entries that disagree are stale
    armed: HashMap<RequestId, Instant>,
    running: bool,
    stopped: bool,
}

struct Shared {
    queue: Mutex<TimerQueue>,
    wake: Condvar,
}

/// Scheduler backed by a single worker thread and a deadline heap
pub struct ThreadScheduler {
    shared: Arc<Shared>,
}

impl ThreadScheduler {
    /// Create an idle scheduler. Timers cannot be armed until [`start`](Self::start).
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(TimerQueue {
                    heap: BinaryHeap::new(),
                    armed: HashMap::new(),
                    running: false,
                    stopped: false,
                }),
                wake: Condvar::new(),
            }),
        }
    }

    /// Spawn the worker thread that invokes `handler` for every expiry
    pub fn start<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(RequestId) + Send + Sync + 'static,
    {
        {
            let mut queue = self.shared.queue.lock();
            if queue.running || queue.stopped {
                return Err(ThermalError::TimerUnavailable(
                    "expiry worker already started".into(),
                ));
            }
            queue.running = true;
        }

        let shared = self.shared.clone();
        let handler: ExpiryHandler = Arc::new(handler);
        let spawned = std::thread::Builder::new()
            .name("tz-expiry".into())
            .spawn(move || run_worker(shared, handler));

        if let Err(e) = spawned {
            self.shared.queue.lock().running = false;
            return Err(ThermalError::TimerUnavailable(format!(
                "failed to spawn expiry worker: {}",
                e
            )));
        }

        info!("Expiry worker started");
        Ok(())
    }

    /// Stop the worker. Armed timers are dropped without firing.
    pub fn stop(&self) {
        let mut queue = self.shared.queue.lock();
        if queue.stopped {
            return;
        }
        queue.stopped = true;
        queue.heap.clear();
        queue.armed.clear();
        self.shared.wake.notify_all();
        debug!("Expiry worker stopping");
    }

    /// Number of timers armed and not yet fired or cancelled
    pub fn armed_count(&self) -> usize {
        self.shared.queue.lock().armed.len()
    }
}

impl Default for ThreadScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl ExpiryScheduler for ThreadScheduler {
    fn arm(&self, id: RequestId, delay: Duration) -> Result<()> {
        let mut queue = self.shared.queue.lock();
        if !queue.running || queue.stopped {
            return Err(ThermalError::TimerUnavailable(
                "expiry worker is not running".into(),
            ));
        }

        let deadline = Instant::now()
            .checked_add(delay)
            .ok_or_else(|| ThermalError::TimerUnavailable(format!("delay {:?} out of range", delay)))?;

        queue.armed.insert(id, deadline);
        queue.heap.push(Reverse((deadline, id)));
        trace!("Armed expiry timer for {} in {:?}", id, delay);
        self.shared.wake.notify_one();
        Ok(())
    }

    fn cancel(&self, id: RequestId) {
        let mut queue = self.shared.queue.lock();
        if queue.armed.remove(&id).is_some() {
            trace!("Cancelled expiry timer for {}", id);
        }
        queue.compact();
    }
}

impl TimerQueue {
    /// Drop cancelled entries once they outnumber the live ones
    fn compact(&mut self) {
        if self.armed.is_empty() {
            self.heap.clear();
            return;
        }
        if self.heap.len() <= self.armed.len() * 2 + STALE_SLACK {
            return;
        }
        let before = self.heap.len();
        let armed = &self.armed;
        self.heap
            .retain(|Reverse((deadline, id))| armed.get(id) == Some(deadline));
        trace!("Compacted timer heap from {} to {} entries", before, self.heap.len());
    }
}

fn run_worker(shared: Arc<Shared>, handler: ExpiryHandler) {
    let mut queue = shared.queue.lock();

    loop {
        if queue.stopped {
            break;
        }

        let due = take_due(&mut queue, Instant::now());
        if !due.is_empty() {
            MutexGuard::unlocked(&mut queue, || {
                for id in due {
                    trace!("Expiry timer fired for {}", id);
                    handler(id);
                }
            });
            continue;
        }

        match queue.heap.peek() {
            Some(Reverse((deadline, _))) => {
                let deadline = *deadline;
                shared.wake.wait_until(&mut queue, deadline);
            }
            None => shared.wake.wait(&mut queue),
        }
    }

    debug!("Expiry worker exited");
}

fn take_due(queue: &mut TimerQueue, now: Instant) -> Vec<RequestId> {
    let mut due = Vec::new();
    while let Some(Reverse((deadline, id))) = queue.heap.peek().copied() {
        if deadline > now {
            break;
        }
        queue.heap.pop();
        if queue.armed.get(&id) == Some(&deadline) {
            queue.armed.remove(&id);
            due.push(id);
        }
    }
    due
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn started() -> (ThreadScheduler, mpsc::Receiver<RequestId>) {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let scheduler = ThreadScheduler::new();
        scheduler
            .start(move |id| {
                let _ = tx.lock().send(id);
            })
            .expect("worker should start");
        (scheduler, rx)
    }

    #[test]
    fn test_arm_before_start_fails() {
        let scheduler = ThreadScheduler::new();
        let err = scheduler.arm(RequestId::new(1), Duration::from_millis(5)).unwrap_err();
        assert!(matches!(err, ThermalError::TimerUnavailable(_)));
    }

    #[test]
    fn test_double_start_fails() {
        let (scheduler, _rx) = started();
        assert!(scheduler.start(|_| {}).is_err());
    }

    #[test]
    fn test_timer_fires() {
        let (scheduler, rx) = started();
        scheduler.arm(RequestId::new(7), Duration::from_millis(10)).unwrap();
        let fired = rx.recv_timeout(Duration::from_secs(2)).expect("timer should fire");
        assert_eq!(fired, RequestId::new(7));
        assert_eq!(scheduler.armed_count(), 0);
    }

    #[test]
    fn test_fires_in_deadline_order() {
        let (scheduler, rx) = started();
        scheduler.arm(RequestId::new(1), Duration::from_millis(60)).unwrap();
        scheduler.arm(RequestId::new(2), Duration::from_millis(10)).unwrap();
        scheduler.arm(RequestId::new(3), Duration::from_millis(35)).unwrap();

        let order: Vec<_> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).expect("timer should fire"))
            .collect();
        assert_eq!(order, vec![RequestId::new(2), RequestId::new(3), RequestId::new(1)]);
    }

    #[test]
    fn test_cancelled_timer_does_not_fire() {
        let (scheduler, rx) = started();
        scheduler.arm(RequestId::new(1), Duration::from_millis(20)).unwrap();
        scheduler.cancel(RequestId::new(1));
        assert_eq!(scheduler.armed_count(), 0);
        assert!(rx.recv_timeout(Duration::from_millis(120)).is_err());
    }

    #[test]
    fn test_cancelled_entries_do_not_accumulate() {
        let (scheduler, _rx) = started();
        scheduler.arm(RequestId::new(1), Duration::from_secs(3600)).unwrap();
        for id in 2..10_002 {
            scheduler.arm(RequestId::new(id), Duration::from_secs(1800)).unwrap();
            scheduler.cancel(RequestId::new(id));
        }

        assert_eq!(scheduler.armed_count(), 1);
        let heap_len = scheduler.shared.queue.lock().heap.len();
        assert!(heap_len <= 2 + STALE_SLACK + 1, "heap holds {} entries", heap_len);
    }

    #[test]
    fn test_rearm_after_cancel_fires_once() {
        let (scheduler, rx) = started();
        scheduler.arm(RequestId::new(4), Duration::from_millis(10)).unwrap();
        scheduler.cancel(RequestId::new(4));
        scheduler.arm(RequestId::new(5), Duration::from_secs(3600)).unwrap();
        scheduler.arm(RequestId::new(4), Duration::from_millis(80)).unwrap();

        let fired = rx.recv_timeout(Duration::from_secs(2)).expect("timer should fire");
        assert_eq!(fired, RequestId::new(4));
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_cancel_unknown_is_noop() {
        let (scheduler, _rx) = started();
        scheduler.cancel(RequestId::new(99));
        assert_eq!(scheduler.armed_count(), 0);
    }

    #[test]
    fn test_stop_rejects_new_timers() {
        let (scheduler, rx) = started();
        scheduler.arm(RequestId::new(1), Duration::from_millis(30)).unwrap();
        scheduler.stop();
        assert!(scheduler.arm(RequestId::new(2), Duration::from_millis(1)).is_err());
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }
}
