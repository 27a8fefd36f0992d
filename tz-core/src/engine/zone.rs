//! Thermal zone device context
//!
//! Owns the sensor registers, the pending set, and handles to the scheduler,
//! clock and notifier. Every entry point the plumbing layer calls lives here.
//!
//! # Locking
//!
//! - Reading lock (inside [`TemperatureState`]): short, never held while the
//!   queue lock is acquired.
//! - Queue lock: serializes all pending-set mutations and scans; at most one
//!   scan runs at a time.
//!
//! Completions and band-crossed signals are delivered after both locks are
//! released.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::notifier::Notifier;
use super::pending::PendingSet;
use super::predicate::satisfied;
use super::scanner::{scan, Retired};
use super::scheduler::{ExpiryScheduler, ThreadScheduler};
use super::sensor::TemperatureState;
use crate::data::{
    Admission, Band, Completion, PendingInfo, RequestId, WatchRequest, WatchSpec, ZoneSnapshot,
    READING_SIZE,
};
use crate::settings::ZoneSettings;
use crate::{Result, ThermalError};

/// One simulated thermal zone
pub struct ThermalZone {
    sensor: TemperatureState,
    queue: Mutex<PendingSet>,
    scheduler: Arc<dyn ExpiryScheduler>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    next_id: AtomicU64,
    max_pending: usize,
    reset_temperature: u32,
}

impl ThermalZone {
    /// Create a zone on the system clock
    pub fn new(
        settings: &ZoneSettings,
        scheduler: Arc<dyn ExpiryScheduler>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::with_clock(settings, scheduler, notifier, Arc::new(SystemClock))
    }

    /// Create a zone evaluating deadlines against `clock`
    pub fn with_clock(
        settings: &ZoneSettings,
        scheduler: Arc<dyn ExpiryScheduler>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sensor: TemperatureState::new(settings.reset_temperature),
            queue: Mutex::new(PendingSet::new()),
            scheduler,
            clock,
            notifier,
            next_id: AtomicU64::new(1),
            max_pending: settings.max_pending,
            reset_temperature: settings.reset_temperature,
        }
    }

    /// Create a zone whose timers run on a dedicated [`ThreadScheduler`] worker
    pub fn with_thread_scheduler(
        settings: &ZoneSettings,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Arc<Self>> {
        let scheduler = Arc::new(ThreadScheduler::new());
        let zone = Arc::new(Self::new(settings, scheduler.clone(), notifier));

        let weak = Arc::downgrade(&zone);
        scheduler.start(move |id| {
            if let Some(zone) = weak.upgrade() {
                zone.on_timer_expired(id);
            }
        })?;

        Ok(zone)
    }

    // ========================================================================
    // Admission
    // ========================================================================

    /// Submit a watch request.
    ///
    /// May block on the reading lock and, when the request has to wait, on
    /// the queue lock.
    pub fn submit(&self, spec: WatchSpec) -> Admission {
        if !spec.is_well_formed() {
            let err = ThermalError::InvalidBand {
                low: spec.low,
                high: spec.high,
            };
            warn!("Rejecting watch request: {}", err);
            return Admission::Rejected(err.kind());
        }

        let now = self.clock.now();
        let deadline = spec.timeout.deadline_from(now);

        // Fast path on a snapshot taken outside the queue lock. A stale
        // snapshot only costs one extra scan after enqueueing.
        let reading = self.sensor.read();
        if satisfied(reading, spec.low, spec.high, deadline, now) {
            if spec.output_len != READING_SIZE {
                let err = ThermalError::OutputShape {
                    len: spec.output_len,
                    expected: READING_SIZE,
                };
                warn!("Rejecting watch request: {}", err);
                return Admission::Rejected(err.kind());
            }
            debug!("Watch [{}, {}] satisfied immediately at {}", spec.low, spec.high, reading);
            return Admission::Immediate(reading);
        }

        let (admission, retired) = {
            let mut queue = self.queue.lock();
            match self.enqueue(&mut queue, spec, deadline) {
                Ok(id) => {
                    let retired = self.scan_locked(&mut queue);
                    (Admission::Queued(id), retired)
                }
                Err(err) => {
                    warn!("Rejecting watch request [{}, {}]: {}", spec.low, spec.high, err);
                    return Admission::Rejected(err.kind());
                }
            }
        };

        self.deliver(retired);
        admission
    }

    /// Insert a new request and arm its timer. Requires the queue lock.
    ///
    /// On failure nothing is left registered.
    fn enqueue(
        &self,
        queue: &mut PendingSet,
        spec: WatchSpec,
        deadline: Option<Instant>,
    ) -> Result<RequestId> {
        if queue.len() >= self.max_pending {
            return Err(ThermalError::QueueFull {
                limit: self.max_pending,
            });
        }

        let id = RequestId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        queue.insert(WatchRequest {
            id,
            low: spec.low,
            high: spec.high,
            deadline,
            output_len: spec.output_len,
        });

        if let (Some(_), Some(delay)) = (deadline, spec.timeout.delay()) {
            if let Err(err) = self.scheduler.arm(id, delay) {
                queue.remove(id);
                return Err(err);
            }
        }

        debug!("Queued {} for band [{}, {}] ({:?})", id, spec.low, spec.high, spec.timeout);
        Ok(id)
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// A new reading from the simulated hardware.
    ///
    /// Blocks on the reading lock and, when the band was crossed, on the
    /// queue lock. The crossing is signalled after both are released.
    pub fn on_temperature_changed(&self, value: u32) {
        if !self.sensor.write(value) {
            return;
        }

        let retired = {
            let mut queue = self.queue.lock();
            self.scan_locked(&mut queue)
        };

        self.deliver(retired);
        self.notifier.band_crossed(value);
    }

    /// An expiry timer fired. Blocks on the queue lock.
    ///
    /// The request may already be gone; that race is expected and harmless.
    /// A timer that fires ahead of the deadline is armed again for the rest.
    pub fn on_timer_expired(&self, id: RequestId) {
        let retired = {
            let mut queue = self.queue.lock();
            if !queue.contains(id) {
                debug!("Timer for {} fired after it was retired", id);
            }
            let retired = self.scan_locked(&mut queue);
            self.rearm_early(&queue, id);
            retired
        };

        self.deliver(retired);
    }

    fn rearm_early(&self, queue: &PendingSet, id: RequestId) {
        let Some(deadline) = queue.get(id).and_then(|request| request.deadline) else {
            return;
        };
        let remaining = deadline.saturating_duration_since(self.clock.now());
        debug!("Timer for {} fired {:?} early, re-arming", id, remaining);
        if let Err(e) = self.scheduler.arm(id, remaining) {
            warn!("Could not re-arm timer for {}: {}", id, e);
        }
    }

    // ========================================================================
    // Sensor control
    // ========================================================================

    /// The camera powered off: the simulated reading drops back to the reset
    /// temperature, through the normal update path.
    pub fn camera_off(&self) {
        info!("Camera off: resetting reading to {}", self.reset_temperature);
        self.on_temperature_changed(self.reset_temperature);
    }

    /// The camera powered on. Acknowledged only.
    pub fn camera_on(&self) {
        info!("Camera on");
    }

    /// Current reading. Blocks only on the reading lock.
    pub fn read_temperature(&self) -> u32 {
        self.sensor.read()
    }

    /// Band last published by a scan
    pub fn published_band(&self) -> Band {
        self.sensor.band()
    }

    // ========================================================================
    // Cancellation
    // ========================================================================

    /// Retire a pending request with [`Completion::Cancelled`].
    ///
    /// Returns [`ThermalError::RequestNotFound`] if it was already retired.
    pub fn cancel(&self, id: RequestId) -> Result<()> {
        let retired = {
            let mut queue = self.queue.lock();
            let Some(request) = queue.remove(id) else {
                debug!("Cancel for {} ignored, not pending", id);
                return Err(ThermalError::RequestNotFound(id.get()));
            };
            if request.deadline.is_some() {
                self.scheduler.cancel(id);
            }

            let mut retired = vec![Retired {
                request,
                completion: Completion::Cancelled,
            }];
            retired.extend(self.scan_locked(&mut queue));
            retired
        };

        info!("Cancelled {}", id);
        self.deliver(retired);
        Ok(())
    }

    /// Cancel everything that is pending and publish the full band
    pub fn shutdown(&self) {
        let retired: Vec<Retired> = {
            let mut queue = self.queue.lock();
            let drained = queue.drain();
            for request in &drained {
                if request.deadline.is_some() {
                    self.scheduler.cancel(request.id);
                }
            }
            if self.sensor.publish(Band::FULL).changed {
                self.notifier.band_published(Band::FULL.low, Band::FULL.high);
            }
            drained
                .into_iter()
                .map(|request| Retired {
                    request,
                    completion: Completion::Cancelled,
                })
                .collect()
        };

        info!("Zone shutdown: cancelled {} pending requests", retired.len());
        self.deliver(retired);
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn pending_count(&self) -> usize {
        self.queue.lock().len()
    }

    /// Reading, band and pending requests as of now
    pub fn snapshot(&self) -> ZoneSnapshot {
        let queue = self.queue.lock();
        let now = self.clock.now();
        let pending = queue
            .iter()
            .map(|request| PendingInfo {
                id: request.id,
                low: request.low,
                high: request.high,
                remaining_ms: request
                    .deadline
                    .map(|d| {
                        u64::try_from(d.saturating_duration_since(now).as_millis()).unwrap_or(u64::MAX)
                    }),
            })
            .collect();

        ZoneSnapshot {
            reading: self.sensor.read(),
            band: self.sensor.band(),
            pending,
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Run a scan with the queue lock held and publish the band if it moved
    ///
    /// A write that lands mid-scan is checked against the old band and may not
    /// trigger its own scan, so keep scanning until the published band holds
    /// the current reading.
    fn scan_locked(&self, queue: &mut PendingSet) -> Vec<Retired> {
        let mut retired = Vec::new();
        loop {
            let outcome = scan(queue, &self.sensor, self.clock.as_ref(), self.scheduler.as_ref());
            if outcome.band_changed {
                self.notifier.band_published(outcome.band.low, outcome.band.high);
            }
            retired.extend(outcome.retired);
            if !outcome.rescan {
                return retired;
            }
            debug!(
                "Reading left [{}, {}] during scan, scanning again",
                outcome.band.low, outcome.band.high
            );
        }
    }

    /// Hand retired requests to the notifier. Must run without zone locks.
    fn deliver(&self, retired: Vec<Retired>) {
        for Retired { request, completion } in retired {
            if let Completion::Failed(kind) = completion {
                warn!("Request {} failed: {}", request.id, kind);
            } else {
                debug!("Request {} completed: {:?}", request.id, completion);
            }
            self.notifier.complete(request.id, completion);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Timeout;
    use crate::engine::clock::ManualClock;
    use crate::ErrorKind;
    use crate::engine::notifier::MockNotifier;
    use crate::engine::scheduler::MockExpiryScheduler;
    use mockall::predicate::eq;
    use mockall::Sequence;
    use std::time::Duration;

    fn settings(reading: u32) -> ZoneSettings {
        ZoneSettings {
            reset_temperature: reading,
            ..ZoneSettings::default()
        }
    }

    fn quiet_notifier() -> MockNotifier {
        let mut notifier = MockNotifier::new();
        notifier.expect_band_published().return_const(());
        notifier.expect_band_crossed().return_const(());
        notifier
    }

    fn accepting_scheduler() -> MockExpiryScheduler {
        let mut scheduler = MockExpiryScheduler::new();
        scheduler.expect_arm().returning(|_, _| Ok(()));
        scheduler.expect_cancel().return_const(());
        scheduler
    }

    fn zone(reading: u32, notifier: MockNotifier, scheduler: MockExpiryScheduler) -> (ThermalZone, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let zone = ThermalZone::with_clock(
            &settings(reading),
            Arc::new(scheduler),
            Arc::new(notifier),
            clock.clone(),
        );
        (zone, clock)
    }

    #[test]
    fn test_reading_inside_band_is_queued() {
        let mut notifier = quiet_notifier();
        notifier.expect_complete().never();
        let (zone, _) = zone(50, notifier, accepting_scheduler());

        let admission = zone.submit(WatchSpec::new(40, 60, Timeout::Infinite));
        assert!(matches!(admission, Admission::Queued(_)));
        assert_eq!(zone.pending_count(), 1);
        assert_eq!(zone.published_band(), Band::new(40, 60));
    }

    #[test]
    fn test_reading_outside_band_is_immediate() {
        let mut scheduler = MockExpiryScheduler::new();
        scheduler.expect_arm().never();
        let mut notifier = MockNotifier::new();
        notifier.expect_band_published().never();
        notifier.expect_complete().never();
        let (zone, _) = zone(70, notifier, scheduler);

        assert_eq!(zone.submit(WatchSpec::new(40, 60, Timeout::Infinite)), Admission::Immediate(70));
        assert_eq!(zone.pending_count(), 0);
    }

    #[test]
    fn test_inverted_band_rejected() {
        let (zone, _) = zone(50, MockNotifier::new(), MockExpiryScheduler::new());
        assert_eq!(
            zone.submit(WatchSpec::new(60, 40, Timeout::Infinite)),
            Admission::Rejected(ErrorKind::InvalidRequest)
        );
        assert_eq!(zone.pending_count(), 0);
    }

    #[test]
    fn test_fast_path_with_bad_output_rejected() {
        let (zone, _) = zone(70, MockNotifier::new(), MockExpiryScheduler::new());
        let spec = WatchSpec::new(40, 60, Timeout::Infinite).with_output_len(2);
        assert_eq!(zone.submit(spec), Admission::Rejected(ErrorKind::InvalidRequest));
    }

    #[test]
    fn test_zero_timeout_resolves_with_current_reading() {
        let mut scheduler = MockExpiryScheduler::new();
        scheduler.expect_arm().never();
        let (zone, _) = zone(50, MockNotifier::new(), scheduler);

        let admission = zone.submit(WatchSpec::new(40, 60, Timeout::After(Duration::ZERO)));
        assert_eq!(admission, Admission::Immediate(50));
        assert_eq!(zone.pending_count(), 0);
    }

    #[test]
    fn test_finite_timeout_arms_timer() {
        let mut scheduler = MockExpiryScheduler::new();
        scheduler
            .expect_arm()
            .with(eq(RequestId::new(1)), eq(Duration::from_millis(500)))
            .times(1)
            .returning(|_, _| Ok(()));
        let (zone, _) = zone(50, quiet_notifier(), scheduler);

        let admission = zone.submit(WatchSpec::new(40, 60, Timeout::from_millis(500)));
        assert_eq!(admission, Admission::Queued(RequestId::new(1)));
    }

    #[test]
    fn test_timer_failure_leaves_nothing_registered() {
        let mut scheduler = MockExpiryScheduler::new();
        scheduler
            .expect_arm()
            .returning(|_, _| Err(ThermalError::TimerUnavailable("no timers".into())));
        let mut notifier = MockNotifier::new();
        notifier.expect_band_published().never();
        notifier.expect_complete().never();
        let (zone, _) = zone(50, notifier, scheduler);

        assert_eq!(
            zone.submit(WatchSpec::new(40, 60, Timeout::from_millis(100))),
            Admission::Rejected(ErrorKind::ResourceExhausted)
        );
        assert_eq!(zone.pending_count(), 0);
        assert_eq!(zone.published_band(), Band::FULL);
    }

    #[test]
    fn test_queue_limit() {
        let clock = Arc::new(ManualClock::new());
        let settings = ZoneSettings {
            reset_temperature: 50,
            max_pending: 2,
            ..ZoneSettings::default()
        };
        let zone = ThermalZone::with_clock(
            &settings,
            Arc::new(accepting_scheduler()),
            Arc::new(quiet_notifier()),
            clock,
        );

        assert!(matches!(zone.submit(WatchSpec::new(10, 90, Timeout::Infinite)), Admission::Queued(_)));
        assert!(matches!(zone.submit(WatchSpec::new(20, 80, Timeout::Infinite)), Admission::Queued(_)));
        assert_eq!(
            zone.submit(WatchSpec::new(30, 70, Timeout::Infinite)),
            Admission::Rejected(ErrorKind::ResourceExhausted)
        );
        assert_eq!(zone.pending_count(), 2);
    }

    #[test]
    fn test_temperature_change_retires_and_signals_after_delivery() {
        let mut seq = Sequence::new();
        let mut notifier = MockNotifier::new();
        notifier
            .expect_band_published()
            .with(eq(40), eq(60))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        notifier
            .expect_band_published()
            .with(eq(0), eq(u32::MAX))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        notifier
            .expect_complete()
            .with(eq(RequestId::new(1)), eq(Completion::Reading(65)))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        notifier
            .expect_band_crossed()
            .with(eq(65))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        let (zone, _) = zone(50, notifier, accepting_scheduler());

        zone.submit(WatchSpec::new(40, 60, Timeout::Infinite));
        zone.on_temperature_changed(65);
        assert_eq!(zone.pending_count(), 0);
        assert_eq!(zone.read_temperature(), 65);
    }

    #[test]
    fn test_change_inside_band_does_not_scan() {
        let mut notifier = MockNotifier::new();
        notifier.expect_band_published().times(1).return_const(());
        notifier.expect_band_crossed().never();
        notifier.expect_complete().never();
        let (zone, _) = zone(50, notifier, accepting_scheduler());

        zone.submit(WatchSpec::new(40, 60, Timeout::Infinite));
        zone.on_temperature_changed(55);
        assert_eq!(zone.pending_count(), 1);
        assert_eq!(zone.read_temperature(), 55);
    }

    #[test]
    fn test_expiry_loosens_band() {
        let mut notifier = quiet_notifier();
        notifier
            .expect_complete()
            .with(eq(RequestId::new(2)), eq(Completion::Reading(50)))
            .times(1)
            .return_const(());
        let (zone, clock) = zone(50, notifier, accepting_scheduler());

        zone.submit(WatchSpec::new(10, 90, Timeout::Infinite));
        zone.submit(WatchSpec::new(30, 70, Timeout::from_millis(200)));
        assert_eq!(zone.published_band(), Band::new(30, 70));

        clock.advance(Duration::from_millis(200));
        zone.on_timer_expired(RequestId::new(2));
        assert_eq!(zone.published_band(), Band::new(10, 90));
        assert_eq!(zone.pending_count(), 1);
    }

    #[test]
    fn test_early_timer_rearms() {
        let mut scheduler = MockExpiryScheduler::new();
        scheduler
            .expect_arm()
            .with(eq(RequestId::new(1)), eq(Duration::from_millis(500)))
            .times(1)
            .returning(|_, _| Ok(()));
        scheduler
            .expect_arm()
            .with(eq(RequestId::new(1)), eq(Duration::from_millis(200)))
            .times(1)
            .returning(|_, _| Ok(()));
        let mut notifier = quiet_notifier();
        notifier.expect_complete().never();
        let (zone, clock) = zone(50, notifier, scheduler);

        zone.submit(WatchSpec::new(40, 60, Timeout::from_millis(500)));
        clock.advance(Duration::from_millis(300));
        zone.on_timer_expired(RequestId::new(1));
        assert_eq!(zone.pending_count(), 1);
    }

    #[test]
    fn test_stale_timer_is_noop() {
        let mut notifier = quiet_notifier();
        notifier.expect_complete().never();
        let (zone, _) = zone(50, notifier, accepting_scheduler());

        zone.submit(WatchSpec::new(10, 90, Timeout::Infinite));
        zone.on_timer_expired(RequestId::new(42));
        assert_eq!(zone.pending_count(), 1);
    }

    #[test]
    fn test_cancel_delivers_once() {
        let mut notifier = quiet_notifier();
        notifier
            .expect_complete()
            .with(eq(RequestId::new(1)), eq(Completion::Cancelled))
            .times(1)
            .return_const(());
        let mut scheduler = MockExpiryScheduler::new();
        scheduler.expect_arm().returning(|_, _| Ok(()));
        scheduler
            .expect_cancel()
            .with(eq(RequestId::new(1)))
            .times(1)
            .return_const(());
        let (zone, clock) = zone(50, notifier, scheduler);

        zone.submit(WatchSpec::new(40, 60, Timeout::from_millis(100)));
        zone.cancel(RequestId::new(1)).unwrap();
        assert_eq!(zone.published_band(), Band::FULL);

        // The timer fires anyway after the cancel; nothing more is delivered.
        clock.advance(Duration::from_millis(100));
        zone.on_timer_expired(RequestId::new(1));
        assert!(matches!(
            zone.cancel(RequestId::new(1)),
            Err(ThermalError::RequestNotFound(1))
        ));
    }

    #[test]
    fn test_camera_off_resets_reading() {
        let mut notifier = quiet_notifier();
        notifier
            .expect_complete()
            .with(eq(RequestId::new(1)), eq(Completion::Reading(2940)))
            .times(1)
            .return_const(());
        let (zone, _) = zone(2940, notifier, accepting_scheduler());

        zone.on_temperature_changed(3100);
        zone.submit(WatchSpec::new(3000, 3200, Timeout::Infinite));
        zone.camera_off();
        assert_eq!(zone.read_temperature(), 2940);
        assert_eq!(zone.pending_count(), 0);
    }

    #[test]
    fn test_shutdown_cancels_everything() {
        let mut notifier = quiet_notifier();
        notifier
            .expect_complete()
            .withf(|_, completion| *completion == Completion::Cancelled)
            .times(2)
            .return_const(());
        let (zone, _) = zone(50, notifier, accepting_scheduler());

        zone.submit(WatchSpec::new(10, 90, Timeout::Infinite));
        zone.submit(WatchSpec::new(30, 70, Timeout::from_millis(1000)));
        zone.shutdown();
        assert_eq!(zone.pending_count(), 0);
        assert_eq!(zone.published_band(), Band::FULL);
    }

    #[test]
    fn test_snapshot() {
        let (zone, clock) = zone(50, quiet_notifier(), accepting_scheduler());
        zone.submit(WatchSpec::new(10, 90, Timeout::Infinite));
        zone.submit(WatchSpec::new(30, 70, Timeout::from_millis(1000)));
        clock.advance(Duration::from_millis(400));

        let snapshot = zone.snapshot();
        assert_eq!(snapshot.reading, 50);
        assert_eq!(snapshot.band, Band::new(30, 70));
        assert_eq!(snapshot.pending.len(), 2);
        assert_eq!(snapshot.pending[0].remaining_ms, None);
        assert_eq!(snapshot.pending[1].remaining_ms, Some(600));
    }

    #[test]
    fn test_snapshot_saturates_remaining_ms() {
        let (zone, _) = zone(50, quiet_notifier(), accepting_scheduler());
        let far = Duration::from_secs(u64::MAX / 500);
        assert!(matches!(
            zone.submit(WatchSpec::new(10, 90, Timeout::After(far))),
            Admission::Queued(_)
        ));

        let snapshot = zone.snapshot();
        assert_eq!(snapshot.pending[0].remaining_ms, Some(u64::MAX));
    }

    /// Clock that runs a hook on its `n`th reading
    struct HookClock {
        inner: ManualClock,
        calls: AtomicU64,
        trigger_at: u64,
        hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    }

    impl Clock for HookClock {
        fn now(&self) -> Instant {
            if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.trigger_at {
                if let Some(hook) = self.hook.lock().take() {
                    hook();
                }
            }
            self.inner.now()
        }
    }

    #[test]
    fn test_update_during_scan_is_not_lost() {
        let clock = Arc::new(HookClock {
            inner: ManualClock::new(),
            calls: AtomicU64::new(0),
            trigger_at: 2,
            hook: Mutex::new(None),
        });
        let mut notifier = quiet_notifier();
        notifier
            .expect_complete()
            .with(eq(RequestId::new(1)), eq(Completion::Reading(70)))
            .times(1)
            .return_const(());
        let zone = Arc::new(ThermalZone::with_clock(
            &settings(50),
            Arc::new(accepting_scheduler()),
            Arc::new(notifier),
            clock.clone(),
        ));

        // First reading is admission's own; the second is taken inside the
        // post-enqueue scan, after it sampled 50 but before it published.
        let racer = zone.clone();
        *clock.hook.lock() = Some(Box::new(move || racer.on_temperature_changed(70)));

        let admission = zone.submit(WatchSpec::new(40, 60, Timeout::Infinite));
        assert_eq!(admission, Admission::Queued(RequestId::new(1)));
        assert_eq!(zone.read_temperature(), 70);
        assert_eq!(zone.pending_count(), 0);
        assert_eq!(zone.published_band(), Band::FULL);
    }
}
