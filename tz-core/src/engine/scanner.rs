//! Pending set scanner
//!
//! Walks the pending set, retires every request that is satisfied or expired,
//! and recomputes the tightest band the surviving requests still need
//! monitored.

use tracing::{debug, trace};

use super::clock::Clock;
use super::pending::PendingSet;
use super::predicate::satisfied;
use super::scheduler::ExpiryScheduler;
use super::sensor::TemperatureState;
use crate::data::{Band, Completion, WatchRequest};
use crate::ErrorKind;

/// A request removed by a scan, with the outcome it must be handed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retired {
    pub request: WatchRequest,
    pub completion: Completion,
}

/// What a scan pass did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    pub band: Band,
    pub band_changed: bool,
    /// The reading moved outside `band` while the pass ran and requests are
    /// still pending, so another pass is needed
    pub rescan: bool,
    pub retired: Vec<Retired>,
}

/// Run one scan pass.
///
/// Requires the queue lock; the `&mut PendingSet` borrow is that lock's
/// guard. Takes the reading lock briefly to sample the temperature and to
/// publish the new band. Never blocks otherwise.
///
/// Retired requests are returned rather than delivered so the caller can
/// hand them out after dropping the queue lock.
pub fn scan(
    set: &mut PendingSet,
    sensor: &TemperatureState,
    clock: &dyn Clock,
    scheduler: &dyn ExpiryScheduler,
) -> ScanOutcome {
    let reading = sensor.read();
    let mut band = Band::FULL;
    let mut retired = Vec::new();

    // Walk a snapshot of ids so removals never disturb the iteration.
    for id in set.ids() {
        let Some(request) = set.get(id) else {
            debug!("Request {} vanished before it was scanned", id);
            continue;
        };

        if !satisfied(reading, request.low, request.high, request.deadline, clock.now()) {
            band.tighten(request.low, request.high);
            continue;
        }

        let Some(request) = set.remove(id) else {
            continue;
        };

        if request.deadline.is_some() {
            scheduler.cancel(id);
        }

        let completion = if request.fits_reading() {
            Completion::Reading(reading)
        } else {
            debug!(
                "Request {} output holds {} bytes, cannot deliver reading",
                id, request.output_len
            );
            Completion::Failed(ErrorKind::InvalidRequest)
        };

        trace!("Retiring {} at reading {}", id, reading);
        retired.push(Retired { request, completion });
    }

    let published = sensor.publish(band);
    let rescan = published.crossed && !set.is_empty();

    debug!(
        "Scan complete: reading={}, retired={}, pending={}, band=[{}, {}]",
        reading,
        retired.len(),
        set.len(),
        band.low,
        band.high
    );

    ScanOutcome {
        band,
        band_changed: published.changed,
        rescan,
        retired,
    }
}
