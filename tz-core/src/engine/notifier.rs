//! Outbound interface to the plumbing layer

use crate::data::{Completion, RequestId};

/// Receives everything the zone hands back to the outside world.
///
/// `complete` and `band_crossed` are always called with no zone lock held, so
/// implementations may call straight back into the zone. `band_published` is
/// called while the queue lock is held so bands are seen in scan order; it
/// must not block or re-enter the zone.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    /// Hand a terminal outcome to whatever is waiting on `id`
    fn complete(&self, id: RequestId, completion: Completion);

    /// The monitored band changed
    fn band_published(&self, low: u32, high: u32);

    /// A reading update left the previously published band
    fn band_crossed(&self, reading: u32);
}
