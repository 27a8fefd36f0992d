//! Core data types for watch requests and their outcomes

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::constants::{sensor, timing};
use crate::ErrorKind;

/// Size in bytes of a delivered reading. A waiter whose output capacity
/// differs cannot receive a value.
pub const READING_SIZE: usize = std::mem::size_of::<u32>();

/// Stable identity of a queued watch request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How long a request may wait before it is retired on time alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    Infinite,
    After(Duration),
}

impl Timeout {
    /// Interpret a millisecond timeout; [`timing::INFINITE_TIMEOUT_MS`] means never.
    pub fn from_millis(ms: u32) -> Self {
        if ms == timing::INFINITE_TIMEOUT_MS {
            Timeout::Infinite
        } else {
            Timeout::After(Duration::from_millis(u64::from(ms)))
        }
    }

    /// Absolute deadline relative to `now`, `None` for infinite.
    ///
    /// A delay too large to represent is treated as infinite.
    pub fn deadline_from(self, now: Instant) -> Option<Instant> {
        match self {
            Timeout::Infinite => None,
            Timeout::After(delay) => now.checked_add(delay),
        }
    }

    pub fn delay(self) -> Option<Duration> {
        match self {
            Timeout::Infinite => None,
            Timeout::After(delay) => Some(delay),
        }
    }
}

impl From<Option<u32>> for Timeout {
    fn from(ms: Option<u32>) -> Self {
        ms.map(Timeout::from_millis).unwrap_or(Timeout::Infinite)
    }
}

/// A client's watch request as submitted, before admission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSpec {
    pub low: u32,
    pub high: u32,
    pub timeout: Timeout,
    /// Bytes the caller can receive the reading into
    pub output_len: usize,
}

impl WatchSpec {
    pub fn new(low: u32, high: u32, timeout: Timeout) -> Self {
        Self {
            low,
            high,
            timeout,
            output_len: READING_SIZE,
        }
    }

    /// Override the declared output capacity
    pub fn with_output_len(mut self, output_len: usize) -> Self {
        self.output_len = output_len;
        self
    }

    pub fn is_well_formed(&self) -> bool {
        self.low <= self.high
    }
}

/// An admitted request held by the pending set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRequest {
    pub id: RequestId,
    pub low: u32,
    pub high: u32,
    /// `None` never expires
    pub deadline: Option<Instant>,
    pub output_len: usize,
}

impl WatchRequest {
    /// Whether a reading can be delivered into this request's output
    pub fn fits_reading(&self) -> bool {
        self.output_len == READING_SIZE
    }
}

/// Inclusive-exclusive temperature band being monitored
///
/// A reading at or beyond either edge counts as having left the band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Band {
    pub low: u32,
    pub high: u32,
}

impl Band {
    /// Widest band, published when nothing is pending
    pub const FULL: Band = Band {
        low: sensor::BAND_FLOOR,
        high: sensor::BAND_CEILING,
    };

    pub const fn new(low: u32, high: u32) -> Self {
        Self { low, high }
    }

    /// Narrow to the intersection with `[low, high]`
    pub fn tighten(&mut self, low: u32, high: u32) {
        self.low = self.low.max(low);
        self.high = self.high.min(high);
    }

    /// Whether `reading` has left the band
    pub fn is_crossed_by(&self, reading: u32) -> bool {
        reading <= self.low || reading >= self.high
    }
}

impl Default for Band {
    fn default() -> Self {
        Band::FULL
    }
}

/// Result of submitting a watch request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Satisfied on the fast path; nothing was queued
    Immediate(u32),
    /// Held until a later update, expiry or cancellation retires it
    Queued(RequestId),
    Rejected(ErrorKind),
}

/// Terminal outcome delivered for a queued request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "value", rename_all = "snake_case")]
pub enum Completion {
    Reading(u32),
    Failed(ErrorKind),
    Cancelled,
}

/// Externally visible view of one pending request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInfo {
    pub id: RequestId,
    pub low: u32,
    pub high: u32,
    /// Milliseconds until expiry, `None` when the request never expires
    pub remaining_ms: Option<u64>,
}

/// Point-in-time view of a zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneSnapshot {
    pub reading: u32,
    pub band: Band,
    pub pending: Vec<PendingInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infinite_sentinel() {
        assert_eq!(Timeout::from_millis(u32::MAX), Timeout::Infinite);
        assert_eq!(Timeout::from_millis(0), Timeout::After(Duration::ZERO));
        assert_eq!(Timeout::from(None), Timeout::Infinite);
        assert_eq!(Timeout::from(Some(250)), Timeout::After(Duration::from_millis(250)));
    }

    #[test]
    fn test_deadline_from() {
        let now = Instant::now();
        assert_eq!(Timeout::Infinite.deadline_from(now), None);
        assert_eq!(
            Timeout::After(Duration::from_millis(10)).deadline_from(now),
            Some(now + Duration::from_millis(10))
        );
    }

    #[test]
    fn test_band_tighten() {
        let mut band = Band::FULL;
        band.tighten(10, 90);
        band.tighten(30, 70);
        assert_eq!(band, Band::new(30, 70));
        band.tighten(0, u32::MAX);
        assert_eq!(band, Band::new(30, 70));
    }

    #[test]
    fn test_band_crossing_is_inclusive() {
        let band = Band::new(40, 60);
        assert!(band.is_crossed_by(40));
        assert!(band.is_crossed_by(60));
        assert!(!band.is_crossed_by(41));
        assert!(!band.is_crossed_by(59));
    }

    #[test]
    fn test_watch_spec_shape() {
        let spec = WatchSpec::new(40, 60, Timeout::Infinite);
        assert_eq!(spec.output_len, READING_SIZE);
        assert!(spec.is_well_formed());
        assert!(!WatchSpec::new(61, 60, Timeout::Infinite).is_well_formed());
    }

    #[test]
    fn test_completion_serialization() {
        let json = serde_json::to_string(&Completion::Reading(2950)).unwrap();
        assert_eq!(json, r#"{"outcome":"reading","value":2950}"#);
        let json = serde_json::to_string(&Completion::Cancelled).unwrap();
        assert_eq!(json, r#"{"outcome":"cancelled"}"#);
    }
}
