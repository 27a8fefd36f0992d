//! Satisfaction predicate
//!
//! Decides whether a watch request can be retired. Pure and non-blocking:
//! callers pass snapshots of the reading and the clock.

use std::time::Instant;

/// Whether a request with band `[low, high]` and `deadline` is retirable.
///
/// 1. A reading at or beyond either edge satisfies the request.
/// 2. Otherwise a request without a deadline never retires on time alone.
/// 3. Otherwise it retires once `now` reaches the deadline.
pub fn satisfied(reading: u32, low: u32, high: u32, deadline: Option<Instant>, now: Instant) -> bool {
    if reading <= low || reading >= high {
        return true;
    }

    match deadline {
        None => false,
        Some(deadline) => now >= deadline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_band_crossed_without_deadline() {
        let now = Instant::now();
        for (reading, low, high) in [(0, 0, 10), (5, 10, 20), (20, 10, 20), (25, 10, 20), (7, 7, 7)] {
            assert!(satisfied(reading, low, high, None, now), "{} in [{}, {}]", reading, low, high);
        }
        for (reading, low, high) in [(15, 10, 20), (11, 10, 20), (19, 10, 20)] {
            assert!(!satisfied(reading, low, high, None, now), "{} in [{}, {}]", reading, low, high);
        }
    }

    #[test]
    fn test_no_deadline_matches_band_check() {
        let now = Instant::now();
        for low in (0..60).step_by(7) {
            for high in (low..80).step_by(9) {
                for reading in (0..90).step_by(5) {
                    let expected = reading <= low || reading >= high;
                    assert_eq!(satisfied(reading, low, high, None, now), expected);
                }
            }
        }
    }

    #[test]
    fn test_expiry_dominates() {
        let deadline = Instant::now();
        let later = deadline + Duration::from_millis(1);
        assert!(satisfied(50, 40, 60, Some(deadline), deadline));
        assert!(satisfied(50, 40, 60, Some(deadline), later));
        assert!(satisfied(50, 0, u32::MAX, Some(deadline), later));
    }

    #[test]
    fn test_not_yet_expired() {
        let now = Instant::now();
        let deadline = now + Duration::from_secs(5);
        assert!(!satisfied(50, 40, 60, Some(deadline), now));
    }

    #[test]
    fn test_scenario_readings() {
        let now = Instant::now();
        // Reading strictly inside the band waits.
        assert!(!satisfied(50, 40, 60, None, now));
        // Reading above the band is satisfied at once.
        assert!(satisfied(70, 40, 60, None, now));
    }
}
