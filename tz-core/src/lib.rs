//! Thermzone Core Library
//!
//! A simulated thermal-zone sensor and the engine that answers "wake me when
//! the temperature leaves `[low, high]`, or by a deadline" requests.
//!
//! # Module Structure
//!
//! - `data/` - Request, outcome and snapshot types
//! - `engine/` - Predicate, sensor registers, pending set, scanner, timers and
//!   the [`ThermalZone`] device context tying them together
//! - `settings` - Persistent zone configuration
//! - `constants` - Defaults and magic numbers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tz_core::{Admission, Completion, Notifier, RequestId, ThermalZone, Timeout, WatchSpec};
//! use tz_core::settings::ZoneSettings;
//!
//! struct Printer;
//!
//! impl Notifier for Printer {
//!     fn complete(&self, id: RequestId, completion: Completion) {
//!         println!("{} -> {:?}", id, completion);
//!     }
//!     fn band_published(&self, _low: u32, _high: u32) {}
//!     fn band_crossed(&self, _reading: u32) {}
//! }
//!
//! let zone = ThermalZone::with_thread_scheduler(&ZoneSettings::default(), Arc::new(Printer)).unwrap();
//! match zone.submit(WatchSpec::new(2900, 3000, Timeout::from_millis(500))) {
//!     Admission::Immediate(reading) => println!("now: {}", reading),
//!     Admission::Queued(id) => println!("queued as {}", id),
//!     Admission::Rejected(kind) => println!("rejected: {}", kind),
//! }
//! ```

// Grouped modules
pub mod data;
pub mod engine;

// Standalone modules
pub mod constants;
pub mod settings;

// Re-export error types
pub use tz_error::{ErrorKind, Result, ThermalError};

// Re-export primary types from data/
pub use data::{
    Admission, Band, Completion, PendingInfo, RequestId, Timeout, WatchRequest, WatchSpec,
    ZoneSnapshot, READING_SIZE,
};

// Re-export engine types
pub use engine::{
    satisfied, Clock, ExpiryScheduler, ManualClock, Notifier, SystemClock, ThermalZone,
    ThreadScheduler,
};
