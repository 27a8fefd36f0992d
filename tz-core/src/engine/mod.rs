//! Watch engine modules
//!
//! Contains the satisfaction predicate, the simulated sensor registers, the
//! pending set and its scanner, the expiry scheduler, and the zone that ties
//! them together.

mod clock;
mod notifier;
mod pending;
mod predicate;
mod scanner;
mod scheduler;
mod sensor;
mod zone;

pub use clock::{Clock, ManualClock, SystemClock};
pub use notifier::Notifier;
pub use pending::PendingSet;
pub use predicate::satisfied;
pub use scanner::{scan, Retired, ScanOutcome};
pub use scheduler::{ExpiryHandler, ExpiryScheduler, ThreadScheduler};
pub use sensor::{Published, TemperatureState};
pub use zone::ThermalZone;
