//! Simulated sensor registers
//!
//! Holds the current reading and the band last published to the interrupt
//! layer. Guarded by the reading lock, which is independent of the queue lock
//! and is never held while the queue lock is being acquired.

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::data::Band;

#[derive(Debug)]
struct SensorRegisters {
    current: u32,
    band: Band,
}

/// Result of publishing a band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Published {
    /// The band differs from the one it replaced
    pub changed: bool,
    /// The reading held at publish time already lies outside the new band
    pub crossed: bool,
}

/// Current reading plus the published band
#[derive(Debug)]
pub struct TemperatureState {
    registers: Mutex<SensorRegisters>,
}

impl TemperatureState {
    /// Power up with `initial` and the full band
    pub fn new(initial: u32) -> Self {
        Self {
            registers: Mutex::new(SensorRegisters {
                current: initial,
                band: Band::FULL,
            }),
        }
    }

    /// Current reading. Blocks only on the reading lock.
    pub fn read(&self) -> u32 {
        self.registers.lock().current
    }

    /// Store a new reading and report whether it left the published band.
    ///
    /// The lock is released before returning so the caller can raise the
    /// interrupt without holding it.
    pub fn write(&self, value: u32) -> bool {
        let mut regs = self.registers.lock();
        regs.current = value;
        let crossed = regs.band.is_crossed_by(value);
        trace!("Sensor write: {} (band [{}, {}], crossed={})", value, regs.band.low, regs.band.high, crossed);
        crossed
    }

    /// Replace the published band.
    ///
    /// The reading is checked against the new band under the same lock, so a
    /// write that raced the scan computing `band` is never lost.
    pub fn publish(&self, band: Band) -> Published {
        let mut regs = self.registers.lock();
        let crossed = band.is_crossed_by(regs.current);
        if regs.band == band {
            return Published { changed: false, crossed };
        }
        debug!("Interrupt thresholds: low={}, high={}", band.low, band.high);
        regs.band = band;
        Published { changed: true, crossed }
    }

    /// Band last published by a scan
    pub fn band(&self) -> Band {
        self.registers.lock().band
    }
}
