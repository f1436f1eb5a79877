//! Haptics and battery telemetry
//!
//! The hardware is shared by the UI thread and the status timer. Every call
//! goes through the one reentrant critical section that also guards the
//! render surface, so a status refresh may run from inside a locked update.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};

/// Short click for key presses
pub const EFFECT_CLICK: u8 = 1;

/// Stronger pulse for launcher selections
pub const EFFECT_CONFIRM: u8 = 14;

/// Board-level hardware collaborator
pub trait Hardware: Send {
    /// Fire a haptic effect
    fn vibrate(&mut self, effect: u8);

    /// Battery charge in percent, if known
    fn battery_percent(&self) -> Option<u8>;

    /// Battery voltage in volts, if known
    fn battery_voltage(&self) -> Option<f32>;
}

/// One battery reading
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Battery {
    pub percent: Option<u8>,
    pub voltage: Option<f32>,
}

impl Battery {
    /// `BAT 87% 4.02V`, or `BAT --` without a reading
    pub fn label(&self) -> String {
        match (self.percent, self.voltage) {
            (Some(p), Some(v)) => format!("BAT {}% {:.2}V", p, v),
            (Some(p), None) => format!("BAT {}%", p),
            (None, Some(v)) => format!("BAT {:.2}V", v),
            (None, None) => "BAT --".to_string(),
        }
    }
}

/// Shared handle to the hardware and the critical section
#[derive(Clone)]
pub struct Hal {
    lock: Arc<ReentrantMutex<()>>,
    driver: Arc<Mutex<Box<dyn Hardware>>>,
}

impl Hal {
    pub fn new(driver: Box<dyn Hardware>) -> Self {
        Self {
            lock: Arc::new(ReentrantMutex::new(())),
            driver: Arc::new(Mutex::new(driver)),
        }
    }

    /// The critical section shared with the render surface
    pub fn critical_section(&self) -> &ReentrantMutex<()> {
        &self.lock
    }

    /// Enter the critical section
    pub fn enter(&self) -> ReentrantMutexGuard<'_, ()> {
        self.lock.lock()
    }

    pub fn vibrate(&self, effect: u8) {
        let _guard = self.enter();
        self.driver.lock().vibrate(effect);
    }

    pub fn battery(&self) -> Battery {
        let _guard = self.enter();
        let driver = self.driver.lock();
        Battery {
            percent: driver.battery_percent(),
            voltage: driver.battery_voltage(),
        }
    }
}

/// Desktop stand-in: no haptics, battery from the OS power supply class
#[derive(Debug)]
pub struct HostHardware {
    supply: Option<PathBuf>,
}

impl HostHardware {
    pub fn new() -> Self {
        let supply = fs::read_dir("/sys/class/power_supply")
            .ok()
            .and_then(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .find(|p| p.join("capacity").exists())
            });
        Self { supply }
    }

    fn read_number(&self, name: &str) -> Option<f64> {
        let path = self.supply.as_ref()?.join(name);
        fs::read_to_string(path).ok()?.trim().parse().ok()
    }
}

impl Default for HostHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl Hardware for HostHardware {
    fn vibrate(&mut self, effect: u8) {
        tracing::trace!("haptic effect {}", effect);
    }

    fn battery_percent(&self) -> Option<u8> {
        self.read_number("capacity").map(|p| p.clamp(0.0, 100.0) as u8)
    }

    fn battery_voltage(&self) -> Option<f32> {
        // Reported in microvolts
        self.read_number("voltage_now").map(|uv| (uv / 1_000_000.0) as f32)
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;

    /// Hardware with fixed readings that records haptic effects
    #[derive(Clone, Default)]
    pub struct MockHardware {
        pub effects: Arc<Mutex<Vec<u8>>>,
        pub percent: Option<u8>,
        pub voltage: Option<f32>,
    }

    impl Hardware for MockHardware {
        fn vibrate(&mut self, effect: u8) {
            self.effects.lock().push(effect);
        }

        fn battery_percent(&self) -> Option<u8> {
            self.percent
        }

        fn battery_voltage(&self) -> Option<f32> {
            self.voltage
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockHardware;
    use super::*;

    #[test]
    fn test_battery_label() {
        let full = Battery {
            percent: Some(87),
            voltage: Some(4.016),
        };
        assert_eq!(full.label(), "BAT 87% 4.02V");
        assert_eq!(Battery::default().label(), "BAT --");
    }

    #[test]
    fn test_nested_access_inside_critical_section() {
        let hw = MockHardware {
            percent: Some(50),
            ..MockHardware::default()
        };
        let effects = hw.effects.clone();
        let hal = Hal::new(Box::new(hw));

        let _outer = hal.enter();
        hal.vibrate(EFFECT_CLICK);
        assert_eq!(hal.battery().percent, Some(50));
        assert_eq!(*effects.lock(), vec![EFFECT_CLICK]);
    }
}
