// ── Typed device views ──
//
// Thin, borrow-based wrappers over `Device` that name the attributes each
// kind actually has. Obtained through `Device::as_lock` and friends, which
// return `None` when the device is a different kind.

use hublink_api::AttributeValue;
use tokio::time::Duration;

use crate::device::{Device, DeviceKind};
use crate::error::EngineError;

impl Device {
    pub fn as_lock(&self) -> Option<Lock<'_>> {
        (*self.kind() == DeviceKind::Lock).then_some(Lock { device: self })
    }

    pub fn as_thermostat(&self) -> Option<Thermostat<'_>> {
        (*self.kind() == DeviceKind::Thermostat).then_some(Thermostat { device: self })
    }

    pub fn as_binary_switch(&self) -> Option<BinarySwitch<'_>> {
        (*self.kind() == DeviceKind::BinarySwitch).then_some(BinarySwitch { device: self })
    }

    pub fn as_multilevel_switch(&self) -> Option<MultilevelSwitch<'_>> {
        (*self.kind() == DeviceKind::MultilevelSwitch).then_some(MultilevelSwitch { device: self })
    }

    pub fn as_leak_sensor(&self) -> Option<LeakSensor<'_>> {
        (*self.kind() == DeviceKind::LeakSensor).then_some(LeakSensor { device: self })
    }
}

/// A door lock: one writable boolean plus event notifications.
pub struct Lock<'a> {
    device: &'a Device,
}

impl Lock<'_> {
    pub fn locked(&self) -> Option<bool> {
        self.device.get("locked")?.as_bool()
    }

    /// Latest lock event notification text, e.g. keypad unlock reports.
    pub fn notification(&self) -> Option<String> {
        self.device.get("notifications")?.as_str().map(str::to_owned)
    }

    pub async fn set_locked(&self, locked: bool, timeout: Duration) -> Result<(), EngineError> {
        self.device.set("locked", locked, timeout).await.map(|_| ())
    }
}

/// A thermostat: setpoints, mode, fan, and read-only sensor readings.
pub struct Thermostat<'a> {
    device: &'a Device,
}

impl Thermostat<'_> {
    pub fn mode(&self) -> Option<String> {
        self.device.get("mode")?.as_str().map(str::to_owned)
    }

    pub fn fan_mode(&self) -> Option<String> {
        self.device.get("fan_mode")?.as_str().map(str::to_owned)
    }

    pub fn cooling_setpoint(&self) -> Option<f64> {
        self.device.get("cooling_setpoint")?.as_f64()
    }

    pub fn heating_setpoint(&self) -> Option<f64> {
        self.device.get("heating_setpoint")?.as_f64()
    }

    pub fn current_temp(&self) -> Option<f64> {
        self.device.get("current_temp")?.as_f64()
    }

    pub fn current_humidity(&self) -> Option<f64> {
        self.device.get("current_humidity")?.as_f64()
    }

    pub async fn set_mode(&self, mode: &str, timeout: Duration) -> Result<(), EngineError> {
        self.device.set("mode", mode, timeout).await.map(|_| ())
    }

    pub async fn set_fan_mode(&self, fan_mode: &str, timeout: Duration) -> Result<(), EngineError> {
        self.device
            .set("fan_mode", fan_mode, timeout)
            .await
            .map(|_| ())
    }

    pub async fn set_cooling_setpoint(
        &self,
        setpoint: f64,
        timeout: Duration,
    ) -> Result<(), EngineError> {
        self.device
            .set("cooling_setpoint", setpoint, timeout)
            .await
            .map(|_| ())
    }

    pub async fn set_heating_setpoint(
        &self,
        setpoint: f64,
        timeout: Duration,
    ) -> Result<(), EngineError> {
        self.device
            .set("heating_setpoint", setpoint, timeout)
            .await
            .map(|_| ())
    }
}

/// An on/off switch.
pub struct BinarySwitch<'a> {
    device: &'a Device,
}

impl BinarySwitch<'_> {
    pub fn on(&self) -> Option<bool> {
        self.device.get("on")?.as_bool()
    }

    pub async fn set_on(&self, on: bool, timeout: Duration) -> Result<(), EngineError> {
        self.device.set("on", on, timeout).await.map(|_| ())
    }
}

/// A dimmer-style switch with a 0-100 level.
pub struct MultilevelSwitch<'a> {
    device: &'a Device,
}

impl MultilevelSwitch<'_> {
    pub fn level(&self) -> Option<f64> {
        self.device.get("level")?.as_f64()
    }

    pub async fn set_level(&self, level: f64, timeout: Duration) -> Result<(), EngineError> {
        if !(0.0..=100.0).contains(&level) {
            return Err(EngineError::InvalidValue {
                attribute: "level".into(),
                value: AttributeValue::Number(level).to_string(),
            });
        }
        self.device.set("level", level, timeout).await.map(|_| ())
    }
}

/// A read-only water leak sensor.
pub struct LeakSensor<'a> {
    device: &'a Device,
}

impl LeakSensor<'_> {
    pub fn leak(&self) -> Option<bool> {
        self.device.get("leak")?.as_bool()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_range_is_checked_locally() {
        // Range failures surface without a session; construct a view over
        // a detached device handle.
        let device = Device::new(
            hublink_api::TopicId::for_device(1),
            DeviceKind::MultilevelSwitch,
            "hall dimmer".into(),
            std::sync::Weak::new(),
        );
        let switch = device.as_multilevel_switch().unwrap();

        let err = tokio_test::block_on(switch.set_level(150.0, Duration::from_secs(1)));
        assert!(matches!(err, Err(EngineError::InvalidValue { .. })));
    }

    #[test]
    fn views_refuse_the_wrong_kind() {
        let device = Device::new(
            hublink_api::TopicId::for_device(2),
            DeviceKind::Lock,
            "front door".into(),
            std::sync::Weak::new(),
        );
        assert!(device.as_lock().is_some());
        assert!(device.as_thermostat().is_none());
    }
}
