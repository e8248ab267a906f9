// ── Device facade ──
//
// The application-facing handle for one device. Holds a weak reference to
// the session so a forgotten handle can never keep an ended session alive;
// every operation on a dead session fails with `SessionClosed` (reads
// simply report unknown).

use std::fmt;
use std::sync::{Arc, Weak};

use arc_swap::ArcSwapOption;
use hublink_api::{AttributeValue, TopicId};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, warn};

use crate::cache::Attribute;
use crate::error::EngineError;
use crate::registry::{SubscriptionHandle, UpdateEvent, UpdateReceiver};
use crate::session::SessionInner;

// ── Device kinds ────────────────────────────────────────────────────

/// Thermostat operating modes the hub accepts.
pub const THERMOSTAT_MODES: &[&str] = &["aux_heat", "heat", "cool", "auto", "off"];
/// Thermostat fan modes the hub accepts.
pub const FAN_MODES: &[&str] = &["on", "auto"];

/// What a device is, which decides which attributes are writable and
/// which enumerated values they accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceKind {
    Lock,
    Thermostat,
    BinarySwitch,
    MultilevelSwitch,
    LeakSensor,
    /// A kind this crate has no table for. Validation is skipped and the
    /// hub is the sole judge of the command.
    Other(String),
}

impl DeviceKind {
    /// Map a directory `type` tag to a kind.
    pub fn from_directory(tag: &str) -> Self {
        match tag {
            "entry_control" => Self::Lock,
            "thermostat" => Self::Thermostat,
            "switch_binary" => Self::BinarySwitch,
            "switch_multilevel" | "dimmer" => Self::MultilevelSwitch,
            "sensor_notification" | "leak_sensor" => Self::LeakSensor,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Attributes commands may target for this kind.
    pub fn writable_attributes(&self) -> &'static [&'static str] {
        match self {
            Self::Lock => &["locked"],
            Self::Thermostat => &[
                "mode",
                "fan_mode",
                "cooling_setpoint",
                "heating_setpoint",
            ],
            Self::BinarySwitch => &["on"],
            Self::MultilevelSwitch => &["level"],
            Self::LeakSensor | Self::Other(_) => &[],
        }
    }

    /// Read-only attributes the hub reports for this kind.
    pub fn readonly_attributes(&self) -> &'static [&'static str] {
        match self {
            Self::Lock => &["notifications"],
            Self::Thermostat => &["current_temp", "current_humidity"],
            Self::LeakSensor => &["leak"],
            Self::BinarySwitch | Self::MultilevelSwitch | Self::Other(_) => &[],
        }
    }

    /// The accepted value set for an enumerated attribute, if it has one.
    pub fn accepted_values(&self, attribute: &str) -> Option<&'static [&'static str]> {
        match (self, attribute) {
            (Self::Thermostat, "mode") => Some(THERMOSTAT_MODES),
            (Self::Thermostat, "fan_mode") => Some(FAN_MODES),
            _ => None,
        }
    }

    /// Reject writes to unknown/read-only attributes and out-of-set
    /// enumerated values before anything reaches the wire.
    fn validate_write(&self, attribute: &str, value: &AttributeValue) -> Result<(), EngineError> {
        if matches!(self, Self::Other(_)) {
            return Ok(());
        }
        if !self.writable_attributes().contains(&attribute) {
            return Err(EngineError::InvalidAttribute {
                kind: self.to_string(),
                attribute: attribute.to_owned(),
            });
        }
        if let Some(accepted) = self.accepted_values(attribute) {
            let ok = value.as_str().is_some_and(|s| accepted.contains(&s));
            if !ok {
                return Err(EngineError::InvalidValue {
                    attribute: attribute.to_owned(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lock => write!(f, "lock"),
            Self::Thermostat => write!(f, "thermostat"),
            Self::BinarySwitch => write!(f, "binary switch"),
            Self::MultilevelSwitch => write!(f, "multilevel switch"),
            Self::LeakSensor => write!(f, "leak sensor"),
            Self::Other(tag) => write!(f, "{tag}"),
        }
    }
}

// ── Device ──────────────────────────────────────────────────────────

pub type UpdateCallback = dyn Fn(&UpdateEvent) + Send + Sync;

struct Updater {
    handle: SubscriptionHandle,
    task: JoinHandle<()>,
}

/// Handle for one device within a session.
pub struct Device {
    topic: TopicId,
    kind: DeviceKind,
    name: String,
    session: Weak<SessionInner>,
    callback: Arc<ArcSwapOption<Box<UpdateCallback>>>,
    updater: Mutex<Option<Updater>>,
}

impl Device {
    pub(crate) fn new(
        topic: TopicId,
        kind: DeviceKind,
        name: String,
        session: Weak<SessionInner>,
    ) -> Self {
        Self {
            topic,
            kind,
            name,
            session,
            callback: Arc::new(ArcSwapOption::empty()),
            updater: Mutex::new(None),
        }
    }

    pub fn topic(&self) -> &TopicId {
        &self.topic
    }

    pub fn kind(&self) -> &DeviceKind {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn session(&self) -> Result<Arc<SessionInner>, EngineError> {
        self.session.upgrade().ok_or(EngineError::SessionClosed)
    }

    /// Last-known value of an attribute, or `None` if never observed (or
    /// the session is gone). Never touches the network.
    pub fn get(&self, attribute: &str) -> Option<AttributeValue> {
        self.attribute(attribute).map(|a| a.value)
    }

    /// Last-known value with its observation timestamp.
    pub fn attribute(&self, attribute: &str) -> Option<Attribute> {
        self.session.upgrade()?.cache.get(&self.topic, attribute)
    }

    /// Snapshot of every cached attribute for this device.
    pub fn attributes(&self) -> Vec<(String, Attribute)> {
        self.session
            .upgrade()
            .map(|s| s.cache.attributes(&self.topic))
            .unwrap_or_default()
    }

    /// Change an attribute and wait for the hub's confirmation.
    ///
    /// The returned value is what the hub confirmed, which is also what
    /// the cache now holds. Validation failures never reach the wire.
    pub async fn set(
        &self,
        attribute: &str,
        value: impl Into<AttributeValue>,
        timeout: Duration,
    ) -> Result<AttributeValue, EngineError> {
        let value = value.into();
        self.kind.validate_write(attribute, &value)?;
        let session = self.session()?;
        session
            .set_attribute(&self.topic, attribute, value, timeout)
            .await
    }

    /// Open a stream of this device's update events.
    ///
    /// Each stream is its own subscription; dropping it without
    /// [`UpdateStream::close`] is detected lazily when the next event
    /// prunes the dead listener.
    pub async fn updates(&self) -> Result<UpdateStream, EngineError> {
        let session = self.session()?;
        let (handle, rx) = session.subscribe(&self.topic).await?;
        Ok(UpdateStream {
            session: Weak::clone(&self.session),
            handle: Some(handle),
            rx,
        })
    }

    /// Install the update callback, replacing any previous one
    /// (last writer wins). Takes effect for events not yet delivered.
    pub fn set_update_callback(&self, callback: impl Fn(&UpdateEvent) + Send + Sync + 'static) {
        let boxed: Box<UpdateCallback> = Box::new(callback);
        self.callback.store(Some(Arc::new(boxed)));
    }

    pub fn clear_update_callback(&self) {
        self.callback.store(None);
    }

    /// Start the background updater: subscribes to the device and invokes
    /// the installed callback for each event. Idempotent while running.
    pub async fn start_updater(&self) -> Result<(), EngineError> {
        let mut guard = self.updater.lock().await;
        if guard.is_some() {
            debug!(topic = %self.topic, "updater already running");
            return Ok(());
        }

        let session = self.session()?;
        let (handle, rx) = session.subscribe(&self.topic).await?;

        let task = tokio::spawn(run_updater(
            self.topic.clone(),
            rx,
            Arc::clone(&self.callback),
        ));
        *guard = Some(Updater { handle, task });
        debug!(topic = %self.topic, "updater started");
        Ok(())
    }

    /// Stop the background updater and drop its subscription. The cached
    /// state remains readable. No-op if not running.
    pub async fn stop_updater(&self) {
        let Some(updater) = self.updater.lock().await.take() else {
            return;
        };
        if let Some(session) = self.session.upgrade() {
            session.unsubscribe(&updater.handle);
        }
        // Unsubscribing dropped the listener's sender, so the task ends on
        // its own; abort covers the session-already-gone path.
        updater.task.abort();
        debug!(topic = %self.topic, "updater stopped");
    }
}

async fn run_updater(
    topic: TopicId,
    mut rx: UpdateReceiver,
    callback: Arc<ArcSwapOption<Box<UpdateCallback>>>,
) {
    while let Some(event) = rx.recv().await {
        if let Some(cb) = callback.load_full() {
            let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(&event)));
            if caught.is_err() {
                warn!(%topic, attribute = %event.attribute, "update callback panicked");
            }
        }
    }
    debug!(%topic, "updater task ended");
}

// ── UpdateStream ────────────────────────────────────────────────────

/// A live stream of one device's update events, in arrival order.
pub struct UpdateStream {
    session: Weak<SessionInner>,
    handle: Option<SubscriptionHandle>,
    rx: UpdateReceiver,
}

impl UpdateStream {
    /// Next event, or `None` once the subscription or session is gone.
    pub async fn recv(&mut self) -> Option<Arc<UpdateEvent>> {
        self.rx.recv().await
    }

    /// Non-blocking poll, for draining already-delivered events.
    pub fn try_recv(&mut self) -> Option<Arc<UpdateEvent>> {
        self.rx.try_recv().ok()
    }

    /// Drop the subscription eagerly, unsubscribing at the hub if this was
    /// the topic's last listener.
    pub fn close(mut self) {
        if let (Some(session), Some(handle)) = (self.session.upgrade(), self.handle.take()) {
            session.unsubscribe(&handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_tags_map_to_kinds() {
        assert_eq!(DeviceKind::from_directory("entry_control"), DeviceKind::Lock);
        assert_eq!(
            DeviceKind::from_directory("thermostat"),
            DeviceKind::Thermostat
        );
        assert_eq!(
            DeviceKind::from_directory("switch_binary"),
            DeviceKind::BinarySwitch
        );
        assert_eq!(
            DeviceKind::from_directory("garage_door"),
            DeviceKind::Other("garage_door".into())
        );
    }

    #[test]
    fn lock_rejects_non_writable_attribute() {
        let err = DeviceKind::Lock
            .validate_write("notifications", &AttributeValue::Text("x".into()))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidAttribute { .. }));
    }

    #[test]
    fn thermostat_mode_is_enumerated() {
        let kind = DeviceKind::Thermostat;
        assert!(kind
            .validate_write("mode", &AttributeValue::Text("cool".into()))
            .is_ok());

        let err = kind
            .validate_write("mode", &AttributeValue::Text("arctic".into()))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidValue { .. }));

        // Non-string values can never match an enumerated set.
        assert!(kind
            .validate_write("mode", &AttributeValue::Number(3.0))
            .is_err());
    }

    #[test]
    fn setpoints_accept_numbers() {
        assert!(DeviceKind::Thermostat
            .validate_write("cooling_setpoint", &AttributeValue::Number(72.0))
            .is_ok());
    }

    #[test]
    fn leak_sensor_has_no_writable_attributes() {
        let err = DeviceKind::LeakSensor
            .validate_write("leak", &AttributeValue::Bool(false))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidAttribute { .. }));
    }

    #[test]
    fn unknown_kinds_skip_validation() {
        assert!(DeviceKind::Other("garage_door".into())
            .validate_write("open", &AttributeValue::Bool(true))
            .is_ok());
    }
}
