use serde::{Deserialize, Serialize};

/// Group type tag marking the canonical room-membership grouping.
///
/// The upstream topology contains other group types (heating circuits,
/// security zones); only META groups are traversed for the `room` label.
pub const ROOM_GROUP_TYPE: &str = "META";

/// Event type tag for per-device change notifications.
pub const EVENT_DEVICE_CHANGED: &str = "DEVICE_CHANGED";

/// One device as seen in a single poll cycle.
///
/// Devices are ephemeral: the whole topology is re-fetched each cycle and no
/// identity is retained in memory between cycles. Every capability value is
/// an `Option` so that "absent upstream" is never conflated with a
/// legitimate reading of zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Stable identifying label, unique within the polled topology.
    pub label: String,

    /// Upstream device-type tag (e.g. "HEATING_THERMOSTAT").
    pub device_type: String,

    /// Firmware version string.
    pub firmware_version: String,

    /// Whether the access point can currently reach the device.
    pub reachable: bool,

    /// Unix epoch milliseconds of the last upstream status update.
    pub last_status_update: Option<i64>,

    // Thermostat readout
    pub actual_temperature: Option<f64>,
    pub set_point_temperature: Option<f64>,
    pub humidity: Option<f64>,

    // Heating valve
    pub valve_actual_temperature: Option<f64>,
    pub valve_adaption_needed: Option<bool>,
    pub temperature_offset: Option<f64>,
    pub valve_position: Option<f64>,

    // Switch / measuring switch
    pub on: Option<bool>,
    pub current_power_consumption: Option<f64>,
    pub energy_counter: Option<f64>,

    // Contact sensor (push path only)
    pub window_state: Option<WindowState>,
    pub sabotage: Option<bool>,
}

/// Window/door contact state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WindowState {
    Open,
    Closed,
    Tilted,
}

impl WindowState {
    /// Parse the upstream tag; unknown states map to `None`.
    pub fn from_upstream(tag: &str) -> Option<Self> {
        match tag {
            "OPEN" => Some(WindowState::Open),
            "CLOSED" => Some(WindowState::Closed),
            "TILTED" => Some(WindowState::Tilted),
            _ => None,
        }
    }

    /// Lowercase form used as a metric label value.
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowState::Open => "open",
            WindowState::Closed => "closed",
            WindowState::Tilted => "tilted",
        }
    }
}

impl std::fmt::Display for WindowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Upstream container entity; the source of the `room` label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    /// Group label, used as the `room` label value.
    pub label: String,

    /// Upstream group-type tag.
    pub group_type: String,

    /// Devices that are members of this group.
    pub devices: Vec<Device>,
}

impl Group {
    /// Whether this group is the canonical room-membership grouping.
    pub fn is_room(&self) -> bool {
        self.group_type == ROOM_GROUP_TYPE
    }
}

/// A push-delivered change notification from the upstream session.
///
/// The upstream stream is a superset feed; events whose payload is not
/// device-shaped carry `device: None` and are ignored by consumers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Upstream event type tag (e.g. "DEVICE_CHANGED").
    pub event_type: String,

    /// Device-shaped payload, when the event carries one.
    pub device: Option<Device>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_group_detection() {
        let room = Group {
            label: "Living Room".to_string(),
            group_type: "META".to_string(),
            devices: Vec::new(),
        };
        let heating = Group {
            label: "Circuit 1".to_string(),
            group_type: "HEATING".to_string(),
            devices: Vec::new(),
        };

        assert!(room.is_room());
        assert!(!heating.is_room());
    }

    #[test]
    fn test_window_state_from_upstream() {
        assert_eq!(WindowState::from_upstream("OPEN"), Some(WindowState::Open));
        assert_eq!(
            WindowState::from_upstream("CLOSED"),
            Some(WindowState::Closed)
        );
        assert_eq!(
            WindowState::from_upstream("TILTED"),
            Some(WindowState::Tilted)
        );
        assert_eq!(WindowState::from_upstream("VENTILATION_POSITION"), None);
    }

    #[test]
    fn test_window_state_label_form() {
        assert_eq!(WindowState::Open.as_str(), "open");
        assert_eq!(WindowState::Tilted.to_string(), "tilted");
    }

    #[test]
    fn test_device_zero_is_distinct_from_absent() {
        let device = Device {
            label: "TRV-1".to_string(),
            temperature_offset: Some(0.0),
            ..Default::default()
        };

        assert_eq!(device.temperature_offset, Some(0.0));
        assert_eq!(device.valve_position, None);
    }
}
