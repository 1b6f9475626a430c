//! Device classification onto the fixed metric schema.

use hmip_common::model::Device;

/// Capability class of one device, resolved once per poll.
///
/// Classes are checked in a fixed priority order so that a device exposing
/// both power metering and switching is a [`DeviceClass::MeasuringSwitch`]
/// and never additionally a plain [`DeviceClass::Switch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    /// On/off actuator with power metering.
    MeasuringSwitch,
    /// Plain on/off actuator.
    Switch,
    /// Radiator valve drive.
    HeatingValve,
    /// Wall thermostat or temperature/humidity sensor.
    ThermostatReadout,
    /// Window/door contact; consumed on the push path only.
    ContactSensor,
    /// No capability fields recognized; still receives the generic device info.
    Unrecognized,
}

/// Resolve the capability class of one device record.
///
/// Pure and infallible: classification only inspects field presence, so an
/// unknown device type degrades to [`DeviceClass::Unrecognized`] instead of
/// failing the poll cycle.
pub fn classify(device: &Device) -> DeviceClass {
    let switching = device.on.is_some();
    let metering =
        device.current_power_consumption.is_some() || device.energy_counter.is_some();

    if switching && metering {
        DeviceClass::MeasuringSwitch
    } else if switching {
        DeviceClass::Switch
    } else if device.valve_position.is_some() || device.valve_actual_temperature.is_some() {
        DeviceClass::HeatingValve
    } else if device.actual_temperature.is_some()
        || device.set_point_temperature.is_some()
        || device.humidity.is_some()
    {
        DeviceClass::ThermostatReadout
    } else if device.window_state.is_some() {
        DeviceClass::ContactSensor
    } else {
        DeviceClass::Unrecognized
    }
}

/// Normalize a device-type tag for use as a label value.
pub fn normalize_device_type(device_type: &str) -> String {
    device_type.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measuring_switch_subsumes_switch() {
        let device = Device {
            label: "Plug".to_string(),
            on: Some(true),
            current_power_consumption: Some(12.5),
            energy_counter: Some(3.2),
            ..Default::default()
        };

        assert_eq!(classify(&device), DeviceClass::MeasuringSwitch);
    }

    #[test]
    fn test_plain_switch() {
        let device = Device {
            label: "Relay".to_string(),
            on: Some(false),
            ..Default::default()
        };

        assert_eq!(classify(&device), DeviceClass::Switch);
    }

    #[test]
    fn test_heating_valve_with_all_zero_fields() {
        let device = Device {
            label: "TRV".to_string(),
            valve_actual_temperature: Some(0.0),
            set_point_temperature: Some(0.0),
            valve_adaption_needed: Some(false),
            temperature_offset: Some(0.0),
            valve_position: Some(0.0),
            ..Default::default()
        };

        // Zero-valued fields are still present; the valve must not fall
        // through to the thermostat class.
        assert_eq!(classify(&device), DeviceClass::HeatingValve);
    }

    #[test]
    fn test_thermostat_readout() {
        let device = Device {
            label: "Wall".to_string(),
            actual_temperature: Some(21.3),
            humidity: Some(45.0),
            ..Default::default()
        };

        assert_eq!(classify(&device), DeviceClass::ThermostatReadout);
    }

    #[test]
    fn test_contact_sensor() {
        let device = Device {
            label: "Window".to_string(),
            window_state: Some(hmip_common::model::WindowState::Open),
            ..Default::default()
        };

        assert_eq!(classify(&device), DeviceClass::ContactSensor);
    }

    #[test]
    fn test_unrecognized_device() {
        let device = Device {
            label: "Siren".to_string(),
            device_type: "ALARM_SIREN_INDOOR".to_string(),
            ..Default::default()
        };

        assert_eq!(classify(&device), DeviceClass::Unrecognized);
    }

    #[test]
    fn test_normalize_device_type() {
        assert_eq!(
            normalize_device_type("HEATING_THERMOSTAT"),
            "heating_thermostat"
        );
        assert_eq!(normalize_device_type("plug"), "plug");
    }
}
