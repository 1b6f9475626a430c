//! Poll-cycle synchronization of upstream device state into the registry.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use hmip_common::client::HomeClient;
use hmip_common::model::Device;

use crate::classify::{DeviceClass, classify, normalize_device_type};
use crate::registry::{Metric, SharedRegistry};

/// Outcome of one poll cycle; used for observability only, never to alter
/// scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Every device in the snapshot was written.
    Success { devices: usize },
    /// The snapshot was traversed but some devices failed extraction.
    Partial { devices: usize, failures: usize },
    /// The upstream fetch failed; no writes happened this cycle.
    Failed,
}

#[derive(Debug, Error)]
enum DeviceError {
    #[error("device has no label")]
    MissingLabel,
    #[error("field '{0}' required by the device's capability is absent")]
    MissingField(&'static str),
}

/// Walks one poll cycle's group/device snapshot and writes each device's
/// fields into the registry under stable labels.
///
/// Failure containment is layered: a fetch failure aborts the whole cycle
/// (previously written samples stay in place), a single device's failure
/// skips only that device.
pub struct Synchronizer {
    client: Arc<dyn HomeClient>,
    registry: SharedRegistry,
}

impl Synchronizer {
    pub fn new(client: Arc<dyn HomeClient>, registry: SharedRegistry) -> Self {
        Self { client, registry }
    }

    /// Run one full poll cycle.
    pub async fn run_once(&self) -> PollOutcome {
        let groups = match self.client.fetch_current_state().await {
            Ok(groups) => groups,
            Err(e) => {
                warn!(error = %e, "Collecting status from device(s) failed");
                self.registry.record_poll_failure();
                return PollOutcome::Failed;
            }
        };

        let mut devices = 0usize;
        let mut failures = 0usize;

        for group in groups.iter().filter(|g| g.is_room()) {
            for device in &group.devices {
                devices += 1;
                if let Err(e) = self.write_device(&group.label, device) {
                    failures += 1;
                    warn!(
                        room = %group.label,
                        device = %device.label,
                        error = %e,
                        "Skipping device"
                    );
                }
            }
        }

        self.registry.record_poll(devices as u64, failures as u64);

        if failures == 0 {
            PollOutcome::Success { devices }
        } else {
            PollOutcome::Partial { devices, failures }
        }
    }

    /// Drive poll cycles until shutdown, sleeping the configured interval
    /// between the end of one cycle and the start of the next.
    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(secs = interval.as_secs(), "Starting poll loop");

        loop {
            let outcome = self.run_once().await;
            debug!(?outcome, "Poll cycle finished");

            info!(
                secs = interval.as_secs(),
                "Waiting before next collection cycle"
            );
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Poll loop stopped");
    }

    fn write_device(&self, room: &str, device: &Device) -> Result<(), DeviceError> {
        if device.label.is_empty() {
            return Err(DeviceError::MissingLabel);
        }

        match classify(device) {
            DeviceClass::MeasuringSwitch => self.write_measuring_switch(room, device)?,
            DeviceClass::Switch => self.write_switch(room, device)?,
            DeviceClass::HeatingValve => self.write_valve(room, device)?,
            DeviceClass::ThermostatReadout => self.write_thermostat(room, device),
            // Contact sensors are consumed on the push path; unrecognized
            // devices still get the generic device info below.
            DeviceClass::ContactSensor | DeviceClass::Unrecognized => {}
        }

        self.write_device_info(room, device);
        Ok(())
    }

    fn write_thermostat(&self, room: &str, device: &Device) {
        let labels = &[room, device.label.as_str()];

        // A reading of exactly 0 is indistinguishable from "absent" on this
        // device family and is skipped per field; contrast write_valve.
        if let Some(v) = present(device.actual_temperature) {
            self.registry.set(Metric::TemperatureActual, labels, v);
        }
        if let Some(v) = present(device.set_point_temperature) {
            self.registry.set(Metric::TemperatureSetpoint, labels, v);
        }
        if let Some(v) = present(device.humidity) {
            self.registry.set(Metric::HumidityActual, labels, v);
        }

        info!(
            room = %room,
            device = %device.label,
            temperature_actual = ?device.actual_temperature,
            temperature_setpoint = ?device.set_point_temperature,
            humidity_actual = ?device.humidity,
            "Collected thermostat readout"
        );
    }

    fn write_valve(&self, room: &str, device: &Device) -> Result<(), DeviceError> {
        let actual = device
            .valve_actual_temperature
            .ok_or(DeviceError::MissingField("valveActualTemperature"))?;
        let setpoint = device
            .set_point_temperature
            .ok_or(DeviceError::MissingField("setPointTemperature"))?;
        let adaption = device
            .valve_adaption_needed
            .ok_or(DeviceError::MissingField("valveAdaptionNeeded"))?;
        let offset = device
            .temperature_offset
            .ok_or(DeviceError::MissingField("temperatureOffset"))?;
        let position = device
            .valve_position
            .ok_or(DeviceError::MissingField("valvePosition"))?;

        let labels = &[room, device.label.as_str()];

        // A valve legitimately reports 0 for any of these; zero is never
        // treated as absent here.
        self.registry.set(Metric::TemperatureActual, labels, actual);
        self.registry
            .set(Metric::TemperatureSetpoint, labels, setpoint);
        self.registry
            .set(Metric::ValveAdaptionNeeded, labels, bool_value(adaption));
        self.registry.set(Metric::TemperatureOffset, labels, offset);
        self.registry.set(Metric::ValvePosition, labels, position);

        info!(
            room = %room,
            device = %device.label,
            temperature_actual = actual,
            temperature_setpoint = setpoint,
            valve_position = position,
            "Collected heating valve state"
        );
        Ok(())
    }

    fn write_switch(&self, room: &str, device: &Device) -> Result<(), DeviceError> {
        let on = device.on.ok_or(DeviceError::MissingField("on"))?;
        let labels = &[room, device.label.as_str()];

        self.registry.set(Metric::SwitchOn, labels, bool_value(on));

        info!(room = %room, device = %device.label, on = on, "Collected switch state");
        Ok(())
    }

    fn write_measuring_switch(&self, room: &str, device: &Device) -> Result<(), DeviceError> {
        let on = device.on.ok_or(DeviceError::MissingField("on"))?;
        let power = device
            .current_power_consumption
            .ok_or(DeviceError::MissingField("currentPowerConsumption"))?;
        let energy = device
            .energy_counter
            .ok_or(DeviceError::MissingField("energyCounter"))?;

        let labels = &[room, device.label.as_str()];

        self.registry.set(Metric::SwitchOn, labels, bool_value(on));
        self.registry.set(Metric::PowerConsumption, labels, power);
        self.registry.set(Metric::EnergyCounter, labels, energy);

        info!(
            room = %room,
            device = %device.label,
            on = on,
            power_consumption = power,
            energy_counter = energy,
            "Collected measuring switch state"
        );
        Ok(())
    }

    fn write_device_info(&self, room: &str, device: &Device) {
        let device_type = normalize_device_type(&device.device_type);
        let reachable = if device.reachable { "true" } else { "false" };

        self.registry.set(
            Metric::DeviceInfo,
            &[
                room,
                device.label.as_str(),
                device_type.as_str(),
                device.firmware_version.as_str(),
                reachable,
            ],
            1.0,
        );

        if let Some(ts) = device.last_status_update {
            self.registry.set(
                Metric::DeviceLastUpdate,
                &[room, device.label.as_str()],
                ts as f64,
            );
        }
    }
}

fn present(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != 0.0)
}

fn bool_value(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}
