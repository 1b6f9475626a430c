//! Flattening of raw cloud JSON into the shared device model.
//!
//! The cloud delivers devices as a bag of numbered functional channels whose
//! fields vary per channel type. The exporter's model is flat: for every
//! capability field the first channel (in index order) that carries it wins.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use hmip_common::error::{Error, Result};
use hmip_common::model::{ChangeEvent, Device, Group, WindowState};

#[derive(Debug, Deserialize)]
struct RawState {
    #[serde(default)]
    devices: HashMap<String, RawDevice>,
    #[serde(default)]
    groups: HashMap<String, RawGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDevice {
    #[serde(default)]
    label: String,
    #[serde(rename = "type", default)]
    device_type: String,
    #[serde(default)]
    firmware_version: String,
    last_status_update: Option<i64>,
    automatic_valve_adaption_needed: Option<bool>,
    #[serde(default)]
    functional_channels: HashMap<String, RawChannel>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChannel {
    unreach: Option<bool>,
    actual_temperature: Option<f64>,
    set_point_temperature: Option<f64>,
    humidity: Option<f64>,
    valve_actual_temperature: Option<f64>,
    temperature_offset: Option<f64>,
    valve_position: Option<f64>,
    on: Option<bool>,
    current_power_consumption: Option<f64>,
    energy_counter: Option<f64>,
    window_state: Option<String>,
    sabotage: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGroup {
    #[serde(default)]
    label: String,
    #[serde(rename = "type", default)]
    group_type: String,
    #[serde(default)]
    channels: Vec<RawGroupChannel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGroupChannel {
    device_id: String,
}

#[derive(Debug, Deserialize)]
struct RawEventBatch {
    #[serde(default)]
    events: HashMap<String, RawEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    #[serde(default)]
    push_event_type: String,
    device: Option<RawDevice>,
}

/// Parse a `getCurrentState` response body into the group topology.
pub(crate) fn groups_from_state(body: &str) -> Result<Vec<Group>> {
    let state: RawState = serde_json::from_str(body)
        .map_err(|e| Error::Payload(format!("getCurrentState response: {}", e)))?;

    let devices: HashMap<&str, Device> = state
        .devices
        .iter()
        .map(|(id, raw)| (id.as_str(), device_from_raw(raw)))
        .collect();

    let mut groups: Vec<Group> = state
        .groups
        .values()
        .map(|raw| group_from_raw(raw, &devices))
        .collect();

    // Deterministic traversal order regardless of upstream map ordering.
    groups.sort_by(|a, b| a.label.cmp(&b.label));

    Ok(groups)
}

/// Parse a push-stream message into change events.
///
/// Event indices are not ordering-relevant; batches carry no ordering
/// guarantee.
pub(crate) fn events_from_message(body: &str) -> Result<Vec<ChangeEvent>> {
    let batch: RawEventBatch = serde_json::from_str(body)
        .map_err(|e| Error::Payload(format!("push message: {}", e)))?;

    Ok(batch
        .events
        .into_values()
        .map(|raw| ChangeEvent {
            event_type: raw.push_event_type,
            device: raw.device.as_ref().map(device_from_raw),
        })
        .collect())
}

fn group_from_raw(raw: &RawGroup, devices: &HashMap<&str, Device>) -> Group {
    // A device with several functional channels appears once per channel in
    // the group's member list; it must be traversed once.
    let mut seen = HashSet::new();
    let members = raw
        .channels
        .iter()
        .filter(|c| seen.insert(c.device_id.as_str()))
        .filter_map(|c| devices.get(c.device_id.as_str()).cloned())
        .collect();

    Group {
        label: raw.label.clone(),
        group_type: raw.group_type.clone(),
        devices: members,
    }
}

fn device_from_raw(raw: &RawDevice) -> Device {
    let mut device = Device {
        label: raw.label.clone(),
        device_type: raw.device_type.clone(),
        firmware_version: raw.firmware_version.clone(),
        reachable: true,
        last_status_update: raw.last_status_update,
        valve_adaption_needed: raw.automatic_valve_adaption_needed,
        ..Default::default()
    };

    let mut indices: Vec<&String> = raw.functional_channels.keys().collect();
    indices.sort_by_key(|k| k.parse::<u32>().unwrap_or(u32::MAX));

    for index in indices {
        let channel = &raw.functional_channels[index];

        if let Some(unreach) = channel.unreach {
            device.reachable = !unreach;
        }

        merge(&mut device.actual_temperature, channel.actual_temperature);
        merge(
            &mut device.set_point_temperature,
            channel.set_point_temperature,
        );
        merge(&mut device.humidity, channel.humidity);
        merge(
            &mut device.valve_actual_temperature,
            channel.valve_actual_temperature,
        );
        merge(&mut device.temperature_offset, channel.temperature_offset);
        merge(&mut device.valve_position, channel.valve_position);
        merge(&mut device.on, channel.on);
        merge(
            &mut device.current_power_consumption,
            channel.current_power_consumption,
        );
        merge(&mut device.energy_counter, channel.energy_counter);
        merge(&mut device.sabotage, channel.sabotage);

        if device.window_state.is_none()
            && let Some(tag) = &channel.window_state
        {
            device.window_state = WindowState::from_upstream(tag);
        }
    }

    device
}

fn merge<T: Copy>(target: &mut Option<T>, value: Option<T>) {
    if target.is_none() {
        *target = value;
    }
}
