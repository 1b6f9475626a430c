//! Fixed-schema metric registry with Prometheus text rendering.
//!
//! The instrument set and every instrument's label names are fixed for the
//! process lifetime; only label values and sample values vary between polls.
//! Writing a sample for a label tuple overwrites the previous value for that
//! exact tuple and never removes other tuples, so a failed poll leaves the
//! previous cycle's samples in place.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use parking_lot::RwLock;

/// Metric kind for TYPE comments and write dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    /// Get the TYPE comment string for Prometheus exposition format.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

/// The fixed set of instruments owned by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    TemperatureActual,
    TemperatureSetpoint,
    HumidityActual,
    ValveAdaptionNeeded,
    TemperatureOffset,
    ValvePosition,
    SwitchOn,
    PowerConsumption,
    EnergyCounter,
    DeviceInfo,
    DeviceLastUpdate,
    DeviceEvent,
    GroupEvent,
}

struct MetricSpec {
    metric: Metric,
    name: &'static str,
    kind: MetricKind,
    label_names: &'static [&'static str],
}

const PER_DEVICE_LABELS: &[&str] = &["room", "device_label"];

/// Ordered as the `Metric` enum; `MetricRegistry::new` asserts the match.
const SPECS: &[MetricSpec] = &[
    MetricSpec {
        metric: Metric::TemperatureActual,
        name: "temperature_actual",
        kind: MetricKind::Gauge,
        label_names: PER_DEVICE_LABELS,
    },
    MetricSpec {
        metric: Metric::TemperatureSetpoint,
        name: "temperature_setpoint",
        kind: MetricKind::Gauge,
        label_names: PER_DEVICE_LABELS,
    },
    MetricSpec {
        metric: Metric::HumidityActual,
        name: "humidity_actual",
        kind: MetricKind::Gauge,
        label_names: PER_DEVICE_LABELS,
    },
    MetricSpec {
        metric: Metric::ValveAdaptionNeeded,
        name: "valve_adaption_needed",
        kind: MetricKind::Gauge,
        label_names: PER_DEVICE_LABELS,
    },
    MetricSpec {
        metric: Metric::TemperatureOffset,
        name: "temperature_offset",
        kind: MetricKind::Gauge,
        label_names: PER_DEVICE_LABELS,
    },
    MetricSpec {
        metric: Metric::ValvePosition,
        name: "valve_position",
        kind: MetricKind::Gauge,
        label_names: PER_DEVICE_LABELS,
    },
    MetricSpec {
        metric: Metric::SwitchOn,
        name: "switch_on",
        kind: MetricKind::Gauge,
        label_names: PER_DEVICE_LABELS,
    },
    MetricSpec {
        metric: Metric::PowerConsumption,
        name: "power_consumption",
        kind: MetricKind::Gauge,
        label_names: PER_DEVICE_LABELS,
    },
    MetricSpec {
        metric: Metric::EnergyCounter,
        name: "energy_counter",
        kind: MetricKind::Gauge,
        label_names: PER_DEVICE_LABELS,
    },
    MetricSpec {
        metric: Metric::DeviceInfo,
        name: "device_info",
        kind: MetricKind::Gauge,
        label_names: &[
            "room",
            "device_label",
            "device_type",
            "firmware_version",
            "reachable",
        ],
    },
    MetricSpec {
        metric: Metric::DeviceLastUpdate,
        name: "device_last_update",
        kind: MetricKind::Gauge,
        label_names: PER_DEVICE_LABELS,
    },
    MetricSpec {
        metric: Metric::DeviceEvent,
        name: "device_event",
        kind: MetricKind::Counter,
        label_names: &["device_label", "event_type", "window_state", "sabotage"],
    },
    MetricSpec {
        metric: Metric::GroupEvent,
        name: "group_event",
        kind: MetricKind::Counter,
        label_names: &["group_label", "event_type", "window_state", "sabotage"],
    },
];

struct Instrument {
    spec: &'static MetricSpec,
    series: RwLock<HashMap<Vec<String>, f64>>,
}

/// Exporter self-observability counters, rendered alongside the device
/// metrics.
#[derive(Debug, Clone, Default)]
pub struct ExporterStats {
    /// Poll cycles started.
    pub polls_total: u64,
    /// Poll cycles aborted by an upstream fetch failure.
    pub polls_failed: u64,
    /// Devices visited across all cycles.
    pub devices_processed: u64,
    /// Devices skipped because their field extraction failed.
    pub device_failures: u64,
    /// Change events applied to counters on the push path.
    pub events_applied: u64,
}

/// Thread-safe registry of the fixed metric schema.
///
/// Shared by the poll path, the push path, and the scrape reader; each
/// `set`/`inc` call is atomic under its instrument's lock.
pub struct MetricRegistry {
    instruments: Vec<Instrument>,
    stats: RwLock<ExporterStats>,
}

impl MetricRegistry {
    /// Create a registry with the full instrument set registered.
    pub fn new() -> Self {
        debug_assert!(
            SPECS
                .iter()
                .enumerate()
                .all(|(index, spec)| spec.metric as usize == index),
            "instrument table out of sync with the Metric enum"
        );

        Self {
            instruments: SPECS
                .iter()
                .map(|spec| Instrument {
                    spec,
                    series: RwLock::new(HashMap::new()),
                })
                .collect(),
            stats: RwLock::new(ExporterStats::default()),
        }
    }

    fn instrument(&self, metric: Metric) -> &Instrument {
        &self.instruments[metric as usize]
    }

    /// Set a gauge sample for the given label tuple.
    ///
    /// Panics when the number of label values does not match the
    /// instrument's declared label names, or when the instrument is a
    /// counter: both corrupt the exposed metric contract and are
    /// programming errors, not runtime conditions.
    pub fn set(&self, metric: Metric, label_values: &[&str], value: f64) {
        let instrument = self.instrument(metric);
        assert_eq!(
            instrument.spec.kind,
            MetricKind::Gauge,
            "set() called on counter metric '{}'",
            instrument.spec.name
        );
        check_arity(instrument.spec, label_values);

        instrument
            .series
            .write()
            .insert(owned_labels(label_values), value);
    }

    /// Increment a counter series by one. Panics on arity/kind mismatch
    /// like [`MetricRegistry::set`].
    pub fn inc(&self, metric: Metric, label_values: &[&str]) {
        let instrument = self.instrument(metric);
        assert_eq!(
            instrument.spec.kind,
            MetricKind::Counter,
            "inc() called on gauge metric '{}'",
            instrument.spec.name
        );
        check_arity(instrument.spec, label_values);

        *instrument
            .series
            .write()
            .entry(owned_labels(label_values))
            .or_insert(0.0) += 1.0;
    }

    /// Get the current number of stored series across all instruments.
    pub fn series_count(&self) -> usize {
        self.instruments
            .iter()
            .map(|i| i.series.read().len())
            .sum()
    }

    /// Get exporter statistics.
    pub fn stats(&self) -> ExporterStats {
        self.stats.read().clone()
    }

    /// Record a completed poll traversal.
    pub fn record_poll(&self, devices: u64, device_failures: u64) {
        let mut stats = self.stats.write();
        stats.polls_total += 1;
        stats.devices_processed += devices;
        stats.device_failures += device_failures;
    }

    /// Record a poll cycle aborted before traversal.
    pub fn record_poll_failure(&self) {
        let mut stats = self.stats.write();
        stats.polls_total += 1;
        stats.polls_failed += 1;
    }

    /// Record change events applied on the push path.
    pub fn record_events(&self, count: u64) {
        self.stats.write().events_applied += count;
    }

    /// Whether at least one poll cycle has completed successfully.
    pub fn has_succeeded_poll(&self) -> bool {
        let stats = self.stats.read();
        stats.polls_total > stats.polls_failed
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut output = Vec::with_capacity(self.series_count() * 100 + 512);

        for instrument in &self.instruments {
            let series = instrument.series.read();
            if series.is_empty() {
                continue;
            }

            let spec = instrument.spec;
            writeln!(output, "# TYPE {} {}", spec.name, spec.kind.as_str()).ok();

            // Sort for consistent output between scrapes.
            let mut keys: Vec<&Vec<String>> = series.keys().collect();
            keys.sort();

            for key in keys {
                writeln!(
                    output,
                    "{}{} {}",
                    spec.name,
                    format_labels(spec.label_names, key),
                    format_value(series[key])
                )
                .ok();
            }
        }

        // Exporter self-metrics
        let stats = self.stats.read();
        writeln!(output).ok();
        writeln!(output, "# TYPE hmip_exporter_series gauge").ok();
        writeln!(output, "hmip_exporter_series {}", self.series_count()).ok();

        writeln!(output, "# TYPE hmip_exporter_polls_total counter").ok();
        writeln!(output, "hmip_exporter_polls_total {}", stats.polls_total).ok();

        writeln!(output, "# TYPE hmip_exporter_poll_failures_total counter").ok();
        writeln!(
            output,
            "hmip_exporter_poll_failures_total {}",
            stats.polls_failed
        )
        .ok();

        writeln!(
            output,
            "# TYPE hmip_exporter_devices_processed_total counter"
        )
        .ok();
        writeln!(
            output,
            "hmip_exporter_devices_processed_total {}",
            stats.devices_processed
        )
        .ok();

        writeln!(output, "# TYPE hmip_exporter_device_failures_total counter").ok();
        writeln!(
            output,
            "hmip_exporter_device_failures_total {}",
            stats.device_failures
        )
        .ok();

        writeln!(output, "# TYPE hmip_exporter_events_applied_total counter").ok();
        writeln!(
            output,
            "hmip_exporter_events_applied_total {}",
            stats.events_applied
        )
        .ok();

        String::from_utf8(output).unwrap_or_default()
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a shareable registry handle.
pub type SharedRegistry = Arc<MetricRegistry>;

fn check_arity(spec: &MetricSpec, label_values: &[&str]) {
    assert_eq!(
        label_values.len(),
        spec.label_names.len(),
        "metric '{}' expects {} label values ({:?}), got {}",
        spec.name,
        spec.label_names.len(),
        spec.label_names,
        label_values.len()
    );
}

fn owned_labels(label_values: &[&str]) -> Vec<String> {
    label_values.iter().map(|v| v.to_string()).collect()
}

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Format a floating point value for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

/// Format a label tuple for Prometheus exposition format.
fn format_labels(names: &[&str], values: &[String]) -> String {
    if names.is_empty() {
        return String::new();
    }

    let parts: Vec<String> = names
        .iter()
        .zip(values)
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();

    format!("{{{}}}", parts.join(","))
}
