//! Push-path consumption of change notifications.

use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

use hmip_common::model::{ChangeEvent, EVENT_DEVICE_CHANGED};

use crate::registry::{Metric, SharedRegistry};

/// Applies change-notification batches to the event counters.
///
/// Runs independently of the poll loop: delivery cadence is owned by the
/// upstream client, and the two paths only meet inside the registry. The
/// upstream stream is a superset feed; anything that is not a contact-sensor
/// device change is skipped without logging noise.
pub struct EventAdapter {
    registry: SharedRegistry,
    rx: mpsc::Receiver<Vec<ChangeEvent>>,
}

impl EventAdapter {
    pub fn new(registry: SharedRegistry, rx: mpsc::Receiver<Vec<ChangeEvent>>) -> Self {
        Self { registry, rx }
    }

    /// Drain the event channel until shutdown or the delivery side goes away.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                batch = self.rx.recv() => match batch {
                    Some(events) => self.apply_batch(&events),
                    None => {
                        debug!("Event stream closed");
                        break;
                    }
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        debug!("Event adapter stopped");
    }

    fn apply_batch(&self, events: &[ChangeEvent]) {
        let mut applied = 0u64;

        for event in events {
            if event.event_type != EVENT_DEVICE_CHANGED {
                trace!(event_type = %event.event_type, "Ignoring event type");
                continue;
            }
            let Some(device) = &event.device else {
                continue;
            };
            // Only contact-sensor shaped payloads carry a window state.
            let Some(window_state) = device.window_state else {
                continue;
            };

            let event_type = event.event_type.to_lowercase();
            let sabotage = match device.sabotage {
                Some(true) => "true",
                _ => "false",
            };

            self.registry.inc(
                Metric::DeviceEvent,
                &[
                    device.label.as_str(),
                    event_type.as_str(),
                    window_state.as_str(),
                    sabotage,
                ],
            );
            applied += 1;
        }

        if applied > 0 {
            self.registry.record_events(applied);
            debug!(applied, batch = events.len(), "Applied event batch");
        }
    }
}
