// Output-device presence monitoring with edge-triggered change events.
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait};
use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;

use super::classify::is_headphone_label;
use crate::error::NoisefallError;

/// Placeholder ids some platforms report for the routing aliases rather than
/// real hardware; skipped for new-device churn logging.
const PLACEHOLDER_IDS: &[&str] = &["default", "communications"];

/// One enumerated audio output. With cpal the device name doubles as the id;
/// a device whose name cannot be read keeps a synthetic id and an empty label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDevice {
    pub id: String,
    pub label: String,
}

/// Enumeration seam so the monitor can be driven by a fake device list in
/// tests.
pub trait DeviceEnumerator: Send {
    fn outputs(&mut self) -> Result<Vec<OutputDevice>, NoisefallError>;
}

/// Real enumeration through the default cpal host.
pub struct CpalEnumerator;

impl DeviceEnumerator for CpalEnumerator {
    fn outputs(&mut self) -> Result<Vec<OutputDevice>, NoisefallError> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| NoisefallError::PermissionDenied(format!("cannot enumerate outputs: {}", e)))?;

        let mut outputs = Vec::new();
        for (index, device) in devices.enumerate() {
            match device.name() {
                Ok(name) => outputs.push(OutputDevice {
                    id: name.clone(),
                    label: name,
                }),
                Err(e) => {
                    debug!("Output device {} has no readable name: {}", index, e);
                    outputs.push(OutputDevice {
                        id: format!("output-{}", index),
                        label: String::new(),
                    });
                }
            }
        }
        Ok(outputs)
    }
}

/// Emitted only when aggregate headphone presence flips (or once at startup
/// with `initial` set). Device count and labels ride along for diagnostics.
#[derive(Debug, Clone)]
pub struct PresenceChange {
    pub connected: bool,
    pub initial: bool,
    pub device_count: usize,
    pub labels: Vec<String>,
}

/// Tracks the device snapshot and reports transitions in aggregate headphone
/// presence. Identity churn (devices appearing or vanishing without the
/// aggregate flipping) is counted and logged but never notifies.
pub struct DeviceMonitor<E> {
    enumerator: E,
    known_ids: HashSet<String>,
    connected: bool,
    reported_initial: bool,
    churn_events: u64,
}

impl<E: DeviceEnumerator> DeviceMonitor<E> {
    pub fn new(enumerator: E) -> Self {
        Self {
            enumerator,
            known_ids: HashSet::new(),
            connected: false,
            reported_initial: false,
            churn_events: 0,
        }
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn churn_events(&self) -> u64 {
        self.churn_events
    }

    /// Re-enumerate, reclassify, and return a change report iff aggregate
    /// presence flipped. Idempotent by construction: calling it on a timer
    /// and from an on-demand trigger at once cannot double-report.
    pub fn refresh(&mut self) -> Result<Option<PresenceChange>, NoisefallError> {
        let outputs = self.enumerator.outputs()?;
        debug!("Checking {} audio outputs", outputs.len());

        let current_ids: HashSet<String> = outputs.iter().map(|d| d.id.clone()).collect();

        for device in &outputs {
            if !self.known_ids.contains(&device.id)
                && !PLACEHOLDER_IDS.contains(&device.id.as_str())
            {
                debug!("New device: \"{}\"", display_label(&device.label));
                self.churn_events += 1;
            }
        }
        for old_id in self.known_ids.difference(&current_ids) {
            debug!("Device removed: {}", old_id);
            self.churn_events += 1;
        }
        self.known_ids = current_ids;

        let has_headphones = outputs.iter().any(|d| is_headphone_label(&d.label));

        let initial = !self.reported_initial;
        self.reported_initial = true;

        if !initial && has_headphones == self.connected {
            return Ok(None);
        }

        self.connected = has_headphones;
        info!(
            ">>> Headphones {}{}",
            if has_headphones { "CONNECTED" } else { "DISCONNECTED" },
            if initial { " (initial)" } else { "" }
        );

        Ok(Some(PresenceChange {
            connected: has_headphones,
            initial,
            device_count: outputs.len(),
            labels: outputs.iter().map(|d| display_label(&d.label)).collect(),
        }))
    }
}

fn display_label(label: &str) -> String {
    if label.is_empty() {
        "(no label)".to_string()
    } else {
        label.to_string()
    }
}

/// Runs a [`DeviceMonitor`] on its own task: a fixed-interval poll guarantees
/// eventual detection, and on-demand refresh requests (the CHECK_HEADPHONES
/// path) share the same edge-triggered `refresh`.
pub struct PresenceWatcher {
    handle: Option<JoinHandle<()>>,
    refresh_tx: mpsc::Sender<oneshot::Sender<bool>>,
    stop_signal: Arc<Notify>,
}

impl PresenceWatcher {
    pub fn spawn<E>(
        enumerator: E,
        poll_interval: Duration,
    ) -> (Self, mpsc::Receiver<PresenceChange>)
    where
        E: DeviceEnumerator + 'static,
    {
        let (event_tx, event_rx) = mpsc::channel(16);
        let (refresh_tx, refresh_rx) = mpsc::channel(4);
        let stop_signal = Arc::new(Notify::new());

        let monitor = DeviceMonitor::new(enumerator);
        let handle = tokio::spawn(Self::watch_loop(
            monitor,
            event_tx,
            refresh_rx,
            stop_signal.clone(),
            poll_interval,
        ));

        (
            Self {
                handle: Some(handle),
                refresh_tx,
                stop_signal,
            },
            event_rx,
        )
    }

    /// Force a refresh now and return the (possibly just-updated) presence.
    /// Any transition this uncovers is still delivered on the event channel.
    pub async fn request_refresh(&self) -> Result<bool, NoisefallError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.refresh_tx
            .send(reply_tx)
            .await
            .map_err(|_| NoisefallError::MessageDeliveryFailed("monitor not running".into()))?;
        reply_rx
            .await
            .map_err(|_| NoisefallError::MessageDeliveryFailed("monitor dropped the reply".into()))
    }

    pub async fn stop(mut self) {
        self.stop_signal.notify_one();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("Device monitor stopped");
    }

    async fn watch_loop<E: DeviceEnumerator>(
        mut monitor: DeviceMonitor<E>,
        events: mpsc::Sender<PresenceChange>,
        mut refresh_rx: mpsc::Receiver<oneshot::Sender<bool>>,
        stop_signal: Arc<Notify>,
        poll_interval: Duration,
    ) {
        let mut ticker = tokio::time::interval(poll_interval);
        info!("Device monitoring active, polling every {:?}", poll_interval);

        loop {
            tokio::select! {
                _ = stop_signal.notified() => {
                    debug!("Device monitor received stop signal");
                    break;
                }
                _ = ticker.tick() => {
                    Self::refresh_and_report(&mut monitor, &events);
                }
                Some(reply) = refresh_rx.recv() => {
                    Self::refresh_and_report(&mut monitor, &events);
                    let _ = reply.send(monitor.connected());
                }
            }
        }
    }

    // Delivery is fire-and-forget: presence events are edge-triggered and
    // the snapshot stays authoritative, so a full or closed channel drops
    // the event with a warning rather than blocking the monitor task on a
    // receiver that may itself be waiting on us.
    fn refresh_and_report<E: DeviceEnumerator>(
        monitor: &mut DeviceMonitor<E>,
        events: &mpsc::Sender<PresenceChange>,
    ) {
        match monitor.refresh() {
            Ok(Some(change)) => {
                if let Err(e) = events.try_send(change) {
                    warn!("Presence change dropped: {}", e);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Device refresh failed: {}", e),
        }
    }
}

impl Drop for PresenceWatcher {
    fn drop(&mut self) {
        self.stop_signal.notify_one();
    }
}
