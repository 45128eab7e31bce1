// Device presence: enumeration, classification, and edge-triggered monitoring.
pub mod classify;
pub mod monitor;

pub use classify::is_headphone_label;
pub use monitor::{
    CpalEnumerator, DeviceEnumerator, DeviceMonitor, OutputDevice, PresenceChange, PresenceWatcher,
};
