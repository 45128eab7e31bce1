// noisefall: plays brown noise automatically while headphones are connected.

pub mod app;
pub mod control;
pub mod controller;
pub mod devices;
pub mod error;
pub mod store;
pub mod supervisor;
pub mod synth;

pub use app::{run, AppConfig};
pub use control::{Command, CommandPayload, ControlHandle, ReplyBody};
pub use controller::{indicator, next_action, IndicatorState, PlaybackAction, PlaybackController};
pub use devices::{
    is_headphone_label, CpalEnumerator, DeviceEnumerator, DeviceMonitor, OutputDevice,
    PresenceChange, PresenceWatcher,
};
pub use error::NoisefallError;
pub use store::{PersistedState, StateStore};
pub use supervisor::{CpalHostProbe, HostProbe, HostSupervisor};
pub use synth::{BrownNoise, NoiseEngine, NoiseSynthesizer};
