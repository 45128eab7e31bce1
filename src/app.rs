// Component wiring and the single event loop.
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::control::{Command, CommandPayload, ControlHandle};
use crate::controller::PlaybackController;
use crate::devices::{CpalEnumerator, PresenceWatcher};
use crate::store::StateStore;
use crate::supervisor::{CpalHostProbe, HostSupervisor, PROBE_INTERVAL};
use crate::synth::NoiseSynthesizer;

pub struct AppConfig {
    pub store_path: PathBuf,
    pub poll_interval: Duration,
    pub probe_interval: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_path: StateStore::default_path(),
            poll_interval: Duration::from_secs(3),
            probe_interval: PROBE_INTERVAL,
        }
    }
}

/// Run the daemon until ctrl-c. Commands arrive as JSON lines on stdin;
/// replies go out as JSON lines on stdout. Everything else is driven by the
/// device poll and the host liveness probe.
pub async fn run(config: AppConfig) -> Result<()> {
    let store = StateStore::open(config.store_path);
    let mut controller = PlaybackController::new(NoiseSynthesizer::new(), store);
    let mut supervisor = HostSupervisor::new(CpalHostProbe);
    supervisor.ensure();

    // The engine is always fresh at startup, whatever is_playing was left in
    // the store by an unclean shutdown. Re-arm rather than reconcile: it
    // clears the stale flag and then restarts playback if conditions hold.
    controller.rearm();

    let (watcher, mut presence_rx) =
        PresenceWatcher::spawn(CpalEnumerator, config.poll_interval);

    let (cmd_tx, mut cmd_rx) = mpsc::channel(16);
    let handle = ControlHandle::new(cmd_tx);
    tokio::spawn(stdin_control_loop(handle));

    let mut probe = tokio::time::interval(config.probe_interval);
    probe.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    probe.tick().await; // consume the immediate first tick

    info!("noisefall running");
    loop {
        tokio::select! {
            Some(change) = presence_rx.recv() => {
                controller.handle_presence(&change);
            }
            Some(command) = cmd_rx.recv() => {
                handle_command(command, &mut controller, &mut supervisor, &watcher).await;
            }
            _ = probe.tick() => {
                if supervisor.tick() {
                    controller.rearm();
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    watcher.stop().await;
    controller.shutdown();
    Ok(())
}

async fn handle_command<E: crate::synth::NoiseEngine>(
    command: Command,
    controller: &mut PlaybackController<E>,
    supervisor: &mut HostSupervisor<CpalHostProbe>,
    watcher: &PresenceWatcher,
) {
    match command {
        Command::SetEnabled { enabled } => controller.set_enabled(enabled),
        Command::SetVolume { volume } => controller.set_volume(volume),
        Command::ManualPlay { reply } => {
            let _ = reply.send(controller.manual_play());
        }
        Command::ManualStop { reply } => {
            let _ = reply.send(controller.manual_stop());
        }
        Command::HeadphonesChanged { change } => controller.handle_presence(&change),
        Command::PermissionGranted { reply } => {
            // The host context must be rebuilt to pick up the newly visible
            // device labels, then presence re-checked against them.
            supervisor.recreate().await;
            controller.rearm();
            if let Err(e) = watcher.request_refresh().await {
                warn!("Post-grant device refresh failed: {}", e);
            }
            let _ = reply.send(supervisor.is_ready());
        }
        Command::CheckHeadphones { reply } => {
            let connected = match watcher.request_refresh().await {
                Ok(connected) => connected,
                Err(e) => {
                    warn!("On-demand device refresh failed: {}", e);
                    controller.check_presence()
                }
            };
            let _ = reply.send(connected);
        }
    }
}

/// Front-end for the message protocol: one JSON command per stdin line,
/// replies (when the command has one) printed as JSON lines.
async fn stdin_control_loop(handle: ControlHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<CommandPayload>(line) {
            Ok(payload) => match handle.dispatch(payload).await {
                Ok(Some(reply)) => match serde_json::to_string(&reply) {
                    Ok(json) => println!("{}", json),
                    Err(e) => warn!("Failed to serialize reply: {}", e),
                },
                Ok(None) => {}
                Err(e) => warn!("Command failed: {}", e),
            },
            Err(e) => warn!("Ignoring malformed command: {}", e),
        }
    }
}
