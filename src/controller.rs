// Playback state machine: reconciles user intent, device presence and
// actual playback into one action, and derives the UI indicator.
use log::{debug, info, warn};

use crate::devices::PresenceChange;
use crate::store::StateStore;
use crate::synth::NoiseEngine;

/// Derived tray/indicator state; recomputed on every relevant change and
/// never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorState {
    /// Grey: disabled.
    Off,
    /// Amber: enabled, waiting for headphones.
    Waiting,
    /// Green: headphones present or noise playing.
    Active,
}

/// The single action a reconciliation pass can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackAction {
    Start,
    Stop,
    Hold,
}

/// Transition rule over the `(enabled, connected, playing)` cross product.
/// Only two combinations act; everything else is stable.
pub fn next_action(enabled: bool, connected: bool, playing: bool) -> PlaybackAction {
    if enabled && connected && !playing {
        PlaybackAction::Start
    } else if playing && (!enabled || !connected) {
        PlaybackAction::Stop
    } else {
        PlaybackAction::Hold
    }
}

/// Pure indicator derivation.
pub fn indicator(enabled: bool, connected: bool, playing: bool) -> IndicatorState {
    if !enabled {
        IndicatorState::Off
    } else if connected || playing {
        IndicatorState::Active
    } else {
        IndicatorState::Waiting
    }
}

/// Owns the reconciliation loop state. All mutations of `is_playing` and
/// `headphones_connected` in the store happen here, immediately after the
/// corresponding engine call, so the store always mirrors reality as this
/// component last observed it.
pub struct PlaybackController<E: NoiseEngine> {
    engine: E,
    store: StateStore,
    indicator: IndicatorState,
}

impl<E: NoiseEngine> PlaybackController<E> {
    pub fn new(engine: E, store: StateStore) -> Self {
        let s = store.state();
        let indicator = indicator(s.enabled, s.headphones_connected, s.is_playing);
        info!("Controller ready, indicator {:?}", indicator);
        Self {
            engine,
            store,
            indicator,
        }
    }

    pub fn indicator(&self) -> IndicatorState {
        self.indicator
    }

    pub fn is_playing(&self) -> bool {
        self.store.state().is_playing
    }

    /// Enable/disable the feature. Disabling forces a stop; enabling starts
    /// only through the normal transition rule (i.e. when presence is
    /// already true).
    pub fn set_enabled(&mut self, enabled: bool) {
        info!("Enabled set to {}", enabled);
        if let Err(e) = self.store.set_enabled(enabled) {
            warn!("Failed to persist enabled flag: {}", e);
        }
        self.reconcile();
    }

    /// Persist the volume and propagate it live when the engine is running.
    pub fn set_volume(&mut self, volume: u8) {
        let volume = volume.min(100);
        debug!("Volume set to {}", volume);
        if let Err(e) = self.store.set_volume(volume) {
            warn!("Failed to persist volume: {}", e);
        }
        self.engine.set_volume(volume);
    }

    /// User-forced start, regardless of detected presence.
    pub fn manual_play(&mut self) -> bool {
        info!("Manual play requested");
        self.start_noise()
    }

    /// User-forced stop, regardless of enabled/presence.
    pub fn manual_stop(&mut self) -> bool {
        info!("Manual stop requested");
        self.stop_noise();
        true
    }

    /// Presence edge from the device monitor.
    pub fn handle_presence(&mut self, change: &PresenceChange) {
        info!(
            "Headphones {}{} ({} outputs: {:?})",
            if change.connected { "connected" } else { "disconnected" },
            if change.initial { " (initial)" } else { "" },
            change.device_count,
            change.labels
        );
        if let Err(e) = self.store.set_headphones_connected(change.connected) {
            warn!("Failed to persist headphone state: {}", e);
        }
        self.reconcile();
    }

    /// Last-known presence as the store mirrors it.
    pub fn check_presence(&self) -> bool {
        self.store.state().headphones_connected
    }

    /// Recovery path after the audio host was torn down behind our back: the
    /// old graph is gone whatever the store says, so resynchronize and let
    /// the normal transition rule restart playback if it should be running.
    pub fn rearm(&mut self) {
        info!("Re-arming after host recovery");
        self.engine.stop();
        if let Err(e) = self.store.set_is_playing(false) {
            warn!("Failed to clear playing flag: {}", e);
        }
        self.reconcile();
    }

    /// Apply the transition rule to the current store state.
    pub fn reconcile(&mut self) {
        let s = self.store.state().clone();
        match next_action(s.enabled, s.headphones_connected, s.is_playing) {
            PlaybackAction::Start => {
                debug!("Auto-starting noise (headphones connected + enabled)");
                self.start_noise();
            }
            PlaybackAction::Stop => {
                debug!("Auto-stopping noise");
                self.stop_noise();
            }
            PlaybackAction::Hold => {
                self.update_indicator();
            }
        }
    }

    fn start_noise(&mut self) -> bool {
        let volume = self.store.state().volume;
        let started = match self.engine.start(volume) {
            Ok(()) => {
                if let Err(e) = self.store.set_is_playing(true) {
                    warn!("Failed to persist playing flag: {}", e);
                }
                true
            }
            Err(e) => {
                if e.is_recoverable() {
                    // Non-fatal: the supervisor's next probe cycle retries.
                    warn!("Failed to start noise: {} (will retry)", e);
                } else {
                    warn!("Failed to start noise: {} (user action required)", e);
                }
                false
            }
        };
        self.update_indicator();
        started
    }

    fn stop_noise(&mut self) {
        self.engine.stop();
        if let Err(e) = self.store.set_is_playing(false) {
            warn!("Failed to persist playing flag: {}", e);
        }
        self.update_indicator();
    }

    fn update_indicator(&mut self) {
        let s = self.store.state();
        let next = indicator(s.enabled, s.headphones_connected, s.is_playing);
        if next != self.indicator {
            info!("Indicator {:?} -> {:?}", self.indicator, next);
            self.indicator = next;
        }
    }

    /// Release the audio graph on shutdown without touching persisted intent.
    pub fn shutdown(&mut self) {
        self.engine.stop();
        if let Err(e) = self.store.set_is_playing(false) {
            warn!("Failed to clear playing flag on shutdown: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NoisefallError;
    use crate::store::StateStore;
    use tempfile::tempdir;

    #[derive(Default)]
    struct MockEngine {
        running: bool,
        starts: u32,
        stops: u32,
        volume: Option<u8>,
        fail_start: bool,
        deny_start: bool,
    }

    impl NoiseEngine for MockEngine {
        fn start(&mut self, volume: u8) -> Result<(), NoisefallError> {
            if self.fail_start {
                return Err(NoisefallError::HostUnavailable("mock host down".into()));
            }
            if self.deny_start {
                return Err(NoisefallError::PermissionDenied("mock denial".into()));
            }
            if !self.running {
                self.starts += 1;
                self.running = true;
            }
            self.volume = Some(volume);
            Ok(())
        }

        fn stop(&mut self) {
            if self.running {
                self.stops += 1;
                self.running = false;
            }
        }

        fn set_volume(&mut self, volume: u8) {
            if self.running {
                self.volume = Some(volume);
            }
        }

        fn is_running(&self) -> bool {
            self.running
        }
    }

    fn controller_in(dir: &tempfile::TempDir) -> PlaybackController<MockEngine> {
        let store = StateStore::open(dir.path().join("state.json"));
        PlaybackController::new(MockEngine::default(), store)
    }

    fn presence(connected: bool) -> PresenceChange {
        PresenceChange {
            connected,
            initial: false,
            device_count: 1,
            labels: vec!["Test Headphones".to_string()],
        }
    }

    #[test]
    fn test_scenario_enable_then_connect_then_disconnect() {
        let dir = tempdir().unwrap();
        let mut ctl = controller_in(&dir);
        assert_eq!(ctl.indicator(), IndicatorState::Off);

        ctl.set_enabled(true);
        assert_eq!(ctl.indicator(), IndicatorState::Waiting);
        assert_eq!(ctl.engine.starts, 0);

        ctl.handle_presence(&presence(true));
        assert!(ctl.is_playing());
        assert_eq!(ctl.indicator(), IndicatorState::Active);
        assert_eq!(ctl.engine.starts, 1);

        ctl.handle_presence(&presence(false));
        assert!(!ctl.is_playing());
        assert_eq!(ctl.indicator(), IndicatorState::Waiting);
        assert_eq!(ctl.engine.stops, 1);
    }

    #[test]
    fn test_duplicate_connected_events_do_not_double_start() {
        let dir = tempdir().unwrap();
        let mut ctl = controller_in(&dir);
        ctl.set_enabled(true);

        ctl.handle_presence(&presence(true));
        ctl.handle_presence(&presence(true));
        assert_eq!(ctl.engine.starts, 1);
    }

    #[test]
    fn test_disable_forces_stop_enable_does_not_force_start() {
        let dir = tempdir().unwrap();
        let mut ctl = controller_in(&dir);
        ctl.set_enabled(true);
        ctl.handle_presence(&presence(true));
        assert!(ctl.is_playing());

        ctl.set_enabled(false);
        assert!(!ctl.is_playing());
        assert_eq!(ctl.indicator(), IndicatorState::Off);

        // No presence now; re-enabling must not start.
        ctl.handle_presence(&presence(false));
        ctl.set_enabled(true);
        assert!(!ctl.is_playing());
        assert_eq!(ctl.engine.starts, 1);
    }

    #[test]
    fn test_manual_play_ignores_presence() {
        let dir = tempdir().unwrap();
        let mut ctl = controller_in(&dir);
        ctl.set_enabled(true);

        assert!(ctl.manual_play());
        assert!(ctl.is_playing());
        assert_eq!(ctl.indicator(), IndicatorState::Active);
    }

    #[test]
    fn test_manual_stop_ignores_everything() {
        let dir = tempdir().unwrap();
        let mut ctl = controller_in(&dir);
        ctl.set_enabled(true);
        ctl.handle_presence(&presence(true));
        assert!(ctl.is_playing());

        assert!(ctl.manual_stop());
        assert!(!ctl.is_playing());
    }

    #[test]
    fn test_volume_propagates_live_and_persists_for_next_start() {
        let dir = tempdir().unwrap();
        let mut ctl = controller_in(&dir);
        ctl.set_volume(30);
        ctl.set_enabled(true);
        ctl.handle_presence(&presence(true));
        assert_eq!(ctl.engine.volume, Some(30));

        ctl.set_volume(75);
        assert_eq!(ctl.engine.volume, Some(75));
    }

    #[test]
    fn test_failed_start_leaves_stopped_state() {
        let dir = tempdir().unwrap();
        let mut ctl = controller_in(&dir);
        ctl.engine.fail_start = true;
        ctl.set_enabled(true);
        ctl.handle_presence(&presence(true));

        assert!(!ctl.is_playing());
        // Presence is true, so the indicator still shows active interest.
        assert_eq!(ctl.indicator(), IndicatorState::Active);
    }

    #[test]
    fn test_unrecoverable_start_failure_leaves_stopped_state() {
        let dir = tempdir().unwrap();
        let mut ctl = controller_in(&dir);
        ctl.engine.deny_start = true;
        ctl.set_enabled(true);
        ctl.handle_presence(&presence(true));

        assert!(!ctl.is_playing());
        assert!(!ctl.engine.is_running());
    }

    #[test]
    fn test_rearm_restarts_when_conditions_hold() {
        let dir = tempdir().unwrap();
        let mut ctl = controller_in(&dir);
        ctl.set_enabled(true);
        ctl.handle_presence(&presence(true));
        assert_eq!(ctl.engine.starts, 1);

        // Host died behind our back; re-arm resynchronizes and restarts.
        ctl.engine.running = false;
        ctl.rearm();
        assert_eq!(ctl.engine.starts, 2);
        assert!(ctl.is_playing());
    }

    #[test]
    fn test_stale_playing_flag_on_startup_restarts_engine() {
        // An unclean shutdown can leave is_playing=true in the store while
        // the engine at next startup has no graph. Re-arming clears the
        // stale flag and restarts playback because conditions still hold.
        let dir = tempdir().unwrap();
        let mut store = StateStore::open(dir.path().join("state.json"));
        store.set_enabled(true).unwrap();
        store.set_headphones_connected(true).unwrap();
        store.set_is_playing(true).unwrap();

        let mut ctl = PlaybackController::new(MockEngine::default(), store);
        assert!(!ctl.engine.is_running());

        ctl.rearm();
        assert_eq!(ctl.engine.starts, 1);
        assert!(ctl.is_playing());
        assert!(ctl.engine.is_running());
    }

    #[test]
    fn test_stale_playing_flag_clears_when_conditions_do_not_hold() {
        let dir = tempdir().unwrap();
        let mut store = StateStore::open(dir.path().join("state.json"));
        store.set_enabled(true).unwrap();
        store.set_headphones_connected(false).unwrap();
        store.set_is_playing(true).unwrap();

        let mut ctl = PlaybackController::new(MockEngine::default(), store);
        ctl.rearm();
        assert_eq!(ctl.engine.starts, 0);
        assert!(!ctl.is_playing());
        assert_eq!(ctl.indicator(), IndicatorState::Waiting);
    }

    #[test]
    fn test_reconciliation_safety_across_all_states() {
        // After reconciliation, playing implies enabled and connected for
        // every reachable combination.
        for enabled in [false, true] {
            for connected in [false, true] {
                for playing in [false, true] {
                    let dir = tempdir().unwrap();
                    let mut store = StateStore::open(dir.path().join("state.json"));
                    store.set_enabled(enabled).unwrap();
                    store.set_headphones_connected(connected).unwrap();
                    store.set_is_playing(playing).unwrap();

                    let engine = MockEngine {
                        running: playing,
                        ..MockEngine::default()
                    };
                    let mut ctl = PlaybackController::new(engine, store);
                    ctl.reconcile();

                    if ctl.is_playing() {
                        assert!(enabled, "playing while disabled after reconcile");
                        assert!(connected, "playing without presence after reconcile");
                    }
                }
            }
        }
    }

    #[test]
    fn test_indicator_table() {
        assert_eq!(indicator(false, false, false), IndicatorState::Off);
        assert_eq!(indicator(false, true, true), IndicatorState::Off);
        assert_eq!(indicator(true, false, false), IndicatorState::Waiting);
        assert_eq!(indicator(true, true, false), IndicatorState::Active);
        assert_eq!(indicator(true, false, true), IndicatorState::Active);
        assert_eq!(indicator(true, true, true), IndicatorState::Active);
    }

    #[test]
    fn test_action_table() {
        assert_eq!(next_action(true, true, false), PlaybackAction::Start);
        assert_eq!(next_action(true, true, true), PlaybackAction::Hold);
        assert_eq!(next_action(true, false, true), PlaybackAction::Stop);
        assert_eq!(next_action(false, true, true), PlaybackAction::Stop);
        assert_eq!(next_action(false, false, false), PlaybackAction::Hold);
        assert_eq!(next_action(true, false, false), PlaybackAction::Hold);
    }
}
