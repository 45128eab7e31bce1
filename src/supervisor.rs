// Keeps the audio host context alive, tolerating the environment tearing it
// down behind our back.
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait};
use log::{debug, info, warn};

use crate::error::NoisefallError;

/// Settling delay between closing an old host context and creating the new
/// one (the rebuilt context needs it to pick up fresh device labels after a
/// permission grant).
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Default liveness probe interval.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(10);

/// Probe seam over the real audio host so supervisor logic is testable.
pub trait HostProbe: Send {
    /// Is a usable host context currently present?
    fn host_exists(&self) -> bool;
    /// Create (validate) a fresh host context.
    fn create(&mut self) -> Result<(), NoisefallError>;
    /// Tear down any existing context, ignoring errors if already gone.
    fn close(&mut self);
}

/// The default cpal host. Creation validates that an output sink is
/// reachable; the live graph itself is owned and released by the
/// synthesizer, so close has nothing extra to tear down.
pub struct CpalHostProbe;

impl HostProbe for CpalHostProbe {
    fn host_exists(&self) -> bool {
        cpal::default_host().default_output_device().is_some()
    }

    fn create(&mut self) -> Result<(), NoisefallError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| NoisefallError::HostUnavailable("no default output device".into()))?;
        let name = device.name().unwrap_or_else(|_| "(unnamed)".to_string());
        info!("Audio host ready, default output: {}", name);
        Ok(())
    }

    fn close(&mut self) {}
}

/// Owns the readiness flag for the audio host. All calls happen on the
/// single controller event loop, which is the single-writer discipline that
/// keeps `ensure` from ever creating duplicate contexts.
pub struct HostSupervisor<P: HostProbe> {
    probe: P,
    ready: bool,
}

impl<P: HostProbe> HostSupervisor<P> {
    pub fn new(probe: P) -> Self {
        Self {
            probe,
            ready: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Create the host context if none exists. Idempotent: a no-op while the
    /// readiness flag is set.
    pub fn ensure(&mut self) {
        if self.ready {
            debug!("Audio host already exists");
            return;
        }
        match self.probe.create() {
            Ok(()) => self.ready = true,
            Err(e) => warn!("Failed to create audio host: {}", e),
        }
    }

    /// Close any existing context, wait for things to settle, then ensure a
    /// fresh one. Used after a permission grant so the new context sees the
    /// newly available device labels.
    pub async fn recreate(&mut self) {
        info!("Recreating audio host");
        self.probe.close();
        self.ready = false;
        tokio::time::sleep(SETTLE_DELAY).await;
        self.ensure();
    }

    /// One liveness-probe tick. Returns true when the controller should
    /// re-arm: either the host just died and was recreated, or a previously
    /// failed creation finally succeeded. At most one `ensure` per tick.
    pub fn tick(&mut self) -> bool {
        if self.ready {
            if self.probe.host_exists() {
                return false;
            }
            warn!("Audio host died, recreating");
            self.ready = false;
        }
        self.ensure();
        self.ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockProbe {
        exists: bool,
        create_ok: bool,
        creates: u32,
        closes: u32,
    }

    impl MockProbe {
        fn new() -> Self {
            Self {
                exists: true,
                create_ok: true,
                creates: 0,
                closes: 0,
            }
        }
    }

    impl HostProbe for MockProbe {
        fn host_exists(&self) -> bool {
            self.exists
        }

        fn create(&mut self) -> Result<(), NoisefallError> {
            self.creates += 1;
            if self.create_ok {
                Ok(())
            } else {
                Err(NoisefallError::HostUnavailable("mock".into()))
            }
        }

        fn close(&mut self) {
            self.closes += 1;
        }
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let mut sup = HostSupervisor::new(MockProbe::new());
        sup.ensure();
        sup.ensure();
        sup.ensure();
        assert!(sup.is_ready());
        assert_eq!(sup.probe.creates, 1);
    }

    #[test]
    fn test_probe_tick_is_quiet_while_healthy() {
        let mut sup = HostSupervisor::new(MockProbe::new());
        sup.ensure();
        let creates = sup.probe.creates;
        assert!(!sup.tick());
        assert!(!sup.tick());
        assert_eq!(sup.probe.creates, creates);
    }

    #[test]
    fn test_host_death_triggers_exactly_one_ensure_per_tick() {
        let mut sup = HostSupervisor::new(MockProbe::new());
        sup.ensure();
        assert_eq!(sup.probe.creates, 1);

        sup.probe.exists = false;
        assert!(sup.tick(), "re-arm expected after recreation");
        assert_eq!(sup.probe.creates, 2);
    }

    #[test]
    fn test_failed_recreation_retries_once_per_tick_until_up() {
        let mut sup = HostSupervisor::new(MockProbe::new());
        sup.ensure();

        sup.probe.exists = false;
        sup.probe.create_ok = false;
        assert!(!sup.tick());
        assert!(!sup.tick());
        assert_eq!(sup.probe.creates, 3); // initial + one per tick

        sup.probe.create_ok = true;
        sup.probe.exists = true;
        assert!(sup.tick(), "re-arm expected once the host comes back");
        assert!(sup.is_ready());
    }

    #[tokio::test]
    async fn test_recreate_closes_then_creates() {
        let mut sup = HostSupervisor::new(MockProbe::new());
        sup.ensure();

        sup.recreate().await;
        assert!(sup.is_ready());
        assert_eq!(sup.probe.closes, 1);
        assert_eq!(sup.probe.creates, 2);
    }
}
