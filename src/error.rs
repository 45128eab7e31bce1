use thiserror::Error;

/// Errors surfaced by the playback core. None of these are fatal to the
/// process: every failure path degrades to "noise stays stopped" plus a log
/// line, and recovery happens through the supervisor's probe cycle or the
/// next natural trigger.
#[derive(Debug, Error)]
pub enum NoisefallError {
    /// The audio host could not be created or the output graph could not be
    /// built. Left for the supervisor's next ensure/probe cycle.
    #[error("audio host unavailable: {0}")]
    HostUnavailable(String),

    /// Device enumeration or label access was refused by the platform.
    /// Surfaced to the user as retryable; playback state is untouched.
    #[error("device access permission denied: {0}")]
    PermissionDenied(String),

    /// A cross-component message could not be delivered (receiving end not
    /// running). Logged, never retried inline; the next poll or user action
    /// re-synchronizes state.
    #[error("message delivery failed: {0}")]
    MessageDeliveryFailed(String),
}

impl NoisefallError {
    /// Check if the error clears on its own through an interval-driven path
    /// (as opposed to requiring a user action such as granting permission).
    pub fn is_recoverable(&self) -> bool {
        match self {
            NoisefallError::HostUnavailable(_) => true,
            NoisefallError::MessageDeliveryFailed(_) => true,
            NoisefallError::PermissionDenied(_) => false,
        }
    }
}
