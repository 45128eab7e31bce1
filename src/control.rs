// Control protocol: the external message surface and the handle used to
// drive the event loop.
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::devices::PresenceChange;
use crate::error::NoisefallError;

/// Wire form of a user/UI command. Tags match the message strings of the
/// settings UI protocol.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandPayload {
    SetEnabled {
        enabled: bool,
    },
    SetVolume {
        volume: u8,
    },
    ManualPlay,
    ManualStop,
    HeadphonesChanged {
        connected: bool,
        #[serde(default)]
        initial: bool,
        #[serde(default)]
        device_count: Option<usize>,
        #[serde(default)]
        labels: Option<Vec<String>>,
    },
    PermissionGranted,
    CheckHeadphones,
}

/// Wire form of a reply, for the commands that have one.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ReplyBody {
    Ack { success: bool },
    Presence { connected: bool },
}

/// In-process command with its reply channel where the protocol defines one.
#[derive(Debug)]
pub enum Command {
    SetEnabled { enabled: bool },
    SetVolume { volume: u8 },
    ManualPlay { reply: oneshot::Sender<bool> },
    ManualStop { reply: oneshot::Sender<bool> },
    HeadphonesChanged { change: PresenceChange },
    PermissionGranted { reply: oneshot::Sender<bool> },
    CheckHeadphones { reply: oneshot::Sender<bool> },
}

/// Cloneable sender half of the control channel. Delivery failures are
/// reported as `MessageDeliveryFailed`, never panics: a missing event loop
/// degrades to "state stays stale until the next trigger".
#[derive(Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<Command>,
}

impl ControlHandle {
    pub fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    async fn send(&self, command: Command) -> Result<(), NoisefallError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| NoisefallError::MessageDeliveryFailed("control loop not running".into()))
    }

    async fn send_with_reply(
        &self,
        make: impl FnOnce(oneshot::Sender<bool>) -> Command,
    ) -> Result<bool, NoisefallError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(make(reply_tx)).await?;
        reply_rx
            .await
            .map_err(|_| NoisefallError::MessageDeliveryFailed("reply channel closed".into()))
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<(), NoisefallError> {
        self.send(Command::SetEnabled { enabled }).await
    }

    pub async fn set_volume(&self, volume: u8) -> Result<(), NoisefallError> {
        self.send(Command::SetVolume { volume }).await
    }

    pub async fn manual_play(&self) -> Result<bool, NoisefallError> {
        self.send_with_reply(|reply| Command::ManualPlay { reply }).await
    }

    pub async fn manual_stop(&self) -> Result<bool, NoisefallError> {
        self.send_with_reply(|reply| Command::ManualStop { reply }).await
    }

    pub async fn permission_granted(&self) -> Result<bool, NoisefallError> {
        self.send_with_reply(|reply| Command::PermissionGranted { reply })
            .await
    }

    pub async fn check_headphones(&self) -> Result<bool, NoisefallError> {
        self.send_with_reply(|reply| Command::CheckHeadphones { reply })
            .await
    }

    /// Run one wire command and produce its wire reply (None for the
    /// fire-and-forget messages).
    pub async fn dispatch(
        &self,
        payload: CommandPayload,
    ) -> Result<Option<ReplyBody>, NoisefallError> {
        match payload {
            CommandPayload::SetEnabled { enabled } => {
                self.set_enabled(enabled).await?;
                Ok(None)
            }
            CommandPayload::SetVolume { volume } => {
                self.set_volume(volume).await?;
                Ok(None)
            }
            CommandPayload::ManualPlay => {
                let success = self.manual_play().await?;
                Ok(Some(ReplyBody::Ack { success }))
            }
            CommandPayload::ManualStop => {
                let success = self.manual_stop().await?;
                Ok(Some(ReplyBody::Ack { success }))
            }
            CommandPayload::HeadphonesChanged {
                connected,
                initial,
                device_count,
                labels,
            } => {
                self.send(Command::HeadphonesChanged {
                    change: PresenceChange {
                        connected,
                        initial,
                        device_count: device_count.unwrap_or(0),
                        labels: labels.unwrap_or_default(),
                    },
                })
                .await?;
                Ok(None)
            }
            CommandPayload::PermissionGranted => {
                let success = self.permission_granted().await?;
                Ok(Some(ReplyBody::Ack { success }))
            }
            CommandPayload::CheckHeadphones => {
                let connected = self.check_headphones().await?;
                Ok(Some(ReplyBody::Presence { connected }))
            }
        }
    }
}
