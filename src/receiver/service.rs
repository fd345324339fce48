use super::cache::StateCache;
use super::client::{DeviceClient, DeviceError};
use super::types::{ChannelState, DeviceDescriptor, PowerState, VolumeState};
use super::{CHANNEL_MIN, VOLUME_MAX, VOLUME_MIN};
use serde_json::json;

/// The one receiver this gateway controls. Reads are served from the state
/// cache, writes go straight to the device.
pub struct Receiver {
    descriptor: DeviceDescriptor,
    client: DeviceClient,
    cache: StateCache,
}

impl Receiver {
    pub fn new(descriptor: DeviceDescriptor, client: DeviceClient) -> Self {
        let cache = StateCache::new(client.clone());
        Self {
            descriptor,
            client,
            cache,
        }
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub async fn power(&self) -> PowerState {
        self.cache.power().await
    }

    pub async fn volume(&self) -> VolumeState {
        self.cache.volume().await
    }

    pub async fn current_channel(&self) -> ChannelState {
        self.cache.channel().await
    }

    pub async fn set_power(&self, on: bool) -> Result<(), DeviceError> {
        let state = if on { "on" } else { "off" };
        tracing::info!("Setting receiver power to {}", state);
        self.client.put("/power", &json!({ "state": state })).await
    }

    pub async fn set_volume(&self, volume: i64) -> Result<(), DeviceError> {
        if !(VOLUME_MIN..=VOLUME_MAX).contains(&volume) {
            return Err(DeviceError::Validation(format!(
                "Volume must be between {} and {}, got {}",
                VOLUME_MIN, VOLUME_MAX, volume
            )));
        }

        tracing::info!("Setting receiver volume to {}", volume);
        self.client.put("/volume", &json!({ "state": volume })).await
    }

    /// Switches to `channel` in whatever channel list is currently active.
    /// Numbers above the platform range are passed through; the receiver
    /// decides whether they exist.
    pub async fn change_channel(&self, channel: i64) -> Result<(), DeviceError> {
        if channel < CHANNEL_MIN {
            return Err(DeviceError::Validation(format!(
                "Channel number must not be negative, got {}",
                channel
            )));
        }

        let current = self.cache.channel().await;
        tracing::info!(
            "Changing channel to {} in list {}",
            channel,
            current.channel_list_id
        );

        let target = ChannelState {
            channel_number: channel,
            channel_list_id: current.channel_list_id,
        };
        self.client.put("/channels/current", &target).await
    }

    pub async fn mute(&self) -> Result<(), DeviceError> {
        self.press_key("Volume Mute").await
    }

    pub async fn pause(&self) -> Result<(), DeviceError> {
        self.press_key("Pause").await
    }

    async fn press_key(&self, key: &str) -> Result<(), DeviceError> {
        tracing::info!("Sending key press: {}", key);
        self.client.post("/input/events", &json!({ "key": key })).await
    }
}
