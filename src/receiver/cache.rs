use super::client::DeviceClient;
use super::types::{ChannelState, PowerState, VolumeState};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// how long a read from the receiver is trusted
pub const STATE_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct CachedState<T> {
    pub value: T,
    pub observed_at: Instant,
}

/// One cached value. The lock is held from the freshness check until the
/// new value is stored, so concurrent readers queue behind a single fetch
/// instead of each hitting the receiver.
struct Slot<T> {
    entry: Mutex<Option<CachedState<T>>>,
}

impl<T: Clone> Slot<T> {
    fn new() -> Self {
        Self {
            entry: Mutex::new(None),
        }
    }

    async fn get_or_fetch<F, Fut>(&self, ttl: Duration, fetch: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut entry = self.entry.lock().await;

        if let Some(cached) = entry.as_ref() {
            if cached.observed_at.elapsed() < ttl {
                return cached.value.clone();
            }
        }

        let value = fetch().await;
        *entry = Some(CachedState {
            value: value.clone(),
            observed_at: Instant::now(),
        });
        value
    }
}

/// Short-lived cache of power, volume and channel, each expiring on its own.
///
/// Failed fetches are cached as their offline/default value as well, so a
/// receiver that is switched off at the wall gets asked at most once per TTL.
/// Writes go straight to the receiver and leave the cache alone; the platform
/// re-queries after actions anyway.
pub struct StateCache {
    client: DeviceClient,
    ttl: Duration,
    power: Slot<PowerState>,
    volume: Slot<VolumeState>,
    channel: Slot<ChannelState>,
}

impl StateCache {
    pub fn new(client: DeviceClient) -> Self {
        Self::with_ttl(client, STATE_TTL)
    }

    pub fn with_ttl(client: DeviceClient, ttl: Duration) -> Self {
        Self {
            client,
            ttl,
            power: Slot::new(),
            volume: Slot::new(),
            channel: Slot::new(),
        }
    }

    pub async fn power(&self) -> PowerState {
        self.power
            .get_or_fetch(self.ttl, || async {
                match self.client.get::<PowerState>("/power").await {
                    Ok(state) if !state.state.is_empty() => {
                        tracing::debug!("Retrieved power state: {}", state.state);
                        state
                    }
                    Ok(_) => {
                        tracing::warn!("Empty power state from receiver, assuming offline");
                        PowerState::offline()
                    }
                    Err(e) => {
                        tracing::warn!("Power state unavailable, assuming offline: {}", e);
                        PowerState::offline()
                    }
                }
            })
            .await
    }

    pub async fn volume(&self) -> VolumeState {
        self.volume
            .get_or_fetch(self.ttl, || async {
                self.client
                    .get::<VolumeState>("/volume")
                    .await
                    .unwrap_or_else(|e| {
                        tracing::warn!("Volume state unavailable, defaulting to 0: {}", e);
                        VolumeState::default()
                    })
            })
            .await
    }

    pub async fn channel(&self) -> ChannelState {
        self.channel
            .get_or_fetch(self.ttl, || async {
                self.client
                    .get::<ChannelState>("/channels/current")
                    .await
                    .unwrap_or_else(|e| {
                        tracing::warn!("Current channel unavailable, defaulting to 0: {}", e);
                        ChannelState::default()
                    })
            })
            .await
    }
}
