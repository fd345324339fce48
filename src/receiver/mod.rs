//! Everything that talks to the StingrayTV receiver: the HTTP client with
//! retries, the short-lived state cache in front of it, and discovery.

mod cache;
mod client;
mod discovery;
mod service;
mod types;

pub use client::{DeviceClient, DeviceError, HttpTransport, RetryPolicy, Transport};
pub use discovery::{DiscoveryConfig, discover};
pub use service::Receiver;

#[cfg(test)]
pub use client::testing;

pub const VOLUME_MIN: i64 = 0;
pub const VOLUME_MAX: i64 = 20;
pub const CHANNEL_MIN: i64 = 0;
pub const CHANNEL_MAX: i64 = 9999;
