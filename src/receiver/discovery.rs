use super::client::Transport;
use super::types::DeviceDescriptor;
use mdns_sd::{ServiceDaemon, ServiceEvent};
use reqwest::Method;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;

/// mDNS service type the receivers announce their remote-control API under
pub const SERVICE_TYPE: &str = "_stingray-remote._tcp.local.";

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// tried before falling back to mDNS
    pub receiver_ip: Option<String>,
    pub receiver_port: u16,
    /// how long to wait for an mDNS answer
    pub timeout: Duration,
}

/// GET /receiver-info. Model and serial are what make it a receiver;
/// the rest is informational.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiverInfo {
    user_friendly_model_name: String,
    serial_number: String,
    #[serde(default)]
    hardware_id: String,
    #[serde(default)]
    software_version: String,
}

/// Finds the receiver once at startup. The configured address wins if it
/// answers; otherwise the first mDNS-announced receiver that validates is used.
pub async fn discover(config: &DiscoveryConfig, transport: &dyn Transport) -> Option<DeviceDescriptor> {
    if let Some(ip) = config.receiver_ip.as_deref().filter(|ip| !ip.trim().is_empty()) {
        tracing::debug!(
            "Using configured receiver address {}:{}",
            ip,
            config.receiver_port
        );
        if let Some(device) = probe(transport, ip.trim(), config.receiver_port).await {
            tracing::info!("Found receiver at configured address: {}", device.base_url);
            return Some(device);
        }
        tracing::warn!("Configured receiver did not answer, trying mDNS");
    }

    match browse_mdns(transport, config.timeout).await {
        Ok(Some(device)) => {
            tracing::info!("Discovered receiver via mDNS: {}", device.base_url);
            Some(device)
        }
        Ok(None) => {
            tracing::warn!(
                "No StingrayTV receiver found via mDNS within {:?}",
                config.timeout
            );
            None
        }
        Err(e) => {
            tracing::error!("mDNS discovery failed: {:#}", e);
            None
        }
    }
}

async fn browse_mdns(
    transport: &dyn Transport,
    timeout: Duration,
) -> anyhow::Result<Option<DeviceDescriptor>> {
    tracing::info!("Starting mDNS discovery for {}", SERVICE_TYPE);

    let daemon = ServiceDaemon::new()
        .map_err(|e| anyhow::anyhow!("failed to create mDNS daemon: {e}"))?;
    let events = daemon
        .browse(SERVICE_TYPE)
        .map_err(|e| anyhow::anyhow!("failed to browse {SERVICE_TYPE}: {e}"))?;

    let search = async {
        while let Ok(event) = events.recv_async().await {
            match event {
                ServiceEvent::ServiceResolved(info) => {
                    tracing::debug!(
                        "Service resolved: {} port {}",
                        info.get_fullname(),
                        info.get_port()
                    );
                    for addr in info.get_addresses() {
                        if let Some(device) = probe(transport, &addr.to_string(), info.get_port()).await
                        {
                            return Some(device);
                        }
                    }
                }
                ServiceEvent::ServiceRemoved(_, fullname) => {
                    tracing::debug!("Service removed: {}", fullname);
                }
                _ => {}
            }
        }
        None
    };

    let found = tokio::time::timeout(timeout, search).await.ok().flatten();

    if let Err(e) = daemon.shutdown() {
        tracing::debug!("mDNS daemon shutdown: {}", e);
    }
    Ok(found)
}

/// Asks `host:port` for its receiver-info. Any failure, including a body
/// without model or serial, means "not a receiver".
pub async fn probe(transport: &dyn Transport, host: &str, port: u16) -> Option<DeviceDescriptor> {
    let base_url = base_url_for(host, port);
    let url = format!("{}/receiver-info", base_url);
    tracing::debug!("Checking receiver at {}", url);

    let value = match transport.send(Method::GET, &url, None).await {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("No receiver at {}: {}", base_url, e);
            return None;
        }
    };

    match serde_json::from_value::<ReceiverInfo>(value) {
        Ok(info) => Some(DeviceDescriptor {
            base_url,
            model: info.user_friendly_model_name,
            serial_number: info.serial_number,
            hardware_id: info.hardware_id,
            software_version: info.software_version,
        }),
        Err(e) => {
            tracing::warn!("{} returned an invalid receiver-info: {}", base_url, e);
            None
        }
    }
}

fn base_url_for(host: &str, port: u16) -> String {
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => format!("http://[{}]:{}/v1.6", v6, port),
        _ => format!("http://{}:{}/v1.6", host, port),
    }
}
