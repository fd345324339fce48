mod auth;
mod receiver;
mod server;
mod smarthome;

use anyhow::{Result, bail};
use auth::{AuthConfig, ClientConfig, TokenIssuer};
use clap::Parser;
use receiver::{DeviceClient, DiscoveryConfig, HttpTransport, Receiver, RetryPolicy, Transport};
use smarthome::{CommandGateway, DeviceProfile};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// HS256 keys shorter than this are trivially brute-forced
const MIN_SECRET_LEN: usize = 32;

#[derive(Parser, Debug)]
#[command(name = "stingray-alice")]
#[command(about = "smart home bridge for StingrayTV receivers, with OAuth account linking")]
struct Args {
    /// Host to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to bind to
    #[arg(short, long, env = "PORT", default_value = "8080")]
    port: u16,

    /// JWT signing secret, at least 32 bytes
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    jwt_secret: String,

    /// Access token lifetime in seconds (refresh tokens live a week of these)
    #[arg(long, env = "JWT_EXPIRES_IN", default_value = "3600")]
    jwt_expires_in: u64,

    /// Allowed OAuth client as client_id=redirect_uri[,redirect_uri...]
    /// (repeat the flag, or separate with ';' in the env var).
    /// With none configured every client and redirect is accepted.
    #[arg(long = "oauth-client", env = "OAUTH_CLIENTS", value_delimiter = ';')]
    oauth_clients: Vec<ClientConfig>,

    /// Receiver address to try before mDNS discovery
    #[arg(long, env = "RECEIVER_IP")]
    receiver_ip: Option<String>,

    /// Receiver REST API port
    #[arg(long, env = "RECEIVER_PORT", default_value = "8090")]
    receiver_port: u16,

    /// Device description shown in the smart home app
    #[arg(long, env = "DEVICE_DESCRIPTION", default_value = "StingrayTV receiver")]
    device_description: String,

    /// Room the device is placed in
    #[arg(long, env = "ROOM", default_value = "Living room")]
    room: String,

    /// Seconds to wait for an mDNS answer
    #[arg(long, env = "DISCOVERY_TIMEOUT", default_value = "5")]
    discovery_timeout: u64,

    #[arg(long, env = "CONNECT_TIMEOUT_MS", default_value = "5000")]
    connect_timeout_ms: u64,

    #[arg(long, env = "READ_TIMEOUT_MS", default_value = "10000")]
    read_timeout_ms: u64,

    /// Attempts per receiver call, the first one included
    #[arg(long, env = "RETRY_MAX_ATTEMPTS", default_value = "3")]
    retry_max_attempts: u32,

    /// Backoff after the first failed attempt, doubled each time after
    #[arg(long, env = "RETRY_INITIAL_DELAY_MS", default_value = "100")]
    retry_initial_delay_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stingray_alice=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if args.jwt_secret.len() < MIN_SECRET_LEN {
        bail!(
            "JWT_SECRET must be at least {} bytes, got {}",
            MIN_SECRET_LEN,
            args.jwt_secret.len()
        );
    }

    let issuer = Arc::new(TokenIssuer::new(&AuthConfig {
        jwt_secret: args.jwt_secret.clone(),
        expires_in: args.jwt_expires_in,
        clients: args.oauth_clients.clone(),
    }));

    let gateway = Arc::new(CommandGateway::new(
        connect_receiver(&args).await?,
        DeviceProfile {
            description: args.device_description.clone(),
            room: args.room.clone(),
        },
    ));

    let shutdown = CancellationToken::new();
    let app = server::build_router(issuer, gateway, shutdown.clone())?;

    // we pass this to TcpListener::bind() which accepts ToSocketAddrs,
    // so hostnames like "localhost" resolve too
    let bind_addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on http://{}", bind_addr);
    tracing::info!("OAuth endpoints under /oauth, smart home API under /v1.0");

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    // connect info gives the rate limiter a peer ip when there are no proxy headers
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Finds the receiver and wraps it in a client. Not finding one is not fatal:
/// the server still starts so account linking works, and device calls
/// answer NOT_FOUND until it is restarted with the receiver reachable.
async fn connect_receiver(args: &Args) -> Result<Option<Receiver>> {
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(
        Duration::from_millis(args.connect_timeout_ms),
        Duration::from_millis(args.read_timeout_ms),
    )?);

    let discovery = DiscoveryConfig {
        receiver_ip: args.receiver_ip.clone(),
        receiver_port: args.receiver_port,
        timeout: Duration::from_secs(args.discovery_timeout),
    };

    let Some(descriptor) = receiver::discover(&discovery, transport.as_ref()).await else {
        tracing::warn!("No StingrayTV receiver found, smart home requests will report it missing");
        return Ok(None);
    };

    tracing::info!(
        "Using receiver {} (serial {}, software {}) at {}",
        descriptor.model,
        descriptor.serial_number,
        descriptor.software_version,
        descriptor.base_url
    );

    let retry = RetryPolicy {
        max_attempts: args.retry_max_attempts,
        initial_delay: Duration::from_millis(args.retry_initial_delay_ms),
    };
    let client = DeviceClient::new(transport, &descriptor.base_url, retry);
    Ok(Some(Receiver::new(descriptor, client)))
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
