use color_eyre::{eyre::eyre, Result};
use printlink::config::{ClientConfig, LoggingConfig};
use printlink::logging::build_dispatch;
use printlink::{commands, DeviceStatus, PrinterClient, SessionState};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(ClientConfig::default_path);
    let config = ClientConfig::load(&path).await?;
    setup_logging_env(&config.logging)?;
    info!("Loaded configuration from {}", path.display());

    let mut client = PrinterClient::new(config).with_status_callback(print_status);
    let runner = client.config().runner.clone();

    info!("Starting MQTT client");
    client.start().await;

    if let Err(e) = wait_connected(&client, Duration::from_secs(runner.connect_wait_secs)).await {
        client.stop().await;
        return Err(e);
    }

    if !client.publish(commands::START_PUSH).await {
        warn!("Failed to request status streaming");
    }

    let interval = Duration::from_secs(runner.pushall_interval_secs.max(1));
    let mut pushall = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Program interrupted by user");
                break;
            }
            _ = pushall.tick() => {
                if !client.is_connected() {
                    warn!("Connection lost, state {:?}", client.session_state());
                    break;
                }
                client.publish(commands::PUSH_ALL).await;
            }
        }
    }

    client.stop().await;
    Ok(())
}

/// Polls once per second until connected, giving up on `Error` or timeout.
async fn wait_connected(client: &PrinterClient, limit: Duration) -> Result<()> {
    let mut waited = Duration::ZERO;
    while !client.is_connected() {
        if client.session_state() == SessionState::Error {
            return Err(eyre!("Connection to printer failed"));
        }
        if waited >= limit {
            return Err(eyre!("Timeout waiting for connection after {:?}", limit));
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        waited += Duration::from_secs(1);
    }
    info!("Connected to printer");
    Ok(())
}

fn print_status(status: &DeviceStatus) {
    info!(
        "Nozzle {:.1}°C | Bed {:.1}°C | WiFi {} | {} #{}",
        status.nozzle_temper,
        status.bed_temper,
        status.wifi_signal,
        status.command,
        status.sequence_id
    );
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    Ok(())
}

fn setup_logging_env(config: &LoggingConfig) -> Result<()> {
    tracing::dispatcher::set_global_default(build_dispatch(config)?)?;
    Ok(())
}
