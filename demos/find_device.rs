//! Scan for the HDROP sensor and print what was found
//!
//! Run with: cargo run --example find_device

use hdrop_ble::{ClientConfig, DeviceManager, Result};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("hdrop_ble=debug")),
        )
        .init();

    let config = ClientConfig::default().with_scan_timeout(Duration::from_secs(15));
    println!("Scanning for {}...", config.device_name);

    let manager = DeviceManager::with_config(config).await?;
    let device = manager.find_device().await?;

    println!("Found device: {}", device.local_name());
    println!("  Identifier: {}", device.identifier());
    match device.rssi() {
        Some(rssi) => println!("  RSSI: {} dBm", rssi),
        None => println!("  RSSI: unknown"),
    }

    manager.shutdown().await?;
    Ok(())
}
