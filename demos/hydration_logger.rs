//! Stream hydration and temperature readings, then save them to a log file
//!
//! Run with: cargo run --example hydration_logger -- [LOG_DIR]
//!
//! Readings are printed as they arrive. On Ctrl+C the accumulated log is
//! appended to `LOG_DIR/log-<date>-<time>.txt` (current directory by default).

use chrono::Local;
use hdrop_ble::{drain_readings, DeviceManager, LogSink, ReadingSink, Result};
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("warn").init();

    let log_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    println!("HDROP Logger");
    println!("============\n");

    let manager = DeviceManager::new().await?;
    let device = manager.connect().await?;

    println!("Connected to {}. Press Ctrl+C to save and exit.\n", device.local_name());

    let sink = LogSink::new();
    let mut readings = device.subscribe_readings();

    let _printer = device.on_reading(|reading| println!("{}", reading));

    let mut connection = device.subscribe_connection();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            reading = readings.recv() => {
                match reading {
                    Ok(reading) => sink.record(&reading).await?,
                    Err(RecvError::Lagged(skipped)) => {
                        eprintln!("Logger fell behind, {} readings lost", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            event = connection.recv() => {
                match event {
                    Ok(event) if !event.state.is_connected() && !event.state.is_transitioning() => {
                        println!("\nDevice disconnected");
                        break;
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        }
    }

    manager.shutdown().await?;

    // Readings that arrived before the sensors went off are still queued.
    drain_readings(&mut readings, &sink).await?;

    let log = sink.snapshot();
    if log.is_empty() {
        println!("\nNo readings received, nothing saved.");
    } else {
        let path = log.save_to_dir(&log_dir, &Local::now()).await?;
        println!("\nSaved {} lines to {}", log.line_count(), path.display());
    }

    Ok(())
}
