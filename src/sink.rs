//! Reading sinks.
//!
//! A sink is where decoded readings end up: a text log, an application
//! channel, or anything else implementing [`ReadingSink`].

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::data::{Reading, ReadingLog};
use crate::error::{Error, Result};

/// Destination for decoded readings.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReadingSink: Send + Sync {
    /// Record one reading.
    async fn record(&self, reading: &Reading) -> Result<()>;
}

/// Sink that accumulates readings into a shared [`ReadingLog`].
#[derive(Debug, Clone, Default)]
pub struct LogSink {
    log: Arc<RwLock<ReadingLog>>,
}

impl LogSink {
    /// Create a sink with an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a copy of the current log.
    pub fn snapshot(&self) -> ReadingLog {
        self.log.read().clone()
    }

    /// Access the shared log.
    pub fn log(&self) -> Arc<RwLock<ReadingLog>> {
        self.log.clone()
    }
}

#[async_trait]
impl ReadingSink for LogSink {
    async fn record(&self, reading: &Reading) -> Result<()> {
        self.log.write().push(reading);
        Ok(())
    }
}

/// Sink that forwards readings into a tokio mpsc channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Reading>,
}

impl ChannelSink {
    /// Wrap a sender.
    pub fn new(tx: mpsc::Sender<Reading>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl ReadingSink for ChannelSink {
    async fn record(&self, reading: &Reading) -> Result<()> {
        self.tx
            .send(reading.clone())
            .await
            .map_err(|_| Error::SinkClosed)
    }
}

/// Drain a reading subscription into a sink until the sender side closes.
///
/// Lagged receivers skip the dropped readings and continue. A sink error
/// stops forwarding and is returned.
pub async fn forward_readings<S>(mut rx: broadcast::Receiver<Reading>, sink: &S) -> Result<()>
where
    S: ReadingSink + ?Sized,
{
    loop {
        match rx.recv().await {
            Ok(reading) => sink.record(&reading).await?,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Reading sink lagged, {} readings dropped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("Reading stream closed");
                return Ok(());
            }
        }
    }
}

/// Record every reading already queued on `rx` without waiting for more.
///
/// Used after the device has stopped so that readings received before the
/// shutdown still reach the sink. Returns the number of readings recorded.
pub async fn drain_readings<S>(rx: &mut broadcast::Receiver<Reading>, sink: &S) -> Result<usize>
where
    S: ReadingSink + ?Sized,
{
    let mut recorded = 0;
    loop {
        match rx.try_recv() {
            Ok(reading) => {
                sink.record(&reading).await?;
                recorded += 1;
            }
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                warn!("Reading sink lagged, {} readings dropped", skipped);
            }
            Err(broadcast::error::TryRecvError::Empty)
            | Err(broadcast::error::TryRecvError::Closed) => return Ok(recorded),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Channel;
    use chrono::{Local, TimeZone};

    fn reading(channel: Channel, raw: f64) -> Reading {
        Reading::new(
            Local.with_ymd_and_hms(2019, 4, 15, 10, 30, 5).unwrap(),
            channel,
            raw,
        )
    }

    #[tokio::test]
    async fn test_log_sink_records() {
        let sink = LogSink::new();
        sink.record(&reading(Channel::Hydration, 1128.0)).await.unwrap();
        sink.record(&reading(Channel::Temperature, 0.0)).await.unwrap();

        assert_eq!(sink.snapshot().as_str(), "2019-04-15 10:30:05, 1128, 0");
    }

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (tx, mut rx) = mpsc::channel(4);
        let sink = ChannelSink::new(tx);

        sink.record(&reading(Channel::Hydration, 7.0)).await.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.value, 7.0);
    }

    #[tokio::test]
    async fn test_channel_sink_closed() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sink = ChannelSink::new(tx);

        let result = sink.record(&reading(Channel::Hydration, 1.0)).await;
        assert!(matches!(result, Err(Error::SinkClosed)));
    }

    #[tokio::test]
    async fn test_forward_readings_until_closed() {
        let (tx, rx) = broadcast::channel(8);
        let mut sink = MockReadingSink::new();
        sink.expect_record().times(3).returning(|_| Ok(()));

        for raw in [1.0, 2.0, 3.0] {
            tx.send(reading(Channel::Hydration, raw)).unwrap();
        }
        drop(tx);

        forward_readings(rx, &sink).await.unwrap();
    }

    #[tokio::test]
    async fn test_forward_readings_stops_on_sink_error() {
        let (tx, rx) = broadcast::channel(8);
        let mut sink = MockReadingSink::new();
        sink.expect_record()
            .times(1)
            .returning(|_| Err(Error::SinkClosed));

        tx.send(reading(Channel::Hydration, 1.0)).unwrap();
        tx.send(reading(Channel::Hydration, 2.0)).unwrap();

        let result = forward_readings(rx, &sink).await;
        assert!(matches!(result, Err(Error::SinkClosed)));
    }

    #[tokio::test]
    async fn test_forward_readings_survives_lag() {
        let (tx, rx) = broadcast::channel(2);
        let sink = LogSink::new();

        for raw in [1.0, 2.0, 3.0, 4.0] {
            tx.send(reading(Channel::Hydration, raw)).unwrap();
        }
        drop(tx);

        forward_readings(rx, &sink).await.unwrap();
        assert_eq!(sink.snapshot().line_count(), 2);
    }

    #[tokio::test]
    async fn test_drain_readings_records_queued_while_sender_alive() {
        let (tx, mut rx) = broadcast::channel(8);
        let sink = LogSink::new();

        tx.send(reading(Channel::Hydration, 1128.0)).unwrap();
        tx.send(reading(Channel::Temperature, 0.0)).unwrap();

        let recorded = drain_readings(&mut rx, &sink).await.unwrap();
        assert_eq!(recorded, 2);
        assert_eq!(sink.snapshot().as_str(), "2019-04-15 10:30:05, 1128, 0");

        // Nothing left, and the sender is still open.
        assert_eq!(drain_readings(&mut rx, &sink).await.unwrap(), 0);
        drop(tx);
    }

    #[tokio::test]
    async fn test_drain_readings_skips_lagged() {
        let (tx, mut rx) = broadcast::channel(2);
        let sink = LogSink::new();

        for raw in [1.0, 2.0, 3.0, 4.0] {
            tx.send(reading(Channel::Hydration, raw)).unwrap();
        }

        assert_eq!(drain_readings(&mut rx, &sink).await.unwrap(), 2);
        assert_eq!(sink.snapshot().line_count(), 2);
    }
}
