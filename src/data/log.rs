//! Plain-text reading log.
//!
//! The log is a growing text buffer with one line per hydration sample:
//!
//! ```text
//! 2019-04-15 10:30:05, 1128, 1.2
//! 2019-04-15 10:30:06, 1130, 1.2
//! ```
//!
//! A hydration reading opens a new line with its timestamp; the temperature
//! reading that follows is appended to the same line. The buffer can be
//! appended to a timestamp-named file with [`ReadingLog::save_to_dir`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::reading::{Channel, Reading};
use crate::error::Result;

/// Timestamp format used at the start of each log line.
pub const LINE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Text log of decoded readings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadingLog {
    /// Accumulated log text, without a trailing newline.
    text: String,
    /// Number of lines in `text`.
    lines: usize,
}

impl ReadingLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reading.
    pub fn push(&mut self, reading: &Reading) {
        match reading.channel {
            Channel::Hydration => {
                self.start_line(&reading.timestamp);
                self.text.push_str(&reading.value.to_string());
            }
            Channel::Temperature => {
                if self.lines == 0 {
                    // No hydration sample yet: leave its column empty.
                    self.start_line(&reading.timestamp);
                }
                self.text.push_str(", ");
                self.text.push_str(&reading.value.to_string());
            }
        }
    }

    fn start_line(&mut self, timestamp: &DateTime<Local>) {
        if self.lines > 0 {
            self.text.push('\n');
        }
        self.text
            .push_str(&timestamp.format(LINE_TIMESTAMP_FORMAT).to_string());
        self.text.push_str(", ");
        self.lines += 1;
    }

    /// The log text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of lines in the log.
    pub fn line_count(&self) -> usize {
        self.lines
    }

    /// Check if nothing has been logged.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Discard all logged text.
    pub fn clear(&mut self) {
        self.text.clear();
        self.lines = 0;
    }

    /// File name the log is saved under for a given save time.
    ///
    /// # Example
    ///
    /// ```
    /// use chrono::{Local, TimeZone};
    /// use hdrop_ble::data::ReadingLog;
    ///
    /// let now = Local.with_ymd_and_hms(2019, 4, 15, 10, 30, 5).unwrap();
    /// assert_eq!(ReadingLog::file_name(&now), "log-2019-04-15-10-30-05.txt");
    /// ```
    pub fn file_name(now: &DateTime<Local>) -> String {
        let date = sanitize(&now.format("%Y-%m-%d").to_string());
        let time = sanitize(&now.format("%H:%M:%S").to_string());
        format!("log-{}-{}.txt", date, time)
    }

    /// Append the log to `log-<date>-<time>.txt` in `dir`.
    ///
    /// The file is created if missing; existing content is kept. Returns the
    /// path that was written.
    pub async fn save_to_dir(
        &self,
        dir: impl AsRef<Path>,
        now: &DateTime<Local>,
    ) -> Result<PathBuf> {
        let path = dir.as_ref().join(Self::file_name(now));

        debug!("Appending {} log lines to {}", self.lines, path.display());

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(self.text.as_bytes()).await?;
        file.flush().await?;

        info!("Saved reading log to {}", path.display());

        Ok(path)
    }
}

/// Replace every character that is not an ASCII letter or digit with `-`.
fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at(s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2019, 4, 15, 10, 30, s).unwrap()
    }

    fn unique_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "hdrop-ble-{}-{}",
            name,
            uuid::Uuid::new_v4()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_hydration_then_temperature_share_a_line() {
        let mut log = ReadingLog::new();
        log.push(&Reading::new(at(5), Channel::Hydration, 1128.0));
        log.push(&Reading::new(at(5), Channel::Temperature, 0.0));
        log.push(&Reading::new(at(6), Channel::Hydration, 1130.0));

        assert_eq!(
            log.as_str(),
            "2019-04-15 10:30:05, 1128, 0\n2019-04-15 10:30:06, 1130"
        );
        assert_eq!(log.line_count(), 2);
    }

    #[test]
    fn test_temperature_first_leaves_hydration_empty() {
        let mut log = ReadingLog::new();
        log.push(&Reading::new(at(5), Channel::Temperature, 0.0));
        assert_eq!(log.as_str(), "2019-04-15 10:30:05, , 0");
        assert_eq!(log.line_count(), 1);
    }

    #[test]
    fn test_clear() {
        let mut log = ReadingLog::new();
        log.push(&Reading::new(at(5), Channel::Hydration, 1.0));
        assert!(!log.is_empty());
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.line_count(), 0);
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("4/15/2019"), "4-15-2019");
        assert_eq!(sanitize("10:30:05 AM"), "10-30-05-AM");
    }

    #[tokio::test]
    async fn test_save_to_dir_appends() {
        let dir = unique_dir("save");
        let mut log = ReadingLog::new();
        log.push(&Reading::new(at(5), Channel::Hydration, 1128.0));

        let path = tokio_test::assert_ok!(log.save_to_dir(&dir, &at(9)).await);
        assert_eq!(path, dir.join("log-2019-04-15-10-30-09.txt"));

        log.save_to_dir(&dir, &at(9)).await.unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "2019-04-15 10:30:05, 11282019-04-15 10:30:05, 1128"
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_save_to_missing_dir_fails() {
        let dir = std::env::temp_dir().join(format!("hdrop-ble-missing-{}", uuid::Uuid::new_v4()));
        let log = ReadingLog::new();
        let result = log.save_to_dir(&dir, &at(0)).await;
        let err = tokio_test::assert_err!(result);
        assert!(matches!(err, crate::Error::Io(_)));
    }
}
