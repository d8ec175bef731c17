//! Timestamp utilities.

use chrono::{DateTime, Local};

/// A wrapper around the local wall clock used for naming run artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(DateTime<Local>);

impl Timestamp {
    /// Create a new timestamp from the current time.
    pub fn now() -> Self {
        Timestamp(Local::now())
    }

    /// Create a timestamp from a DateTime<Local>.
    pub fn from_datetime(dt: DateTime<Local>) -> Self {
        Timestamp(dt)
    }

    /// Format usable inside a file name (no colons).
    pub fn to_file_stamp(&self) -> String {
        self.0.format("%Y-%m-%dT%H-%M-%S").to_string()
    }

    /// Log file name for a device: `<timestamp>.<serial>.log`.
    pub fn log_file_name(&self, serial_tag: &str) -> String {
        format!("{}.{}.log", self.to_file_stamp(), serial_tag)
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
